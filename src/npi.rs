use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use std::io;
use std::str::FromStr;

use log::{debug, info, warn};

use enum_map::{Enum, EnumMap};

use serde::{Deserialize, Serialize};

use chrono::NaiveDate;

use super::admin::Pcode;
use super::error::Result;
use super::index::{AdminIndex, Unresolved};
use super::names::NameNormalizer;
use super::timeseries::TimeSeries;


/// Marginal reproduction number factor of each additional simultaneous
/// measure. Counts beyond the end reuse the last factor.
pub static R_REDUCTION_SEQUENCE: [f64; 5] = [1.0, 0.4, 0.2, 0.1, 0.05];
pub static MOBILITY_REDUCTION: f64 = 0.4;
pub static NO_REDUCTION: f64 = 1.0;

static PHASE_OUT_LOG_TYPE: &'static str = "Phase-out measure";


#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Enum, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MeasureCategory {
	ReproductionNumber,
	Mobility,
	Contact,
}

impl MeasureCategory {
	pub const ALL: [MeasureCategory; 3] = [Self::ReproductionNumber, Self::Mobility, Self::Contact];

	pub fn label(&self) -> &'static str {
		match self {
			Self::ReproductionNumber => "reproduction_number",
			Self::Mobility => "mobility",
			Self::Contact => "contact",
		}
	}
}

impl fmt::Display for MeasureCategory {
	fn fmt<'f>(&self, f: &'f mut fmt::Formatter) -> fmt::Result {
		f.write_str(self.label())
	}
}

impl FromStr for MeasureCategory {
	type Err = String;

	fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
		match s.trim() {
			"reproduction_number" | "r0" => Ok(Self::ReproductionNumber),
			"mobility" => Ok(Self::Mobility),
			"contact" | "school" => Ok(Self::Contact),
			other => Err(format!("unknown measure category {:?}", other)),
		}
	}
}


#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Enum)]
pub enum LocationType {
	Home,
	Work,
	School,
	OtherLocations,
}

impl LocationType {
	pub const ALL: [LocationType; 4] = [Self::Home, Self::Work, Self::School, Self::OtherLocations];

	pub fn label(&self) -> &'static str {
		match self {
			Self::Home => "home",
			Self::Work => "work",
			Self::School => "school",
			Self::OtherLocations => "other_locations",
		}
	}

	/// Contact factor of this location while contact measures are active.
	/// School closures shift contacts from school and elsewhere to home.
	pub fn active_contact_factor(&self) -> f64 {
		match self {
			Self::Home => 1.2,
			Self::Work => 1.0,
			Self::School => 0.1,
			Self::OtherLocations => 0.8,
		}
	}
}

impl fmt::Display for LocationType {
	fn fmt<'f>(&self, f: &'f mut fmt::Formatter) -> fmt::Result {
		f.write_str(self.label())
	}
}


#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Action {
	Add,
	Remove,
}


#[derive(Debug, Clone, PartialEq)]
pub struct NpiRecord {
	pub id: String,
	/// Canonical measure name.
	pub measure: String,
	pub category: MeasureCategory,
	pub action: Action,
	pub start_date: NaiveDate,
	pub end_date: Option<NaiveDate>,
	/// Admin-2 units the measure applies to.
	pub affected_pcodes: Vec<Pcode>,
	/// Percent, 0 to 100.
	pub compliance_level: u8,
}

impl NpiRecord {
	pub fn compliance(&self) -> f64 {
		self.compliance_level as f64 / 100.
	}

	fn overlaps(&self, other: &NpiRecord) -> bool {
		self.affected_pcodes.iter().any(|p| other.affected_pcodes.contains(p))
	}
}


/// Lets a later `remove` record end the open `add` records of the same
/// measure on the day before it takes effect. Returns the `add` records in
/// their original order.
pub fn apply_removals(records: Vec<NpiRecord>) -> Vec<NpiRecord> {
	let mut result: Vec<NpiRecord> = Vec::with_capacity(records.len());
	for rec in records.into_iter() {
		match rec.action {
			Action::Add => result.push(rec),
			Action::Remove => {
				let end = rec.start_date.pred_opt().unwrap_or(rec.start_date);
				let mut closed = 0;
				for open in result.iter_mut() {
					if open.end_date.is_none() && open.measure == rec.measure && open.start_date <= rec.start_date && open.overlaps(&rec) {
						open.end_date = Some(end);
						closed += 1;
					}
				}
				if closed == 0 {
					debug!("phase-out {} ({}) matches no open measure", rec.id, rec.measure);
				}
			},
		}
	}
	result
}


/// Per-category accumulation state of one admin-2 unit on one day.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct NpiState {
	pub num_active: u32,
	pub compliance: f64,
}

impl Default for NpiState {
	fn default() -> Self {
		Self{num_active: 0, compliance: 1.0}
	}
}

impl NpiState {
	/// Folds one more active measure into the running compliance average.
	pub fn with_measure(self, compliance: f64) -> Self {
		let n = self.num_active as f64;
		Self{
			num_active: self.num_active + 1,
			compliance: (n * self.compliance + compliance) / (n + 1.),
		}
	}
}


pub fn reproduction_reduction(state: NpiState) -> f64 {
	if state.num_active == 0 {
		return NO_REDUCTION
	}
	let last = R_REDUCTION_SEQUENCE.len() - 1;
	let product: f64 = (0..=state.num_active as usize)
		.map(|i| R_REDUCTION_SEQUENCE[i.min(last)])
		.product();
	1. - product * state.compliance
}

pub fn mobility_reduction(state: NpiState) -> f64 {
	if state.num_active > 0 {
		MOBILITY_REDUCTION
	} else {
		NO_REDUCTION
	}
}

pub fn contact_reduction(state: NpiState) -> EnumMap<LocationType, f64> {
	let active = state.num_active > 0;
	EnumMap::from(|loc: LocationType| if active {
		loc.active_contact_factor()
	} else {
		NO_REDUCTION
	})
}


#[derive(Debug, Clone, PartialEq)]
pub enum Reduction {
	Scalar(f64),
	Contact(EnumMap<LocationType, f64>),
}

impl Reduction {
	pub fn of(category: MeasureCategory, state: NpiState) -> Self {
		match category {
			MeasureCategory::ReproductionNumber => Self::Scalar(reproduction_reduction(state)),
			MeasureCategory::Mobility => Self::Scalar(mobility_reduction(state)),
			MeasureCategory::Contact => Self::Contact(contact_reduction(state)),
		}
	}
}


pub type NpiKey = (Pcode, MeasureCategory);


/// Dense `(date, admin-2, category)` table of active measures.
#[derive(Debug, Clone)]
pub struct NpiTable {
	states: TimeSeries<NpiKey, NpiState>,
	adm2: BTreeSet<Pcode>,
}

impl NpiTable {
	pub fn new<'x, I: IntoIterator<Item = &'x Pcode>>(start: NaiveDate, run_date: NaiveDate, adm2: I) -> Self {
		let mut states = TimeSeries::new(start, run_date);
		let adm2: BTreeSet<Pcode> = adm2.into_iter().cloned().collect();
		for pcode in adm2.iter() {
			for cat in MeasureCategory::ALL.iter() {
				states.get_or_create_with((pcode.clone(), *cat), NpiState::default());
			}
		}
		Self{states, adm2}
	}

	/// Table after one more record. Open-ended records last until the end
	/// of the axis, which is the run date.
	pub fn with_record(mut self, rec: &NpiRecord) -> Self {
		if rec.action == Action::Remove {
			return self
		}
		let last = self.states.len() as i64 - 1;
		let first = (rec.start_date - self.states.start()).num_days().max(0);
		let end = match rec.end_date {
			Some(d) => (d - self.states.start()).num_days().min(last),
			None => last,
		};
		if end < first {
			debug!("measure {} ({}) does not overlap the table range", rec.id, rec.measure);
			return self
		}
		let compliance = rec.compliance();
		for pcode in rec.affected_pcodes.iter() {
			if !self.adm2.contains(pcode) {
				self.adm2.insert(pcode.clone());
				for cat in MeasureCategory::ALL.iter() {
					self.states.get_or_create_with((pcode.clone(), *cat), NpiState::default());
				}
			}
			let series = self.states.get_or_create_with((pcode.clone(), rec.category), NpiState::default());
			for slot in series[first as usize..=end as usize].iter_mut() {
				*slot = slot.with_measure(compliance);
			}
		}
		self
	}

	/// Accumulates `records` in the given order.
	pub fn from_records<'x, I, J>(run_date: NaiveDate, adm2: J, records: I) -> Self
		where I: IntoIterator<Item = &'x NpiRecord>,
		      J: IntoIterator<Item = &'x Pcode>,
	{
		let records: Vec<&NpiRecord> = records.into_iter().collect();
		let start = records.iter()
			.filter(|r| r.action == Action::Add)
			.map(|r| r.start_date)
			.min()
			.unwrap_or(run_date)
			.min(run_date);
		records.into_iter().fold(Self::new(start, run_date, adm2), |table, rec| table.with_record(rec))
	}

	pub fn start(&self) -> NaiveDate {
		self.states.start()
	}

	pub fn len(&self) -> usize {
		self.states.len()
	}

	pub fn adm2_pcodes(&self) -> impl Iterator<Item = &Pcode> {
		self.adm2.iter()
	}

	/// State on `date`; days outside the table have no active measures.
	pub fn state(&self, pcode: &Pcode, category: MeasureCategory, date: NaiveDate) -> NpiState {
		self.states.date_index(date)
			.and_then(|i| self.states.get_value(&(pcode.clone(), category), i))
			.unwrap_or_default()
	}

	pub fn reduction(&self, pcode: &Pcode, category: MeasureCategory, date: NaiveDate) -> Reduction {
		Reduction::of(category, self.state(pcode, category, date))
	}

	pub fn write<W: io::Write>(&self, w: W) -> Result<()> {
		let mut w = csv::Writer::from_writer(w);
		for (i, date) in self.states.dates().enumerate() {
			for pcode in self.adm2.iter() {
				for cat in MeasureCategory::ALL.iter() {
					let state = self.states.get_value(&(pcode.clone(), *cat), i).unwrap_or_default();
					let mut row = NpiOutputRow{
						date,
						adm2_pcode: pcode.clone(),
						category: *cat,
						num_npis_active: state.num_active,
						compliance_level: state.compliance,
						reduction: None,
						reduction_home: None,
						reduction_work: None,
						reduction_school: None,
						reduction_other_locations: None,
					};
					match Reduction::of(*cat, state) {
						Reduction::Scalar(v) => row.reduction = Some(v),
						Reduction::Contact(m) => {
							row.reduction_home = Some(m[LocationType::Home]);
							row.reduction_work = Some(m[LocationType::Work]);
							row.reduction_school = Some(m[LocationType::School]);
							row.reduction_other_locations = Some(m[LocationType::OtherLocations]);
						},
					}
					w.serialize(row)?;
				}
			}
		}
		w.flush()?;
		Ok(())
	}

	/// Reads a table written by `write`.
	pub fn load<R: io::Read>(r: R) -> Result<Option<Self>> {
		let mut r = csv::Reader::from_reader(r);
		let mut rows = Vec::new();
		for row in r.deserialize() {
			let row: NpiOutputRow = row?;
			rows.push(row);
		}
		let start = match rows.iter().map(|r| r.date).min() {
			Some(d) => d,
			None => return Ok(None),
		};
		let last = rows.iter().map(|r| r.date).max().unwrap_or(start);
		let adm2: BTreeSet<Pcode> = rows.iter().map(|r| r.adm2_pcode.clone()).collect();
		let mut table = Self::new(start, last, adm2.iter());
		for row in rows.into_iter() {
			let i = match table.states.date_index(row.date) {
				Some(i) => i,
				None => continue,
			};
			table.states.get_or_create_with((row.adm2_pcode, row.category), NpiState::default())[i] = NpiState{
				num_active: row.num_npis_active,
				compliance: row.compliance_level,
			};
		}
		Ok(Some(table))
	}
}


#[derive(Debug, Clone, Serialize, Deserialize)]
struct NpiOutputRow {
	#[serde(rename = "#date")]
	date: NaiveDate,
	#[serde(rename = "#adm2+pcode")]
	adm2_pcode: Pcode,
	category: MeasureCategory,
	num_npis_active: u32,
	compliance_level: f64,
	reduction: Option<f64>,
	reduction_home: Option<f64>,
	reduction_work: Option<f64>,
	reduction_school: Option<f64>,
	reduction_other_locations: Option<f64>,
}


/// One row of the raw government measures dataset.
#[derive(Debug, Clone, Deserialize)]
pub struct RawNpiRow {
	#[serde(rename = "ID")]
	pub id: String,
	#[serde(rename = "ISO")]
	pub iso: String,
	#[serde(rename = "MEASURE")]
	pub measure: String,
	#[serde(rename = "LOG_TYPE", default)]
	pub log_type: Option<String>,
	#[serde(rename = "DATE_IMPLEMENTED", default)]
	pub date_implemented: Option<String>,
	#[serde(rename = "END_DATE", default)]
	pub end_date: Option<String>,
	#[serde(rename = "ADMIN_LEVEL_NAME", default)]
	pub admin_level_name: Option<String>,
}

pub fn read_raw_npis<R: io::Read>(r: R) -> Result<Vec<RawNpiRow>> {
	let mut r = csv::ReaderBuilder::new().flexible(true).from_reader(r);
	let mut result = Vec::new();
	for row in r.deserialize() {
		result.push(row?);
	}
	Ok(result)
}


#[derive(Debug, Clone, Deserialize)]
struct EquivalenceRow {
	measure: String,
	#[serde(default)]
	canonical: Option<String>,
	#[serde(default)]
	category: Option<String>,
}

/// Maps raw measure names to a canonical name and category. Measures
/// without a category are known but have no modelled effect.
#[derive(Debug, Clone, Default)]
pub struct MeasureEquivalence {
	entries: BTreeMap<String, (String, Option<MeasureCategory>)>,
}

impl MeasureEquivalence {
	pub fn load<R: io::Read>(r: R) -> Result<Self> {
		let mut r = csv::Reader::from_reader(r);
		let mut entries = BTreeMap::new();
		for row in r.deserialize() {
			let row: EquivalenceRow = row?;
			let key = row.measure.trim().to_lowercase();
			let canonical = row.canonical.as_ref().filter(|s| !s.trim().is_empty()).cloned().unwrap_or_else(|| row.measure.trim().to_string());
			let category = match row.category.as_ref().map(|s| s.trim()).filter(|s| !s.is_empty()) {
				Some(s) => match s.parse::<MeasureCategory>() {
					Ok(c) => Some(c),
					Err(e) => {
						warn!("measure equivalence for {:?}: {}, ignoring the measure", row.measure, e);
						None
					},
				},
				None => None,
			};
			entries.insert(key, (canonical, category));
		}
		Ok(Self{entries})
	}

	pub fn insert(&mut self, raw: &str, canonical: &str, category: Option<MeasureCategory>) {
		self.entries.insert(raw.trim().to_lowercase(), (canonical.to_string(), category));
	}

	pub fn get(&self, raw: &str) -> Option<(&str, Option<MeasureCategory>)> {
		self.entries.get(&raw.trim().to_lowercase()).map(|(c, cat)| (c.as_str(), *cat))
	}
}


#[derive(Debug, Clone, Deserialize)]
struct OverrideRow {
	#[serde(rename = "ID")]
	id: String,
	#[serde(default)]
	affected_pcodes: Option<String>,
	#[serde(default)]
	end_date: Option<String>,
	#[serde(default)]
	compliance_level: Option<u8>,
}

/// Manually curated corrections keyed by record ID.
#[derive(Debug, Clone, Default)]
pub struct NpiOverride {
	pub affected_pcodes: Option<Vec<Pcode>>,
	pub end_date: Option<NaiveDate>,
	pub compliance_level: Option<u8>,
}

pub fn load_overrides<R: io::Read>(r: R) -> Result<BTreeMap<String, NpiOverride>> {
	let mut r = csv::Reader::from_reader(r);
	let mut result = BTreeMap::new();
	for row in r.deserialize() {
		let row: OverrideRow = row?;
		let end_date = match row.end_date.as_ref().map(|s| s.trim()).filter(|s| !s.is_empty()) {
			Some(s) => match parse_date(s) {
				Some(d) => Some(d),
				None => {
					warn!("override {}: cannot parse end date {:?}, ignoring it", row.id, s);
					None
				},
			},
			None => None,
		};
		let affected_pcodes = row.affected_pcodes
			.map(|s| split_list(&s).map(|p| p.into()).collect::<Vec<Pcode>>())
			.filter(|v| !v.is_empty());
		result.insert(row.id.trim().to_string(), NpiOverride{
			affected_pcodes,
			end_date,
			compliance_level: row.compliance_level,
		});
	}
	Ok(result)
}


fn parse_date(s: &str) -> Option<NaiveDate> {
	let s = s.trim();
	NaiveDate::parse_from_str(s, "%Y-%m-%d")
		.or_else(|_| NaiveDate::parse_from_str(s, "%d/%m/%Y"))
		.ok()
}

fn split_list(s: &str) -> impl Iterator<Item = &str> {
	s.split(|c: char| c == ',' || c == ';').map(|p| p.trim()).filter(|p| !p.is_empty())
}


/// Pcodes named by a record's area field, or `None` if any name does not
/// resolve. An empty area means the whole country.
fn infer_locations(area: Option<&str>, index: &AdminIndex, normalizer: &NameNormalizer, id: &str, unresolved: &mut Unresolved) -> Option<Vec<Pcode>> {
	let area = area.map(|s| s.trim()).unwrap_or("");
	if area.is_empty() {
		return index.country().map(|c| vec![c.clone()])
	}
	let mut result = Vec::new();
	let mut complete = true;
	for name in split_list(area) {
		let name = normalizer.normalize(name);
		match index.lookup_adm1(&name).or_else(|| index.lookup_adm2(&name)) {
			Some(p) => result.push(p.clone()),
			None => {
				unresolved.note(&name, id);
				complete = false;
			},
		}
	}
	if complete {
		Some(result)
	} else {
		None
	}
}

fn expand(pcodes: &[Pcode], index: &AdminIndex, id: &str) -> Vec<Pcode> {
	let mut seen = BTreeSet::new();
	let mut result = Vec::new();
	for pcode in pcodes.iter() {
		match index.expand_to_adm2(pcode) {
			Some(children) => {
				for c in children.into_iter() {
					if seen.insert(c.clone()) {
						result.push(c);
					}
				}
			},
			None => warn!("measure {} names unknown pcode {}, skipping it", id, pcode),
		}
	}
	result
}


/// Inputs of the NPI ingestion of one country.
pub struct NpiSources<'x> {
	pub iso3: &'x str,
	pub equivalence: &'x MeasureEquivalence,
	pub overrides: &'x BTreeMap<String, NpiOverride>,
	pub index: &'x AdminIndex,
	pub normalizer: &'x NameNormalizer,
}

impl<'x> NpiSources<'x> {
	/// Turns raw rows into records with admin-2 locations, in input order.
	/// Ambiguous locations without a manual override exclude the record.
	pub fn ingest(&self, rows: &[RawNpiRow]) -> Vec<NpiRecord> {
		let mut unresolved = Unresolved::new();
		let mut unknown_measures = BTreeSet::new();
		let mut result = Vec::new();
		let mut ambiguous = 0usize;
		for row in rows.iter().filter(|r| r.iso.trim() == self.iso3) {
			let (measure, category) = match self.equivalence.get(&row.measure) {
				Some((m, Some(c))) => (m.to_string(), c),
				Some((_, None)) => continue,
				None => {
					unknown_measures.insert(row.measure.clone());
					continue
				},
			};
			let start_date = match row.date_implemented.as_ref().and_then(|s| parse_date(s)) {
				Some(d) => d,
				None => {
					warn!("measure {} has no usable implementation date {:?}, skipping it", row.id, row.date_implemented);
					continue
				},
			};
			let action = match row.log_type.as_ref().map(|s| s.trim()) {
				Some(t) if t == PHASE_OUT_LOG_TYPE => Action::Remove,
				_ => Action::Add,
			};
			let ovr = self.overrides.get(row.id.trim());
			let inferred = infer_locations(row.admin_level_name.as_ref().map(|s| s.as_str()), self.index, self.normalizer, &row.id, &mut unresolved);
			let locations = match (ovr.and_then(|o| o.affected_pcodes.clone()), inferred) {
				(Some(p), _) => p,
				(None, Some(p)) => p,
				(None, None) => {
					warn!("measure {} ({}) has ambiguous locations {:?} and no override, excluding it", row.id, measure, row.admin_level_name);
					ambiguous += 1;
					continue
				},
			};
			let end_date = match ovr.and_then(|o| o.end_date) {
				Some(d) => Some(d),
				None => row.end_date.as_ref().and_then(|s| parse_date(s)),
			};
			let compliance_level = match ovr.and_then(|o| o.compliance_level) {
				Some(c) if c > 100 => {
					warn!("measure {} has compliance {} above 100, clamping", row.id, c);
					100
				},
				Some(c) => c,
				None => 100,
			};
			let affected_pcodes = expand(&locations, self.index, &row.id);
			if affected_pcodes.is_empty() {
				warn!("measure {} ({}) affects no known admin-2 unit, excluding it", row.id, measure);
				continue
			}
			result.push(NpiRecord{
				id: row.id.trim().to_string(),
				measure,
				category,
				action,
				start_date,
				end_date,
				affected_pcodes,
				compliance_level,
			});
		}
		unresolved.report("NPI location");
		if !unknown_measures.is_empty() {
			warn!("{} measure names missing from the equivalence table: {:?}", unknown_measures.len(), unknown_measures);
		}
		info!("ingested {} NPI records for {} ({} excluded as ambiguous)", result.len(), self.iso3, ambiguous);
		result
	}
}


#[cfg(test)]
mod tests {
	use super::*;
	use crate::index::tests::sample_index;

	fn d(m: u32, day: u32) -> NaiveDate {
		NaiveDate::from_ymd_opt(2020, m, day).unwrap()
	}

	fn record(id: &str, category: MeasureCategory, start: NaiveDate, end: Option<NaiveDate>, pcodes: &[&str], compliance: u8) -> NpiRecord {
		NpiRecord{
			id: id.into(),
			measure: format!("measure {}", id),
			category,
			action: Action::Add,
			start_date: start,
			end_date: end,
			affected_pcodes: pcodes.iter().map(|p| (*p).into()).collect(),
			compliance_level: compliance,
		}
	}

	#[test]
	fn reproduction_number_reduction() {
		assert_eq!(reproduction_reduction(NpiState::default()), 1.0);
		let one = NpiState::default().with_measure(1.0);
		assert!((reproduction_reduction(one) - 0.6).abs() < 1e-12);
		// beyond the sequence the last factor keeps applying
		let mut many = NpiState::default();
		for _ in 0..6 {
			many = many.with_measure(1.0);
		}
		let expected = 1. - 1.0 * 0.4 * 0.2 * 0.1 * 0.05 * 0.05 * 0.05;
		assert!((reproduction_reduction(many) - expected).abs() < 1e-12);
	}

	#[test]
	fn two_overlapping_measures() {
		let p: Pcode = "AF0101".into();
		let records = vec![
			record("1", MeasureCategory::ReproductionNumber, d(3, 1), None, &["AF0101"], 100),
			record("2", MeasureCategory::ReproductionNumber, d(3, 5), Some(d(3, 8)), &["AF0101"], 50),
		];
		let table = NpiTable::from_records(d(3, 10), vec![&p], records.iter());
		let s = table.state(&p, MeasureCategory::ReproductionNumber, d(3, 6));
		assert_eq!(s.num_active, 2);
		assert!((s.compliance - 0.75).abs() < 1e-12);
		match table.reduction(&p, MeasureCategory::ReproductionNumber, d(3, 6)) {
			Reduction::Scalar(v) => assert!((v - 0.94).abs() < 1e-12),
			other => panic!("unexpected {:?}", other),
		}
		let after = table.state(&p, MeasureCategory::ReproductionNumber, d(3, 9));
		assert_eq!(after.num_active, 1);
		assert_eq!(after.compliance, 1.0);
		let open_end = table.state(&p, MeasureCategory::ReproductionNumber, d(3, 10));
		assert_eq!(open_end.num_active, 1);
		assert_eq!(table.state(&p, MeasureCategory::Mobility, d(3, 6)), NpiState::default());
	}

	#[test]
	fn order_of_records_matters() {
		let p: Pcode = "AF0101".into();
		let a = record("a", MeasureCategory::Mobility, d(3, 1), None, &["AF0101"], 20);
		let b = record("b", MeasureCategory::Mobility, d(3, 1), None, &["AF0101"], 100);
		let c = record("c", MeasureCategory::Mobility, d(3, 1), None, &["AF0101"], 60);
		let table = NpiTable::from_records(d(3, 2), vec![&p], vec![&a, &b, &c]);
		let s = table.state(&p, MeasureCategory::Mobility, d(3, 1));
		assert_eq!(s.num_active, 3);
		assert!((s.compliance - 0.6).abs() < 1e-12);
		assert_eq!(mobility_reduction(s), 0.4);
	}

	#[test]
	fn contact_measures_shift_contacts_home() {
		let m = contact_reduction(NpiState::default().with_measure(1.0));
		assert!(m[LocationType::Home] > 1.0);
		assert!(m[LocationType::OtherLocations] < 1.0);
		assert!(m[LocationType::School] < m[LocationType::OtherLocations]);
		let idle = contact_reduction(NpiState::default());
		assert!(LocationType::ALL.iter().all(|l| idle[*l] == 1.0));
	}

	#[test]
	fn removal_closes_open_measure() {
		let mut remove = record("2", MeasureCategory::Contact, d(4, 10), None, &["AF0102"], 100);
		remove.action = Action::Remove;
		let mut add = record("1", MeasureCategory::Contact, d(3, 15), None, &["AF0101", "AF0102"], 100);
		add.measure = remove.measure.clone();
		let records = apply_removals(vec![add, remove]);
		assert_eq!(records.len(), 1);
		assert_eq!(records[0].end_date, Some(d(4, 9)));
	}

	#[test]
	fn equivalence_defaults_to_raw_measure() {
		let csv = "measure,canonical,category\n\
			Schools closure,school closure,contact\n\
			Curfews ,,mobility\n\
			Awareness campaigns,awareness,\n";
		let eq = MeasureEquivalence::load(csv.as_bytes()).unwrap();
		assert_eq!(eq.get("schools closure"), Some(("school closure", Some(MeasureCategory::Contact))));
		assert_eq!(eq.get("Curfews"), Some(("Curfews", Some(MeasureCategory::Mobility))));
		assert_eq!(eq.get("Awareness campaigns"), Some(("awareness", None)));
		assert_eq!(eq.get("Martial law"), None);
	}

	#[test]
	fn ingestion_resolves_and_overrides() {
		let index = sample_index();
		let mut eq = MeasureEquivalence::default();
		eq.insert("Schools closure", "school closure", Some(MeasureCategory::Contact));
		eq.insert("Awareness campaigns", "awareness", None);
		eq.insert("Domestic travel restrictions", "travel", Some(MeasureCategory::Mobility));
		let raw = "ID,ISO,MEASURE,LOG_TYPE,DATE_IMPLEMENTED,END_DATE,ADMIN_LEVEL_NAME\n\
			1,AFG,Schools closure,Introduction / extension of measures,2020-03-14,,\n\
			2,AFG,Awareness campaigns,Introduction / extension of measures,2020-03-01,,\n\
			3,AFG,Domestic travel restrictions,Introduction / extension of measures,2020-03-20,2020-04-01,Kabul Province; Kapisa\n\
			4,AFG,Domestic travel restrictions,Introduction / extension of measures,2020-03-21,,Atlantis\n\
			5,AFG,Domestic travel restrictions,Introduction / extension of measures,2020-03-22,,Lemuria\n\
			6,PAK,Schools closure,Introduction / extension of measures,2020-03-14,,\n\
			7,AFG,Schools closure,Phase-out measure,2020-05-01,,\n";
		let rows = read_raw_npis(raw.as_bytes()).unwrap();
		let overrides = load_overrides("ID,affected_pcodes,end_date,compliance_level\n5,AF0201,2020-04-30,80\n".as_bytes()).unwrap();
		let sources = NpiSources{
			iso3: "AFG",
			equivalence: &eq,
			overrides: &overrides,
			index: &index,
			normalizer: &NameNormalizer::default(),
		};
		let records = sources.ingest(&rows);
		let ids: Vec<&str> = records.iter().map(|r| r.id.as_str()).collect();
		assert_eq!(ids, vec!["1", "3", "5", "7"]);
		assert_eq!(records[0].affected_pcodes.len(), 3);
		assert_eq!(records[1].affected_pcodes.len(), 3);
		assert_eq!(records[1].end_date, Some(d(4, 1)));
		assert_eq!(records[2].affected_pcodes, vec![Pcode::from("AF0201")]);
		assert_eq!(records[2].compliance_level, 80);
		assert_eq!(records[2].end_date, Some(d(4, 30)));
		assert_eq!(records[3].action, Action::Remove);

		let records = apply_removals(records);
		assert_eq!(records[0].end_date, Some(d(4, 30)));
	}

	#[test]
	fn write_then_load() {
		let p: Pcode = "AF0101".into();
		let records = vec![record("1", MeasureCategory::ReproductionNumber, d(3, 1), None, &["AF0101"], 50)];
		let table = NpiTable::from_records(d(3, 3), vec![&p], records.iter());
		let mut buf = Vec::new();
		table.write(&mut buf).unwrap();
		let again = NpiTable::load(&buf[..]).unwrap().unwrap();
		assert_eq!(again.start(), d(3, 1));
		assert_eq!(again.len(), 3);
		assert_eq!(again.state(&p, MeasureCategory::ReproductionNumber, d(3, 2)), table.state(&p, MeasureCategory::ReproductionNumber, d(3, 2)));
	}
}
