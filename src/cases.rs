use std::collections::BTreeMap;
use std::io;

use log::{debug, info, warn};

use serde::{Deserialize, Serialize};

use chrono::NaiveDate;

use smartstring::alias::{String as SmartString};

use super::admin::{PopulationTable, Pcode};
use super::config::{
	AdminConfig, CaseSource, CovidConfig,
	HXL_TAG_ADM1_NAME, HXL_TAG_ADM2_NAME, HXL_TAG_DATE,
	HXL_TAG_TOTAL_CASES, HXL_TAG_TOTAL_DEATHS,
};
use super::disagg::{fractions, scale, Conservation, Fractions};
use super::error::{Error, Result};
use super::index::{AdminIndex, BoundaryRow, Unresolved};
use super::ioutil::RawTable;
use super::timeseries::{Observations, TimeSeries};
use super::Provenance;


static TOTAL_ROW: &'static str = "Total";


/// Numeric coercion for report cells: thousands separators are removed, a
/// lone dash placeholder and anything unparseable count as zero.
pub fn coerce_number(raw: &str) -> f64 {
	let cleaned: String = raw.chars().filter(|c| *c != ',').collect();
	let cleaned = cleaned.trim();
	match cleaned {
		"-" | "\u{2013}" | "\u{2014}" => return 0.,
		_ => (),
	}
	match cleaned.parse::<f64>() {
		Ok(v) if v.is_finite() => v,
		_ => 0.,
	}
}


#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Metric {
	Confirmed,
	Dead,
}


/// One row of a case report after tallying and numeric coercion, before
/// name resolution.
#[derive(Debug, Clone, PartialEq)]
pub struct Report {
	pub date: String,
	pub adm1_name: Option<String>,
	pub adm2_name: Option<String>,
	pub confirmed: Option<f64>,
	pub dead: Option<f64>,
}

impl Report {
	fn is_total(&self) -> bool {
		[&self.adm1_name, &self.adm2_name].iter()
			.any(|n| n.as_ref().map(|n| n.trim() == TOTAL_ROW).unwrap_or(false))
	}
}


/// Reads a raw report table into typed reports. Case-line sources are
/// tallied per `(date, admin-1 name, admin-2 name)`; the country total
/// pseudo-row is dropped.
pub fn read_reports<R: io::Read>(r: R, cfg: &CovidConfig) -> Result<Vec<Report>> {
	let mut table = RawTable::read(r, cfg.header, &cfg.skip_rows)?;
	table.rename(cfg.renames.iter());
	let required = |tag: &str| -> Result<usize> {
		table.column(tag).ok_or_else(|| Error::data(format!("case table lacks {} column (columns: {:?})", tag, table.headers)))
	};
	let cell = |row: &csv::StringRecord, col: Option<usize>| -> Option<String> {
		col.and_then(|c| row.get(c)).map(|s| s.to_string())
	};

	let date_col = required(HXL_TAG_DATE)?;
	let adm1_col = table.column(HXL_TAG_ADM1_NAME);
	let adm2_col = table.column(HXL_TAG_ADM2_NAME);
	match &cfg.source {
		CaseSource::Admin1Aggregated{..} => { required(HXL_TAG_ADM1_NAME)?; },
		CaseSource::Admin2Aggregated{..} | CaseSource::Admin2CaseLine{..} => { required(HXL_TAG_ADM2_NAME)?; },
	}

	let mut reports = Vec::new();
	if let CaseSource::Admin2CaseLine{..} = cfg.source {
		let mut tally: BTreeMap<(String, String, String), usize> = BTreeMap::new();
		for row in table.rows.iter() {
			let key = (
				cell(row, Some(date_col)).unwrap_or_default(),
				cell(row, adm1_col).unwrap_or_default(),
				cell(row, adm2_col).unwrap_or_default(),
			);
			*tally.entry(key).or_insert(0) += 1;
		}
		debug!("tallied {} case lines into {} groups", table.rows.len(), tally.len());
		if cfg.deaths {
			warn!("case line data carries no death counts, leaving deaths empty");
		}
		for ((date, adm1, adm2), n) in tally.into_iter() {
			reports.push(Report{
				date,
				adm1_name: Some(adm1),
				adm2_name: Some(adm2),
				confirmed: Some(n as f64),
				dead: None,
			});
		}
	} else {
		let cases_col = if cfg.cases { Some(required(HXL_TAG_TOTAL_CASES)?) } else { None };
		let deaths_col = if cfg.deaths { Some(required(HXL_TAG_TOTAL_DEATHS)?) } else { None };
		for row in table.rows.iter() {
			reports.push(Report{
				date: cell(row, Some(date_col)).unwrap_or_default(),
				adm1_name: cell(row, adm1_col),
				adm2_name: cell(row, adm2_col),
				confirmed: cell(row, cases_col).map(|s| coerce_number(&s)),
				dead: cell(row, deaths_col).map(|s| coerce_number(&s)),
			});
		}
	}

	let before = reports.len();
	reports.retain(|r| !r.is_total());
	if reports.len() != before {
		debug!("dropped {} country total rows", before - reports.len());
	}
	Ok(reports)
}


/// Case counts of one admin-2 unit on one day.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CaseRecord {
	#[serde(rename = "#adm1+pcode")]
	pub adm1_pcode: Pcode,
	#[serde(rename = "#adm2+pcode")]
	pub adm2_pcode: Pcode,
	#[serde(rename = "#date")]
	pub date: NaiveDate,
	#[serde(rename = "#affected+infected+confirmed+total")]
	pub confirmed: Option<f64>,
	#[serde(rename = "#affected+infected+dead+total")]
	pub dead: Option<f64>,
}

impl CaseRecord {
	pub fn value(&self, metric: Metric) -> Option<f64> {
		match metric {
			Metric::Confirmed => self.confirmed,
			Metric::Dead => self.dead,
		}
	}
}

#[derive(Debug, Serialize)]
struct CaseOutputRow<'x> {
	#[serde(rename = "#adm1+pcode")]
	adm1_pcode: &'x str,
	#[serde(rename = "#adm2+pcode")]
	adm2_pcode: &'x str,
	#[serde(rename = "#date")]
	date: NaiveDate,
	#[serde(rename = "#affected+infected+confirmed+total")]
	confirmed: Option<f64>,
	#[serde(rename = "#affected+infected+dead+total")]
	dead: Option<f64>,
	created_at: &'x str,
	created_by: &'x str,
}


fn sum_metric<I: Iterator<Item = Option<f64>>>(values: I) -> f64 {
	values.filter_map(|v| v).sum()
}


/// Normalized admin-2 case records, cumulative per unit.
#[derive(Debug, Clone, Default)]
pub struct CaseTable {
	records: Vec<CaseRecord>,
}

impl CaseTable {
	pub fn new(records: Vec<CaseRecord>) -> Self {
		Self{records}
	}

	/// Resolves, disaggregates and accumulates the reports of one country.
	///
	/// `boundaries` and `population` come from the exposure table. Names
	/// which do not resolve are reported and their rows dropped.
	pub fn normalize(
			reports: &[Report],
			cfg: &CovidConfig,
			admin: &AdminConfig,
			boundaries: &[BoundaryRow],
			population: &PopulationTable) -> Self
	{
		let mut unresolved = Unresolved::new();
		let mut records = Vec::with_capacity(reports.len());
		let mut bad_dates = 0usize;
		let real_index = AdminIndex::build(boundaries, &admin.adm1_name_field(), &admin.adm2_name_field());

		match &cfg.source {
			CaseSource::Admin1Aggregated{name_field, federal_states} => {
				let index = if federal_states.is_empty() {
					AdminIndex::build(boundaries, name_field, &admin.adm2_name_field())
				} else {
					AdminIndex::build(&federal_state_rows(boundaries, name_field, federal_states), name_field, &admin.adm2_name_field())
				};
				let mut cache: BTreeMap<Pcode, Option<Fractions>> = BTreeMap::new();
				for report in reports.iter() {
					let name = cfg.normalizer.normalize(report.adm1_name.as_ref().map(|s| s.as_str()).unwrap_or(""));
					let parent = match index.lookup_adm1(&name) {
						Some(p) => p.clone(),
						None => {
							unresolved.note(&name, &report.date);
							continue
						},
					};
					let date = match NaiveDate::parse_from_str(report.date.trim(), &cfg.date_format) {
						Ok(d) => d,
						Err(e) => {
							warn!("unparseable date {:?} for {}: {}", report.date, name, e);
							bad_dates += 1;
							continue
						},
					};
					let fractions = cache.entry(parent.clone())
						.or_insert_with(|| fractions(&parent, &index, population));
					let fractions = match fractions {
						Some(f) => f,
						None => continue,
					};
					let confirmed = report.confirmed.filter(|_| cfg.cases).map(|v| scale(v, fractions));
					let dead = report.dead.filter(|_| cfg.deaths).map(|v| scale(v, fractions));
					for adm2 in fractions.keys() {
						let adm1 = match real_index.parent_of(adm2) {
							Some(p) => p.clone(),
							None => parent.clone(),
						};
						records.push(CaseRecord{
							adm1_pcode: adm1,
							adm2_pcode: adm2.clone(),
							date,
							confirmed: confirmed.as_ref().and_then(|m| m.get(adm2).copied()),
							dead: dead.as_ref().and_then(|m| m.get(adm2).copied()),
						});
					}
				}
				unresolved.report("admin-1");
			},
			CaseSource::Admin2Aggregated{name_field} | CaseSource::Admin2CaseLine{name_field} => {
				let index = AdminIndex::build(boundaries, &admin.adm1_name_field(), name_field);
				for report in reports.iter() {
					let name = cfg.normalizer.normalize(report.adm2_name.as_ref().map(|s| s.as_str()).unwrap_or(""));
					let adm2 = match index.lookup_adm2(&name) {
						Some(p) => p.clone(),
						None => {
							unresolved.note(&name, &report.date);
							continue
						},
					};
					let date = match NaiveDate::parse_from_str(report.date.trim(), &cfg.date_format) {
						Ok(d) => d,
						Err(e) => {
							warn!("unparseable date {:?} for {}: {}", report.date, name, e);
							bad_dates += 1;
							continue
						},
					};
					records.push(CaseRecord{
						adm1_pcode: index.parent_of(&adm2).cloned().unwrap_or_default(),
						adm2_pcode: adm2,
						date,
						confirmed: report.confirmed.filter(|_| cfg.cases),
						dead: report.dead.filter(|_| cfg.deaths),
					});
				}
				unresolved.report("admin-2");
			},
		}
		if bad_dates > 0 {
			warn!("dropped {} report rows with unparseable dates (format {:?})", bad_dates, cfg.date_format);
		}

		if cfg.cases {
			Conservation::new(
				sum_metric(reports.iter().map(|r| r.confirmed)),
				sum_metric(records.iter().map(|r| r.confirmed)),
			).check("confirmed cases", cfg.conservation_tolerance);
		}
		if cfg.deaths {
			Conservation::new(
				sum_metric(reports.iter().map(|r| r.dead)),
				sum_metric(records.iter().map(|r| r.dead)),
			).check("deaths", cfg.conservation_tolerance);
		}

		let table = Self{records};
		let table = if cfg.cumulative {
			table.reconciled()
		} else {
			info!("calculating cumulative numbers of COVID data");
			table.cumulated()
		};
		table.check_non_decreasing();
		table
	}

	/// Sums same-day reports per unit and turns the daily values into
	/// running totals, ordered by date.
	pub fn cumulated(self) -> Self {
		let (start, last) = match self.date_range() {
			Some(r) => r,
			None => return self,
		};
		let mut daily: TimeSeries<(Pcode, Metric), f64> = TimeSeries::new(start, last);
		let mut reported: BTreeMap<(NaiveDate, Pcode), (Pcode, bool, bool)> = BTreeMap::new();
		for rec in self.records.iter() {
			let i = match daily.date_index(rec.date) {
				Some(i) => i,
				None => continue,
			};
			for metric in [Metric::Confirmed, Metric::Dead].iter() {
				if let Some(v) = rec.value(*metric) {
					daily.get_or_create((rec.adm2_pcode.clone(), *metric))[i] += v;
				}
			}
			let entry = reported.entry((rec.date, rec.adm2_pcode.clone()))
				.or_insert_with(|| (rec.adm1_pcode.clone(), false, false));
			entry.1 |= rec.confirmed.is_some();
			entry.2 |= rec.dead.is_some();
		}
		daily.cumsum();

		let records = reported.into_iter().map(|((date, adm2), (adm1, has_confirmed, has_dead))| {
			let value = |metric: Metric, present: bool| -> Option<f64> {
				if !present {
					return None
				}
				let i = daily.date_index(date)?;
				daily.get_value(&(adm2.clone(), metric), i)
			};
			CaseRecord{
				confirmed: value(Metric::Confirmed, has_confirmed),
				dead: value(Metric::Dead, has_dead),
				adm1_pcode: adm1,
				adm2_pcode: adm2,
				date,
			}
		}).collect();
		Self{records}
	}

	/// One record per unit and day for sources which already report running
	/// totals. Later reports win per metric; records are ordered by date.
	pub fn reconciled(self) -> Self {
		let mut latest: BTreeMap<(NaiveDate, Pcode), CaseRecord> = BTreeMap::new();
		let mut duplicates = 0usize;
		for rec in self.records.into_iter() {
			match latest.get_mut(&(rec.date, rec.adm2_pcode.clone())) {
				Some(existing) => {
					duplicates += 1;
					existing.confirmed = rec.confirmed.or(existing.confirmed);
					existing.dead = rec.dead.or(existing.dead);
				},
				None => {
					latest.insert((rec.date, rec.adm2_pcode.clone()), rec);
				},
			}
		}
		if duplicates > 0 {
			debug!("{} cumulative reports repeated an earlier unit and day, kept the later ones", duplicates);
		}
		Self{records: latest.into_iter().map(|(_, rec)| rec).collect()}
	}

	/// Warns about units whose running totals go down.
	fn check_non_decreasing(&self) {
		let (start, last) = match self.date_range() {
			Some(r) => r,
			None => return,
		};
		let series = self.observations(start, last).interpolated();
		let mut decreasing: Vec<&(Pcode, Metric)> = series.keys()
			.filter(|k| !series.is_non_decreasing(*k))
			.collect();
		decreasing.sort();
		for (pcode, metric) in decreasing {
			warn!("cumulative {:?} counts of {} decrease over time", metric, pcode);
		}
	}

	pub fn records(&self) -> &[CaseRecord] {
		&self.records
	}

	pub fn len(&self) -> usize {
		self.records.len()
	}

	pub fn date_range(&self) -> Option<(NaiveDate, NaiveDate)> {
		let first = self.records.iter().map(|r| r.date).min()?;
		let last = self.records.iter().map(|r| r.date).max()?;
		Some((first, last))
	}

	/// Observed values on the axis `start..=last`, keyed by unit and metric.
	pub fn observations(&self, start: NaiveDate, last: NaiveDate) -> Observations<(Pcode, Metric)> {
		let mut obs = Observations::new(start, last);
		for rec in self.records.iter() {
			let i = match obs.date_index(rec.date) {
				Some(i) => i,
				None => continue,
			};
			for metric in [Metric::Confirmed, Metric::Dead].iter() {
				if let Some(v) = rec.value(*metric) {
					obs.get_or_create_with((rec.adm2_pcode.clone(), *metric), None)[i] = Some(v);
				}
			}
		}
		obs
	}

	pub fn write<W: io::Write>(&self, w: W, provenance: &Provenance) -> Result<()> {
		let mut w = csv::Writer::from_writer(w);
		for rec in self.records.iter() {
			w.serialize(CaseOutputRow{
				adm1_pcode: &rec.adm1_pcode,
				adm2_pcode: &rec.adm2_pcode,
				date: rec.date,
				confirmed: rec.confirmed,
				dead: rec.dead,
				created_at: &provenance.created_at,
				created_by: &provenance.created_by,
			})?;
		}
		w.flush()?;
		Ok(())
	}

	pub fn load<R: io::Read>(r: R) -> Result<Self> {
		let mut r = csv::Reader::from_reader(r);
		let mut records = Vec::new();
		for rec in r.deserialize() {
			let rec: CaseRecord = rec?;
			records.push(rec);
		}
		Ok(Self{records})
	}
}

/// Boundary rows whose admin-1 level is replaced by the federal state the
/// admin-1 name maps to. Unmapped names stand for themselves.
fn federal_state_rows(boundaries: &[BoundaryRow], name_field: &str, states: &BTreeMap<String, String>) -> Vec<BoundaryRow> {
	boundaries.iter().map(|row| {
		let name = row.name(name_field).map(|n| n.as_str()).unwrap_or("");
		let state: SmartString = match states.get(name) {
			Some(s) => s.as_str().into(),
			None => name.into(),
		};
		let mut names = BTreeMap::new();
		names.insert(name_field.to_string(), state.clone());
		BoundaryRow{
			adm0_pcode: row.adm0_pcode.clone(),
			adm1_pcode: state,
			adm2_pcode: row.adm2_pcode.clone(),
			names,
		}
	}).collect()
}


#[cfg(test)]
mod tests {
	use super::*;
	use crate::admin::{Gender, Sadd};
	use crate::config::Config;
	use crate::index::tests::row;

	fn pop(entries: &[(&str, f64)]) -> PopulationTable {
		let mut t = PopulationTable::new();
		for (pcode, total) in entries {
			let mut s = Sadd::zero();
			s.set(Gender::Female, 3, *total);
			t.insert((*pcode).into(), s);
		}
		t
	}

	fn boundaries() -> Vec<BoundaryRow> {
		vec![
			row("AF01", "Kabul", "AF0101", "Kabul"),
			row("AF01", "Kabul", "AF0102", "Paghman"),
			row("AF02", "Kapisa", "AF0201", "Mahmud Raqi"),
		]
	}

	fn covid_config(section: &str) -> (CovidConfig, AdminConfig) {
		let cfg = Config::from_str(&format!("AFG:\n  covid:\n{}", section)).unwrap();
		let c = cfg.country("AFG").unwrap();
		(c.covid.unwrap(), c.admin)
	}

	#[test]
	fn coercion() {
		assert_eq!(coerce_number("1,234"), 1234.);
		assert_eq!(coerce_number("-"), 0.);
		assert_eq!(coerce_number("\u{2014}"), 0.);
		assert_eq!(coerce_number(""), 0.);
		assert_eq!(coerce_number("n/a"), 0.);
		assert_eq!(coerce_number(" 17 "), 17.);
		assert_eq!(coerce_number(" \u{2013} "), 0.);
		assert_eq!(coerce_number("2.5e-05"), 2.5e-05);
		assert_eq!(coerce_number("-5"), -5.);
	}

	#[test]
	fn admin1_source_is_disaggregated_by_population() {
		let (cfg, admin) = covid_config(
			"    filename: afg.csv\n    admin_level: 1\n    deaths: false\n    hlx_dict:\n      Province: '#adm1+name'\n      Cases: '#affected+infected+confirmed+total'\n      Date: '#date'\n    replace_dict:\n      Kabol: Kabul\n"
		);
		let data = "Province,Cases,Date\nKabol Province,50,2020-04-01\nTotal,\"1,000\",2020-04-01\nAtlantis,3,2020-04-01\n";
		let reports = read_reports(data.as_bytes(), &cfg).unwrap();
		assert_eq!(reports.len(), 2);
		let table = CaseTable::normalize(&reports, &cfg, &admin, &boundaries(), &pop(&[("AF0101", 300.), ("AF0102", 700.), ("AF0201", 10.)]));
		assert_eq!(table.len(), 2);
		let by_adm2: BTreeMap<&str, f64> = table.records().iter().map(|r| (r.adm2_pcode.as_str(), r.confirmed.unwrap())).collect();
		assert!((by_adm2["AF0101"] - 15.).abs() < 1e-9);
		assert!((by_adm2["AF0102"] - 35.).abs() < 1e-9);
		assert!(table.records().iter().all(|r| r.adm1_pcode.as_str() == "AF01" && r.dead.is_none()));
	}

	#[test]
	fn incremental_reports_become_cumulative() {
		let (cfg, admin) = covid_config(
			"    filename: afg.csv\n    admin_level: 2\n    cumulative: false\n    date_format: '%d/%m/%Y'\n    hlx_dict:\n      District: '#adm2+name'\n      New: '#affected+infected+confirmed+total'\n      Dead: '#affected+infected+dead+total'\n      Day: '#date'\n"
		);
		let data = "District,New,Dead,Day\n\
			Paghman,3,0,02/04/2020\n\
			Paghman,2,1,01/04/2020\n\
			Paghman,1,-,02/04/2020\n\
			Mahmud Raqi,\"1,000\",2,01/04/2020\n\
			Paghman,0,0,03/04/2020\n";
		let reports = read_reports(data.as_bytes(), &cfg).unwrap();
		let table = CaseTable::normalize(&reports, &cfg, &admin, &boundaries(), &pop(&[]));
		let paghman: Vec<(NaiveDate, f64, f64)> = table.records().iter()
			.filter(|r| r.adm2_pcode.as_str() == "AF0102")
			.map(|r| (r.date, r.confirmed.unwrap(), r.dead.unwrap()))
			.collect();
		assert_eq!(paghman, vec![
			(NaiveDate::from_ymd_opt(2020, 4, 1).unwrap(), 2., 1.),
			(NaiveDate::from_ymd_opt(2020, 4, 2).unwrap(), 6., 1.),
			(NaiveDate::from_ymd_opt(2020, 4, 3).unwrap(), 6., 1.),
		]);
		let mr = table.records().iter().find(|r| r.adm2_pcode.as_str() == "AF0201").unwrap();
		assert_eq!(mr.confirmed, Some(1000.));
		assert_eq!(mr.adm1_pcode.as_str(), "AF02");
		let dates: Vec<NaiveDate> = table.records().iter().map(|r| r.date).collect();
		let mut sorted = dates.clone();
		sorted.sort();
		assert_eq!(dates, sorted);
	}

	#[test]
	fn cumulative_reports_keep_one_row_per_day() {
		let (cfg, admin) = covid_config(
			"    filename: afg.csv\n    admin_level: 1\n    deaths: false\n"
		);
		let data = "#adm1+name,#affected+infected+confirmed+total,#date\n\
			Kabul,10,2020-04-02\n\
			Kabul,4,2020-04-01\n\
			Kabul,6,2020-04-02\n";
		let reports = read_reports(data.as_bytes(), &cfg).unwrap();
		let table = CaseTable::normalize(&reports, &cfg, &admin, &boundaries(), &pop(&[("AF0101", 300.), ("AF0102", 700.)]));
		let kabul: Vec<(NaiveDate, f64)> = table.records().iter()
			.filter(|r| r.adm2_pcode.as_str() == "AF0101")
			.map(|r| (r.date, r.confirmed.unwrap()))
			.collect();
		assert_eq!(kabul.len(), 2);
		assert_eq!(kabul[0].0, NaiveDate::from_ymd_opt(2020, 4, 1).unwrap());
		assert!((kabul[0].1 - 1.2).abs() < 1e-9);
		assert_eq!(kabul[1].0, NaiveDate::from_ymd_opt(2020, 4, 2).unwrap());
		assert!((kabul[1].1 - 1.8).abs() < 1e-9);
		assert_eq!(table.len(), 4);
	}

	#[test]
	fn case_lines_are_tallied() {
		let (cfg, admin) = covid_config(
			"    filename: afg.csv\n    admin_level: 2\n    individual_case_data: true\n    deaths: false\n    cumulative: false\n    hlx_dict:\n      Case No.: id\n"
		);
		let data = "Case No.,#date,#adm1+name,#adm2+name\n1,2020-04-01,Kabul,Paghman\n2,2020-04-01,Kabul,Paghman\n3,2020-04-02,Kabul,Paghman\n4,2020-04-02,Kabul,Kabul\n";
		let reports = read_reports(data.as_bytes(), &cfg).unwrap();
		assert_eq!(reports.len(), 3);
		let table = CaseTable::normalize(&reports, &cfg, &admin, &boundaries(), &pop(&[]));
		let last = table.records().iter().filter(|r| r.adm2_pcode.as_str() == "AF0102").last().unwrap();
		assert_eq!(last.confirmed, Some(3.));
	}

	#[test]
	fn federal_states_restore_real_adm1() {
		let (cfg, admin) = covid_config(
			"    filename: som.csv\n    admin_level: 1\n    deaths: false\n    federal_state_dict:\n      Kabul: North\n      Kapisa: North\n"
		);
		let data = "#adm1+name,#affected+infected+confirmed+total,#date\nNorth,100,2020-04-01\n";
		let reports = read_reports(data.as_bytes(), &cfg).unwrap();
		let table = CaseTable::normalize(&reports, &cfg, &admin, &boundaries(), &pop(&[("AF0101", 1.), ("AF0102", 1.), ("AF0201", 2.)]));
		let by_adm2: BTreeMap<&str, (&str, f64)> = table.records().iter()
			.map(|r| (r.adm2_pcode.as_str(), (r.adm1_pcode.as_str(), r.confirmed.unwrap())))
			.collect();
		assert_eq!(by_adm2["AF0101"], ("AF01", 25.));
		assert_eq!(by_adm2["AF0201"], ("AF02", 50.));
	}

	#[test]
	fn unresolved_rows_are_dropped() {
		let (cfg, admin) = covid_config(
			"    filename: afg.csv\n    admin_level: 2\n    deaths: false\n"
		);
		let data = "#adm2+name,#affected+infected+confirmed+total,#date\nNowhere,5,2020-04-01\nPaghman,7,2020-04-01\n";
		let reports = read_reports(data.as_bytes(), &cfg).unwrap();
		let table = CaseTable::normalize(&reports, &cfg, &admin, &boundaries(), &pop(&[]));
		assert_eq!(table.len(), 1);
		assert_eq!(table.records()[0].adm2_pcode.as_str(), "AF0102");
	}

	#[test]
	fn write_and_load_keep_hxl_columns() {
		let table = CaseTable::new(vec![CaseRecord{
			adm1_pcode: "AF01".into(),
			adm2_pcode: "AF0102".into(),
			date: NaiveDate::from_ymd_opt(2020, 4, 1).unwrap(),
			confirmed: Some(4.),
			dead: None,
		}]);
		let mut buf = Vec::new();
		table.write(&mut buf, &Provenance{created_at: "now".into(), created_by: "me".into()}).unwrap();
		let text = String::from_utf8(buf.clone()).unwrap();
		assert!(text.starts_with("#adm1+pcode,#adm2+pcode,#date,#affected+infected+confirmed+total,#affected+infected+dead+total,created_at,created_by\n"));
		let again = CaseTable::load(&buf[..]).unwrap();
		assert_eq!(again.records(), table.records());
	}

	#[test]
	fn observations_on_axis() {
		let d = |day| NaiveDate::from_ymd_opt(2020, 4, day).unwrap();
		let table = CaseTable::new(vec![
			CaseRecord{adm1_pcode: "AF01".into(), adm2_pcode: "AF0101".into(), date: d(2), confirmed: Some(2.), dead: Some(0.)},
			CaseRecord{adm1_pcode: "AF01".into(), adm2_pcode: "AF0101".into(), date: d(4), confirmed: Some(6.), dead: None},
		]);
		assert_eq!(table.date_range(), Some((d(2), d(4))));
		let ts = table.observations(d(1), d(5)).interpolated();
		assert_eq!(ts.get(&("AF0101".into(), Metric::Confirmed)).unwrap(), &[0., 2., 4., 6., 6.]);
		assert_eq!(ts.get(&("AF0101".into(), Metric::Dead)).unwrap(), &[0., 0., 0., 0., 0.]);
	}
}
