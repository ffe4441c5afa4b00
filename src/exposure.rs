use std::collections::BTreeMap;
use std::io;

use log::{info, warn};

use smartstring::alias::{String as SmartString};

use super::admin::{parse_sadd_column, sadd_column, Gender, Pcode, PopulationTable, Sadd, N_AGE_CLASSES};
use super::config::{AdminConfig, NomadConfig, PopCoConfig};
use super::disagg::Conservation;
use super::error::{Error, Result};
use super::index::{AdminIndex, BoundaryRow, Unresolved};
use super::progress::{CountMeter, ProgressSink};
use super::Provenance;


static COL_TOT_WP: &'static str = "tot_pop_WP";
static COL_TOT_UN: &'static str = "tot_pop_UN";
static COL_AREA: &'static str = "area_km2";
static COL_TOT_SAD: &'static str = "tot_sad";
static COL_NOMADS: &'static str = "kuchi";
static COL_COMMENT: &'static str = "comment";


#[derive(Debug, Clone)]
pub struct ExposureRow {
	pub boundary: BoundaryRow,
	pub sadd: Sadd,
	pub tot_pop_wp: Option<f64>,
	pub tot_pop_un: Option<f64>,
	pub area_km2: Option<f64>,
	pub nomads: Option<f64>,
	pub comment: Option<String>,
}

impl ExposureRow {
	fn display_name(&self, admin: &AdminConfig) -> &str {
		self.boundary.name(&admin.adm2_name_field()).map(|s| s.as_str()).unwrap_or(self.boundary.adm2_pcode.as_str())
	}
}

/// Zonal statistics are machine-written; empty or unparseable cells are
/// absent.
fn optional_number(s: &str) -> Option<f64> {
	let s = s.trim();
	if s.is_empty() {
		return None
	}
	s.parse::<f64>().ok().filter(|v| v.is_finite())
}


/// Admin-2 population exposure table, one row per boundary unit.
#[derive(Debug, Clone)]
pub struct Exposure {
	admin: AdminConfig,
	name_columns: Vec<String>,
	rows: Vec<ExposureRow>,
}

impl Exposure {
	pub fn new(admin: AdminConfig, rows: Vec<ExposureRow>) -> Self {
		let mut name_columns: Vec<String> = rows.iter().flat_map(|r| r.boundary.names.keys().cloned()).collect();
		name_columns.sort();
		name_columns.dedup();
		Self{admin, name_columns, rows}
	}

	pub fn load<R: io::Read, S: ProgressSink + ?Sized>(s: &mut S, r: R, admin: &AdminConfig) -> Result<Self> {
		let mut r = csv::ReaderBuilder::new().flexible(true).from_reader(r);
		let headers = r.headers()?.clone();
		let find = |name: &str| headers.iter().position(|h| h == name);
		let adm0 = find(&admin.adm0_pcode);
		let adm1 = find(&admin.adm1_pcode).ok_or_else(|| Error::data(format!("exposure table lacks {} column", admin.adm1_pcode)))?;
		let adm2 = find(&admin.adm2_pcode).ok_or_else(|| Error::data(format!("exposure table lacks {} column", admin.adm2_pcode)))?;
		let tot_wp = find(COL_TOT_WP);
		let tot_un = find(COL_TOT_UN);
		let area = find(COL_AREA);
		let nomads = find(COL_NOMADS);
		let comment = find(COL_COMMENT);
		let mut sadd_cols = Vec::new();
		let mut name_cols = Vec::new();
		for (i, h) in headers.iter().enumerate() {
			if let Some((g, band)) = parse_sadd_column(h) {
				sadd_cols.push((i, g, band));
			} else if h.starts_with("ADM") && Some(i) != adm0 && i != adm1 && i != adm2 && !h.ends_with("_PCODE") {
				name_cols.push((i, h.to_string()));
			}
		}
		if sadd_cols.len() != Gender::ALL.len() * N_AGE_CLASSES {
			warn!("exposure table has {} of {} SADD columns, missing bands count as zero", sadd_cols.len(), Gender::ALL.len() * N_AGE_CLASSES);
		}

		let get = |rec: &csv::StringRecord, i: Option<usize>| -> Option<String> {
			i.and_then(|i| rec.get(i)).map(|s| s.to_string())
		};
		let mut rows = Vec::new();
		let mut pm = CountMeter::new(s, "exposure rows");
		for rec in r.records() {
			let rec = rec?;
			let mut sadd = Sadd::zero();
			for (i, g, band) in sadd_cols.iter() {
				sadd.set(*g, *band, rec.get(*i).and_then(optional_number).unwrap_or(0.));
			}
			let names: BTreeMap<String, SmartString> = name_cols.iter()
				.filter_map(|(i, h)| Some((h.clone(), SmartString::from(rec.get(*i)?.trim()))))
				.collect();
			rows.push(ExposureRow{
				boundary: BoundaryRow{
					adm0_pcode: get(&rec, adm0).filter(|s| !s.is_empty()).map(|s| s.into()),
					adm1_pcode: rec.get(adm1).unwrap_or("").trim().into(),
					adm2_pcode: rec.get(adm2).unwrap_or("").trim().into(),
					names,
				},
				sadd,
				tot_pop_wp: get(&rec, tot_wp).and_then(|s| optional_number(&s)),
				tot_pop_un: get(&rec, tot_un).and_then(|s| optional_number(&s)),
				area_km2: get(&rec, area).and_then(|s| optional_number(&s)),
				nomads: get(&rec, nomads).and_then(|s| optional_number(&s)),
				comment: get(&rec, comment).filter(|s| !s.is_empty()),
			});
			pm.tick();
		}
		pm.finish();
		Ok(Self::new(admin.clone(), rows))
	}

	pub fn rows(&self) -> &[ExposureRow] {
		&self.rows
	}

	pub fn admin(&self) -> &AdminConfig {
		&self.admin
	}

	pub fn boundaries(&self) -> Vec<BoundaryRow> {
		self.rows.iter().map(|r| r.boundary.clone()).collect()
	}

	pub fn index(&self, adm1_name_field: &str, adm2_name_field: &str) -> AdminIndex {
		AdminIndex::build(&self.boundaries(), adm1_name_field, adm2_name_field)
	}

	pub fn population(&self) -> PopulationTable {
		let mut t = PopulationTable::new();
		for row in self.rows.iter() {
			t.insert(row.boundary.adm2_pcode.clone(), row.sadd.clone());
		}
		t
	}

	/// Scales each unit's bands so they sum to the UN-adjusted total.
	pub fn rescale_to_totals(&mut self) {
		info!("scaling SADD data to match UN adjusted population estimates");
		let admin = self.admin.clone();
		for row in self.rows.iter_mut() {
			let target = match row.tot_pop_un {
				Some(v) => v,
				None => {
					warn!("no UN adjusted total for admin region {}, leaving SADD unscaled", row.display_name(&admin));
					continue
				},
			};
			let tot_sad = row.sadd.total();
			if !(tot_sad > 0.) {
				warn!("the sum across all genders and ages for admin region {} is 0", row.display_name(&admin));
				continue
			}
			row.sadd.scale(target / tot_sad);
		}
	}

	/// Scales admin-2 units so each admin-1 unit matches the country office
	/// figure. Units whose admin-1 has no figure stay unscaled.
	pub fn scale_to_operational(&mut self, figures: &[(String, f64)], index: &AdminIndex, cfg: &PopCoConfig) {
		info!("further scaling SADD data to match country office estimates");
		let mut unresolved = Unresolved::new();
		let mut co_totals: BTreeMap<Pcode, f64> = BTreeMap::new();
		for (name, pop) in figures.iter() {
			let normalized = cfg.normalizer.normalize(name);
			match index.lookup_adm1(&normalized) {
				Some(pcode) => *co_totals.entry(pcode.clone()).or_insert(0.) += *pop,
				None => unresolved.note(&normalized, "country office figures"),
			}
		}
		unresolved.report("country office province");

		let mut sadd_totals: BTreeMap<Pcode, f64> = BTreeMap::new();
		for row in self.rows.iter() {
			*sadd_totals.entry(row.boundary.adm1_pcode.clone()).or_insert(0.) += row.sadd.total();
		}
		for row in self.rows.iter_mut() {
			let adm1 = &row.boundary.adm1_pcode;
			let (co, sad) = match (co_totals.get(adm1), sadd_totals.get(adm1)) {
				(Some(co), Some(sad)) if *sad > 0. => (*co, *sad),
				_ => {
					warn!("no usable country office figure for {}, leaving {} unscaled", adm1, row.boundary.adm2_pcode);
					continue
				},
			};
			row.sadd.scale(co / sad);
		}
	}

	/// Distributes a nomadic population over the listed admin-1 units,
	/// weighted by each band's share of their combined population.
	pub fn add_nomads(&mut self, cfg: &NomadConfig) {
		info!("adding {} nomads to {} admin-1 units", cfg.total, cfg.adm1.len());
		let in_scope = |row: &ExposureRow| cfg.adm1.iter().any(|p| p.as_str() == row.boundary.adm1_pcode.as_str());
		let pop_in_scope: f64 = self.rows.iter().filter(|r| in_scope(*r)).map(|r| r.sadd.total()).sum();
		if !(pop_in_scope > 0.) {
			warn!("no population in nomad admin-1 units {:?}, nothing added", cfg.adm1);
			return
		}
		let mut added_total = 0.;
		for row in self.rows.iter_mut() {
			if !in_scope(row) {
				continue
			}
			let mut added = 0.;
			for g in Gender::ALL.iter() {
				for band in 0..N_AGE_CLASSES {
					let v = row.sadd.get(*g, band);
					let extra = cfg.total * v / pop_in_scope;
					row.sadd.set(*g, band, v + extra);
					added += extra;
				}
			}
			row.nomads = Some(added);
			row.comment = Some(format!("Added in total {} Kuchi nomads to WorldPop estimates", added));
			added_total += added;
		}
		Conservation::new(cfg.total, added_total).check("nomad population", 1e-6 * cfg.total.max(1.));
	}

	pub fn write<W: io::Write>(&self, w: W, provenance: &Provenance) -> Result<()> {
		let mut w = csv::Writer::from_writer(w);
		let mut header: Vec<String> = vec![
			self.admin.adm0_pcode.clone(),
			self.admin.adm1_pcode.clone(),
			self.admin.adm2_pcode.clone(),
		];
		header.extend(self.name_columns.iter().cloned());
		for g in Gender::ALL.iter() {
			for band in 0..N_AGE_CLASSES {
				header.push(sadd_column(*g, band));
			}
		}
		for h in [COL_TOT_WP, COL_TOT_UN, COL_AREA, COL_TOT_SAD, COL_NOMADS, COL_COMMENT, "created_at", "created_by"].iter() {
			header.push(h.to_string());
		}
		w.write_record(&header)?;

		let fmt = |v: Option<f64>| v.map(|v| v.to_string()).unwrap_or_default();
		for row in self.rows.iter() {
			let b = &row.boundary;
			let mut rec: Vec<String> = vec![
				b.adm0_pcode.as_ref().map(|s| s.to_string()).unwrap_or_default(),
				b.adm1_pcode.to_string(),
				b.adm2_pcode.to_string(),
			];
			for col in self.name_columns.iter() {
				rec.push(b.names.get(col).map(|s| s.to_string()).unwrap_or_default());
			}
			for g in Gender::ALL.iter() {
				rec.extend(row.sadd.bands(*g).iter().map(|v| v.to_string()));
			}
			rec.push(fmt(row.tot_pop_wp));
			rec.push(fmt(row.tot_pop_un));
			rec.push(fmt(row.area_km2));
			rec.push(row.sadd.total().to_string());
			rec.push(fmt(row.nomads));
			rec.push(row.comment.clone().unwrap_or_default());
			rec.push(provenance.created_at.clone());
			rec.push(provenance.created_by.clone());
			w.write_record(&rec)?;
		}
		w.flush()?;
		Ok(())
	}
}


/// Country office population figures as `(province name, population)`.
pub fn load_operational_figures<R: io::Read>(r: R, cfg: &PopCoConfig) -> Result<Vec<(String, f64)>> {
	let mut r = csv::ReaderBuilder::new().flexible(true).from_reader(r);
	let headers = r.headers()?.clone();
	let province = headers.iter().position(|h| h == cfg.province_column)
		.ok_or_else(|| Error::data(format!("missing column {:?} in country office figures", cfg.province_column)))?;
	let population = headers.iter().position(|h| h == cfg.population_column)
		.ok_or_else(|| Error::data(format!("missing column {:?} in country office figures", cfg.population_column)))?;
	let mut result = Vec::new();
	for rec in r.records() {
		let rec = rec?;
		let name = rec.get(province).unwrap_or("").to_string();
		if name.trim().is_empty() {
			continue
		}
		let figure: String = rec.get(population).unwrap_or("").chars().filter(|c| *c != ',').collect();
		result.push((name, optional_number(&figure).unwrap_or(0.)));
	}
	Ok(result)
}


#[cfg(test)]
mod tests {
	use super::*;
	use crate::names::NameNormalizer;
	use crate::progress::NullSink;

	fn header() -> String {
		let mut h = vec!["ADM0_PCODE".to_string(), "ADM1_PCODE".into(), "ADM2_PCODE".into(), "ADM1_EN".into(), "ADM2_EN".into()];
		for g in Gender::ALL.iter() {
			for band in 0..N_AGE_CLASSES {
				h.push(sadd_column(*g, band));
			}
		}
		h.push("tot_pop_UN".into());
		h.push("area_km2".into());
		h.join(",")
	}

	fn line(adm1: &str, adm1_name: &str, adm2: &str, adm2_name: &str, per_band: f64, un: &str) -> String {
		let mut l = vec!["AF".to_string(), adm1.into(), adm2.into(), adm1_name.into(), adm2_name.into()];
		for _ in 0..(2 * N_AGE_CLASSES) {
			l.push(per_band.to_string());
		}
		l.push(un.into());
		l.push("10".into());
		l.join(",")
	}

	fn sample() -> Exposure {
		let csv = vec![
			header(),
			line("AF01", "Kabul", "AF0101", "Kabul", 1., "72"),
			line("AF01", "Kabul", "AF0102", "Paghman", 2., "36"),
			line("AF02", "Kapisa", "AF0201", "Mahmud Raqi", 0., "50"),
		].join("\n");
		Exposure::load(&mut NullSink, csv.as_bytes(), &AdminConfig::default()).unwrap()
	}

	#[test]
	fn loads_rows_and_population() {
		let e = sample();
		assert_eq!(e.rows().len(), 3);
		let pop = e.population();
		assert_eq!(pop.total("AF0101"), Some(36.));
		assert_eq!(pop.total("AF0102"), Some(72.));
		let idx = e.index("ADM1_EN", "ADM2_EN");
		assert_eq!(idx.lookup_adm2("Paghman").map(|p| p.as_str()), Some("AF0102"));
		assert_eq!(e.rows()[0].area_km2, Some(10.));
	}

	#[test]
	fn rescale_matches_un_totals_and_skips_zero() {
		let mut e = sample();
		e.rescale_to_totals();
		let pop = e.population();
		assert!((pop.total("AF0101").unwrap() - 72.).abs() < 1e-9);
		assert!((pop.total("AF0102").unwrap() - 36.).abs() < 1e-9);
		assert_eq!(pop.total("AF0201"), Some(0.));
	}

	#[test]
	fn operational_scaling_per_adm1() {
		let mut e = sample();
		let idx = e.index("ADM1_EN", "ADM2_EN");
		let cfg = PopCoConfig{
			filename: "co.csv".into(),
			province_column: "Province".into(),
			population_column: "Population".into(),
			normalizer: NameNormalizer::default(),
		};
		let figures = load_operational_figures("Province,Population\nKabul Province,\"216\"\nNowhere,5\n".as_bytes(), &cfg).unwrap();
		assert_eq!(figures.len(), 2);
		e.scale_to_operational(&figures, &idx, &cfg);
		let pop = e.population();
		// 36 + 72 = 108 scaled to 216
		assert!((pop.total("AF0101").unwrap() - 72.).abs() < 1e-9);
		assert!((pop.total("AF0102").unwrap() - 144.).abs() < 1e-9);
	}

	#[test]
	fn nomads_are_population_weighted() {
		let mut e = sample();
		let before: f64 = e.rows().iter().map(|r| r.sadd.total()).sum();
		e.add_nomads(&NomadConfig{adm1: vec!["AF01".into()], total: 54.});
		let pop = e.population();
		let after: f64 = e.rows().iter().map(|r| r.sadd.total()).sum();
		assert!((after - before - 54.).abs() < 1e-9);
		assert!((pop.total("AF0101").unwrap() - 54.).abs() < 1e-9);
		assert!((pop.total("AF0102").unwrap() - 108.).abs() < 1e-9);
		assert_eq!(e.rows()[2].nomads, None);
		assert!(e.rows()[0].comment.is_some());
	}

	#[test]
	fn exponent_notation_is_kept() {
		let csv = vec![
			header(),
			line("AF01", "Kabul", "AF0101", "Kabul", 1., "1.5e-05"),
		].join("\n").replacen(",1,", ",2.5e-05,", 1);
		let e = Exposure::load(&mut NullSink, csv.as_bytes(), &AdminConfig::default()).unwrap();
		let row = &e.rows()[0];
		assert_eq!(row.sadd.get(Gender::Female, 0), 2.5e-05);
		assert_eq!(row.sadd.get(Gender::Female, 1), 1.);
		assert_eq!(row.tot_pop_un, Some(1.5e-05));
	}

	#[test]
	fn write_then_load_keeps_population() {
		let e = sample();
		let mut buf = Vec::new();
		let prov = Provenance{created_at: "now".into(), created_by: "tester".into()};
		e.write(&mut buf, &prov).unwrap();
		let again = Exposure::load(&mut NullSink, &buf[..], &AdminConfig::default()).unwrap();
		assert_eq!(again.population().total("AF0102"), Some(72.));
		assert_eq!(again.rows()[1].boundary.name("ADM2_EN").map(|s| s.as_str()), Some("Paghman"));
	}
}
