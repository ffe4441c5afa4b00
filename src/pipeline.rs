use std::collections::BTreeMap;
use std::panic;
use std::path::{Path, PathBuf};

use log::{error, info, warn};

use chrono::NaiveDate;

use super::cases::{read_reports, CaseTable};
use super::config::{Config, CountryConfig, Layout};
use super::error::{Error, Result};
use super::exposure::{load_operational_figures, Exposure};
use super::fetch;
use super::graph::{read_contact_matrix, read_vulnerability, Graph};
use super::ioutil::{open_artifact, write_atomic};
use super::npi::{apply_removals, load_overrides, read_raw_npis, LocationType, MeasureEquivalence, NpiSources, NpiTable};
use super::progress::ProgressSink;
use super::Provenance;


#[derive(Debug, Clone)]
pub struct RunOptions {
	/// Refresh remote sources before reading them.
	pub download: bool,
	/// Open-ended NPI records last until this date.
	pub run_date: NaiveDate,
	/// Mobility table path with `{iso3}` standing for the country code.
	pub mobility_pattern: Option<String>,
}

impl RunOptions {
	pub fn mobility_path(&self, iso3: &str) -> Option<PathBuf> {
		self.mobility_pattern.as_ref().map(|p| PathBuf::from(p.replace("{iso3}", iso3)))
	}
}


/// Command line of the stage binaries: `[-d] [-m PATTERN] [ISO3...]`.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct CliArgs {
	pub download: bool,
	pub mobility_pattern: Option<String>,
	pub countries: Vec<String>,
}

impl CliArgs {
	pub fn parse<I: IntoIterator<Item = String>>(argv: I) -> Result<Self> {
		let mut result = Self::default();
		let mut argv = argv.into_iter();
		while let Some(arg) = argv.next() {
			match arg.as_str() {
				"-d" | "--download" => result.download = true,
				"-m" | "--mobility" => match argv.next() {
					Some(p) => result.mobility_pattern = Some(p),
					None => return Err(Error::config("-m needs a mobility file pattern")),
				},
				other if other.starts_with('-') => return Err(Error::config(format!("unknown option {}", other))),
				other => result.countries.push(other.to_uppercase()),
			}
		}
		Ok(result)
	}

	/// The given countries, or all configured ones if none were given.
	pub fn countries_or_all(&self, config: &Config) -> Vec<String> {
		if self.countries.is_empty() {
			config.countries().cloned().collect()
		} else {
			self.countries.clone()
		}
	}

	pub fn options(&self, run_date: NaiveDate) -> RunOptions {
		RunOptions{
			download: self.download,
			run_date,
			mobility_pattern: self.mobility_pattern.clone(),
		}
	}
}


fn load_exposure<S: ProgressSink + ?Sized>(s: &mut S, layout: &Layout, country: &CountryConfig) -> Result<Exposure> {
	let path = layout.exposure(&country.iso3);
	info!("reading exposure from {}", path.display());
	Exposure::load(s, open_artifact(&path)?, &country.admin)
}


pub fn generate_exposure<S: ProgressSink + ?Sized>(s: &mut S, layout: &Layout, country: &CountryConfig) -> Result<PathBuf> {
	let iso3 = &country.iso3;
	let input = layout.zonal_stats(iso3);
	info!("reading zonal statistics for {} from {}", iso3, input.display());
	let mut exposure = Exposure::load(s, open_artifact(&input)?, &country.admin)?;
	exposure.rescale_to_totals();
	if let Some(pop_co) = &country.pop_co {
		let figures = load_operational_figures(open_artifact(layout.co_population(iso3, &pop_co.filename))?, pop_co)?;
		let index = exposure.index(&country.admin.adm1_name_field(), &country.admin.adm2_name_field());
		exposure.scale_to_operational(&figures, &index, pop_co);
	}
	if let Some(nomads) = &country.nomads {
		exposure.add_nomads(nomads);
	}
	let output = layout.exposure(iso3);
	let provenance = Provenance::now();
	write_atomic(&output, |w| exposure.write(w, &provenance))?;
	info!("wrote exposure to {}", output.display());
	Ok(output)
}


pub fn generate_covid<S: ProgressSink + ?Sized>(s: &mut S, layout: &Layout, country: &CountryConfig, download: bool) -> Result<PathBuf> {
	let iso3 = &country.iso3;
	let cfg = match &country.covid {
		Some(c) => c,
		None => return Err(Error::config(format!("no covid section for {}", iso3))),
	};
	let input = layout.covid_input(iso3, &cfg.filename);
	if download {
		match &cfg.url {
			Some(url) => {
				info!("getting COVID data for {}", iso3);
				fetch::Client::new().refresh(url, &input);
			},
			None => warn!("download requested but no url configured for {}", iso3),
		}
	}
	let exposure = match load_exposure(s, layout, country) {
		Ok(e) => e,
		Err(e) => {
			error!("cannot get exposure file for {}, COVID file not generated", iso3);
			return Err(e)
		},
	};
	info!("reading COVID reports from {}", input.display());
	let reports = read_reports(open_artifact(&input)?, cfg)?;
	let table = CaseTable::normalize(&reports, cfg, &country.admin, &exposure.boundaries(), &exposure.population());
	if let Some((first, last)) = table.date_range() {
		info!("COVID data for {} from {} to {}", iso3, first, last);
	}
	let output = layout.covid(iso3);
	let provenance = Provenance::now();
	write_atomic(&output, |w| table.write(w, &provenance))?;
	info!("wrote {} COVID records to {}", table.len(), output.display());
	Ok(output)
}


pub fn generate_npis<S: ProgressSink + ?Sized>(s: &mut S, layout: &Layout, country: &CountryConfig, run_date: NaiveDate) -> Result<PathBuf> {
	let iso3 = &country.iso3;
	let exposure = load_exposure(s, layout, country)?;
	let index = exposure.index(&country.admin.adm1_name_field(), &country.admin.adm2_name_field());
	let equivalence = MeasureEquivalence::load(open_artifact(layout.npi_measure_equivalence())?)?;
	let overrides = match open_artifact(layout.npi_overrides(iso3)) {
		Ok(r) => load_overrides(r)?,
		Err(e) if e.is_missing() => {
			info!("no manual NPI overrides for {}", iso3);
			BTreeMap::new()
		},
		Err(e) => return Err(e),
	};
	let rows = read_raw_npis(open_artifact(layout.npi_dataset())?)?;
	let sources = NpiSources{
		iso3: country.npi_iso3(),
		equivalence: &equivalence,
		overrides: &overrides,
		index: &index,
		normalizer: &country.npi_normalizer,
	};
	let records = apply_removals(sources.ingest(&rows));
	let table = NpiTable::from_records(run_date, index.adm2_pcodes(), records.iter());
	let output = layout.npis(iso3);
	write_atomic(&output, |w| table.write(w))?;
	info!("wrote NPI table ({} days from {}) to {}", table.len(), table.start(), output.display());
	Ok(output)
}


/// Runs an enrichment pass. A missing input file skips the pass, any other
/// failure aborts the graph.
fn enrich<T, L, A>(what: &str, load: L, apply: A) -> Result<()>
	where L: FnOnce() -> Result<T>,
	      A: FnOnce(T) -> Result<()>,
{
	match load() {
		Ok(v) => apply(v),
		Err(e) if e.is_missing() => {
			error!("{}: {}, skipping this pass", what, e);
			Ok(())
		},
		Err(e) => Err(e),
	}
}


pub fn generate_graph<S: ProgressSink + ?Sized>(s: &mut S, layout: &Layout, country: &CountryConfig, mobility: &Path) -> Result<PathBuf> {
	let iso3 = &country.iso3;
	let policy = country.graph.key_policy;
	info!("creating graph for {}", iso3);
	info!("reading in mobility from {}", mobility.display());
	let mut graph = Graph::initialize_with_mobility(open_artifact(mobility)?, iso3)?;

	enrich("exposure",
		|| load_exposure(s, layout, country),
		|e| graph.add_exposure(&e, &country.admin, policy),
	)?;
	enrich("COVID cases",
		|| CaseTable::load(open_artifact(layout.covid(iso3))?),
		|t| graph.add_covid(&t, policy),
	)?;
	enrich("vulnerability",
		|| read_vulnerability(open_artifact(layout.vulnerability(iso3))?),
		|v| graph.add_vulnerability(&v, policy),
	)?;
	match &country.contact_matrix {
		Some(cm) => {
			info!("reading in contact matrices for {}", cm.country);
			for location in LocationType::ALL.iter() {
				enrich(location.label(),
					|| read_contact_matrix(open_artifact(layout.contact_matrix(cm, location.label()))?, cm.file_number),
					|m| {
						graph.add_contact_matrix(*location, m);
						Ok(())
					},
				)?;
			}
		},
		None => warn!("no contact matrix configured for {}", iso3),
	}
	enrich("NPIs",
		|| NpiTable::load(open_artifact(layout.npis(iso3))?),
		|t| match t {
			Some(t) => graph.add_npis(&t, policy),
			None => {
				warn!("NPI table for {} is empty", iso3);
				Ok(())
			},
		},
	)?;

	let output = layout.graph(iso3);
	write_atomic(&output, |w| graph.write(w))?;
	info!("wrote out to {}", output.display());
	Ok(output)
}


/// Every stage of one country, in dependency order. Stages without the
/// configuration they need are skipped.
pub fn run_country<S: ProgressSink + ?Sized>(s: &mut S, layout: &Layout, config: &Config, iso3: &str, opts: &RunOptions) -> Result<()> {
	let country = config.country(iso3)?;
	generate_exposure(s, layout, &country)?;
	if country.covid.is_some() {
		if let Err(e) = generate_covid(s, layout, &country, opts.download) {
			error!("COVID stage for {} failed: {}", iso3, e);
		}
	}
	if let Err(e) = generate_npis(s, layout, &country, opts.run_date) {
		error!("NPI stage for {} failed: {}", iso3, e);
	}
	match opts.mobility_path(iso3) {
		Some(path) => { generate_graph(s, layout, &country, &path)?; },
		None => warn!("no mobility table given, graph for {} not generated", iso3),
	}
	Ok(())
}


#[derive(Debug, Clone, Default)]
pub struct BatchReport {
	pub succeeded: Vec<String>,
	pub failed: Vec<(String, String)>,
}

impl BatchReport {
	pub fn is_success(&self) -> bool {
		self.failed.is_empty()
	}
}

fn panic_message(payload: &(dyn std::any::Any + Send)) -> String {
	if let Some(s) = payload.downcast_ref::<&str>() {
		s.to_string()
	} else if let Some(s) = payload.downcast_ref::<String>() {
		s.clone()
	} else {
		"unknown panic".to_string()
	}
}

/// Runs `f` for each country. Errors and panics are logged and recorded,
/// and the remaining countries still run.
pub fn run_batch<F>(countries: &[String], mut f: F) -> BatchReport
	where F: FnMut(&str) -> Result<()>,
{
	let mut report = BatchReport::default();
	for iso3 in countries.iter() {
		info!("processing {}", iso3);
		let result = panic::catch_unwind(panic::AssertUnwindSafe(|| f(iso3)));
		match result {
			Ok(Ok(())) => report.succeeded.push(iso3.clone()),
			Ok(Err(e)) => {
				error!("{} failed: {}", iso3, e);
				report.failed.push((iso3.clone(), e.to_string()));
			},
			Err(payload) => {
				let msg = panic_message(&*payload);
				error!("{} panicked: {}", iso3, msg);
				report.failed.push((iso3.clone(), msg));
			},
		}
	}
	info!("{} countries done, {} failed", report.succeeded.len(), report.failed.len());
	report
}


#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn batch_survives_errors_and_panics() {
		let countries: Vec<String> = vec!["AFG".into(), "SOM".into(), "NGA".into(), "COD".into()];
		let mut seen = Vec::new();
		let report = run_batch(&countries, |iso3| {
			seen.push(iso3.to_string());
			match iso3 {
				"SOM" => Err(Error::data("broken")),
				"NGA" => panic!("unexpected"),
				_ => Ok(()),
			}
		});
		assert_eq!(seen.len(), 4);
		assert_eq!(report.succeeded, vec!["AFG".to_string(), "COD".to_string()]);
		assert_eq!(report.failed.len(), 2);
		assert_eq!(report.failed[1], ("NGA".to_string(), "unexpected".to_string()));
		assert!(!report.is_success());
	}

	#[test]
	fn command_line() {
		let args = CliArgs::parse(vec!["-d".to_string(), "-m".into(), "mob/{iso3}.csv".into(), "afg".into(), "SOM".into()]).unwrap();
		assert!(args.download);
		assert_eq!(args.mobility_pattern.as_deref(), Some("mob/{iso3}.csv"));
		assert_eq!(args.countries, vec!["AFG".to_string(), "SOM".to_string()]);
		assert!(CliArgs::parse(vec!["-m".to_string()]).is_err());
		assert!(CliArgs::parse(vec!["-x".to_string()]).is_err());
	}

	#[test]
	fn mobility_pattern() {
		let opts = RunOptions{
			download: false,
			run_date: NaiveDate::from_ymd_opt(2020, 5, 1).unwrap(),
			mobility_pattern: Some("mobility/{iso3}_mobility.csv".into()),
		};
		assert_eq!(opts.mobility_path("AFG"), Some(PathBuf::from("mobility/AFG_mobility.csv")));
	}
}
