use std::collections::BTreeMap;
use std::convert::TryFrom;
use std::fs;
use std::path::{Path, PathBuf};

use serde::Deserialize;

use super::admin::AdminLevel;
use super::disagg::DEFAULT_CONSERVATION_TOLERANCE;
use super::error::{Error, Result};
use super::names::{NameNormalizer, DEFAULT_SUFFIXES};


pub static CONFIG_FILE: &'static str = "config.yml";

// HXL tags of the case tables
pub static HXL_TAG_TOTAL_CASES: &'static str = "#affected+infected+confirmed+total";
pub static HXL_TAG_TOTAL_DEATHS: &'static str = "#affected+infected+dead+total";
pub static HXL_TAG_DATE: &'static str = "#date";
pub static HXL_TAG_ADM1_NAME: &'static str = "#adm1+name";
pub static HXL_TAG_ADM2_NAME: &'static str = "#adm2+name";
pub static HXL_TAG_ADM1_PCODE: &'static str = "#adm1+pcode";
pub static HXL_TAG_ADM2_PCODE: &'static str = "#adm2+pcode";


fn default_adm0_pcode() -> String {
	"ADM0_PCODE".into()
}

fn default_adm1_pcode() -> String {
	"ADM1_PCODE".into()
}

fn default_adm2_pcode() -> String {
	"ADM2_PCODE".into()
}

fn default_language() -> String {
	"EN".into()
}

fn default_suffixes() -> Vec<String> {
	DEFAULT_SUFFIXES.iter().map(|s| s.to_string()).collect()
}

fn default_true() -> bool {
	true
}

fn default_date_format() -> String {
	"%Y-%m-%d".into()
}

fn default_tolerance() -> f64 {
	DEFAULT_CONSERVATION_TOLERANCE
}


#[derive(Debug, Clone, Deserialize)]
pub struct AdminConfig {
	#[serde(default = "default_language")]
	pub language: String,
	#[serde(default = "default_adm0_pcode")]
	pub adm0_pcode: String,
	#[serde(default = "default_adm1_pcode")]
	pub adm1_pcode: String,
	#[serde(default = "default_adm2_pcode")]
	pub adm2_pcode: String,
	#[serde(default = "default_suffixes")]
	pub suffixes: Vec<String>,
}

impl AdminConfig {
	pub fn adm1_name_field(&self) -> String {
		format!("ADM1_{}", self.language)
	}

	pub fn adm2_name_field(&self) -> String {
		format!("ADM2_{}", self.language)
	}
}

impl Default for AdminConfig {
	fn default() -> Self {
		Self{
			language: default_language(),
			adm0_pcode: default_adm0_pcode(),
			adm1_pcode: default_adm1_pcode(),
			adm2_pcode: default_adm2_pcode(),
			suffixes: default_suffixes(),
		}
	}
}


#[derive(Debug, Clone, Deserialize)]
struct RawCovidConfig {
	filename: String,
	#[serde(default)]
	url: Option<String>,
	#[serde(default)]
	header: usize,
	#[serde(default)]
	skiprows: Vec<usize>,
	#[serde(default)]
	hlx_dict: BTreeMap<String, String>,
	admin_level: u8,
	#[serde(default)]
	individual_case_data: bool,
	#[serde(default = "default_true")]
	cases: bool,
	#[serde(default = "default_true")]
	deaths: bool,
	#[serde(default = "default_true")]
	cumulative: bool,
	#[serde(default = "default_date_format")]
	date_format: String,
	#[serde(default)]
	adm1_name_exp: Option<String>,
	#[serde(default)]
	adm2_name_exp: Option<String>,
	#[serde(default)]
	replace_dict: BTreeMap<String, String>,
	#[serde(default)]
	federal_state_dict: BTreeMap<String, String>,
	#[serde(default = "default_tolerance")]
	conservation_tolerance: f64,
}


/// How a country reports cases, which decides the processing path.
#[derive(Debug, Clone, PartialEq)]
pub enum CaseSource {
	/// Aggregated counts per admin-1 unit, pushed down by population.
	Admin1Aggregated {
		name_field: String,
		federal_states: BTreeMap<String, String>,
	},
	/// Aggregated counts per admin-2 unit.
	Admin2Aggregated {
		name_field: String,
	},
	/// One row per case at admin-2, tallied into counts.
	Admin2CaseLine {
		name_field: String,
	},
}

impl CaseSource {
	pub fn level(&self) -> AdminLevel {
		match self {
			Self::Admin1Aggregated{..} => AdminLevel::Region,
			Self::Admin2Aggregated{..} | Self::Admin2CaseLine{..} => AdminLevel::District,
		}
	}

	pub fn name_field(&self) -> &str {
		match self {
			Self::Admin1Aggregated{name_field, ..} => name_field,
			Self::Admin2Aggregated{name_field} => name_field,
			Self::Admin2CaseLine{name_field} => name_field,
		}
	}
}


#[derive(Debug, Clone)]
pub struct CovidConfig {
	pub filename: String,
	pub url: Option<String>,
	pub header: usize,
	pub skip_rows: Vec<usize>,
	pub renames: BTreeMap<String, String>,
	pub source: CaseSource,
	pub cases: bool,
	pub deaths: bool,
	pub cumulative: bool,
	pub date_format: String,
	pub normalizer: NameNormalizer,
	pub conservation_tolerance: f64,
}

impl CovidConfig {
	fn validate(raw: RawCovidConfig, admin: &AdminConfig) -> Result<Self> {
		let level = AdminLevel::try_from(raw.admin_level).map_err(Error::config)?;
		let source = match (level, raw.individual_case_data) {
			(AdminLevel::Region, false) => CaseSource::Admin1Aggregated{
				name_field: raw.adm1_name_exp.unwrap_or_else(|| admin.adm1_name_field()),
				federal_states: raw.federal_state_dict,
			},
			(AdminLevel::District, false) => CaseSource::Admin2Aggregated{
				name_field: raw.adm2_name_exp.unwrap_or_else(|| admin.adm2_name_field()),
			},
			(AdminLevel::District, true) => CaseSource::Admin2CaseLine{
				name_field: raw.adm2_name_exp.unwrap_or_else(|| admin.adm2_name_field()),
			},
			(AdminLevel::Region, true) => return Err(Error::config("individual case data is only supported at admin level 2")),
			(AdminLevel::Country, _) => return Err(Error::config("case data must be reported at admin level 1 or 2")),
		};
		if !raw.cases && !raw.deaths {
			return Err(Error::config("covid source must provide cases, deaths or both"))
		}
		if let CaseSource::Admin2CaseLine{..} = source {
			if !raw.cases {
				return Err(Error::config("individual case data always yields confirmed cases"))
			}
		}
		if !(raw.conservation_tolerance >= 0.) {
			return Err(Error::config("conservation tolerance must be non-negative"))
		}
		let normalizer = NameNormalizer::new(&admin.suffixes, &raw.replace_dict)?;
		Ok(Self{
			filename: raw.filename,
			url: raw.url,
			header: raw.header,
			skip_rows: raw.skiprows,
			renames: raw.hlx_dict,
			source,
			cases: raw.cases,
			deaths: raw.deaths,
			cumulative: raw.cumulative,
			date_format: raw.date_format,
			normalizer,
			conservation_tolerance: raw.conservation_tolerance,
		})
	}
}


#[derive(Debug, Clone, Deserialize)]
pub struct ContactMatrixConfig {
	pub country: String,
	pub file_number: u8,
}

#[derive(Debug, Clone, Deserialize)]
struct RawPopCoConfig {
	filename: String,
	#[serde(default = "default_province_column")]
	province_column: String,
	#[serde(default = "default_population_column")]
	population_column: String,
	#[serde(default)]
	province_names: BTreeMap<String, String>,
}

fn default_province_column() -> String {
	"Province".into()
}

fn default_population_column() -> String {
	"Estimated Population - 2020".into()
}

/// Country office population figures per admin-1 unit.
#[derive(Debug, Clone)]
pub struct PopCoConfig {
	pub filename: String,
	pub province_column: String,
	pub population_column: String,
	pub normalizer: NameNormalizer,
}

/// Nomadic population added on top of the raster estimates.
#[derive(Debug, Clone, Deserialize)]
pub struct NomadConfig {
	pub adm1: Vec<String>,
	pub total: f64,
}


#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum KeyPolicy {
	/// Enrichment sources may cover any set of nodes.
	Ignore,
	/// Pcodes not in the mobility graph are logged, then added as nodes.
	Warn,
	/// Pcodes not in the mobility graph fail the enrichment pass.
	Reject,
}

impl Default for KeyPolicy {
	fn default() -> Self {
		Self::Warn
	}
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct GraphConfig {
	#[serde(default)]
	pub key_policy: KeyPolicy,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct NpiConfig {
	#[serde(default)]
	pub iso3: Option<String>,
	#[serde(default)]
	pub name_aliases: BTreeMap<String, String>,
}


#[derive(Debug, Clone, Deserialize)]
struct RawCountryConfig {
	#[serde(default)]
	admin: AdminConfig,
	#[serde(default)]
	covid: Option<RawCovidConfig>,
	#[serde(default)]
	contact_matrix: Option<ContactMatrixConfig>,
	#[serde(default)]
	pop_co: Option<RawPopCoConfig>,
	#[serde(default)]
	kochi: Option<NomadConfig>,
	#[serde(default)]
	npis: NpiConfig,
	#[serde(default)]
	graph: GraphConfig,
}


#[derive(Debug, Clone)]
pub struct CountryConfig {
	pub iso3: String,
	pub admin: AdminConfig,
	pub covid: Option<CovidConfig>,
	pub contact_matrix: Option<ContactMatrixConfig>,
	pub pop_co: Option<PopCoConfig>,
	pub nomads: Option<NomadConfig>,
	pub npis: NpiConfig,
	pub npi_normalizer: NameNormalizer,
	pub graph: GraphConfig,
}

impl CountryConfig {
	fn validate(iso3: &str, raw: RawCountryConfig) -> Result<Self> {
		let covid = match raw.covid {
			Some(c) => Some(CovidConfig::validate(c, &raw.admin)?),
			None => None,
		};
		if let Some(cm) = &raw.contact_matrix {
			if cm.file_number != 1 && cm.file_number != 2 {
				return Err(Error::config(format!("contact matrix file number must be 1 or 2, got {}", cm.file_number)))
			}
		}
		let pop_co = match raw.pop_co {
			Some(p) => Some(PopCoConfig{
				normalizer: NameNormalizer::new(&raw.admin.suffixes, &p.province_names)?,
				filename: p.filename,
				province_column: p.province_column,
				population_column: p.population_column,
			}),
			None => None,
		};
		if let Some(k) = &raw.kochi {
			if !(k.total >= 0.) {
				return Err(Error::config("nomad population total must be non-negative"))
			}
		}
		let npi_normalizer = NameNormalizer::new(&raw.admin.suffixes, &raw.npis.name_aliases)?;
		Ok(Self{
			iso3: iso3.to_string(),
			admin: raw.admin,
			covid,
			contact_matrix: raw.contact_matrix,
			pop_co,
			nomads: raw.kochi,
			npis: raw.npis,
			npi_normalizer,
			graph: raw.graph,
		})
	}

	/// ISO3 code used in the NPI dataset, which may differ from ours.
	pub fn npi_iso3(&self) -> &str {
		self.npis.iso3.as_ref().map(|s| s.as_str()).unwrap_or(&self.iso3)
	}
}


/// All country sections of the configuration file. Sections are validated
/// individually when requested, so one broken country does not prevent
/// processing of the others.
#[derive(Debug, Clone)]
pub struct Config {
	countries: BTreeMap<String, serde_yaml::Value>,
}

impl Config {
	pub fn from_str(s: &str) -> Result<Self> {
		Ok(Self{countries: serde_yaml::from_str(s)?})
	}

	pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
		let path = path.as_ref();
		let s = match fs::read_to_string(path) {
			Ok(s) => s,
			Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Err(Error::MissingArtifact(path.to_path_buf())),
			Err(e) => return Err(e.into()),
		};
		Self::from_str(&s)
	}

	pub fn countries(&self) -> impl Iterator<Item = &String> {
		self.countries.keys()
	}

	pub fn country(&self, iso3: &str) -> Result<CountryConfig> {
		let raw = match self.countries.get(iso3) {
			Some(v) => v.clone(),
			None => return Err(Error::config(format!("no configuration for country {}", iso3))),
		};
		let raw: RawCountryConfig = serde_yaml::from_value(raw)?;
		CountryConfig::validate(iso3, raw)
	}
}


pub static CONTACT_MATRIX_DIR: &'static str = "contact_matrices_152_countries";

/// Input and output file locations below a base directory.
#[derive(Debug, Clone)]
pub struct Layout {
	base: PathBuf,
}

impl Layout {
	pub fn new<P: Into<PathBuf>>(base: P) -> Self {
		Self{base: base.into()}
	}

	pub fn base(&self) -> &Path {
		&self.base
	}

	pub fn config_file(&self) -> PathBuf {
		self.base.join(CONFIG_FILE)
	}

	fn input_dir(&self, iso3: &str) -> PathBuf {
		self.base.join("Inputs").join(iso3)
	}

	fn output_dir(&self, iso3: &str) -> PathBuf {
		self.base.join("Outputs").join(iso3)
	}

	pub fn zonal_stats(&self, iso3: &str) -> PathBuf {
		self.input_dir(iso3).join("Exposure").join(format!("{}_adm2_zonal_stats.csv", iso3))
	}

	pub fn co_population(&self, iso3: &str, filename: &str) -> PathBuf {
		self.input_dir(iso3).join("InputsFromCOs").join(filename)
	}

	pub fn covid_input(&self, iso3: &str, filename: &str) -> PathBuf {
		self.input_dir(iso3).join("COVID").join(filename)
	}

	pub fn npi_dataset(&self) -> PathBuf {
		self.base.join("Inputs").join("ACAPS_NPIs").join("acaps_npis.csv")
	}

	pub fn npi_measure_equivalence(&self) -> PathBuf {
		self.base.join("Inputs").join("ACAPS_NPIs").join("measure_equivalence.csv")
	}

	pub fn npi_overrides(&self, iso3: &str) -> PathBuf {
		self.input_dir(iso3).join("NPIs").join(format!("{}_npi_overrides.csv", iso3))
	}

	pub fn exposure(&self, iso3: &str) -> PathBuf {
		self.output_dir(iso3).join("Exposure_SADD").join(format!("{}_Exposure.csv", iso3))
	}

	pub fn vulnerability(&self, iso3: &str) -> PathBuf {
		self.output_dir(iso3).join("Vulnerability").join(format!("{}_Vulnerabilities.csv", iso3))
	}

	pub fn covid(&self, iso3: &str) -> PathBuf {
		self.output_dir(iso3).join("COVID").join(format!("{}_COVID.csv", iso3))
	}

	pub fn npis(&self, iso3: &str) -> PathBuf {
		self.output_dir(iso3).join("NPIs").join(format!("{}_NPIs.csv", iso3))
	}

	pub fn graph(&self, iso3: &str) -> PathBuf {
		self.output_dir(iso3).join("Graph").join(format!("{}_graph.json", iso3))
	}

	pub fn contact_matrix(&self, cm: &ContactMatrixConfig, location: &str) -> PathBuf {
		self.base
			.join(CONTACT_MATRIX_DIR)
			.join(format!("MUestimates_{}_{}", location, cm.file_number))
			.join(format!("{}.csv", cm.country))
	}
}


#[cfg(test)]
mod tests {
	use super::*;

	static SAMPLE: &'static str = r##"
AFG:
  admin:
    language: EN
  covid:
    filename: afg_covid.csv
    header: 0
    hlx_dict:
      Province: "#adm1+name"
      Date: "#date"
      Cases: "#affected+infected+confirmed+total"
      Deaths: "#affected+infected+dead+total"
    admin_level: 1
    cumulative: false
    date_format: "%d/%m/%Y"
    replace_dict:
      Helmand: Hilmand
  contact_matrix:
    country: Afghanistan
    file_number: 1
  kochi:
    adm1: [AF01, AF02]
    total: 1500000
SOM:
  covid:
    filename: som.csv
    admin_level: 1
    federal_state_dict:
      Banadir: Banadir
      Bay: South West
NGA:
  covid:
    filename: nga.csv
    admin_level: 1
    individual_case_data: true
COD:
  covid:
    filename: cod.csv
    admin_level: 2
    individual_case_data: true
    deaths: false
"##;

	#[test]
	fn validates_admin1_source() {
		let c = Config::from_str(SAMPLE).unwrap();
		let afg = c.country("AFG").unwrap();
		let covid = afg.covid.unwrap();
		assert_eq!(covid.source, CaseSource::Admin1Aggregated{
			name_field: "ADM1_EN".into(),
			federal_states: BTreeMap::new(),
		});
		assert!(!covid.cumulative);
		assert_eq!(covid.normalizer.normalize("Helmand Province").as_str(), "Hilmand");
		assert_eq!(afg.nomads.unwrap().adm1.len(), 2);
		assert_eq!(afg.graph.key_policy, KeyPolicy::Warn);
	}

	#[test]
	fn case_line_data_needs_admin2() {
		let c = Config::from_str(SAMPLE).unwrap();
		assert!(c.country("NGA").is_err());
		let cod = c.country("COD").unwrap().covid.unwrap();
		assert_eq!(cod.source, CaseSource::Admin2CaseLine{name_field: "ADM2_EN".into()});
		assert_eq!(cod.source.level(), AdminLevel::District);
	}

	#[test]
	fn federal_states_are_carried() {
		let c = Config::from_str(SAMPLE).unwrap();
		match c.country("SOM").unwrap().covid.unwrap().source {
			CaseSource::Admin1Aggregated{federal_states, ..} => assert_eq!(federal_states.len(), 2),
			other => panic!("unexpected source {:?}", other),
		}
	}

	#[test]
	fn unknown_country_is_an_error() {
		let c = Config::from_str(SAMPLE).unwrap();
		assert!(c.country("XYZ").is_err());
		assert_eq!(c.countries().count(), 4);
	}

	#[test]
	fn layout_paths() {
		let l = Layout::new("/data");
		assert_eq!(l.covid("AFG"), PathBuf::from("/data/Outputs/AFG/COVID/AFG_COVID.csv"));
		assert_eq!(l.graph("AFG"), PathBuf::from("/data/Outputs/AFG/Graph/AFG_graph.json"));
		let cm = ContactMatrixConfig{country: "Afghanistan".into(), file_number: 1};
		assert_eq!(
			l.contact_matrix(&cm, "home"),
			PathBuf::from("/data/contact_matrices_152_countries/MUestimates_home_1/Afghanistan.csv"),
		);
	}
}
