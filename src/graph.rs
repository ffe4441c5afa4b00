use std::collections::{BTreeMap, BTreeSet};
use std::io;

use log::{debug, info, warn};

use serde::{Deserialize, Serialize};

use chrono::NaiveDate;

use super::admin::{contact_age_groups, Gender, Pcode};
use super::cases::{CaseTable, Metric};
use super::config::{AdminConfig, KeyPolicy};
use super::error::{Error, Result};
use super::exposure::Exposure;
use super::npi::{LocationType, MeasureCategory, NpiTable, Reduction};


pub static MOBILITY_INDEX_COLUMN: &'static str = "ADM";
pub const CONTACT_MATRIX_SIZE: usize = 16;


#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct GraphMeta {
	pub country: String,
	#[serde(default)]
	pub age_groups: Vec<String>,
	#[serde(default)]
	pub dates: Vec<NaiveDate>,
	#[serde(default)]
	pub contact_matrix: BTreeMap<String, Vec<Vec<f64>>>,
}


#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct Node {
	pub id: Pcode,
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub name: Option<String>,
	#[serde(rename = "ADM1_PCODE", default, skip_serializing_if = "Option::is_none")]
	pub adm1_pcode: Option<Pcode>,
	#[serde(rename = "ADM2_PCODE", default, skip_serializing_if = "Option::is_none")]
	pub adm2_pcode: Option<Pcode>,
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub group_pop_f: Option<Vec<f64>>,
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub group_pop_m: Option<Vec<f64>>,
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub population: Option<f64>,
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub population_density: Option<f64>,
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub infected_confirmed: Option<Vec<f64>>,
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub infected_dead: Option<Vec<f64>>,
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub frac_urban: Option<f64>,
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub food_insecurity: Option<f64>,
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub fossil_fuels: Option<f64>,
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub handwashing_facilities: Option<f64>,
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub raised_blood_pressure: Option<f64>,
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub diabetes: Option<f64>,
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub smoking: Option<f64>,
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub vulnerable_frac: Option<f64>,
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub high_beta_frac: Option<f64>,
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub npi_reduction_r: Option<Vec<f64>>,
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub npi_reduction_mobility: Option<Vec<f64>>,
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub npi_reduction_contact: Option<BTreeMap<String, Vec<f64>>>,
}

impl Node {
	pub fn new(id: Pcode) -> Self {
		Self{id, ..Self::default()}
	}
}


#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Link {
	pub source: Pcode,
	pub target: Pcode,
	pub weight: f64,
}


/// Admin-2 mobility graph in node-link layout.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Graph {
	pub directed: bool,
	pub multigraph: bool,
	pub graph: GraphMeta,
	nodes: Vec<Node>,
	pub links: Vec<Link>,
	#[serde(skip)]
	node_index: BTreeMap<Pcode, usize>,
}

impl Graph {
	pub fn new(country: &str) -> Self {
		Self{
			directed: true,
			multigraph: false,
			graph: GraphMeta{country: country.to_string(), ..GraphMeta::default()},
			nodes: Vec::new(),
			links: Vec::new(),
			node_index: BTreeMap::new(),
		}
	}

	/// Builds the graph from a square flow table whose index column is `ADM`
	/// and whose other columns name the target units. Zero flows make no
	/// link.
	pub fn initialize_with_mobility<R: io::Read>(r: R, country: &str) -> Result<Self> {
		let mut r = csv::Reader::from_reader(r);
		let headers = r.headers()?.clone();
		let index_col = headers.iter().position(|h| h == MOBILITY_INDEX_COLUMN)
			.ok_or_else(|| Error::data(format!("mobility table lacks {} column", MOBILITY_INDEX_COLUMN)))?;
		let mut g = Self::new(country);
		let targets: Vec<(usize, Pcode)> = headers.iter().enumerate()
			.filter(|(i, _)| *i != index_col)
			.map(|(i, h)| (i, h.trim().into()))
			.collect();
		for (_, pcode) in targets.iter() {
			g.node_mut(pcode);
		}
		let mut rows = 0;
		for rec in r.records() {
			let rec = rec?;
			let source: Pcode = rec.get(index_col).unwrap_or("").trim().into();
			if !targets.iter().any(|(_, p)| *p == source) {
				return Err(Error::data(format!("mobility row {} has no matching column, table is not square", source)))
			}
			for (i, target) in targets.iter() {
				let raw = rec.get(*i).unwrap_or("").trim();
				let weight = if raw.is_empty() {
					0.
				} else {
					raw.parse::<f64>().map_err(|e| Error::data(format!("mobility flow {} -> {}: {}", source, target, e)))?
				};
				if weight != 0. {
					g.links.push(Link{source: source.clone(), target: target.clone(), weight});
				}
			}
			rows += 1;
		}
		if rows != targets.len() {
			warn!("mobility table has {} rows for {} columns", rows, targets.len());
		}
		info!("mobility graph for {}: {} nodes, {} links", country, g.nodes.len(), g.links.len());
		Ok(g)
	}

	pub fn nodes(&self) -> &[Node] {
		&self.nodes
	}

	pub fn node(&self, id: &str) -> Option<&Node> {
		self.node_index.get(id).map(|i| &self.nodes[*i])
	}

	/// The node for `id`, added if it does not exist yet.
	pub fn node_mut(&mut self, id: &str) -> &mut Node {
		let i = match self.node_index.get(id) {
			Some(i) => *i,
			None => {
				let pcode: Pcode = id.into();
				self.nodes.push(Node::new(pcode.clone()));
				self.node_index.insert(pcode, self.nodes.len() - 1);
				self.nodes.len() - 1
			},
		};
		&mut self.nodes[i]
	}

	fn check_keys<'x, I: Iterator<Item = &'x Pcode>>(&self, what: &str, keys: I, policy: KeyPolicy) -> Result<()> {
		let keys: BTreeSet<&str> = keys.map(|k| k.as_str()).collect();
		let nodes: BTreeSet<&str> = self.nodes.iter().map(|n| n.id.as_str()).collect();
		let extra: Vec<&str> = keys.difference(&nodes).copied().collect();
		let missing: Vec<&str> = nodes.difference(&keys).copied().collect();
		if extra.is_empty() && missing.is_empty() {
			return Ok(())
		}
		match policy {
			KeyPolicy::Ignore => {
				debug!("{}: {} units not in the graph, {} graph units not covered", what, extra.len(), missing.len());
				Ok(())
			},
			KeyPolicy::Warn => {
				if !extra.is_empty() {
					warn!("{}: units not in the mobility graph are added: {:?}", what, extra);
				}
				if !missing.is_empty() {
					warn!("{}: graph units without data: {:?}", what, missing);
				}
				Ok(())
			},
			KeyPolicy::Reject => Err(Error::data(format!(
				"{} does not match the graph units ({} extra, {} missing)", what, extra.len(), missing.len(),
			))),
		}
	}

	/// Population vectors in contact matrix bins, names and density.
	pub fn add_exposure(&mut self, exposure: &Exposure, admin: &AdminConfig, policy: KeyPolicy) -> Result<()> {
		self.check_keys("exposure", exposure.rows().iter().map(|r| &r.boundary.adm2_pcode), policy)?;
		let name_field = admin.adm2_name_field();
		for row in exposure.rows().iter() {
			let b = &row.boundary;
			let group_pop_f = row.sadd.contact_bins(Gender::Female);
			let group_pop_m = row.sadd.contact_bins(Gender::Male);
			let population: f64 = group_pop_f.iter().chain(group_pop_m.iter()).sum();
			let density = match row.area_km2 {
				Some(a) if a > 0. => Some(population / a),
				_ => {
					warn!("no usable area for {}, population density left unset", b.adm2_pcode);
					None
				},
			};
			let node = self.node_mut(&b.adm2_pcode);
			node.name = b.name(&name_field).map(|s| s.to_string());
			node.adm1_pcode = Some(b.adm1_pcode.clone());
			node.adm2_pcode = Some(b.adm2_pcode.clone());
			node.group_pop_f = Some(group_pop_f);
			node.group_pop_m = Some(group_pop_m);
			node.population = Some(population);
			node.population_density = density;
		}
		self.graph.age_groups = contact_age_groups();
		Ok(())
	}

	/// Daily cumulative case series on the continuous axis between the first
	/// and last reported date.
	pub fn add_covid(&mut self, cases: &CaseTable, policy: KeyPolicy) -> Result<()> {
		let (start, last) = match cases.date_range() {
			Some(r) => r,
			None => {
				warn!("no COVID records, leaving case series unset");
				return Ok(())
			},
		};
		let adm2: BTreeSet<Pcode> = cases.records().iter().map(|r| r.adm2_pcode.clone()).collect();
		self.check_keys("COVID cases", adm2.iter(), policy)?;
		let series = cases.observations(start, last).interpolated();
		let zeros = vec![0.; series.len()];
		for pcode in adm2.iter() {
			let confirmed = series.get(&(pcode.clone(), Metric::Confirmed)).unwrap_or(&zeros[..]).to_vec();
			let dead = series.get(&(pcode.clone(), Metric::Dead)).unwrap_or(&zeros[..]).to_vec();
			let node = self.node_mut(pcode);
			node.infected_confirmed = Some(confirmed);
			node.infected_dead = Some(dead);
		}
		self.graph.dates = series.dates().collect();
		Ok(())
	}

	pub fn add_vulnerability(&mut self, rows: &[VulnerabilityRow], policy: KeyPolicy) -> Result<()> {
		self.check_keys("vulnerability", rows.iter().map(|r| &r.adm2_pcode), policy)?;
		for row in rows.iter() {
			let node = self.node_mut(&row.adm2_pcode);
			node.frac_urban = row.frac_urban;
			node.food_insecurity = row.food_insecurity;
			node.fossil_fuels = row.fossil_fuels;
			node.handwashing_facilities = row.handwashing_facilities;
			node.raised_blood_pressure = row.raised_blood_pressure;
			node.diabetes = row.diabetes;
			node.smoking = row.smoking;
			node.vulnerable_frac = match (row.food_insecurity, row.fossil_fuels) {
				(Some(a), Some(b)) => Some(a.max(b)),
				(a, None) => a,
				(None, b) => b,
			};
			node.high_beta_frac = row.handwashing_facilities;
		}
		Ok(())
	}

	pub fn add_contact_matrix(&mut self, location: LocationType, matrix: Vec<Vec<f64>>) {
		self.graph.contact_matrix.insert(location.label().to_string(), matrix);
	}

	/// Reduction factors per node on the graph's date axis.
	pub fn add_npis(&mut self, table: &NpiTable, policy: KeyPolicy) -> Result<()> {
		if self.graph.dates.is_empty() {
			warn!("graph has no date axis, NPI reductions not added");
			return Ok(())
		}
		self.check_keys("NPIs", table.adm2_pcodes(), policy)?;
		let dates = self.graph.dates.clone();
		for node in self.nodes.iter_mut() {
			let mut r = Vec::with_capacity(dates.len());
			let mut mobility = Vec::with_capacity(dates.len());
			let mut contact: BTreeMap<String, Vec<f64>> = LocationType::ALL.iter()
				.map(|l| (l.label().to_string(), Vec::with_capacity(dates.len())))
				.collect();
			for date in dates.iter() {
				if let Reduction::Scalar(v) = table.reduction(&node.id, MeasureCategory::ReproductionNumber, *date) {
					r.push(v);
				}
				if let Reduction::Scalar(v) = table.reduction(&node.id, MeasureCategory::Mobility, *date) {
					mobility.push(v);
				}
				if let Reduction::Contact(m) = table.reduction(&node.id, MeasureCategory::Contact, *date) {
					for l in LocationType::ALL.iter() {
						if let Some(v) = contact.get_mut(l.label()) {
							v.push(m[*l]);
						}
					}
				}
			}
			node.npi_reduction_r = Some(r);
			node.npi_reduction_mobility = Some(mobility);
			node.npi_reduction_contact = Some(contact);
		}
		Ok(())
	}

	pub fn write<W: io::Write>(&self, w: W) -> Result<()> {
		serde_json::to_writer_pretty(w, self)?;
		Ok(())
	}

	pub fn read<R: io::Read>(r: R) -> Result<Self> {
		let mut g: Self = serde_json::from_reader(r)?;
		g.node_index = g.nodes.iter().enumerate()
			.map(|(i, n)| (n.id.clone(), i))
			.collect();
		Ok(g)
	}
}


#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct VulnerabilityRow {
	#[serde(rename = "ADM2_PCODE")]
	pub adm2_pcode: Pcode,
	#[serde(default, deserialize_with = "csv::invalid_option")]
	pub frac_urban: Option<f64>,
	#[serde(rename = "Phase 3+", default, deserialize_with = "csv::invalid_option")]
	pub food_insecurity: Option<f64>,
	#[serde(default, deserialize_with = "csv::invalid_option")]
	pub fossil_fuels: Option<f64>,
	#[serde(default, deserialize_with = "csv::invalid_option")]
	pub handwashing_facilities: Option<f64>,
	#[serde(default, deserialize_with = "csv::invalid_option")]
	pub raised_blood_pressure: Option<f64>,
	#[serde(default, deserialize_with = "csv::invalid_option")]
	pub diabetes: Option<f64>,
	#[serde(default, deserialize_with = "csv::invalid_option")]
	pub smoking: Option<f64>,
}

pub fn read_vulnerability<R: io::Read>(r: R) -> Result<Vec<VulnerabilityRow>> {
	let mut r = csv::Reader::from_reader(r);
	let mut result = Vec::new();
	for row in r.deserialize() {
		result.push(row?);
	}
	Ok(result)
}


/// Reads one 16x16 contact matrix. Files of the first set carry a header
/// row, those of the second set do not.
pub fn read_contact_matrix<R: io::Read>(r: R, file_number: u8) -> Result<Vec<Vec<f64>>> {
	let mut r = csv::ReaderBuilder::new()
		.has_headers(file_number == 1)
		.from_reader(r);
	let mut matrix = Vec::with_capacity(CONTACT_MATRIX_SIZE);
	for rec in r.records() {
		let rec = rec?;
		let row = rec.iter()
			.map(|v| v.trim().parse::<f64>().map_err(|e| Error::data(format!("contact matrix value {:?}: {}", v, e))))
			.collect::<Result<Vec<f64>>>()?;
		matrix.push(row);
	}
	if matrix.len() != CONTACT_MATRIX_SIZE || matrix.iter().any(|row| row.len() != CONTACT_MATRIX_SIZE) {
		return Err(Error::data(format!(
			"contact matrix must be {}x{}, got {} rows", CONTACT_MATRIX_SIZE, CONTACT_MATRIX_SIZE, matrix.len(),
		)))
	}
	Ok(matrix)
}
