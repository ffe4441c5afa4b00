use std::collections::BTreeMap;
use std::convert::TryFrom;
use std::fmt;
use std::num::ParseIntError;
use std::str::FromStr;

use enum_map::{Enum, EnumMap};

use serde::{Deserialize, Serialize};

use smartstring::alias::{String as SmartString};


pub type Pcode = SmartString;


#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "u8", into = "u8")]
pub enum AdminLevel {
	Country,
	Region,
	District,
}

impl AdminLevel {
	pub fn number(&self) -> u8 {
		match self {
			Self::Country => 0,
			Self::Region => 1,
			Self::District => 2,
		}
	}
}

impl TryFrom<u8> for AdminLevel {
	type Error = String;

	fn try_from(v: u8) -> Result<Self, Self::Error> {
		match v {
			0 => Ok(Self::Country),
			1 => Ok(Self::Region),
			2 => Ok(Self::District),
			other => Err(format!("admin level must be 0, 1 or 2, got {}", other)),
		}
	}
}

impl From<AdminLevel> for u8 {
	fn from(other: AdminLevel) -> Self {
		other.number()
	}
}

impl fmt::Display for AdminLevel {
	fn fmt<'f>(&self, f: &'f mut fmt::Formatter) -> fmt::Result {
		write!(f, "admin-{}", self.number())
	}
}


#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AdminUnit {
	pub pcode: Pcode,
	pub level: AdminLevel,
	pub name: SmartString,
	pub parent_pcode: Option<Pcode>,
}


#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Enum)]
pub enum Gender {
	Female,
	Male,
}

impl Gender {
	pub const ALL: [Gender; 2] = [Gender::Female, Gender::Male];

	pub fn label(&self) -> &'static str {
		match self {
			Self::Female => "f",
			Self::Male => "m",
		}
	}
}

impl fmt::Display for Gender {
	fn fmt<'f>(&self, f: &'f mut fmt::Formatter) -> fmt::Result {
		f.write_str(self.label())
	}
}

impl FromStr for Gender {
	type Err = String;

	fn from_str(s: &str) -> Result<Self, Self::Err> {
		match s {
			"f" | "F" => Ok(Self::Female),
			"m" | "M" => Ok(Self::Male),
			other => Err(format!("unknown gender class {:?}", other)),
		}
	}
}


/// Lower bounds of the population raster age classes.
pub const AGE_CLASSES: [u16; 18] = [0, 1, 5, 10, 15, 20, 25, 30, 35, 40, 45, 50, 55, 60, 65, 70, 75, 80];
pub const N_AGE_CLASSES: usize = 18;


#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct AgeBand {
	pub low: u16,
	pub high: Option<u16>,
}

impl AgeBand {
	pub fn from_index(i: usize) -> Option<Self> {
		let low = *AGE_CLASSES.get(i)?;
		let high = AGE_CLASSES.get(i + 1).map(|next| next - 1);
		Some(Self{low, high})
	}

	pub fn index(&self) -> Option<usize> {
		AGE_CLASSES.iter().position(|l| *l == self.low)
	}
}

#[derive(Debug, Clone)]
pub enum ParseAgeBandError {
	InvalidNumber(ParseIntError),
	UnknownClass(u16),
}

impl fmt::Display for ParseAgeBandError {
	fn fmt<'f>(&self, f: &'f mut fmt::Formatter) -> fmt::Result {
		match self {
			Self::InvalidNumber(e) => fmt::Display::fmt(e, f),
			Self::UnknownClass(v) => write!(f, "{} is not an age class lower bound", v),
		}
	}
}

impl From<ParseIntError> for ParseAgeBandError {
	fn from(other: ParseIntError) -> Self {
		Self::InvalidNumber(other)
	}
}

impl FromStr for AgeBand {
	type Err = ParseAgeBandError;

	fn from_str(s: &str) -> Result<Self, Self::Err> {
		let low: u16 = s.trim().parse()?;
		match AGE_CLASSES.iter().position(|l| *l == low) {
			Some(i) => Ok(Self::from_index(i).unwrap_or(Self{low, high: None})),
			None => Err(ParseAgeBandError::UnknownClass(low)),
		}
	}
}

impl fmt::Display for AgeBand {
	fn fmt<'f>(&self, f: &'f mut fmt::Formatter) -> fmt::Result {
		write!(f, "{}", self.low)
	}
}


/// Column name of a SADD band in exposure tables, e.g. `f_15`.
pub fn sadd_column(gender: Gender, band: usize) -> String {
	format!("{}_{}", gender.label(), AGE_CLASSES[band])
}

pub fn parse_sadd_column(s: &str) -> Option<(Gender, usize)> {
	let (g, age) = s.split_once('_')?;
	let gender = g.parse::<Gender>().ok()?;
	let band = age.parse::<AgeBand>().ok()?.index()?;
	Some((gender, band))
}


/// Sex- and age-disaggregated population of one admin unit.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Sadd(EnumMap<Gender, [f64; N_AGE_CLASSES]>);

impl Sadd {
	pub fn zero() -> Self {
		Self::default()
	}

	pub fn get(&self, gender: Gender, band: usize) -> f64 {
		self.0[gender][band]
	}

	pub fn set(&mut self, gender: Gender, band: usize, v: f64) {
		self.0[gender][band] = v;
	}

	pub fn bands(&self, gender: Gender) -> &[f64; N_AGE_CLASSES] {
		&self.0[gender]
	}

	pub fn total(&self) -> f64 {
		Gender::ALL.iter().map(|g| self.0[*g].iter().sum::<f64>()).sum()
	}

	pub fn scale(&mut self, factor: f64) {
		for g in Gender::ALL.iter() {
			for v in self.0[*g].iter_mut() {
				*v *= factor;
			}
		}
	}

	/// Merges the 0 and 1 classes and the 75 and 80 classes, which yields the
	/// 16 five-year bins of the contact matrices.
	pub fn contact_bins(&self, gender: Gender) -> Vec<f64> {
		let b = &self.0[gender];
		let mut out = Vec::with_capacity(N_AGE_CLASSES - 2);
		out.push(b[0] + b[1]);
		out.extend_from_slice(&b[2..16]);
		out.push(b[16] + b[17]);
		out
	}
}

/// Labels of the contact matrix bins, matching `Sadd::contact_bins`.
pub fn contact_age_groups() -> Vec<String> {
	let mut out = vec![AGE_CLASSES[0].to_string()];
	out.extend(AGE_CLASSES[2..17].iter().map(|v| v.to_string()));
	out
}


#[derive(Debug, Clone, Default)]
pub struct PopulationTable {
	units: BTreeMap<Pcode, Sadd>,
}

impl PopulationTable {
	pub fn new() -> Self {
		Self::default()
	}

	pub fn insert(&mut self, pcode: Pcode, sadd: Sadd) {
		self.units.insert(pcode, sadd);
	}

	pub fn get(&self, pcode: &str) -> Option<&Sadd> {
		self.units.get(pcode)
	}

	pub fn total(&self, pcode: &str) -> Option<f64> {
		self.get(pcode).map(|s| s.total())
	}
}
