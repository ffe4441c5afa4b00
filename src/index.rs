use std::collections::{BTreeMap, BTreeSet};

use log::{debug, warn};

use smartstring::alias::{String as SmartString};

use super::admin::{AdminLevel, AdminUnit, Pcode};


/// One admin-2 unit as it comes out of the boundary attribute table.
#[derive(Debug, Clone, Default)]
pub struct BoundaryRow {
	pub adm0_pcode: Option<Pcode>,
	pub adm1_pcode: Pcode,
	pub adm2_pcode: Pcode,
	/// Name columns (`ADM1_EN`, `ADM2_PS`, ...) by column name.
	pub names: BTreeMap<String, SmartString>,
}

impl BoundaryRow {
	pub fn name(&self, field: &str) -> Option<&SmartString> {
		self.names.get(field)
	}
}


/// Parent/children relation used to push values down one admin level.
pub trait Hierarchy {
	fn children(&self, parent: &str) -> Option<&[Pcode]>;
}

impl Hierarchy for BTreeMap<Pcode, Vec<Pcode>> {
	fn children(&self, parent: &str) -> Option<&[Pcode]> {
		self.get(parent).map(|v| &v[..])
	}
}


fn name_lookup<'x, I, F>(rows: I, field: &str, pcode: F) -> BTreeMap<SmartString, Pcode>
	where I: Iterator<Item = &'x BoundaryRow>,
	      F: Fn(&BoundaryRow) -> &Pcode,
{
	let mut result: BTreeMap<SmartString, Pcode> = BTreeMap::new();
	for row in rows {
		let name = match row.name(field) {
			Some(n) => n,
			None => {
				debug!("boundary row {} has no {} value", row.adm2_pcode, field);
				continue
			},
		};
		let code = pcode(row);
		match result.get(name) {
			Some(existing) if existing != code => {
				warn!("name {:?} in {} maps to both {} and {}, keeping {}", name, field, existing, code, existing);
			},
			Some(_) => (),
			None => {
				result.insert(name.clone(), code.clone());
			},
		}
	}
	result
}


#[derive(Debug, Clone, Default)]
pub struct AdminIndex {
	country: Option<Pcode>,
	adm1_by_name: BTreeMap<SmartString, Pcode>,
	adm2_by_name: BTreeMap<SmartString, Pcode>,
	parents: BTreeMap<Pcode, Pcode>,
	children: BTreeMap<Pcode, Vec<Pcode>>,
	adm2: Vec<Pcode>,
	units: BTreeMap<Pcode, AdminUnit>,
}

impl AdminIndex {
	pub fn build(rows: &[BoundaryRow], adm1_name_field: &str, adm2_name_field: &str) -> Self {
		let adm1_by_name = name_lookup(rows.iter(), adm1_name_field, |r| &r.adm1_pcode);
		let adm2_by_name = name_lookup(rows.iter(), adm2_name_field, |r| &r.adm2_pcode);

		let mut parents = BTreeMap::new();
		let mut children: BTreeMap<Pcode, Vec<Pcode>> = BTreeMap::new();
		let mut adm2 = Vec::with_capacity(rows.len());
		let mut units = BTreeMap::new();
		let mut countries = BTreeSet::new();
		for row in rows {
			if parents.contains_key(&row.adm2_pcode) {
				warn!("admin-2 unit {} appears more than once in the boundaries, keeping the first", row.adm2_pcode);
				continue
			}
			if let Some(c) = &row.adm0_pcode {
				countries.insert(c.clone());
			}
			parents.insert(row.adm2_pcode.clone(), row.adm1_pcode.clone());
			children.entry(row.adm1_pcode.clone()).or_insert_with(Vec::new).push(row.adm2_pcode.clone());
			adm2.push(row.adm2_pcode.clone());

			units.entry(row.adm1_pcode.clone()).or_insert_with(|| AdminUnit{
				pcode: row.adm1_pcode.clone(),
				level: AdminLevel::Region,
				name: row.name(adm1_name_field).cloned().unwrap_or_default(),
				parent_pcode: row.adm0_pcode.clone(),
			});
			units.insert(row.adm2_pcode.clone(), AdminUnit{
				pcode: row.adm2_pcode.clone(),
				level: AdminLevel::District,
				name: row.name(adm2_name_field).cloned().unwrap_or_default(),
				parent_pcode: Some(row.adm1_pcode.clone()),
			});
		}
		if countries.len() > 1 {
			warn!("boundaries span several admin-0 units: {:?}", countries);
		}
		let country = countries.into_iter().next();
		if let Some(c) = &country {
			units.insert(c.clone(), AdminUnit{
				pcode: c.clone(),
				level: AdminLevel::Country,
				name: c.clone(),
				parent_pcode: None,
			});
		}

		Self{
			country,
			adm1_by_name,
			adm2_by_name,
			parents,
			children,
			adm2,
			units,
		}
	}

	pub fn country(&self) -> Option<&Pcode> {
		self.country.as_ref()
	}

	pub fn lookup_adm1(&self, name: &str) -> Option<&Pcode> {
		self.adm1_by_name.get(name)
	}

	pub fn lookup_adm2(&self, name: &str) -> Option<&Pcode> {
		self.adm2_by_name.get(name)
	}

	pub fn parent_of(&self, adm2: &str) -> Option<&Pcode> {
		self.parents.get(adm2)
	}

	pub fn unit(&self, pcode: &str) -> Option<&AdminUnit> {
		self.units.get(pcode)
	}

	pub fn level_of(&self, pcode: &str) -> Option<AdminLevel> {
		self.unit(pcode).map(|u| u.level)
	}

	/// Admin-2 pcodes in boundary order.
	pub fn adm2_pcodes(&self) -> &[Pcode] {
		&self.adm2
	}

	/// All admin-2 units inside `pcode`, whatever its level.
	pub fn expand_to_adm2(&self, pcode: &str) -> Option<Vec<Pcode>> {
		match self.level_of(pcode)? {
			AdminLevel::Country => Some(self.adm2.clone()),
			AdminLevel::Region => self.children.get(pcode).cloned(),
			AdminLevel::District => Some(vec![pcode.into()]),
		}
	}
}

impl Hierarchy for AdminIndex {
	fn children(&self, parent: &str) -> Option<&[Pcode]> {
		self.children.get(parent).map(|v| &v[..])
	}
}


/// Collects names which failed to resolve so that they can be reported
/// together instead of vanishing.
#[derive(Debug, Clone, Default)]
pub struct Unresolved {
	entries: BTreeMap<SmartString, BTreeSet<String>>,
}

impl Unresolved {
	pub fn new() -> Self {
		Self::default()
	}

	pub fn note<C: ToString>(&mut self, name: &str, context: C) {
		self.entries.entry(name.into()).or_insert_with(BTreeSet::new).insert(context.to_string());
	}

	pub fn is_empty(&self) -> bool {
		self.entries.is_empty()
	}

	pub fn len(&self) -> usize {
		self.entries.len()
	}

	pub fn report(&self, what: &str) {
		if self.is_empty() {
			return
		}
		warn!("missing pcode for {} {} name(s), their rows are dropped:", self.len(), what);
		for (name, contexts) in self.entries.iter() {
			let contexts: Vec<&str> = contexts.iter().map(|s| s.as_str()).collect();
			warn!("  {:?}: {}", name, contexts.join(", "));
		}
	}
}


#[cfg(test)]
pub(crate) mod tests {
	use super::*;

	pub fn row(adm1: &str, adm1_name: &str, adm2: &str, adm2_name: &str) -> BoundaryRow {
		let mut names = BTreeMap::new();
		names.insert("ADM1_EN".to_string(), adm1_name.into());
		names.insert("ADM2_EN".to_string(), adm2_name.into());
		BoundaryRow{
			adm0_pcode: Some("AF".into()),
			adm1_pcode: adm1.into(),
			adm2_pcode: adm2.into(),
			names,
		}
	}

	pub fn sample_index() -> AdminIndex {
		let rows = vec![
			row("AF01", "Kabul", "AF0101", "Kabul"),
			row("AF01", "Kabul", "AF0102", "Paghman"),
			row("AF02", "Kapisa", "AF0201", "Mahmud Raqi"),
		];
		AdminIndex::build(&rows, "ADM1_EN", "ADM2_EN")
	}

	#[test]
	fn builds_lookups_and_parents() {
		let idx = sample_index();
		assert_eq!(idx.lookup_adm1("Kabul").map(|p| p.as_str()), Some("AF01"));
		assert_eq!(idx.lookup_adm2("Paghman").map(|p| p.as_str()), Some("AF0102"));
		assert_eq!(idx.lookup_adm1("Paghman"), None);
		assert_eq!(idx.parent_of("AF0201").map(|p| p.as_str()), Some("AF02"));
		assert_eq!(idx.country().map(|p| p.as_str()), Some("AF"));
		assert_eq!(idx.children("AF01").map(|c| c.len()), Some(2));
	}

	#[test]
	fn duplicate_names_keep_first_occurrence() {
		let rows = vec![
			row("AF01", "Kabul", "AF0101", "Center"),
			row("AF02", "Kapisa", "AF0201", "Center"),
		];
		let idx = AdminIndex::build(&rows, "ADM1_EN", "ADM2_EN");
		assert_eq!(idx.lookup_adm2("Center").map(|p| p.as_str()), Some("AF0101"));
	}

	#[test]
	fn expands_any_level_to_districts() {
		let idx = sample_index();
		assert_eq!(idx.expand_to_adm2("AF").map(|v| v.len()), Some(3));
		assert_eq!(idx.expand_to_adm2("AF01").map(|v| v.len()), Some(2));
		assert_eq!(idx.expand_to_adm2("AF0201").map(|v| v.len()), Some(1));
		assert_eq!(idx.expand_to_adm2("XX"), None);
	}

	#[test]
	fn unresolved_collects_contexts() {
		let mut u = Unresolved::new();
		u.note("Atlantis", "2020-04-01");
		u.note("Atlantis", "2020-04-02");
		u.note("Lemuria", "2020-04-01");
		assert_eq!(u.len(), 2);
		assert!(!u.is_empty());
		u.report("admin-1");
		assert!(Unresolved::new().is_empty());
	}
}
