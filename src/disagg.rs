use std::collections::BTreeMap;

use log::warn;

use super::admin::{Pcode, PopulationTable};
use super::index::Hierarchy;


/// Absolute difference between source and disaggregated totals above which
/// a reconciliation warning is emitted.
pub static DEFAULT_CONSERVATION_TOLERANCE: f64 = 10.0;


pub type Fractions = BTreeMap<Pcode, f64>;


/// Share of the parent's population held by each child.
///
/// Children without population data count as zero. Returns `None` (after
/// logging) if the parent is unknown or its children hold no population at
/// all, so that no child value is ever set from a division by zero.
pub fn fractions<H: Hierarchy + ?Sized>(parent: &str, hierarchy: &H, population: &PopulationTable) -> Option<Fractions> {
	let children = match hierarchy.children(parent) {
		Some(c) if !c.is_empty() => c,
		_ => {
			warn!("admin unit {} has no children to disaggregate to", parent);
			return None
		},
	};
	let totals: Vec<(&Pcode, f64)> = children.iter().map(|c| {
		let total = match population.total(c) {
			Some(t) => t,
			None => {
				warn!("no population data for {} (child of {}), counting it as zero", c, parent);
				0.
			},
		};
		(c, total)
	}).collect();
	let parent_total: f64 = totals.iter().map(|(_, t)| *t).sum();
	if !(parent_total > 0.) {
		warn!("aggregate population of {} is {}, cannot compute child fractions", parent, parent_total);
		return None
	}
	Some(totals.into_iter().map(|(c, t)| (c.clone(), t / parent_total)).collect())
}

pub fn scale(value: f64, fractions: &Fractions) -> BTreeMap<Pcode, f64> {
	fractions.iter().map(|(c, f)| (c.clone(), value * f)).collect()
}


/// Compares a source total with the sum of the records generated from it.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Conservation {
	pub source: f64,
	pub output: f64,
}

impl Conservation {
	pub fn new(source: f64, output: f64) -> Self {
		Self{source, output}
	}

	pub fn discrepancy(&self) -> f64 {
		(self.output - self.source).abs()
	}

	/// Logs a warning and returns false if the discrepancy exceeds
	/// `tolerance`. Never fails the run.
	pub fn check(&self, what: &str, tolerance: f64) -> bool {
		if self.discrepancy() > tolerance {
			warn!(
				"the sum of input and output {} doesn't match: input {}, output {} (tolerance {})",
				what, self.source, self.output, tolerance,
			);
			false
		} else {
			true
		}
	}
}


#[cfg(test)]
mod tests {
	use super::*;
	use crate::admin::{Gender, Sadd};

	fn pop(entries: &[(&str, f64)]) -> PopulationTable {
		let mut t = PopulationTable::new();
		for (pcode, total) in entries {
			let mut s = Sadd::zero();
			// spread over a few bands to exercise the summation
			s.set(Gender::Female, 0, total * 0.25);
			s.set(Gender::Male, 5, total * 0.5);
			s.set(Gender::Male, 17, total * 0.25);
			t.insert((*pcode).into(), s);
		}
		t
	}

	fn tree(parent: &str, children: &[&str]) -> BTreeMap<Pcode, Vec<Pcode>> {
		let mut h = BTreeMap::new();
		h.insert(parent.into(), children.iter().map(|c| (*c).into()).collect());
		h
	}

	#[test]
	fn scenario_300_700() {
		let h = tree("P", &["A", "B"]);
		let p = pop(&[("A", 300.), ("B", 700.)]);
		let f = fractions("P", &h, &p).unwrap();
		assert!((f["A"] - 0.3).abs() < 1e-12);
		assert!((f["B"] - 0.7).abs() < 1e-12);
		let v = scale(50., &f);
		assert!((v["A"] - 15.0).abs() < 1e-9);
		assert!((v["B"] - 35.0).abs() < 1e-9);
	}

	#[test]
	fn fractions_sum_to_one_and_scale_conserves() {
		let h = tree("P", &["A", "B", "C", "D"]);
		let p = pop(&[("A", 1.), ("B", 12345.678), ("C", 0.), ("D", 99.5)]);
		let f = fractions("P", &h, &p).unwrap();
		assert!((f.values().sum::<f64>() - 1.0).abs() < 1e-6);
		for f in f.values() {
			assert!(*f >= 0. && *f <= 1.);
		}
		for value in [0., 1., 17.25, 1e7].iter() {
			let s = scale(*value, &f);
			assert!((s.values().sum::<f64>() - value).abs() < 1e-6 * value.max(1.));
		}
	}

	#[test]
	fn zero_population_parent_is_skipped() {
		let h = tree("P", &["A", "B"]);
		let p = pop(&[("A", 0.), ("B", 0.)]);
		assert!(fractions("P", &h, &p).is_none());
		assert!(fractions("Q", &h, &p).is_none());
	}

	#[test]
	fn missing_child_counts_as_zero() {
		let h = tree("P", &["A", "B"]);
		let p = pop(&[("A", 10.)]);
		let f = fractions("P", &h, &p).unwrap();
		assert_eq!(f["A"], 1.0);
		assert_eq!(f["B"], 0.0);
	}

	#[test]
	fn conservation_check() {
		assert!(Conservation::new(100., 105.).check("cases", 10.));
		assert!(!Conservation::new(100., 111.).check("cases", 10.));
	}
}
