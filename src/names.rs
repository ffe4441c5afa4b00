use std::collections::BTreeMap;

use smartstring::alias::{String as SmartString};

use super::error::{Error, Result};


pub static DEFAULT_SUFFIXES: &[&str] = &["Province", "State"];


/// Rewrites raw admin names into the spelling used by the boundary data.
///
/// Administrative suffix words are dropped, whitespace is collapsed, and the
/// result is looked up in a literal alias table. Aliases must map to fixed
/// points of the normalizer, so normalizing twice changes nothing.
#[derive(Debug, Clone)]
pub struct NameNormalizer {
	suffixes: Vec<SmartString>,
	aliases: BTreeMap<SmartString, SmartString>,
}

impl Default for NameNormalizer {
	fn default() -> Self {
		Self{
			suffixes: DEFAULT_SUFFIXES.iter().map(|s| (*s).into()).collect(),
			aliases: BTreeMap::new(),
		}
	}
}

impl NameNormalizer {
	pub fn new<S: AsRef<str>>(suffixes: &[S], aliases: &BTreeMap<String, String>) -> Result<Self> {
		let mut result = Self{
			suffixes: suffixes.iter().map(|s| s.as_ref().trim().into()).collect(),
			aliases: BTreeMap::new(),
		};
		for (from, to) in aliases.iter() {
			let key = result.strip(from);
			let target = result.strip(to);
			if target.as_str() != to.as_str() {
				return Err(Error::config(format!("alias target {:?} is not a normalized name", to)))
			}
			result.aliases.insert(key, target);
		}
		for target in result.aliases.values() {
			if let Some(next) = result.aliases.get(target) {
				if next != target {
					return Err(Error::config(format!("alias target {:?} is itself aliased to {:?}", target, next)))
				}
			}
		}
		Ok(result)
	}

	fn strip(&self, raw: &str) -> SmartString {
		let mut out = SmartString::new();
		for word in raw.split_whitespace() {
			if self.suffixes.iter().any(|s| s.as_str() == word) {
				continue
			}
			if !out.is_empty() {
				out.push(' ');
			}
			out.push_str(word);
		}
		out
	}

	pub fn normalize(&self, raw: &str) -> SmartString {
		let stripped = self.strip(raw);
		match self.aliases.get(&stripped) {
			Some(canonical) => canonical.clone(),
			None => stripped,
		}
	}
}
