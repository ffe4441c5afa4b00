use std::collections::HashMap;
use std::hash::Hash;
use std::ops::AddAssign;

use num_traits::Zero;

use chrono::NaiveDate;


pub trait TimeSeriesKey: Hash + Eq + Clone + std::fmt::Debug {}
impl<T: Hash + Eq + Clone + std::fmt::Debug> TimeSeriesKey for T {}


/// Dense per-key daily series over the inclusive range `start..=last`.
#[derive(Debug, Clone)]
pub struct TimeSeries<T: Hash + Eq, V: Copy> {
	start: NaiveDate,
	keys: HashMap<T, usize>,
	time_series: Vec<Vec<V>>,
	len: usize,
}

impl<T: Hash + Eq, V: Copy> TimeSeries<T, V> {
	pub fn new(start: NaiveDate, last: NaiveDate) -> Self {
		let len = (last - start).num_days() + 1;
		let len = if len < 0 { 0 } else { len as usize };
		Self{
			start,
			len,
			keys: HashMap::new(),
			time_series: Vec::new(),
		}
	}

	#[inline(always)]
	pub fn date_index(&self, other: NaiveDate) -> Option<usize> {
		let days = (other - self.start).num_days();
		if days < 0 || days as usize >= self.len {
			return None
		}
		return Some(days as usize)
	}

	#[inline(always)]
	pub fn start(&self) -> NaiveDate {
		self.start
	}

	#[inline(always)]
	pub fn len(&self) -> usize {
		self.len
	}

	pub fn dates(&self) -> impl Iterator<Item = NaiveDate> {
		self.start.iter_days().take(self.len)
	}

	pub fn get_index(&self, k: &T) -> Option<usize> {
		Some(*self.keys.get(k)?)
	}

	pub fn get(&self, k: &T) -> Option<&[V]> {
		let index = self.get_index(k)?;
		Some(&self.time_series[index][..])
	}

	pub fn get_value(&self, k: &T, i: usize) -> Option<V> {
		if i >= self.len {
			return None
		}
		self.get(k).map(|v| v[i])
	}

	pub fn keys(&self) -> std::collections::hash_map::Keys<'_, T, usize> {
		self.keys.keys()
	}
}

impl<T: TimeSeriesKey, V: Copy> TimeSeries<T, V> {
	pub fn get_or_create_with(&mut self, k: T, fill: V) -> &mut [V] {
		let index = match self.keys.get(&k) {
			Some(v) => *v,
			None => {
				let v = self.time_series.len();
				self.time_series.push(vec![fill; self.len]);
				self.keys.insert(k, v);
				v
			},
		};
		&mut self.time_series[index][..]
	}
}

impl<T: TimeSeriesKey, V: Copy + Zero> TimeSeries<T, V> {
	pub fn get_or_create(&mut self, k: T) -> &mut [V] {
		self.get_or_create_with(k, V::zero())
	}
}

impl<T: TimeSeriesKey, V: Copy + Zero + AddAssign> TimeSeries<T, V> {
	pub fn cumsum(&mut self) {
		for vec in self.time_series.iter_mut() {
			let mut accum = V::zero();
			for v in vec.iter_mut() {
				accum += *v;
				*v = accum;
			}
		}
	}
}

impl<T: TimeSeriesKey, V: Copy + PartialOrd> TimeSeries<T, V> {
	pub fn is_non_decreasing(&self, k: &T) -> bool {
		match self.get(k) {
			Some(vec) => vec.windows(2).all(|w| w[1] >= w[0]),
			None => true,
		}
	}
}


/// Sparse observations on a dense axis, `None` where nothing was reported.
pub type Observations<T> = TimeSeries<T, Option<f64>>;

impl<T: TimeSeriesKey> TimeSeries<T, Option<f64>> {
	/// Linear interpolation between observations. Days after the last
	/// observation carry its value forward; days before the first one are 0.
	pub fn interpolated(&self) -> TimeSeries<T, f64> {
		TimeSeries::<T, f64>{
			start: self.start,
			len: self.len,
			keys: self.keys.clone(),
			time_series: self.time_series.iter().map(|vec| interpolate_forward(vec)).collect(),
		}
	}
}

fn interpolate_forward(vec: &[Option<f64>]) -> Vec<f64> {
	let mut out = vec![0.; vec.len()];
	let mut prev: Option<(usize, f64)> = None;
	for (i, v) in vec.iter().enumerate() {
		let v = match v {
			Some(v) => *v,
			None => continue,
		};
		match prev {
			Some((j, pv)) => {
				let span = (i - j) as f64;
				for k in (j + 1)..i {
					out[k] = pv + (v - pv) * ((k - j) as f64) / span;
				}
			},
			None => (),
		}
		out[i] = v;
		prev = Some((i, v));
	}
	if let Some((j, pv)) = prev {
		for slot in out[(j + 1)..].iter_mut() {
			*slot = pv;
		}
	}
	out
}


#[cfg(test)]
mod tests {
	use super::*;

	fn d(y: i32, m: u32, day: u32) -> NaiveDate {
		NaiveDate::from_ymd_opt(y, m, day).unwrap()
	}

	#[test]
	fn inclusive_axis() {
		let ts = TimeSeries::<&str, f64>::new(d(2020, 3, 1), d(2020, 3, 10));
		assert_eq!(ts.len(), 10);
		assert_eq!(ts.date_index(d(2020, 3, 10)), Some(9));
		assert_eq!(ts.date_index(d(2020, 3, 11)), None);
		assert_eq!(ts.date_index(d(2020, 2, 29)), None);
		assert_eq!(ts.dates().count(), 10);
	}

	#[test]
	fn cumsum_is_non_decreasing() {
		let mut ts = TimeSeries::<&str, f64>::new(d(2020, 3, 1), d(2020, 3, 5));
		ts.get_or_create("a").copy_from_slice(&[1., 0., 2., 0., 5.]);
		ts.cumsum();
		assert_eq!(ts.get(&"a").unwrap(), &[1., 1., 3., 3., 8.]);
		assert!(ts.is_non_decreasing(&"a"));
		ts.get_or_create("b").copy_from_slice(&[1., 3., 2., 4., 5.]);
		assert!(!ts.is_non_decreasing(&"b"));
		assert!(ts.is_non_decreasing(&"missing"));
		assert_eq!(ts.keys().count(), 2);
	}

	#[test]
	fn interpolation_fills_gaps_forward_only() {
		let mut obs = Observations::<&str>::new(d(2020, 3, 1), d(2020, 3, 7));
		obs.get_or_create_with("a", None).copy_from_slice(&[None, Some(2.), None, None, Some(8.), None, None]);
		let ts = obs.interpolated();
		assert_eq!(ts.get(&"a").unwrap(), &[0., 2., 4., 6., 8., 8., 8.]);
	}

	#[test]
	fn interpolation_of_empty_series_is_zero() {
		let mut obs = Observations::<&str>::new(d(2020, 3, 1), d(2020, 3, 3));
		obs.get_or_create_with("a", None);
		assert_eq!(obs.interpolated().get(&"a").unwrap(), &[0., 0., 0.]);
	}
}
