use std::io;
use std::io::Write;
use std::time;

use log::info;


pub trait ProgressSink {
	fn update(&mut self, label: &str, inow: usize, n: Option<usize>);
	fn finish(&mut self, label: &str, inow: usize);
}

/// Carriage-return meter for interactive terminals.
pub struct TtySink {
	t0: time::Instant,
}

impl TtySink {
	pub fn new() -> Self {
		Self{t0: time::Instant::now()}
	}

	fn rate(&self, inow: usize) -> f64 {
		let dt = self.t0.elapsed().as_secs_f64();
		if dt > 0. {
			inow as f64 / dt
		} else {
			0.
		}
	}
}

impl ProgressSink for TtySink {
	fn update(&mut self, label: &str, inow: usize, n: Option<usize>) {
		match n {
			Some(n) if n > 0 => {
				let done = (inow as f64) / (n as f64);
				print!("{} {:6.0}% [{:6.2}/s]\r", label, done * 100.0, self.rate(inow));
			},
			_ => {
				print!("{} {:12} [{:6.2}/s]\r", label, inow, self.rate(inow));
			},
		}
		// progress output is best-effort
		let _ = io::stdout().flush();
	}

	fn finish(&mut self, label: &str, inow: usize) {
		println!("{} {:12} [{:6.2}/s]", label, inow, self.rate(inow));
		self.t0 = time::Instant::now();
	}
}

/// Progress reporting through the log when stdout is not a terminal.
pub struct LogSink {
	every: usize,
}

impl LogSink {
	pub fn new(every: usize) -> Self {
		Self{every: every.max(1)}
	}
}

impl ProgressSink for LogSink {
	fn update(&mut self, label: &str, inow: usize, n: Option<usize>) {
		if inow % self.every != 0 {
			return
		}
		match n {
			Some(n) => info!("{}: {}/{}", label, inow, n),
			None => info!("{}: {}", label, inow),
		}
	}

	fn finish(&mut self, label: &str, inow: usize) {
		info!("{}: done ({})", label, inow);
	}
}

pub struct NullSink;

impl ProgressSink for NullSink {
	fn update(&mut self, _label: &str, _inow: usize, _n: Option<usize>) {}
	fn finish(&mut self, _label: &str, _inow: usize) {}
}

pub fn default_output() -> Box<dyn ProgressSink> {
	if isatty::stdout_isatty() {
		Box::new(TtySink::new())
	} else {
		Box::new(LogSink::new(100000))
	}
}


/// Counts rows of unknown total and reports every `step` rows.
pub struct CountMeter<'s, S: ProgressSink + ?Sized> {
	sink: &'s mut S,
	label: &'static str,
	step: usize,
	n: usize,
}

impl<'s, S: ProgressSink + ?Sized> CountMeter<'s, S> {
	pub fn new(sink: &'s mut S, label: &'static str) -> Self {
		Self{sink, label, step: 10000, n: 0}
	}

	pub fn tick(&mut self) {
		self.n += 1;
		if self.n % self.step == 0 {
			self.sink.update(self.label, self.n, None);
		}
	}

	pub fn finish(self) -> usize {
		self.sink.finish(self.label, self.n);
		self.n
	}
}


#[cfg(test)]
mod tests {
	use super::*;

	struct Recorder {
		updates: Vec<usize>,
		finished: Option<usize>,
	}

	impl ProgressSink for Recorder {
		fn update(&mut self, _label: &str, inow: usize, _n: Option<usize>) {
			self.updates.push(inow);
		}

		fn finish(&mut self, _label: &str, inow: usize) {
			self.finished = Some(inow);
		}
	}

	#[test]
	fn count_meter_reports_in_steps() {
		let mut r = Recorder{updates: Vec::new(), finished: None};
		let mut pm = CountMeter::new(&mut r, "rows");
		for _ in 0..25000 {
			pm.tick();
		}
		assert_eq!(pm.finish(), 25000);
		assert_eq!(r.updates, vec![10000, 20000]);
		assert_eq!(r.finished, Some(25000));
	}
}
