use std::env;
use std::path::PathBuf;

use chrono::{Local, NaiveDate};

mod admin;
mod cases;
mod config;
mod disagg;
mod error;
mod exposure;
pub mod fetch;
mod graph;
mod index;
mod ioutil;
mod names;
mod npi;
mod pipeline;
mod progress;
mod timeseries;

pub use admin::*;
pub use cases::*;
pub use config::*;
pub use disagg::*;
pub use error::{Error, Result};
pub use exposure::*;
pub use graph::*;
pub use index::*;
pub use ioutil::{magic_open, open_artifact, write_atomic, RawTable};
pub use names::*;
pub use npi::*;
pub use pipeline::*;
pub use progress::*;
pub use timeseries::*;


pub fn naive_today() -> NaiveDate {
	Local::now().naive_local().date()
}

/// Base directory of inputs and outputs, `COVID_GRAPH_DIR` or the current
/// directory.
pub fn env_base_dir() -> PathBuf {
	env::var("COVID_GRAPH_DIR").map(PathBuf::from).unwrap_or_else(|_| PathBuf::from("."))
}

pub fn init_logging() {
	env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();
}


/// Creation stamp written next to every generated table.
#[derive(Debug, Clone, PartialEq)]
pub struct Provenance {
	pub created_at: String,
	pub created_by: String,
}

impl Provenance {
	pub fn now() -> Self {
		let created_by = env::var("USER")
			.or_else(|_| env::var("USERNAME"))
			.unwrap_or_else(|_| "unknown".into());
		Self{
			created_at: Local::now().naive_local().to_string(),
			created_by,
		}
	}
}
