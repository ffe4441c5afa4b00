use std::fs;
use std::io;
use std::io::Read;
use std::path::Path;

use flate2;

use super::error::{Error, Result};


pub fn magic_open<P: AsRef<Path>>(path: P) -> io::Result<Box<dyn Read>> {
	let path = path.as_ref();
	match path.extension() {
		Some(x) if x == "gz" => {
			Ok(Box::new(flate2::read::GzDecoder::new(fs::File::open(path)?)))
		},
		_ => Ok(Box::new(fs::File::open(path)?)),
	}
}

/// Like `magic_open`, but a missing file becomes `Error::MissingArtifact`.
pub fn open_artifact<P: AsRef<Path>>(path: P) -> Result<Box<dyn Read>> {
	let path = path.as_ref();
	match magic_open(path) {
		Ok(r) => Ok(r),
		Err(e) if e.kind() == io::ErrorKind::NotFound => Err(Error::MissingArtifact(path.to_path_buf())),
		Err(e) => Err(e.into()),
	}
}

/// Writes `path` through `f` into a sibling temporary file which replaces
/// `path` only once `f` succeeded. Parent directories are created.
pub fn write_atomic<P, F>(path: P, f: F) -> Result<()>
	where P: AsRef<Path>,
	      F: FnOnce(&mut io::BufWriter<fs::File>) -> Result<()>,
{
	let path = path.as_ref();
	if let Some(dir) = path.parent() {
		fs::create_dir_all(dir)?;
	}
	let tmp = path.with_extension("tmp");
	let result = {
		let mut w = io::BufWriter::new(fs::File::create(&tmp)?);
		f(&mut w).and_then(|_| Ok(io::Write::flush(&mut w)?))
	};
	match result {
		Ok(()) => {
			fs::rename(&tmp, path)?;
			Ok(())
		},
		Err(e) => {
			// partial output must not survive
			let _ = fs::remove_file(&tmp);
			Err(e)
		},
	}
}


/// A table read with an explicit header row index, after dropping the given
/// physical row indices.
#[derive(Debug, Clone)]
pub struct RawTable {
	pub headers: Vec<String>,
	pub rows: Vec<csv::StringRecord>,
}

impl RawTable {
	pub fn read<R: io::Read>(r: R, header: usize, skip_rows: &[usize]) -> Result<Self> {
		let mut r = csv::ReaderBuilder::new()
			.has_headers(false)
			.flexible(true)
			.from_reader(r);
		let mut kept = Vec::new();
		for (i, row) in r.records().enumerate() {
			let row = row?;
			if skip_rows.contains(&i) {
				continue
			}
			kept.push(row);
		}
		if header >= kept.len() {
			return Err(Error::data(format!("header row {} beyond end of table ({} rows)", header, kept.len())))
		}
		let headers = kept[header].iter().map(|h| h.trim().to_string()).collect();
		let rows = kept.split_off(header + 1);
		Ok(Self{headers, rows})
	}

	pub fn column(&self, name: &str) -> Option<usize> {
		self.headers.iter().position(|h| h == name)
	}

	pub fn rename<'x, I: IntoIterator<Item = (&'x String, &'x String)>>(&mut self, renames: I) {
		for (from, to) in renames {
			for h in self.headers.iter_mut() {
				if h == from {
					*h = to.clone();
				}
			}
		}
	}
}
