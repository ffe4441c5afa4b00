use std::fs;
use std::io;
use std::path::Path;

use log::{error, info, trace};

use reqwest;

use super::error::{Error, Result};


/// Blocking single-attempt downloader for remote source files.
pub struct Client {
	client: reqwest::blocking::Client,
}

impl Client {
	pub fn new() -> Self {
		Self{
			client: reqwest::blocking::Client::new(),
		}
	}

	/// Downloads `url` to `dest`. The body goes to a sibling temporary file
	/// first so that a failed transfer leaves any earlier copy in place.
	pub fn download(&self, url: &str, dest: &Path) -> Result<u64> {
		trace!("GET {}", url);
		let resp = self.client.get(url).send()?;
		match resp.error_for_status_ref() {
			Ok(_) => (),
			Err(e) => match e.status() {
				Some(status) => return Err(Error::Status(status)),
				None => return Err(Error::Request(e)),
			},
		}
		store(resp, dest)
	}

	/// Tries one download and logs the outcome. Returns false on failure, in
	/// which case callers go on with whatever local copy exists.
	pub fn refresh(&self, url: &str, dest: &Path) -> bool {
		match self.download(url, dest) {
			Ok(n) => {
				info!("downloaded {} bytes from {} to {}", n, url, dest.display());
				true
			},
			Err(e) => {
				error!("cannot download {}: {}; using local copy at {} if present", url, e, dest.display());
				false
			},
		}
	}
}

impl Default for Client {
	fn default() -> Self {
		Self::new()
	}
}


/// Copies `body` to `dest` through a `.part` sibling, which is removed
/// again if the copy fails.
fn store<R: io::Read>(mut body: R, dest: &Path) -> Result<u64> {
	if let Some(dir) = dest.parent() {
		fs::create_dir_all(dir)?;
	}
	let tmp = dest.with_extension("part");
	let result = {
		let mut f = io::BufWriter::new(fs::File::create(&tmp)?);
		io::copy(&mut body, &mut f).and_then(|n| io::Write::flush(&mut f).map(|_| n))
	};
	match result {
		Ok(n) => {
			fs::rename(&tmp, dest)?;
			Ok(n)
		},
		Err(e) => {
			let _ = fs::remove_file(&tmp);
			Err(e.into())
		},
	}
}
