use std::fmt;
use std::io;
use std::path::PathBuf;


#[derive(Debug)]
pub enum Error {
	Io(io::Error),
	Csv(csv::Error),
	Yaml(serde_yaml::Error),
	Json(serde_json::Error),
	Request(reqwest::Error),
	Status(reqwest::StatusCode),
	MissingArtifact(PathBuf),
	Config(String),
	Data(String),
}

impl Error {
	pub fn config<S: Into<String>>(msg: S) -> Self {
		Self::Config(msg.into())
	}

	pub fn data<S: Into<String>>(msg: S) -> Self {
		Self::Data(msg.into())
	}

	/// True if the error means an input file was not there.
	pub fn is_missing(&self) -> bool {
		match self {
			Self::MissingArtifact(_) => true,
			Self::Io(e) => e.kind() == io::ErrorKind::NotFound,
			Self::Csv(e) => match e.kind() {
				csv::ErrorKind::Io(e) => e.kind() == io::ErrorKind::NotFound,
				_ => false,
			},
			_ => false,
		}
	}
}

impl fmt::Display for Error {
	fn fmt<'f>(&self, f: &'f mut fmt::Formatter) -> fmt::Result {
		match self {
			Self::Io(e) => fmt::Display::fmt(e, f),
			Self::Csv(e) => fmt::Display::fmt(e, f),
			Self::Yaml(e) => write!(f, "invalid configuration: {}", e),
			Self::Json(e) => fmt::Display::fmt(e, f),
			Self::Request(e) => fmt::Display::fmt(e, f),
			Self::Status(code) => write!(f, "unexpected response status {}", code),
			Self::MissingArtifact(p) => write!(f, "missing input file {}", p.display()),
			Self::Config(msg) => write!(f, "invalid configuration: {}", msg),
			Self::Data(msg) => write!(f, "malformed data: {}", msg),
		}
	}
}

impl std::error::Error for Error {}

impl From<io::Error> for Error {
	fn from(other: io::Error) -> Self {
		Self::Io(other)
	}
}

impl From<csv::Error> for Error {
	fn from(other: csv::Error) -> Self {
		Self::Csv(other)
	}
}

impl From<serde_yaml::Error> for Error {
	fn from(other: serde_yaml::Error) -> Self {
		Self::Yaml(other)
	}
}

impl From<serde_json::Error> for Error {
	fn from(other: serde_json::Error) -> Self {
		Self::Json(other)
	}
}

impl From<reqwest::Error> for Error {
	fn from(other: reqwest::Error) -> Self {
		Self::Request(other)
	}
}

pub type Result<T> = std::result::Result<T, Error>;
