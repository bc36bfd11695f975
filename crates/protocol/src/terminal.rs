//! Terminal status and version values.

use std::path::PathBuf;

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Subset of `terminal_info` used for readiness and binding checks.
///
/// Unknown fields are ignored so newer terminal builds still decode.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TerminalInfo {
	#[serde(default)]
	pub path: PathBuf,
	#[serde(default)]
	pub data_path: PathBuf,
	#[serde(default)]
	pub connected: bool,
	#[serde(default)]
	pub trade_allowed: bool,
	#[serde(default)]
	pub name: String,
	#[serde(default)]
	pub company: String,
	#[serde(default)]
	pub build: i64,
}

/// Terminal version, build number and release date.
///
/// The terminal reports a `(version, build, date)` tuple; `version` may be an
/// integer or a string depending on the build.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "(Value, i64, String)")]
pub struct TerminalVersion {
	pub version: String,
	pub build: i64,
	pub date: String,
}

impl From<(Value, i64, String)> for TerminalVersion {
	fn from((version, build, date): (Value, i64, String)) -> Self {
		let version = match version {
			Value::String(s) => s,
			other => other.to_string(),
		};
		Self { version, build, date }
	}
}
