//! The terminal's `(code, description)` error tuple.

use std::fmt;

use serde::{Deserialize, Serialize};

/// Well-known result codes reported by the terminal API.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ResultCode {
	Ok,
	Fail,
	InvalidParams,
	NoMemory,
	NotFound,
	InvalidVersion,
	AuthFailed,
	Unsupported,
	AutoTradingDisabled,
	InternalFail,
	InternalFailSend,
	InternalFailReceive,
	InternalFailInit,
	InternalFailConnect,
	InternalFailTimeout,
}

impl ResultCode {
	pub const fn code(self) -> i32 {
		match self {
			Self::Ok => 1,
			Self::Fail => -1,
			Self::InvalidParams => -2,
			Self::NoMemory => -3,
			Self::NotFound => -4,
			Self::InvalidVersion => -5,
			Self::AuthFailed => -6,
			Self::Unsupported => -7,
			Self::AutoTradingDisabled => -8,
			Self::InternalFail => -10000,
			Self::InternalFailSend => -10001,
			Self::InternalFailReceive => -10002,
			Self::InternalFailInit => -10003,
			Self::InternalFailConnect => -10004,
			Self::InternalFailTimeout => -10005,
		}
	}

	pub const fn from_code(code: i32) -> Option<Self> {
		Some(match code {
			1 => Self::Ok,
			-1 => Self::Fail,
			-2 => Self::InvalidParams,
			-3 => Self::NoMemory,
			-4 => Self::NotFound,
			-5 => Self::InvalidVersion,
			-6 => Self::AuthFailed,
			-7 => Self::Unsupported,
			-8 => Self::AutoTradingDisabled,
			-10000 => Self::InternalFail,
			-10001 => Self::InternalFailSend,
			-10002 => Self::InternalFailReceive,
			-10003 => Self::InternalFailInit,
			-10004 => Self::InternalFailConnect,
			-10005 => Self::InternalFailTimeout,
			_ => return None,
		})
	}

	/// Canonical description the terminal uses for this code.
	pub const fn description(self) -> &'static str {
		match self {
			Self::Ok => "Success",
			Self::Fail => "Generic fail",
			Self::InvalidParams => "Invalid arguments/parameters",
			Self::NoMemory => "No memory condition",
			Self::NotFound => "No history",
			Self::InvalidVersion => "Invalid version",
			Self::AuthFailed => "Authorization failed",
			Self::Unsupported => "Unsupported method",
			Self::AutoTradingDisabled => "Auto-trading disabled",
			Self::InternalFail => "Internal IPC general error",
			Self::InternalFailSend => "Internal IPC send failed",
			Self::InternalFailReceive => "Internal IPC recv failed",
			Self::InternalFailInit => "Internal IPC initialization fail",
			Self::InternalFailConnect => "No IPC connection",
			Self::InternalFailTimeout => "Internal timeout",
		}
	}
}

/// Error tuple returned by the terminal's `last_error()`.
///
/// Encoded on the wire as a two-element array:
/// ```json
/// [-6, "Terminal: Authorization failed"]
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "(i32, String)", into = "(i32, String)")]
pub struct LastError {
	pub code: i32,
	pub description: String,
}

impl LastError {
	pub fn new(code: i32, description: impl Into<String>) -> Self {
		Self {
			code,
			description: description.into(),
		}
	}

	/// Builds the error using the terminal's canonical description for `code`.
	pub fn from_result_code(code: ResultCode) -> Self {
		Self::new(code.code(), code.description())
	}

	/// The "no error" tuple.
	pub fn ok() -> Self {
		Self::from_result_code(ResultCode::Ok)
	}

	pub fn result_code(&self) -> Option<ResultCode> {
		ResultCode::from_code(self.code)
	}

	pub fn is_ok(&self) -> bool {
		self.code == ResultCode::Ok.code()
	}

	pub fn is_auth_failure(&self) -> bool {
		self.result_code() == Some(ResultCode::AuthFailed)
	}

	pub fn is_timeout(&self) -> bool {
		self.result_code() == Some(ResultCode::InternalFailTimeout)
	}
}

impl Default for LastError {
	fn default() -> Self {
		Self::ok()
	}
}

impl From<(i32, String)> for LastError {
	fn from((code, description): (i32, String)) -> Self {
		Self { code, description }
	}
}

impl From<LastError> for (i32, String) {
	fn from(err: LastError) -> Self {
		(err.code, err.description)
	}
}

impl fmt::Display for LastError {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		write!(f, "({}, {})", self.code, self.description)
	}
}

impl std::error::Error for LastError {}

#[cfg(test)]
mod tests {
	use serde_json::json;

	use super::*;

	#[test]
	fn decodes_from_tuple() {
		let err: LastError = serde_json::from_value(json!([-6, "Terminal: Authorization failed"])).unwrap();
		assert_eq!(err.code, -6);
		assert!(err.is_auth_failure());
		assert_eq!(serde_json::to_value(&err).unwrap(), json!([-6, "Terminal: Authorization failed"]));
	}

	#[test]
	fn every_code_maps_back() {
		for code in [1, -1, -2, -3, -4, -5, -6, -7, -8, -10000, -10001, -10002, -10003, -10004, -10005] {
			let known = ResultCode::from_code(code).unwrap();
			assert_eq!(known.code(), code);
		}
		assert!(ResultCode::from_code(42).is_none());
	}

	#[test]
	fn default_is_success() {
		let err = LastError::default();
		assert!(err.is_ok());
		assert_eq!(err.to_string(), "(1, Success)");
	}
}
