//! Arguments for the wrapped `initialize` and `login` calls.

use std::fmt;
use std::path::PathBuf;

use serde::{Deserialize, Serialize};

/// Account credentials. `Debug` never prints the password.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Credentials {
	pub login: u64,
	pub password: String,
	pub server: String,
}

impl Credentials {
	pub fn new(login: u64, password: impl Into<String>, server: impl Into<String>) -> Self {
		Self {
			login,
			password: password.into(),
			server: server.into(),
		}
	}
}

impl fmt::Debug for Credentials {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.debug_struct("Credentials")
			.field("login", &self.login)
			.field("password", &"<redacted>")
			.field("server", &self.server)
			.finish()
	}
}

/// Request passed to the wrapped `initialize`.
///
/// With `credentials` present this is a full bind that logs in; without them
/// it only re-attaches the API's global slot to an already running terminal.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InitializeRequest {
	pub path: PathBuf,
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub credentials: Option<Credentials>,
	pub timeout_ms: u64,
	pub portable: bool,
}

impl InitializeRequest {
	/// Full bind with login, always in portable mode.
	pub fn full(path: impl Into<PathBuf>, credentials: Credentials, timeout_ms: u64) -> Self {
		Self {
			path: path.into(),
			credentials: Some(credentials),
			timeout_ms,
			portable: true,
		}
	}

	/// Cheap re-attach to a terminal that is already logged in.
	pub fn rebind(path: impl Into<PathBuf>, timeout_ms: u64) -> Self {
		Self {
			path: path.into(),
			credentials: None,
			timeout_ms,
			portable: true,
		}
	}

	pub fn is_rebind(&self) -> bool {
		self.credentials.is_none()
	}
}

/// Request passed to the wrapped `login`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LoginRequest {
	pub credentials: Credentials,
	pub timeout_ms: u64,
}
