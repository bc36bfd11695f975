//! Immutable description of one logical connection.

use std::fmt;
use std::fs::OpenOptions;
use std::path::{Component, Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};

use mtplex_protocol::{Credentials, InitializeRequest, LoginRequest};
use serde::Serialize;

use crate::error::{Error, Result};
use crate::options::ClientOptions;

static SCRATCH_COUNTER: AtomicU64 = AtomicU64::new(0);

/// Installation directories that are shared system-wide and therefore never
/// hold a private terminal copy.
pub const DEFAULT_SHARED_INSTALL_DIRS: &[&str] = &["Program Files", "Program Files (x86)"];

/// Key that distinguishes one terminal copy from every other.
///
/// Derived from the canonical executable path, because the path is what the
/// terminal API itself uses to tell instances apart.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
#[serde(transparent)]
pub struct IdentityKey(String);

impl IdentityKey {
	pub fn from_path(path: &Path) -> Self {
		let raw = path.to_string_lossy();
		if cfg!(windows) {
			Self(raw.to_lowercase())
		} else {
			Self(raw.into_owned())
		}
	}

	pub fn as_str(&self) -> &str {
		&self.0
	}
}

impl fmt::Display for IdentityKey {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.write_str(&self.0)
	}
}

/// Executable path, credentials and identity for one client.
#[derive(Debug, Clone)]
pub struct InstanceDescriptor {
	executable: PathBuf,
	credentials: Credentials,
	identity: IdentityKey,
}

impl InstanceDescriptor {
	/// Validates the descriptor against the default shared-install list.
	pub fn new(terminal_path: impl AsRef<Path>, login: u64, password: impl Into<String>, server: impl Into<String>) -> Result<Self> {
		Self::with_options(
			terminal_path,
			Credentials::new(login, password, server),
			&ClientOptions::default(),
		)
	}

	/// Validates the executable path and credentials shape.
	///
	/// Detection of shared installs is best-effort: a path under one of
	/// `options.shared_install_dirs`, or in a directory this process cannot
	/// write to, is rejected.
	pub fn with_options(terminal_path: impl AsRef<Path>, credentials: Credentials, options: &ClientOptions) -> Result<Self> {
		let terminal_path = terminal_path.as_ref();
		if terminal_path.as_os_str().is_empty() {
			return Err(Error::Configuration("terminal path is empty".to_string()));
		}
		if credentials.login == 0 {
			return Err(Error::Configuration("login must be a non-zero account number".to_string()));
		}
		if credentials.server.trim().is_empty() {
			return Err(Error::Configuration("server name is empty".to_string()));
		}

		let metadata = std::fs::metadata(terminal_path)
			.map_err(|e| Error::Configuration(format!("terminal path {} does not exist: {e}", terminal_path.display())))?;
		if !metadata.is_file() {
			return Err(Error::Configuration(format!("terminal path {} is not a file", terminal_path.display())));
		}

		let executable = std::path::absolute(terminal_path)
			.map_err(|e| Error::Configuration(format!("cannot resolve {}: {e}", terminal_path.display())))?;
		let canonical = std::fs::canonicalize(terminal_path)
			.map_err(|e| Error::Configuration(format!("cannot resolve {}: {e}", terminal_path.display())))?;

		if let Some(dir) = shared_install_component(&canonical, &options.shared_install_dirs) {
			return Err(Error::Configuration(format!(
				"{} is inside the shared installation directory \"{dir}\"; copy the terminal to a private directory",
				canonical.display()
			)));
		}

		let terminal_dir = canonical.parent().unwrap_or_else(|| Path::new("."));
		check_writable(terminal_dir).map_err(|e| {
			Error::Configuration(format!(
				"no write permission in {} ({e}); copy the terminal to a directory you own",
				terminal_dir.display()
			))
		})?;

		Ok(Self {
			executable,
			identity: IdentityKey::from_path(&canonical),
			credentials,
		})
	}

	pub fn executable(&self) -> &Path {
		&self.executable
	}

	pub fn identity(&self) -> &IdentityKey {
		&self.identity
	}

	pub fn login(&self) -> u64 {
		self.credentials.login
	}

	pub fn server(&self) -> &str {
		&self.credentials.server
	}

	pub(crate) fn initialize_request(&self, timeout_ms: u64) -> InitializeRequest {
		InitializeRequest::full(&self.executable, self.credentials.clone(), timeout_ms)
	}

	pub(crate) fn rebind_request(&self, timeout_ms: u64) -> InitializeRequest {
		InitializeRequest::rebind(&self.executable, timeout_ms)
	}

	pub(crate) fn login_request(&self, timeout_ms: u64) -> LoginRequest {
		LoginRequest {
			credentials: self.credentials.clone(),
			timeout_ms,
		}
	}
}

fn shared_install_component<'a>(path: &Path, shared_dirs: &'a [String]) -> Option<&'a str> {
	path.components().find_map(|component| {
		let Component::Normal(name) = component else {
			return None;
		};
		let name = name.to_string_lossy();
		shared_dirs.iter().map(String::as_str).find(|dir| name.eq_ignore_ascii_case(dir))
	})
}

fn check_writable(dir: &Path) -> std::io::Result<()> {
	let scratch = dir.join(format!(
		".mtplex-write-{}-{}",
		std::process::id(),
		SCRATCH_COUNTER.fetch_add(1, Ordering::Relaxed)
	));
	OpenOptions::new().write(true).create_new(true).open(&scratch)?;
	std::fs::remove_file(&scratch)
}
