//! Client configuration: defaults, JSON file, environment overrides.

use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::descriptor::DEFAULT_SHARED_INSTALL_DIRS;
use crate::error::{Error, Result};
use crate::{DEFAULT_POLL_INTERVAL_MS, DEFAULT_TIMEOUT_MS};

pub const ENV_TIMEOUT_MS: &str = "MTPLEX_TIMEOUT_MS";
pub const ENV_POLL_INTERVAL_MS: &str = "MTPLEX_POLL_INTERVAL_MS";
pub const ENV_KEEP_TERMINAL: &str = "MTPLEX_KEEP_TERMINAL";

/// Tunables for client construction and teardown.
///
/// Stored as camelCase JSON; every field is optional:
/// ```json
/// { "timeoutMs": 30000, "keepTerminalRunning": true, "launchArgs": ["/skipupdate"] }
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ClientOptions {
	/// Upper bound on launch + login + readiness, and the timeout handed to the terminal API.
	pub timeout_ms: u64,
	pub poll_interval_ms: u64,
	/// Leave the terminal process running after shutdown so the next session can attach.
	pub keep_terminal_running: bool,
	/// Start the terminal process before binding. When off, the terminal API is
	/// expected to start the executable itself.
	pub launch_terminal: bool,
	/// Extra arguments after the portable flag.
	pub launch_args: Vec<String>,
	pub shared_install_dirs: Vec<String>,
}

impl Default for ClientOptions {
	fn default() -> Self {
		Self {
			timeout_ms: DEFAULT_TIMEOUT_MS,
			poll_interval_ms: DEFAULT_POLL_INTERVAL_MS,
			keep_terminal_running: false,
			launch_terminal: true,
			launch_args: Vec::new(),
			shared_install_dirs: DEFAULT_SHARED_INSTALL_DIRS.iter().map(|s| s.to_string()).collect(),
		}
	}
}

impl ClientOptions {
	/// Loads options from a JSON file. Missing fields take their defaults.
	pub fn load(path: &Path) -> Result<Self> {
		let content = std::fs::read_to_string(path).map_err(|e| Error::Configuration(format!("cannot read {}: {e}", path.display())))?;
		serde_json::from_str(&content).map_err(|e| Error::Configuration(format!("invalid options in {}: {e}", path.display())))
	}

	/// Overlays `MTPLEX_*` environment variables.
	pub fn with_env_overrides(self) -> Result<Self> {
		self.apply_env(|key| std::env::var(key).ok())
	}

	/// Overlays values from `lookup`, keyed by the `MTPLEX_*` variable names.
	pub fn apply_env(mut self, lookup: impl Fn(&str) -> Option<String>) -> Result<Self> {
		if let Some(raw) = lookup(ENV_TIMEOUT_MS) {
			self.timeout_ms = parse_env(ENV_TIMEOUT_MS, &raw)?;
		}
		if let Some(raw) = lookup(ENV_POLL_INTERVAL_MS) {
			self.poll_interval_ms = parse_env(ENV_POLL_INTERVAL_MS, &raw)?;
		}
		if let Some(raw) = lookup(ENV_KEEP_TERMINAL) {
			self.keep_terminal_running = match raw.trim().to_ascii_lowercase().as_str() {
				"1" | "true" | "yes" | "on" => true,
				"0" | "false" | "no" | "off" | "" => false,
				other => return Err(Error::Configuration(format!("{ENV_KEEP_TERMINAL}: expected a boolean, got \"{other}\""))),
			};
		}
		Ok(self)
	}

	pub fn timeout(&self) -> Duration {
		Duration::from_millis(self.timeout_ms)
	}

	pub fn poll_interval(&self) -> Duration {
		Duration::from_millis(self.poll_interval_ms.max(1))
	}

	pub fn with_timeout(mut self, timeout: Duration) -> Self {
		self.timeout_ms = u64::try_from(timeout.as_millis()).unwrap_or(u64::MAX);
		self
	}

	pub fn with_poll_interval(mut self, interval: Duration) -> Self {
		self.poll_interval_ms = u64::try_from(interval.as_millis()).unwrap_or(u64::MAX);
		self
	}

	pub fn with_keep_terminal_running(mut self, keep: bool) -> Self {
		self.keep_terminal_running = keep;
		self
	}

	pub fn with_launch_terminal(mut self, launch: bool) -> Self {
		self.launch_terminal = launch;
		self
	}

	pub fn with_launch_args<I, S>(mut self, args: I) -> Self
	where
		I: IntoIterator<Item = S>,
		S: Into<String>,
	{
		self.launch_args = args.into_iter().map(Into::into).collect();
		self
	}

	pub fn with_shared_install_dir(mut self, dir: impl Into<String>) -> Self {
		self.shared_install_dirs.push(dir.into());
		self
	}
}

fn parse_env(key: &str, raw: &str) -> Result<u64> {
	raw.trim()
		.parse()
		.map_err(|e| Error::Configuration(format!("{key}: expected milliseconds, got \"{raw}\" ({e})")))
}

#[cfg(test)]
mod tests {
	use std::collections::HashMap;

	use tempfile::TempDir;

	use super::*;

	#[test]
	fn defaults_match_terminal_api_defaults() {
		let options = ClientOptions::default();
		assert_eq!(options.timeout(), Duration::from_secs(60));
		assert_eq!(options.poll_interval(), Duration::from_millis(200));
		assert!(options.launch_terminal);
		assert!(!options.keep_terminal_running);
		assert!(options.shared_install_dirs.iter().any(|d| d == "Program Files"));
	}

	#[test]
	fn load_fills_missing_fields() {
		let temp = TempDir::new().unwrap();
		let path = temp.path().join("mtplex.json");
		std::fs::write(&path, r#"{ "timeoutMs": 5000, "launchArgs": ["/skipupdate"] }"#).unwrap();

		let options = ClientOptions::load(&path).unwrap();
		assert_eq!(options.timeout_ms, 5000);
		assert_eq!(options.launch_args, vec!["/skipupdate".to_string()]);
		assert_eq!(options.poll_interval_ms, DEFAULT_POLL_INTERVAL_MS);
	}

	#[test]
	fn load_reports_bad_json_as_configuration_error() {
		let temp = TempDir::new().unwrap();
		let path = temp.path().join("mtplex.json");
		std::fs::write(&path, "{ timeoutMs: }").unwrap();
		assert!(matches!(ClientOptions::load(&path), Err(Error::Configuration(_))));
		assert!(matches!(ClientOptions::load(&temp.path().join("missing.json")), Err(Error::Configuration(_))));
	}

	#[test]
	fn env_overrides_apply() {
		let env: HashMap<&str, &str> = HashMap::from([(ENV_TIMEOUT_MS, "1500"), (ENV_POLL_INTERVAL_MS, " 25 "), (ENV_KEEP_TERMINAL, "yes")]);
		let options = ClientOptions::default().apply_env(|key| env.get(key).map(|v| v.to_string())).unwrap();
		assert_eq!(options.timeout_ms, 1500);
		assert_eq!(options.poll_interval_ms, 25);
		assert!(options.keep_terminal_running);
	}

	#[test]
	fn env_overrides_reject_garbage() {
		let err = ClientOptions::default()
			.apply_env(|key| (key == ENV_TIMEOUT_MS).then(|| "soon".to_string()))
			.unwrap_err();
		assert!(err.to_string().contains(ENV_TIMEOUT_MS), "{err}");

		let err = ClientOptions::default()
			.apply_env(|key| (key == ENV_KEEP_TERMINAL).then(|| "maybe".to_string()))
			.unwrap_err();
		assert!(matches!(err, Error::Configuration(_)));
	}

	#[test]
	fn builders_round_trip() {
		let options = ClientOptions::default()
			.with_timeout(Duration::from_millis(750))
			.with_poll_interval(Duration::from_millis(5))
			.with_keep_terminal_running(true)
			.with_launch_terminal(false)
			.with_launch_args(["/skipupdate"]);
		assert_eq!(options.timeout_ms, 750);
		assert_eq!(options.poll_interval_ms, 5);
		assert!(options.keep_terminal_running);
		assert!(!options.launch_terminal);
		assert_eq!(options.launch_args.len(), 1);
	}
}
