//! Pid file kept beside a portable terminal so later sessions can reattach.

use std::fs;
use std::path::{Path, PathBuf};
use std::time::{SystemTime, UNIX_EPOCH};

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};
use crate::process::{pid_is_alive, process_start_marker};

/// Directory (relative to the executable) holding runtime state.
pub const STATE_DIR: &str = ".mtplex";
const PID_FILE_NAME: &str = "terminal.json";
pub const PID_RECORD_SCHEMA_VERSION: u32 = 2;

/// Persisted record of a launched terminal process.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PidRecord {
	pub schema_version: u32,
	pub pid: u32,
	pub executable: PathBuf,
	pub created_at: u64,
	/// Identifies the process behind `pid`, so a reused pid is not mistaken for the terminal.
	#[serde(default)]
	pub process_marker: Option<String>,
}

impl PidRecord {
	/// Records `pid` together with the start marker of the process holding it now.
	pub fn new(pid: u32, executable: impl Into<PathBuf>) -> Self {
		Self {
			schema_version: PID_RECORD_SCHEMA_VERSION,
			pid,
			executable: executable.into(),
			created_at: now_ts(),
			process_marker: process_start_marker(pid),
		}
	}

	/// A record is reusable when it targets `executable`, its pid is alive,
	/// and that pid still belongs to the process that was recorded.
	/// Records without a marker are never reused.
	pub fn is_live_for(&self, executable: &Path) -> bool {
		if self.schema_version != PID_RECORD_SCHEMA_VERSION || self.executable != executable || !pid_is_alive(self.pid) {
			return false;
		}
		match &self.process_marker {
			Some(recorded) => process_start_marker(self.pid).as_ref() == Some(recorded),
			None => false,
		}
	}
}

/// Location of the pid file for one terminal copy.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PidFile {
	path: PathBuf,
}

impl PidFile {
	/// Pid file for the terminal at `executable`: `<dir>/.mtplex/terminal.json`.
	pub fn for_executable(executable: &Path) -> Self {
		let dir = executable.parent().unwrap_or_else(|| Path::new("."));
		Self {
			path: dir.join(STATE_DIR).join(PID_FILE_NAME),
		}
	}

	pub fn path(&self) -> &Path {
		&self.path
	}

	pub fn load(&self) -> Result<Option<PidRecord>> {
		let content = match fs::read_to_string(&self.path) {
			Ok(content) => content,
			Err(err) if err.kind() == std::io::ErrorKind::NotFound => return Ok(None),
			Err(err) => return Err(err.into()),
		};
		serde_json::from_str(&content).map(Some).map_err(|source| Error::PidFile {
			path: self.path.clone(),
			source,
		})
	}

	pub fn save(&self, record: &PidRecord) -> Result<()> {
		if let Some(parent) = self.path.parent() {
			fs::create_dir_all(parent)?;
		}
		let json = serde_json::to_string_pretty(record).map_err(|source| Error::PidFile {
			path: self.path.clone(),
			source,
		})?;
		fs::write(&self.path, json)?;
		Ok(())
	}

	/// Removes the pid file. Returns `false` when there was nothing to remove.
	pub fn clear(&self) -> Result<bool> {
		match fs::remove_file(&self.path) {
			Ok(()) => Ok(true),
			Err(err) if err.kind() == std::io::ErrorKind::NotFound => Ok(false),
			Err(err) => Err(err.into()),
		}
	}
}

pub(crate) fn now_ts() -> u64 {
	SystemTime::now().duration_since(UNIX_EPOCH).map(|d| d.as_secs()).unwrap_or_default()
}

#[cfg(test)]
mod tests {
	use tempfile::TempDir;

	use super::*;

	#[test]
	fn pid_file_lives_beside_executable() {
		let pid_file = PidFile::for_executable(Path::new("/opt/t1/terminal64.exe"));
		assert_eq!(pid_file.path(), Path::new("/opt/t1/.mtplex/terminal.json"));
	}

	#[test]
	fn save_load_clear() {
		let temp = TempDir::new().unwrap();
		let exe = temp.path().join("terminal64.exe");
		let pid_file = PidFile::for_executable(&exe);

		assert_eq!(pid_file.load().unwrap(), None);
		let record = PidRecord::new(std::process::id(), &exe);
		pid_file.save(&record).unwrap();
		assert_eq!(pid_file.load().unwrap(), Some(record));

		assert!(pid_file.clear().unwrap());
		assert!(!pid_file.clear().unwrap());
	}

	#[test]
	fn corrupt_pid_file_is_reported() {
		let temp = TempDir::new().unwrap();
		let exe = temp.path().join("terminal64.exe");
		let pid_file = PidFile::for_executable(&exe);
		fs::create_dir_all(pid_file.path().parent().unwrap()).unwrap();
		fs::write(pid_file.path(), "{not json").unwrap();
		assert!(matches!(pid_file.load(), Err(Error::PidFile { .. })));
	}

	#[cfg(unix)]
	#[test]
	fn record_liveness_checks_executable_and_pid() {
		let exe = Path::new("/opt/t1/terminal64.exe");
		let record = PidRecord::new(std::process::id(), exe);
		assert!(record.is_live_for(exe));
		assert!(!record.is_live_for(Path::new("/opt/t2/terminal64.exe")));

		let reused = PidRecord {
			process_marker: Some("stat:1".to_string()),
			..record.clone()
		};
		assert!(!reused.is_live_for(exe), "same pid, different process");

		let unmarked = PidRecord {
			process_marker: None,
			..record.clone()
		};
		assert!(!unmarked.is_live_for(exe));

		let dead = PidRecord { pid: 0, ..record };
		assert!(!dead.is_live_for(exe));
	}

	#[test]
	fn older_records_without_marker_still_parse() {
		let record: PidRecord =
			serde_json::from_str(r#"{ "schemaVersion": 1, "pid": 42, "executable": "/opt/t1/terminal64.exe", "createdAt": 0 }"#).unwrap();
		assert_eq!(record.process_marker, None);
		assert!(!record.is_live_for(Path::new("/opt/t1/terminal64.exe")));
	}
}
