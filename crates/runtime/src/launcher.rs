//! Portable-mode launch of terminal executables.

use std::fmt;
use std::path::{Path, PathBuf};
use std::process::{Child, Command, Stdio};

use tracing::{debug, warn};

use crate::error::{Error, Result};
use crate::pidfile::{PidFile, PidRecord};
use crate::process::{kill_pid, pid_is_alive};

/// Command-line switch that keeps terminal config and data beside the executable.
pub const PORTABLE_FLAG: &str = "/portable";

/// What to start: the executable plus its arguments.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LaunchSpec {
	pub executable: PathBuf,
	pub args: Vec<String>,
}

impl LaunchSpec {
	/// Launch in portable mode. The flag is always present and always first.
	pub fn portable(executable: impl Into<PathBuf>) -> Self {
		Self {
			executable: executable.into(),
			args: vec![PORTABLE_FLAG.to_string()],
		}
	}

	/// Appends extra arguments after the portable flag.
	pub fn with_args<I, S>(mut self, args: I) -> Self
	where
		I: IntoIterator<Item = S>,
		S: Into<String>,
	{
		self.args.extend(args.into_iter().map(Into::into).filter(|arg| arg != PORTABLE_FLAG));
		self
	}

	pub fn working_dir(&self) -> &Path {
		self.executable.parent().unwrap_or_else(|| Path::new("."))
	}
}

/// Whether a process handle was spawned here or found already running.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProcessOrigin {
	Spawned,
	Attached,
}

/// A running (or formerly running) terminal process.
pub trait TerminalProcess: Send + fmt::Debug {
	fn pid(&self) -> Option<u32>;

	fn origin(&self) -> ProcessOrigin;

	/// Returns a description of how the process ended, or `None` while it runs.
	fn exit_status(&mut self) -> Result<Option<String>>;

	/// Stops the process. Stopping an already exited process is not an error.
	fn terminate(&mut self) -> Result<()>;
}

/// Starts terminal processes.
pub trait TerminalLauncher: Send + Sync {
	fn launch(&self, spec: &LaunchSpec) -> Result<Box<dyn TerminalProcess>>;
}

/// Launches the real executable, reusing a live process recorded in its pid file.
#[derive(Debug, Clone, Copy, Default)]
pub struct PortableLauncher;

impl TerminalLauncher for PortableLauncher {
	fn launch(&self, spec: &LaunchSpec) -> Result<Box<dyn TerminalProcess>> {
		let pid_file = PidFile::for_executable(&spec.executable);

		match pid_file.load() {
			Ok(Some(record)) if record.is_live_for(&spec.executable) => {
				debug!(
					target = "mtplex.runtime",
					pid = record.pid,
					executable = %spec.executable.display(),
					"attaching to running terminal"
				);
				return Ok(Box::new(AttachedTerminal { pid: record.pid, pid_file }));
			}
			Ok(Some(_)) => {
				debug!(target = "mtplex.runtime", path = %pid_file.path().display(), "stale pid file; relaunching");
			}
			Ok(None) => {}
			Err(err) => {
				warn!(target = "mtplex.runtime", error = %err, "ignoring unreadable pid file");
			}
		}

		let mut cmd = Command::new(&spec.executable);
		cmd.args(&spec.args)
			.current_dir(spec.working_dir())
			.stdin(Stdio::null())
			.stdout(Stdio::null())
			.stderr(Stdio::null());

		#[cfg(unix)]
		std::os::unix::process::CommandExt::process_group(&mut cmd, 0);

		let child = cmd.spawn().map_err(|source| Error::Launch {
			path: spec.executable.clone(),
			source,
		})?;

		debug!(
			target = "mtplex.runtime",
			pid = child.id(),
			executable = %spec.executable.display(),
			args = ?spec.args,
			"terminal launched"
		);

		if let Err(err) = pid_file.save(&PidRecord::new(child.id(), &spec.executable)) {
			warn!(target = "mtplex.runtime", error = %err, "failed to write pid file");
		}

		Ok(Box::new(SpawnedTerminal { child, pid_file }))
	}
}

/// A terminal started by this process.
#[derive(Debug)]
struct SpawnedTerminal {
	child: Child,
	pid_file: PidFile,
}

impl TerminalProcess for SpawnedTerminal {
	fn pid(&self) -> Option<u32> {
		Some(self.child.id())
	}

	fn origin(&self) -> ProcessOrigin {
		ProcessOrigin::Spawned
	}

	fn exit_status(&mut self) -> Result<Option<String>> {
		match self.child.try_wait()? {
			Some(status) => {
				let _ = self.pid_file.clear();
				Ok(Some(status.to_string()))
			}
			None => Ok(None),
		}
	}

	fn terminate(&mut self) -> Result<()> {
		if self.child.try_wait()?.is_none() {
			match self.child.kill() {
				Ok(()) => {}
				Err(err) if err.kind() == std::io::ErrorKind::InvalidInput => {}
				Err(err) => return Err(err.into()),
			}
			self.child.wait()?;
		}
		self.pid_file.clear()?;
		Ok(())
	}
}

/// A terminal found running from an earlier session; only its pid is known.
#[derive(Debug)]
struct AttachedTerminal {
	pid: u32,
	pid_file: PidFile,
}

impl TerminalProcess for AttachedTerminal {
	fn pid(&self) -> Option<u32> {
		Some(self.pid)
	}

	fn origin(&self) -> ProcessOrigin {
		ProcessOrigin::Attached
	}

	fn exit_status(&mut self) -> Result<Option<String>> {
		if pid_is_alive(self.pid) {
			Ok(None)
		} else {
			let _ = self.pid_file.clear();
			Ok(Some(format!("process {} is no longer running", self.pid)))
		}
	}

	fn terminate(&mut self) -> Result<()> {
		if pid_is_alive(self.pid) {
			kill_pid(self.pid)?;
		}
		self.pid_file.clear()?;
		Ok(())
	}
}
