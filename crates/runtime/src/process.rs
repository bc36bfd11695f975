//! OS-level liveness and termination helpers for terminal processes.

use std::path::PathBuf;
use std::process::Command;

use tracing::debug;

use crate::error::{Error, Result};

/// Returns `true` when a process with `pid` appears alive on this platform.
pub fn pid_is_alive(pid: u32) -> bool {
	if pid == 0 {
		return false;
	}

	#[cfg(unix)]
	{
		if PathBuf::from("/proc").join(pid.to_string()).exists() {
			return true;
		}

		Command::new("kill")
			.arg("-0")
			.arg(pid.to_string())
			.status()
			.map(|status| status.success())
			.unwrap_or(pid == std::process::id())
	}

	#[cfg(windows)]
	{
		let filter = format!("PID eq {pid}");
		if let Ok(output) = Command::new("tasklist").args(["/FI", &filter, "/FO", "CSV", "/NH"]).output() {
			if output.status.success() {
				let stdout = String::from_utf8_lossy(&output.stdout);
				return tasklist_has_pid(stdout.as_ref(), pid);
			}
		}

		pid == std::process::id()
	}

	#[cfg(not(any(unix, windows)))]
	{
		pid == std::process::id()
	}
}

/// Returns a value that identifies the process currently holding `pid`.
///
/// Two processes that reuse the same pid yield different markers: on Linux
/// the kernel start time from `/proc/<pid>/stat`, on other Unix systems the
/// `ps` start timestamp, and on Windows the image name.
pub fn process_start_marker(pid: u32) -> Option<String> {
	if pid == 0 {
		return None;
	}

	#[cfg(unix)]
	{
		if let Ok(stat) = std::fs::read_to_string(PathBuf::from("/proc").join(pid.to_string()).join("stat")) {
			return proc_stat_start_time(&stat).map(|ticks| format!("stat:{ticks}"));
		}

		let output = Command::new("ps").args(["-o", "lstart=", "-p", &pid.to_string()]).output().ok()?;
		let started = String::from_utf8_lossy(&output.stdout).trim().to_string();
		(output.status.success() && !started.is_empty()).then(|| format!("ps:{started}"))
	}

	#[cfg(windows)]
	{
		let filter = format!("PID eq {pid}");
		let output = Command::new("tasklist").args(["/FI", &filter, "/FO", "CSV", "/NH"]).output().ok()?;
		if !output.status.success() {
			return None;
		}
		let stdout = String::from_utf8_lossy(&output.stdout);
		tasklist_image_name(stdout.as_ref(), pid).map(|image| format!("image:{}", image.to_lowercase()))
	}

	#[cfg(not(any(unix, windows)))]
	{
		None
	}
}

/// Field 22 of `/proc/<pid>/stat`. The command name (field 2) may hold
/// spaces and parentheses, so fields are counted after its closing paren.
#[cfg(any(test, unix))]
fn proc_stat_start_time(stat: &str) -> Option<u64> {
	let (_, rest) = stat.rsplit_once(')')?;
	rest.split_whitespace().nth(19)?.parse().ok()
}

/// Asks the OS to stop `pid`. Used for terminals this process attached to
/// but did not spawn, so no `Child` handle is available.
pub fn kill_pid(pid: u32) -> Result<()> {
	if pid == 0 || pid == std::process::id() {
		return Err(Error::Terminate {
			pid,
			message: "refusing to signal this process".to_string(),
		});
	}

	#[cfg(unix)]
	let status = Command::new("kill").args(["-TERM", &pid.to_string()]).status();

	#[cfg(windows)]
	let status = Command::new("taskkill").args(["/PID", &pid.to_string(), "/F"]).status();

	#[cfg(not(any(unix, windows)))]
	let status: std::io::Result<std::process::ExitStatus> = Err(std::io::Error::new(std::io::ErrorKind::Unsupported, "no process killer"));

	match status {
		Ok(status) if status.success() => {
			debug!(target = "mtplex.runtime", pid, "terminal process signalled");
			Ok(())
		}
		Ok(status) => Err(Error::Terminate {
			pid,
			message: format!("killer exited with {status}"),
		}),
		Err(e) => Err(Error::Terminate { pid, message: e.to_string() }),
	}
}

#[cfg(any(test, windows))]
fn tasklist_has_pid(output: &str, pid: u32) -> bool {
	tasklist_image_name(output, pid).is_some()
}

/// Image name on the `tasklist` CSV line whose second field is `pid`.
#[cfg(any(test, windows))]
fn tasklist_image_name(output: &str, pid: u32) -> Option<String> {
	let pid_str = pid.to_string();
	output.lines().find_map(|line| {
		let line = line.trim();
		if !line.starts_with('"') {
			return None;
		}

		let mut fields = line.trim_matches('"').split("\",\"");
		let image = fields.next()?;
		(fields.next()?.trim() == pid_str.as_str()).then(|| image.to_string())
	})
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn tasklist_parser_matches_terminal_line() {
		let output = "\"terminal64.exe\",\"4321\",\"Console\",\"1\",\"180,000 K\"\r\n";
		assert!(tasklist_has_pid(output, 4321));
		assert!(!tasklist_has_pid(output, 1234));
	}

	#[test]
	fn tasklist_parser_reports_image_name() {
		let output = "\"terminal64.exe\",\"4321\",\"Console\",\"1\",\"180,000 K\"\r\n";
		assert_eq!(tasklist_image_name(output, 4321).as_deref(), Some("terminal64.exe"));
		assert_eq!(tasklist_image_name(output, 1234), None);
	}

	#[test]
	fn stat_start_time_skips_command_name() {
		let stat = "4321 (term (x) 64) S 1 4321 4321 0 -1 4194560 100 0 0 0 5 3 0 0 20 0 4 0 987654 1000 200";
		assert_eq!(proc_stat_start_time(stat), Some(987654));
		assert_eq!(proc_stat_start_time("garbage"), None);
	}

	#[cfg(unix)]
	#[test]
	fn start_marker_is_stable_for_one_process() {
		let marker = process_start_marker(std::process::id());
		assert!(marker.is_some());
		assert_eq!(marker, process_start_marker(std::process::id()));
		assert_eq!(process_start_marker(0), None);
	}

	#[test]
	fn tasklist_parser_ignores_info_lines() {
		let output = "INFO: No tasks are running which match the specified criteria.\r\n";
		assert!(!tasklist_has_pid(output, 4321));
	}

	#[cfg(unix)]
	#[test]
	fn current_process_is_alive() {
		assert!(pid_is_alive(std::process::id()));
	}

	#[test]
	fn pid_zero_is_never_alive() {
		assert!(!pid_is_alive(0));
	}

	#[test]
	fn refuses_to_kill_self() {
		assert!(matches!(kill_pid(std::process::id()), Err(Error::Terminate { .. })));
	}
}
