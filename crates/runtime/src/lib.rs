//! Terminal process lifecycle for isolated sessions.
//!
//! Each private terminal copy runs as one long-lived OS process. This crate
//! launches it in portable mode, reattaches to one that is already running
//! (via a pid file kept beside the executable), reports liveness, and stops it.

pub mod error;
pub mod launcher;
pub mod phase;
pub mod pidfile;
pub mod process;

pub use error::{Error, Result};
pub use launcher::{LaunchSpec, PORTABLE_FLAG, PortableLauncher, ProcessOrigin, TerminalLauncher, TerminalProcess};
pub use phase::TerminalPhase;
pub use pidfile::{PidFile, PidRecord};
pub use process::{kill_pid, pid_is_alive, process_start_marker};
