//! Lifecycle phases of an externally managed terminal process.

use std::fmt;

use serde::{Deserialize, Serialize};

/// Where a terminal is in its lifecycle, as observed by this process.
///
/// ```text
/// NotStarted -> Starting -> Ready
///                  |  \        |  \
///                  |   Failed  |   Exited
///                  Exited <----+
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum TerminalPhase {
	#[default]
	NotStarted,
	Starting,
	Ready,
	Failed,
	Exited,
}

impl TerminalPhase {
	/// Returns `true` when moving from `self` to `next` is a legal step.
	pub fn can_transition_to(self, next: TerminalPhase) -> bool {
		use TerminalPhase::*;
		matches!(
			(self, next),
			(NotStarted, Starting)
				| (Starting, Ready)
				| (Starting, Failed)
				| (Starting, Exited)
				| (Ready, Starting)
				| (Ready, Failed)
				| (Ready, Exited)
				| (Failed, Starting)
				| (Exited, Starting)
		)
	}

	/// Only a ready terminal may receive forwarded calls.
	pub fn accepts_calls(self) -> bool {
		self == TerminalPhase::Ready
	}

	pub fn as_str(self) -> &'static str {
		match self {
			TerminalPhase::NotStarted => "not-started",
			TerminalPhase::Starting => "starting",
			TerminalPhase::Ready => "ready",
			TerminalPhase::Failed => "failed",
			TerminalPhase::Exited => "exited",
		}
	}
}

impl fmt::Display for TerminalPhase {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.write_str(self.as_str())
	}
}

#[cfg(test)]
mod tests {
	use super::TerminalPhase::*;
	use super::*;

	#[test]
	fn startup_path_is_legal() {
		assert!(NotStarted.can_transition_to(Starting));
		assert!(Starting.can_transition_to(Ready));
		assert!(Ready.can_transition_to(Exited));
	}

	#[test]
	fn cannot_skip_starting() {
		assert!(!NotStarted.can_transition_to(Ready));
		assert!(!Exited.can_transition_to(Ready));
		assert!(!Failed.can_transition_to(Ready));
	}

	#[test]
	fn only_ready_accepts_calls() {
		for phase in [NotStarted, Starting, Failed, Exited] {
			assert!(!phase.accepts_calls(), "{phase}");
		}
		assert!(Ready.accepts_calls());
	}

	#[test]
	fn serializes_kebab_case() {
		assert_eq!(serde_json::to_value(NotStarted).unwrap(), serde_json::json!("not-started"));
	}
}
