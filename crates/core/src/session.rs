//! Per-identity session state and the startup sequence that makes a client usable.

use std::sync::Arc;
use std::time::Instant;

use mtplex_protocol::LastError;
use mtplex_runtime::TerminalPhase;
use serde::Serialize;
use tokio::sync::oneshot;
use tracing::{debug, info, warn};

use crate::boundary::{Lease, Readiness, SharedTerminal};
use crate::descriptor::{IdentityKey, InstanceDescriptor};
use crate::error::{Error, Result};
use crate::options::ClientOptions;

/// Snapshot of one client's session as tracked by [`SharedTerminal`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionState {
	pub identity: IdentityKey,
	pub phase: TerminalPhase,
	/// Most recent terminal error attributed to this session.
	pub last_error: Option<LastError>,
	/// Times the shared binding was moved back to this identity.
	pub rebinds: u64,
	/// Forwarded calls, successful or not.
	pub calls: u64,
	pub pid: Option<u32>,
	/// Whether this session started the terminal process (and so stops it).
	pub owns_process: bool,
}

impl SessionState {
	pub(crate) fn new(identity: IdentityKey) -> Self {
		Self {
			identity,
			phase: TerminalPhase::NotStarted,
			last_error: None,
			rebinds: 0,
			calls: 0,
			pid: None,
			owns_process: false,
		}
	}

	/// Moves to `next` if the step is legal; an illegal step leaves the phase unchanged.
	pub(crate) fn transition(&mut self, next: TerminalPhase) -> bool {
		if self.phase == next {
			return true;
		}
		if !self.phase.can_transition_to(next) {
			debug!(target = "mtplex.session", identity = %self.identity, from = %self.phase, to = %next, "ignoring phase change");
			return false;
		}
		debug!(target = "mtplex.session", identity = %self.identity, from = %self.phase, to = %next, "phase change");
		self.phase = next;
		true
	}
}

/// Drives one session from launch to ready.
///
/// Launch, credentialed bind and readiness polling all share one deadline of
/// `options.timeout_ms`. Any failure tears the session down again before the
/// error is returned, so a failed construction never leaves a terminal behind
/// that this process started.
pub(crate) struct SessionInitializer {
	pub shared: Arc<SharedTerminal>,
	pub descriptor: Arc<InstanceDescriptor>,
	pub options: ClientOptions,
}

impl SessionInitializer {
	/// Runs startup on its own task and hands `lease` back once the session is ready.
	///
	/// The task outlives the caller: dropping the returned future still lets
	/// startup finish, and a session nobody is waiting for is released again
	/// together with its lease.
	pub async fn spawn(self, lease: Lease) -> Result<Lease> {
		let (tx, rx) = oneshot::channel();
		tokio::spawn(async move {
			let outcome = self.run().await.map(|()| lease);
			if let Err(Ok(lease)) = tx.send(outcome) {
				let identity = lease.identity().clone();
				info!(target = "mtplex.session", %identity, "connect cancelled; releasing session");
				let keep_running = self.options.keep_terminal_running;
				if let Err(err) = self.shared.with_slot(move |slot| slot.release(&identity, keep_running)).await {
					warn!(target = "mtplex.session", identity = %lease.identity(), error = %err, "release after cancelled connect failed");
				}
				drop(lease);
			}
		});
		rx.await
			.unwrap_or_else(|_| Err(Error::Runtime("session startup task ended unexpectedly".to_string())))
	}

	pub async fn run(&self) -> Result<()> {
		let identity = self.descriptor.identity().clone();
		let started = Instant::now();
		info!(
			target = "mtplex.session",
			%identity,
			login = self.descriptor.login(),
			server = self.descriptor.server(),
			"starting session"
		);

		match self.drive(started).await {
			Ok(()) => {
				let ready = identity.clone();
				self.shared
					.with_slot(move |slot| {
						slot.mark_ready(&ready);
						Ok(())
					})
					.await?;
				info!(target = "mtplex.session", %identity, elapsed = ?started.elapsed(), "session ready");
				Ok(())
			}
			Err(err) => {
				warn!(target = "mtplex.session", %identity, error = %err, "session startup failed");
				let failed = identity.clone();
				self.shared
					.with_slot(move |slot| {
						slot.abandon(&failed);
						Ok(())
					})
					.await?;
				Err(err)
			}
		}
	}

	async fn drive(&self, started: Instant) -> Result<()> {
		let timeout = self.options.timeout();
		let timeout_ms = self.options.timeout_ms;

		let descriptor = Arc::clone(&self.descriptor);
		let options = self.options.clone();
		self.shared.with_slot(move |slot| slot.start_session(&descriptor, &options)).await?;

		let mut pending = String::from("no readiness check ran");
		let mut wrong_account = None;
		loop {
			let descriptor = Arc::clone(&self.descriptor);
			match self.shared.with_slot(move |slot| slot.poll_ready(&descriptor, timeout_ms)).await? {
				Readiness::Ready => return Ok(()),
				Readiness::Pending(reason) => {
					debug!(target = "mtplex.session", identity = %self.descriptor.identity(), %reason, "terminal not ready");
					pending = reason;
					wrong_account = None;
				}
				Readiness::WrongAccount { login, server } => {
					debug!(target = "mtplex.session", identity = %self.descriptor.identity(), login, %server, "terminal logged into another account");
					wrong_account = Some((login, server));
				}
			}

			if started.elapsed() >= timeout {
				let identity = self.descriptor.identity().clone();
				return Err(match wrong_account {
					Some((login, server)) => Error::Authentication {
						message: format!(
							"terminal stayed logged in as {login}@{server}, expected {}@{}",
							self.descriptor.login(),
							self.descriptor.server()
						),
						identity,
						last_error: None,
					},
					None => {
						debug!(target = "mtplex.session", %identity, last_reason = %pending, "readiness deadline passed");
						Error::Timeout {
							identity,
							waited: started.elapsed(),
						}
					}
				});
			}

			tokio::time::sleep(self.options.poll_interval()).await;
		}
	}
}
