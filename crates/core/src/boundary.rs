//! Isolation boundary around the wrapped API's single binding slot.
//!
//! [`SharedTerminal`] owns the one [`TerminalApi`] instance for the process
//! and records which identity is currently bound. Nothing else touches the
//! binding. Every forwarded call goes through [`Slot::forward`], which
//! re-binds to the caller's identity first when needed. The re-bind and the
//! call happen under one lock, so no other client can slip in between.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use std::time::Instant;

use mtplex_protocol::{AccountInfo, CallArgs, LastError, ResultCode, TerminalInfo};
use mtplex_runtime::{LaunchSpec, PortableLauncher, ProcessOrigin, TerminalLauncher, TerminalPhase, TerminalProcess};
use parking_lot::Mutex;
use serde::de::DeserializeOwned;
use serde_json::Value;
use tracing::{debug, warn};

use crate::api::{TerminalApi, ops};
use crate::descriptor::{IdentityKey, InstanceDescriptor};
use crate::error::{Error, Result};
use crate::options::ClientOptions;
use crate::session::SessionState;

/// The process-wide terminal API plus its binding bookkeeping.
///
/// Create one per process and share it between clients via `Arc`.
pub struct SharedTerminal {
	slot: Mutex<Slot>,
	leases: Mutex<HashSet<IdentityKey>>,
}

impl SharedTerminal {
	/// Wraps `api`, launching real terminal executables in portable mode.
	pub fn new(api: impl TerminalApi + 'static) -> Arc<Self> {
		Self::with_launcher(api, PortableLauncher)
	}

	pub fn with_launcher(api: impl TerminalApi + 'static, launcher: impl TerminalLauncher + 'static) -> Arc<Self> {
		Arc::new(Self {
			slot: Mutex::new(Slot {
				api: Box::new(api),
				launcher: Box::new(launcher),
				bound: None,
				sessions: HashMap::new(),
				processes: HashMap::new(),
			}),
			leases: Mutex::new(HashSet::new()),
		})
	}

	/// Identity the wrapped API is currently bound to.
	pub fn bound_identity(&self) -> Option<IdentityKey> {
		self.slot.lock().bound.clone()
	}

	/// Identities held by live clients, sorted.
	pub fn live_identities(&self) -> Vec<IdentityKey> {
		let mut live: Vec<_> = self.leases.lock().iter().cloned().collect();
		live.sort();
		live
	}

	pub fn session(&self, identity: &IdentityKey) -> Option<SessionState> {
		self.slot.lock().sessions.get(identity).cloned()
	}

	/// Reserves `identity` for one client. A second live reservation of the
	/// same executable would collapse two clients onto one terminal.
	pub(crate) fn lease(self: &Arc<Self>, identity: &IdentityKey) -> Result<Lease> {
		let mut leases = self.leases.lock();
		if !leases.insert(identity.clone()) {
			return Err(Error::Configuration(format!(
				"terminal {identity} is already used by another live client; give each client its own copy of the terminal"
			)));
		}
		Ok(Lease {
			shared: Arc::clone(self),
			identity: identity.clone(),
		})
	}

	/// Runs `f` with the slot locked on tokio's blocking pool.
	pub(crate) async fn with_slot<T, F>(self: &Arc<Self>, f: F) -> Result<T>
	where
		F: FnOnce(&mut Slot) -> Result<T> + Send + 'static,
		T: Send + 'static,
	{
		let shared = Arc::clone(self);
		match tokio::task::spawn_blocking(move || f(&mut *shared.slot.lock())).await {
			Ok(result) => result,
			Err(err) if err.is_panic() => std::panic::resume_unwind(err.into_panic()),
			Err(err) => Err(Error::Runtime(err.to_string())),
		}
	}

	/// Runs `f` with the slot locked on the current thread.
	pub(crate) fn with_slot_blocking<T>(&self, f: impl FnOnce(&mut Slot) -> T) -> T {
		f(&mut *self.slot.lock())
	}
}

impl std::fmt::Debug for SharedTerminal {
	fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
		f.debug_struct("SharedTerminal")
			.field("bound", &self.bound_identity())
			.field("live", &self.live_identities())
			.finish_non_exhaustive()
	}
}

/// Exclusive claim on one identity, released on drop.
pub(crate) struct Lease {
	shared: Arc<SharedTerminal>,
	identity: IdentityKey,
}

impl std::fmt::Debug for Lease {
	fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
		f.debug_tuple("Lease").field(&self.identity).finish()
	}
}

impl Lease {
	pub(crate) fn identity(&self) -> &IdentityKey {
		&self.identity
	}
}

impl Drop for Lease {
	fn drop(&mut self) {
		self.shared.leases.lock().remove(&self.identity);
	}
}

/// Outcome of one readiness check.
#[derive(Debug, Clone, PartialEq)]
pub(crate) enum Readiness {
	Ready,
	Pending(String),
	WrongAccount { login: u64, server: String },
}

/// Locked state: the wrapped API, who it is bound to, and per-identity sessions.
pub(crate) struct Slot {
	api: Box<dyn TerminalApi>,
	launcher: Box<dyn TerminalLauncher>,
	bound: Option<IdentityKey>,
	sessions: HashMap<IdentityKey, SessionState>,
	processes: HashMap<IdentityKey, Box<dyn TerminalProcess>>,
}

impl Slot {
	fn session_entry(&mut self, identity: &IdentityKey) -> &mut SessionState {
		self.sessions
			.entry(identity.clone())
			.or_insert_with(|| SessionState::new(identity.clone()))
	}

	/// Begins a session: launch the terminal if needed, then bind with credentials.
	pub(crate) fn start_session(&mut self, descriptor: &InstanceDescriptor, options: &ClientOptions) -> Result<()> {
		let identity = descriptor.identity();
		let session = self.session_entry(identity);
		session.transition(TerminalPhase::Starting);
		session.last_error = None;
		session.owns_process = false;
		session.pid = None;
		session.rebinds = 0;
		session.calls = 0;

		if options.launch_terminal {
			self.ensure_process(descriptor, options)?;
		}
		self.bind_full(descriptor, options.timeout_ms)
	}

	fn ensure_process(&mut self, descriptor: &InstanceDescriptor, options: &ClientOptions) -> Result<()> {
		let identity = descriptor.identity();
		if let Some(process) = self.processes.get_mut(identity) {
			if matches!(process.exit_status(), Ok(None)) {
				debug!(target = "mtplex.boundary", %identity, pid = ?process.pid(), "terminal already running");
				return Ok(());
			}
			self.processes.remove(identity);
		}

		let spec = LaunchSpec::portable(descriptor.executable()).with_args(options.launch_args.iter().cloned());
		let process = self
			.launcher
			.launch(&spec)
			.map_err(|e| Error::initialization(identity, format!("terminal did not start: {e}")))?;

		let session = self.session_entry(identity);
		session.pid = process.pid();
		session.owns_process = process.origin() == ProcessOrigin::Spawned;
		debug!(
			target = "mtplex.boundary",
			%identity,
			pid = ?process.pid(),
			origin = ?process.origin(),
			"terminal process acquired"
		);
		self.processes.insert(identity.clone(), process);
		Ok(())
	}

	fn bind_full(&mut self, descriptor: &InstanceDescriptor, timeout_ms: u64) -> Result<()> {
		let identity = descriptor.identity();
		let started = Instant::now();
		if self.api.initialize(&descriptor.initialize_request(timeout_ms)) {
			self.bound = Some(identity.clone());
			debug!(target = "mtplex.boundary", %identity, login = descriptor.login(), "bound with credentials");
			return Ok(());
		}

		let last_error = self.api.last_error();
		self.bound = None;
		self.session_entry(identity).last_error = Some(last_error.clone());
		Err(Error::from_bind_failure(identity, last_error, started.elapsed()))
	}

	/// Checks whether the bound terminal is connected and logged into the descriptor's account.
	pub(crate) fn poll_ready(&mut self, descriptor: &InstanceDescriptor, timeout_ms: u64) -> Result<Readiness> {
		let identity = descriptor.identity();
		self.check_process(identity)?;
		if self.bound.as_ref() != Some(identity) {
			self.rebind(descriptor, timeout_ms)?;
		}

		let terminal: TerminalInfo = match self.query(ops::TERMINAL_INFO, identity)? {
			Ok(info) => info,
			Err(last_error) => return Ok(Readiness::Pending(format!("terminal_info unavailable: {last_error}"))),
		};
		if !terminal.connected {
			return Ok(Readiness::Pending("terminal not connected to trade server".to_string()));
		}

		let account: AccountInfo = match self.query(ops::ACCOUNT_INFO, identity)? {
			Ok(info) => info,
			Err(last_error) => return Ok(Readiness::Pending(format!("account_info unavailable: {last_error}"))),
		};
		if account.login != descriptor.login() || account.server != descriptor.server() {
			return Ok(Readiness::WrongAccount {
				login: account.login,
				server: account.server,
			});
		}
		Ok(Readiness::Ready)
	}

	/// Invokes a readiness query. Outer error: fatal; inner error: not ready yet.
	fn query<T: DeserializeOwned>(&mut self, operation: &str, identity: &IdentityKey) -> Result<std::result::Result<T, LastError>> {
		match self.api.invoke(operation, &CallArgs::new()) {
			Ok(value) => serde_json::from_value(value).map(Ok).map_err(|source| Error::Decode {
				operation: operation.to_string(),
				source,
			}),
			Err(last_error) if last_error.is_auth_failure() => Err(Error::Authentication {
				identity: identity.clone(),
				message: format!("{operation} reported {last_error}"),
				last_error: Some(last_error),
			}),
			Err(last_error) => Ok(Err(last_error)),
		}
	}

	pub(crate) fn mark_ready(&mut self, identity: &IdentityKey) {
		let session = self.session_entry(identity);
		session.transition(TerminalPhase::Ready);
		session.last_error = None;
	}

	/// Tears down a session whose startup failed and forgets it. Terminates the
	/// terminal only when this session spawned it.
	pub(crate) fn abandon(&mut self, identity: &IdentityKey) {
		if self.bound.as_ref() == Some(identity) {
			self.api.shutdown();
			self.bound = None;
		}

		let owns_process = match self.sessions.remove(identity) {
			Some(mut session) => {
				session.transition(TerminalPhase::Failed);
				debug!(target = "mtplex.boundary", %identity, last_error = ?session.last_error, "dropping failed session");
				session.owns_process
			}
			None => false,
		};

		if let Some(mut process) = self.processes.remove(identity) {
			if owns_process {
				if let Err(err) = process.terminate() {
					warn!(target = "mtplex.boundary", %identity, error = %err, "failed to stop terminal after startup failure");
				}
			}
		}
	}

	/// Re-bind-before-call: ensures the slot is bound to `descriptor`.
	pub(crate) fn assert_binding(&mut self, descriptor: &InstanceDescriptor, timeout_ms: u64) -> Result<()> {
		let identity = descriptor.identity();
		self.check_process(identity)?;

		let phase = self.sessions.get(identity).map(|s| s.phase).unwrap_or_default();
		if !phase.accepts_calls() {
			return Err(Error::initialization(
				identity,
				format!("session is {phase}; construct a new client"),
			));
		}

		if self.bound.as_ref() == Some(identity) {
			return Ok(());
		}
		self.rebind(descriptor, timeout_ms)
	}

	fn rebind(&mut self, descriptor: &InstanceDescriptor, timeout_ms: u64) -> Result<()> {
		let identity = descriptor.identity();
		debug!(
			target = "mtplex.boundary",
			from = ?self.bound.as_ref().map(IdentityKey::as_str),
			to = %identity,
			"rebinding"
		);

		if !self.api.initialize(&descriptor.rebind_request(timeout_ms)) {
			let last_error = self.api.last_error();
			self.bound = None;
			self.session_entry(identity).last_error = Some(last_error.clone());
			return Err(Error::Initialization {
				identity: identity.clone(),
				message: format!("rebind failed: {last_error}"),
				last_error: Some(last_error),
			});
		}

		self.bound = Some(identity.clone());
		self.session_entry(identity).rebinds += 1;
		Ok(())
	}

	/// Fails with `Initialization` once the terminal process for `identity` has exited.
	fn check_process(&mut self, identity: &IdentityKey) -> Result<()> {
		let Some(process) = self.processes.get_mut(identity) else {
			return Ok(());
		};

		let status = match process.exit_status() {
			Ok(None) => return Ok(()),
			Ok(Some(status)) => status,
			Err(err) => return Err(Error::initialization(identity, format!("cannot poll terminal process: {err}"))),
		};

		warn!(target = "mtplex.boundary", %identity, %status, "terminal process exited");
		self.processes.remove(identity);
		if self.bound.as_ref() == Some(identity) {
			self.bound = None;
		}

		let last_error = LastError::from_result_code(ResultCode::InternalFailConnect);
		let session = self.session_entry(identity);
		session.transition(TerminalPhase::Exited);
		session.pid = None;
		session.owns_process = false;
		session.last_error = Some(last_error.clone());
		Err(Error::Initialization {
			identity: identity.clone(),
			message: format!("terminal exited ({status}); construct a new client"),
			last_error: Some(last_error),
		})
	}

	/// Re-binds if needed, then forwards `operation` verbatim.
	pub(crate) fn forward(&mut self, descriptor: &InstanceDescriptor, operation: &str, args: &CallArgs, timeout_ms: u64) -> Result<Value> {
		self.assert_binding(descriptor, timeout_ms)?;

		let result = self.api.invoke(operation, args);
		let identity = descriptor.identity();
		let session = self.session_entry(identity);
		session.calls += 1;

		result.map_err(|source| {
			session.last_error = Some(source.clone());
			Error::Forwarding {
				identity: identity.clone(),
				operation: operation.to_string(),
				source,
			}
		})
	}

	/// Logs the bound terminal back into the descriptor's account.
	pub(crate) fn relogin(&mut self, descriptor: &InstanceDescriptor, timeout_ms: u64) -> Result<()> {
		self.assert_binding(descriptor, timeout_ms)?;

		let started = Instant::now();
		if self.api.login(&descriptor.login_request(timeout_ms)) {
			self.session_entry(descriptor.identity()).last_error = None;
			return Ok(());
		}

		let last_error = self.api.last_error();
		self.session_entry(descriptor.identity()).last_error = Some(last_error.clone());
		Err(Error::from_bind_failure(descriptor.identity(), last_error, started.elapsed()))
	}

	/// Ends a session: unbinds if held, drops its state, and stops the
	/// terminal unless it should outlive the client.
	pub(crate) fn release(&mut self, identity: &IdentityKey, keep_running: bool) -> Result<()> {
		if self.bound.as_ref() == Some(identity) {
			self.api.shutdown();
			self.bound = None;
		}
		self.sessions.remove(identity);

		let Some(mut process) = self.processes.remove(identity) else {
			return Ok(());
		};
		if keep_running {
			debug!(target = "mtplex.boundary", %identity, pid = ?process.pid(), "leaving terminal running");
			return Ok(());
		}
		process
			.terminate()
			.map_err(|e| Error::initialization(identity, format!("failed to stop terminal: {e}")))
	}
}

#[cfg(test)]
mod tests {
	use std::path::{Path, PathBuf};

	use serde_json::json;
	use tempfile::TempDir;

	use super::*;
	use crate::fake::{FakeAccount, FakeLauncher, FakeTerminalApi};

	fn terminal_in(dir: &Path) -> PathBuf {
		std::fs::create_dir_all(dir).unwrap();
		let exe = dir.join("terminal64.exe");
		std::fs::write(&exe, b"").unwrap();
		exe
	}

	struct Fixture {
		_temp: TempDir,
		shared: Arc<SharedTerminal>,
		api: FakeTerminalApi,
		a: InstanceDescriptor,
		b: InstanceDescriptor,
	}

	fn fixture() -> Fixture {
		let temp = TempDir::new().unwrap();
		let t1 = terminal_in(&temp.path().join("t1"));
		let t2 = terminal_in(&temp.path().join("t2"));
		let api = FakeTerminalApi::new()
			.with_terminal(&t1, FakeAccount::new(111, "p1", "demo"))
			.with_terminal(&t2, FakeAccount::new(222, "p2", "demo"));
		let shared = SharedTerminal::with_launcher(api.clone(), FakeLauncher::new());
		Fixture {
			a: InstanceDescriptor::new(&t1, 111, "p1", "demo").unwrap(),
			b: InstanceDescriptor::new(&t2, 222, "p2", "demo").unwrap(),
			_temp: temp,
			shared,
			api,
		}
	}

	fn start(shared: &SharedTerminal, descriptor: &InstanceDescriptor) {
		shared.with_slot_blocking(|slot| {
			slot.start_session(descriptor, &ClientOptions::default()).unwrap();
			assert_eq!(slot.poll_ready(descriptor, 1_000).unwrap(), Readiness::Ready);
			slot.mark_ready(descriptor.identity());
		});
	}

	#[test]
	fn forward_rebinds_only_on_identity_change() {
		let fx = fixture();
		start(&fx.shared, &fx.a);
		start(&fx.shared, &fx.b);

		let login_of = |descriptor: &InstanceDescriptor| {
			fx.shared.with_slot_blocking(|slot| slot.forward(descriptor, ops::ACCOUNT_INFO, &CallArgs::new(), 1_000).unwrap()["login"].clone())
		};

		assert_eq!(login_of(&fx.a), json!(111));
		assert_eq!(login_of(&fx.a), json!(111));
		assert_eq!(login_of(&fx.b), json!(222));
		assert_eq!(login_of(&fx.a), json!(111));

		let a = fx.shared.session(fx.a.identity()).unwrap();
		let b = fx.shared.session(fx.b.identity()).unwrap();
		assert_eq!(a.rebinds, 2, "A rebinds after B's startup and after B's call");
		assert_eq!(b.rebinds, 1, "only the switch away from A costs B a rebind");
		assert_eq!(a.calls, 3);
		assert_eq!(fx.shared.bound_identity().as_ref(), Some(fx.a.identity()));
	}

	#[test]
	fn restarted_session_starts_with_fresh_counters() {
		let fx = fixture();
		start(&fx.shared, &fx.a);
		start(&fx.shared, &fx.b);
		fx.shared
			.with_slot_blocking(|slot| slot.forward(&fx.a, ops::VERSION, &CallArgs::new(), 1_000))
			.unwrap();
		let before = fx.shared.session(fx.a.identity()).unwrap();
		assert_eq!((before.rebinds, before.calls), (1, 1));

		fx.shared
			.with_slot_blocking(|slot| slot.start_session(&fx.a, &ClientOptions::default()))
			.unwrap();
		let after = fx.shared.session(fx.a.identity()).unwrap();
		assert_eq!(after.phase, TerminalPhase::Starting);
		assert_eq!((after.rebinds, after.calls), (0, 0));
	}

	#[test]
	fn abandoned_session_is_forgotten() {
		let temp = TempDir::new().unwrap();
		let t1 = terminal_in(&temp.path().join("t1"));
		let api = FakeTerminalApi::new().with_terminal(&t1, FakeAccount::new(111, "p1", "demo"));
		let launcher = FakeLauncher::new();
		let shared = SharedTerminal::with_launcher(api.clone(), launcher.clone());
		let a = InstanceDescriptor::new(&t1, 111, "wrong", "demo").unwrap();

		let err = shared
			.with_slot_blocking(|slot| slot.start_session(&a, &ClientOptions::default()))
			.unwrap_err();
		assert!(matches!(err, Error::Authentication { .. }), "{err}");
		assert_eq!(shared.session(a.identity()).unwrap().phase, TerminalPhase::Starting);

		shared.with_slot_blocking(|slot| slot.abandon(a.identity()));
		assert!(shared.session(a.identity()).is_none());
		assert_eq!(launcher.running_count(), 0, "the terminal this session started is stopped");
		assert_eq!(shared.bound_identity(), None);
	}

	#[test]
	fn uninitialized_session_refuses_calls() {
		let fx = fixture();
		let err = fx
			.shared
			.with_slot_blocking(|slot| slot.forward(&fx.a, ops::ACCOUNT_INFO, &CallArgs::new(), 1_000))
			.unwrap_err();
		assert!(matches!(err, Error::Initialization { .. }), "{err}");
		assert!(fx.api.calls().is_empty());
	}

	#[test]
	fn failed_rebind_surfaces_as_initialization_error() {
		let fx = fixture();
		start(&fx.shared, &fx.a);
		start(&fx.shared, &fx.b);

		fx.api.fail_initialize(fx.a.executable(), LastError::from_result_code(ResultCode::InternalFailInit));
		let err = fx
			.shared
			.with_slot_blocking(|slot| slot.forward(&fx.a, ops::ACCOUNT_INFO, &CallArgs::new(), 1_000))
			.unwrap_err();
		assert!(matches!(err, Error::Initialization { ref identity, .. } if identity == fx.a.identity()), "{err}");
		assert_eq!(fx.shared.bound_identity(), None, "a failed rebind must not leave B looking bound");
	}

	#[test]
	fn lease_rejects_duplicates_until_dropped() {
		let fx = fixture();
		let lease = fx.shared.lease(fx.a.identity()).unwrap();
		assert!(matches!(fx.shared.lease(fx.a.identity()), Err(Error::Configuration(_))));
		assert_eq!(fx.shared.live_identities(), vec![fx.a.identity().clone()]);

		drop(lease);
		assert!(fx.shared.live_identities().is_empty());
		assert!(fx.shared.lease(fx.a.identity()).is_ok());
	}

	#[test]
	fn release_unbinds_and_stops_owned_process() {
		let temp = TempDir::new().unwrap();
		let t1 = terminal_in(&temp.path().join("t1"));
		let api = FakeTerminalApi::new().with_terminal(&t1, FakeAccount::new(111, "p1", "demo"));
		let launcher = FakeLauncher::new();
		let shared = SharedTerminal::with_launcher(api.clone(), launcher.clone());
		let a = InstanceDescriptor::new(&t1, 111, "p1", "demo").unwrap();

		start(&shared, &a);
		assert_eq!(launcher.running_count(), 1);

		shared.with_slot_blocking(|slot| slot.release(a.identity(), false)).unwrap();
		assert_eq!(launcher.running_count(), 0);
		assert_eq!(shared.bound_identity(), None);
		assert!(shared.session(a.identity()).is_none());
		assert_eq!(api.current(), None);
	}
}
