//! In-memory terminal API and launcher for tests and demos.
//!
//! [`FakeTerminalApi`] reproduces the single-binding behavior of the real
//! library: one current terminal, one global error slot, and operations that
//! answer for whichever terminal is bound. [`FakeLauncher`] stands in for
//! process management.
//!
//! # Example
//!
//! ```ignore
//! let api = FakeTerminalApi::new().with_terminal(&exe, FakeAccount::new(111, "secret", "Broker-Demo"));
//! let shared = SharedTerminal::with_launcher(api.clone(), FakeLauncher::new());
//! let client = Client::connect(&shared, &exe, 111, "secret", "Broker-Demo").await?;
//! assert_eq!(api.current(), Some(exe.canonicalize()?));
//! ```

use std::collections::{HashMap, HashSet};
use std::path::{Path, PathBuf};
use std::sync::Arc;

use mtplex_protocol::{CallArgs, InitializeRequest, LastError, LoginRequest, ResultCode};
use mtplex_runtime::{LaunchSpec, ProcessOrigin, TerminalLauncher, TerminalProcess};
use parking_lot::Mutex;
use serde_json::{Value, json};

use crate::api::{TerminalApi, ops};

/// Operation name under which [`FakeTerminalApi::fail_operation`] stores `initialize` failures.
pub const INITIALIZE: &str = "initialize";

fn canonical(path: &Path) -> PathBuf {
	std::fs::canonicalize(path).unwrap_or_else(|_| path.to_path_buf())
}

/// Account a fake terminal accepts and reports.
#[derive(Debug, Clone, PartialEq)]
pub struct FakeAccount {
	pub login: u64,
	pub password: String,
	pub server: String,
	pub balance: f64,
	pub name: String,
	pub currency: String,
	pub leverage: i64,
}

impl FakeAccount {
	pub fn new(login: u64, password: impl Into<String>, server: impl Into<String>) -> Self {
		Self {
			login,
			password: password.into(),
			server: server.into(),
			balance: 10_000.0,
			name: format!("Account {login}"),
			currency: "USD".to_string(),
			leverage: 100,
		}
	}

	pub fn with_balance(mut self, balance: f64) -> Self {
		self.balance = balance;
		self
	}

	fn accepts(&self, login: u64, password: &str, server: &str) -> bool {
		self.login == login && self.password == password && self.server == server
	}

	fn to_json(&self) -> Value {
		json!({
			"login": self.login,
			"trade_mode": 0,
			"leverage": self.leverage,
			"limit_orders": 200,
			"margin_so_mode": 0,
			"trade_allowed": true,
			"trade_expert": true,
			"margin_mode": 2,
			"currency_digits": 2,
			"fifo_close": false,
			"balance": self.balance,
			"credit": 0.0,
			"profit": 0.0,
			"equity": self.balance,
			"margin": 0.0,
			"margin_free": self.balance,
			"margin_level": 0.0,
			"margin_so_call": 50.0,
			"margin_so_so": 30.0,
			"name": self.name,
			"server": self.server,
			"currency": self.currency,
			"company": "Fake Broker Ltd",
		})
	}
}

/// One operation observed by the fake, with the terminal it ran against.
#[derive(Debug, Clone, PartialEq)]
pub struct FakeCall {
	pub terminal: Option<PathBuf>,
	pub operation: String,
	pub args: CallArgs,
}

#[derive(Debug)]
struct FakeTerminal {
	account: FakeAccount,
	logged_in: bool,
	/// Readiness checks still to answer with `connected: false`.
	warmup: u32,
	ready_after: u32,
	never_ready: bool,
	responses: HashMap<String, Value>,
	failures: HashMap<String, LastError>,
}

#[derive(Debug, Default)]
struct FakeState {
	terminals: HashMap<PathBuf, FakeTerminal>,
	bound: Option<PathBuf>,
	last_error: LastError,
	calls: Vec<FakeCall>,
	initializations: Vec<InitializeRequest>,
}

impl FakeState {
	fn fail(&mut self, error: LastError) -> LastError {
		self.last_error = error.clone();
		error
	}

	fn terminal_mut(&mut self, path: &Path) -> &mut FakeTerminal {
		let path = canonical(path);
		match self.terminals.get_mut(&path) {
			Some(terminal) => terminal,
			None => panic!("fake terminal {} was never registered", path.display()),
		}
	}
}

/// Single-binding terminal API backed by in-memory terminals.
///
/// Clones share state, so a test can keep one handle for inspection after
/// moving another into [`SharedTerminal`](crate::SharedTerminal).
#[derive(Debug, Clone, Default)]
pub struct FakeTerminalApi {
	state: Arc<Mutex<FakeState>>,
}

impl FakeTerminalApi {
	pub fn new() -> Self {
		Self::default()
	}

	/// Registers a terminal executable that accepts `account`.
	pub fn with_terminal(self, path: impl AsRef<Path>, account: FakeAccount) -> Self {
		self.state.lock().terminals.insert(
			canonical(path.as_ref()),
			FakeTerminal {
				account,
				logged_in: false,
				warmup: 0,
				ready_after: 0,
				never_ready: false,
				responses: HashMap::new(),
				failures: HashMap::new(),
			},
		);
		self
	}

	/// Reports `connected: false` for the first `checks` status queries after each login.
	///
	/// # Panics
	///
	/// Panics if `path` was never registered with [`with_terminal`](Self::with_terminal).
	pub fn ready_after(&self, path: impl AsRef<Path>, checks: u32) {
		self.state.lock().terminal_mut(path.as_ref()).ready_after = checks;
	}

	/// The terminal never connects to its trade server.
	///
	/// # Panics
	///
	/// Panics if `path` was never registered with [`with_terminal`](Self::with_terminal).
	pub fn never_ready(&self, path: impl AsRef<Path>) {
		self.state.lock().terminal_mut(path.as_ref()).never_ready = true;
	}

	/// Answers `operation` on this terminal with `value` instead of the built-in result.
	///
	/// # Panics
	///
	/// Panics if `path` was never registered with [`with_terminal`](Self::with_terminal).
	pub fn respond(&self, path: impl AsRef<Path>, operation: &str, value: Value) {
		self.state.lock().terminal_mut(path.as_ref()).responses.insert(operation.to_string(), value);
	}

	/// Makes `operation` fail with `error` on this terminal until cleared.
	/// Use [`INITIALIZE`] to fail binding.
	///
	/// # Panics
	///
	/// Panics if `path` was never registered with [`with_terminal`](Self::with_terminal).
	pub fn fail_operation(&self, path: impl AsRef<Path>, operation: &str, error: LastError) {
		self.state.lock().terminal_mut(path.as_ref()).failures.insert(operation.to_string(), error);
	}

	/// Makes every `initialize` on this terminal fail with `error`.
	///
	/// # Panics
	///
	/// Panics if `path` was never registered with [`with_terminal`](Self::with_terminal).
	pub fn fail_initialize(&self, path: impl AsRef<Path>, error: LastError) {
		self.fail_operation(path, INITIALIZE, error);
	}

	/// Undoes [`fail_operation`](Self::fail_operation) for `operation`.
	///
	/// # Panics
	///
	/// Panics if `path` was never registered with [`with_terminal`](Self::with_terminal).
	pub fn clear_failure(&self, path: impl AsRef<Path>, operation: &str) {
		self.state.lock().terminal_mut(path.as_ref()).failures.remove(operation);
	}

	/// Terminal the global binding points at.
	pub fn current(&self) -> Option<PathBuf> {
		self.state.lock().bound.clone()
	}

	/// Operations forwarded through [`TerminalApi::invoke`], in order.
	pub fn calls(&self) -> Vec<FakeCall> {
		self.state.lock().calls.clone()
	}

	/// Every `initialize` request seen, full binds and re-binds alike.
	pub fn initializations(&self) -> Vec<InitializeRequest> {
		self.state.lock().initializations.clone()
	}

	pub fn initialize_count(&self) -> usize {
		self.state.lock().initializations.len()
	}
}

impl TerminalApi for FakeTerminalApi {
	fn initialize(&mut self, request: &InitializeRequest) -> bool {
		let mut state = self.state.lock();
		state.initializations.push(request.clone());
		state.bound = None;

		let path = canonical(&request.path);
		let Some(terminal) = state.terminals.get_mut(&path) else {
			state.fail(LastError::new(ResultCode::InternalFailInit.code(), "IPC initialize failed, MetaTrader 5 x64 not found"));
			return false;
		};
		if let Some(error) = terminal.failures.get(INITIALIZE).cloned() {
			state.fail(error);
			return false;
		}

		match &request.credentials {
			Some(credentials) => {
				if !terminal.account.accepts(credentials.login, &credentials.password, &credentials.server) {
					terminal.logged_in = false;
					state.fail(LastError::new(ResultCode::AuthFailed.code(), "Terminal: Authorization failed"));
					return false;
				}
				terminal.logged_in = true;
				terminal.warmup = terminal.ready_after;
			}
			None if !terminal.logged_in => {
				state.fail(LastError::from_result_code(ResultCode::InternalFailConnect));
				return false;
			}
			None => {}
		}

		state.bound = Some(path);
		state.last_error = LastError::ok();
		true
	}

	fn login(&mut self, request: &LoginRequest) -> bool {
		let mut state = self.state.lock();
		let Some(path) = state.bound.clone() else {
			state.fail(LastError::from_result_code(ResultCode::InternalFailConnect));
			return false;
		};
		let credentials = &request.credentials;
		let terminal = state.terminal_mut(&path);
		if !terminal.account.accepts(credentials.login, &credentials.password, &credentials.server) {
			state.fail(LastError::new(ResultCode::AuthFailed.code(), "Terminal: Authorization failed"));
			return false;
		}
		terminal.logged_in = true;
		state.last_error = LastError::ok();
		true
	}

	fn shutdown(&mut self) {
		let mut state = self.state.lock();
		state.bound = None;
		state.last_error = LastError::ok();
	}

	fn last_error(&self) -> LastError {
		self.state.lock().last_error.clone()
	}

	fn invoke(&mut self, operation: &str, args: &CallArgs) -> Result<Value, LastError> {
		let mut state = self.state.lock();
		let bound = state.bound.clone();
		state.calls.push(FakeCall {
			terminal: bound.clone(),
			operation: operation.to_string(),
			args: args.clone(),
		});

		let Some(path) = bound else {
			return Err(state.fail(LastError::from_result_code(ResultCode::InternalFailConnect)));
		};
		let terminal = state.terminal_mut(&path);
		let result = if let Some(error) = terminal.failures.get(operation) {
			Err(error.clone())
		} else if let Some(value) = terminal.responses.get(operation) {
			Ok(value.clone())
		} else {
			builtin(terminal, &path, operation, args)
		};

		match result {
			Ok(value) => {
				state.last_error = LastError::ok();
				Ok(value)
			}
			Err(error) => Err(state.fail(error)),
		}
	}
}

fn builtin(terminal: &mut FakeTerminal, path: &Path, operation: &str, args: &CallArgs) -> Result<Value, LastError> {
	match operation {
		ops::TERMINAL_INFO => {
			let connected = if terminal.never_ready || !terminal.logged_in {
				false
			} else if terminal.warmup > 0 {
				terminal.warmup -= 1;
				false
			} else {
				true
			};
			let dir = path.parent().unwrap_or(path);
			Ok(json!({
				"path": dir,
				"data_path": dir,
				"connected": connected,
				"trade_allowed": connected,
				"name": "MetaTrader 5",
				"company": "Fake Broker Ltd",
				"build": 4410,
			}))
		}
		ops::ACCOUNT_INFO if terminal.logged_in => Ok(terminal.account.to_json()),
		ops::ACCOUNT_INFO => Err(LastError::from_result_code(ResultCode::AuthFailed)),
		ops::VERSION => Ok(json!([500, 4410, "05 Jul 2024"])),
		ops::SYMBOL_INFO_TICK => {
			let Some(symbol) = args.positional(0).and_then(Value::as_str) else {
				return Err(LastError::from_result_code(ResultCode::InvalidParams));
			};
			let bid = 1.1 + (terminal.account.login % 1000) as f64 / 10_000.0;
			Ok(json!({
				"symbol": symbol,
				"time": 1_720_000_000,
				"bid": bid,
				"ask": bid + 0.0002,
				"last": 0.0,
				"volume": 0,
				"login": terminal.account.login,
			}))
		}
		"positions_total" | "orders_total" => Ok(json!(0)),
		_ => Err(LastError::from_result_code(ResultCode::Unsupported)),
	}
}

#[derive(Debug, Default)]
struct LauncherState {
	next_pid: u32,
	launches: Vec<LaunchSpec>,
	running: HashMap<PathBuf, u32>,
	failing: HashSet<PathBuf>,
}

/// Launcher that tracks pretend processes instead of starting real ones.
#[derive(Debug, Clone, Default)]
pub struct FakeLauncher {
	state: Arc<Mutex<LauncherState>>,
}

impl FakeLauncher {
	pub fn new() -> Self {
		Self::default()
	}

	/// Makes every launch of `path` fail.
	pub fn fail_launch(&self, path: impl AsRef<Path>) {
		self.state.lock().failing.insert(canonical(path.as_ref()));
	}

	/// Kills the process running `path`, as if the terminal crashed.
	pub fn crash(&self, path: impl AsRef<Path>) {
		self.state.lock().running.remove(&canonical(path.as_ref()));
	}

	pub fn launches(&self) -> Vec<LaunchSpec> {
		self.state.lock().launches.clone()
	}

	/// Executables with a live process, sorted.
	pub fn running(&self) -> Vec<PathBuf> {
		let mut running: Vec<_> = self.state.lock().running.keys().cloned().collect();
		running.sort();
		running
	}

	pub fn running_count(&self) -> usize {
		self.state.lock().running.len()
	}
}

impl TerminalLauncher for FakeLauncher {
	fn launch(&self, spec: &LaunchSpec) -> mtplex_runtime::Result<Box<dyn TerminalProcess>> {
		let mut state = self.state.lock();
		state.launches.push(spec.clone());

		let executable = canonical(&spec.executable);
		if state.failing.contains(&executable) {
			return Err(mtplex_runtime::Error::Launch {
				path: executable,
				source: std::io::Error::new(std::io::ErrorKind::PermissionDenied, "launch refused"),
			});
		}

		let (pid, origin) = match state.running.get(&executable) {
			Some(&pid) => (pid, ProcessOrigin::Attached),
			None => {
				state.next_pid += 1;
				let pid = 40_000 + state.next_pid;
				state.running.insert(executable.clone(), pid);
				(pid, ProcessOrigin::Spawned)
			}
		};

		Ok(Box::new(FakeProcess {
			pid,
			origin,
			executable,
			state: Arc::clone(&self.state),
		}))
	}
}

#[derive(Debug)]
struct FakeProcess {
	pid: u32,
	origin: ProcessOrigin,
	executable: PathBuf,
	state: Arc<Mutex<LauncherState>>,
}

impl TerminalProcess for FakeProcess {
	fn pid(&self) -> Option<u32> {
		Some(self.pid)
	}

	fn origin(&self) -> ProcessOrigin {
		self.origin
	}

	fn exit_status(&mut self) -> mtplex_runtime::Result<Option<String>> {
		let alive = self.state.lock().running.get(&self.executable) == Some(&self.pid);
		Ok((!alive).then(|| "exit code 1".to_string()))
	}

	fn terminate(&mut self) -> mtplex_runtime::Result<()> {
		let mut state = self.state.lock();
		if state.running.get(&self.executable) == Some(&self.pid) {
			state.running.remove(&self.executable);
		}
		Ok(())
	}
}
