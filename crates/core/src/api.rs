//! The wrapped terminal API.
//!
//! Implementations bridge to the real terminal library. That library keeps
//! one process-wide binding, and this trait mirrors it faithfully: `initialize`
//! replaces the binding, and everything else acts on whatever is bound. Only
//! [`SharedTerminal`](crate::SharedTerminal) calls into it.

use mtplex_protocol::{CallArgs, InitializeRequest, LastError, LoginRequest};
use serde_json::Value;

/// Operation names used by the layer itself.
pub mod ops {
	pub const ACCOUNT_INFO: &str = "account_info";
	pub const TERMINAL_INFO: &str = "terminal_info";
	pub const VERSION: &str = "version";
	pub const SYMBOL_INFO_TICK: &str = "symbol_info_tick";
}

/// Single-binding terminal API.
///
/// `initialize` and `login` report success as a bool and leave details in
/// [`last_error`](TerminalApi::last_error), matching the wrapped library.
pub trait TerminalApi: Send {
	/// Binds the global slot to `request.path`, logging in when credentials are given.
	fn initialize(&mut self, request: &InitializeRequest) -> bool;

	/// Logs the currently bound terminal into an account.
	fn login(&mut self, request: &LoginRequest) -> bool;

	/// Releases the current binding.
	fn shutdown(&mut self);

	fn last_error(&self) -> LastError;

	/// Runs any other named operation against the current binding.
	fn invoke(&mut self, operation: &str, args: &CallArgs) -> Result<Value, LastError>;
}

impl<T: TerminalApi + ?Sized> TerminalApi for Box<T> {
	fn initialize(&mut self, request: &InitializeRequest) -> bool {
		(**self).initialize(request)
	}

	fn login(&mut self, request: &LoginRequest) -> bool {
		(**self).login(request)
	}

	fn shutdown(&mut self) {
		(**self).shutdown()
	}

	fn last_error(&self) -> LastError {
		(**self).last_error()
	}

	fn invoke(&mut self, operation: &str, args: &CallArgs) -> Result<Value, LastError> {
		(**self).invoke(operation, args)
	}
}
