//! Multiple isolated sessions over a terminal API that only supports one.
//!
//! The wrapped API keeps a single process-wide binding: one current terminal,
//! one current login. `mtplex` lets several [`Client`]s, each bound to a
//! private copy of the terminal executable, share that binding safely. Every
//! forwarded call re-asserts the caller's binding immediately before it runs.
//!
//! # Example
//!
//! ```ignore
//! let shared = SharedTerminal::new(my_terminal_api);
//! let a = Client::connect(&shared, "C:/mt5/a/terminal64.exe", 111, "p1", "Broker-Demo").await?;
//! let b = Client::connect(&shared, "C:/mt5/b/terminal64.exe", 222, "p2", "Broker-Demo").await?;
//!
//! let tick = a.official.invoke("symbol_info_tick", CallArgs::new().arg("EURUSD")).await?;
//! let info = b.official.account_info().await?;
//! ```
//!
//! # Threading
//!
//! The binding slot sits behind one lock and each call holds it across
//! re-bind and forward. Clients may be used from any task or thread, but
//! calls are serialized. Separate OS processes remain the only way to get
//! truly parallel terminal access.

pub mod api;
pub mod boundary;
pub mod client;
pub mod descriptor;
pub mod error;
pub mod fake;
pub mod options;
pub mod proxy;
pub mod session;

pub use api::{TerminalApi, ops};
pub use boundary::SharedTerminal;
pub use client::Client;
pub use descriptor::{IdentityKey, InstanceDescriptor};
pub use error::{Error, ErrorKind, Result};
pub use mtplex_protocol::{
	AccountInfo, CallArgs, CallRequest, Credentials, InitializeRequest, LastError, LoginRequest, MarginMode, MarginSoMode, ResultCode, TerminalInfo,
	TerminalVersion, TradeMode,
};
pub use mtplex_runtime::{PortableLauncher, TerminalLauncher, TerminalPhase, TerminalProcess};
pub use options::ClientOptions;
pub use proxy::CallProxy;
pub use session::SessionState;

/// Default readiness timeout in milliseconds.
pub const DEFAULT_TIMEOUT_MS: u64 = 60_000;

/// Default interval between readiness checks in milliseconds.
pub const DEFAULT_POLL_INTERVAL_MS: u64 = 200;
