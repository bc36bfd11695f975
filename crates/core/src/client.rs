//! The public facade: one client per private terminal copy.

use std::path::Path;
use std::sync::Arc;

use mtplex_protocol::{AccountInfo, Credentials, LastError, TerminalVersion};
use tokio::runtime::{Handle, RuntimeFlavor};
use tracing::{info, warn};

use crate::boundary::{Lease, SharedTerminal};
use crate::descriptor::{IdentityKey, InstanceDescriptor};
use crate::error::Result;
use crate::options::ClientOptions;
use crate::proxy::CallProxy;
use crate::session::{SessionInitializer, SessionState};

/// An isolated connection to one terminal copy.
///
/// Construction launches the terminal if needed, logs in, and waits until the
/// terminal reports the configured account. After that, every call through
/// [`official`](Client::official) runs against this client's terminal, no
/// matter which client touched the shared API last.
///
/// Dropping a client releases its terminal on a best-effort basis; call
/// [`shutdown`](Client::shutdown) to observe failures. The release in `drop`
/// is synchronous: it takes the shared lock and may wait for the terminal
/// process to exit. On a multi-threaded runtime it runs under
/// [`block_in_place`](tokio::task::block_in_place); on a current-thread
/// runtime it blocks the executor until done, so prefer `shutdown` there.
///
/// Dropping the future returned by [`connect`](Client::connect) does not
/// abort startup. It finishes in the background and the session is then
/// released again.
#[derive(Debug)]
pub struct Client {
	/// Forwarder for every operation the wrapped API offers.
	pub official: CallProxy,
	descriptor: Arc<InstanceDescriptor>,
	options: ClientOptions,
	shared: Arc<SharedTerminal>,
	_lease: Lease,
	closed: bool,
}

impl Client {
	/// Connects with default [`ClientOptions`].
	pub async fn connect(
		shared: &Arc<SharedTerminal>,
		terminal_path: impl AsRef<Path>,
		login: u64,
		password: impl Into<String>,
		server: impl Into<String>,
	) -> Result<Self> {
		Self::connect_with_options(
			shared,
			terminal_path,
			Credentials::new(login, password, server),
			ClientOptions::default(),
		)
		.await
	}

	pub async fn connect_with_options(
		shared: &Arc<SharedTerminal>,
		terminal_path: impl AsRef<Path>,
		credentials: Credentials,
		options: ClientOptions,
	) -> Result<Self> {
		let descriptor = Arc::new(InstanceDescriptor::with_options(terminal_path, credentials, &options)?);
		let lease = shared.lease(descriptor.identity())?;

		let lease = SessionInitializer {
			shared: Arc::clone(shared),
			descriptor: Arc::clone(&descriptor),
			options: options.clone(),
		}
		.spawn(lease)
		.await?;

		Ok(Self {
			official: CallProxy::new(Arc::clone(shared), Arc::clone(&descriptor), options.timeout_ms),
			descriptor,
			options,
			shared: Arc::clone(shared),
			_lease: lease,
			closed: false,
		})
	}

	pub fn descriptor(&self) -> &InstanceDescriptor {
		&self.descriptor
	}

	pub fn identity(&self) -> &IdentityKey {
		self.descriptor.identity()
	}

	pub fn options(&self) -> &ClientOptions {
		&self.options
	}

	/// Current session snapshot for this client.
	pub fn session(&self) -> Option<SessionState> {
		self.shared.session(self.identity())
	}

	/// The last terminal error raised by this client's own calls.
	///
	/// Unlike the wrapped API's global error slot, another client's failure
	/// never shows up here.
	pub fn last_error(&self) -> LastError {
		self.session().and_then(|s| s.last_error).unwrap_or_default()
	}

	pub async fn version(&self) -> Result<TerminalVersion> {
		self.official.version().await
	}

	pub async fn account_info(&self) -> Result<AccountInfo> {
		self.official.account_info().await
	}

	/// Logs this client's terminal back into its configured account.
	pub async fn relogin(&self) -> Result<()> {
		let descriptor = Arc::clone(&self.descriptor);
		let timeout_ms = self.options.timeout_ms;
		self.shared.with_slot(move |slot| slot.relogin(&descriptor, timeout_ms)).await
	}

	/// Releases the binding and stops the terminal unless
	/// `keep_terminal_running` is set. Frees the executable path for reuse.
	pub async fn shutdown(mut self) -> Result<()> {
		self.closed = true;
		let identity = self.identity().clone();
		let keep_running = self.options.keep_terminal_running;
		info!(target = "mtplex.session", %identity, keep_running, "shutting down");
		self.shared.with_slot(move |slot| slot.release(&identity, keep_running)).await
	}
}

impl Drop for Client {
	fn drop(&mut self) {
		if self.closed {
			return;
		}
		let identity = self.descriptor.identity();
		let keep_running = self.options.keep_terminal_running;
		let release = || self.shared.with_slot_blocking(|slot| slot.release(identity, keep_running));
		let outcome = match Handle::try_current() {
			Ok(handle) if handle.runtime_flavor() == RuntimeFlavor::MultiThread => tokio::task::block_in_place(release),
			_ => release(),
		};
		if let Err(err) = outcome {
			warn!(target = "mtplex.session", %identity, error = %err, "release on drop failed");
		}
	}
}
