//! Call forwarding for one client.

use std::sync::Arc;

use mtplex_protocol::{AccountInfo, CallArgs, CallRequest, TerminalInfo, TerminalVersion};
use serde::de::DeserializeOwned;
use serde_json::Value;
use tracing::debug;

use crate::api::ops;
use crate::boundary::SharedTerminal;
use crate::descriptor::{IdentityKey, InstanceDescriptor};
use crate::error::{Error, Result};

/// Forwards any named operation to the wrapped API on behalf of one client.
///
/// Each call re-binds the shared API to this client's terminal first if some
/// other client moved it. Operation names and arguments pass through
/// untouched, so anything the wrapped API supports is reachable here.
#[derive(Debug)]
pub struct CallProxy {
	shared: Arc<SharedTerminal>,
	descriptor: Arc<InstanceDescriptor>,
	timeout_ms: u64,
}

impl CallProxy {
	pub(crate) fn new(shared: Arc<SharedTerminal>, descriptor: Arc<InstanceDescriptor>, timeout_ms: u64) -> Self {
		Self {
			shared,
			descriptor,
			timeout_ms,
		}
	}

	pub fn identity(&self) -> &IdentityKey {
		self.descriptor.identity()
	}

	/// Invokes `operation` with `args` and returns the raw result.
	pub async fn invoke(&self, operation: &str, args: CallArgs) -> Result<Value> {
		self.send(CallRequest::new(operation, args)).await
	}

	/// Invokes `operation` without arguments.
	pub async fn call(&self, operation: &str) -> Result<Value> {
		self.invoke(operation, CallArgs::new()).await
	}

	/// Invokes `operation` and decodes the result into `T`.
	pub async fn invoke_as<T: DeserializeOwned>(&self, operation: &str, args: CallArgs) -> Result<T> {
		let value = self.invoke(operation, args).await?;
		serde_json::from_value(value).map_err(|source| Error::Decode {
			operation: operation.to_string(),
			source,
		})
	}

	pub async fn account_info(&self) -> Result<AccountInfo> {
		self.invoke_as(ops::ACCOUNT_INFO, CallArgs::new()).await
	}

	pub async fn terminal_info(&self) -> Result<TerminalInfo> {
		self.invoke_as(ops::TERMINAL_INFO, CallArgs::new()).await
	}

	pub async fn version(&self) -> Result<TerminalVersion> {
		self.invoke_as(ops::VERSION, CallArgs::new()).await
	}

	/// Latest tick for `symbol`, as returned by the terminal.
	pub async fn symbol_info_tick(&self, symbol: &str) -> Result<Value> {
		self.invoke(ops::SYMBOL_INFO_TICK, CallArgs::new().arg(symbol)).await
	}

	async fn send(&self, request: CallRequest) -> Result<Value> {
		debug!(
			target = "mtplex.proxy",
			identity = %self.descriptor.identity(),
			operation = %request.operation,
			"forwarding"
		);
		let descriptor = Arc::clone(&self.descriptor);
		let timeout_ms = self.timeout_ms;
		self.shared
			.with_slot(move |slot| slot.forward(&descriptor, &request.operation, &request.args, timeout_ms))
			.await
	}
}
