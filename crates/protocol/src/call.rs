//! Operation arguments forwarded verbatim to the wrapped API.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Positional and keyword arguments for one wrapped operation.
///
/// The layer never inspects these; they reach the terminal API in the order
/// the caller supplied them.
///
/// ```json
/// { "args": ["EURUSD"], "kwargs": { "timeout": 1000 } }
/// ```
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CallArgs {
	#[serde(default, skip_serializing_if = "Vec::is_empty")]
	pub args: Vec<Value>,
	#[serde(default, skip_serializing_if = "Map::is_empty")]
	pub kwargs: Map<String, Value>,
}

impl CallArgs {
	/// Creates an empty argument list.
	pub fn new() -> Self {
		Self::default()
	}

	/// Appends a positional argument.
	pub fn arg(mut self, value: impl Into<Value>) -> Self {
		self.args.push(value.into());
		self
	}

	/// Sets a keyword argument, replacing any previous value under `name`.
	pub fn kwarg(mut self, name: impl Into<String>, value: impl Into<Value>) -> Self {
		self.kwargs.insert(name.into(), value.into());
		self
	}

	/// Returns positional argument `index`, if present.
	pub fn positional(&self, index: usize) -> Option<&Value> {
		self.args.get(index)
	}

	/// Returns keyword argument `name`, if present.
	pub fn keyword(&self, name: &str) -> Option<&Value> {
		self.kwargs.get(name)
	}

	/// Returns `true` when no arguments were supplied.
	pub fn is_empty(&self) -> bool {
		self.args.is_empty() && self.kwargs.is_empty()
	}
}

/// A named operation plus its arguments.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CallRequest {
	pub operation: String,
	#[serde(default)]
	pub args: CallArgs,
}

impl CallRequest {
	pub fn new(operation: impl Into<String>, args: CallArgs) -> Self {
		Self {
			operation: operation.into(),
			args,
		}
	}
}
