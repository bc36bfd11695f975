//! Error taxonomy for client construction and forwarded calls.

use std::time::Duration;

use mtplex_protocol::{LastError, ResultCode};

use crate::descriptor::IdentityKey;

pub type Result<T> = std::result::Result<T, Error>;

/// Coarse classification of [`Error`] for callers that branch on failure type.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
	Configuration,
	Initialization,
	Authentication,
	Timeout,
	Forwarding,
	Decode,
	Runtime,
}

#[derive(Debug, thiserror::Error)]
pub enum Error {
	/// Bad descriptor: missing, shared or unwritable executable path, or bad credentials shape.
	#[error("configuration error: {0}")]
	Configuration(String),

	/// The terminal did not start, could not be bound, or has exited.
	#[error("initialization failed for {identity}: {message}")]
	Initialization {
		identity: IdentityKey,
		message: String,
		last_error: Option<LastError>,
	},

	/// Login, password or server rejected by the terminal.
	#[error("authentication failed for {identity}: {message}")]
	Authentication {
		identity: IdentityKey,
		message: String,
		last_error: Option<LastError>,
	},

	#[error("terminal {identity} not ready after {waited:?}")]
	Timeout { identity: IdentityKey, waited: Duration },

	/// The wrapped operation itself failed; `source` is the terminal's own error.
	#[error("{operation} failed on {identity}: {source}")]
	Forwarding {
		identity: IdentityKey,
		operation: String,
		#[source]
		source: LastError,
	},

	#[error("failed to decode {operation} result: {source}")]
	Decode {
		operation: String,
		#[source]
		source: serde_json::Error,
	},

	#[error("blocking task did not complete: {0}")]
	Runtime(String),
}

impl Error {
	pub fn kind(&self) -> ErrorKind {
		match self {
			Error::Configuration(_) => ErrorKind::Configuration,
			Error::Initialization { .. } => ErrorKind::Initialization,
			Error::Authentication { .. } => ErrorKind::Authentication,
			Error::Timeout { .. } => ErrorKind::Timeout,
			Error::Forwarding { .. } => ErrorKind::Forwarding,
			Error::Decode { .. } => ErrorKind::Decode,
			Error::Runtime(_) => ErrorKind::Runtime,
		}
	}

	/// Identity of the client the failure belongs to, when known.
	pub fn identity(&self) -> Option<&IdentityKey> {
		match self {
			Error::Initialization { identity, .. }
			| Error::Authentication { identity, .. }
			| Error::Timeout { identity, .. }
			| Error::Forwarding { identity, .. } => Some(identity),
			_ => None,
		}
	}

	/// The terminal error tuple carried by this failure, if any.
	pub fn last_error(&self) -> Option<&LastError> {
		match self {
			Error::Initialization { last_error, .. } | Error::Authentication { last_error, .. } => last_error.as_ref(),
			Error::Forwarding { source, .. } => Some(source),
			_ => None,
		}
	}

	pub fn is_timeout(&self) -> bool {
		self.kind() == ErrorKind::Timeout
	}

	pub(crate) fn initialization(identity: &IdentityKey, message: impl Into<String>) -> Self {
		Error::Initialization {
			identity: identity.clone(),
			message: message.into(),
			last_error: None,
		}
	}

	/// Maps a failed `initialize`/`login` to the matching construction error.
	pub(crate) fn from_bind_failure(identity: &IdentityKey, last_error: LastError, waited: Duration) -> Self {
		match last_error.result_code() {
			Some(ResultCode::AuthFailed) => Error::Authentication {
				identity: identity.clone(),
				message: last_error.description.clone(),
				last_error: Some(last_error),
			},
			Some(ResultCode::InternalFailTimeout) => Error::Timeout {
				identity: identity.clone(),
				waited,
			},
			_ => Error::Initialization {
				identity: identity.clone(),
				message: format!("terminal rejected initialize: {last_error}"),
				last_error: Some(last_error),
			},
		}
	}
}
