use std::path::PathBuf;

pub type Result<T> = std::result::Result<T, Error>;

#[derive(Debug, thiserror::Error)]
pub enum Error {
	#[error("failed to launch terminal at {path}: {source}")]
	Launch {
		path: PathBuf,
		#[source]
		source: std::io::Error,
	},

	#[error("failed to stop terminal process {pid}: {message}")]
	Terminate { pid: u32, message: String },

	#[error("pid file {path} is unreadable: {source}")]
	PidFile {
		path: PathBuf,
		#[source]
		source: serde_json::Error,
	},

	#[error(transparent)]
	Io(#[from] std::io::Error),
}
