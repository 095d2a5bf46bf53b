use std::io;
use std::path::PathBuf;
use std::time::Duration;

use thiserror::Error;

pub type Result<T> = std::result::Result<T, Error>;

#[derive(Debug, Error)]
pub enum Error {
	#[error("process '{0}' is already running")]
	AlreadyRunning(String),

	#[error("process '{0}' not found")]
	NotFound(String),

	#[error("command must not be empty")]
	InvalidCommand,

	#[error("port {port} on {host} not ready within {}s", .timeout.as_secs_f64())]
	Timeout {
		host: String,
		port: u16,
		timeout: Duration,
	},

	#[error("failed to spawn '{command}': {source}")]
	Spawn {
		command: String,
		#[source]
		source: io::Error,
	},

	#[error("state file {}: {reason}", .path.display())]
	State { path: PathBuf, reason: String },

	#[error(transparent)]
	Io(#[from] io::Error),
}
