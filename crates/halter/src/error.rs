use std::io;

use thiserror::Error;

/// Errors that end a line-serving session.
///
/// Malformed request lines are not errors: they are logged and skipped.
#[derive(Debug, Error)]
pub enum TransportError {
	/// Reading from or writing to the stream failed.
	#[error("io error: {0}")]
	Io(#[from] io::Error),
	/// A response could not be serialized.
	#[error("encode error: {0}")]
	Encode(#[from] serde_json::Error),
}
