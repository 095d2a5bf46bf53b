use std::fs::OpenOptions;
use std::path::Path;
use std::sync::Mutex;

use tracing_subscriber::EnvFilter;

/// Install the global subscriber. Stdout carries the protocol, so events go
/// to `log_file` when given and to stderr otherwise.
pub fn init(log_file: Option<&Path>, default_level: &str) {
	let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));

	if let Some(path) = log_file {
		if let Some(parent) = path.parent() {
			let _ = std::fs::create_dir_all(parent);
		}
		match OpenOptions::new().create(true).append(true).open(path) {
			Ok(file) => {
				tracing_subscriber::fmt()
					.with_env_filter(filter)
					.with_ansi(false)
					.with_writer(Mutex::new(file))
					.init();
				return;
			}
			Err(e) => eprintln!("warning: failed to open log file {}: {}", path.display(), e),
		}
	}

	tracing_subscriber::fmt()
		.with_env_filter(filter)
		.with_writer(std::io::stderr)
		.init();
}
