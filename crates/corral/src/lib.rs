//! # corral
//!
//! Process supervision engine for Rust CLIs.
//!
//! Start named child processes without blocking, read their output without
//! blocking, probe TCP ports for readiness, and tear everything down
//! deterministically. Pairs with [`halter`] for a line-based request/response
//! front end.
//!
//! ## Quick start
//!
//! ```rust,no_run
//! use corral::{Registry, RegistryConfig};
//! use std::time::Duration;
//!
//! # #[tokio::main]
//! # async fn main() -> corral::Result<()> {
//! let registry = Registry::in_memory(RegistryConfig::default());
//!
//! registry.start("web", "python -m http.server 8080", None).await?;
//! registry.wait_healthy(8080, Duration::from_secs(10), "localhost").await?;
//!
//! let logs = registry.get_logs("web", 20).await?;
//! println!("{}", logs.stderr.join("\n"));
//!
//! registry.stop("web", false).await?;
//! registry.shutdown().await;
//! # Ok(())
//! # }
//! ```
//!
//! [`halter`]: https://crates.io/crates/halter

pub mod error;
pub mod handle;
pub mod output;
pub mod probe;
pub mod registry;
pub mod store;
pub mod types;

pub use error::{Error, Result};
pub use handle::{ProcessHandle, SpawnMode};
pub use output::{OutputCapture, Stream};
pub use probe::ProbeConfig;
pub use registry::{ManagedProcess, Registry, RegistryConfig};
pub use store::{FileStore, MemoryStore, ProcessRecord, Store};
pub use types::*;
