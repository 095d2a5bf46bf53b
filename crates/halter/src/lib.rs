//! # halter
//!
//! Line-delimited JSON transport for Rust CLIs.
//!
//! Reads one JSON request per line from any async reader, hands it to a
//! handler, and writes one JSON response per line back. Ships JSON-RPC 2.0
//! envelope types and XDG path helpers for tools that keep state on disk.
//!
//! ## Quick start
//!
//! ```rust,no_run
//! use halter::{serve_lines, RpcRequest, RpcResponse};
//!
//! # #[tokio::main]
//! # async fn main() {
//! let summary = serve_lines(
//!     tokio::io::stdin(),
//!     tokio::io::stdout(),
//!     |req: RpcRequest| async move { RpcResponse::success(req.id, req.params) },
//!     std::future::pending::<()>(),
//! )
//! .await
//! .unwrap();
//! eprintln!("handled {} requests", summary.handled);
//! # }
//! ```

pub mod error;
pub mod paths;
pub mod rpc;
pub mod server;

pub use error::TransportError;
pub use paths::AppPaths;
pub use rpc::{RpcError, RpcRequest, RpcResponse};
pub use server::{serve_lines, ServeSummary};
