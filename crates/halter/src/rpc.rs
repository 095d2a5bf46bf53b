//! JSON-RPC 2.0 envelopes.
//!
//! A response always mirrors the request `id` (or `null` when the request had
//! none) and carries exactly one of `result` or `error`.

use serde::{Deserialize, Serialize};
use serde_json::Value;

pub const JSONRPC_VERSION: &str = "2.0";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RpcRequest {
	#[serde(default = "default_version")]
	pub jsonrpc: String,
	#[serde(default)]
	pub id: Value,
	pub method: String,
	#[serde(default)]
	pub params: Value,
}

impl RpcRequest {
	pub fn new(id: impl Into<Value>, method: impl Into<String>, params: Value) -> Self {
		Self {
			jsonrpc: JSONRPC_VERSION.to_string(),
			id: id.into(),
			method: method.into(),
			params,
		}
	}
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RpcResponse {
	pub jsonrpc: String,
	pub id: Value,
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub result: Option<Value>,
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub error: Option<RpcError>,
}

impl RpcResponse {
	pub fn success(id: Value, result: Value) -> Self {
		Self {
			jsonrpc: JSONRPC_VERSION.to_string(),
			id,
			result: Some(result),
			error: None,
		}
	}

	pub fn failure(id: Value, error: RpcError) -> Self {
		Self {
			jsonrpc: JSONRPC_VERSION.to_string(),
			id,
			result: None,
			error: Some(error),
		}
	}

	pub fn is_error(&self) -> bool {
		self.error.is_some()
	}
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, thiserror::Error)]
#[error("{message} (code {code})")]
pub struct RpcError {
	pub code: i64,
	pub message: String,
}

impl RpcError {
	/// Application-level failure of a tool call.
	pub const TOOL_ERROR: i64 = -1;
	pub const METHOD_NOT_FOUND: i64 = -32601;

	pub fn new(code: i64, message: impl Into<String>) -> Self {
		Self {
			code,
			message: message.into(),
		}
	}

	pub fn tool(message: impl Into<String>) -> Self {
		Self::new(Self::TOOL_ERROR, message)
	}

	pub fn method_not_found(method: &str) -> Self {
		Self::new(Self::METHOD_NOT_FOUND, format!("Method not found: {}", method))
	}
}

fn default_version() -> String {
	JSONRPC_VERSION.to_string()
}
