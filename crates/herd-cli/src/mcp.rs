//! Tool-calling front end over JSON-RPC.
//!
//! Three methods are understood: `initialize`, `tools/list` and `tools/call`.
//! Every tool failure, including argument validation, comes back as an error
//! response with code [`RpcError::TOOL_ERROR`]; nothing a caller sends can
//! take the server down.

use std::path::PathBuf;
use std::time::Duration;

use corral::{Registry, Store};
use halter::{RpcError, RpcRequest, RpcResponse};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

use crate::config::secs;

pub const PROTOCOL_VERSION: &str = "2024-11-05";
const DEFAULT_LOG_LINES: usize = 50;

pub struct McpServer<S: Store> {
	registry: Registry<S>,
	name: String,
	default_timeout: Duration,
	default_host: String,
}

#[derive(Debug, Deserialize)]
struct ToolCall {
	name: String,
	#[serde(default)]
	arguments: Value,
}

#[derive(Debug, Deserialize)]
struct StartArgs {
	name: String,
	command: String,
	cwd: Option<PathBuf>,
}

#[derive(Debug, Deserialize)]
struct StopArgs {
	name: String,
	#[serde(default)]
	force: bool,
}

#[derive(Debug, Deserialize)]
struct ListArgs {}

#[derive(Debug, Deserialize)]
struct LogsArgs {
	name: String,
	lines: Option<usize>,
}

#[derive(Debug, Deserialize)]
struct HealthArgs {
	port: u16,
	timeout: Option<f64>,
	host: Option<String>,
}

impl<S: Store> McpServer<S> {
	pub fn new(registry: Registry<S>, name: impl Into<String>, default_timeout: Duration, default_host: impl Into<String>) -> Self {
		Self {
			registry,
			name: name.into(),
			default_timeout,
			default_host: default_host.into(),
		}
	}

	pub fn registry(&self) -> &Registry<S> {
		&self.registry
	}

	/// Answer one request. Always produces exactly one response.
	pub async fn handle(&self, request: RpcRequest) -> RpcResponse {
		tracing::debug!(method = %request.method, id = %request.id, "request");
		let id = request.id;
		let outcome = match request.method.as_str() {
			"initialize" => Ok(self.initialize()),
			"tools/list" => Ok(json!({ "tools": tool_definitions() })),
			"tools/call" => self.call(request.params).await,
			other => Err(RpcError::method_not_found(other)),
		};
		match outcome {
			Ok(result) => RpcResponse::success(id, result),
			Err(e) => {
				tracing::warn!(code = e.code, "request failed: {}", e.message);
				RpcResponse::failure(id, e)
			}
		}
	}

	fn initialize(&self) -> Value {
		json!({
			"protocolVersion": PROTOCOL_VERSION,
			"capabilities": {
				"tools": { "listChanged": true }
			},
			"serverInfo": {
				"name": self.name,
				"version": env!("CARGO_PKG_VERSION"),
			}
		})
	}

	async fn call(&self, params: Value) -> Result<Value, RpcError> {
		let call: ToolCall = parse_args("tools/call", params)?;
		tracing::info!(tool = %call.name, "tool call");

		let text = match call.name.as_str() {
			"start_process" => {
				let args: StartArgs = parse_args(&call.name, call.arguments)?;
				let report = self.registry.start(&args.name, &args.command, args.cwd.as_deref()).await;
				render(report.map_err(tool_error)?)?
			}
			"stop_process" => {
				let args: StopArgs = parse_args(&call.name, call.arguments)?;
				render(self.registry.stop(&args.name, args.force).await.map_err(tool_error)?)?
			}
			"list_processes" => {
				let _: ListArgs = parse_args(&call.name, call.arguments)?;
				render(self.registry.list().await.map_err(tool_error)?)?
			}
			"get_logs" => {
				let args: LogsArgs = parse_args(&call.name, call.arguments)?;
				let lines = args.lines.unwrap_or(DEFAULT_LOG_LINES);
				render(self.registry.get_logs(&args.name, lines).await.map_err(tool_error)?)?
			}
			"wait_healthy" => {
				let args: HealthArgs = parse_args(&call.name, call.arguments)?;
				let timeout = match args.timeout {
					Some(t) if !t.is_finite() || t < 0.0 => {
						return Err(RpcError::tool(format!("invalid arguments for wait_healthy: timeout must be a non-negative number, got {}", t)));
					}
					Some(t) => secs(t),
					None => self.default_timeout,
				};
				let host = args.host.unwrap_or_else(|| self.default_host.clone());
				render(self.registry.wait_healthy(args.port, timeout, &host).await.map_err(tool_error)?)?
			}
			other => return Err(RpcError::tool(format!("unknown tool: {}", other))),
		};

		Ok(json!({
			"content": [{ "type": "text", "text": text }]
		}))
	}
}

fn parse_args<T: DeserializeOwned>(context: &str, value: Value) -> Result<T, RpcError> {
	let value = if value.is_null() { json!({}) } else { value };
	serde_json::from_value(value).map_err(|e| RpcError::tool(format!("invalid arguments for {}: {}", context, e)))
}

fn render<T: Serialize>(result: T) -> Result<String, RpcError> {
	serde_json::to_string_pretty(&result).map_err(tool_error)
}

fn tool_error(e: impl std::fmt::Display) -> RpcError {
	RpcError::tool(e.to_string())
}

pub fn tool_definitions() -> Value {
	json!([
		{
			"name": "start_process",
			"description": "Start a named background process",
			"inputSchema": {
				"type": "object",
				"properties": {
					"name": { "type": "string", "description": "Process name" },
					"command": { "type": "string", "description": "Command line, split on whitespace" },
					"cwd": { "type": "string", "description": "Working directory (optional)" }
				},
				"required": ["name", "command"]
			}
		},
		{
			"name": "stop_process",
			"description": "Stop a named process",
			"inputSchema": {
				"type": "object",
				"properties": {
					"name": { "type": "string", "description": "Process name" },
					"force": { "type": "boolean", "description": "Kill immediately instead of waiting for a graceful exit" }
				},
				"required": ["name"]
			}
		},
		{
			"name": "list_processes",
			"description": "List all managed processes",
			"inputSchema": {
				"type": "object",
				"properties": {}
			}
		},
		{
			"name": "get_logs",
			"description": "Get recent output of a process",
			"inputSchema": {
				"type": "object",
				"properties": {
					"name": { "type": "string", "description": "Process name" },
					"lines": { "type": "integer", "description": "Number of lines per stream" }
				},
				"required": ["name"]
			}
		},
		{
			"name": "wait_healthy",
			"description": "Wait until a TCP port accepts connections",
			"inputSchema": {
				"type": "object",
				"properties": {
					"port": { "type": "integer", "description": "Port number" },
					"timeout": { "type": "integer", "description": "Timeout in seconds" },
					"host": { "type": "string", "description": "Host address" }
				},
				"required": ["port"]
			}
		}
	])
}
