use serde::{Deserialize, Serialize};
use serde_json::json;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};

use halter::paths::AppPaths;
use halter::rpc::{RpcError, RpcRequest, RpcResponse};
use halter::server::serve_lines;

#[derive(Debug, Serialize, Deserialize, PartialEq)]
enum Req {
	Ping,
	Echo(String),
	Add(i32, i32),
}

#[derive(Debug, Serialize, Deserialize, PartialEq)]
enum Resp {
	Pong,
	Echo(String),
	Sum(i32),
}

async fn handle(req: Req) -> Resp {
	match req {
		Req::Ping => Resp::Pong,
		Req::Echo(s) => Resp::Echo(s),
		Req::Add(a, b) => Resp::Sum(a + b),
	}
}

fn to_lines(reqs: &[&str]) -> Vec<u8> {
	let mut data = Vec::new();
	for r in reqs {
		data.extend_from_slice(r.as_bytes());
		data.push(b'\n');
	}
	data
}

fn parse_output<T: serde::de::DeserializeOwned>(out: &[u8]) -> Vec<T> {
	String::from_utf8_lossy(out)
		.lines()
		.map(|l| serde_json::from_str(l).unwrap())
		.collect()
}

// --- Paths tests ---

#[test]
fn paths_xdg_overrides() {
	let paths = AppPaths::new("testapp");
	let tmp = std::env::temp_dir();
	std::env::set_var("XDG_STATE_HOME", &tmp);
	std::env::set_var("XDG_CONFIG_HOME", &tmp);
	assert_eq!(paths.state_dir(), tmp.join("testapp"));
	assert_eq!(paths.state_file(), tmp.join("testapp").join("processes.json"));
	assert_eq!(paths.config_file(), tmp.join("testapp").join("config.toml"));
}

// --- Line serving ---

#[tokio::test]
async fn serves_requests_in_order() {
	let input = to_lines(&[r#""Ping""#, r#"{"Echo":"hello"}"#, r#"{"Add":[3,7]}"#]);
	let mut output = Vec::new();

	let summary = serve_lines(&input[..], &mut output, handle, std::future::pending::<()>())
		.await
		.unwrap();

	assert_eq!(summary.handled, 3);
	assert_eq!(summary.skipped, 0);
	assert!(!summary.interrupted);

	let responses: Vec<Resp> = parse_output(&output);
	assert_eq!(
		responses,
		vec![Resp::Pong, Resp::Echo("hello".into()), Resp::Sum(10)]
	);
}

#[tokio::test]
async fn malformed_lines_are_skipped() {
	let input = to_lines(&["this is not json", r#""Ping""#, "{\"Add\":", "", r#"{"Add":[1,1]}"#]);
	let mut output = Vec::new();

	let summary = serve_lines(&input[..], &mut output, handle, std::future::pending::<()>())
		.await
		.unwrap();

	assert_eq!(summary.handled, 2);
	assert_eq!(summary.skipped, 2);

	let responses: Vec<Resp> = parse_output(&output);
	assert_eq!(responses, vec![Resp::Pong, Resp::Sum(2)]);
}

#[tokio::test]
async fn invalid_utf8_line_is_skipped() {
	let mut input = b"\xff\xfe garbage\n".to_vec();
	input.extend_from_slice(&to_lines(&[r#""Ping""#, "\u{00e9}t\u{00e9}", "{\"Echo\":\"caf\u{00e9}\"}"]));
	let mut output = Vec::new();

	let summary = serve_lines(&input[..], &mut output, handle, std::future::pending::<()>())
		.await
		.unwrap();

	assert_eq!(summary.handled, 2);
	assert_eq!(summary.skipped, 2);

	let responses: Vec<Resp> = parse_output(&output);
	assert_eq!(responses, vec![Resp::Pong, Resp::Echo("caf\u{00e9}".into())]);
}

#[tokio::test]
async fn last_line_without_newline_is_served() {
	let mut output = Vec::new();
	let summary = serve_lines(&b"\"Ping\"\r\n{\"Add\":[2,2]}"[..], &mut output, handle, std::future::pending::<()>())
		.await
		.unwrap();
	assert_eq!(summary.handled, 2);
	assert_eq!(parse_output::<Resp>(&output), vec![Resp::Pong, Resp::Sum(4)]);
}

#[tokio::test]
async fn empty_input_ends_immediately() {
	let mut output = Vec::new();
	let summary = serve_lines(&b""[..], &mut output, handle, std::future::pending::<()>())
		.await
		.unwrap();
	assert_eq!(summary, Default::default());
	assert!(output.is_empty());
}

#[tokio::test]
async fn handler_can_borrow_state() {
	let mut seen = Vec::new();
	let input = to_lines(&[r#"{"Echo":"a"}"#, r#"{"Echo":"b"}"#]);
	let mut output = Vec::new();

	serve_lines(
		&input[..],
		&mut output,
		|req: Req| {
			seen.push(format!("{:?}", req));
			handle(req)
		},
		std::future::pending::<()>(),
	)
	.await
	.unwrap();

	assert_eq!(seen, vec![r#"Echo("a")"#, r#"Echo("b")"#]);
}

#[tokio::test]
async fn shutdown_stops_waiting_for_input() {
	let (client, server) = tokio::io::duplex(4096);
	let (server_read, server_write) = tokio::io::split(server);
	let (client_read, mut client_write) = tokio::io::split(client);
	let (stop_tx, stop_rx) = tokio::sync::oneshot::channel::<()>();

	let server_handle = tokio::spawn(async move {
		serve_lines(server_read, server_write, handle, async {
			let _ = stop_rx.await;
		})
		.await
	});

	client_write.write_all(b"\"Ping\"\n").await.unwrap();
	let mut lines = BufReader::new(client_read).lines();
	let line = lines.next_line().await.unwrap().unwrap();
	assert_eq!(serde_json::from_str::<Resp>(&line).unwrap(), Resp::Pong);

	stop_tx.send(()).unwrap();
	let summary = tokio::time::timeout(std::time::Duration::from_secs(2), server_handle)
		.await
		.expect("server did not stop")
		.unwrap()
		.unwrap();
	assert!(summary.interrupted);
	assert_eq!(summary.handled, 1);
}

// --- JSON-RPC envelopes over the wire ---

#[tokio::test]
async fn rpc_roundtrip_mirrors_ids() {
	let input = to_lines(&[
		r#"{"jsonrpc":"2.0","id":1,"method":"ping","params":{}}"#,
		r#"{"jsonrpc":"2.0","id":"two","method":"missing"}"#,
		r#"{"jsonrpc":"2.0","method":"ping"}"#,
	]);
	let mut output = Vec::new();

	serve_lines(
		&input[..],
		&mut output,
		|req: RpcRequest| async move {
			match req.method.as_str() {
				"ping" => RpcResponse::success(req.id, json!("pong")),
				other => RpcResponse::failure(req.id, RpcError::method_not_found(other)),
			}
		},
		std::future::pending::<()>(),
	)
	.await
	.unwrap();

	let responses: Vec<RpcResponse> = parse_output(&output);
	assert_eq!(responses.len(), 3);
	assert_eq!(responses[0].id, json!(1));
	assert_eq!(responses[0].result, Some(json!("pong")));
	assert_eq!(responses[1].id, json!("two"));
	assert_eq!(responses[1].error.as_ref().unwrap().code, RpcError::METHOD_NOT_FOUND);
	assert_eq!(responses[2].id, serde_json::Value::Null);
	assert!(!responses[2].is_error());
}
