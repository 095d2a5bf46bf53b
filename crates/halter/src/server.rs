use std::future::Future;

use serde::{de::DeserializeOwned, Serialize};
use tokio::io::{AsyncBufReadExt, AsyncRead, AsyncWrite, AsyncWriteExt, BufReader};

use crate::error::TransportError;

/// What happened during a [`serve_lines`] session.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct ServeSummary {
	/// Requests decoded and answered.
	pub handled: usize,
	/// Lines dropped because they did not decode.
	pub skipped: usize,
	/// `true` when the session ended through the shutdown future rather than end of input.
	pub interrupted: bool,
}

/// Serve newline-delimited JSON requests read from `reader`, writing one
/// response line per decoded request to `writer`.
///
/// Requests are handled strictly in order: the next line is not read until
/// the previous response has been written and flushed. Lines that fail to
/// decode are logged and skipped. The session ends at end of input, or when
/// `shutdown` resolves while waiting for the next line. A request that is
/// already being handled always runs to completion.
pub async fn serve_lines<R, W, Req, Resp, F, Fut, S>(
	reader: R,
	mut writer: W,
	mut handler: F,
	shutdown: S,
) -> Result<ServeSummary, TransportError>
where
	R: AsyncRead + Unpin,
	W: AsyncWrite + Unpin,
	Req: DeserializeOwned,
	Resp: Serialize,
	F: FnMut(Req) -> Fut,
	Fut: Future<Output = Resp>,
	S: Future<Output = ()>,
{
	let mut reader = BufReader::new(reader);
	let mut line = Vec::new();
	let mut summary = ServeSummary::default();
	tokio::pin!(shutdown);

	loop {
		line.clear();
		let read = tokio::select! {
			biased;
			_ = &mut shutdown => {
				tracing::info!("shutdown requested, closing transport");
				summary.interrupted = true;
				break;
			}
			read = reader.read_until(b'\n', &mut line) => read?,
		};

		if read == 0 {
			tracing::debug!("end of input");
			break;
		}
		if line.iter().all(u8::is_ascii_whitespace) {
			continue;
		}

		// bytes, not str: a line that is not UTF-8 is just another bad request
		let request: Req = match serde_json::from_slice(&line) {
			Ok(r) => r,
			Err(e) => {
				tracing::warn!("invalid request: {}", e);
				summary.skipped += 1;
				continue;
			}
		};

		let response = handler(request).await;

		let mut data = serde_json::to_vec(&response)?;
		data.push(b'\n');
		writer.write_all(&data).await?;
		writer.flush().await?;
		summary.handled += 1;
	}

	Ok(summary)
}
