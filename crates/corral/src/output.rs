//! Captured stdout/stderr of a managed process.
//!
//! Reader tasks copy bytes from the child's pipes into a pending buffer as
//! soon as they arrive. [`OutputCapture::drain`] moves every complete line
//! from the pending buffer into the append-only line history and never waits
//! for more data. A trailing partial line stays pending until its newline
//! arrives or the pipe closes.

use std::collections::VecDeque;
use std::sync::Arc;

use tokio::io::{AsyncRead, AsyncReadExt};
use tokio::sync::Mutex;
use tokio::task::JoinHandle;

const PENDING_LIMIT: usize = 64 * 1024;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stream {
	Stdout,
	Stderr,
}

#[derive(Clone)]
pub struct OutputCapture {
	stdout: Arc<Mutex<StreamBuffer>>,
	stderr: Arc<Mutex<StreamBuffer>>,
	max_lines: usize,
}

#[derive(Default)]
struct StreamBuffer {
	pending: VecDeque<u8>,
	lines: VecDeque<String>,
	closed: bool,
}

impl OutputCapture {
	/// `max_lines` bounds each stream's line history; `0` keeps everything.
	pub fn new(max_lines: usize) -> Self {
		Self {
			stdout: Arc::default(),
			stderr: Arc::default(),
			max_lines,
		}
	}

	/// Copy everything `reader` produces into `stream` until it closes.
	pub fn attach<R>(&self, stream: Stream, reader: R) -> JoinHandle<()>
	where
		R: AsyncRead + Unpin + Send + 'static,
	{
		let output = self.clone();
		tokio::spawn(async move {
			pipe_output(reader, output, stream).await;
		})
	}

	pub async fn write(&self, stream: Stream, data: &[u8]) {
		let mut buf = self.buffer(stream).lock().await;
		for &byte in data {
			if buf.pending.len() >= PENDING_LIMIT {
				buf.pending.pop_front();
			}
			buf.pending.push_back(byte);
		}
	}

	pub async fn close(&self, stream: Stream) {
		self.buffer(stream).lock().await.closed = true;
	}

	/// Move complete lines from both pending buffers into the line history.
	/// Returns how many lines were added.
	pub async fn drain(&self) -> usize {
		let mut drained = 0;
		for stream in [Stream::Stdout, Stream::Stderr] {
			let mut buf = self.buffer(stream).lock().await;
			drained += buf.drain_lines(self.max_lines);
		}
		drained
	}

	/// The last `n` drained lines of `stream`, oldest first.
	pub async fn tail(&self, stream: Stream, n: usize) -> Vec<String> {
		let buf = self.buffer(stream).lock().await;
		let skip = buf.lines.len().saturating_sub(n);
		buf.lines.iter().skip(skip).cloned().collect()
	}

	fn buffer(&self, stream: Stream) -> &Arc<Mutex<StreamBuffer>> {
		match stream {
			Stream::Stdout => &self.stdout,
			Stream::Stderr => &self.stderr,
		}
	}
}

impl StreamBuffer {
	fn drain_lines(&mut self, max_lines: usize) -> usize {
		let complete = if self.closed {
			self.pending.len()
		} else {
			match self.pending.iter().rposition(|&b| b == b'\n') {
				Some(idx) => idx + 1,
				None => 0,
			}
		};
		if complete == 0 {
			return 0;
		}

		let mut bytes: Vec<u8> = self.pending.drain(..complete).collect();
		if bytes.last() == Some(&b'\n') {
			bytes.pop();
		}
		let mut added = 0;
		for raw in bytes.split(|&b| b == b'\n') {
			self.push_line(String::from_utf8_lossy(raw).trim_end().to_string(), max_lines);
			added += 1;
		}
		added
	}

	fn push_line(&mut self, line: String, max_lines: usize) {
		if max_lines > 0 && self.lines.len() >= max_lines {
			self.lines.pop_front();
		}
		self.lines.push_back(line);
	}
}

async fn pipe_output<R: AsyncRead + Unpin>(mut reader: R, output: OutputCapture, stream: Stream) {
	let mut buf = [0u8; 4096];
	loop {
		match reader.read(&mut buf).await {
			Ok(0) => break,
			Ok(n) => output.write(stream, &buf[..n]).await,
			Err(e) => {
				tracing::debug!(?stream, error = %e, "output pipe read failed");
				break;
			}
		}
	}
	output.close(stream).await;
}

#[cfg(test)]
mod tests {
	use super::*;

	#[tokio::test]
	async fn drain_splits_complete_lines() {
		let out = OutputCapture::new(0);
		out.write(Stream::Stdout, b"one\ntwo\r\nthr").await;

		assert_eq!(out.drain().await, 2);
		assert_eq!(out.tail(Stream::Stdout, 10).await, vec!["one", "two"]);

		out.write(Stream::Stdout, b"ee\n").await;
		assert_eq!(out.drain().await, 1);
		assert_eq!(out.tail(Stream::Stdout, 10).await, vec!["one", "two", "three"]);
	}

	#[tokio::test]
	async fn drain_with_nothing_pending_returns_zero() {
		let out = OutputCapture::new(0);
		assert_eq!(out.drain().await, 0);
		assert!(out.tail(Stream::Stderr, 5).await.is_empty());
	}

	#[tokio::test]
	async fn blank_lines_are_kept() {
		let out = OutputCapture::new(0);
		out.write(Stream::Stdout, b"a\n\nb\n").await;
		out.drain().await;
		assert_eq!(out.tail(Stream::Stdout, 10).await, vec!["a", "", "b"]);
	}

	#[tokio::test]
	async fn partial_line_flushed_after_close() {
		let out = OutputCapture::new(0);
		out.write(Stream::Stderr, b"no newline").await;
		assert_eq!(out.drain().await, 0);

		out.close(Stream::Stderr).await;
		assert_eq!(out.drain().await, 1);
		assert_eq!(out.tail(Stream::Stderr, 1).await, vec!["no newline"]);
	}

	#[tokio::test]
	async fn streams_are_separate() {
		let out = OutputCapture::new(0);
		out.write(Stream::Stdout, b"out\n").await;
		out.write(Stream::Stderr, b"err\n").await;
		assert_eq!(out.drain().await, 2);
		assert_eq!(out.tail(Stream::Stdout, 5).await, vec!["out"]);
		assert_eq!(out.tail(Stream::Stderr, 5).await, vec!["err"]);
	}

	#[tokio::test]
	async fn line_history_is_bounded() {
		let out = OutputCapture::new(3);
		for i in 0..10 {
			out.write(Stream::Stdout, format!("line {}\n", i).as_bytes()).await;
		}
		out.drain().await;
		assert_eq!(
			out.tail(Stream::Stdout, 100).await,
			vec!["line 7", "line 8", "line 9"]
		);
	}

	#[tokio::test]
	async fn tail_returns_most_recent() {
		let out = OutputCapture::new(0);
		out.write(Stream::Stdout, b"1\n2\n3\n4\n").await;
		out.drain().await;
		assert_eq!(out.tail(Stream::Stdout, 2).await, vec!["3", "4"]);
		assert!(out.tail(Stream::Stdout, 0).await.is_empty());
	}

	#[tokio::test]
	async fn attach_copies_reader_until_eof() {
		let out = OutputCapture::new(0);
		let reader: &'static [u8] = b"alpha\nbeta\n";
		out.attach(Stream::Stdout, reader).await.unwrap();

		out.drain().await;
		assert_eq!(out.tail(Stream::Stdout, 5).await, vec!["alpha", "beta"]);
	}
}
