//! TCP readiness probe.
//!
//! A port counts as ready once a plain TCP connect succeeds. Refused or
//! unreachable connects only mean "not yet"; the sole failure is running out
//! of time.

use std::time::{Duration, Instant};

use tokio::net::TcpStream;

use crate::error::{Error, Result};

/// Lower bound on the attempt timeout and on the pause between attempts.
const MIN_STEP: Duration = Duration::from_millis(10);

#[derive(Debug, Clone)]
pub struct ProbeConfig {
	/// Upper bound on a single connect attempt.
	pub attempt_timeout: Duration,
	/// Pause between failed attempts.
	pub interval: Duration,
}

impl ProbeConfig {
	fn attempt_budget(&self, remaining: Duration) -> Duration {
		let attempt = self.attempt_timeout.max(MIN_STEP);
		if remaining.is_zero() {
			attempt
		} else {
			attempt.min(remaining.max(MIN_STEP))
		}
	}

	fn pause(&self, remaining: Duration) -> Duration {
		self.interval.max(MIN_STEP).min(remaining)
	}
}

impl Default for ProbeConfig {
	fn default() -> Self {
		Self {
			attempt_timeout: Duration::from_secs(1),
			interval: Duration::from_secs(1),
		}
	}
}

/// Poll `host:port` until a connect succeeds, returning the time elapsed
/// since the first attempt, or fail with [`Error::Timeout`] once `timeout`
/// has passed. At least one attempt is always made.
pub async fn probe(host: &str, port: u16, timeout: Duration, config: &ProbeConfig) -> Result<Duration> {
	let started = Instant::now();
	let mut attempts: u32 = 0;

	loop {
		let remaining = timeout.saturating_sub(started.elapsed());
		if attempts > 0 && remaining.is_zero() {
			tracing::debug!(host, port, attempts, "readiness probe gave up");
			return Err(Error::Timeout {
				host: host.to_string(),
				port,
				timeout,
			});
		}
		attempts += 1;

		match tokio::time::timeout(config.attempt_budget(remaining), TcpStream::connect((host, port))).await {
			Ok(Ok(_)) => {
				let elapsed = started.elapsed();
				tracing::debug!(host, port, attempts, ?elapsed, "port ready");
				return Ok(elapsed);
			}
			Ok(Err(e)) => tracing::trace!(host, port, error = %e, "not ready"),
			Err(_) => tracing::trace!(host, port, "connect attempt timed out"),
		}

		let remaining = timeout.saturating_sub(started.elapsed());
		tokio::time::sleep(config.pause(remaining)).await;
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	fn fast() -> ProbeConfig {
		ProbeConfig {
			attempt_timeout: Duration::from_millis(200),
			interval: Duration::from_millis(100),
		}
	}

	async fn free_port() -> u16 {
		let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
		listener.local_addr().unwrap().port()
	}

	#[tokio::test]
	async fn ready_port_succeeds_immediately() {
		let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
		let port = listener.local_addr().unwrap().port();

		let elapsed = probe("127.0.0.1", port, Duration::from_secs(5), &fast()).await.unwrap();
		assert!(elapsed < Duration::from_secs(1), "took {:?}", elapsed);
	}

	#[tokio::test]
	async fn closed_port_times_out_within_bounds() {
		let port = free_port().await;
		let timeout = Duration::from_millis(800);

		let started = Instant::now();
		let err = probe("127.0.0.1", port, timeout, &fast()).await.unwrap_err();
		let took = started.elapsed();

		assert!(matches!(err, Error::Timeout { port: p, .. } if p == port));
		assert!(took >= timeout, "gave up early: {:?}", took);
		assert!(took <= timeout + Duration::from_millis(500), "overran: {:?}", took);
	}

	#[tokio::test]
	async fn zero_timeout_still_probes_once() {
		let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
		let port = listener.local_addr().unwrap().port();
		assert!(probe("127.0.0.1", port, Duration::ZERO, &fast()).await.is_ok());

		drop(listener);
		assert!(probe("127.0.0.1", port, Duration::ZERO, &fast()).await.is_err());
	}

	#[tokio::test]
	async fn port_that_opens_later_is_detected() {
		let port = free_port().await;
		let opener = tokio::spawn(async move {
			tokio::time::sleep(Duration::from_millis(300)).await;
			let listener = tokio::net::TcpListener::bind(("127.0.0.1", port)).await.unwrap();
			tokio::time::sleep(Duration::from_secs(3)).await;
			drop(listener);
		});

		let elapsed = probe("127.0.0.1", port, Duration::from_secs(3), &fast()).await.unwrap();
		assert!(elapsed >= Duration::from_millis(300));
		opener.abort();
	}

	#[test]
	fn zero_settings_are_floored() {
		let zero = ProbeConfig {
			attempt_timeout: Duration::ZERO,
			interval: Duration::ZERO,
		};
		assert_eq!(zero.pause(Duration::from_secs(1)), MIN_STEP);
		assert_eq!(zero.attempt_budget(Duration::from_secs(1)), MIN_STEP);
		assert_eq!(zero.attempt_budget(Duration::ZERO), MIN_STEP);
		// never sleeps past the deadline
		assert_eq!(zero.pause(Duration::from_millis(3)), Duration::from_millis(3));

		let defaults = ProbeConfig::default();
		assert_eq!(defaults.pause(Duration::from_millis(250)), Duration::from_millis(250));
		assert_eq!(defaults.attempt_budget(Duration::from_secs(5)), Duration::from_secs(1));
	}

	#[tokio::test]
	async fn zero_interval_config_still_works() {
		let zero = ProbeConfig {
			attempt_timeout: Duration::ZERO,
			interval: Duration::ZERO,
		};
		let port = free_port().await;

		let started = Instant::now();
		assert!(probe("127.0.0.1", port, Duration::from_millis(300), &zero).await.is_err());
		assert!(started.elapsed() >= Duration::from_millis(300));

		let listener = tokio::net::TcpListener::bind(("127.0.0.1", port)).await.unwrap();
		assert!(probe("127.0.0.1", port, Duration::from_secs(2), &zero).await.is_ok());
		drop(listener);
	}
}
