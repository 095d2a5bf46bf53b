use std::collections::BTreeMap;
use std::io;
use std::path::{Path, PathBuf};
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use tokio::sync::Mutex;

use crate::error::{Error, Result};
use crate::handle::{ProcessHandle, SpawnMode};
use crate::output::{OutputCapture, Stream};
use crate::probe::{self, ProbeConfig};
use crate::store::{FileStore, MemoryStore, ProcessRecord, Store};
use crate::types::*;

#[derive(Debug, Clone)]
pub struct RegistryConfig {
	/// How long `stop` waits after the graceful signal before killing.
	pub grace_period: Duration,
	/// Per-stream line history bound; `0` keeps everything.
	pub max_log_lines: usize,
	pub probe: ProbeConfig,
}

impl Default for RegistryConfig {
	fn default() -> Self {
		Self {
			grace_period: Duration::from_secs(5),
			max_log_lines: 1000,
			probe: ProbeConfig::default(),
		}
	}
}

pub struct ManagedProcess {
	/// Exactly as the caller wrote it.
	command_line: String,
	command: Vec<String>,
	working_dir: PathBuf,
	started_at: SystemTime,
	handle: ProcessHandle,
	output: OutputCapture,
}

impl ManagedProcess {
	pub(crate) fn adopt(name: &str, record: &ProcessRecord) -> Self {
		tracing::debug!(name, pid = record.pid, "adopting recorded process");
		Self {
			command_line: record.command.clone(),
			command: split_command(&record.command),
			working_dir: record.cwd.clone(),
			started_at: UNIX_EPOCH + Duration::try_from_secs_f64(record.start_time).unwrap_or_default(),
			handle: ProcessHandle::adopt(record.pid),
			output: OutputCapture::new(0),
		}
	}

	pub(crate) fn record(&self) -> ProcessRecord {
		ProcessRecord {
			pid: self.pid(),
			command: self.command_line.clone(),
			cwd: self.working_dir.clone(),
			start_time: self.start_time(),
		}
	}

	pub fn pid(&self) -> u32 {
		self.handle.pid()
	}

	pub fn command(&self) -> &[String] {
		&self.command
	}

	pub fn command_line(&self) -> &str {
		&self.command_line
	}

	pub fn working_dir(&self) -> &Path {
		&self.working_dir
	}

	pub fn started_at(&self) -> SystemTime {
		self.started_at
	}

	pub fn status(&mut self) -> ProcessStatus {
		if self.handle.is_alive() {
			ProcessStatus::Running
		} else {
			ProcessStatus::Stopped
		}
	}

	pub fn info(&mut self) -> ProcessInfo {
		ProcessInfo {
			pid: self.pid(),
			command: self.command_line.clone(),
			status: self.status(),
			start_time: self.start_time(),
			cwd: self.working_dir.clone(),
		}
	}

	fn start_time(&self) -> f64 {
		self.started_at
			.duration_since(UNIX_EPOCH)
			.map(|d| d.as_secs_f64())
			.unwrap_or(0.0)
	}
}

/// Named child processes, owned exclusively.
///
/// Every operation runs under one lock, so a start/query/stop sequence on the
/// same name observes a linear history. Call [`Registry::shutdown`] before
/// dropping it; in-memory children are also killed when dropped.
pub struct Registry<S: Store = MemoryStore> {
	store: Mutex<S>,
	config: RegistryConfig,
}

impl Registry<MemoryStore> {
	pub fn in_memory(config: RegistryConfig) -> Self {
		Self::new(MemoryStore::new(), config)
	}
}

impl Registry<FileStore> {
	pub fn file_backed(path: impl Into<PathBuf>, config: RegistryConfig) -> Self {
		Self::new(FileStore::new(path), config)
	}
}

impl<S: Store> Registry<S> {
	pub fn new(store: S, config: RegistryConfig) -> Self {
		Self {
			store: Mutex::new(store),
			config,
		}
	}

	pub fn config(&self) -> &RegistryConfig {
		&self.config
	}

	/// Spawn `command` (split on whitespace, no shell) under `name`.
	pub async fn start(&self, name: &str, command: &str, cwd: Option<&Path>) -> Result<StartReport> {
		let mut store = self.store.lock().await;
		store.load()?;
		if store.processes().contains_key(name) {
			return Err(Error::AlreadyRunning(name.to_string()));
		}

		let argv = split_command(command);
		if argv.is_empty() {
			return Err(Error::InvalidCommand);
		}
		let working_dir = resolve_dir(cwd)?;
		let mode = store.spawn_mode();

		let spawned = ProcessHandle::spawn(&argv, &working_dir, mode).map_err(|source| Error::Spawn {
			command: command.to_string(),
			source,
		})?;
		let output = OutputCapture::new(self.config.max_log_lines);
		if let Some(stdout) = spawned.stdout {
			output.attach(Stream::Stdout, stdout);
		}
		if let Some(stderr) = spawned.stderr {
			output.attach(Stream::Stderr, stderr);
		}

		let pid = spawned.handle.pid();
		let process = ManagedProcess {
			command_line: command.to_string(),
			command: argv,
			working_dir,
			started_at: SystemTime::now(),
			handle: spawned.handle,
			output,
		};
		store.processes().insert(name.to_string(), process);

		if let Err(e) = store.persist() {
			if let Some(mut process) = store.processes().remove(name) {
				if let Err(kill_err) = self.terminate(&mut process, true).await {
					tracing::warn!(name, pid, error = %kill_err, "failed to kill unrecorded process");
				}
			}
			return Err(e);
		}

		tracing::info!(name, pid, command, ?mode, "started process");
		Ok(StartReport {
			name: name.to_string(),
			pid,
			status: Transition::Started,
			command: command.to_string(),
		})
	}

	/// Stop `name` and free it. Without `force` the process gets the graceful
	/// signal and `grace_period` to exit before it is killed.
	pub async fn stop(&self, name: &str, force: bool) -> Result<StopReport> {
		let mut store = self.store.lock().await;
		store.load()?;
		let mut process = store
			.processes()
			.remove(name)
			.ok_or_else(|| Error::NotFound(name.to_string()))?;

		if let Err(e) = self.terminate(&mut process, force).await {
			tracing::warn!(name, pid = process.pid(), error = %e, "failed to stop process");
			store.processes().insert(name.to_string(), process);
			return Err(e.into());
		}
		store.persist()?;

		tracing::info!(name, force, "stopped process");
		Ok(StopReport {
			name: name.to_string(),
			status: Transition::Stopped,
		})
	}

	/// Snapshot of every entry, with status probed now.
	pub async fn list(&self) -> Result<BTreeMap<String, ProcessInfo>> {
		let mut store = self.store.lock().await;
		store.load()?;
		Ok(store
			.processes()
			.iter_mut()
			.map(|(name, process)| (name.clone(), process.info()))
			.collect())
	}

	/// Drain whatever output is available right now and return the last
	/// `max_lines` lines of each stream.
	pub async fn get_logs(&self, name: &str, max_lines: usize) -> Result<LogsReport> {
		let mut store = self.store.lock().await;
		store.load()?;
		let process = store
			.processes()
			.get_mut(name)
			.ok_or_else(|| Error::NotFound(name.to_string()))?;

		let drained = process.output.drain().await;
		tracing::debug!(name, drained, "drained output");

		Ok(LogsReport {
			name: name.to_string(),
			stdout: process.output.tail(Stream::Stdout, max_lines).await,
			stderr: process.output.tail(Stream::Stderr, max_lines).await,
			status: process.status(),
		})
	}

	/// Wait for `host:port` to accept TCP connections. Independent of any
	/// registered process.
	pub async fn wait_healthy(&self, port: u16, timeout: Duration, host: &str) -> Result<HealthReport> {
		let elapsed = probe::probe(host, port, timeout, &self.config.probe).await?;
		tracing::info!(host, port, ?elapsed, "port healthy");
		Ok(HealthReport {
			status: Health::Healthy,
			port,
			elapsed: elapsed.as_secs_f64(),
		})
	}

	/// Force-stop every entry. Individual failures are logged and skipped.
	/// Returns how many processes were stopped cleanly.
	pub async fn cleanup_all(&self) -> usize {
		let mut store = self.store.lock().await;
		if let Err(e) = store.load() {
			tracing::warn!(error = %e, "failed to reload registry before cleanup");
		}

		let names: Vec<String> = store.processes().keys().cloned().collect();
		let mut stopped = 0;
		for name in names {
			let Some(mut process) = store.processes().remove(&name) else {
				continue;
			};
			match self.terminate(&mut process, true).await {
				Ok(()) => {
					tracing::info!(name = %name, "cleaned up process");
					stopped += 1;
				}
				Err(e) => {
					tracing::warn!(name = %name, pid = process.pid(), error = %e, "cleanup failed");
				}
			}
		}

		if let Err(e) = store.persist() {
			tracing::warn!(error = %e, "failed to persist registry after cleanup");
		}
		stopped
	}

	/// Tear the registry down: no managed process outlives this call.
	pub async fn shutdown(&self) {
		let stopped = self.cleanup_all().await;
		tracing::info!(stopped, "registry shut down");
	}

	pub async fn len(&self) -> usize {
		let mut store = self.store.lock().await;
		if let Err(e) = store.load() {
			tracing::warn!(error = %e, "failed to reload registry");
		}
		store.processes().len()
	}

	pub async fn is_empty(&self) -> bool {
		self.len().await == 0
	}

	async fn terminate(&self, process: &mut ManagedProcess, force: bool) -> io::Result<()> {
		let pid = process.pid();
		let handle = &mut process.handle;
		if !handle.is_alive() {
			tracing::debug!(pid, "process already exited");
			return Ok(());
		}

		if !force {
			handle.terminate().await?;
			if handle.wait_timeout(Some(self.config.grace_period)).await {
				return Ok(());
			}
			tracing::warn!(pid, grace = ?self.config.grace_period, "process ignored graceful stop, killing");
		}

		handle.kill().await?;
		handle.wait_timeout(None).await;
		Ok(())
	}
}

fn split_command(command: &str) -> Vec<String> {
	command.split_whitespace().map(str::to_string).collect()
}

fn resolve_dir(cwd: Option<&Path>) -> Result<PathBuf> {
	match cwd {
		Some(dir) if dir.is_absolute() => Ok(dir.to_path_buf()),
		Some(dir) => Ok(std::env::current_dir()?.join(dir)),
		None => Ok(std::env::current_dir()?),
	}
}
