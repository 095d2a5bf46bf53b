//! Registry storage backends.
//!
//! [`MemoryStore`] keeps live handles for the lifetime of the supervisor.
//! [`FileStore`] snapshots `{name: {pid, command, cwd, start_time}}` to a JSON
//! file after every mutation and reloads it before every operation, so
//! separate short-lived invocations share one registry.

use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};
use crate::handle::SpawnMode;
use crate::registry::ManagedProcess;

pub trait Store: Send {
	fn spawn_mode(&self) -> SpawnMode;

	/// Refresh the entries from the backing medium.
	fn load(&mut self) -> Result<()>;

	fn processes(&mut self) -> &mut BTreeMap<String, ManagedProcess>;

	/// Write the entries back after a mutation.
	fn persist(&mut self) -> Result<()>;
}

#[derive(Default)]
pub struct MemoryStore {
	processes: BTreeMap<String, ManagedProcess>,
}

impl MemoryStore {
	pub fn new() -> Self {
		Self::default()
	}
}

impl Store for MemoryStore {
	fn spawn_mode(&self) -> SpawnMode {
		SpawnMode::Captured
	}

	fn load(&mut self) -> Result<()> {
		Ok(())
	}

	fn processes(&mut self) -> &mut BTreeMap<String, ManagedProcess> {
		&mut self.processes
	}

	fn persist(&mut self) -> Result<()> {
		Ok(())
	}
}

/// One entry of the state file.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProcessRecord {
	pub pid: u32,
	pub command: String,
	pub cwd: PathBuf,
	pub start_time: f64,
}

pub struct FileStore {
	path: PathBuf,
	processes: BTreeMap<String, ManagedProcess>,
}

impl FileStore {
	pub fn new(path: impl Into<PathBuf>) -> Self {
		Self {
			path: path.into(),
			processes: BTreeMap::new(),
		}
	}

	pub fn path(&self) -> &Path {
		&self.path
	}

	fn read_records(&self) -> Result<BTreeMap<String, ProcessRecord>> {
		let content = match fs::read_to_string(&self.path) {
			Ok(c) => c,
			Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(BTreeMap::new()),
			Err(e) => return Err(self.state_error(e)),
		};
		if content.trim().is_empty() {
			return Ok(BTreeMap::new());
		}
		serde_json::from_str(&content).map_err(|e| self.state_error(e))
	}

	fn state_error(&self, reason: impl ToString) -> Error {
		Error::State {
			path: self.path.clone(),
			reason: reason.to_string(),
		}
	}
}

impl Store for FileStore {
	fn spawn_mode(&self) -> SpawnMode {
		SpawnMode::Detached
	}

	fn load(&mut self) -> Result<()> {
		let records = self.read_records()?;
		let mut previous = std::mem::take(&mut self.processes);
		for (name, record) in records {
			// keep the live handle when this invocation spawned the process itself
			let process = match previous.remove(&name) {
				Some(existing) if existing.pid() == record.pid => existing,
				_ => ManagedProcess::adopt(&name, &record),
			};
			self.processes.insert(name, process);
		}
		Ok(())
	}

	fn processes(&mut self) -> &mut BTreeMap<String, ManagedProcess> {
		&mut self.processes
	}

	fn persist(&mut self) -> Result<()> {
		let records: BTreeMap<&str, ProcessRecord> = self
			.processes
			.iter()
			.map(|(name, process)| (name.as_str(), process.record()))
			.collect();
		let data = serde_json::to_string_pretty(&records).map_err(|e| self.state_error(e))?;

		if let Some(parent) = self.path.parent() {
			if !parent.as_os_str().is_empty() {
				fs::create_dir_all(parent).map_err(|e| self.state_error(e))?;
			}
		}
		let tmp = self.path.with_extension("json.tmp");
		fs::write(&tmp, data).map_err(|e| self.state_error(e))?;
		fs::rename(&tmp, &self.path).map_err(|e| self.state_error(e))?;
		Ok(())
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use serde_json::json;
	use std::sync::atomic::{AtomicU32, Ordering};

	static TEST_COUNTER: AtomicU32 = AtomicU32::new(0);

	fn temp_file(name: &str) -> PathBuf {
		let n = TEST_COUNTER.fetch_add(1, Ordering::SeqCst);
		std::env::temp_dir()
			.join(format!("corral-store-{}-{}-{}", std::process::id(), n, name))
			.join("processes.json")
	}

	#[test]
	fn record_matches_state_file_format() {
		let record = ProcessRecord {
			pid: 1234,
			command: "sleep 100".into(),
			cwd: "/tmp".into(),
			start_time: 1700000000.5,
		};
		assert_eq!(
			serde_json::to_value(&record).unwrap(),
			json!({"pid": 1234, "command": "sleep 100", "cwd": "/tmp", "start_time": 1700000000.5})
		);
	}

	#[test]
	fn missing_file_is_empty_registry() {
		let mut store = FileStore::new(temp_file("missing"));
		store.load().unwrap();
		assert!(store.processes().is_empty());
	}

	#[test]
	fn corrupt_file_is_state_error() {
		let path = temp_file("corrupt");
		fs::create_dir_all(path.parent().unwrap()).unwrap();
		fs::write(&path, "{not json").unwrap();

		let mut store = FileStore::new(&path);
		assert!(matches!(store.load(), Err(Error::State { .. })));
		let _ = fs::remove_dir_all(path.parent().unwrap());
	}

	#[test]
	fn persist_then_load_adopts_entries() {
		let path = temp_file("roundtrip");
		fs::create_dir_all(path.parent().unwrap()).unwrap();
		fs::write(
			&path,
			r#"{"web": {"pid": 999999, "command": "python -m http.server", "cwd": "/srv", "start_time": 10.0}}"#,
		)
		.unwrap();

		let mut store = FileStore::new(&path);
		store.load().unwrap();
		let web = store.processes().get("web").unwrap();
		assert_eq!(web.pid(), 999999);
		assert_eq!(web.command_line(), "python -m http.server");

		store.processes().clear();
		store.persist().unwrap();
		let content = fs::read_to_string(&path).unwrap();
		assert_eq!(serde_json::from_str::<serde_json::Value>(&content).unwrap(), json!({}));
		let _ = fs::remove_dir_all(path.parent().unwrap());
	}
}
