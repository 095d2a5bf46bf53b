use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Liveness of a managed process, probed at query time. A process that
/// exited on its own and one that was stopped both report `Stopped`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ProcessStatus {
	Running,
	Stopped,
}

impl ProcessStatus {
	pub fn is_running(&self) -> bool {
		matches!(self, ProcessStatus::Running)
	}
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Transition {
	Started,
	Stopped,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StartReport {
	pub name: String,
	pub pid: u32,
	pub status: Transition,
	pub command: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StopReport {
	pub name: String,
	pub status: Transition,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProcessInfo {
	pub pid: u32,
	pub command: String,
	pub status: ProcessStatus,
	/// Seconds since the Unix epoch.
	pub start_time: f64,
	pub cwd: PathBuf,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LogsReport {
	pub name: String,
	pub stdout: Vec<String>,
	pub stderr: Vec<String>,
	pub status: ProcessStatus,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Health {
	Healthy,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HealthReport {
	pub status: Health,
	pub port: u16,
	/// Seconds from the first probe to the successful connect.
	pub elapsed: f64,
}
