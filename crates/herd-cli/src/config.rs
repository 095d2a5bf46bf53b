use std::path::{Path, PathBuf};
use std::time::Duration;

use corral::{ProbeConfig, RegistryConfig};
use serde::Deserialize;

// ── Global config (~/.config/herd/config.toml) ──────────────────────────────

#[derive(Debug, Clone, Deserialize, Default)]
pub struct GlobalConfig {
	#[serde(default)]
	pub supervisor: SupervisorConfig,
	#[serde(default)]
	pub probe: ProbeSettings,
	#[serde(default)]
	pub server: ServerConfig,
	#[serde(default)]
	pub state: StateConfig,
}

#[derive(Debug, Clone, Deserialize)]
pub struct SupervisorConfig {
	#[serde(default = "default_grace_period")]
	pub grace_period_secs: f64,
	#[serde(default = "default_max_log_lines")]
	pub max_log_lines: usize,
}

impl Default for SupervisorConfig {
	fn default() -> Self {
		Self { grace_period_secs: default_grace_period(), max_log_lines: default_max_log_lines() }
	}
}

fn default_grace_period() -> f64 { 5.0 }
fn default_max_log_lines() -> usize { 1000 }

#[derive(Debug, Clone, Deserialize)]
pub struct ProbeSettings {
	#[serde(default = "default_one")]
	pub attempt_timeout_secs: f64,
	#[serde(default = "default_one")]
	pub interval_secs: f64,
	#[serde(default = "default_timeout")]
	pub default_timeout_secs: f64,
	#[serde(default = "default_host")]
	pub default_host: String,
}

impl Default for ProbeSettings {
	fn default() -> Self {
		Self {
			attempt_timeout_secs: default_one(),
			interval_secs: default_one(),
			default_timeout_secs: default_timeout(),
			default_host: default_host(),
		}
	}
}

fn default_one() -> f64 { 1.0 }
fn default_timeout() -> f64 { 30.0 }
fn default_host() -> String { "localhost".into() }

#[derive(Debug, Clone, Deserialize)]
pub struct ServerConfig {
	#[serde(default = "default_server_name")]
	pub name: String,
	pub log_file: Option<PathBuf>,
}

impl Default for ServerConfig {
	fn default() -> Self {
		Self { name: default_server_name(), log_file: None }
	}
}

fn default_server_name() -> String { "process-manager".into() }

#[derive(Debug, Clone, Deserialize, Default)]
pub struct StateConfig {
	pub file: Option<PathBuf>,
}

impl GlobalConfig {
	pub fn registry(&self) -> RegistryConfig {
		RegistryConfig {
			grace_period: secs(self.supervisor.grace_period_secs),
			max_log_lines: self.supervisor.max_log_lines,
			probe: ProbeConfig {
				attempt_timeout: secs(self.probe.attempt_timeout_secs),
				interval: secs(self.probe.interval_secs),
			},
		}
	}

	pub fn default_health_timeout(&self) -> Duration {
		secs(self.probe.default_timeout_secs)
	}
}

/// Negative and NaN values clamp to zero; values too large for a
/// `Duration` saturate to `Duration::MAX`.
pub fn secs(value: f64) -> Duration {
	if value.is_nan() || value <= 0.0 {
		return Duration::ZERO;
	}
	Duration::try_from_secs_f64(value).unwrap_or(Duration::MAX)
}

pub fn load_global_config(path: &Path) -> GlobalConfig {
	if path.exists() {
		match std::fs::read_to_string(path) {
			Ok(content) => match toml::from_str(&content) {
				Ok(config) => return config,
				Err(e) => eprintln!("warning: failed to parse {}: {}", path.display(), e),
			},
			Err(e) => eprintln!("warning: failed to read {}: {}", path.display(), e),
		}
	}
	GlobalConfig::default()
}
