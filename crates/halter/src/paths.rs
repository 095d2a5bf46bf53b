use std::ffi::OsString;
use std::path::PathBuf;

/// Per-user locations for an application, following the XDG base directory
/// layout: `$XDG_CONFIG_HOME/<app>` and `$XDG_STATE_HOME/<app>`.
#[derive(Debug, Clone)]
pub struct AppPaths {
	pub app_name: String,
}

impl AppPaths {
	pub fn new(app_name: impl Into<String>) -> Self {
		Self {
			app_name: app_name.into(),
		}
	}

	pub fn state_dir(&self) -> PathBuf {
		base_dir(std::env::var_os("XDG_STATE_HOME"), home_dir(), &[".local", "state"]).join(&self.app_name)
	}

	pub fn config_dir(&self) -> PathBuf {
		base_dir(std::env::var_os("XDG_CONFIG_HOME"), home_dir(), &[".config"]).join(&self.app_name)
	}

	pub fn config_file(&self) -> PathBuf {
		self.config_dir().join("config.toml")
	}

	/// Snapshot file used by tools that persist state between invocations.
	pub fn state_file(&self) -> PathBuf {
		self.state_dir().join("processes.json")
	}
}

// relative XDG values are invalid and ignored
fn base_dir(xdg: Option<OsString>, home: Option<PathBuf>, under_home: &[&str]) -> PathBuf {
	if let Some(dir) = xdg.map(PathBuf::from).filter(|d| d.is_absolute()) {
		return dir;
	}
	match home {
		Some(home) => under_home.iter().fold(home, |path, part| path.join(part)),
		None => std::env::temp_dir(),
	}
}

fn home_dir() -> Option<PathBuf> {
	std::env::var_os("HOME").filter(|h| !h.is_empty()).map(PathBuf::from)
}
