//! OS process handle: spawn, liveness, graceful and forceful termination, and
//! bounded waits.
//!
//! Platform differences live in the private `platform` module. On unix every
//! child leads its own process group and termination signals target the
//! group; on Windows termination goes through `taskkill /T`.

use std::io;
use std::path::Path;
use std::process::Stdio;
use std::time::{Duration, Instant};

use tokio::process::{Child, ChildStderr, ChildStdout, Command};

const POLL_INTERVAL: Duration = Duration::from_millis(50);

/// How the standard streams of a spawned process are wired.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SpawnMode {
	/// stdout and stderr are piped back to the supervisor. The process is
	/// killed if its handle is dropped.
	Captured,
	/// All stdio goes to the null device and the process outlives its handle.
	Detached,
}

pub struct Spawned {
	pub handle: ProcessHandle,
	pub stdout: Option<ChildStdout>,
	pub stderr: Option<ChildStderr>,
}

pub struct ProcessHandle {
	pid: u32,
	child: Option<Child>,
}

impl ProcessHandle {
	/// Spawn `argv[0]` with `argv[1..]` in `dir`. No shell is involved.
	pub fn spawn(argv: &[String], dir: &Path, mode: SpawnMode) -> io::Result<Spawned> {
		let (program, args) = argv
			.split_first()
			.ok_or_else(|| io::Error::new(io::ErrorKind::InvalidInput, "empty argument vector"))?;

		let mut cmd = Command::new(program);
		cmd.args(args).current_dir(dir).stdin(Stdio::null());
		match mode {
			SpawnMode::Captured => {
				cmd.stdout(Stdio::piped())
					.stderr(Stdio::piped())
					.kill_on_drop(true);
			}
			SpawnMode::Detached => {
				cmd.stdout(Stdio::null()).stderr(Stdio::null());
			}
		}
		platform::isolate(&mut cmd);

		let mut child = cmd.spawn()?;
		let pid = child
			.id()
			.ok_or_else(|| io::Error::other("process exited before its pid was read"))?;
		let stdout = child.stdout.take();
		let stderr = child.stderr.take();

		Ok(Spawned {
			handle: ProcessHandle {
				pid,
				child: Some(child),
			},
			stdout,
			stderr,
		})
	}

	/// Handle for a process started elsewhere and known only by its PID.
	pub fn adopt(pid: u32) -> Self {
		Self { pid, child: None }
	}

	pub fn pid(&self) -> u32 {
		self.pid
	}

	pub fn is_alive(&mut self) -> bool {
		match self.child.as_mut() {
			Some(child) => matches!(child.try_wait(), Ok(None)),
			None => platform::is_alive(self.pid),
		}
	}

	/// Ask the process to exit (SIGTERM to its group on unix).
	pub async fn terminate(&mut self) -> io::Result<()> {
		if !self.is_alive() {
			return Ok(());
		}
		platform::terminate(self.pid).await
	}

	/// Force the process to exit (SIGKILL to its group on unix).
	pub async fn kill(&mut self) -> io::Result<()> {
		if !self.is_alive() {
			return Ok(());
		}
		platform::kill(self.pid).await
	}

	/// Wait until the process exits or `limit` elapses. `None` waits without
	/// bound. Returns `true` once the process is gone.
	pub async fn wait_timeout(&mut self, limit: Option<Duration>) -> bool {
		let pid = self.pid;
		if let Some(child) = self.child.as_mut() {
			let waited = match limit {
				Some(limit) => match tokio::time::timeout(limit, child.wait()).await {
					Ok(result) => result,
					Err(_) => return false,
				},
				None => child.wait().await,
			};
			return match waited {
				Ok(status) => {
					tracing::debug!(pid, %status, "process exited");
					true
				}
				Err(e) => {
					tracing::warn!(pid, error = %e, "wait failed");
					!self.is_alive()
				}
			};
		}

		// a limit past the end of time waits without bound
		let deadline = limit.and_then(|l| Instant::now().checked_add(l));
		loop {
			if !platform::is_alive(pid) {
				return true;
			}
			if deadline.is_some_and(|d| Instant::now() >= d) {
				return false;
			}
			tokio::time::sleep(POLL_INTERVAL).await;
		}
	}
}

#[cfg(unix)]
mod platform {
	use std::io;

	use nix::errno::Errno;
	use nix::sys::signal::{kill as send, killpg, Signal};
	use nix::sys::wait::{waitpid, WaitPidFlag, WaitStatus};
	use nix::unistd::Pid;
	use tokio::process::Command;

	pub fn isolate(cmd: &mut Command) {
		cmd.process_group(0);
	}

	pub fn is_alive(pid: u32) -> bool {
		let target = Pid::from_raw(pid as i32);
		// reap it if it is our own exited child, otherwise it would linger as a zombie
		match waitpid(target, Some(WaitPidFlag::WNOHANG)) {
			Ok(WaitStatus::StillAlive) => return true,
			Ok(_) => return false,
			Err(_) => {}
		}
		match send(target, None) {
			Ok(()) | Err(Errno::EPERM) => !is_zombie(pid),
			Err(_) => false,
		}
	}

	/// An exited process whose parent has not reaped it still answers
	/// `kill(pid, 0)`.
	#[cfg(target_os = "linux")]
	fn is_zombie(pid: u32) -> bool {
		let Ok(stat) = std::fs::read_to_string(format!("/proc/{}/stat", pid)) else {
			return false;
		};
		// the command name may contain spaces and parens; the state follows the last ')'
		stat.rsplit_once(')')
			.and_then(|(_, rest)| rest.split_whitespace().next())
			.is_some_and(|state| state == "Z")
	}

	#[cfg(not(target_os = "linux"))]
	fn is_zombie(_pid: u32) -> bool {
		false
	}

	pub async fn terminate(pid: u32) -> io::Result<()> {
		signal(pid, Signal::SIGTERM)
	}

	pub async fn kill(pid: u32) -> io::Result<()> {
		signal(pid, Signal::SIGKILL)
	}

	fn signal(pid: u32, sig: Signal) -> io::Result<()> {
		let target = Pid::from_raw(pid as i32);
		match killpg(target, sig) {
			Ok(()) => Ok(()),
			// not a group leader: signal the process alone
			Err(Errno::ESRCH) => match send(target, sig) {
				Ok(()) | Err(Errno::ESRCH) => Ok(()),
				Err(e) => Err(io::Error::from(e)),
			},
			Err(e) => Err(io::Error::from(e)),
		}
	}
}

#[cfg(windows)]
mod platform {
	use std::io;

	use tokio::process::Command;

	const CREATE_NEW_PROCESS_GROUP: u32 = 0x0000_0200;

	pub fn isolate(cmd: &mut Command) {
		cmd.creation_flags(CREATE_NEW_PROCESS_GROUP);
	}

	pub fn is_alive(pid: u32) -> bool {
		let filter = format!("PID eq {}", pid);
		let pid = pid.to_string();
		std::process::Command::new("tasklist")
			.args(["/FI", &filter, "/NH"])
			.output()
			.map(|out| {
				String::from_utf8_lossy(&out.stdout)
					.split_whitespace()
					.any(|word| word == pid)
			})
			.unwrap_or(false)
	}

	pub async fn terminate(pid: u32) -> io::Result<()> {
		taskkill(pid, false).await
	}

	pub async fn kill(pid: u32) -> io::Result<()> {
		taskkill(pid, true).await
	}

	async fn taskkill(pid: u32, force: bool) -> io::Result<()> {
		let pid = pid.to_string();
		let mut args = vec!["/T", "/PID", pid.as_str()];
		if force {
			args.insert(0, "/F");
		}
		let output = Command::new("taskkill").args(&args).output().await?;
		if !output.status.success() {
			tracing::debug!(
				pid = %pid,
				stderr = %String::from_utf8_lossy(&output.stderr).trim(),
				"taskkill reported failure"
			);
		}
		Ok(())
	}
}
