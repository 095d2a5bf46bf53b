mod config;
mod logs;
mod mcp;

use std::path::PathBuf;
use std::process::ExitCode;

use clap::{Parser, Subcommand};
use corral::{FileStore, Registry};
use halter::AppPaths;
use owo_colors::OwoColorize;
use owo_colors::Stream::{Stderr, Stdout};

use config::GlobalConfig;
use mcp::McpServer;

const APP_NAME: &str = "herd";

#[derive(Debug, Parser)]
#[command(name = "herd", version, about = "Supervise long-running dev servers")]
struct Cli {
	/// Config file (default: ~/.config/herd/config.toml)
	#[arg(long, global = true)]
	config: Option<PathBuf>,
	/// State file shared by the one-shot commands
	#[arg(long, global = true)]
	state_file: Option<PathBuf>,
	/// Append logs to this file instead of stderr
	#[arg(long, global = true)]
	log_file: Option<PathBuf>,
	#[command(subcommand)]
	command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
	/// Serve JSON-RPC tool calls on stdin/stdout
	Serve,
	#[command(flatten)]
	Oneshot(Oneshot),
}

/// Commands that act on the shared state file and exit.
#[derive(Debug, Subcommand)]
enum Oneshot {
	/// Start a named process in the background
	Start {
		name: String,
		#[arg(required = true, trailing_var_arg = true, allow_hyphen_values = true)]
		command: Vec<String>,
		/// Working directory
		#[arg(long)]
		cwd: Option<PathBuf>,
	},
	/// Stop a named process
	Stop {
		name: String,
		/// Kill without waiting for a graceful exit
		#[arg(long)]
		force: bool,
	},
	/// List managed processes
	List,
	/// Wait until a TCP port accepts connections
	WaitHealthy {
		port: u16,
		/// Timeout in seconds
		timeout: Option<f64>,
		#[arg(long)]
		host: Option<String>,
	},
	/// Stop every managed process
	Cleanup,
}

#[tokio::main]
async fn main() -> ExitCode {
	let cli = Cli::parse();
	let paths = AppPaths::new(APP_NAME);
	let config_path = cli.config.clone().unwrap_or_else(|| paths.config_file());
	let global_config = config::load_global_config(&config_path);

	match cli.command {
		Command::Serve => {
			let log_file = cli.log_file.or_else(|| global_config.server.log_file.clone());
			logs::init(log_file.as_deref(), "info");
			cmd_serve(&global_config).await
		}
		Command::Oneshot(command) => {
			logs::init(cli.log_file.as_deref(), "warn");
			let state_file = cli
				.state_file
				.or_else(|| global_config.state.file.clone())
				.unwrap_or_else(|| paths.state_file());
			let registry = Registry::file_backed(state_file, global_config.registry());
			run_command(command, &registry, &global_config).await
		}
	}
}

async fn cmd_serve(global_config: &GlobalConfig) -> ExitCode {
	let server = McpServer::new(
		Registry::in_memory(global_config.registry()),
		global_config.server.name.clone(),
		global_config.default_health_timeout(),
		global_config.probe.default_host.clone(),
	);
	tracing::info!(pid = std::process::id(), "serving on stdio");

	let server_ref = &server;
	let result = halter::serve_lines(
		tokio::io::stdin(),
		tokio::io::stdout(),
		move |req| server_ref.handle(req),
		shutdown_signal(),
	)
	.await;

	let stopped = server.registry().cleanup_all().await;
	tracing::info!(stopped, "cleaned up managed processes");

	match result {
		Ok(summary) => {
			tracing::info!(handled = summary.handled, skipped = summary.skipped, interrupted = summary.interrupted, "server stopped");
			ExitCode::SUCCESS
		}
		Err(e) => {
			tracing::error!("transport error: {}", e);
			ExitCode::FAILURE
		}
	}
}

async fn shutdown_signal() {
	let ctrl_c = async {
		if let Err(e) = tokio::signal::ctrl_c().await {
			tracing::warn!("failed to listen for ctrl-c: {}", e);
			std::future::pending::<()>().await;
		}
	};

	#[cfg(unix)]
	let terminate = async {
		match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
			Ok(mut sig) => {
				sig.recv().await;
			}
			Err(e) => {
				tracing::warn!("failed to listen for SIGTERM: {}", e);
				std::future::pending::<()>().await;
			}
		}
	};

	#[cfg(not(unix))]
	let terminate = std::future::pending::<()>();

	tokio::select! {
		_ = ctrl_c => tracing::info!("received SIGINT"),
		_ = terminate => tracing::info!("received SIGTERM"),
	}
}

async fn run_command(command: Oneshot, registry: &Registry<FileStore>, global_config: &GlobalConfig) -> ExitCode {
	let result = match command {
		Oneshot::Start { name, command, cwd } => cmd_start(registry, &name, &command.join(" "), cwd).await,
		Oneshot::Stop { name, force } => cmd_stop(registry, &name, force).await,
		Oneshot::List => cmd_list(registry).await,
		Oneshot::WaitHealthy { port, timeout, host } => {
			let timeout = timeout.map(config::secs).unwrap_or_else(|| global_config.default_health_timeout());
			let host = host.unwrap_or_else(|| global_config.probe.default_host.clone());
			cmd_wait_healthy(registry, port, timeout, &host).await
		}
		Oneshot::Cleanup => cmd_cleanup(registry).await,
	};

	match result {
		Ok(()) => ExitCode::SUCCESS,
		Err(e) => {
			print_error(&e);
			ExitCode::FAILURE
		}
	}
}

async fn cmd_start(registry: &Registry<FileStore>, name: &str, command: &str, cwd: Option<PathBuf>) -> corral::Result<()> {
	let report = registry.start(name, command, cwd.as_deref()).await?;
	print_ok(&format!("started '{}' (pid {})", report.name, report.pid));
	Ok(())
}

async fn cmd_stop(registry: &Registry<FileStore>, name: &str, force: bool) -> corral::Result<()> {
	let pid = registry.list().await?.get(name).map(|p| p.pid);
	let report = registry.stop(name, force).await?;
	match pid {
		Some(pid) => print_ok(&format!("stopped '{}' (pid {})", report.name, pid)),
		None => print_ok(&format!("stopped '{}'", report.name)),
	}
	Ok(())
}

async fn cmd_list(registry: &Registry<FileStore>) -> corral::Result<()> {
	let processes = registry.list().await?;
	if processes.is_empty() {
		print_info("no processes running");
		return Ok(());
	}
	print_info("managed processes:");
	for (name, info) in &processes {
		let status = match info.status {
			corral::ProcessStatus::Running => "running".if_supports_color(Stdout, |s| s.green()).to_string(),
			corral::ProcessStatus::Stopped => "stopped".if_supports_color(Stdout, |s| s.red()).to_string(),
		};
		println!("  - {}: pid {}, {}, command: {}", name.if_supports_color(Stdout, |s| s.bold()), info.pid, status, info.command);
	}
	Ok(())
}

async fn cmd_wait_healthy(registry: &Registry<FileStore>, port: u16, timeout: std::time::Duration, host: &str) -> corral::Result<()> {
	print_info(&format!("waiting for port {}...", port));
	let report = registry.wait_healthy(port, timeout, host).await?;
	print_ok(&format!("port {} ready ({:.1}s)", report.port, report.elapsed));
	Ok(())
}

async fn cmd_cleanup(registry: &Registry<FileStore>) -> corral::Result<()> {
	let count = registry.len().await;
	if count == 0 {
		print_info("no processes to clean up");
		return Ok(());
	}
	print_info(&format!("cleaning up {} process(es)...", count));
	let stopped = registry.cleanup_all().await;
	print_ok(&format!("stopped {} process(es)", stopped));
	Ok(())
}

fn print_ok(msg: &str) {
	println!("{} {}", "[OK]".if_supports_color(Stdout, |s| s.green()), msg);
}

fn print_info(msg: &str) {
	println!("{} {}", "[INFO]".if_supports_color(Stdout, |s| s.cyan()), msg);
}

fn print_error(e: &corral::Error) {
	eprintln!("{} {}", "[ERROR]".if_supports_color(Stderr, |s| s.red()), e);
}
