//! DoseMate primary process
//!
//! Runs the startup gate (container, registry, sync gate, migration,
//! backup retention), then keeps the widget snapshot fresh:
//!
//! - publish on start and on every foreground transition
//! - publish on background transitions and on shutdown
//!
//! Lifecycle transitions arrive as lines on stdin (`foreground`,
//! `background`, `refresh`) from the host shell. EOF or Ctrl-C shuts the
//! process down.

use std::io;
use std::path::PathBuf;
use std::sync::Arc;
use tokio::io::{AsyncBufReadExt, BufReader};
use tracing::{Level, error, info, warn};
use tracing_subscriber::EnvFilter;

use dosemate_core::{
    AppConfig, IdentityTokenProbe, RefreshTrigger, SystemClock, bootstrap,
};

/// Parse command-line arguments and return the optional container directory.
/// Exits the process if `--help` or `--version` is requested.
fn parse_args() -> Option<PathBuf> {
    let args: Vec<String> = std::env::args().collect();
    let mut container_dir: Option<PathBuf> = None;
    let mut i = 1;

    while i < args.len() {
        match args[i].as_str() {
            "--help" | "-h" => {
                println!("DoseMate v{}", env!("CARGO_PKG_VERSION"));
                println!();
                println!("Medication tracker process: migrates the store at startup and");
                println!("publishes the widget snapshot on lifecycle transitions.");
                println!();
                println!("USAGE:");
                println!("    dosemate-app [OPTIONS]");
                println!();
                println!("OPTIONS:");
                println!("    -h, --help                   Print help information");
                println!("    -V, --version                Print version information");
                println!("    --container-dir <PATH>       Shared container directory (must exist)");
                println!();
                println!("STDIN:");
                println!("    foreground | background | refresh   One lifecycle event per line");
                println!();
                println!("ENVIRONMENT:");
                println!("    RUST_LOG                     Log level filter (e.g., debug, info, warn)");
                println!("    DOSEMATE_CONTAINER_DIR       Shared container directory");
                println!("    DOSEMATE_GROUP_ID            App group identifier");
                println!("    DOSEMATE_PREFERENCES_DIR     App-private preferences directory");
                println!("    DOSEMATE_BACKUP_RETENTION    Backups kept after startup (default 3)");
                println!("    DOSEMATE_ACCOUNT_TOKEN       Cloud identity token file");
                std::process::exit(0);
            }
            "--version" | "-V" => {
                println!("dosemate-app {}", env!("CARGO_PKG_VERSION"));
                std::process::exit(0);
            }
            "--container-dir" => {
                i += 1;
                if i >= args.len() {
                    eprintln!("error: --container-dir requires a path argument");
                    eprintln!("Usage: dosemate-app --container-dir <PATH>");
                    std::process::exit(1);
                }
                container_dir = Some(PathBuf::from(&args[i]));
            }
            arg if arg.starts_with("--container-dir=") => {
                let path = arg.strip_prefix("--container-dir=").unwrap_or("");
                if path.is_empty() {
                    eprintln!("error: --container-dir requires a path argument");
                    eprintln!("Usage: dosemate-app --container-dir <PATH>");
                    std::process::exit(1);
                }
                container_dir = Some(PathBuf::from(path));
            }
            arg => {
                eprintln!("error: unknown argument '{}'", arg);
                eprintln!("Usage: dosemate-app [OPTIONS]");
                eprintln!("Try 'dosemate-app --help' for more information.");
                std::process::exit(1);
            }
        }
        i += 1;
    }

    container_dir
}

fn parse_event(line: &str) -> Option<RefreshTrigger> {
    match line.trim().to_ascii_lowercase().as_str() {
        "foreground" | "active" => Some(RefreshTrigger::Foreground),
        "background" | "inactive" => Some(RefreshTrigger::Background),
        "refresh" | "publish" => Some(RefreshTrigger::Manual),
        _ => None,
    }
}

#[tokio::main]
async fn main() {
    // Parse CLI arguments first (before logging init, so --help/--version work cleanly)
    let container_dir = parse_args();

    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env().add_directive(Level::INFO.into()))
        .with_writer(io::stderr)
        .with_target(false)
        .with_ansi(false)
        .init();

    info!("DoseMate v{} starting...", env!("CARGO_PKG_VERSION"));

    let mut config = match AppConfig::from_env() {
        Ok(config) => config,
        Err(e) => {
            error!("Invalid configuration: {}", e);
            std::process::exit(1);
        }
    };
    if let Some(dir) = container_dir {
        config = config.with_container_dir(dir);
    }

    let probe = IdentityTokenProbe::new(config.account_token.clone());
    let ctx = match bootstrap(config, Arc::new(SystemClock), &probe) {
        Ok(ctx) => ctx,
        Err(e) if e.is_recovery_failure() => {
            error!("{}", e);
            eprintln!("Data recovery failed. Your medication data could not be restored");
            eprintln!("from the pre-update backup. Please do not delete the app data folder;");
            eprintln!("backups are kept next to the store.");
            std::process::exit(2);
        }
        Err(e) => {
            error!("Startup failed: {}", e);
            std::process::exit(1);
        }
    };

    info!(
        version = %ctx.migration.to,
        outcome = ?ctx.migration.outcome,
        sync_mode = %ctx.sync_mode,
        "Startup gate passed"
    );

    let publisher = ctx.spawn_publisher();
    let mut lines = BufReader::new(tokio::io::stdin()).lines();

    loop {
        tokio::select! {
            line = lines.next_line() => match line {
                Ok(Some(line)) => match parse_event(&line) {
                    Some(trigger) => publisher.request(trigger),
                    None if line.trim().is_empty() => {}
                    None => warn!("Ignoring unknown lifecycle event: {}", line.trim()),
                },
                Ok(None) => break,
                Err(e) => {
                    warn!("Lifecycle input closed: {}", e);
                    break;
                }
            },
            _ = tokio::signal::ctrl_c() => {
                info!("Interrupt received");
                break;
            }
        }
    }

    // Going away counts as backgrounding
    publisher.request(RefreshTrigger::Background);
    publisher.shutdown().await;

    info!("DoseMate shutting down");
}
