mod calc;
mod cli;
mod db;
mod ipc;

use clap::Parser;
use std::io::{self, BufRead, Write};
use tracing::{error, info};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

fn init_logging(filter: &str) -> anyhow::Result<()> {
    let filter = match EnvFilter::try_from_default_env() {
        Ok(f) => f,
        Err(_) => EnvFilter::try_new(filter)?,
    };
    // stdout carries the protocol; logs must stay on stderr.
    tracing_subscriber::registry()
        .with(filter)
        .with(
            fmt::layer()
                .with_writer(io::stderr)
                .with_ansi(false)
                .with_target(false)
                .compact(),
        )
        .try_init()?;
    Ok(())
}

fn main() -> anyhow::Result<()> {
    let cli = cli::Cli::parse();
    init_logging(&cli.log_filter)?;

    let mut state = ipc::AppState::default();
    if let Some(path) = &cli.workspace {
        ipc::open_workspace(&mut state, path)?;
    }
    info!(version = env!("CARGO_PKG_VERSION"), "recordsd ready");

    let stdin = io::stdin();
    let mut stdout = io::stdout();

    for line in stdin.lock().lines() {
        let line = match line {
            Ok(v) => v,
            Err(e) => {
                error!(error = %e, "stdin read failed");
                break;
            }
        };
        if line.trim().is_empty() {
            continue;
        }

        let req: ipc::Request = match serde_json::from_str(&line) {
            Ok(v) => v,
            Err(e) => {
                // No id to answer with.
                let resp = serde_json::json!({
                    "ok": false,
                    "error": { "code": "bad_json", "message": e.to_string() }
                });
                let _ = writeln!(stdout, "{}", resp);
                let _ = stdout.flush();
                continue;
            }
        };

        let resp = ipc::handle_request(&mut state, req);
        let _ = writeln!(
            stdout,
            "{}",
            serde_json::to_string(&resp).unwrap_or_else(|_| "{\"ok\":false}".to_string())
        );
        let _ = stdout.flush();
    }

    info!("stdin closed, shutting down");
    Ok(())
}
