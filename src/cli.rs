//! Command-line configuration for the records sidecar.

use clap::Parser;
use std::path::PathBuf;

/// Academic records sidecar. Reads one JSON request per line on stdin and
/// writes one JSON response per line on stdout. Logs go to stderr.
#[derive(Parser, Debug)]
#[command(version)]
pub struct Cli {
    /// Workspace directory to open at startup (same as an initial `workspace.select`).
    #[arg(long, env = "RECORDSD_WORKSPACE")]
    pub workspace: Option<PathBuf>,

    /// Log filter directives, e.g. `recordsd=debug`. `RUST_LOG` is used when set.
    #[arg(long, env = "RECORDSD_LOG", default_value = "recordsd=info")]
    pub log_filter: String,
}
