//! Command-line interface definitions and parsing

use std::path::PathBuf;

use clap::Parser;

/// Agent for the courier peer-assisted distribution network.
///
/// Runs the transfer accounting ledger, the task discovery loop, and the
/// coordinator control channel until interrupted.
#[derive(Debug, Parser)]
#[command(name = "courier", author, version, about, long_about = None)]
pub struct Cli {
    /// Enable verbose logging
    #[arg(short, long)]
    pub verbose: bool,

    /// Configuration file path
    #[arg(short, long)]
    pub config: Option<PathBuf>,

    /// Directory for the durable ledger state file
    #[arg(short, long)]
    pub state_dir: Option<PathBuf>,

    /// Client identifier to report as (overrides configuration)
    #[arg(long)]
    pub client_id: Option<String>,

    /// Coordinator task-source base URL (overrides configuration)
    #[arg(long)]
    pub discovery_url: Option<String>,

    /// Coordinator control channel WebSocket URL (overrides configuration)
    #[arg(long)]
    pub control_url: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_overrides() {
        let cli = Cli::parse_from([
            "courier",
            "--verbose",
            "--state-dir",
            "/var/lib/courier",
            "--client-id",
            "agent-7",
        ]);
        assert!(cli.verbose);
        assert_eq!(cli.state_dir.as_deref(), Some(std::path::Path::new("/var/lib/courier")));
        assert_eq!(cli.client_id.as_deref(), Some("agent-7"));
        assert!(cli.config.is_none());
    }

    #[test]
    fn defaults_need_no_arguments() {
        let cli = Cli::parse_from(["courier"]);
        assert!(!cli.verbose);
        assert!(cli.client_id.is_none());
    }
}
