//! Layered configuration loading for the courier agent.
//!
//! Configuration is assembled with figment in priority order: CLI arguments
//! over `COURIER_*` environment variables over `courier.toml` over defaults.
//! A missing `client_id` after all layers is filled with a generated UUID,
//! matching the behavior of an agent on its first run before the coordinator
//! has assigned it an identifier.

use std::path::{Path, PathBuf};

use figment::{
    providers::{Env, Format, Serialized, Toml},
    Figment,
};
use tracing::info;
use uuid::Uuid;

use courier_core::CourierConfig;

use crate::cli::Cli;
use crate::error::{CliError, Result};

/// Name of the configuration file looked up in the working directory.
const CONFIG_FILE: &str = "courier.toml";

/// Load the agent configuration, layering every source over the defaults.
pub fn load(cli: &Cli) -> Result<CourierConfig> {
    let mut figment = Figment::new().merge(Serialized::defaults(CourierConfig::default()));

    figment = match &cli.config {
        // An explicitly named file must exist; silently falling back to
        // defaults would hide an operator typo.
        Some(path) => {
            if !path.exists() {
                return Err(CliError::Config(format!(
                    "configuration file not found: {}",
                    path.display()
                )));
            }
            figment.merge(Toml::file(path))
        }
        None => figment
            .merge(Toml::file(CONFIG_FILE))
            .merge(Toml::file(default_config_path())),
    };

    figment = figment.merge(Env::prefixed("COURIER_").split("__"));

    if let Some(client_id) = &cli.client_id {
        figment = figment.merge(("client_id", client_id.clone()));
    }
    if let Some(state_dir) = &cli.state_dir {
        figment = figment.merge(("state.state_dir", state_dir.clone()));
    }
    if let Some(url) = &cli.discovery_url {
        figment = figment.merge(("discovery.base_url", url.clone()));
    }
    if let Some(url) = &cli.control_url {
        figment = figment.merge(("control.url", url.clone()));
    }

    let mut config: CourierConfig = figment.extract()?;

    if config.client_id.is_empty() {
        config.client_id = Uuid::new_v4().to_string();
        info!(client_id = %config.client_id, "no client_id configured, generated one");
    }

    config.validate().map_err(CliError::Config)?;
    Ok(config)
}

/// Per-user configuration file, `~/.courier/config.toml`.
fn default_config_path() -> PathBuf {
    dirs::home_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join(".courier")
        .join("config.toml")
}

/// Load configuration from one specific file over the defaults.
pub fn load_from_file(path: &Path) -> Result<CourierConfig> {
    let config: CourierConfig = Figment::new()
        .merge(Serialized::defaults(CourierConfig::default()))
        .merge(Toml::file(path))
        .extract()?;
    config.validate().map_err(CliError::Config)?;
    Ok(config)
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::Parser;

    fn cli(args: &[&str]) -> Cli {
        let mut full = vec!["courier"];
        full.extend_from_slice(args);
        Cli::parse_from(full)
    }

    #[test]
    fn cli_flags_override_file_values() {
        let dir = tempfile::tempdir().unwrap();
        let file = dir.path().join("courier.toml");
        std::fs::write(
            &file,
            r#"
client_id = "from-file"

[discovery]
base_url = "http://file.example:6767"
interval_secs = 15
"#,
        )
        .unwrap();

        let args = [
            "--config".to_string(),
            file.display().to_string(),
            "--client-id".to_string(),
            "from-flag".to_string(),
        ];
        let cli = cli(&args.iter().map(String::as_str).collect::<Vec<_>>());
        let config = load(&cli).unwrap();

        assert_eq!(config.client_id, "from-flag");
        assert_eq!(config.discovery.base_url, "http://file.example:6767");
        assert_eq!(config.discovery.interval_secs, 15);
        // Untouched sections keep their defaults.
        assert_eq!(config.control.heartbeat_interval_secs, 20);
    }

    #[test]
    fn missing_explicit_config_file_is_an_error() {
        let cli = cli(&["--config", "/nonexistent/courier.toml"]);
        assert!(matches!(load(&cli), Err(CliError::Config(_))));
    }

    #[test]
    fn absent_client_id_is_generated() {
        let dir = tempfile::tempdir().unwrap();
        let file = dir.path().join("courier.toml");
        std::fs::write(&file, "[report]\nwindow_secs = 120\n").unwrap();

        let args = ["--config".to_string(), file.display().to_string()];
        let cli = cli(&args.iter().map(String::as_str).collect::<Vec<_>>());
        let config = load(&cli).unwrap();

        assert!(!config.client_id.is_empty());
        assert_eq!(config.report.window_secs, 120);
    }

    #[test]
    fn load_from_file_rejects_invalid_values() {
        let dir = tempfile::tempdir().unwrap();
        let file = dir.path().join("courier.toml");
        std::fs::write(&file, "client_id = \"a\"\n[discovery]\ninterval_secs = 0\n").unwrap();

        assert!(matches!(
            load_from_file(&file),
            Err(CliError::Config(_))
        ));
    }
}
