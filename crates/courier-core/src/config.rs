//! Agent configuration.
//!
//! All tunables for the courier agent in one place, grouped per component.
//! Defaults match the coordinator deployment: 10 s task discovery, 20 s
//! heartbeat, 5 s reconnect delay, 30 s ledger saves.

use std::path::PathBuf;
use std::time::Duration;

use serde::{Deserialize, Serialize};

// ----------------------------------------------------------------------------
// Component Configurations
// ----------------------------------------------------------------------------

/// Configuration for the task-discovery loop.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DiscoveryConfig {
    /// Base URL of the task source, e.g. `http://localhost:6767`.
    pub base_url: String,
    /// Fixed polling interval in seconds. No back-off: a failed fetch waits
    /// exactly one interval before the next attempt.
    pub interval_secs: u64,
}

impl Default for DiscoveryConfig {
    fn default() -> Self {
        Self {
            base_url: "http://localhost:6767".to_string(),
            interval_secs: 10,
        }
    }
}

impl DiscoveryConfig {
    pub fn interval(&self) -> Duration {
        Duration::from_secs(self.interval_secs)
    }
}

/// Configuration for the coordinator control channel.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ControlConfig {
    /// Coordinator WebSocket endpoint, e.g. `ws://localhost:6677`.
    pub url: String,
    /// Heartbeat/report interval in seconds while connected.
    pub heartbeat_interval_secs: u64,
    /// Delay before a reconnection attempt after losing the connection.
    pub reconnect_delay_secs: u64,
}

impl Default for ControlConfig {
    fn default() -> Self {
        Self {
            url: "ws://localhost:6677".to_string(),
            heartbeat_interval_secs: 20,
            reconnect_delay_secs: 5,
        }
    }
}

impl ControlConfig {
    pub fn heartbeat_interval(&self) -> Duration {
        Duration::from_secs(self.heartbeat_interval_secs)
    }

    pub fn reconnect_delay(&self) -> Duration {
        Duration::from_secs(self.reconnect_delay_secs)
    }
}

/// Configuration for ledger persistence.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StateConfig {
    /// Directory holding the durable state file. Created when missing.
    pub state_dir: PathBuf,
    /// Interval between periodic ledger saves, in seconds.
    pub save_interval_secs: u64,
}

impl Default for StateConfig {
    fn default() -> Self {
        Self {
            state_dir: PathBuf::from("data"),
            save_interval_secs: 30,
        }
    }
}

impl StateConfig {
    /// Path of the ledger state file inside the state directory.
    pub fn state_file(&self) -> PathBuf {
        self.state_dir.join("ledger-state.json")
    }

    pub fn save_interval(&self) -> Duration {
        Duration::from_secs(self.save_interval_secs)
    }
}

/// Configuration for usage-report generation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReportConfig {
    /// Trailing window length covered by each report, in seconds.
    pub window_secs: u64,
}

impl Default for ReportConfig {
    fn default() -> Self {
        Self { window_secs: 60 }
    }
}

// ----------------------------------------------------------------------------
// Top-Level Configuration
// ----------------------------------------------------------------------------

/// Complete configuration for one courier agent process.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CourierConfig {
    /// Identifier this agent reports as, assigned at registration time.
    pub client_id: String,
    pub discovery: DiscoveryConfig,
    pub control: ControlConfig,
    pub state: StateConfig,
    pub report: ReportConfig,
}

impl CourierConfig {
    /// Configuration tuned for tests: short timers, temp-friendly paths.
    pub fn testing(state_dir: impl Into<PathBuf>) -> Self {
        Self {
            client_id: "test-client".to_string(),
            discovery: DiscoveryConfig {
                base_url: "http://127.0.0.1:0".to_string(),
                interval_secs: 1,
            },
            control: ControlConfig {
                url: "ws://127.0.0.1:0".to_string(),
                heartbeat_interval_secs: 1,
                reconnect_delay_secs: 1,
            },
            state: StateConfig {
                state_dir: state_dir.into(),
                save_interval_secs: 1,
            },
            report: ReportConfig { window_secs: 60 },
        }
    }

    /// Check the configuration for values that cannot work at runtime.
    pub fn validate(&self) -> Result<(), String> {
        if self.client_id.is_empty() {
            return Err("client_id must not be empty".to_string());
        }
        if self.discovery.interval_secs == 0 {
            return Err("discovery.interval_secs must be at least 1".to_string());
        }
        if self.control.heartbeat_interval_secs == 0 {
            return Err("control.heartbeat_interval_secs must be at least 1".to_string());
        }
        if self.control.reconnect_delay_secs == 0 {
            return Err("control.reconnect_delay_secs must be at least 1".to_string());
        }
        if self.state.save_interval_secs == 0 {
            return Err("state.save_interval_secs must be at least 1".to_string());
        }
        if self.report.window_secs == 0 {
            return Err("report.window_secs must be at least 1".to_string());
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_validate_once_client_id_is_set() {
        let mut config = CourierConfig::default();
        assert!(config.validate().is_err());

        config.client_id = "agent-1".to_string();
        assert!(config.validate().is_ok());
    }

    #[test]
    fn zero_intervals_are_rejected() {
        let mut config = CourierConfig::testing("data");
        config.discovery.interval_secs = 0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn state_file_lives_under_state_dir() {
        let config = StateConfig::default();
        assert_eq!(config.state_file(), PathBuf::from("data/ledger-state.json"));
    }
}
