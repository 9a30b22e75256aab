//! Configuration types for trainlet

use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

/// Main daemon configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TrainletConfig {
    /// Agent runtime configuration
    #[serde(default)]
    pub agent: AgentConfig,
    /// Visualization board configuration
    #[serde(default)]
    pub board: BoardConfig,
    /// Logging configuration
    #[serde(default)]
    pub logging: LoggingConfig,
}

impl TrainletConfig {
    /// Load configuration from a TOML file
    pub fn from_file(path: &std::path::Path) -> Result<Self, crate::TrainletError> {
        let content = std::fs::read_to_string(path).map_err(|e| {
            crate::TrainletError::Config(format!("Failed to read config file: {}", e))
        })?;
        toml::from_str(&content)
            .map_err(|e| crate::TrainletError::Config(format!("Failed to parse config: {}", e)))
    }
}

/// Agent runtime configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AgentConfig {
    /// Address to bind the agent HTTP server
    pub bind_address: String,
    /// Port for the agent HTTP server
    pub port: u16,
    /// Seconds to sleep between queue polls when no run is claimed
    pub poll_interval_secs: u64,
    /// Seconds between heartbeat updates
    pub heartbeat_interval_secs: u64,
    /// Minimum seconds between idle log lines
    pub idle_log_interval_secs: u64,
    /// Trainer command the agent invokes per run
    pub trainer_command: Option<PathBuf>,
    /// Extra arguments appended to the trainer command
    pub trainer_args: Vec<String>,
}

impl Default for AgentConfig {
    fn default() -> Self {
        Self {
            bind_address: "0.0.0.0".to_string(),
            port: 7070,
            poll_interval_secs: 5,
            heartbeat_interval_secs: 15,
            idle_log_interval_secs: 60,
            trainer_command: None,
            trainer_args: Vec::new(),
        }
    }
}

impl AgentConfig {
    /// Queue poll backoff
    pub fn poll_interval(&self) -> Duration {
        Duration::from_secs(self.poll_interval_secs)
    }

    /// Heartbeat cadence
    pub fn heartbeat_interval(&self) -> Duration {
        Duration::from_secs(self.heartbeat_interval_secs)
    }

    /// Idle log throttle window
    pub fn idle_log_interval(&self) -> Duration {
        Duration::from_secs(self.idle_log_interval_secs)
    }
}

/// Visualization board configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BoardConfig {
    /// Address to bind the board HTTP server
    pub bind_address: String,
    /// Port for the board HTTP server
    pub port: u16,
    /// Seconds without a heartbeat before a session is evicted
    pub idle_timeout_secs: u64,
    /// Seconds between eviction sweeps
    pub sweep_interval_secs: u64,
    /// Enable CORS
    pub cors_enabled: bool,
    /// Allowed CORS origins
    pub cors_origins: Vec<String>,
}

impl Default for BoardConfig {
    fn default() -> Self {
        Self {
            bind_address: "0.0.0.0".to_string(),
            port: 6060,
            idle_timeout_secs: 600,
            sweep_interval_secs: 60,
            cors_enabled: true,
            cors_origins: vec!["*".to_string()],
        }
    }
}

impl BoardConfig {
    /// Session idle timeout
    pub fn idle_timeout(&self) -> Duration {
        Duration::from_secs(self.idle_timeout_secs)
    }

    /// Sweeper wake interval
    pub fn sweep_interval(&self) -> Duration {
        Duration::from_secs(self.sweep_interval_secs)
    }
}

/// Logging configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Log level
    pub level: String,
    /// Log format (json or text)
    pub format: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            format: "text".to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = TrainletConfig::default();
        assert_eq!(config.agent.port, 7070);
        assert_eq!(config.agent.heartbeat_interval_secs, 15);
        assert_eq!(config.board.port, 6060);
        assert_eq!(config.board.idle_timeout_secs, 600);
    }

    #[test]
    fn test_config_parse() {
        let toml_str = r#"
[agent]
bind_address = "127.0.0.1"
port = 7171
poll_interval_secs = 2
heartbeat_interval_secs = 10
idle_log_interval_secs = 30
trainer_command = "/usr/local/bin/train"
trainer_args = ["--amp"]

[board]
bind_address = "127.0.0.1"
port = 6161
idle_timeout_secs = 120
sweep_interval_secs = 15
cors_enabled = false
cors_origins = []
"#;
        let config: TrainletConfig = toml::from_str(toml_str).unwrap();
        assert_eq!(config.agent.port, 7171);
        assert_eq!(config.agent.trainer_args, vec!["--amp".to_string()]);
        assert_eq!(config.board.sweep_interval_secs, 15);
        // Missing [logging] section falls back to defaults
        assert_eq!(config.logging.level, "info");
    }

    #[test]
    fn test_interval_helpers() {
        let config = AgentConfig::default();
        assert_eq!(config.poll_interval(), Duration::from_secs(5));
        assert_eq!(config.heartbeat_interval(), Duration::from_secs(15));
    }
}
