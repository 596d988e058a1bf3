// Copyright (c) 2026 bad-antics
// Licensed under the MIT License. See LICENSE file in the project root.

//! Configuration module

use anyhow::Result;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::info;

use crate::core::{EngineSettings, Schedule};
use crate::sensors::{LinkSettings, ProducerSettings, SimulatorSettings};

/// Main application configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Data directory
    pub data_dir: PathBuf,

    /// State database; `<data_dir>/state.db` when unset
    pub state_db: Option<PathBuf>,

    /// Alert log; `<data_dir>/alerts.log` when unset
    pub alert_log: Option<PathBuf>,

    pub alarm: AlarmConfig,
    pub schedule: ScheduleConfig,
    pub link: LinkConfig,
    pub simulator: SimulatorConfig,
    pub producers: ProducerConfig,
    pub notify: NotifyConfig,
    pub siren: SirenConfig,
    pub mqtt: MqttConfig,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            data_dir: dirs::data_dir()
                .map(|d| d.join("hearthguard"))
                .unwrap_or_else(|| PathBuf::from("./data")),
            state_db: None,
            alert_log: None,
            alarm: AlarmConfig::default(),
            schedule: ScheduleConfig::default(),
            link: LinkConfig::default(),
            simulator: SimulatorConfig::default(),
            producers: ProducerConfig::default(),
            notify: NotifyConfig::default(),
            siren: SirenConfig::default(),
            mqtt: MqttConfig::default(),
        }
    }
}

impl Config {
    /// Load configuration from file
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let config: Config = toml::from_str(&content)?;
        info!("Loaded configuration from {:?}", path);
        Ok(config)
    }

    /// Save configuration to file
    pub fn save(&self, path: &Path) -> Result<()> {
        let content = toml::to_string_pretty(self)?;
        std::fs::write(path, content)?;
        info!("Saved configuration to {:?}", path);
        Ok(())
    }

    /// Load or create default configuration
    pub fn load_or_create(path: &Path) -> Result<Self> {
        if path.exists() {
            Self::load(path)
        } else {
            let config = Self::default();

            // Create parent directories
            if let Some(parent) = path.parent() {
                std::fs::create_dir_all(parent)?;
            }

            config.save(path)?;
            Ok(config)
        }
    }

    /// Get configuration directory
    pub fn config_dir() -> PathBuf {
        dirs::config_dir()
            .map(|d| d.join("hearthguard"))
            .unwrap_or_else(|| PathBuf::from("./config"))
    }

    /// Get default configuration path
    pub fn default_path() -> PathBuf {
        Self::config_dir().join("config.toml")
    }

    pub fn state_db_path(&self) -> PathBuf {
        self.state_db
            .clone()
            .unwrap_or_else(|| self.data_dir.join("state.db"))
    }

    pub fn alert_log_path(&self) -> PathBuf {
        self.alert_log
            .clone()
            .unwrap_or_else(|| self.data_dir.join("alerts.log"))
    }

    /// Schedule used when no saved state exists. Falls back to the
    /// built-in window if the configured times do not parse.
    pub fn default_schedule(&self) -> Schedule {
        match Schedule::parse(&self.schedule.default_start, &self.schedule.default_stop) {
            Ok(schedule) => schedule,
            Err(e) => {
                tracing::warn!("Configured default schedule rejected: {}", e);
                Schedule::default()
            }
        }
    }

    pub fn engine_settings(&self) -> EngineSettings {
        EngineSettings {
            suppression: chrono::Duration::seconds(self.alarm.suppression_secs as i64),
        }
    }

    pub fn link_settings(&self) -> LinkSettings {
        LinkSettings {
            port: self.link.port.clone(),
            baud_rate: self.link.baud_rate,
            read_timeout: Duration::from_millis(self.link.read_timeout_ms),
            poll_interval: Duration::from_millis(self.link.poll_interval_ms),
            settle: Duration::from_millis(self.link.settle_ms),
        }
    }

    pub fn simulator_settings(&self) -> SimulatorSettings {
        SimulatorSettings {
            tick: Duration::from_millis(self.simulator.tick_ms),
            intrusion_probability: self.simulator.intrusion_probability,
            cooldown: Duration::from_millis(self.simulator.cooldown_ms),
            seed: self.simulator.seed,
        }
    }

    pub fn producer_settings(&self) -> ProducerSettings {
        ProducerSettings {
            stop_timeout: Duration::from_millis(self.producers.stop_timeout_ms),
            max_backoff: Duration::from_millis(self.link.max_backoff_ms),
        }
    }
}

/// Alarm configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AlarmConfig {
    /// Seconds after a stop during which triggers are ignored
    pub suppression_secs: u64,
}

impl Default for AlarmConfig {
    fn default() -> Self {
        Self { suppression_secs: 5 }
    }
}

/// Schedule configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ScheduleConfig {
    /// Run the schedule monitor
    pub enabled: bool,

    pub poll_interval_secs: u64,

    /// First-run window start (HH:MM)
    pub default_start: String,

    /// First-run window end (HH:MM)
    pub default_stop: String,
}

impl Default for ScheduleConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            poll_interval_secs: 5,
            default_start: "22:00".to_string(),
            default_stop: "07:00".to_string(),
        }
    }
}

/// Hardware sensor link configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LinkConfig {
    pub enabled: bool,

    /// Serial port; auto-discovered when unset
    pub port: Option<String>,

    pub baud_rate: u32,
    pub read_timeout_ms: u64,
    pub poll_interval_ms: u64,

    /// Back-off ceiling after read errors
    pub max_backoff_ms: u64,

    /// Wait after opening the port
    pub settle_ms: u64,
}

impl Default for LinkConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            port: None,
            baud_rate: 9600,
            read_timeout_ms: 100,
            poll_interval_ms: 30,
            max_backoff_ms: 2000,
            settle_ms: 1000,
        }
    }
}

/// Simulator configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SimulatorConfig {
    /// Force the simulator on even with hardware present
    pub enabled: bool,
    pub tick_ms: u64,
    pub intrusion_probability: f64,
    pub cooldown_ms: u64,
    pub seed: Option<u64>,
}

impl Default for SimulatorConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            tick_ms: 500,
            intrusion_probability: 0.001,
            cooldown_ms: 5000,
            seed: None,
        }
    }
}

/// Producer thread configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ProducerConfig {
    pub stop_timeout_ms: u64,
}

impl Default for ProducerConfig {
    fn default() -> Self {
        Self { stop_timeout_ms: 1000 }
    }
}

/// Notification configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct NotifyConfig {
    /// Email gateway webhook
    pub email_webhook: Option<String>,

    /// SMS gateway webhook
    pub sms_webhook: Option<String>,

    pub timeout_secs: u64,
}

impl Default for NotifyConfig {
    fn default() -> Self {
        Self {
            email_webhook: None,
            sms_webhook: None,
            timeout_secs: 10,
        }
    }
}

/// Siren configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct SirenConfig {
    /// Player command, e.g. `["aplay", "/usr/share/sounds/siren.wav"]`
    pub command: Option<Vec<String>>,
}

/// MQTT bridge configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct MqttConfig {
    pub enabled: bool,
    pub broker: String,
    pub port: u16,
    pub client_id: String,
    pub topic_prefix: String,
    pub username: Option<String>,
    pub password: Option<String>,
}

impl Default for MqttConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            broker: "localhost".to_string(),
            port: 1883,
            client_id: "hearthguard".to_string(),
            topic_prefix: "hearthguard".to_string(),
            username: None,
            password: None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_partial_file_uses_defaults() {
        let config: Config = toml::from_str(
            r#"
            data_dir = "/var/lib/hearthguard"

            [alarm]
            suppression_secs = 8

            [link]
            port = "/dev/ttyACM1"
        "#,
        )
        .unwrap();

        assert_eq!(config.alarm.suppression_secs, 8);
        assert_eq!(config.link.port.as_deref(), Some("/dev/ttyACM1"));
        assert_eq!(config.link.baud_rate, 9600);
        assert_eq!(config.schedule.poll_interval_secs, 5);
        assert_eq!(config.state_db_path(), PathBuf::from("/var/lib/hearthguard/state.db"));
        assert_eq!(config.alert_log_path(), PathBuf::from("/var/lib/hearthguard/alerts.log"));
        assert_eq!(config.engine_settings().suppression, chrono::Duration::seconds(8));
    }

    #[test]
    fn test_bad_default_schedule_falls_back() {
        let mut config = Config::default();
        config.schedule.default_start = "noon".to_string();
        assert_eq!(config.default_schedule(), Schedule::default());

        config.schedule.default_start = "21:00".to_string();
        assert_eq!(config.default_schedule().start_label(), "21:00");
    }

    #[test]
    fn test_load_or_create_writes_defaults() {
        let dir = std::env::temp_dir().join(format!("hearthguard-cfg-{}", uuid::Uuid::new_v4()));
        let path = dir.join("config.toml");

        let created = Config::load_or_create(&path).unwrap();
        assert!(path.exists());
        let loaded = Config::load_or_create(&path).unwrap();
        assert_eq!(loaded.mqtt.topic_prefix, created.mqtt.topic_prefix);
        assert_eq!(loaded.simulator.tick_ms, 500);

        let _ = std::fs::remove_dir_all(dir);
    }
}
