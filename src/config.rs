//! Configuration management for the PV inverter bridge
//!
//! This module handles loading and validation of the application
//! configuration from YAML files. The configuration is read once at startup
//! and handed out as an immutable value.

use crate::error::{PvInverterError, Result};
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

mod defaults;

/// Environment variable naming an explicit configuration file
pub const CONFIG_PATH_ENV: &str = "MQTT_PVINVERTER_CONFIG";

/// Longest accepted heartbeat period (one day)
pub const MAX_SIGN_OF_LIFE_MINUTES: u64 = 24 * 60;

/// Main configuration structure
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Device instance for D-Bus service naming
    pub device_instance: u32,

    /// Human-readable name shown in the GX device list
    pub custom_name: String,

    /// Product name exported on /ProductName
    pub product_name: String,

    /// Inverter position (0=AC input 1, 1=AC output, 2=AC input 2)
    pub position: u8,

    /// Serial exported on /Serial
    pub serial: String,

    /// Require D-Bus to be available; fail fast on startup if unavailable
    pub require_dbus: bool,

    /// Heartbeat log interval in minutes
    pub sign_of_life_minutes: u64,

    /// MQTT broker connection
    pub mqtt: MqttConfig,

    /// Broker reconnect backoff
    pub reconnect: ReconnectConfig,

    /// Publish cadence and derivation constants
    pub publish: PublishConfig,

    /// Logging configuration
    pub logging: LoggingConfig,
}

/// MQTT broker connection parameters
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct MqttConfig {
    /// Broker host name or IP address
    pub server: String,

    /// Broker TCP port (typically 1883)
    pub port: u16,

    /// Client identifier; a random one is generated when empty
    pub client_id: String,

    pub username: Option<String>,
    pub password: Option<String>,

    /// MQTT keep-alive in seconds
    pub keep_alive_secs: u64,

    /// How long to wait for CONNACK before a connect attempt counts as failed
    pub connect_timeout_secs: u64,

    /// Subscription filter, usually a wildcard covering the phase topics
    pub topic_base: String,

    pub topic_l1: String,
    pub topic_l2: String,
    pub topic_l3: String,
}

/// Reconnect backoff parameters
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ReconnectConfig {
    /// Wait before the first reconnect attempt
    pub first_delay_secs: u64,

    /// Multiplier applied to the delay after each failure
    pub rate: u32,

    /// Upper bound for the delay
    pub max_delay_secs: u64,

    /// Consecutive failures before giving up
    pub max_attempts: u32,
}

/// Publish loop parameters
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PublishConfig {
    /// Tick interval in milliseconds
    pub interval_ms: u64,

    /// Fixed voltage used to derive current from power
    pub nominal_voltage: f64,
}

/// Logging configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Log level (TRACE, DEBUG, INFO, WARN, ERROR)
    pub level: String,

    /// Optional console-specific level
    pub console_level: Option<String>,

    /// Optional file-specific level
    pub file_level: Option<String>,

    /// Path to log file
    pub file: String,

    /// Number of rotated files to keep
    pub backup_count: u32,

    /// Whether to log to console
    pub console_output: bool,

    /// Whether to use JSON format
    pub json_format: bool,
}

impl MqttConfig {
    /// Per-phase topics in L1, L2, L3 order
    pub fn phase_topics(&self) -> [&str; 3] {
        [&self.topic_l1, &self.topic_l2, &self.topic_l3]
    }

    /// Client id to present to the broker
    pub fn effective_client_id(&self) -> String {
        if self.client_id.trim().is_empty() {
            format!("mqtt-pvinverter-{}", uuid::Uuid::new_v4())
        } else {
            self.client_id.clone()
        }
    }
}

impl ReconnectConfig {
    pub fn first_delay(&self) -> Duration {
        Duration::from_secs(self.first_delay_secs)
    }

    pub fn max_delay(&self) -> Duration {
        Duration::from_secs(self.max_delay_secs)
    }
}

impl Config {
    /// Load configuration from a YAML file
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let contents = std::fs::read_to_string(path)?;
        let config: Config = serde_yaml::from_str(&contents)?;
        Ok(config)
    }

    /// Load configuration from the first location that exists
    pub fn load() -> Result<Self> {
        if let Some(explicit) = std::env::var_os(CONFIG_PATH_ENV) {
            let path = Path::new(&explicit);
            if !path.exists() {
                return Err(PvInverterError::config(format!(
                    "{} points to missing file {}",
                    CONFIG_PATH_ENV,
                    path.display()
                )));
            }
            return Self::from_file(path);
        }

        let default_paths = [
            "mqtt_pvinverter.yaml",
            "/data/mqtt_pvinverter/config.yaml",
            "/etc/mqtt_pvinverter/config.yaml",
        ];

        for path in &default_paths {
            if Path::new(path).exists() {
                return Self::from_file(path);
            }
        }

        // Fall back to default configuration
        Ok(Config::default())
    }

    /// Save configuration to a YAML file
    pub fn save_to_file<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let yaml = serde_yaml::to_string(self)?;
        std::fs::write(path, yaml)?;
        Ok(())
    }

    /// Validate the configuration
    pub fn validate(&self) -> Result<()> {
        if self.mqtt.server.trim().is_empty() {
            return Err(PvInverterError::validation(
                "mqtt.server",
                "Broker address cannot be empty",
            ));
        }

        if self.mqtt.port == 0 {
            return Err(PvInverterError::validation(
                "mqtt.port",
                "Port must be greater than 0",
            ));
        }

        if self.mqtt.topic_base.trim().is_empty() {
            return Err(PvInverterError::validation(
                "mqtt.topic_base",
                "Subscription topic cannot be empty",
            ));
        }

        for (field, topic) in [
            ("mqtt.topic_l1", &self.mqtt.topic_l1),
            ("mqtt.topic_l2", &self.mqtt.topic_l2),
            ("mqtt.topic_l3", &self.mqtt.topic_l3),
        ] {
            if topic.trim().is_empty() {
                return Err(PvInverterError::validation(
                    field,
                    "Phase topic cannot be empty",
                ));
            }
        }

        if self.publish.interval_ms == 0 {
            return Err(PvInverterError::validation(
                "publish.interval_ms",
                "Must be greater than 0",
            ));
        }

        if !(self.publish.nominal_voltage.is_finite() && self.publish.nominal_voltage > 0.0) {
            return Err(PvInverterError::validation(
                "publish.nominal_voltage",
                "Must be positive",
            ));
        }

        if self.reconnect.rate < 1 {
            return Err(PvInverterError::validation(
                "reconnect.rate",
                "Must be at least 1",
            ));
        }

        if self.reconnect.max_attempts == 0 {
            return Err(PvInverterError::validation(
                "reconnect.max_attempts",
                "Must be greater than 0",
            ));
        }

        if self.reconnect.max_delay_secs < self.reconnect.first_delay_secs {
            return Err(PvInverterError::validation(
                "reconnect.max_delay_secs",
                "Must not be below first_delay_secs",
            ));
        }

        if self.position > 2 {
            return Err(PvInverterError::validation(
                "position",
                "Must be 0, 1 or 2",
            ));
        }

        if self.sign_of_life_minutes == 0 {
            return Err(PvInverterError::validation(
                "sign_of_life_minutes",
                "Must be greater than 0",
            ));
        }

        if self.sign_of_life_minutes > MAX_SIGN_OF_LIFE_MINUTES {
            return Err(PvInverterError::validation(
                "sign_of_life_minutes",
                "Must not exceed 1440 (one day)",
            ));
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = Config::default();
        assert_eq!(config.mqtt.port, 1883);
        assert_eq!(config.publish.interval_ms, 250);
        assert_eq!(config.publish.nominal_voltage, 230.0);
        assert_eq!(config.reconnect.max_attempts, 12);
        assert!(config.require_dbus);
    }

    #[test]
    fn test_config_validation() {
        let mut config = Config::default();
        assert!(config.validate().is_ok());

        config.mqtt.server = String::new();
        assert!(config.validate().is_err());

        config = Config::default();
        config.mqtt.port = 0;
        assert!(config.validate().is_err());

        config = Config::default();
        config.publish.nominal_voltage = 0.0;
        assert!(config.validate().is_err());

        config = Config::default();
        config.mqtt.topic_l2 = " ".to_string();
        assert!(config.validate().is_err());
    }

    #[test]
    fn partial_yaml_fills_defaults() {
        let yaml = "device_instance: 7\nmqtt:\n  server: broker.lan\n  topic_l1: a/b\n";
        let config: Config = serde_yaml::from_str(yaml).unwrap();
        assert_eq!(config.device_instance, 7);
        assert_eq!(config.mqtt.server, "broker.lan");
        assert_eq!(config.mqtt.topic_l1, "a/b");
        assert_eq!(config.mqtt.port, 1883);
        assert_eq!(config.reconnect.first_delay_secs, 1);
    }

    #[test]
    fn empty_client_id_gets_generated() {
        let mut mqtt = MqttConfig::default();
        mqtt.client_id = String::new();
        let id = mqtt.effective_client_id();
        assert!(id.starts_with("mqtt-pvinverter-"));
        mqtt.client_id = "fixed".to_string();
        assert_eq!(mqtt.effective_client_id(), "fixed");
    }
}
