//! Error types and handling for the PV inverter bridge
//!
//! This module defines the error types used throughout the application,
//! providing consistent error handling and reporting.

use thiserror::Error;

/// Result type alias for bridge operations
pub type Result<T> = std::result::Result<T, PvInverterError>;

/// Main error type for the bridge
#[derive(Debug, Error)]
pub enum PvInverterError {
    /// Configuration-related errors
    #[error("Configuration error: {message}")]
    Config { message: String },

    /// MQTT transport errors (connect, subscribe, event loop)
    #[error("MQTT error: {message}")]
    Mqtt { message: String },

    /// D-Bus communication errors
    #[error("D-Bus error: {message}")]
    DBus { message: String },

    /// Telemetry payload could not be interpreted as a power value
    #[error("Payload error on {topic}: {message}")]
    Payload { topic: String, message: String },

    /// Serialization/deserialization errors
    #[error("Serialization error: {message}")]
    Serialization { message: String },

    /// File I/O errors
    #[error("I/O error: {message}")]
    Io { message: String },

    /// Validation errors
    #[error("Validation error: {field} - {message}")]
    Validation { field: String, message: String },

    /// Timeout errors
    #[error("Timeout error: {message}")]
    Timeout { message: String },

    /// Broker reconnect attempts exhausted; the broker path is down for good
    #[error("Reconnect failed after {attempts} attempts")]
    ReconnectExhausted { attempts: u32 },

    /// Generic errors with context
    #[error("Error: {message}")]
    Generic { message: String },
}

impl PvInverterError {
    /// Create a new configuration error
    pub fn config<S: Into<String>>(message: S) -> Self {
        PvInverterError::Config {
            message: message.into(),
        }
    }

    /// Create a new MQTT error
    pub fn mqtt<S: Into<String>>(message: S) -> Self {
        PvInverterError::Mqtt {
            message: message.into(),
        }
    }

    /// Create a new D-Bus error
    pub fn dbus<S: Into<String>>(message: S) -> Self {
        PvInverterError::DBus {
            message: message.into(),
        }
    }

    /// Create a new payload error for the given topic
    pub fn payload<T: Into<String>, S: Into<String>>(topic: T, message: S) -> Self {
        PvInverterError::Payload {
            topic: topic.into(),
            message: message.into(),
        }
    }

    /// Create a new validation error
    pub fn validation<S: Into<String>>(field: S, message: S) -> Self {
        PvInverterError::Validation {
            field: field.into(),
            message: message.into(),
        }
    }

    /// Create a new I/O error
    pub fn io<S: Into<String>>(message: S) -> Self {
        PvInverterError::Io {
            message: message.into(),
        }
    }

    /// Create a new timeout error
    pub fn timeout<S: Into<String>>(message: S) -> Self {
        PvInverterError::Timeout {
            message: message.into(),
        }
    }

    /// Create a new generic error
    pub fn generic<S: Into<String>>(message: S) -> Self {
        PvInverterError::Generic {
            message: message.into(),
        }
    }

    /// Whether the error came from the broker transport and warrants a reconnect
    pub fn is_connection_error(&self) -> bool {
        matches!(
            self,
            PvInverterError::Mqtt { .. } | PvInverterError::Timeout { .. }
        )
    }
}

impl From<std::io::Error> for PvInverterError {
    fn from(err: std::io::Error) -> Self {
        PvInverterError::io(err.to_string())
    }
}

impl From<serde_yaml::Error> for PvInverterError {
    fn from(err: serde_yaml::Error) -> Self {
        PvInverterError::Serialization {
            message: err.to_string(),
        }
    }
}

impl From<rumqttc::ConnectionError> for PvInverterError {
    fn from(err: rumqttc::ConnectionError) -> Self {
        PvInverterError::mqtt(err.to_string())
    }
}

impl From<rumqttc::ClientError> for PvInverterError {
    fn from(err: rumqttc::ClientError) -> Self {
        PvInverterError::mqtt(err.to_string())
    }
}

impl From<zbus::Error> for PvInverterError {
    fn from(err: zbus::Error) -> Self {
        PvInverterError::dbus(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_creation() {
        let err = PvInverterError::config("test config error");
        assert!(matches!(err, PvInverterError::Config { .. }));

        let err = PvInverterError::mqtt("test mqtt error");
        assert!(matches!(err, PvInverterError::Mqtt { .. }));

        let err = PvInverterError::validation("field", "test validation error");
        assert!(matches!(err, PvInverterError::Validation { .. }));
    }

    #[test]
    fn test_error_display() {
        let err = PvInverterError::config("test error");
        assert_eq!(format!("{}", err), "Configuration error: test error");

        let err = PvInverterError::payload("pv/l1", "not a number");
        assert_eq!(format!("{}", err), "Payload error on pv/l1: not a number");

        let err = PvInverterError::ReconnectExhausted { attempts: 12 };
        assert_eq!(format!("{}", err), "Reconnect failed after 12 attempts");
    }

    #[test]
    fn connection_errors_are_classified() {
        assert!(PvInverterError::mqtt("closed").is_connection_error());
        assert!(PvInverterError::timeout("connack").is_connection_error());
        assert!(!PvInverterError::dbus("x").is_connection_error());
        assert!(!PvInverterError::payload("t", "x").is_connection_error());
    }
}
