//! MQTT side of the bridge
//!
//! Subscribes to the telemetry topics, parses per-phase power readings into
//! the [`ValueCache`](crate::cache::ValueCache) and keeps the session alive
//! with an exponential backoff reconnect policy.

mod connection;
mod reconnect;
mod router;
mod transport;

pub use connection::{BrokerConnection, DeliveryStats};
pub use reconnect::{ReconnectPhase, ReconnectPolicy};
pub use router::{TopicRouter, parse_power_payload};
pub use transport::{BrokerTransport, InboundMessage, RumqttTransport};

/// Broker health as seen by the rest of the process
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BrokerHealth {
    Connecting,
    Connected,
    Reconnecting { attempt: u32 },
    /// Reconnect attempts exhausted; cached values are stale from here on
    GivenUp,
    Stopped,
}

impl BrokerHealth {
    /// Value exported on `/Connected`
    pub fn connected_flag(self) -> u8 {
        match self {
            BrokerHealth::GivenUp => 0,
            _ => 1,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn only_given_up_clears_connected_flag() {
        assert_eq!(BrokerHealth::Connecting.connected_flag(), 1);
        assert_eq!(BrokerHealth::Connected.connected_flag(), 1);
        assert_eq!(BrokerHealth::Reconnecting { attempt: 3 }.connected_flag(), 1);
        assert_eq!(BrokerHealth::Stopped.connected_flag(), 1);
        assert_eq!(BrokerHealth::GivenUp.connected_flag(), 0);
    }
}
