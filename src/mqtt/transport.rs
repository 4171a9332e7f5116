use std::time::Duration;

use rumqttc::{AsyncClient, Event, EventLoop, MqttOptions, Packet, QoS};
use tokio::time::timeout;

use crate::config::MqttConfig;
use crate::error::{PvInverterError, Result};
use crate::logging::get_logger;

/// A publish received from the broker
#[derive(Debug, Clone, PartialEq)]
pub struct InboundMessage {
    pub topic: String,
    pub payload: Vec<u8>,
}

impl InboundMessage {
    pub fn new(topic: impl Into<String>, payload: impl Into<Vec<u8>>) -> Self {
        Self {
            topic: topic.into(),
            payload: payload.into(),
        }
    }
}

/// The broker primitives the bridge relies on
#[async_trait::async_trait]
pub trait BrokerTransport: Send {
    /// Establish the session and subscribe to the base topic
    async fn connect(&mut self) -> Result<()>;

    /// Re-establish a dropped session and resubscribe
    async fn reconnect(&mut self) -> Result<()> {
        self.connect().await
    }

    /// Wait for the next transport event.
    ///
    /// `Ok(None)` for events that carry no telemetry (acks, pings), `Err`
    /// when the connection dropped.
    async fn next_message(&mut self) -> Result<Option<InboundMessage>>;

    /// Best-effort clean disconnect on shutdown
    async fn disconnect(&mut self) -> Result<()>;

    /// Human readable broker address for logs
    fn describe(&self) -> String;
}

/// rumqttc-backed transport
pub struct RumqttTransport {
    client: AsyncClient,
    eventloop: EventLoop,
    topic_base: String,
    address: String,
    connect_timeout: Duration,
    logger: crate::logging::StructuredLogger,
}

impl RumqttTransport {
    pub fn new(config: &MqttConfig) -> Self {
        let logger = get_logger("mqtt");
        let client_id = config.effective_client_id();
        let mut options = MqttOptions::new(&client_id, &config.server, config.port);
        options.set_keep_alive(Duration::from_secs(config.keep_alive_secs.max(5)));
        options.set_clean_session(true);
        if let (Some(user), Some(pass)) = (&config.username, &config.password) {
            options.set_credentials(user, pass);
        }

        let (client, eventloop) = AsyncClient::new(options, 10);
        logger.debug(&format!(
            "MQTT client '{}' prepared for {}:{}",
            client_id, config.server, config.port
        ));

        Self {
            client,
            eventloop,
            topic_base: config.topic_base.clone(),
            address: format!("{}:{}", config.server, config.port),
            connect_timeout: Duration::from_secs(config.connect_timeout_secs.max(1)),
            logger,
        }
    }

    /// Poll until the broker acknowledges the session.
    ///
    /// rumqttc opens a new network connection on the first poll after an
    /// error, so this serves for both the initial connect and reconnects.
    async fn await_connack(&mut self) -> Result<()> {
        let eventloop = &mut self.eventloop;
        let logger = &self.logger;
        let wait = async move {
            loop {
                match eventloop.poll().await? {
                    Event::Incoming(Packet::ConnAck(ack)) => {
                        return Ok::<_, PvInverterError>(ack.code);
                    }
                    other => {
                        logger.trace(&format!("Ignoring event before CONNACK: {:?}", other));
                    }
                }
            }
        };
        let code = match timeout(self.connect_timeout, wait).await {
            Ok(result) => result?,
            Err(_) => {
                return Err(PvInverterError::timeout(format!(
                    "No CONNACK from {}",
                    self.address
                )));
            }
        };

        if code != rumqttc::ConnectReturnCode::Success {
            return Err(PvInverterError::mqtt(format!(
                "Broker {} refused connection: {:?}",
                self.address, code
            )));
        }

        // Clean sessions lose their subscriptions, so subscribe on every connect
        self.client.try_subscribe(&self.topic_base, QoS::AtMostOnce)?;
        self.logger.info(&format!(
            "Connected to MQTT broker {}, subscribed to '{}'",
            self.address, self.topic_base
        ));
        Ok(())
    }
}

#[async_trait::async_trait]
impl BrokerTransport for RumqttTransport {
    async fn connect(&mut self) -> Result<()> {
        self.logger
            .info(&format!("Connecting to MQTT broker at {}", self.address));
        self.await_connack().await
    }

    async fn reconnect(&mut self) -> Result<()> {
        self.await_connack().await
    }

    async fn next_message(&mut self) -> Result<Option<InboundMessage>> {
        match self.eventloop.poll().await? {
            Event::Incoming(Packet::Publish(publish)) => Ok(Some(InboundMessage {
                topic: publish.topic,
                payload: publish.payload.to_vec(),
            })),
            Event::Incoming(Packet::Disconnect) => {
                Err(PvInverterError::mqtt("Broker sent DISCONNECT"))
            }
            _ => Ok(None),
        }
    }

    async fn disconnect(&mut self) -> Result<()> {
        self.client.try_disconnect()?;
        // Flush the DISCONNECT packet; errors here only mean the socket is already gone
        let _ = timeout(Duration::from_millis(500), self.eventloop.poll()).await;
        Ok(())
    }

    fn describe(&self) -> String {
        self.address.clone()
    }
}
