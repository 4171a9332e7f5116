use tokio::sync::watch;

use crate::cache::ValueCache;
use crate::error::{PvInverterError, Result};
use crate::logging::StructuredLogger;

use super::reconnect::{ReconnectPhase, ReconnectPolicy};
use super::router::TopicRouter;
use super::transport::{BrokerTransport, InboundMessage};
use super::BrokerHealth;

/// Counters kept by the broker task
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DeliveryStats {
    pub accepted: u64,
    pub rejected: u64,
    pub ignored: u64,
    pub reconnects: u64,
}

enum Reconnected {
    Yes,
    Shutdown,
}

/// Holds the broker session and feeds telemetry into the cache
pub struct BrokerConnection<T: BrokerTransport> {
    transport: T,
    router: TopicRouter,
    cache: ValueCache,
    policy: ReconnectPolicy,
    health: watch::Sender<BrokerHealth>,
    stats: DeliveryStats,
    logger: StructuredLogger,
}

impl<T: BrokerTransport> BrokerConnection<T> {
    pub fn new(
        transport: T,
        router: TopicRouter,
        cache: ValueCache,
        policy: ReconnectPolicy,
        health: watch::Sender<BrokerHealth>,
        logger: StructuredLogger,
    ) -> Self {
        Self {
            transport,
            router,
            cache,
            policy,
            health,
            stats: DeliveryStats::default(),
            logger,
        }
    }

    pub fn stats(&self) -> DeliveryStats {
        self.stats
    }

    pub fn policy(&self) -> &ReconnectPolicy {
        &self.policy
    }

    fn set_health(&self, health: BrokerHealth) {
        self.health.send_replace(health);
    }

    /// Apply one inbound message to the cache
    pub fn handle_message(&mut self, message: &InboundMessage) {
        match self.router.route(&message.topic, &message.payload) {
            Ok(Some(reading)) => {
                self.cache.set_reading(reading);
                self.stats.accepted += 1;
                self.logger.trace(&format!(
                    "{} <- {} W ({})",
                    reading.phase, reading.power_w, message.topic
                ));
            }
            Ok(None) => {
                self.stats.ignored += 1;
                self.logger
                    .trace(&format!("Ignoring message on '{}'", message.topic));
            }
            Err(e) => {
                self.stats.rejected += 1;
                self.logger.warn(&format!("Rejected telemetry: {}", e));
            }
        }
    }

    /// Run until shutdown or until reconnect attempts are exhausted
    pub async fn run(mut self, mut shutdown: watch::Receiver<bool>) -> Result<DeliveryStats> {
        self.set_health(BrokerHealth::Connecting);
        let connected = tokio::select! {
            res = self.transport.connect() => res,
            _ = shutdown.changed() => return self.finish().await,
        };

        match connected {
            Ok(()) => self.set_health(BrokerHealth::Connected),
            Err(e) => {
                self.logger.error(&format!(
                    "Initial connect to {} failed: {}",
                    self.transport.describe(),
                    e
                ));
                if let Reconnected::Shutdown = self.reconnect(&mut shutdown).await? {
                    return self.finish().await;
                }
            }
        }

        loop {
            if *shutdown.borrow() {
                return self.finish().await;
            }
            tokio::select! {
                event = self.transport.next_message() => match event {
                    Ok(Some(message)) => self.handle_message(&message),
                    Ok(None) => {}
                    Err(e) if !e.is_connection_error() => {
                        self.stats.rejected += 1;
                        self.logger.warn(&format!("Dropped inbound event: {}", e));
                    }
                    Err(e) => {
                        self.logger.warn(&format!(
                            "Disconnected from {}: {}",
                            self.transport.describe(),
                            e
                        ));
                        if let Reconnected::Shutdown = self.reconnect(&mut shutdown).await? {
                            return self.finish().await;
                        }
                    }
                },
                _ = shutdown.changed() => return self.finish().await,
            }
        }
    }

    async fn reconnect(&mut self, shutdown: &mut watch::Receiver<bool>) -> Result<Reconnected> {
        self.policy.on_disconnect();

        while let Some(delay) = self.policy.next_delay() {
            let attempt = self.policy.attempts() + 1;
            self.set_health(BrokerHealth::Reconnecting { attempt });
            self.logger.info(&format!(
                "Reconnecting in {:.1} seconds (attempt {}/{})",
                delay.as_secs_f64(),
                attempt,
                self.policy.max_attempts()
            ));

            tokio::select! {
                _ = tokio::time::sleep(delay) => {}
                _ = shutdown.changed() => return Ok(Reconnected::Shutdown),
            }

            let outcome = tokio::select! {
                res = self.transport.reconnect() => res,
                _ = shutdown.changed() => return Ok(Reconnected::Shutdown),
            };

            match outcome {
                Ok(()) => {
                    self.policy.record_success();
                    self.stats.reconnects += 1;
                    self.set_health(BrokerHealth::Connected);
                    self.logger.info("Reconnected successfully");
                    return Ok(Reconnected::Yes);
                }
                Err(e) => {
                    self.logger
                        .error(&format!("{}. Reconnect failed. Retrying...", e));
                    if self.policy.record_failure() == ReconnectPhase::GivenUp {
                        break;
                    }
                }
            }
        }

        let attempts = self.policy.attempts();
        self.set_health(BrokerHealth::GivenUp);
        self.logger.error(&format!(
            "Reconnect failed after {} attempts; telemetry from {} will no longer update",
            attempts,
            self.transport.describe()
        ));
        Err(PvInverterError::ReconnectExhausted { attempts })
    }

    async fn finish(mut self) -> Result<DeliveryStats> {
        self.logger.info("MQTT connection shutting down");
        if let Err(e) = self.transport.disconnect().await {
            self.logger.debug(&format!("Disconnect failed: {}", e));
        }
        self.set_health(BrokerHealth::Stopped);
        Ok(self.stats)
    }
}
