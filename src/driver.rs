//! Process orchestration for the PV inverter bridge
//!
//! The driver owns the configuration, brings up the device bus and spawns
//! the two long-running tasks: the broker connection feeding the
//! [`ValueCache`] and the [`PublishScheduler`] draining it. Both observe the
//! same shutdown flag, which is raised by Ctrl+C, SIGTERM or
//! [`PvInverterDriver::shutdown_handle`].

use tokio::sync::watch;
use tokio::task::{JoinError, JoinHandle};
use tokio::time::{Duration, timeout};

use crate::cache::ValueCache;
use crate::config::Config;
use crate::dbus::{DbusService, DeviceBus, register_pvinverter};
use crate::error::{PvInverterError, Result};
use crate::logging::{LogContext, StructuredLogger, get_logger_with_context};
use crate::mqtt::{
    BrokerConnection, BrokerHealth, BrokerTransport, DeliveryStats, ReconnectPolicy,
    RumqttTransport, TopicRouter,
};
use crate::publisher::PublishScheduler;

/// How long each task gets to wind down after shutdown is raised
const TASK_JOIN_TIMEOUT: Duration = Duration::from_secs(5);

/// Lifecycle of the driver
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DriverState {
    Initializing,
    Running,
    ShuttingDown,
    Stopped,
}

/// What the tasks reported when they ended
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RunSummary {
    /// `None` if the broker task gave up or did not finish in time
    pub delivery: Option<DeliveryStats>,
    pub ticks: u64,
    pub failed_ticks: u64,
    pub revision: u8,
}

pub struct PvInverterDriver {
    config: Config,
    cache: ValueCache,
    state: watch::Sender<DriverState>,
    shutdown_tx: watch::Sender<bool>,
    logger: StructuredLogger,
}

impl PvInverterDriver {
    /// Build a driver around an already validated configuration
    pub fn new(config: Config) -> Self {
        let logger = get_logger_with_context(
            LogContext::new("driver").with_device_instance(config.device_instance),
        );
        let (state, _) = watch::channel(DriverState::Initializing);
        let (shutdown_tx, _) = watch::channel(false);
        Self {
            config,
            cache: ValueCache::new(),
            state,
            shutdown_tx,
            logger,
        }
    }

    /// Load and validate configuration, then initialise logging
    pub fn from_environment() -> Result<Self> {
        let config = Config::load().map_err(|e| {
            eprintln!("Failed to load configuration: {}", e);
            e
        })?;
        config.validate()?;
        crate::logging::init_logging(&config.logging)?;
        Ok(Self::new(config))
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn cache(&self) -> &ValueCache {
        &self.cache
    }

    pub fn subscribe_state(&self) -> watch::Receiver<DriverState> {
        self.state.subscribe()
    }

    /// Sender that stops the driver when `true` is sent
    pub fn shutdown_handle(&self) -> watch::Sender<bool> {
        self.shutdown_tx.clone()
    }

    /// Register all inverter paths and claim the service name
    pub async fn start_dbus(&self) -> Result<DbusService> {
        let mut dbus = DbusService::new(self.config.device_instance)?;
        let count = register_pvinverter(&mut dbus, &self.config).await?;
        self.logger
            .debug(&format!("Registered {} paths on {}", count, dbus.service_name()));

        match dbus.start().await {
            Ok(()) => {}
            Err(e) if self.config.require_dbus => {
                self.logger.error(&format!(
                    "Failed to initialize D-Bus and require_dbus=true: {}",
                    e
                ));
                return Err(e);
            }
            Err(e) => {
                self.logger.warn(&format!(
                    "D-Bus initialization failed but require_dbus=false, continuing without D-Bus: {}",
                    e
                ));
            }
        }
        Ok(dbus)
    }

    /// Run against the system bus and the configured broker until shutdown
    pub async fn run(self) -> Result<RunSummary> {
        self.logger.info(&format!(
            "Starting MQTT PV inverter bridge for {}:{}",
            self.config.mqtt.server, self.config.mqtt.port
        ));
        let dbus = self.start_dbus().await?;
        let transport = RumqttTransport::new(&self.config.mqtt);
        let (summary, mut dbus) = self.run_with(dbus, transport).await?;
        dbus.stop().await?;
        Ok(summary)
    }

    /// Run the broker and publish tasks over the given bus and transport
    pub async fn run_with<B, T>(self, bus: B, transport: T) -> Result<(RunSummary, B)>
    where
        B: DeviceBus + 'static,
        T: BrokerTransport + 'static,
    {
        let (health_tx, health_rx) = watch::channel(BrokerHealth::Connecting);

        let broker = BrokerConnection::new(
            transport,
            TopicRouter::from_config(&self.config.mqtt),
            self.cache.clone(),
            ReconnectPolicy::from_config(&self.config.reconnect),
            health_tx,
            get_logger_with_context(
                LogContext::new("mqtt").with_device_instance(self.config.device_instance),
            ),
        );
        let broker_logger = self.logger.clone();
        let broker_shutdown = self.shutdown_tx.subscribe();
        let mut broker_task = tokio::spawn(async move {
            match broker.run(broker_shutdown).await {
                Ok(stats) => Some(stats),
                Err(e) => {
                    broker_logger.error(&format!("Broker task ended: {}", e));
                    None
                }
            }
        });

        let mut scheduler =
            PublishScheduler::from_config(&self.config, self.cache.clone(), bus, health_rx)
                .with_logger(get_logger_with_context(
                    LogContext::new("publisher").with_device_instance(self.config.device_instance),
                ));
        let publish_shutdown = self.shutdown_tx.subscribe();
        let publisher_task = tokio::spawn(async move {
            let outcome = scheduler.run(publish_shutdown).await;
            (scheduler, outcome)
        });

        self.state.send_replace(DriverState::Running);

        tokio::select! {
            _ = shutdown_signal() => {}
            _ = stop_requested(self.shutdown_tx.subscribe()) => {
                self.logger.info("Shutdown requested");
            }
        }

        self.state.send_replace(DriverState::ShuttingDown);
        self.shutdown_tx.send_replace(true);

        let delivery = match join_or_abort(&mut broker_task, TASK_JOIN_TIMEOUT).await {
            Some(Ok(stats)) => stats,
            Some(Err(e)) => {
                self.logger.error(&format!("Broker task panicked: {}", e));
                None
            }
            None => {
                self.logger.warn("Broker task did not stop in time, aborted");
                None
            }
        };

        let (scheduler, outcome) = publisher_task
            .await
            .map_err(|e| PvInverterError::generic(format!("Publisher task failed: {}", e)))?;
        outcome?;

        let summary = RunSummary {
            delivery,
            ticks: scheduler.ticks(),
            failed_ticks: scheduler.failed_ticks(),
            revision: scheduler.revision(),
        };
        self.logger.info(&format!("Driver stopped: {:?}", summary));
        self.state.send_replace(DriverState::Stopped);
        Ok((summary, scheduler.into_bus()))
    }
}

/// Join `handle` within `limit`, aborting the task if it overruns
async fn join_or_abort<T>(
    handle: &mut JoinHandle<T>,
    limit: Duration,
) -> Option<std::result::Result<T, JoinError>> {
    match timeout(limit, &mut *handle).await {
        Ok(joined) => Some(joined),
        Err(_) => {
            handle.abort();
            None
        }
    }
}

async fn stop_requested(mut rx: watch::Receiver<bool>) {
    loop {
        if *rx.borrow_and_update() {
            return;
        }
        if rx.changed().await.is_err() {
            return;
        }
    }
}

/// Wait for Ctrl+C or SIGTERM
pub async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!("Failed to install Ctrl+C handler: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut sig) => {
                sig.recv().await;
            }
            Err(e) => {
                tracing::error!("Failed to install SIGTERM handler: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            tracing::info!("Received Ctrl+C, starting graceful shutdown");
        }
        _ = terminate => {
            tracing::info!("Received SIGTERM, starting graceful shutdown");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn start_dbus_registers_paths_without_bus_when_optional() {
        let mut config = Config::default();
        config.require_dbus = false;
        config.device_instance = 9;
        let driver = PvInverterDriver::new(config);

        // Whether or not a bus is reachable here, the path table is populated
        let dbus = driver.start_dbus().await.unwrap();
        assert_eq!(dbus.service_name(), "com.victronenergy.pvinverter.mqtt_09");
        assert_eq!(dbus.get_value("/DeviceInstance"), Some(serde_json::json!(9)));
        assert_eq!(*driver.subscribe_state().borrow(), DriverState::Initializing);
    }

    #[tokio::test]
    async fn stuck_task_is_aborted_after_join_timeout() {
        let mut stuck = tokio::spawn(std::future::pending::<()>());
        assert!(
            join_or_abort(&mut stuck, Duration::from_millis(10))
                .await
                .is_none()
        );
        let err = stuck.await.unwrap_err();
        assert!(err.is_cancelled());

        let mut quick = tokio::spawn(async { 7 });
        let joined = join_or_abort(&mut quick, Duration::from_secs(1)).await;
        assert_eq!(joined.unwrap().unwrap(), 7);
    }
}
