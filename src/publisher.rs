//! Periodic publication of cached telemetry onto the device bus
//!
//! On every tick the scheduler copies the [`ValueCache`], derives current from
//! power at the nominal voltage and writes the per-phase and total values,
//! then bumps the `/UpdateIndex` revision. A failed tick is logged and
//! skipped; the timer keeps running.

use serde_json::json;
use tokio::sync::watch;
use tokio::time::{Duration, Instant, MissedTickBehavior, interval, interval_at};

use crate::cache::ValueCache;
use crate::config::{Config, MAX_SIGN_OF_LIFE_MINUTES};
use crate::dbus::DeviceBus;
use crate::error::Result;
use crate::logging::{StructuredLogger, get_logger};
use crate::mqtt::BrokerHealth;
use crate::phase::DeviceSnapshot;

pub const UPDATE_INDEX_PATH: &str = "/UpdateIndex";
pub const CONNECTED_PATH: &str = "/Connected";
pub const TOTAL_POWER_PATH: &str = "/Ac/Power";
pub const TOTAL_CURRENT_PATH: &str = "/Ac/Current";

/// Writes cache snapshots to a [`DeviceBus`] at a fixed cadence
pub struct PublishScheduler<B: DeviceBus> {
    cache: ValueCache,
    bus: B,
    health: watch::Receiver<BrokerHealth>,
    nominal_voltage: f64,
    interval: Duration,
    sign_of_life: Duration,
    revision: u8,
    ticks: u64,
    failed_ticks: u64,
    connected_flag: Option<u8>,
    logger: StructuredLogger,
}

impl<B: DeviceBus> PublishScheduler<B> {
    pub fn new(cache: ValueCache, bus: B, health: watch::Receiver<BrokerHealth>) -> Self {
        let defaults = Config::default();
        Self {
            cache,
            bus,
            health,
            nominal_voltage: defaults.publish.nominal_voltage,
            interval: Duration::from_millis(defaults.publish.interval_ms),
            sign_of_life: minutes(defaults.sign_of_life_minutes),
            revision: 0,
            ticks: 0,
            failed_ticks: 0,
            connected_flag: None,
            logger: get_logger("publisher"),
        }
    }

    pub fn from_config(
        config: &Config,
        cache: ValueCache,
        bus: B,
        health: watch::Receiver<BrokerHealth>,
    ) -> Self {
        Self::new(cache, bus, health)
            .with_nominal_voltage(config.publish.nominal_voltage)
            .with_interval(Duration::from_millis(config.publish.interval_ms))
            .with_sign_of_life(minutes(config.sign_of_life_minutes))
    }

    pub fn with_nominal_voltage(mut self, volts: f64) -> Self {
        self.nominal_voltage = volts;
        self
    }

    pub fn with_interval(mut self, interval: Duration) -> Self {
        self.interval = interval;
        self
    }

    /// Heartbeat period, kept between one second and one day
    pub fn with_sign_of_life(mut self, period: Duration) -> Self {
        self.sign_of_life = period.clamp(
            Duration::from_secs(1),
            minutes(MAX_SIGN_OF_LIFE_MINUTES),
        );
        self
    }

    pub fn with_logger(mut self, logger: StructuredLogger) -> Self {
        self.logger = logger;
        self
    }

    /// Revision last written to `/UpdateIndex`
    pub fn revision(&self) -> u8 {
        self.revision
    }

    pub fn ticks(&self) -> u64 {
        self.ticks
    }

    pub fn failed_ticks(&self) -> u64 {
        self.failed_ticks
    }

    pub fn bus(&self) -> &B {
        &self.bus
    }

    pub fn bus_mut(&mut self) -> &mut B {
        &mut self.bus
    }

    pub fn into_bus(self) -> B {
        self.bus
    }

    /// Publish one snapshot; the revision only advances if every write succeeded
    pub async fn tick(&mut self) -> Result<u8> {
        let snapshot = self.cache.read_all();
        let mut total_power = 0.0;
        let mut total_current = 0.0;

        for reading in snapshot.readings() {
            let derived = DeviceSnapshot::derive(reading, self.nominal_voltage);
            let prefix = derived.phase.dbus_prefix();
            self.bus
                .set_value(&format!("{prefix}/Voltage"), json!(derived.voltage))
                .await?;
            self.bus
                .set_value(&format!("{prefix}/Current"), json!(derived.current))
                .await?;
            self.bus
                .set_value(&format!("{prefix}/Power"), json!(derived.power))
                .await?;
            total_power += derived.power;
            total_current += derived.current;
        }

        self.bus
            .set_value(TOTAL_POWER_PATH, json!(total_power))
            .await?;
        self.bus
            .set_value(TOTAL_CURRENT_PATH, json!(total_current))
            .await?;

        let next = self.revision.wrapping_add(1);
        self.bus.set_value(UPDATE_INDEX_PATH, json!(next)).await?;
        self.revision = next;
        self.ticks += 1;
        Ok(next)
    }

    /// Mirror broker health onto `/Connected`, writing only on change
    pub async fn sync_connected(&mut self) -> Result<()> {
        let health = *self.health.borrow();
        let flag = health.connected_flag();
        if self.connected_flag == Some(flag) {
            return Ok(());
        }
        self.bus.set_value(CONNECTED_PATH, json!(flag)).await?;
        if flag == 0 {
            self.logger
                .warn("Broker unreachable, published values are stale (/Connected=0)");
        } else if self.connected_flag.is_some() {
            self.logger.info("Broker path healthy again (/Connected=1)");
        }
        self.connected_flag = Some(flag);
        Ok(())
    }

    /// Heartbeat line with tick count and current readings
    pub fn sign_of_life(&self) -> String {
        let snapshot = self.cache.read_all();
        let last = snapshot
            .last_update
            .map(|t| t.to_rfc3339())
            .unwrap_or_else(|| "never".to_string());
        let phases = snapshot
            .readings()
            .iter()
            .map(|r| format!("{}={:.1}W", r.phase, r.power_w))
            .collect::<Vec<_>>()
            .join(" ");
        format!(
            "--- sign of life: {} ticks ({} failed), revision {}, {} readings, last reading {}, {}",
            self.ticks, self.failed_ticks, self.revision, snapshot.accepted, last, phases
        )
    }

    /// Tick until shutdown is signalled
    pub async fn run(&mut self, mut shutdown: watch::Receiver<bool>) -> Result<()> {
        self.logger.info(&format!(
            "Publishing every {} ms at {:.1} V nominal",
            self.interval.as_millis(),
            self.nominal_voltage
        ));

        let mut publish = interval(self.interval);
        publish.set_missed_tick_behavior(MissedTickBehavior::Skip);
        let first_beat = Instant::now()
            .checked_add(self.sign_of_life)
            .unwrap_or_else(Instant::now);
        let mut heartbeat = interval_at(first_beat, self.sign_of_life);

        loop {
            if *shutdown.borrow() {
                break;
            }
            tokio::select! {
                _ = publish.tick() => {
                    if let Err(e) = self.sync_connected().await {
                        self.logger.error(&format!("Failed to publish /Connected: {}", e));
                    }
                    if let Err(e) = self.tick().await {
                        self.failed_ticks += 1;
                        self.logger.error(&format!("Publish tick failed: {}", e));
                    }
                }
                _ = heartbeat.tick() => {
                    self.logger.info(&self.sign_of_life());
                }
                _ = shutdown.changed() => {
                    self.logger.info("Shutdown signal received");
                    break;
                }
            }
        }

        self.logger.info(&format!(
            "Publisher stopped after {} ticks ({} failed)",
            self.ticks, self.failed_ticks
        ));
        Ok(())
    }
}

fn minutes(count: u64) -> Duration {
    Duration::from_secs(count.saturating_mul(60))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::PvInverterError;
    use crate::phase::Phase;
    use std::collections::HashMap;

    #[derive(Default)]
    struct MockBus {
        values: HashMap<String, serde_json::Value>,
        writes: Vec<String>,
        fail_on: Option<String>,
    }

    #[async_trait::async_trait]
    impl DeviceBus for MockBus {
        async fn set_value(&mut self, path: &str, value: serde_json::Value) -> Result<()> {
            if self.fail_on.as_deref() == Some(path) {
                return Err(PvInverterError::dbus(format!("write to {} refused", path)));
            }
            self.writes.push(path.to_string());
            self.values.insert(path.to_string(), value);
            Ok(())
        }

        fn get_value(&self, path: &str) -> Option<serde_json::Value> {
            self.values.get(path).cloned()
        }
    }

    fn scheduler(cache: ValueCache) -> (PublishScheduler<MockBus>, watch::Sender<BrokerHealth>) {
        let (tx, rx) = watch::channel(BrokerHealth::Connected);
        (PublishScheduler::new(cache, MockBus::default(), rx), tx)
    }

    #[tokio::test]
    async fn revision_wraps_after_256_ticks() {
        let (mut sched, _tx) = scheduler(ValueCache::new());
        for _ in 0..300 {
            sched.tick().await.unwrap();
        }
        assert_eq!(sched.revision(), (300 % 256) as u8);
        assert_eq!(sched.bus().get_value(UPDATE_INDEX_PATH), Some(json!(44)));
    }

    #[tokio::test]
    async fn derives_current_and_totals() {
        let cache = ValueCache::new();
        cache.set_phase(Phase::L1, 460.0);
        cache.set_phase(Phase::L3, 230.0);
        let (mut sched, _tx) = scheduler(cache);

        assert_eq!(sched.tick().await.unwrap(), 1);
        let bus = sched.bus();
        assert_eq!(bus.get_value("/Ac/L1/Current"), Some(json!(2.0)));
        assert_eq!(bus.get_value("/Ac/L1/Voltage"), Some(json!(230.0)));
        assert_eq!(bus.get_value("/Ac/L2/Power"), Some(json!(0.0)));
        assert_eq!(bus.get_value(TOTAL_POWER_PATH), Some(json!(690.0)));
        assert_eq!(bus.get_value(TOTAL_CURRENT_PATH), Some(json!(3.0)));
    }

    #[tokio::test]
    async fn failing_phase_skips_revision_but_keeps_earlier_writes() {
        let cache = ValueCache::new();
        cache.set_phase(Phase::L1, 1150.0);
        let (mut sched, _tx) = scheduler(cache);
        sched.bus_mut().fail_on = Some("/Ac/L2/Voltage".to_string());

        assert!(sched.tick().await.is_err());
        assert_eq!(sched.revision(), 0);
        assert_eq!(sched.bus().get_value("/Ac/L1/Power"), Some(json!(1150.0)));
        assert_eq!(sched.bus().get_value(UPDATE_INDEX_PATH), None);

        sched.bus_mut().fail_on = None;
        assert_eq!(sched.tick().await.unwrap(), 1);
    }

    #[tokio::test]
    async fn connected_flag_written_only_on_change() {
        let (mut sched, tx) = scheduler(ValueCache::new());
        sched.sync_connected().await.unwrap();
        sched.sync_connected().await.unwrap();
        tx.send_replace(BrokerHealth::Reconnecting { attempt: 2 });
        sched.sync_connected().await.unwrap();
        assert_eq!(
            sched.bus().writes.iter().filter(|p| *p == CONNECTED_PATH).count(),
            1
        );

        tx.send_replace(BrokerHealth::GivenUp);
        sched.sync_connected().await.unwrap();
        assert_eq!(sched.bus().get_value(CONNECTED_PATH), Some(json!(0)));
    }

    #[tokio::test]
    async fn run_keeps_ticking_through_failures_until_shutdown() {
        let (_health_tx, health_rx) = watch::channel(BrokerHealth::Connected);
        let bus = MockBus {
            fail_on: Some("/Ac/L2/Power".to_string()),
            ..Default::default()
        };
        let mut sched = PublishScheduler::new(ValueCache::new(), bus, health_rx)
            .with_interval(Duration::from_millis(5));
        let (stop_tx, stop_rx) = watch::channel(false);

        let handle = tokio::spawn(async move {
            sched.run(stop_rx).await.unwrap();
            sched
        });
        tokio::time::sleep(Duration::from_millis(60)).await;
        stop_tx.send(true).unwrap();
        let sched = handle.await.unwrap();

        assert!(sched.failed_ticks() >= 2);
        assert_eq!(sched.revision(), 0);
        assert_eq!(sched.bus().get_value("/Ac/L1/Power"), Some(json!(0.0)));
    }

    #[tokio::test]
    async fn oversized_sign_of_life_is_clamped() {
        let mut config = Config::default();
        config.sign_of_life_minutes = u64::MAX / 30;
        let (health_tx, health_rx) = watch::channel(BrokerHealth::Connected);
        let mut sched = PublishScheduler::from_config(
            &config,
            ValueCache::new(),
            MockBus::default(),
            health_rx,
        )
        .with_interval(Duration::from_millis(5));
        assert_eq!(sched.sign_of_life, Duration::from_secs(24 * 60 * 60));

        let zero = PublishScheduler::new(
            ValueCache::new(),
            MockBus::default(),
            health_tx.subscribe(),
        )
        .with_sign_of_life(Duration::ZERO);
        assert_eq!(zero.sign_of_life, Duration::from_secs(1));

        let (stop_tx, stop_rx) = watch::channel(false);
        let handle = tokio::spawn(async move {
            sched.run(stop_rx).await.unwrap();
            sched
        });
        tokio::time::sleep(Duration::from_millis(30)).await;
        stop_tx.send(true).unwrap();
        let sched = handle.await.unwrap();
        assert!(sched.revision() > 0);
    }

    #[test]
    fn sign_of_life_mentions_phases() {
        let cache = ValueCache::new();
        cache.set_phase(Phase::L2, 12.5);
        let (sched, _tx) = scheduler(cache);
        let line = sched.sign_of_life();
        assert!(line.contains("L2=12.5W"));
        assert!(line.contains("revision 0"));
    }
}
