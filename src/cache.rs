//! Latest per-phase power readings
//!
//! The broker task writes into the cache whenever a telemetry message
//! arrives; the publish task copies all three phases out on every tick.
//! Both sides take the same mutex, so a snapshot never mixes a phase
//! value with a half-applied update.

use chrono::{DateTime, Utc};
use std::sync::{Arc, Mutex, MutexGuard};

use crate::phase::{Phase, PhaseReading};

#[derive(Debug, Default)]
struct CacheState {
    power: [Option<f64>; 3],
    last_update: Option<DateTime<Utc>>,
    accepted: u64,
}

/// Consistent copy of all three phases
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PhaseSnapshot {
    power: [Option<f64>; 3],
    pub last_update: Option<DateTime<Utc>>,
    pub accepted: u64,
}

impl PhaseSnapshot {
    /// Power for a phase; unset phases read as 0 W
    pub fn power(&self, phase: Phase) -> f64 {
        self.power[phase.index()].unwrap_or(0.0)
    }

    /// Whether a reading was ever received for the phase
    pub fn is_set(&self, phase: Phase) -> bool {
        self.power[phase.index()].is_some()
    }

    pub fn readings(&self) -> [PhaseReading; 3] {
        Phase::ALL.map(|p| PhaseReading::new(p, self.power(p)))
    }

    pub fn total_power(&self) -> f64 {
        Phase::ALL.iter().map(|p| self.power(*p)).sum()
    }
}

/// Shared register of the latest reading per phase
#[derive(Debug, Clone, Default)]
pub struct ValueCache {
    inner: Arc<Mutex<CacheState>>,
}

impl ValueCache {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, CacheState> {
        // Writers only ever store whole values, so a poisoned guard is still coherent
        self.inner
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
    }

    /// Overwrite the stored reading for a phase
    pub fn set_phase(&self, phase: Phase, power_w: f64) {
        let mut state = self.lock();
        state.power[phase.index()] = Some(power_w);
        state.last_update = Some(Utc::now());
        state.accepted = state.accepted.saturating_add(1);
    }

    pub fn set_reading(&self, reading: PhaseReading) {
        self.set_phase(reading.phase, reading.power_w);
    }

    /// Snapshot of all phases taken under a single lock
    pub fn read_all(&self) -> PhaseSnapshot {
        let state = self.lock();
        PhaseSnapshot {
            power: state.power,
            last_update: state.last_update,
            accepted: state.accepted,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unset_phases_read_as_zero() {
        let cache = ValueCache::new();
        let snap = cache.read_all();
        for phase in Phase::ALL {
            assert_eq!(snap.power(phase), 0.0);
            assert!(!snap.is_set(phase));
        }
        assert!(snap.last_update.is_none());
        assert_eq!(snap.accepted, 0);
    }

    #[test]
    fn set_phase_overwrites_only_that_phase() {
        let cache = ValueCache::new();
        cache.set_phase(Phase::L2, 500.0);
        cache.set_phase(Phase::L2, 750.5);
        let snap = cache.read_all();
        assert_eq!(snap.power(Phase::L1), 0.0);
        assert_eq!(snap.power(Phase::L2), 750.5);
        assert_eq!(snap.power(Phase::L3), 0.0);
        assert_eq!(snap.accepted, 2);
        assert!(snap.last_update.is_some());
        assert_eq!(snap.total_power(), 750.5);
    }

    #[test]
    fn clones_share_state() {
        let cache = ValueCache::new();
        let writer = cache.clone();
        writer.set_reading(PhaseReading::new(Phase::L3, 42.0));
        assert_eq!(cache.read_all().power(Phase::L3), 42.0);
    }

    #[test]
    fn concurrent_writes_never_tear_snapshots() {
        // Each writer stores values encoding its phase (phase*1e6 + seq),
        // so a reader can verify each slot only ever holds that phase's values.
        let cache = ValueCache::new();
        let mut handles = Vec::new();
        for phase in Phase::ALL {
            let writer = cache.clone();
            handles.push(std::thread::spawn(move || {
                let base = (phase.index() as f64 + 1.0) * 1_000_000.0;
                for seq in 0..2_000u32 {
                    writer.set_phase(phase, base + f64::from(seq));
                }
            }));
        }

        for _ in 0..2_000 {
            let snap = cache.read_all();
            for phase in Phase::ALL {
                if snap.is_set(phase) {
                    let base = (phase.index() as f64 + 1.0) * 1_000_000.0;
                    let seq = snap.power(phase) - base;
                    assert!((0.0..2_000.0).contains(&seq), "torn value for {}", phase);
                }
            }
        }

        for h in handles {
            h.join().unwrap();
        }
        let snap = cache.read_all();
        assert_eq!(snap.accepted, 6_000);
        assert_eq!(snap.power(Phase::L1), 1_000_000.0 + 1_999.0);
    }
}
