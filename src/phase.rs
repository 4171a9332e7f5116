//! Electrical phases and the readings reported for them

use serde::{Deserialize, Serialize};
use std::fmt;

/// One of the three AC lines
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Phase {
    L1,
    L2,
    L3,
}

impl Phase {
    /// All phases in publish order
    pub const ALL: [Phase; 3] = [Phase::L1, Phase::L2, Phase::L3];

    pub fn index(self) -> usize {
        match self {
            Phase::L1 => 0,
            Phase::L2 => 1,
            Phase::L3 => 2,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Phase::L1 => "L1",
            Phase::L2 => "L2",
            Phase::L3 => "L3",
        }
    }

    /// D-Bus path prefix for this phase, e.g. `/Ac/L1`
    pub fn dbus_prefix(self) -> String {
        format!("/Ac/{}", self.as_str())
    }
}

impl fmt::Display for Phase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Latest power reported for a phase
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PhaseReading {
    pub phase: Phase,
    /// Instantaneous power in watts
    pub power_w: f64,
}

impl PhaseReading {
    pub fn new(phase: Phase, power_w: f64) -> Self {
        Self { phase, power_w }
    }
}

/// Values derived for one phase on a publish tick
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DeviceSnapshot {
    pub phase: Phase,
    pub voltage: f64,
    pub current: f64,
    pub power: f64,
}

impl DeviceSnapshot {
    /// Derive current from power at a fixed nominal voltage
    pub fn derive(reading: PhaseReading, nominal_voltage: f64) -> Self {
        Self {
            phase: reading.phase,
            voltage: nominal_voltage,
            current: reading.power_w / nominal_voltage,
            power: reading.power_w,
        }
    }
}
