//! D-Bus integration for Venus OS compatibility
//!
//! Exposes the bridged inverter as a `com.victronenergy.pvinverter` service
//! built from VeDbus-style `BusItem` objects. The publish loop only sees the
//! [`DeviceBus`] trait so it can run against an in-memory bus in tests.

mod items;
mod pvinverter;
mod root;
mod service;
mod shared;
mod util;

use std::sync::{Arc, Mutex, MutexGuard};

use crate::error::Result;

pub use items::BusItem;
pub use pvinverter::{DeviceIdentity, PathDef, data_paths, register_pvinverter};
pub use root::{RootBus, TreeNode};
pub use service::{DbusService, PVINVERTER_SERVICE_PREFIX};
pub use shared::DbusSharedState;
pub use util::TextFormat;

/// Write side of the device bus as used by the publish loop
#[async_trait::async_trait]
pub trait DeviceBus: Send {
    /// Publish `value` on an already registered path
    async fn set_value(&mut self, path: &str, value: serde_json::Value) -> Result<()>;

    /// Last value published on `path`
    fn get_value(&self, path: &str) -> Option<serde_json::Value>;
}

/// Lock the shared path map, recovering the data if a holder panicked
pub(crate) fn lock_shared(
    shared: &Arc<Mutex<DbusSharedState>>,
) -> MutexGuard<'_, DbusSharedState> {
    shared.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}
