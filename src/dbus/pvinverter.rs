use serde_json::{Value, json};

use crate::config::Config;
use crate::error::Result;
use crate::phase::Phase;

use super::service::DbusService;
use super::util::TextFormat;

/// Product id reserved for generic third-party PV inverters
pub const PRODUCT_ID: u32 = 0xFFFF;

pub const PROCESS_NAME: &str = "mqtt-pvinverter";

/// One path exported by the inverter service
#[derive(Debug, Clone, PartialEq)]
pub struct PathDef {
    pub path: String,
    pub initial: Value,
    pub writable: bool,
    pub format: TextFormat,
}

impl PathDef {
    fn fixed(path: &str, initial: Value) -> Self {
        Self {
            path: path.to_string(),
            initial,
            writable: false,
            format: TextFormat::Plain,
        }
    }

    /// Energy counters are never measured and stay invalid, everything
    /// else starts at zero until the first tick
    fn data(path: String, format: TextFormat) -> Self {
        let initial = match format {
            TextFormat::KilowattHours => Value::Null,
            _ => json!(0),
        };
        Self {
            path,
            initial,
            writable: true,
            format,
        }
    }
}

/// Identity and management values derived from configuration
#[derive(Debug, Clone)]
pub struct DeviceIdentity {
    pub device_instance: u32,
    pub product_name: String,
    pub custom_name: String,
    pub serial: String,
    pub position: u8,
    pub connection: String,
    pub process_version: String,
}

impl DeviceIdentity {
    pub fn from_config(config: &Config) -> Self {
        Self {
            device_instance: config.device_instance,
            product_name: config.product_name.clone(),
            custom_name: config.custom_name.clone(),
            serial: config.serial.clone(),
            position: config.position,
            connection: format!("MQTT {}:{}", config.mqtt.server, config.mqtt.port),
            process_version: env!("APP_VERSION").to_string(),
        }
    }

    fn management_paths(&self) -> Vec<PathDef> {
        vec![
            PathDef::fixed("/Mgmt/ProcessName", json!(PROCESS_NAME)),
            PathDef::fixed("/Mgmt/ProcessVersion", json!(self.process_version)),
            PathDef::fixed("/Mgmt/Connection", json!(self.connection)),
            PathDef::fixed("/DeviceInstance", json!(self.device_instance)),
            PathDef::fixed("/ProductId", json!(PRODUCT_ID)),
            PathDef::fixed("/ProductName", json!(self.product_name)),
            PathDef::fixed("/CustomName", json!(self.custom_name)),
            PathDef::fixed("/Connected", json!(1u8)),
            PathDef::fixed("/Latency", Value::Null),
            PathDef::fixed("/FirmwareVersion", json!(1)),
            PathDef::fixed("/HardwareVersion", json!(0)),
            PathDef::fixed("/Position", json!(self.position)),
            PathDef::fixed("/Serial", json!(self.serial)),
            PathDef::fixed("/UpdateIndex", json!(0u8)),
            PathDef::fixed("/StatusCode", json!(0)),
        ]
    }
}

/// Measurement paths
pub fn data_paths() -> Vec<PathDef> {
    let mut defs = vec![
        PathDef::data("/Ac/Energy/Forward".into(), TextFormat::KilowattHours),
        PathDef::data("/Ac/Power".into(), TextFormat::Watts),
        PathDef::data("/Ac/Current".into(), TextFormat::Amps),
        PathDef::data("/Ac/Voltage".into(), TextFormat::Volts),
    ];
    for phase in Phase::ALL {
        let prefix = phase.dbus_prefix();
        defs.push(PathDef::data(format!("{prefix}/Voltage"), TextFormat::Volts));
        defs.push(PathDef::data(format!("{prefix}/Current"), TextFormat::Amps));
        defs.push(PathDef::data(format!("{prefix}/Power"), TextFormat::Watts));
        defs.push(PathDef::data(
            format!("{prefix}/Energy/Forward"),
            TextFormat::KilowattHours,
        ));
    }
    defs
}

/// Register every inverter path on the service
pub async fn register_pvinverter(service: &mut DbusService, config: &Config) -> Result<usize> {
    let identity = DeviceIdentity::from_config(config);
    let defs: Vec<PathDef> = identity
        .management_paths()
        .into_iter()
        .chain(data_paths())
        .collect();
    for def in &defs {
        service
            .ensure_item(&def.path, def.initial.clone(), def.writable, def.format)
            .await?;
    }
    Ok(defs.len())
}
