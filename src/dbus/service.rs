use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Mutex};
use zbus::zvariant::{OwnedObjectPath, OwnedValue};
use zbus::{Connection, Result as ZbusResult, names::WellKnownName};

use crate::error::{PvInverterError, Result};
use crate::logging::get_logger;

use super::items::BusItem;
use super::root::{RootBus, TreeNode};
use super::shared::DbusSharedState;
use super::util::TextFormat;
use super::{DeviceBus, lock_shared};

/// Service name prefix for PV inverters on Venus OS
pub const PVINVERTER_SERVICE_PREFIX: &str = "com.victronenergy.pvinverter";

/// VeDbus-compatible service exporting one device
pub struct DbusService {
    logger: crate::logging::StructuredLogger,
    service_name: String,
    connection: Option<Connection>,
    pub(crate) shared: Arc<Mutex<DbusSharedState>>,
    registered_paths: HashSet<String>,
    root_path: OwnedObjectPath,
}

impl DbusService {
    pub fn new(device_instance: u32) -> Result<Self> {
        let logger = get_logger("dbus");
        let service_name = format!("{}.mqtt_{:02}", PVINVERTER_SERVICE_PREFIX, device_instance);
        let root_path = OwnedObjectPath::try_from("/")
            .map_err(|e| PvInverterError::dbus(format!("Invalid object path: {}", e)))?;
        Ok(Self {
            logger,
            service_name,
            connection: None,
            shared: Arc::new(Mutex::new(DbusSharedState::new(root_path.clone()))),
            registered_paths: HashSet::new(),
            root_path,
        })
    }

    pub fn service_name(&self) -> &str {
        &self.service_name
    }

    pub fn is_connected(&self) -> bool {
        self.connection.is_some()
    }

    /// Connect to the bus, claim the service name and export the root object
    pub async fn start(&mut self) -> Result<()> {
        let connection = match Connection::system().await {
            Ok(c) => {
                self.logger.info("Connected to D-Bus: system bus");
                c
            }
            Err(e_sys) => match Connection::session().await {
                Ok(c) => {
                    self.logger.warn(&format!(
                        "System bus unavailable ({}); using session bus",
                        e_sys
                    ));
                    c
                }
                Err(e_sess) => {
                    return Err(PvInverterError::dbus(format!(
                        "DBus connect failed: system={} session={}",
                        e_sys, e_sess
                    )));
                }
            },
        };

        let root = RootBus {
            shared: Arc::clone(&self.shared),
        };
        connection
            .object_server()
            .at(&self.root_path, root)
            .await
            .map_err(|e| PvInverterError::dbus(format!("Register root BusItem failed: {}", e)))?;

        lock_shared(&self.shared).connection = Some(connection.clone());
        self.connection = Some(connection.clone());

        // Paths ensured before start only live in the shared map so far
        let pending: Vec<String> = lock_shared(&self.shared).paths.keys().cloned().collect();
        self.registered_paths.clear();
        for path in pending {
            self.export_objects(&path).await?;
        }

        // Claim the name last so consumers never see a half-populated service
        self.request_name(&connection)
            .await
            .map_err(|e| PvInverterError::dbus(format!("RequestName failed: {}", e)))?;
        self.logger
            .info(&format!("D-Bus service started: {}", self.service_name));
        Ok(())
    }

    pub async fn stop(&mut self) -> Result<()> {
        self.logger.info("Stopping D-Bus service");
        lock_shared(&self.shared).connection = None;
        self.connection = None;
        Ok(())
    }

    /// Register a path with its initial value and text format
    pub async fn ensure_item(
        &mut self,
        path: &str,
        initial_value: serde_json::Value,
        writable: bool,
        format: TextFormat,
    ) -> Result<()> {
        if !path.starts_with('/') {
            return Err(PvInverterError::dbus(format!(
                "Invalid object path '{}': must start with '/'",
                path
            )));
        }
        self.export_objects(path).await?;
        let mut shared = lock_shared(&self.shared);
        shared
            .paths
            .entry(path.to_string())
            .or_insert(initial_value);
        shared.formats.insert(path.to_string(), format);
        if writable {
            shared.writable.insert(path.to_string());
        }
        Ok(())
    }

    /// Export BusItem objects for a path and TreeNodes for its parents
    async fn export_objects(&mut self, path: &str) -> Result<()> {
        let segments: Vec<&str> = path.split('/').filter(|s| !s.is_empty()).collect();
        for i in 1..=segments.len() {
            let subpath = format!("/{}", segments[..i].join("/"));
            if self.registered_paths.contains(&subpath) {
                continue;
            }
            let obj_path = OwnedObjectPath::try_from(subpath.as_str()).map_err(|e| {
                PvInverterError::dbus(format!("Invalid object path '{}': {}", subpath, e))
            })?;
            let Some(conn) = &self.connection else {
                // Exported once start() connects
                continue;
            };
            let registered = if i == segments.len() {
                let item = BusItem::new(subpath.clone(), Arc::clone(&self.shared));
                conn.object_server().at(&obj_path, item).await
            } else {
                let node = TreeNode::new(subpath.clone(), Arc::clone(&self.shared));
                conn.object_server().at(&obj_path, node).await
            };
            registered.map_err(|e| {
                PvInverterError::dbus(format!("Register object failed for {}: {}", subpath, e))
            })?;
            self.registered_paths.insert(subpath);
        }
        Ok(())
    }

    /// Write a value to a registered path and emit change signals
    pub async fn update_path(&mut self, path: &str, value: serde_json::Value) -> Result<()> {
        let text = {
            let mut shared = lock_shared(&self.shared);
            match shared.paths.get(path) {
                None => {
                    return Err(PvInverterError::dbus(format!(
                        "Path not registered: {}",
                        path
                    )));
                }
                Some(old) if old == &value => return Ok(()),
                Some(_) => {}
            }
            shared.paths.insert(path.to_string(), value.clone());
            shared.text_for(path, &value)
        };

        if let Some(conn) = &self.connection {
            let obj_path = OwnedObjectPath::try_from(path).map_err(|e| {
                PvInverterError::dbus(format!("Invalid object path '{}': {}", path, e))
            })?;
            let item_ctx = zbus::object_server::SignalEmitter::new(conn, obj_path)
                .map_err(|e| PvInverterError::dbus(format!("SignalEmitter new failed: {}", e)))?;
            BusItem::properties_changed(&item_ctx, BusItem::change_entry(&value, &text))
                .await
                .map_err(|e| PvInverterError::dbus(format!("PropertiesChanged failed: {}", e)))?;

            let root_ctx = zbus::object_server::SignalEmitter::new(conn, self.root_path.clone())
                .map_err(|e| PvInverterError::dbus(format!("Root SignalEmitter failed: {}", e)))?;
            let mut outer: HashMap<&str, HashMap<&str, OwnedValue>> = HashMap::new();
            outer.insert(path, BusItem::change_entry(&value, &text));
            RootBus::items_changed(&root_ctx, outer)
                .await
                .map_err(|e| PvInverterError::dbus(format!("ItemsChanged failed: {}", e)))?;
        }
        Ok(())
    }

    pub fn get_path(&self, path: &str) -> Option<serde_json::Value> {
        lock_shared(&self.shared).paths.get(path).cloned()
    }

    async fn request_name(&self, connection: &Connection) -> ZbusResult<()> {
        use zbus::fdo::{DBusProxy, RequestNameFlags};
        let proxy = DBusProxy::new(connection).await?;
        let name = WellKnownName::try_from(self.service_name.as_str())?;
        let _ = proxy
            .request_name(name, RequestNameFlags::ReplaceExisting.into())
            .await?;
        Ok(())
    }
}

#[async_trait::async_trait]
impl DeviceBus for DbusService {
    async fn set_value(&mut self, path: &str, value: serde_json::Value) -> Result<()> {
        self.update_path(path, value).await
    }

    fn get_value(&self, path: &str) -> Option<serde_json::Value> {
        self.get_path(path)
    }
}
