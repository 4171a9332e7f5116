use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use zbus::object_server::SignalEmitter;
use zbus::zvariant::{OwnedObjectPath, OwnedValue, Value};

use super::shared::DbusSharedState;
use super::lock_shared;

/// VeDbus-style BusItem implementing com.victronenergy.BusItem
pub struct BusItem {
    pub(crate) path: String,
    pub(crate) shared: Arc<Mutex<DbusSharedState>>,
}

impl BusItem {
    pub fn new(path: String, shared: Arc<Mutex<DbusSharedState>>) -> Self {
        Self { path, shared }
    }

    /// VeDbus exports "no value" as an empty integer array
    fn invalid_value() -> OwnedValue {
        OwnedValue::try_from(Value::from(Vec::<i32>::new()))
            .unwrap_or_else(|_| OwnedValue::from(0i64))
    }

    pub(crate) fn serde_to_owned_value(v: &serde_json::Value) -> OwnedValue {
        match v {
            serde_json::Value::Null => Self::invalid_value(),
            serde_json::Value::Bool(b) => OwnedValue::from(*b),
            serde_json::Value::Number(n) => {
                if let Some(i) = n.as_i64() {
                    OwnedValue::from(i)
                } else if let Some(u) = n.as_u64() {
                    OwnedValue::from(u)
                } else {
                    OwnedValue::from(n.as_f64().unwrap_or(0.0))
                }
            }
            serde_json::Value::String(s) => OwnedValue::try_from(Value::from(s.as_str()))
                .unwrap_or_else(|_| OwnedValue::from(0i64)),
            _ => Self::invalid_value(),
        }
    }

    pub(crate) fn owned_value_to_serde(v: &OwnedValue) -> serde_json::Value {
        if let Value::Array(arr) = &**v
            && arr.is_empty()
        {
            return serde_json::Value::Null;
        }
        if let Ok(b) = <bool as TryFrom<&OwnedValue>>::try_from(v) {
            return serde_json::json!(b);
        }
        if let Ok(i) = <i64 as TryFrom<&OwnedValue>>::try_from(v) {
            return serde_json::json!(i);
        }
        if let Ok(i) = <i32 as TryFrom<&OwnedValue>>::try_from(v) {
            return serde_json::json!(i);
        }
        if let Ok(u) = <u64 as TryFrom<&OwnedValue>>::try_from(v) {
            return serde_json::json!(u);
        }
        if let Ok(u) = <u32 as TryFrom<&OwnedValue>>::try_from(v) {
            return serde_json::json!(u);
        }
        if let Ok(f) = <f64 as TryFrom<&OwnedValue>>::try_from(v) {
            return serde_json::json!(f);
        }
        if let Ok(s) = <&str as TryFrom<&OwnedValue>>::try_from(v) {
            return serde_json::json!(s.to_string());
        }
        serde_json::json!(v.to_string())
    }

    /// Value + Text entries for change signals
    pub(crate) fn change_entry(
        value: &serde_json::Value,
        text: &str,
    ) -> HashMap<&'static str, OwnedValue> {
        let mut entry: HashMap<&'static str, OwnedValue> = HashMap::new();
        entry.insert("Value", Self::serde_to_owned_value(value));
        if let Ok(text_ov) = OwnedValue::try_from(Value::from(text)) {
            entry.insert("Text", text_ov);
        }
        entry
    }
}

#[zbus::interface(name = "com.victronenergy.BusItem")]
impl BusItem {
    #[zbus(name = "GetValue")]
    async fn get_value(&self) -> OwnedValue {
        let shared = lock_shared(&self.shared);
        shared
            .paths
            .get(&self.path)
            .map(Self::serde_to_owned_value)
            .unwrap_or_else(Self::invalid_value)
    }

    /// Accept a write from another process; 0 = accepted, 1 = refused
    #[zbus(name = "SetValue")]
    async fn set_value(&self, value: OwnedValue) -> i32 {
        let (conn_opt, root_path, new_value, text) = {
            let mut shared = lock_shared(&self.shared);
            if !shared.writable.contains(&self.path) {
                return 1;
            }
            let new_value = Self::owned_value_to_serde(&value);
            let text = shared.text_for(&self.path, &new_value);
            shared.paths.insert(self.path.clone(), new_value.clone());
            (
                shared.connection.clone(),
                shared.root_path.clone(),
                new_value,
                text,
            )
        };

        tracing::debug!("someone else updated {} to {}", self.path, new_value);

        if let Some(conn) = conn_opt {
            if let Ok(obj_path) = OwnedObjectPath::try_from(self.path.as_str())
                && let Ok(item_ctx) = SignalEmitter::new(&conn, obj_path)
            {
                let _ = BusItem::properties_changed(&item_ctx, Self::change_entry(&new_value, &text))
                    .await;
            }
            if let Ok(root_ctx) = SignalEmitter::new(&conn, root_path) {
                let mut outer: HashMap<&str, HashMap<&str, OwnedValue>> = HashMap::new();
                outer.insert(self.path.as_str(), Self::change_entry(&new_value, &text));
                let _ = super::RootBus::items_changed(&root_ctx, outer).await;
            }
        }

        0
    }

    #[zbus(name = "GetText")]
    async fn get_text(&self) -> String {
        let shared = lock_shared(&self.shared);
        let val = shared
            .paths
            .get(&self.path)
            .cloned()
            .unwrap_or(serde_json::Value::Null);
        shared.text_for(&self.path, &val)
    }

    #[zbus(signal)]
    pub async fn properties_changed(
        ctxt: &SignalEmitter<'_>,
        changes: HashMap<&str, OwnedValue>,
    ) -> zbus::Result<()>;
}
