use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use zbus::object_server::SignalEmitter;
use zbus::zvariant::{OwnedValue, Value};

use super::items::BusItem;
use super::lock_shared;
use super::shared::DbusSharedState;

fn text_value(text: &str) -> OwnedValue {
    OwnedValue::try_from(Value::from(text)).unwrap_or_else(|_| OwnedValue::from(0i64))
}

fn subtree_map(
    shared: &Arc<Mutex<DbusSharedState>>,
    prefix: &str,
    as_text: bool,
) -> HashMap<String, OwnedValue> {
    let shared = lock_shared(shared);
    shared.subtree(prefix, |path, val| {
        if as_text {
            text_value(&shared.text_for(path, val))
        } else {
            BusItem::serde_to_owned_value(val)
        }
    })
}

/// Object at `/` answering for the whole service
pub struct RootBus {
    pub(crate) shared: Arc<Mutex<DbusSharedState>>,
}

#[zbus::interface(name = "com.victronenergy.BusItem")]
impl RootBus {
    #[zbus(name = "GetValue")]
    async fn get_value(&self) -> OwnedValue {
        OwnedValue::from(subtree_map(&self.shared, "/", false))
    }

    #[zbus(name = "GetText")]
    async fn get_text(&self) -> OwnedValue {
        OwnedValue::from(subtree_map(&self.shared, "/", true))
    }

    #[zbus(name = "GetItems")]
    async fn get_items(&self) -> HashMap<String, HashMap<String, OwnedValue>> {
        let shared = lock_shared(&self.shared);
        shared
            .paths
            .iter()
            .map(|(path, val)| {
                let mut entry: HashMap<String, OwnedValue> = HashMap::new();
                entry.insert("Value".to_string(), BusItem::serde_to_owned_value(val));
                entry.insert("Text".to_string(), text_value(&shared.text_for(path, val)));
                (path.clone(), entry)
            })
            .collect()
    }

    #[zbus(signal)]
    pub async fn items_changed(
        ctxt: &SignalEmitter<'_>,
        changes: HashMap<&str, HashMap<&str, OwnedValue>>,
    ) -> zbus::Result<()>;
}

/// Intermediate node such as `/Ac` or `/Ac/L1`
pub struct TreeNode {
    pub(crate) path: String,
    pub(crate) shared: Arc<Mutex<DbusSharedState>>,
}

impl TreeNode {
    pub fn new(path: String, shared: Arc<Mutex<DbusSharedState>>) -> Self {
        Self { path, shared }
    }
}

#[zbus::interface(name = "com.victronenergy.BusItem")]
impl TreeNode {
    #[zbus(name = "GetValue")]
    async fn get_value(&self) -> OwnedValue {
        OwnedValue::from(subtree_map(&self.shared, &self.path, false))
    }

    #[zbus(name = "GetText")]
    async fn get_text(&self) -> OwnedValue {
        OwnedValue::from(subtree_map(&self.shared, &self.path, true))
    }
}
