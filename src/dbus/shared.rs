use std::collections::{HashMap, HashSet};
use zbus::Connection;
use zbus::zvariant::OwnedObjectPath;

use super::util::TextFormat;

/// Path values and metadata shared by every exported bus object
pub struct DbusSharedState {
    pub(crate) paths: HashMap<String, serde_json::Value>,
    pub(crate) writable: HashSet<String>,
    pub(crate) formats: HashMap<String, TextFormat>,
    pub(crate) connection: Option<Connection>,
    pub(crate) root_path: OwnedObjectPath,
}

impl DbusSharedState {
    pub fn new(root_path: OwnedObjectPath) -> Self {
        Self {
            paths: HashMap::new(),
            writable: HashSet::new(),
            formats: HashMap::new(),
            connection: None,
            root_path,
        }
    }

    /// Text rendering of a path's current value
    pub(crate) fn text_for(&self, path: &str, value: &serde_json::Value) -> String {
        self.formats
            .get(path)
            .copied()
            .unwrap_or_default()
            .format(value)
    }

    /// Values (or texts) of all paths below `prefix`, keyed by relative path
    pub(crate) fn subtree<F, T>(&self, prefix: &str, mut render: F) -> HashMap<String, T>
    where
        F: FnMut(&str, &serde_json::Value) -> T,
    {
        let mut px = prefix.to_string();
        if !px.ends_with('/') {
            px.push('/');
        }
        self.paths
            .iter()
            .filter_map(|(path, val)| {
                path.strip_prefix(px.as_str())
                    .map(|suffix| (suffix.to_string(), render(path, val)))
            })
            .collect()
    }
}
