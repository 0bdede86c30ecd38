use std::collections::HashMap;
use std::sync::Arc;
use zbus::Connection;
use zbus::zvariant::OwnedObjectPath;

use super::ExternalWriteHandler;
use super::paths::PropertyPath;

/// Value cache and wiring shared between the service, its items and the
/// root object. Guarded by a std `Mutex`; nothing holds the lock across an
/// await.
pub struct BusSharedState {
    pub(crate) values: HashMap<PropertyPath, serde_json::Value>,
    pub(crate) handler: Option<Arc<dyn ExternalWriteHandler>>,
    pub(crate) connection: Option<Connection>,
    pub(crate) root_path: OwnedObjectPath,
}

impl BusSharedState {
    pub fn new(root_path: OwnedObjectPath) -> Self {
        Self {
            values: HashMap::new(),
            handler: None,
            connection: None,
            root_path,
        }
    }

    /// Last stored value for a path
    pub fn cached(&self, path: PropertyPath) -> Option<serde_json::Value> {
        self.values.get(&path).cloned()
    }

    /// Last stored value as an unsigned integer, with a fallback for paths
    /// that have not been published yet
    pub fn cached_u64(&self, path: PropertyPath, default: u64) -> u64 {
        self.values
            .get(&path)
            .and_then(|v| {
                v.as_u64()
                    .or_else(|| v.as_i64().and_then(|i| u64::try_from(i).ok()))
                    .or_else(|| v.as_f64().filter(|f| *f >= 0.0).map(|f| f as u64))
            })
            .unwrap_or(default)
    }
}
