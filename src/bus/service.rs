use std::collections::HashSet;
use std::sync::{Arc, Mutex};
use zbus::zvariant::OwnedObjectPath;
use zbus::{Connection, Result as ZbusResult, names::WellKnownName};

use crate::error::{HeliosError, Result};
use crate::logging::get_logger;

use super::ExternalWriteHandler;
use super::items::BusItem;
use super::paths::PropertyPath;
use super::root::{RootBus, TreeNode};
use super::shared::BusSharedState;
use super::util::emit_value_changed;

/// One `com.victronenergy.evcharger.http_NN` service: owns the bus name,
/// the registered objects and the value cache for a single charger.
pub struct DbusService {
    logger: crate::logging::StructuredLogger,
    service_name: String,
    connection: Option<Connection>,
    pub(crate) shared: Arc<Mutex<BusSharedState>>,
    registered_paths: HashSet<String>,
    root_path: OwnedObjectPath,
}

impl DbusService {
    pub async fn new(device_instance: u32) -> Result<Self> {
        let logger = get_logger("bus");
        let service_name = format!("com.victronenergy.evcharger.http_{:02}", device_instance);
        let root_path = OwnedObjectPath::try_from("/")
            .map_err(|e| HeliosError::dbus(format!("Invalid object path: {}", e)))?;
        Ok(Self {
            logger,
            service_name,
            connection: None,
            shared: Arc::new(Mutex::new(BusSharedState::new(root_path.clone()))),
            registered_paths: HashSet::new(),
            root_path,
        })
    }

    pub fn service_name(&self) -> &str {
        &self.service_name
    }

    /// Bus connection, available after [`start`](Self::start)
    pub fn connection(&self) -> Option<Connection> {
        self.connection.clone()
    }

    /// Shared value cache, for components that plan writes against the
    /// currently published state
    pub fn shared_state(&self) -> Arc<Mutex<BusSharedState>> {
        Arc::clone(&self.shared)
    }

    /// Register the handler consulted for external `SetValue` calls
    pub fn set_write_handler(&self, handler: Arc<dyn ExternalWriteHandler>) {
        let mut shared = self.shared.lock().unwrap();
        shared.handler = Some(handler);
    }

    /// Connect, claim the service name, and export the root object. Prefers
    /// the system bus (Venus OS) and falls back to the session bus so the
    /// driver can run on a development machine.
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
                    return Err(HeliosError::dbus(format!(
                        "DBus connect failed: system={} session={}",
                        e_sys, e_sess
                    )));
                }
            },
        };
        self.request_name(&connection)
            .await
            .map_err(|e| HeliosError::dbus(format!("RequestName failed: {}", e)))?;

        let root = RootBus {
            shared: Arc::clone(&self.shared),
        };
        connection
            .object_server()
            .at(&self.root_path, root)
            .await
            .map_err(|e| HeliosError::dbus(format!("Register root BusItem failed: {}", e)))?;

        {
            let mut shared = self.shared.lock().unwrap();
            shared.connection = Some(connection.clone());
        }
        self.connection = Some(connection);
        self.logger
            .info(&format!("D-Bus service started: {}", self.service_name));
        Ok(())
    }

    pub async fn stop(&mut self) -> Result<()> {
        self.logger.info("Stopping D-Bus service");
        {
            let mut shared = self.shared.lock().unwrap();
            shared.connection = None;
        }
        self.connection = None;
        Ok(())
    }

    /// Export the leaf object for a path plus TreeNode objects for every
    /// intermediate segment, and seed the cache with an initial value.
    pub async fn ensure_item(
        &mut self,
        path: PropertyPath,
        initial_value: serde_json::Value,
    ) -> Result<()> {
        let full = path.as_str();
        let segments: Vec<&str> = full.split('/').filter(|s| !s.is_empty()).collect();
        for i in 1..=segments.len() {
            let subpath = format!("/{}", segments[..i].join("/"));
            if self.registered_paths.contains(&subpath) {
                continue;
            }
            let obj_path = OwnedObjectPath::try_from(subpath.as_str()).map_err(|e| {
                HeliosError::dbus(format!("Invalid object path '{}': {}", subpath, e))
            })?;
            if let Some(conn) = &self.connection {
                if i == segments.len() {
                    let item = BusItem::new(path, Arc::clone(&self.shared));
                    conn.object_server().at(&obj_path, item).await.map_err(|e| {
                        HeliosError::dbus(format!("Register BusItem failed for {}: {}", subpath, e))
                    })?;
                } else {
                    let node = TreeNode::new(subpath.clone(), Arc::clone(&self.shared));
                    conn.object_server().at(&obj_path, node).await.map_err(|e| {
                        HeliosError::dbus(format!(
                            "Register TreeNode failed for {}: {}",
                            subpath, e
                        ))
                    })?;
                }
            }
            self.registered_paths.insert(subpath);
        }

        let mut shared = self.shared.lock().unwrap();
        shared.values.entry(path).or_insert(initial_value);
        Ok(())
    }

    /// Publish a new value. Unchanged values are dropped without touching
    /// the bus; changed ones are stored and signalled on both the item and
    /// the root.
    pub async fn update_path(&mut self, path: PropertyPath, value: serde_json::Value) -> Result<()> {
        {
            let shared = self.shared.lock().unwrap();
            if let Some(old) = shared.values.get(&path)
                && old == &value
            {
                return Ok(());
            }
        }
        self.ensure_item(path, value.clone()).await?;
        {
            let mut shared = self.shared.lock().unwrap();
            shared.values.insert(path, value.clone());
        }
        if let Some(conn) = &self.connection {
            emit_value_changed(conn, self.root_path.clone(), path, &value).await;
        }
        Ok(())
    }

    pub async fn update_paths(
        &mut self,
        updates: impl IntoIterator<Item = (PropertyPath, serde_json::Value)>,
    ) -> Result<()> {
        for (path, value) in updates {
            self.update_path(path, value).await?;
        }
        Ok(())
    }

    /// Last published value for a path
    pub fn cached_value(&self, path: PropertyPath) -> Option<serde_json::Value> {
        let shared = self.shared.lock().unwrap();
        shared.cached(path)
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

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn service_name_is_zero_padded() {
        let svc = DbusService::new(3).await.unwrap();
        assert_eq!(svc.service_name(), "com.victronenergy.evcharger.http_03");
        let svc = DbusService::new(42).await.unwrap();
        assert_eq!(svc.service_name(), "com.victronenergy.evcharger.http_42");
    }

    #[tokio::test]
    async fn update_path_dedupes_and_caches_offline() {
        // No connection: updates only touch the cache
        let mut svc = DbusService::new(0).await.unwrap();
        svc.update_path(PropertyPath::AcPower, serde_json::json!(1500))
            .await
            .unwrap();
        assert_eq!(
            svc.cached_value(PropertyPath::AcPower),
            Some(serde_json::json!(1500))
        );
        svc.update_path(PropertyPath::AcPower, serde_json::json!(1500))
            .await
            .unwrap();
        assert_eq!(
            svc.cached_value(PropertyPath::AcPower),
            Some(serde_json::json!(1500))
        );
    }

    #[tokio::test]
    async fn ensure_item_keeps_existing_value() {
        let mut svc = DbusService::new(0).await.unwrap();
        svc.ensure_item(PropertyPath::Mode, serde_json::json!(1))
            .await
            .unwrap();
        svc.ensure_item(PropertyPath::Mode, serde_json::json!(0))
            .await
            .unwrap();
        assert_eq!(
            svc.cached_value(PropertyPath::Mode),
            Some(serde_json::json!(1))
        );
    }
}
