use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use zbus::object_server::SignalEmitter;
use zbus::zvariant::OwnedValue;

use super::paths::PropertyPath;
use super::shared::BusSharedState;
use super::util::{emit_value_changed, owned_value_to_serde, serde_to_owned_value};

/// VeDbus-style leaf object implementing com.victronenergy.BusItem
pub struct BusItem {
    pub(crate) path: PropertyPath,
    pub(crate) shared: Arc<Mutex<BusSharedState>>,
}

impl BusItem {
    pub fn new(path: PropertyPath, shared: Arc<Mutex<BusSharedState>>) -> Self {
        Self { path, shared }
    }

    fn cached_value(&self) -> serde_json::Value {
        let shared = self.shared.lock().unwrap();
        shared.cached(self.path).unwrap_or(serde_json::json!(0))
    }
}

#[zbus::interface(name = "com.victronenergy.BusItem")]
impl BusItem {
    #[zbus(name = "GetValue")]
    async fn get_value(&self) -> OwnedValue {
        serde_to_owned_value(&self.cached_value())
    }

    /// Returns 0 when the write was validated against the device, 1 when
    /// the path is not writable, 2 when the handler turned it down.
    #[zbus(name = "SetValue")]
    async fn set_value(&self, value: OwnedValue) -> i32 {
        let handler = {
            let shared = self.shared.lock().unwrap();
            if !self.path.accepts_external_writes() {
                return 1;
            }
            shared.handler.clone()
        };
        let Some(handler) = handler else {
            // No handler registered yet, nothing can validate the write
            return 1;
        };

        let requested = owned_value_to_serde(&value);
        // The lock is released here: the handler does device I/O
        if !handler.handle_write(self.path, requested.clone()).await {
            return 2;
        }

        let (connection, root_path) = {
            let mut shared = self.shared.lock().unwrap();
            shared.values.insert(self.path, requested.clone());
            (shared.connection.clone(), shared.root_path.clone())
        };
        if let Some(conn) = connection {
            emit_value_changed(&conn, root_path, self.path, &requested).await;
        }
        0
    }

    #[zbus(name = "GetText")]
    async fn get_text(&self) -> String {
        self.path.format_text(&self.cached_value())
    }

    #[zbus(signal)]
    pub async fn properties_changed(
        ctxt: &SignalEmitter<'_>,
        changes: HashMap<&str, OwnedValue>,
    ) -> zbus::Result<()>;
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bus::ExternalWriteHandler;
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use zbus::zvariant::OwnedObjectPath;

    struct RecordingHandler {
        accept: bool,
        calls: AtomicUsize,
    }

    #[async_trait]
    impl ExternalWriteHandler for RecordingHandler {
        async fn handle_write(&self, _path: PropertyPath, _value: serde_json::Value) -> bool {
            self.calls.fetch_add(1, Ordering::SeqCst);
            self.accept
        }
    }

    fn make_shared(handler: Option<Arc<dyn ExternalWriteHandler>>) -> Arc<Mutex<BusSharedState>> {
        let root = OwnedObjectPath::try_from("/").unwrap();
        let mut state = BusSharedState::new(root);
        state.handler = handler;
        Arc::new(Mutex::new(state))
    }

    #[tokio::test]
    async fn write_to_management_path_is_refused_without_handler_call() {
        let handler = Arc::new(RecordingHandler {
            accept: true,
            calls: AtomicUsize::new(0),
        });
        let shared = make_shared(Some(handler.clone()));
        let item = BusItem::new(PropertyPath::ProductId, shared);

        let rc = item.set_value(OwnedValue::from(1i64)).await;
        assert_eq!(rc, 1);
        assert_eq!(handler.calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn accepted_write_is_stored() {
        let handler = Arc::new(RecordingHandler {
            accept: true,
            calls: AtomicUsize::new(0),
        });
        let shared = make_shared(Some(handler.clone()));
        let item = BusItem::new(PropertyPath::Mode, shared.clone());

        let rc = item.set_value(OwnedValue::from(1i64)).await;
        assert_eq!(rc, 0);
        assert_eq!(handler.calls.load(Ordering::SeqCst), 1);
        let state = shared.lock().unwrap();
        assert_eq!(state.cached(PropertyPath::Mode), Some(serde_json::json!(1)));
    }

    #[tokio::test]
    async fn rejected_write_leaves_cache_untouched() {
        let handler = Arc::new(RecordingHandler {
            accept: false,
            calls: AtomicUsize::new(0),
        });
        let shared = make_shared(Some(handler));
        {
            let mut state = shared.lock().unwrap();
            state.values.insert(PropertyPath::SetCurrent, serde_json::json!(6));
        }
        let item = BusItem::new(PropertyPath::SetCurrent, shared.clone());

        let rc = item.set_value(OwnedValue::from(40i64)).await;
        assert_eq!(rc, 2);
        let state = shared.lock().unwrap();
        assert_eq!(
            state.cached(PropertyPath::SetCurrent),
            Some(serde_json::json!(6))
        );
    }

    #[tokio::test]
    async fn write_without_handler_is_refused() {
        let shared = make_shared(None);
        let item = BusItem::new(PropertyPath::StartStop, shared);
        assert_eq!(item.set_value(OwnedValue::from(1i64)).await, 1);
    }

    #[tokio::test]
    async fn get_text_uses_path_formatting() {
        let shared = make_shared(None);
        {
            let mut state = shared.lock().unwrap();
            state
                .values
                .insert(PropertyPath::AcEnergyForward, serde_json::json!(12.35));
        }
        let item = BusItem::new(PropertyPath::AcEnergyForward, shared);
        assert_eq!(item.get_text().await, "12.35kWh");
    }
}
