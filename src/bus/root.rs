use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use zbus::object_server::SignalEmitter;
use zbus::zvariant::{OwnedValue, Value};

use super::paths::PropertyPath;
use super::shared::BusSharedState;
use super::util::serde_to_owned_value;

fn text_owned_value(path: PropertyPath, value: &serde_json::Value) -> OwnedValue {
    let text = path.format_text(value);
    OwnedValue::try_from(Value::from(text.as_str())).unwrap_or_else(|_| OwnedValue::from(0i64))
}

fn collect_subtree(
    shared: &Arc<Mutex<BusSharedState>>,
    prefix: &str,
    as_text: bool,
) -> HashMap<String, OwnedValue> {
    let shared = shared.lock().unwrap();
    let mut px = prefix.to_string();
    if !px.ends_with('/') {
        px.push('/');
    }
    let mut result: HashMap<String, OwnedValue> = HashMap::new();
    for (path, val) in shared.values.iter() {
        let full = path.as_str();
        if let Some(suffix) = full.strip_prefix(&px) {
            let ov = if as_text {
                text_owned_value(*path, val)
            } else {
                serde_to_owned_value(val)
            };
            result.insert(suffix.to_string(), ov);
        }
    }
    result
}

/// BusItem at the service root: whole-tree reads and the bulk change signal
pub struct RootBus {
    pub(crate) shared: Arc<Mutex<BusSharedState>>,
}

#[zbus::interface(name = "com.victronenergy.BusItem")]
impl RootBus {
    #[zbus(name = "GetValue")]
    async fn get_value(&self) -> OwnedValue {
        OwnedValue::from(collect_subtree(&self.shared, "/", false))
    }

    #[zbus(name = "GetText")]
    async fn get_text(&self) -> OwnedValue {
        OwnedValue::from(collect_subtree(&self.shared, "/", true))
    }

    #[zbus(name = "GetItems")]
    async fn get_items(&self) -> HashMap<String, HashMap<String, OwnedValue>> {
        let shared = self.shared.lock().unwrap();
        let mut out: HashMap<String, HashMap<String, OwnedValue>> = HashMap::new();
        for (path, val) in shared.values.iter() {
            let mut entry: HashMap<String, OwnedValue> = HashMap::new();
            entry.insert("Value".to_string(), serde_to_owned_value(val));
            entry.insert("Text".to_string(), text_owned_value(*path, val));
            out.insert(path.as_str().to_string(), entry);
        }
        out
    }

    #[zbus(signal)]
    pub async fn items_changed(
        ctxt: &SignalEmitter<'_>,
        changes: HashMap<&str, HashMap<&str, OwnedValue>>,
    ) -> zbus::Result<()>;
}

/// Intermediate object for non-leaf path segments such as `/Ac` or
/// `/Ac/L1`; answers subtree reads the way VeDbus does
pub struct TreeNode {
    pub(crate) prefix: String,
    pub(crate) shared: Arc<Mutex<BusSharedState>>,
}

impl TreeNode {
    pub fn new(prefix: String, shared: Arc<Mutex<BusSharedState>>) -> Self {
        Self { prefix, shared }
    }
}

#[zbus::interface(name = "com.victronenergy.BusItem")]
impl TreeNode {
    #[zbus(name = "GetValue")]
    async fn get_value(&self) -> OwnedValue {
        OwnedValue::from(collect_subtree(&self.shared, &self.prefix, false))
    }

    #[zbus(name = "GetText")]
    async fn get_text(&self) -> OwnedValue {
        OwnedValue::from(collect_subtree(&self.shared, &self.prefix, true))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use zbus::zvariant::OwnedObjectPath;

    fn seeded_shared() -> Arc<Mutex<BusSharedState>> {
        let root = OwnedObjectPath::try_from("/").unwrap();
        let mut state = BusSharedState::new(root);
        state.values.insert(PropertyPath::AcPower, serde_json::json!(6903));
        state
            .values
            .insert(PropertyPath::AcPowerL1, serde_json::json!(2301));
        state.values.insert(PropertyPath::Status, serde_json::json!(2));
        Arc::new(Mutex::new(state))
    }

    #[tokio::test]
    async fn get_items_lists_every_registered_path() {
        let root = RootBus {
            shared: seeded_shared(),
        };
        let items = root.get_items().await;
        assert_eq!(items.len(), 3);
        let power = items.get("/Ac/Power").unwrap();
        assert!(power.contains_key("Value"));
        assert!(power.contains_key("Text"));
    }

    #[tokio::test]
    async fn tree_node_scopes_to_its_prefix() {
        let node = TreeNode::new("/Ac".to_string(), seeded_shared());
        let map = collect_subtree(&node.shared, &node.prefix, false);
        assert_eq!(map.len(), 2);
        assert!(map.contains_key("Power"));
        assert!(map.contains_key("L1/Power"));
        assert!(!map.contains_key("Status"));
    }
}
