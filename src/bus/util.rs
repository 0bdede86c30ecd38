//! Conversions between JSON values and D-Bus variants, plus signal emission

use std::collections::HashMap;
use zbus::Connection;
use zbus::object_server::SignalEmitter;
use zbus::zvariant::{OwnedObjectPath, OwnedValue, Value};

use super::items::BusItem;
use super::paths::PropertyPath;
use super::root::RootBus;

pub(crate) fn serde_to_owned_value(v: &serde_json::Value) -> OwnedValue {
    match v {
        serde_json::Value::Null => OwnedValue::from(0i64),
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
        _ => OwnedValue::from(0i64),
    }
}

pub(crate) fn owned_value_to_serde(v: &OwnedValue) -> serde_json::Value {
    if let Ok(b) = <bool as TryFrom<&OwnedValue>>::try_from(v) {
        return serde_json::json!(b);
    }
    if let Ok(i) = <i64 as TryFrom<&OwnedValue>>::try_from(v) {
        return serde_json::json!(i);
    }
    if let Ok(u) = <u64 as TryFrom<&OwnedValue>>::try_from(v) {
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

fn value_text_pair(path: PropertyPath, value: &serde_json::Value) -> HashMap<&'static str, OwnedValue> {
    let mut pair: HashMap<&'static str, OwnedValue> = HashMap::new();
    pair.insert("Value", serde_to_owned_value(value));
    let text = path.format_text(value);
    if let Ok(text_ov) = OwnedValue::try_from(Value::from(text.as_str())) {
        pair.insert("Text", text_ov);
    }
    pair
}

/// Emit the item-level `PropertiesChanged` and root-level `ItemsChanged`
/// signals for one updated path. Signal failures are not surfaced; a lost
/// change notification is recovered by the next poll cycle.
pub(crate) async fn emit_value_changed(
    connection: &Connection,
    root_path: OwnedObjectPath,
    path: PropertyPath,
    value: &serde_json::Value,
) {
    if let Ok(obj_path) = OwnedObjectPath::try_from(path.as_str())
        && let Ok(item_ctx) = SignalEmitter::new(connection, obj_path)
    {
        let _ = BusItem::properties_changed(&item_ctx, value_text_pair(path, value)).await;
    }
    if let Ok(root_ctx) = SignalEmitter::new(connection, root_path) {
        let mut outer: HashMap<&str, HashMap<&str, OwnedValue>> = HashMap::new();
        outer.insert(path.as_str(), value_text_pair(path, value));
        let _ = RootBus::items_changed(&root_ctx, outer).await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn owned_value_conversions_roundtrip() {
        let ov_b = serde_to_owned_value(&serde_json::json!(true));
        assert_eq!(owned_value_to_serde(&ov_b), serde_json::json!(true));

        let ov_i = serde_to_owned_value(&serde_json::json!(-5));
        assert_eq!(owned_value_to_serde(&ov_i), serde_json::json!(-5));

        let ov_f = serde_to_owned_value(&serde_json::json!(2.5));
        assert_eq!(owned_value_to_serde(&ov_f), serde_json::json!(2.5));

        let ov_s = serde_to_owned_value(&serde_json::json!("eco"));
        assert_eq!(owned_value_to_serde(&ov_s), serde_json::json!("eco"));

        // Complex types collapse to numeric 0
        let ov_o = serde_to_owned_value(&serde_json::json!({"a": 1}));
        assert_eq!(owned_value_to_serde(&ov_o), serde_json::json!(0));
    }
}
