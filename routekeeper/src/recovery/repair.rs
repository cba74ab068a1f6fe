//! Structural repair of persisted values.
//!
//! Known keys are checked against the type stored under them. Lists keep
//! the entries that still decode; single values either decode or are
//! dropped. Values that were JSON-encoded twice are unwrapped first.

use serde::de::DeserializeOwned;
use serde_json::Value;

use crate::delivery::DeliveryTrackingRecord;
use crate::location::LocationSample;
use crate::offline::{DeliverySnapshot, OfflineLocation, PendingAction, StatusChange};
use crate::store::keys;

/// Result of inspecting one stored value.
#[derive(Debug, Clone, PartialEq)]
pub enum RepairPlan {
    /// The value already has the expected structure.
    Intact,
    /// Store this value instead.
    Replace { value: Value, dropped: usize },
    /// Nothing salvageable; delete the key.
    Delete,
}

pub fn plan_repair(key: &str, value: &Value) -> RepairPlan {
    let unwrapped = unwrap_encoded(value);
    let was_encoded = unwrapped.is_some();
    let candidate = unwrapped.unwrap_or_else(|| value.clone());

    let salvaged = match key {
        keys::PENDING_ACTIONS => salvage_list::<PendingAction>(&candidate),
        keys::LOCATION_SAMPLES => salvage_list::<LocationSample>(&candidate),
        keys::LOCATION_HISTORY => salvage_list::<OfflineLocation>(&candidate),
        keys::STATUS_HISTORY => salvage_list::<StatusChange>(&candidate),
        keys::LAST_KNOWN_LOCATION => salvage_single::<LocationSample>(&candidate),
        keys::DELIVERY_DATA => salvage_single::<DeliverySnapshot>(&candidate),
        keys::LAST_SYNC => salvage_single::<chrono::DateTime<chrono::Utc>>(&candidate),
        keys::ACTIVE_DELIVERY => salvage_single::<DeliveryTrackingRecord>(&candidate),
        _ if candidate.is_null() => None,
        _ => Some((candidate.clone(), 0)),
    };

    match salvaged {
        None => RepairPlan::Delete,
        Some((_, 0)) if !was_encoded => RepairPlan::Intact,
        Some((value, dropped)) => RepairPlan::Replace { value, dropped },
    }
}

/// Inner value of a JSON document stored as a string.
fn unwrap_encoded(value: &Value) -> Option<Value> {
    let text = value.as_str()?;
    let inner: Value = serde_json::from_str(text).ok()?;
    (inner.is_array() || inner.is_object()).then_some(inner)
}

fn salvage_list<T: DeserializeOwned>(value: &Value) -> Option<(Value, usize)> {
    let items = value.as_array()?;
    let kept: Vec<Value> = items
        .iter()
        .filter(|item| serde_json::from_value::<T>((*item).clone()).is_ok())
        .cloned()
        .collect();
    let dropped = items.len() - kept.len();
    Some((Value::Array(kept), dropped))
}

fn salvage_single<T: DeserializeOwned>(value: &Value) -> Option<(Value, usize)> {
    serde_json::from_value::<T>(value.clone())
        .ok()
        .map(|_| (value.clone(), 0))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn action_json() -> Value {
        serde_json::to_value(PendingAction::new(
            crate::offline::ActionType::StatusUpdate,
            json!({}),
        ))
        .unwrap()
    }

    #[test]
    fn test_list_keeps_decodable_entries() {
        let value = json!([action_json(), { "garbage": true }, 7]);
        match plan_repair(keys::PENDING_ACTIONS, &value) {
            RepairPlan::Replace { value, dropped } => {
                assert_eq!(dropped, 2);
                assert_eq!(value.as_array().unwrap().len(), 1);
            }
            other => panic!("unexpected plan {other:?}"),
        }
    }

    #[test]
    fn test_intact_list() {
        let value = json!([action_json()]);
        assert_eq!(plan_repair(keys::PENDING_ACTIONS, &value), RepairPlan::Intact);
    }

    #[test]
    fn test_double_encoded_list_is_unwrapped() {
        let inner = json!([action_json()]);
        let value = Value::String(inner.to_string());
        assert_eq!(
            plan_repair(keys::PENDING_ACTIONS, &value),
            RepairPlan::Replace {
                value: inner,
                dropped: 0
            }
        );
    }

    #[test]
    fn test_non_list_is_deleted() {
        assert_eq!(
            plan_repair(keys::STATUS_HISTORY, &json!({ "oops": 1 })),
            RepairPlan::Delete
        );
        assert_eq!(
            plan_repair(keys::LAST_KNOWN_LOCATION, &json!("not json {")),
            RepairPlan::Delete
        );
    }

    #[test]
    fn test_unknown_keys_only_reject_null() {
        assert_eq!(plan_repair("prefs", &json!({ "a": 1 })), RepairPlan::Intact);
        assert_eq!(plan_repair("prefs", &Value::Null), RepairPlan::Delete);
    }

    #[test]
    fn test_undecodable_active_delivery_is_deleted() {
        assert_eq!(
            plan_repair(keys::ACTIVE_DELIVERY, &json!({ "id": 7 })),
            RepairPlan::Delete
        );
    }
}
