// ── Hub JSON to domain conversions ──
//
// Availability and inventory records arrive in several spellings
// (`InUse` / `in_use` / `inUse`, `UDID` / `udid`) and sometimes nest the
// device description under `Device`, `device` or `info`. Everything here
// normalizes into `DeviceSnapshot` / `RosterEntry`; records without an
// identifier are dropped.

use chrono::{DateTime, Utc};
use serde_json::Value;
use tracing::debug;

use devhub_api::device::DeviceInfo;

use crate::model::{DeviceId, DeviceSnapshot, Resolution, RosterEntry};

const NESTED_KEYS: [&str; 3] = ["Device", "device", "info"];

const ID_KEYS: [&str; 3] = ["UDID", "udid", "Udid"];
const CONNECTED_KEYS: [&str; 2] = ["Connected", "connected"];
const AVAILABLE_KEYS: [&str; 2] = ["Available", "available"];
const IN_USE_KEYS: [&str; 3] = ["InUse", "in_use", "inUse"];
const IN_USE_BY_KEYS: [&str; 4] = ["InUseBy", "in_use_by", "inUseBy", "usedBy"];
const WIDTH_KEYS: [&str; 3] = ["ScreenWidth", "screen_width", "screenWidth"];
const HEIGHT_KEYS: [&str; 3] = ["ScreenHeight", "screen_height", "screenHeight"];

// ── Field lookup helpers ───────────────────────────────────────────

/// The nested device description, if the record has one.
fn nested(record: &Value) -> Option<&Value> {
    NESTED_KEYS
        .iter()
        .find_map(|k| record.get(*k).filter(|v| v.is_object()))
}

/// First non-null value under any of `keys`, top level first, then nested.
fn lookup<'a>(record: &'a Value, keys: &[&str]) -> Option<&'a Value> {
    let find = |v: &'a Value| keys.iter().find_map(|k| v.get(*k).filter(|x| !x.is_null()));
    find(record).or_else(|| nested(record).and_then(find))
}

/// Like [`lookup`], but the nested description wins. Identity and
/// descriptive fields live there when both are present.
fn lookup_nested_first<'a>(record: &'a Value, keys: &[&str]) -> Option<&'a Value> {
    let find = |v: &'a Value| keys.iter().find_map(|k| v.get(*k).filter(|x| !x.is_null()));
    nested(record).and_then(find).or_else(|| find(record))
}

fn as_bool(value: &Value) -> Option<bool> {
    match value {
        Value::Bool(b) => Some(*b),
        Value::Number(n) => n.as_i64().map(|n| n != 0),
        Value::String(s) => match s.trim().to_ascii_lowercase().as_str() {
            "true" | "1" | "yes" => Some(true),
            "false" | "0" | "no" => Some(false),
            _ => None,
        },
        _ => None,
    }
}

fn as_string(value: &Value) -> Option<String> {
    match value {
        Value::String(s) if !s.is_empty() => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}

fn as_u32(value: &Value) -> Option<u32> {
    match value {
        Value::Number(n) => n.as_u64().and_then(|n| u32::try_from(n).ok()),
        Value::String(s) => s.trim().parse().ok(),
        _ => None,
    }
}

fn resolution_of(record: &Value) -> Option<Resolution> {
    let width = lookup(record, &WIDTH_KEYS).and_then(as_u32)?;
    let height = lookup(record, &HEIGHT_KEYS).and_then(as_u32)?;
    Resolution::new(width, height)
}

fn string_field(record: &Value, keys: &[&str]) -> Option<String> {
    lookup_nested_first(record, keys).and_then(as_string)
}

/// The record's device identifier, if it has one.
pub fn device_id_of(record: &Value) -> Option<DeviceId> {
    string_field(record, &ID_KEYS).map(DeviceId::from)
}

// ── Availability ───────────────────────────────────────────────────

/// Normalize one availability record.
pub fn snapshot_from_raw(record: &Value, seen_at: Option<DateTime<Utc>>) -> Option<DeviceSnapshot> {
    let id = device_id_of(record)?;
    Some(DeviceSnapshot {
        id,
        connected: lookup(record, &CONNECTED_KEYS).and_then(as_bool),
        available: lookup(record, &AVAILABLE_KEYS).and_then(as_bool),
        in_use: lookup(record, &IN_USE_KEYS).and_then(as_bool),
        in_use_by: lookup(record, &IN_USE_BY_KEYS).and_then(as_string),
        resolution: resolution_of(record),
        seen_at,
    })
}

/// Normalize a whole batch, preserving order and dropping records with no
/// identifier.
pub fn snapshots_from_batch(batch: &[Value], seen_at: Option<DateTime<Utc>>) -> Vec<DeviceSnapshot> {
    batch
        .iter()
        .filter_map(|record| {
            let snapshot = snapshot_from_raw(record, seen_at);
            if snapshot.is_none() {
                debug!(record = %record, "dropping availability record without identifier");
            }
            snapshot
        })
        .collect()
}

// ── Inventory ──────────────────────────────────────────────────────

/// Build a roster entry from an inventory record (`GET /admin/devices`).
pub fn entry_from_inventory(record: &Value) -> Option<RosterEntry> {
    let id = device_id_of(record)?;
    let mut entry = RosterEntry::new(id);
    entry.name = string_field(record, &["Name", "name"]);
    entry.os = string_field(record, &["OS", "os"]);
    entry.os_version = string_field(record, &["OSVersion", "os_version", "osVersion"]);
    entry.provider = string_field(record, &["Provider", "provider"]);
    entry.usage = string_field(record, &["Usage", "usage"]);
    entry.workspace_id = string_field(record, &["WorkspaceID", "workspace_id", "workspaceId"]);

    if let Some(snapshot) = snapshot_from_raw(record, None) {
        entry.overlay(&snapshot);
    }
    Some(entry)
}

/// Native resolution reported by `GET /device/{id}/info`.
pub fn resolution_from_info(info: &DeviceInfo) -> Option<Resolution> {
    info.resolution().and_then(|(w, h)| Resolution::new(w, h))
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use pretty_assertions::assert_eq;
    use serde_json::json;

    use super::*;

    #[test]
    fn pascal_case_record() {
        let snap = snapshot_from_raw(
            &json!({"UDID": "a", "Connected": true, "Available": false, "InUse": true}),
            None,
        )
        .unwrap();
        assert_eq!(snap.id, DeviceId::from("a"));
        assert_eq!(snap.connected, Some(true));
        assert_eq!(snap.available, Some(false));
        assert_eq!(snap.in_use, Some(true));
    }

    #[test]
    fn snake_and_camel_case_records() {
        let snake = snapshot_from_raw(&json!({"udid": "a", "in_use": false}), None).unwrap();
        assert_eq!(snake.in_use, Some(false));
        assert_eq!(snake.connected, None);

        let camel = snapshot_from_raw(&json!({"udid": "a", "inUse": true, "inUseBy": "eve"}), None)
            .unwrap();
        assert_eq!(camel.in_use, Some(true));
        assert_eq!(camel.in_use_by.as_deref(), Some("eve"));
    }

    #[test]
    fn nested_device_description() {
        let record = json!({
            "InUse": true,
            "Device": {"UDID": "n-1", "ScreenWidth": 1080, "ScreenHeight": 2340, "Connected": true}
        });
        let snap = snapshot_from_raw(&record, None).unwrap();
        assert_eq!(snap.id.as_str(), "n-1");
        assert_eq!(snap.in_use, Some(true));
        assert_eq!(snap.connected, Some(true));
        assert_eq!(snap.resolution, Resolution::new(1080, 2340));

        let info = snapshot_from_raw(&json!({"info": {"udid": "i-1"}, "available": true}), None)
            .unwrap();
        assert_eq!(info.id.as_str(), "i-1");
        assert_eq!(info.available, Some(true));
    }

    #[test]
    fn top_level_status_beats_nested() {
        let record = json!({"Connected": false, "device": {"udid": "a", "connected": true}});
        assert_eq!(snapshot_from_raw(&record, None).unwrap().connected, Some(false));
    }

    #[test]
    fn lenient_booleans() {
        let snap = snapshot_from_raw(
            &json!({"udid": "a", "Connected": 1, "Available": "false", "InUse": "maybe"}),
            None,
        )
        .unwrap();
        assert_eq!(snap.connected, Some(true));
        assert_eq!(snap.available, Some(false));
        assert_eq!(snap.in_use, None);
    }

    #[test]
    fn batch_drops_records_without_id() {
        let batch = vec![json!({"udid": "a"}), json!({"Connected": true}), json!({"UDID": "b"})];
        let ids: Vec<_> = snapshots_from_batch(&batch, None)
            .into_iter()
            .map(|s| s.id.to_string())
            .collect();
        assert_eq!(ids, vec!["a", "b"]);
    }

    #[test]
    fn inventory_entry() {
        let entry = entry_from_inventory(&json!({
            "UDID": "00008110",
            "Name": "iPhone 14",
            "OS": "iOS",
            "OSVersion": "17.4",
            "Provider": "mac-mini-3",
            "Connected": true,
            "Available": true
        }))
        .unwrap();
        assert_eq!(entry.id().as_str(), "00008110");
        assert_eq!(entry.display_name(), "iPhone 14");
        assert_eq!(entry.platform(), "iOS 17.4");
        assert_eq!(entry.provider.as_deref(), Some("mac-mini-3"));
        assert!(entry.connected && entry.available && !entry.in_use);
    }
}
