//! Clock, run-id and timestamp parsing helpers.

use chrono::DateTime;
use serde_json::Value as JsonValue;
use std::time::{SystemTime, UNIX_EPOCH};
use ulid::Ulid;

/// Unix-epoch seconds.
pub fn now_unix_secs() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_secs() as i64
}

/// Unix-epoch milliseconds, used to name backups.
pub fn now_unix_millis() -> u128 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_millis()
}

/// Returns unix-epoch seconds with `Z` suffix (e.g. `1771220592Z`).
pub fn now_epoch_z() -> String {
    format!("{}Z", now_unix_secs())
}

pub fn new_run_id() -> String {
    Ulid::new().to_string()
}

/// Timestamps in records are unix numbers (seconds, or milliseconds when the
/// value is too large to be seconds) or RFC 3339 strings. Returns milliseconds.
pub fn parse_record_timestamp(value: &JsonValue) -> Option<i64> {
    match value {
        JsonValue::Number(n) => {
            let raw = n.as_i64().or_else(|| n.as_f64().map(|f| f as i64))?;
            if raw.abs() >= 100_000_000_000 {
                Some(raw)
            } else {
                Some(raw * 1000)
            }
        }
        JsonValue::String(s) => {
            if let Ok(n) = s.parse::<i64>() {
                return parse_record_timestamp(&JsonValue::from(n));
            }
            DateTime::parse_from_rfc3339(s)
                .ok()
                .map(|dt| dt.timestamp_millis())
        }
        _ => None,
    }
}

/// Standard command response envelope shape used by the CLI's JSON output.
pub fn command_envelope(cmd: &str, status: &str, extra: JsonValue) -> JsonValue {
    let mut base = serde_json::json!({
        "envelope_version": "1.0.0",
        "ts": now_epoch_z(),
        "event_id": new_run_id(),
        "cmd": cmd,
        "status": status
    });
    if let (Some(base_obj), Some(extra_obj)) = (base.as_object_mut(), extra.as_object()) {
        for (k, v) in extra_obj {
            base_obj.insert(k.clone(), v.clone());
        }
    }
    base
}
