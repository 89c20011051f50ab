//! Location Set: which backends hold a copy of an artifact.
//!
//! Persisted as a JSON array of strings in the owning record. Older rows may
//! hold a single JSON string or a bare label, so [`decode`] accepts all three.
//! Entries are free-form and case-sensitive; they are only trimmed and deduplicated.

use std::collections::HashSet;

use artiroute_core::{StorageAction, StorageBackend};
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;

use crate::error::{StorageError, StorageResult};

/// Trim, drop blanks, dedupe keeping first-seen order.
pub fn normalize<S: AsRef<str>>(servers: &[S]) -> Vec<String> {
    let mut seen = HashSet::with_capacity(servers.len());
    let mut result = Vec::with_capacity(servers.len());
    for server in servers {
        let value = server.as_ref().trim();
        if value.is_empty() || !seen.insert(value.to_string()) {
            continue;
        }
        result.push(value.to_string());
    }
    result
}

/// JSON array text of the normalized list.
pub fn encode<S: AsRef<str>>(servers: &[S]) -> String {
    serde_json::to_string(&normalize(servers)).unwrap_or_else(|_| "[]".to_string())
}

/// Decode a persisted field: JSON array, then JSON string, then the raw text.
/// Blank text and a JSON `null` both decode to the empty set.
pub fn decode(raw: &str) -> Vec<String> {
    let value = raw.trim();
    if value.is_empty() || value == "null" {
        return Vec::new();
    }

    if let Ok(list) = serde_json::from_str::<Vec<String>>(value) {
        return normalize(&list);
    }
    if let Ok(single) = serde_json::from_str::<String>(value) {
        return normalize(&[single]);
    }
    normalize(&[value])
}

/// Re-encode a persisted field into canonical form.
pub fn normalize_field(raw: &str) -> String {
    encode(&decode(raw))
}

/// Parse an action label; blank means `set`.
pub fn parse_action(action: &str) -> StorageResult<StorageAction> {
    StorageAction::from_label(action)
        .ok_or_else(|| StorageError::InvalidAction(action.trim().to_string()))
}

/// Apply a free-text action to the current set.
pub fn apply<S: AsRef<str>, T: AsRef<str>>(
    current: &[S],
    action: &str,
    incoming: &[T],
) -> StorageResult<Vec<String>> {
    let action = parse_action(action).inspect_err(|_| {
        tracing::warn!(action = %action, "Rejected location set action");
    })?;
    Ok(apply_action(current, action, incoming))
}

/// Apply an already-parsed action. Removal is by exact match after trimming.
pub fn apply_action<S: AsRef<str>, T: AsRef<str>>(
    current: &[S],
    action: StorageAction,
    incoming: &[T],
) -> Vec<String> {
    let current = normalize(current);
    let incoming = normalize(incoming);

    let result = match action {
        StorageAction::Set => incoming.clone(),
        StorageAction::Add => {
            let merged: Vec<&String> = current.iter().chain(incoming.iter()).collect();
            normalize(&merged)
        }
        StorageAction::Remove => {
            let remove: HashSet<&str> = incoming.iter().map(String::as_str).collect();
            current
                .iter()
                .filter(|server| !remove.contains(server.as_str()))
                .cloned()
                .collect()
        }
    };

    tracing::debug!(
        action = %action,
        before = current.len(),
        incoming = incoming.len(),
        after = result.len(),
        "Applied location set action"
    );
    result
}

/// Decode a patch value: `null`, a string in any persisted encoding, or an array of strings.
pub fn from_json_value(value: &Value) -> StorageResult<Vec<String>> {
    match value {
        Value::Null => Ok(Vec::new()),
        Value::String(text) => Ok(decode(text)),
        Value::Array(items) => {
            let mut servers = Vec::with_capacity(items.len());
            for (i, item) in items.iter().enumerate() {
                match item.as_str() {
                    Some(server) => servers.push(server),
                    None => {
                        return Err(StorageError::InvalidLocationValue(format!(
                            "storage_servers[{}] must be a string",
                            i
                        )))
                    }
                }
            }
            Ok(normalize(&servers))
        }
        _ => Err(StorageError::InvalidLocationValue(
            "storage_server must be a string, string array or null".to_string(),
        )),
    }
}

/// Whether any entry names the cloud netdisk.
pub fn contains_cloud<S: AsRef<str>>(servers: &[S]) -> bool {
    servers
        .iter()
        .any(|server| StorageBackend::is_cloud_label(server.as_ref()))
}

/// Whether a storage-server label refers to the machine running the service.
pub fn is_local_label(label: &str) -> bool {
    matches!(
        label.trim().to_lowercase().as_str(),
        "" | "backend" | "local" | "localhost" | "127.0.0.1" | "::1"
    )
}

/// Request body for a location set mutation. `storage_server` and
/// `storage_servers` are merged, single entry first. Either field accepts
/// `null`, a string in any persisted encoding, or an array of strings.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct LocationUpdate {
    #[serde(default)]
    pub action: String,
    #[serde(default, deserialize_with = "deserialize_servers")]
    pub storage_server: Vec<String>,
    #[serde(default, deserialize_with = "deserialize_servers")]
    pub storage_servers: Vec<String>,
}

fn deserialize_servers<'de, D>(deserializer: D) -> Result<Vec<String>, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Value::deserialize(deserializer)?;
    from_json_value(&value).map_err(serde::de::Error::custom)
}

impl LocationUpdate {
    pub fn normalize(&self) -> StorageResult<(StorageAction, Vec<String>)> {
        let action = parse_action(&self.action)?;
        let servers: Vec<&String> = self
            .storage_server
            .iter()
            .chain(self.storage_servers.iter())
            .collect();
        Ok((action, normalize(&servers)))
    }
}

/// Location set as reported back to callers.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LocationSummary {
    pub id: i64,
    /// First entry, empty when the set is empty.
    pub storage_server: String,
    pub storage_servers: Vec<String>,
}

impl LocationSummary {
    pub fn new(id: i64, servers: Vec<String>) -> Self {
        Self {
            id,
            storage_server: servers.first().cloned().unwrap_or_default(),
            storage_servers: servers,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn normalize_trims_dedupes_and_keeps_order() {
        let list = normalize(&[" cloud ", "", "backend", "cloud", "  ", "Cloud"]);
        assert_eq!(list, vec!["cloud", "backend", "Cloud"]);
    }

    #[test]
    fn normalize_is_idempotent() {
        let once = normalize(&["a", " b", "a", "", "c "]);
        assert_eq!(normalize(&once), once);
    }

    #[test]
    fn encode_produces_json_array() {
        assert_eq!(encode(&["backend", " backend", "baidu_netdisk"]), r#"["backend","baidu_netdisk"]"#);
        assert_eq!(encode::<&str>(&[]), "[]");
    }

    #[test]
    fn decode_accepts_every_legacy_encoding() {
        let expected = vec!["baidu_netdisk".to_string()];
        assert_eq!(decode(r#"["baidu_netdisk"]"#), expected);
        assert_eq!(decode(r#""baidu_netdisk""#), expected);
        assert_eq!(decode(" baidu_netdisk "), expected);
        assert!(decode("   ").is_empty());
    }

    #[test]
    fn decode_treats_json_null_as_empty() {
        assert!(decode("null").is_empty());
        assert!(decode(" null ").is_empty());
        assert_eq!(normalize_field("null"), "[]");
        assert!(from_json_value(&json!("null")).unwrap().is_empty());
    }

    #[test]
    fn decode_falls_back_to_raw_for_non_string_arrays() {
        assert_eq!(decode("[1, 2]"), vec!["[1, 2]".to_string()]);
    }

    #[test]
    fn decode_of_encode_is_normalize() {
        let list = vec![" gpu-01", "backend", "gpu-01", ""];
        assert_eq!(decode(&encode(&list)), normalize(&list));
        assert_eq!(normalize_field(r#""backend""#), r#"["backend"]"#);
    }

    #[test]
    fn set_replaces_with_normalized_incoming() {
        let result = apply(&["backend"], "", &[" cloud", "cloud"]).unwrap();
        assert_eq!(result, vec!["cloud"]);
    }

    #[test]
    fn add_then_remove_restores_current() {
        let current = vec!["backend", " gpu-01", "backend"];
        let added = apply(&current, "ADD", &["baidu_netdisk"]).unwrap();
        assert_eq!(added, vec!["backend", "gpu-01", "baidu_netdisk"]);

        let removed = apply(&added, " remove ", &["baidu_netdisk"]).unwrap();
        assert_eq!(removed, normalize(&current));
    }

    #[test]
    fn remove_is_exact_match() {
        let result = apply(&["Backend", "backend"], "remove", &["backend"]).unwrap();
        assert_eq!(result, vec!["Backend"]);
    }

    #[test]
    fn unknown_action_is_rejected() {
        assert!(matches!(
            apply(&["backend"], "merge", &["cloud"]),
            Err(StorageError::InvalidAction(_))
        ));
    }

    #[test]
    fn json_value_patch_decoding() {
        assert!(from_json_value(&Value::Null).unwrap().is_empty());
        assert_eq!(
            from_json_value(&json!(r#"["a","b"]"#)).unwrap(),
            vec!["a", "b"]
        );
        assert_eq!(from_json_value(&json!([" a", "a", "b"])).unwrap(), vec!["a", "b"]);
        assert!(matches!(
            from_json_value(&json!(["a", 1])),
            Err(StorageError::InvalidLocationValue(_))
        ));
        assert!(from_json_value(&json!(42)).is_err());
    }

    #[test]
    fn location_update_merges_single_and_list() {
        let update: LocationUpdate = serde_json::from_value(json!({
            "storage_server": " backend ",
            "storage_servers": ["cloud", "backend", ""]
        }))
        .unwrap();
        let (action, servers) = update.normalize().unwrap();
        assert_eq!(action, StorageAction::Set);
        assert_eq!(servers, vec!["backend", "cloud"]);
    }

    #[test]
    fn location_update_accepts_legacy_and_null_values() {
        let update: LocationUpdate = serde_json::from_value(json!({
            "action": "add",
            "storage_server": null,
            "storage_servers": r#"["gpu-01","baidu_netdisk"]"#
        }))
        .unwrap();
        let (action, servers) = update.normalize().unwrap();
        assert_eq!(action, StorageAction::Add);
        assert_eq!(servers, vec!["gpu-01", "baidu_netdisk"]);

        let bad = serde_json::from_value::<LocationUpdate>(json!({ "storage_servers": [1] }));
        assert!(bad.is_err());

        let update: LocationUpdate = serde_json::from_value(json!({ "action": "merge" })).unwrap();
        assert!(matches!(update.normalize(), Err(StorageError::InvalidAction(_))));
    }

    #[test]
    fn cloud_and_local_labels() {
        assert!(contains_cloud(&["backend", "Baidu"]));
        assert!(!contains_cloud(&["backend", "gpu-01"]));
        assert!(is_local_label(" LOCALHOST "));
        assert!(!is_local_label("gpu-01"));
    }

    #[test]
    fn summary_reports_primary_entry() {
        let summary = LocationSummary::new(3, vec!["cloud".to_string(), "backend".to_string()]);
        assert_eq!(summary.storage_server, "cloud");
        assert!(LocationSummary::new(4, Vec::new()).storage_server.is_empty());
    }
}
