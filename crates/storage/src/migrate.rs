//! Schema versioning for the persisted state document.
//!
//! Documents are upgraded step by step on load, one upcaster per version
//! boundary. A document newer than [`CURRENT_STATE_VERSION`] is refused.

use dashwatch_core::{Error, Result};
use serde_json::{json, Map, Value};

pub const CURRENT_STATE_VERSION: u32 = 2;

/// Upgrades a raw document from `from_version()` to the next version.
pub trait StateUpcaster: Send + Sync {
    fn from_version(&self) -> u32;
    fn upcast(&self, doc: Value) -> Result<Value>;
}

pub struct UpcasterRegistry {
    upcasters: Vec<Box<dyn StateUpcaster>>,
}

impl UpcasterRegistry {
    pub fn new() -> Self {
        Self {
            upcasters: Vec::new(),
        }
    }

    pub fn with_defaults() -> Self {
        let mut registry = Self::new();
        registry.register(Box::new(V1ToV2));
        registry
    }

    pub fn register(&mut self, upcaster: Box<dyn StateUpcaster>) {
        self.upcasters.push(upcaster);
    }

    /// Bring `doc` up to the current version. Returns the upgraded document
    /// without its `version` field.
    pub fn upgrade(&self, mut doc: Value) -> Result<Value> {
        let obj = doc
            .as_object_mut()
            .ok_or_else(|| Error::Storage("state document is not an object".into()))?;
        // Documents written before versioning have no field at all.
        let mut version = match obj.remove("version") {
            None => 1,
            Some(v) => {
                let raw = v
                    .as_u64()
                    .ok_or_else(|| Error::Storage(format!("invalid state version: {}", v)))?;
                u32::try_from(raw).map_err(|_| {
                    Error::Storage(format!(
                        "state version {} is newer than supported version {}",
                        raw, CURRENT_STATE_VERSION
                    ))
                })?
            }
        };

        if version > CURRENT_STATE_VERSION {
            return Err(Error::Storage(format!(
                "state version {} is newer than supported version {}",
                version, CURRENT_STATE_VERSION
            )));
        }

        while version < CURRENT_STATE_VERSION {
            let upcaster = self
                .upcasters
                .iter()
                .find(|u| u.from_version() == version)
                .ok_or_else(|| {
                    Error::Storage(format!("no migration from state version {}", version))
                })?;
            doc = upcaster.upcast(doc)?;
            version += 1;
            tracing::info!(version, "State document migrated");
        }
        Ok(doc)
    }
}

impl Default for UpcasterRegistry {
    fn default() -> Self {
        Self::with_defaults()
    }
}

/// Shape written by the browser extension generation of the monitor.
///
/// Counters and the alert log carry over. Tab records are dropped because
/// their layout differs per dashboard type; the next poll rebuilds them.
struct V1ToV2;

fn v1_kind(kind: &str) -> &'static str {
    match kind {
        "zabbix" => "problem_list",
        "kibana" => "ratio",
        _ => "time_series",
    }
}

fn migrate_alert(alert: &Value) -> Option<Value> {
    let detail = alert.get("detail").and_then(Value::as_str).unwrap_or("");
    let reasons: Vec<&str> = detail.split(" + ").filter(|s| !s.is_empty()).collect();
    Some(json!({
        "id": uuid::Uuid::new_v4().to_string(),
        "timestamp": alert.get("time")?.as_i64()?,
        "tabId": value_to_id(alert.get("tabId")?)?,
        "tabTitle": alert.get("tabTitle").and_then(Value::as_str).unwrap_or(""),
        "snapshotType": v1_kind(alert.get("type").and_then(Value::as_str).unwrap_or("")),
        "reasons": reasons,
    }))
}

fn value_to_id(v: &Value) -> Option<String> {
    match v {
        Value::String(s) => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}

impl StateUpcaster for V1ToV2 {
    fn from_version(&self) -> u32 {
        1
    }

    fn upcast(&self, doc: Value) -> Result<Value> {
        let old = match doc {
            Value::Object(map) => map,
            _ => return Err(Error::Storage("v1 state is not an object".into())),
        };
        let mut new = Map::new();

        if let Some(running) = old.get("isRunning").and_then(Value::as_bool) {
            new.insert("isRunning".into(), json!(running));
        }
        if let Some(start) = old.get("startTime").and_then(Value::as_i64) {
            new.insert("startedAt".into(), json!(start));
        }
        if let Some(last) = old.get("lastCheck").and_then(Value::as_i64) {
            new.insert("lastPollAt".into(), json!(last));
        }
        if let Some(total) = old.get("totalChecks").and_then(Value::as_u64) {
            new.insert("totalPolls".into(), json!(total));
        }

        let muted: Vec<String> = old
            .get("mutedTabs")
            .and_then(Value::as_object)
            .map(|m| {
                m.iter()
                    .filter(|(_, v)| v.as_bool() == Some(true))
                    .map(|(k, _)| k.clone())
                    .collect()
            })
            .unwrap_or_default();
        new.insert("mutedTabIds".into(), json!(muted));

        let alerts: Vec<Value> = old
            .get("alerts")
            .and_then(Value::as_array)
            .map(|a| a.iter().filter_map(migrate_alert).collect())
            .unwrap_or_default();
        new.insert("alerts".into(), Value::Array(alerts));

        if let Some(rev) = old.get("revolver").and_then(Value::as_object) {
            let interval = rev.get("interval").and_then(Value::as_u64).unwrap_or(3000);
            new.insert(
                "revolver".into(),
                json!({
                    "enabled": rev.get("enabled").and_then(Value::as_bool).unwrap_or(false),
                    "intervalMs": interval,
                }),
            );
        }

        Ok(Value::Object(new))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_current_version_passes_through() {
        let doc = json!({"version": 2, "totalPolls": 3});
        let out = UpcasterRegistry::default().upgrade(doc).unwrap();
        assert_eq!(out, json!({"totalPolls": 3}));
    }

    #[test]
    fn test_newer_version_rejected() {
        let err = UpcasterRegistry::default()
            .upgrade(json!({"version": 3}))
            .unwrap_err();
        assert!(err.to_string().contains("newer"));
    }

    #[test]
    fn test_oversized_version_is_not_truncated() {
        let huge = (1u64 << 32) + u64::from(CURRENT_STATE_VERSION);
        let err = UpcasterRegistry::default()
            .upgrade(json!({"version": huge}))
            .unwrap_err();
        assert!(err.to_string().contains("newer"));
        assert!(UpcasterRegistry::default().upgrade(json!({"version": "2"})).is_err());
    }

    #[test]
    fn test_missing_step_is_an_error() {
        let registry = UpcasterRegistry::new();
        assert!(registry.upgrade(json!({"version": 1})).is_err());
    }

    #[test]
    fn test_v1_shape_is_converted() {
        let v1 = json!({
            "isRunning": false,
            "startTime": 1000,
            "lastCheck": 2000,
            "totalChecks": 7,
            "tabs": {"12": {"type": "grafana", "status": "ALERT"}},
            "mutedTabs": {"12": true, "13": false},
            "alerts": [
                {"time": 1500, "tabId": 12, "tabTitle": "CPU", "type": "grafana",
                 "detail": "zero + page: DOWN"},
                {"time": "bad"}
            ],
            "revolver": {"enabled": true, "interval": 5000}
        });
        let out = UpcasterRegistry::default().upgrade(v1).unwrap();
        assert_eq!(out["isRunning"], false);
        assert_eq!(out["startedAt"], 1000);
        assert_eq!(out["lastPollAt"], 2000);
        assert_eq!(out["totalPolls"], 7);
        assert_eq!(out["mutedTabIds"], json!(["12"]));
        assert!(out.get("tabs").is_none());
        let alerts = out["alerts"].as_array().unwrap();
        assert_eq!(alerts.len(), 1);
        assert_eq!(alerts[0]["tabId"], "12");
        assert_eq!(alerts[0]["snapshotType"], "time_series");
        assert_eq!(alerts[0]["reasons"], json!(["zero", "page: DOWN"]));
        assert_eq!(out["revolver"]["intervalMs"], 5000);
    }
}
