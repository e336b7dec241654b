use chrono::{DateTime, Utc};
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value as JsonValue;

use phonestore_core::{CorrelationId, StoreId};

/// Envelope for a command travelling over a channel.
///
/// This is the unit a publisher emits and a consumer decodes.
///
/// Notes:
/// - `action` is an open-ended string on the wire; consumers decide whether
///   they recognize it.
/// - `store_id` scopes the command to one store when the action needs it.
/// - `payload` has no shared schema; its shape is fixed per action tag only.
/// - `correlation_id` is unique per publish; `timestamp` is epoch millis.
///   Producers that omit either still decode: a fresh id and `0` are used.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(
    rename_all = "camelCase",
    bound(deserialize = "P: Deserialize<'de> + Default")
)]
pub struct CommandEnvelope<P = JsonValue> {
    action: String,

    #[serde(default)]
    store_id: Option<StoreId>,

    #[serde(default)]
    payload: P,

    #[serde(default, alias = "requestId")]
    correlation_id: CorrelationId,

    #[serde(default, deserialize_with = "deserialize_timestamp")]
    timestamp: i64,
}

impl<P> CommandEnvelope<P> {
    pub fn new(
        action: impl Into<String>,
        store_id: Option<StoreId>,
        payload: P,
        correlation_id: CorrelationId,
        timestamp: i64,
    ) -> Self {
        Self {
            action: action.into(),
            store_id,
            payload,
            correlation_id,
            timestamp,
        }
    }

    /// Build an envelope stamped with a fresh correlation id and the current time.
    pub fn stamped(action: impl Into<String>, store_id: Option<StoreId>, payload: P) -> Self {
        Self::new(
            action,
            store_id,
            payload,
            CorrelationId::new(),
            Utc::now().timestamp_millis(),
        )
    }

    pub fn action(&self) -> &str {
        &self.action
    }

    pub fn store_id(&self) -> Option<&StoreId> {
        self.store_id.as_ref()
    }

    pub fn payload(&self) -> &P {
        &self.payload
    }

    pub fn into_payload(self) -> P {
        self.payload
    }

    pub fn correlation_id(&self) -> CorrelationId {
        self.correlation_id
    }

    pub fn timestamp(&self) -> i64 {
        self.timestamp
    }

    pub fn occurred_at(&self) -> Option<DateTime<Utc>> {
        DateTime::from_timestamp_millis(self.timestamp)
    }
}

impl CommandEnvelope<JsonValue> {
    /// Parse an envelope from its JSON wire form.
    pub fn from_json(bytes: &[u8]) -> Result<Self, serde_json::Error> {
        serde_json::from_slice(bytes)
    }

    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }
}

/// Timestamps arrive as epoch millis, as a digit string, or as RFC 3339 text.
fn deserialize_timestamp<'de, D>(deserializer: D) -> Result<i64, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Raw {
        Millis(i64),
        Text(String),
    }

    match Raw::deserialize(deserializer)? {
        Raw::Millis(ms) => Ok(ms),
        Raw::Text(s) => {
            let s = s.trim();
            if let Ok(ms) = s.parse::<i64>() {
                return Ok(ms);
            }
            DateTime::parse_from_rfc3339(s)
                .map(|dt| dt.timestamp_millis())
                .map_err(|e| serde::de::Error::custom(format!("invalid timestamp {s:?}: {e}")))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn stamped_envelopes_get_distinct_correlation_ids() {
        let a = CommandEnvelope::stamped("GET_ALL_PHONES", None, json!({}));
        let b = CommandEnvelope::stamped("GET_ALL_PHONES", None, json!({}));
        assert_ne!(a.correlation_id(), b.correlation_id());
        assert!(a.occurred_at().is_some());
    }

    #[test]
    fn wire_form_is_camel_case() {
        let env = CommandEnvelope::stamped(
            "DELETE_PHONE_BY_STORE_ID",
            Some("store-1".parse().unwrap()),
            JsonValue::Null,
        );
        let v: JsonValue = serde_json::from_str(&env.to_json().unwrap()).unwrap();
        assert_eq!(v["action"], "DELETE_PHONE_BY_STORE_ID");
        assert_eq!(v["storeId"], "store-1");
        assert_eq!(v["correlationId"], env.correlation_id().to_string());
        assert!(v["timestamp"].is_i64());
    }

    #[test]
    fn accepts_request_id_alias_and_string_timestamps() {
        let cid = CorrelationId::new();
        let raw = json!({
            "action": "ORDER_PHONES",
            "storeId": null,
            "payload": {"orders": []},
            "requestId": cid.to_string(),
            "timestamp": "2024-05-01T10:00:00Z",
        });
        let env = CommandEnvelope::from_json(raw.to_string().as_bytes()).unwrap();
        assert_eq!(env.correlation_id(), cid);
        assert_eq!(env.timestamp(), 1_714_557_600_000);
        assert!(env.store_id().is_none());
    }

    #[test]
    fn tolerates_envelopes_without_correlation_or_timestamp() {
        let raw = json!({"action": "ADD_PHONES", "storeId": "s-1", "payload": []});
        let env = CommandEnvelope::from_json(raw.to_string().as_bytes()).unwrap();
        assert_eq!(env.timestamp(), 0);
        assert_eq!(env.store_id().map(|s| s.as_str()), Some("s-1"));
    }

    #[test]
    fn missing_payload_defaults_to_null() {
        let raw = json!({
            "action": "GET_ALL_PHONES",
            "correlationId": CorrelationId::new().to_string(),
            "timestamp": "1714557600000",
        });
        let env = CommandEnvelope::from_json(raw.to_string().as_bytes()).unwrap();
        assert!(env.payload().is_null());
        assert_eq!(env.timestamp(), 1_714_557_600_000);
    }
}
