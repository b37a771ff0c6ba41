//! Wire format of inbound classification events
//!
//! Producers publish JSON objects with at least an `id`. Known fields are
//! picked out; if there is no explicit `result`, whatever else the producer
//! sent becomes the result.

use chrono::{DateTime, SubsecRound, TimeZone, Utc};
use serde::{Deserialize, Deserializer};
use serde_json::{Map, Number, Value};
use url::Url;

use super::ConsumerError;
use crate::types::HistoryEntry;

#[derive(Debug, Deserialize)]
struct WireEvent {
    id: WireId,
    #[serde(default)]
    timestamp: Option<WireTimestamp>,
    #[serde(default)]
    prompt: Option<String>,
    /// `None` when the field is absent; an explicit `null` is kept
    #[serde(default, deserialize_with = "present")]
    result: Option<Value>,
    #[serde(flatten)]
    rest: Map<String, Value>,
}

fn present<'de, D>(deserializer: D) -> Result<Option<Value>, D::Error>
where
    D: Deserializer<'de>,
{
    Value::deserialize(deserializer).map(Some)
}

#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum WireId {
    Text(String),
    Number(Number),
}

impl WireId {
    fn into_string(self) -> String {
        match self {
            WireId::Text(text) => text.trim().to_string(),
            WireId::Number(n) => n.to_string(),
        }
    }
}

#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum WireTimestamp {
    Rfc3339(DateTime<Utc>),
    EpochMillis(i64),
}

impl WireTimestamp {
    fn resolve(self) -> Option<DateTime<Utc>> {
        match self {
            WireTimestamp::Rfc3339(ts) => Some(ts),
            WireTimestamp::EpochMillis(ms) => Utc.timestamp_millis_opt(ms).single(),
        }
    }
}

/// Turn a raw bus payload into a history entry.
///
/// `received_at` stands in for a missing timestamp.
pub fn parse_event(
    payload: &[u8],
    source_base: &Url,
    received_at: DateTime<Utc>,
) -> Result<HistoryEntry, ConsumerError> {
    let wire: WireEvent = serde_json::from_slice(payload)?;

    let id = wire.id.into_string();
    if id.is_empty() {
        return Err(ConsumerError::EmptyId);
    }
    // Dot segments would be resolved against the base instead of appended
    if id.chars().all(|c| c == '.') {
        return Err(ConsumerError::InvalidId(id));
    }

    let timestamp = match wire.timestamp {
        Some(ts) => ts.resolve().ok_or(ConsumerError::InvalidTimestamp)?,
        None => received_at,
    };
    // Postgres keeps microseconds; live updates must match later reads
    let timestamp = timestamp.trunc_subsecs(6);

    let result = wire.result.unwrap_or(Value::Object(wire.rest));

    let source_ref = source_ref(source_base, &id).map_err(|source| ConsumerError::SourceRef {
        id: id.clone(),
        source,
    })?;

    Ok(HistoryEntry {
        id,
        prompt: wire.prompt,
        result,
        source_ref,
        timestamp,
    })
}

/// Append the percent-encoded `id` to the base location.
///
/// `id` must not consist only of dots.
pub fn source_ref(base: &Url, id: &str) -> Result<String, url::ParseError> {
    let mut base = base.clone();
    if !base.path().ends_with('/') {
        let path = format!("{}/", base.path());
        base.set_path(&path);
    }
    base.set_query(None);
    base.set_fragment(None);

    Ok(base.join(&urlencoding::encode(id))?.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn base() -> Url {
        Url::parse("https://docs.example.com/files").unwrap()
    }

    fn received() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2025, 6, 1, 12, 0, 0).unwrap()
    }

    fn parse(payload: &[u8]) -> Result<HistoryEntry, ConsumerError> {
        parse_event(payload, &base(), received())
    }

    #[test]
    fn test_parse_full_event() {
        let payload = br#"{
            "id": "42",
            "prompt": "invoice?",
            "result": {"decision": true},
            "timestamp": "2024-01-01T00:00:00Z"
        }"#;
        let entry = parse(payload).unwrap();

        assert_eq!(entry.id, "42");
        assert_eq!(entry.prompt.as_deref(), Some("invoice?"));
        assert_eq!(entry.result, json!({"decision": true}));
        assert_eq!(entry.source_ref, "https://docs.example.com/files/42");
        assert_eq!(entry.timestamp, Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap());
    }

    #[test]
    fn test_missing_timestamp_uses_receipt_time() {
        let entry = parse(br#"{"id":"9","result":1}"#).unwrap();
        assert_eq!(entry.timestamp, received());
    }

    #[test]
    fn test_timestamps_are_truncated_to_microseconds() {
        let received_at = received() + chrono::Duration::nanoseconds(553_062_632);
        let entry = parse_event(br#"{"id":"9"}"#, &base(), received_at).unwrap();
        assert_eq!(entry.timestamp, received() + chrono::Duration::microseconds(553_062));

        let entry = parse(br#"{"id":"9","timestamp":"2024-01-01T00:00:00.123456789Z"}"#).unwrap();
        assert_eq!(entry.timestamp.timestamp_subsec_nanos(), 123_456_000);
    }

    #[test]
    fn test_epoch_millis_timestamp() {
        let entry = parse(br#"{"id":"9","timestamp":1704067200000}"#).unwrap();
        assert_eq!(entry.timestamp, Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap());
    }

    #[test]
    fn test_extra_fields_become_result_without_explicit_result() {
        let entry = parse(br#"{"id":"5","label":"invoice","confidence":0.93}"#).unwrap();
        assert_eq!(entry.result, json!({"label": "invoice", "confidence": 0.93}));
    }

    #[test]
    fn test_extra_fields_are_tolerated_with_explicit_result() {
        let entry = parse(br#"{"id":"5","result":{"ok":true},"pipeline":"p1"}"#).unwrap();
        assert_eq!(entry.result, json!({"ok": true}));
    }

    #[test]
    fn test_explicit_null_result_is_kept() {
        let entry = parse(br#"{"id":"1","result":null,"pipeline":"p"}"#).unwrap();
        assert_eq!(entry.result, Value::Null);
    }

    #[test]
    fn test_numeric_id_is_accepted() {
        let entry = parse(br#"{"id":77}"#).unwrap();
        assert_eq!(entry.id, "77");
        assert_eq!(entry.source_ref, "https://docs.example.com/files/77");
    }

    #[test]
    fn test_rejects_malformed_payloads() {
        assert!(matches!(parse(b"not json"), Err(ConsumerError::Malformed(_))));
        assert!(matches!(parse(br#"{"result":1}"#), Err(ConsumerError::Malformed(_))));
        assert!(matches!(parse(br#"[1,2]"#), Err(ConsumerError::Malformed(_))));
        assert!(matches!(parse(br#"{"id":"  "}"#), Err(ConsumerError::EmptyId)));
        assert!(matches!(parse(br#"{"id":".."}"#), Err(ConsumerError::InvalidId(_))));
        assert!(matches!(
            parse(br#"{"id":"1","timestamp":"yesterday"}"#),
            Err(ConsumerError::Malformed(_))
        ));
    }

    #[test]
    fn test_source_ref_encodes_id() {
        let base = Url::parse("https://docs.example.com/files/?sig=abc").unwrap();
        assert_eq!(
            source_ref(&base, "a b/c").unwrap(),
            "https://docs.example.com/files/a%20b%2Fc"
        );
    }
}
