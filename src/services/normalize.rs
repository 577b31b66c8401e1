use crate::error::{PipelineError, PipelineResult};
use crate::models::telemetry::{RawRecord, Reading};
use chrono::{DateTime, NaiveDate, NaiveDateTime, Utc};
use serde_json::Value;
use std::collections::HashSet;

/// Candidate field names per canonical field, canonical name first. First
/// match against the batch's normalized key set wins.
const TIMESTAMP_FIELDS: &[&str] = &["datetime", "ts"];
const CURRENT_FIELDS: &[&str] = &["current", "curr", "i", "amps"];
const TEMPERATURE_FIELDS: &[&str] = &["temperature", "temp", "t"];

/// Source keys (already normalized) that one device batch resolved to.
struct ResolvedFields {
    timestamp: String,
    current: String,
    temperature: String,
}

/// Validate and coerce one device's raw records into canonical readings.
///
/// Column resolution happens once per batch. Per row: non-numeric current or
/// temperature drops the row, an unparseable timestamp drops the row, and
/// negative current is clamped to zero. Rows are never retained with a null
/// timestamp or defaulted metric values.
pub fn normalize_device(device: &str, records: &[RawRecord]) -> PipelineResult<Vec<Reading>> {
    let fields = resolve_fields(device, records)?;

    let mut readings = Vec::with_capacity(records.len());
    for record in records {
        let Some(timestamp) = field_value(record, &fields.timestamp).and_then(parse_timestamp)
        else {
            continue;
        };
        let Some(current) = field_value(record, &fields.current).and_then(numeric_value) else {
            continue;
        };
        let Some(temperature) =
            field_value(record, &fields.temperature).and_then(numeric_value)
        else {
            continue;
        };

        readings.push(Reading {
            device_id: device.to_string(),
            timestamp,
            current: current.max(0.0),
            temperature,
        });
    }

    Ok(readings)
}

fn resolve_fields(device: &str, records: &[RawRecord]) -> PipelineResult<ResolvedFields> {
    let keys: HashSet<String> = records
        .iter()
        .flat_map(|record| record.keys())
        .map(|key| normalize_key(key))
        .collect();

    let find = |candidates: &[&str]| {
        candidates
            .iter()
            .find(|candidate| keys.contains(**candidate))
            .map(|candidate| candidate.to_string())
    };

    let timestamp = find(TIMESTAMP_FIELDS);
    let current = find(CURRENT_FIELDS);
    let temperature = find(TEMPERATURE_FIELDS);

    let mut missing = Vec::new();
    if timestamp.is_none() {
        missing.push("datetime");
    }
    if current.is_none() {
        missing.push("current");
    }
    if temperature.is_none() {
        missing.push("temperature");
    }

    if !missing.is_empty() {
        return Err(PipelineError::Schema {
            device: device.to_string(),
            missing: missing.join(", "),
        });
    }

    Ok(ResolvedFields {
        timestamp: timestamp.unwrap(),
        current: current.unwrap(),
        temperature: temperature.unwrap(),
    })
}

fn normalize_key(key: &str) -> String {
    key.trim().to_ascii_lowercase()
}

/// Look a resolved field up in one record, tolerating per-row key casing.
fn field_value<'a>(record: &'a RawRecord, resolved: &str) -> Option<&'a Value> {
    record
        .iter()
        .find(|(key, _)| normalize_key(key) == resolved)
        .map(|(_, value)| value)
}

fn numeric_value(value: &Value) -> Option<f64> {
    let parsed = match value {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.trim().parse::<f64>().ok(),
        _ => None,
    };
    parsed.filter(|v| v.is_finite())
}

/// Best-effort timestamp parsing: RFC 3339, common date-time layouts, or a
/// numeric epoch (seconds, or milliseconds above 1e12).
fn parse_timestamp(value: &Value) -> Option<DateTime<Utc>> {
    match value {
        Value::String(s) => {
            let s = s.trim();
            if let Ok(dt) = DateTime::parse_from_rfc3339(s) {
                return Some(dt.with_timezone(&Utc));
            }
            for format in ["%Y-%m-%dT%H:%M:%S%.f", "%Y-%m-%d %H:%M:%S%.f"] {
                if let Ok(naive) = NaiveDateTime::parse_from_str(s, format) {
                    return Some(naive.and_utc());
                }
            }
            if let Ok(date) = NaiveDate::parse_from_str(s, "%Y-%m-%d") {
                return Some(date.and_hms_opt(0, 0, 0)?.and_utc());
            }
            None
        }
        Value::Number(n) => {
            let epoch = n.as_f64().filter(|v| v.is_finite())?;
            let millis = if epoch.abs() >= 1e12 {
                epoch as i64
            } else {
                (epoch * 1000.0) as i64
            };
            DateTime::from_timestamp_millis(millis)
        }
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn record(value: serde_json::Value) -> RawRecord {
        value.as_object().unwrap().clone()
    }

    #[test]
    fn resolves_canonical_names_first() {
        let records = vec![record(json!({
            "datetime": "2024-03-01T10:00:00Z",
            "current": 4.2,
            "temperature": 31.5,
            // Alias present alongside the canonical name; canonical wins.
            "temp": 99.0,
        }))];

        let readings = normalize_device("device5", &records).unwrap();
        assert_eq!(readings.len(), 1);
        assert_eq!(readings[0].temperature, 31.5);
        assert_eq!(readings[0].current, 4.2);
    }

    #[test]
    fn resolves_aliases_case_insensitively() {
        let records = vec![record(json!({
            " TS ": "2024-03-01 10:00:00",
            "Amps": "3.5",
            "T": 28.0,
        }))];

        let readings = normalize_device("device6", &records).unwrap();
        assert_eq!(readings.len(), 1);
        assert_eq!(readings[0].current, 3.5);
        assert_eq!(readings[0].temperature, 28.0);
    }

    #[test]
    fn missing_temperature_alias_is_a_schema_error() {
        let records = vec![record(json!({
            "ts": "2024-03-01T10:00:00Z",
            "current": 1.0,
            "thermal": 30.0,
        }))];

        let err = normalize_device("device7", &records).unwrap_err();
        match err {
            PipelineError::Schema { device, missing } => {
                assert_eq!(device, "device7");
                assert_eq!(missing, "temperature");
            }
            other => panic!("expected schema error, got {other:?}"),
        }
    }

    #[test]
    fn empty_record_set_is_a_schema_error() {
        let err = normalize_device("device5", &[]).unwrap_err();
        assert!(matches!(err, PipelineError::Schema { .. }));
    }

    #[test]
    fn non_numeric_rows_are_dropped_not_defaulted() {
        let records = vec![
            record(json!({"ts": "2024-03-01T10:00:00Z", "i": "n/a", "t": 30.0})),
            record(json!({"ts": "2024-03-01T10:01:00Z", "i": 2.0, "t": 30.5})),
        ];

        let readings = normalize_device("device5", &records).unwrap();
        assert_eq!(readings.len(), 1);
        assert_eq!(readings[0].current, 2.0);
    }

    #[test]
    fn unparseable_timestamps_drop_the_row() {
        let records = vec![
            record(json!({"ts": "not-a-date", "i": 2.0, "t": 30.0})),
            record(json!({"ts": 1709287200, "i": 2.5, "t": 30.0})),
        ];

        let readings = normalize_device("device5", &records).unwrap();
        assert_eq!(readings.len(), 1);
        assert_eq!(readings[0].current, 2.5);
        assert_eq!(
            readings[0].timestamp,
            DateTime::parse_from_rfc3339("2024-03-01T10:00:00Z").unwrap()
        );
    }

    #[test]
    fn negative_current_is_clamped_to_zero() {
        let records = vec![record(json!({
            "ts": "2024-03-01T10:00:00Z",
            "current": -4.0,
            "temp": 25.0,
        }))];

        let readings = normalize_device("device5", &records).unwrap();
        assert_eq!(readings[0].current, 0.0);
    }

    #[test]
    fn millisecond_epochs_are_recognized() {
        let records = vec![record(json!({
            "ts": 1709287200000i64,
            "i": 1.0,
            "t": 25.0,
        }))];

        let readings = normalize_device("device5", &records).unwrap();
        assert_eq!(
            readings[0].timestamp,
            DateTime::parse_from_rfc3339("2024-03-01T10:00:00Z").unwrap()
        );
    }
}
