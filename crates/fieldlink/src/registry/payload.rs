//! Registry push payloads.
//!
//! The workflow layer hands over raw JSON; [`RegistryPayload::from_value`]
//! classifies it once at the facade boundary into an explicit sum type, so
//! the strategy dispatches on a tag instead of re-sniffing shapes.

use std::collections::BTreeMap;

use chrono::Utc;
use serde::Deserialize;
use serde_json::{json, Value};

use crate::error::{ConnectorError, Result};

/// Event status applied when the record does not carry one.
pub const DEFAULT_EVENT_STATUS: &str = "ACTIVE";

/// One collected record destined for a program: where and when it was
/// captured, plus the data element values.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EventRecord {
    pub org_unit: String,
    pub program: String,
    pub program_stage: String,
    /// Capture date; a record without one is stamped at push time.
    #[serde(default)]
    pub occurred_at: Option<String>,
    #[serde(default)]
    pub status: Option<String>,
    #[serde(default)]
    pub data_values: BTreeMap<String, Value>,
}

/// The two accepted registry push shapes.
#[derive(Debug, Clone, PartialEq)]
pub enum RegistryPayload {
    /// A batch of event records for the tracker endpoint.
    Events(Vec<EventRecord>),

    /// A data-value-set document, forwarded verbatim.
    DatasetValues(Value),
}

impl RegistryPayload {
    /// Classify a raw JSON payload.
    ///
    /// A JSON array is a batch of event records; an object carrying a
    /// `dataSet` field is a data-value set. Anything else is rejected.
    pub fn from_value(value: Value) -> Result<Self> {
        match value {
            Value::Array(_) => {
                let events: Vec<EventRecord> = serde_json::from_value(value).map_err(|e| {
                    ConnectorError::UnknownPayloadType(format!("malformed event records: {}", e))
                })?;
                Ok(RegistryPayload::Events(events))
            }
            Value::Object(ref map) if map.contains_key("dataSet") => {
                Ok(RegistryPayload::DatasetValues(value))
            }
            other => Err(ConnectorError::UnknownPayloadType(format!(
                "expected an event array or a data-value set, got: {}",
                json_kind(&other)
            ))),
        }
    }
}

fn json_kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

/// Coerce a data value to the string form the tracker endpoint expects.
///
/// Arrays join with `", "`, booleans become the words `true`/`false`,
/// numbers render in decimal, nulls become empty strings.
pub fn coerce_value(value: &Value) -> String {
    match value {
        Value::Null => String::new(),
        Value::Bool(b) => if *b { "true" } else { "false" }.to_string(),
        Value::Number(n) => n.to_string(),
        Value::String(s) => s.clone(),
        Value::Array(items) => items
            .iter()
            .map(coerce_value)
            .collect::<Vec<_>>()
            .join(", "),
        Value::Object(_) => value.to_string(),
    }
}

/// Transform event records into the tracker import document.
pub fn to_tracker_events(events: &[EventRecord]) -> Value {
    let events: Vec<Value> = events
        .iter()
        .map(|e| {
            let data_values: Vec<Value> = e
                .data_values
                .iter()
                .map(|(data_element, value)| {
                    json!({
                        "dataElement": data_element,
                        "value": coerce_value(value),
                    })
                })
                .collect();

            let occurred_at = e
                .occurred_at
                .clone()
                .unwrap_or_else(|| Utc::now().date_naive().to_string());

            json!({
                "orgUnit": e.org_unit,
                "program": e.program,
                "programStage": e.program_stage,
                "occurredAt": occurred_at,
                "status": e.status.as_deref().unwrap_or(DEFAULT_EVENT_STATUS),
                "dataValues": data_values,
            })
        })
        .collect();

    json!({ "events": events })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn event_json() -> Value {
        json!([{
            "orgUnit": "OU1",
            "program": "PR1",
            "programStage": "PS1",
            "occurredAt": "2024-03-01",
            "dataValues": {
                "deAge": 5,
                "deConsent": true,
                "deColors": ["red", "blue"],
                "deName": "Bob"
            }
        }])
    }

    #[test]
    fn test_array_classifies_as_events() {
        let payload = RegistryPayload::from_value(event_json()).unwrap();
        match payload {
            RegistryPayload::Events(events) => {
                assert_eq!(events.len(), 1);
                assert_eq!(events[0].org_unit, "OU1");
                assert_eq!(events[0].status, None);
            }
            other => panic!("expected events, got {:?}", other),
        }
    }

    #[test]
    fn test_data_set_object_classifies_as_dataset_values() {
        let v = json!({"dataSet": "DS1", "period": "202403", "dataValues": []});
        let payload = RegistryPayload::from_value(v.clone()).unwrap();
        // Forwarded verbatim.
        assert_eq!(payload, RegistryPayload::DatasetValues(v));
    }

    #[test]
    fn test_other_shapes_are_rejected() {
        for v in [json!("text"), json!(42), json!({"period": "202403"}), Value::Null] {
            let err = RegistryPayload::from_value(v).unwrap_err();
            assert_eq!(err.kind(), "unknown_payload_type");
        }
    }

    #[test]
    fn test_coercion_rules() {
        assert_eq!(coerce_value(&json!(true)), "true");
        assert_eq!(coerce_value(&json!(false)), "false");
        assert_eq!(coerce_value(&json!(5)), "5");
        assert_eq!(coerce_value(&json!(2.5)), "2.5");
        assert_eq!(coerce_value(&json!("x")), "x");
        assert_eq!(coerce_value(&json!(["red", "blue"])), "red, blue");
        assert_eq!(coerce_value(&Value::Null), "");
    }

    #[test]
    fn test_tracker_transformation() {
        let payload = RegistryPayload::from_value(event_json()).unwrap();
        let events = match payload {
            RegistryPayload::Events(e) => e,
            _ => unreachable!(),
        };
        let doc = to_tracker_events(&events);

        let event = &doc["events"][0];
        assert_eq!(event["orgUnit"], "OU1");
        assert_eq!(event["programStage"], "PS1");
        assert_eq!(event["status"], DEFAULT_EVENT_STATUS);

        let values: Vec<(&str, &str)> = event["dataValues"]
            .as_array()
            .unwrap()
            .iter()
            .map(|dv| {
                (
                    dv["dataElement"].as_str().unwrap(),
                    dv["value"].as_str().unwrap(),
                )
            })
            .collect();
        assert!(values.contains(&("deAge", "5")));
        assert!(values.contains(&("deConsent", "true")));
        assert!(values.contains(&("deColors", "red, blue")));
        assert!(values.contains(&("deName", "Bob")));
    }

    #[test]
    fn test_missing_occurred_at_is_stamped_at_push_time() {
        let v = json!([{
            "orgUnit": "OU1",
            "program": "PR1",
            "programStage": "PS1",
            "dataValues": {}
        }]);
        let events = match RegistryPayload::from_value(v).unwrap() {
            RegistryPayload::Events(e) => e,
            _ => unreachable!(),
        };
        assert_eq!(events[0].occurred_at, None);

        let doc = to_tracker_events(&events);
        let stamped = doc["events"][0]["occurredAt"].as_str().unwrap();
        // YYYY-MM-DD
        assert_eq!(stamped.len(), 10);
        assert_eq!(&stamped[4..5], "-");
    }

    #[test]
    fn test_explicit_status_is_preserved() {
        let v = json!([{
            "orgUnit": "OU1",
            "program": "PR1",
            "programStage": "PS1",
            "occurredAt": "2024-03-01",
            "status": "COMPLETED",
            "dataValues": {}
        }]);
        let events = match RegistryPayload::from_value(v).unwrap() {
            RegistryPayload::Events(e) => e,
            _ => unreachable!(),
        };
        let doc = to_tracker_events(&events);
        assert_eq!(doc["events"][0]["status"], "COMPLETED");
    }
}
