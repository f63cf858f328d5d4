//! Machine-readable output envelope.
//!
//! Under `--json` the process writes exactly one envelope to stdout and
//! nothing else:
//! `{"success": bool, "data"?: ..., "error"?: {code, message, details?}}`.

use serde_json::{json, Value};

use daf_core::CoreError;

/// Builds the success envelope.
pub fn success(data: Value) -> String {
    json!({
        "success": true,
        "data": data,
    })
    .to_string()
}

/// Builds the failure envelope for an error.
pub fn failure(error: &CoreError) -> String {
    let mut body = json!({
        "code": error.code(),
        "message": error.to_string(),
    });
    if let Some(details) = error.details() {
        body["details"] = details;
    }
    json!({
        "success": false,
        "error": body,
    })
    .to_string()
}

/// Formats a duration as `2h 15m`.
pub fn format_duration(duration: chrono::Duration) -> String {
    let minutes = duration.num_minutes();
    if minutes < 60 {
        format!("{}m", minutes)
    } else {
        format!("{}h {}m", minutes / 60, minutes % 60)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::BTreeMap;
    use daf_tracker::TrackerError;

    #[test]
    fn test_success_envelope() {
        let envelope = success(json!({"name": "feat-x"}));
        let value: Value = serde_json::from_str(&envelope).unwrap();
        assert_eq!(value["success"], true);
        assert_eq!(value["data"]["name"], "feat-x");
        assert!(value.get("error").is_none());
    }

    #[test]
    fn test_validation_failure_envelope() {
        let error = CoreError::Tracker(TrackerError::Validation {
            field_errors: BTreeMap::from([(
                "customfield_10010".to_string(),
                "required".to_string(),
            )]),
        });
        let envelope = failure(&error);
        let value: Value = serde_json::from_str(&envelope).unwrap();

        assert_eq!(value["success"], false);
        assert_eq!(value["error"]["code"], "VALIDATION_ERROR");
        assert_eq!(
            value["error"]["details"]["field_errors"]["customfield_10010"],
            "required"
        );
    }

    #[test]
    fn test_safety_refusal_envelope() {
        let error = CoreError::SafetyRefused("'new' cannot run inside agent".to_string());
        let value: Value = serde_json::from_str(&failure(&error)).unwrap();
        assert_eq!(value["error"]["code"], "SAFETY_REFUSED");
        assert!(value["error"]["message"]
            .as_str()
            .unwrap()
            .contains("inside agent"));
    }

    #[test]
    fn test_format_duration() {
        assert_eq!(format_duration(chrono::Duration::minutes(42)), "42m");
        assert_eq!(format_duration(chrono::Duration::minutes(135)), "2h 15m");
        assert_eq!(format_duration(chrono::Duration::zero()), "0m");
    }
}
