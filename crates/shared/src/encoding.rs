use serde_json::{Map, Value};

use crate::domain::ServoButton;
use crate::error::ButtonCodecError;

/// Compact JSON array with camelCase field names, the one canonical persisted
/// form: `[{"name":"Drop","servoOutput":7,"pulseWidth":1900.0}]`.
pub fn encode_buttons(buttons: &[ServoButton]) -> Result<String, ButtonCodecError> {
    serde_json::to_string(buttons).map_err(ButtonCodecError::Encode)
}

/// Lenient decode of a persisted button list. An empty value decodes to the
/// empty list. Array entries that are not objects are skipped; missing or
/// wrong-typed fields coerce to `""`, `0` and `0.0` so sanitization decides
/// what survives.
pub fn decode_buttons(raw: &str) -> Result<Vec<ServoButton>, ButtonCodecError> {
    if raw.trim().is_empty() {
        return Ok(Vec::new());
    }

    let parsed: Value = serde_json::from_str(raw).map_err(ButtonCodecError::Parse)?;
    let Value::Array(entries) = parsed else {
        return Err(ButtonCodecError::NotAnArray);
    };

    let mut buttons = Vec::with_capacity(entries.len());
    for entry in entries {
        let Value::Object(fields) = entry else {
            continue;
        };
        buttons.push(ServoButton {
            name: string_field(&fields, "name"),
            servo_output: int_field(&fields, "servoOutput"),
            pulse_width: float_field(&fields, "pulseWidth"),
        });
    }
    Ok(buttons)
}

fn string_field(fields: &Map<String, Value>, key: &str) -> String {
    fields
        .get(key)
        .and_then(Value::as_str)
        .unwrap_or_default()
        .to_string()
}

fn int_field(fields: &Map<String, Value>, key: &str) -> i64 {
    let value = fields.get(key);
    value
        .and_then(Value::as_i64)
        .or_else(|| value.and_then(Value::as_f64).map(|number| number as i64))
        .unwrap_or(0)
}

fn float_field(fields: &Map<String, Value>, key: &str) -> f64 {
    fields.get(key).and_then(Value::as_f64).unwrap_or(0.0)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::sanitize_buttons;

    #[test]
    fn encodes_compact_camel_case() {
        let buttons = vec![ServoButton::new("Drop", 7, 1900.0)];

        let encoded = encode_buttons(&buttons).expect("encode");

        assert_eq!(
            encoded,
            r#"[{"name":"Drop","servoOutput":7,"pulseWidth":1900.0}]"#
        );
    }

    #[test]
    fn decodes_empty_and_blank_input_to_empty_list() {
        assert_eq!(decode_buttons("").expect("empty"), Vec::new());
        assert_eq!(decode_buttons("   ").expect("blank"), Vec::new());
    }

    #[test]
    fn rejects_input_that_is_not_json() {
        let result = decode_buttons("not json at all");

        assert!(matches!(result, Err(ButtonCodecError::Parse(_))));
    }

    #[test]
    fn rejects_json_that_is_not_an_array() {
        let result = decode_buttons(r#"{"name":"Drop"}"#);

        assert!(matches!(result, Err(ButtonCodecError::NotAnArray)));
    }

    #[test]
    fn skips_entries_that_are_not_objects() {
        let decoded = decode_buttons(r#"[{"name":"A","servoOutput":1,"pulseWidth":1000},42,"x"]"#)
            .expect("decode");

        assert_eq!(decoded, vec![ServoButton::new("A", 1, 1000.0)]);
    }

    #[test]
    fn coerces_missing_and_wrong_typed_fields() {
        let decoded =
            decode_buttons(r#"[{"servoOutput":"seven","pulseWidth":true},{"name":"B"}]"#)
                .expect("decode");

        assert_eq!(
            decoded,
            vec![ServoButton::new("", 0, 0.0), ServoButton::new("B", 0, 0.0)]
        );
    }

    #[test]
    fn accepts_whole_numbers_for_either_numeric_field() {
        let decoded = decode_buttons(r#"[{"name":"A","servoOutput":2.0,"pulseWidth":1500}]"#)
            .expect("decode");

        assert_eq!(decoded, vec![ServoButton::new("A", 2, 1500.0)]);
    }

    #[test]
    fn round_trips_a_sanitized_list() {
        let list = sanitize_buttons(&[
            ServoButton::new("A", 1, 1000.0),
            ServoButton::new(" ", 9, 900.0),
            ServoButton::new("B", 2, 1500.5),
        ]);

        let decoded = decode_buttons(&encode_buttons(&list).expect("encode")).expect("decode");

        assert_eq!(decoded, list);
    }
}
