//! Validation Utilities
//!
//! Inbound event payloads arrive as untyped JSON. Every handler declares its
//! input contract as a `Deserialize + Validate` struct and goes through
//! [`parse_payload`].

use serde::de::DeserializeOwned;
use serde_json::Value;
use validator::{Validate, ValidationErrors};

use super::error::AppError;

/// Convert validation errors to AppError, reporting the first failing field.
pub fn validation_error(errors: ValidationErrors) -> AppError {
    let message = errors
        .field_errors()
        .iter()
        .flat_map(|(field, errs)| {
            errs.iter().map(move |e| {
                let detail = e
                    .message
                    .clone()
                    .map(|m| m.to_string())
                    .unwrap_or_else(|| e.code.to_string());
                format!("{}: {}", field, detail)
            })
        })
        .next()
        .unwrap_or_else(|| "Validation failed".into());

    AppError::Validation(message)
}

/// Deserialize and validate an event payload.
pub fn parse_payload<P>(data: Value) -> Result<P, AppError>
where
    P: DeserializeOwned + Validate,
{
    let payload: P = serde_json::from_value(data)?;
    payload.validate().map_err(validation_error)?;
    Ok(payload)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde::Deserialize;
    use serde_json::json;

    #[derive(Debug, Deserialize, Validate)]
    #[serde(rename_all = "camelCase")]
    struct Sample {
        #[validate(length(min = 1, max = 8))]
        emoji: String,
    }

    #[test]
    fn test_parse_payload_accepts_valid_input() {
        let sample: Sample = parse_payload(json!({ "emoji": "👍" })).unwrap();
        assert_eq!(sample.emoji, "👍");
    }

    #[test]
    fn test_parse_payload_rejects_missing_field() {
        let err = parse_payload::<Sample>(json!({})).unwrap_err();
        assert_eq!(err.code(), "validation_error");
    }

    #[test]
    fn test_parse_payload_reports_failing_field() {
        let err = parse_payload::<Sample>(json!({ "emoji": "" })).unwrap_err();
        assert!(err.to_string().contains("emoji"));
    }
}
