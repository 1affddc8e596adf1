//! Payload validation against a stored Draft-07 schema.

use serde::{Deserialize, Serialize};

use crate::error::{RegistryError, Result};

/// One schema violation, anchored to a JSON pointer in the payload.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProtocolValidationError {
    /// JSON pointer into the payload (`/text`, `/items/0`).
    pub path: String,
    /// The failed schema keyword (`type`, `required`, `maxLength`).
    pub constraint: String,
    /// What the schema wanted, as reported by the validator.
    pub expected: String,
    /// The offending payload fragment, if reasonably small.
    pub actual: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ValidationResult {
    pub valid: bool,
    pub errors: Vec<ProtocolValidationError>,
}

impl ValidationResult {
    #[must_use]
    pub fn ok() -> Self {
        Self {
            valid: true,
            errors: Vec::new(),
        }
    }
}

const MAX_ACTUAL_LEN: usize = 120;

/// Compile `schema` as Draft-07 and collect every violation in `payload`.
pub fn validate_payload(
    schema: &serde_json::Value,
    payload: &serde_json::Value,
) -> Result<ValidationResult> {
    let validator = jsonschema::options()
        .with_draft(jsonschema::Draft::Draft7)
        .build(schema)
        .map_err(|e| RegistryError::InvalidSchema(e.to_string()))?;

    let errors: Vec<ProtocolValidationError> = validator
        .iter_errors(payload)
        .map(|err| {
            let constraint = err
                .schema_path()
                .as_str()
                .rsplit('/')
                .next()
                .unwrap_or("schema")
                .to_string();
            let actual = {
                let rendered = err.instance().to_string();
                (rendered.len() <= MAX_ACTUAL_LEN).then_some(rendered)
            };
            ProtocolValidationError {
                path: err.instance_path().as_str().to_string(),
                constraint,
                expected: err.to_string(),
                actual,
            }
        })
        .collect();

    Ok(ValidationResult {
        valid: errors.is_empty(),
        errors,
    })
}
