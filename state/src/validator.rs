//! Structural validation of untrusted state candidates
//!
//! Checks only the shape the persistence layer depends on: every entity
//! collection present and an array, settings present and an object.
//! Individual entity fields are the CRUD layer's business.

use memorybank_core::{MemoryBankError, MemoryBankResult, COLLECTION_FIELDS, SETTINGS_FIELD};
use serde_json::Value;

/// Check a candidate, naming the first offending field on failure
pub fn check(candidate: &Value) -> MemoryBankResult<()> {
    let object = candidate
        .as_object()
        .ok_or_else(|| MemoryBankError::Validation("state is not an object".into()))?;

    for field in COLLECTION_FIELDS {
        match object.get(field) {
            None => {
                return Err(MemoryBankError::Validation(format!("missing field `{}`", field)))
            }
            Some(value) if !value.is_array() => {
                return Err(MemoryBankError::Validation(format!(
                    "field `{}` is not a sequence",
                    field
                )))
            }
            Some(_) => {}
        }
    }

    match object.get(SETTINGS_FIELD) {
        None => Err(MemoryBankError::Validation(format!(
            "missing field `{}`",
            SETTINGS_FIELD
        ))),
        Some(Value::Object(_)) => Ok(()),
        Some(Value::Array(_)) => Err(MemoryBankError::Validation(format!(
            "field `{}` is a sequence",
            SETTINGS_FIELD
        ))),
        Some(_) => Err(MemoryBankError::Validation(format!(
            "field `{}` is not a record",
            SETTINGS_FIELD
        ))),
    }
}

/// Whether a candidate has the shape of a persisted state
pub fn validate(candidate: &Value) -> bool {
    check(candidate).is_ok()
}
