//! Request checks that run before any store call.

use serde_json::Value;

use crate::errors::{ApiError, FieldError};
use crate::storage::{Document, ObjectId};

/// Fields every new travel record must carry.
pub const REQUIRED_FIELDS: [&str; 3] = ["name", "from", "to"];

/// Require `name`, `from` and `to` to be present and non-empty.
/// Every failing field is reported, not just the first.
pub fn validate_create(body: &Document) -> Result<(), ApiError> {
    let errors: Vec<FieldError> = REQUIRED_FIELDS
        .iter()
        .filter_map(|&field| {
            let value = body.get(field);
            if value.map_or(false, is_present) {
                None
            } else {
                Some(FieldError::invalid("body", field, value.cloned()))
            }
        })
        .collect();

    if errors.is_empty() {
        Ok(())
    } else {
        Err(ApiError::Validation(errors))
    }
}

fn is_present(value: &Value) -> bool {
    match value {
        Value::Null => false,
        Value::String(s) => !s.is_empty(),
        Value::Array(items) => !items.is_empty(),
        Value::Bool(_) | Value::Number(_) | Value::Object(_) => true,
    }
}

/// Require a path identifier shaped like a store id.
pub fn validate_identifier(raw: &str) -> Result<ObjectId, ApiError> {
    ObjectId::parse(raw).ok_or_else(|| {
        ApiError::Validation(vec![FieldError::invalid(
            "params",
            "id",
            Some(Value::String(raw.to_string())),
        )])
    })
}
