use crate::errors::DbError;
use crate::types::Command;

/// Convert a `serde_json::Value` that must be an object into a command mapping.
///
/// # Errors
/// Returns `DbError::Validation` when the value is not an object or holds values BSON cannot
/// represent.
pub fn json_value_to_command(val: &serde_json::Value) -> Result<Command, DbError> {
    let obj = val
        .as_object()
        .ok_or_else(|| DbError::Validation("command must be a JSON object".into()))?;
    Command::try_from(obj.clone()).map_err(|e| DbError::Validation(e.to_string()))
}

/// Parse a JSON string into a command mapping. Key order is preserved.
///
/// # Errors
/// Returns `DbError::Json` for malformed JSON and `DbError::Validation` for non-object input.
pub fn parse_command(json: &str) -> Result<Command, DbError> {
    let val: serde_json::Value = serde_json::from_str(json)?;
    json_value_to_command(&val)
}
