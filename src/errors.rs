use std::fmt;

use thiserror::Error;

#[derive(Debug, Error)]
pub enum DbError {
    #[error("I/O error: {0}")]
    Io(String),

    #[error("Serde JSON: {0}")]
    Json(#[from] serde_json::Error),

    #[error("BSON: {0}")]
    Bson(#[from] bson::error::Error),

    #[error("TOML: {0}")]
    Toml(#[from] toml::de::Error),

    #[error("Configuration error: {0}")]
    Config(String),

    /// Malformed command input caught before anything is sent to the store.
    #[error("Validation error: {0}")]
    Validation(String),

    /// The store answered with an error message.
    #[error("Driver error: {0}")]
    Driver(String),

    #[error("Cursor error: {0}")]
    Cursor(String),

    /// Non-recoverable attribute write/delete on an entity.
    #[error("Cannot {action} attribute {type_name}.{attribute}: {reason}")]
    AttributeMutation {
        type_name: String,
        attribute: String,
        action: MutationAction,
        reason: MutationFailure,
    },
}

impl From<std::io::Error> for DbError {
    fn from(e: std::io::Error) -> Self {
        Self::Io(e.to_string())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MutationAction {
    Set,
    Unset,
}

impl fmt::Display for MutationAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Set => f.write_str("set"),
            Self::Unset => f.write_str("unset"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MutationFailure {
    /// `_id` never changes after creation.
    IdentityImmutable,
    /// The fetch-and-mutate matched nothing.
    StaleEntity,
}

impl fmt::Display for MutationFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::IdentityImmutable => f.write_str("identity is immutable"),
            Self::StaleEntity => f.write_str("entity is stale or does not exist"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn attribute_mutation_names_type_and_attribute() {
        let e = DbError::AttributeMutation {
            type_name: "User".into(),
            attribute: "nickname".into(),
            action: MutationAction::Unset,
            reason: MutationFailure::StaleEntity,
        };
        assert_eq!(
            e.to_string(),
            "Cannot unset attribute User.nickname: entity is stale or does not exist"
        );
    }

    #[test]
    fn io_error_converts() {
        let e: DbError = std::io::Error::new(std::io::ErrorKind::NotFound, "gone").into();
        assert_eq!(e.to_string(), "I/O error: gone");
    }
}
