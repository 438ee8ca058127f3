//! Replace-vs-modify classification and operator-document assembly.

use std::fmt;

use bson::{Bson, Document};

use crate::errors::DbError;
use crate::types::OPERATOR_SIGIL;

/// Named update operator accepted as a command parameter (`set` becomes `$set`, ...).
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum UpdateOperator {
    Set,
    Inc,
    Mul,
    Rename,
    Unset,
    SetOnInsert,
    Min,
    Max,
    CurrentDate,
    Bit,
    AddToSet,
    Pop,
    PullAll,
    Pull,
    PushAll,
    Push,
    /// Any other leftover command key; the store decides whether it exists.
    Other(String),
}

impl UpdateOperator {
    pub const NAMED: [Self; 16] = [
        Self::Set,
        Self::Inc,
        Self::Mul,
        Self::Rename,
        Self::Unset,
        Self::SetOnInsert,
        Self::Min,
        Self::Max,
        Self::CurrentDate,
        Self::Bit,
        Self::AddToSet,
        Self::Pop,
        Self::PullAll,
        Self::Pull,
        Self::PushAll,
        Self::Push,
    ];

    #[must_use]
    pub fn parse(name: &str) -> Self {
        Self::NAMED
            .into_iter()
            .find(|op| op.name() == name)
            .unwrap_or_else(|| Self::Other(name.to_string()))
    }

    #[must_use]
    pub fn name(&self) -> &str {
        match self {
            Self::Set => "set",
            Self::Inc => "inc",
            Self::Mul => "mul",
            Self::Rename => "rename",
            Self::Unset => "unset",
            Self::SetOnInsert => "setOnInsert",
            Self::Min => "min",
            Self::Max => "max",
            Self::CurrentDate => "currentDate",
            Self::Bit => "bit",
            Self::AddToSet => "addToSet",
            Self::Pop => "pop",
            Self::PullAll => "pullAll",
            Self::Pull => "pull",
            Self::PushAll => "pushAll",
            Self::Push => "push",
            Self::Other(name) => name,
        }
    }

    /// Key used in the emitted operator document.
    #[must_use]
    pub fn operator_key(&self) -> String {
        format!("{OPERATOR_SIGIL}{}", self.name())
    }

    #[must_use]
    pub const fn is_named(&self) -> bool {
        !matches!(self, Self::Other(_))
    }
}

impl fmt::Display for UpdateOperator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UpdateMode {
    /// Whole-document replacement.
    Replace,
    /// Operator-based modification.
    Modify,
}

/// Update payload plus the mode it was classified as.
#[derive(Debug, Clone, PartialEq)]
pub struct BuiltUpdate {
    pub payload: Document,
    pub mode: UpdateMode,
}

impl BuiltUpdate {
    /// Replacements touch one document by default, modifications all matches.
    #[must_use]
    pub fn multiple(&self, explicit: Option<bool>) -> bool {
        explicit.unwrap_or(self.mode == UpdateMode::Modify)
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.payload.is_empty()
    }
}

/// Classify and assemble an update.
///
/// A non-empty `replace` wins and is used verbatim; otherwise every operator becomes one
/// `$<name>` entry. Nothing at all yields an empty modify payload, left for the store to judge.
///
/// # Errors
/// Returns `DbError::Validation` when the replacement document carries a `$`-prefixed key.
pub fn build_update(
    replace: Option<&Document>,
    operators: &[(UpdateOperator, Bson)],
) -> Result<BuiltUpdate, DbError> {
    if let Some(doc) = replace.filter(|d| !d.is_empty()) {
        ensure_replacement(doc)?;
        return Ok(BuiltUpdate { payload: doc.clone(), mode: UpdateMode::Replace });
    }
    let mut payload = Document::new();
    for (op, value) in operators {
        payload.insert(op.operator_key(), value.clone());
    }
    Ok(BuiltUpdate { payload, mode: UpdateMode::Modify })
}

/// # Errors
/// Returns `DbError::Validation` naming the first operator-prefixed key.
pub fn ensure_replacement(doc: &Document) -> Result<(), DbError> {
    match doc.keys().find(|k| k.starts_with(OPERATOR_SIGIL)) {
        Some(key) => Err(DbError::Validation(format!(
            "replacement document may not contain operator fields (found '{key}')"
        ))),
        None => Ok(()),
    }
}
