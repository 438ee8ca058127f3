//! Structural parameters shared by every verb.
//!
//! An envelope owns the raw command once; typed requests pull the keys they understand out of
//! it while being constructed, and whatever is left over is handed back in its original order.

use bson::{Bson, Document};

use crate::errors::DbError;
use crate::types::{Command, DEFAULT_COLLECTION, ReadPreference, ReadSelection, WriteConcern};
use crate::utils::num::{bson_as_i64, is_truthy};

pub const COLLECTION_KEY: &str = "collection";
pub const TIMEOUT_KEY: &str = "timeout";

#[derive(Debug, Clone, PartialEq)]
pub struct CommandEnvelope {
    collection: String,
    body: Command,
}

impl CommandEnvelope {
    /// Split off the target collection, defaulting to `collection` when absent or empty.
    ///
    /// # Errors
    /// Returns `DbError::Validation` when `collection` is not a string.
    pub fn new(mut command: Command) -> Result<Self, DbError> {
        let collection = match command.remove(COLLECTION_KEY) {
            None | Some(Bson::Null) => DEFAULT_COLLECTION.to_string(),
            Some(Bson::String(s)) if s.is_empty() => DEFAULT_COLLECTION.to_string(),
            Some(Bson::String(s)) => s,
            Some(other) => {
                return Err(DbError::Validation(format!("collection must be a string, got {other}")));
            }
        };
        Ok(Self { collection, body: command })
    }

    #[must_use]
    pub fn collection(&self) -> &str {
        &self.collection
    }

    #[must_use]
    pub const fn body(&self) -> &Command {
        &self.body
    }

    /// Hand back the collection and the unconsumed parameters, in their original order.
    #[must_use]
    pub fn into_parts(self) -> (String, Command) {
        (self.collection, self.body)
    }

    pub fn take(&mut self, key: &str) -> Option<Bson> {
        match self.body.remove(key) {
            Some(Bson::Null) | None => None,
            Some(v) => Some(v),
        }
    }

    /// # Errors
    /// Returns `DbError::Validation` when the value is present but not a document.
    pub fn take_document(&mut self, key: &str) -> Result<Option<Document>, DbError> {
        match self.take(key) {
            None => Ok(None),
            Some(Bson::Document(d)) => Ok(Some(d)),
            Some(Bson::Array(items)) if items.is_empty() => Ok(Some(Document::new())),
            Some(other) => Err(DbError::Validation(format!("'{key}' must be a document, got {other}"))),
        }
    }

    pub fn take_bool(&mut self, key: &str) -> Option<bool> {
        self.take(key).map(|v| is_truthy(&v))
    }

    /// # Errors
    /// Returns `DbError::Validation` when the value is present but not an integer.
    pub fn take_i64(&mut self, key: &str) -> Result<Option<i64>, DbError> {
        match self.take(key) {
            None => Ok(None),
            Some(v) => bson_as_i64(&v)
                .map(Some)
                .ok_or_else(|| DbError::Validation(format!("'{key}' must be an integer, got {v}"))),
        }
    }

    /// # Errors
    /// Returns `DbError::Validation` when the value is present but not a string.
    pub fn take_string(&mut self, key: &str) -> Result<Option<String>, DbError> {
        match self.take(key) {
            None => Ok(None),
            Some(Bson::String(s)) => Ok(Some(s)),
            Some(other) => Err(DbError::Validation(format!("'{key}' must be a string, got {other}"))),
        }
    }

    /// Per-command timeout in milliseconds.
    ///
    /// # Errors
    /// Returns `DbError::Validation` for a non-integer timeout.
    pub fn take_timeout(&mut self) -> Result<Option<i64>, DbError> {
        self.take_i64(TIMEOUT_KEY)
    }

    /// `readPreference` and `readPreferenceTags`, either of which may be absent.
    ///
    /// # Errors
    /// Returns `DbError::Validation` for an unknown mode or malformed tags.
    pub fn take_read_selection(&mut self) -> Result<Option<ReadSelection>, DbError> {
        let mode = self.take_string("readPreference")?;
        let tags = match self.take("readPreferenceTags") {
            None => Vec::new(),
            Some(Bson::Array(items)) => items
                .into_iter()
                .map(|t| match t {
                    Bson::Document(d) => Ok(d),
                    other => Err(DbError::Validation(format!("read preference tag sets must be documents, got {other}"))),
                })
                .collect::<Result<_, _>>()?,
            Some(Bson::Document(d)) => vec![d],
            Some(other) => {
                return Err(DbError::Validation(format!("readPreferenceTags must be a list, got {other}")));
            }
        };
        let selection = ReadSelection { mode: mode.map(|m| m.parse::<ReadPreference>()).transpose()?, tags };
        Ok((!selection.is_empty()).then_some(selection))
    }

    /// `w`, `fsync`, `j` and `wtimeout`.
    ///
    /// # Errors
    /// Returns `DbError::Validation` for a non-integer `wtimeout`.
    pub fn take_write_concern(&mut self) -> Result<WriteConcern, DbError> {
        Ok(WriteConcern {
            w: self.take("w"),
            fsync: self.take_bool("fsync"),
            j: self.take_bool("j"),
            wtimeout: self.take_i64("wtimeout")?,
        })
    }

    /// Drop whatever the verb did not consume and return the collection.
    pub fn finish(self, verb: &str) -> String {
        if !self.body.is_empty() {
            let keys: Vec<&String> = self.body.keys().collect();
            log::debug!("{verb}: ignoring unrecognized parameters {keys:?}");
        }
        self.collection
    }
}
