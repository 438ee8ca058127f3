use std::fmt;
use std::str::FromStr;

use bson::oid::ObjectId;
use bson::{Bson, Document};
use serde::{Deserialize, Serialize};

use crate::errors::DbError;
use crate::utils::num::bson_as_i64;

/// A declarative command: ordered parameter name -> value.
pub type Command = Document;

/// Collection used when a command names none.
pub const DEFAULT_COLLECTION: &str = "collection";

/// Identity attribute of every stored document.
pub const ID_FIELD: &str = "_id";

/// Reserved sigil that marks store-level operators.
pub const OPERATOR_SIGIL: char = '$';

/// Replica selection policy for reads.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "camelCase")]
pub enum ReadPreference {
    Primary,
    PrimaryPreferred,
    Secondary,
    SecondaryPreferred,
    #[default]
    Nearest,
}

impl ReadPreference {
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Primary => "primary",
            Self::PrimaryPreferred => "primaryPreferred",
            Self::Secondary => "secondary",
            Self::SecondaryPreferred => "secondaryPreferred",
            Self::Nearest => "nearest",
        }
    }
}

impl fmt::Display for ReadPreference {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ReadPreference {
    type Err = DbError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "primary" => Ok(Self::Primary),
            "primaryPreferred" => Ok(Self::PrimaryPreferred),
            "secondary" => Ok(Self::Secondary),
            "secondaryPreferred" => Ok(Self::SecondaryPreferred),
            "nearest" => Ok(Self::Nearest),
            other => Err(DbError::Validation(format!("unknown read preference '{other}'"))),
        }
    }
}

/// Read preference plus tag sets, as carried by a single read.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct ReadRouting {
    pub mode: ReadPreference,
    pub tags: Vec<Document>,
}

/// Read preference as given on one command; either half may be missing.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct ReadSelection {
    pub mode: Option<ReadPreference>,
    pub tags: Vec<Document>,
}

impl ReadSelection {
    #[must_use]
    pub const fn is_empty(&self) -> bool {
        self.mode.is_none() && self.tags.is_empty()
    }

    /// Fill the missing mode or tags from the connection defaults.
    #[must_use]
    pub fn resolve(self, default_mode: ReadPreference, default_tags: Vec<Document>) -> ReadRouting {
        let tags = if self.tags.is_empty() { default_tags } else { self.tags };
        ReadRouting { mode: self.mode.unwrap_or(default_mode), tags }
    }
}

/// Acknowledgement level requested for a write.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct WriteConcern {
    pub w: Option<Bson>,
    pub fsync: Option<bool>,
    pub j: Option<bool>,
    pub wtimeout: Option<i64>,
}

impl WriteConcern {
    #[must_use]
    pub const fn is_empty(&self) -> bool {
        self.w.is_none() && self.fsync.is_none() && self.j.is_none() && self.wtimeout.is_none()
    }

    /// Options-document form understood by drivers (`w`, `fsync`, `j`, `wtimeout`).
    #[must_use]
    pub fn to_document(&self) -> Document {
        let mut out = Document::new();
        if let Some(w) = &self.w {
            out.insert("w", w.clone());
        }
        if let Some(fsync) = self.fsync {
            out.insert("fsync", fsync);
        }
        if let Some(j) = self.j {
            out.insert("j", j);
        }
        if let Some(wtimeout) = self.wtimeout {
            out.insert("wtimeout", wtimeout);
        }
        out
    }

    /// Unacknowledged writes (`w: 0`) report nothing back.
    #[must_use]
    pub fn is_acknowledged(&self) -> bool {
        !matches!(self.w.as_ref().and_then(bson_as_i64), Some(0))
    }
}

/// Create an identifier, parsing `hex` when given.
///
/// # Errors
/// Returns `DbError::Validation` for a malformed hex string.
pub fn new_id(hex: Option<&str>) -> Result<ObjectId, DbError> {
    match hex {
        Some(h) => ObjectId::parse_str(h)
            .map_err(|e| DbError::Validation(format!("invalid object id '{h}': {e}"))),
        None => Ok(ObjectId::new()),
    }
}

#[must_use]
pub fn from_unix_timestamp(secs: i64) -> bson::DateTime {
    bson::DateTime::from_millis(secs.saturating_mul(1000))
}

#[must_use]
pub fn to_unix_timestamp(ts: bson::DateTime) -> i64 {
    ts.timestamp_millis().div_euclid(1000)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn read_preference_round_trips_through_str() {
        for rp in [
            ReadPreference::Primary,
            ReadPreference::PrimaryPreferred,
            ReadPreference::Secondary,
            ReadPreference::SecondaryPreferred,
            ReadPreference::Nearest,
        ] {
            assert_eq!(rp.as_str().parse::<ReadPreference>().unwrap(), rp);
        }
        assert!("closest".parse::<ReadPreference>().is_err());
    }

    #[test]
    fn write_concern_document_skips_unset_fields() {
        let wc = WriteConcern { w: Some(Bson::String("majority".into())), j: Some(true), ..Default::default() };
        assert_eq!(wc.to_document(), bson::doc! {"w": "majority", "j": true});
        assert!(wc.is_acknowledged());
        let none = WriteConcern { w: Some(Bson::Int32(0)), ..Default::default() };
        assert!(!none.is_acknowledged());
    }

    #[test]
    fn ids_and_timestamps() {
        let id = new_id(Some("507f1f77bcf86cd799439011")).unwrap();
        assert_eq!(id.to_hex(), "507f1f77bcf86cd799439011");
        assert!(new_id(Some("xyz")).is_err());
        assert_ne!(new_id(None).unwrap(), new_id(None).unwrap());
        assert_eq!(to_unix_timestamp(from_unix_timestamp(1_700_000_000)), 1_700_000_000);
    }

    #[test]
    fn read_selection_fills_missing_halves() {
        let east = vec![bson::doc! {"dc": "east"}];
        let west = vec![bson::doc! {"dc": "west"}];
        let only_tags = ReadSelection { mode: None, tags: east.clone() };
        assert_eq!(
            only_tags.resolve(ReadPreference::Nearest, west.clone()),
            ReadRouting { mode: ReadPreference::Nearest, tags: east.clone() }
        );
        let only_mode = ReadSelection { mode: Some(ReadPreference::Secondary), tags: Vec::new() };
        assert_eq!(
            only_mode.resolve(ReadPreference::Nearest, west.clone()),
            ReadRouting { mode: ReadPreference::Secondary, tags: west }
        );
        assert!(ReadSelection::default().is_empty());
    }
}
