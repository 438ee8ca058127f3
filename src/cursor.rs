use bson::{Bson, Document};

use crate::driver::{DocumentStream, Driver, QuerySpec};
use crate::errors::DbError;
use crate::types::ReadRouting;
use crate::utils::num::{bson_as_i64, i64_to_u64_saturating, is_truthy};

/// Recognized cursor-shaping options.
#[derive(Debug, Clone, PartialEq)]
pub enum CursorOption {
    Sort(Document),
    Skip(u64),
    Limit(i64),
    Hint(Bson),
    BatchSize(i64),
    Timeout(i64),
    Tailable(bool),
    Immortal(bool),
    AwaitData(bool),
    Partial(bool),
    Snapshot(bool),
}

impl CursorOption {
    pub const NAMES: [&'static str; 11] = [
        "sort", "skip", "limit", "hint", "batchSize", "timeout", "tailable", "immortal",
        "awaitData", "partial", "snapshot",
    ];

    #[must_use]
    pub const fn name(&self) -> &'static str {
        match self {
            Self::Sort(_) => "sort",
            Self::Skip(_) => "skip",
            Self::Limit(_) => "limit",
            Self::Hint(_) => "hint",
            Self::BatchSize(_) => "batchSize",
            Self::Timeout(_) => "timeout",
            Self::Tailable(_) => "tailable",
            Self::Immortal(_) => "immortal",
            Self::AwaitData(_) => "awaitData",
            Self::Partial(_) => "partial",
            Self::Snapshot(_) => "snapshot",
        }
    }

    /// Interpret one command entry. Empty values (`0`, `false`, `null`, `""`, `{}`) yield
    /// `Ok(None)` and are skipped.
    ///
    /// # Errors
    /// Returns `DbError::Validation` for an unknown option name or a value of the wrong type.
    pub fn from_entry(key: &str, value: &Bson) -> Result<Option<Self>, DbError> {
        if !Self::NAMES.contains(&key) {
            return Err(DbError::Validation(format!("unknown cursor option '{key}'")));
        }
        if !is_truthy(value) {
            return Ok(None);
        }
        let int = || {
            bson_as_i64(value)
                .ok_or_else(|| DbError::Validation(format!("cursor option '{key}' expects an integer")))
        };
        let opt = match key {
            "sort" => match value {
                Bson::Document(d) => Self::Sort(d.clone()),
                _ => return Err(DbError::Validation("cursor option 'sort' expects a document".into())),
            },
            "skip" => Self::Skip(i64_to_u64_saturating(int()?)),
            "limit" => Self::Limit(int()?),
            "hint" => Self::Hint(value.clone()),
            "batchSize" => Self::BatchSize(int()?),
            "timeout" => Self::Timeout(int()?),
            "tailable" => Self::Tailable(true),
            "immortal" => Self::Immortal(true),
            "awaitData" => Self::AwaitData(true),
            "partial" => Self::Partial(true),
            _ => Self::Snapshot(true),
        };
        Ok(Some(opt))
    }
}

enum CursorState<'a> {
    Pending,
    Open(DocumentStream<'a>),
    Done,
}

/// Lazy, forward-only result sequence. Nothing reaches the store until the first `next()`;
/// options can only be applied before that.
pub struct Cursor<'a, D: Driver> {
    driver: &'a D,
    collection: String,
    spec: QuerySpec,
    state: CursorState<'a>,
}

impl<'a, D: Driver> Cursor<'a, D> {
    pub(crate) fn new(driver: &'a D, collection: impl Into<String>, spec: QuerySpec) -> Self {
        Self { driver, collection: collection.into(), spec, state: CursorState::Pending }
    }

    #[must_use]
    pub fn collection(&self) -> &str {
        &self.collection
    }

    #[must_use]
    pub const fn spec(&self) -> &QuerySpec {
        &self.spec
    }

    #[must_use]
    pub const fn is_started(&self) -> bool {
        !matches!(self.state, CursorState::Pending)
    }

    fn ensure_pending(&self, what: &str) -> Result<(), DbError> {
        if self.is_started() {
            return Err(DbError::Cursor(format!("cannot apply {what} after iteration began")));
        }
        Ok(())
    }

    /// # Errors
    /// Returns `DbError::Cursor` once iteration has begun.
    pub fn apply(&mut self, option: CursorOption) -> Result<&mut Self, DbError> {
        self.ensure_pending(option.name())?;
        self.spec.options.push(option);
        Ok(self)
    }

    /// # Errors
    /// Returns `DbError::Cursor` once iteration has begun.
    pub fn set_read_preference(&mut self, routing: ReadRouting) -> Result<&mut Self, DbError> {
        self.ensure_pending("readPreference")?;
        self.spec.read = Some(routing);
        Ok(self)
    }

    /// Drain the remaining documents.
    ///
    /// # Errors
    /// The first error produced by the store.
    pub fn to_vec(self) -> Result<Vec<Document>, DbError> {
        self.collect()
    }

    fn advance(&mut self) -> Option<Result<Document, DbError>> {
        if matches!(self.state, CursorState::Pending) {
            crate::dev6!("open_cursor {}", self.collection);
            match self.driver.open_cursor(&self.collection, &self.spec) {
                Ok(stream) => self.state = CursorState::Open(stream),
                Err(e) => {
                    self.state = CursorState::Done;
                    return Some(Err(e));
                }
            }
        }
        let CursorState::Open(stream) = &mut self.state else {
            return None;
        };
        let next = stream.next();
        if next.is_none() {
            self.state = CursorState::Done;
        }
        next
    }
}

impl<D: Driver> Iterator for Cursor<'_, D> {
    type Item = Result<Document, DbError>;

    fn next(&mut self) -> Option<Self::Item> {
        self.advance()
    }
}

impl<D: Driver> std::fmt::Debug for Cursor<'_, D> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Cursor")
            .field("collection", &self.collection)
            .field("spec", &self.spec)
            .field("started", &self.is_started())
            .finish()
    }
}
