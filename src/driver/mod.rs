//! The document-store client this layer drives.
//!
//! Connection pooling, wire protocol and replica routing belong to the implementation; the
//! adapter only relies on the calls below being safe to share across threads.

pub mod memory;

use bson::Document;

use crate::config::ConnectionConfig;
use crate::cursor::CursorOption;
use crate::errors::DbError;
use crate::types::{ReadRouting, WriteConcern};

pub use memory::MemoryDriver;

/// Lazily produced, forward-only documents.
pub type DocumentStream<'a> = Box<dyn Iterator<Item = Result<Document, DbError>> + Send + 'a>;

/// Everything a cursor has been configured with before it is opened.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct QuerySpec {
    pub query: Document,
    /// Projection document (`{field: 1}`); empty means whole documents.
    pub fields: Document,
    pub read: Option<ReadRouting>,
    /// Cursor options in the order they were applied.
    pub options: Vec<CursorOption>,
}

impl QuerySpec {
    #[must_use]
    pub fn new(query: Document, fields: Document) -> Self {
        Self { query, fields, ..Self::default() }
    }

    fn last<T>(&self, pick: impl Fn(&CursorOption) -> Option<T>) -> Option<T> {
        self.options.iter().rev().find_map(pick)
    }

    #[must_use]
    pub fn sort(&self) -> Option<&Document> {
        self.options.iter().rev().find_map(|o| match o {
            CursorOption::Sort(d) => Some(d),
            _ => None,
        })
    }

    #[must_use]
    pub fn skip(&self) -> Option<u64> {
        self.last(|o| match o {
            CursorOption::Skip(n) => Some(*n),
            _ => None,
        })
    }

    #[must_use]
    pub fn limit(&self) -> Option<i64> {
        self.last(|o| match o {
            CursorOption::Limit(n) => Some(*n),
            _ => None,
        })
    }

    #[must_use]
    pub fn batch_size(&self) -> Option<i64> {
        self.last(|o| match o {
            CursorOption::BatchSize(n) => Some(*n),
            _ => None,
        })
    }

    #[must_use]
    pub fn timeout(&self) -> Option<i64> {
        self.last(|o| match o {
            CursorOption::Timeout(n) => Some(*n),
            _ => None,
        })
    }

    #[must_use]
    pub fn is_tailable(&self) -> bool {
        self.last(|o| match o {
            CursorOption::Tailable(b) => Some(*b),
            _ => None,
        })
        .unwrap_or(false)
    }
}

/// Per-write options passed to the direct CRUD primitives.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct WriteOptions {
    pub write_concern: WriteConcern,
    pub timeout: Option<i64>,
    pub multiple: bool,
    pub upsert: bool,
    pub just_one: bool,
    pub continue_on_error: bool,
}

pub trait Driver: Send + Sync {
    /// Build a client from validated connection parameters.
    ///
    /// # Errors
    /// Implementations fail when the client cannot be constructed.
    fn connect(config: &ConnectionConfig) -> Result<Self, DbError>
    where
        Self: Sized;

    fn database_name(&self) -> &str;

    /// Run a named command; its first key is the command name. Store-side failures come back
    /// inside the response (`errmsg`), transport failures as `Err`.
    ///
    /// # Errors
    /// Transport-level failures.
    fn run_command(&self, command: &Document, timeout_ms: Option<i64>) -> Result<Document, DbError>;

    /// # Errors
    /// Transport-level failures or an unusable query.
    fn open_cursor(&self, collection: &str, spec: &QuerySpec) -> Result<DocumentStream<'_>, DbError>;

    /// # Errors
    /// Transport-level failures.
    fn count(&self, collection: &str, query: &Document, limit: i64, skip: i64) -> Result<u64, DbError>;

    /// Insert one document, filling in `_id` when absent.
    ///
    /// # Errors
    /// Duplicate keys and transport failures.
    fn insert(&self, collection: &str, doc: &mut Document, options: &WriteOptions) -> Result<Document, DbError>;

    /// # Errors
    /// The first failure, after the remaining documents were tried when `continue_on_error`.
    fn batch_insert(&self, collection: &str, docs: &mut [Document], options: &WriteOptions) -> Result<Document, DbError>;

    /// # Errors
    /// Invalid modifiers, duplicate keys and transport failures.
    fn update(&self, collection: &str, query: &Document, update: &Document, options: &WriteOptions) -> Result<Document, DbError>;

    /// # Errors
    /// Transport-level failures.
    fn remove(&self, collection: &str, query: &Document, options: &WriteOptions) -> Result<Document, DbError>;

    /// # Errors
    /// Invalid index specifications and transport failures.
    fn ensure_index(&self, collection: &str, key: &Document, options: &Document) -> Result<Document, DbError>;

    /// # Errors
    /// Transport-level failures.
    fn drop_collection(&self, collection: &str) -> Result<Document, DbError>;

    /// # Errors
    /// Transport-level failures.
    fn list_collections(&self) -> Result<Vec<String>, DbError>;
}
