//! Command-adapter layer for a document store.
//!
//! Callers describe each operation as a declarative [`Command`] mapping; [`Database`] turns it
//! into a typed request, translates shorthand predicates and update operators, runs it against a
//! [`Driver`] and hands back flat results.
//!
//! ```
//! use bson::doc;
//! use docverb::Database;
//!
//! let db: Database = Database::new(docverb::config::ConnectionConfig::default())?;
//! db.insert(doc! {"collection": "users", "set": {"name": "ada", "age": 21}})?;
//! let adults = db.fetch(doc! {"collection": "users", "query": {"age": {">=": 18}}})?;
//! assert_eq!(adults.len(), 1);
//! # Ok::<(), docverb::DbError>(())
//! ```
pub mod command;
pub mod config;
pub mod cursor;
pub mod database;
pub mod driver;
pub mod errors;
pub mod logger;
pub mod model;
pub mod query;
pub mod types;
pub mod utils;

pub use config::ConnectionConfig;
pub use cursor::{Cursor, CursorOption};
pub use database::{Database, FindAndModifyReport, IndexReport, UpdateReport};
pub use driver::{Driver, MemoryDriver};
pub use errors::{DbError, MutationAction, MutationFailure};
pub use model::{Entity, EntityStore, Mutation, MutationOutcome, Schema, SchemaRegistry};
pub use query::Fetched;
pub use types::{Command, ReadPreference, WriteConcern, from_unix_timestamp, new_id, to_unix_timestamp};
pub use utils::json::parse_command;
