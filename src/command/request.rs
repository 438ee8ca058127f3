//! One typed request per verb, each built once from a raw command.

use bson::{Bson, Document};

use super::envelope::CommandEnvelope;
use crate::cursor::CursorOption;
use crate::driver::WriteOptions;
use crate::errors::DbError;
use crate::query::{BuiltUpdate, UpdateOperator, build_update, translate_optional};
use crate::types::{Command, ID_FIELD, ReadSelection};

/// What a read asked for: a projection field list, or a raw projection document.
#[derive(Debug, Clone, PartialEq)]
pub enum Fields {
    Paths(Vec<String>),
    Projection(Document),
}

impl Default for Fields {
    fn default() -> Self {
        Self::Paths(Vec::new())
    }
}

impl Fields {
    /// # Errors
    /// Returns `DbError::Validation` for anything but a string, a list of strings or a document.
    pub fn from_bson(value: Option<Bson>) -> Result<Self, DbError> {
        match value {
            None => Ok(Self::default()),
            Some(Bson::String(s)) => Ok(Self::Paths(vec![s])),
            Some(Bson::Document(d)) => Ok(Self::Projection(d)),
            Some(Bson::Array(items)) => items
                .into_iter()
                .map(|v| match v {
                    Bson::String(s) => Ok(s),
                    other => Err(DbError::Validation(format!("field paths must be strings, got {other}"))),
                })
                .collect::<Result<_, _>>()
                .map(Self::Paths),
            Some(other) => Err(DbError::Validation(format!("'fields' must be a list or a document, got {other}"))),
        }
    }

    /// Field paths to flatten results by; empty for raw projections.
    #[must_use]
    pub fn paths(&self) -> &[String] {
        match self {
            Self::Paths(p) => p,
            Self::Projection(_) => &[],
        }
    }

    /// Projection document sent to the store.
    #[must_use]
    pub fn projection(&self) -> Document {
        match self {
            Self::Paths(paths) => paths.iter().map(|p| (p.clone(), Bson::Int32(1))).collect(),
            Self::Projection(d) => d.clone(),
        }
    }
}

fn translated_query(env: &mut CommandEnvelope) -> Result<Document, DbError> {
    Ok(translate_optional(env.take_document("query")?.as_ref()))
}

/// Leftover keys become update operators, in command order.
fn leftover_operators(rest: Command) -> Vec<(UpdateOperator, Bson)> {
    rest.into_iter().map(|(k, v)| (UpdateOperator::parse(&k), v)).collect()
}

#[derive(Debug, Clone, PartialEq)]
pub struct FindRequest {
    pub collection: String,
    pub query: Document,
    pub fields: Fields,
    /// Per-read routing; missing halves come from the connection.
    pub read: Option<ReadSelection>,
    /// Non-empty cursor options in command order.
    pub options: Vec<CursorOption>,
}

impl FindRequest {
    /// # Errors
    /// Returns `DbError::Validation` for malformed parameters or unknown cursor options.
    pub fn from_command(command: Command) -> Result<Self, DbError> {
        let mut env = CommandEnvelope::new(command)?;
        let query = translated_query(&mut env)?;
        let fields = Fields::from_bson(env.take("fields"))?;
        let read = env.take_read_selection()?;
        let (collection, rest) = env.into_parts();
        let mut options = Vec::new();
        for (key, value) in &rest {
            if let Some(opt) = CursorOption::from_entry(key, value)? {
                options.push(opt);
            }
        }
        Ok(Self { collection, query, fields, read, options })
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct CountRequest {
    pub collection: String,
    pub query: Document,
    pub limit: i64,
    pub skip: i64,
}

impl CountRequest {
    /// # Errors
    /// Returns `DbError::Validation` for malformed parameters.
    pub fn from_command(command: Command) -> Result<Self, DbError> {
        let mut env = CommandEnvelope::new(command)?;
        let query = translated_query(&mut env)?;
        let limit = env.take_i64("limit")?.unwrap_or(0);
        let skip = env.take_i64("skip")?.unwrap_or(0);
        Ok(Self { collection: env.finish("count"), query, limit, skip })
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct DistinctRequest {
    pub collection: String,
    pub key: String,
    pub query: Document,
    pub timeout: Option<i64>,
}

impl DistinctRequest {
    /// # Errors
    /// Returns `DbError::Validation` for malformed parameters.
    pub fn from_command(command: Command) -> Result<Self, DbError> {
        let mut env = CommandEnvelope::new(command)?;
        let key = env.take_string("key")?.filter(|k| !k.is_empty()).unwrap_or_else(|| ID_FIELD.to_string());
        let query = translated_query(&mut env)?;
        let timeout = env.take_timeout()?;
        Ok(Self { collection: env.finish("distinct"), key, query, timeout })
    }
}

fn write_options(env: &mut CommandEnvelope) -> Result<WriteOptions, DbError> {
    Ok(WriteOptions {
        write_concern: env.take_write_concern()?,
        timeout: env.take_timeout()?,
        ..WriteOptions::default()
    })
}

#[derive(Debug, Clone, PartialEq)]
pub struct InsertRequest {
    pub collection: String,
    pub document: Document,
    pub write: WriteOptions,
}

impl InsertRequest {
    /// # Errors
    /// Returns `DbError::Validation` when `set` is missing or not a document.
    pub fn from_command(command: Command) -> Result<Self, DbError> {
        let mut env = CommandEnvelope::new(command)?;
        let document = env
            .take_document("set")?
            .ok_or_else(|| DbError::Validation("insert requires a 'set' document".into()))?;
        let write = write_options(&mut env)?;
        Ok(Self { collection: env.finish("insert"), document, write })
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct BatchInsertRequest {
    pub collection: String,
    pub documents: Vec<Document>,
    pub write: WriteOptions,
}

impl BatchInsertRequest {
    /// # Errors
    /// Returns `DbError::Validation` when `set` is missing or holds non-documents.
    pub fn from_command(command: Command) -> Result<Self, DbError> {
        let mut env = CommandEnvelope::new(command)?;
        let documents = match env.take("set") {
            Some(Bson::Array(items)) => items
                .into_iter()
                .map(|v| match v {
                    Bson::Document(d) => Ok(d),
                    other => Err(DbError::Validation(format!("batchInsert entries must be documents, got {other}"))),
                })
                .collect::<Result<Vec<_>, _>>()?,
            _ => return Err(DbError::Validation("batchInsert requires a 'set' list of documents".into())),
        };
        let mut write = write_options(&mut env)?;
        write.continue_on_error = env.take_bool("continueOnError").unwrap_or(false);
        Ok(Self { collection: env.finish("batchInsert"), documents, write })
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct RemoveRequest {
    pub collection: String,
    pub query: Document,
    pub write: WriteOptions,
}

impl RemoveRequest {
    /// # Errors
    /// Returns `DbError::Validation` for malformed parameters.
    pub fn from_command(command: Command) -> Result<Self, DbError> {
        let mut env = CommandEnvelope::new(command)?;
        let query = translated_query(&mut env)?;
        let mut write = write_options(&mut env)?;
        write.just_one = env.take_bool("justOne").unwrap_or(false);
        Ok(Self { collection: env.finish("remove"), query, write })
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct UpdateRequest {
    pub collection: String,
    pub query: Document,
    pub update: BuiltUpdate,
    /// `multiple` and `upsert` resolved against the update mode.
    pub write: WriteOptions,
}

impl UpdateRequest {
    /// # Errors
    /// Returns `DbError::Validation` for a replacement carrying operator keys.
    pub fn from_command(command: Command) -> Result<Self, DbError> {
        let mut env = CommandEnvelope::new(command)?;
        let query = translated_query(&mut env)?;
        let replace = env.take_document("replace")?;
        let multiple = env.take_bool("multiple");
        let upsert = env.take_bool("upsert").unwrap_or(false);
        let mut write = write_options(&mut env)?;
        let (collection, rest) = env.into_parts();
        let update = build_update(replace.as_ref(), &leftover_operators(rest))?;
        write.multiple = update.multiple(multiple);
        write.upsert = upsert;
        Ok(Self { collection, query, update, write })
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct FindAndModifyRequest {
    pub collection: String,
    pub query: Document,
    pub sort: Option<Document>,
    pub fields: Fields,
    pub upsert: bool,
    pub new: bool,
    pub remove: bool,
    pub update: BuiltUpdate,
    pub timeout: Option<i64>,
}

impl FindAndModifyRequest {
    /// # Errors
    /// Returns `DbError::Validation` for a replacement carrying operator keys.
    pub fn from_command(command: Command) -> Result<Self, DbError> {
        let mut env = CommandEnvelope::new(command)?;
        let query = translated_query(&mut env)?;
        let fields = Fields::from_bson(env.take("fields"))?;
        let sort = env.take_document("sort")?.filter(|s| !s.is_empty());
        let upsert = env.take_bool("upsert").unwrap_or(false);
        let new = env.take_bool("new").unwrap_or(true);
        let remove = env.take_bool("remove").unwrap_or(false);
        let timeout = env.take_timeout()?;
        let replace = env.take_document("replace")?;
        let (collection, rest) = env.into_parts();
        let update = build_update(replace.as_ref(), &leftover_operators(rest))?;
        Ok(Self { collection, query, sort, fields, upsert, new, remove, update, timeout })
    }

    /// Command body after the `findAndModify: <collection>` head.
    #[must_use]
    pub fn body(&self) -> Document {
        let mut body = Document::new();
        body.insert("query", self.query.clone());
        if let Some(sort) = &self.sort {
            body.insert("sort", sort.clone());
        }
        let projection = self.fields.projection();
        if !projection.is_empty() {
            body.insert("fields", projection);
        }
        if self.remove {
            body.insert("remove", true);
        } else {
            body.insert("update", self.update.payload.clone());
            body.insert("new", self.new);
            body.insert("upsert", self.upsert);
        }
        body
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct EnsureIndexRequest {
    pub collection: String,
    pub key: Document,
    pub options: Document,
}

impl EnsureIndexRequest {
    /// Index options come from `options`, with any other leftover parameter (`unique`,
    /// `sparse`, `name`, ...) folded in unless `options` already names it.
    ///
    /// # Errors
    /// Returns `DbError::Validation` when `key` is missing or empty.
    pub fn from_command(command: Command) -> Result<Self, DbError> {
        let mut env = CommandEnvelope::new(command)?;
        let key = env
            .take_document("key")?
            .filter(|k| !k.is_empty())
            .ok_or_else(|| DbError::Validation("ensureIndex requires a non-empty 'key' document".into()))?;
        let mut options = env.take_document("options")?.unwrap_or_default();
        let (collection, rest) = env.into_parts();
        for (k, v) in rest {
            if !options.contains_key(&k) {
                options.insert(k, v);
            }
        }
        Ok(Self { collection, key, options })
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct GroupRequest {
    pub collection: String,
    pub keys: Document,
    pub initial: Document,
    pub reduce: Bson,
    pub cond: Option<Document>,
    pub finalize: Option<Bson>,
    pub timeout: Option<i64>,
}

impl GroupRequest {
    /// # Errors
    /// Returns `DbError::Validation` unless `keys`, `initial` and `reduce` are all given.
    pub fn from_command(command: Command) -> Result<Self, DbError> {
        let missing = || DbError::Validation("missing required group-by parameters".into());
        let mut env = CommandEnvelope::new(command)?;
        let keys = env.take_document("keys")?.filter(|d| !d.is_empty()).ok_or_else(missing)?;
        let initial = env.take_document("initial")?.filter(|d| !d.is_empty()).ok_or_else(missing)?;
        let reduce = env
            .take("reduce")
            .filter(|r| matches!(r, Bson::String(s) if !s.is_empty()) || matches!(r, Bson::JavaScriptCode(_) | Bson::JavaScriptCodeWithScope(_)))
            .ok_or_else(missing)?;
        let cond = env.take_document("cond")?.map(|c| crate::query::translate_predicate(&c));
        let finalize = env.take("finalize");
        let timeout = env.take_timeout()?;
        Ok(Self { collection: env.finish("group"), keys, initial, reduce, cond, finalize, timeout })
    }

    /// The `group` command document.
    #[must_use]
    pub fn to_command(&self) -> Document {
        let mut spec = Document::new();
        spec.insert("ns", self.collection.clone());
        spec.insert("key", self.keys.clone());
        spec.insert("initial", self.initial.clone());
        spec.insert("$reduce", self.reduce.clone());
        if let Some(cond) = &self.cond {
            spec.insert("cond", cond.clone());
        }
        if let Some(finalize) = &self.finalize {
            spec.insert("finalize", finalize.clone());
        }
        let mut cmd = Document::new();
        cmd.insert("group", spec);
        cmd
    }
}

/// Any other named command: `{<name>: <collection>}` followed by the remaining parameters.
#[derive(Debug, Clone, PartialEq)]
pub struct GenericRequest {
    pub name: String,
    pub collection: String,
    pub body: Document,
    pub timeout: Option<i64>,
}

impl GenericRequest {
    /// # Errors
    /// Returns `DbError::Validation` for an empty command name or malformed parameters.
    pub fn from_command(name: &str, command: Command) -> Result<Self, DbError> {
        if name.is_empty() {
            return Err(DbError::Validation("command name may not be empty".into()));
        }
        let mut env = CommandEnvelope::new(command)?;
        let timeout = env.take_timeout()?;
        let (collection, body) = env.into_parts();
        Ok(Self { name: name.to_string(), collection, body, timeout })
    }
}
