//! In-process reference driver.
//!
//! Keeps one logical database in memory behind a `parking_lot` lock. Matching and update
//! application follow the store's documented semantics closely enough to exercise every
//! command verb; cursor options without an in-memory effect are accepted and recorded.

pub mod apply;
pub mod eval;

use std::collections::BTreeMap;
use std::sync::atomic::{AtomicU64, Ordering};

use bson::oid::ObjectId;
use bson::{Bson, Document, doc};
use parking_lot::RwLock;

use self::apply::{apply_update, is_replacement, replace_document, upsert_seed};
use self::eval::{compare_docs, get_path, matches, project, values_equal};
use super::{DocumentStream, Driver, QuerySpec, WriteOptions};
use crate::config::ConnectionConfig;
use crate::errors::DbError;
use crate::types::{ID_FIELD, OPERATOR_SIGIL};
use crate::utils::num::{bson_as_i64, i64_to_usize, is_truthy, usize_to_i64};

pub const NAMESPACES_CATALOG: &str = "system.namespaces";
pub const INDEXES_CATALOG: &str = "system.indexes";
const ID_INDEX: &str = "_id_";

#[derive(Debug, Default)]
struct Collection {
    docs: Vec<Document>,
    indexes: Vec<Document>,
}

#[derive(Debug)]
pub struct MemoryDriver {
    name: String,
    collections: RwLock<BTreeMap<String, Collection>>,
    ops: AtomicU64,
}

fn err(msg: impl Into<String>) -> DbError {
    DbError::Driver(msg.into())
}

/// Store-side failures travel inside the response for named commands.
fn error_response(e: &DbError) -> Document {
    let msg = match e {
        DbError::Driver(m) | DbError::Validation(m) => m.clone(),
        other => other.to_string(),
    };
    doc! {"ok": 0.0, "errmsg": msg}
}

fn ensure_id(doc: &mut Document) {
    if doc.contains_key(ID_FIELD) {
        return;
    }
    let mut with_id = doc! {"_id": ObjectId::new()};
    for (k, v) in std::mem::take(doc) {
        with_id.insert(k, v);
    }
    *doc = with_id;
}

fn ensure_storable(doc: &Document) -> Result<(), DbError> {
    match doc.keys().find(|k| k.starts_with(OPERATOR_SIGIL)) {
        Some(k) => Err(err(format!("Document can't have $ prefixed field names: {k}"))),
        None => Ok(()),
    }
}

fn index_name(key: &Document) -> String {
    key.iter()
        .map(|(field, dir)| match (bson_as_i64(dir), dir) {
            (Some(n), _) => format!("{field}_{n}"),
            (None, Bson::String(s)) => format!("{field}_{s}"),
            (None, other) => format!("{field}_{other}"),
        })
        .collect::<Vec<_>>()
        .join("_")
}

fn index_tuple(index: &Document, doc: &Document) -> Vec<Bson> {
    let Ok(key) = index.get_document("key") else {
        return Vec::new();
    };
    key.keys().map(|f| get_path(doc, f).cloned().unwrap_or(Bson::Null)).collect()
}

fn is_unique(index: &Document) -> bool {
    index.get_str("name").is_ok_and(|n| n == ID_INDEX) || index.get("unique").is_some_and(is_truthy)
}

/// `candidate` must not collide with any other document on a unique index.
fn check_unique(coll: &Collection, candidate: &Document, own_slot: Option<usize>) -> Result<(), DbError> {
    for index in coll.indexes.iter().filter(|i| is_unique(i)) {
        let wanted = index_tuple(index, candidate);
        let clash = coll.docs.iter().enumerate().any(|(i, other)| {
            Some(i) != own_slot
                && index_tuple(index, other)
                    .iter()
                    .zip(&wanted)
                    .all(|(a, b)| values_equal(a, b))
        });
        if clash {
            let ns = index.get_str("ns").unwrap_or_default();
            let name = index.get_str("name").unwrap_or_default();
            let shown: Vec<String> = wanted.iter().map(|v| format!(": {v}")).collect();
            return Err(err(format!(
                "E11000 duplicate key error index: {ns}.${name} dup key: {{ {} }}",
                shown.join(", ")
            )));
        }
    }
    Ok(())
}

fn build_upsert(query: &Document, update: &Document) -> Result<Document, DbError> {
    let seed = upsert_seed(query)?;
    let mut doc = Document::new();
    if is_replacement(update) {
        if let Some(id) = seed.get(ID_FIELD) {
            doc.insert(ID_FIELD, id.clone());
        }
        replace_document(&mut doc, update)?;
    } else {
        doc = seed;
        apply_update(&mut doc, update, true)?;
    }
    ensure_id(&mut doc);
    Ok(doc)
}

fn write_ack(options: &WriteOptions, result: Result<Document, DbError>) -> Result<Document, DbError> {
    if options.write_concern.is_acknowledged() {
        return result;
    }
    if let Err(e) = &result {
        log::warn!("unacknowledged write failed: {e}");
    }
    Ok(Document::new())
}

impl MemoryDriver {
    #[must_use]
    pub fn new(name: impl Into<String>) -> Self {
        Self { name: name.into(), collections: RwLock::new(BTreeMap::new()), ops: AtomicU64::new(0) }
    }

    /// Store round-trips served so far.
    #[must_use]
    pub fn operation_count(&self) -> u64 {
        self.ops.load(Ordering::Relaxed)
    }

    fn tick(&self, op: &str, collection: &str) {
        self.ops.fetch_add(1, Ordering::Relaxed);
        crate::dev6!("{{\"store\":\"memory\",\"op\":\"{}\",\"collection\":\"{}\"}}", op, collection);
    }

    fn namespace(&self, collection: &str) -> String {
        format!("{}.{collection}", self.name)
    }

    fn collection_mut<'a>(&self, map: &'a mut BTreeMap<String, Collection>, name: &str) -> Result<&'a mut Collection, DbError> {
        if name.is_empty() || name.starts_with("system.") || name.contains(OPERATOR_SIGIL) {
            return Err(err(format!("invalid collection name '{name}'")));
        }
        let ns = self.namespace(name);
        Ok(map.entry(name.to_string()).or_insert_with(|| Collection {
            docs: Vec::new(),
            indexes: vec![doc! {"v": 1, "key": {"_id": 1}, "name": ID_INDEX, "ns": ns}],
        }))
    }

    /// Matching documents, including the synthesized metadata catalogs.
    fn select(&self, collection: &str, query: &Document) -> Result<Vec<Document>, DbError> {
        let map = self.collections.read();
        let catalog: Vec<Document>;
        let source: &[Document] = match collection {
            NAMESPACES_CATALOG => {
                catalog = map.keys().map(|name| doc! {"name": self.namespace(name)}).collect();
                &catalog
            }
            INDEXES_CATALOG => {
                catalog = map.values().flat_map(|c| c.indexes.iter().cloned()).collect();
                &catalog
            }
            name => map.get(name).map_or(&[][..], |c| c.docs.as_slice()),
        };
        let mut out = Vec::new();
        for d in source {
            if matches(d, query)? {
                out.push(d.clone());
            }
        }
        Ok(out)
    }

    fn count_inner(&self, collection: &str, query: &Document, limit: i64, skip: i64) -> Result<u64, DbError> {
        let hits = self.select(collection, query)?.len();
        let after_skip = hits.saturating_sub(i64_to_usize(skip).unwrap_or(0));
        let limited = match i64_to_usize(limit.saturating_abs()) {
            Some(0) | None => after_skip,
            Some(n) => after_skip.min(n),
        };
        Ok(u64::try_from(limited).unwrap_or(u64::MAX))
    }

    fn distinct(&self, collection: &str, cmd: &Document) -> Result<Document, DbError> {
        let key = cmd.get_str("key").map_err(|_| err("distinct needs a string key"))?;
        let query = cmd.get_document("query").cloned().unwrap_or_default();
        let mut values: Vec<Bson> = Vec::new();
        for d in self.select(collection, &query)? {
            let found: Vec<Bson> = match get_path(&d, key) {
                Some(Bson::Array(items)) => items.clone(),
                Some(v) => vec![v.clone()],
                None => Vec::new(),
            };
            for v in found {
                if !values.iter().any(|x| values_equal(x, &v)) {
                    values.push(v);
                }
            }
        }
        Ok(doc! {"values": values, "ok": 1.0})
    }

    fn find_and_modify(&self, collection: &str, cmd: &Document) -> Result<Document, DbError> {
        let query = cmd.get_document("query").cloned().unwrap_or_default();
        let sort = cmd.get_document("sort").ok().filter(|s| !s.is_empty());
        let fields = cmd.get_document("fields").cloned().unwrap_or_default();
        let remove = cmd.get("remove").is_some_and(is_truthy);
        let return_new = cmd.get("new").is_some_and(is_truthy);
        let upsert = cmd.get("upsert").is_some_and(is_truthy);
        let update = cmd.get_document("update").ok();
        match (remove, update) {
            (false, None) => return Err(err("need remove or update")),
            (true, Some(_)) => return Err(err("remove and update can't both be specified")),
            (true, None) if return_new => return Err(err("remove and returnNew can't co-exist")),
            _ => {}
        }

        let mut map = self.collections.write();
        let slot = match map.get(collection) {
            Some(coll) => {
                let mut best: Option<usize> = None;
                for (i, d) in coll.docs.iter().enumerate() {
                    if !matches(d, &query)? {
                        continue;
                    }
                    best = match (best, sort) {
                        (None, _) => Some(i),
                        (Some(b), Some(s)) if compare_docs(d, &coll.docs[b], s).is_lt() => Some(i),
                        (Some(b), _) => Some(b),
                    };
                    if sort.is_none() {
                        break;
                    }
                }
                best
            }
            None => None,
        };

        let mut last_error = doc! {"updatedExisting": false, "n": 0};
        let value = match (slot, update) {
            (Some(i), None) => {
                let coll = self.collection_mut(&mut map, collection)?;
                last_error.insert("n", 1);
                Some(coll.docs.remove(i))
            }
            (Some(i), Some(update)) => {
                let coll = self.collection_mut(&mut map, collection)?;
                let mut next = coll.docs[i].clone();
                apply_update(&mut next, update, false)?;
                check_unique(coll, &next, Some(i))?;
                let old = std::mem::replace(&mut coll.docs[i], next.clone());
                last_error = doc! {"updatedExisting": true, "n": 1};
                Some(if return_new { next } else { old })
            }
            (None, Some(update)) if upsert => {
                let coll = self.collection_mut(&mut map, collection)?;
                let doc = build_upsert(&query, update)?;
                check_unique(coll, &doc, None)?;
                coll.docs.push(doc.clone());
                last_error = doc! {"updatedExisting": false, "n": 1, "upserted": doc.get(ID_FIELD).cloned().unwrap_or(Bson::Null)};
                return_new.then_some(doc)
            }
            (None, _) => None,
        };
        let value = match value {
            Some(d) => Bson::Document(project(&d, &fields)?),
            None => Bson::Null,
        };
        Ok(doc! {"lastErrorObject": last_error, "value": value, "ok": 1.0})
    }

    fn drop_inner(&self, collection: &str) -> Document {
        match self.collections.write().remove(collection) {
            Some(c) => doc! {"ns": self.namespace(collection), "nIndexesWas": usize_to_i64(c.indexes.len()), "ok": 1.0},
            None => doc! {"ok": 0.0, "errmsg": "ns not found"},
        }
    }

    fn insert_one(&self, coll: &mut Collection, doc: &mut Document) -> Result<(), DbError> {
        ensure_storable(doc)?;
        ensure_id(doc);
        check_unique(coll, doc, None)?;
        coll.docs.push(doc.clone());
        Ok(())
    }

    fn insert_inner(&self, collection: &str, doc: &mut Document) -> Result<Document, DbError> {
        let mut map = self.collections.write();
        let coll = self.collection_mut(&mut map, collection)?;
        self.insert_one(coll, doc)?;
        Ok(doc! {"ok": 1.0, "n": 0, "err": Bson::Null})
    }

    fn batch_insert_inner(&self, collection: &str, docs: &mut [Document], continue_on_error: bool) -> Result<Document, DbError> {
        let mut map = self.collections.write();
        let coll = self.collection_mut(&mut map, collection)?;
        let mut first_error = None;
        let mut inserted = 0_i64;
        for doc in docs.iter_mut() {
            match self.insert_one(coll, doc) {
                Ok(()) => inserted += 1,
                Err(e) if continue_on_error => {
                    first_error.get_or_insert(e);
                }
                Err(e) => return Err(e),
            }
        }
        match first_error {
            Some(e) => Err(e),
            None => Ok(doc! {"ok": 1.0, "n": inserted, "err": Bson::Null}),
        }
    }

    fn update_inner(&self, collection: &str, query: &Document, update: &Document, options: &WriteOptions) -> Result<Document, DbError> {
        if options.multiple && is_replacement(update) {
            return Err(err("multi update only works with $ operators"));
        }
        let mut map = self.collections.write();
        let mut hits = Vec::new();
        if let Some(coll) = map.get(collection) {
            for (i, d) in coll.docs.iter().enumerate() {
                if matches(d, query)? {
                    hits.push(i);
                    if !options.multiple {
                        break;
                    }
                }
            }
        }
        if hits.is_empty() && !options.upsert {
            return Ok(doc! {"ok": 1.0, "n": 0, "nModified": 0, "updatedExisting": false, "err": Bson::Null});
        }
        let coll = self.collection_mut(&mut map, collection)?;
        if hits.is_empty() {
            let doc = build_upsert(query, update)?;
            check_unique(coll, &doc, None)?;
            let id = doc.get(ID_FIELD).cloned().unwrap_or(Bson::Null);
            coll.docs.push(doc);
            return Ok(doc! {
                "ok": 1.0,
                "n": 1,
                "nModified": 0,
                "updatedExisting": false,
                "upserted": id,
                "err": Bson::Null,
            });
        }
        let mut modified = 0_i64;
        for &i in &hits {
            let mut next = coll.docs[i].clone();
            if apply_update(&mut next, update, false)? {
                modified += 1;
            }
            check_unique(coll, &next, Some(i))?;
            coll.docs[i] = next;
        }
        Ok(doc! {
            "ok": 1.0,
            "n": usize_to_i64(hits.len()),
            "nModified": modified,
            "updatedExisting": true,
            "err": Bson::Null,
        })
    }

    fn remove_inner(&self, collection: &str, query: &Document, just_one: bool) -> Result<Document, DbError> {
        let mut map = self.collections.write();
        let Some(coll) = map.get_mut(collection) else {
            return Ok(doc! {"ok": 1.0, "n": 0, "err": Bson::Null});
        };
        let mut hits = Vec::new();
        for (i, d) in coll.docs.iter().enumerate() {
            if matches(d, query)? {
                hits.push(i);
                if just_one {
                    break;
                }
            }
        }
        for &i in hits.iter().rev() {
            coll.docs.remove(i);
        }
        Ok(doc! {"ok": 1.0, "n": usize_to_i64(hits.len()), "err": Bson::Null})
    }
}

impl Default for MemoryDriver {
    fn default() -> Self {
        Self::new("test")
    }
}

impl Driver for MemoryDriver {
    fn connect(config: &ConnectionConfig) -> Result<Self, DbError> {
        log::info!("memory driver serving database '{}'", config.name);
        Ok(Self::new(config.name.clone()))
    }

    fn database_name(&self) -> &str {
        &self.name
    }

    fn run_command(&self, command: &Document, timeout_ms: Option<i64>) -> Result<Document, DbError> {
        let Some((name, target)) = command.iter().next() else {
            return Ok(doc! {"ok": 0.0, "errmsg": "no command given"});
        };
        let collection = match target {
            Bson::String(s) => s.as_str(),
            _ => "",
        };
        self.tick(name, collection);
        if let Some(ms) = timeout_ms {
            crate::dev6!("command {name} timeout {ms}ms");
        }
        let result = match name.as_str() {
            "ping" => Ok(doc! {"ok": 1.0}),
            "count" => {
                let query = command.get_document("query").cloned().unwrap_or_default();
                let limit = command.get("limit").and_then(bson_as_i64).unwrap_or(0);
                let skip = command.get("skip").and_then(bson_as_i64).unwrap_or(0);
                self.count_inner(collection, &query, limit, skip)
                    .map(|n| doc! {"n": i64::try_from(n).unwrap_or(i64::MAX), "ok": 1.0})
            }
            "distinct" => self.distinct(collection, command),
            "findAndModify" | "findandmodify" => self.find_and_modify(collection, command),
            "drop" => Ok(self.drop_inner(collection)),
            other => Ok(doc! {"ok": 0.0, "errmsg": format!("no such command: '{other}'"), "code": 59}),
        };
        Ok(result.unwrap_or_else(|e| error_response(&e)))
    }

    fn open_cursor(&self, collection: &str, spec: &QuerySpec) -> Result<DocumentStream<'_>, DbError> {
        self.tick("find", collection);
        if !spec.options.is_empty() {
            let names: Vec<&str> = spec.options.iter().map(crate::cursor::CursorOption::name).collect();
            crate::dev6!("cursor options {}", names.join(","));
        }
        let mut docs = self.select(collection, &spec.query)?;
        if let Some(sort) = spec.sort() {
            docs.sort_by(|a, b| compare_docs(a, b, sort));
        }
        let skip = usize::try_from(spec.skip().unwrap_or(0)).unwrap_or(usize::MAX);
        let limit = spec
            .limit()
            .and_then(|n| i64_to_usize(n.saturating_abs()))
            .filter(|n| *n > 0)
            .unwrap_or(usize::MAX);
        let projected: Vec<Result<Document, DbError>> = docs
            .into_iter()
            .skip(skip)
            .take(limit)
            .map(|d| project(&d, &spec.fields))
            .collect();
        Ok(Box::new(projected.into_iter()))
    }

    fn count(&self, collection: &str, query: &Document, limit: i64, skip: i64) -> Result<u64, DbError> {
        self.tick("count", collection);
        self.count_inner(collection, query, limit, skip)
    }

    fn insert(&self, collection: &str, doc: &mut Document, options: &WriteOptions) -> Result<Document, DbError> {
        self.tick("insert", collection);
        write_ack(options, self.insert_inner(collection, doc))
    }

    fn batch_insert(&self, collection: &str, docs: &mut [Document], options: &WriteOptions) -> Result<Document, DbError> {
        self.tick("batchInsert", collection);
        write_ack(options, self.batch_insert_inner(collection, docs, options.continue_on_error))
    }

    fn update(&self, collection: &str, query: &Document, update: &Document, options: &WriteOptions) -> Result<Document, DbError> {
        self.tick("update", collection);
        write_ack(options, self.update_inner(collection, query, update, options))
    }

    fn remove(&self, collection: &str, query: &Document, options: &WriteOptions) -> Result<Document, DbError> {
        self.tick("remove", collection);
        write_ack(options, self.remove_inner(collection, query, options.just_one))
    }

    fn ensure_index(&self, collection: &str, key: &Document, options: &Document) -> Result<Document, DbError> {
        self.tick("ensureIndex", collection);
        if key.is_empty() {
            return Err(err("index keys cannot be empty"));
        }
        let name = options.get_str("name").map_or_else(|_| index_name(key), str::to_string);
        let mut map = self.collections.write();
        let created = !map.contains_key(collection);
        let ns = self.namespace(collection);
        let coll = self.collection_mut(&mut map, collection)?;
        let before = usize_to_i64(coll.indexes.len());
        let same_key = |i: &Document| i.get_document("key").is_ok_and(|k| values_equal(&Bson::Document(k.clone()), &Bson::Document(key.clone())));
        if coll.indexes.iter().any(same_key) {
            return Ok(doc! {
                "createdCollectionAutomatically": created,
                "numIndexesBefore": before,
                "numIndexesAfter": before,
                "note": "all indexes already exist",
                "ok": 1.0,
            });
        }
        if coll.indexes.iter().any(|i| i.get_str("name").is_ok_and(|n| n == name)) {
            return Err(err(format!("Index with name: {name} already exists with different options")));
        }
        let mut index = doc! {"v": 1, "key": key.clone(), "name": name.as_str(), "ns": ns};
        for (k, v) in options {
            if !matches!(k.as_str(), "name" | "w" | "timeout" | "safe" | "wtimeout" | "fsync" | "j") {
                index.insert(k.clone(), v.clone());
            }
        }
        if is_unique(&index) {
            let mut seen = Collection { docs: Vec::new(), indexes: vec![index.clone()] };
            for d in &coll.docs {
                check_unique(&seen, d, None)?;
                seen.docs.push(d.clone());
            }
        }
        coll.indexes.push(index);
        Ok(doc! {
            "createdCollectionAutomatically": created,
            "numIndexesBefore": before,
            "numIndexesAfter": before + 1,
            "ok": 1.0,
        })
    }

    fn drop_collection(&self, collection: &str) -> Result<Document, DbError> {
        self.tick("drop", collection);
        Ok(self.drop_inner(collection))
    }

    fn list_collections(&self) -> Result<Vec<String>, DbError> {
        self.tick("listCollections", "");
        Ok(self.collections.read().keys().cloned().collect())
    }
}
