use std::collections::VecDeque;

use bson::{Bson, Document, doc};
use docverb::config::ConnectionConfig;
use docverb::driver::{DocumentStream, QuerySpec, WriteOptions};
use docverb::utils::devlog;
use docverb::{Database, DbError, Driver};
use parking_lot::Mutex;

/// Answers named commands from a script and records what it was sent.
#[derive(Default)]
struct ScriptedDriver {
    replies: Mutex<VecDeque<Document>>,
    sent: Mutex<Vec<(Document, Option<i64>)>>,
}

impl ScriptedDriver {
    fn with_replies(replies: Vec<Document>) -> Self {
        Self { replies: Mutex::new(replies.into()), sent: Mutex::default() }
    }

    fn sent(&self) -> Vec<(Document, Option<i64>)> {
        self.sent.lock().clone()
    }
}

fn unscripted<T>() -> Result<T, DbError> {
    Err(DbError::Driver("not scripted".into()))
}

impl Driver for ScriptedDriver {
    fn connect(_config: &ConnectionConfig) -> Result<Self, DbError> {
        Ok(Self::default())
    }

    fn database_name(&self) -> &str {
        "scripted"
    }

    fn run_command(&self, command: &Document, timeout_ms: Option<i64>) -> Result<Document, DbError> {
        self.sent.lock().push((command.clone(), timeout_ms));
        Ok(self.replies.lock().pop_front().unwrap_or_else(|| doc! {"ok": 1.0}))
    }

    fn open_cursor(&self, _collection: &str, _spec: &QuerySpec) -> Result<DocumentStream<'_>, DbError> {
        unscripted()
    }

    fn count(&self, _collection: &str, _query: &Document, _limit: i64, _skip: i64) -> Result<u64, DbError> {
        unscripted()
    }

    fn insert(&self, _collection: &str, _doc: &mut Document, _options: &WriteOptions) -> Result<Document, DbError> {
        Ok(doc! {"ok": 1.0, "err": "E11000 duplicate key error"})
    }

    fn batch_insert(&self, _collection: &str, _docs: &mut [Document], _options: &WriteOptions) -> Result<Document, DbError> {
        unscripted()
    }

    fn update(&self, _collection: &str, _query: &Document, _update: &Document, _options: &WriteOptions) -> Result<Document, DbError> {
        Ok(doc! {"ok": 1.0, "lastErrorObject": {"n": 2, "nModified": 1, "updatedExisting": true}})
    }

    fn remove(&self, _collection: &str, _query: &Document, _options: &WriteOptions) -> Result<Document, DbError> {
        unscripted()
    }

    fn ensure_index(&self, _collection: &str, _key: &Document, _options: &Document) -> Result<Document, DbError> {
        unscripted()
    }

    fn drop_collection(&self, _collection: &str) -> Result<Document, DbError> {
        unscripted()
    }

    fn list_collections(&self) -> Result<Vec<String>, DbError> {
        Ok(Vec::new())
    }
}

fn scripted(replies: Vec<Document>) -> Database<ScriptedDriver> {
    Database::with_driver(ConnectionConfig::default(), ScriptedDriver::with_replies(replies)).unwrap()
}

#[test]
fn error_messages_become_driver_errors() {
    let db = scripted(vec![doc! {"ok": 0.0, "errmsg": "exception: bad key"}]);
    let err = db.distinct(doc! {"collection": "users", "key": "a"}).unwrap_err();
    assert!(matches!(err, DbError::Driver(ref m) if m == "exception: bad key"));
}

#[test]
fn direct_write_results_are_checked_too() {
    let db = scripted(Vec::new());
    let err = db.insert(doc! {"collection": "users", "set": {"a": 1}}).unwrap_err();
    assert!(matches!(err, DbError::Driver(ref m) if m.starts_with("E11000")));
}

#[test]
fn nested_write_results_are_flattened() {
    let db = scripted(vec![doc! {
        "lastErrorObject": {"updatedExisting": true, "n": 1},
        "value": {"_id": 1, "a": 2},
        "ok": 1.0,
    }]);
    let r = db.find_and_modify(doc! {"collection": "users", "query": {"_id": 1}, "set": {"a": 2}}).unwrap();
    assert_eq!(r.matched, 1);
    assert!(r.updated_existing);
    assert_eq!(r.value, Some(doc! {"_id": 1, "a": 2}));
    assert!(!r.raw.contains_key("lastErrorObject"));

    let u = db.update(doc! {"collection": "users", "set": {"a": 1}}).unwrap();
    assert_eq!((u.matched, u.modified), (2, 1));
}

#[test]
fn find_and_modify_command_shape() {
    let db = scripted(Vec::new());
    db.find_and_modify(doc! {
        "collection": "users",
        "query": {"age": {"<>": 3}},
        "sort": {"age": 1},
        "set": {"a": 1},
        "timeout": 250,
    })
    .unwrap();
    let (cmd, timeout) = db.driver().unwrap().sent().remove(0);
    assert_eq!(
        cmd,
        doc! {
            "findAndModify": "users",
            "query": {"age": {"$ne": 3}},
            "sort": {"age": 1},
            "update": {"$set": {"a": 1}},
            "new": true,
            "upsert": false,
        }
    );
    assert_eq!(timeout, Some(250));
}

#[test]
fn named_commands_lead_with_the_verb() {
    let db = scripted(Vec::new());
    db.command("geoNear", doc! {"collection": "places", "near": [1, 2], "timeout": 500}).unwrap();
    let (cmd, timeout) = db.driver().unwrap().sent().remove(0);
    assert_eq!(cmd, doc! {"geoNear": "places", "near": [1, 2]});
    assert_eq!(timeout, Some(500));
}

#[test]
fn group_is_sent_as_one_spec() {
    let db = scripted(vec![doc! {"retval": [{"age": 18, "n": 2}], "count": 2, "keys": 1, "ok": 1.0}]);
    let r = db
        .group(doc! {
            "collection": "users",
            "keys": {"age": 1},
            "initial": {"n": 0},
            "reduce": "function (o, p) { p.n++; }",
            "cond": {"age": {">=": 18}},
        })
        .unwrap();
    assert_eq!(r.get_i32("count").unwrap(), 2);
    let (cmd, _) = db.driver().unwrap().sent().remove(0);
    assert_eq!(
        cmd,
        doc! {"group": {
            "ns": "users",
            "key": {"age": 1},
            "initial": {"n": 0},
            "$reduce": "function (o, p) { p.n++; }",
            "cond": {"age": {"$gte": 18}},
        }}
    );
}

#[test]
fn each_dispatch_is_traced() {
    let trace = devlog::Capture::start();
    let db = scripted(vec![doc! {"values": [1, 2], "ok": 1.0}]);
    let values = db.distinct(doc! {"collection": "users", "key": "a", "timeout": 10}).unwrap();
    assert_eq!(values, [Bson::Int32(1), Bson::Int32(2)]);
    assert_eq!(trace.take(), [r#"{"dispatch":"distinct","timeout":10}"#]);
}

#[test]
fn with_driver_skips_lazy_connect() {
    let db = scripted(Vec::new());
    assert!(db.is_connected());
    assert_eq!(db.list_collections().unwrap(), Vec::<String>::new());
}
