use std::collections::BTreeMap;

use bson::{Bson, Document};
use docverb::config::ConnectionConfig;
use docverb::query::{UpdateMode, UpdateOperator, build_update, flatten_fields, translate_predicate};
use docverb::{Database, DbError};
use proptest::prelude::*;

const COLLATIONS: [(&str, &str); 5] = [("<", "$lt"), (">", "$gt"), ("<=", "$lte"), (">=", "$gte"), ("<>", "$ne")];

fn field() -> impl Strategy<Value = String> {
    "[a-z]{1,8}"
}

proptest! {
    #[test]
    fn single_collation_is_a_rename(
        preds in proptest::collection::btree_map(field(), (0..COLLATIONS.len(), any::<i64>()), 0..8)
    ) {
        let mut input = Document::new();
        let mut expected = Document::new();
        for (f, (c, v)) in &preds {
            let (collation, op) = COLLATIONS[*c];
            let mut sub = Document::new();
            sub.insert(collation, *v);
            input.insert(f.clone(), sub);
            let mut want = Document::new();
            want.insert(op, *v);
            expected.insert(f.clone(), want);
        }
        prop_assert_eq!(translate_predicate(&input), expected);
    }

    #[test]
    fn equality_discards_siblings(
        before in proptest::sample::subsequence(COLLATIONS.to_vec(), 0..=5),
        after in proptest::sample::subsequence(COLLATIONS.to_vec(), 0..=5),
        v in any::<i64>(),
    ) {
        let mut sub = Document::new();
        for (c, _) in &before {
            sub.insert(*c, 1);
        }
        sub.insert("=", v);
        let extra: Vec<&str> = after.iter().map(|(c, _)| *c).filter(|c| !sub.contains_key(*c)).collect();
        for c in extra {
            sub.insert(c, 2);
        }
        let mut input = Document::new();
        input.insert("f", sub);
        let out = translate_predicate(&input);
        prop_assert_eq!(out.get("f"), Some(&Bson::Int64(v)));
    }

    #[test]
    fn plain_names_select_with_null_fill(
        doc in proptest::collection::btree_map(field(), any::<i32>(), 0..8),
        wanted in proptest::collection::vec(field(), 0..8),
    ) {
        let source: Document = doc.iter().map(|(k, v)| (k.clone(), Bson::Int32(*v))).collect();
        let mut expected = Document::new();
        for w in &wanted {
            expected.insert(w.clone(), doc.get(w).map_or(Bson::Null, |v| Bson::Int32(*v)));
        }
        prop_assert_eq!(flatten_fields(&source, &wanted), expected);
    }

    #[test]
    fn dotted_paths_through_missing_segments_are_omitted(
        doc in proptest::collection::btree_map(field(), any::<i32>(), 0..8),
        tail in field(),
    ) {
        let source: Document = doc.iter().map(|(k, v)| (k.clone(), Bson::Int32(*v))).collect();
        // Upper-case names never collide with the generated lower-case keys.
        let path = format!("MISSING.{tail}");
        prop_assert!(flatten_fields(&source, &[path]).is_empty());
        // Scalars cannot be descended into either.
        for k in doc.keys() {
            let nested = format!("{k}.{tail}");
            prop_assert!(flatten_fields(&source, &[nested]).is_empty());
        }
    }

    #[test]
    fn one_operator_key_per_parameter(
        ops in proptest::sample::subsequence(UpdateOperator::NAMED.to_vec(), 1..=16),
        v in any::<i32>(),
    ) {
        let params: Vec<(UpdateOperator, Bson)> = ops
            .iter()
            .map(|op| {
                let mut payload = Document::new();
                payload.insert("a", v);
                (op.clone(), Bson::Document(payload))
            })
            .collect();
        let built = build_update(None, &params).unwrap();
        prop_assert_eq!(built.mode, UpdateMode::Modify);
        prop_assert!(built.multiple(None));
        prop_assert_eq!(built.payload.len(), ops.len());
        for op in &ops {
            prop_assert!(built.payload.contains_key(op.operator_key()));
        }
        prop_assert!(built.payload.keys().all(|k| k.starts_with('$')));
    }

    #[test]
    fn operator_keys_in_replacements_never_reach_the_store(
        fields in proptest::collection::btree_map(field(), any::<i32>(), 0..5),
        op in "\\$[a-z]{1,6}",
    ) {
        let db: Database = Database::new(ConnectionConfig::default()).unwrap();
        let mut replace: Document = fields.iter().map(|(k, v)| (k.clone(), Bson::Int32(*v))).collect();
        replace.insert(op, 1);
        let mut cmd = Document::new();
        cmd.insert("collection", "c");
        cmd.insert("replace", replace);
        let before = db.driver().unwrap().operation_count();
        let err = db.update(cmd).unwrap_err();
        prop_assert!(matches!(err, DbError::Validation(_)));
        prop_assert_eq!(db.driver().unwrap().operation_count(), before);
    }

    #[test]
    fn inserted_documents_read_back_unchanged(
        fields in proptest::collection::btree_map(field(), any::<i64>(), 0..6)
    ) {
        let db: Database = Database::new(ConnectionConfig::default()).unwrap();
        let set: Document = fields.iter().map(|(k, v)| (k.clone(), Bson::Int64(*v))).collect();
        let mut cmd = Document::new();
        cmd.insert("collection", "rt");
        cmd.insert("set", set);
        let stored = db.insert(cmd).unwrap();
        let mut read = Document::new();
        read.insert("collection", "rt");
        let mut query = Document::new();
        query.insert("_id", stored.get("_id").cloned().unwrap());
        read.insert("query", query);
        let back = db.find_one(read).unwrap().into_document().unwrap();
        prop_assert_eq!(&back, &stored);
        let values: BTreeMap<String, i64> = back
            .iter()
            .filter(|(k, _)| k.as_str() != "_id")
            .map(|(k, v)| (k.clone(), v.as_i64().unwrap()))
            .collect();
        prop_assert_eq!(values, fields);
    }
}
