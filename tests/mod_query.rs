use bson::{Bson, doc};
use docverb::DbError;
use docverb::query::{
    Fetched, UpdateMode, UpdateOperator, build_update, flatten_fields, translate_optional,
    translate_predicate, unwrap_single,
};

#[test]
fn half_open_range() {
    let q = translate_predicate(&doc! {"age": {">=": 18, "<": 30}, "name": "ann"});
    assert_eq!(q, doc! {"age": {"$gte": 18, "$lt": 30}, "name": "ann"});
}

#[test]
fn equality_collation_wins() {
    let q = translate_predicate(&doc! {"age": {">": 1, "=": 5, "<": 9}});
    assert_eq!(q, doc! {"age": 5});
}

#[test]
fn store_operators_pass_through() {
    let q = translate_predicate(&doc! {"tags": {"$in": ["a"], "<>": "b"}, "n": {"$exists": true}});
    assert_eq!(q, doc! {"tags": {"$in": ["a"], "$ne": "b"}, "n": {"$exists": true}});
    assert!(translate_optional(None).is_empty());
}

#[test]
fn flattening_nested_paths() {
    let d = doc! {"a": {"b": {"c": 1}}, "x": [10, {"y": 2}], "n": Bson::Null};
    let flat = flatten_fields(&d, &["a.b.c", "x.1.y", "a.q.c", "n", "m"]);
    assert_eq!(flat, doc! {"a.b.c": 1, "x.1.y": 2, "n": Bson::Null, "m": Bson::Null});
}

#[test]
fn single_field_reads_unwrap() {
    let d = doc! {"a": {"b": 3}};
    assert_eq!(unwrap_single(Some(&d), &["a.b"]), Fetched::Scalar(Bson::Int32(3)));
    assert_eq!(unwrap_single(Some(&d), &["zz"]), Fetched::NotFound);
    assert_eq!(unwrap_single::<&str>(None, &[]), Fetched::NotFound);
    assert_eq!(unwrap_single(Some(&d), &["a", "q"]), Fetched::Document(doc! {"a": {"b": 3}, "q": Bson::Null}));
}

#[test]
fn replace_wins_over_operators() {
    let ops = vec![(UpdateOperator::Set, Bson::Document(doc! {"a": 1}))];
    let u = build_update(Some(&doc! {"name": "n"}), &ops).unwrap();
    assert_eq!(u.mode, UpdateMode::Replace);
    assert_eq!(u.payload, doc! {"name": "n"});
    assert!(!u.multiple(None));
    assert!(u.multiple(Some(true)));
}

#[test]
fn empty_replace_falls_back_to_operators() {
    let ops = vec![
        (UpdateOperator::Inc, Bson::Document(doc! {"n": 1})),
        (UpdateOperator::parse("currentDate"), Bson::Document(doc! {"at": true})),
    ];
    let u = build_update(Some(&doc! {}), &ops).unwrap();
    assert_eq!(u.mode, UpdateMode::Modify);
    assert_eq!(u.payload, doc! {"$inc": {"n": 1}, "$currentDate": {"at": true}});
    assert!(u.multiple(None));
    assert!(!u.multiple(Some(false)));
}

#[test]
fn nothing_to_update_is_passed_through() {
    let u = build_update(None, &[]).unwrap();
    assert!(u.is_empty());
    assert_eq!(u.mode, UpdateMode::Modify);
}

#[test]
fn operator_keys_in_replacements_fail() {
    let err = build_update(Some(&doc! {"a": 1, "$inc": {"n": 1}}), &[]).unwrap_err();
    assert!(matches!(err, DbError::Validation(ref m) if m.contains("$inc")));
}
