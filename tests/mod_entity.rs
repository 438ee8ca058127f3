use std::sync::Arc;

use bson::{Bson, doc};
use docverb::config::ConnectionConfig;
use docverb::model::Schema;
use docverb::{
    Database, DbError, Entity, EntityStore, Fetched, MutationAction, MutationFailure, Mutation,
    MutationOutcome, SchemaRegistry,
};

fn setup() -> (Database, Arc<Schema>) {
    let db: Database = Database::new(ConnectionConfig::default()).unwrap();
    let registry = SchemaRegistry::new();
    let user = registry.register(
        Schema::builder("User")
            .collection("users")
            .default_value("nickname", Bson::Null)
            .default_value("role", "member")
            .build(),
    );
    db.insert(doc! {"collection": "users", "set": {"_id": 1, "name": "ann", "nickname": "annie", "role": "admin"}})
        .unwrap();
    (db, user)
}

fn stored(db: &Database, id: i32) -> bson::Document {
    db.find_one(doc! {"collection": "users", "query": {"_id": id}})
        .unwrap()
        .into_document()
        .unwrap()
}

fn ops(db: &Database) -> u64 {
    db.driver().unwrap().operation_count()
}

fn load(db: &Database, schema: &Arc<Schema>, id: i32) -> Entity {
    Entity::from_document(Arc::clone(schema), stored(db, id))
}

#[test]
fn unset_restores_a_null_default() {
    let (db, user) = setup();
    let mut ann = load(&db, &user, 1);
    EntityStore::new(&db).unset(&mut ann, "nickname").unwrap();
    assert_eq!(ann.get("nickname"), Some(&Bson::Null));
    assert!(!stored(&db, 1).contains_key("nickname"));
}

#[test]
fn unset_restores_the_declared_default() {
    let (db, user) = setup();
    let mut ann = load(&db, &user, 1);
    EntityStore::new(&db).unset(&mut ann, "role").unwrap();
    assert_eq!(ann.get("role"), Some(&Bson::String("member".into())));
    assert!(!stored(&db, 1).contains_key("role"));
}

#[test]
fn set_takes_the_returned_document() {
    let (db, user) = setup();
    let mut ann = load(&db, &user, 1);
    EntityStore::new(&db).set(&mut ann, "name", "anne").unwrap();
    assert_eq!(ann.state(), &stored(&db, 1));
    assert_eq!(ann.get("name"), Some(&Bson::String("anne".into())));
}

#[test]
fn rejected_mutation_leaves_the_entity_alone() {
    let (db, user) = setup();
    let mut ghost = Entity::from_document(Arc::clone(&user), doc! {"_id": 42, "nickname": "boo"});
    let before = ghost.clone();
    let store = EntityStore::new(&db);

    let outcome = store.modify(&mut ghost, &Mutation::new().unset("nickname")).unwrap();
    assert_eq!(outcome, MutationOutcome::Rejected);
    assert_eq!(ghost, before);

    let err = store.unset(&mut ghost, "nickname").unwrap_err();
    assert!(matches!(
        err,
        DbError::AttributeMutation { action: MutationAction::Unset, reason: MutationFailure::StaleEntity, .. }
    ));
    assert_eq!(ghost, before);
}

#[test]
fn entities_without_identity_never_reach_the_store() {
    let (db, user) = setup();
    let mut fresh = Entity::new(user);
    let store = EntityStore::new(&db);
    let before = ops(&db);
    assert_eq!(store.modify(&mut fresh, &Mutation::new().set("name", "x")).unwrap(), MutationOutcome::Rejected);
    assert!(store.set(&mut fresh, "name", "x").is_err());
    assert!(store.unset(&mut fresh, "role").is_err());
    assert_eq!(ops(&db), before);
    assert_eq!(fresh.get("role"), Some(&Bson::String("member".into())));
}

#[test]
fn identity_is_immutable() {
    let (db, user) = setup();
    let mut ann = load(&db, &user, 1);
    let before = ops(&db);
    let err = EntityStore::new(&db).set(&mut ann, "_id", 2).unwrap_err();
    assert_eq!(err.to_string(), "Cannot set attribute User._id: identity is immutable");
    assert_eq!(ops(&db), before);
    assert!(EntityStore::new(&db).unset(&mut ann, "_id").is_err());
    assert_eq!(ann.id(), Some(&Bson::Int32(1)));
}

#[test]
fn renamed_away_attributes_are_reset() {
    let (db, user) = setup();
    let mut ann = load(&db, &user, 1);
    let m = Mutation::new().rename("name", "full_name").rename("role", "title");
    assert!(EntityStore::new(&db).modify(&mut ann, &m).unwrap().is_applied());
    assert_eq!(ann.get("full_name"), Some(&Bson::String("ann".into())));
    assert_eq!(ann.get("name"), Some(&Bson::Null));
    assert_eq!(ann.get("role"), Some(&Bson::String("member".into())));
    assert_eq!(ann.get("title"), Some(&Bson::String("admin".into())));
}

#[test]
fn chained_rename_targets_keep_their_new_value() {
    let (db, user) = setup();
    let mut ann = load(&db, &user, 1);
    let m = Mutation::new().rename("nickname", "alias").rename("name", "nickname");
    assert!(EntityStore::new(&db).modify(&mut ann, &m).unwrap().is_applied());
    assert_eq!(ann.get("alias"), Some(&Bson::String("annie".into())));
    assert_eq!(ann.get("nickname"), Some(&Bson::String("ann".into())));
    assert_eq!(ann.get("name"), Some(&Bson::Null));
}

#[test]
fn resolver_picks_the_collection() {
    let (db, user) = setup();
    db.insert(doc! {"collection": "people", "set": {"_id": 1, "name": "other"}}).unwrap();
    let store = EntityStore::with_resolver(&db, |_: &Schema| "people".to_string());
    let mut e = Entity::from_document(user, doc! {"_id": 1});
    store.set(&mut e, "name", "changed").unwrap();
    let people = db.find_one(doc! {"collection": "people", "query": {"_id": 1}, "fields": ["name"]}).unwrap();
    assert_eq!(people, Fetched::Scalar(Bson::String("changed".into())));
    assert_eq!(stored(&db, 1).get_str("name").unwrap(), "ann");
}

#[test]
fn empty_mutations_are_invalid() {
    let (db, user) = setup();
    let mut ann = load(&db, &user, 1);
    let err = EntityStore::new(&db).modify(&mut ann, &Mutation::new()).unwrap_err();
    assert!(matches!(err, DbError::Validation(_)));
}
