//! Attribute edits on a stored entity, applied through one atomic fetch-and-mutate.
//!
//! A mutation is sent as `findAndModify` scoped by `_id` with `upsert: false` and `new: true`.
//! A non-zero matched count means the returned document is the new authoritative state;
//! zero means the entity is gone (or never had an identity) and nothing changes locally.
//! Attributes that disappear through `unset` or `rename` are reset to their declared default,
//! or `null` when the schema declares none.

use std::collections::BTreeSet;

use bson::{Bson, Document, doc};

use super::entity::Entity;
use super::schema::{CollectionResolver, SchemaCollections};
use crate::database::Database;
use crate::driver::Driver;
use crate::errors::{DbError, MutationAction, MutationFailure};
use crate::query::UpdateOperator;
use crate::types::{Command, ID_FIELD};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MutationOutcome {
    Applied,
    /// Nothing matched; the entity was left untouched.
    Rejected,
}

impl MutationOutcome {
    #[must_use]
    pub const fn is_applied(self) -> bool {
        matches!(self, Self::Applied)
    }
}

/// Operator payloads for one fetch-and-mutate, in the order they were added.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Mutation {
    entries: Vec<(UpdateOperator, Document)>,
}

impl Mutation {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Add `field: value` under `op`, merging with earlier entries for the same operator.
    #[must_use]
    pub fn with(mut self, op: UpdateOperator, field: impl Into<String>, value: impl Into<Bson>) -> Self {
        let (field, value) = (field.into(), value.into());
        if let Some((_, fields)) = self.entries.iter_mut().find(|(o, _)| *o == op) {
            fields.insert(field, value);
        } else {
            let mut fields = Document::new();
            fields.insert(field, value);
            self.entries.push((op, fields));
        }
        self
    }

    #[must_use]
    pub fn set(self, field: impl Into<String>, value: impl Into<Bson>) -> Self {
        self.with(UpdateOperator::Set, field, value)
    }

    #[must_use]
    pub fn unset(self, field: impl Into<String>) -> Self {
        self.with(UpdateOperator::Unset, field, 1)
    }

    #[must_use]
    pub fn rename(self, from: impl Into<String>, to: impl Into<String>) -> Self {
        self.with(UpdateOperator::Rename, from, to.into())
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Attribute names that no longer exist once the mutation is applied.
    #[must_use]
    pub fn disappeared(&self) -> BTreeSet<String> {
        self.entries
            .iter()
            .filter(|(op, _)| matches!(op, UpdateOperator::Unset | UpdateOperator::Rename))
            .flat_map(|(_, fields)| fields.keys().cloned())
            .collect()
    }

    /// The `findAndModify` command for the entity stored under `id` in `collection`.
    #[must_use]
    pub fn to_command(&self, collection: &str, id: &Bson) -> Command {
        let mut cmd = doc! {
            "collection": collection,
            "query": { "_id": id.clone() },
            "upsert": false,
            "new": true,
        };
        for (op, fields) in &self.entries {
            cmd.insert(op.name(), fields.clone());
        }
        cmd
    }
}

/// Applies mutations to entities through a [`Database`].
pub struct EntityStore<'a, D: Driver, R: CollectionResolver = SchemaCollections> {
    db: &'a Database<D>,
    resolver: R,
}

impl<'a, D: Driver> EntityStore<'a, D> {
    #[must_use]
    pub const fn new(db: &'a Database<D>) -> Self {
        Self { db, resolver: SchemaCollections }
    }
}

impl<'a, D: Driver, R: CollectionResolver> EntityStore<'a, D, R> {
    #[must_use]
    pub const fn with_resolver(db: &'a Database<D>, resolver: R) -> Self {
        Self { db, resolver }
    }

    /// Run `mutation` against the stored copy of `entity` and reconcile its state.
    ///
    /// # Errors
    /// `DbError::Validation` for an empty mutation, or whatever the store reports.
    pub fn modify(&self, entity: &mut Entity, mutation: &Mutation) -> Result<MutationOutcome, DbError> {
        if mutation.is_empty() {
            return Err(DbError::Validation("mutation has no operators".into()));
        }
        let Some(id) = entity.id().cloned() else {
            log::info!("{} without identity; mutation rejected", entity.type_name());
            return Ok(MutationOutcome::Rejected);
        };
        let collection = self.resolver.resolve(entity.schema());
        let report = self.db.find_and_modify(mutation.to_command(&collection, &id))?;
        if report.matched == 0 {
            log::info!("{} {id} not found in '{collection}'; mutation rejected", entity.type_name());
            return Ok(MutationOutcome::Rejected);
        }
        let Some(mut state) = report.value else {
            return Err(DbError::Driver(format!(
                "findAndModify matched {} {id} but returned no document",
                entity.type_name()
            )));
        };
        // Only names the store did not hand back; a chained rename may have refilled one.
        for name in mutation.disappeared() {
            if !state.contains_key(&name) {
                let restored = entity.schema().default_for(&name).cloned().unwrap_or(Bson::Null);
                state.insert(name, restored);
            }
        }
        entity.replace_state(state);
        Ok(MutationOutcome::Applied)
    }

    fn single(
        &self,
        entity: &mut Entity,
        attribute: &str,
        action: MutationAction,
        mutation: Mutation,
    ) -> Result<(), DbError> {
        let type_name = entity.type_name().to_string();
        let fail = |reason| DbError::AttributeMutation {
            type_name: type_name.clone(),
            attribute: attribute.to_string(),
            action,
            reason,
        };
        if attribute == ID_FIELD {
            return Err(fail(MutationFailure::IdentityImmutable));
        }
        match self.modify(entity, &mutation)? {
            MutationOutcome::Applied => Ok(()),
            MutationOutcome::Rejected => Err(fail(MutationFailure::StaleEntity)),
        }
    }

    /// Write one attribute.
    ///
    /// # Errors
    /// `DbError::AttributeMutation` for `_id` or when the entity no longer exists.
    pub fn set(&self, entity: &mut Entity, attribute: &str, value: impl Into<Bson>) -> Result<(), DbError> {
        self.single(entity, attribute, MutationAction::Set, Mutation::new().set(attribute, value))
    }

    /// Remove one attribute; its declared default (or `null`) takes its place.
    ///
    /// # Errors
    /// `DbError::AttributeMutation` for `_id` or when the entity no longer exists.
    pub fn unset(&self, entity: &mut Entity, attribute: &str) -> Result<(), DbError> {
        self.single(entity, attribute, MutationAction::Unset, Mutation::new().unset(attribute))
    }
}
