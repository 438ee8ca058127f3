//! Entity types, their registered defaults and the attribute mutation protocol.
pub mod entity;
pub mod modify;
pub mod schema;

pub use entity::Entity;
pub use modify::{EntityStore, Mutation, MutationOutcome};
pub use schema::{CollectionResolver, Schema, SchemaBuilder, SchemaCollections, SchemaRegistry};
