//! Per-type attribute metadata, registered up front and queried by attribute name.

use std::collections::HashMap;
use std::sync::Arc;

use bson::{Bson, Document};
use parking_lot::RwLock;

/// Declared shape of one entity type: its backing collection and attribute defaults.
#[derive(Debug, Clone, PartialEq)]
pub struct Schema {
    type_name: String,
    collection: String,
    defaults: Document,
}

impl Schema {
    #[must_use]
    pub fn builder(type_name: impl Into<String>) -> SchemaBuilder {
        let type_name = type_name.into();
        SchemaBuilder { collection: None, defaults: Document::new(), type_name }
    }

    #[must_use]
    pub fn type_name(&self) -> &str {
        &self.type_name
    }

    #[must_use]
    pub fn collection(&self) -> &str {
        &self.collection
    }

    /// Declared default for `attribute`. An attribute declared with a `null` default yields
    /// `Some(&Bson::Null)`; an undeclared one yields `None`.
    #[must_use]
    pub fn default_for(&self, attribute: &str) -> Option<&Bson> {
        self.defaults.get(attribute)
    }

    #[must_use]
    pub const fn defaults(&self) -> &Document {
        &self.defaults
    }
}

#[derive(Debug, Clone)]
pub struct SchemaBuilder {
    type_name: String,
    collection: Option<String>,
    defaults: Document,
}

impl SchemaBuilder {
    /// Backing collection; the type name is used when never set.
    #[must_use]
    pub fn collection(mut self, name: impl Into<String>) -> Self {
        self.collection = Some(name.into());
        self
    }

    #[must_use]
    pub fn default_value(mut self, attribute: impl Into<String>, value: impl Into<Bson>) -> Self {
        self.defaults.insert(attribute.into(), value.into());
        self
    }

    #[must_use]
    pub fn build(self) -> Schema {
        let collection = self.collection.unwrap_or_else(|| self.type_name.clone());
        Schema { type_name: self.type_name, collection, defaults: self.defaults }
    }
}

/// Schemas by type name. Shared handles are returned so entities can outlive re-registration.
#[derive(Debug, Default)]
pub struct SchemaRegistry {
    schemas: RwLock<HashMap<String, Arc<Schema>>>,
}

impl SchemaRegistry {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Register (or replace) a schema and hand back the shared handle.
    pub fn register(&self, schema: Schema) -> Arc<Schema> {
        let schema = Arc::new(schema);
        let previous = self.schemas.write().insert(schema.type_name.clone(), Arc::clone(&schema));
        if previous.is_some() {
            log::debug!("schema '{}' re-registered", schema.type_name);
        }
        schema
    }

    #[must_use]
    pub fn get(&self, type_name: &str) -> Option<Arc<Schema>> {
        self.schemas.read().get(type_name).cloned()
    }

    #[must_use]
    pub fn type_names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.schemas.read().keys().cloned().collect();
        names.sort();
        names
    }
}

/// Maps an entity type to the collection its documents live in.
pub trait CollectionResolver: Send + Sync {
    fn resolve(&self, schema: &Schema) -> String;
}

/// Uses the collection declared on the schema.
#[derive(Debug, Clone, Copy, Default)]
pub struct SchemaCollections;

impl CollectionResolver for SchemaCollections {
    fn resolve(&self, schema: &Schema) -> String {
        schema.collection.clone()
    }
}

impl<F> CollectionResolver for F
where
    F: Fn(&Schema) -> String + Send + Sync,
{
    fn resolve(&self, schema: &Schema) -> String {
        self(schema)
    }
}
