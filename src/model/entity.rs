use std::sync::Arc;

use bson::{Bson, Document};

use super::schema::Schema;
use crate::types::ID_FIELD;

/// In-memory state of one stored document, typed by its schema.
#[derive(Debug, Clone, PartialEq)]
pub struct Entity {
    schema: Arc<Schema>,
    state: Document,
}

impl Entity {
    /// A fresh entity seeded with the schema's declared defaults.
    #[must_use]
    pub fn new(schema: Arc<Schema>) -> Self {
        let state = schema.defaults().clone();
        Self { schema, state }
    }

    /// Wrap a document read from the store.
    #[must_use]
    pub const fn from_document(schema: Arc<Schema>, state: Document) -> Self {
        Self { schema, state }
    }

    /// Identity, when set to anything but `null`.
    #[must_use]
    pub fn id(&self) -> Option<&Bson> {
        self.state.get(ID_FIELD).filter(|v| !matches!(v, Bson::Null))
    }

    #[must_use]
    pub fn get(&self, attribute: &str) -> Option<&Bson> {
        self.state.get(attribute)
    }

    #[must_use]
    pub const fn state(&self) -> &Document {
        &self.state
    }

    #[must_use]
    pub fn schema(&self) -> &Schema {
        &self.schema
    }

    #[must_use]
    pub fn type_name(&self) -> &str {
        self.schema.type_name()
    }

    pub(crate) fn replace_state(&mut self, state: Document) {
        self.state = state;
    }
}
