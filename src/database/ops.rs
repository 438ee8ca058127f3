use bson::{Bson, Document};

use super::Database;
use super::reports::{FindAndModifyReport, IndexReport, UpdateReport};
use crate::command::{
    BatchInsertRequest, CountRequest, DistinctRequest, EnsureIndexRequest, FindAndModifyRequest,
    FindRequest, GenericRequest, GroupRequest, InsertRequest, RemoveRequest, UpdateRequest,
    flatten_write_result, normalize,
};
use crate::cursor::{Cursor, CursorOption};
use crate::driver::memory::{INDEXES_CATALOG, NAMESPACES_CATALOG};
use crate::driver::{Driver, QuerySpec};
use crate::errors::DbError;
use crate::query::{Fetched, flatten_fields, unwrap_single};
use crate::types::Command;
use crate::utils::num::{bson_as_i64, i64_to_u64_saturating};

fn written_count(result: &Document) -> u64 {
    result.get("n").and_then(bson_as_i64).map_or(0, i64_to_u64_saturating)
}

impl<D: Driver> Database<D> {
    fn open_cursor(&self, req: FindRequest) -> Result<(Cursor<'_, D>, Vec<String>), DbError> {
        let paths = req.fields.paths().to_vec();
        let spec = QuerySpec::new(req.query, req.fields.projection());
        let mut cursor = Cursor::new(self.driver()?, req.collection, spec);
        if let Some(read) = req.read {
            let routing = read.resolve(self.config.read_preference, self.config.read_preference_tag_documents());
            cursor.set_read_preference(routing)?;
        }
        for opt in req.options {
            cursor.apply(opt)?;
        }
        Ok((cursor, paths))
    }

    /// Lazy cursor over matching documents. Nothing is sent until the first `next()`.
    ///
    /// # Errors
    /// Malformed parameters or unknown cursor options.
    pub fn find(&self, command: Command) -> Result<Cursor<'_, D>, DbError> {
        self.open_cursor(FindRequest::from_command(command)?).map(|(cursor, _)| cursor)
    }

    /// First match only. With a one-field projection list the value itself is returned.
    ///
    /// # Errors
    /// Malformed parameters or store failures.
    pub fn find_one(&self, command: Command) -> Result<Fetched, DbError> {
        let (mut cursor, paths) = self.open_cursor(FindRequest::from_command(command)?)?;
        cursor.apply(CursorOption::Limit(-1))?;
        let first = cursor.next().transpose()?;
        Ok(unwrap_single(first.as_ref(), &paths))
    }

    /// Every match, flattened by the projection field list when one was given.
    ///
    /// # Errors
    /// Malformed parameters or the first store failure.
    pub fn fetch(&self, command: Command) -> Result<Vec<Document>, DbError> {
        let (cursor, paths) = self.open_cursor(FindRequest::from_command(command)?)?;
        cursor
            .map(|doc| doc.map(|d| if paths.is_empty() { d } else { flatten_fields(&d, &paths) }))
            .collect()
    }

    /// Stream each (flattened) match into `visit`; returns how many were visited.
    ///
    /// # Errors
    /// Malformed parameters, the first store failure, or the first error from `visit`.
    pub fn walk<F>(&self, command: Command, mut visit: F) -> Result<u64, DbError>
    where
        F: FnMut(Document) -> Result<(), DbError>,
    {
        let (cursor, paths) = self.open_cursor(FindRequest::from_command(command)?)?;
        let mut seen = 0_u64;
        for doc in cursor {
            let doc = doc?;
            visit(if paths.is_empty() { doc } else { flatten_fields(&doc, &paths) })?;
            seen += 1;
        }
        Ok(seen)
    }

    /// # Errors
    /// Malformed parameters or store failures.
    pub fn count(&self, command: Command) -> Result<u64, DbError> {
        let req = CountRequest::from_command(command)?;
        self.driver()?.count(&req.collection, &req.query, req.limit, req.skip)
    }

    /// # Errors
    /// Malformed parameters, or `DbError::Driver` with the store's message.
    pub fn distinct(&self, command: Command) -> Result<Vec<Bson>, DbError> {
        let req = DistinctRequest::from_command(command)?;
        let mut body = Document::new();
        body.insert("key", req.key);
        body.insert("query", req.query);
        let result = self.dispatcher()?.run("distinct", &req.collection, body, req.timeout)?;
        match result.get("values") {
            Some(Bson::Array(values)) => Ok(values.clone()),
            None | Some(Bson::Null) => Ok(Vec::new()),
            Some(other) => Err(DbError::Driver(format!("distinct answered with non-list values: {other}"))),
        }
    }

    /// Insert `set`; the returned document carries its identity.
    ///
    /// # Errors
    /// Malformed parameters, or `DbError::Driver` (duplicate keys and the like).
    pub fn insert(&self, command: Command) -> Result<Document, DbError> {
        let InsertRequest { collection, mut document, write } = InsertRequest::from_command(command)?;
        normalize(self.driver()?.insert(&collection, &mut document, &write)?)?;
        Ok(document)
    }

    /// Insert every document of `set`. With `continueOnError` the remaining documents are still
    /// tried after a failure; the first failure is reported either way.
    ///
    /// # Errors
    /// Malformed parameters, or the first `DbError::Driver`.
    pub fn batch_insert(&self, command: Command) -> Result<Vec<Document>, DbError> {
        let BatchInsertRequest { collection, mut documents, write } = BatchInsertRequest::from_command(command)?;
        normalize(self.driver()?.batch_insert(&collection, &mut documents, &write)?)?;
        Ok(documents)
    }

    /// Number of removed documents.
    ///
    /// # Errors
    /// Malformed parameters or store failures.
    pub fn remove(&self, command: Command) -> Result<u64, DbError> {
        let req = RemoveRequest::from_command(command)?;
        let result = normalize(self.driver()?.remove(&req.collection, &req.query, &req.write)?)?;
        Ok(written_count(&result))
    }

    /// # Errors
    /// `DbError::Validation` for a replacement carrying operator keys (nothing is sent), or
    /// `DbError::Driver` with the store's message.
    pub fn update(&self, command: Command) -> Result<UpdateReport, DbError> {
        let req = UpdateRequest::from_command(command)?;
        let result = self.driver()?.update(&req.collection, &req.query, &req.update.payload, &req.write)?;
        Ok(UpdateReport::from_result(normalize(result)?))
    }

    /// Atomic fetch-and-mutate of a single document.
    ///
    /// # Errors
    /// `DbError::Validation` for a replacement carrying operator keys (nothing is sent), or
    /// `DbError::Driver` with the store's message.
    pub fn find_and_modify(&self, command: Command) -> Result<FindAndModifyReport, DbError> {
        let req = FindAndModifyRequest::from_command(command)?;
        let result = self.dispatcher()?.run("findAndModify", &req.collection, req.body(), req.timeout)?;
        Ok(FindAndModifyReport::from_result(result))
    }

    /// # Errors
    /// Malformed parameters, or `DbError::Driver` with the store's message.
    pub fn ensure_index(&self, command: Command) -> Result<IndexReport, DbError> {
        let req = EnsureIndexRequest::from_command(command)?;
        let result = self.driver()?.ensure_index(&req.collection, &req.key, &req.options)?;
        Ok(IndexReport::from_result(normalize(result)?))
    }

    /// The store's drop answer, flattened. Dropping a missing collection is not an error.
    ///
    /// # Errors
    /// Transport failures.
    pub fn drop(&self, command: Command) -> Result<Document, DbError> {
        let collection = crate::command::CommandEnvelope::new(command)?.finish("drop");
        let result = self.driver()?.drop_collection(&collection)?;
        Ok(flatten_write_result(result))
    }

    fn namespace(&self, collection: &str) -> Result<String, DbError> {
        Ok(format!("{}.{collection}", self.driver()?.database_name()))
    }

    /// Whether the collection is listed in the namespace catalog.
    ///
    /// # Errors
    /// Transport failures.
    pub fn exists(&self, command: Command) -> Result<bool, DbError> {
        let collection = crate::command::CommandEnvelope::new(command)?.finish("exists");
        let mut query = Document::new();
        query.insert("name", self.namespace(&collection)?);
        let mut cursor = Cursor::new(self.driver()?, NAMESPACES_CATALOG, QuerySpec::new(query, Document::new()));
        cursor.apply(CursorOption::Limit(-1))?;
        Ok(cursor.next().transpose()?.is_some())
    }

    /// # Errors
    /// Transport failures.
    pub fn list_collections(&self) -> Result<Vec<String>, DbError> {
        self.driver()?.list_collections()
    }

    /// Cursor over the index catalog entries of one collection, narrowed by `query`.
    ///
    /// # Errors
    /// Malformed parameters.
    pub fn find_indexes(&self, command: Command) -> Result<Cursor<'_, D>, DbError> {
        let mut req = FindRequest::from_command(command)?;
        let ns = self.namespace(&req.collection)?;
        req.query.insert("ns", ns);
        req.collection = INDEXES_CATALOG.to_string();
        self.open_cursor(req).map(|(cursor, _)| cursor)
    }

    /// Grouped aggregation through the store's `group` command.
    ///
    /// # Errors
    /// `DbError::Validation` unless `keys`, `initial` and `reduce` are given, or
    /// `DbError::Driver` with the store's message.
    pub fn group(&self, command: Command) -> Result<Document, DbError> {
        let req = GroupRequest::from_command(command)?;
        self.dispatcher()?.run_raw(req.to_command(), req.timeout)
    }

    /// Any other named command, as `{<name>: <collection>}` plus the remaining parameters.
    ///
    /// # Errors
    /// Malformed parameters, or `DbError::Driver` with the store's message.
    pub fn command(&self, name: &str, command: Command) -> Result<Document, DbError> {
        let req = GenericRequest::from_command(name, command)?;
        self.dispatcher()?.run(&req.name, &req.collection, req.body, req.timeout)
    }
}
