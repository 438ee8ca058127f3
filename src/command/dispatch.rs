//! Sends assembled commands to the driver and normalizes what comes back.

use bson::{Bson, Document};

use crate::driver::Driver;
use crate::errors::DbError;
use crate::utils::num::bson_as_f64;

/// Nested write-concern result some verbs answer with.
pub const WRITE_RESULT_KEY: &str = "lastErrorObject";

/// `{<name>: <collection>}` followed by `body`, in order.
#[must_use]
pub fn assemble(name: &str, collection: &str, body: Document) -> Document {
    let mut cmd = Document::new();
    cmd.insert(name, collection);
    for (k, v) in body {
        if k != name {
            cmd.insert(k, v);
        }
    }
    cmd
}

fn error_message(response: &Document) -> Option<String> {
    for key in ["errmsg", "err"] {
        match response.get(key) {
            None | Some(Bson::Null) => {}
            Some(Bson::String(s)) => return Some(s.clone()),
            Some(other) => return Some(other.to_string()),
        }
    }
    None
}

/// Fail when the response carries an error message (or reports `ok: 0` without one).
///
/// # Errors
/// Returns `DbError::Driver` with the store's own message.
pub fn check_response(response: Document) -> Result<Document, DbError> {
    if let Some(msg) = error_message(&response) {
        return Err(DbError::Driver(msg));
    }
    if response.get("ok").and_then(bson_as_f64).is_some_and(|ok| ok == 0.0) {
        return Err(DbError::Driver("command failed without an error message".into()));
    }
    Ok(response)
}

/// Merge a nested write-concern result into the top level; top-level keys win on conflict.
#[must_use]
pub fn flatten_write_result(mut response: Document) -> Document {
    if let Some(Bson::Document(nested)) = response.remove(WRITE_RESULT_KEY) {
        for (k, v) in nested {
            if !response.contains_key(&k) {
                response.insert(k, v);
            }
        }
    }
    response
}

/// Error check followed by flattening.
///
/// # Errors
/// Returns `DbError::Driver` when the response carries an error message.
pub fn normalize(response: Document) -> Result<Document, DbError> {
    check_response(response).map(flatten_write_result)
}

/// Issues named commands against one driver.
pub struct Dispatcher<'a, D: Driver> {
    driver: &'a D,
}

impl<'a, D: Driver> Dispatcher<'a, D> {
    #[must_use]
    pub const fn new(driver: &'a D) -> Self {
        Self { driver }
    }

    /// Run `{<name>: <collection>, ...body}` and return the flat result.
    ///
    /// # Errors
    /// Transport failures, or `DbError::Driver` when the store reports an error.
    pub fn run(&self, name: &str, collection: &str, body: Document, timeout: Option<i64>) -> Result<Document, DbError> {
        self.run_raw(assemble(name, collection, body), timeout)
    }

    /// Run an already assembled command document.
    ///
    /// # Errors
    /// Transport failures, or `DbError::Driver` when the store reports an error.
    pub fn run_raw(&self, command: Document, timeout: Option<i64>) -> Result<Document, DbError> {
        let name = command.keys().next().cloned().unwrap_or_default();
        log::debug!("dispatching '{name}' to {}", self.driver.database_name());
        crate::dev6!("{{\"dispatch\":\"{}\",\"timeout\":{}}}", name, timeout.unwrap_or(0));
        let response = self.driver.run_command(&command, timeout)?;
        normalize(response).inspect_err(|e| log::warn!("command '{name}' failed: {e}"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bson::doc;

    #[test]
    fn assemble_puts_verb_first() {
        let cmd = assemble("distinct", "users", doc! {"key": "a", "query": {}});
        assert_eq!(cmd.keys().collect::<Vec<_>>(), ["distinct", "key", "query"]);
        assert_eq!(cmd.get_str("distinct").unwrap(), "users");
    }

    #[test]
    fn errmsg_becomes_driver_error() {
        let err = check_response(doc! {"ok": 0, "errmsg": "exception: bad"}).unwrap_err();
        assert!(matches!(err, DbError::Driver(ref m) if m == "exception: bad"));
        assert!(check_response(doc! {"ok": 1, "err": Bson::Null}).is_ok());
        assert!(check_response(doc! {"ok": 0.0}).is_err());
    }

    #[test]
    fn nested_write_result_is_merged() {
        let flat = flatten_write_result(doc! {
            "value": {"_id": 1},
            "lastErrorObject": {"updatedExisting": true, "n": 1, "value": "shadowed"},
            "ok": 1.0,
        });
        assert!(!flat.contains_key(WRITE_RESULT_KEY));
        assert!(flat.get_bool("updatedExisting").unwrap());
        assert_eq!(flat.get_document("value").unwrap(), &doc! {"_id": 1});
    }
}
