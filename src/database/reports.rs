//! Typed views over the flat result documents write verbs return.

use bson::{Bson, Document};

use crate::utils::num::{bson_as_i64, i64_to_u64_saturating};

fn count(doc: &Document, key: &str) -> u64 {
    doc.get(key).and_then(bson_as_i64).map_or(0, i64_to_u64_saturating)
}

fn flag(doc: &Document, key: &str) -> bool {
    doc.get(key).is_some_and(crate::utils::num::is_truthy)
}

fn upserted_id(doc: &Document) -> Option<Bson> {
    match doc.get("upserted") {
        None | Some(Bson::Null) => None,
        // Bulk-style answers list `{index, _id}` entries.
        Some(Bson::Array(items)) => items.iter().find_map(|i| match i {
            Bson::Document(d) => d.get("_id").cloned(),
            _ => None,
        }),
        Some(v) => Some(v.clone()),
    }
}

#[derive(Debug, Clone, PartialEq, Default)]
pub struct UpdateReport {
    pub matched: u64,
    pub modified: u64,
    pub upserted: Option<Bson>,
    pub updated_existing: bool,
    /// The flattened result as the store returned it.
    pub raw: Document,
}

impl UpdateReport {
    #[must_use]
    pub fn from_result(raw: Document) -> Self {
        let upserted = upserted_id(&raw);
        let n = count(&raw, "n");
        Self {
            matched: if upserted.is_some() { 0 } else { n },
            modified: raw.get("nModified").and_then(bson_as_i64).map_or(n, i64_to_u64_saturating),
            updated_existing: flag(&raw, "updatedExisting"),
            upserted,
            raw,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Default)]
pub struct FindAndModifyReport {
    /// Documents matched by the query (zero when the call upserted).
    pub matched: u64,
    pub upserted: Option<Bson>,
    pub updated_existing: bool,
    /// Pre- or post-image depending on `new`; `None` when nothing matched.
    pub value: Option<Document>,
    pub raw: Document,
}

impl FindAndModifyReport {
    #[must_use]
    pub fn from_result(raw: Document) -> Self {
        let upserted = upserted_id(&raw);
        let n = count(&raw, "n");
        let value = match raw.get("value") {
            Some(Bson::Document(d)) => Some(d.clone()),
            _ => None,
        };
        Self {
            matched: if upserted.is_some() { 0 } else { n },
            updated_existing: flag(&raw, "updatedExisting"),
            upserted,
            value,
            raw,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Default)]
pub struct IndexReport {
    pub created_collection_automatically: bool,
    pub num_indexes_before: u64,
    pub num_indexes_after: u64,
    pub note: Option<String>,
    pub raw: Document,
}

impl IndexReport {
    #[must_use]
    pub fn from_result(raw: Document) -> Self {
        Self {
            created_collection_automatically: flag(&raw, "createdCollectionAutomatically"),
            num_indexes_before: count(&raw, "numIndexesBefore"),
            num_indexes_after: count(&raw, "numIndexesAfter"),
            note: raw.get_str("note").ok().map(str::to_string),
            raw,
        }
    }

    #[must_use]
    pub const fn created(&self) -> bool {
        self.num_indexes_after > self.num_indexes_before
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bson::doc;

    #[test]
    fn update_report_reads_counts() {
        let r = UpdateReport::from_result(doc! {"ok": 1, "n": 3, "nModified": 2, "updatedExisting": true});
        assert_eq!((r.matched, r.modified, r.updated_existing), (3, 2, true));
        assert!(r.upserted.is_none());
    }

    #[test]
    fn upsert_reports_zero_matched() {
        let r = UpdateReport::from_result(doc! {"n": 1, "updatedExisting": false, "upserted": 42});
        assert_eq!(r.matched, 0);
        assert_eq!(r.upserted, Some(Bson::Int32(42)));
        let bulk = UpdateReport::from_result(doc! {"n": 1, "upserted": [{"index": 0, "_id": "x"}]});
        assert_eq!(bulk.upserted, Some(Bson::String("x".into())));
    }

    #[test]
    fn find_and_modify_report_extracts_value() {
        let r = FindAndModifyReport::from_result(doc! {"n": 1, "updatedExisting": true, "value": {"_id": 1}, "ok": 1});
        assert_eq!(r.matched, 1);
        assert_eq!(r.value, Some(doc! {"_id": 1}));
        let miss = FindAndModifyReport::from_result(doc! {"n": 0, "value": Bson::Null});
        assert_eq!(miss.matched, 0);
        assert!(miss.value.is_none());
    }

    #[test]
    fn index_report() {
        let r = IndexReport::from_result(doc! {"createdCollectionAutomatically": true, "numIndexesBefore": 1, "numIndexesAfter": 2});
        assert!(r.created_collection_automatically);
        assert!(r.created());
    }
}
