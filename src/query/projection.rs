//! Flattening of (possibly dotted) projection paths into a flat mapping.

use bson::{Bson, Document};

pub const PATH_SEPARATOR: char = '.';

/// Result of a single-document read after projection.
#[derive(Debug, Clone, PartialEq)]
pub enum Fetched {
    /// No document matched, or the single requested field was absent.
    NotFound,
    Document(Document),
    /// Unwrapped value of a one-field projection.
    Scalar(Bson),
}

impl Fetched {
    #[must_use]
    pub const fn is_found(&self) -> bool {
        !matches!(self, Self::NotFound)
    }

    #[must_use]
    pub fn into_document(self) -> Option<Document> {
        match self {
            Self::Document(d) => Some(d),
            _ => None,
        }
    }

    #[must_use]
    pub fn into_scalar(self) -> Option<Bson> {
        match self {
            Self::Scalar(v) => Some(v),
            _ => None,
        }
    }
}

/// Flatten `doc` to the requested paths, keyed by the original path strings.
///
/// Plain names map to their value, or `null` when absent. Dotted paths are walked segment by
/// segment; the first missing (or `null`) segment drops the path from the output.
#[must_use]
pub fn flatten_fields<S: AsRef<str>>(doc: &Document, fields: &[S]) -> Document {
    let mut out = Document::new();
    for field in fields {
        let field = field.as_ref();
        if field.contains(PATH_SEPARATOR) {
            if let Some(v) = resolve_path(doc, field) {
                out.insert(field, v.clone());
            }
        } else {
            out.insert(field, doc.get(field).cloned().unwrap_or(Bson::Null));
        }
    }
    out
}

/// Caller-side convenience for "find one" reads: a one-field projection unwraps to the value.
#[must_use]
pub fn unwrap_single<S: AsRef<str>>(doc: Option<&Document>, fields: &[S]) -> Fetched {
    let Some(doc) = doc else {
        return Fetched::NotFound;
    };
    match fields {
        [] => Fetched::Document(doc.clone()),
        [only] => {
            let flat = flatten_fields(doc, std::slice::from_ref(only));
            match flat.get(only.as_ref()) {
                Some(Bson::Null) | None => Fetched::NotFound,
                Some(v) => Fetched::Scalar(v.clone()),
            }
        }
        many => Fetched::Document(flatten_fields(doc, many)),
    }
}

/// Walk a dotted path; array segments accept numeric indexes.
#[must_use]
pub fn resolve_path<'a>(doc: &'a Document, path: &str) -> Option<&'a Bson> {
    let mut segments = path.split(PATH_SEPARATOR);
    let first = segments.next()?;
    let mut cur = doc.get(first)?;
    for seg in segments {
        cur = match cur {
            Bson::Document(d) => d.get(seg)?,
            Bson::Array(items) => items.get(seg.parse::<usize>().ok()?)?,
            _ => return None,
        };
    }
    if matches!(cur, Bson::Null) { None } else { Some(cur) }
}
