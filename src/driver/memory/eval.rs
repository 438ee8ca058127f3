use bson::{Bson, Document};
use std::cmp::Ordering;

use crate::errors::DbError;
use crate::types::OPERATOR_SIGIL;
use crate::utils::num::{bson_as_f64, is_numeric};

pub const MAX_PATH_DEPTH: usize = 32;
pub const MAX_IN_SET: usize = 4096;

/// Evaluate an operator-based query document against one stored document.
///
/// # Errors
/// Returns `DbError::Driver` for unknown or malformed operators.
pub fn matches(doc: &Document, query: &Document) -> Result<bool, DbError> {
    for (key, cond) in query {
        let ok = match key.as_str() {
            "$and" => all_clauses(doc, cond, key)?.into_iter().all(|b| b),
            "$or" => all_clauses(doc, cond, key)?.into_iter().any(|b| b),
            "$nor" => !all_clauses(doc, cond, key)?.into_iter().any(|b| b),
            k if k.starts_with(OPERATOR_SIGIL) => {
                return Err(DbError::Driver(format!("unknown top level operator: {k}")));
            }
            path => match_field(doc, path, cond)?,
        };
        if !ok {
            return Ok(false);
        }
    }
    Ok(true)
}

fn all_clauses(doc: &Document, clauses: &Bson, op: &str) -> Result<Vec<bool>, DbError> {
    let Bson::Array(items) = clauses else {
        return Err(DbError::Driver(format!("{op} needs an array")));
    };
    if items.is_empty() {
        return Err(DbError::Driver(format!("{op} needs a nonempty array")));
    }
    items
        .iter()
        .map(|c| match c {
            Bson::Document(q) => matches(doc, q),
            _ => Err(DbError::Driver(format!("{op} entries need to be full objects"))),
        })
        .collect()
}

fn is_operator_doc(v: &Bson) -> Option<&Document> {
    match v {
        Bson::Document(d) if d.keys().next().is_some_and(|k| k.starts_with(OPERATOR_SIGIL)) => Some(d),
        _ => None,
    }
}

fn match_field(doc: &Document, path: &str, cond: &Bson) -> Result<bool, DbError> {
    let value = get_path(doc, path);
    let Some(ops) = is_operator_doc(cond) else {
        return Ok(equals_or_contains(value, cond));
    };
    for (op, operand) in ops {
        if !match_operator(doc, path, value, op, operand, ops)? {
            return Ok(false);
        }
    }
    Ok(true)
}

fn match_operator(
    doc: &Document,
    path: &str,
    value: Option<&Bson>,
    op: &str,
    operand: &Bson,
    siblings: &Document,
) -> Result<bool, DbError> {
    let ord = |want: &[Ordering]| {
        value.is_some_and(|v| candidates(v).any(|c| comparable(c, operand) && want.contains(&compare_bson(c, operand))))
    };
    Ok(match op {
        "$eq" => equals_or_contains(value, operand),
        "$ne" => !equals_or_contains(value, operand),
        "$gt" => ord(&[Ordering::Greater]),
        "$gte" => ord(&[Ordering::Greater, Ordering::Equal]),
        "$lt" => ord(&[Ordering::Less]),
        "$lte" => ord(&[Ordering::Less, Ordering::Equal]),
        "$in" => in_set(value, operand, op)?,
        "$nin" => !in_set(value, operand, op)?,
        "$exists" => value.is_some() == crate::utils::num::is_truthy(operand),
        "$not" => match operand {
            Bson::Document(inner) => !match_field(doc, path, &Bson::Document(inner.clone()))?,
            _ => return Err(DbError::Driver("$not needs a document".into())),
        },
        "$regex" => match_regex(value, operand, siblings.get_str("$options").unwrap_or(""))?,
        "$options" => true,
        other => return Err(DbError::Driver(format!("unknown operator: {other}"))),
    })
}

fn in_set(value: Option<&Bson>, operand: &Bson, op: &str) -> Result<bool, DbError> {
    let Bson::Array(set) = operand else {
        return Err(DbError::Driver(format!("{op} needs an array")));
    };
    Ok(set.iter().take(MAX_IN_SET).any(|x| equals_or_contains(value, x)))
}

#[cfg(feature = "regex")]
fn match_regex(value: Option<&Bson>, pattern: &Bson, options: &str) -> Result<bool, DbError> {
    let (pattern, options) = match pattern {
        Bson::String(p) => (p.as_str(), options.to_string()),
        Bson::RegularExpression(r) => (r.pattern.as_str(), format!("{}{options}", r.options)),
        _ => return Err(DbError::Driver("$regex has to be a string".into())),
    };
    let re = regex::RegexBuilder::new(pattern)
        .case_insensitive(options.contains('i'))
        .multi_line(options.contains('m'))
        .dot_matches_new_line(options.contains('s'))
        .build()
        .map_err(|e| DbError::Driver(format!("invalid regex: {e}")))?;
    Ok(value.is_some_and(|v| candidates(v).any(|c| matches!(c, Bson::String(s) if re.is_match(s)))))
}

#[cfg(not(feature = "regex"))]
fn match_regex(_value: Option<&Bson>, _pattern: &Bson, _options: &str) -> Result<bool, DbError> {
    Err(DbError::Driver("$regex requires the 'regex' feature".into()))
}

/// The value itself, then its elements when it is an array.
fn candidates(v: &Bson) -> impl Iterator<Item = &Bson> {
    let elems: &[Bson] = match v {
        Bson::Array(items) => items,
        _ => &[],
    };
    std::iter::once(v).chain(elems.iter())
}

fn equals_or_contains(value: Option<&Bson>, wanted: &Bson) -> bool {
    match value {
        None => matches!(wanted, Bson::Null),
        Some(v) => candidates(v).any(|c| values_equal(c, wanted)),
    }
}

/// Equality with numeric types compared by value.
#[must_use]
pub fn values_equal(a: &Bson, b: &Bson) -> bool {
    if is_numeric(a) && is_numeric(b) {
        return compare_bson(a, b) == Ordering::Equal;
    }
    match (a, b) {
        (Bson::Array(x), Bson::Array(y)) => {
            x.len() == y.len() && x.iter().zip(y).all(|(p, q)| values_equal(p, q))
        }
        (Bson::Document(x), Bson::Document(y)) => {
            x.len() == y.len()
                && x.iter().zip(y).all(|((ka, va), (kb, vb))| ka == kb && values_equal(va, vb))
        }
        _ => a == b,
    }
}

fn comparable(a: &Bson, b: &Bson) -> bool {
    (is_numeric(a) && is_numeric(b)) || type_rank(a) == type_rank(b)
}

/// Walk a dotted path; numeric segments index into arrays.
#[must_use]
pub fn get_path<'a>(doc: &'a Document, path: &str) -> Option<&'a Bson> {
    if path.is_empty() {
        return None;
    }
    let mut segs = path.split('.');
    let mut cur = doc.get(segs.next()?)?;
    for (depth, seg) in segs.enumerate() {
        if depth >= MAX_PATH_DEPTH {
            return None;
        }
        cur = match cur {
            Bson::Document(d) => d.get(seg)?,
            Bson::Array(items) => items.get(seg.parse::<usize>().ok()?)?,
            _ => return None,
        };
    }
    Some(cur)
}

/// Order documents by a sort specification (`{field: 1 | -1}`).
#[must_use]
pub fn compare_docs(a: &Document, b: &Document, sort: &Document) -> Ordering {
    for (field, dir) in sort {
        let ord = match (get_path(a, field), get_path(b, field)) {
            (Some(x), Some(y)) => compare_bson(x, y),
            (Some(_), None) => Ordering::Greater,
            (None, Some(_)) => Ordering::Less,
            (None, None) => Ordering::Equal,
        };
        if ord != Ordering::Equal {
            let descending = bson_as_f64(dir).is_some_and(|d| d < 0.0);
            return if descending { ord.reverse() } else { ord };
        }
    }
    Ordering::Equal
}

#[must_use]
pub fn compare_bson(a: &Bson, b: &Bson) -> Ordering {
    if is_numeric(a) && is_numeric(b) {
        let x = bson_as_f64(a).unwrap_or(f64::NAN);
        let y = bson_as_f64(b).unwrap_or(f64::NAN);
        return x.total_cmp(&y);
    }
    match (a, b) {
        (Bson::String(x), Bson::String(y)) => x.cmp(y),
        (Bson::Boolean(x), Bson::Boolean(y)) => x.cmp(y),
        (Bson::ObjectId(x), Bson::ObjectId(y)) => x.bytes().cmp(&y.bytes()),
        (Bson::DateTime(x), Bson::DateTime(y)) => x.cmp(y),
        (Bson::Timestamp(x), Bson::Timestamp(y)) => (x.time, x.increment).cmp(&(y.time, y.increment)),
        (Bson::Array(x), Bson::Array(y)) => x
            .iter()
            .zip(y)
            .map(|(p, q)| compare_bson(p, q))
            .find(|o| *o != Ordering::Equal)
            .unwrap_or_else(|| x.len().cmp(&y.len())),
        _ => type_rank(a).cmp(&type_rank(b)),
    }
}

/// Cross-type ordering: numbers share a rank.
const fn type_rank(v: &Bson) -> u8 {
    match v {
        Bson::MinKey => 0,
        Bson::Null | Bson::Undefined => 1,
        Bson::Int32(_) | Bson::Int64(_) | Bson::Double(_) | Bson::Decimal128(_) => 2,
        Bson::Symbol(_) | Bson::String(_) => 3,
        Bson::Document(_) => 4,
        Bson::Array(_) => 5,
        Bson::Binary(_) => 6,
        Bson::ObjectId(_) => 7,
        Bson::Boolean(_) => 8,
        Bson::DateTime(_) => 9,
        Bson::Timestamp(_) => 10,
        Bson::RegularExpression(_) => 11,
        Bson::DbPointer(_) => 12,
        Bson::JavaScriptCode(_) | Bson::JavaScriptCodeWithScope(_) => 13,
        Bson::MaxKey => 255,
    }
}

/// Apply a projection document: inclusion (`{a: 1}`) or exclusion (`{a: 0}`). `_id` is kept
/// unless explicitly excluded.
///
/// # Errors
/// Returns `DbError::Driver` when inclusion and exclusion are mixed.
pub fn project(doc: &Document, fields: &Document) -> Result<Document, DbError> {
    if fields.is_empty() {
        return Ok(doc.clone());
    }
    let include = |v: &Bson| crate::utils::num::is_truthy(v);
    let inclusive = fields.iter().filter(|(k, _)| k.as_str() != "_id").map(|(_, v)| include(v));
    let modes: Vec<bool> = inclusive.collect();
    if modes.iter().any(|m| *m) && modes.iter().any(|m| !*m) {
        return Err(DbError::Driver("Projection cannot have a mix of inclusion and exclusion.".into()));
    }
    let keep_id = fields.get("_id").is_none_or(include);
    if modes.first().copied().unwrap_or(false) {
        let mut out = Document::new();
        if keep_id && let Some(id) = doc.get("_id") {
            out.insert("_id", id.clone());
        }
        for (path, _) in fields.iter().filter(|(k, _)| k.as_str() != "_id") {
            if let Some(v) = get_path(doc, path) {
                super::apply::set_path(&mut out, path, v.clone())?;
            }
        }
        return Ok(out);
    }
    let mut out = doc.clone();
    for (path, _) in fields.iter().filter(|(k, _)| k.as_str() != "_id") {
        super::apply::unset_path(&mut out, path);
    }
    if !keep_id {
        out.remove("_id");
    }
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;
    use bson::doc;

    #[test]
    fn comparison_operators_and_numeric_widening() {
        let d = doc! {"age": 21_i64, "name": "ann"};
        assert!(matches(&d, &doc! {"age": {"$gte": 18, "$lt": 30.5}}).unwrap());
        assert!(!matches(&d, &doc! {"age": {"$gt": 21}}).unwrap());
        assert!(matches(&d, &doc! {"age": 21}).unwrap());
        assert!(!matches(&d, &doc! {"name": {"$gt": 5}}).unwrap());
    }

    #[test]
    fn missing_fields_and_null() {
        let d = doc! {"a": 1};
        assert!(matches(&d, &doc! {"b": Bson::Null}).unwrap());
        assert!(matches(&d, &doc! {"b": {"$ne": 3}}).unwrap());
        assert!(matches(&d, &doc! {"b": {"$exists": false}}).unwrap());
        assert!(!matches(&d, &doc! {"a": {"$exists": 0}}).unwrap());
    }

    #[test]
    fn arrays_match_by_membership() {
        let d = doc! {"tags": ["x", "y"]};
        assert!(matches(&d, &doc! {"tags": "y"}).unwrap());
        assert!(matches(&d, &doc! {"tags": {"$in": ["z", "x"]}}).unwrap());
        assert!(matches(&d, &doc! {"tags": {"$nin": ["z"]}}).unwrap());
        assert!(matches(&d, &doc! {"tags.1": "y"}).unwrap());
    }

    #[test]
    fn logical_operators() {
        let d = doc! {"a": 1, "b": 2};
        assert!(matches(&d, &doc! {"$or": [{"a": 5}, {"b": 2}]}).unwrap());
        assert!(!matches(&d, &doc! {"$and": [{"a": 1}, {"b": 3}]}).unwrap());
        assert!(matches(&d, &doc! {"$nor": [{"a": 5}]}).unwrap());
        assert!(matches(&d, &doc! {"a": {"$not": {"$gt": 3}}}).unwrap());
        assert!(matches(&d, &doc! {"$or": []}).is_err());
        assert!(matches(&d, &doc! {"a": {"$near": 1}}).is_err());
    }

    #[test]
    fn sort_and_projection() {
        let a = doc! {"_id": 1, "v": 3, "x": {"y": 1}};
        let b = doc! {"_id": 2, "v": 1};
        assert_eq!(compare_docs(&a, &b, &doc! {"v": 1}), Ordering::Greater);
        assert_eq!(compare_docs(&a, &b, &doc! {"v": -1}), Ordering::Less);
        assert_eq!(project(&a, &doc! {"v": 1}).unwrap(), doc! {"_id": 1, "v": 3});
        assert_eq!(project(&a, &doc! {"x.y": 1, "_id": 0}).unwrap(), doc! {"x": {"y": 1}});
        assert_eq!(project(&a, &doc! {"x": 0}).unwrap(), doc! {"_id": 1, "v": 3});
        assert!(project(&a, &doc! {"x": 0, "v": 1}).is_err());
    }
}
