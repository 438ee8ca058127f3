use bson::{Bson, Document};
use std::cmp::Ordering;

use super::eval::{compare_bson, get_path, matches, values_equal};
use crate::errors::DbError;
use crate::types::{ID_FIELD, OPERATOR_SIGIL};
use crate::utils::num::{bson_as_f64, bson_as_i64, is_numeric};

fn err(msg: impl Into<String>) -> DbError {
    DbError::Driver(msg.into())
}

fn ensure_subdoc<'a>(root: &'a mut Document, key: &str) -> Result<&'a mut Document, DbError> {
    match root.get(key) {
        Some(Bson::Document(_)) => {}
        Some(other) => {
            return Err(err(format!("cannot create field in element {{{key}: {other}}}")));
        }
        None => {
            root.insert(key, Document::new());
        }
    }
    match root.get_mut(key) {
        Some(Bson::Document(d)) => Ok(d),
        _ => Err(err(format!("cannot traverse '{key}'"))),
    }
}

fn traverse_to_parent<'a, 'p>(root: &'a mut Document, path: &'p str) -> Result<(&'a mut Document, &'p str), DbError> {
    let mut cur = root;
    let mut iter = path.split('.').peekable();
    while let Some(seg) = iter.next() {
        if iter.peek().is_none() {
            return Ok((cur, seg));
        }
        cur = ensure_subdoc(cur, seg)?;
    }
    Err(err("empty field path"))
}

/// Set a dotted path, creating intermediate documents. Returns whether the value changed.
///
/// # Errors
/// Returns `DbError::Driver` when an intermediate segment holds a non-document value.
pub fn set_path(root: &mut Document, path: &str, value: Bson) -> Result<bool, DbError> {
    let (parent, last) = traverse_to_parent(root, path)?;
    let changed = parent.get(last).is_none_or(|old| old != &value);
    parent.insert(last, value);
    Ok(changed)
}

/// Remove a dotted path without creating anything. Returns whether something was removed.
pub fn unset_path(root: &mut Document, path: &str) -> bool {
    let Some((head, last)) = path.rsplit_once('.') else {
        return root.remove(path).is_some();
    };
    let mut cur = root;
    for seg in head.split('.') {
        match cur.get_mut(seg) {
            Some(Bson::Document(d)) => cur = d,
            _ => return false,
        }
    }
    cur.remove(last).is_some()
}

fn operand_fields<'a>(op: &str, operand: &'a Bson) -> Result<&'a Document, DbError> {
    match operand {
        Bson::Document(d) => Ok(d),
        _ => Err(err(format!("Modifier {op} allowed for objects only"))),
    }
}

fn array_at<'a>(doc: &'a mut Document, path: &str, op: &str) -> Result<&'a mut Vec<Bson>, DbError> {
    if get_path(doc, path).is_none() {
        set_path(doc, path, Bson::Array(Vec::new()))?;
    }
    let (parent, last) = traverse_to_parent(doc, path)?;
    match parent.get_mut(last) {
        Some(Bson::Array(items)) => Ok(items),
        _ => Err(err(format!("Cannot apply {op} modifier to non-array"))),
    }
}

/// `$each`-aware list of values for `$push` / `$addToSet`.
fn each_values(value: &Bson) -> Vec<Bson> {
    match value {
        Bson::Document(d) => match d.get("$each") {
            Some(Bson::Array(items)) => items.clone(),
            _ => vec![value.clone()],
        },
        _ => vec![value.clone()],
    }
}

fn arith(op: &str, cur: &Bson, by: &Bson) -> Result<Bson, DbError> {
    if !is_numeric(by) {
        return Err(err(format!("Cannot {op} with non-numeric argument")));
    }
    if !is_numeric(cur) {
        return Err(err(format!("Cannot apply {op} to a value of non-numeric type")));
    }
    let mul = op == "$mul";
    let ints = (bson_as_i64(cur), bson_as_i64(by));
    let float = matches!(cur, Bson::Double(_) | Bson::Decimal128(_)) || matches!(by, Bson::Double(_) | Bson::Decimal128(_));
    if !float && let (Some(a), Some(b)) = ints {
        let out = if mul { a.checked_mul(b) } else { a.checked_add(b) };
        let out = out.ok_or_else(|| err(format!("integer overflow applying {op}")))?;
        let both32 = matches!(cur, Bson::Int32(_)) && matches!(by, Bson::Int32(_));
        return Ok(match i32::try_from(out) {
            Ok(small) if both32 => Bson::Int32(small),
            _ => Bson::Int64(out),
        });
    }
    let a = bson_as_f64(cur).unwrap_or(0.0);
    let b = bson_as_f64(by).unwrap_or(0.0);
    Ok(Bson::Double(if mul { a * b } else { a + b }))
}

fn bitwise(cur: &Bson, spec: &Bson) -> Result<Bson, DbError> {
    let Bson::Document(ops) = spec else {
        return Err(err("$bit needs a document of and/or/xor"));
    };
    let wide = matches!(cur, Bson::Int64(_));
    let mut acc = match cur {
        Bson::Int32(i) => i64::from(*i),
        Bson::Int64(i) => *i,
        _ => return Err(err("Cannot apply $bit to a value of non-integral type")),
    };
    for (kind, operand) in ops {
        let v = match operand {
            Bson::Int32(i) => i64::from(*i),
            Bson::Int64(i) => *i,
            _ => return Err(err("$bit field must be an integer")),
        };
        acc = match kind.as_str() {
            "and" => acc & v,
            "or" => acc | v,
            "xor" => acc ^ v,
            other => return Err(err(format!("unknown $bit operation: {other}"))),
        };
    }
    Ok(match i32::try_from(acc) {
        Ok(small) if !wide => Bson::Int32(small),
        _ => Bson::Int64(acc),
    })
}

fn pull_matches(item: &Bson, cond: &Bson) -> Result<bool, DbError> {
    match (item, cond) {
        (Bson::Document(d), Bson::Document(q)) if !q.keys().any(|k| k.starts_with(OPERATOR_SIGIL)) => {
            matches(d, q)
        }
        (_, Bson::Document(q)) if q.keys().all(|k| k.starts_with(OPERATOR_SIGIL)) => {
            let probe = bson::doc! {"v": item.clone()};
            matches(&probe, &bson::doc! {"v": Bson::Document(q.clone())})
        }
        _ => Ok(values_equal(item, cond)),
    }
}

/// Whether `update` is a replacement document (no operator keys at all).
#[must_use]
pub fn is_replacement(update: &Document) -> bool {
    !update.keys().any(|k| k.starts_with(OPERATOR_SIGIL))
}

/// Replace everything except `_id`.
///
/// # Errors
/// Returns `DbError::Driver` when the replacement tries to change `_id`.
pub fn replace_document(doc: &mut Document, replacement: &Document) -> Result<bool, DbError> {
    if let (Some(old), Some(new)) = (doc.get(ID_FIELD), replacement.get(ID_FIELD))
        && !values_equal(old, new)
    {
        return Err(err("The _id field cannot be changed"));
    }
    let id = doc.get(ID_FIELD).or_else(|| replacement.get(ID_FIELD)).cloned();
    let mut next = Document::new();
    if let Some(id) = id {
        next.insert(ID_FIELD, id);
    }
    for (k, v) in replacement {
        if k != ID_FIELD {
            next.insert(k.clone(), v.clone());
        }
    }
    let changed = next != *doc;
    *doc = next;
    Ok(changed)
}

/// Apply an operator update in place. `inserting` enables `$setOnInsert`.
///
/// # Errors
/// Returns `DbError::Driver` for unknown modifiers, type mismatches or an `_id` change.
pub fn apply_update(doc: &mut Document, update: &Document, inserting: bool) -> Result<bool, DbError> {
    if is_replacement(update) {
        return replace_document(doc, update);
    }
    let original = doc.clone();
    for (op, operand) in update {
        if !op.starts_with(OPERATOR_SIGIL) {
            return Err(err(format!("Cannot mix update operators and plain fields ('{op}')")));
        }
        let fields = operand_fields(op, operand)?;
        for (path, value) in fields {
            if path == ID_FIELD || path.starts_with("_id.") {
                return Err(err(format!("Mod on {ID_FIELD} not allowed")));
            }
            apply_one(doc, op, path, value, inserting)?;
        }
    }
    Ok(*doc != original)
}

fn apply_one(doc: &mut Document, op: &str, path: &str, value: &Bson, inserting: bool) -> Result<(), DbError> {
    match op {
        "$set" => {
            set_path(doc, path, value.clone())?;
        }
        "$setOnInsert" => {
            if inserting {
                set_path(doc, path, value.clone())?;
            }
        }
        "$unset" => {
            unset_path(doc, path);
        }
        "$inc" | "$mul" => {
            let cur = get_path(doc, path).cloned().unwrap_or(Bson::Int32(0));
            let next = arith(op, &cur, value)?;
            set_path(doc, path, next)?;
        }
        "$min" | "$max" => {
            let want = if op == "$min" { Ordering::Less } else { Ordering::Greater };
            let replace = get_path(doc, path).is_none_or(|cur| compare_bson(value, cur) == want);
            if replace {
                set_path(doc, path, value.clone())?;
            }
        }
        "$rename" => {
            let Bson::String(target) = value else {
                return Err(err("$rename target must be a string"));
            };
            if target == ID_FIELD {
                return Err(err(format!("Mod on {ID_FIELD} not allowed")));
            }
            if let Some(v) = get_path(doc, path).cloned() {
                unset_path(doc, path);
                set_path(doc, target, v)?;
            }
        }
        "$currentDate" => {
            let now = bson::DateTime::now();
            let stamp = match value {
                Bson::Document(spec) if spec.get_str("$type").is_ok_and(|t| t == "timestamp") => {
                    let secs = u32::try_from(now.timestamp_millis().div_euclid(1000)).unwrap_or(u32::MAX);
                    Bson::Timestamp(bson::Timestamp { time: secs, increment: 1 })
                }
                _ => Bson::DateTime(now),
            };
            set_path(doc, path, stamp)?;
        }
        "$bit" => {
            let cur = get_path(doc, path).cloned().unwrap_or(Bson::Int32(0));
            set_path(doc, path, bitwise(&cur, value)?)?;
        }
        "$push" | "$pushAll" => {
            let values = if op == "$pushAll" {
                match value {
                    Bson::Array(items) => items.clone(),
                    _ => return Err(err("$pushAll requires an array")),
                }
            } else {
                each_values(value)
            };
            array_at(doc, path, op)?.extend(values);
        }
        "$addToSet" => {
            let items = array_at(doc, path, op)?;
            for v in each_values(value) {
                if !items.iter().any(|x| values_equal(x, &v)) {
                    items.push(v);
                }
            }
        }
        "$pop" => {
            if get_path(doc, path).is_some() {
                let items = array_at(doc, path, op)?;
                if bson_as_i64(value).is_some_and(|n| n < 0) {
                    if !items.is_empty() {
                        items.remove(0);
                    }
                } else {
                    items.pop();
                }
            }
        }
        "$pull" | "$pullAll" => {
            if get_path(doc, path).is_some() {
                let conds = match (op, value) {
                    ("$pullAll", Bson::Array(all)) => all.clone(),
                    ("$pullAll", _) => return Err(err("$pullAll requires an array argument")),
                    _ => vec![value.clone()],
                };
                let items = array_at(doc, path, op)?;
                let mut kept = Vec::with_capacity(items.len());
                for item in items.drain(..) {
                    let mut hit = false;
                    for c in &conds {
                        if pull_matches(&item, c)? {
                            hit = true;
                            break;
                        }
                    }
                    if !hit {
                        kept.push(item);
                    }
                }
                *items = kept;
            }
        }
        other => return Err(err(format!("Unknown modifier: {other}"))),
    }
    Ok(())
}

/// Seed document for an upsert: the equality parts of the query.
///
/// # Errors
/// Returns `DbError::Driver` when two equalities collide on a path (`a` and `a.b`).
pub fn upsert_seed(query: &Document) -> Result<Document, DbError> {
    let mut seed = Document::new();
    for (k, v) in query {
        if k.starts_with(OPERATOR_SIGIL) {
            continue;
        }
        let value = match v {
            Bson::Document(d) if d.keys().next().is_some_and(|x| x.starts_with(OPERATOR_SIGIL)) => {
                match d.get("$eq") {
                    Some(eq) => eq.clone(),
                    None => continue,
                }
            }
            other => other.clone(),
        };
        set_path(&mut seed, k, value)?;
    }
    Ok(seed)
}
