//! Comparison shorthand (`=`, `<`, `>`, `<=`, `>=`, `<>`) to operator-based predicates.

use bson::{Bson, Document};

/// Shorthand comparison accepted inside a field's sub-mapping.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Collation {
    Eq,
    Lt,
    Gt,
    Lte,
    Gte,
    Ne,
}

impl Collation {
    #[must_use]
    pub fn parse(key: &str) -> Option<Self> {
        match key {
            "=" => Some(Self::Eq),
            "<" => Some(Self::Lt),
            ">" => Some(Self::Gt),
            "<=" => Some(Self::Lte),
            ">=" => Some(Self::Gte),
            "<>" => Some(Self::Ne),
            _ => None,
        }
    }

    /// Store operator for this collation; `Eq` has none because it collapses to the operand.
    #[must_use]
    pub const fn operator(self) -> Option<&'static str> {
        match self {
            Self::Eq => None,
            Self::Lt => Some("$lt"),
            Self::Gt => Some("$gt"),
            Self::Lte => Some("$lte"),
            Self::Gte => Some("$gte"),
            Self::Ne => Some("$ne"),
        }
    }
}

/// Translate a predicate mapping into the store's query document.
///
/// An `=` collation replaces the field's value with its operand and wins over every other
/// collation on that field. The other collations are renamed to their operator and moved
/// behind the field's remaining keys, in the order they were given.
#[must_use]
pub fn translate_predicate(predicate: &Document) -> Document {
    predicate
        .iter()
        .map(|(field, value)| (field.clone(), translate_value(value)))
        .collect()
}

/// [`translate_predicate`] for an optional predicate; `None` matches everything.
#[must_use]
pub fn translate_optional(predicate: Option<&Document>) -> Document {
    predicate.map(translate_predicate).unwrap_or_default()
}

fn translate_value(value: &Bson) -> Bson {
    let Bson::Document(sub) = value else {
        return value.clone();
    };
    let mut out = sub.clone();
    for (key, operand) in sub {
        let Some(collation) = Collation::parse(key) else {
            continue;
        };
        match collation.operator() {
            None => return operand.clone(),
            Some(op) => {
                out.remove(key);
                out.insert(op, operand.clone());
            }
        }
    }
    Bson::Document(out)
}

#[cfg(test)]
mod tests {
    use super::*;
    use bson::doc;

    #[test]
    fn half_open_range() {
        let q = translate_predicate(&doc! {"age": {">=": 18, "<": 30}});
        assert_eq!(q, doc! {"age": {"$gte": 18, "$lt": 30}});
    }

    #[test]
    fn equality_wins_regardless_of_position() {
        assert_eq!(translate_predicate(&doc! {"a": {"<": 1, "=": 5, ">": 9}}), doc! {"a": 5});
        assert_eq!(translate_predicate(&doc! {"a": {"=": "x", "<>": "y"}}), doc! {"a": "x"});
    }

    #[test]
    fn operators_and_literals_pass_through() {
        let q = doc! {"name": "bob", "tags": {"$in": ["a", "b"]}, "meta": {"k": 1}};
        assert_eq!(translate_predicate(&q), q);
    }

    #[test]
    fn renamed_collations_follow_existing_operators() {
        let q = translate_predicate(&doc! {"n": {"<": 1, "$exists": true, "<>": 3}});
        let keys: Vec<&String> = q.get_document("n").unwrap().keys().collect();
        assert_eq!(keys, ["$exists", "$lt", "$ne"]);
    }

    #[test]
    fn absent_predicate_matches_all() {
        assert!(translate_optional(None).is_empty());
        assert!(translate_predicate(&Document::new()).is_empty());
    }
}
