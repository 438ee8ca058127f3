//! Numeric and truthiness helpers for loosely typed command values.
//!
//! Guidelines
//! - Command mappings arrive from callers (or JSON) with whatever integer width the producer
//!   picked, so readers go through `bson_as_i64`/`bson_as_f64` rather than matching one variant.
//! - "Empty" option values (`0`, `false`, `""`, `null`, empty arrays/documents) are skipped by
//!   the cursor-option and replace-detection logic; `is_truthy` is the single definition of that.
//! - Prefer saturating conversions when clamping is safer than panicking (counters, limits).

use bson::Bson;

#[inline]
#[must_use]
pub fn bson_as_i64(v: &Bson) -> Option<i64> {
    match v {
        Bson::Int32(i) => Some(i64::from(*i)),
        Bson::Int64(i) => Some(*i),
        Bson::Double(f) if f.is_finite() && f.fract() == 0.0 => {
            if *f >= i64::MIN as f64 && *f <= i64::MAX as f64 { Some(*f as i64) } else { None }
        }
        _ => None,
    }
}

#[inline]
#[must_use]
#[allow(clippy::cast_precision_loss)]
pub fn bson_as_f64(v: &Bson) -> Option<f64> {
    match v {
        Bson::Int32(i) => Some(f64::from(*i)),
        Bson::Int64(i) => Some(*i as f64),
        Bson::Double(f) => Some(*f),
        Bson::Decimal128(d) => d.to_string().parse::<f64>().ok(),
        _ => None,
    }
}

#[inline]
#[must_use]
pub const fn is_numeric(v: &Bson) -> bool {
    matches!(v, Bson::Int32(_) | Bson::Int64(_) | Bson::Double(_) | Bson::Decimal128(_))
}

/// Loose truthiness used when deciding whether an option was "given".
#[must_use]
pub fn is_truthy(v: &Bson) -> bool {
    match v {
        Bson::Null | Bson::Undefined => false,
        Bson::Boolean(b) => *b,
        Bson::Int32(i) => *i != 0,
        Bson::Int64(i) => *i != 0,
        Bson::Double(f) => *f != 0.0,
        Bson::String(s) => !(s.is_empty() || s == "0"),
        Bson::Array(a) => !a.is_empty(),
        Bson::Document(d) => !d.is_empty(),
        _ => true,
    }
}

#[inline]
#[must_use]
pub fn i64_to_u64_saturating(v: i64) -> u64 {
    u64::try_from(v).unwrap_or(0)
}

#[inline]
#[must_use]
pub fn u64_to_i64_saturating(v: u64) -> i64 {
    i64::try_from(v).unwrap_or(i64::MAX)
}

#[inline]
#[must_use]
pub fn usize_to_i64(v: usize) -> i64 {
    i64::try_from(v).unwrap_or(i64::MAX)
}

#[inline]
#[must_use]
pub fn i64_to_usize(v: i64) -> Option<usize> {
    usize::try_from(v).ok()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn integers_widen_and_integral_doubles_narrow() {
        assert_eq!(bson_as_i64(&Bson::Int32(7)), Some(7));
        assert_eq!(bson_as_i64(&Bson::Int64(-3)), Some(-3));
        assert_eq!(bson_as_i64(&Bson::Double(4.0)), Some(4));
        assert_eq!(bson_as_i64(&Bson::Double(4.5)), None);
        assert_eq!(bson_as_i64(&Bson::String("4".into())), None);
    }

    #[test]
    fn truthiness_matches_empty_option_rules() {
        for falsy in [
            Bson::Null,
            Bson::Boolean(false),
            Bson::Int32(0),
            Bson::Int64(0),
            Bson::Double(0.0),
            Bson::String(String::new()),
            Bson::String("0".into()),
            Bson::Array(vec![]),
            Bson::Document(bson::Document::new()),
        ] {
            assert!(!is_truthy(&falsy), "{falsy:?} should be falsy");
        }
        assert!(is_truthy(&Bson::Int32(-1)));
        assert!(is_truthy(&Bson::String("a".into())));
        assert!(is_truthy(&Bson::Document(bson::doc! {"a": 1})));
    }

    #[test]
    fn saturating_conversions_clamp() {
        assert_eq!(i64_to_u64_saturating(-5), 0);
        assert_eq!(u64_to_i64_saturating(u64::MAX), i64::MAX);
        assert_eq!(i64_to_usize(-1), None);
    }
}
