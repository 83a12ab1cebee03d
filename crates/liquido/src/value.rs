//! JSON data model helpers
//!
//! Documents are plain [`serde_json::Value`] trees (built with
//! `preserve_order`, so object keys keep their document order). This module
//! parses documents and holds the forgiving semantics templates apply to them:
//! member lookup, truthiness, comparison and stringification.

use std::borrow::Cow;
use std::cmp::Ordering;

use serde_json::{Number, Value};

use crate::ast::BinaryOp;
use crate::lexer::Position;
use crate::{Result, TemplateError};

/// Parse a JSON document
pub fn parse_document(text: &str) -> Result<Value> {
    serde_json::from_str(text).map_err(|err| {
        let location = format!(" at line {} column {}", err.line(), err.column());
        let message = err.to_string();
        let message = message.strip_suffix(&location).unwrap_or(&message).to_string();
        let position = document_position(text, err.line(), err.column());
        tracing::debug!(%position, %message, "invalid document");
        TemplateError::InvalidDocument { message, position }
    })
}

/// Position for serde_json's 1-based line and byte column
fn document_position(text: &str, line: usize, column: usize) -> Position {
    let line_start = text
        .split_inclusive('\n')
        .take(line.saturating_sub(1))
        .map(str::len)
        .sum::<usize>();
    let mut offset = (line_start + column.saturating_sub(1)).min(text.len());
    while !text.is_char_boundary(offset) {
        offset -= 1;
    }
    let column = text[line_start.min(offset)..offset].chars().count() + 1;
    Position::new(line.max(1), column, offset)
}

/// Convert a JSON value to string for rendering
///
/// Arrays render as their stringified elements concatenated; objects render
/// as compact JSON.
pub fn value_to_string(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        Value::Number(n) => number_to_string(n),
        Value::Bool(b) => b.to_string(),
        Value::Null => String::new(),
        Value::Array(items) => items.iter().map(value_to_string).collect(),
        Value::Object(_) => value.to_string(),
    }
}

/// Canonical decimal form: integers without a fraction, floats without
/// trailing zeros (`2.0` renders as `2`, `0.50` as `0.5`)
pub fn number_to_string(n: &Number) -> String {
    if let Some(i) = n.as_i64() {
        return i.to_string();
    }
    if let Some(u) = n.as_u64() {
        return u.to_string();
    }
    let f = n.as_f64().unwrap_or_default();
    if f == 0.0 {
        return "0".to_string();
    }
    f.to_string()
}

/// Number value from a float, folding integral results back to integers
pub fn number_value(f: f64) -> Value {
    if f.fract() == 0.0 && f.abs() < 9.0e15 {
        return Value::from(f as i64);
    }
    Number::from_f64(f).map(Value::Number).unwrap_or(Value::Null)
}

/// Numeric view of a value; numeric strings count
pub fn as_number(value: &Value) -> Option<f64> {
    match value {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.trim().parse().ok(),
        _ => None,
    }
}

/// Integer view of a value, truncating floats
pub fn as_integer(value: &Value) -> Option<i64> {
    match value {
        Value::Number(n) => n.as_i64().or_else(|| n.as_f64().map(|f| f as i64)),
        Value::String(s) => {
            let s = s.trim();
            s.parse::<i64>()
                .ok()
                .or_else(|| s.parse::<f64>().ok().map(|f| f as i64))
        }
        _ => None,
    }
}

/// Null and `false` are falsy; everything else, including `0` and `""`, is
/// truthy
pub fn is_truthy(value: &Value) -> bool {
    !matches!(value, Value::Null | Value::Bool(false))
}

/// A single path step
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Key<'k> {
    Name(Cow<'k, str>),
    Index(i64),
}

/// Look up one path step
///
/// Objects are indexed by key, arrays by position. Negative or out-of-range
/// indexes and any step through a scalar give `None`. Arrays also answer the
/// virtual members `size`, `first` and `last`; strings answer `size`; objects
/// answer `size` unless they have a real `size` key.
pub fn get_member<'v>(value: &'v Value, key: &Key<'_>) -> Option<Cow<'v, Value>> {
    match (value, key) {
        (Value::Object(map), Key::Name(name)) => match map.get(&**name) {
            Some(member) => Some(Cow::Borrowed(member)),
            None if name == "size" => Some(Cow::Owned(Value::from(map.len()))),
            None => None,
        },
        (Value::Array(items), Key::Index(index)) => usize::try_from(*index)
            .ok()
            .and_then(|index| items.get(index))
            .map(Cow::Borrowed),
        (Value::Array(items), Key::Name(name)) => match &**name {
            "size" => Some(Cow::Owned(Value::from(items.len()))),
            "first" => items.first().map(Cow::Borrowed),
            "last" => items.last().map(Cow::Borrowed),
            _ => None,
        },
        (Value::String(s), Key::Name(name)) if name == "size" => {
            Some(Cow::Owned(Value::from(s.chars().count())))
        }
        _ => None,
    }
}

/// Evaluate a comparison; mismatched types compare unequal and unordered
pub fn compare(op: BinaryOp, left: &Value, right: &Value) -> bool {
    match op {
        BinaryOp::Eq => values_equal(left, right),
        BinaryOp::Ne => !values_equal(left, right),
        BinaryOp::Lt => ordering(left, right) == Some(Ordering::Less),
        BinaryOp::Gt => ordering(left, right) == Some(Ordering::Greater),
        BinaryOp::Le => matches!(ordering(left, right), Some(Ordering::Less | Ordering::Equal)),
        BinaryOp::Ge => matches!(
            ordering(left, right),
            Some(Ordering::Greater | Ordering::Equal)
        ),
        BinaryOp::Contains => contains(left, right),
        BinaryOp::And => is_truthy(left) && is_truthy(right),
        BinaryOp::Or => is_truthy(left) || is_truthy(right),
    }
}

/// Structural equality, except that numbers compare numerically (`1 == 1.0`)
pub fn values_equal(left: &Value, right: &Value) -> bool {
    match (left, right) {
        (Value::Number(a), Value::Number(b)) => number_ordering(a, b) == Some(Ordering::Equal),
        _ => left == right,
    }
}

fn ordering(left: &Value, right: &Value) -> Option<Ordering> {
    match (left, right) {
        (Value::Number(a), Value::Number(b)) => number_ordering(a, b),
        (Value::String(a), Value::String(b)) => Some(a.cmp(b)),
        _ => None,
    }
}

/// Integers compare exactly, past 2^53 too; anything else goes through f64
fn number_ordering(a: &Number, b: &Number) -> Option<Ordering> {
    let integer = |n: &Number| {
        n.as_i64()
            .map(i128::from)
            .or_else(|| n.as_u64().map(i128::from))
    };
    match (integer(a), integer(b)) {
        (Some(a), Some(b)) => Some(a.cmp(&b)),
        _ => a.as_f64()?.partial_cmp(&b.as_f64()?),
    }
}

/// Total order used for sorting mixed arrays: null < bool < number < string
/// < array < object
pub fn sort_order(left: &Value, right: &Value) -> Ordering {
    fn rank(value: &Value) -> u8 {
        match value {
            Value::Null => 0,
            Value::Bool(_) => 1,
            Value::Number(_) => 2,
            Value::String(_) => 3,
            Value::Array(_) => 4,
            Value::Object(_) => 5,
        }
    }
    match (left, right) {
        (Value::Bool(a), Value::Bool(b)) => a.cmp(b),
        _ => ordering(left, right).unwrap_or_else(|| rank(left).cmp(&rank(right))),
    }
}

/// Substring for strings, membership for arrays, key presence for objects
fn contains(haystack: &Value, needle: &Value) -> bool {
    match haystack {
        Value::String(s) => match needle {
            Value::String(_) | Value::Number(_) | Value::Bool(_) => {
                s.contains(value_to_string(needle).as_str())
            }
            _ => false,
        },
        Value::Array(items) => items.iter().any(|item| values_equal(item, needle)),
        Value::Object(map) => needle.as_str().is_some_and(|key| map.contains_key(key)),
        _ => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_parse_document() {
        let value = parse_document(r#"{ "b": 1, "a": [true, null, "x"] }"#).unwrap();
        let keys: Vec<_> = value.as_object().unwrap().keys().cloned().collect();
        assert_eq!(keys, vec!["b", "a"]);
    }

    #[test]
    fn test_parse_document_trailing_comma() {
        let err = parse_document("[1, 2,]").unwrap_err();
        let TemplateError::InvalidDocument { message, position } = err else {
            panic!("expected invalid document");
        };
        assert!(message.contains("trailing comma"), "{message}");
        assert!(!message.contains("at line"), "{message}");
        assert_eq!(position.line, 1);
        assert_eq!(position.offset, 6);
    }

    #[test]
    fn test_parse_document_unterminated_string() {
        let err = parse_document("{\n  \"name\": \"Ann").unwrap_err();
        assert_eq!(err.kind(), crate::ErrorKind::InvalidDocument);
        assert_eq!(err.position().unwrap().line, 2);
    }

    #[test]
    fn test_parse_document_empty() {
        assert!(parse_document("").is_err());
        assert!(parse_document("   ").is_err());
    }

    #[test]
    fn test_value_to_string() {
        assert_eq!(value_to_string(&json!("hello")), "hello");
        assert_eq!(value_to_string(&json!(42)), "42");
        assert_eq!(value_to_string(&json!(-7)), "-7");
        assert_eq!(value_to_string(&json!(2.0)), "2");
        assert_eq!(value_to_string(&json!(0.5)), "0.5");
        assert_eq!(
            value_to_string(&json!(std::f64::consts::PI)),
            "3.141592653589793"
        );
        assert_eq!(value_to_string(&json!(true)), "true");
        assert_eq!(value_to_string(&json!(null)), "");
        assert_eq!(value_to_string(&json!([1, "a", null, [2]])), "1a2");
        assert_eq!(value_to_string(&json!({"a": 1})), r#"{"a":1}"#);
    }

    #[test]
    fn test_is_truthy() {
        assert!(!is_truthy(&json!(null)));
        assert!(!is_truthy(&json!(false)));
        assert!(is_truthy(&json!(true)));
        assert!(is_truthy(&json!(0)));
        assert!(is_truthy(&json!("")));
        assert!(is_truthy(&json!([])));
        assert!(is_truthy(&json!({})));
    }

    #[test]
    fn test_get_member() {
        let data = json!({ "items": ["a", "b", "c"], "size": "custom" });
        let items = &data["items"];
        assert_eq!(
            get_member(items, &Key::Index(1)).as_deref(),
            Some(&json!("b"))
        );
        assert_eq!(get_member(items, &Key::Index(3)), None);
        assert_eq!(get_member(items, &Key::Index(-1)), None);
        assert_eq!(
            get_member(items, &Key::Name("size".into())).as_deref(),
            Some(&json!(3))
        );
        assert_eq!(
            get_member(items, &Key::Name("last".into())).as_deref(),
            Some(&json!("c"))
        );
        assert_eq!(
            get_member(&data, &Key::Name("size".into())).as_deref(),
            Some(&json!("custom"))
        );
        assert_eq!(
            get_member(&json!("héllo"), &Key::Name("size".into())).as_deref(),
            Some(&json!(5))
        );
        assert_eq!(get_member(&json!(null), &Key::Name("x".into())), None);
        assert_eq!(get_member(&json!(5), &Key::Index(0)), None);
    }

    #[test]
    fn test_compare() {
        assert!(compare(BinaryOp::Eq, &json!(1), &json!(1.0)));
        assert!(compare(BinaryOp::Lt, &json!(1), &json!(2.5)));
        assert!(compare(BinaryOp::Ge, &json!("b"), &json!("a")));
        assert!(!compare(BinaryOp::Lt, &json!(1), &json!("2")));
        assert!(!compare(BinaryOp::Gt, &json!(1), &json!("2")));
        assert!(compare(BinaryOp::Ne, &json!(1), &json!("1")));
        assert!(!compare(BinaryOp::Le, &json!(null), &json!(null)));
        assert!(compare(BinaryOp::Eq, &json!(null), &json!(null)));
    }

    #[test]
    fn test_compare_large_integers() {
        let (a, b) = (json!(9_007_199_254_740_993_i64), json!(9_007_199_254_740_992_i64));
        assert!(!values_equal(&a, &b));
        assert!(compare(BinaryOp::Gt, &a, &b));
        assert!(compare(BinaryOp::Lt, &json!(-1), &json!(u64::MAX)));
        assert!(compare(BinaryOp::Eq, &json!(u64::MAX), &json!(u64::MAX)));
        assert!(compare(BinaryOp::Eq, &json!(2), &json!(2.0)));
    }

    #[test]
    fn test_contains() {
        assert!(compare(BinaryOp::Contains, &json!("hello"), &json!("ell")));
        assert!(compare(BinaryOp::Contains, &json!(["a", 1]), &json!(1)));
        assert!(compare(BinaryOp::Contains, &json!({"k": 0}), &json!("k")));
        assert!(!compare(BinaryOp::Contains, &json!(null), &json!("k")));
    }

    #[test]
    fn test_number_value() {
        assert_eq!(number_value(3.0), json!(3));
        assert_eq!(number_value(0.25), json!(0.25));
        assert_eq!(number_value(f64::NAN), json!(null));
    }

    #[test]
    fn test_sort_order() {
        let mut values = vec![json!("b"), json!(2), json!(null), json!("a"), json!(1)];
        values.sort_by(sort_order);
        assert_eq!(values, vec![json!(null), json!(1), json!(2), json!("a"), json!("b")]);
    }
}
