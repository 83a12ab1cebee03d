//! Built-in filters
//!
//! A filter takes the piped-in value and its evaluated arguments and returns a
//! new value. Filters never fail: a missing or ill-typed argument falls back
//! to a documented default, and input a filter cannot handle is passed through
//! or turned into `nil`.
//!
//! | filter | arguments | result |
//! |---|---|---|
//! | `join` | separator (default `" "`) | array elements stringified and joined |
//! | `upcase`, `downcase`, `capitalize`, `downcase_first` | - | case-mapped string |
//! | `size` | - | array/object length, string character count, else `0` |
//! | `default` | fallback | fallback if the input is `nil` |
//! | `strip`, `lstrip`, `rstrip` | - | whitespace trimmed |
//! | `append`, `prepend` | text | concatenation |
//! | `replace`, `replace_first` | search, replacement | substituted string |
//! | `remove` | search | every occurrence removed |
//! | `split` | separator | array of strings, trailing empties dropped |
//! | `first`, `last` | - | first/last array element or character |
//! | `reverse`, `sort`, `uniq`, `compact` | - | reordered/filtered array |
//! | `map` | key | array of each element's `key` |
//! | `escape` | - | HTML-escaped string |
//! | `truncate` | length (default 50), ellipsis (default `"..."`) | shortened string |
//! | `plus`, `minus`, `times`, `divided_by`, `modulo` | operand | arithmetic |
//! | `abs` | - | absolute value |
//! | `newline_to_br` | - | newlines prefixed with `<br />` |
//!
//! `nil` passes through the string filters unchanged so `default` can still
//! catch it further down a chain.

use std::collections::HashMap;
use std::fmt;
use std::sync::OnceLock;

use serde_json::Value;

use crate::value::{as_integer, as_number, number_value, sort_order, value_to_string, values_equal};

/// Filter implementation
pub type FilterFn = fn(&Value, &[Value]) -> Value;

/// Named filter table, immutable once built
pub struct FilterRegistry {
    filters: HashMap<&'static str, FilterFn>,
}

impl FilterRegistry {
    /// Process-wide registry of the built-in filters
    pub fn global() -> &'static FilterRegistry {
        static REGISTRY: OnceLock<FilterRegistry> = OnceLock::new();
        REGISTRY.get_or_init(FilterRegistry::builtin)
    }

    fn builtin() -> Self {
        let table: [(&'static str, FilterFn); 32] = [
            ("join", join),
            ("upcase", upcase),
            ("downcase", downcase),
            ("capitalize", capitalize),
            ("size", size),
            ("default", default),
            ("strip", strip),
            ("lstrip", lstrip),
            ("rstrip", rstrip),
            ("append", append),
            ("prepend", prepend),
            ("replace", replace),
            ("replace_first", replace_first),
            ("remove", remove),
            ("split", split),
            ("first", first),
            ("last", last),
            ("reverse", reverse),
            ("sort", sort),
            ("uniq", uniq),
            ("compact", compact),
            ("map", map),
            ("escape", escape),
            ("truncate", truncate),
            ("plus", plus),
            ("minus", minus),
            ("times", times),
            ("divided_by", divided_by),
            ("modulo", modulo),
            ("abs", abs),
            ("newline_to_br", newline_to_br),
            ("downcase_first", downcase_first),
        ];
        tracing::debug!(count = table.len(), "initialized filter registry");
        Self {
            filters: table.into_iter().collect(),
        }
    }

    /// Look up a filter; names are case-sensitive
    pub fn get(&self, name: &str) -> Option<FilterFn> {
        self.filters.get(name).copied()
    }

    pub fn contains(&self, name: &str) -> bool {
        self.filters.contains_key(name)
    }

    /// Registered filter names, sorted
    pub fn names(&self) -> Vec<&'static str> {
        let mut names: Vec<_> = self.filters.keys().copied().collect();
        names.sort_unstable();
        names
    }
}

impl fmt::Debug for FilterRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FilterRegistry")
            .field("filters", &self.names())
            .finish()
    }
}

static NULL: Value = Value::Null;

fn arg(args: &[Value], index: usize) -> &Value {
    args.get(index).unwrap_or(&NULL)
}

/// String argument, or `fallback` when missing or nil
fn text_arg(args: &[Value], index: usize, fallback: &str) -> String {
    match arg(args, index) {
        Value::Null => fallback.to_string(),
        value => value_to_string(value),
    }
}

/// Apply a string transform, passing nil through
fn map_text(input: &Value, f: impl FnOnce(&str) -> String) -> Value {
    match input {
        Value::Null => Value::Null,
        Value::String(s) => Value::String(f(s)),
        other => Value::String(f(&value_to_string(other))),
    }
}

fn join(input: &Value, args: &[Value]) -> Value {
    let separator = text_arg(args, 0, " ");
    match input {
        Value::Array(items) => Value::String(
            items
                .iter()
                .map(value_to_string)
                .collect::<Vec<_>>()
                .join(&separator),
        ),
        other => map_text(other, str::to_string),
    }
}

fn upcase(input: &Value, _: &[Value]) -> Value {
    map_text(input, str::to_uppercase)
}

fn downcase(input: &Value, _: &[Value]) -> Value {
    map_text(input, str::to_lowercase)
}

fn capitalize(input: &Value, _: &[Value]) -> Value {
    map_text(input, |s| {
        let mut chars = s.chars();
        match chars.next() {
            Some(head) => head.to_uppercase().chain(chars.as_str().to_lowercase().chars()).collect(),
            None => String::new(),
        }
    })
}

fn downcase_first(input: &Value, _: &[Value]) -> Value {
    map_text(input, |s| {
        let mut chars = s.chars();
        match chars.next() {
            Some(head) => head.to_lowercase().chain(chars).collect(),
            None => String::new(),
        }
    })
}

fn size(input: &Value, _: &[Value]) -> Value {
    let size = match input {
        Value::Array(items) => items.len(),
        Value::Object(map) => map.len(),
        Value::String(s) => s.chars().count(),
        _ => 0,
    };
    Value::from(size)
}

fn default(input: &Value, args: &[Value]) -> Value {
    match input {
        Value::Null => arg(args, 0).clone(),
        other => other.clone(),
    }
}

fn strip(input: &Value, _: &[Value]) -> Value {
    map_text(input, |s| s.trim().to_string())
}

fn lstrip(input: &Value, _: &[Value]) -> Value {
    map_text(input, |s| s.trim_start().to_string())
}

fn rstrip(input: &Value, _: &[Value]) -> Value {
    map_text(input, |s| s.trim_end().to_string())
}

fn append(input: &Value, args: &[Value]) -> Value {
    let suffix = text_arg(args, 0, "");
    Value::String(value_to_string(input) + &suffix)
}

fn prepend(input: &Value, args: &[Value]) -> Value {
    let prefix = text_arg(args, 0, "");
    Value::String(prefix + &value_to_string(input))
}

fn replace(input: &Value, args: &[Value]) -> Value {
    let search = text_arg(args, 0, "");
    let replacement = text_arg(args, 1, "");
    map_text(input, |s| {
        if search.is_empty() {
            s.to_string()
        } else {
            s.replace(&search, &replacement)
        }
    })
}

fn replace_first(input: &Value, args: &[Value]) -> Value {
    let search = text_arg(args, 0, "");
    let replacement = text_arg(args, 1, "");
    map_text(input, |s| {
        if search.is_empty() {
            s.to_string()
        } else {
            s.replacen(&search, &replacement, 1)
        }
    })
}

fn remove(input: &Value, args: &[Value]) -> Value {
    let mut args = args.to_vec();
    args.truncate(1);
    replace(input, &args)
}

fn split(input: &Value, args: &[Value]) -> Value {
    let separator = text_arg(args, 0, " ");
    let text = match input {
        Value::Null => return Value::Array(Vec::new()),
        other => value_to_string(other),
    };
    let mut parts: Vec<String> = if separator.is_empty() {
        text.chars().map(String::from).collect()
    } else if separator == " " {
        text.split_whitespace().map(String::from).collect()
    } else {
        text.split(separator.as_str()).map(String::from).collect()
    };
    while parts.last().is_some_and(String::is_empty) {
        parts.pop();
    }
    Value::Array(parts.into_iter().map(Value::String).collect())
}

fn first(input: &Value, _: &[Value]) -> Value {
    match input {
        Value::Array(items) => items.first().cloned().unwrap_or(Value::Null),
        Value::String(s) => s.chars().next().map(|c| Value::String(c.to_string())).unwrap_or(Value::Null),
        _ => Value::Null,
    }
}

fn last(input: &Value, _: &[Value]) -> Value {
    match input {
        Value::Array(items) => items.last().cloned().unwrap_or(Value::Null),
        Value::String(s) => s.chars().last().map(|c| Value::String(c.to_string())).unwrap_or(Value::Null),
        _ => Value::Null,
    }
}

fn reverse(input: &Value, _: &[Value]) -> Value {
    match input {
        Value::Array(items) => Value::Array(items.iter().rev().cloned().collect()),
        other => other.clone(),
    }
}

fn sort(input: &Value, _: &[Value]) -> Value {
    match input {
        Value::Array(items) => {
            let mut items = items.clone();
            items.sort_by(sort_order);
            Value::Array(items)
        }
        other => other.clone(),
    }
}

fn uniq(input: &Value, _: &[Value]) -> Value {
    match input {
        Value::Array(items) => {
            let mut unique: Vec<Value> = Vec::with_capacity(items.len());
            for item in items {
                if !unique.iter().any(|seen| values_equal(seen, item)) {
                    unique.push(item.clone());
                }
            }
            Value::Array(unique)
        }
        other => other.clone(),
    }
}

fn compact(input: &Value, _: &[Value]) -> Value {
    match input {
        Value::Array(items) => Value::Array(items.iter().filter(|item| !item.is_null()).cloned().collect()),
        other => other.clone(),
    }
}

fn map(input: &Value, args: &[Value]) -> Value {
    let key = text_arg(args, 0, "");
    match input {
        Value::Array(items) => Value::Array(
            items
                .iter()
                .map(|item| item.get(&key).cloned().unwrap_or(Value::Null))
                .collect(),
        ),
        Value::Object(map) => map.get(&key).cloned().unwrap_or(Value::Null),
        _ => Value::Null,
    }
}

fn escape(input: &Value, _: &[Value]) -> Value {
    map_text(input, |s| {
        let mut escaped = String::with_capacity(s.len());
        for c in s.chars() {
            match c {
                '&' => escaped.push_str("&amp;"),
                '<' => escaped.push_str("&lt;"),
                '>' => escaped.push_str("&gt;"),
                '"' => escaped.push_str("&quot;"),
                '\'' => escaped.push_str("&#39;"),
                other => escaped.push(other),
            }
        }
        escaped
    })
}

fn truncate(input: &Value, args: &[Value]) -> Value {
    let length = as_integer(arg(args, 0))
        .map_or(50, |n| usize::try_from(n.max(0)).unwrap_or(usize::MAX));
    let ellipsis = text_arg(args, 1, "...");
    map_text(input, |s| {
        if s.chars().count() <= length {
            return s.to_string();
        }
        let keep = length.saturating_sub(ellipsis.chars().count());
        s.chars().take(keep).collect::<String>() + &ellipsis
    })
}

/// Arithmetic over two numbers; integer operands stay integers when the
/// result fits, anything non-numeric counts as `0`
fn arithmetic(
    input: &Value,
    args: &[Value],
    int_op: fn(i64, i64) -> Option<i64>,
    float_op: fn(f64, f64) -> f64,
) -> Value {
    let operand = arg(args, 0);
    if let (Some(a), Some(b)) = (exact_integer(input), exact_integer(operand)) {
        if let Some(result) = int_op(a, b) {
            return Value::from(result);
        }
    }
    let a = as_number(input).unwrap_or(0.0);
    let b = as_number(operand).unwrap_or(0.0);
    number_value(float_op(a, b))
}

/// Integers, including integer-valued strings, but not floats
fn exact_integer(value: &Value) -> Option<i64> {
    match value {
        Value::Number(n) => n.as_i64(),
        Value::String(s) => s.trim().parse().ok(),
        Value::Null => Some(0),
        _ => None,
    }
}

fn plus(input: &Value, args: &[Value]) -> Value {
    arithmetic(input, args, i64::checked_add, |a, b| a + b)
}

fn minus(input: &Value, args: &[Value]) -> Value {
    arithmetic(input, args, i64::checked_sub, |a, b| a - b)
}

fn times(input: &Value, args: &[Value]) -> Value {
    arithmetic(input, args, i64::checked_mul, |a, b| a * b)
}

/// Integer operands use floor division; division by zero gives nil
fn divided_by(input: &Value, args: &[Value]) -> Value {
    if as_number(arg(args, 0)).unwrap_or(0.0) == 0.0 {
        return Value::Null;
    }
    arithmetic(input, args, i64::checked_div_euclid, |a, b| a / b)
}

fn modulo(input: &Value, args: &[Value]) -> Value {
    if as_number(arg(args, 0)).unwrap_or(0.0) == 0.0 {
        return Value::Null;
    }
    arithmetic(input, args, i64::checked_rem_euclid, |a, b| a.rem_euclid(b))
}

fn abs(input: &Value, _: &[Value]) -> Value {
    match exact_integer(input) {
        Some(i) => i.checked_abs().map(Value::from).unwrap_or(Value::Null),
        None => as_number(input).map(|f| number_value(f.abs())).unwrap_or(Value::Null),
    }
}

fn newline_to_br(input: &Value, _: &[Value]) -> Value {
    map_text(input, |s| s.replace('\n', "<br />\n"))
}
