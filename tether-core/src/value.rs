//! Dynamic values
//!
//! Every key on an observable object holds a [`Value`]. The variants cover
//! the JSON-shaped data the model layer is constructed from plus the two
//! coerced scalar types (dates and regular expressions) and references to
//! other observable objects.
//!
//! `Value::Null` is the only "absent" value that ever leaves the core. A
//! missing intermediate object during key-path traversal is represented
//! internally as `Option::None` and surfaces to callers as `Null`.

use std::collections::HashSet;
use std::fmt;

use chrono::{DateTime, NaiveDate, NaiveDateTime, TimeZone, Utc};
use indexmap::IndexMap;
use regex::Regex;

use crate::kvo::ObservableObject;

/// A compiled regular expression compared by its source pattern.
#[derive(Clone)]
pub struct Pattern(Regex);

impl Pattern {
    /// Compile a pattern.
    pub fn new(source: &str) -> Result<Self, regex::Error> {
        Regex::new(source).map(Self)
    }

    /// The source text of the pattern.
    pub fn as_str(&self) -> &str {
        self.0.as_str()
    }

    /// Check whether the pattern matches anywhere in `text`.
    pub fn is_match(&self, text: &str) -> bool {
        self.0.is_match(text)
    }

    pub fn regex(&self) -> &Regex {
        &self.0
    }
}

impl PartialEq for Pattern {
    fn eq(&self, other: &Self) -> bool {
        self.as_str() == other.as_str()
    }
}

impl fmt::Debug for Pattern {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "/{}/", self.as_str())
    }
}

impl From<Regex> for Pattern {
    fn from(regex: Regex) -> Self {
        Self(regex)
    }
}

/// A dynamically typed value stored under a key.
#[derive(Debug, Clone, PartialEq, Default)]
pub enum Value {
    #[default]
    Null,
    Bool(bool),
    Number(f64),
    String(String),
    Date(DateTime<Utc>),
    RegExp(Pattern),
    Array(Vec<Value>),
    /// A raw, uninterpreted hash (the JSON object shape).
    Hash(IndexMap<String, Value>),
    /// A reference to an observable object. Compared by identity.
    Object(ObservableObject),
}

impl Value {
    pub fn is_null(&self) -> bool {
        matches!(self, Value::Null)
    }

    /// Short name of the variant, used in diagnostics.
    pub fn type_name(&self) -> &'static str {
        match self {
            Value::Null => "null",
            Value::Bool(_) => "boolean",
            Value::Number(_) => "number",
            Value::String(_) => "string",
            Value::Date(_) => "date",
            Value::RegExp(_) => "regexp",
            Value::Array(_) => "array",
            Value::Hash(_) => "hash",
            Value::Object(_) => "object",
        }
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Value::Bool(b) => Some(*b),
            _ => None,
        }
    }

    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Value::Number(n) => Some(*n),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::String(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_date(&self) -> Option<&DateTime<Utc>> {
        match self {
            Value::Date(d) => Some(d),
            _ => None,
        }
    }

    pub fn as_array(&self) -> Option<&[Value]> {
        match self {
            Value::Array(items) => Some(items),
            _ => None,
        }
    }

    pub fn as_hash(&self) -> Option<&IndexMap<String, Value>> {
        match self {
            Value::Hash(hash) => Some(hash),
            _ => None,
        }
    }

    pub fn as_object(&self) -> Option<&ObservableObject> {
        match self {
            Value::Object(object) => Some(object),
            _ => None,
        }
    }

    /// JavaScript-style truthiness, used by the boolean transformers.
    pub fn is_truthy(&self) -> bool {
        match self {
            Value::Null => false,
            Value::Bool(b) => *b,
            Value::Number(n) => *n != 0.0 && !n.is_nan(),
            Value::String(s) => !s.is_empty(),
            _ => true,
        }
    }

    /// Resolve one key against this value.
    ///
    /// Returns `None` when this value cannot hold keys at all (`Null`),
    /// which is the "missing intermediate object" signal. Arrays map the
    /// key over their elements.
    pub(crate) fn resolve_key(&self, key: &str) -> Option<Value> {
        match self {
            Value::Null => None,
            Value::Object(object) => Some(object.value_for_key(key)),
            Value::Hash(hash) => Some(hash.get(key).cloned().unwrap_or(Value::Null)),
            Value::Array(items) => Some(Value::Array(
                items
                    .iter()
                    .map(|item| item.resolve_key(key).unwrap_or(Value::Null))
                    .collect(),
            )),
            _ => Some(Value::Null),
        }
    }

    /// Resolve a sequence of keys, stopping at the first missing
    /// intermediate.
    pub(crate) fn resolve_path<'a, I>(&self, keys: I) -> Option<Value>
    where
        I: IntoIterator<Item = &'a str>,
    {
        let mut keys = keys.into_iter();
        let mut current = self.clone();
        while let Some(key) = keys.next() {
            if let Value::Array(items) = &current {
                let rest: Vec<&str> = std::iter::once(key).chain(keys).collect();
                return Some(Value::Array(
                    items
                        .iter()
                        .map(|item| item.resolve_path(rest.iter().copied()).unwrap_or(Value::Null))
                        .collect(),
                ));
            }
            current = current.resolve_key(key)?;
        }
        Some(current)
    }

    /// Convert to the plain JSON shape.
    ///
    /// Dates render as RFC 3339 strings, patterns as their source text and
    /// objects as a hash of their keys.
    pub fn to_json(&self) -> serde_json::Value {
        self.to_json_guarded(&mut HashSet::new())
    }

    /// `to_json` with the set of object uids already being rendered, so
    /// reference cycles render as `null` instead of recursing forever.
    pub(crate) fn to_json_guarded(&self, visiting: &mut HashSet<u64>) -> serde_json::Value {
        match self {
            Value::Null => serde_json::Value::Null,
            Value::Bool(b) => serde_json::Value::Bool(*b),
            Value::Number(n) => serde_json::Number::from_f64(*n)
                .map(serde_json::Value::Number)
                .unwrap_or(serde_json::Value::Null),
            Value::String(s) => serde_json::Value::String(s.clone()),
            Value::Date(d) => serde_json::Value::String(d.to_rfc3339()),
            Value::RegExp(p) => serde_json::Value::String(p.as_str().to_string()),
            Value::Array(items) => {
                serde_json::Value::Array(items.iter().map(|v| v.to_json_guarded(visiting)).collect())
            }
            Value::Hash(hash) => serde_json::Value::Object(
                hash.iter()
                    .map(|(k, v)| (k.clone(), v.to_json_guarded(visiting)))
                    .collect(),
            ),
            Value::Object(object) => object.to_json_guarded(visiting),
        }
    }
}

/// Parse a date the way a lenient platform date parser would.
///
/// Accepts RFC 3339 / ISO-8601 timestamps (with or without offset, with or
/// without fractional seconds), bare `YYYY-MM-DD` dates and RFC 2822.
pub fn parse_date(text: &str) -> Option<DateTime<Utc>> {
    let text = text.trim();
    if let Ok(date) = DateTime::parse_from_rfc3339(text) {
        return Some(date.with_timezone(&Utc));
    }
    for format in ["%Y-%m-%dT%H:%M:%S%.f", "%Y-%m-%dT%H:%M:%S", "%Y-%m-%d %H:%M:%S", "%Y-%m-%dT%H:%M"] {
        if let Ok(naive) = NaiveDateTime::parse_from_str(text, format) {
            return Some(Utc.from_utc_datetime(&naive));
        }
    }
    if let Ok(day) = NaiveDate::parse_from_str(text, "%Y-%m-%d") {
        return day.and_hms_opt(0, 0, 0).map(|naive| Utc.from_utc_datetime(&naive));
    }
    DateTime::parse_from_rfc2822(text)
        .ok()
        .map(|date| date.with_timezone(&Utc))
}

impl From<serde_json::Value> for Value {
    fn from(json: serde_json::Value) -> Self {
        match json {
            serde_json::Value::Null => Value::Null,
            serde_json::Value::Bool(b) => Value::Bool(b),
            serde_json::Value::Number(n) => n.as_f64().map(Value::Number).unwrap_or(Value::Null),
            serde_json::Value::String(s) => Value::String(s),
            serde_json::Value::Array(items) => {
                Value::Array(items.into_iter().map(Value::from).collect())
            }
            serde_json::Value::Object(map) => {
                Value::Hash(map.into_iter().map(|(k, v)| (k, Value::from(v))).collect())
            }
        }
    }
}

impl From<bool> for Value {
    fn from(b: bool) -> Self {
        Value::Bool(b)
    }
}

impl From<f64> for Value {
    fn from(n: f64) -> Self {
        Value::Number(n)
    }
}

impl From<i32> for Value {
    fn from(n: i32) -> Self {
        Value::Number(f64::from(n))
    }
}

impl From<i64> for Value {
    fn from(n: i64) -> Self {
        Value::Number(n as f64)
    }
}

impl From<u32> for Value {
    fn from(n: u32) -> Self {
        Value::Number(f64::from(n))
    }
}

impl From<usize> for Value {
    fn from(n: usize) -> Self {
        Value::Number(n as f64)
    }
}

impl From<&str> for Value {
    fn from(s: &str) -> Self {
        Value::String(s.to_string())
    }
}

impl From<String> for Value {
    fn from(s: String) -> Self {
        Value::String(s)
    }
}

impl From<DateTime<Utc>> for Value {
    fn from(date: DateTime<Utc>) -> Self {
        Value::Date(date)
    }
}

impl From<Pattern> for Value {
    fn from(pattern: Pattern) -> Self {
        Value::RegExp(pattern)
    }
}

impl From<ObservableObject> for Value {
    fn from(object: ObservableObject) -> Self {
        Value::Object(object)
    }
}

impl From<Vec<Value>> for Value {
    fn from(items: Vec<Value>) -> Self {
        Value::Array(items)
    }
}

impl From<IndexMap<String, Value>> for Value {
    fn from(hash: IndexMap<String, Value>) -> Self {
        Value::Hash(hash)
    }
}

impl<T: Into<Value>> From<Option<T>> for Value {
    fn from(value: Option<T>) -> Self {
        value.map(Into::into).unwrap_or(Value::Null)
    }
}
