//! Declared property types and write-time coercion.

use chrono::DateTime;

use crate::error::{Error, Result};
use crate::value::{parse_date, Pattern, Value};

/// The type a model declares for a key.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum PropertyType {
    String,
    Number,
    Boolean,
    Date,
    RegExp,
    /// An instance of the named model. Raw hashes are instantiated.
    Model(String),
    /// No checking.
    Any,
}

impl PropertyType {
    /// Shorthand for [`PropertyType::Model`].
    pub fn model(name: impl Into<String>) -> Self {
        PropertyType::Model(name.into())
    }

    /// Check `value` against this type, converting where a conversion is
    /// defined (date strings and millisecond timestamps to dates, pattern
    /// strings to regexps).
    ///
    /// `Null` is accepted for every type. `Model` types only pass objects
    /// and hashes through; the model layer checks and instantiates them.
    pub(crate) fn coerce(&self, key: &str, value: Value, coerce_dates: bool) -> Result<Value> {
        let invalid = || Error::TypeValidation { key: key.to_string() };
        match (self, value) {
            (_, Value::Null) => Ok(Value::Null),
            (PropertyType::Any, value) => Ok(value),
            (PropertyType::String, value @ Value::String(_)) => Ok(value),
            (PropertyType::Number, value @ Value::Number(_)) => Ok(value),
            (PropertyType::Boolean, value @ Value::Bool(_)) => Ok(value),
            (PropertyType::Date, value @ Value::Date(_)) => Ok(value),
            (PropertyType::Date, Value::String(text)) if coerce_dates => {
                parse_date(&text).map(Value::Date).ok_or_else(invalid)
            }
            (PropertyType::Date, Value::Number(millis)) if coerce_dates && millis.is_finite() => {
                DateTime::from_timestamp_millis(millis as i64)
                    .map(Value::Date)
                    .ok_or_else(invalid)
            }
            (PropertyType::RegExp, value @ Value::RegExp(_)) => Ok(value),
            (PropertyType::RegExp, Value::String(source)) => Pattern::new(&source)
                .map(Value::RegExp)
                .map_err(|_| invalid()),
            (PropertyType::Model(_), value @ (Value::Object(_) | Value::Hash(_))) => Ok(value),
            _ => Err(invalid()),
        }
    }
}

impl std::fmt::Display for PropertyType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            PropertyType::String => write!(f, "String"),
            PropertyType::Number => write!(f, "Number"),
            PropertyType::Boolean => write!(f, "Boolean"),
            PropertyType::Date => write!(f, "Date"),
            PropertyType::RegExp => write!(f, "RegExp"),
            PropertyType::Model(name) => write!(f, "{name}"),
            PropertyType::Any => write!(f, "Any"),
        }
    }
}
