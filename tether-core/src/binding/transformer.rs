//! Value Transformers
//!
//! A transformer converts a model value into its presentation form when a
//! binding reads, and back when the binding writes. Transformers that do
//! not implement the reverse direction make their bindings read-only.
//!
//! `can_reverse` has no default: every transformer states whether
//! `reverse_transformed_value` works, so one that implements the reverse
//! direction cannot end up read-only by omission.

use std::sync::Arc;

use crate::error::{Error, Result};
use crate::value::Value;

/// Converts values between the model and the presentation side of a
/// binding.
pub trait ValueTransformer: Send + Sync {
    /// Model -> presentation.
    fn transformed_value(&self, value: &Value) -> Value;

    /// Presentation -> model. Only called when `can_reverse` is true.
    fn reverse_transformed_value(&self, _value: &Value) -> Result<Value> {
        Err(Error::Unimplemented("reverse_transformed_value"))
    }

    /// Whether `reverse_transformed_value` is implemented. Must return
    /// `true` exactly when it is overridden; bindings with a transformer
    /// that cannot reverse refuse writes.
    fn can_reverse(&self) -> bool;
}

/// Logical negation of the value's truthiness.
#[derive(Debug, Clone, Copy, Default)]
pub struct NotTransformer;

impl ValueTransformer for NotTransformer {
    fn transformed_value(&self, value: &Value) -> Value {
        Value::Bool(!value.is_truthy())
    }

    fn reverse_transformed_value(&self, value: &Value) -> Result<Value> {
        Ok(Value::Bool(!value.is_truthy()))
    }

    fn can_reverse(&self) -> bool {
        true
    }
}

/// Maps a designated "true" model value to `true` and everything else to
/// `false`. Writes map booleans back to the designated values.
#[derive(Debug, Clone)]
pub struct BooleanTransformer {
    pub true_value: Value,
    pub false_value: Value,
}

impl Default for BooleanTransformer {
    fn default() -> Self {
        Self {
            true_value: Value::Bool(true),
            false_value: Value::Bool(false),
        }
    }
}

impl BooleanTransformer {
    pub fn new(true_value: impl Into<Value>, false_value: impl Into<Value>) -> Self {
        Self {
            true_value: true_value.into(),
            false_value: false_value.into(),
        }
    }
}

impl ValueTransformer for BooleanTransformer {
    fn transformed_value(&self, value: &Value) -> Value {
        Value::Bool(*value == self.true_value)
    }

    fn reverse_transformed_value(&self, value: &Value) -> Result<Value> {
        Ok(if value.is_truthy() {
            self.true_value.clone()
        } else {
            self.false_value.clone()
        })
    }

    fn can_reverse(&self) -> bool {
        true
    }
}

/// Table lookup between parallel lists of model and display values.
/// Values not in the table pass through unchanged.
#[derive(Debug, Clone, Default)]
pub struct GenericTransformer {
    model_values: Vec<Value>,
    display_values: Vec<Value>,
}

impl GenericTransformer {
    pub fn new(model_values: Vec<Value>, display_values: Vec<Value>) -> Result<Self> {
        if model_values.len() != display_values.len() {
            return Err(Error::InvalidArgument(format!(
                "generic transformer needs as many display values as model values ({} vs {})",
                model_values.len(),
                display_values.len()
            )));
        }
        Ok(Self {
            model_values,
            display_values,
        })
    }

    fn lookup(from: &[Value], to: &[Value], value: &Value) -> Value {
        from.iter()
            .position(|candidate| candidate == value)
            .map(|index| to[index].clone())
            .unwrap_or_else(|| value.clone())
    }
}

impl ValueTransformer for GenericTransformer {
    fn transformed_value(&self, value: &Value) -> Value {
        Self::lookup(&self.model_values, &self.display_values, value)
    }

    fn reverse_transformed_value(&self, value: &Value) -> Result<Value> {
        Ok(Self::lookup(&self.display_values, &self.model_values, value))
    }

    fn can_reverse(&self) -> bool {
        true
    }
}

/// Shortens strings longer than `max_length` characters, appending an
/// ellipsis. Read-only.
#[derive(Debug, Clone)]
pub struct TruncatedTransformer {
    pub max_length: usize,
    pub ellipsis: String,
}

impl Default for TruncatedTransformer {
    fn default() -> Self {
        Self {
            max_length: 50,
            ellipsis: "\u{2026}".to_string(),
        }
    }
}

impl TruncatedTransformer {
    pub fn new(max_length: usize) -> Self {
        Self {
            max_length,
            ..Self::default()
        }
    }
}

impl ValueTransformer for TruncatedTransformer {
    fn transformed_value(&self, value: &Value) -> Value {
        let Some(text) = value.as_str() else {
            return value.clone();
        };
        if text.chars().count() <= self.max_length {
            return value.clone();
        }
        let mut truncated: String = text.chars().take(self.max_length).collect();
        truncated.push_str(&self.ellipsis);
        Value::String(truncated)
    }

    fn can_reverse(&self) -> bool {
        false
    }
}

/// Look up a built-in transformer by name.
///
/// Recognized names are `Not`, `Boolean`, `Generic` (an empty table, so
/// identity) and `Truncated`.
pub fn transformer_with_name(name: &str) -> Option<Arc<dyn ValueTransformer>> {
    match name {
        "Not" => Some(Arc::new(NotTransformer)),
        "Boolean" => Some(Arc::new(BooleanTransformer::default())),
        "Generic" => Some(Arc::new(GenericTransformer::default())),
        "Truncated" => Some(Arc::new(TruncatedTransformer::default())),
        _ => None,
    }
}
