//! The template boundary.
//!
//! Components render by name: "render template `t-c-string-field` with these
//! values". How templates are resolved and how values are escaped is up to
//! the [`TemplateEngine`] implementation.

use serde_json::{Map, Value};

use crate::error::Result;

/// Renders named templates with a set of named values.
pub trait TemplateEngine {
    /// Renders the template called `name`.
    ///
    /// `values` is a JSON object. Fails with
    /// [`SpaError::TemplateNotFound`](crate::SpaError::TemplateNotFound) for
    /// an unknown name.
    fn render(&self, name: &str, values: &Value) -> Result<String>;
}

/// Read-only accessor over template values.
///
/// Missing values read as empty, which is what templates expect.
#[derive(Debug, Clone, Copy)]
pub struct Values<'a>(&'a Value);

static NULL: Value = Value::Null;

impl<'a> Values<'a> {
    /// Wraps a JSON value.
    pub const fn new(value: &'a Value) -> Self {
        Self(value)
    }

    /// The wrapped value.
    pub const fn raw(&self) -> &'a Value {
        self.0
    }

    /// Returns a nested object as `Values`.
    pub fn field(&self, key: &str) -> Self {
        Self(self.0.get(key).unwrap_or(&NULL))
    }

    /// Returns a string value, or `""` if missing.
    pub fn str(&self, key: &str) -> &'a str {
        self.0.get(key).and_then(Value::as_str).unwrap_or("")
    }

    /// Returns a string value if present and non-null.
    pub fn opt_str(&self, key: &str) -> Option<&'a str> {
        self.0.get(key).and_then(Value::as_str)
    }

    /// Returns a boolean value, or `false` if missing.
    pub fn bool(&self, key: &str) -> bool {
        self.0.get(key).and_then(Value::as_bool).unwrap_or(false)
    }

    /// Returns a number value, or `0.0` if missing.
    pub fn num(&self, key: &str) -> f64 {
        self.0.get(key).and_then(Value::as_f64).unwrap_or(0.0)
    }

    /// Returns an integer value, or `0` if missing.
    pub fn int(&self, key: &str) -> i64 {
        self.0.get(key).and_then(Value::as_i64).unwrap_or(0)
    }

    /// Returns the elements of an array value, or nothing if missing.
    pub fn list(&self, key: &str) -> Vec<Self> {
        self.0
            .get(key)
            .and_then(Value::as_array)
            .map(|items| items.iter().map(Values).collect())
            .unwrap_or_default()
    }
}

/// Builds a template value object from key/value pairs.
///
/// ```
/// use lahendus_spa::template::values;
///
/// let v = values([("label", "Email".into()), ("required", true.into())]);
/// assert_eq!(v["label"], "Email");
/// ```
pub fn values<const N: usize>(pairs: [(&str, Value); N]) -> Value {
    let map: Map<String, Value> = pairs
        .into_iter()
        .map(|(key, value)| (key.to_string(), value))
        .collect();
    Value::Object(map)
}
