//! The evaluation environment.
//!
//! An [`Environment`] is an explicit value handed to the pipeline at
//! construction: named unary functions usable in expressions
//! (`len(.items)`) and named value bindings (`env.HOME`, data imports,
//! init bindings). There is no process-global registry; two pipelines
//! with different environments do not observe each other.

use std::collections::HashMap;
use std::sync::Arc;

use chrono::{DateTime, Utc};

use crate::evaluator::EvalError;
use crate::value::Value;

/// A named unary function callable from expressions. The running value
/// goes in, a value comes out.
pub type NativeFn = Arc<dyn Fn(&Value) -> Result<Value, EvalError> + Send + Sync>;

/// Names registered by [`Environment::with_defaults`]. The normalizer
/// treats these as reserved when escaping colliding field names.
pub const DEFAULT_FUNCTIONS: &[&str] = &["len", "str", "title", "date", "age", "now"];

#[derive(Clone, Default)]
pub struct Environment {
    functions: HashMap<String, NativeFn>,
    bindings: HashMap<String, Value>,
}

impl Environment {
    /// An empty environment with no functions and no bindings.
    pub fn new() -> Self {
        Environment::default()
    }

    /// The standard environment: the default unary functions plus an
    /// `env` binding exposing process environment variables as an
    /// object.
    pub fn with_defaults() -> Self {
        let mut env = Environment::new();
        env.register("len", |v| match v {
            Value::String(s) => Ok(Value::Integer(s.chars().count() as i64)),
            Value::Array(arr) => Ok(Value::Integer(arr.len() as i64)),
            Value::Object(obj) => Ok(Value::Integer(obj.len() as i64)),
            other => Err(EvalError::Type(format!(
                "len() requires string, array or object, got {}",
                other.type_name()
            ))),
        });
        env.register("str", |v| Ok(Value::String(v.as_string())));
        env.register("title", |v| match v {
            Value::String(s) => Ok(Value::String(title_case(s))),
            other => Err(EvalError::Type(format!(
                "title() requires string, got {}",
                other.type_name()
            ))),
        });
        env.register("date", |v| match v {
            // Unparseable values pass through unchanged, like the rest
            // of the null-tolerant access chain.
            Value::String(s) => Ok(parse_datetime(s)
                .map(|t| Value::String(t.to_rfc3339()))
                .unwrap_or_else(|| Value::String(s.clone()))),
            other => Ok(other.clone()),
        });
        env.register("age", |v| {
            let s = v.as_string();
            let t = parse_datetime(&s).ok_or_else(|| {
                EvalError::Type(format!("age() cannot parse '{}' as a datetime", s))
            })?;
            Ok(Value::Integer((Utc::now() - t).num_seconds()))
        });
        env.register("now", |_| Ok(Value::String(Utc::now().to_rfc3339())));

        let vars: indexmap::IndexMap<String, Value> = std::env::vars()
            .map(|(k, v)| (k, Value::String(v)))
            .collect();
        env.bind("env", Value::Object(vars));
        env
    }

    /// Register a named unary function.
    pub fn register(
        &mut self,
        name: impl Into<String>,
        f: impl Fn(&Value) -> Result<Value, EvalError> + Send + Sync + 'static,
    ) {
        self.functions.insert(name.into(), Arc::new(f));
    }

    /// Bind a name to a value.
    pub fn bind(&mut self, name: impl Into<String>, value: Value) {
        self.bindings.insert(name.into(), value);
    }

    pub fn function(&self, name: &str) -> Option<&NativeFn> {
        self.functions.get(name)
    }

    pub fn binding(&self, name: &str) -> Option<&Value> {
        self.bindings.get(name)
    }
}

impl std::fmt::Debug for Environment {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Environment")
            .field("functions", &self.functions.keys().collect::<Vec<_>>())
            .field("bindings", &self.bindings.keys().collect::<Vec<_>>())
            .finish()
    }
}

fn title_case(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    let mut at_word_start = true;
    for ch in s.chars() {
        if ch.is_alphanumeric() {
            if at_word_start {
                out.extend(ch.to_uppercase());
            } else {
                out.extend(ch.to_lowercase());
            }
            at_word_start = false;
        } else {
            out.push(ch);
            at_word_start = true;
        }
    }
    out
}

/// Parse the datetime formats the query language accepts: RFC 3339,
/// `YYYY-MM-DDTHH:MM[:SS]`, `YYYY-MM-DD HH:MM:SS`, and bare dates.
/// Naive timestamps are taken as UTC.
fn parse_datetime(s: &str) -> Option<DateTime<Utc>> {
    if let Ok(t) = DateTime::parse_from_rfc3339(s) {
        return Some(t.with_timezone(&Utc));
    }
    const NAIVE_FORMATS: &[&str] = &[
        "%Y-%m-%dT%H:%M:%S",
        "%Y-%m-%dT%H:%M",
        "%Y-%m-%d %H:%M:%S",
        "%Y-%m-%d %H:%M",
    ];
    for fmt in NAIVE_FORMATS {
        if let Ok(t) = chrono::NaiveDateTime::parse_from_str(s, fmt) {
            return Some(t.and_utc());
        }
    }
    if let Ok(d) = chrono::NaiveDate::parse_from_str(s, "%Y-%m-%d") {
        return d.and_hms_opt(0, 0, 0).map(|t| t.and_utc());
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_functions_resolve() {
        let env = Environment::with_defaults();
        for name in DEFAULT_FUNCTIONS {
            assert!(env.function(name).is_some(), "{} missing", name);
        }
    }

    #[test]
    fn len_of_string_and_array() {
        let env = Environment::with_defaults();
        let len = env.function("len").unwrap();
        assert_eq!(
            len(&Value::String("abc".to_string())).unwrap(),
            Value::Integer(3)
        );
        assert_eq!(
            len(&Value::Array(vec![Value::Null, Value::Null])).unwrap(),
            Value::Integer(2)
        );
        assert!(len(&Value::Integer(1)).is_err());
    }

    #[test]
    fn title_cases_words() {
        assert_eq!(title_case("hello wide world"), "Hello Wide World");
        assert_eq!(title_case("ALL CAPS"), "All Caps");
    }

    #[test]
    fn date_normalizes_and_passes_through() {
        let env = Environment::with_defaults();
        let date = env.function("date").unwrap();
        let parsed = date(&Value::String("2011-04-01T12:12".to_string())).unwrap();
        assert_eq!(
            parsed,
            Value::String("2011-04-01T12:12:00+00:00".to_string())
        );
        // not a date: unchanged
        assert_eq!(
            date(&Value::String("hello".to_string())).unwrap(),
            Value::String("hello".to_string())
        );
    }
}
