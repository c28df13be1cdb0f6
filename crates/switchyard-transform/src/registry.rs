//! Named field transformers.
//!
//! The built-in set mirrors what request handlers usually need at the edge:
//!
//! | Name | Effect |
//! |---|---|
//! | `email:normalize` | trim and lowercase |
//! | `string:trim` | trim surrounding whitespace |
//! | `int:parse` | parse a leading base-10 integer (`"12px"` becomes `12`) |
//! | `float:parse` | parse a leading decimal number |
//! | `bigint:parse` | strict integer parse, rejects anything else |
//!
//! Values that a transformer cannot make sense of are mapped to `null` by the
//! lenient parsers, the same way a failed numeric parse would serialize.
//! Callers can register their own transformers; a registration under an
//! existing name replaces the built-in.

use serde_json::{Number, Value};
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

/// A transformer function. Errors carry a human-readable reason.
pub type Transformer = Arc<dyn Fn(&Value) -> Result<Value, String> + Send + Sync>;

/// Registry of transformers by name.
#[derive(Clone)]
pub struct TransformerRegistry {
    transformers: HashMap<String, Transformer>,
}

impl fmt::Debug for TransformerRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TransformerRegistry")
            .field("names", &self.names())
            .finish()
    }
}

impl Default for TransformerRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl TransformerRegistry {
    /// Creates a registry holding the built-in transformers.
    #[must_use]
    pub fn new() -> Self {
        let mut registry = Self::empty();
        registry
            .register("email:normalize", email_normalize)
            .register("string:trim", string_trim)
            .register("int:parse", int_parse)
            .register("float:parse", float_parse)
            .register("bigint:parse", bigint_parse);
        registry
    }

    /// Creates a registry with no transformers.
    #[must_use]
    pub fn empty() -> Self {
        Self {
            transformers: HashMap::new(),
        }
    }

    /// Registers (or replaces) a transformer.
    pub fn register<F>(&mut self, name: impl Into<String>, transformer: F) -> &mut Self
    where
        F: Fn(&Value) -> Result<Value, String> + Send + Sync + 'static,
    {
        self.transformers.insert(name.into(), Arc::new(transformer));
        self
    }

    /// Builder form of [`TransformerRegistry::register`].
    #[must_use]
    pub fn with<F>(mut self, name: impl Into<String>, transformer: F) -> Self
    where
        F: Fn(&Value) -> Result<Value, String> + Send + Sync + 'static,
    {
        self.register(name, transformer);
        self
    }

    /// Copies every transformer of `other` over this registry.
    pub fn merge(&mut self, other: &Self) {
        for (name, transformer) in &other.transformers {
            self.transformers.insert(name.clone(), Arc::clone(transformer));
        }
    }

    /// Looks up a transformer.
    #[must_use]
    pub fn get(&self, name: &str) -> Option<Transformer> {
        self.transformers.get(name).cloned()
    }

    /// Whether a transformer is registered under `name`.
    #[must_use]
    pub fn contains(&self, name: &str) -> bool {
        self.transformers.contains_key(name)
    }

    /// Registered names, sorted.
    #[must_use]
    pub fn names(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self.transformers.keys().map(String::as_str).collect();
        names.sort_unstable();
        names
    }
}

fn map_string(value: &Value, f: impl FnOnce(&str) -> String) -> Value {
    match value {
        Value::String(s) => Value::String(f(s)),
        other => other.clone(),
    }
}

fn email_normalize(value: &Value) -> Result<Value, String> {
    Ok(map_string(value, |s| s.trim().to_lowercase()))
}

fn string_trim(value: &Value) -> Result<Value, String> {
    Ok(map_string(value, |s| s.trim().to_string()))
}

/// Splits off an optional sign and the longest run of ASCII digits.
fn integer_prefix(input: &str) -> Option<&str> {
    let bytes = input.as_bytes();
    let start = usize::from(matches!(bytes.first(), Some(b'+' | b'-')));
    let digits = bytes[start..].iter().take_while(|b| b.is_ascii_digit()).count();
    (digits > 0).then(|| &input[..start + digits])
}

fn float_prefix(input: &str) -> Option<&str> {
    let bytes = input.as_bytes();
    let mut end = usize::from(matches!(bytes.first(), Some(b'+' | b'-')));
    let int_digits = bytes[end..].iter().take_while(|b| b.is_ascii_digit()).count();
    end += int_digits;
    let mut frac_digits = 0;
    if bytes.get(end) == Some(&b'.') {
        frac_digits = bytes[end + 1..].iter().take_while(|b| b.is_ascii_digit()).count();
        if int_digits > 0 || frac_digits > 0 {
            end += 1 + frac_digits;
        }
    }
    if int_digits == 0 && frac_digits == 0 {
        return None;
    }
    if matches!(bytes.get(end), Some(b'e' | b'E')) {
        let mut exp = end + 1;
        if matches!(bytes.get(exp), Some(b'+' | b'-')) {
            exp += 1;
        }
        let exp_digits = bytes[exp.min(bytes.len())..]
            .iter()
            .take_while(|b| b.is_ascii_digit())
            .count();
        if exp_digits > 0 {
            end = exp + exp_digits;
        }
    }
    Some(&input[..end])
}

fn float_value(f: f64) -> Value {
    Number::from_f64(f).map_or(Value::Null, Value::Number)
}

fn int_parse(value: &Value) -> Result<Value, String> {
    Ok(match value {
        Value::String(s) => match integer_prefix(s.trim_start()) {
            Some(digits) => digits
                .parse::<i64>()
                .map(Value::from)
                .unwrap_or_else(|_| digits.parse::<f64>().map_or(Value::Null, float_value)),
            None => Value::Null,
        },
        Value::Number(n) if n.is_i64() || n.is_u64() => value.clone(),
        Value::Number(n) => n.as_f64().map_or(Value::Null, |f| float_value(f.trunc())),
        _ => Value::Null,
    })
}

fn float_parse(value: &Value) -> Result<Value, String> {
    Ok(match value {
        Value::String(s) => float_prefix(s.trim_start())
            .and_then(|prefix| prefix.parse::<f64>().ok())
            .map_or(Value::Null, float_value),
        Value::Number(_) => value.clone(),
        _ => Value::Null,
    })
}

fn bigint_parse(value: &Value) -> Result<Value, String> {
    let text = match value {
        Value::String(s) => s.trim().to_string(),
        Value::Number(n) if n.is_i64() || n.is_u64() => return Ok(value.clone()),
        Value::Bool(b) => return Ok(Value::from(u8::from(*b))),
        other => return Err(format!("cannot convert {other} to a big integer")),
    };
    if text.is_empty() {
        return Ok(Value::from(0));
    }
    match integer_prefix(&text) {
        Some(digits) if digits.len() == text.len() => Ok(digits
            .parse::<i64>()
            .map(Value::from)
            .or_else(|_| digits.parse::<u64>().map(Value::from))
            .unwrap_or_else(|_| Value::String(digits.trim_start_matches('+').to_string()))),
        _ => Err(format!("cannot convert '{text}' to a big integer")),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn run(name: &str, input: Value) -> Result<Value, String> {
        let registry = TransformerRegistry::new();
        let transformer = registry.get(name).unwrap();
        transformer(&input)
    }

    #[test]
    fn test_builtin_names() {
        let registry = TransformerRegistry::new();
        assert_eq!(
            registry.names(),
            vec!["bigint:parse", "email:normalize", "float:parse", "int:parse", "string:trim"]
        );
    }

    #[test]
    fn test_string_transformers() {
        assert_eq!(run("email:normalize", json!("  Ada@Example.COM ")), Ok(json!("ada@example.com")));
        assert_eq!(run("string:trim", json!("  hi  ")), Ok(json!("hi")));
        assert_eq!(run("string:trim", json!(5)), Ok(json!(5)));
    }

    #[test]
    fn test_int_parse_prefix_semantics() {
        assert_eq!(run("int:parse", json!("12px")), Ok(json!(12)));
        assert_eq!(run("int:parse", json!("  -7")), Ok(json!(-7)));
        assert_eq!(run("int:parse", json!("abc")), Ok(Value::Null));
        assert_eq!(run("int:parse", json!(3.9)), Ok(json!(3.0)));
    }

    #[test]
    fn test_float_parse_prefix_semantics() {
        assert_eq!(run("float:parse", json!("3.14abc")), Ok(json!(3.14)));
        assert_eq!(run("float:parse", json!(".5")), Ok(json!(0.5)));
        assert_eq!(run("float:parse", json!("1e3x")), Ok(json!(1000.0)));
        assert_eq!(run("float:parse", json!("2e")), Ok(json!(2.0)));
        assert_eq!(run("float:parse", json!("x")), Ok(Value::Null));
    }

    #[test]
    fn test_bigint_parse_is_strict() {
        assert_eq!(run("bigint:parse", json!("9007199254740993")), Ok(json!(9_007_199_254_740_993_i64)));
        assert_eq!(
            run("bigint:parse", json!("123456789012345678901234567890")),
            Ok(json!("123456789012345678901234567890"))
        );
        assert!(run("bigint:parse", json!("12.34")).is_err());
        assert!(run("bigint:parse", json!("12abc")).is_err());
        assert!(run("bigint:parse", json!(1.5)).is_err());
    }

    #[test]
    fn test_override_replaces_builtin() {
        let registry = TransformerRegistry::new().with("string:trim", |_| Ok(json!("custom")));
        let trim = registry.get("string:trim").unwrap();
        assert_eq!(trim(&json!(" x ")), Ok(json!("custom")));
        assert!(registry.contains("email:normalize"));
    }

    #[test]
    fn test_merge_copies_over() {
        let mut base = TransformerRegistry::new();
        let extra = TransformerRegistry::empty().with("slug", |v| Ok(v.clone()));
        base.merge(&extra);
        assert!(base.contains("slug"));
        assert!(base.contains("int:parse"));
    }
}
