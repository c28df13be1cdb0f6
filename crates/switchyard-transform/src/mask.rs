//! Redaction of sensitive values for logging.
//!
//! Masks always produce a string and never reveal the length of a secret.
//! They are only ever applied to copies of request data headed for the log.

use serde_json::Value;
use switchyard_core::schema::SensitiveKind;

/// Placeholder used for secrets and for values that cannot be shaped.
pub const PLACEHOLDER: &str = "****";

/// Masks `value` according to `kind`.
///
/// `null` stays `null`; arrays are masked element-wise; objects and booleans
/// collapse to the placeholder.
#[must_use]
pub fn mask_value(kind: SensitiveKind, value: &Value) -> Value {
    match value {
        Value::Null => Value::Null,
        Value::Array(items) => Value::Array(items.iter().map(|item| mask_value(kind, item)).collect()),
        Value::String(s) => Value::String(mask_str(kind, s)),
        Value::Number(n) => Value::String(mask_str(kind, &n.to_string())),
        Value::Bool(_) | Value::Object(_) => Value::String(PLACEHOLDER.to_string()),
    }
}

fn mask_str(kind: SensitiveKind, input: &str) -> String {
    match kind {
        SensitiveKind::Secret => PLACEHOLDER.to_string(),
        SensitiveKind::Email => mask_email(input),
        SensitiveKind::Number => mask_number(input),
        SensitiveKind::Words => mask_words(input),
    }
}

fn mask_email(input: &str) -> String {
    match input.rsplit_once('@') {
        Some((local, domain)) if !domain.is_empty() => match local.chars().next() {
            Some(first) => format!("{first}{PLACEHOLDER}@{domain}"),
            None => PLACEHOLDER.to_string(),
        },
        _ => PLACEHOLDER.to_string(),
    }
}

fn mask_number(input: &str) -> String {
    let chars: Vec<char> = input.chars().collect();
    if chars.len() <= 4 {
        return PLACEHOLDER.to_string();
    }
    let visible = chars.len() - 4;
    let mut out = "*".repeat(visible);
    out.extend(&chars[visible..]);
    out
}

fn mask_words(input: &str) -> String {
    let mut at_word_start = true;
    input
        .chars()
        .map(|c| {
            if c.is_whitespace() {
                at_word_start = true;
                c
            } else if at_word_start {
                at_word_start = false;
                c
            } else {
                '*'
            }
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_email_mask_keeps_shape() {
        assert_eq!(mask_value(SensitiveKind::Email, &json!("a@b.com")), json!("a****@b.com"));
        assert_eq!(
            mask_value(SensitiveKind::Email, &json!("jane.doe@example.org")),
            json!("j****@example.org")
        );
        assert_eq!(mask_value(SensitiveKind::Email, &json!("not-an-email")), json!(PLACEHOLDER));
    }

    #[test]
    fn test_number_mask_keeps_last_four() {
        assert_eq!(
            mask_value(SensitiveKind::Number, &json!("4111111111111111")),
            json!("************1111")
        );
        assert_eq!(mask_value(SensitiveKind::Number, &json!(123_456)), json!("**3456"));
        assert_eq!(mask_value(SensitiveKind::Number, &json!("12")), json!(PLACEHOLDER));
    }

    #[test]
    fn test_words_mask() {
        assert_eq!(mask_value(SensitiveKind::Words, &json!("John  Smith")), json!("J***  S****"));
    }

    #[test]
    fn test_secret_and_structured_values() {
        assert_eq!(mask_value(SensitiveKind::Secret, &json!("hunter2")), json!(PLACEHOLDER));
        assert_eq!(mask_value(SensitiveKind::Secret, &json!({ "a": 1 })), json!(PLACEHOLDER));
        assert_eq!(mask_value(SensitiveKind::Secret, &Value::Null), Value::Null);
        assert_eq!(
            mask_value(SensitiveKind::Secret, &json!(["x", "y"])),
            json!([PLACEHOLDER, PLACEHOLDER])
        );
    }
}
