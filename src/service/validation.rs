//! Request validation from config rules. Runs on values already coerced to their column kind.

use crate::config::ValidationRule;
use crate::error::FieldErrors;
use regex::Regex;
use serde_json::Value;
use std::collections::HashMap;
use std::sync::OnceLock;

const EMAIL_PATTERN: &str = r"^[^@\s]+@[^@\s]+\.[^@\s]+$";

pub struct RequestValidator;

impl RequestValidator {
    /// Validate the fields present in body against their rules, collecting every failure.
    pub fn validate(
        body: &HashMap<String, Value>,
        rules: &HashMap<String, ValidationRule>,
        errors: &mut FieldErrors,
    ) {
        for (col, v) in body {
            if let Some(rule) = rules.get(col) {
                for message in validate_field(v, rule) {
                    errors.add(col.as_str(), message);
                }
            }
        }
    }
}

/// Messages for every rule the value breaks. Null passes; nullability is checked upstream.
pub fn validate_field(v: &Value, rule: &ValidationRule) -> Vec<String> {
    let mut out = Vec::new();
    if v.is_null() {
        return out;
    }
    if let Some(format) = &rule.format {
        if let Some(message) = validate_format(v, format) {
            out.push(message);
        }
    }
    if let Some(s) = v.as_str() {
        let len = s.chars().count();
        if let Some(max) = rule.max_length {
            if len > max as usize {
                out.push(format!("Ensure this field has no more than {} characters.", max));
            }
        }
        if let Some(min) = rule.min_length {
            if len < min as usize {
                out.push(format!("Ensure this field has at least {} characters.", min));
            }
        }
        if let Some(pattern) = &rule.pattern {
            let matched = match &rule.compiled_pattern {
                Some(re) => re.is_match(s),
                // Rules that never went through resolve.
                None => match Regex::new(pattern) {
                    Ok(re) => re.is_match(s),
                    Err(e) => {
                        tracing::warn!(pattern = %pattern, error = %e, "invalid validation pattern");
                        false
                    }
                },
            };
            if !matched {
                out.push("This value does not match the required pattern.".into());
            }
        }
    }
    if let Some(allowed) = &rule.allowed {
        if !allowed.iter().any(|a| value_eq(v, a)) {
            out.push(format!("\"{}\" is not a valid choice.", display_value(v)));
        }
    }
    if let Some(n) = as_number(v) {
        if let Some(min) = rule.minimum {
            if n < min {
                out.push(format!("Ensure this value is greater than or equal to {}.", min));
            }
        }
        if let Some(max) = rule.maximum {
            if n > max {
                out.push(format!("Ensure this value is less than or equal to {}.", max));
            }
        }
    }
    out
}

fn as_number(v: &Value) -> Option<f64> {
    match v {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.parse::<f64>().ok(),
        _ => None,
    }
}

fn display_value(v: &Value) -> String {
    match v {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

fn value_eq(a: &Value, b: &Value) -> bool {
    match (a, b) {
        (Value::String(s), Value::String(t)) => s == t,
        (Value::Number(n), Value::Number(m)) => n.as_f64() == m.as_f64(),
        _ => a == b,
    }
}

fn validate_format(v: &Value, format: &str) -> Option<String> {
    match format.to_lowercase().as_str() {
        "email" => {
            static EMAIL: OnceLock<Option<Regex>> = OnceLock::new();
            let re = EMAIL.get_or_init(|| Regex::new(EMAIL_PATTERN).ok()).as_ref()?;
            match v.as_str() {
                Some(s) if re.is_match(s) => None,
                _ => Some("Enter a valid email address.".into()),
            }
        }
        _ => None,
    }
}
