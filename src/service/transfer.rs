//! Write side of the transfer representation: request body -> column values.
//!
//! Foreign keys are written flat under their column name (`ingredient_id`) and never as
//! nested objects. Response-only keys and unknown keys are ignored.

use crate::config::types::type_name_of_json;
use crate::config::{ColumnInfo, ColumnKind, ResolvedEntity};
use crate::error::{AppError, FieldErrors};
use crate::service::RequestValidator;
use chrono::{DateTime, NaiveDate, NaiveDateTime, SecondsFormat, Utc};
use rust_decimal::Decimal;
use serde_json::{Map, Value};
use std::collections::HashMap;
use std::str::FromStr;

pub const REQUIRED: &str = "This field is required.";
pub const NOT_NULL: &str = "This field may not be null.";
pub const NOT_BLANK: &str = "This field may not be blank.";
pub const NULL_CHARACTER: &str = "Null characters are not allowed.";

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum WriteMode {
    Create,
    /// PUT: full representation, same required fields as create.
    Replace,
    /// PATCH: only fields present are checked.
    Partial,
}

/// Decode and validate a request body for `entity`. Returns column -> normalised value.
pub fn decode_write(
    entity: &ResolvedEntity,
    body: Value,
    mode: WriteMode,
) -> Result<HashMap<String, Value>, AppError> {
    let obj = match body {
        Value::Object(m) => m,
        other => {
            return Err(AppError::BadRequest(format!(
                "body must be a JSON object, got {}",
                type_name_of_json(&other)
            )))
        }
    };
    log_ignored_keys(entity, &obj);

    let mut errors = FieldErrors::new();
    let mut out = HashMap::new();
    for col in entity.writable_columns() {
        let rule = entity.validation.get(&col.name);
        match obj.get(&col.name) {
            None => {
                let required = rule
                    .and_then(|r| r.required)
                    .unwrap_or(!col.nullable && !col.has_default);
                if mode != WriteMode::Partial && required {
                    errors.add(col.name.as_str(), REQUIRED);
                }
            }
            Some(Value::Null) => {
                if col.nullable {
                    out.insert(col.name.clone(), Value::Null);
                } else {
                    errors.add(col.name.as_str(), NOT_NULL);
                }
            }
            Some(v) => {
                if entity.reference_for(&col.name).is_some() && (v.is_object() || v.is_array()) {
                    errors.add(
                        col.name.as_str(),
                        format!("Incorrect type. Expected pk value, received {}.", type_name_of_json(v)),
                    );
                    continue;
                }
                match coerce(col, v) {
                    Ok(norm) => {
                        out.insert(col.name.clone(), norm);
                    }
                    Err(messages) => {
                        for m in messages {
                            errors.add(col.name.as_str(), m);
                        }
                    }
                }
            }
        }
    }

    // Rule checks only run on values that coerced cleanly.
    let coerced: HashMap<String, Value> = out
        .iter()
        .filter(|(k, _)| !errors.contains(k))
        .map(|(k, v)| (k.clone(), v.clone()))
        .collect();
    RequestValidator::validate(&coerced, &entity.validation, &mut errors);

    if errors.is_empty() {
        Ok(out)
    } else {
        Err(AppError::Validation(errors))
    }
}

fn log_ignored_keys(entity: &ResolvedEntity, obj: &Map<String, Value>) {
    for key in obj.keys() {
        if entity.writable_columns().any(|c| &c.name == key) {
            continue;
        }
        if entity.is_read_side_name(key) {
            tracing::debug!(entity = %entity.path_segment, field = %key, "ignoring read-only field on input");
        } else {
            tracing::debug!(entity = %entity.path_segment, field = %key, "ignoring unknown field on input");
        }
    }
}

/// Coerce one input value to the column's kind, normalised for binding.
fn coerce(col: &ColumnInfo, v: &Value) -> Result<Value, Vec<String>> {
    match &col.kind {
        ColumnKind::BigInt | ColumnKind::Integer | ColumnKind::SmallInt => coerce_integer(&col.kind, v),
        ColumnKind::Numeric { precision, scale } => coerce_decimal(v, *precision, *scale),
        ColumnKind::Boolean => coerce_bool(v),
        ColumnKind::Varchar { max_length } => coerce_string(v, *max_length, col.nullable),
        ColumnKind::Text => coerce_string(v, None, col.nullable),
        ColumnKind::Date => coerce_date(v),
        ColumnKind::Timestamptz => coerce_datetime(v),
    }
}

fn coerce_integer(kind: &ColumnKind, v: &Value) -> Result<Value, Vec<String>> {
    let invalid = || vec!["A valid integer is required.".to_string()];
    let n: i64 = match v {
        Value::Number(n) => match (n.as_i64(), n.as_f64()) {
            (Some(i), _) => i,
            (None, Some(f)) if f.fract() == 0.0 && f.abs() < i64::MAX as f64 => f as i64,
            _ => return Err(invalid()),
        },
        Value::String(s) => s.trim().parse::<i64>().map_err(|_| invalid())?,
        _ => return Err(invalid()),
    };
    let (lo, hi) = match kind {
        ColumnKind::SmallInt => (i16::MIN as i64, i16::MAX as i64),
        ColumnKind::Integer => (i32::MIN as i64, i32::MAX as i64),
        _ => (i64::MIN, i64::MAX),
    };
    if n < lo {
        return Err(vec![format!("Ensure this value is greater than or equal to {}.", lo)]);
    }
    if n > hi {
        return Err(vec![format!("Ensure this value is less than or equal to {}.", hi)]);
    }
    Ok(Value::from(n))
}

/// Digit counting follows the usual decimal-field rules: total digits, digits after the
/// point, and whole digits are each bounded by the column's numeric(precision, scale).
fn coerce_decimal(v: &Value, precision: u32, scale: u32) -> Result<Value, Vec<String>> {
    let invalid = || vec!["A valid number is required.".to_string()];
    let raw = match v {
        Value::Number(n) => n.to_string(),
        Value::String(s) => s.trim().to_string(),
        _ => return Err(invalid()),
    };
    // Digit separators parse but are not a valid decimal literal on input.
    if raw.contains('_') {
        return Err(invalid());
    }
    let d = Decimal::from_str(&raw)
        .or_else(|_| Decimal::from_scientific(&raw))
        .map_err(|_| invalid())?;

    let digits = if d.mantissa() == 0 {
        1
    } else {
        d.mantissa().unsigned_abs().to_string().len() as u32
    };
    let decimals = d.scale();
    let (total, whole) = if decimals > digits {
        (decimals, 0)
    } else {
        (digits, digits - decimals)
    };
    let mut errors = Vec::new();
    if total > precision {
        errors.push(format!("Ensure that there are no more than {} digits in total.", precision));
    }
    if decimals > scale {
        errors.push(format!("Ensure that there are no more than {} decimal places.", scale));
    }
    if whole > precision.saturating_sub(scale) {
        errors.push(format!(
            "Ensure that there are no more than {} digits before the decimal point.",
            precision.saturating_sub(scale)
        ));
    }
    if errors.is_empty() {
        Ok(Value::String(d.to_string()))
    } else {
        Err(errors)
    }
}

fn coerce_bool(v: &Value) -> Result<Value, Vec<String>> {
    let b = match v {
        Value::Bool(b) => *b,
        Value::Number(n) if n.as_i64() == Some(1) => true,
        Value::Number(n) if n.as_i64() == Some(0) => false,
        Value::String(s) => match s.trim().to_lowercase().as_str() {
            "true" | "t" | "yes" | "y" | "on" | "1" => true,
            "false" | "f" | "no" | "n" | "off" | "0" => false,
            _ => return Err(vec!["Must be a valid boolean.".into()]),
        },
        _ => return Err(vec!["Must be a valid boolean.".into()]),
    };
    Ok(Value::Bool(b))
}

fn coerce_string(v: &Value, max_length: Option<u32>, nullable: bool) -> Result<Value, Vec<String>> {
    let s = match v {
        Value::String(s) => s.trim().to_string(),
        Value::Number(n) => n.to_string(),
        _ => return Err(vec!["Not a valid string.".into()]),
    };
    if s.contains('\0') {
        return Err(vec![NULL_CHARACTER.into()]);
    }
    if s.is_empty() && !nullable {
        return Err(vec![NOT_BLANK.into()]);
    }
    if let Some(max) = max_length {
        if s.chars().count() > max as usize {
            return Err(vec![format!("Ensure this field has no more than {} characters.", max)]);
        }
    }
    Ok(Value::String(s))
}

fn coerce_date(v: &Value) -> Result<Value, Vec<String>> {
    v.as_str()
        .and_then(|s| NaiveDate::parse_from_str(s.trim(), "%Y-%m-%d").ok())
        .map(|d| Value::String(d.format("%Y-%m-%d").to_string()))
        .ok_or_else(|| vec!["Date has wrong format. Use one of these formats instead: YYYY-MM-DD.".into()])
}

fn coerce_datetime(v: &Value) -> Result<Value, Vec<String>> {
    let parsed = v.as_str().map(str::trim).and_then(|s| {
        DateTime::parse_from_rfc3339(s)
            .map(|dt| dt.with_timezone(&Utc))
            .ok()
            .or_else(|| {
                NaiveDateTime::parse_from_str(s, "%Y-%m-%dT%H:%M:%S%.f")
                    .or_else(|_| NaiveDateTime::parse_from_str(s, "%Y-%m-%dT%H:%M"))
                    .map(|naive| naive.and_utc())
                    .ok()
            })
    });
    parsed
        .map(|dt| Value::String(dt.to_rfc3339_opts(SecondsFormat::AutoSi, true)))
        .ok_or_else(|| {
            vec!["Datetime has wrong format. Use one of these formats instead: YYYY-MM-DDThh:mm[:ss[.uuuuuu]][+HH:MM|-HH:MM|Z].".into()]
        })
}
