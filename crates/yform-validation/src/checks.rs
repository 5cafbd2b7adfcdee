#![forbid(unsafe_code)]

//! Built-in checks.
//!
//! Precedence inside one rule: presence, type, `len`/`min`/`max`, pattern,
//! whitespace, enum. The first failing check decides the rule. An empty value
//! (`null`, `""`, `[]`) on a rule that does not demand presence passes
//! without running the remaining checks.

use std::sync::LazyLock;

use chrono::{DateTime, NaiveDate, NaiveDateTime, NaiveTime};
use regex::Regex;
use serde_json::Value;

use crate::error::{
    ERROR_CODE_ENUM, ERROR_CODE_LEN, ERROR_CODE_PATTERN, ERROR_CODE_RANGE, ERROR_CODE_REQUIRED,
    ERROR_CODE_TYPE, ERROR_CODE_WHITESPACE, ValidationError,
};
use crate::rule::{BuiltinRule, Rule, ValueType};

static EMAIL: LazyLock<Option<Regex>> =
    LazyLock::new(|| Regex::new(r"^[^\s@]+@[^\s@]+\.[^\s@]+$").ok());

static URL: LazyLock<Option<Regex>> = LazyLock::new(|| {
    Regex::new(r"(?i)^(?:https?|ftp)://(?:[^\s:@/]+(?::[^\s:@/]*)?@)?[^\s/?#.][^\s/?#]*(?::\d{1,5})?(?:[/?#]\S*)?$").ok()
});

const DATETIME_FORMATS: &[&str] = &["%Y-%m-%d %H:%M:%S", "%Y-%m-%dT%H:%M:%S", "%Y-%m-%d %H:%M"];
const DATE_FORMATS: &[&str] = &["%Y-%m-%d", "%Y/%m/%d"];
const TIME_FORMATS: &[&str] = &["%H:%M:%S", "%H:%M"];

/// Whether `value` counts as absent.
#[must_use]
pub fn is_empty_value(value: &Value) -> bool {
    match value {
        Value::Null => true,
        Value::String(s) => s.is_empty(),
        Value::Array(items) => items.is_empty(),
        _ => false,
    }
}

/// Whether `value` conforms to `ty`.
#[must_use]
pub fn conforms(ty: ValueType, value: &Value) -> bool {
    match ty {
        ValueType::String => value.is_string(),
        ValueType::Number => value.as_f64().is_some_and(f64::is_finite),
        ValueType::Integer => is_integer(value),
        ValueType::Float => value.as_f64().is_some_and(f64::is_finite) && !is_integer(value),
        ValueType::Boolean => value.is_boolean(),
        ValueType::Array => value.is_array(),
        ValueType::Object => value.is_object(),
        ValueType::Date => is_date(value),
        ValueType::Email => matches_static(&EMAIL, value),
        ValueType::Url => matches_static(&URL, value),
        ValueType::Regexp => value.as_str().is_some_and(|s| Regex::new(s).is_ok()),
    }
}

fn is_integer(value: &Value) -> bool {
    value.is_i64()
        || value.is_u64()
        || value
            .as_f64()
            .is_some_and(|n| n.is_finite() && n.fract() == 0.0)
}

fn matches_static(re: &LazyLock<Option<Regex>>, value: &Value) -> bool {
    match (re.as_ref(), value.as_str()) {
        (Some(re), Some(s)) => re.is_match(s),
        _ => false,
    }
}

fn is_date(value: &Value) -> bool {
    match value {
        Value::Number(n) => n.as_f64().is_some_and(f64::is_finite),
        Value::String(s) => {
            let s = s.trim();
            DateTime::parse_from_rfc3339(s).is_ok()
                || DATETIME_FORMATS
                    .iter()
                    .any(|f| NaiveDateTime::parse_from_str(s, f).is_ok())
                || DATE_FORMATS
                    .iter()
                    .any(|f| NaiveDate::parse_from_str(s, f).is_ok())
                || TIME_FORMATS
                    .iter()
                    .any(|f| NaiveTime::parse_from_str(s, f).is_ok())
        }
        _ => false,
    }
}

/// The quantity `len`/`min`/`max` compare against.
///
/// The declared type chooses the measure; without one it is inferred from the
/// value. Types without a natural measure (booleans, objects, dates) skip
/// bounds checks.
#[must_use]
pub fn measure(ty: Option<ValueType>, value: &Value) -> Option<f64> {
    match ty {
        Some(t) if t.is_numeric() => value.as_f64(),
        Some(ValueType::String | ValueType::Email | ValueType::Url | ValueType::Regexp) => {
            value.as_str().map(char_len)
        }
        Some(ValueType::Array) => value.as_array().map(|items| items.len() as f64),
        Some(_) => None,
        None => match value {
            Value::Number(n) => n.as_f64(),
            Value::String(s) => Some(char_len(s)),
            Value::Array(items) => Some(items.len() as f64),
            _ => None,
        },
    }
}

fn char_len(s: &str) -> f64 {
    s.chars().count() as f64
}

/// Run the built-in checks of `rule` against `value`.
pub(crate) fn check_builtin(
    rule: &Rule,
    builtin: &BuiltinRule,
    value: &Value,
    path: &str,
) -> Result<(), ValidationError> {
    let fail = |code| ValidationError::new(code, rule.message().unwrap_or_default(), path);

    if is_empty_value(value) {
        return if rule.is_required() {
            Err(fail(ERROR_CODE_REQUIRED))
        } else {
            Ok(())
        };
    }

    if let Some(ty) = builtin.value_type
        && !conforms(ty, value)
    {
        return Err(fail(ERROR_CODE_TYPE));
    }

    if let Some(amount) = measure(builtin.value_type, value) {
        if let Some(len) = builtin.len {
            if amount != len {
                return Err(fail(ERROR_CODE_LEN));
            }
        } else if builtin.min.is_some_and(|min| amount < min)
            || builtin.max.is_some_and(|max| amount > max)
        {
            return Err(fail(ERROR_CODE_RANGE));
        }
    }

    // Patterns only apply to scalar text; numbers match their decimal form.
    if let Some(pattern) = &builtin.pattern {
        let text = match value {
            Value::String(s) => Some(s.clone()),
            Value::Number(n) => Some(n.to_string()),
            _ => None,
        };
        if text.is_some_and(|text| !pattern.is_match(&text)) {
            return Err(fail(ERROR_CODE_PATTERN));
        }
    }

    if builtin.whitespace && value.as_str().is_some_and(|s| s.trim().is_empty()) {
        return Err(fail(ERROR_CODE_WHITESPACE));
    }

    if let Some(allowed) = &builtin.one_of
        && !allowed.contains(value)
    {
        return Err(fail(ERROR_CODE_ENUM));
    }

    Ok(())
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
