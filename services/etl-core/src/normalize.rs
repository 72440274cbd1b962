//! Field-level coercion into the analytical column types.
//!
//! Every function here is total over a raw field value: bad input becomes
//! `None` (or a sentinel), never an error. Accessors take `Option<&Value>`
//! so callers can pass `obj.get("field")` directly; an absent field is
//! treated the same as an explicit null.

use serde_json::Value;

/// Text forms that mean "missing" once a value has been string-coerced
/// upstream (stringified NaN/None/null and bare whitespace).
fn is_missing_text(s: &str) -> bool {
    s.is_empty()
        || s.eq_ignore_ascii_case("nan")
        || s.eq_ignore_ascii_case("none")
        || s.eq_ignore_ascii_case("null")
}

fn value_to_text(value: &Value) -> Option<String> {
    match value {
        Value::String(s) => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        Value::Bool(b) => Some(b.to_string()),
        _ => None,
    }
}

/// Trimmed text, with missing-value sentinels normalized to `None`.
pub fn normalize_text(value: Option<&Value>) -> Option<String> {
    let s = value_to_text(value?)?;
    let t = s.trim();
    if is_missing_text(t) {
        None
    } else {
        Some(t.to_string())
    }
}

/// Display fields: trimmed and title-cased.
pub fn normalize_display(value: Option<&Value>) -> Option<String> {
    normalize_text(value).map(|s| title_case(&s))
}

/// Identifier fields (email): trimmed and lower-cased.
pub fn normalize_identifier(value: Option<&Value>) -> Option<String> {
    normalize_text(value).map(|s| s.to_lowercase())
}

/// Code fields (sku): trimmed and upper-cased.
pub fn normalize_code(value: Option<&Value>) -> Option<String> {
    normalize_text(value).map(|s| s.to_uppercase())
}

/// Uppercases the first letter of each word and lowercases the rest.
/// Word boundaries are non-alphabetic characters.
pub fn title_case(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    let mut prev_alpha = false;
    for c in s.chars() {
        if c.is_alphabetic() {
            if prev_alpha {
                out.extend(c.to_lowercase());
            } else {
                out.extend(c.to_uppercase());
            }
            prev_alpha = true;
        } else {
            out.push(c);
            prev_alpha = false;
        }
    }
    out
}

/// Numeric coercion: invalid input becomes `None`, never an error.
pub fn coerce_f64(value: Option<&Value>) -> Option<f64> {
    let parsed = match value? {
        Value::Number(n) => n.as_f64(),
        Value::Bool(b) => Some(if *b { 1.0 } else { 0.0 }),
        Value::String(s) => s.trim().parse::<f64>().ok(),
        _ => None,
    };
    parsed.filter(|v| v.is_finite())
}

/// Integral coercion for key columns. A float with a fractional part is
/// not a valid key.
pub fn coerce_i64(value: Option<&Value>) -> Option<i64> {
    match value? {
        Value::Number(n) => n
            .as_i64()
            .or_else(|| n.as_f64().filter(|f| f.is_finite() && f.fract() == 0.0).map(|f| f as i64)),
        Value::String(s) => s.trim().parse::<i64>().ok(),
        _ => None,
    }
}

/// Bounded numeric: values outside the closed range become `None` without
/// rejecting the row.
pub fn normalize_bounded(value: Option<&Value>, min: f64, max: f64) -> Option<f64> {
    coerce_f64(value).filter(|v| (min..=max).contains(v))
}

pub const GENDER_UNKNOWN: &str = "unknown";

/// Enumerated gender: case-sensitive membership in {male, female},
/// anything else (null included) collapses to the sentinel.
pub fn normalize_gender(value: Option<&Value>) -> String {
    match value {
        Some(Value::String(s)) if s == "male" || s == "female" => s.clone(),
        _ => GENDER_UNKNOWN.to_string(),
    }
}

// =============================================================================
// TESTS
// =============================================================================
