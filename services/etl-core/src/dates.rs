//! Resolution of ambiguously-represented timestamps.
//!
//! The source emits the same logical field as epoch seconds, ISO-8601
//! text or day-first locale text, with no marker saying which. The
//! resolver tries candidate interpretations in a fixed order and returns
//! the first success; every failure path ends in `None`, never an error.

use chrono::{DateTime, NaiveDate, NaiveDateTime, NaiveTime, TimeZone, Utc};
use serde_json::Value;
use tracing::warn;

const ISO_DATETIME_FORMATS: &[&str] = &["%Y-%m-%dT%H:%M:%S%.f", "%Y-%m-%d %H:%M:%S%.f"];

const DAYFIRST_DATETIME_FORMATS: &[&str] = &["%d/%m/%Y %H:%M:%S", "%d-%m-%Y %H:%M:%S"];
const DAYFIRST_DATE_FORMATS: &[&str] = &["%d/%m/%Y", "%d-%m-%Y", "%d.%m.%Y"];

/// Resolves a transaction timestamp of unknown representation.
///
/// Candidate order: missing → epoch seconds → ISO-8601 → day-first
/// locale text. `context` identifies the consuming record in warnings
/// (e.g. `sale_id=7`).
pub fn resolve_instant(value: Option<&Value>, context: &str) -> Option<DateTime<Utc>> {
    match value? {
        Value::Null => None,
        Value::Number(n) => {
            let secs = n.as_f64()?;
            let resolved = from_epoch_seconds(secs);
            if resolved.is_none() {
                warn!("Falha ao converter timestamp: {n} | {context}");
            }
            resolved
        }
        Value::String(s) => {
            let t = s.trim();
            if t.is_empty() {
                return None;
            }
            if t.chars().all(|c| c.is_ascii_digit()) {
                let resolved = t.parse::<i64>().ok().and_then(|secs| from_epoch_seconds(secs as f64));
                if resolved.is_none() {
                    warn!("Falha ao converter timestamp: {t} | {context}");
                }
                return resolved;
            }
            if t.chars().take(4).all(|c| c.is_ascii_digit()) && t.chars().count() >= 4 {
                if let Some(instant) = parse_iso(t) {
                    return Some(instant);
                }
                // ISO-looking but unparseable: fall through to the locale attempt
            }
            match parse_dayfirst(t) {
                Some(instant) => Some(instant),
                None => {
                    warn!("Data inválida ignorada: {t} | {context}");
                    None
                }
            }
        }
        other => {
            warn!("Data inválida ignorada: {other} | {context}");
            None
        }
    }
}

fn from_epoch_seconds(secs: f64) -> Option<DateTime<Utc>> {
    if !secs.is_finite() {
        return None;
    }
    DateTime::from_timestamp(secs as i64, 0)
}

fn parse_iso(text: &str) -> Option<DateTime<Utc>> {
    if let Ok(parsed) = DateTime::parse_from_rfc3339(text) {
        return Some(parsed.with_timezone(&Utc));
    }
    for format in ISO_DATETIME_FORMATS {
        if let Ok(naive) = NaiveDateTime::parse_from_str(text, format) {
            return Some(Utc.from_utc_datetime(&naive));
        }
    }
    if let Ok(date) = NaiveDate::parse_from_str(text, "%Y-%m-%d") {
        return Some(Utc.from_utc_datetime(&date.and_time(NaiveTime::MIN)));
    }
    None
}

fn parse_dayfirst(text: &str) -> Option<DateTime<Utc>> {
    for format in DAYFIRST_DATETIME_FORMATS {
        if let Ok(naive) = NaiveDateTime::parse_from_str(text, format) {
            return Some(Utc.from_utc_datetime(&naive));
        }
    }
    for format in DAYFIRST_DATE_FORMATS {
        if let Ok(date) = NaiveDate::parse_from_str(text, format) {
            return Some(Utc.from_utc_datetime(&date.and_time(NaiveTime::MIN)));
        }
    }
    None
}

/// Plain calendar-date normalization for dimension columns (`birthdate`,
/// `createdAt`): ISO datetime or bare date, anything else `None`.
pub fn normalize_date(value: Option<&Value>) -> Option<NaiveDate> {
    let Value::String(s) = value? else {
        return None;
    };
    let t = s.trim();
    if t.is_empty() {
        return None;
    }
    parse_iso(t).map(|instant| instant.date_naive())
}

// =============================================================================
// TESTS
// =============================================================================
