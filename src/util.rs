//! Lenient JSON input handling shared by the record payloads.
//!
//! Form clients send numbers as strings, empty strings for "nothing" and
//! the literal `"null"` for unset selects; these helpers fold all of that
//! into `Option`s.

use serde::{Deserialize, Deserializer};
use serde_json::Value;
use time::{Date, Month};

use crate::error::ApiError;

pub fn parse_float(value: &Value) -> Option<f64> {
    match value {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => {
            let t = s.trim();
            if t.is_empty() {
                None
            } else {
                t.parse::<f64>().ok().filter(|v| v.is_finite())
            }
        }
        Value::Bool(b) => Some(if *b { 1.0 } else { 0.0 }),
        _ => None,
    }
}

pub fn parse_id(value: &Value) -> Option<i64> {
    match value {
        Value::Number(n) => n
            .as_i64()
            .or_else(|| n.as_f64().filter(|f| f.fract() == 0.0).map(|f| f as i64)),
        Value::String(s) => {
            let t = s.trim();
            if t.is_empty() || t == "null" {
                None
            } else {
                t.parse::<i64>().ok()
            }
        }
        _ => None,
    }
}

pub fn parse_bool(value: &Value) -> Option<bool> {
    match value {
        Value::Bool(b) => Some(*b),
        Value::Number(n) => n.as_f64().map(|v| v != 0.0),
        Value::String(s) => match s.trim().to_ascii_lowercase().as_str() {
            "true" | "1" | "yes" | "on" => Some(true),
            "false" | "0" | "no" | "off" | "" => Some(false),
            _ => None,
        },
        _ => None,
    }
}

/// Query-string flag: `true/false`, `1/0`, `yes/no`, `on/off`.
pub fn parse_flag(raw: &str) -> Option<bool> {
    parse_bool(&Value::String(raw.to_string()))
}

fn value_to_text(value: Value) -> Option<String> {
    match value {
        Value::Null => None,
        Value::String(s) => Some(s),
        Value::Number(n) => Some(n.to_string()),
        Value::Bool(b) => Some(b.to_string()),
        _ => None,
    }
}

/// Trimmed text form of a JSON scalar; blank strings become `None`.
pub fn text_value(value: &Value) -> Option<String> {
    value_to_text(value.clone()).and_then(|s| trimmed(Some(&s)))
}

/// Numbers or numeric strings; anything else becomes `None`.
pub fn lenient_f64<'de, D>(deserializer: D) -> Result<Option<f64>, D::Error>
where
    D: Deserializer<'de>,
{
    let v = Value::deserialize(deserializer)?;
    Ok(parse_float(&v))
}

/// Integer ids, numeric strings, `""`, `"null"` or `null`.
pub fn lenient_id<'de, D>(deserializer: D) -> Result<Option<i64>, D::Error>
where
    D: Deserializer<'de>,
{
    let v = Value::deserialize(deserializer)?;
    Ok(parse_id(&v))
}

pub fn lenient_bool<'de, D>(deserializer: D) -> Result<Option<bool>, D::Error>
where
    D: Deserializer<'de>,
{
    let v = Value::deserialize(deserializer)?;
    Ok(parse_bool(&v))
}

/// Strings, with numbers and booleans stringified.
pub fn lenient_string<'de, D>(deserializer: D) -> Result<Option<String>, D::Error>
where
    D: Deserializer<'de>,
{
    let v = Value::deserialize(deserializer)?;
    Ok(value_to_text(v))
}

/// Non-negative integers or numeric strings; blanks and junk become `None`.
pub fn lenient_usize<'de, D>(deserializer: D) -> Result<Option<usize>, D::Error>
where
    D: Deserializer<'de>,
{
    let v = Value::deserialize(deserializer)?;
    Ok(parse_id(&v).and_then(|n| usize::try_from(n).ok()))
}

/// A list where `null` reads as empty.
pub fn null_as_empty<'de, D, T>(deserializer: D) -> Result<Vec<T>, D::Error>
where
    D: Deserializer<'de>,
    T: Deserialize<'de>,
{
    Ok(Option::<Vec<T>>::deserialize(deserializer)?.unwrap_or_default())
}

/// Trims and maps empty strings to `None`.
pub fn trimmed(value: Option<&str>) -> Option<String> {
    value
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
}

pub const INVOICE_STATUSES: [&str; 3] = ["draft", "sent", "paid"];

/// Lower-cases the status, maps the retired `overdue` onto `sent` and falls
/// back to `draft` for anything unknown.
pub fn normalize_status(value: Option<&str>) -> String {
    let raw = value.map(str::trim).filter(|s| !s.is_empty()).unwrap_or("draft");
    let mut v = raw.to_lowercase();
    if v == "overdue" {
        v = "sent".to_string();
    }
    if INVOICE_STATUSES.contains(&v.as_str()) {
        v
    } else {
        "draft".to_string()
    }
}

/// Parses the date part of `YYYY-MM-DD`, `YYYY-MM-DDTHH:MM:SS...` or
/// `YYYY-MM-DD HH:MM:SS`.
pub fn parse_iso_date(value: Option<&str>) -> Option<Date> {
    let s = value?.trim();
    let head = s.get(0..10)?;
    match s.as_bytes().get(10) {
        None | Some(b'T') | Some(b' ') => {}
        Some(_) => return None,
    }
    let mut parts = head.split('-');
    let year: i32 = parts.next()?.parse().ok()?;
    let month: u8 = parts.next()?.parse().ok()?;
    let day: u8 = parts.next()?.parse().ok()?;
    let month = Month::try_from(month).ok()?;
    Date::from_calendar_date(year, month, day).ok()
}

pub fn parse_date_param(name: &str, value: Option<&str>) -> Result<Option<Date>, ApiError> {
    match value.map(str::trim).filter(|s| !s.is_empty()) {
        None => Ok(None),
        Some(raw) => parse_iso_date(Some(raw))
            .map(Some)
            .ok_or_else(|| ApiError::bad_request(format!("Invalid {name} date: {raw}"))),
    }
}

pub fn format_ymd(d: Date) -> String {
    format!("{:04}-{:02}-{:02}", d.year(), u8::from(d.month()), d.day())
}

pub fn round2(v: f64) -> f64 {
    (v * 100.0).round() / 100.0
}
