//! Input sanitisation and field validation for record payloads.

use std::sync::OnceLock;

use regex::Regex;
use serde_json::{Map, Value};

fn email_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"^[a-zA-Z0-9._%+-]+@[a-zA-Z0-9.-]+\.[a-zA-Z]{2,}$").expect("valid email regex")
    })
}

fn phone_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"^[\d\s\-()+]+$").expect("valid phone regex"))
}

fn tag_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"<[^>]+>").expect("valid tag regex"))
}

fn js_scheme_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"(?i)javascript:").expect("valid scheme regex"))
}

fn handler_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"(?i)on\w+\s*=").expect("valid handler regex"))
}

/// Trims, truncates to `max_length` characters and, unless `allow_empty`,
/// turns empty results into `None`.
pub fn sanitize_string(
    value: Option<&str>,
    max_length: Option<usize>,
    allow_empty: bool,
) -> Option<String> {
    let sanitized = value?.trim();
    if sanitized.is_empty() {
        return if allow_empty { Some(String::new()) } else { None };
    }
    match max_length {
        Some(max) if max > 0 && sanitized.chars().count() > max => {
            Some(sanitized.chars().take(max).collect())
        }
        _ => Some(sanitized.to_string()),
    }
}

pub fn validate_email(email: &str) -> bool {
    !email.is_empty() && email_re().is_match(email)
}

/// Empty phones are valid; otherwise common punctuation and at least 7 digits.
pub fn validate_phone(phone: &str) -> bool {
    if phone.is_empty() {
        return true;
    }
    if !phone_re().is_match(phone) {
        return false;
    }
    phone.chars().filter(|c| c.is_ascii_digit()).count() >= 7
}

pub fn sanitize_html(text: &str) -> String {
    let text = tag_re().replace_all(text, "");
    let text = js_scheme_re().replace_all(&text, "");
    handler_re().replace_all(&text, "").into_owned()
}

pub fn sanitize_html_opt(text: Option<String>) -> Option<String> {
    text.map(|t| sanitize_html(&t))
}

pub fn validate_positive_float(value: &Value, field_name: &str) -> Result<f64, String> {
    match crate::util::parse_float(value) {
        Some(v) if v > 0.0 => Ok(v),
        Some(_) => Err(format!("{field_name} must be greater than zero")),
        None => Err(format!("{field_name} must be a valid number")),
    }
}

pub fn validate_required_fields(data: &Map<String, Value>, required: &[&str]) -> Result<(), String> {
    let missing: Vec<&str> = required
        .iter()
        .copied()
        .filter(|field| match data.get(*field) {
            None | Some(Value::Null) => true,
            Some(Value::String(s)) => s.trim().is_empty(),
            Some(_) => false,
        })
        .collect();

    if missing.is_empty() {
        Ok(())
    } else {
        Err(format!("Required fields missing or empty: {}", missing.join(", ")))
    }
}

pub fn validate_string_length(
    value: &str,
    min_length: usize,
    max_length: Option<usize>,
    field_name: &str,
) -> Result<(), String> {
    if value.is_empty() {
        if min_length > 0 {
            return Err(format!("{field_name} is required"));
        }
        return Ok(());
    }
    let len = value.chars().count();
    if len < min_length {
        return Err(format!("{field_name} must be at least {min_length} characters"));
    }
    if let Some(max) = max_length {
        if max > 0 && len > max {
            return Err(format!("{field_name} must not exceed {max} characters"));
        }
    }
    Ok(())
}

/// Unwraps a JSON body that must be an object.
pub fn require_object(body: Value) -> Result<Map<String, Value>, String> {
    match body {
        Value::Object(map) => Ok(map),
        _ => Err("Request body must be a JSON object".to_string()),
    }
}

/// Email and phone checks shared by customers and vendors.
pub fn validate_contact(email: &str, phone: Option<&str>) -> Result<(), String> {
    if !validate_email(email) {
        return Err("Invalid email address".to_string());
    }
    if let Some(p) = phone {
        if !validate_phone(p.trim()) {
            return Err("Invalid phone number".to_string());
        }
    }
    Ok(())
}
