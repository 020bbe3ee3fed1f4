//! Field-level checks shared by the request validators.

use lazy_static::lazy_static;
use regex::Regex;
use serde::Serialize;
use serde_json::Value;

/// Version of the consolidated request schemas.
pub const SCHEMA_VERSION: u32 = 1;

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FieldError {
    pub field: &'static str,
    pub rule: &'static str,
    pub message: String,
}

#[derive(Debug, Serialize, thiserror::Error)]
#[error("validation failed for {} field(s)", .errors.len())]
pub struct ValidationErrors {
    pub schema_version: u32,
    pub errors: Vec<FieldError>,
}

impl ValidationErrors {
    pub fn new() -> Self {
        Self {
            schema_version: SCHEMA_VERSION,
            errors: Vec::new(),
        }
    }

    pub fn add(&mut self, field: &'static str, rule: &'static str, message: impl Into<String>) {
        self.errors.push(FieldError {
            field,
            rule,
            message: message.into(),
        });
    }

    pub fn is_empty(&self) -> bool {
        self.errors.is_empty()
    }

    #[cfg(test)]
    pub fn has(&self, field: &str) -> bool {
        self.errors.iter().any(|e| e.field == field)
    }

    /// `Ok(value)` when nothing was recorded.
    pub fn finish<T>(self, value: T) -> Result<T, Self> {
        if self.is_empty() {
            Ok(value)
        } else {
            Err(self)
        }
    }
}

pub fn is_valid_email(email: &str) -> bool {
    lazy_static! {
        static ref EMAIL_RE: Regex = Regex::new(r"^[^@\s]+@[^@\s]+\.[^@\s]+$").unwrap();
    }
    EMAIL_RE.is_match(email)
}

/// Trims `value` and checks its length in characters.
pub fn string_field(
    errors: &mut ValidationErrors,
    field: &'static str,
    value: Option<&str>,
    min: usize,
    max: usize,
) -> Option<String> {
    let Some(raw) = value else {
        errors.add(field, "required", format!("The {field} field must be defined"));
        return None;
    };
    let trimmed = raw.trim();
    let len = trimmed.chars().count();
    if len < min.max(1) {
        if trimmed.is_empty() {
            errors.add(field, "required", format!("The {field} field must be defined"));
        } else {
            errors.add(
                field,
                "minLength",
                format!("The {field} field must have at least {min} characters"),
            );
        }
        return None;
    }
    if len > max {
        errors.add(
            field,
            "maxLength",
            format!("The {field} field must not be greater than {max} characters"),
        );
        return None;
    }
    Some(trimmed.to_string())
}

/// Trimmed, lower-cased email address.
pub fn email_field(
    errors: &mut ValidationErrors,
    field: &'static str,
    value: Option<&str>,
) -> Option<String> {
    let email = string_field(errors, field, value, 1, 255)?.to_lowercase();
    if !is_valid_email(&email) {
        errors.add(field, "email", format!("The {field} field must be a valid email address"));
        return None;
    }
    Some(email)
}

/// Parses a finite number from text, as found in CSV cells and form values.
pub fn parse_number(raw: &str) -> Option<f64> {
    raw.trim().parse::<f64>().ok().filter(|n| n.is_finite())
}

/// Accepts a JSON number or a numeric string.
pub fn number_field(
    errors: &mut ValidationErrors,
    field: &'static str,
    value: Option<&Value>,
) -> Option<f64> {
    let parsed = match value {
        None | Some(Value::Null) => {
            errors.add(field, "required", format!("The {field} field must be defined"));
            return None;
        }
        Some(Value::Number(n)) => n.as_f64().filter(|n| n.is_finite()),
        Some(Value::String(s)) => parse_number(s),
        Some(_) => None,
    };
    if parsed.is_none() {
        errors.add(field, "number", format!("The {field} field must be a number"));
    }
    parsed
}
