//! Payload Validation
//!
//! Declarative per-field rules for store/update bodies. Controllers call
//! [`PayloadRules::validate`] from `ResourceController::validate_payload`.
//!
//! # Example
//!
//! ```rust,ignore
//! use restcrate::validation::{FieldRule, PayloadRules};
//!
//! let rules = PayloadRules::new()
//!     .field("code", [FieldRule::Required, FieldRule::MaxLength(32)])
//!     .field("quantity", [FieldRule::Integer { min: Some(0), max: None }]);
//!
//! rules.validate(&payload, false)?;
//! ```

use serde::Serialize;
use serde_json::{Map, Value};
use std::fmt;

use crate::errors::ApiError;

/// Validation error with field name and message
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ValidationError {
    /// The field that failed validation
    pub field: String,
    /// Human-readable error message
    pub message: String,
}

impl ValidationError {
    #[must_use]
    pub fn new(field: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            field: field.into(),
            message: message.into(),
        }
    }
}

impl fmt::Display for ValidationError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "The {} field {}.", self.field, self.message)
    }
}

/// Collection of validation errors
#[derive(Debug, Clone, Default, Serialize)]
pub struct ValidationErrors {
    errors: Vec<ValidationError>,
}

impl ValidationErrors {
    pub fn add(&mut self, error: ValidationError) {
        self.errors.push(error);
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.errors.is_empty()
    }

    #[must_use]
    pub fn errors(&self) -> &[ValidationError] {
        &self.errors
    }

    /// `Ok(())` when nothing was collected, else a 422 carrying every message.
    ///
    /// # Errors
    ///
    /// `ApiError::ValidationFailed` when at least one error was added.
    pub fn result(self) -> Result<(), ApiError> {
        if self.is_empty() {
            Ok(())
        } else {
            Err(ApiError::validation_failed(
                self.errors.iter().map(ToString::to_string).collect(),
            ))
        }
    }
}

/// A single constraint on a payload field.
#[derive(Debug, Clone, PartialEq)]
pub enum FieldRule {
    /// Must be present and not null or blank. Skipped for partial (update) payloads.
    Required,
    /// Must be a string of at most this many characters.
    MaxLength(usize),
    Integer { min: Option<i64>, max: Option<i64> },
    Numeric { min: Option<f64>, max: Option<f64> },
    Boolean,
}

impl FieldRule {
    fn check(&self, value: &Value) -> Result<(), String> {
        match self {
            Self::Required => match value {
                Value::Null => Err("is required".to_string()),
                Value::String(s) if s.trim().is_empty() => Err("is required".to_string()),
                _ => Ok(()),
            },
            Self::MaxLength(max) => match value {
                Value::String(s) if s.chars().count() > *max => {
                    Err(format!("must not be greater than {max} characters"))
                }
                Value::String(_) | Value::Null => Ok(()),
                _ => Err("must be a string".to_string()),
            },
            Self::Integer { min, max } => {
                let Some(n) = value.as_i64() else {
                    return Err("must be an integer".to_string());
                };
                check_bounds(n, *min, *max)
            }
            Self::Numeric { min, max } => {
                let Some(n) = value.as_f64() else {
                    return Err("must be a number".to_string());
                };
                check_bounds(n, *min, *max)
            }
            Self::Boolean => {
                if value.is_boolean() {
                    Ok(())
                } else {
                    Err("must be true or false".to_string())
                }
            }
        }
    }
}

fn check_bounds<T: PartialOrd + fmt::Display>(
    value: T,
    min: Option<T>,
    max: Option<T>,
) -> Result<(), String> {
    if let Some(min) = min
        && value < min
    {
        return Err(format!("must be at least {min}"));
    }
    if let Some(max) = max
        && value > max
    {
        return Err(format!("must not be greater than {max}"));
    }
    Ok(())
}

/// Ordered field rules for one resource.
#[derive(Debug, Clone, Default)]
pub struct PayloadRules {
    fields: Vec<(String, Vec<FieldRule>)>,
}

impl PayloadRules {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn field(mut self, name: impl Into<String>, rules: impl IntoIterator<Item = FieldRule>) -> Self {
        self.fields.push((name.into(), rules.into_iter().collect()));
        self
    }

    /// Check `payload` against every rule. With `partial`, absent fields are not checked at all,
    /// so an update may send only what changes.
    ///
    /// # Errors
    ///
    /// `ApiError::ValidationFailed` listing the first failing rule of each field.
    pub fn validate(&self, payload: &Map<String, Value>, partial: bool) -> Result<(), ApiError> {
        let mut errors = ValidationErrors::default();
        for (field, rules) in &self.fields {
            let value = payload.get(field);
            if value.is_none() && partial {
                continue;
            }
            let value = value.unwrap_or(&Value::Null);
            for rule in rules {
                // only `Required` cares about a missing value
                if value.is_null() && *rule != FieldRule::Required {
                    continue;
                }
                if let Err(message) = rule.check(value) {
                    errors.add(ValidationError::new(field.as_str(), message));
                    break;
                }
            }
        }
        errors.result()
    }
}
