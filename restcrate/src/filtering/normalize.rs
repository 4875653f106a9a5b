//! Splits raw `filter` input into automatic and custom filters.

use serde_json::Value;
use std::collections::{BTreeMap, BTreeSet};

use crate::errors::ApiError;

// Basic safety limits
const MAX_FIELD_NAME_LENGTH: usize = 100;
const MAX_FIELD_VALUE_LENGTH: usize = 10_000;

/// A filter value, classified once from the raw request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FilterValue {
    /// `null`: the field must be NULL.
    Null,
    /// Plain value: equality.
    Scalar(String),
    /// Pipe-delimited string or JSON array: membership.
    List(Vec<String>),
    /// Explicit operators, in request order. A `None` value stands for `null`.
    Operators(Vec<(String, Option<String>)>),
}

impl FilterValue {
    /// Classify a raw JSON value. `split_pipes` turns `"a|b"` into a list.
    fn classify(field: &str, value: &Value, split_pipes: bool) -> Result<Self, String> {
        match value {
            Value::Null => Ok(Self::Null),
            Value::Array(items) => items
                .iter()
                .map(|item| scalar_text(field, item)?.ok_or_else(|| unsupported(field)))
                .collect::<Result<Vec<_>, _>>()
                .map(Self::List),
            Value::Object(map) => map
                .iter()
                .map(|(operator, item)| Ok((operator.clone(), scalar_text(field, item)?)))
                .collect::<Result<Vec<_>, String>>()
                .map(Self::Operators),
            scalar => {
                let text = scalar_text(field, scalar)?.unwrap_or_default();
                if split_pipes && text.contains('|') {
                    Ok(Self::List(text.split('|').map(str::to_string).collect()))
                } else {
                    Ok(Self::Scalar(text))
                }
            }
        }
    }

    /// Drop a redundant `{"=": v}` wrapper, keeping `v`.
    #[must_use]
    pub fn strip_equality(self) -> Self {
        match self {
            Self::Operators(operators) => {
                match operators.iter().find(|(operator, _)| operator == "=") {
                    Some((_, Some(value))) => Self::Scalar(value.clone()),
                    Some((_, None)) => Self::Null,
                    None => Self::Operators(operators),
                }
            }
            other => other,
        }
    }
}

/// Filters after normalization. The key sets of `auto` and `custom` are disjoint.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct NormalizedFilters {
    pub auto: BTreeMap<String, FilterValue>,
    pub custom: BTreeMap<String, FilterValue>,
}

impl NormalizedFilters {
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.auto.is_empty() && self.custom.is_empty()
    }
}

/// Basic field name validation
fn is_valid_field_name(field_name: &str) -> bool {
    !field_name.is_empty()
        && field_name.len() <= MAX_FIELD_NAME_LENGTH
        && !field_name.starts_with('_')
        && !field_name.contains("..")
}

fn unsupported(field: &str) -> String {
    format!("The filter.{field} field has an unsupported value.")
}

fn scalar_text(field: &str, value: &Value) -> Result<Option<String>, String> {
    let text = match value {
        Value::Null => return Ok(None),
        Value::String(s) => s.clone(),
        Value::Number(n) => n.to_string(),
        Value::Bool(b) => b.to_string(),
        Value::Array(_) | Value::Object(_) => return Err(unsupported(field)),
    };
    if text.len() > MAX_FIELD_VALUE_LENGTH {
        return Err(format!("The filter.{field} field is too long."));
    }
    Ok(Some(text))
}

/// Partition `raw` into automatic filters and cleaned custom filters.
///
/// Keys found in `custom_keys` are custom: their values are classified without pipe splitting and
/// `{"=": v}` collapses to `v`; any other operator map passes through untouched. Every other key is
/// automatic and pipe strings become lists.
///
/// # Errors
///
/// `ApiError::ValidationFailed` for unusable field names and for nested or oversized values.
pub fn normalize_filters(
    raw: &BTreeMap<String, Value>,
    custom_keys: &BTreeSet<String>,
) -> Result<NormalizedFilters, ApiError> {
    let mut normalized = NormalizedFilters::default();
    let mut errors = Vec::new();

    for (field, value) in raw {
        if !is_valid_field_name(field) {
            errors.push(format!("The filter field name '{field}' is invalid."));
            continue;
        }
        let is_custom = custom_keys.contains(field);
        match FilterValue::classify(field, value, !is_custom) {
            Ok(classified) if is_custom => {
                normalized
                    .custom
                    .insert(field.clone(), classified.strip_equality());
            }
            Ok(classified) => {
                normalized.auto.insert(field.clone(), classified);
            }
            Err(message) => errors.push(message),
        }
    }

    if errors.is_empty() {
        tracing::debug!(
            auto = normalized.auto.len(),
            custom = normalized.custom.len(),
            "Normalized filters"
        );
        Ok(normalized)
    } else {
        Err(ApiError::validation_failed(errors))
    }
}
