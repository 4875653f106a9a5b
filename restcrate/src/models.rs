use serde_json::{Map, Value};
use std::collections::BTreeMap;
use url::form_urlencoded;

use crate::core::traits::{MAX_PER_PAGE, SortDirection};
use crate::errors::ApiError;
use crate::filtering::pagination::PageRequest;
use crate::filtering::search::SearchInput;

/// Query parameters for listing resources.
///
/// # Filtering
/// `filter` maps a field name to a value:
/// - scalar: `filter[code]=A12` (equality)
/// - pipe list: `filter[code]=A12|B7` (membership)
/// - operator map: `filter[quantity][>]=3&filter[quantity][<=]=10`
/// - JSON object: `filter={"code":"A12","quantity":{">":3}}`
///
/// # Search
/// - `q=bolt` matches any searchable field
/// - `q[]=bolt&q[]=steel` requires every term to match some searchable field
/// - `q={"or":["{\"code\":\"A\"}","{\"code\":\"B\"}"]}` ORs field-specific groups
///
/// # Pagination
/// `page` (1-based) and `per_page` (1 to 250, default 25).
///
/// # Sorting
/// `sort_by=created_at&order=asc`
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ListParams {
    pub per_page: Option<i64>,
    pub page: Option<i64>,
    pub filter: BTreeMap<String, Value>,
    pub sort_by: Option<String>,
    pub order: Option<String>,
    pub q: Option<SearchInput>,
}

/// Validated sort request. `column` is `None` when neither the request nor the resource names one.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValidatedSort {
    pub column: Option<String>,
    pub direction: Option<SortDirection>,
}

impl ListParams {
    /// Decode a raw `application/x-www-form-urlencoded` query string.
    ///
    /// Unknown keys are ignored. Empty values count as absent.
    ///
    /// # Errors
    ///
    /// Returns `ApiError::ValidationFailed` when `per_page` or `page` is not an integer or `filter`
    /// is not a JSON object.
    pub fn from_query(query: &str) -> Result<Self, ApiError> {
        let mut params = Self::default();
        let mut errors = Vec::new();
        let mut terms: Vec<String> = Vec::new();

        for (key, value) in form_urlencoded::parse(query.as_bytes()) {
            let (base, path) = split_brackets(&key);
            match (base, path.as_slice()) {
                ("per_page", []) => params.per_page = parse_int("per_page", &value, &mut errors),
                ("page", []) => params.page = parse_int("page", &value, &mut errors),
                ("sort_by", []) if !value.is_empty() => params.sort_by = Some(value.into_owned()),
                ("order", []) if !value.is_empty() => params.order = Some(value.into_owned()),
                ("q", []) if !value.is_empty() => {
                    params.q = Some(SearchInput::Term(value.into_owned()));
                }
                ("q", [_]) => terms.push(value.into_owned()),
                ("filter", []) if !value.is_empty() => {
                    match serde_json::from_str::<Map<String, Value>>(&value) {
                        Ok(object) => params.filter.extend(object),
                        Err(_) => errors.push("The filter field must be an array.".to_string()),
                    }
                }
                ("filter", [field, rest @ ..]) if !field.is_empty() => {
                    insert_filter(&mut params.filter, field, rest, value.into_owned());
                }
                _ => {}
            }
        }

        if !terms.is_empty() {
            params.q = Some(SearchInput::Terms(terms));
        }

        if errors.is_empty() {
            Ok(params)
        } else {
            Err(ApiError::validation_failed(errors))
        }
    }

    /// Check the page parameters against their bounds.
    ///
    /// # Errors
    ///
    /// `per_page` outside `1..=250` or `page` below 1.
    pub fn page_request(&self, default_per_page: u64) -> Result<PageRequest, ApiError> {
        let mut errors = Vec::new();
        let per_page = match self.per_page {
            None => default_per_page,
            Some(n) if n < 1 => {
                errors.push("The per_page field must be at least 1.".to_string());
                default_per_page
            }
            Some(n) if n.unsigned_abs() > MAX_PER_PAGE => {
                errors.push(format!(
                    "The per_page field must not be greater than {MAX_PER_PAGE}."
                ));
                default_per_page
            }
            Some(n) => n.unsigned_abs(),
        };
        let page = match self.page {
            None => 1,
            Some(n) if n < 1 => {
                errors.push("The page field must be at least 1.".to_string());
                1
            }
            Some(n) => n.unsigned_abs(),
        };

        if errors.is_empty() {
            Ok(PageRequest { page, per_page })
        } else {
            Err(ApiError::validation_failed(errors))
        }
    }

    /// Parse the `order` parameter.
    ///
    /// # Errors
    ///
    /// `order` other than `asc` or `desc`.
    pub fn sort_direction(&self) -> Result<Option<SortDirection>, ApiError> {
        self.order
            .as_deref()
            .map(str::parse::<SortDirection>)
            .transpose()
            .map_err(|_| ApiError::invalid_parameter("The selected order is invalid."))
    }

    /// Run every parameter check at once so the client sees all problems together.
    ///
    /// # Errors
    ///
    /// Aggregated `ApiError::ValidationFailed`.
    pub fn validate(&self, default_per_page: u64) -> Result<(PageRequest, ValidatedSort), ApiError> {
        let page = self.page_request(default_per_page);
        let direction = self.sort_direction();
        match (page, direction) {
            (Ok(page), Ok(direction)) => Ok((
                page,
                ValidatedSort {
                    column: self.sort_by.clone().filter(|c| !c.is_empty()),
                    direction,
                },
            )),
            (page, direction) => {
                let mut errors = Vec::new();
                for err in [page.err(), direction.err()].into_iter().flatten() {
                    if let ApiError::ValidationFailed { errors: e } = err {
                        errors.extend(e);
                    }
                }
                Err(ApiError::validation_failed(errors))
            }
        }
    }
}

fn parse_int(name: &str, value: &str, errors: &mut Vec<String>) -> Option<i64> {
    if value.is_empty() {
        return None;
    }
    if let Ok(n) = value.trim().parse::<i64>() {
        Some(n)
    } else {
        errors.push(format!("The {name} field must be an integer."));
        None
    }
}

/// Split `filter[code][>]` into `("filter", ["code", ">"])`.
fn split_brackets(key: &str) -> (&str, Vec<&str>) {
    let Some(open) = key.find('[') else {
        return (key, Vec::new());
    };
    let base = &key[..open];
    let mut segments = Vec::new();
    let mut rest = &key[open..];
    while let Some(stripped) = rest.strip_prefix('[') {
        let Some(close) = stripped.find(']') else {
            break;
        };
        segments.push(&stripped[..close]);
        rest = &stripped[close + 1..];
    }
    (base, segments)
}

fn insert_filter(filter: &mut BTreeMap<String, Value>, field: &str, rest: &[&str], value: String) {
    match rest {
        [] => {
            filter.insert(field.to_string(), Value::String(value));
        }
        [""] => {
            let entry = filter
                .entry(field.to_string())
                .or_insert_with(|| Value::Array(Vec::new()));
            if let Value::Array(items) = entry {
                items.push(Value::String(value));
            } else {
                *entry = Value::Array(vec![Value::String(value)]);
            }
        }
        [operator, ..] => {
            let entry = filter
                .entry(field.to_string())
                .or_insert_with(|| Value::Object(Map::new()));
            if !entry.is_object() {
                *entry = Value::Object(Map::new());
            }
            if let Value::Object(map) = entry {
                map.insert((*operator).to_string(), Value::String(value));
            }
        }
    }
}
