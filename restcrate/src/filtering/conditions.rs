use sea_orm::{
    ColumnTrait, ColumnType, Condition, DatabaseBackend, EntityTrait, Value,
    sea_query::{Alias, BinOper, Expr, SimpleExpr},
};
use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

use super::normalize::FilterValue;
use crate::errors::ApiError;

/// Comparison operator accepted as a key of an operator-map filter.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FilterOperator {
    Eq,
    Ne,
    Gt,
    Gte,
    Lt,
    Lte,
    Like,
    NotLike,
}

impl FromStr for FilterOperator {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "=" => Ok(Self::Eq),
            "!=" | "<>" => Ok(Self::Ne),
            ">" => Ok(Self::Gt),
            ">=" => Ok(Self::Gte),
            "<" => Ok(Self::Lt),
            "<=" => Ok(Self::Lte),
            "like" => Ok(Self::Like),
            "not like" => Ok(Self::NotLike),
            other => Err(format!("unsupported filter operator '{other}'")),
        }
    }
}

impl fmt::Display for FilterOperator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Eq => "=",
            Self::Ne => "!=",
            Self::Gt => ">",
            Self::Gte => ">=",
            Self::Lt => "<",
            Self::Lte => "<=",
            Self::Like => "like",
            Self::NotLike => "not like",
        })
    }
}

/// Look up a client-supplied field name among the entity's columns.
///
/// # Errors
///
/// `ApiError::DataError` when the entity has no such column.
pub fn resolve_column<E: EntityTrait>(field: &str) -> Result<E::Column, ApiError> {
    E::Column::from_str(field)
        .map_err(|_| ApiError::data_error(format!("unknown column '{field}'")))
}

/// Convert a raw value into the column's type so it binds as a typed parameter.
///
/// # Errors
///
/// `ApiError::DataError` when the text does not parse as the column's type.
pub fn coerce_value<C: ColumnTrait>(column: C, raw: &str) -> Result<Value, ApiError> {
    let mismatch = |kind: &str| {
        ApiError::data_error(format!(
            "value '{raw}' is not a valid {kind} for column '{}'",
            column.as_str()
        ))
    };
    let trimmed = raw.trim();

    match column.def().get_column_type() {
        ColumnType::TinyInteger
        | ColumnType::SmallInteger
        | ColumnType::Integer
        | ColumnType::BigInteger
        | ColumnType::TinyUnsigned
        | ColumnType::SmallUnsigned
        | ColumnType::Unsigned
        | ColumnType::BigUnsigned => trimmed
            .parse::<i64>()
            .map(Value::from)
            .map_err(|_| mismatch("integer")),
        ColumnType::Float | ColumnType::Double | ColumnType::Decimal(_) | ColumnType::Money(_) => {
            trimmed
                .parse::<f64>()
                .map(Value::from)
                .map_err(|_| mismatch("number"))
        }
        ColumnType::Boolean => match trimmed.to_ascii_lowercase().as_str() {
            "1" | "true" => Ok(Value::from(true)),
            "0" | "false" => Ok(Value::from(false)),
            _ => Err(mismatch("boolean")),
        },
        ColumnType::Uuid => Uuid::parse_str(trimmed)
            .map(Value::from)
            .map_err(|_| mismatch("uuid")),
        _ => Ok(Value::from(raw.to_string())),
    }
}

fn is_text(column_type: &ColumnType) -> bool {
    matches!(
        column_type,
        ColumnType::String(_) | ColumnType::Text | ColumnType::Char(_)
    )
}

/// `column LIKE pattern`, casting non-text columns to text first.
#[must_use]
pub fn like_expr<C: ColumnTrait>(column: C, pattern: String, backend: DatabaseBackend) -> SimpleExpr {
    if is_text(column.def().get_column_type()) {
        return column.like(pattern);
    }
    let text_type = match backend {
        DatabaseBackend::MySql => "CHAR",
        _ => "TEXT",
    };
    Expr::expr(Expr::col((column.entity_name(), column)).cast_as(Alias::new(text_type)))
        .like(pattern)
}

/// Substring match that respects case on every backend.
///
/// `LIKE` folds ASCII case on SQLite and under MySQL's default collations, so SQLite uses
/// `GLOB` and MySQL compares the column as `BINARY`. Postgres `LIKE` is already case-sensitive.
#[must_use]
pub fn contains_case_sensitive<C: ColumnTrait>(
    column: C,
    term: &str,
    backend: DatabaseBackend,
) -> SimpleExpr {
    let column_expr = Expr::col((column.entity_name(), column));
    match backend {
        DatabaseBackend::Sqlite => {
            let text = if is_text(column.def().get_column_type()) {
                column_expr
            } else {
                Expr::expr(column_expr.cast_as(Alias::new("TEXT")))
            };
            text.binary(BinOper::Custom("GLOB"), Expr::val(glob_contains_pattern(term)))
        }
        DatabaseBackend::MySql => Expr::expr(column_expr.cast_as(Alias::new("BINARY")))
            .like(contains_pattern(term)),
        DatabaseBackend::Postgres => like_expr(column, contains_pattern(term), backend),
    }
}

/// Wrap a term for a substring match.
#[must_use]
pub fn contains_pattern(term: &str) -> String {
    format!("%{term}%")
}

/// `*term*` with the GLOB metacharacters of `term` matched literally.
fn glob_contains_pattern(term: &str) -> String {
    let mut pattern = String::with_capacity(term.len() + 2);
    pattern.push('*');
    for ch in term.chars() {
        match ch {
            '*' | '?' | '[' => {
                pattern.push('[');
                pattern.push(ch);
                pattern.push(']');
            }
            _ => pattern.push(ch),
        }
    }
    pattern.push('*');
    pattern
}

fn operator_expr<C: ColumnTrait>(
    column: C,
    operator: FilterOperator,
    value: Option<&str>,
    backend: DatabaseBackend,
) -> Result<SimpleExpr, ApiError> {
    let Some(raw) = value else {
        return match operator {
            FilterOperator::Eq => Ok(column.is_null()),
            FilterOperator::Ne => Ok(column.is_not_null()),
            _ => Err(ApiError::data_error(format!(
                "operator '{operator}' needs a value for column '{}'",
                column.as_str()
            ))),
        };
    };

    Ok(match operator {
        FilterOperator::Like => like_expr(column, raw.to_string(), backend),
        FilterOperator::NotLike => like_expr(column, raw.to_string(), backend).not(),
        FilterOperator::Eq => column.eq(coerce_value(column, raw)?),
        FilterOperator::Ne => column.ne(coerce_value(column, raw)?),
        FilterOperator::Gt => column.gt(coerce_value(column, raw)?),
        FilterOperator::Gte => column.gte(coerce_value(column, raw)?),
        FilterOperator::Lt => column.lt(coerce_value(column, raw)?),
        FilterOperator::Lte => column.lte(coerce_value(column, raw)?),
    })
}

/// Build the constraint for one automatic filter.
///
/// # Errors
///
/// `ApiError::DataError` for unknown columns, unknown operators and values that do not fit the
/// column's type.
pub fn filter_condition<E: EntityTrait>(
    field: &str,
    value: &FilterValue,
    backend: DatabaseBackend,
) -> Result<Condition, ApiError> {
    let column = resolve_column::<E>(field)?;

    let condition = match value {
        FilterValue::Null => Condition::all().add(column.is_null()),
        FilterValue::Scalar(raw) => Condition::all().add(column.eq(coerce_value(column, raw)?)),
        FilterValue::List(items) => {
            let values = items
                .iter()
                .map(|item| coerce_value(column, item))
                .collect::<Result<Vec<_>, _>>()?;
            Condition::all().add(column.is_in(values))
        }
        FilterValue::Operators(operators) => {
            let mut condition = Condition::all();
            for (operator, raw) in operators {
                let operator = operator
                    .parse::<FilterOperator>()
                    .map_err(ApiError::data_error)?;
                condition = condition.add(operator_expr(column, operator, raw.as_deref(), backend)?);
            }
            condition
        }
    };
    Ok(condition)
}

/// AND together every automatic filter.
///
/// # Errors
///
/// The first failing filter's error.
pub fn auto_filter_condition<E: EntityTrait>(
    filters: &BTreeMap<String, FilterValue>,
    backend: DatabaseBackend,
) -> Result<Condition, ApiError> {
    filters
        .iter()
        .try_fold(Condition::all(), |condition, (field, value)| {
            Ok(condition.add(filter_condition::<E>(field, value, backend)?))
        })
}
