use heck::ToSnakeCase;
use sea_orm::{
    EntityTrait, IdenStatic, Iterable, PrimaryKeyToColumn, QueryOrder, Select, sea_query::Order,
};

use super::conditions::resolve_column;
use crate::core::traits::{DefaultSort, SortDirection};
use crate::errors::ApiError;
use crate::models::ValidatedSort;

/// Sort column and direction chosen for a request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ResolvedSort<C> {
    pub column: C,
    pub direction: SortDirection,
}

/// Pick the sort column: the request's `sort_by`, else the resource default. The name is
/// snake-cased, so `createdAt` selects `created_at`.
///
/// Direction falls back from the request to the resource default to `desc`.
///
/// # Errors
///
/// `ApiError::DataError` when the name matches no column.
pub fn resolve_sort<E: EntityTrait>(
    requested: &ValidatedSort,
    default: Option<&DefaultSort>,
) -> Result<Option<ResolvedSort<E::Column>>, ApiError> {
    let Some(key) = requested
        .column
        .as_deref()
        .or_else(|| default.map(|d| d.key.as_str()))
        .filter(|key| !key.is_empty())
    else {
        return Ok(None);
    };

    let column = resolve_column::<E>(&key.to_snake_case())?;
    let direction = requested
        .direction
        .or_else(|| default.and_then(|d| d.order))
        .unwrap_or_default();

    Ok(Some(ResolvedSort { column, direction }))
}

/// Order the query, then by primary key so pages never overlap on ties.
///
/// With no resolved sort the query is left unordered; declare a default sort on resources that
/// need repeatable ordering.
#[must_use]
pub fn apply_sort<E: EntityTrait>(
    mut select: Select<E>,
    sort: Option<ResolvedSort<E::Column>>,
) -> Select<E> {
    let Some(ResolvedSort { column, direction }) = sort else {
        return select;
    };
    select = select.order_by(column, Order::from(direction));
    for key in E::PrimaryKey::iter() {
        let key_column = key.into_column();
        if key_column.as_str() != column.as_str() {
            select = select.order_by(key_column, Order::Asc);
        }
    }
    select
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::part;
    use sea_orm::{DatabaseBackend, QueryTrait};

    fn requested(column: Option<&str>, direction: Option<SortDirection>) -> ValidatedSort {
        ValidatedSort {
            column: column.map(str::to_string),
            direction,
        }
    }

    fn sql(sort: Option<ResolvedSort<part::Column>>) -> String {
        apply_sort(part::Entity::find(), sort)
            .build(DatabaseBackend::Sqlite)
            .to_string()
    }

    #[test]
    fn test_request_wins_over_default() {
        let default = DefaultSort::new("code", SortDirection::Asc);
        let sort = resolve_sort::<part::Entity>(
            &requested(Some("priceUnit"), Some(SortDirection::Desc)),
            Some(&default),
        )
        .unwrap()
        .unwrap();
        assert_eq!(sort.column.as_str(), "price_unit");
        assert_eq!(sort.direction, SortDirection::Desc);
    }

    #[test]
    fn test_default_direction_applies_to_requested_column() {
        let default = DefaultSort::new("code", SortDirection::Asc);
        let sort = resolve_sort::<part::Entity>(&requested(Some("quantity"), None), Some(&default))
            .unwrap()
            .unwrap();
        assert_eq!(sort.column.as_str(), "quantity");
        assert_eq!(sort.direction, SortDirection::Asc);
    }

    #[test]
    fn test_falls_back_to_desc() {
        let sort = resolve_sort::<part::Entity>(&requested(Some("code"), None), None)
            .unwrap()
            .unwrap();
        assert_eq!(sort.direction, SortDirection::Desc);
    }

    #[test]
    fn test_no_column_is_noop() {
        let sort = resolve_sort::<part::Entity>(&requested(None, Some(SortDirection::Asc)), None)
            .unwrap();
        assert!(sort.is_none());
        assert!(!sql(None).contains("ORDER BY"));
    }

    #[test]
    fn test_unknown_column_is_data_error() {
        let result = resolve_sort::<part::Entity>(&requested(Some("nope"), None), None);
        assert!(matches!(result, Err(ApiError::DataError { .. })));
    }

    #[test]
    fn test_primary_key_tie_breaker() {
        let by_quantity = sql(Some(ResolvedSort {
            column: part::Column::Quantity,
            direction: SortDirection::Desc,
        }));
        assert!(
            by_quantity.ends_with(r#"ORDER BY "parts"."quantity" DESC, "parts"."id" ASC"#),
            "{by_quantity}"
        );

        // sorting on the key itself adds nothing
        let by_id = sql(Some(ResolvedSort {
            column: part::Column::Id,
            direction: SortDirection::Asc,
        }));
        assert!(by_id.ends_with(r#"ORDER BY "parts"."id" ASC"#), "{by_id}");
    }
}
