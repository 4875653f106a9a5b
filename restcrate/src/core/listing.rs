use sea_orm::{ConnectionTrait, DatabaseBackend, DatabaseConnection, EntityTrait, Select};
use serde_json::Value;

use crate::errors::ApiError;
use crate::filtering::{
    NormalizedFilters, PagedResult, RequestContext, apply_condition, apply_sort,
    auto_filter_condition, fetch_page, normalize_filters, resolve_sort, search_condition,
};
use crate::models::{ListParams, ValidatedSort};
use crate::operations::ResourceController;

/// Qualify `select` in the fixed order: search, automatic filters, custom filters, collection
/// scope, sort. Nothing is executed.
///
/// # Errors
///
/// `ApiError::DataError` for unknown columns or values that do not fit them, plus whatever the
/// controller hooks return.
pub fn qualify<C>(
    controller: &C,
    select: Select<C::Entity>,
    params: &ListParams,
    filters: &NormalizedFilters,
    sort: &ValidatedSort,
    backend: DatabaseBackend,
    ctx: &RequestContext,
) -> Result<Select<C::Entity>, ApiError>
where
    C: ResourceController + ?Sized,
{
    let config = controller.config();

    let search =
        search_condition::<C::Entity>(params.q.as_ref(), config.searchable_fields(), backend)?;
    let select = apply_condition(select, search);

    let auto = auto_filter_condition::<C::Entity>(&filters.auto, backend)?;
    let select = apply_condition(select, Some(auto));

    let select = controller.qualify_with_custom_filters(select, &filters.custom, ctx)?;
    let select = controller.qualify_collection_query(select, ctx)?;

    let sort = resolve_sort::<C::Entity>(sort, config.default_sort())?;
    Ok(apply_sort(select, sort))
}

/// The index operation: validate, normalize, qualify, execute and transform one page.
///
/// Invalid parameters are rejected before any query is built. Execution stops with
/// `ApiError::Cancelled` when the context's token fires or its deadline passes.
///
/// # Errors
///
/// `ApiError::ValidationFailed`, `ApiError::DataError`, `ApiError::Cancelled`, or an error from a
/// controller hook.
pub async fn list_entities<C>(
    controller: &C,
    db: &DatabaseConnection,
    params: &ListParams,
    ctx: &RequestContext,
) -> Result<PagedResult<Value>, ApiError>
where
    C: ResourceController + ?Sized,
{
    let config = controller.config();
    let (page, sort) = params.validate(config.per_page())?;
    let filters = normalize_filters(&params.filter, config.custom_filter_keys())?;

    tracing::debug!(
        resource = config.name(),
        page = page.page,
        per_page = page.per_page,
        search = params.q.is_some(),
        "Listing resources"
    );

    let select = qualify(
        controller,
        C::Entity::find(),
        params,
        &filters,
        &sort,
        db.get_database_backend(),
        ctx,
    )?;

    fetch_page(db, select, page, ctx)
        .await?
        .try_map(|model| controller.transform(model))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::traits::{ResourceConfig, SortDirection};
    use crate::filtering::FilterValue;
    use crate::test_support::part;
    use sea_orm::{ColumnTrait, QueryFilter, QueryTrait};
    use std::collections::BTreeMap;

    struct Parts {
        config: ResourceConfig<part::Entity>,
    }

    impl ResourceController for Parts {
        type Model = part::Model;
        type Entity = part::Entity;
        type ActiveModel = part::ActiveModel;

        fn config(&self) -> &ResourceConfig<part::Entity> {
            &self.config
        }

        fn qualify_with_custom_filters(
            &self,
            select: Select<part::Entity>,
            filters: &BTreeMap<String, FilterValue>,
            _ctx: &RequestContext,
        ) -> Result<Select<part::Entity>, ApiError> {
            Ok(match filters.get("in_stock") {
                Some(FilterValue::Scalar(v)) if v == "1" => {
                    select.filter(part::Column::Quantity.gt(0))
                }
                _ => select,
            })
        }

        fn qualify_collection_query(
            &self,
            select: Select<part::Entity>,
            _ctx: &RequestContext,
        ) -> Result<Select<part::Entity>, ApiError> {
            Ok(select.filter(part::Column::Owner.eq("alice")))
        }
    }

    fn controller() -> Parts {
        Parts {
            config: ResourceConfig::new("Part")
                .with_custom_filters(["in_stock"])
                .with_default_sort("code", SortDirection::Asc),
        }
    }

    fn qualified_sql(query: &str) -> String {
        let controller = controller();
        let params = ListParams::from_query(query).unwrap();
        let (_, sort) = params.validate(25).unwrap();
        let filters =
            normalize_filters(&params.filter, controller.config().custom_filter_keys()).unwrap();
        qualify(
            &controller,
            part::Entity::find(),
            &params,
            &filters,
            &sort,
            DatabaseBackend::Sqlite,
            &RequestContext::new("/parts"),
        )
        .unwrap()
        .build(DatabaseBackend::Sqlite)
        .to_string()
    }

    #[test]
    fn test_stages_apply_in_order() {
        let sql = qualified_sql("q=bolt&filter[code]=A|B&filter[in_stock]=1");
        let search = sql.find(r#"LIKE '%bolt%'"#).unwrap();
        let auto = sql.find(r#""parts"."code" IN ('A', 'B')"#).unwrap();
        let custom = sql.find(r#""parts"."quantity" > 0"#).unwrap();
        let scope = sql.find(r#""parts"."owner" = 'alice'"#).unwrap();
        let order = sql.find("ORDER BY").unwrap();
        assert!(search < auto && auto < custom && custom < scope && scope < order, "{sql}");
    }

    #[test]
    fn test_default_sort_is_used() {
        let sql = qualified_sql("");
        assert!(
            sql.ends_with(r#"ORDER BY "parts"."code" ASC, "parts"."id" ASC"#),
            "{sql}"
        );
    }

    #[test]
    fn test_custom_keys_never_become_auto_filters() {
        // `in_stock` is not a column: as an automatic filter it would be a data error
        let sql = qualified_sql("filter[in_stock]=0");
        assert!(!sql.contains("in_stock"), "{sql}");
    }

    #[test]
    fn test_unknown_filter_column_is_data_error() {
        let controller = controller();
        let params = ListParams::from_query("filter[secret]=x").unwrap();
        let filters =
            normalize_filters(&params.filter, controller.config().custom_filter_keys()).unwrap();
        let result = qualify(
            &controller,
            part::Entity::find(),
            &params,
            &filters,
            &ValidatedSort {
                column: None,
                direction: None,
            },
            DatabaseBackend::Sqlite,
            &RequestContext::new("/parts"),
        );
        assert!(matches!(result, Err(ApiError::DataError { .. })));
    }
}
