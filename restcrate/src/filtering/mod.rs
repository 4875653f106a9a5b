//! # Query Qualification
//!
//! Turns untrusted list parameters into predicates on a Sea-ORM [`Select`]. Field names are
//! resolved against the entity's column enum and every value is bound as a parameter, so client
//! input never reaches the SQL text.
//!
//! ## Stages
//!
//! - [`normalize`]: split `filter` into automatic and custom filters ([`FilterValue`])
//! - [`search`]: compile `q` into one grouped clause over the searchable columns
//! - [`conditions`]: build constraints for automatic filters
//! - [`sort`]: resolve `sort_by`/`order` against the resource default
//! - [`pagination`]: run the query under the request's cancellation token and build the envelope
//!
//! ## Query Parameter Examples
//!
//! ```text
//! GET /parts?q=bolt
//! GET /parts?q[]=bolt&q[]=steel
//! GET /parts?q={"or":["{\"code\":\"A1\"}","{\"code\":\"B2\"}"]}
//! GET /parts?filter[code]=A1|B2
//! GET /parts?filter[quantity][>]=3&filter[quantity][<=]=10
//! GET /parts?filter={"owner":null}
//! GET /parts?sort_by=priceUnit&order=asc&per_page=50&page=2
//! ```

pub mod conditions;
pub mod normalize;
pub mod pagination;
pub mod search;
pub mod sort;

pub use conditions::{FilterOperator, auto_filter_condition, filter_condition};
pub use normalize::{FilterValue, NormalizedFilters, normalize_filters};
pub use pagination::{
    PageRequest, PagedResult, PaginationLinks, PaginationMeta, RequestContext, fetch_page,
};
pub use search::{SearchExpression, SearchInput, search_condition};
pub use sort::{ResolvedSort, apply_sort, resolve_sort};

use sea_orm::{Condition, EntityTrait, QueryFilter, Select};

/// Add `condition` as one grouped clause, or leave the query alone.
#[must_use]
pub fn apply_condition<E: EntityTrait>(select: Select<E>, condition: Option<Condition>) -> Select<E> {
    match condition {
        Some(condition) if !condition.is_empty() => select.filter(condition),
        _ => select,
    }
}
