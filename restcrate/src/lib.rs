//! # restcrate
//!
//! Generic REST resources over Sea-ORM entities: list with search, filters, sorting and
//! pagination, plus show/store/update/destroy with typed hooks, served through Axum.
//!
//! ```rust,ignore
//! let config = ResourceConfig::<part::Entity>::new("Part")
//!     .with_custom_filters(["in_stock"])
//!     .with_default_sort("code", SortDirection::Asc);
//!
//! let app = Router::new().nest("/api/parts", resource_router(PartController { config }, db));
//! ```

pub mod core;
pub mod errors;
pub mod filtering;
pub mod models;
pub mod operations;
pub mod routes;
pub mod validation;

pub use crate::core::{
    DefaultSort, MAX_PER_PAGE, RESULTS_PER_PAGE, ResourceConfig, Searchable, SortDirection,
    list_entities, qualify,
};
pub use errors::{ApiError, DATA_ERROR_MESSAGE};
pub use filtering::{
    FilterValue, PageRequest, PagedResult, PaginationLinks, PaginationMeta, RequestContext,
    SearchInput,
};
pub use models::{ListParams, ValidatedSort};
pub use operations::ResourceController;
pub use routes::resource_router;
