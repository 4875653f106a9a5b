use sea_orm::{EntityTrait, IdenStatic};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::fmt;
use std::str::FromStr;

/// Default number of items per page when the request does not say.
pub const RESULTS_PER_PAGE: u64 = 25;

/// Largest page size a client may request.
pub const MAX_PER_PAGE: u64 = 250;

/// Field registry for free-text search.
///
/// The order of the returned columns is the order in which `q` terms are OR-ed together; the
/// first column is the most important one.
///
/// ```rust,ignore
/// impl Searchable for part::Entity {
///     fn searchable_columns() -> Vec<part::Column> {
///         vec![part::Column::Code, part::Column::Designation]
///     }
/// }
/// ```
pub trait Searchable: EntityTrait {
    #[must_use]
    fn searchable_columns() -> Vec<Self::Column> {
        Vec::new()
    }
}

/// Sort direction accepted in the `order` parameter.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum SortDirection {
    Asc,
    #[default]
    Desc,
}

impl SortDirection {
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Asc => "asc",
            Self::Desc => "desc",
        }
    }
}

impl FromStr for SortDirection {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        if s.eq_ignore_ascii_case("asc") {
            Ok(Self::Asc)
        } else if s.eq_ignore_ascii_case("desc") {
            Ok(Self::Desc)
        } else {
            Err(format!("unknown sort direction '{s}'"))
        }
    }
}

impl fmt::Display for SortDirection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl From<SortDirection> for sea_orm::Order {
    fn from(direction: SortDirection) -> Self {
        match direction {
            SortDirection::Asc => Self::Asc,
            SortDirection::Desc => Self::Desc,
        }
    }
}

/// Listing order used when the request carries no `sort_by`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DefaultSort {
    pub key: String,
    pub order: Option<SortDirection>,
}

impl DefaultSort {
    pub fn new(key: impl Into<String>, order: SortDirection) -> Self {
        Self {
            key: key.into(),
            order: Some(order),
        }
    }
}

/// Per-resource configuration, built once at startup and owned by the controller.
///
/// ```rust,ignore
/// let config = ResourceConfig::<part::Entity>::new("Part")
///     .with_custom_filters(["in_stock"])
///     .with_default_sort("created_at", SortDirection::Desc)
///     .with_fillable(["code", "designation", "quantity", "price_unit"]);
/// ```
#[derive(Debug, Clone)]
pub struct ResourceConfig<E: EntityTrait> {
    name: String,
    searchable: Vec<E::Column>,
    custom_filters: BTreeSet<String>,
    default_sort: Option<DefaultSort>,
    uuid_column: Option<E::Column>,
    fillable: Option<BTreeSet<String>>,
    per_page: u64,
}

impl<E: Searchable> ResourceConfig<E> {
    /// Start from the entity's declared searchable columns. A column named `uuid`, when the
    /// entity has one, becomes the external identifier column.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            searchable: E::searchable_columns(),
            custom_filters: BTreeSet::new(),
            default_sort: None,
            uuid_column: E::Column::from_str("uuid").ok(),
            fillable: None,
            per_page: RESULTS_PER_PAGE,
        }
    }
}

impl<E: EntityTrait> ResourceConfig<E> {
    /// Append searchable columns after the declared ones, skipping duplicates.
    #[must_use]
    pub fn merge_searchable(mut self, columns: impl IntoIterator<Item = E::Column>) -> Self {
        for column in columns {
            if !self.searchable.iter().any(|c| c.as_str() == column.as_str()) {
                self.searchable.push(column);
            }
        }
        self
    }

    #[must_use]
    pub fn with_custom_filters<I, S>(mut self, keys: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.custom_filters.extend(keys.into_iter().map(Into::into));
        self
    }

    #[must_use]
    pub fn with_default_sort(mut self, key: impl Into<String>, order: SortDirection) -> Self {
        self.default_sort = Some(DefaultSort::new(key, order));
        self
    }

    #[must_use]
    pub fn with_uuid_column(mut self, column: Option<E::Column>) -> Self {
        self.uuid_column = column;
        self
    }

    /// Restrict store/update payloads to these keys. Other keys are silently dropped.
    #[must_use]
    pub fn with_fillable<I, S>(mut self, keys: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.fillable = Some(keys.into_iter().map(Into::into).collect());
        self
    }

    /// Default page size, clamped to `1..=MAX_PER_PAGE`.
    #[must_use]
    pub fn with_per_page(mut self, per_page: u64) -> Self {
        self.per_page = per_page.clamp(1, MAX_PER_PAGE);
        self
    }

    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    #[must_use]
    pub fn searchable_fields(&self) -> &[E::Column] {
        &self.searchable
    }

    #[must_use]
    pub const fn custom_filter_keys(&self) -> &BTreeSet<String> {
        &self.custom_filters
    }

    #[must_use]
    pub const fn default_sort(&self) -> Option<&DefaultSort> {
        self.default_sort.as_ref()
    }

    #[must_use]
    pub const fn uuid_column(&self) -> Option<E::Column> {
        self.uuid_column
    }

    #[must_use]
    pub const fn fillable(&self) -> Option<&BTreeSet<String>> {
        self.fillable.as_ref()
    }

    #[must_use]
    pub const fn per_page(&self) -> u64 {
        self.per_page
    }
}
