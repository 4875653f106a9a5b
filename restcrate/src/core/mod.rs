// Resource configuration and the list pipeline

pub mod listing;
pub mod traits;

pub use listing::{list_entities, qualify};
pub use traits::{DefaultSort, MAX_PER_PAGE, RESULTS_PER_PAGE, ResourceConfig, Searchable, SortDirection};
