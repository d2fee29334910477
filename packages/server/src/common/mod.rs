pub mod error;
pub mod query;

pub use error::ApiError;
pub use query::{Filter, FilterOperator, ListParams, Pagination, SortOrder, Sorter};
