//! Request-facing models with validation at construction

pub mod collection;
pub mod pagination;

pub use collection::CollectionName;
pub use pagination::{Paginated, Pagination, PaginationParams};
