//! Repositories: statement builders and typed reads per table
//!
//! - Reads run through the query executor, one statement per call
//! - Writes that must land together are returned as statements and
//!   composed into a transaction by the caller
//! - Conflicts are left to database constraints (no check-then-insert)

pub mod documents;
pub mod guides;
pub mod shipments;

pub use documents::{Document, DocumentRepo};
pub use guides::{GuideFilter, GuideQuery, GuideRepo, SortColumn, SortOrder};
pub use shipments::{ShipmentRepo, ShipmentSnapshot};
