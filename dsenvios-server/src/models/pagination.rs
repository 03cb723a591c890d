//! Pagination types

use serde::{Deserialize, Serialize};

/// Maximum items per page
const MAX_LIMIT: u32 = 100;

/// Default items per page
const DEFAULT_LIMIT: u32 = 20;

/// Pagination parameters
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Pagination {
    /// Page number (1-indexed)
    pub page: u32,
    /// Items per page (max 100)
    pub limit: u32,
}

impl Pagination {
    /// Create pagination with validation.
    ///
    /// - Page is clamped to minimum of 1
    /// - Limit is clamped to 1..=100
    pub fn new(page: u32, limit: u32) -> Self {
        Self {
            page: page.max(1),
            limit: limit.clamp(1, MAX_LIMIT),
        }
    }

    /// SQL OFFSET value.
    pub fn offset(&self) -> u64 {
        u64::from(self.page - 1) * u64::from(self.limit)
    }
}

impl Default for Pagination {
    fn default() -> Self {
        Self {
            page: 1,
            limit: DEFAULT_LIMIT,
        }
    }
}

/// Paginated response wrapper: `{data, total, totalPages, page, limit}`
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Paginated<T> {
    pub data: Vec<T>,
    pub total: i64,
    pub total_pages: u32,
    pub page: u32,
    pub limit: u32,
}

impl<T> Paginated<T> {
    pub fn new(data: Vec<T>, total: i64, page: Pagination) -> Self {
        let total = total.max(0);
        let limit = i64::from(page.limit);
        Self {
            data,
            total,
            total_pages: ((total + limit - 1) / limit) as u32,
            page: page.page,
            limit: page.limit,
        }
    }

    pub fn map<U>(self, f: impl FnMut(T) -> U) -> Paginated<U> {
        Paginated {
            data: self.data.into_iter().map(f).collect(),
            total: self.total,
            total_pages: self.total_pages,
            page: self.page,
            limit: self.limit,
        }
    }

    /// Check if there's a next page.
    pub fn has_next(&self) -> bool {
        self.page < self.total_pages
    }
}

/// Query parameters for pagination
#[derive(Debug, Clone, Default, Deserialize)]
pub struct PaginationParams {
    pub page: Option<u32>,
    pub limit: Option<u32>,
}

impl From<PaginationParams> for Pagination {
    fn from(params: PaginationParams) -> Self {
        Self::new(
            params.page.unwrap_or(1),
            params.limit.unwrap_or(DEFAULT_LIMIT),
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn offset_calculation() {
        assert_eq!(Pagination::new(1, 10).offset(), 0);
        assert_eq!(Pagination::new(2, 10).offset(), 10);
        assert_eq!(Pagination::new(3, 25).offset(), 50);
    }

    #[test]
    fn clamps_page_and_limit() {
        assert_eq!(Pagination::new(0, 10).page, 1);
        assert_eq!(Pagination::new(1, 0).limit, 1);
        assert_eq!(Pagination::new(1, 999).limit, 100);
    }

    #[test]
    fn total_pages() {
        let p = Pagination::new(1, 10);
        assert_eq!(Paginated::<()>::new(vec![], 0, p).total_pages, 0);
        assert_eq!(Paginated::<()>::new(vec![], 25, p).total_pages, 3);
        assert_eq!(Paginated::<()>::new(vec![], 100, p).total_pages, 10);
    }

    #[test]
    fn has_next() {
        let page = Paginated::<()>::new(vec![], 30, Pagination::new(2, 10));
        assert!(page.has_next());
        let page = Paginated::<()>::new(vec![], 30, Pagination::new(3, 10));
        assert!(!page.has_next());
    }

    #[test]
    fn serializes_camel_case() {
        let json = serde_json::to_value(Paginated::new(vec![1, 2], 2, Pagination::default())).unwrap();
        assert_eq!(json["totalPages"], 1);
        assert_eq!(json["limit"], 20);
        assert_eq!(json["data"].as_array().unwrap().len(), 2);
    }
}
