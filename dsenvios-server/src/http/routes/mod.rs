//! Route handlers organized by resource

pub mod collections;
pub mod guides;
pub mod health;
pub mod quotes;
pub mod tracking;

use serde::Serialize;

/// Success envelope used by the guide and tracking endpoints: `{success, data}`
#[derive(Debug, Serialize)]
pub struct ApiResponse<T> {
    pub success: bool,
    pub data: T,
}

impl<T> ApiResponse<T> {
    pub fn ok(data: T) -> Self {
        Self {
            success: true,
            data,
        }
    }
}
