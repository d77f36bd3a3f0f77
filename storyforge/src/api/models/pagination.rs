//! Offset pagination for the library listing.
//!
//! The library endpoint accepts `skip` and `limit` query parameters. Requested
//! limits are clamped to [`MAX_PAGE_SIZE`] so a single request can never pull
//! the whole library, and to at least 1 so a page is never empty by accident.

use serde::{Deserialize, Serialize};
use serde_with::{DisplayFromStr, serde_as};
use utoipa::{IntoParams, ToSchema};

/// Page size applied when the request does not specify one.
pub const DEFAULT_PAGE_SIZE: i64 = 50;

/// Largest page size a request can ask for.
pub const MAX_PAGE_SIZE: i64 = 100;

/// `skip`/`limit` query parameters for the library listing.
#[serde_as]
#[derive(Debug, Default, Deserialize, IntoParams, ToSchema)]
pub struct Pagination {
    /// Number of stories to skip, newest first (default: 0)
    #[param(default = 0, minimum = 0)]
    #[serde_as(as = "Option<DisplayFromStr>")]
    pub skip: Option<i64>,

    /// Number of stories to return (default: 50, max: 100)
    #[param(default = 50, minimum = 1, maximum = 100)]
    #[serde_as(as = "Option<DisplayFromStr>")]
    pub limit: Option<i64>,
}

impl Pagination {
    /// Offset into the newest-first ordering; negative values collapse to 0.
    pub fn skip(&self) -> i64 {
        self.skip.unwrap_or(0).max(0)
    }

    /// Requested page size clamped to `1..=MAX_PAGE_SIZE`.
    pub fn limit(&self) -> i64 {
        self.limit.unwrap_or(DEFAULT_PAGE_SIZE).clamp(1, MAX_PAGE_SIZE)
    }
}

/// One page of results plus the counts a client needs to page further.
#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct PaginatedResponse<T: ToSchema> {
    pub data: Vec<T>,
    /// Library size before pagination
    pub total_count: i64,
    pub skip: i64,
    pub limit: i64,
}

impl<T: ToSchema> PaginatedResponse<T> {
    pub fn new(data: Vec<T>, total_count: i64, skip: i64, limit: i64) -> Self {
        Self {
            data,
            total_count,
            skip,
            limit,
        }
    }
}
