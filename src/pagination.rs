//! Page metadata for list responses.

use serde::Serialize;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
pub struct Pagination {
    pub count: u64,
    pub page: u32,
    pub size: u32,
    pub pages: u64,
}

impl Pagination {
    /// `pages = ceil(count / size)`; zero rows means zero pages.
    pub fn new(count: u64, page: u32, size: u32) -> Self {
        let size = size.max(1);
        Pagination {
            count,
            page,
            size,
            pages: count.div_ceil(u64::from(size)),
        }
    }
}

#[derive(Clone, Debug, Serialize)]
pub struct PaginatedResponse<T> {
    pub results: Vec<T>,
    pub pagination: Pagination,
}

impl<T> PaginatedResponse<T> {
    pub fn new(results: Vec<T>, count: u64, page: u32, size: u32) -> Self {
        PaginatedResponse {
            results,
            pagination: Pagination::new(count, page, size),
        }
    }
}
