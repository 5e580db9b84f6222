//! Pagination normalisation shared by every list route.

pub const DEFAULT_PAGE_SIZE: i32 = 10;
pub const MAX_PAGE_SIZE: i32 = 100;

/// Effective `(page, page_size)` from the raw query values: a missing or
/// non-positive page becomes 1, a missing or non-positive page size becomes
/// the default, and the page size is capped.
pub fn normalize(page: Option<i32>, page_size: Option<i32>) -> (i32, i32) {
    let page = match page {
        Some(p) if p > 0 => p,
        _ => 1,
    };
    let page_size = match page_size {
        Some(s) if s > 0 => s.min(MAX_PAGE_SIZE),
        _ => DEFAULT_PAGE_SIZE,
    };
    (page, page_size)
}
