//! Offset/limit pagination state for metrics listings.

use crate::config::PaginationSettings;

use super::metrics::MetricsQuery;

pub const DEFAULT_PAGE_SIZE: u32 = 25;
pub const MAX_PAGE_SIZE: u32 = 100;

/// Bounded `(limit, offset)` pair.
///
/// `limit` always stays within `[1, max_page_size]`. `offset` never goes below
/// zero and has no upper bound because totals are not always known.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Pagination {
    initial_limit: u32,
    max_page_size: u32,
    limit: u32,
    offset: u64,
}

impl Default for Pagination {
    fn default() -> Self {
        Self::new(DEFAULT_PAGE_SIZE)
    }
}

impl Pagination {
    pub fn new(initial_limit: u32) -> Self {
        Self::with_max(initial_limit, MAX_PAGE_SIZE)
    }

    pub fn with_max(initial_limit: u32, max_page_size: u32) -> Self {
        let max_page_size = max_page_size.max(1);
        let initial_limit = initial_limit.clamp(1, max_page_size);
        Self {
            initial_limit,
            max_page_size,
            limit: initial_limit,
            offset: 0,
        }
    }

    pub fn limit(&self) -> u32 {
        self.limit
    }

    pub fn offset(&self) -> u64 {
        self.offset
    }

    pub fn max_page_size(&self) -> u32 {
        self.max_page_size
    }

    /// Zero-based page index.
    pub fn page(&self) -> u64 {
        self.offset / u64::from(self.limit)
    }

    /// Change the page size. Moves back to the first page.
    pub fn update_limit(&mut self, limit: u32) {
        self.limit = limit.clamp(1, self.max_page_size);
        self.offset = 0;
    }

    pub fn next_page(&mut self) {
        self.offset = self.offset.saturating_add(u64::from(self.limit));
    }

    pub fn prev_page(&mut self) {
        self.offset = self.offset.saturating_sub(u64::from(self.limit));
    }

    /// Jump to a zero-based page.
    pub fn go_to(&mut self, page: u64) {
        self.offset = page.saturating_mul(u64::from(self.limit));
    }

    /// Restore the initial limit and the first page.
    pub fn reset(&mut self) {
        self.limit = self.initial_limit;
        self.offset = 0;
    }

    /// Copy `limit` and `offset` into a metrics request.
    pub fn apply_to(&self, query: &mut MetricsQuery) {
        query.limit = Some(self.limit);
        query.offset = Some(self.offset);
    }
}

impl From<&PaginationSettings> for Pagination {
    fn from(settings: &PaginationSettings) -> Self {
        Self::with_max(settings.default_page_size.get(), settings.max_page_size.get())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn update_limit_clamps_and_rewinds() {
        let mut pagination = Pagination::default();
        pagination.next_page();
        pagination.update_limit(500);

        assert_eq!(pagination.limit(), 100);
        assert_eq!(pagination.offset(), 0);

        pagination.update_limit(0);
        assert_eq!(pagination.limit(), 1);
    }

    #[test]
    fn prev_page_stops_at_zero() {
        let mut pagination = Pagination::default();
        pagination.prev_page();
        assert_eq!(pagination.offset(), 0);

        pagination.update_limit(10);
        pagination.next_page();
        pagination.next_page();
        pagination.prev_page();
        assert_eq!(pagination.offset(), 10);
        assert_eq!(pagination.page(), 1);
    }

    #[test]
    fn next_page_has_no_upper_bound() {
        let mut pagination = Pagination::new(50);
        for _ in 0..1000 {
            pagination.next_page();
        }
        assert_eq!(pagination.offset(), 50_000);
    }

    #[test]
    fn reset_restores_initial_limit() {
        let mut pagination = Pagination::new(40);
        pagination.update_limit(75);
        pagination.next_page();
        pagination.reset();

        assert_eq!(pagination.limit(), 40);
        assert_eq!(pagination.offset(), 0);
    }

    #[test]
    fn initial_limit_is_clamped_to_the_maximum() {
        let pagination = Pagination::with_max(250, 200);
        assert_eq!(pagination.limit(), 200);
        assert_eq!(pagination.max_page_size(), 200);
    }

    #[test]
    fn go_to_and_apply_to_query() {
        let mut pagination = Pagination::new(20);
        pagination.go_to(3);

        let mut query = MetricsQuery::default();
        pagination.apply_to(&mut query);
        assert_eq!(query.limit, Some(20));
        assert_eq!(query.offset, Some(60));
    }
}
