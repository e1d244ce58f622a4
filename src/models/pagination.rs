use serde::Serialize;

pub const DEFAULT_LIMIT: i64 = 20;
pub const MAX_LIMIT: i64 = 100;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PageRequest {
    pub page: i64,
    pub limit: i64,
}

impl PageRequest {
    /// Normalises raw `page`/`limit` query values. Pages start at 1.
    pub fn new(page: Option<i64>, limit: Option<i64>, default_limit: i64) -> Self {
        Self::bounded(page, limit, default_limit, MAX_LIMIT)
    }

    pub fn bounded(page: Option<i64>, limit: Option<i64>, default_limit: i64, max_limit: i64) -> Self {
        PageRequest {
            page: page.unwrap_or(1).max(1),
            limit: limit.unwrap_or(default_limit).clamp(1, max_limit),
        }
    }

    /// Saturates instead of overflowing for absurd page numbers; such a page is simply empty.
    pub fn offset(&self) -> i64 {
        self.page.saturating_sub(1).saturating_mul(self.limit)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Pagination {
    pub page: i64,
    pub limit: i64,
    pub total: i64,
    pub pages: i64,
}

impl Pagination {
    pub fn new(request: PageRequest, total: i64) -> Self {
        Pagination {
            page: request.page,
            limit: request.limit,
            total,
            pages: (total + request.limit - 1) / request.limit,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_apply_when_absent() {
        let req = PageRequest::new(None, None, DEFAULT_LIMIT);
        assert_eq!(req, PageRequest { page: 1, limit: 20 });
        assert_eq!(req.offset(), 0);
    }

    #[test]
    fn out_of_range_values_are_clamped() {
        assert_eq!(PageRequest::new(Some(0), Some(0), 20), PageRequest { page: 1, limit: 1 });
        assert_eq!(PageRequest::new(Some(-3), Some(5000), 20), PageRequest { page: 1, limit: 100 });
        assert_eq!(PageRequest::bounded(None, Some(5000), 100, 1000).limit, 1000);
    }

    #[test]
    fn offset_skips_previous_pages() {
        assert_eq!(PageRequest::new(Some(3), Some(25), 20).offset(), 50);
    }

    #[test]
    fn huge_page_does_not_overflow() {
        let req = PageRequest::new(Some(i64::MAX), Some(100), 20);
        assert_eq!(req.page, i64::MAX);
        assert_eq!(req.offset(), i64::MAX);
        assert_eq!(PageRequest::new(Some(i64::MIN), None, 20).offset(), 0);
    }

    #[test]
    fn page_count_rounds_up() {
        let req = PageRequest::new(Some(1), Some(20), 20);
        assert_eq!(Pagination::new(req, 0).pages, 0);
        assert_eq!(Pagination::new(req, 20).pages, 1);
        assert_eq!(Pagination::new(req, 21).pages, 2);
    }
}
