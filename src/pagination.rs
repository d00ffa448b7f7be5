use serde::Serialize;

use crate::models::Article;

pub const DEFAULT_PAGE: usize = 1;
pub const DEFAULT_LIMIT: usize = 15;
pub const MAX_LIMIT: usize = 50;

/// A clamped page window: `page >= 1`, `1 <= limit <= MAX_LIMIT`.
///
/// A zero `limit` counts as unset and takes the default.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PageRequest {
    page: usize,
    limit: usize,
}

impl Default for PageRequest {
    fn default() -> Self {
        Self {
            page: DEFAULT_PAGE,
            limit: DEFAULT_LIMIT,
        }
    }
}

impl PageRequest {
    pub fn new(page: Option<i64>, limit: Option<i64>) -> Self {
        let page = page.map_or(DEFAULT_PAGE, |p| p.max(1) as usize);
        let limit = limit
            .filter(|&l| l != 0)
            .map_or(DEFAULT_LIMIT, |l| l.clamp(1, MAX_LIMIT as i64) as usize);
        Self { page, limit }
    }

    pub fn page(&self) -> usize {
        self.page
    }

    pub fn limit(&self) -> usize {
        self.limit
    }

    pub fn offset(&self) -> usize {
        (self.page - 1).saturating_mul(self.limit)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PageResponse {
    pub updates: Vec<Article>,
    pub page: usize,
    pub limit: usize,
    pub total: usize,
    pub has_more: bool,
}

impl PageResponse {
    pub fn empty(request: PageRequest) -> Self {
        paginate(&[], request)
    }
}

pub fn paginate(articles: &[Article], request: PageRequest) -> PageResponse {
    let total = articles.len();
    let start = request.offset();
    let end = start.saturating_add(request.limit).min(total);
    let updates = articles.get(start..end).map(<[Article]>::to_vec).unwrap_or_default();

    PageResponse {
        updates,
        page: request.page,
        limit: request.limit,
        total,
        has_more: start.saturating_add(request.limit) < total,
    }
}
