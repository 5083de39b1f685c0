use serde::Deserialize;

pub const DEFAULT_HISTORY_LIMIT: i64 = 30;
pub const MAX_HISTORY_LIMIT: i64 = 100;

/// Newest-first cursor over snowflake ids. `before` is exclusive.
#[derive(Debug, Clone, Copy, Deserialize)]
pub struct CursorParams {
    pub before: Option<i64>,
    pub limit: Option<i64>,
}

impl CursorParams {
    pub fn new(before: Option<i64>, limit: Option<i64>) -> Self {
        Self { before, limit }
    }

    pub fn limit(&self) -> i64 {
        self.limit
            .unwrap_or(DEFAULT_HISTORY_LIMIT)
            .clamp(1, MAX_HISTORY_LIMIT)
    }

    /// Rows to request from storage: one extra to learn whether more exist.
    pub fn fetch_limit(&self) -> i64 {
        self.limit() + 1
    }
}

impl Default for CursorParams {
    fn default() -> Self {
        Self {
            before: None,
            limit: Some(DEFAULT_HISTORY_LIMIT),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Page<T> {
    /// Oldest first.
    pub items: Vec<T>,
    /// Oldest id on the page, present only when older rows remain.
    pub next_cursor: Option<i64>,
}

impl<T> Page<T> {
    /// Build a page from rows fetched newest-first with `fetch_limit()`.
    pub fn from_newest_first(mut rows: Vec<T>, params: &CursorParams, id_of: impl Fn(&T) -> i64) -> Self {
        let limit = params.limit() as usize;
        let has_more = rows.len() > limit;
        rows.truncate(limit);
        let next_cursor = if has_more { rows.last().map(&id_of) } else { None };
        rows.reverse();
        Self {
            items: rows,
            next_cursor,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn limit_is_clamped() {
        assert_eq!(CursorParams::new(None, None).limit(), 30);
        assert_eq!(CursorParams::new(None, Some(0)).limit(), 1);
        assert_eq!(CursorParams::new(None, Some(500)).limit(), 100);
        assert_eq!(CursorParams::new(None, Some(10)).fetch_limit(), 11);
    }

    #[test]
    fn page_reports_cursor_only_when_more_rows_exist() {
        let params = CursorParams::new(None, Some(3));
        let page = Page::from_newest_first(vec![9, 8, 7, 6], &params, |id| *id);
        assert_eq!(page.items, vec![7, 8, 9]);
        assert_eq!(page.next_cursor, Some(7));

        let last = Page::from_newest_first(vec![5, 4], &params, |id| *id);
        assert_eq!(last.items, vec![4, 5]);
        assert_eq!(last.next_cursor, None);
    }
}
