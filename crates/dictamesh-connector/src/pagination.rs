//! Pluggable pagination strategies.
//!
//! A strategy advances a [`Pagination`] cursor given the page just
//! fetched, stopping once the page is short or a declared total is
//! reached.

use crate::types::{FetchPage, Pagination};

/// Computes the next page's pagination value, or `None` when the
/// strategy has exhausted the result set.
pub fn advance(current: &Pagination, page: &FetchPage, page_size_hint: u32) -> Option<Pagination> {
    if page.records.is_empty() {
        return None;
    }

    match current {
        Pagination::OffsetLimit { offset, limit } => {
            let fetched = page.records.len() as u64;
            let next_offset = offset + fetched;
            if fetched < *limit as u64 {
                return None;
            }
            if let Some(total) = page.total {
                if next_offset >= total {
                    return None;
                }
            }
            Some(Pagination::OffsetLimit { offset: next_offset, limit: *limit })
        }
        Pagination::Cursor { limit, .. } => {
            page.next_cursor.clone().map(|token| Pagination::Cursor {
                token: Some(token),
                limit: *limit,
            })
        }
        Pagination::PageNumber { page: page_num, page_size } => {
            if (page.records.len() as u32) < page_size_hint.max(*page_size) {
                return None;
            }
            if let Some(total) = page.total {
                let fetched_so_far = (*page_num as u64) * (*page_size as u64) + page.records.len() as u64;
                if fetched_so_far >= total {
                    return None;
                }
            }
            Some(Pagination::PageNumber { page: page_num + 1, page_size: *page_size })
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::Record;
    use chrono::Utc;

    fn record(id: &str) -> Record {
        Record {
            id: id.into(),
            data: Default::default(),
            metadata: Default::default(),
            observed_at: Utc::now(),
        }
    }

    #[test]
    fn offset_limit_stops_on_short_page() {
        let current = Pagination::OffsetLimit { offset: 0, limit: 10 };
        let page = FetchPage { records: vec![record("1"), record("2")], total: None, next_cursor: None };
        assert!(advance(&current, &page, 10).is_none());
    }

    #[test]
    fn offset_limit_advances_on_full_page() {
        let current = Pagination::OffsetLimit { offset: 0, limit: 2 };
        let page = FetchPage { records: vec![record("1"), record("2")], total: None, next_cursor: None };
        let next = advance(&current, &page, 2).unwrap();
        assert!(matches!(next, Pagination::OffsetLimit { offset: 2, limit: 2 }));
    }

    #[test]
    fn offset_limit_stops_when_total_reached() {
        let current = Pagination::OffsetLimit { offset: 0, limit: 2 };
        let page = FetchPage { records: vec![record("1"), record("2")], total: Some(2), next_cursor: None };
        assert!(advance(&current, &page, 2).is_none());
    }

    #[test]
    fn cursor_advances_until_no_next_token() {
        let current = Pagination::Cursor { token: None, limit: 50 };
        let page = FetchPage {
            records: vec![record("1")],
            total: None,
            next_cursor: Some("abc".into()),
        };
        let next = advance(&current, &page, 50).unwrap();
        assert!(matches!(next, Pagination::Cursor { token: Some(ref t), .. } if t == "abc"));

        let last_page = FetchPage { records: vec![record("2")], total: None, next_cursor: None };
        assert!(advance(&current, &last_page, 50).is_none());
    }
}
