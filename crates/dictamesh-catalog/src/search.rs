//! Full-text plus filter-predicate search over the catalog.

use serde::{Deserialize, Serialize};

#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct SearchQuery {
    /// Matched against the identifier full-text index (`entity_id`,
    /// `source_entity_id`, plus any indexed text attributes).
    pub text: Option<String>,
    pub entity_type: Option<String>,
    pub domain: Option<String>,
    pub contains_pii: Option<bool>,
    pub page: u32,
    pub page_size: u32,
}

impl SearchQuery {
    pub fn offset(&self) -> i64 {
        (self.page as i64) * (self.page_size as i64)
    }

    pub fn limit(&self) -> i64 {
        self.page_size as i64
    }
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct SearchResults<T> {
    pub items: Vec<T>,
    pub total: i64,
    pub page: u32,
    pub page_size: u32,
}

impl<T> SearchResults<T> {
    pub fn has_more(&self) -> bool {
        ((self.page as i64 + 1) * self.page_size as i64) < self.total
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn offset_and_limit_follow_page_arithmetic() {
        let q = SearchQuery { page: 2, page_size: 25, ..Default::default() };
        assert_eq!(q.offset(), 50);
        assert_eq!(q.limit(), 25);
    }

    #[test]
    fn has_more_detects_trailing_page() {
        let results = SearchResults::<()> { items: vec![], total: 30, page: 0, page_size: 25 };
        assert!(results.has_more());
        let results = SearchResults::<()> { items: vec![], total: 30, page: 1, page_size: 25 };
        assert!(!results.has_more());
    }
}
