//! Typed directed edges between entities.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::id::EntityId;
use crate::value::AttributeMap;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Cardinality {
    One,
    Many,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Relationship {
    pub subject_id: EntityId,
    pub subject_type: String,
    pub relationship_type: String,
    pub object_id: EntityId,
    pub object_type: String,
    pub cardinality: Cardinality,
    pub valid_from: Option<DateTime<Utc>>,
    pub valid_to: Option<DateTime<Utc>>,
    #[serde(default)]
    pub attributes: AttributeMap,
    /// Set by the catalog on read when the referenced endpoint is not known.
    #[serde(default)]
    pub dangling: bool,
}

impl Relationship {
    pub fn is_currently_valid(&self, at: DateTime<Utc>) -> bool {
        let after_start = self.valid_from.map_or(true, |from| at >= from);
        let before_end = self.valid_to.map_or(true, |to| at < to);
        after_start && before_end
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    fn rel(valid_from: Option<DateTime<Utc>>, valid_to: Option<DateTime<Utc>>) -> Relationship {
        Relationship {
            subject_id: EntityId::new("product", "1"),
            subject_type: "product".into(),
            relationship_type: "belongs_to".into(),
            object_id: EntityId::new("category", "c1"),
            object_type: "category".into(),
            cardinality: Cardinality::One,
            valid_from,
            valid_to,
            attributes: Default::default(),
            dangling: false,
        }
    }

    #[test]
    fn validity_interval_is_half_open() {
        let now = Utc::now();
        let r = rel(Some(now - Duration::days(1)), Some(now + Duration::days(1)));
        assert!(r.is_currently_valid(now));

        let expired = rel(Some(now - Duration::days(2)), Some(now - Duration::days(1)));
        assert!(!expired.is_currently_valid(now));
    }

    #[test]
    fn unbounded_interval_is_always_valid() {
        let r = rel(None, None);
        assert!(r.is_currently_valid(Utc::now()));
    }
}
