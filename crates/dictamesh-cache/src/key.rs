//! Cache key conventions.

/// Key for a single entity: `entity:{adapter}:{id}`.
pub fn entity_key(adapter: &str, entity_id: &str) -> String {
    format!("entity:{adapter}:{entity_id}")
}

/// Key for a list/query result: `list:{type}:{filter-hash}`.
pub fn list_key(entity_type: &str, filter_hash: &str) -> String {
    format!("list:{entity_type}:{filter_hash}")
}

/// The list-prefix pattern a component should register for
/// `delete_pattern` invalidation when one of its entities changes.
pub fn list_prefix(entity_type: &str) -> String {
    format!("list:{entity_type}:")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn keys_follow_documented_conventions() {
        assert_eq!(entity_key("rest-catalog", "product:123"), "entity:rest-catalog:product:123");
        assert_eq!(list_key("product", "abc123"), "list:product:abc123");
        assert_eq!(list_prefix("product"), "list:product:");
    }
}
