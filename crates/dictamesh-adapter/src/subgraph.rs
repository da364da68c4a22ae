//! `SubgraphRegistry`: the collaborator interface the (out-of-scope)
//! federation gateway exposes. A no-op default lets the adapter
//! initialize and be tested standalone without a live gateway.

use async_trait::async_trait;
use dictamesh_types::{Entity, MeshError};

/// `{__typename, id}`, the representation a federation gateway sends to
/// `__resolveReference`.
#[derive(Clone, Debug, serde::Deserialize, serde::Serialize)]
pub struct EntityReference {
    pub __typename: String,
    pub id: String,
}

#[async_trait]
pub trait SubgraphRegistry: Send + Sync {
    /// Advertises `name`'s SDL fragment (annotated with federation
    /// directives) and its `__resolveReference` entry point to the
    /// gateway. `name` and `sdl` are opaque to the core; `resolve_reference`
    /// is the pure function from §9 that the gateway invokes.
    async fn register(&self, name: &str, sdl: &str) -> Result<(), MeshError>;
}

/// Does nothing; lets an adapter `Initialize` and run its full lifecycle
/// in a process with no federation gateway attached (e.g. unit tests, or
/// deployments that only need the REST/event surface).
pub struct NoopSubgraphRegistry;

#[async_trait]
impl SubgraphRegistry for NoopSubgraphRegistry {
    async fn register(&self, name: &str, _sdl: &str) -> Result<(), MeshError> {
        tracing::debug!(subgraph = name, "no-op subgraph registry: skipping registration");
        Ok(())
    }
}

/// A pure function from a federation representation to the canonical
/// entity it names: `{__typename, id} -> Entity`. Kept separate
/// from `SubgraphRegistry` since it is implemented by the adapter, not the
/// gateway, and the gateway only ever calls it, never registers it.
#[async_trait]
pub trait ResolveReference: Send + Sync {
    async fn resolve_reference(&self, reference: EntityReference) -> Result<Entity, MeshError>;
}

/// Builds the SDL fragment the adapter should advertise for one entity
/// type it owns, with `id` as the federation key field.
pub fn sdl_fragment(entity_type: &str, key_fields: &[&str]) -> String {
    let keys = key_fields.join(" ");
    format!(
        "type {ty} @key(fields: \"{keys}\") {{\n  {keys}\n}}",
        ty = pascal_case(entity_type),
    )
}

fn pascal_case(s: &str) -> String {
    s.split(|c: char| !c.is_alphanumeric())
        .filter(|segment| !segment.is_empty())
        .map(|segment| {
            let mut chars = segment.chars();
            match chars.next() {
                Some(first) => first.to_uppercase().collect::<String>() + chars.as_str(),
                None => String::new(),
            }
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn noop_registry_accepts_any_registration() {
        let registry = NoopSubgraphRegistry;
        registry.register("products", "type Product @key(fields: \"id\") { id: ID! }").await.unwrap();
    }

    #[test]
    fn sdl_fragment_pascal_cases_the_type_name() {
        let sdl = sdl_fragment("product", &["id"]);
        assert!(sdl.starts_with("type Product @key"));
    }
}
