//! JSON-Schema validation against an entity type's registered schema.

use dictamesh_types::{AttributeMap, ErrorKind, MeshError, Schema};
use jsonschema::JSONSchema;
use parking_lot::RwLock;
use std::collections::HashMap;

/// Compiles and caches one [`JSONSchema`] per `(entity_type, version)`,
/// refreshed whenever the catalog hands back a newer schema.
pub struct Validator {
    compiled: RwLock<HashMap<(String, u32), JSONSchema>>,
}

impl Validator {
    pub fn new() -> Self {
        Self { compiled: RwLock::new(HashMap::new()) }
    }

    /// Registers `schema`'s JSON-Schema `definition` for future validation
    /// calls. No-op (and cheap) if this exact `(entity_type, version)` is
    /// already compiled.
    pub fn register(&self, schema: &Schema) -> Result<(), MeshError> {
        let key = (schema.entity_type.clone(), schema.version);
        if self.compiled.read().contains_key(&key) {
            return Ok(());
        }
        let compiled = JSONSchema::compile(&schema.definition.clone())
            .map_err(|e| MeshError::new(ErrorKind::SchemaIncompatible, format!("invalid schema for {}: {e}", schema.entity_type)))?;
        self.compiled.write().insert(key, compiled);
        Ok(())
    }

    /// Validates `attributes` against the compiled schema for
    /// `(entity_type, version)`. Returns `Validation` if the schema hasn't
    /// been registered yet, since an adapter must `register_schema` before
    /// it can serve entities of that type.
    pub fn validate(
        &self,
        entity_type: &str,
        version: u32,
        attributes: &AttributeMap,
    ) -> Result<(), MeshError> {
        let instance = serde_json::to_value(attributes)
            .map_err(|e| MeshError::internal("failed to serialize attributes for validation").with_source(e.into()))?;

        let guard = self.compiled.read();
        let compiled = guard.get(&(entity_type.to_string(), version)).ok_or_else(|| {
            MeshError::new(
                ErrorKind::Validation,
                format!("no schema registered for {entity_type} v{version}"),
            )
        })?;

        if let Err(errors) = compiled.validate(&instance) {
            let detail: Vec<String> = errors.map(|e| e.to_string()).collect();
            return Err(MeshError::validation(format!(
                "schema validation failed for {entity_type}: {}",
                detail.join("; ")
            )));
        }
        Ok(())
    }
}

impl Default for Validator {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use dictamesh_types::{SchemaFormat, Value};

    fn product_schema() -> Schema {
        Schema {
            entity_type: "product".into(),
            version: 1,
            format: SchemaFormat::JsonSchema,
            definition: serde_json::json!({
                "type": "object",
                "properties": {"name": {"type": "string"}},
                "required": ["name"]
            }),
            registered_at: Utc::now(),
            compatibility: Default::default(),
        }
    }

    #[test]
    fn valid_attributes_pass() {
        let validator = Validator::new();
        validator.register(&product_schema()).unwrap();
        let mut attrs = AttributeMap::new();
        attrs.insert("name".into(), Value::String("Widget".into()));
        assert!(validator.validate("product", 1, &attrs).is_ok());
    }

    #[test]
    fn missing_required_field_fails() {
        let validator = Validator::new();
        validator.register(&product_schema()).unwrap();
        let attrs = AttributeMap::new();
        let err = validator.validate("product", 1, &attrs).unwrap_err();
        assert_eq!(err.kind, ErrorKind::Validation);
    }

    #[test]
    fn unregistered_type_is_rejected() {
        let validator = Validator::new();
        let attrs = AttributeMap::new();
        assert!(validator.validate("unknown", 1, &attrs).is_err());
    }
}
