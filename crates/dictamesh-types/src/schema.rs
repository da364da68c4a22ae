//! Schema registration and compatibility.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SchemaFormat {
    Avro,
    JsonSchema,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Compatibility {
    Backward,
    Forward,
    Full,
    None,
}

impl Default for Compatibility {
    /// No compatibility flag is declared by default, so we take `backward`,
    /// matching `schema_registry_converter`'s default compatibility mode.
    fn default() -> Self {
        Compatibility::Backward
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Schema {
    pub entity_type: String,
    pub version: u32,
    pub format: SchemaFormat,
    pub definition: serde_json::Value,
    pub registered_at: DateTime<Utc>,
    #[serde(default)]
    pub compatibility: Compatibility,
}

/// A minimal view of a JSON-Schema-shaped `definition`: which top-level
/// properties exist, which are required, and which declare a default.
/// Real schemas are validated in full by `dictamesh-adapter`'s JSON-Schema
/// validator; this view only supports the compatibility check below.
struct FieldShape {
    required: BTreeSet<String>,
    has_default: BTreeSet<String>,
    all_properties: BTreeSet<String>,
}

fn field_shape(definition: &serde_json::Value) -> FieldShape {
    let mut required = BTreeSet::new();
    let mut has_default = BTreeSet::new();
    let mut all_properties = BTreeSet::new();

    if let Some(arr) = definition.get("required").and_then(|v| v.as_array()) {
        for name in arr.iter().filter_map(|v| v.as_str()) {
            required.insert(name.to_string());
        }
    }
    if let Some(props) = definition.get("properties").and_then(|v| v.as_object()) {
        for (name, schema) in props {
            all_properties.insert(name.clone());
            if schema.get("default").is_some() {
                has_default.insert(name.clone());
            }
        }
    }

    FieldShape {
        required,
        has_default,
        all_properties,
    }
}

/// Returns `Ok(())` if `next` is compatible with `previous` under `mode`,
/// otherwise an error describing the violation.
///
/// Backward compatibility: readers using `next` must still be able to
/// process data written under `previous`. A field present in `previous` may
/// only be dropped in `next` if it carried a declared default in
/// `previous` (so its absence is unambiguous to old data); a field that is
/// new or newly-required in `next` must carry a default, or `next` cannot
/// be read by tooling that only knows `previous`'s required set.
pub fn check_compatible(
    previous: &Schema,
    next: &Schema,
    mode: Compatibility,
) -> Result<(), CompatibilityViolation> {
    if mode == Compatibility::None {
        return Ok(());
    }

    let prev_shape = field_shape(&previous.definition);
    let next_shape = field_shape(&next.definition);

    if matches!(mode, Compatibility::Backward | Compatibility::Full) {
        for field in &prev_shape.all_properties {
            let dropped = !next_shape.all_properties.contains(field);
            if dropped && !prev_shape.has_default.contains(field) {
                return Err(CompatibilityViolation::DroppedFieldWithoutDefault(field.clone()));
            }
        }
        for field in &next_shape.required {
            let is_new = !prev_shape.all_properties.contains(field);
            let newly_required = !is_new && !prev_shape.required.contains(field);
            if (is_new || newly_required) && !next_shape.has_default.contains(field) {
                return Err(CompatibilityViolation::NewRequiredFieldWithoutDefault(
                    field.clone(),
                ));
            }
        }
    }

    if matches!(mode, Compatibility::Forward | Compatibility::Full) {
        for field in &next_shape.all_properties {
            let added = !prev_shape.all_properties.contains(field);
            if added && next_shape.required.contains(field) && !next_shape.has_default.contains(field)
            {
                return Err(CompatibilityViolation::NewRequiredFieldWithoutDefault(
                    field.clone(),
                ));
            }
        }
    }

    Ok(())
}

#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum CompatibilityViolation {
    #[error("field {0:?} was present and has been dropped without ever declaring a default")]
    DroppedFieldWithoutDefault(String),
    #[error("field {0:?} is required and has no default, breaking readers of older data")]
    NewRequiredFieldWithoutDefault(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    fn schema(version: u32, definition: serde_json::Value) -> Schema {
        Schema {
            entity_type: "product".into(),
            version,
            format: SchemaFormat::JsonSchema,
            definition,
            registered_at: Utc::now(),
            compatibility: Compatibility::Backward,
        }
    }

    #[test]
    fn adding_optional_field_with_default_is_backward_compatible() {
        let v1 = schema(
            1,
            serde_json::json!({"properties": {"id":{}, "name":{}, "price":{}}, "required": ["id","name","price"]}),
        );
        let v2 = schema(
            2,
            serde_json::json!({
                "properties": {"id":{}, "name":{}, "price":{}, "tags": {}},
                "required": ["id","name","price"]
            }),
        );
        assert!(check_compatible(&v1, &v2, Compatibility::Backward).is_ok());
    }

    #[test]
    fn dropping_field_without_default_is_rejected() {
        let v2 = schema(
            2,
            serde_json::json!({
                "properties": {"id":{}, "name":{}, "price":{}, "tags": {}},
                "required": ["id","name","price"]
            }),
        );
        let v3 = schema(
            3,
            serde_json::json!({"properties": {"id":{}, "name":{}, "price":{}}, "required": ["id","name","price"]}),
        );
        let err = check_compatible(&v2, &v3, Compatibility::Backward).unwrap_err();
        assert_eq!(err, CompatibilityViolation::DroppedFieldWithoutDefault("tags".into()));
    }

    #[test]
    fn dropping_field_with_declared_default_is_accepted() {
        let v2 = schema(
            2,
            serde_json::json!({
                "properties": {"id":{}, "name":{}, "price":{}, "tags": {"default": []}},
                "required": ["id","name","price"]
            }),
        );
        let v3 = schema(
            3,
            serde_json::json!({"properties": {"id":{}, "name":{}, "price":{}}, "required": ["id","name","price"]}),
        );
        assert!(check_compatible(&v2, &v3, Compatibility::Backward).is_ok());
    }

    #[test]
    fn new_required_field_without_default_is_rejected() {
        let v1 = schema(
            1,
            serde_json::json!({"properties": {"id":{}}, "required": ["id"]}),
        );
        let v2 = schema(
            2,
            serde_json::json!({"properties": {"id":{}, "sku":{}}, "required": ["id","sku"]}),
        );
        let err = check_compatible(&v1, &v2, Compatibility::Backward).unwrap_err();
        assert_eq!(
            err,
            CompatibilityViolation::NewRequiredFieldWithoutDefault("sku".into())
        );
    }
}
