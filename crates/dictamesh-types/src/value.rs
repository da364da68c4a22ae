//! Open, source-agnostic attribute values.
//!
//! Source records arrive as open maps of heterogeneous shape; rather than
//! forcing them through a rigid struct, attributes are kept as a tagged
//! union. Validation against
//! the entity type's registered schema happens separately, at the
//! boundary where an attribute map is about to become part of a catalog
//! row (see `dictamesh-adapter`'s validator).

use std::collections::BTreeMap;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Value {
    Null,
    Bool(bool),
    Int(i64),
    Float(f64),
    String(String),
    Bytes(#[serde(with = "bytes_as_base64")] Vec<u8>),
    Timestamp(DateTime<Utc>),
    List(Vec<Value>),
    Map(BTreeMap<String, Value>),
}

impl Value {
    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::String(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_i64(&self) -> Option<i64> {
        match self {
            Value::Int(i) => Some(*i),
            Value::Float(f) => Some(*f as i64),
            _ => None,
        }
    }

    pub fn is_null(&self) -> bool {
        matches!(self, Value::Null)
    }
}

impl From<&str> for Value {
    fn from(s: &str) -> Self {
        Value::String(s.to_string())
    }
}

impl From<String> for Value {
    fn from(s: String) -> Self {
        Value::String(s)
    }
}

impl From<i64> for Value {
    fn from(i: i64) -> Self {
        Value::Int(i)
    }
}

impl From<f64> for Value {
    fn from(f: f64) -> Self {
        Value::Float(f)
    }
}

impl From<bool> for Value {
    fn from(b: bool) -> Self {
        Value::Bool(b)
    }
}

/// An open mapping of attribute name to [`Value`], in canonical key order so
/// that diffing (§4.5 "Change detection") is deterministic.
pub type AttributeMap = BTreeMap<String, Value>;

/// Converts a `serde_json::Value` tree (the shape most connectors produce)
/// into our attribute [`Value`] tree.
impl From<serde_json::Value> for Value {
    fn from(v: serde_json::Value) -> Self {
        match v {
            serde_json::Value::Null => Value::Null,
            serde_json::Value::Bool(b) => Value::Bool(b),
            serde_json::Value::Number(n) => {
                if let Some(i) = n.as_i64() {
                    Value::Int(i)
                } else {
                    Value::Float(n.as_f64().unwrap_or_default())
                }
            }
            serde_json::Value::String(s) => Value::String(s),
            serde_json::Value::Array(a) => Value::List(a.into_iter().map(Value::from).collect()),
            serde_json::Value::Object(o) => {
                Value::Map(o.into_iter().map(|(k, v)| (k, Value::from(v))).collect())
            }
        }
    }
}

mod bytes_as_base64 {
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(bytes: &[u8], s: S) -> Result<S::Ok, S::Error> {
        use base64::Engine;
        s.serialize_str(&base64::engine::general_purpose::STANDARD.encode(bytes))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<Vec<u8>, D::Error> {
        use base64::Engine;
        let s = String::deserialize(d)?;
        base64::engine::general_purpose::STANDARD
            .decode(s)
            .map_err(serde::de::Error::custom)
    }
}

/// Computes the set of top-level attribute keys whose values differ between
/// `before` and `after`, by deep equality.
pub fn changed_fields(before: &AttributeMap, after: &AttributeMap) -> Vec<String> {
    let mut changed = Vec::new();
    for (key, after_value) in after {
        match before.get(key) {
            Some(before_value) if before_value == after_value => {}
            _ => changed.push(key.clone()),
        }
    }
    for key in before.keys() {
        if !after.contains_key(key) {
            changed.push(key.clone());
        }
    }
    changed.sort();
    changed.dedup();
    changed
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn changed_fields_detects_additions_removals_and_changes() {
        let mut before = AttributeMap::new();
        before.insert("price".into(), Value::Float(19.99));
        before.insert("name".into(), Value::String("Widget".into()));

        let mut after = before.clone();
        after.insert("price".into(), Value::Float(29.99));
        after.remove("name");
        after.insert("category_id".into(), Value::String("C1".into()));

        let mut diff = changed_fields(&before, &after);
        diff.sort();
        assert_eq!(diff, vec!["category_id", "name", "price"]);
    }

    #[test]
    fn changed_fields_is_empty_for_identical_maps() {
        let mut m = AttributeMap::new();
        m.insert("a".into(), Value::Int(1));
        assert!(changed_fields(&m, &m).is_empty());
    }

    #[test]
    fn json_value_conversion_preserves_shape() {
        let json = serde_json::json!({"a": 1, "b": [true, null, "x"]});
        let value: Value = json.into();
        match value {
            Value::Map(m) => {
                assert_eq!(m.get("a"), Some(&Value::Int(1)));
            }
            _ => panic!("expected map"),
        }
    }
}
