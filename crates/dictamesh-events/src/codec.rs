//! Avro encode/decode with an embedded schema id.
//!
//! Wire format: a single `0` magic byte, the schema id as a big-endian
//! `u64`, then the Avro binary datum — the same shape the Confluent wire
//! format uses, adapted to our in-memory registry's numeric ids instead
//! of a subject-based REST lookup.

use apache_avro::{from_avro_datum, to_avro_datum, types::Value as AvroValue};
use dictamesh_types::Event;

use crate::error::EventError;
use crate::schema_registry::SchemaRegistry;

const MAGIC: u8 = 0;

pub fn encode(registry: &SchemaRegistry, schema_id: u64, event: &Event) -> Result<Vec<u8>, EventError> {
    let schema = registry.avro_schema(schema_id)?;
    let avro_value: AvroValue = apache_avro::to_value(event)?;
    let avro_value = avro_value.resolve(&schema)?;
    let datum = to_avro_datum(&schema, avro_value)?;

    let mut out = Vec::with_capacity(1 + 8 + datum.len());
    out.push(MAGIC);
    out.extend_from_slice(&schema_id.to_be_bytes());
    out.extend_from_slice(&datum);
    Ok(out)
}

pub fn decode(registry: &SchemaRegistry, bytes: &[u8]) -> Result<(u64, Event), EventError> {
    if bytes.len() < 9 || bytes[0] != MAGIC {
        return Err(EventError::Broker("malformed event envelope: missing schema header".into()));
    }
    let schema_id = u64::from_be_bytes(bytes[1..9].try_into().unwrap());
    let schema = registry.avro_schema(schema_id)?;
    let mut cursor = &bytes[9..];
    let avro_value = from_avro_datum(&schema, &mut cursor, None)?;
    let event: Event = apache_avro::from_value(&avro_value)?;
    Ok((schema_id, event))
}
