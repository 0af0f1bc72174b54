//! Typed serialization protocol for channel values and pending writes
//!
//! Storage backends never interpret channel values. They hand a value to a
//! [`SerializerProtocol`] and persist the returned `(type_tag, bytes)` pair,
//! then give both back to the same serializer on read.

use crate::error::{CheckpointError, Result};
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Type tag for JSON-encoded values
pub const JSON_TYPE: &str = "json";

/// Type tag for bincode-encoded values
pub const BINCODE_TYPE: &str = "bincode";

/// Protocol for serializing and deserializing checkpoint data
///
/// Implementations can provide custom serialization strategies
/// (JSON, bincode, compressed formats, etc.). The protocol is object safe so a
/// saver can hold it as `Arc<dyn SerializerProtocol>`.
pub trait SerializerProtocol: Send + Sync + std::fmt::Debug {
    /// Serialize a value, returning the type tag identifying the encoding and the bytes
    fn dumps_typed(&self, value: &Value) -> Result<(String, Vec<u8>)>;

    /// Deserialize bytes previously produced under `type_tag`
    fn loads_typed(&self, type_tag: &str, data: &[u8]) -> Result<Value>;

    /// Run a value through a full dumps/loads cycle
    fn normalize(&self, value: &Value) -> Result<Value> {
        let (type_tag, data) = self.dumps_typed(value)?;
        self.loads_typed(&type_tag, &data)
    }
}

/// JSON-based serializer (default)
#[derive(Debug, Clone, Default)]
pub struct JsonSerializer;

impl JsonSerializer {
    pub fn new() -> Self {
        Self
    }
}

impl SerializerProtocol for JsonSerializer {
    fn dumps_typed(&self, value: &Value) -> Result<(String, Vec<u8>)> {
        Ok((JSON_TYPE.to_string(), serde_json::to_vec(value)?))
    }

    fn loads_typed(&self, type_tag: &str, data: &[u8]) -> Result<Value> {
        match type_tag {
            JSON_TYPE => Ok(serde_json::from_slice(data)?),
            other => Err(CheckpointError::UnknownType(other.to_string())),
        }
    }
}

/// Binary serializer using bincode
///
/// bincode is not self-describing, so values are converted to [`BinaryValue`]
/// before encoding. Blobs tagged `"json"` are still readable, which lets a
/// store written with [`JsonSerializer`] be reopened with this serializer.
#[derive(Debug, Clone, Default)]
pub struct BincodeSerializer;

impl BincodeSerializer {
    pub fn new() -> Self {
        Self
    }
}

impl SerializerProtocol for BincodeSerializer {
    fn dumps_typed(&self, value: &Value) -> Result<(String, Vec<u8>)> {
        let mirror = BinaryValue::from(value);
        Ok((BINCODE_TYPE.to_string(), bincode::serialize(&mirror)?))
    }

    fn loads_typed(&self, type_tag: &str, data: &[u8]) -> Result<Value> {
        match type_tag {
            BINCODE_TYPE => {
                let mirror: BinaryValue = bincode::deserialize(data)?;
                Ok(mirror.into())
            }
            JSON_TYPE => Ok(serde_json::from_slice(data)?),
            other => Err(CheckpointError::UnknownType(other.to_string())),
        }
    }
}

/// Non-self-describing mirror of [`serde_json::Value`]
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
enum BinaryValue {
    Null,
    Bool(bool),
    Int(i64),
    UInt(u64),
    Float(f64),
    String(String),
    Array(Vec<BinaryValue>),
    Object(Vec<(String, BinaryValue)>),
}

impl From<&Value> for BinaryValue {
    fn from(value: &Value) -> Self {
        match value {
            Value::Null => BinaryValue::Null,
            Value::Bool(b) => BinaryValue::Bool(*b),
            Value::Number(n) => {
                if let Some(i) = n.as_i64() {
                    BinaryValue::Int(i)
                } else if let Some(u) = n.as_u64() {
                    BinaryValue::UInt(u)
                } else {
                    BinaryValue::Float(n.as_f64().unwrap_or_default())
                }
            }
            Value::String(s) => BinaryValue::String(s.clone()),
            Value::Array(items) => BinaryValue::Array(items.iter().map(Into::into).collect()),
            Value::Object(map) => BinaryValue::Object(
                map.iter()
                    .map(|(k, v)| (k.clone(), BinaryValue::from(v)))
                    .collect(),
            ),
        }
    }
}

impl From<BinaryValue> for Value {
    fn from(value: BinaryValue) -> Self {
        match value {
            BinaryValue::Null => Value::Null,
            BinaryValue::Bool(b) => Value::Bool(b),
            BinaryValue::Int(i) => Value::from(i),
            BinaryValue::UInt(u) => Value::from(u),
            // Non-finite floats have no JSON form
            BinaryValue::Float(f) => serde_json::Number::from_f64(f)
                .map(Value::Number)
                .unwrap_or(Value::Null),
            BinaryValue::String(s) => Value::String(s),
            BinaryValue::Array(items) => Value::Array(items.into_iter().map(Into::into).collect()),
            BinaryValue::Object(entries) => Value::Object(
                entries
                    .into_iter()
                    .map(|(k, v)| (k, Value::from(v)))
                    .collect(),
            ),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;
    use serde_json::json;

    fn sample() -> Value {
        json!({
            "name": "test",
            "value": 42,
            "ratio": 0.5,
            "big": u64::MAX,
            "tags": ["a", "b"],
            "nested": {"ok": true, "none": null}
        })
    }

    #[test]
    fn test_json_serializer() {
        let serializer = JsonSerializer::new();
        let (type_tag, bytes) = serializer.dumps_typed(&sample()).unwrap();
        assert_eq!(type_tag, JSON_TYPE);

        let restored = serializer.loads_typed(&type_tag, &bytes).unwrap();
        assert_eq!(restored, sample());
    }

    #[test]
    fn test_bincode_serializer() {
        let serializer = BincodeSerializer::new();
        let (type_tag, bytes) = serializer.dumps_typed(&sample()).unwrap();
        assert_eq!(type_tag, BINCODE_TYPE);

        let restored = serializer.loads_typed(&type_tag, &bytes).unwrap();
        assert_eq!(restored, sample());
    }

    #[test]
    fn test_bincode_reads_json_blobs() {
        let (type_tag, bytes) = JsonSerializer::new().dumps_typed(&sample()).unwrap();
        let restored = BincodeSerializer::new().loads_typed(&type_tag, &bytes).unwrap();
        assert_eq!(restored, sample());
    }

    #[test]
    fn test_unknown_type_tag() {
        let err = JsonSerializer::new().loads_typed("msgpack", b"\x01").unwrap_err();
        assert!(matches!(err, CheckpointError::UnknownType(tag) if tag == "msgpack"));
    }

    #[test]
    fn test_normalize_is_stable() {
        let serializer = JsonSerializer::new();
        let once = serializer.normalize(&sample()).unwrap();
        assert_eq!(serializer.normalize(&once).unwrap(), once);
    }

    fn arb_json() -> impl Strategy<Value = Value> {
        let leaf = prop_oneof![
            Just(Value::Null),
            any::<bool>().prop_map(Value::from),
            any::<i64>().prop_map(Value::from),
            "[a-z]{0,8}".prop_map(Value::from),
        ];
        leaf.prop_recursive(3, 24, 4, |inner| {
            prop_oneof![
                prop::collection::vec(inner.clone(), 0..4).prop_map(Value::Array),
                prop::collection::btree_map("[a-z]{1,4}", inner, 0..4)
                    .prop_map(|m| Value::Object(m.into_iter().collect())),
            ]
        })
    }

    proptest! {
        #[test]
        fn prop_bincode_preserves_values(value in arb_json()) {
            let serializer = BincodeSerializer::new();
            let (type_tag, bytes) = serializer.dumps_typed(&value).unwrap();
            prop_assert_eq!(serializer.loads_typed(&type_tag, &bytes).unwrap(), value);
        }
    }
}
