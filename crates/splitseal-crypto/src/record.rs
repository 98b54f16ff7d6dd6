//! Canonical byte form of a protected record
//!
//! Records serialize to compact JSON with keys in sorted order, so equal
//! records always produce identical bytes.

use splitseal_core::{ProtectedRecord, SealError, SealResult};

pub fn encode(record: &ProtectedRecord) -> SealResult<Vec<u8>> {
    serde_json::to_vec(record)
        .map_err(|e| SealError::Other(anyhow::anyhow!("record serialization: {e}")))
}

/// Parse bytes back into a record. Anything that is not a JSON object is
/// a corrupted payload.
pub fn decode(bytes: &[u8]) -> SealResult<ProtectedRecord> {
    match serde_json::from_slice::<serde_json::Value>(bytes) {
        Ok(serde_json::Value::Object(map)) => Ok(map),
        Ok(other) => Err(SealError::CorruptedPayload(format!(
            "expected a structured record, found {}",
            json_kind(&other)
        ))),
        Err(e) => Err(SealError::CorruptedPayload(format!(
            "record deserialization: {e}"
        ))),
    }
}

fn json_kind(value: &serde_json::Value) -> &'static str {
    match value {
        serde_json::Value::Null => "null",
        serde_json::Value::Bool(_) => "a boolean",
        serde_json::Value::Number(_) => "a number",
        serde_json::Value::String(_) => "a string",
        serde_json::Value::Array(_) => "an array",
        serde_json::Value::Object(_) => "an object",
    }
}
