//! Checkpoint serialization

use serde_json::Value;
use std::collections::BTreeMap;

use crate::error::Result;

/// Converts context entries to bytes and back.
///
/// Implementations must round-trip every value a context may hold.
pub trait ExecutionContextSerializer: Send + Sync {
    /// Serialize the entries
    fn serialize(&self, entries: &BTreeMap<String, Value>) -> Result<Vec<u8>>;

    /// Deserialize entries produced by `serialize`
    fn deserialize(&self, bytes: &[u8]) -> Result<BTreeMap<String, Value>>;
}

/// JSON serializer, the default
#[derive(Debug, Clone, Copy, Default)]
pub struct JsonExecutionContextSerializer;

impl ExecutionContextSerializer for JsonExecutionContextSerializer {
    fn serialize(&self, entries: &BTreeMap<String, Value>) -> Result<Vec<u8>> {
        Ok(serde_json::to_vec(entries)?)
    }

    fn deserialize(&self, bytes: &[u8]) -> Result<BTreeMap<String, Value>> {
        if bytes.is_empty() {
            return Ok(BTreeMap::new());
        }
        Ok(serde_json::from_slice(bytes)?)
    }
}
