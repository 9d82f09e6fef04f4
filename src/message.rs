//! Message codec and the intent projection.
//!
//! Bus payloads are UTF-8 JSON objects. An intent is any object node that
//! carries a string `intent` field; the projection keeps the name alongside
//! every sibling field of that node.

use crate::error::AgentError;
use crate::types::{Fields, MessageTree, INTENT_FIELD};
use serde_json::Value;

/// Decode raw bus bytes into a message tree.
///
/// The top level must be a JSON object.
pub fn decode(bytes: &[u8]) -> Result<MessageTree, AgentError> {
    let text = std::str::from_utf8(bytes)
        .map_err(|e| AgentError::Decode(format!("payload is not UTF-8: {}", e)))?;
    let tree: MessageTree = serde_json::from_str(text)
        .map_err(|e| AgentError::Decode(format!("payload is not JSON: {}", e)))?;
    if !tree.is_object() {
        return Err(AgentError::Decode(
            "top-level message must be a JSON object".to_string(),
        ));
    }
    Ok(tree)
}

/// Encode a message tree as compact JSON bytes.
pub fn encode(tree: &MessageTree) -> Result<Vec<u8>, AgentError> {
    Ok(serde_json::to_vec(tree)?)
}

/// Render a value for an error report: strings verbatim, anything else as JSON.
pub fn error_text(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

/// Projection of a tree node addressed to a resolver.
#[derive(Debug, Clone, PartialEq)]
pub struct Intent {
    name: String,
    fields: Fields,
}

impl Intent {
    /// Project a node as an intent; `None` unless `intent` is a string.
    pub fn from_fields(fields: &Fields) -> Option<Self> {
        let name = fields.get(INTENT_FIELD)?.as_str()?.to_string();
        Some(Self {
            name,
            fields: fields.clone(),
        })
    }

    /// Whether a node would project as an intent.
    pub fn is_intent(fields: &Fields) -> bool {
        matches!(fields.get(INTENT_FIELD), Some(Value::String(_)))
    }

    /// Resolver name
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn get(&self, key: &str) -> Option<&Value> {
        self.fields.get(key)
    }

    pub fn get_str(&self, key: &str) -> Option<&str> {
        self.fields.get(key).and_then(Value::as_str)
    }

    /// All fields of the node, `intent` included
    pub fn fields(&self) -> &Fields {
        &self.fields
    }

    /// Sibling fields of the node, `intent` excluded
    pub fn arguments(&self) -> impl Iterator<Item = (&String, &Value)> {
        self.fields.iter().filter(|(key, _)| key.as_str() != INTENT_FIELD)
    }
}
