//! Core types for the intent bus.

use serde_json::{Map, Value};

/// MessageTree: decoded representation of one bus message
pub type MessageTree = Value;

/// Fields: the key/value set of a single tree node
pub type Fields = Map<String, Value>;

/// Field naming the resolver an intent node is addressed to
pub const INTENT_FIELD: &str = "intent";

/// Field marking an error report at its nesting level
pub const ERROR_FIELD: &str = "error";

/// Field carrying a resolver's declared data type
pub const DATA_FIELD: &str = "data";

/// Trailing marker that quotes a field out of intent search
pub const ESCAPE_SUFFIX: char = '!';

/// Topic shared by every agent on the bus
pub const DEFAULT_TOPIC: &str = "intents";
