//! Intent Resolution Engine
//!
//! Locates the governing intent inside a message tree, dispatches it to the
//! registered resolver and splices the result back in place of the intent.
//!
//! Search rules, applied at every object node:
//!
//! - Field names are visited in ascending ordinal order, so every encoder's
//!   field order yields the same intent.
//! - An `error` field aborts the whole resolution with
//!   [`ResolveError::ErrorMessage`], wherever it is met along the search path.
//! - Fields whose name ends in `!` are quoted and never searched.
//! - Object values are searched depth-first; for sequences only the first
//!   element is considered. A subtree without an intent lets the scan move on
//!   to the next sibling.
//! - When no descendant yields an intent, the node itself is the candidate.
//!
//! At most one intent is resolved per pass.

use crate::error::{DomainError, ResolveError};
use crate::message::{error_text, Intent};
use crate::resolver::ResolverRegistry;
use crate::types::{Fields, MessageTree, DATA_FIELD, ERROR_FIELD, ESCAPE_SUFFIX};
use serde_json::Value;
use std::fmt;
use std::sync::Arc;
use tracing::debug;

/// One step from a node to one of its children.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PathSegment {
    Field(String),
    Element(usize),
}

/// Location of an intent node relative to the root.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct IntentPath(Vec<PathSegment>);

impl IntentPath {
    pub fn segments(&self) -> &[PathSegment] {
        &self.0
    }

    pub fn is_root(&self) -> bool {
        self.0.is_empty()
    }
}

impl fmt::Display for IntentPath {
    /// JSON Pointer rendering (RFC 6901)
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for segment in &self.0 {
            match segment {
                PathSegment::Field(name) => {
                    write!(f, "/{}", name.replace('~', "~0").replace('/', "~1"))?
                }
                PathSegment::Element(index) => write!(f, "/{}", index)?,
            }
        }
        Ok(())
    }
}

/// Result of searching one subtree.
enum Search {
    Found(Vec<PathSegment>),
    NotFound,
    Fatal(ResolveError),
}

/// A completed resolution pass.
#[derive(Debug, Clone, PartialEq)]
pub struct Resolution {
    /// The updated message
    pub message: MessageTree,
    /// Name of the intent that was dispatched
    pub intent: String,
    /// Where the intent sat in the inbound message
    pub path: IntentPath,
    /// Domain failure rendered into the message, if the resolver declared one
    pub domain_error: Option<DomainError>,
}

/// Intent resolution engine over a frozen resolver registry
#[derive(Debug, Clone)]
pub struct IntentEngine {
    registry: Arc<ResolverRegistry>,
}

impl IntentEngine {
    pub fn new(registry: Arc<ResolverRegistry>) -> Self {
        Self { registry }
    }

    pub fn registry(&self) -> &ResolverRegistry {
        &self.registry
    }

    /// Find the governing intent without dispatching it.
    pub fn locate(&self, message: &MessageTree) -> Result<IntentPath, ResolveError> {
        let Value::Object(root) = message else {
            return Err(ResolveError::NotAnIntent);
        };
        match search(root) {
            Search::Found(segments) => Ok(IntentPath(segments)),
            Search::NotFound => Err(ResolveError::NotAnIntent),
            Search::Fatal(err) => Err(err),
        }
    }

    /// Resolve one intent in `message`.
    ///
    /// The inbound tree is never modified; on success the returned
    /// [`Resolution`] carries an updated copy.
    pub fn resolve_message(&self, message: &MessageTree) -> Result<Resolution, ResolveError> {
        let path = self.locate(message)?;
        let intent = node_at(message, &path)
            .and_then(Value::as_object)
            .and_then(Intent::from_fields)
            .ok_or(ResolveError::NotAnIntent)?;

        let resolver = self
            .registry
            .get(intent.name())
            .ok_or_else(|| ResolveError::NoResolver(intent.name().to_string()))?;

        debug!(intent = %intent.name(), path = %path, "Dispatching intent");

        let (replacement, domain_error) = match resolver.resolve(&intent, message) {
            Ok(mut fields) => {
                if let Some(data_type) = resolver.data_type() {
                    fields.insert(DATA_FIELD.to_string(), Value::String(data_type.to_string()));
                }
                (fields, None)
            }
            Err(err) => {
                debug!(intent = %intent.name(), error = %err, "Resolver declared a domain error");
                let mut fields = resolver.error_object(&err);
                fields.insert(ERROR_FIELD.to_string(), Value::String(err.message.clone()));
                (fields, Some(err))
            }
        };

        let mut updated = message.clone();
        let slot = node_at_mut(&mut updated, &path).ok_or(ResolveError::NotAnIntent)?;
        *slot = Value::Object(replacement);

        if let Some(err) = &domain_error {
            if let Value::Object(root) = &mut updated {
                root.insert(ERROR_FIELD.to_string(), Value::String(err.message.clone()));
            }
        }

        Ok(Resolution {
            message: updated,
            intent: intent.name().to_string(),
            path,
            domain_error,
        })
    }
}

fn is_quoted(key: &str) -> bool {
    key.ends_with(ESCAPE_SUFFIX)
}

fn search(node: &Fields) -> Search {
    let mut keys: Vec<&String> = node.keys().collect();
    keys.sort();

    for key in keys {
        let value = &node[key.as_str()];
        if key == ERROR_FIELD {
            return Search::Fatal(ResolveError::ErrorMessage(error_text(value)));
        }
        if is_quoted(key) {
            continue;
        }

        let (mut segments, child) = match value {
            Value::Object(child) => (vec![PathSegment::Field(key.clone())], child),
            Value::Array(items) => match items.first() {
                Some(Value::Object(child)) => (
                    vec![PathSegment::Field(key.clone()), PathSegment::Element(0)],
                    child,
                ),
                _ => continue,
            },
            _ => continue,
        };

        match search(child) {
            Search::Found(rest) => {
                segments.extend(rest);
                return Search::Found(segments);
            }
            Search::NotFound => continue,
            fatal @ Search::Fatal(_) => return fatal,
        }
    }

    if Intent::is_intent(node) {
        Search::Found(Vec::new())
    } else {
        Search::NotFound
    }
}

fn node_at<'a>(root: &'a Value, path: &IntentPath) -> Option<&'a Value> {
    path.segments()
        .iter()
        .try_fold(root, |node, segment| match segment {
            PathSegment::Field(name) => node.get(name.as_str()),
            PathSegment::Element(index) => node.get(*index),
        })
}

fn node_at_mut<'a>(root: &'a mut Value, path: &IntentPath) -> Option<&'a mut Value> {
    path.segments()
        .iter()
        .try_fold(root, |node, segment| match segment {
            PathSegment::Field(name) => node.get_mut(name.as_str()),
            PathSegment::Element(index) => node.get_mut(*index),
        })
}
