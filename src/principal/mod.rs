mod field;
mod header;
mod union;

pub mod chain;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::context::Carrier;
use crate::error::GuardError;
use crate::utils::lookup_path;

pub use field::FieldExtractor;
pub use header::HeaderExtractor;
pub use union::UnionExtractor;

/// The authenticated identity behind a request.
///
/// The engine treats the payload as opaque: it is a JSON object produced by an
/// external authentication layer and handed, untouched, to rule definitions
/// and subject hooks.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Principal(Map<String, Value>);

impl Principal {
    pub fn new(fields: Map<String, Value>) -> Self {
        Self(fields)
    }

    /// Parses a serialized principal. Anything but a JSON object is rejected.
    pub fn from_json(s: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(s)
    }

    pub fn from_value(value: Value) -> Result<Self, serde_json::Error> {
        serde_json::from_value(value)
    }

    /// Reads a dotted path inside the payload, e.g. `user.id`.
    pub fn get(&self, path: &str) -> Option<&Value> {
        let (head, rest) = match path.split_once('.') {
            Some((head, rest)) => (head, rest),
            None => (path, ""),
        };
        let value = self.0.get(head)?;
        lookup_path(value, rest)
    }

    /// The principal identifier, taken from `id` or `user.id`.
    pub fn id(&self) -> Option<&str> {
        self.get("id")
            .or_else(|| self.get("user.id"))
            .and_then(Value::as_str)
    }

    /// Role names listed under `roles`. Non-string entries are ignored.
    pub fn roles(&self) -> Vec<&str> {
        match self.0.get("roles") {
            Some(Value::Array(roles)) => roles.iter().filter_map(Value::as_str).collect(),
            _ => vec![],
        }
    }

    pub fn as_map(&self) -> &Map<String, Value> {
        &self.0
    }

    pub fn to_value(&self) -> Value {
        Value::Object(self.0.clone())
    }
}

/// Reads the principal from one kind of carrier.
pub trait PrincipalExtractor: Send + Sync {
    fn extract_principal(&self, carrier: &Carrier<'_>) -> Result<ExtractResponse, GuardError>;
}

/// Possible responses from a principal extractor.
#[derive(Debug, Clone)]
pub enum ExtractResponse {
    /// The carrier holds a principal
    Found(Principal),
    /// Nothing for this extractor, defers to the next one in chain
    Continue,
}
