use serde_json::Value;

use crate::context::Carrier;
use crate::error::GuardError;

use super::{ExtractResponse, Principal, PrincipalExtractor};

/// Reads a principal that an external authentication layer already placed on
/// the carrier: the `user` field of a request or socket client, or a named
/// key of the RPC context.
pub struct FieldExtractor {
    rpc_field: String,
}

impl FieldExtractor {
    pub fn new(rpc_field: impl Into<String>) -> Self {
        Self {
            rpc_field: rpc_field.into(),
        }
    }
}

impl PrincipalExtractor for FieldExtractor {
    fn extract_principal(&self, carrier: &Carrier<'_>) -> Result<ExtractResponse, GuardError> {
        match carrier {
            Carrier::Request { user, .. } | Carrier::Client { user } => match user {
                Some(user) => Ok(ExtractResponse::Found((*user).clone())),
                None => Ok(ExtractResponse::Continue),
            },
            Carrier::Rpc { context } => {
                let value = match context.get(&self.rpc_field) {
                    Some(Value::Null) | None => return Ok(ExtractResponse::Continue),
                    Some(value) => value.clone(),
                };
                let principal = Principal::from_value(value).map_err(|source| {
                    GuardError::MalformedPrincipal {
                        carrier: format!("rpc context field '{}'", self.rpc_field),
                        reason: source.to_string(),
                    }
                })?;
                Ok(ExtractResponse::Found(principal))
            }
        }
    }
}
