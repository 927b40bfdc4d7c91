use log::debug;

use crate::context::Carrier;
use crate::error::GuardError;

use super::{ExtractResponse, Principal, PrincipalExtractor};

/// Parses a principal serialized as a UTF-8 JSON object in a request header.
///
/// A missing header defers to the next extractor. A header that is present
/// but blank, repeated, not UTF-8, or not a JSON object fails the invocation
/// instead of falling back to an anonymous principal.
pub struct HeaderExtractor {
    header: String,
}

impl HeaderExtractor {
    pub fn new(header: &str) -> Self {
        Self {
            header: header.to_lowercase(),
        }
    }

    fn malformed(&self, reason: &str) -> GuardError {
        GuardError::MalformedPrincipal {
            carrier: format!("header '{}'", self.header),
            reason: reason.to_string(),
        }
    }
}

impl PrincipalExtractor for HeaderExtractor {
    fn extract_principal(&self, carrier: &Carrier<'_>) -> Result<ExtractResponse, GuardError> {
        let (headers, unreadable) = match carrier {
            Carrier::Request {
                headers,
                unreadable,
                ..
            } => (headers, unreadable),
            _ => return Ok(ExtractResponse::Continue),
        };

        if unreadable.contains(&self.header) {
            return Err(self.malformed("repeated or not valid UTF-8"));
        }
        let raw = match headers.get(&self.header) {
            Some(raw) => raw.trim(),
            None => return Ok(ExtractResponse::Continue),
        };
        if raw.is_empty() {
            return Err(self.malformed("empty value"));
        }

        let principal =
            Principal::from_json(raw).map_err(|err| self.malformed(&err.to_string()))?;
        debug!("Read principal from header '{}'", self.header);

        Ok(ExtractResponse::Found(principal))
    }
}
