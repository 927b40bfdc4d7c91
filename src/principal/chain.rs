use crate::context::Carrier;
use crate::error::GuardError;

use super::union::UnionExtractor;
use super::{ExtractResponse, Principal, PrincipalExtractor};

/// Runs extractors in order; the first one that finds a principal wins.
pub struct ChainExtractor {
    extractors: Vec<UnionExtractor>,
}

impl ChainExtractor {
    pub fn new(extractors: Vec<UnionExtractor>) -> Self {
        Self { extractors }
    }

    /// Returns the principal for the carrier, `None` for an anonymous caller.
    pub fn principal(&self, carrier: &Carrier<'_>) -> Result<Option<Principal>, GuardError> {
        match self.extract_principal(carrier)? {
            ExtractResponse::Found(principal) => Ok(Some(principal)),
            ExtractResponse::Continue => Ok(None),
        }
    }
}

impl PrincipalExtractor for ChainExtractor {
    fn extract_principal(&self, carrier: &Carrier<'_>) -> Result<ExtractResponse, GuardError> {
        for extractor in self.extractors.iter() {
            match extractor.extract_principal(carrier)? {
                ExtractResponse::Found(principal) => return Ok(ExtractResponse::Found(principal)),
                ExtractResponse::Continue => continue,
            }
        }

        Ok(ExtractResponse::Continue)
    }
}
