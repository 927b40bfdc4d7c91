use crate::context::Carrier;
use crate::error::GuardError;

use super::field::FieldExtractor;
use super::header::HeaderExtractor;
use super::{ExtractResponse, PrincipalExtractor};

pub enum UnionExtractor {
    Field(FieldExtractor),
    Header(HeaderExtractor),
}

impl PrincipalExtractor for UnionExtractor {
    fn extract_principal(&self, carrier: &Carrier<'_>) -> Result<ExtractResponse, GuardError> {
        match self {
            UnionExtractor::Field(e) => e.extract_principal(carrier),
            UnionExtractor::Header(e) => e.extract_principal(carrier),
        }
    }
}
