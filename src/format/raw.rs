//! Raw passthrough format: no schema, bytes copied verbatim.

use super::{DocFormatter, DocValidator, DocumentType, FormatError};

pub struct RawValidator;

impl DocValidator for RawValidator {
    fn doc_type(&self) -> DocumentType {
        DocumentType::new("application/octet-stream")
    }

    fn validate(
        &self,
        _input: &[u8],
        requested: &DocumentType,
    ) -> Result<DocumentType, FormatError> {
        Ok(requested.clone())
    }
}

pub struct RawFormatter;

impl DocFormatter for RawFormatter {
    fn output_type(&self) -> DocumentType {
        DocumentType::new("application/octet-stream")
    }

    fn convert(&self, input: &[u8], output: &mut Vec<u8>) -> Result<(), FormatError> {
        output.extend_from_slice(input);
        Ok(())
    }
}
