use thiserror::Error;

use crate::bounds::BoundsError;

/// Errors from parsing a code-signature SuperBlob (spec §4.4 "Failure semantics").
#[derive(Debug, Error)]
pub enum SignatureError {
    #[error("invalid code signature SuperBlob magic")]
    InvalidCodeSignatureMagic,
    #[error("a blob extends past the code signature region")]
    InvalidCodeSignatureLength,
    #[error("malformed entitlements payload: {0}")]
    InvalidEntitlementsFormat(String),
    #[error("insufficient data at offset {offset}: needed {needed} bytes, {available} available")]
    InsufficientData {
        offset: i64,
        needed: u64,
        available: u64,
    },
}

impl From<BoundsError> for SignatureError {
    fn from(e: BoundsError) -> Self {
        match e {
            BoundsError::InsufficientData { offset, needed, available } => {
                SignatureError::InsufficientData { offset, needed, available }
            }
            BoundsError::Io(_) => SignatureError::InvalidCodeSignatureLength,
        }
    }
}
