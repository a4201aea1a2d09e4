//! Code-signature SuperBlob decoding: CodeDirectory, CDHash, and
//! entitlements (XML plist and DER). See spec §4.4.

pub mod code_directory;
pub mod entitlements;
pub mod error;
pub mod superblob;

use crate::bounds::BoundsReader;

pub use code_directory::{CodeDirectory, CodeDirectoryFlags, HashType};
pub use entitlements::{EntitlementValue, Entitlements};
pub use error::SignatureError;

/// Everything this crate decodes out of a Mach-O code-signature SuperBlob.
///
/// Blob kinds the decoder doesn't recognize are silently dropped rather than
/// failing the parse; the SuperBlob framing itself is what's validated.
#[derive(Debug, Clone, Default, serde::Serialize)]
pub struct CodeSignature {
    pub code_directory: Option<CodeDirectory>,
    pub entitlements: Option<Entitlements>,
    pub der_entitlements: Option<Entitlements>,
    pub requirements: Option<Vec<u8>>,
    pub cms_signature: Option<Vec<u8>>,
}

impl CodeSignature {
    pub fn parse(reader: &BoundsReader) -> Result<Self, SignatureError> {
        superblob::parse(reader)
    }
}
