//! Big-endian SuperBlob framing: magic, blob-index table, and per-blob
//! magic dispatch (spec §4.4 "Protocol").

use crate::bounds::BoundsReader;

use super::code_directory::CodeDirectory;
use super::entitlements::Entitlements;
use super::error::SignatureError;
use super::CodeSignature;

pub const MAGIC_SUPERBLOB: u32 = 0xFADE_0CC0;
pub const MAGIC_CODEDIRECTORY: u32 = 0xFADE_0C02;
pub const MAGIC_ENTITLEMENTS_XML: u32 = 0xFADE_7171;
pub const MAGIC_ENTITLEMENTS_DER: u32 = 0xFADE_7172;
pub const MAGIC_REQUIREMENTS: u32 = 0xFADE_0C01;
pub const MAGIC_CMS_SIGNATURE: u32 = 0xFADE_0B01;

struct BlobIndexEntry {
    #[allow(dead_code)]
    slot: u32,
    offset: u32,
}

pub fn parse(reader: &BoundsReader) -> Result<CodeSignature, SignatureError> {
    let magic = reader.read_u32_be(0)?;
    if magic != MAGIC_SUPERBLOB {
        return Err(SignatureError::InvalidCodeSignatureMagic);
    }
    let length = reader.read_u32_be(4)? as u64;
    if length > reader.size() {
        return Err(SignatureError::InvalidCodeSignatureLength);
    }
    let count = reader.read_u32_be(8)?;

    let mut entries = Vec::with_capacity(count as usize);
    for i in 0..count {
        let base = 12 + (i as i64) * 8;
        let slot = reader.read_u32_be(base)?;
        let offset = reader.read_u32_be(base + 4)?;
        entries.push(BlobIndexEntry { slot, offset });
    }

    let mut signature = CodeSignature::default();

    for entry in &entries {
        let blob_magic = reader.read_u32_be(entry.offset as i64)?;
        let blob_length = reader.read_u32_be(entry.offset as i64 + 4)? as u64;
        if (entry.offset as u64) + blob_length > length {
            return Err(SignatureError::InvalidCodeSignatureLength);
        }
        let blob = reader.slice(entry.offset as i64, blob_length)?;

        match blob_magic {
            MAGIC_CODEDIRECTORY => {
                signature.code_directory = Some(CodeDirectory::parse(&blob)?);
            }
            MAGIC_ENTITLEMENTS_XML => {
                let body = blob.read_bytes(8, blob_length - 8)?;
                signature.entitlements = Some(Entitlements::parse_xml(body)?);
            }
            MAGIC_ENTITLEMENTS_DER => {
                let body = blob.read_bytes(8, blob_length - 8)?;
                signature.der_entitlements = Some(Entitlements::parse_der(body)?);
            }
            MAGIC_REQUIREMENTS => {
                signature.requirements = Some(blob.read_bytes(0, blob_length)?.to_vec());
            }
            MAGIC_CMS_SIGNATURE => {
                signature.cms_signature = Some(blob.read_bytes(0, blob_length)?.to_vec());
            }
            _ => {
                // Unrecognized blob kinds are simply not exposed; the
                // SuperBlob framing itself is still valid.
            }
        }
    }

    Ok(signature)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bounds::Image;

    fn be32(v: u32) -> [u8; 4] {
        v.to_be_bytes()
    }

    #[test]
    fn rejects_bad_magic() {
        let mut bytes = Vec::new();
        bytes.extend_from_slice(&be32(0xdead_beef));
        bytes.extend_from_slice(&be32(12));
        bytes.extend_from_slice(&be32(0));
        let reader = Image::from_bytes(bytes).reader();
        assert!(matches!(
            parse(&reader),
            Err(SignatureError::InvalidCodeSignatureMagic)
        ));
    }

    #[test]
    fn rejects_length_past_buffer() {
        let mut bytes = Vec::new();
        bytes.extend_from_slice(&be32(MAGIC_SUPERBLOB));
        bytes.extend_from_slice(&be32(999));
        bytes.extend_from_slice(&be32(0));
        let reader = Image::from_bytes(bytes).reader();
        assert!(matches!(
            parse(&reader),
            Err(SignatureError::InvalidCodeSignatureLength)
        ));
    }

    #[test]
    fn empty_superblob_has_no_code_directory() {
        let mut bytes = Vec::new();
        bytes.extend_from_slice(&be32(MAGIC_SUPERBLOB));
        bytes.extend_from_slice(&be32(12));
        bytes.extend_from_slice(&be32(0));
        let reader = Image::from_bytes(bytes).reader();
        let sig = parse(&reader).unwrap();
        assert!(sig.code_directory.is_none());
    }

    #[test]
    fn requirements_blob_retained_opaque() {
        let mut bytes = Vec::new();
        bytes.extend_from_slice(&be32(MAGIC_SUPERBLOB));
        // header(12) + one index entry(8) + requirements blob(8 header + 4 payload)
        bytes.extend_from_slice(&be32(12 + 8 + 12));
        bytes.extend_from_slice(&be32(1));
        bytes.extend_from_slice(&be32(0)); // slot
        bytes.extend_from_slice(&be32(20)); // offset of the requirements blob
        bytes.extend_from_slice(&be32(MAGIC_REQUIREMENTS));
        bytes.extend_from_slice(&be32(12));
        bytes.extend_from_slice(&[0xaa, 0xbb, 0xcc, 0xdd]);
        let reader = Image::from_bytes(bytes).reader();
        let sig = parse(&reader).unwrap();
        assert_eq!(sig.requirements.as_deref(), Some(&[0xaa, 0xbb, 0xcc, 0xdd][..]));
    }
}
