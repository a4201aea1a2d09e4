use crate::bounds::BoundsError;
use thiserror::Error;

/// Errors that can occur while parsing a Mach-O file into a [`super::Binary`].
///
/// Every structural violation produces one of these with contextual
/// offsets; the parser never panics and never exposes a partial `Binary`.
#[derive(Debug, Error)]
pub enum ParseError {
    #[error("file not found: {0}")]
    FileNotFound(String),
    #[error("insufficient data at offset {offset}: needed {needed} bytes, {available} available")]
    InsufficientData {
        offset: i64,
        needed: u64,
        available: u64,
    },
    #[error("invalid magic {found:#x} at offset {at}")]
    InvalidMagic { found: u32, at: u64 },
    #[error("invalid fat header magic")]
    InvalidFatMagic,
    #[error("fat binary has zero architecture records")]
    EmptyFatBinary,
    #[error("no architecture slice matching the requested CPU type was found")]
    ArchitectureNotFound,
    #[error("unsupported CPU type or word width for this parser")]
    UnsupportedCPUType,
    #[error("header was truncated")]
    TruncatedHeader,
    #[error("load command size was invalid (< 8 bytes or not 8-byte aligned)")]
    InvalidLoadCommandSize,
    #[error("sum of load command sizes did not match header.size_of_commands")]
    LoadCommandSizeMismatch,
    #[error("segment data is out of bounds of the image")]
    SegmentOutOfBounds,
    #[error("section data is out of bounds of the image")]
    SectionOutOfBounds,
    #[error("symbol not found")]
    SymbolNotFound,
    #[error("{0}")]
    Custom(String),
}

impl From<BoundsError> for ParseError {
    fn from(e: BoundsError) -> Self {
        match e {
            BoundsError::InsufficientData {
                offset,
                needed,
                available,
            } => ParseError::InsufficientData {
                offset,
                needed,
                available,
            },
            BoundsError::Io(msg) => ParseError::FileNotFound(msg),
        }
    }
}
