//! Byte-image abstraction with checked reads.
//!
//! A [`BoundsReader`] is a cheap, clonable view over a [`ByteImage`]. Every
//! read is bounds-checked up front; nothing here ever panics or indexes out
//! of range, no matter what offsets a caller supplies.

use scroll::{Pread, BE, LE};
use std::path::Path;
use std::sync::Arc;
use thiserror::Error;

#[derive(Debug, Error, PartialEq, Eq, Clone)]
pub enum BoundsError {
    #[error("insufficient data at offset {offset}: needed {needed} bytes, {available} available")]
    InsufficientData {
        offset: i64,
        needed: u64,
        available: u64,
    },
    #[error("failed to open or read file: {0}")]
    Io(String),
}

/// The backing storage for a [`BoundsReader`].
///
/// Binaries at or above [`crate::config::MMAP_THRESHOLD_BYTES`] are mapped
/// read-only; smaller ones are fully buffered. This choice is transparent
/// to callers of [`BoundsReader`].
enum ByteImage {
    Buffered(Vec<u8>),
    Mapped(memmap2::Mmap),
}

impl ByteImage {
    fn as_slice(&self) -> &[u8] {
        match self {
            ByteImage::Buffered(v) => v,
            ByteImage::Mapped(m) => m,
        }
    }
}

/// Owns a byte image (mapped or buffered) and hands out bounds-checked
/// [`BoundsReader`]s over slices of it.
pub struct Image {
    bytes: Arc<ByteImage>,
}

impl Image {
    /// Loads a file from disk, choosing mmap vs buffered per
    /// [`crate::config::MMAP_THRESHOLD_BYTES`].
    pub fn open(path: impl AsRef<Path>) -> Result<Self, BoundsError> {
        let path = path.as_ref();
        let file = std::fs::File::open(path).map_err(|e| BoundsError::Io(e.to_string()))?;
        let len = file
            .metadata()
            .map_err(|e| BoundsError::Io(e.to_string()))?
            .len();

        let bytes = if len >= crate::config::MMAP_THRESHOLD_BYTES {
            // SAFETY: we only ever read from this mapping; the file is not
            // modified out from under us for the lifetime of the analysis
            // (best-effort assumption shared with every mmap-based reader).
            let mmap = unsafe { memmap2::Mmap::map(&file) }
                .map_err(|e| BoundsError::Io(e.to_string()))?;
            ByteImage::Mapped(mmap)
        } else {
            use std::io::Read;
            let mut buf = Vec::with_capacity(len as usize);
            let mut file = file;
            file.read_to_end(&mut buf)
                .map_err(|e| BoundsError::Io(e.to_string()))?;
            ByteImage::Buffered(buf)
        };

        Ok(Self {
            bytes: Arc::new(bytes),
        })
    }

    /// Wraps an in-memory buffer directly (used by tests and by fat-binary
    /// slice selection when the caller already has bytes in hand).
    pub fn from_bytes(bytes: Vec<u8>) -> Self {
        Self {
            bytes: Arc::new(ByteImage::Buffered(bytes)),
        }
    }

    pub fn is_mapped(&self) -> bool {
        matches!(&*self.bytes, ByteImage::Mapped(_))
    }

    pub fn size(&self) -> u64 {
        self.bytes.as_slice().len() as u64
    }

    /// Returns a reader over the whole image.
    pub fn reader(&self) -> BoundsReader {
        BoundsReader {
            bytes: Arc::clone(&self.bytes),
            base: 0,
            len: self.size(),
        }
    }
}

/// A cheap, clonable, read-only view over a (sub-range of a) [`Image`].
///
/// Every read is validated against `[base, base + len)` of the backing
/// image; offsets passed to read methods are relative to this view, not the
/// underlying image.
#[derive(Clone)]
pub struct BoundsReader {
    bytes: Arc<ByteImage>,
    base: u64,
    len: u64,
}

impl BoundsReader {
    pub fn size(&self) -> u64 {
        self.len
    }

    fn checked_range(&self, offset: i64, needed: u64) -> Result<(usize, usize), BoundsError> {
        if offset < 0 {
            return Err(BoundsError::InsufficientData {
                offset,
                needed,
                available: 0,
            });
        }
        let offset = offset as u64;
        let end = offset.checked_add(needed).ok_or(BoundsError::InsufficientData {
            offset: offset as i64,
            needed,
            available: self.len.saturating_sub(offset),
        })?;
        if end > self.len {
            return Err(BoundsError::InsufficientData {
                offset: offset as i64,
                needed,
                available: self.len.saturating_sub(offset),
            });
        }
        let start = (self.base + offset) as usize;
        let stop = (self.base + end) as usize;
        Ok((start, stop))
    }

    /// Borrowed slice `[offset, offset+count)` of this view.
    pub fn read_bytes(&self, offset: i64, count: u64) -> Result<&[u8], BoundsError> {
        let (start, stop) = self.checked_range(offset, count)?;
        Ok(&self.bytes.as_slice()[start..stop])
    }

    pub fn read_u8(&self, offset: i64) -> Result<u8, BoundsError> {
        Ok(self.read_bytes(offset, 1)?[0])
    }

    pub fn read_u16(&self, offset: i64) -> Result<u16, BoundsError> {
        self.read_bytes(offset, 2)?
            .pread_with::<u16>(0, LE)
            .map_err(|_| BoundsError::InsufficientData {
                offset,
                needed: 2,
                available: self.len.saturating_sub(offset.max(0) as u64),
            })
    }

    pub fn read_u32(&self, offset: i64) -> Result<u32, BoundsError> {
        self.read_bytes(offset, 4)?
            .pread_with::<u32>(0, LE)
            .map_err(|_| BoundsError::InsufficientData {
                offset,
                needed: 4,
                available: self.len.saturating_sub(offset.max(0) as u64),
            })
    }

    pub fn read_u64(&self, offset: i64) -> Result<u64, BoundsError> {
        self.read_bytes(offset, 8)?
            .pread_with::<u64>(0, LE)
            .map_err(|_| BoundsError::InsufficientData {
                offset,
                needed: 8,
                available: self.len.saturating_sub(offset.max(0) as u64),
            })
    }

    pub fn read_u16_be(&self, offset: i64) -> Result<u16, BoundsError> {
        self.read_bytes(offset, 2)?
            .pread_with::<u16>(0, BE)
            .map_err(|_| BoundsError::InsufficientData {
                offset,
                needed: 2,
                available: 0,
            })
    }

    pub fn read_u32_be(&self, offset: i64) -> Result<u32, BoundsError> {
        self.read_bytes(offset, 4)?
            .pread_with::<u32>(0, BE)
            .map_err(|_| BoundsError::InsufficientData {
                offset,
                needed: 4,
                available: 0,
            })
    }

    pub fn read_u64_be(&self, offset: i64) -> Result<u64, BoundsError> {
        self.read_bytes(offset, 8)?
            .pread_with::<u64>(0, BE)
            .map_err(|_| BoundsError::InsufficientData {
                offset,
                needed: 8,
                available: 0,
            })
    }

    /// Reads the ASCII prefix up to the first NUL (or the whole field if
    /// there is none) of a fixed-width byte field.
    pub fn read_fixed_string(&self, offset: i64, length: u64) -> Result<String, BoundsError> {
        let bytes = self.read_bytes(offset, length)?;
        let end = bytes.iter().position(|&b| b == 0).unwrap_or(bytes.len());
        Ok(String::from_utf8_lossy(&bytes[..end]).into_owned())
    }

    /// Produces a new reader limited to `[offset, offset+count)` of this
    /// view. Used for fat-binary slice selection and for code-signature
    /// sub-regions.
    pub fn slice(&self, offset: i64, count: u64) -> Result<BoundsReader, BoundsError> {
        let (start, _stop) = self.checked_range(offset, count)?;
        Ok(BoundsReader {
            bytes: Arc::clone(&self.bytes),
            base: start as u64,
            len: count,
        })
    }
}
