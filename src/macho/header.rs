//! Mach-O and fat-binary header constants and parsing.
//!
//! Constants are named after their `usr/include/mach-o/*.h` counterparts,
//! matching the convention the teacher's `mach_helpers.rs` uses.

use super::error::ParseError;
use crate::bounds::BoundsReader;

/// 64-bit Mach-O magic, little-endian images.
pub const MH_MAGIC_64: u32 = 0xfeed_facf;
/// 64-bit Mach-O magic, big-endian images (not produced on any supported
/// host, but recognized so `InvalidMagic` reporting is precise).
pub const MH_CIGAM_64: u32 = 0xcffa_edfe;
/// 32-bit Mach-O magic; recognized only to be rejected with
/// [`ParseError::UnsupportedCPUType`].
pub const MH_MAGIC: u32 = 0xfeed_face;
pub const MH_CIGAM: u32 = 0xce_fa_ed_fe;

pub const FAT_MAGIC: u32 = 0xcafe_babe;
pub const FAT_CIGAM: u32 = 0xbeba_feca;
pub const FAT_MAGIC_64: u32 = 0xcafe_babf;
pub const FAT_CIGAM_64: u32 = 0xbfba_feca;

pub const CPU_ARCH_ABI64: u32 = 0x0100_0000;
pub const CPU_TYPE_X86: i32 = 7;
pub const CPU_TYPE_ARM: i32 = 12;
pub const CPU_TYPE_X86_64: i32 = CPU_TYPE_X86 | CPU_ARCH_ABI64 as i32;
pub const CPU_TYPE_ARM64: i32 = CPU_TYPE_ARM | CPU_ARCH_ABI64 as i32;

#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize)]
pub enum CpuType {
    Arm64,
    X86_64,
    Unknown(i32),
}

impl CpuType {
    pub fn from_raw(raw: i32) -> Self {
        match raw {
            CPU_TYPE_ARM64 => CpuType::Arm64,
            CPU_TYPE_X86_64 => CpuType::X86_64,
            other => CpuType::Unknown(other),
        }
    }

    pub fn to_raw(self) -> i32 {
        match self {
            CpuType::Arm64 => CPU_TYPE_ARM64,
            CpuType::X86_64 => CPU_TYPE_X86_64,
            CpuType::Unknown(raw) => raw,
        }
    }
}

/// `MH_*` file-type constants (a subset; unrecognized values are kept raw).
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize)]
pub enum FileType {
    Object,
    Execute,
    Dylib,
    Bundle,
    Core,
    Dsym,
    Unknown(u32),
}

impl FileType {
    fn from_raw(raw: u32) -> Self {
        match raw {
            0x1 => FileType::Object,
            0x2 => FileType::Execute,
            0x4 => FileType::Core,
            0x6 => FileType::Dylib,
            0x8 => FileType::Bundle,
            0xa => FileType::Dsym,
            other => FileType::Unknown(other),
        }
    }
}

#[derive(Debug, Clone, serde::Serialize)]
pub struct Header {
    pub magic: u32,
    pub cpu_type: CpuType,
    pub cpu_subtype: i32,
    pub file_type: FileType,
    pub num_load_commands: u32,
    pub size_of_commands: u32,
    pub flags: u32,
}

/// Mach header size in bytes (64-bit only, per spec §4.2 step 4).
pub const HEADER_SIZE: u64 = 32;

impl Header {
    /// Parses the 32-byte 64-bit Mach header at offset 0 of `reader`.
    ///
    /// Per spec §4.2 step 4: validates `magic == MH_MAGIC_64`.
    pub fn parse(reader: &BoundsReader) -> Result<Self, ParseError> {
        if reader.size() < HEADER_SIZE {
            return Err(ParseError::InsufficientData {
                offset: 0,
                needed: HEADER_SIZE,
                available: reader.size(),
            });
        }

        let magic = reader.read_u32(0)?;
        if magic != MH_MAGIC_64 {
            return Err(ParseError::InvalidMagic { found: magic, at: 0 });
        }

        let cpu_type = reader.read_u32(4)? as i32;
        let cpu_subtype = reader.read_u32(8)? as i32;
        let file_type = reader.read_u32(12)?;
        let num_load_commands = reader.read_u32(16)?;
        let size_of_commands = reader.read_u32(20)?;
        let flags = reader.read_u32(24)?;
        // offset 28..32 is the reserved field, unused here.

        Ok(Header {
            magic,
            cpu_type: CpuType::from_raw(cpu_type),
            cpu_subtype,
            file_type: FileType::from_raw(file_type),
            num_load_commands,
            size_of_commands,
            flags,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bounds::Image;

    fn header_bytes(cpu_type: i32, file_type: u32, ncmds: u32, sizeofcmds: u32) -> Vec<u8> {
        let mut v = Vec::new();
        v.extend_from_slice(&MH_MAGIC_64.to_le_bytes());
        v.extend_from_slice(&cpu_type.to_le_bytes());
        v.extend_from_slice(&0i32.to_le_bytes());
        v.extend_from_slice(&file_type.to_le_bytes());
        v.extend_from_slice(&ncmds.to_le_bytes());
        v.extend_from_slice(&sizeofcmds.to_le_bytes());
        v.extend_from_slice(&0u32.to_le_bytes()); // flags
        v.extend_from_slice(&0u32.to_le_bytes()); // reserved
        v
    }

    #[test]
    fn parses_arm64_executable_header() {
        let bytes = header_bytes(CPU_TYPE_ARM64, 2, 20, 2400);
        let img = Image::from_bytes(bytes);
        let header = Header::parse(&img.reader()).unwrap();
        assert_eq!(header.cpu_type, CpuType::Arm64);
        assert_eq!(header.file_type, FileType::Execute);
        assert_eq!(header.num_load_commands, 20);
    }

    #[test]
    fn b3_invalid_magic() {
        let img = Image::from_bytes(b"XXXXXXXXXXXXXXXXXXXXXXXXXXXXXXXX".to_vec());
        let err = Header::parse(&img.reader()).unwrap_err();
        assert!(matches!(
            err,
            ParseError::InvalidMagic {
                found: 0x5858_5858,
                at: 0
            }
        ));
    }

    // B4: truncated 16-byte file with valid magic
    #[test]
    fn b4_truncated_header() {
        let mut bytes = MH_MAGIC_64.to_le_bytes().to_vec();
        bytes.extend_from_slice(&[0u8; 12]);
        let img = Image::from_bytes(bytes);
        assert!(matches!(
            Header::parse(&img.reader()),
            Err(ParseError::InsufficientData { .. })
        ));
    }
}
