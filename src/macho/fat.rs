//! Fat (universal) binary headers and architecture-slice selection.

use super::error::ParseError;
use super::header::{CpuType, FAT_CIGAM, FAT_CIGAM_64, FAT_MAGIC, FAT_MAGIC_64};
use crate::bounds::BoundsReader;

/// One `fat_arch`/`fat_arch_64` record: the offset and size of a thin
/// Mach-O slice embedded in a fat binary.
#[derive(Debug, Clone, Copy, serde::Serialize)]
pub struct FatArch {
    pub cpu_type: CpuType,
    pub cpu_subtype: i32,
    pub offset: u64,
    pub size: u64,
    pub align: u32,
}

/// The parsed `fat_header` plus its architecture records.
///
/// Fat headers are big-endian, unlike everything else in a Mach-O file —
/// see spec §4.2 step 2.
#[derive(Debug, Clone, serde::Serialize)]
pub struct FatHeader {
    pub magic: u32,
    pub archs: Vec<FatArch>,
}

const FAT_HEADER_SIZE: u64 = 8;
const FAT_ARCH_SIZE: u64 = 20;
const FAT_ARCH_64_SIZE: u64 = 32;

impl FatHeader {
    /// Returns `true` if `magic` identifies a 32- or 64-bit fat header
    /// (in either byte order, though only big-endian is ever produced).
    pub fn magic_is_fat(magic: u32) -> bool {
        matches!(magic, FAT_MAGIC | FAT_CIGAM | FAT_MAGIC_64 | FAT_CIGAM_64)
    }

    /// Parses a fat header starting at offset 0 of `reader`. Caller has
    /// already confirmed the magic via [`Self::magic_is_fat`].
    pub fn parse(reader: &BoundsReader) -> Result<Self, ParseError> {
        let magic = reader.read_u32_be(0)?;
        let is_64 = matches!(magic, FAT_MAGIC_64 | FAT_CIGAM_64);
        if !Self::magic_is_fat(magic) {
            return Err(ParseError::InvalidFatMagic);
        }

        let nfat_arch = reader.read_u32_be(4)?;
        if nfat_arch == 0 {
            return Err(ParseError::EmptyFatBinary);
        }

        let arch_size = if is_64 { FAT_ARCH_64_SIZE } else { FAT_ARCH_SIZE };
        let mut archs = Vec::with_capacity(nfat_arch as usize);
        for i in 0..nfat_arch as u64 {
            let base = (FAT_HEADER_SIZE + i * arch_size) as i64;
            let cpu_type = reader.read_u32_be(base)? as i32;
            let cpu_subtype = reader.read_u32_be(base + 4)? as i32;
            let (offset, size, align) = if is_64 {
                (
                    reader.read_u64_be(base + 8)?,
                    reader.read_u64_be(base + 16)?,
                    reader.read_u32_be(base + 24)?,
                )
            } else {
                (
                    reader.read_u32_be(base + 8)? as u64,
                    reader.read_u32_be(base + 12)? as u64,
                    reader.read_u32_be(base + 16)?,
                )
            };
            archs.push(FatArch {
                cpu_type: CpuType::from_raw(cpu_type),
                cpu_subtype,
                offset,
                size,
                align,
            });
        }

        Ok(FatHeader { magic, archs })
    }

    /// Picks the slice matching `wanted`, or the first ARM64 slice if no
    /// CPU type was requested. Per spec §4.2 step 3.
    pub fn select(&self, wanted: Option<CpuType>) -> Result<&FatArch, ParseError> {
        let wanted = wanted.unwrap_or(CpuType::Arm64);
        self.archs
            .iter()
            .find(|a| a.cpu_type == wanted)
            .ok_or(ParseError::ArchitectureNotFound)
    }

    /// Carves out the thin-Mach-O reader for `arch` from the full fat image.
    pub fn slice_for(&self, reader: &BoundsReader, arch: &FatArch) -> Result<BoundsReader, ParseError> {
        Ok(reader.slice(arch.offset as i64, arch.size)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bounds::Image;
    use crate::macho::header::{CPU_TYPE_ARM64, CPU_TYPE_X86_64, MH_MAGIC_64};

    fn fat_bytes(archs: &[(i32, u64, u64)]) -> Vec<u8> {
        let mut v = Vec::new();
        v.extend_from_slice(&FAT_MAGIC.to_be_bytes());
        v.extend_from_slice(&(archs.len() as u32).to_be_bytes());
        for &(cpu_type, offset, size) in archs {
            v.extend_from_slice(&(cpu_type as u32).to_be_bytes());
            v.extend_from_slice(&0u32.to_be_bytes());
            v.extend_from_slice(&(offset as u32).to_be_bytes());
            v.extend_from_slice(&(size as u32).to_be_bytes());
            v.extend_from_slice(&0u32.to_be_bytes());
        }
        v
    }

    #[test]
    fn parses_two_slices_and_selects_arm64() {
        let bytes = fat_bytes(&[(CPU_TYPE_X86_64, 4096, 1024), (CPU_TYPE_ARM64, 8192, 2048)]);
        let img = Image::from_bytes(bytes);
        let header = FatHeader::parse(&img.reader()).unwrap();
        assert_eq!(header.archs.len(), 2);
        let chosen = header.select(None).unwrap();
        assert_eq!(chosen.cpu_type, CpuType::Arm64);
        assert_eq!(chosen.offset, 8192);
    }

    #[test]
    fn architecture_not_found() {
        let bytes = fat_bytes(&[(CPU_TYPE_X86_64, 4096, 1024)]);
        let img = Image::from_bytes(bytes);
        let header = FatHeader::parse(&img.reader()).unwrap();
        assert!(matches!(
            header.select(Some(CpuType::Arm64)),
            Err(ParseError::ArchitectureNotFound)
        ));
    }

    #[test]
    fn empty_fat_binary() {
        let bytes = fat_bytes(&[]);
        let img = Image::from_bytes(bytes);
        assert!(matches!(
            FatHeader::parse(&img.reader()),
            Err(ParseError::EmptyFatBinary)
        ));
    }

    #[test]
    fn slice_for_returns_thin_macho_view() {
        let mut bytes = fat_bytes(&[(CPU_TYPE_ARM64, 28, 32)]);
        bytes.resize(28, 0);
        bytes.extend_from_slice(&MH_MAGIC_64.to_le_bytes());
        bytes.extend_from_slice(&[0u8; 28]);
        let img = Image::from_bytes(bytes);
        let reader = img.reader();
        let header = FatHeader::parse(&reader).unwrap();
        let arch = header.select(None).unwrap();
        let slice = header.slice_for(&reader, arch).unwrap();
        assert_eq!(slice.read_u32(0).unwrap(), MH_MAGIC_64);
    }
}
