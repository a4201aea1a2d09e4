//! `LC_SEGMENT_64` parsing: a segment plus its inline `section_64` array.

use super::error::ParseError;
use super::section::{Section, SECTION_64_SIZE};
use crate::bounds::BoundsReader;
use bitflags::bitflags;

bitflags! {
    /// `vm_prot_t` bits as used by `maxprot`/`initprot`.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize)]
    pub struct VmProt: i32 {
        const READ = 0x1;
        const WRITE = 0x2;
        const EXECUTE = 0x4;
    }
}

/// The fixed-size part of a `segment_command_64` (cmd/cmd_size header
/// included), before its section array.
const SEGMENT_COMMAND_64_SIZE: i64 = 72;

#[derive(Debug, Clone, serde::Serialize)]
pub struct Segment {
    pub segment_name: String,
    pub vm_addr: u64,
    pub vm_size: u64,
    pub file_offset: u64,
    pub file_size: u64,
    pub max_prot: VmProt,
    pub init_prot: VmProt,
    pub flags: u32,
    pub sections: Vec<Section>,
}

impl Segment {
    pub fn contains_vm_addr(&self, addr: u64) -> bool {
        addr >= self.vm_addr && addr < self.vm_addr.saturating_add(self.vm_size)
    }

    /// Reads this segment's file content out of `reader`, the whole-image
    /// reader (spec §3 Segment invariant: `file_offset + file_size ≤
    /// image_size`).
    pub fn data<'a>(&self, reader: &'a BoundsReader) -> Result<&'a [u8], ParseError> {
        let end = self
            .file_offset
            .checked_add(self.file_size)
            .filter(|&end| end <= reader.size())
            .ok_or(ParseError::SegmentOutOfBounds)?;
        let _ = end;
        Ok(reader.read_bytes(self.file_offset as i64, self.file_size)?)
    }

    /// Parses a `segment_command_64` out of `body`, the load command's own
    /// byte range (cmd/cmd_size header included, offset 0-relative).
    ///
    /// `body` must already have been validated to be `cmd == LC_SEGMENT_64`
    /// by the caller (see `mod.rs`, which dispatches on `cmd` before
    /// reaching here, mirroring the teacher's `LoadCommandsIter` dispatch).
    pub fn parse(body: &BoundsReader) -> Result<Self, ParseError> {
        let segment_name = body.read_fixed_string(8, 16)?;
        let vm_addr = body.read_u64(24)?;
        let vm_size = body.read_u64(32)?;
        let file_offset = body.read_u64(40)?;
        let file_size = body.read_u64(48)?;
        let max_prot = body.read_u32(56)? as i32;
        let init_prot = body.read_u32(60)? as i32;
        let num_sections = body.read_u32(64)?;
        let flags = body.read_u32(68)?;

        let mut sections = Vec::with_capacity(num_sections as usize);
        for i in 0..num_sections as i64 {
            let section_offset = SEGMENT_COMMAND_64_SIZE + i * SECTION_64_SIZE as i64;
            sections.push(Section::parse(body, section_offset)?);
        }

        Ok(Segment {
            segment_name,
            vm_addr,
            vm_size,
            file_offset,
            file_size,
            max_prot: VmProt::from_bits_truncate(max_prot),
            init_prot: VmProt::from_bits_truncate(init_prot),
            flags,
            sections,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bounds::Image;
    use crate::macho::load_command::LC_SEGMENT_64;

    fn segment_with_one_section() -> Vec<u8> {
        let mut v = Vec::new();
        v.extend_from_slice(&LC_SEGMENT_64.to_le_bytes());
        v.extend_from_slice(&(56 + 80u32).to_le_bytes()); // cmd_size
        let mut name = [0u8; 16];
        name[..6].copy_from_slice(b"__TEXT");
        v.extend_from_slice(&name);
        v.extend_from_slice(&0x1_0000_0000u64.to_le_bytes()); // vm_addr
        v.extend_from_slice(&0x4000u64.to_le_bytes()); // vm_size
        v.extend_from_slice(&0u64.to_le_bytes()); // file_offset
        v.extend_from_slice(&0x4000u64.to_le_bytes()); // file_size
        v.extend_from_slice(&(VmProt::READ.bits() | VmProt::EXECUTE.bits()).to_le_bytes());
        v.extend_from_slice(&(VmProt::READ.bits() | VmProt::EXECUTE.bits()).to_le_bytes());
        v.extend_from_slice(&1u32.to_le_bytes()); // num_sections
        v.extend_from_slice(&0u32.to_le_bytes()); // flags
        // one section
        let mut sect_name = [0u8; 16];
        sect_name[..6].copy_from_slice(b"__text");
        v.extend_from_slice(&sect_name);
        v.extend_from_slice(&name);
        v.extend_from_slice(&0x1_0000_0000u64.to_le_bytes());
        v.extend_from_slice(&0x100u64.to_le_bytes());
        v.extend_from_slice(&0u32.to_le_bytes());
        v.extend_from_slice(&4u32.to_le_bytes());
        v.extend_from_slice(&0u32.to_le_bytes());
        v.extend_from_slice(&0u32.to_le_bytes());
        v.extend_from_slice(&0u32.to_le_bytes());
        v.extend_from_slice(&0u32.to_le_bytes());
        v.extend_from_slice(&0u32.to_le_bytes());
        v
    }

    #[test]
    fn parses_segment_with_section() {
        let bytes = segment_with_one_section();
        let img = Image::from_bytes(bytes);
        let segment = Segment::parse(&img.reader()).unwrap();
        assert_eq!(segment.segment_name, "__TEXT");
        assert_eq!(segment.sections.len(), 1);
        assert_eq!(segment.sections[0].section_name, "__text");
        assert!(segment.contains_vm_addr(0x1_0000_0050));
        assert!(!segment.contains_vm_addr(0x2_0000_0000));
    }

    #[test]
    fn data_out_of_bounds_is_an_error() {
        let bytes = segment_with_one_section();
        let img = Image::from_bytes(bytes);
        let mut segment = Segment::parse(&img.reader()).unwrap();
        segment.file_offset = img.size() + 1;
        assert!(matches!(segment.data(&img.reader()), Err(ParseError::SegmentOutOfBounds)));
    }
}
