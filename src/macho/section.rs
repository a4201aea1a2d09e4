//! `section_64` parsing.
//!
//! Section type/attribute constants are carried over from the
//! `usr/include/mach-o/loader.h` layout (section type in the low byte of
//! `flags`, attributes in the remaining three bytes).

use super::error::ParseError;
use crate::bounds::BoundsReader;

pub const SECTION_TYPE_MASK: u32 = 0x0000_00ff;
pub const SECTION_ATTRIBUTES_MASK: u32 = 0xffff_ff00;

pub const S_REGULAR: u32 = 0x0;
pub const S_ZEROFILL: u32 = 0x1;
pub const S_CSTRING_LITERALS: u32 = 0x2;
pub const S_NON_LAZY_SYMBOL_POINTERS: u32 = 0x6;
pub const S_LAZY_SYMBOL_POINTERS: u32 = 0x7;
pub const S_SYMBOL_STUBS: u32 = 0x8;
pub const S_MOD_INIT_FUNC_POINTERS: u32 = 0x9;
pub const S_MOD_TERM_FUNC_POINTERS: u32 = 0xa;
pub const S_THREAD_LOCAL_REGULAR: u32 = 0x11;
pub const S_THREAD_LOCAL_ZEROFILL: u32 = 0x12;

pub const S_ATTR_PURE_INSTRUCTIONS: u32 = 0x8000_0000;
pub const S_ATTR_SOME_INSTRUCTIONS: u32 = 0x0000_0400;
pub const S_ATTR_NO_DEAD_STRIP: u32 = 0x1000_0000;
pub const S_ATTR_DEBUG: u32 = 0x0200_0000;

#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize)]
pub enum SectionType {
    Regular,
    ZeroFill,
    CStringLiterals,
    NonLazySymbolPointers,
    LazySymbolPointers,
    SymbolStubs,
    ModInitFuncPointers,
    ModTermFuncPointers,
    ThreadLocalRegular,
    ThreadLocalZeroFill,
    Other(u32),
}

impl SectionType {
    fn from_raw(raw: u32) -> Self {
        match raw & SECTION_TYPE_MASK {
            S_REGULAR => SectionType::Regular,
            S_ZEROFILL => SectionType::ZeroFill,
            S_CSTRING_LITERALS => SectionType::CStringLiterals,
            S_NON_LAZY_SYMBOL_POINTERS => SectionType::NonLazySymbolPointers,
            S_LAZY_SYMBOL_POINTERS => SectionType::LazySymbolPointers,
            S_SYMBOL_STUBS => SectionType::SymbolStubs,
            S_MOD_INIT_FUNC_POINTERS => SectionType::ModInitFuncPointers,
            S_MOD_TERM_FUNC_POINTERS => SectionType::ModTermFuncPointers,
            S_THREAD_LOCAL_REGULAR => SectionType::ThreadLocalRegular,
            S_THREAD_LOCAL_ZEROFILL => SectionType::ThreadLocalZeroFill,
            other => SectionType::Other(other),
        }
    }
}

#[derive(Debug, Clone, serde::Serialize)]
pub struct Section {
    pub section_name: String,
    pub segment_name: String,
    pub addr: u64,
    pub size: u64,
    pub offset: u32,
    pub align: u32,
    pub reloff: u32,
    pub nreloc: u32,
    pub section_type: SectionType,
    pub attributes: u32,
    pub reserved1: u32,
    pub reserved2: u32,
}

/// Size in bytes of one `section_64` record.
pub const SECTION_64_SIZE: u64 = 80;

impl Section {
    pub fn is_executable(&self) -> bool {
        self.attributes & S_ATTR_PURE_INSTRUCTIONS != 0
            || self.attributes & S_ATTR_SOME_INSTRUCTIONS != 0
    }

    /// Reads this section's file content out of `reader`, the whole-image
    /// reader. Zero-fill sections have no file content and read as empty,
    /// matching the invariant's "unless zero-fill" exception (spec §3).
    pub fn bytes<'a>(&self, reader: &'a BoundsReader) -> Result<&'a [u8], ParseError> {
        if self.section_type == SectionType::ZeroFill {
            return Ok(&[]);
        }
        let end = (self.offset as u64)
            .checked_add(self.size)
            .filter(|&end| end <= reader.size())
            .ok_or(ParseError::SectionOutOfBounds)?;
        let _ = end;
        Ok(reader.read_bytes(self.offset as i64, self.size)?)
    }

    /// Parses one `section_64` at `offset` within `body` (the load command's
    /// own byte range, as produced by [`super::load_command::LoadCommandsIter`]).
    pub fn parse(body: &BoundsReader, offset: i64) -> Result<Self, ParseError> {
        let section_name = body.read_fixed_string(offset, 16)?;
        let segment_name = body.read_fixed_string(offset + 16, 16)?;
        let addr = body.read_u64(offset + 32)?;
        let size = body.read_u64(offset + 40)?;
        let file_offset = body.read_u32(offset + 48)?;
        let align = body.read_u32(offset + 52)?;
        let reloff = body.read_u32(offset + 56)?;
        let nreloc = body.read_u32(offset + 60)?;
        let flags = body.read_u32(offset + 64)?;
        let reserved1 = body.read_u32(offset + 68)?;
        let reserved2 = body.read_u32(offset + 72)?;

        Ok(Section {
            section_name,
            segment_name,
            addr,
            size,
            offset: file_offset,
            align,
            reloff,
            nreloc,
            section_type: SectionType::from_raw(flags),
            attributes: flags & SECTION_ATTRIBUTES_MASK,
            reserved1,
            reserved2,
        })
    }
}
