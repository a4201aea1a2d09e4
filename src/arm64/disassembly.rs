//! Caller-facing disassembly entry points: given a parsed [`crate::macho::Binary`],
//! walk a range of its bytes and decode them into [`Instruction`]s by address,
//! by section, or by function symbol.
//!
//! The decoder in the sibling group-decoder modules is total (every 32-bit
//! word decodes to *some* `Instruction`, falling back to `Category::Unknown`
//! rather than failing) so none of these errors are about a bad encoding --
//! they're all about locating the bytes to feed it in the first place.

use std::ops::Range;

use thiserror::Error;

use crate::macho::{Binary, Section};

use super::{decode_all, Instruction};

#[derive(Debug, Error)]
pub enum DisassemblyError {
    #[error("instruction at {address:#x} is truncated ({available} of 4 bytes available)")]
    TruncatedInstruction { address: u64, available: u64 },
    #[error("invalid encoding at {address:#x}")]
    InvalidEncoding { address: u64 },
    #[error("symbol not found: {0}")]
    SymbolNotFound(String),
    #[error("section not found: {0}")]
    SectionNotFound(String),
    #[error("address {address:#x} is outside the mapped range {valid_range:#x?}")]
    AddressOutOfRange { address: u64, valid_range: Range<u64> },
    #[error("invalid address range")]
    InvalidAddressRange,
    #[error("address {address:#x} is not {required}-byte aligned")]
    InvalidAlignment { address: u64, required: u64 },
    #[error("insufficient data: expected {expected} bytes, got {actual}")]
    InsufficientData { expected: u64, actual: u64 },
}

/// Disassembles a [`Binary`]'s executable content, resolving addresses
/// against its segments/sections and names against its symbol table.
pub struct Disassembly<'b> {
    binary: &'b Binary,
}

impl<'b> Disassembly<'b> {
    pub fn new(binary: &'b Binary) -> Self {
        Disassembly { binary }
    }

    /// Disassembles up to `count` instructions starting at virtual address
    /// `address` (`disasm --address <hex> [--length <n>]`).
    pub fn at_address(&self, address: u64, count: usize) -> Result<Vec<Instruction>, DisassemblyError> {
        if address % 4 != 0 {
            return Err(DisassemblyError::InvalidAlignment { address, required: 4 });
        }

        let segment = self
            .binary
            .segments()
            .iter()
            .find(|s| s.contains_vm_addr(address))
            .ok_or_else(|| DisassemblyError::AddressOutOfRange {
                address,
                valid_range: 0..0,
            })?;

        let delta = address - segment.vm_addr;
        let available = segment.file_size.saturating_sub(delta);
        let needed = count as u64 * 4;
        if available < needed {
            return Err(DisassemblyError::InsufficientData {
                expected: needed,
                actual: available,
            });
        }

        let file_offset = (segment.file_offset + delta) as i64;
        let bytes = self
            .binary
            .image_reader()
            .read_bytes(file_offset, needed)
            .map_err(|_| DisassemblyError::TruncatedInstruction { address, available })?;

        Ok(decode_all(bytes, address))
    }

    /// Disassembles every instruction in `segment`/`section`
    /// (`disasm --section <name>`).
    pub fn section(&self, segment: &str, section: &str) -> Result<Vec<Instruction>, DisassemblyError> {
        let sect = self
            .binary
            .section_named(segment, section)
            .ok_or_else(|| DisassemblyError::SectionNotFound(format!("{segment},{section}")))?;

        let bytes = sect.bytes(self.binary.image_reader()).map_err(|_| {
            DisassemblyError::AddressOutOfRange {
                address: sect.addr,
                valid_range: sect.addr..sect.addr.saturating_add(sect.size),
            }
        })?;

        Ok(decode_all(bytes, sect.addr))
    }

    /// Disassembles the function named `name`, from its symbol's address up
    /// to whichever comes first: the next defined symbol in the same
    /// section, or the section's end (`disasm --function <name>`).
    pub fn function(&self, name: &str) -> Result<Vec<Instruction>, DisassemblyError> {
        let symbols = self
            .binary
            .symbols()
            .map_err(|_| DisassemblyError::SymbolNotFound(name.to_string()))?;

        let symbol = symbols
            .find_by_name(name)
            .filter(|s| s.is_defined())
            .ok_or_else(|| DisassemblyError::SymbolNotFound(name.to_string()))?;

        let start = symbol.value;
        let section = self
            .containing_section(start)
            .ok_or(DisassemblyError::AddressOutOfRange {
                address: start,
                valid_range: 0..0,
            })?;
        let section_end = section.addr.saturating_add(section.size);

        let end = symbols
            .iter()
            .filter(|s| s.is_defined() && s.value > start && s.value <= section_end)
            .map(|s| s.value)
            .min()
            .unwrap_or(section_end);

        if end <= start {
            return Err(DisassemblyError::InvalidAddressRange);
        }

        let count = ((end - start) / 4) as usize;
        self.at_address(start, count)
    }

    /// Every defined symbol that falls inside an executable section, the
    /// source list for `disasm --list-functions`.
    pub fn list_functions(&self) -> Result<Vec<&str>, DisassemblyError> {
        let symbols = self
            .binary
            .symbols()
            .map_err(|_| DisassemblyError::SymbolNotFound(String::new()))?;

        Ok(symbols
            .iter()
            .filter(|s| s.is_defined() && self.containing_section(s.value).is_some_and(Section::is_executable))
            .map(|s| s.name.as_str())
            .collect())
    }

    fn containing_section(&self, address: u64) -> Option<&Section> {
        self.binary
            .segments()
            .iter()
            .find(|seg| seg.contains_vm_addr(address))?
            .sections
            .iter()
            .find(|sect| address >= sect.addr && address < sect.addr.saturating_add(sect.size))
    }
}
