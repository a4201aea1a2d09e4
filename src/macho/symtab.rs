//! Symbol table (`nlist_64` + string table) parsing.
//!
//! The symbol table is large relative to the rest of a Mach-O header and
//! is rarely needed for a quick structural inspection, so [`super::Binary`]
//! only parses it on first access, cached behind a [`std::cell::OnceCell`].

use super::error::ParseError;
use crate::bounds::BoundsReader;

const NLIST_64_SIZE: u64 = 16;

bitflags::bitflags! {
    /// The `n_type` byte of an `nlist_64`.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize)]
    pub struct NType: u8 {
        const STAB = 0xe0;
        const PEXT = 0x10;
        const TYPE = 0x0e;
        const EXT = 0x01;
    }
}

pub const N_UNDF: u8 = 0x0;
pub const N_ABS: u8 = 0x2;
pub const N_SECT: u8 = 0xe;

#[derive(Debug, Clone, serde::Serialize)]
pub struct Symbol {
    pub name: String,
    pub n_type: NType,
    pub n_sect: u8,
    pub n_desc: u16,
    pub value: u64,
}

impl Symbol {
    pub fn is_external(&self) -> bool {
        self.n_type.contains(NType::EXT)
    }

    pub fn is_defined(&self) -> bool {
        (self.n_type.bits() & NType::TYPE.bits()) != N_UNDF
    }
}

/// Parsed symbol table, sorted by `value` ascending so address lookups
/// (the nearest-symbol-at-or-below query used by the disassembler) can
/// binary search rather than scan.
#[derive(Debug, Clone, serde::Serialize)]
pub struct SymbolTable {
    symbols: Vec<Symbol>,
}

impl SymbolTable {
    /// A table with no entries, used when a `Binary` has no `LC_SYMTAB`.
    pub fn empty() -> Self {
        SymbolTable { symbols: Vec::new() }
    }

    /// Parses `nsyms` `nlist_64` entries at `symoff` in `image` (offsets are
    /// relative to the start of the thin Mach-O slice), resolving each
    /// entry's name from the string table at `stroff`/`strsize`.
    pub fn parse(
        image: &BoundsReader,
        symoff: u32,
        nsyms: u32,
        stroff: u32,
        strsize: u32,
    ) -> Result<Self, ParseError> {
        let strtab = image.slice(stroff as i64, strsize as u64)?;
        let mut symbols = Vec::with_capacity(nsyms as usize);

        for i in 0..nsyms as u64 {
            let base = symoff as i64 + (i * NLIST_64_SIZE) as i64;
            let n_strx = image.read_u32(base)?;
            let n_type = image.read_u8(base + 4)?;
            let n_sect = image.read_u8(base + 5)?;
            let n_desc = image.read_u16(base + 6)?;
            let value = image.read_u64(base + 8)?;

            let name = read_c_string(&strtab, n_strx)?;

            symbols.push(Symbol {
                name,
                n_type: NType::from_bits_truncate(n_type),
                n_sect,
                n_desc,
                value,
            });
        }

        symbols.sort_by_key(|s| s.value);
        Ok(SymbolTable { symbols })
    }

    pub fn len(&self) -> usize {
        self.symbols.len()
    }

    pub fn is_empty(&self) -> bool {
        self.symbols.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Symbol> {
        self.symbols.iter()
    }

    pub fn find_by_name(&self, name: &str) -> Option<&Symbol> {
        self.symbols.iter().find(|s| s.name == name)
    }

    /// Returns the defined symbol with the greatest `value <= addr`, the
    /// "nearest symbol at or below" lookup used to label disassembly.
    pub fn nearest_at_or_below(&self, addr: u64) -> Option<&Symbol> {
        let defined: Vec<&Symbol> = self.symbols.iter().filter(|s| s.is_defined()).collect();
        match defined.binary_search_by_key(&addr, |s| s.value) {
            Ok(idx) => Some(defined[idx]),
            Err(0) => None,
            Err(idx) => Some(defined[idx - 1]),
        }
    }
}

fn read_c_string(strtab: &BoundsReader, offset: u32) -> Result<String, ParseError> {
    // String tables can be a few hundred KB; read one byte at a time rather
    // than guessing a max length, bailing out if we somehow run past the
    // end of the table (malformed n_strx).
    let mut bytes = Vec::new();
    let mut cursor = offset as i64;
    loop {
        let b = strtab.read_u8(cursor)?;
        if b == 0 {
            break;
        }
        bytes.push(b);
        cursor += 1;
    }
    Ok(String::from_utf8_lossy(&bytes).into_owned())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bounds::Image;

    fn build_image(symbols: &[(&str, u8, u64)]) -> (Vec<u8>, u32, u32, u32, u32) {
        let mut strtab = vec![0u8]; // index 0 is always the empty string
        let mut offsets = Vec::new();
        for (name, _, _) in symbols {
            offsets.push(strtab.len() as u32);
            strtab.extend_from_slice(name.as_bytes());
            strtab.push(0);
        }

        let mut symtab = Vec::new();
        for (i, (_, n_type, value)) in symbols.iter().enumerate() {
            symtab.extend_from_slice(&offsets[i].to_le_bytes());
            symtab.push(*n_type);
            symtab.push(1); // n_sect
            symtab.extend_from_slice(&0u16.to_le_bytes());
            symtab.extend_from_slice(&value.to_le_bytes());
        }

        let symoff = 0u32;
        let nsyms = symbols.len() as u32;
        let stroff = symtab.len() as u32;
        let strsize = strtab.len() as u32;
        let mut full = symtab;
        full.extend_from_slice(&strtab);
        (full, symoff, nsyms, stroff, strsize)
    }

    #[test]
    fn parses_and_resolves_names() {
        let (bytes, symoff, nsyms, stroff, strsize) =
            build_image(&[("_main", N_SECT | 0x01, 0x1000), ("_helper", N_SECT | 0x01, 0x2000)]);
        let img = Image::from_bytes(bytes);
        let table = SymbolTable::parse(&img.reader(), symoff, nsyms, stroff, strsize).unwrap();
        assert_eq!(table.len(), 2);
        let main = table.find_by_name("_main").unwrap();
        assert!(main.is_external());
        assert!(main.is_defined());
        assert_eq!(main.value, 0x1000);
    }

    #[test]
    fn nearest_at_or_below_lookup() {
        let (bytes, symoff, nsyms, stroff, strsize) =
            build_image(&[("_a", N_SECT, 0x1000), ("_b", N_SECT, 0x2000), ("_c", N_SECT, 0x3000)]);
        let img = Image::from_bytes(bytes);
        let table = SymbolTable::parse(&img.reader(), symoff, nsyms, stroff, strsize).unwrap();
        assert_eq!(table.nearest_at_or_below(0x2500).unwrap().name, "_b");
        assert_eq!(table.nearest_at_or_below(0x2000).unwrap().name, "_b");
        assert!(table.nearest_at_or_below(0x500).is_none());
    }

    #[test]
    fn undefined_symbols_excluded_from_nearest() {
        let (bytes, symoff, nsyms, stroff, strsize) =
            build_image(&[("_extern_fn", N_UNDF | 0x01, 0), ("_local", N_SECT, 0x1000)]);
        let img = Image::from_bytes(bytes);
        let table = SymbolTable::parse(&img.reader(), symoff, nsyms, stroff, strsize).unwrap();
        let undef = table.find_by_name("_extern_fn").unwrap();
        assert!(!undef.is_defined());
        assert_eq!(table.nearest_at_or_below(0x1000).unwrap().name, "_local");
    }
}
