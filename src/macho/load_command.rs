//! Load command iteration.
//!
//! Unlike the teacher's `mach_helpers.rs`, which casts raw pointers into
//! `#[repr(C)]` structs, commands here are read field-by-field through a
//! [`BoundsReader`] so a corrupt `cmd_size` can never walk off the end of
//! the mapped image. Unrecognized command types are not an error: they're
//! recorded in a [`crate::error_list::SoftErrorList`] and skipped, matching
//! spec §4.2 step 5 ("soft failure: record and continue").

use super::error::ParseError;
use crate::bounds::BoundsReader;
use crate::error_list::SoftErrorList;

pub const LC_SEGMENT_64: u32 = 0x19;
pub const LC_ID_DYLIB: u32 = 0xd;
pub const LC_LOAD_DYLIB: u32 = 0xc;
pub const LC_LOAD_WEAK_DYLIB: u32 = 0x18 | 0x8000_0000;
pub const LC_REEXPORT_DYLIB: u32 = 0x1f | 0x8000_0000;
pub const LC_UUID: u32 = 0x1b;
pub const LC_SYMTAB: u32 = 0x2;
pub const LC_DYSYMTAB: u32 = 0xb;
pub const LC_CODE_SIGNATURE: u32 = 0x1d;
pub const LC_MAIN: u32 = 0x28 | 0x8000_0000;
pub const LC_BUILD_VERSION: u32 = 0x32;
pub const LC_RPATH: u32 = 0x1c | 0x8000_0000;
pub const LC_FUNCTION_STARTS: u32 = 0x26;
pub const LC_DATA_IN_CODE: u32 = 0x29;
pub const LC_SOURCE_VERSION: u32 = 0x2a;
pub const LC_ENCRYPTION_INFO_64: u32 = 0x2c;
pub const LC_LINKER_OPTION: u32 = 0x2d;
pub const LC_DYLD_INFO: u32 = 0x22;
pub const LC_DYLD_INFO_ONLY: u32 = 0x22 | 0x8000_0000;
pub const LC_DYLD_CHAINED_FIXUPS: u32 = 0x34 | 0x8000_0000;
pub const LC_DYLD_EXPORTS_TRIE: u32 = 0x33 | 0x8000_0000;

/// A soft error recorded while walking the load-command stream: we saw the
/// command but something about its framing was off, short of aborting the
/// whole parse.
#[derive(Debug, Clone, serde::Serialize)]
pub struct UnknownCommand {
    pub cmd: u32,
    pub cmd_size: u32,
    pub offset: u64,
}

#[derive(Debug, Clone, serde::Serialize)]
pub struct DylibCommand {
    pub name: String,
    pub timestamp: u32,
    pub current_version: u32,
    pub compatibility_version: u32,
    pub is_id: bool,
}

#[derive(Debug, Clone, serde::Serialize)]
pub struct UuidCommand {
    pub uuid: [u8; 16],
}

#[derive(Debug, Clone, serde::Serialize)]
pub struct SymtabCommand {
    pub symoff: u32,
    pub nsyms: u32,
    pub stroff: u32,
    pub strsize: u32,
}

#[derive(Debug, Clone, serde::Serialize)]
pub struct EntryPointCommand {
    pub entry_off: u64,
    pub stack_size: u64,
}

#[derive(Debug, Clone, serde::Serialize)]
pub struct RpathCommand {
    pub path: String,
}

/// `linkedit_data_command`: a `{dataoff, datasize}` descriptor into the
/// `__LINKEDIT` segment. Covers `LC_CODE_SIGNATURE`, `LC_FUNCTION_STARTS`,
/// and `LC_DATA_IN_CODE` — distinguished by `kind`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize)]
pub enum LinkEditDataKind {
    CodeSignature,
    FunctionStarts,
    DataInCode,
}

#[derive(Debug, Clone, serde::Serialize)]
pub struct LinkEditDataCommand {
    pub kind: LinkEditDataKind,
    pub data_offset: u32,
    pub data_size: u32,
}

/// A recognized load command, tagged by kind.
///
/// [`super::segment::SegmentCommand64`] is deliberately not embedded here:
/// `mod.rs` parses `LC_SEGMENT_64` directly into `Segment`/`Section` because
/// that parse also consumes the trailing `section_64` array.
#[derive(Debug, Clone, serde::Serialize)]
pub enum LoadCommand {
    Dylib(DylibCommand),
    Uuid(UuidCommand),
    Symtab(SymtabCommand),
    EntryPoint(EntryPointCommand),
    Rpath(RpathCommand),
    LinkEditData(LinkEditDataCommand),
    /// Recognized but uninterpreted (e.g. `LC_DYSYMTAB`, `LC_BUILD_VERSION`,
    /// `LC_SOURCE_VERSION`, `LC_ENCRYPTION_INFO_64`, `LC_LINKER_OPTION`,
    /// `LC_DYLD_INFO[_ONLY]`, `LC_DYLD_CHAINED_FIXUPS`,
    /// `LC_DYLD_EXPORTS_TRIE`): kept so callers can still see the command
    /// was present, per spec's "retained as opaque" rule for the commands
    /// this crate doesn't otherwise need to act on.
    Other { cmd: u32 },
}

/// One step of load-command iteration: the command's offset within the
/// load-command stream, its raw `cmd`/`cmd_size`, and (if recognized) the
/// parsed body. `LC_SEGMENT_64` is surfaced raw so `mod.rs` can hand it to
/// [`super::segment::SegmentCommand64::parse`].
pub struct RawCommand<'r> {
    pub cmd: u32,
    pub cmd_size: u32,
    pub offset: u64,
    pub body: BoundsReader,
    _reader: &'r BoundsReader,
}

/// Walks the load-command region of `reader` (the bytes immediately after
/// the 32-byte header, `header.size_of_commands` bytes long).
pub struct LoadCommandsIter<'r> {
    reader: &'r BoundsReader,
    cursor: u64,
    end: u64,
    remaining: u32,
}

impl<'r> LoadCommandsIter<'r> {
    pub fn new(reader: &'r BoundsReader, start: u64, size_of_commands: u32, num_load_commands: u32) -> Self {
        LoadCommandsIter {
            reader,
            cursor: start,
            end: start + size_of_commands as u64,
            remaining: num_load_commands,
        }
    }
}

impl<'r> Iterator for LoadCommandsIter<'r> {
    type Item = Result<RawCommand<'r>, ParseError>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.remaining == 0 || self.cursor >= self.end {
            return None;
        }

        let result = (|| -> Result<RawCommand<'r>, ParseError> {
            let cmd = self.reader.read_u32(self.cursor as i64)?;
            let cmd_size = self.reader.read_u32(self.cursor as i64 + 4)?;
            if cmd_size < 8 || cmd_size % 8 != 0 {
                return Err(ParseError::InvalidLoadCommandSize);
            }
            if self.cursor + cmd_size as u64 > self.end {
                return Err(ParseError::LoadCommandSizeMismatch);
            }
            let body = self.reader.slice(self.cursor as i64, cmd_size as u64)?;
            Ok(RawCommand {
                cmd,
                cmd_size,
                offset: self.cursor,
                body,
                _reader: self.reader,
            })
        })();

        self.remaining -= 1;
        match &result {
            Ok(raw) => self.cursor += raw.cmd_size as u64,
            Err(_) => self.cursor = self.end, // stop; caller decides whether this is fatal
        }
        Some(result)
    }
}

/// Parses the body of a single [`RawCommand`] into a [`LoadCommand`],
/// recording anything it can't interpret as a soft error rather than
/// failing the whole parse.
pub fn parse_body(
    raw: &RawCommand<'_>,
    soft_errors: &mut SoftErrorList<UnknownCommand>,
) -> Result<Option<LoadCommand>, ParseError> {
    let b = &raw.body;
    match raw.cmd {
        LC_ID_DYLIB | LC_LOAD_DYLIB | LC_LOAD_WEAK_DYLIB | LC_REEXPORT_DYLIB => {
            // dylib_command: cmd, cmd_size, then a `dylib` struct starting
            // with a 4-byte offset (from the command start) to a C string.
            let name_offset = b.read_u32(8)?;
            let timestamp = b.read_u32(12)?;
            let current_version = b.read_u32(16)?;
            let compatibility_version = b.read_u32(20)?;
            let name_len = raw.cmd_size.saturating_sub(name_offset);
            let name = b.read_fixed_string(name_offset as i64, name_len as u64)?;
            Ok(Some(LoadCommand::Dylib(DylibCommand {
                name,
                timestamp,
                current_version,
                compatibility_version,
                is_id: raw.cmd == LC_ID_DYLIB,
            })))
        }
        LC_UUID => {
            let bytes = b.read_bytes(8, 16)?;
            let mut uuid = [0u8; 16];
            uuid.copy_from_slice(bytes);
            Ok(Some(LoadCommand::Uuid(UuidCommand { uuid })))
        }
        LC_SYMTAB => Ok(Some(LoadCommand::Symtab(SymtabCommand {
            symoff: b.read_u32(8)?,
            nsyms: b.read_u32(12)?,
            stroff: b.read_u32(16)?,
            strsize: b.read_u32(20)?,
        }))),
        LC_MAIN => Ok(Some(LoadCommand::EntryPoint(EntryPointCommand {
            entry_off: b.read_u64(8)?,
            stack_size: b.read_u64(16)?,
        }))),
        LC_RPATH => {
            let path_offset = b.read_u32(8)?;
            let path_len = raw.cmd_size.saturating_sub(path_offset);
            let path = b.read_fixed_string(path_offset as i64, path_len as u64)?;
            Ok(Some(LoadCommand::Rpath(RpathCommand { path })))
        }
        LC_CODE_SIGNATURE | LC_FUNCTION_STARTS | LC_DATA_IN_CODE => {
            let kind = match raw.cmd {
                LC_CODE_SIGNATURE => LinkEditDataKind::CodeSignature,
                LC_FUNCTION_STARTS => LinkEditDataKind::FunctionStarts,
                _ => LinkEditDataKind::DataInCode,
            };
            Ok(Some(LoadCommand::LinkEditData(LinkEditDataCommand {
                kind,
                data_offset: b.read_u32(8)?,
                data_size: b.read_u32(12)?,
            })))
        }
        LC_DYSYMTAB
        | LC_BUILD_VERSION
        | LC_SOURCE_VERSION
        | LC_ENCRYPTION_INFO_64
        | LC_LINKER_OPTION
        | LC_DYLD_INFO
        | LC_DYLD_INFO_ONLY
        | LC_DYLD_CHAINED_FIXUPS
        | LC_DYLD_EXPORTS_TRIE => Ok(Some(LoadCommand::Other { cmd: raw.cmd })),
        other => {
            soft_errors.push(UnknownCommand {
                cmd: other,
                cmd_size: raw.cmd_size,
                offset: raw.offset,
            });
            Ok(None)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bounds::Image;

    fn dylib_cmd_bytes(path: &str) -> Vec<u8> {
        let mut name = path.as_bytes().to_vec();
        name.push(0);
        while (24 + name.len()) % 8 != 0 {
            name.push(0);
        }
        let cmd_size = 24 + name.len() as u32;
        let mut v = Vec::new();
        v.extend_from_slice(&LC_ID_DYLIB.to_le_bytes());
        v.extend_from_slice(&cmd_size.to_le_bytes());
        v.extend_from_slice(&24u32.to_le_bytes()); // name offset
        v.extend_from_slice(&0u32.to_le_bytes()); // timestamp
        v.extend_from_slice(&1u32.to_le_bytes()); // current_version
        v.extend_from_slice(&1u32.to_le_bytes()); // compat_version
        v.extend_from_slice(&name);
        v
    }

    #[test]
    fn iterates_and_parses_dylib_command() {
        let bytes = dylib_cmd_bytes("@rpath/libfoo.dylib");
        let size = bytes.len() as u32;
        let img = Image::from_bytes(bytes);
        let reader = img.reader();
        let iter = LoadCommandsIter::new(&reader, 0, size, 1);
        let raws: Vec<_> = iter.collect::<Result<_, _>>().unwrap();
        assert_eq!(raws.len(), 1);
        let mut soft_errors = SoftErrorList::default();
        let cmd = parse_body(&raws[0], &mut soft_errors).unwrap().unwrap();
        match cmd {
            LoadCommand::Dylib(d) => {
                assert_eq!(d.name, "@rpath/libfoo.dylib");
                assert!(d.is_id);
            }
            _ => panic!("expected dylib command"),
        }
        assert!(soft_errors.is_empty());
    }

    #[test]
    fn unrecognized_command_is_soft_error() {
        let mut v = Vec::new();
        v.extend_from_slice(&0xdead_beefu32.to_le_bytes());
        v.extend_from_slice(&8u32.to_le_bytes());
        let size = v.len() as u32;
        let img = Image::from_bytes(v);
        let reader = img.reader();
        let iter = LoadCommandsIter::new(&reader, 0, size, 1);
        let raws: Vec<_> = iter.collect::<Result<_, _>>().unwrap();
        let mut soft_errors = SoftErrorList::default();
        let cmd = parse_body(&raws[0], &mut soft_errors).unwrap();
        assert!(cmd.is_none());
        assert_eq!(soft_errors.len(), 1);
    }

    #[test]
    fn invalid_cmd_size_is_error() {
        let mut v = Vec::new();
        v.extend_from_slice(&LC_UUID.to_le_bytes());
        v.extend_from_slice(&3u32.to_le_bytes()); // not 8-byte-minimum, not aligned
        let img = Image::from_bytes(v);
        let reader = img.reader();
        let mut iter = LoadCommandsIter::new(&reader, 0, 8, 1);
        assert!(matches!(iter.next(), Some(Err(ParseError::InvalidLoadCommandSize))));
    }
}
