//! Mach-O binary parsing: fat-binary slice selection, header, load
//! commands, segments/sections, and lazily-loaded symbols.
//!
//! See spec §4.2. Entry point is [`Binary::open`]/[`Binary::from_reader`].

pub mod error;
pub mod fat;
pub mod header;
pub mod load_command;
pub mod section;
pub mod segment;
pub mod symtab;

use crate::bounds::{BoundsReader, Image};
use crate::error_list::SoftErrorList;
use error::ParseError;
use fat::FatHeader;
use header::{CpuType, FileType, Header};
use load_command::{
    LinkEditDataKind, LoadCommand, LoadCommandsIter, UnknownCommand, LC_SEGMENT_64,
};
use segment::Segment;
use std::cell::OnceCell;
use std::path::Path;
use symtab::SymbolTable;

pub use load_command::{DylibCommand, EntryPointCommand, RpathCommand, SymtabCommand, UuidCommand};
pub use section::{Section, SectionType};
pub use segment::VmProt;
pub use symtab::{NType, Symbol};

/// The file-offset/length descriptor for the code-signature SuperBlob,
/// recorded during parsing but not decoded until [`Binary::code_signature`]
/// is called (spec §4.2 step 8).
#[derive(Debug, Clone, Copy, serde::Serialize)]
pub struct CodeSignatureDescriptor {
    pub offset: u32,
    pub size: u32,
}

/// A fully parsed 64-bit Mach-O image.
///
/// Owns its byte image (via [`Image`]/[`BoundsReader`]) and every segment
/// (each of which owns its own sections inline) — see SPEC_FULL §3's
/// arena-free data model notes.
pub struct Binary {
    reader: BoundsReader,
    header: Header,
    dylibs: Vec<DylibCommand>,
    uuid: Option<[u8; 16]>,
    entry_point: Option<EntryPointCommand>,
    rpaths: Vec<RpathCommand>,
    segments: Vec<Segment>,
    symtab_cmd: Option<SymtabCommand>,
    code_signature: Option<CodeSignatureDescriptor>,
    unknown_commands: SoftErrorList<UnknownCommand>,
    symbols: OnceCell<SymbolTable>,
}

impl Binary {
    /// Opens `path`, handling fat-binary slice selection (preferring
    /// `wanted`, defaulting to ARM64) transparently.
    pub fn open(path: impl AsRef<Path>, wanted: Option<CpuType>) -> Result<Self, ParseError> {
        let path = path.as_ref();
        let image = Image::open(path).map_err(|_| ParseError::FileNotFound(path.display().to_string()))?;
        Self::from_reader(image.reader(), wanted)
    }

    /// Parses an already-loaded byte image. Exposed for tests and for
    /// callers that already have bytes in hand (e.g. extracted from an
    /// archive).
    pub fn from_reader(reader: BoundsReader, wanted: Option<CpuType>) -> Result<Self, ParseError> {
        if reader.size() < 4 {
            return Err(ParseError::InsufficientData {
                offset: 0,
                needed: 4,
                available: reader.size(),
            });
        }

        let magic = reader.read_u32_be(0)?;
        let thin_reader = if FatHeader::magic_is_fat(magic) {
            let fat = FatHeader::parse(&reader)?;
            let arch = fat.select(wanted)?;
            fat.slice_for(&reader, arch)?
        } else {
            let thin_magic = reader.read_u32(0)?;
            if thin_magic != header::MH_MAGIC_64 {
                if thin_magic == header::MH_MAGIC || thin_magic == header::MH_CIGAM {
                    return Err(ParseError::UnsupportedCPUType);
                }
                return Err(ParseError::InvalidMagic { found: thin_magic, at: 0 });
            }
            reader
        };

        Self::parse_thin(thin_reader)
    }

    fn parse_thin(reader: BoundsReader) -> Result<Self, ParseError> {
        let header = Header::parse(&reader)?;

        let mut dylibs = Vec::new();
        let mut uuid = None;
        let mut entry_point = None;
        let mut rpaths = Vec::new();
        let mut segments = Vec::new();
        let mut symtab_cmd = None;
        let mut code_signature = None;
        let mut unknown_commands = SoftErrorList::default();

        let commands = LoadCommandsIter::new(
            &reader,
            header::HEADER_SIZE,
            header.size_of_commands,
            header.num_load_commands,
        );

        for raw in commands {
            let raw = raw?;
            if raw.cmd == LC_SEGMENT_64 {
                segments.push(Segment::parse(&raw.body)?);
                continue;
            }

            match load_command::parse_body(&raw, &mut unknown_commands)? {
                Some(LoadCommand::Dylib(d)) => dylibs.push(d),
                Some(LoadCommand::Uuid(u)) => uuid = Some(u.uuid),
                Some(LoadCommand::Symtab(s)) => symtab_cmd = Some(s),
                Some(LoadCommand::EntryPoint(e)) => entry_point = Some(e),
                Some(LoadCommand::Rpath(r)) => rpaths.push(r),
                Some(LoadCommand::LinkEditData(led)) if led.kind == LinkEditDataKind::CodeSignature => {
                    code_signature = Some(CodeSignatureDescriptor {
                        offset: led.data_offset,
                        size: led.data_size,
                    });
                }
                Some(LoadCommand::LinkEditData(_)) | Some(LoadCommand::Other { .. }) | None => {}
            }
        }

        Ok(Binary {
            reader,
            header,
            dylibs,
            uuid,
            entry_point,
            rpaths,
            segments,
            symtab_cmd,
            code_signature,
            unknown_commands,
            symbols: OnceCell::new(),
        })
    }

    pub fn header(&self) -> &Header {
        &self.header
    }

    pub fn cpu_type(&self) -> CpuType {
        self.header.cpu_type
    }

    pub fn file_type(&self) -> FileType {
        self.header.file_type
    }

    pub fn uuid(&self) -> Option<[u8; 16]> {
        self.uuid
    }

    pub fn dylibs(&self) -> &[DylibCommand] {
        &self.dylibs
    }

    pub fn rpaths(&self) -> &[RpathCommand] {
        &self.rpaths
    }

    pub fn entry_point(&self) -> Option<&EntryPointCommand> {
        self.entry_point.as_ref()
    }

    pub fn segments(&self) -> &[Segment] {
        &self.segments
    }

    pub fn segment_named(&self, name: &str) -> Option<&Segment> {
        self.segments.iter().find(|s| s.segment_name == name)
    }

    pub fn section_named(&self, segment: &str, section: &str) -> Option<&Section> {
        self.segment_named(segment)?
            .sections
            .iter()
            .find(|s| s.section_name == section)
    }

    /// Unknown load commands encountered while parsing (type id + framing),
    /// recorded non-fatally (spec §4.2 "Failure semantics").
    pub fn unknown_commands(&self) -> impl Iterator<Item = &UnknownCommand> {
        self.unknown_commands.iter()
    }

    /// The code-signature blob's file offset/length, if `LC_CODE_SIGNATURE`
    /// was present. The SuperBlob itself is not parsed here — see
    /// [`crate::signature`].
    pub fn code_signature_descriptor(&self) -> Option<CodeSignatureDescriptor> {
        self.code_signature
    }

    /// Returns a reader over the code-signature SuperBlob region, ready to
    /// hand to [`crate::signature::SuperBlob::parse`].
    pub fn code_signature_reader(&self) -> Result<Option<BoundsReader>, ParseError> {
        let Some(desc) = self.code_signature else {
            return Ok(None);
        };
        Ok(Some(self.reader.slice(desc.offset as i64, desc.size as u64)?))
    }

    /// Lazily parses the symbol table on first access (spec §4.2 step 7).
    pub fn symbols(&self) -> Result<&SymbolTable, ParseError> {
        if let Some(table) = self.symbols.get() {
            return Ok(table);
        }
        let Some(cmd) = &self.symtab_cmd else {
            return Ok(self.symbols.get_or_init(SymbolTable::empty));
        };
        let table = SymbolTable::parse(&self.reader, cmd.symoff, cmd.nsyms, cmd.stroff, cmd.strsize)?;
        Ok(self.symbols.get_or_init(|| table))
    }

    /// A reader over the whole thin-Mach-O image this `Binary` was parsed
    /// from, used alongside [`crate::arm64::decode_all`] to read and
    /// disassemble a section's bytes.
    pub fn image_reader(&self) -> &BoundsReader {
        &self.reader
    }
}
