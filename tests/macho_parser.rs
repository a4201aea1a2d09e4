//! End-to-end Mach-O parsing scenarios that need a hand-synthesized image
//! (spec.md §8, Scenario 1).

use machscope_core::bounds::Image;
use machscope_core::macho::header::{CPU_TYPE_ARM64, MH_MAGIC_64};
use machscope_core::macho::{Binary, VmProt};

fn le32(v: &mut Vec<u8>, x: u32) {
    v.extend_from_slice(&x.to_le_bytes());
}
fn le64(v: &mut Vec<u8>, x: u64) {
    v.extend_from_slice(&x.to_le_bytes());
}

fn segment_command(name: &str, vm_addr: u64, vm_size: u64, prot: i32) -> Vec<u8> {
    let mut v = Vec::new();
    le32(&mut v, 0x19); // LC_SEGMENT_64
    le32(&mut v, 72); // cmd_size, no sections
    let mut n = [0u8; 16];
    n[..name.len()].copy_from_slice(name.as_bytes());
    v.extend_from_slice(&n);
    le64(&mut v, vm_addr);
    le64(&mut v, vm_size);
    le64(&mut v, 0); // file_offset
    le64(&mut v, vm_size); // file_size
    le32(&mut v, prot as u32); // maxprot
    le32(&mut v, prot as u32); // initprot
    le32(&mut v, 0); // nsects
    le32(&mut v, 0); // flags
    v
}

fn symtab_command(symoff: u32, nsyms: u32, stroff: u32, strsize: u32) -> Vec<u8> {
    let mut v = Vec::new();
    le32(&mut v, 0x2); // LC_SYMTAB
    le32(&mut v, 24);
    le32(&mut v, symoff);
    le32(&mut v, nsyms);
    le32(&mut v, stroff);
    le32(&mut v, strsize);
    v
}

/// Scenario 1: a minimal well-formed executable with a handful of
/// segments and a defined `_main` symbol.
#[test]
fn minimal_well_formed_executable() {
    let text = segment_command("__TEXT", 0x1_0000_0000, 0x4000, (VmProt::READ | VmProt::EXECUTE).bits());
    let data = segment_command("__DATA", 0x1_0000_4000, 0x4000, (VmProt::READ | VmProt::WRITE).bits());
    let linkedit = segment_command("__LINKEDIT", 0x1_0000_8000, 0x1000, VmProt::READ.bits());

    // symbol table: one defined external symbol, "_main"
    let mut strtab = vec![0u8];
    let main_off = strtab.len() as u32;
    strtab.extend_from_slice(b"_main\0");
    let mut symtab = Vec::new();
    le32(&mut symtab, main_off); // n_strx
    symtab.push(0x0f); // n_type: N_SECT | N_EXT
    symtab.push(1); // n_sect
    symtab.extend_from_slice(&0u16.to_le_bytes()); // n_desc
    le64(&mut symtab, 0x1_0000_0000); // value == __TEXT start

    let symoff = 0u32;
    let stroff = symtab.len() as u32;
    let strsize = strtab.len() as u32;
    let mut linkedit_bytes = symtab.clone();
    linkedit_bytes.extend_from_slice(&strtab);

    let symtab_cmd = symtab_command(symoff, 1, stroff, strsize);

    let mut commands = Vec::new();
    commands.extend_from_slice(&text);
    commands.extend_from_slice(&data);
    commands.extend_from_slice(&linkedit);
    commands.extend_from_slice(&symtab_cmd);

    let mut image = Vec::new();
    le32(&mut image, MH_MAGIC_64);
    image.extend_from_slice(&CPU_TYPE_ARM64.to_le_bytes());
    le32(&mut image, 0); // cpu_subtype
    le32(&mut image, 2); // MH_EXECUTE
    le32(&mut image, 4); // ncmds
    le32(&mut image, commands.len() as u32); // sizeofcmds
    le32(&mut image, 0); // flags
    le32(&mut image, 0); // reserved
    image.extend_from_slice(&commands);

    // Symbol table bytes must land at the __LINKEDIT file offset (0) of a
    // *separate* region in a real binary, but `Binary` reads symoff/stroff
    // relative to the whole thin-image reader, so append them at a known
    // offset and point symoff/stroff there instead.
    let symtab_base = image.len() as u32;
    image.extend_from_slice(&linkedit_bytes);

    // patch the LC_SYMTAB command's symoff/stroff now that we know the base
    let symtab_cmd_offset = 32 + text.len() + data.len() + linkedit.len();
    let patched_symoff = symtab_base;
    let patched_stroff = symtab_base + stroff;
    image[symtab_cmd_offset + 8..symtab_cmd_offset + 12].copy_from_slice(&patched_symoff.to_le_bytes());
    image[symtab_cmd_offset + 16..symtab_cmd_offset + 20].copy_from_slice(&patched_stroff.to_le_bytes());

    let img = Image::from_bytes(image);
    let binary = Binary::from_reader(img.reader(), None).expect("parses");

    similar_asserts::assert_eq!(binary.cpu_type(), machscope_core::macho::header::CpuType::Arm64);
    similar_asserts::assert_eq!(binary.file_type(), machscope_core::macho::header::FileType::Execute);

    let text_seg = binary.segment_named("__TEXT").expect("__TEXT present");
    similar_asserts::assert_eq!(text_seg.init_prot, VmProt::READ | VmProt::EXECUTE);

    let symbols = binary.symbols().expect("symbol table parses");
    let main = symbols.find_by_name("_main").expect("_main present");
    assert!(main.is_defined());
}

/// Same image as above, parsed through `Image::open` against a real file on
/// disk rather than an in-memory buffer, exercising the `memmap2` path.
#[test]
fn parses_from_a_file_on_disk() {
    let text = segment_command("__TEXT", 0x1_0000_0000, 0x4000, (VmProt::READ | VmProt::EXECUTE).bits());

    let mut commands = Vec::new();
    commands.extend_from_slice(&text);

    let mut image = Vec::new();
    le32(&mut image, MH_MAGIC_64);
    image.extend_from_slice(&CPU_TYPE_ARM64.to_le_bytes());
    le32(&mut image, 0); // cpu_subtype
    le32(&mut image, 2); // MH_EXECUTE
    le32(&mut image, 1); // ncmds
    le32(&mut image, commands.len() as u32); // sizeofcmds
    le32(&mut image, 0); // flags
    le32(&mut image, 0); // reserved
    image.extend_from_slice(&commands);

    let mut file = tempfile::NamedTempFile::new().expect("creates tempfile");
    std::io::Write::write_all(&mut file, &image).expect("writes image");

    let img = Image::open(file.path()).expect("mmaps file");
    let binary = Binary::from_reader(img.reader(), None).expect("parses");
    similar_asserts::assert_eq!(binary.cpu_type(), machscope_core::macho::header::CpuType::Arm64);
}
