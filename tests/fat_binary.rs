//! End-to-end fat-binary slice selection through `Binary::from_reader`
//! (spec.md §8, Scenario 2).

use machscope_core::bounds::Image;
use machscope_core::macho::error::ParseError;
use machscope_core::macho::header::{CpuType, CPU_TYPE_ARM64, CPU_TYPE_X86_64, MH_MAGIC_64};
use machscope_core::macho::Binary;

fn thin_macho_header() -> Vec<u8> {
    let mut v = Vec::new();
    v.extend_from_slice(&MH_MAGIC_64.to_le_bytes());
    v.extend_from_slice(&CPU_TYPE_ARM64.to_le_bytes());
    v.extend_from_slice(&0i32.to_le_bytes());
    v.extend_from_slice(&2u32.to_le_bytes()); // MH_EXECUTE
    v.extend_from_slice(&0u32.to_le_bytes()); // ncmds
    v.extend_from_slice(&0u32.to_le_bytes()); // sizeofcmds
    v.extend_from_slice(&0u32.to_le_bytes()); // flags
    v.extend_from_slice(&0u32.to_le_bytes()); // reserved
    v
}

/// Builds a fat image with an x86_64 slice at 81920 and an arm64 slice at
/// 16384, matching Scenario 2's offsets/sizes exactly.
fn fat_image() -> Vec<u8> {
    let mut v = Vec::new();
    v.extend_from_slice(&0xcafe_babeu32.to_be_bytes()); // FAT_MAGIC
    v.extend_from_slice(&2u32.to_be_bytes()); // nfat_arch

    v.extend_from_slice(&(CPU_TYPE_ARM64 as u32).to_be_bytes());
    v.extend_from_slice(&0u32.to_be_bytes());
    v.extend_from_slice(&16384u32.to_be_bytes());
    v.extend_from_slice(&65536u32.to_be_bytes());
    v.extend_from_slice(&0u32.to_be_bytes());

    v.extend_from_slice(&(CPU_TYPE_X86_64 as u32).to_be_bytes());
    v.extend_from_slice(&0u32.to_be_bytes());
    v.extend_from_slice(&81920u32.to_be_bytes());
    v.extend_from_slice(&73728u32.to_be_bytes());
    v.extend_from_slice(&0u32.to_be_bytes());

    v.resize(16384, 0);
    v.extend_from_slice(&thin_macho_header());
    v.resize(81920, 0);
    v.extend_from_slice(&thin_macho_header());
    v.resize(81920 + 73728, 0);
    v
}

#[test]
fn selects_requested_arch_slice() {
    let img = Image::from_bytes(fat_image());
    let binary = Binary::from_reader(img.reader(), Some(CpuType::Arm64)).expect("parses arm64 slice");
    assert_eq!(binary.cpu_type(), CpuType::Arm64);
}

#[test]
fn missing_arch_is_not_found() {
    let img = Image::from_bytes(fat_image());
    let unknown_ppc = CpuType::Unknown(18); // CPU_TYPE_POWERPC
    let err = Binary::from_reader(img.reader(), Some(unknown_ppc)).unwrap_err();
    assert!(matches!(err, ParseError::ArchitectureNotFound));
}
