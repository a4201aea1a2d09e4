//! End-to-end ARM64 decoding over a small synthesized instruction stream
//! (spec.md §8, Scenarios 3, 4, 6).

use machscope_core::arm64::{decode_all, Mnemonic, Operand};

fn word(raw: u32) -> [u8; 4] {
    raw.to_le_bytes()
}

/// Scenario 3 + 6, decoded together as a short function body would be:
/// a `cmp` alias (SUBS XZR, X1, X2) followed by a `bl`.
#[test]
fn decodes_alias_and_branch_in_sequence() {
    // SUBS XZR, X1, X2: sf=1, op=1 (sub), S=1, shifted-register form,
    // Rm=x2, imm6=0, Rn=x1, Rd=31 (xzr).
    let cmp_raw: u32 = (1 << 31) | (1 << 30) | (1 << 29) | (0b01011 << 24) | (2 << 16) | (1 << 5) | 31;
    // BL at address 0x100003f54, imm26 = 0x13 -> target 0x100003fa0.
    let bl_raw: u32 = (1 << 31) | (0b00101 << 26) | 0x13;

    let mut bytes = Vec::new();
    bytes.extend_from_slice(&word(cmp_raw));
    bytes.extend_from_slice(&word(bl_raw));

    let decoded = decode_all(&bytes, 0x100003f50);
    assert_eq!(decoded.len(), 2);

    let cmp = &decoded[0];
    assert_eq!(cmp.mnemonic, Mnemonic::Cmp);
    assert!(!cmp.operands.iter().any(|op| matches!(op, Operand::Gp(r) if r.num == 31)));

    let bl = &decoded[1];
    assert_eq!(bl.address, 0x100003f54);
    assert_eq!(bl.mnemonic, Mnemonic::Bl);
    assert_eq!(bl.target_address, Some(0x100003fa0));
    assert!(matches!(bl.operands.as_slice(), [Operand::Target(0x100003fa0)]));
}
