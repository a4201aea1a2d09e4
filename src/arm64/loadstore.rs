//! Load/store group: bits[28:25] = 0b0100 or 0b0110 or 0b1100 or 0b1110.

use super::instruction::{Category, Instruction, Mnemonic};
use super::operand::{AddressingMode, ExtendKind, GpReg, MemOperand, Operand};

fn sign_extend(value: u32, bits: u32) -> i64 {
    let shift = 64 - bits;
    ((value as i64) << shift) >> shift
}

fn gp(num: u8, is_64: bool) -> GpReg {
    GpReg::new(num, is_64)
}

fn extend_kind(bits: u32) -> ExtendKind {
    match bits & 0x7 {
        0b010 => ExtendKind::Uxtw,
        0b011 => ExtendKind::Uxtx,
        0b110 => ExtendKind::Sxtw,
        _ => ExtendKind::Sxtx,
    }
}

pub fn decode(raw: u32, address: u64) -> Instruction {
    let class_hi = (raw >> 27) & 0x7;
    let v = (raw >> 26) & 1;
    let class_lo = (raw >> 24) & 0x3;

    if v == 0 && class_hi == 0b011 && class_lo == 0b00 {
        return decode_literal(raw, address);
    }
    if v == 0 && class_hi == 0b101 {
        return decode_pair(raw, address);
    }
    if v == 0 && class_hi == 0b111 && class_lo == 0b01 {
        return decode_unsigned_immediate(raw, address);
    }
    if v == 0 && class_hi == 0b111 && class_lo == 0b00 {
        let is_register_offset = (raw >> 21) & 1 == 1;
        if is_register_offset {
            if (raw >> 10) & 0x3 == 0b10 {
                return decode_register_offset(raw, address);
            }
        } else {
            match (raw >> 10) & 0x3 {
                0b00 => return decode_unscaled_immediate(raw, address),
                0b01 | 0b11 => return decode_immediate_writeback(raw, address),
                _ => {}
            }
        }
    }

    let mut word = Instruction::word(raw, address);
    word.category = Category::LoadStore;
    word
}

fn decode_literal(raw: u32, address: u64) -> Instruction {
    let opc = (raw >> 30) & 0x3;
    let imm19 = (raw >> 5) & 0x7ffff;
    let rt = (raw & 0x1f) as u8;
    let offset = sign_extend(imm19, 19) << 2;
    let target = (address as i64 + offset) as u64;

    let (mnemonic, is_64) = match opc {
        0b00 => (Mnemonic::Ldr, false),
        0b01 => (Mnemonic::Ldr, true),
        0b10 => (Mnemonic::Ldrsw, true),
        _ => (Mnemonic::Prfm, false),
    };

    Instruction {
        mnemonic,
        category: Category::LoadStore,
        raw,
        address,
        operands: vec![Operand::Gp(gp(rt, is_64)), Operand::Target(target)],
        target_address: Some(target),
        annotation: None,
    }
}

fn mem_operand(base: u8, offset: i64, mode: AddressingMode) -> Operand {
    Operand::Memory(MemOperand { base: gp(base, true), index: None, extend: None, offset, mode })
}

fn decode_pair(raw: u32, address: u64) -> Instruction {
    let opc = (raw >> 30) & 0x3;
    let is_load = (raw >> 22) & 1 == 1;
    let mode_bits = (raw >> 23) & 0x3;
    let imm7 = (raw >> 15) & 0x7f;
    let rt2 = ((raw >> 10) & 0x1f) as u8;
    let rn = ((raw >> 5) & 0x1f) as u8;
    let rt = (raw & 0x1f) as u8;

    let is_64 = opc == 0b10;
    let scale = if opc == 0b01 { 2 } else if is_64 { 3 } else { 2 };
    let offset = sign_extend(imm7, 7) << scale;

    let mnemonic = if opc == 0b01 && is_load {
        Mnemonic::Ldpsw
    } else if is_load {
        Mnemonic::Ldp
    } else {
        Mnemonic::Stp
    };

    let mode = match mode_bits {
        0b01 => AddressingMode::PostIndex,
        0b11 => AddressingMode::PreIndex,
        _ => AddressingMode::Offset,
    };

    let rt_is_64 = is_64 || mnemonic == Mnemonic::Ldpsw;

    Instruction {
        mnemonic,
        category: Category::LoadStore,
        raw,
        address,
        operands: vec![Operand::Gp(gp(rt, rt_is_64)), Operand::Gp(gp(rt2, rt_is_64)), mem_operand(rn, offset, mode)],
        target_address: None,
        annotation: None,
    }
}

fn size_and_opc_to_mnemonic(size: u32, opc: u32, v: u32) -> Option<(Mnemonic, bool)> {
    if v == 1 {
        return None; // SIMD&FP load/store, not covered here.
    }
    Some(match (size, opc) {
        (0b00, 0b00) => (Mnemonic::Strb, false),
        (0b00, 0b01) => (Mnemonic::Ldrb, false),
        (0b00, 0b10) => (Mnemonic::Ldrsb, true),
        (0b00, 0b11) => (Mnemonic::Ldrsb, false),
        (0b01, 0b00) => (Mnemonic::Strh, false),
        (0b01, 0b01) => (Mnemonic::Ldrh, false),
        (0b01, 0b10) => (Mnemonic::Ldrsh, true),
        (0b01, 0b11) => (Mnemonic::Ldrsh, false),
        (0b10, 0b00) => (Mnemonic::Str, false),
        (0b10, 0b01) => (Mnemonic::Ldr, false),
        (0b10, 0b10) => (Mnemonic::Ldrsw, true),
        (0b11, 0b00) => (Mnemonic::Str, true),
        (0b11, 0b01) => (Mnemonic::Ldr, true),
        (0b11, 0b10) => (Mnemonic::Prfm, false),
        _ => return None,
    })
}

fn decode_unsigned_immediate(raw: u32, address: u64) -> Instruction {
    let size = (raw >> 30) & 0x3;
    let v = (raw >> 26) & 1;
    let opc = (raw >> 22) & 0x3;
    let imm12 = (raw >> 10) & 0xfff;
    let rn = ((raw >> 5) & 0x1f) as u8;
    let rt = (raw & 0x1f) as u8;

    let Some((mnemonic, rt_is_64)) = size_and_opc_to_mnemonic(size, opc, v) else {
        let mut word = Instruction::word(raw, address);
        word.category = Category::LoadStore;
        return word;
    };

    let scale = size;
    let offset = (imm12 << scale) as i64;

    let operands = if mnemonic == Mnemonic::Prfm {
        vec![Operand::Immediate(rt as i64), mem_operand(rn, offset, AddressingMode::Offset)]
    } else {
        vec![Operand::Gp(gp(rt, rt_is_64)), mem_operand(rn, offset, AddressingMode::Offset)]
    };

    Instruction {
        mnemonic,
        category: Category::LoadStore,
        raw,
        address,
        operands,
        target_address: None,
        annotation: None,
    }
}

fn decode_unscaled_immediate(raw: u32, address: u64) -> Instruction {
    let size = (raw >> 30) & 0x3;
    let v = (raw >> 26) & 1;
    let opc = (raw >> 22) & 0x3;
    let imm9 = (raw >> 12) & 0x1ff;
    let rn = ((raw >> 5) & 0x1f) as u8;
    let rt = (raw & 0x1f) as u8;

    let Some((base_mnemonic, rt_is_64)) = size_and_opc_to_mnemonic(size, opc, v) else {
        let mut word = Instruction::word(raw, address);
        word.category = Category::LoadStore;
        return word;
    };

    // STUR/LDUR present as named aliases of STR/LDR's unscaled form.
    let mnemonic = match base_mnemonic {
        Mnemonic::Str => Mnemonic::Stur,
        Mnemonic::Ldr => Mnemonic::Ldur,
        other => other,
    };

    let offset = sign_extend(imm9, 9);

    Instruction {
        mnemonic,
        category: Category::LoadStore,
        raw,
        address,
        operands: vec![Operand::Gp(gp(rt, rt_is_64)), mem_operand(rn, offset, AddressingMode::Offset)],
        target_address: None,
        annotation: None,
    }
}

fn decode_immediate_writeback(raw: u32, address: u64) -> Instruction {
    let size = (raw >> 30) & 0x3;
    let v = (raw >> 26) & 1;
    let opc = (raw >> 22) & 0x3;
    let imm9 = (raw >> 12) & 0x1ff;
    let rn = ((raw >> 5) & 0x1f) as u8;
    let rt = (raw & 0x1f) as u8;
    let mode_bit = (raw >> 11) & 1;

    let Some((mnemonic, rt_is_64)) = size_and_opc_to_mnemonic(size, opc, v) else {
        let mut word = Instruction::word(raw, address);
        word.category = Category::LoadStore;
        return word;
    };

    let mode = if mode_bit == 1 { AddressingMode::PreIndex } else { AddressingMode::PostIndex };
    let offset = sign_extend(imm9, 9);

    Instruction {
        mnemonic,
        category: Category::LoadStore,
        raw,
        address,
        operands: vec![Operand::Gp(gp(rt, rt_is_64)), mem_operand(rn, offset, mode)],
        target_address: None,
        annotation: None,
    }
}

fn decode_register_offset(raw: u32, address: u64) -> Instruction {
    let size = (raw >> 30) & 0x3;
    let v = (raw >> 26) & 1;
    let opc = (raw >> 22) & 0x3;
    let rm = ((raw >> 16) & 0x1f) as u8;
    let option = (raw >> 13) & 0x7;
    let shift_bit = (raw >> 12) & 1;
    let rn = ((raw >> 5) & 0x1f) as u8;
    let rt = (raw & 0x1f) as u8;

    let Some((mnemonic, rt_is_64)) = size_and_opc_to_mnemonic(size, opc, v) else {
        let mut word = Instruction::word(raw, address);
        word.category = Category::LoadStore;
        return word;
    };

    let index_is_64 = matches!(extend_kind(option), ExtendKind::Uxtx | ExtendKind::Sxtx);
    let shift_amount = if shift_bit == 1 { size as u8 } else { 0 };

    let memory = Operand::Memory(MemOperand {
        base: gp(rn, true),
        index: Some(gp(rm, index_is_64)),
        extend: Some((extend_kind(option), shift_amount)),
        offset: 0,
        mode: AddressingMode::Offset,
    });

    Instruction {
        mnemonic,
        category: Category::LoadStore,
        raw,
        address,
        operands: vec![Operand::Gp(gp(rt, rt_is_64)), memory],
        target_address: None,
        annotation: None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unsigned_offset_ldr_64bit() {
        // size=11, V=0, opc=01 (LDR), imm12=1 -> byte offset 8.
        let raw = (0b11u32 << 30) | (0b111001 << 24) | (0b01 << 22) | (1 << 10) | (2 << 5) | 3;
        let instr = decode_unsigned_immediate(raw, 0);
        assert_eq!(instr.mnemonic, Mnemonic::Ldr);
        match &instr.operands[1] {
            Operand::Memory(m) => assert_eq!(m.offset, 8),
            _ => panic!("expected memory operand"),
        }
    }

    #[test]
    fn unscaled_ldur_byte_offset() {
        // size=11, V=0, opc=01 (LDUR), imm9 = -8 (0x1f8).
        let raw = (0b11u32 << 30) | (0b111000 << 24) | (0b01 << 22) | (0x1f8 << 12) | (2 << 5) | 3;
        let instr = decode_unscaled_immediate(raw, 0);
        assert_eq!(instr.mnemonic, Mnemonic::Ldur);
        match &instr.operands[1] {
            Operand::Memory(m) => assert_eq!(m.offset, -8),
            _ => panic!("expected memory operand"),
        }
    }

    #[test]
    fn literal_load_resolves_target() {
        let raw = (0b01u32 << 30) | (0b011000 << 24) | (1 << 5) | 0;
        let instr = decode_literal(raw, 0x1000);
        assert_eq!(instr.mnemonic, Mnemonic::Ldr);
        assert_eq!(instr.target_address, Some(0x1004));
    }

    #[test]
    fn stp_pre_indexed() {
        // opc=10 (64-bit), L=0 (store), mode=11 (pre-index), imm7=2, Rt2=3, Rn=1, Rt=0.
        let raw = (0b10u32 << 30) | (0b11 << 23) | (2 << 15) | (3 << 10) | (1 << 5);
        let instr = decode_pair(raw, 0);
        assert_eq!(instr.mnemonic, Mnemonic::Stp);
    }
}
