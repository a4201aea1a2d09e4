//! Data-processing (immediate) group: bits[28:25] = 0b1000 or 0b1001.
//!
//! Sub-classified on bits[25:23] per spec §4.3: PC-relative, add/sub
//! immediate, logical immediate, move-wide, bitfield, extract.

use super::bitmask::decode_bit_masks;
use super::instruction::{Category, Instruction, Mnemonic};
use super::operand::{GpReg, Operand};

fn sign_extend(value: u32, bits: u32) -> i64 {
    let shift = 32 - bits;
    ((value << shift) as i32 >> shift) as i64
}

fn gp(num: u8, is_64: bool) -> GpReg {
    GpReg::new(num, is_64)
}

fn gp_or_sp(num: u8, is_64: bool) -> GpReg {
    if num == 31 {
        GpReg::sp(num, is_64)
    } else {
        GpReg::new(num, is_64)
    }
}

pub fn decode(raw: u32, address: u64) -> Instruction {
    // PC-relative (ADR/ADRP): bits[28:24] = 10000
    if (raw >> 24) & 0x1f == 0b10000 {
        return decode_pc_relative(raw, address);
    }
    // Add/subtract immediate: bits[28:23] = 100010 or 100011
    if (raw >> 23) & 0x3f == 0b100010 || (raw >> 23) & 0x3f == 0b100011 {
        return decode_add_sub_immediate(raw, address);
    }
    // Logical immediate: bits[28:23] = 100100
    if (raw >> 23) & 0x3f == 0b100100 {
        return decode_logical_immediate(raw, address);
    }
    // Move wide: bits[28:23] = 100101
    if (raw >> 23) & 0x3f == 0b100101 {
        return decode_move_wide(raw, address);
    }
    // Bitfield: bits[28:23] = 100110
    if (raw >> 23) & 0x3f == 0b100110 {
        return decode_bitfield(raw, address);
    }
    // Extract: bits[28:23] = 100111
    if (raw >> 23) & 0x3f == 0b100111 {
        return decode_extract(raw, address);
    }

    let mut word = Instruction::word(raw, address);
    word.category = Category::DataProcessingImmediate;
    word
}

fn decode_pc_relative(raw: u32, address: u64) -> Instruction {
    let op = (raw >> 31) & 1;
    let immlo = (raw >> 29) & 0x3;
    let immhi = (raw >> 5) & 0x7_ffff;
    let imm21 = (immhi << 2) | immlo;
    let rd = gp((raw & 0x1f) as u8, true);

    if op == 0 {
        let offset = sign_extend(imm21, 21);
        let target = address.wrapping_add(offset as u64);
        Instruction {
            mnemonic: Mnemonic::Adr,
            category: Category::DataProcessingImmediate,
            raw,
            address,
            operands: vec![Operand::Gp(rd), Operand::Target(target)],
            target_address: Some(target),
            annotation: None,
        }
    } else {
        let offset = sign_extend(imm21, 21) << 12;
        let page = address & !0xfff;
        let target = page.wrapping_add(offset as u64);
        Instruction {
            mnemonic: Mnemonic::Adrp,
            category: Category::DataProcessingImmediate,
            raw,
            address,
            operands: vec![Operand::Gp(rd), Operand::Target(target)],
            target_address: Some(target),
            annotation: None,
        }
    }
}

fn decode_add_sub_immediate(raw: u32, address: u64) -> Instruction {
    let is_64 = (raw >> 31) & 1 == 1;
    let is_sub = (raw >> 30) & 1 == 1;
    let set_flags = (raw >> 29) & 1 == 1;
    let shift12 = (raw >> 22) & 1 == 1;
    let imm12 = (raw >> 10) & 0xfff;
    let rn = (raw >> 5) & 0x1f;
    let rd = (raw & 0x1f) as u8;

    let imm = if shift12 { (imm12 as i64) << 12 } else { imm12 as i64 };
    let rn_reg = gp_or_sp(rn as u8, is_64);
    let rd_reg = gp_or_sp(rd, is_64);

    let is_cmp_cmn = rd == 31 && set_flags;
    let is_mov_sp = !is_sub && !set_flags && imm12 == 0 && (rd == 31 || rn == 31);

    let mnemonic = match (is_sub, set_flags, is_cmp_cmn, is_mov_sp) {
        (_, _, _, true) => Mnemonic::MovSp,
        (false, _, true, _) => Mnemonic::Cmn,
        (true, _, true, _) => Mnemonic::Cmp,
        (false, true, false, _) => Mnemonic::Adds,
        (false, false, false, _) => Mnemonic::Add,
        (true, true, false, _) => Mnemonic::Subs,
        (true, false, false, _) => Mnemonic::Sub,
    };

    let operands = if is_mov_sp {
        vec![Operand::Gp(rd_reg), Operand::Gp(rn_reg)]
    } else if is_cmp_cmn {
        vec![Operand::Gp(rn_reg), Operand::Immediate(imm)]
    } else {
        vec![Operand::Gp(rd_reg), Operand::Gp(rn_reg), Operand::Immediate(imm)]
    };

    Instruction {
        mnemonic,
        category: Category::DataProcessingImmediate,
        raw,
        address,
        operands,
        target_address: None,
        annotation: None,
    }
}

fn decode_logical_immediate(raw: u32, address: u64) -> Instruction {
    let is_64 = (raw >> 31) & 1 == 1;
    let opc = (raw >> 29) & 0x3;
    let n = ((raw >> 22) & 1) as u8;
    let immr = ((raw >> 16) & 0x3f) as u8;
    let imms = ((raw >> 10) & 0x3f) as u8;
    let rn = ((raw >> 5) & 0x1f) as u8;
    let rd = (raw & 0x1f) as u8;

    let Some(imm) = decode_bit_masks(n, imms, immr, is_64) else {
        return Instruction::udf(raw, address);
    };

    let rn_reg = gp(rn, is_64);
    let is_tst = opc == 0b11 && rd == 31;
    let is_mov = opc == 0b01 && rn == 31;
    let mnemonic = if is_tst {
        Mnemonic::Tst
    } else if is_mov {
        Mnemonic::Mov
    } else {
        match opc {
            0b00 => Mnemonic::And,
            0b01 => Mnemonic::Orr,
            0b10 => Mnemonic::Eor,
            _ => Mnemonic::Ands,
        }
    };

    let imm_signed = if is_64 { imm as i64 } else { imm as u32 as i64 };
    let rd_reg = gp_or_sp(rd, is_64);
    let operands = if is_tst {
        vec![Operand::Gp(rn_reg), Operand::Immediate(imm_signed)]
    } else if is_mov {
        vec![Operand::Gp(rd_reg), Operand::Immediate(imm_signed)]
    } else {
        vec![Operand::Gp(rd_reg), Operand::Gp(rn_reg), Operand::Immediate(imm_signed)]
    };

    Instruction {
        mnemonic,
        category: Category::DataProcessingImmediate,
        raw,
        address,
        operands,
        target_address: None,
        annotation: None,
    }
}

fn decode_move_wide(raw: u32, address: u64) -> Instruction {
    let is_64 = (raw >> 31) & 1 == 1;
    let opc = (raw >> 29) & 0x3;
    let hw = (raw >> 21) & 0x3;
    let imm16 = (raw >> 5) & 0xffff;
    let rd = (raw & 0x1f) as u8;
    let shift = hw * 16;

    let mnemonic = match opc {
        0b00 => Mnemonic::Movn,
        0b10 => Mnemonic::Movz,
        0b11 => Mnemonic::Movk,
        _ => return Instruction::udf(raw, address),
    };

    let rd_reg = gp(rd, is_64);
    Instruction {
        mnemonic,
        category: Category::DataProcessingImmediate,
        raw,
        address,
        operands: vec![
            Operand::Gp(rd_reg),
            Operand::Immediate(imm16 as i64),
            Operand::Immediate(shift as i64),
        ],
        target_address: None,
        annotation: None,
    }
}

fn decode_bitfield(raw: u32, address: u64) -> Instruction {
    let is_64 = (raw >> 31) & 1 == 1;
    let opc = (raw >> 29) & 0x3;
    let immr = (raw >> 16) & 0x3f;
    let imms = (raw >> 10) & 0x3f;
    let rn = ((raw >> 5) & 0x1f) as u8;
    let rd = (raw & 0x1f) as u8;

    let rd_reg = gp(rd, is_64);
    let rn_reg = gp(rn, is_64);

    let (base, aliased) = match opc {
        0b00 => (Mnemonic::Sbfm, alias_bitfield(Mnemonic::Sbfm, immr, imms, is_64)),
        0b01 => (Mnemonic::Bfm, alias_bitfield(Mnemonic::Bfm, immr, imms, is_64)),
        _ => (Mnemonic::Ubfm, alias_bitfield(Mnemonic::Ubfm, immr, imms, is_64)),
    };

    let mnemonic = aliased.unwrap_or(base);
    Instruction {
        mnemonic,
        category: Category::DataProcessingImmediate,
        raw,
        address,
        operands: vec![
            Operand::Gp(rd_reg),
            Operand::Gp(rn_reg),
            Operand::Immediate(immr as i64),
            Operand::Immediate(imms as i64),
        ],
        target_address: None,
        annotation: None,
    }
}

/// Selects the canonical alias name for a bitfield instruction where one
/// applies, per spec §4.3 "ASR/LSR/LSL/SXT*/UXT* aliases keyed on
/// immr/imms relationships". Returns `None` to keep the base mnemonic.
fn alias_bitfield(base: Mnemonic, immr: u32, imms: u32, is_64: bool) -> Option<Mnemonic> {
    let width = if is_64 { 63 } else { 31 };
    match base {
        Mnemonic::Sbfm if imms == width => Some(Mnemonic::Asr),
        Mnemonic::Ubfm if imms == width => Some(Mnemonic::Lsr),
        Mnemonic::Ubfm if imms + 1 == immr => Some(Mnemonic::Lsl),
        Mnemonic::Sbfm if immr == 0 && imms == 7 => Some(Mnemonic::Sxtb),
        Mnemonic::Sbfm if immr == 0 && imms == 15 => Some(Mnemonic::Sxth),
        Mnemonic::Sbfm if immr == 0 && imms == 31 && is_64 => Some(Mnemonic::Sxtw),
        Mnemonic::Ubfm if immr == 0 && imms == 7 => Some(Mnemonic::Uxtb),
        Mnemonic::Ubfm if immr == 0 && imms == 15 => Some(Mnemonic::Uxth),
        _ => None,
    }
}

fn decode_extract(raw: u32, address: u64) -> Instruction {
    let is_64 = (raw >> 31) & 1 == 1;
    let rm = ((raw >> 16) & 0x1f) as u8;
    let imms = (raw >> 10) & 0x3f;
    let rn = ((raw >> 5) & 0x1f) as u8;
    let rd = (raw & 0x1f) as u8;

    let rd_reg = gp(rd, is_64);
    let rn_reg = gp(rn, is_64);
    let rm_reg = gp(rm, is_64);

    if rn == rm {
        Instruction {
            mnemonic: Mnemonic::Ror,
            category: Category::DataProcessingImmediate,
            raw,
            address,
            operands: vec![Operand::Gp(rd_reg), Operand::Gp(rn_reg), Operand::Immediate(imms as i64)],
            target_address: None,
            annotation: None,
        }
    } else {
        Instruction {
            mnemonic: Mnemonic::Extr,
            category: Category::DataProcessingImmediate,
            raw,
            address,
            operands: vec![
                Operand::Gp(rd_reg),
                Operand::Gp(rn_reg),
                Operand::Gp(rm_reg),
                Operand::Immediate(imms as i64),
            ],
            target_address: None,
            annotation: None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn encode_adrp(rd: u8, imm21: i32) -> u32 {
        let imm = imm21 as u32 & 0x1f_ffff;
        let immlo = imm & 0x3;
        let immhi = imm >> 2;
        (1 << 31) | (immlo << 29) | (0b10000 << 24) | (immhi << 5) | rd as u32
    }

    #[test]
    fn scenario_4_adrp_page_alignment() {
        // adrp x0, <page> with immhi:immlo == 1, at address 0x100004123
        let raw = encode_adrp(0, 1);
        let instr = decode(raw, 0x100004123);
        assert_eq!(instr.mnemonic, Mnemonic::Adrp);
        assert_eq!(instr.target_address, Some((0x100004123u64 & !0xfff) + (1 << 12)));
    }

    #[test]
    fn orr_immediate_32bit() {
        // sf=0, opc=01 (ORR), N=0, immr=0, imms=0b110000 (esize=8, s=0 -> 0x01010101)
        let raw = (0b01u32 << 29) | (0b100100 << 23) | (0 << 22) | (0b110000 << 10) | (1 << 5) | 2;
        let instr = decode(raw, 0x1000);
        assert_eq!(instr.mnemonic, Mnemonic::Orr);
        assert!(matches!(instr.operands[2], Operand::Immediate(0x0101_0101)));
    }

    #[test]
    fn tst_alias_when_rd_is_xzr() {
        // sf=1, opc=11 (ANDS), N=1, immr=0, imms=0 -> imm=1, Rd=31 -> TST alias
        let raw = (1u32 << 31) | (0b11u32 << 29) | (0b100100 << 23) | (1 << 22) | (0 << 10) | (1 << 5) | 31;
        let instr = decode(raw, 0x1000);
        assert_eq!(instr.mnemonic, Mnemonic::Tst);
    }

    #[test]
    fn mov_alias_when_rn_is_xzr() {
        // sf=1, opc=01 (ORR), N=1, immr=0, imms=0b110000 (esize=8, s=0 -> 0x0101...01),
        // Rn=31 -> MOV alias, Rd=2
        let raw = (1u32 << 31) | (0b01u32 << 29) | (0b100100 << 23) | (1 << 22) | (0b110000 << 10) | (31 << 5) | 2;
        let instr = decode(raw, 0x1000);
        assert_eq!(instr.mnemonic, Mnemonic::Mov);
        assert_eq!(instr.operands.len(), 2);
        assert!(matches!(instr.operands[0], Operand::Gp(r) if r.num == 2));
        assert!(matches!(instr.operands[1], Operand::Immediate(_)));
    }
}
