//! SIMD and floating-point group: bits[28:25] = 0b0111 or 0b1111.
//!
//! Full Advanced SIMD/FP coverage is out of scope; this module recognizes
//! the handful of scalar FP data-processing mnemonics the disassembler
//! names explicitly and otherwise emits an annotated `.word`.

use super::instruction::{Category, Instruction, Mnemonic};
use super::operand::{FpReg, Operand};

fn fp(num: u8, width_bits: u16) -> FpReg {
    FpReg { num, width_bits }
}

fn width_for_type(ftype: u32) -> Option<u16> {
    match ftype {
        0b00 => Some(32),
        0b01 => Some(64),
        0b11 => Some(16),
        _ => None,
    }
}

pub fn decode(raw: u32, address: u64) -> Instruction {
    let is_scalar_fp_dp1 = (raw >> 24) & 0xff == 0b0001_1110 && (raw >> 21) & 1 == 1 && (raw >> 10) & 1 == 1;
    let is_scalar_fp_dp2 = (raw >> 24) & 0xff == 0b0001_1110 && (raw >> 21) & 1 == 1 && (raw >> 10) & 1 == 0;
    let is_scalar_fp_dp3 = (raw >> 24) & 0xff == 0b0001_1111;

    if is_scalar_fp_dp1 {
        return decode_dp1(raw, address);
    }
    if is_scalar_fp_dp2 {
        return decode_dp2(raw, address);
    }
    if is_scalar_fp_dp3 {
        return decode_dp3(raw, address);
    }

    unrecognized(raw, address)
}

fn unrecognized(raw: u32, address: u64) -> Instruction {
    Instruction {
        mnemonic: Mnemonic::Word,
        category: Category::Simd,
        raw,
        address,
        operands: vec![Operand::Immediate(raw as i64)],
        target_address: None,
        annotation: Some("unrecognized SIMD/FP"),
    }
}

fn decode_dp1(raw: u32, address: u64) -> Instruction {
    let ftype = (raw >> 22) & 0x3;
    let opcode = (raw >> 15) & 0x3f;
    let rn = ((raw >> 5) & 0x1f) as u8;
    let rd = (raw & 0x1f) as u8;

    let Some(width) = width_for_type(ftype) else {
        return unrecognized(raw, address);
    };

    let mnemonic = match opcode {
        0b000000 => Mnemonic::Fmov,
        0b000001 => Mnemonic::Fabs,
        0b000010 => Mnemonic::Fneg,
        _ => return unrecognized(raw, address),
    };

    Instruction {
        mnemonic,
        category: Category::Simd,
        raw,
        address,
        operands: vec![Operand::Fp(fp(rd, width)), Operand::Fp(fp(rn, width))],
        target_address: None,
        annotation: None,
    }
}

fn decode_dp2(raw: u32, address: u64) -> Instruction {
    let ftype = (raw >> 22) & 0x3;
    let rm = ((raw >> 16) & 0x1f) as u8;
    let opcode = (raw >> 12) & 0xf;
    let rn = ((raw >> 5) & 0x1f) as u8;
    let rd = (raw & 0x1f) as u8;

    let Some(width) = width_for_type(ftype) else {
        return unrecognized(raw, address);
    };

    let mnemonic = match opcode {
        0b0010 => Mnemonic::Fadd,
        0b0011 => Mnemonic::Fsub,
        0b0000 => Mnemonic::Fmul,
        _ => return unrecognized(raw, address),
    };

    Instruction {
        mnemonic,
        category: Category::Simd,
        raw,
        address,
        operands: vec![Operand::Fp(fp(rd, width)), Operand::Fp(fp(rn, width)), Operand::Fp(fp(rm, width))],
        target_address: None,
        annotation: None,
    }
}

fn decode_dp3(raw: u32, address: u64) -> Instruction {
    let ftype = (raw >> 22) & 0x3;
    let rm = ((raw >> 16) & 0x1f) as u8;
    let o1 = (raw >> 21) & 1;
    let ra = ((raw >> 10) & 0x1f) as u8;
    let rn = ((raw >> 5) & 0x1f) as u8;
    let rd = (raw & 0x1f) as u8;
    let o0 = (raw >> 15) & 1;

    let Some(width) = width_for_type(ftype) else {
        return unrecognized(raw, address);
    };

    // o1:o0 select FMADD/FMSUB/FNMADD/FNMSUB; only the plain FMADD case
    // is named explicitly, matching the minimal mnemonic set.
    if o1 == 0 && o0 == 0 {
        return Instruction {
            mnemonic: Mnemonic::Fmadd,
            category: Category::Simd,
            raw,
            address,
            operands: vec![
                Operand::Fp(fp(rd, width)),
                Operand::Fp(fp(rn, width)),
                Operand::Fp(fp(rm, width)),
                Operand::Fp(fp(ra, width)),
            ],
            target_address: None,
            annotation: None,
        };
    }

    unrecognized(raw, address)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fadd_double_precision() {
        // ftype=01 (double), opcode=0010 (FADD), Rd=0, Rn=1, Rm=2.
        let raw = (0b0001_1110u32 << 24) | (0b01 << 22) | (1 << 21) | (2 << 16) | (0b0010 << 12) | (1 << 5) | 0;
        let instr = decode(raw, 0);
        assert_eq!(instr.mnemonic, Mnemonic::Fadd);
        match &instr.operands[0] {
            Operand::Fp(r) => assert_eq!(r.width_bits, 64),
            _ => panic!("expected fp operand"),
        }
    }

    #[test]
    fn fabs_single_precision() {
        // ftype=00 (single), op bit10=1 selects dp1, opcode=000001 (FABS).
        let raw = (0b0001_1110u32 << 24) | (0b00 << 22) | (1 << 21) | (0b000001 << 15) | (1 << 10) | (2 << 5) | 0;
        let instr = decode(raw, 0);
        assert_eq!(instr.mnemonic, Mnemonic::Fabs);
    }

    #[test]
    fn unrecognized_opcode_annotated() {
        let raw = (0b0001_1110u32 << 24) | (0b01 << 22) | (1 << 21) | (0b111111 << 15) | (1 << 10);
        let instr = decode(raw, 0);
        assert_eq!(instr.mnemonic, Mnemonic::Word);
        assert_eq!(instr.annotation, Some("unrecognized SIMD/FP"));
    }
}
