//! Branch, exception-generating and system instructions: bits[28:25] = 0b1010 or 0b1011.

use super::instruction::{Category, Instruction, Mnemonic};
use super::operand::{Condition, GpReg, Operand};

fn sign_extend(value: u32, bits: u32) -> i64 {
    let shift = 64 - bits;
    ((value as i64) << shift) >> shift
}

pub fn decode(raw: u32, address: u64) -> Instruction {
    // Each sub-group is selected by a fixed bit pattern over a distinct
    // field width, per the ARM main encoding table for this class.
    if (raw >> 26) & 0x1f == 0b00101 {
        return decode_unconditional_branch_immediate(raw, address);
    }
    if (raw >> 25) & 0x3f == 0b011010 {
        return decode_compare_and_branch(raw, address);
    }
    if (raw >> 25) & 0x3f == 0b011011 {
        return decode_test_and_branch(raw, address);
    }
    if (raw >> 31) & 1 == 0 && (raw >> 24) & 0x7f == 0b0101010 {
        return decode_conditional_branch(raw, address);
    }
    if (raw >> 24) & 0xff == 0b1101_0100 {
        return decode_exception_or_system(raw, address);
    }
    if (raw >> 24) & 0xff == 0b1101_0101 {
        return decode_system(raw, address);
    }
    if (raw >> 25) & 0x7f == 0b1101_011 {
        return decode_unconditional_branch_register(raw, address);
    }

    let mut word = Instruction::word(raw, address);
    word.category = Category::BranchExceptionSystem;
    word
}

fn decode_unconditional_branch_immediate(raw: u32, address: u64) -> Instruction {
    let is_bl = (raw >> 31) & 1 == 1;
    let imm26 = raw & 0x03ff_ffff;
    let offset = sign_extend(imm26, 26) << 2;
    let target = (address as i64 + offset) as u64;

    Instruction {
        mnemonic: if is_bl { Mnemonic::Bl } else { Mnemonic::B },
        category: Category::BranchExceptionSystem,
        raw,
        address,
        operands: vec![Operand::Target(target)],
        target_address: Some(target),
        annotation: None,
    }
}

fn decode_compare_and_branch(raw: u32, address: u64) -> Instruction {
    let is_64 = (raw >> 31) & 1 == 1;
    let is_nonzero = (raw >> 24) & 1 == 1;
    let imm19 = (raw >> 5) & 0x7ffff;
    let rt = (raw & 0x1f) as u8;
    let offset = sign_extend(imm19, 19) << 2;
    let target = (address as i64 + offset) as u64;

    Instruction {
        mnemonic: if is_nonzero { Mnemonic::Cbnz } else { Mnemonic::Cbz },
        category: Category::BranchExceptionSystem,
        raw,
        address,
        operands: vec![Operand::Gp(GpReg::new(rt, is_64)), Operand::Target(target)],
        target_address: Some(target),
        annotation: None,
    }
}

fn decode_test_and_branch(raw: u32, address: u64) -> Instruction {
    let is_nonzero = (raw >> 24) & 1 == 1;
    let b5 = (raw >> 31) & 1;
    let b40 = (raw >> 19) & 0x1f;
    let bit_pos = ((b5 << 5) | b40) as u8;
    let imm14 = (raw >> 5) & 0x3fff;
    let rt = (raw & 0x1f) as u8;
    let offset = sign_extend(imm14, 14) << 2;
    let target = (address as i64 + offset) as u64;
    let is_64 = b5 == 1;

    Instruction {
        mnemonic: if is_nonzero { Mnemonic::Tbnz } else { Mnemonic::Tbz },
        category: Category::BranchExceptionSystem,
        raw,
        address,
        operands: vec![Operand::Gp(GpReg::new(rt, is_64)), Operand::Immediate(bit_pos as i64), Operand::Target(target)],
        target_address: Some(target),
        annotation: None,
    }
}

fn decode_conditional_branch(raw: u32, address: u64) -> Instruction {
    let imm19 = (raw >> 5) & 0x7ffff;
    let cond = Condition::from_bits((raw & 0xf) as u8);
    let offset = sign_extend(imm19, 19) << 2;
    let target = (address as i64 + offset) as u64;

    Instruction {
        mnemonic: Mnemonic::Bcond,
        category: Category::BranchExceptionSystem,
        raw,
        address,
        operands: vec![Operand::Condition(cond), Operand::Target(target)],
        target_address: Some(target),
        annotation: None,
    }
}

fn decode_unconditional_branch_register(raw: u32, address: u64) -> Instruction {
    let opc = (raw >> 21) & 0xf;
    let op2 = (raw >> 16) & 0x1f;
    let op3 = (raw >> 10) & 0x3f;
    let rn = ((raw >> 5) & 0x1f) as u8;
    let op4 = raw & 0x1f;

    if op2 == 0b11111 && op3 == 0 {
        let mnemonic = match opc {
            0b0000 => Mnemonic::Br,
            0b0001 => Mnemonic::Blr,
            0b0010 => Mnemonic::Ret,
            0b0100 if rn == 0b11111 && op4 == 0 => Mnemonic::Eret,
            0b0101 if rn == 0b11111 && op4 == 0 => Mnemonic::Drps,
            _ => return Instruction::udf(raw, address),
        };
        let operands = match mnemonic {
            Mnemonic::Br | Mnemonic::Blr => vec![Operand::Gp(GpReg::new(rn, true))],
            Mnemonic::Ret if rn != 30 => vec![Operand::Gp(GpReg::new(rn, true))],
            _ => vec![],
        };
        return Instruction {
            mnemonic,
            category: Category::BranchExceptionSystem,
            raw,
            address,
            operands,
            target_address: None,
            annotation: None,
        };
    }

    // PAC-authenticated branch/return variants (op3 selects the M/Z
    // discriminator pattern). Kept coarse-grained: operands carry the
    // modifier register when present, annotation records the lack of
    // full key/discriminator decoding.
    let pac_mnemonic = match (opc, op3 >> 1) {
        (0b0000, 0b00001) => Some(Mnemonic::Braa),
        (0b0000, 0b00011) => Some(Mnemonic::Brab),
        (0b0001, 0b00001) => Some(Mnemonic::Blraa),
        (0b0001, 0b00011) => Some(Mnemonic::Blrab),
        (0b0010, 0b00001) if rn == 0b11111 => Some(Mnemonic::Retaa),
        (0b0010, 0b00011) if rn == 0b11111 => Some(Mnemonic::Retab),
        _ => None,
    };

    if let Some(mnemonic) = pac_mnemonic {
        let operands = match mnemonic {
            Mnemonic::Retaa | Mnemonic::Retab => vec![],
            _ => vec![Operand::Gp(GpReg::new(rn, true)), Operand::Gp(GpReg::new(op4 as u8, true))],
        };
        return Instruction {
            mnemonic,
            category: Category::Pac,
            raw,
            address,
            operands,
            target_address: None,
            annotation: None,
        };
    }

    let mut word = Instruction::word(raw, address);
    word.category = Category::BranchExceptionSystem;
    word
}

fn decode_exception_or_system(raw: u32, address: u64) -> Instruction {
    let opc = (raw >> 21) & 0x7;
    let imm16 = ((raw >> 5) & 0xffff) as i64;
    let ll = raw & 0x3;

    let mnemonic = match opc {
        0b000 => match ll {
            0b01 => Mnemonic::Svc,
            0b10 => Mnemonic::Hvc,
            0b11 => Mnemonic::Smc,
            _ => return Instruction::udf(raw, address),
        },
        0b001 => Mnemonic::Brk,
        0b010 => Mnemonic::Hlt,
        0b101 => match ll {
            0b01 => Mnemonic::Dcps1,
            0b10 => Mnemonic::Dcps2,
            _ => Mnemonic::Dcps3,
        },
        _ => return Instruction::udf(raw, address),
    };

    Instruction {
        mnemonic,
        category: Category::BranchExceptionSystem,
        raw,
        address,
        operands: vec![Operand::Immediate(imm16)],
        target_address: None,
        annotation: None,
    }
}

fn decode_system(raw: u32, address: u64) -> Instruction {
    let l = (raw >> 21) & 1;
    let op0 = (raw >> 19) & 0x3;

    if op0 == 0b00 {
        return decode_hint_or_barrier(raw, address);
    }

    // MSR/MRS (register form): L selects MRS (1) vs MSR (0). The full
    // op0/op1/CRn/CRm/op2 system-register field is rendered as the raw
    // `s{op0}_{op1}_c{crn}_c{crm}_{op2}` fallback form.
    let sys_op1 = (raw >> 16) & 0x7;
    let crn = (raw >> 12) & 0xf;
    let crm = (raw >> 8) & 0xf;
    let sys_op2 = (raw >> 5) & 0x7;
    let rt = (raw & 0x1f) as u8;
    let sysreg = format!("s{}_{}_c{}_c{}_{}", op0 + 2, sys_op1, crn, crm, sys_op2);

    Instruction {
        mnemonic: if l == 1 { Mnemonic::Mrs } else { Mnemonic::Msr },
        category: Category::BranchExceptionSystem,
        raw,
        address,
        operands: if l == 1 {
            vec![Operand::Gp(GpReg::new(rt, true)), Operand::SystemRegister(sysreg)]
        } else {
            vec![Operand::SystemRegister(sysreg), Operand::Gp(GpReg::new(rt, true))]
        },
        target_address: None,
        annotation: None,
    }
}

fn decode_hint_or_barrier(raw: u32, address: u64) -> Instruction {
    let crn = (raw >> 12) & 0xf;
    let crm = (raw >> 8) & 0xf;
    let op2 = (raw >> 5) & 0x7;
    let rt = (raw & 0x1f) as u8;

    if crn == 0b0010 {
        // Hints: CRm:op2 selects NOP/YIELD/WFE/WFI/SEV/SEVL and the PAC hints.
        let mnemonic = match (crm, op2) {
            (0b0000, 0b000) => Mnemonic::Nop,
            (0b0000, 0b001) => Mnemonic::Yield,
            (0b0000, 0b010) => Mnemonic::Wfe,
            (0b0000, 0b011) => Mnemonic::Wfi,
            (0b0000, 0b100) => Mnemonic::Sev,
            (0b0000, 0b101) => Mnemonic::Sevl,
            (0b0001, 0b000) => Mnemonic::Paciasp,
            (0b0011, 0b000) => Mnemonic::Autiasp,
            (0b0010, 0b001) => Mnemonic::Pacibsp,
            (0b0010, 0b011) => Mnemonic::Autibsp,
            (0b0111, 0b000) => Mnemonic::Xpaclri,
            _ => Mnemonic::Nop,
        };
        return Instruction {
            mnemonic,
            category: Category::BranchExceptionSystem,
            raw,
            address,
            operands: vec![],
            target_address: None,
            annotation: None,
        };
    }

    if crn == 0b0011 {
        let barrier_kind = match rt & 0xf {
            0b1111 => "SY",
            0b1110 => "ST",
            0b1101 => "LD",
            _ => "#",
        };
        let mnemonic = match op2 {
            0b100 => Mnemonic::Dsb,
            0b101 => Mnemonic::Dmb,
            0b110 => Mnemonic::Isb,
            0b010 if crm == 0 => Mnemonic::Clrex,
            0b111 if crm == 0 => Mnemonic::Sb,
            _ => return Instruction::udf(raw, address),
        };
        let operands = match mnemonic {
            Mnemonic::Clrex | Mnemonic::Sb => vec![],
            _ => vec![Operand::Barrier(barrier_kind.to_string())],
        };
        return Instruction {
            mnemonic,
            category: Category::BranchExceptionSystem,
            raw,
            address,
            operands,
            target_address: None,
            annotation: None,
        };
    }

    let mut word = Instruction::word(raw, address);
    word.category = Category::BranchExceptionSystem;
    word
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unconditional_branch_forward() {
        // fixed bits30:26=00101, imm26=4 (target = address + 16)
        let raw = (0b00101u32 << 26) | 4u32;
        let instr = decode(raw, 0x1000);
        assert_eq!(instr.mnemonic, Mnemonic::B);
        assert_eq!(instr.target_address, Some(0x1010));
    }

    #[test]
    fn bl_sets_link_bit() {
        let raw = (1u32 << 31) | (0b00101u32 << 26) | 4u32;
        let instr = decode(raw, 0x2000);
        assert_eq!(instr.mnemonic, Mnemonic::Bl);
        assert_eq!(instr.target_address, Some(0x2010));
    }

    #[test]
    fn cbz_decodes_register_and_target() {
        // sf=0, fixed bits30:25=011010, op=0 (CBZ), imm19=2 -> offset 8, Rt=5.
        let raw = (0b011010u32 << 25) | (2 << 5) | 5;
        let instr = decode_compare_and_branch(raw, 0x4000);
        assert_eq!(instr.mnemonic, Mnemonic::Cbz);
        assert_eq!(instr.target_address, Some(0x4008));
    }

    #[test]
    fn ret_defaults_to_x30() {
        // fixed bits30:25=1101011, opc=0010 (RET), op2=11111, op3=000000, Rn=30.
        let raw = (0b1101011u32 << 25) | (0b0010 << 21) | (0b11111 << 16) | (30 << 5);
        let instr = decode_unconditional_branch_register(raw, 0);
        assert_eq!(instr.mnemonic, Mnemonic::Ret);
        assert!(instr.operands.is_empty());
    }

    #[test]
    fn nop_hint() {
        // crn=0010, op1=0000, op2=000 (NOP), Rt=11111.
        let raw = (0b0010u32 << 12) | 0b11111;
        let instr = decode_hint_or_barrier(raw, 0);
        assert_eq!(instr.mnemonic, Mnemonic::Nop);
    }
}
