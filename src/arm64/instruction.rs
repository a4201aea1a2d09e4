//! The decoded instruction type and its mnemonic/category vocabulary.

use super::operand::Operand;

/// Broad classification of a decoded instruction, used by callers to group
/// disassembly output (spec §4.3 groups) without matching on every mnemonic.
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize)]
pub enum Category {
    DataProcessingImmediate,
    DataProcessingRegister,
    BranchExceptionSystem,
    LoadStore,
    Simd,
    /// PAC (pointer authentication) instructions and hints, called out
    /// separately per spec §4.3 even though they route through
    /// branch/exception/system or the hint-space decoder.
    Pac,
    Unknown,
}

/// Every mnemonic (after alias resolution) this decoder emits. Grouped by
/// the ARM encoding-group documentation comments, same convention as the
/// `A64_*` opcode list this decoder is grounded on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize)]
#[allow(non_camel_case_types)]
pub enum Mnemonic {
    Word,
    Udf,

    // --- Data processing (immediate) ---
    Adr,
    Adrp,
    Add,
    Adds,
    Sub,
    Subs,
    Cmn,
    Cmp,
    MovSp,
    And,
    Ands,
    Bics,
    Orr,
    Eor,
    Tst,
    Mov,
    Mvn,
    Movz,
    Movn,
    Movk,
    Sbfm,
    Bfm,
    Ubfm,
    Asr,
    Sbfiz,
    Sbfx,
    Bfc,
    Bfi,
    Bfxil,
    Lsl,
    Lsr,
    Ubfiz,
    Ubfx,
    Sxtb,
    Sxth,
    Sxtw,
    Uxtb,
    Uxth,
    Extr,
    Ror,

    // --- Data processing (register) ---
    Bic,
    Orn,
    Eon,
    Neg,
    Negs,
    Madd,
    Msub,
    Mul,
    Mneg,
    Smaddl,
    Smsubl,
    Smull,
    Smnegl,
    Smulh,
    Umaddl,
    Umsubl,
    Umull,
    Umnegl,
    Umulh,
    Udiv,
    Sdiv,
    Lslv,
    Lsrv,
    Asrv,
    Rorv,
    Csel,
    Csinc,
    Csinv,
    Csneg,
    Cset,
    Csetm,
    Cinc,
    Cinv,

    // --- Branch / exception / system ---
    B,
    Bl,
    Bcond,
    Cbz,
    Cbnz,
    Tbz,
    Tbnz,
    Br,
    Blr,
    Ret,
    Eret,
    Drps,
    Braa,
    Brab,
    Blraa,
    Blrab,
    Braaz,
    Brabz,
    Blraaz,
    Blrabz,
    Retaa,
    Retab,
    Svc,
    Hvc,
    Smc,
    Brk,
    Hlt,
    Dcps1,
    Dcps2,
    Dcps3,
    Msr,
    Mrs,
    Nop,
    Yield,
    Wfe,
    Wfi,
    Sev,
    Sevl,
    Paciasp,
    Autiasp,
    Pacibsp,
    Autibsp,
    Xpaclri,
    Dmb,
    Dsb,
    Isb,
    Clrex,
    Sb,

    // --- Loads and stores ---
    Ldr,
    Str,
    Ldrb,
    Strb,
    Ldrsb,
    Ldrh,
    Strh,
    Ldrsh,
    Ldrsw,
    Ldur,
    Stur,
    Ldp,
    Stp,
    Ldpsw,
    Prfm,

    // --- SIMD/FP (minimal coverage) ---
    Fmov,
    Fabs,
    Fneg,
    Fadd,
    Fsub,
    Fmul,
    Fmadd,
}

/// A single decoded ARM64 instruction.
#[derive(Debug, Clone, serde::Serialize)]
pub struct Instruction {
    pub mnemonic: Mnemonic,
    pub category: Category,
    pub raw: u32,
    pub address: u64,
    pub operands: Vec<Operand>,
    /// Resolved absolute target for PC-relative instructions (spec §4.3
    /// "branch target computation"); `None` for non-branching instructions.
    pub target_address: Option<u64>,
    /// Free-form note for instructions whose behavior isn't fully captured
    /// by mnemonic + operands (e.g. "unrecognized SIMD/FP", PAC variants).
    pub annotation: Option<&'static str>,
}

impl Instruction {
    pub fn word(raw: u32, address: u64) -> Self {
        Instruction {
            mnemonic: Mnemonic::Word,
            category: Category::Unknown,
            raw,
            address,
            operands: vec![Operand::Immediate(raw as i64)],
            target_address: None,
            annotation: None,
        }
    }

    pub fn udf(raw: u32, address: u64) -> Self {
        Instruction {
            mnemonic: Mnemonic::Udf,
            category: Category::Unknown,
            raw,
            address,
            operands: vec![Operand::Immediate((raw & 0xffff) as i64)],
            target_address: None,
            annotation: None,
        }
    }
}
