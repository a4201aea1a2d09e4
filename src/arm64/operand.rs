//! Operand types shared across every ARM64 sub-decoder.

/// An ARM64 general-purpose or SP register reference. `is_64` selects
/// between the `X`/`W` register file views of the same physical register.
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize)]
pub struct GpReg {
    pub num: u8,
    pub is_64: bool,
    /// `true` if bits encode register 31 as SP rather than the zero
    /// register (context-dependent per spec §4.3's alias rules).
    pub is_sp: bool,
}

impl GpReg {
    pub fn new(num: u8, is_64: bool) -> Self {
        GpReg { num, is_64, is_sp: false }
    }

    pub fn sp(num: u8, is_64: bool) -> Self {
        GpReg { num, is_64, is_sp: true }
    }

    pub fn is_zero(&self) -> bool {
        self.num == 31 && !self.is_sp
    }
}

/// A SIMD/FP register reference (`Q`/`D`/`S`/`H`/`B` views).
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize)]
pub struct FpReg {
    pub num: u8,
    pub width_bits: u16,
}

/// Shift kinds used by shifted-register data-processing instructions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize)]
pub enum ShiftKind {
    Lsl,
    Lsr,
    Asr,
    Ror,
}

/// Extend kinds used by extended-register add/sub and some load/store
/// addressing modes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize)]
pub enum ExtendKind {
    Uxtb,
    Uxth,
    Uxtw,
    Uxtx,
    Sxtb,
    Sxth,
    Sxtw,
    Sxtx,
}

/// Condition codes used by conditional branch/select/compare instructions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize)]
pub enum Condition {
    Eq,
    Ne,
    Cs,
    Cc,
    Mi,
    Pl,
    Vs,
    Vc,
    Hi,
    Ls,
    Ge,
    Lt,
    Gt,
    Le,
    Al,
    Nv,
}

impl Condition {
    pub fn from_bits(bits: u8) -> Self {
        match bits & 0xf {
            0x0 => Condition::Eq,
            0x1 => Condition::Ne,
            0x2 => Condition::Cs,
            0x3 => Condition::Cc,
            0x4 => Condition::Mi,
            0x5 => Condition::Pl,
            0x6 => Condition::Vs,
            0x7 => Condition::Vc,
            0x8 => Condition::Hi,
            0x9 => Condition::Ls,
            0xa => Condition::Ge,
            0xb => Condition::Lt,
            0xc => Condition::Gt,
            0xd => Condition::Le,
            0xe => Condition::Al,
            _ => Condition::Nv,
        }
    }

    /// The logical inverse, used by CSET/CSETM/CINC aliasing (spec §4.3).
    pub fn invert(self) -> Self {
        Condition::from_bits(self as u8 ^ 1)
    }
}

/// One operand to an [`super::instruction::Instruction`].
#[derive(Debug, Clone, Copy, PartialEq, serde::Serialize)]
pub enum Operand {
    Gp(GpReg),
    Fp(FpReg),
    Immediate(i64),
    /// A register optionally shifted (AND/ORR/... shifted-register forms).
    ShiftedReg { reg: GpReg, kind: ShiftKind, amount: u8 },
    /// A register optionally extended (ADD/SUB extended-register forms,
    /// and register-offset load/store addressing).
    ExtendedReg { reg: GpReg, kind: ExtendKind, shift: u8 },
    /// `[Xn, #imm]`-style memory operand, with an addressing mode.
    Memory(MemOperand),
    Condition(Condition),
    /// A named system register (`MSR`/`MRS`) or the raw `s{op0}_{op1}_c{crn}_c{crm}_{op2}`
    /// fallback form.
    SystemRegister(String),
    /// A PC-relative branch/literal target, already resolved to an absolute
    /// address (spec §4.3 "branch target computation").
    Target(u64),
    Barrier(String),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize)]
pub enum AddressingMode {
    Offset,
    PreIndex,
    PostIndex,
}

#[derive(Debug, Clone, Copy, PartialEq, serde::Serialize)]
pub struct MemOperand {
    pub base: GpReg,
    pub index: Option<GpReg>,
    pub extend: Option<(ExtendKind, u8)>,
    pub offset: i64,
    pub mode: AddressingMode,
}
