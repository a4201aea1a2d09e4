//! ARM64 thread state: `thread_get_state`/`thread_set_state` plumbing and
//! the portable [`Registers`] record (spec §4.5 "Register access").
//!
//! Follows the teacher's `mach_helpers::ThreadState`/`ArchThreadState`
//! pattern: a fixed-size `u32` buffer sized to `THREAD_STATE_MAX`, reinterpreted
//! as the arch-specific state struct after the kernel fills it in.

use mach2::kern_return::KERN_SUCCESS;
use mach2::mach_types::thread_act_t;

use super::error::{DebugError, KernelError};

/// `ARM_THREAD_STATE64` flavor id, from `/usr/include/mach/arm/thread_status.h`.
pub const THREAD_STATE_FLAVOR: u32 = 6;

/// `_STRUCT_ARM_THREAD_STATE64` from `/usr/include/mach/arm/_structs.h`.
/// Not yet exposed by `mach2`, so it's reproduced here field-for-field.
#[repr(C)]
#[derive(Debug, Clone, Copy, Default)]
struct Arm64ThreadState {
    x: [u64; 29],
    fp: u64,
    lr: u64,
    sp: u64,
    pc: u64,
    cpsr: u32,
    __pad: u32,
}

const ARM64_STATE_COUNT: u32 = (std::mem::size_of::<Arm64ThreadState>() / 4) as u32;

/// The single-step control bit in `cpsr` (spec §9 "Single-step bit
/// location"): bit 21, the processor state's software-step flag.
const CPSR_SOFTWARE_STEP_BIT: u32 = 1 << 21;

/// Portable general-purpose + special register snapshot for an ARM64
/// thread. `gp[0..=28]` are x0-x28, `gp[29]` is fp (x29), `gp[30]` is lr
/// (x30); index 31 is the architectural zero register and is not stored.
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize)]
pub struct Registers {
    pub gp: [u64; 31],
    pub sp: u64,
    pub pc: u64,
    pub cpsr: u32,
}

impl Registers {
    /// Reads general-purpose register `n` (0..=31); index 31 reads as the
    /// zero register per spec §4.5.
    pub fn get(&self, n: u8) -> u64 {
        if n == 31 {
            0
        } else {
            self.gp[n as usize]
        }
    }

    /// Writes general-purpose register `n` (0..=31); index 31 is ignored
    /// per spec §4.5.
    pub fn set(&mut self, n: u8, value: u64) {
        if n != 31 {
            self.gp[n as usize] = value;
        }
    }

    pub fn single_step_enabled(&self) -> bool {
        self.cpsr & CPSR_SOFTWARE_STEP_BIT != 0
    }

    pub fn set_single_step(&mut self, enabled: bool) {
        if enabled {
            self.cpsr |= CPSR_SOFTWARE_STEP_BIT;
        } else {
            self.cpsr &= !CPSR_SOFTWARE_STEP_BIT;
        }
    }

    fn from_raw(raw: &Arm64ThreadState) -> Self {
        let mut gp = [0u64; 31];
        gp[..29].copy_from_slice(&raw.x);
        gp[29] = raw.fp;
        gp[30] = raw.lr;
        Registers {
            gp,
            sp: raw.sp,
            pc: raw.pc,
            cpsr: raw.cpsr,
        }
    }

    fn to_raw(self) -> Arm64ThreadState {
        let mut raw = Arm64ThreadState {
            sp: self.sp,
            pc: self.pc,
            cpsr: self.cpsr,
            ..Default::default()
        };
        raw.x.copy_from_slice(&self.gp[..29]);
        raw.fp = self.gp[29];
        raw.lr = self.gp[30];
        raw
    }
}

/// Reads the ARM64 thread state of `thread` via `thread_get_state`.
pub fn read_registers(thread: thread_act_t) -> Result<Registers, DebugError> {
    let mut raw = Arm64ThreadState::default();
    let mut count = ARM64_STATE_COUNT;

    // SAFETY: `raw` is sized exactly to ARM64_STATE_COUNT u32 words and
    // `count` is passed by mutable reference as the kernel requires.
    let kr = unsafe {
        mach2::thread_act::thread_get_state(
            thread,
            THREAD_STATE_FLAVOR,
            &mut raw as *mut Arm64ThreadState as *mut u32,
            &mut count,
        )
    };
    if kr != KERN_SUCCESS {
        return Err(DebugError::Kernel(KernelError::from(kr)));
    }
    Ok(Registers::from_raw(&raw))
}

/// Writes `registers` back to `thread` via `thread_set_state`.
pub fn write_registers(thread: thread_act_t, registers: Registers) -> Result<(), DebugError> {
    let mut raw = registers.to_raw();

    // SAFETY: `raw` matches the flavor's expected layout and size exactly.
    let kr = unsafe {
        mach2::thread_act::thread_set_state(
            thread,
            THREAD_STATE_FLAVOR,
            &mut raw as *mut Arm64ThreadState as *mut u32,
            ARM64_STATE_COUNT,
        )
    };
    if kr != KERN_SUCCESS {
        return Err(DebugError::Kernel(KernelError::from(kr)));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn index_31_reads_as_zero_and_ignores_writes() {
        let mut regs = Registers {
            gp: [1; 31],
            sp: 0,
            pc: 0,
            cpsr: 0,
        };
        assert_eq!(regs.get(31), 0);
        regs.set(31, 0xdead);
        assert_eq!(regs.get(31), 0);
    }

    #[test]
    fn fp_lr_map_to_gp_29_30() {
        let raw = Arm64ThreadState {
            x: [0; 29],
            fp: 0x1111,
            lr: 0x2222,
            sp: 0x3333,
            pc: 0x4444,
            cpsr: 0,
            __pad: 0,
        };
        let regs = Registers::from_raw(&raw);
        assert_eq!(regs.get(29), 0x1111);
        assert_eq!(regs.get(30), 0x2222);
        assert_eq!(regs.sp, 0x3333);
        assert_eq!(regs.pc, 0x4444);
    }

    #[test]
    fn round_trips_through_raw() {
        let mut gp = [0u64; 31];
        for (i, slot) in gp.iter_mut().enumerate() {
            *slot = i as u64;
        }
        let regs = Registers { gp, sp: 10, pc: 20, cpsr: 0 };
        let raw = regs.to_raw();
        let back = Registers::from_raw(&raw);
        assert_eq!(regs, back);
    }

    #[test]
    fn single_step_bit_toggles_cpsr() {
        let mut regs = Registers { gp: [0; 31], sp: 0, pc: 0, cpsr: 0 };
        assert!(!regs.single_step_enabled());
        regs.set_single_step(true);
        assert!(regs.single_step_enabled());
        assert_eq!(regs.cpsr, CPSR_SOFTWARE_STEP_BIT);
        regs.set_single_step(false);
        assert!(!regs.single_step_enabled());
    }
}
