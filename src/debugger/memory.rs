//! Memory access: `vm_read`/`vm_write` with temporary protection changes
//! (spec §4.5 "Memory access").

use mach2::kern_return::KERN_SUCCESS;
use mach2::mach_types::task_t;
use mach2::vm_region::{vm_region_basic_info_64, VM_REGION_BASIC_INFO_64};

use crate::FailSpotName;

use super::error::{DebugError, KernelError};

/// Reads `size` bytes at `address` from `task` via `mach_vm_read_overwrite`.
pub fn read(task: task_t, address: u64, size: u64) -> Result<Vec<u8>, DebugError> {
    let mut buf = vec![0u8; size as usize];
    let mut out_size: u64 = 0;

    // SAFETY: `buf` has room for exactly `size` bytes, which is also what
    // the kernel is told it may write via `out_size`'s input value.
    let kr = unsafe {
        mach2::vm::mach_vm_read_overwrite(
            task,
            address,
            size,
            buf.as_mut_ptr() as u64,
            &mut out_size,
        )
    };
    if kr != KERN_SUCCESS {
        let _ = KernelError::from(kr);
        return Err(DebugError::MemoryReadFailed { address, size });
    }
    buf.truncate(out_size as usize);
    Ok(buf)
}

/// Writes `bytes` to `address` in `task` via `mach_vm_write`, temporarily
/// relaxing VM protection to writable if the target region is read-only,
/// and restoring the original protection afterward.
pub fn write(task: task_t, address: u64, bytes: &[u8]) -> Result<(), DebugError> {
    let size = bytes.len() as u64;
    if try_write(task, address, bytes) {
        return Ok(());
    }

    let original_protection = region_protection(task, address)?;
    change_protection(task, address, size, libc::PROT_READ | libc::PROT_WRITE | libc::PROT_EXEC)?;

    let result = if try_write(task, address, bytes) {
        Ok(())
    } else {
        Err(DebugError::MemoryWriteFailed { address, size })
    };

    // Best-effort restore; a failure here doesn't change the fact that the
    // write itself already succeeded or failed above.
    let _ = change_protection(task, address, size, original_protection);

    result
}

fn try_write(task: task_t, address: u64, bytes: &[u8]) -> bool {
    if failspot::failspot!(FailSpotName::VmWrite) {
        return false;
    }

    // SAFETY: `bytes` outlives the call and its length matches what's passed.
    let kr = unsafe {
        mach2::vm::mach_vm_write(task, address, bytes.as_ptr() as u64, bytes.len() as u32)
    };
    kr == KERN_SUCCESS
}

fn change_protection(task: task_t, address: u64, size: u64, protection: i32) -> Result<(), DebugError> {
    // SAFETY: straightforward `mach_vm_protect` call with no raw-pointer output.
    let kr = unsafe { mach2::vm::mach_vm_protect(task, address, size, 0, protection) };
    if kr != KERN_SUCCESS {
        return Err(DebugError::Kernel(KernelError::from(kr)));
    }
    Ok(())
}

/// Queries the current VM protection of the page containing `address` via
/// `mach_vm_region` with `VM_REGION_BASIC_INFO_64`.
fn region_protection(task: task_t, address: u64) -> Result<i32, DebugError> {
    let mut region_address = address;
    let mut region_size: u64 = 0;
    // SAFETY: an all-zero `vm_region_basic_info_64` is a valid bit pattern;
    // every field is overwritten by the kernel on success.
    let mut info: vm_region_basic_info_64 = unsafe { std::mem::zeroed() };
    let mut info_count = (std::mem::size_of::<vm_region_basic_info_64>() / std::mem::size_of::<u32>()) as u32;
    let mut object_name: u32 = 0;

    // SAFETY: `info`/`info_count` are sized exactly for `VM_REGION_BASIC_INFO_64`.
    let kr = unsafe {
        mach2::vm::mach_vm_region(
            task,
            &mut region_address,
            &mut region_size,
            VM_REGION_BASIC_INFO_64,
            &mut info as *mut vm_region_basic_info_64 as *mut i32,
            &mut info_count,
            &mut object_name,
        )
    };
    if kr != KERN_SUCCESS {
        return Err(DebugError::Kernel(KernelError::from(kr)));
    }
    Ok(info.protection)
}
