//! Thread enumeration (spec §4.5 "Thread enumeration").

use mach2::kern_return::KERN_SUCCESS;
use mach2::mach_types::{task_t, thread_act_t};
use mach2::traps::mach_task_self;
use mach2::vm::mach_vm_deallocate;

use super::error::{DebugError, KernelError};

/// A portable handle to one thread of an attached task.
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize)]
pub struct Thread {
    #[serde(skip)]
    pub port: thread_act_t,
    pub index: usize,
    pub is_main: bool,
}

/// Enumerates the threads of `task` via `task_threads`. The first thread
/// returned by the kernel is conventionally "main" (spec §4.5).
pub fn threads(task: task_t) -> Result<Vec<Thread>, DebugError> {
    let mut act_list: *mut thread_act_t = std::ptr::null_mut();
    let mut act_count: u32 = 0;

    // SAFETY: `act_list`/`act_count` are out-params the kernel fills in; the
    // returned array must be deallocated with `mach_vm_deallocate` below.
    let kr = unsafe { mach2::task::task_threads(task, &mut act_list, &mut act_count) };
    if kr != KERN_SUCCESS {
        return Err(DebugError::Kernel(KernelError::from(kr)));
    }

    // SAFETY: the kernel guarantees `act_count` valid `thread_act_t` entries
    // at `act_list` when the call above succeeded.
    let slice = unsafe { std::slice::from_raw_parts(act_list, act_count as usize) };
    let threads = slice
        .iter()
        .enumerate()
        .map(|(index, &port)| Thread {
            port,
            index,
            is_main: index == 0,
        })
        .collect();

    // SAFETY: `act_list` was allocated by the kernel for this call and is
    // released exactly once here, matching the task port's handle discipline.
    unsafe {
        mach_vm_deallocate(
            mach_task_self(),
            act_list as u64,
            (act_count as usize * std::mem::size_of::<thread_act_t>()) as u64,
        );
    }

    Ok(threads)
}
