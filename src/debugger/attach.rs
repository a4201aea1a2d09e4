//! Attach/detach protocol (spec §4.5 "Attach/detach").
//!
//! `attach(pid)` acquires a task port via `task_for_pid`, attaches with
//! `PT_ATTACHEXC` so signals arrive as Mach exceptions, and suspends every
//! thread. Any step failing after the task port was acquired rolls back
//! what already succeeded before returning the error.

use mach2::kern_return::KERN_SUCCESS;
use mach2::mach_types::task_t;
use mach2::port::MACH_PORT_NULL;
use mach2::traps::mach_task_self;

use crate::FailSpotName;

use super::error::{DebugError, KernelError};
use super::threads;

/// PT_ATTACHEXC isn't in the `libc` crate's macOS bindings; it is
/// `PT_FIRSTMACH + 0xc` (`<sys/ptrace.h>`).
const PT_ATTACHEXC: libc::c_int = 14;
const PT_DETACH: libc::c_int = 11;

/// A successfully attached target: its pid and the Mach task port granting
/// access to its memory, threads and exception ports.
#[derive(Debug)]
pub struct Target {
    pub pid: i32,
    pub task: task_t,
}

/// Attaches to `pid`. On any failure after `task_for_pid` succeeds, undoes
/// whatever partial state was established (spec's "rollback on failure").
pub fn attach(pid: i32) -> Result<Target, DebugError> {
    if pid <= 0 {
        return Err(DebugError::InvalidPID(pid));
    }

    let task = task_for_pid(pid)?;

    if let Err(e) = ptrace_attach(pid) {
        release_task(task);
        return Err(e);
    }

    if let Err(e) = suspend_all(task) {
        let _ = ptrace_detach(pid);
        release_task(task);
        return Err(e);
    }

    Ok(Target { pid, task })
}

/// Resumes every thread, detaches ptrace, and releases the task port.
pub fn detach(target: &Target) -> Result<(), DebugError> {
    let first_error = resume_all(target.task).err();

    // ptrace detach failure is ignored: the task port alone can keep
    // control (spec's detach protocol).
    let _ = ptrace_detach(target.pid);
    release_task(target.task);

    match first_error {
        Some(e) => Err(e),
        None => Ok(()),
    }
}

fn task_for_pid(pid: i32) -> Result<task_t, DebugError> {
    if failspot::failspot!(FailSpotName::TaskForPid) {
        return Err(DebugError::permission_denied("task-for-pid"));
    }

    let mut task: task_t = MACH_PORT_NULL;
    // SAFETY: `task` is an out-param the kernel fills on success.
    let kr = unsafe { mach2::traps::task_for_pid(mach_task_self(), pid, &mut task) };
    if kr != KERN_SUCCESS {
        return Err(match KernelError::from(kr) {
            KernelError::Failure | KernelError::InvalidArgument => {
                DebugError::permission_denied("task-for-pid")
            }
            other => DebugError::AttachFailed {
                reason: other.to_string(),
            },
        });
    }
    Ok(task)
}

fn ptrace_attach(pid: i32) -> Result<(), DebugError> {
    if failspot::failspot!(FailSpotName::PtraceAttach) {
        return Err(DebugError::permission_denied("ptrace-attach"));
    }

    // SAFETY: `ptrace` with PT_ATTACHEXC on a live pid; arg/addr are unused
    // for this request per `ptrace(2)`.
    let result = unsafe { libc::ptrace(PT_ATTACHEXC, pid, std::ptr::null_mut(), 0) };
    if result != 0 {
        let err = std::io::Error::last_os_error();
        return Err(match err.raw_os_error() {
            Some(libc::EPERM) => DebugError::permission_denied("ptrace-attach"),
            Some(libc::ESRCH) => DebugError::ProcessNotFound(pid),
            _ => DebugError::AttachFailed {
                reason: err.to_string(),
            },
        });
    }

    let mut status: libc::c_int = 0;
    // SAFETY: reaps the stop notification PT_ATTACHEXC generates for `pid`.
    unsafe { libc::waitpid(pid, &mut status, 0) };
    Ok(())
}

fn ptrace_detach(pid: i32) -> Result<(), DebugError> {
    // SAFETY: `ptrace(PT_DETACH, ...)` on a pid this process previously attached to.
    let result = unsafe { libc::ptrace(PT_DETACH, pid, std::ptr::null_mut(), 0) };
    if result != 0 {
        let err = std::io::Error::last_os_error();
        return Err(DebugError::AttachFailed {
            reason: err.to_string(),
        });
    }
    Ok(())
}

fn suspend_all(task: task_t) -> Result<(), DebugError> {
    if failspot::failspot!(FailSpotName::SuspendThreads) {
        return Err(DebugError::ThreadOperationFailed {
            operation: "suspend".to_string(),
        });
    }

    for thread in threads::threads(task)? {
        // SAFETY: `thread.port` was returned live by `task_threads` above.
        let kr = unsafe { mach2::thread_act::thread_suspend(thread.port) };
        if kr != KERN_SUCCESS {
            return Err(DebugError::ThreadOperationFailed {
                operation: format!("suspend thread {}", thread.index),
            });
        }
    }
    Ok(())
}

fn resume_all(task: task_t) -> Result<(), DebugError> {
    for thread in threads::threads(task)? {
        // SAFETY: resumes a thread this session previously suspended.
        let kr = unsafe { mach2::thread_act::thread_resume(thread.port) };
        if kr != KERN_SUCCESS {
            return Err(DebugError::ThreadOperationFailed {
                operation: format!("resume thread {}", thread.index),
            });
        }
    }
    Ok(())
}

fn release_task(task: task_t) {
    // SAFETY: `task` was acquired via `task_for_pid` in this module and is
    // not used again after this call.
    unsafe {
        mach2::mach_port::mach_port_deallocate(mach_task_self(), task);
    }
}
