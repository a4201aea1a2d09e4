//! Process-attach debugger (spec §4.5).
//!
//! [`DebugSession`] is the `Detached -> Stopped -> Running -> Stopped -> ...`
//! state machine: `attach` acquires the task and suspends it (`Stopped`),
//! `continue_`/`step` resume execution (`Running`), and an exception or a
//! breakpoint trap brings it back to `Stopped`. `detach` tears everything
//! down and returns to `Detached`.

pub mod attach;
pub mod breakpoints;
pub mod error;
pub mod exception;
pub mod memory;
pub mod registers;
pub mod threads;

use std::time::Duration;

use mach2::mach_types::{task_t, thread_act_t};

use self::attach::Target;
use self::breakpoints::{Breakpoint, BreakpointManager, BreakpointMemory};
use self::error::DebugError;
use self::exception::{ExceptionServer, StopEvent};
use self::registers::Registers;
use self::threads::Thread;

#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize)]
pub enum SessionState {
    Detached,
    Stopped,
    Running,
}

/// Adapts the task-port memory primitives to [`BreakpointMemory`].
struct TaskMemory(task_t);

impl BreakpointMemory for TaskMemory {
    fn read4(&self, address: u64) -> Result<[u8; 4], DebugError> {
        let bytes = memory::read(self.0, address, 4)?;
        bytes
            .try_into()
            .map_err(|_| DebugError::MemoryReadFailed { address, size: 4 })
    }

    fn write4(&self, address: u64, bytes: [u8; 4]) -> Result<(), DebugError> {
        memory::write(self.0, address, &bytes)
    }
}

pub struct DebugSession {
    target: Option<Target>,
    exception_server: Option<ExceptionServer>,
    breakpoints: BreakpointManager,
    state: SessionState,
    /// The thread a single-step was armed on, pending its trap.
    stepping: Option<thread_act_t>,
}

impl Default for DebugSession {
    fn default() -> Self {
        Self::new()
    }
}

impl DebugSession {
    pub fn new() -> Self {
        DebugSession {
            target: None,
            exception_server: None,
            breakpoints: BreakpointManager::new(),
            state: SessionState::Detached,
            stepping: None,
        }
    }

    pub fn state(&self) -> SessionState {
        self.state
    }

    /// Attaches to `pid`: acquires the task, suspends its threads, and
    /// starts the exception server. Leaves the session `Stopped`.
    pub fn attach(&mut self, pid: i32) -> Result<(), DebugError> {
        if self.target.is_some() {
            return Err(DebugError::AlreadyAttached);
        }

        let target = attach::attach(pid)?;
        let server = match ExceptionServer::register(target.task) {
            Ok(server) => server,
            Err(e) => {
                let _ = attach::detach(&target);
                return Err(e);
            }
        };

        self.target = Some(target);
        self.exception_server = Some(server);
        self.state = SessionState::Stopped;
        Ok(())
    }

    /// Removes every breakpoint, tears down the exception server, resumes
    /// and detaches from the target. Returns the session to `Detached`
    /// regardless of whether cleanup steps individually succeed.
    pub fn detach(&mut self) -> Result<(), DebugError> {
        let target = self.target.take().ok_or(DebugError::NotAttached)?;

        let mem = TaskMemory(target.task);
        for bp in self.breakpoints.iter_by_id().map(|bp| bp.address).collect::<Vec<_>>() {
            let _ = self.breakpoints.remove_at(&mem, bp);
        }

        self.exception_server = None;
        self.state = SessionState::Detached;
        self.stepping = None;
        attach::detach(&target)
    }

    pub fn threads(&self) -> Result<Vec<Thread>, DebugError> {
        threads::threads(self.task()?)
    }

    pub fn read_memory(&self, address: u64, size: u64) -> Result<Vec<u8>, DebugError> {
        memory::read(self.task()?, address, size)
    }

    pub fn write_memory(&self, address: u64, bytes: &[u8]) -> Result<(), DebugError> {
        memory::write(self.task()?, address, bytes)
    }

    pub fn registers(&self, thread: thread_act_t) -> Result<Registers, DebugError> {
        registers::read_registers(thread)
    }

    pub fn set_registers(&self, thread: thread_act_t, regs: Registers) -> Result<(), DebugError> {
        registers::write_registers(thread, regs)
    }

    pub fn set_breakpoint(&mut self, address: u64) -> Result<u64, DebugError> {
        let task = self.task()?;
        self.breakpoints.set(&TaskMemory(task), address)
    }

    pub fn remove_breakpoint(&mut self, id: u64) -> Result<(), DebugError> {
        let task = self.task()?;
        self.breakpoints.remove(&TaskMemory(task), id)
    }

    pub fn breakpoint_at(&self, address: u64) -> Option<&Breakpoint> {
        self.breakpoints.at(address)
    }

    /// Resumes every thread of the target.
    pub fn continue_(&mut self) -> Result<(), DebugError> {
        self.resume_threads()?;
        self.state = SessionState::Running;
        Ok(())
    }

    /// Arms a single-step on `thread` and resumes only that thread.
    pub fn step(&mut self, thread: thread_act_t) -> Result<(), DebugError> {
        let mut regs = registers::read_registers(thread)?;
        regs.set_single_step(true);
        registers::write_registers(thread, regs)?;

        // SAFETY: resumes exactly the thread whose state was just armed.
        let kr = unsafe { mach2::thread_act::thread_resume(thread) };
        if kr != mach2::kern_return::KERN_SUCCESS {
            return Err(DebugError::ThreadOperationFailed {
                operation: "resume (step)".to_string(),
            });
        }

        self.stepping = Some(thread);
        self.state = SessionState::Running;
        Ok(())
    }

    /// Blocks for the next stop event, updating breakpoint hit counts and
    /// clearing any armed single-step before returning.
    pub fn wait_for_stop(&mut self, timeout: Duration) -> Result<StopEvent, DebugError> {
        let server = self
            .exception_server
            .as_ref()
            .ok_or(DebugError::NotAttached)?;
        let event = server.wait_for_stop(timeout)?;

        let event = match event {
            StopEvent::Exception {
                kind: exception::ExceptionKind::Breakpoint,
                pc,
                ..
            } if self.breakpoints.hit(pc).is_some() => {
                let id = self.breakpoints.at(pc).map(|bp| bp.id).unwrap_or_default();
                StopEvent::Breakpoint { id, address: pc }
            }
            other => other,
        };

        if let Some(thread) = self.stepping.take() {
            if let Ok(mut regs) = registers::read_registers(thread) {
                regs.set_single_step(false);
                let _ = registers::write_registers(thread, regs);
            }
        }

        self.state = SessionState::Stopped;
        Ok(event)
    }

    fn resume_threads(&self) -> Result<(), DebugError> {
        for thread in self.threads()? {
            // SAFETY: resumes a thread this session suspended at attach time.
            let kr = unsafe { mach2::thread_act::thread_resume(thread.port) };
            if kr != mach2::kern_return::KERN_SUCCESS {
                return Err(DebugError::ThreadOperationFailed {
                    operation: format!("resume thread {}", thread.index),
                });
            }
        }
        Ok(())
    }

    fn task(&self) -> Result<task_t, DebugError> {
        self.target.as_ref().map(|t| t.task).ok_or(DebugError::NotAttached)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn new_session_starts_detached() {
        let session = DebugSession::new();
        assert_eq!(session.state(), SessionState::Detached);
    }

    #[test]
    fn operations_before_attach_report_not_attached() {
        let mut session = DebugSession::new();
        assert!(matches!(session.detach(), Err(DebugError::NotAttached)));
        assert!(matches!(
            session.read_memory(0, 4),
            Err(DebugError::NotAttached)
        ));
        assert!(matches!(
            session.set_breakpoint(0),
            Err(DebugError::NotAttached)
        ));
    }
}
