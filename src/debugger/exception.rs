//! Mach exception server (spec §4.5 "Exception handling").
//!
//! Registers a dedicated exception port on the target task, services it on
//! a background thread via `mach_msg`, and forwards decoded stops over a
//! bounded channel to whoever called [`wait_for_stop`].

use std::sync::mpsc::{sync_channel, Receiver, RecvTimeoutError, SyncSender};
use std::thread::JoinHandle;
use std::time::Duration;

use mach2::exception_types::{
    EXC_ARITHMETIC, EXC_BAD_ACCESS, EXC_BAD_INSTRUCTION, EXC_BREAKPOINT, EXC_MASK_ARITHMETIC,
    EXC_MASK_BAD_ACCESS, EXC_MASK_BAD_INSTRUCTION, EXC_MASK_BREAKPOINT,
};
use mach2::kern_return::KERN_SUCCESS;
use mach2::mach_types::{task_t, thread_act_t};
use mach2::message::{mach_msg_header_t, mach_msg_return_t};
use mach2::port::{mach_port_t, MACH_PORT_NULL, MACH_PORT_RIGHT_RECEIVE};
use mach2::traps::mach_task_self;

use crate::FailSpotName;

use super::error::{DebugError, KernelError};
use super::registers;

const EXCEPTION_MASK: u32 =
    EXC_MASK_BREAKPOINT | EXC_MASK_BAD_ACCESS | EXC_MASK_BAD_INSTRUCTION | EXC_MASK_ARITHMETIC;

/// `EXCEPTION_DEFAULT`: the handler receives `(exception, code[2])`, no
/// thread state (we fetch it ourselves via `thread_get_state`).
const EXCEPTION_DEFAULT: i32 = 1;

/// msgh_id of a `mach_exception_raise` request; the reply is this plus 100.
const EXCEPTION_RAISE_REQUEST_ID: i32 = 2405;

#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize)]
pub enum ExceptionKind {
    Breakpoint,
    BadAccess,
    BadInstruction,
    Arithmetic,
    Other(i32),
}

impl ExceptionKind {
    fn from_raw(exception: i32) -> Self {
        match exception {
            EXC_BREAKPOINT => Self::Breakpoint,
            EXC_BAD_ACCESS => Self::BadAccess,
            EXC_BAD_INSTRUCTION => Self::BadInstruction,
            EXC_ARITHMETIC => Self::Arithmetic,
            other => Self::Other(other),
        }
    }
}

/// A reason execution stopped, delivered to the caller of `wait_for_stop`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize)]
pub enum StopEvent {
    /// A breakpoint exception whose PC matched an installed breakpoint.
    Breakpoint { id: u64, address: u64 },
    /// Any other exception (or a breakpoint exception at an address with
    /// no installed breakpoint, e.g. a single-step trap).
    Exception {
        kind: ExceptionKind,
        thread: thread_act_t,
        pc: u64,
    },
}

/// Request-side layout of a `mach_exception_raise` message (simplified:
/// only the two descriptors and the fixed two-code body this server needs).
#[repr(C)]
struct ExceptionRaiseRequest {
    header: mach_msg_header_t,
    body: mach2::message::mach_msg_body_t,
    thread: mach2::message::mach_msg_port_descriptor_t,
    task: mach2::message::mach_msg_port_descriptor_t,
    ndr: mach2::ndr::mach_msg_ndr_t,
    exception: i32,
    code_count: u32,
    code: [i64; 2],
}

#[repr(C)]
struct ExceptionRaiseReply {
    header: mach_msg_header_t,
    ndr: mach2::ndr::mach_msg_ndr_t,
    ret_code: mach2::kern_return::kern_return_t,
}

pub struct ExceptionServer {
    port: mach_port_t,
    handle: Option<JoinHandle<()>>,
    events: Receiver<StopEvent>,
}

impl ExceptionServer {
    /// Allocates a receive-right port, installs it as `task`'s exception
    /// port for breakpoint/bad-access/bad-instruction/arithmetic
    /// exceptions, and starts the service thread.
    pub fn register(task: task_t) -> Result<Self, DebugError> {
        if failspot::failspot!(FailSpotName::ExceptionPortRegister) {
            return Err(DebugError::AttachFailed {
                reason: "exception port registration failed".to_string(),
            });
        }

        let me = unsafe { mach_task_self() };
        let mut port: mach_port_t = MACH_PORT_NULL;

        // SAFETY: standard receive-right allocation on our own task.
        let kr = unsafe { mach2::mach_port::mach_port_allocate(me, MACH_PORT_RIGHT_RECEIVE, &mut port) };
        if kr != KERN_SUCCESS {
            return Err(DebugError::Kernel(KernelError::from(kr)));
        }

        // SAFETY: grants the target task's exception delivery a send right
        // to the receive right just allocated.
        let kr = unsafe {
            mach2::mach_port::mach_port_insert_right(
                me,
                port,
                port,
                mach2::message::MACH_MSG_TYPE_MAKE_SEND,
            )
        };
        if kr != KERN_SUCCESS {
            unsafe { mach2::mach_port::mach_port_deallocate(me, port) };
            return Err(DebugError::Kernel(KernelError::from(kr)));
        }

        // SAFETY: installs our port as the handler for the listed exception
        // types on `task`; no thread-state flavor is requested (EXCEPTION_DEFAULT).
        let kr = unsafe {
            mach2::task::task_set_exception_ports(task, EXCEPTION_MASK, port, EXCEPTION_DEFAULT, 0)
        };
        if kr != KERN_SUCCESS {
            unsafe { mach2::mach_port::mach_port_deallocate(me, port) };
            return Err(DebugError::Kernel(KernelError::from(kr)));
        }

        let (tx, rx) = sync_channel(16);
        let handle = std::thread::spawn(move || serve(port, tx));

        Ok(ExceptionServer {
            port,
            handle: Some(handle),
            events: rx,
        })
    }

    /// Blocks for up to `timeout` for the next stop event.
    pub fn wait_for_stop(&self, timeout: Duration) -> Result<StopEvent, DebugError> {
        self.events.recv_timeout(timeout).map_err(|e| match e {
            RecvTimeoutError::Timeout => DebugError::WaitTimedOut,
            RecvTimeoutError::Disconnected => DebugError::NotAttached,
        })
    }
}

impl Drop for ExceptionServer {
    fn drop(&mut self) {
        // Destroying the receive right unblocks `mach_msg` in the service
        // thread with MACH_RCV_PORT_DIED, which ends its loop.
        unsafe {
            mach2::mach_port::mach_port_destroy(mach_task_self(), self.port);
        }
        if let Some(handle) = self.handle.take() {
            let _ = handle.join();
        }
    }
}

fn serve(port: mach_port_t, tx: SyncSender<StopEvent>) {
    loop {
        let mut request: ExceptionRaiseRequest = unsafe { std::mem::zeroed() };
        request.header.msgh_size = std::mem::size_of::<ExceptionRaiseRequest>() as u32;
        request.header.msgh_local_port = port;

        // SAFETY: `request` is sized for the largest message this server
        // expects to receive on `port`.
        let rc: mach_msg_return_t = unsafe {
            mach2::message::mach_msg(
                &mut request.header,
                mach2::message::MACH_RCV_MSG,
                0,
                std::mem::size_of::<ExceptionRaiseRequest>() as u32,
                port,
                mach2::message::MACH_MSG_TIMEOUT_NONE,
                MACH_PORT_NULL,
            )
        };
        if rc != KERN_SUCCESS as mach_msg_return_t {
            return;
        }

        if request.header.msgh_id == EXCEPTION_RAISE_REQUEST_ID {
            let thread = request.thread.name;
            let pc = registers::read_registers(thread).map(|r| r.pc).unwrap_or(0);
            let event = StopEvent::Exception {
                kind: ExceptionKind::from_raw(request.exception),
                thread,
                pc,
            };
            if tx.send(event).is_err() {
                reply(&request, KERN_SUCCESS);
                return;
            }
        }

        reply(&request, KERN_SUCCESS);
    }
}

fn reply(request: &ExceptionRaiseRequest, ret_code: mach2::kern_return::kern_return_t) {
    let mut reply: ExceptionRaiseReply = unsafe { std::mem::zeroed() };
    reply.header.msgh_bits = mach2::message::MACH_MSG_TYPE_COPY_SEND;
    reply.header.msgh_size = std::mem::size_of::<ExceptionRaiseReply>() as u32;
    reply.header.msgh_remote_port = request.header.msgh_remote_port;
    reply.header.msgh_id = request.header.msgh_id + 100;
    reply.ret_code = ret_code;

    // SAFETY: replies on the remote port the kernel gave us in the request;
    // failures here are not actionable and intentionally ignored.
    unsafe {
        mach2::message::mach_msg(
            &mut reply.header,
            mach2::message::MACH_SEND_MSG,
            std::mem::size_of::<ExceptionRaiseReply>() as u32,
            0,
            MACH_PORT_NULL,
            mach2::message::MACH_MSG_TIMEOUT_NONE,
            MACH_PORT_NULL,
        );
    }
}
