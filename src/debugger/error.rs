use thiserror::Error;

/// A Mach kernel error, mapped from a `kern_return_t`.
///
/// See <usr/include/mach/kern_return.h>. Kept close to the teacher's
/// `mach_helpers::KernelError` (same variant names and `#[error]` text),
/// retargeted to this crate's debugger error taxonomy.
#[derive(Debug, Error, Clone, Copy, PartialEq, Eq)]
pub enum KernelError {
    #[error("specified address is not currently valid")]
    InvalidAddress,
    #[error("specified memory is valid, but does not permit the required forms of access")]
    ProtectionFailure,
    #[error("the address range specified is already in use, or no address range of the size specified could be found")]
    NoSpace,
    #[error("the function requested was not applicable to this type of argument, or an argument is invalid")]
    InvalidArgument,
    #[error("the function could not be performed")]
    Failure,
    #[error("system resource could not be allocated to fulfill this request")]
    ResourceShortage,
    #[error("the task in question does not hold receive rights for the port argument")]
    NotReceiver,
    #[error("bogus access restriction")]
    NoAccess,
    #[error("the receive right is not a member of a port set")]
    NotInSet,
    #[error("the name already denotes a right in the task")]
    NameExists,
    #[error("the name doesn't denote a right in the task")]
    InvalidName,
    #[error("target task isn't an active task")]
    InvalidTask,
    #[error("the name denotes a right, but not an appropriate right")]
    InvalidRight,
    #[error("a blatant range error")]
    InvalidValue,
    #[error("the task already has send or receive rights for the port under another name")]
    RightExists,
    #[error("during a page fault, indicates that the page was rejected as a result of a signature check")]
    CodesignError,
    #[error("the provided buffer is of insufficient size for the requested data")]
    InsufficientBufferSize,
    #[error("denied by security policy")]
    Denied,
    #[error("a search or query operation did not return a result")]
    NotFound,
    #[error("mach kern_return_t {0}")]
    Other(i32),
}

impl From<mach2::kern_return::kern_return_t> for KernelError {
    fn from(kr: mach2::kern_return::kern_return_t) -> Self {
        use mach2::kern_return::*;

        match kr {
            KERN_INVALID_ADDRESS => Self::InvalidAddress,
            KERN_PROTECTION_FAILURE => Self::ProtectionFailure,
            KERN_NO_SPACE => Self::NoSpace,
            KERN_INVALID_ARGUMENT => Self::InvalidArgument,
            KERN_FAILURE => Self::Failure,
            KERN_RESOURCE_SHORTAGE => Self::ResourceShortage,
            KERN_NOT_RECEIVER => Self::NotReceiver,
            KERN_NO_ACCESS => Self::NoAccess,
            KERN_NOT_IN_SET => Self::NotInSet,
            KERN_NAME_EXISTS => Self::NameExists,
            KERN_INVALID_NAME => Self::InvalidName,
            KERN_INVALID_TASK => Self::InvalidTask,
            KERN_INVALID_RIGHT => Self::InvalidRight,
            KERN_INVALID_VALUE => Self::InvalidValue,
            KERN_RIGHT_EXISTS => Self::RightExists,
            KERN_CODESIGN_ERROR => Self::CodesignError,
            KERN_INSUFFICIENT_BUFFER_SIZE => Self::InsufficientBufferSize,
            KERN_DENIED => Self::Denied,
            56 => Self::NotFound,
            other => Self::Other(other),
        }
    }
}

/// Errors from the debugger domain (spec §7 "Taxonomy (debugger domain)").
#[derive(Debug, Error)]
pub enum DebugError {
    #[error("no process with pid {0} exists")]
    ProcessNotFound(i32),
    #[error("pid {0} is not a valid process id")]
    InvalidPID(i32),
    #[error("a debugger is already attached to this target")]
    AlreadyAttached,
    #[error("no debugger is attached to this target")]
    NotAttached,
    #[error("permission denied for {operation}: {guidance}")]
    PermissionDenied { operation: String, guidance: String },
    #[error("this binary lacks the com.apple.security.cs.debugger entitlement")]
    MissingDebuggerEntitlement,
    #[error("developer tools are not enabled on this host")]
    DeveloperToolsNotEnabled,
    #[error("target at {path} is protected by System Integrity Protection: {guidance}")]
    SIPBlocking { path: String, guidance: String },
    #[error("target process lacks the get-task-allow entitlement")]
    TargetLacksTaskAllow,
    #[error("attach failed: {reason}")]
    AttachFailed { reason: String },
    #[error("thread operation failed: {operation}")]
    ThreadOperationFailed { operation: String },
    #[error("failed to read {size} bytes at {address:#x}")]
    MemoryReadFailed { address: u64, size: u64 },
    #[error("failed to write {size} bytes at {address:#x}")]
    MemoryWriteFailed { address: u64, size: u64 },
    #[error("breakpoint limit exceeded")]
    BreakpointLimitExceeded,
    #[error("timed out waiting for a stop event")]
    WaitTimedOut,
    #[error(transparent)]
    Kernel(#[from] KernelError),
}

impl DebugError {
    /// Builds a `PermissionDenied` with the small operation -> guidance table
    /// spec §7's "user-visible behavior" section describes (no CLI
    /// formatting here, just the text payload a caller can render).
    pub fn permission_denied(operation: &str) -> Self {
        let guidance = match operation {
            "task-for-pid" => {
                "sign the debugger binary with the com.apple.security.cs.debugger \
                 entitlement (codesign --entitlements debugger.entitlements -s - <binary>), \
                 or run as root"
            }
            "ptrace-attach" => {
                "enable Developer Tools for this user (DevToolsSecurity -enable) \
                 or run as a member of the _developer group"
            }
            _ => "check System Settings > Privacy & Security > Developer Tools",
        };
        DebugError::PermissionDenied {
            operation: operation.to_string(),
            guidance: guidance.to_string(),
        }
    }
}
