// Because of the nature of this crate, there are lots of times we cast aliased types to `u64`
// or `u32`. Often, on 64-bit platforms, it's already that, so Clippy gets upset at the
// seemingly useless conversion.
#![allow(clippy::useless_conversion)]

pub mod arm64;
pub mod bounds;
pub mod config;
pub mod error_list;
pub mod macho;
pub mod signature;

cfg_if::cfg_if! {
    if #[cfg(target_os = "macos")] {
        pub mod debugger;
    }
}

failspot::failspot_name! {
    pub enum FailSpotName {
        TaskForPid,
        PtraceAttach,
        SuspendThreads,
        VmWrite,
        ExceptionPortRegister,
    }
}
