//! System Call Handler
//!
//! Dispatches system calls and maps their results onto the x0 return
//! value.
//!
//! # Security Considerations
//! - All syscall numbers are validated against the whitelist
//! - Unknown syscalls return ENOSYS
//! - Parameters are validated before use

use alloc::sync::Arc;

use log::debug;

use super::args::SyscallArgs;
use super::dump;
use crate::kernel::Kernel;
use crate::mm::CopyFault;
use crate::proc::{OutOfRange, Process};
use crate::trap::ExceptionContext;

/// System call numbers
pub mod numbers {
    pub const SYS_GETPID: usize = 11;
    pub const SYS_DUMP: usize = 22;
    pub const SYS_DUMP2: usize = 23;
}

/// System call error codes
///
/// The first four are the sentinels user space branches on; their values
/// are part of the ABI.
#[repr(i64)]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SyscallError {
    /// Caller may not inspect the target
    Unauthorized = -1,
    /// No live or zombie process has the pid
    NotFound = -2,
    /// Register index outside the readable window
    OutOfRange = -3,
    /// Destination span not fully mapped and writable
    CopyFault = -4,
    /// An argument slot could not be read
    InvalidArgument = -5,
    /// Invalid system call number
    Enosys = -38,
}

impl SyscallError {
    /// The value placed in x0.
    #[inline]
    pub const fn code(self) -> i64 {
        self as i64
    }
}

impl core::fmt::Display for SyscallError {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        let msg = match self {
            Self::Unauthorized => "not permitted to inspect target",
            Self::NotFound => "no such process",
            Self::OutOfRange => "register index out of range",
            Self::CopyFault => "bad destination address",
            Self::InvalidArgument => "invalid argument",
            Self::Enosys => "function not implemented",
        };
        f.write_str(msg)
    }
}

impl From<OutOfRange> for SyscallError {
    fn from(_: OutOfRange) -> Self {
        Self::OutOfRange
    }
}

impl From<CopyFault> for SyscallError {
    fn from(_: CopyFault) -> Self {
        Self::CopyFault
    }
}

/// Dispatch a system call
///
/// # Arguments
/// * `kernel` - Kernel state (process table, memory)
/// * `caller` - The process that trapped
/// * `syscall_num` - System call number (from x8)
/// * `ctx` - Exception context with arguments (x0-x5)
///
/// # Returns
/// Result value to be placed in x0
pub fn dispatch(
    kernel: &Kernel,
    caller: &Arc<Process>,
    syscall_num: usize,
    ctx: &ExceptionContext,
) -> i64 {
    let result = match syscall_num {
        numbers::SYS_GETPID => Ok(i64::from(caller.pid())),
        numbers::SYS_DUMP => dump::sys_dump(caller).map(|()| 0),
        numbers::SYS_DUMP2 => {
            dump::sys_dump2(kernel, caller, &SyscallArgs::new(ctx, 3)).map(|()| 0)
        }
        _ => {
            debug!("pid {}: unknown syscall {}", caller.pid(), syscall_num);
            Err(SyscallError::Enosys)
        }
    };

    result.unwrap_or_else(SyscallError::code)
}
