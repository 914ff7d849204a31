//! System Call Interface
//!
//! # Security Model
//! - Whitelist approach: only explicitly implemented syscalls are allowed
//! - All parameters are validated before use
//! - Invalid inputs return errors, never panic
//!
//! # Current Syscalls
//! - 11: getpid() - pid of the caller
//! - 22: dump() - log the caller's callee-saved registers
//! - 23: dump2(pid, reg, dst) - copy one saved register of `pid` to `dst`

mod args;
mod dump;
mod handler;

pub use args::{SyscallArgs, MAX_ARGS};
pub use dump::dump_register;
pub use handler::{dispatch, numbers, SyscallError};
