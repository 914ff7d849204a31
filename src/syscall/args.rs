//! System Call Argument Fetching
//!
//! Arguments arrive in x0-x5 of the saved context. Each syscall declares
//! how many it takes; asking for a slot past that arity is an error, not
//! a read of whatever the register happened to hold.
//!
//! # Security Principles
//! - Fail-secure: an unreadable argument aborts the syscall
//! - Addresses are returned raw; only a page-table walk validates them

use super::handler::SyscallError;
use crate::mm::VirtAddr;
use crate::trap::ExceptionContext;

/// Registers available for syscall arguments (x0-x5).
pub const MAX_ARGS: usize = 6;

/// Typed access to the argument slots of one syscall.
#[derive(Debug, Clone, Copy)]
pub struct SyscallArgs<'a> {
    ctx: &'a ExceptionContext,
    arity: usize,
}

impl<'a> SyscallArgs<'a> {
    /// Bind a saved context to a syscall taking `arity` arguments.
    #[inline]
    pub fn new(ctx: &'a ExceptionContext, arity: usize) -> Self {
        Self {
            ctx,
            arity: arity.min(MAX_ARGS),
        }
    }

    /// Raw 64-bit value of an argument slot.
    pub fn fetch_raw(&self, slot: usize) -> Result<u64, SyscallError> {
        if slot >= self.arity {
            return Err(SyscallError::InvalidArgument);
        }
        self.ctx
            .gpr
            .get(slot)
            .copied()
            .ok_or(SyscallError::InvalidArgument)
    }

    /// A C `int` argument: the low 32 bits, sign-extended.
    pub fn fetch_int(&self, slot: usize) -> Result<i32, SyscallError> {
        self.fetch_raw(slot).map(|raw| raw as u32 as i32)
    }

    /// A user pointer argument, unvalidated.
    pub fn fetch_addr(&self, slot: usize) -> Result<VirtAddr, SyscallError> {
        self.fetch_raw(slot)
            .map(|raw| VirtAddr::new_unchecked(raw as usize))
    }
}
