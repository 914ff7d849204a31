//! ARM64 Trap Entry
//!
//! The saved register state of a kernel entry and the handler for
//! synchronous exceptions taken from EL0.
//!
//! # Exception Levels
//! - EL0: User applications
//! - EL1: Kernel (where we run)
//!
//! Every entry from EL0 refreshes the process's register snapshot before
//! anything else runs, so introspection always sees the last entry.

use alloc::sync::Arc;

use log::{trace, warn};

use crate::kernel::Kernel;
use crate::proc::Process;
use crate::syscall;

/// Exception context saved by the vector stub.
#[repr(C)]
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ExceptionContext {
    /// General purpose registers x0-x30
    pub gpr: [u64; 31],
    /// Exception Link Register (return address)
    pub elr: u64,
    /// User stack pointer (SP_EL0)
    pub sp: u64,
    /// Saved Program Status Register
    pub spsr: u64,
    /// Exception Syndrome Register
    pub esr: u64,
    /// Fault Address Register
    pub far: u64,
}

impl ExceptionContext {
    /// ESR value for an `svc #0` from AArch64 state.
    pub const ESR_SVC64: u64 = (ExceptionClass::SvcAarch64 as u64) << 26;

    /// Build the context a user `svc` would leave behind.
    pub fn syscall(number: usize, args: &[u64]) -> Self {
        let mut ctx = Self {
            esr: Self::ESR_SVC64,
            ..Self::default()
        };
        ctx.gpr[8] = number as u64;
        for (slot, value) in ctx.gpr.iter_mut().zip(args) {
            *slot = *value;
        }
        ctx
    }
}

/// Exception class extracted from ESR_EL1
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum ExceptionClass {
    Unknown = 0x00,
    SvcAarch64 = 0x15,
    InstructionAbortLowerEl = 0x20,
    InstructionAbortSameEl = 0x21,
    DataAbortLowerEl = 0x24,
    DataAbortSameEl = 0x25,
    Other = 0xFF,
}

impl From<u64> for ExceptionClass {
    fn from(esr: u64) -> Self {
        let ec = ((esr >> 26) & 0x3F) as u8;
        match ec {
            0x00 => ExceptionClass::Unknown,
            0x15 => ExceptionClass::SvcAarch64,
            0x20 => ExceptionClass::InstructionAbortLowerEl,
            0x21 => ExceptionClass::InstructionAbortSameEl,
            0x24 => ExceptionClass::DataAbortLowerEl,
            0x25 => ExceptionClass::DataAbortSameEl,
            _ => ExceptionClass::Other,
        }
    }
}

/// What the scheduler should do with the process after the trap.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TrapOutcome {
    /// Return to EL0 with the (possibly updated) context.
    Resume,
    /// The process faulted and must be torn down.
    Terminate,
}

/// Handle a synchronous exception from EL0.
///
/// Records the snapshot, dispatches system calls and places the result in
/// x0 of both the live context and the snapshot.
pub fn handle_sync_exception_lower_el(
    kernel: &Kernel,
    caller: &Arc<Process>,
    ctx: &mut ExceptionContext,
) -> TrapOutcome {
    caller.snapshot().record(ctx);

    let ec = ExceptionClass::from(ctx.esr);
    match ec {
        ExceptionClass::SvcAarch64 => {
            let syscall_num = ctx.gpr[8] as usize; // x8 = syscall number
            let result = syscall::dispatch(kernel, caller, syscall_num, ctx);
            trace!("pid {} syscall {} -> {}", caller.pid(), syscall_num, result);
            ctx.gpr[0] = result as u64; // Return value in x0
            caller.snapshot().set_gpr(0, ctx.gpr[0]);
            TrapOutcome::Resume
        }
        ExceptionClass::DataAbortLowerEl | ExceptionClass::InstructionAbortLowerEl => {
            warn!(
                "pid {}: user abort at {:#018x} (ESR {:#018x})",
                caller.pid(),
                ctx.far,
                ctx.esr
            );
            TrapOutcome::Terminate
        }
        _ => {
            warn!(
                "pid {}: unhandled exception {:?} (ESR {:#018x})",
                caller.pid(),
                ec,
                ctx.esr
            );
            TrapOutcome::Terminate
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::KernelConfig;

    #[test]
    fn test_exception_class_decoding() {
        assert_eq!(ExceptionClass::from(ExceptionContext::ESR_SVC64), ExceptionClass::SvcAarch64);
        assert_eq!(ExceptionClass::from(0x24 << 26), ExceptionClass::DataAbortLowerEl);
        assert_eq!(ExceptionClass::from(0x3F << 26), ExceptionClass::Other);
    }

    #[test]
    fn test_trap_records_snapshot_and_result() {
        let kernel = Kernel::new(KernelConfig::default());
        let proc = kernel.spawn(None).unwrap();

        let mut ctx = ExceptionContext::syscall(syscall::numbers::SYS_GETPID, &[]);
        ctx.gpr[19] = 0xfeed;
        ctx.elr = 0x40_1000;

        assert_eq!(kernel.trap(&proc, &mut ctx), TrapOutcome::Resume);
        assert_eq!(ctx.gpr[0], u64::from(proc.pid()));

        let saved = proc.snapshot().load();
        assert_eq!(saved.gpr[19], 0xfeed);
        assert_eq!(saved.elr, 0x40_1000);
        assert_eq!(saved.gpr[0], u64::from(proc.pid()));
    }

    #[test]
    fn test_user_abort_terminates() {
        let kernel = Kernel::new(KernelConfig::default());
        let proc = kernel.spawn(None).unwrap();

        let mut ctx = ExceptionContext {
            esr: 0x24 << 26,
            far: 0xdead_0000,
            ..ExceptionContext::default()
        };
        assert_eq!(kernel.trap(&proc, &mut ctx), TrapOutcome::Terminate);
        assert_eq!(proc.snapshot().load().far, 0xdead_0000);
    }
}
