//! Register Dump System Calls
//!
//! `dump2(pid, reg, dst)` copies one callee-saved register from another
//! process's last kernel-entry snapshot into the caller's memory.
//!
//! Checks run in a fixed order, and the first failure decides the result:
//! 1. argument fetch (`InvalidArgument`)
//! 2. register window (`OutOfRange`)
//! 3. pid lookup (`NotFound`)
//! 4. self/parent policy (`Unauthorized`)
//! 5. destination copy (`CopyFault`)

use log::{debug, info, warn};

use super::args::SyscallArgs;
use super::handler::SyscallError;
use crate::kernel::Kernel;
use crate::mm::{copy_to_user, VirtAddr};
use crate::proc::{policy, regs, Pid, Process, ProcessTable, RegIndex, Verdict};

/// `dump()`: log the caller's own readable registers.
pub fn sys_dump(caller: &Process) -> Result<(), SyscallError> {
    let snapshot = caller.snapshot();
    for index in RegIndex::all() {
        info!(
            "pid {}: reg {} ({}) = {:#018x}",
            caller.pid(),
            index.index(),
            index,
            regs::read(snapshot, index)
        );
    }
    Ok(())
}

/// `dump2(pid, reg, dst)`.
pub fn sys_dump2(
    kernel: &Kernel,
    caller: &Process,
    args: &SyscallArgs<'_>,
) -> Result<(), SyscallError> {
    let pid = args.fetch_int(0)?;
    let index = args.fetch_int(1)?;
    let dst = args.fetch_addr(2)?;

    dump_register(kernel.procs(), caller, pid, i64::from(index), dst).map(|_| ())
}

/// Copy bank register `index` of process `pid` to `dst` in `caller`'s
/// address space.
///
/// # Returns
/// The value delivered.
pub fn dump_register(
    procs: &ProcessTable,
    caller: &Process,
    pid: i32,
    index: i64,
    dst: VirtAddr,
) -> Result<u64, SyscallError> {
    let index = RegIndex::new(index).inspect_err(|e| {
        debug!("dump2 from pid {}: {}", caller.pid(), e);
    })?;

    let subject = Pid::try_from(pid)
        .ok()
        .and_then(|pid| procs.find_by_pid(pid))
        .ok_or(SyscallError::NotFound)?;

    if policy::check(caller, &subject) == Verdict::Deny {
        warn!(
            "dump2: pid {} may not inspect pid {}",
            caller.pid(),
            subject.pid()
        );
        return Err(SyscallError::Unauthorized);
    }

    let value = regs::read(subject.snapshot(), index);
    drop(subject);

    let space = caller.space().lock();
    copy_to_user(&space, dst, &value.to_le_bytes()).inspect_err(|fault| {
        warn!("dump2 from pid {}: {}", caller.pid(), fault);
    })?;

    debug!(
        "dump2: pid {} read {} of pid {} into {}",
        caller.pid(),
        index,
        pid,
        dst
    );
    Ok(value)
}
