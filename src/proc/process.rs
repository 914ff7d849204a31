//! Process Descriptors
//!
//! A descriptor is shared between the process table and whoever looked it
//! up; every field that changes after creation is behind its own atomic or
//! lock, so a shared `Arc<Process>` is all any reader ever holds.

use core::sync::atomic::{AtomicI32, AtomicU64, Ordering};

use spin::Mutex;

use crate::mm::AddressSpace;
use crate::trap::ExceptionContext;

/// Process identifier. Zero is never handed out.
pub type Pid = u32;

/// Lifecycle state of a process.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProcState {
    Unused,
    Embryo,
    Runnable,
    Running,
    Sleeping,
    Zombie,
}

impl core::fmt::Display for ProcState {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        let name = match self {
            Self::Unused => "unused",
            Self::Embryo => "embryo",
            Self::Runnable => "runnable",
            Self::Running => "running",
            Self::Sleeping => "sleeping",
            Self::Zombie => "zombie",
        };
        f.write_str(name)
    }
}

/// The register state captured at a process's most recent kernel entry.
///
/// Each word is an independent atomic: the owning CPU overwrites it on
/// every trap while other CPUs may be reading it. A reader sees the last
/// stored value of each register, never a torn word, but no cross-register
/// consistency is promised.
pub struct RegisterSnapshot {
    gpr: [AtomicU64; 31],
    elr: AtomicU64,
    sp: AtomicU64,
    spsr: AtomicU64,
    esr: AtomicU64,
    far: AtomicU64,
}

impl RegisterSnapshot {
    /// An all-zero snapshot, as seen before the first kernel entry.
    pub fn new() -> Self {
        Self {
            gpr: core::array::from_fn(|_| AtomicU64::new(0)),
            elr: AtomicU64::new(0),
            sp: AtomicU64::new(0),
            spsr: AtomicU64::new(0),
            esr: AtomicU64::new(0),
            far: AtomicU64::new(0),
        }
    }

    /// Overwrite the snapshot with a freshly saved context.
    pub fn record(&self, ctx: &ExceptionContext) {
        for (slot, value) in self.gpr.iter().zip(ctx.gpr.iter()) {
            slot.store(*value, Ordering::Relaxed);
        }
        self.elr.store(ctx.elr, Ordering::Relaxed);
        self.sp.store(ctx.sp, Ordering::Relaxed);
        self.spsr.store(ctx.spsr, Ordering::Relaxed);
        self.esr.store(ctx.esr, Ordering::Relaxed);
        self.far.store(ctx.far, Ordering::Relaxed);
    }

    /// Copy the snapshot out word by word.
    pub fn load(&self) -> ExceptionContext {
        ExceptionContext {
            gpr: core::array::from_fn(|i| self.gpr[i].load(Ordering::Relaxed)),
            elr: self.elr.load(Ordering::Relaxed),
            sp: self.sp.load(Ordering::Relaxed),
            spsr: self.spsr.load(Ordering::Relaxed),
            esr: self.esr.load(Ordering::Relaxed),
            far: self.far.load(Ordering::Relaxed),
        }
    }

    /// Read general purpose register `xN`. `n` must be below 31.
    #[inline]
    pub fn gpr(&self, n: usize) -> u64 {
        self.gpr[n].load(Ordering::Relaxed)
    }

    /// Overwrite general purpose register `xN`. `n` must be below 31.
    #[inline]
    pub fn set_gpr(&self, n: usize, value: u64) {
        self.gpr[n].store(value, Ordering::Relaxed);
    }

    /// Saved program counter (ELR_EL1).
    #[inline]
    pub fn elr(&self) -> u64 {
        self.elr.load(Ordering::Relaxed)
    }

    /// Saved user stack pointer (SP_EL0).
    #[inline]
    pub fn sp(&self) -> u64 {
        self.sp.load(Ordering::Relaxed)
    }
}

impl Default for RegisterSnapshot {
    fn default() -> Self {
        Self::new()
    }
}

impl core::fmt::Debug for RegisterSnapshot {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        write!(f, "RegisterSnapshot(elr={:#x}, sp={:#x})", self.elr(), self.sp())
    }
}

/// A process descriptor.
pub struct Process {
    pid: Pid,
    /// Creator's pid; kept even after the creator exits.
    parent: Option<Pid>,
    state: Mutex<ProcState>,
    exit_status: AtomicI32,
    snapshot: RegisterSnapshot,
    space: Mutex<AddressSpace>,
}

impl Process {
    pub(crate) fn new(pid: Pid, parent: Option<Pid>, space: AddressSpace) -> Self {
        Self {
            pid,
            parent,
            state: Mutex::new(ProcState::Embryo),
            exit_status: AtomicI32::new(0),
            snapshot: RegisterSnapshot::new(),
            space: Mutex::new(space),
        }
    }

    #[inline]
    pub fn pid(&self) -> Pid {
        self.pid
    }

    #[inline]
    pub fn parent_pid(&self) -> Option<Pid> {
        self.parent
    }

    pub fn state(&self) -> ProcState {
        *self.state.lock()
    }

    /// Move between the scheduling states.
    ///
    /// Zombies stay zombies; exit and reap go through the process table.
    pub fn set_state(&self, next: ProcState) -> bool {
        let mut state = self.state.lock();
        let allowed = matches!(
            next,
            ProcState::Runnable | ProcState::Running | ProcState::Sleeping
        ) && !matches!(*state, ProcState::Zombie | ProcState::Unused);
        if allowed {
            *state = next;
        }
        allowed
    }

    pub(crate) fn state_lock(&self) -> spin::MutexGuard<'_, ProcState> {
        self.state.lock()
    }

    pub(crate) fn set_exit_status(&self, status: i32) {
        self.exit_status.store(status, Ordering::Relaxed);
    }

    /// Status passed to exit; meaningful once the process is a zombie.
    pub fn exit_status(&self) -> i32 {
        self.exit_status.load(Ordering::Relaxed)
    }

    #[inline]
    pub fn snapshot(&self) -> &RegisterSnapshot {
        &self.snapshot
    }

    /// The process's address space.
    #[inline]
    pub fn space(&self) -> &Mutex<AddressSpace> {
        &self.space
    }
}

impl core::fmt::Debug for Process {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("Process")
            .field("pid", &self.pid)
            .field("parent", &self.parent)
            .field("state", &self.state())
            .finish_non_exhaustive()
    }
}
