//! Process Table
//!
//! The kernel-wide registry of live and zombie processes.
//!
//! # Design
//! - Fixed number of slots, sized at boot from `KernelConfig::max_procs`
//! - A slot is `None` (unused) or holds a shared descriptor
//! - One spinlock guards slot occupancy; it is held only for the scan or
//!   the structural change, never while a caller uses a descriptor
//! - Lookups hand out `Arc<Process>`, so a reaped descriptor stays valid
//!   for whoever still holds it while its slot is recycled

use alloc::sync::Arc;
use alloc::vec::Vec;
use core::sync::atomic::{AtomicU32, Ordering};

use log::debug;
use spin::Mutex;

use super::process::{Pid, ProcState, Process};
use crate::mm::AddressSpace;

/// Error type for process table operations.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TableError {
    /// Every slot is occupied.
    Full,
    /// No live or zombie process has this pid.
    NoSuchProcess,
    /// The process is not a child of the requester.
    NotChild,
    /// The process has not exited yet.
    NotZombie,
    /// The process has already exited.
    AlreadyExited,
}

impl core::fmt::Display for TableError {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        match self {
            Self::Full => write!(f, "process table full"),
            Self::NoSuchProcess => write!(f, "no such process"),
            Self::NotChild => write!(f, "not a child of the caller"),
            Self::NotZombie => write!(f, "process has not exited"),
            Self::AlreadyExited => write!(f, "process already exited"),
        }
    }
}

/// Shared registry of process descriptors keyed by pid.
pub struct ProcessTable {
    slots: Mutex<Vec<Option<Arc<Process>>>>,
    next_pid: AtomicU32,
}

impl ProcessTable {
    /// Create a table with `capacity` empty slots.
    pub fn new(capacity: usize) -> Self {
        Self {
            slots: Mutex::new((0..capacity).map(|_| None).collect()),
            next_pid: AtomicU32::new(1),
        }
    }

    /// Number of slots.
    pub fn capacity(&self) -> usize {
        self.slots.lock().len()
    }

    /// Number of occupied slots (live and zombie processes).
    pub fn len(&self) -> usize {
        self.slots.lock().iter().filter(|s| s.is_some()).count()
    }

    /// Check if no process is registered.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Look up a live or zombie process by pid.
    ///
    /// Returns `None` once the process has been reaped.
    pub fn find_by_pid(&self, pid: Pid) -> Option<Arc<Process>> {
        let slots = self.slots.lock();
        slots
            .iter()
            .flatten()
            .find(|p| p.pid() == pid)
            .map(Arc::clone)
    }

    /// Pids of every registered process, in slot order.
    pub fn pids(&self) -> Vec<Pid> {
        self.slots.lock().iter().flatten().map(|p| p.pid()).collect()
    }

    /// Next pid that is neither 0 nor held by a registered process.
    ///
    /// The counter wraps after `u32::MAX`; the caller holds the slot lock
    /// and has a free slot, so some pid is always available.
    fn alloc_pid(&self, slots: &[Option<Arc<Process>>]) -> Pid {
        loop {
            let pid = self.next_pid.fetch_add(1, Ordering::Relaxed);
            if pid != 0 && !slots.iter().flatten().any(|p| p.pid() == pid) {
                return pid;
            }
        }
    }

    /// Register a new process in the `Embryo` state.
    ///
    /// `parent`, when given, must be registered and not yet exited.
    pub fn spawn(
        &self,
        parent: Option<Pid>,
        space: AddressSpace,
    ) -> Result<Arc<Process>, TableError> {
        let mut slots = self.slots.lock();

        if let Some(ppid) = parent {
            let registered = slots
                .iter()
                .flatten()
                .find(|p| p.pid() == ppid)
                .ok_or(TableError::NoSuchProcess)?;
            if matches!(registered.state(), ProcState::Zombie | ProcState::Unused) {
                return Err(TableError::AlreadyExited);
            }
        }

        let index = slots
            .iter()
            .position(Option::is_none)
            .ok_or(TableError::Full)?;

        let pid = self.alloc_pid(&slots);
        let proc = Arc::new(Process::new(pid, parent, space));
        slots[index] = Some(Arc::clone(&proc));
        debug!("spawned pid {} (parent {:?})", pid, parent);
        Ok(proc)
    }

    /// Turn a process into a zombie. Its snapshot stays readable.
    pub fn exit(&self, pid: Pid, status: i32) -> Result<(), TableError> {
        let slots = self.slots.lock();
        let proc = slots
            .iter()
            .flatten()
            .find(|p| p.pid() == pid)
            .ok_or(TableError::NoSuchProcess)?;

        let mut state = proc.state_lock();
        if *state == ProcState::Zombie {
            return Err(TableError::AlreadyExited);
        }
        proc.set_exit_status(status);
        *state = ProcState::Zombie;
        debug!("pid {} exited with status {}", pid, status);
        Ok(())
    }

    /// Reclaim a zombie child of `parent`, returning its exit status.
    pub fn reap(&self, parent: Pid, pid: Pid) -> Result<i32, TableError> {
        let mut slots = self.slots.lock();
        let slot = slots
            .iter_mut()
            .find(|s| s.as_ref().is_some_and(|p| p.pid() == pid))
            .ok_or(TableError::NoSuchProcess)?;

        let status = match slot.as_ref() {
            Some(proc) if proc.parent_pid() != Some(parent) => return Err(TableError::NotChild),
            Some(proc) => {
                let mut state = proc.state_lock();
                if *state != ProcState::Zombie {
                    return Err(TableError::NotZombie);
                }
                *state = ProcState::Unused;
                proc.exit_status()
            }
            None => return Err(TableError::NoSuchProcess),
        };

        *slot = None;
        debug!("pid {} reaped by {}", pid, parent);
        Ok(status)
    }
}

impl core::fmt::Debug for ProcessTable {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("ProcessTable")
            .field("pids", &self.pids())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mm::PhysMemory;

    fn space(memory: &Arc<PhysMemory>) -> AddressSpace {
        AddressSpace::new(Arc::clone(memory)).unwrap()
    }

    #[test]
    fn test_spawn_assigns_unique_pids() {
        let memory = Arc::new(PhysMemory::new(16));
        let table = ProcessTable::new(4);
        let init = table.spawn(None, space(&memory)).unwrap();
        let child = table.spawn(Some(init.pid()), space(&memory)).unwrap();

        assert_ne!(init.pid(), child.pid());
        assert_eq!(child.parent_pid(), Some(init.pid()));
        assert_eq!(child.state(), ProcState::Embryo);
        assert_eq!(table.len(), 2);
    }

    #[test]
    fn test_spawn_errors() {
        let memory = Arc::new(PhysMemory::new(16));
        let table = ProcessTable::new(1);
        assert_eq!(
            table.spawn(Some(42), space(&memory)).unwrap_err(),
            TableError::NoSuchProcess
        );
        assert_eq!(table.capacity(), 1);
        table.spawn(None, space(&memory)).unwrap();
        assert_eq!(table.spawn(None, space(&memory)).unwrap_err(), TableError::Full);
    }

    #[test]
    fn test_exited_parent_cannot_spawn() {
        let memory = Arc::new(PhysMemory::new(16));
        let table = ProcessTable::new(4);
        let parent = table.spawn(None, space(&memory)).unwrap();
        table.exit(parent.pid(), 0).unwrap();

        assert_eq!(
            table.spawn(Some(parent.pid()), space(&memory)).unwrap_err(),
            TableError::AlreadyExited
        );
        assert_eq!(table.len(), 1);
    }

    #[test]
    fn test_pid_counter_wraps_past_live_pids() {
        let memory = Arc::new(PhysMemory::new(16));
        let table = ProcessTable::new(4);
        let init = table.spawn(None, space(&memory)).unwrap();
        assert_eq!(init.pid(), 1);

        table.next_pid.store(u32::MAX, Ordering::Relaxed);
        let last = table.spawn(None, space(&memory)).unwrap();
        assert_eq!(last.pid(), u32::MAX);

        // 0 is never handed out and 1 is still taken
        let wrapped = table.spawn(None, space(&memory)).unwrap();
        assert_eq!(wrapped.pid(), 2);
    }

    #[test]
    fn test_find_by_pid_through_lifecycle() {
        let memory = Arc::new(PhysMemory::new(16));
        let table = ProcessTable::new(4);
        let parent = table.spawn(None, space(&memory)).unwrap();
        let child = table.spawn(Some(parent.pid()), space(&memory)).unwrap();
        let pid = child.pid();

        assert!(table.find_by_pid(pid).is_some());
        assert!(table.find_by_pid(9999).is_none());

        table.exit(pid, 7).unwrap();
        let zombie = table.find_by_pid(pid).unwrap();
        assert_eq!(zombie.state(), ProcState::Zombie);

        assert_eq!(table.reap(parent.pid(), pid), Ok(7));
        assert!(table.find_by_pid(pid).is_none());
        // A held reference outlives the slot
        assert_eq!(zombie.pid(), pid);
        assert_eq!(zombie.state(), ProcState::Unused);
    }

    #[test]
    fn test_reap_rules() {
        let memory = Arc::new(PhysMemory::new(16));
        let table = ProcessTable::new(4);
        let parent = table.spawn(None, space(&memory)).unwrap();
        let child = table.spawn(Some(parent.pid()), space(&memory)).unwrap();
        let other = table.spawn(None, space(&memory)).unwrap();

        assert_eq!(table.reap(parent.pid(), child.pid()), Err(TableError::NotZombie));
        table.exit(child.pid(), 0).unwrap();
        assert_eq!(table.exit(child.pid(), 0), Err(TableError::AlreadyExited));
        assert_eq!(table.reap(other.pid(), child.pid()), Err(TableError::NotChild));
        assert_eq!(table.reap(parent.pid(), child.pid()), Ok(0));
        assert_eq!(table.reap(parent.pid(), child.pid()), Err(TableError::NoSuchProcess));
    }

    #[test]
    fn test_slot_recycled_with_fresh_pid() {
        let memory = Arc::new(PhysMemory::new(16));
        let table = ProcessTable::new(2);
        let parent = table.spawn(None, space(&memory)).unwrap();
        let child = table.spawn(Some(parent.pid()), space(&memory)).unwrap();
        table.exit(child.pid(), 0).unwrap();
        table.reap(parent.pid(), child.pid()).unwrap();

        let next = table.spawn(Some(parent.pid()), space(&memory)).unwrap();
        assert_ne!(next.pid(), child.pid());
        assert_eq!(table.pids(), [parent.pid(), next.pid()]);
    }

    #[test]
    fn test_concurrent_lookup_during_spawn_and_reap() {
        use std::thread;

        let memory = Arc::new(PhysMemory::new(512));
        let table = Arc::new(ProcessTable::new(8));
        let parent = table.spawn(None, space(&memory)).unwrap();
        let ppid = parent.pid();

        let churn = {
            let table = Arc::clone(&table);
            let memory = Arc::clone(&memory);
            thread::spawn(move || {
                for _ in 0..200 {
                    let child = table.spawn(Some(ppid), space(&memory)).unwrap();
                    table.exit(child.pid(), 0).unwrap();
                    table.reap(ppid, child.pid()).unwrap();
                }
            })
        };

        let readers: Vec<_> = (0..3)
            .map(|_| {
                let table = Arc::clone(&table);
                thread::spawn(move || {
                    for pid in 1..=201 {
                        if let Some(p) = table.find_by_pid(pid) {
                            assert_eq!(p.pid(), pid);
                        }
                        assert!(table.find_by_pid(ppid).is_some());
                    }
                })
            })
            .collect();

        churn.join().unwrap();
        for reader in readers {
            reader.join().unwrap();
        }
        assert_eq!(table.pids(), [ppid]);
    }
}
