//! Kernel State
//!
//! Ties physical memory and the process table together and is the entry
//! point for traps from EL0.

use alloc::sync::Arc;

use log::info;

use crate::config::{KernelConfig, KERNEL_HEAP_SIZE};
use crate::mm::{AddressSpace, MappingError, PhysMemory};
use crate::proc::{Process, ProcessTable, TableError};
use crate::trap::{self, ExceptionContext, TrapOutcome};

/// Kernel version string
pub const VERSION: &str = "0.2.0";

/// Error type for kernel-level process operations.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KernelError {
    Mapping(MappingError),
    Table(TableError),
}

impl From<MappingError> for KernelError {
    fn from(e: MappingError) -> Self {
        Self::Mapping(e)
    }
}

impl From<TableError> for KernelError {
    fn from(e: TableError) -> Self {
        Self::Table(e)
    }
}

impl core::fmt::Display for KernelError {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        match self {
            Self::Mapping(e) => write!(f, "address space: {}", e),
            Self::Table(e) => write!(f, "process table: {}", e),
        }
    }
}

/// Shared kernel state, one instance for all CPUs.
#[derive(Debug)]
pub struct Kernel {
    config: KernelConfig,
    memory: Arc<PhysMemory>,
    procs: ProcessTable,
}

impl Kernel {
    pub fn new(config: KernelConfig) -> Self {
        Self {
            config,
            memory: Arc::new(PhysMemory::new(config.phys_frames)),
            procs: ProcessTable::new(config.max_procs),
        }
    }

    #[inline]
    pub fn config(&self) -> &KernelConfig {
        &self.config
    }

    #[inline]
    pub fn memory(&self) -> &Arc<PhysMemory> {
        &self.memory
    }

    #[inline]
    pub fn procs(&self) -> &ProcessTable {
        &self.procs
    }

    /// Create a process with an empty address space.
    pub fn spawn(&self, parent: Option<&Arc<Process>>) -> Result<Arc<Process>, KernelError> {
        let space = AddressSpace::new(Arc::clone(&self.memory))?;
        let proc = self.procs.spawn(parent.map(|p| p.pid()), space)?;
        Ok(proc)
    }

    /// Synchronous exception from EL0 on the current CPU.
    pub fn trap(&self, caller: &Arc<Process>, ctx: &mut ExceptionContext) -> TrapOutcome {
        trap::handle_sync_exception_lower_el(self, caller, ctx)
    }
}

/// Bring the kernel up: console logging, heap, configuration.
pub fn boot(cmdline: &str) -> Kernel {
    crate::logger::init(KernelConfig::DEFAULT.log_level);

    #[cfg(target_os = "none")]
    {
        crate::mm::init_heap();
        info!("Heap initialized ({} KiB)", crate::mm::heap_size() / 1024);
    }

    let config = KernelConfig::from_cmdline(cmdline).fit_heap(KERNEL_HEAP_SIZE);
    log::set_max_level(config.log_level);

    info!("PantherOS v{} register-dump kernel", VERSION);
    info!(
        "{} process slots, {} frames ({} KiB)",
        config.max_procs,
        config.phys_frames,
        config.phys_frames * crate::mm::PAGE_SIZE / 1024
    );
    Kernel::new(config)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_spawn_reports_exhaustion() {
        let kernel = Kernel::new(KernelConfig {
            max_procs: 1,
            ..KernelConfig::DEFAULT
        });
        kernel.spawn(None).unwrap();
        assert_eq!(
            kernel.spawn(None).unwrap_err(),
            KernelError::Table(TableError::Full)
        );

        let tiny = Kernel::new(KernelConfig {
            phys_frames: 1,
            ..KernelConfig::DEFAULT
        });
        tiny.spawn(None).unwrap();
        assert_eq!(
            tiny.spawn(None).unwrap_err(),
            KernelError::Mapping(MappingError::OutOfMemory)
        );
    }

    #[test]
    fn test_boot_applies_cmdline() {
        let kernel = boot("nproc=4 loglevel=debug");
        assert_eq!(kernel.config().max_procs, 4);
        assert_eq!(kernel.config().phys_frames, KernelConfig::DEFAULT.phys_frames);
        assert_eq!(log::max_level(), log::LevelFilter::Debug);
        assert_eq!(kernel.procs().capacity(), 4);
        assert_eq!(kernel.memory().total_frames(), KernelConfig::DEFAULT.phys_frames);
        assert!(kernel.spawn(None).is_ok());
    }

    #[test]
    fn test_failed_spawn_returns_root_frame() {
        let kernel = Kernel::new(KernelConfig {
            max_procs: 1,
            phys_frames: 4,
            ..KernelConfig::DEFAULT
        });
        kernel.spawn(None).unwrap();
        let free = kernel.memory().free_frames();
        assert!(kernel.spawn(None).is_err());
        assert_eq!(kernel.memory().free_frames(), free);
    }
}
