//! Memory management module for PantherOS
//!
//! Provides:
//! - Address and page table descriptor types
//! - Physical frame memory with a bitmap allocator
//! - Per-process user address spaces with a 4-level page-table walk
//! - Validated copies into and out of user address spaces
//! - Kernel heap allocation (bare-metal targets)
//!
//! # Security Principles
//! - All allocations are bounds-checked
//! - Memory initialization is guaranteed
//! - User spans are validated in full before any byte moves

pub mod address;
pub mod copy;
pub mod frame;
pub mod paging;
pub mod space;

#[cfg(target_os = "none")]
mod heap;

pub use address::{PhysAddr, VirtAddr, PAGE_SIZE};
pub use copy::{copy_from_user, copy_to_user, Access, CopyFault, FaultReason, UserSpan};
pub use frame::{PhysFrame, PhysMemory};
pub use paging::{MappingError, PageFlags, PageTableEntry};
pub use space::AddressSpace;

#[cfg(target_os = "none")]
pub use heap::{heap_size, init_heap};
