//! Kernel Heap Allocator
//!
//! Uses `linked_list_allocator` for heap management on bare-metal
//! targets. Hosted builds (including the test suite) use the platform
//! allocator instead.
//!
//! # Security Considerations
//! - Heap is initialized once during boot
//! - All allocations go through Rust's global allocator
//! - linked_list_allocator provides bounds checking

use linked_list_allocator::LockedHeap;

/// Global heap allocator instance
#[global_allocator]
static ALLOCATOR: LockedHeap = LockedHeap::empty();

use crate::config::KERNEL_HEAP_SIZE as HEAP_SIZE;

/// Static heap memory region
static mut HEAP_MEMORY: [u8; HEAP_SIZE] = [0; HEAP_SIZE];

/// Initialize the kernel heap
///
/// Must run exactly once during boot, before any heap allocation.
pub fn init_heap() {
    // SAFETY:
    // - HEAP_MEMORY is a valid static array
    // - This function is only called once during boot
    // - No other code accesses HEAP_MEMORY directly
    unsafe {
        let heap_start = (&raw mut HEAP_MEMORY).cast::<u8>();
        ALLOCATOR.lock().init(heap_start, HEAP_SIZE);
    }
}

/// Get the size of the kernel heap
pub fn heap_size() -> usize {
    HEAP_SIZE
}
