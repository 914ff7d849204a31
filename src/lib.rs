//! PantherOS register-dump kernel subsystem
//!
//! Lets a process read one saved callee-saved register of itself or of a
//! direct child, as captured at that process's last kernel entry, and
//! delivers the value into its own memory.
//!
//! # Security Features
//! - Process tree as the trust boundary (self or parent only)
//! - Linkage and control-flow registers never exposed
//! - User copies validated page by page before any byte is written
//! - Type-safe page table management
//!
//! # Architecture
//! - Target: AArch64 (ARM64), QEMU virt machine
//! - Hosted builds run the same code against simulated frame memory

#![cfg_attr(not(test), no_std)]
#![deny(unsafe_op_in_unsafe_fn)]

extern crate alloc;

pub mod config;
pub mod drivers;
pub mod kernel;
pub mod logger;
pub mod mm;
pub mod proc;
pub mod syscall;
pub mod trap;

pub use config::KernelConfig;
pub use kernel::{boot, Kernel, KernelError};

/// Panic handler - called on unrecoverable errors
#[cfg(all(target_os = "none", not(test)))]
#[panic_handler]
fn panic(info: &core::panic::PanicInfo) -> ! {
    kprintln!();
    kprintln!("!!! KERNEL PANIC !!!");
    if let Some(location) = info.location() {
        kprintln!(
            "Location: {}:{}:{}",
            location.file(),
            location.line(),
            location.column()
        );
    }
    kprintln!("Message: {}", info.message());
    kprintln!("System halted.");

    halt();
}

/// Halt the CPU in a low-power state
#[cfg(all(target_os = "none", not(test)))]
fn halt() -> ! {
    loop {
        #[cfg(target_arch = "aarch64")]
        halt_once();
        #[cfg(not(target_arch = "aarch64"))]
        core::hint::spin_loop();
    }
}

#[cfg(all(target_os = "none", target_arch = "aarch64", not(test)))]
#[inline]
fn halt_once() {
    // SAFETY: WFI is always safe to execute
    unsafe {
        core::arch::asm!("wfi", options(nostack, nomem));
    }
}
