//! PL011 UART console for the QEMU virt machine
//!
//! Output-only; it backs the kernel logger and the `kprint!` macros.
//!
//! # Memory Map (QEMU virt)
//! - Base address: 0x0900_0000
//! - Register size: 0x1000 bytes

use core::fmt::{self, Write};
use spin::Mutex;

/// QEMU virt machine PL011 UART base address
const UART_BASE: usize = 0x0900_0000;

/// Data Register
const DR: usize = 0x00;
/// Flag Register
const FR: usize = 0x18;
/// Transmit FIFO full
const FR_TXFF: u32 = 1 << 5;

/// PL011 UART driver
pub struct Uart {
    base: usize,
    enabled: bool,
}

impl Uart {
    /// A UART at `base`, silent until [`enable`](Self::enable) is called.
    pub const fn new(base: usize) -> Self {
        Self {
            base,
            enabled: false,
        }
    }

    /// Start emitting output.
    ///
    /// # Safety
    /// `base` must be the mapped PL011 register block.
    pub unsafe fn enable(&mut self) {
        // QEMU leaves the PL011 configured; nothing to program
        self.enabled = true;
    }

    /// Check if output reaches the hardware.
    #[inline]
    pub fn is_enabled(&self) -> bool {
        self.enabled
    }

    fn write_byte(&self, byte: u8) {
        if !self.enabled {
            return;
        }

        // SAFETY: enable() established that base points at the PL011
        // registers; FR and DR are 32-bit MMIO registers inside it.
        unsafe {
            let fr = (self.base + FR) as *const u32;
            let dr = (self.base + DR) as *mut u32;

            while core::ptr::read_volatile(fr) & FR_TXFF != 0 {
                core::hint::spin_loop();
            }
            core::ptr::write_volatile(dr, u32::from(byte));
        }
    }
}

impl Write for Uart {
    fn write_str(&mut self, s: &str) -> fmt::Result {
        for byte in s.bytes() {
            if byte == b'\n' {
                self.write_byte(b'\r');
            }
            self.write_byte(byte);
        }
        Ok(())
    }
}

/// Global console UART protected by spinlock
pub static UART: Mutex<Uart> = Mutex::new(Uart::new(UART_BASE));

/// Print to the console UART
#[macro_export]
macro_rules! kprint {
    ($($arg:tt)*) => {{
        use core::fmt::Write;
        let mut uart = $crate::drivers::uart::UART.lock();
        let _ = write!(uart, $($arg)*);
    }};
}

/// Print a line to the console UART
#[macro_export]
macro_rules! kprintln {
    () => {
        $crate::kprint!("\n")
    };
    ($($arg:tt)*) => {{
        $crate::kprint!($($arg)*);
        $crate::kprint!("\n");
    }};
}
