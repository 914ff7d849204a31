//! Kernel Logger
//!
//! Routes `log` records to the console UART as `[LEVEL] message` lines.

use log::{LevelFilter, Metadata, Record};

use crate::kprintln;

static LOGGER: ConsoleLogger = ConsoleLogger;

struct ConsoleLogger;

impl log::Log for ConsoleLogger {
    fn enabled(&self, metadata: &Metadata) -> bool {
        metadata.level() <= log::max_level()
    }

    fn log(&self, record: &Record) {
        if self.enabled(record.metadata()) {
            kprintln!("[{}] {}", record.level(), record.args());
        }
    }

    fn flush(&self) {}
}

/// Enable the console and install the logger.
///
/// Calling it again only adjusts the level. The PL011 is switched on only
/// for bare-metal targets; hosted builds keep it disabled.
pub fn init(max_level: LevelFilter) {
    #[cfg(target_os = "none")]
    {
        let mut uart = crate::drivers::uart::UART.lock();
        // SAFETY: UART_BASE is the PL011 on the QEMU virt machine, identity
        // mapped during early boot.
        unsafe { uart.enable() };
    }

    if log::set_logger(&LOGGER).is_ok() {
        kprintln!("[BOOT] Logger initialized with level: {}", max_level);
    }
    log::set_max_level(max_level);
}

#[cfg(test)]
mod tests {
    use super::*;
    use log::Log;

    #[test]
    fn test_hosted_records_are_dropped_quietly() {
        let trace = Metadata::builder().level(log::Level::Trace).build();
        assert!(!LOGGER.enabled(&trace));

        // The console stays disabled off bare metal
        LOGGER.log(
            &Record::builder()
                .level(log::Level::Error)
                .args(format_args!("lost"))
                .build(),
        );
        assert!(!crate::drivers::uart::UART.lock().is_enabled());
    }
}
