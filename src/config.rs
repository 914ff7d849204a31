//! Kernel Configuration
//!
//! Boot-time tunables with compiled-in defaults, optionally overridden
//! from the kernel command line:
//!
//! ```text
//! nproc=32 frames=256 loglevel=debug
//! ```

use core::str::FromStr;

use log::{warn, LevelFilter};

use crate::mm::PhysMemory;

/// Bytes reserved for the kernel heap on bare-metal targets.
pub const KERNEL_HEAP_SIZE: usize = 8 * 1024 * 1024;

/// Boot-time tunables.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct KernelConfig {
    /// Slots in the process table.
    pub max_procs: usize,
    /// Physical frames available to page tables and user pages.
    pub phys_frames: usize,
    /// Maximum log level.
    pub log_level: LevelFilter,
}

impl KernelConfig {
    pub const DEFAULT: Self = Self {
        max_procs: 64,
        phys_frames: 1024,
        log_level: LevelFilter::Info,
    };

    /// Defaults overridden by `key=value` words from `cmdline`.
    ///
    /// Unknown keys are skipped; malformed values keep the default and are
    /// reported.
    pub fn from_cmdline(cmdline: &str) -> Self {
        let mut config = Self::DEFAULT;
        for word in cmdline.split_whitespace() {
            let Some((key, value)) = word.split_once('=') else {
                continue;
            };
            if let Err(e) = config.apply(key, value) {
                warn!("cmdline: {}", e);
            }
        }
        config
    }

    /// Shrink the frame pool so it takes at most three quarters of a
    /// `heap_bytes` heap. The rest is left for the process table and other
    /// allocations.
    pub fn fit_heap(mut self, heap_bytes: usize) -> Self {
        let budget = heap_bytes - heap_bytes / 4;
        let max_frames = budget / PhysMemory::footprint(1);
        if self.phys_frames > max_frames {
            warn!(
                "frames={} does not fit a {} KiB heap, using {}",
                self.phys_frames,
                heap_bytes / 1024,
                max_frames
            );
            self.phys_frames = max_frames;
        }
        self
    }

    fn apply(&mut self, key: &str, value: &str) -> Result<(), ConfigError> {
        match key {
            "nproc" => {
                self.max_procs = parse_count(value).ok_or(ConfigError::BadValue { key: "nproc" })?;
            }
            "frames" => {
                self.phys_frames =
                    parse_count(value).ok_or(ConfigError::BadValue { key: "frames" })?;
            }
            "loglevel" => {
                self.log_level = LevelFilter::from_str(value)
                    .map_err(|_| ConfigError::BadValue { key: "loglevel" })?;
            }
            _ => {}
        }
        Ok(())
    }
}

impl Default for KernelConfig {
    fn default() -> Self {
        Self::DEFAULT
    }
}

fn parse_count(value: &str) -> Option<usize> {
    value.parse::<usize>().ok().filter(|&n| n > 0)
}

/// A rejected command-line value.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConfigError {
    BadValue { key: &'static str },
}

impl core::fmt::Display for ConfigError {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        match self {
            Self::BadValue { key } => write!(f, "bad value for `{}`, keeping default", key),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = KernelConfig::default();
        assert_eq!(config.max_procs, 64);
        assert_eq!(config.phys_frames, 1024);
        assert_eq!(config.log_level, LevelFilter::Info);
        assert_eq!(KernelConfig::from_cmdline(""), config);
    }

    #[test]
    fn test_cmdline_overrides() {
        let config = KernelConfig::from_cmdline("console=ttyAMA0 nproc=8 frames=256 loglevel=Debug");
        assert_eq!(config.max_procs, 8);
        assert_eq!(config.phys_frames, 256);
        assert_eq!(config.log_level, LevelFilter::Debug);
    }

    #[test]
    fn test_default_pool_fits_kernel_heap() {
        let pool = PhysMemory::footprint(KernelConfig::DEFAULT.phys_frames);
        assert!(pool <= KERNEL_HEAP_SIZE - KERNEL_HEAP_SIZE / 4);
        assert_eq!(
            KernelConfig::DEFAULT.fit_heap(KERNEL_HEAP_SIZE),
            KernelConfig::DEFAULT
        );
    }

    #[test]
    fn test_oversized_pool_is_clamped() {
        let config = KernelConfig::from_cmdline("frames=100000").fit_heap(KERNEL_HEAP_SIZE);
        assert!(config.phys_frames < 100000);
        assert!(PhysMemory::footprint(config.phys_frames) <= KERNEL_HEAP_SIZE - KERNEL_HEAP_SIZE / 4);
        assert!(PhysMemory::footprint(config.phys_frames + 1) > KERNEL_HEAP_SIZE - KERNEL_HEAP_SIZE / 4);
    }

    #[test]
    fn test_malformed_values_keep_defaults() {
        let config = KernelConfig::from_cmdline("nproc=0 frames=lots loglevel=loud quiet");
        assert_eq!(config, KernelConfig::DEFAULT);

        let mut config = KernelConfig::DEFAULT;
        assert_eq!(
            config.apply("frames", "-1"),
            Err(ConfigError::BadValue { key: "frames" })
        );
    }
}
