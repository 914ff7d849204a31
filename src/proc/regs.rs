//! Register File
//!
//! Numbers the registers of a saved snapshot as a small bank and exposes
//! only the callee-saved window through introspection.
//!
//! | index | register                 | readable |
//! |-------|--------------------------|----------|
//! | 0     | x29 (frame pointer)      | no       |
//! | 1     | x30 (link register)      | no       |
//! | 2..=11| x19..=x28 (callee-saved) | yes      |
//! | 12    | ELR (program counter)    | no       |
//! | 13    | SP_EL0 (stack pointer)   | no       |
//! | 14    | x8 (syscall number)      | no       |
//!
//! Linkage and control-flow registers stay out of reach so a debugger can
//! neither learn nor be tricked into trusting privileged resume state.

use core::fmt;

use super::process::RegisterSnapshot;

/// Lowest readable bank index.
pub const REG_LOW: i64 = 2;
/// Highest readable bank index.
pub const REG_HIGH: i64 = 11;

/// Bank index 2 is x19.
const GPR_BASE: usize = 17;

/// The requested index lies outside `[REG_LOW, REG_HIGH]`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct OutOfRange(pub i64);

impl fmt::Display for OutOfRange {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "register index {} outside [{}, {}]",
            self.0, REG_LOW, REG_HIGH
        )
    }
}

/// A bank index known to be readable.
#[derive(Clone, Copy, PartialEq, Eq, Debug)]
#[repr(transparent)]
pub struct RegIndex(u8);

impl RegIndex {
    /// Validate a raw bank index.
    #[inline]
    pub const fn new(index: i64) -> Result<Self, OutOfRange> {
        if index >= REG_LOW && index <= REG_HIGH {
            Ok(Self(index as u8))
        } else {
            Err(OutOfRange(index))
        }
    }

    /// The bank index.
    #[inline]
    pub const fn index(self) -> usize {
        self.0 as usize
    }

    /// The general purpose register number (`xN`) behind this index.
    #[inline]
    pub const fn gpr(self) -> usize {
        self.0 as usize + GPR_BASE
    }

    /// Every readable index, lowest first.
    pub fn all() -> impl Iterator<Item = Self> {
        (REG_LOW..=REG_HIGH).map(|i| Self(i as u8))
    }
}

impl fmt::Display for RegIndex {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "x{}", self.gpr())
    }
}

/// Read a validated register from a snapshot.
#[inline]
pub fn read(snapshot: &RegisterSnapshot, index: RegIndex) -> u64 {
    snapshot.gpr(index.gpr())
}

/// Read bank register `index` from a snapshot.
pub fn get(snapshot: &RegisterSnapshot, index: i64) -> Result<u64, OutOfRange> {
    Ok(read(snapshot, RegIndex::new(index)?))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::trap::ExceptionContext;

    #[test]
    fn test_window_maps_to_callee_saved() {
        let snapshot = RegisterSnapshot::new();
        let mut ctx = ExceptionContext::default();
        for n in 0..31 {
            ctx.gpr[n] = 0x100 + n as u64;
        }
        snapshot.record(&ctx);

        assert_eq!(get(&snapshot, 2), Ok(0x100 + 19));
        assert_eq!(get(&snapshot, 11), Ok(0x100 + 28));
        assert_eq!(RegIndex::all().count(), 10);
        assert_eq!(RegIndex::new(5).unwrap().to_string(), "x22");
    }

    #[test]
    fn test_outside_window_is_refused() {
        let snapshot = RegisterSnapshot::new();
        for index in [i64::MIN, -1, 0, 1, 12, 13, 14, 31, i64::MAX] {
            assert_eq!(get(&snapshot, index), Err(OutOfRange(index)));
        }
    }
}
