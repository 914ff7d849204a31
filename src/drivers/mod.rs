//! Device drivers
//!
//! - Minimal unsafe code, confined to MMIO accessors
//! - No panics on invalid input

pub mod uart;
