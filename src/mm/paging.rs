//! ARM64 Page Table Types
//!
//! Descriptor formats for 4-level page tables in the ARM64 VMSA.
//!
//! # Page Table Structure (4KB granule)
//! - L0 (PGD): 512 entries, each covers 512GB
//! - L1 (PUD): 512 entries, each covers 1GB
//! - L2 (PMD): 512 entries, each covers 2MB
//! - L3 (PTE): 512 entries, each covers 4KB
//!
//! Tables are ordinary physical frames; entries are read and written as
//! little-endian 64-bit words through [`Frame`](super::frame::Frame).
//!
//! # Security Properties
//! - Page flags are strictly typed to prevent invalid combinations
//! - User pages are never executable at EL1 (PXN)
//! - Writability for EL0 is derived from AP bits, never assumed

use bitflags::bitflags;

use super::address::PhysAddr;

bitflags! {
    /// Page table entry flags for ARM64.
    ///
    /// The layout follows the ARMv8-A architecture reference manual.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    pub struct PageFlags: u64 {
        /// Descriptor is valid.
        const VALID = 1 << 0;
        /// Table descriptor at L0-L2, page descriptor at L3.
        const TABLE = 1 << 1;
        /// Same bit as `TABLE`, named for L3 use.
        const PAGE = 1 << 1;

        /// AP[1]: accessible from EL0.
        const AP_EL0 = 1 << 6;
        /// AP[2]: read-only at every level.
        const AP_RO = 1 << 7;

        /// Inner shareable.
        const SH_INNER = 0b11 << 8;

        /// Access Flag - set by hardware on first access.
        const AF = 1 << 10;
        /// Not Global - use ASID for TLB matching.
        const NG = 1 << 11;

        /// Privileged Execute Never - no execution at EL1.
        const PXN = 1 << 53;
        /// User Execute Never - no execution at EL0.
        const UXN = 1 << 54;

        /// Table entry pointing to next level.
        const TABLE_ENTRY = Self::VALID.bits() | Self::TABLE.bits();

        /// User data: readable/writable by user, not executable.
        const USER_DATA = Self::VALID.bits() | Self::PAGE.bits() | Self::AF.bits()
            | Self::SH_INNER.bits() | Self::AP_EL0.bits() | Self::PXN.bits()
            | Self::UXN.bits() | Self::NG.bits();

        /// User read-only data.
        const USER_RODATA = Self::USER_DATA.bits() | Self::AP_RO.bits();

        /// User code: readable, executable by user.
        const USER_CODE = Self::VALID.bits() | Self::PAGE.bits() | Self::AF.bits()
            | Self::SH_INNER.bits() | Self::AP_EL0.bits() | Self::AP_RO.bits()
            | Self::PXN.bits() | Self::NG.bits();

        /// Kernel data: EL1 read/write, not executable.
        const KERNEL_DATA = Self::VALID.bits() | Self::PAGE.bits() | Self::AF.bits()
            | Self::SH_INNER.bits() | Self::PXN.bits() | Self::UXN.bits();
    }
}

impl PageFlags {
    /// Check if the flags describe a present L3 page.
    #[inline]
    pub const fn is_page(self) -> bool {
        self.contains(Self::VALID.union(Self::PAGE))
    }

    /// Check if EL0 may read through this mapping.
    #[inline]
    pub const fn is_user_readable(self) -> bool {
        self.is_page() && self.contains(Self::AP_EL0.union(Self::AF))
    }

    /// Check if EL0 may write through this mapping.
    #[inline]
    pub const fn is_user_writable(self) -> bool {
        self.is_user_readable() && !self.contains(Self::AP_RO)
    }
}

/// A single page table entry.
///
/// This is a 64-bit descriptor that either points to a next-level table
/// or maps a physical page to a virtual address.
#[derive(Clone, Copy, PartialEq, Eq)]
#[repr(transparent)]
pub struct PageTableEntry(u64);

impl PageTableEntry {
    /// Address mask for page table entries (bits [47:12]).
    const ADDR_MASK: u64 = 0x0000_FFFF_FFFF_F000;

    /// Create an invalid (empty) entry.
    #[inline]
    pub const fn invalid() -> Self {
        Self(0)
    }

    /// Rebuild an entry from its raw descriptor word.
    #[inline]
    pub const fn from_raw(raw: u64) -> Self {
        Self(raw)
    }

    /// Create a table entry pointing to the next level page table.
    #[inline]
    pub const fn table(next_table_phys: PhysAddr) -> Self {
        debug_assert!(next_table_phys.is_aligned());
        Self((next_table_phys.as_u64() & Self::ADDR_MASK) | PageFlags::TABLE_ENTRY.bits())
    }

    /// Create a page entry mapping a physical frame.
    #[inline]
    pub const fn page(phys: PhysAddr, flags: PageFlags) -> Self {
        debug_assert!(phys.is_aligned());
        Self((phys.as_u64() & Self::ADDR_MASK) | flags.bits())
    }

    /// Check if the entry is valid (present).
    #[inline]
    pub const fn is_valid(self) -> bool {
        self.0 & PageFlags::VALID.bits() != 0
    }

    /// Check if this entry points to a next-level table (L0-L2 only).
    #[inline]
    pub const fn is_table(self) -> bool {
        self.is_valid() && (self.0 & PageFlags::TABLE.bits() != 0)
    }

    /// Get the physical address from this entry.
    #[inline]
    pub const fn addr(self) -> PhysAddr {
        PhysAddr::new_unchecked((self.0 & Self::ADDR_MASK) as usize)
    }

    /// Get the flags from this entry.
    #[inline]
    pub const fn flags(self) -> PageFlags {
        PageFlags::from_bits_truncate(self.0 & !Self::ADDR_MASK)
    }

    /// Get the raw u64 value.
    #[inline]
    pub const fn as_u64(self) -> u64 {
        self.0
    }
}

impl core::fmt::Debug for PageTableEntry {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        if self.is_valid() {
            write!(f, "PTE(addr={}, flags={:?})", self.addr(), self.flags())
        } else {
            write!(f, "PTE(invalid)")
        }
    }
}

/// Error type for page mapping operations.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MappingError {
    /// The virtual address is already mapped.
    AlreadyMapped,
    /// The virtual address is not mapped.
    NotMapped,
    /// No physical frames available.
    OutOfMemory,
    /// The address is not properly aligned.
    MisalignedAddress,
    /// Attempted to map a non-user address or with non-user flags.
    InvalidPermissions,
}

impl core::fmt::Display for MappingError {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        match self {
            Self::AlreadyMapped => write!(f, "virtual address already mapped"),
            Self::NotMapped => write!(f, "virtual address not mapped"),
            Self::OutOfMemory => write!(f, "out of physical frames"),
            Self::MisalignedAddress => write!(f, "address not properly aligned"),
            Self::InvalidPermissions => write!(f, "invalid permission combination"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_user_data_is_writable() {
        assert!(PageFlags::USER_DATA.is_user_writable());
        assert!(PageFlags::USER_RODATA.is_user_readable());
        assert!(!PageFlags::USER_RODATA.is_user_writable());
        assert!(!PageFlags::USER_CODE.is_user_writable());
        assert!(!PageFlags::KERNEL_DATA.is_user_readable());
    }

    #[test]
    fn test_entry_roundtrip_keeps_addr_and_flags() {
        let pte = PageTableEntry::page(PhysAddr::new(0x4020_3000), PageFlags::USER_RODATA);
        assert!(pte.is_valid());
        assert_eq!(pte.addr(), PhysAddr::new(0x4020_3000));
        assert_eq!(pte.flags(), PageFlags::USER_RODATA);

        let table = PageTableEntry::table(PhysAddr::new(0x4020_4000));
        assert!(table.is_table());
        assert!(!PageTableEntry::invalid().is_valid());
    }
}
