//! Physical and Virtual Address Types
//!
//! Type-safe wrappers for memory addresses that prevent mixing
//! physical and virtual addresses at compile time.
//!
//! # Security Properties
//! - Physical addresses are only resolved through [`PhysMemory`](super::PhysMemory)
//! - User virtual addresses arriving from syscalls are kept raw until a
//!   page-table walk validates them
//! - Span arithmetic is checked, never wrapping

use core::fmt;

/// Page size (4 KiB)
pub const PAGE_SIZE: usize = 4096;
/// Page size mask
pub const PAGE_MASK: usize = PAGE_SIZE - 1;
/// Bits to shift for page number
pub const PAGE_SHIFT: usize = 12;

/// Number of entries per page table (512 for 4KB granule)
pub const ENTRIES_PER_TABLE: usize = 512;

/// Kernel virtual address base (higher-half, TTBR1)
pub const KERNEL_VIRT_BASE: usize = 0xFFFF_0000_0000_0000;

/// End of the user half (TTBR0) with 48-bit virtual addressing.
pub const USER_VIRT_END: usize = 0x0001_0000_0000_0000;

/// Physical memory base for QEMU virt machine
pub const PHYS_MEM_BASE: usize = 0x4000_0000;

/// A physical memory address.
///
/// This is a newtype wrapper that prevents accidental mixing of
/// physical and virtual addresses. Physical addresses cannot be
/// directly dereferenced - they must be resolved to a frame first.
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[repr(transparent)]
pub struct PhysAddr(usize);

impl PhysAddr {
    /// Create a new physical address.
    ///
    /// # Panics
    /// Panics in debug mode if the address uses more than 48 bits.
    #[inline]
    pub const fn new(addr: usize) -> Self {
        // ARM64 with 48-bit physical addressing
        debug_assert!(addr <= 0x0000_FFFF_FFFF_FFFF);
        Self(addr)
    }

    /// Create a physical address without validation (const-compatible).
    #[inline]
    pub const fn new_unchecked(addr: usize) -> Self {
        Self(addr)
    }

    /// Get the raw address value.
    #[inline]
    pub const fn as_usize(self) -> usize {
        self.0
    }

    /// Get the raw address as u64 (for page table entries).
    #[inline]
    pub const fn as_u64(self) -> u64 {
        self.0 as u64
    }

    /// Check if the address is page-aligned.
    #[inline]
    pub const fn is_aligned(self) -> bool {
        self.0 & PAGE_MASK == 0
    }

    /// Align the address down to the nearest page boundary.
    #[inline]
    pub const fn align_down(self) -> Self {
        Self(self.0 & !PAGE_MASK)
    }
}

impl fmt::Debug for PhysAddr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "PhysAddr({:#018x})", self.0)
    }
}

impl fmt::Display for PhysAddr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:#018x}", self.0)
    }
}

/// A virtual memory address.
///
/// `new` enforces the ARM64 canonical format (sign-extended from bit 47).
/// Addresses taken from syscall arguments use `new_unchecked` so that a
/// non-canonical pointer faults instead of being silently rewritten.
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[repr(transparent)]
pub struct VirtAddr(usize);

impl VirtAddr {
    /// Create a new virtual address with canonical form validation.
    #[inline]
    pub const fn new(addr: usize) -> Self {
        Self(Self::make_canonical(addr))
    }

    /// Create a virtual address without validation.
    #[inline]
    pub const fn new_unchecked(addr: usize) -> Self {
        Self(addr)
    }

    /// Sign-extend from bit 47.
    #[inline]
    const fn make_canonical(addr: usize) -> usize {
        let bit47 = (addr >> 47) & 1;
        if bit47 == 1 {
            addr | 0xFFFF_0000_0000_0000
        } else {
            addr & 0x0000_FFFF_FFFF_FFFF
        }
    }

    /// Get the raw address value.
    #[inline]
    pub const fn as_usize(self) -> usize {
        self.0
    }

    /// Get the raw address as u64.
    #[inline]
    pub const fn as_u64(self) -> u64 {
        self.0 as u64
    }

    /// Check if the address is page-aligned.
    #[inline]
    pub const fn is_aligned(self) -> bool {
        self.0 & PAGE_MASK == 0
    }

    /// Align the address down to the nearest page boundary.
    #[inline]
    pub const fn align_down(self) -> Self {
        Self(self.0 & !PAGE_MASK)
    }

    /// Get the page table indices for this address.
    ///
    /// Returns (L0, L1, L2, L3) indices for 4-level paging.
    #[inline]
    pub const fn page_table_indices(self) -> (usize, usize, usize, usize) {
        let addr = self.0;
        let l0 = (addr >> 39) & 0x1FF;
        let l1 = (addr >> 30) & 0x1FF;
        let l2 = (addr >> 21) & 0x1FF;
        let l3 = (addr >> 12) & 0x1FF;
        (l0, l1, l2, l3)
    }

    /// Get the page offset (lowest 12 bits).
    #[inline]
    pub const fn page_offset(self) -> usize {
        self.0 & PAGE_MASK
    }

    /// Add an offset, returning `None` on overflow.
    #[inline]
    pub const fn checked_add(self, offset: usize) -> Option<Self> {
        match self.0.checked_add(offset) {
            Some(addr) => Some(Self(addr)),
            None => None,
        }
    }

    /// Check if this is a kernel address (higher-half).
    #[inline]
    pub const fn is_kernel(self) -> bool {
        self.0 >= KERNEL_VIRT_BASE
    }

    /// Check if this address lies in the user half (TTBR0 range).
    #[inline]
    pub const fn is_user(self) -> bool {
        self.0 < USER_VIRT_END
    }
}

impl fmt::Debug for VirtAddr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "VirtAddr({:#018x})", self.0)
    }
}

impl fmt::Display for VirtAddr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:#018x}", self.0)
    }
}
