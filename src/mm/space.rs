//! User Address Spaces
//!
//! A process's private TTBR0 mapping: a 4-level page table rooted in a
//! frame it owns, plus every table and data frame hanging off it.
//!
//! # Security Properties
//! - Only user-half, page-aligned addresses can be mapped
//! - Leaf flags must grant EL0 access; kernel-only leaves are refused
//! - All frames are released when the address space is dropped

use alloc::sync::Arc;
use alloc::vec::Vec;

use super::address::{PhysAddr, VirtAddr};
use super::frame::{PhysFrame, PhysMemory};
use super::paging::{MappingError, PageFlags, PageTableEntry};

/// A process's private virtual-memory mapping.
pub struct AddressSpace {
    memory: Arc<PhysMemory>,
    root: PhysFrame,
    /// Intermediate L1-L3 tables.
    tables: Vec<PhysFrame>,
    /// Frames mapped at L3 leaves.
    pages: Vec<PhysFrame>,
}

impl AddressSpace {
    /// Create an empty address space with a fresh L0 table.
    pub fn new(memory: Arc<PhysMemory>) -> Result<Self, MappingError> {
        let root = PhysFrame::alloc(&memory)?;
        Ok(Self {
            memory,
            root,
            tables: Vec::new(),
            pages: Vec::new(),
        })
    }

    /// Physical memory backing this address space.
    #[inline]
    pub fn memory(&self) -> &Arc<PhysMemory> {
        &self.memory
    }

    /// Physical address of the L0 table (the TTBR0_EL1 value).
    #[inline]
    pub fn ttbr0(&self) -> PhysAddr {
        self.root.addr()
    }

    /// Number of pages currently mapped.
    pub fn mapped_pages(&self) -> usize {
        self.pages.len()
    }

    fn read_entry(&self, table: PhysAddr, index: usize) -> Option<PageTableEntry> {
        self.memory.with_frame(table, |f| f.entry(index))
    }

    fn write_entry(
        &self,
        table: PhysAddr,
        index: usize,
        entry: PageTableEntry,
    ) -> Result<(), MappingError> {
        self.memory
            .with_frame_mut(table, |f| f.set_entry(index, entry))
            .ok_or(MappingError::NotMapped)
    }

    /// Walk L0-L2 and return the L3 table covering `va`, if present.
    fn leaf_table(&self, va: VirtAddr) -> Option<PhysAddr> {
        if !va.is_user() {
            return None;
        }
        let (l0, l1, l2, _) = va.page_table_indices();
        let mut table = self.root.addr();
        for index in [l0, l1, l2] {
            let entry = self.read_entry(table, index)?;
            if !entry.is_table() {
                return None;
            }
            table = entry.addr();
        }
        Some(table)
    }

    /// Same walk as `leaf_table`, allocating missing intermediate tables.
    fn leaf_table_or_create(&mut self, va: VirtAddr) -> Result<PhysAddr, MappingError> {
        let (l0, l1, l2, _) = va.page_table_indices();
        let mut table = self.root.addr();
        for index in [l0, l1, l2] {
            let entry = self.read_entry(table, index).ok_or(MappingError::NotMapped)?;
            table = if entry.is_table() {
                entry.addr()
            } else {
                let next = PhysFrame::alloc(&self.memory)?;
                let next_addr = next.addr();
                self.write_entry(table, index, PageTableEntry::table(next_addr))?;
                self.tables.push(next);
                next_addr
            };
        }
        Ok(table)
    }

    /// Translate a user virtual address to its backing frame and leaf flags.
    pub fn translate(&self, va: VirtAddr) -> Option<(PhysAddr, PageFlags)> {
        let table = self.leaf_table(va)?;
        let (_, _, _, l3) = va.page_table_indices();
        let leaf = self.read_entry(table, l3)?;
        leaf.is_valid().then(|| (leaf.addr(), leaf.flags()))
    }

    /// Map a fresh zeroed frame at `va`.
    ///
    /// # Returns
    /// The physical address of the new frame.
    pub fn map_page(&mut self, va: VirtAddr, flags: PageFlags) -> Result<PhysAddr, MappingError> {
        if !va.is_aligned() {
            return Err(MappingError::MisalignedAddress);
        }
        if !va.is_user() || !flags.is_user_readable() {
            return Err(MappingError::InvalidPermissions);
        }

        let table = self.leaf_table_or_create(va)?;
        let (_, _, _, l3) = va.page_table_indices();
        if self.read_entry(table, l3).is_some_and(PageTableEntry::is_valid) {
            return Err(MappingError::AlreadyMapped);
        }

        let frame = PhysFrame::alloc(&self.memory)?;
        let phys = frame.addr();
        self.write_entry(table, l3, PageTableEntry::page(phys, flags))?;
        self.pages.push(frame);
        log::trace!("mapped {} -> {} ({:?})", va, phys, flags);
        Ok(phys)
    }

    /// Change the flags of an existing leaf mapping.
    pub fn protect(&mut self, va: VirtAddr, flags: PageFlags) -> Result<(), MappingError> {
        if !va.is_aligned() {
            return Err(MappingError::MisalignedAddress);
        }
        if !flags.is_user_readable() {
            return Err(MappingError::InvalidPermissions);
        }
        let table = self.leaf_table(va).ok_or(MappingError::NotMapped)?;
        let (_, _, _, l3) = va.page_table_indices();
        let leaf = self
            .read_entry(table, l3)
            .filter(|e| e.is_valid())
            .ok_or(MappingError::NotMapped)?;
        self.write_entry(table, l3, PageTableEntry::page(leaf.addr(), flags))
    }

    /// Unmap the page at `va` and release its frame.
    pub fn unmap_page(&mut self, va: VirtAddr) -> Result<(), MappingError> {
        if !va.is_aligned() {
            return Err(MappingError::MisalignedAddress);
        }
        let table = self.leaf_table(va).ok_or(MappingError::NotMapped)?;
        let (_, _, _, l3) = va.page_table_indices();
        let leaf = self
            .read_entry(table, l3)
            .filter(|e| e.is_valid())
            .ok_or(MappingError::NotMapped)?;

        self.write_entry(table, l3, PageTableEntry::invalid())?;
        if let Some(pos) = self.pages.iter().position(|f| f.addr() == leaf.addr()) {
            self.pages.swap_remove(pos);
        }
        log::trace!("unmapped {}", va);
        Ok(())
    }
}

impl core::fmt::Debug for AddressSpace {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("AddressSpace")
            .field("ttbr0", &self.ttbr0())
            .field("tables", &self.tables.len())
            .field("pages", &self.pages.len())
            .finish()
    }
}
