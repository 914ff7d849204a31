//! Physical Frame Memory
//!
//! Owns the physical frames handed out to page tables and user pages, and
//! the bitmap allocator that tracks them.
//!
//! # Design
//! - Each bit in the bitmap represents one 4KB frame
//! - Bit = 0: frame is free
//! - Bit = 1: frame is allocated
//! - Frame `n` lives at `PHYS_MEM_BASE + n * PAGE_SIZE`
//! - Every frame sits behind its own spinlock, so a copy into one address
//!   space never contends with a copy into another
//!
//! # Security Properties
//! - All allocated frames are zeroed before returning
//! - Double-free is detected and causes a panic
//! - The allocator is protected by a spinlock

use alloc::boxed::Box;
use alloc::sync::Arc;
use alloc::vec;
use alloc::vec::Vec;

use spin::Mutex;

use super::address::{PhysAddr, ENTRIES_PER_TABLE, PAGE_SHIFT, PAGE_SIZE, PHYS_MEM_BASE};
use super::paging::{MappingError, PageTableEntry};

/// One 4KB physical page.
///
/// Frames are addressed by index, so the storage itself carries no page
/// alignment and the pool packs densely on the heap.
#[repr(transparent)]
pub struct Frame([u8; PAGE_SIZE]);

impl Frame {
    const fn zeroed() -> Self {
        Self([0; PAGE_SIZE])
    }

    /// View the frame as bytes.
    #[inline]
    pub fn bytes(&self) -> &[u8; PAGE_SIZE] {
        &self.0
    }

    /// View the frame as mutable bytes.
    #[inline]
    pub fn bytes_mut(&mut self) -> &mut [u8; PAGE_SIZE] {
        &mut self.0
    }

    /// Read entry `index` when this frame holds a page table.
    #[inline]
    pub fn entry(&self, index: usize) -> PageTableEntry {
        debug_assert!(index < ENTRIES_PER_TABLE);
        let off = index * 8;
        let mut word = [0u8; 8];
        word.copy_from_slice(&self.0[off..off + 8]);
        PageTableEntry::from_raw(u64::from_le_bytes(word))
    }

    /// Write entry `index` when this frame holds a page table.
    #[inline]
    pub fn set_entry(&mut self, index: usize, entry: PageTableEntry) {
        debug_assert!(index < ENTRIES_PER_TABLE);
        let off = index * 8;
        self.0[off..off + 8].copy_from_slice(&entry.as_u64().to_le_bytes());
    }
}

/// Frame allocator state.
struct FrameBitmap {
    /// Bitmap tracking allocated frames (1 = allocated, 0 = free).
    bitmap: Vec<u8>,
    /// Number of free frames remaining.
    free_count: usize,
    /// Total frames under management.
    total_frames: usize,
}

impl FrameBitmap {
    fn new(total_frames: usize) -> Self {
        Self {
            bitmap: vec![0; total_frames.div_ceil(8)],
            free_count: total_frames,
            total_frames,
        }
    }

    #[inline]
    fn set_bit(&mut self, frame: usize, allocated: bool) {
        let byte_idx = frame / 8;
        let bit_idx = frame % 8;

        if allocated {
            self.bitmap[byte_idx] |= 1 << bit_idx;
        } else {
            self.bitmap[byte_idx] &= !(1 << bit_idx);
        }
    }

    #[inline]
    fn is_allocated(&self, frame: usize) -> bool {
        if frame >= self.total_frames {
            return true; // Out of range = allocated
        }
        (self.bitmap[frame / 8] >> (frame % 8)) & 1 == 1
    }

    /// Allocate a single frame index.
    fn alloc(&mut self) -> Option<usize> {
        if self.free_count == 0 {
            return None;
        }

        for byte_idx in 0..self.bitmap.len() {
            if self.bitmap[byte_idx] == 0xFF {
                continue;
            }
            for bit_idx in 0..8 {
                let frame = byte_idx * 8 + bit_idx;
                if frame >= self.total_frames {
                    return None;
                }
                if !self.is_allocated(frame) {
                    self.set_bit(frame, true);
                    self.free_count -= 1;
                    return Some(frame);
                }
            }
        }

        None
    }

    /// Free a previously allocated frame index.
    fn free(&mut self, frame: usize) {
        if frame >= self.total_frames {
            panic!("Attempted to free frame outside managed range: {}", frame);
        }
        if !self.is_allocated(frame) {
            panic!("Double free detected for frame: {}", frame);
        }
        self.set_bit(frame, false);
        self.free_count += 1;
    }
}

/// Physical memory: frame storage plus its allocator.
pub struct PhysMemory {
    allocator: Mutex<FrameBitmap>,
    frames: Box<[Mutex<Frame>]>,
}

impl PhysMemory {
    /// Create a pool of `frame_count` zeroed frames.
    pub fn new(frame_count: usize) -> Self {
        let frames = (0..frame_count)
            .map(|_| Mutex::new(Frame::zeroed()))
            .collect::<Vec<_>>()
            .into_boxed_slice();
        Self {
            allocator: Mutex::new(FrameBitmap::new(frame_count)),
            frames,
        }
    }

    /// Heap bytes taken by a pool of `frame_count` frames.
    pub const fn footprint(frame_count: usize) -> usize {
        frame_count * core::mem::size_of::<Mutex<Frame>>()
    }

    /// Total frames under management.
    pub fn total_frames(&self) -> usize {
        self.frames.len()
    }

    /// Get the number of free frames remaining.
    pub fn free_frames(&self) -> usize {
        self.allocator.lock().free_count
    }

    fn frame_index(&self, addr: PhysAddr) -> Option<usize> {
        if !addr.is_aligned() || addr.as_usize() < PHYS_MEM_BASE {
            return None;
        }
        let index = (addr.as_usize() - PHYS_MEM_BASE) >> PAGE_SHIFT;
        (index < self.frames.len()).then_some(index)
    }

    /// Allocate a single zeroed physical frame.
    ///
    /// Returns `None` if no frames are available.
    pub fn alloc_frame(&self) -> Option<PhysAddr> {
        let index = self.allocator.lock().alloc()?;
        // Zero the frame so no previous owner's data leaks
        self.frames[index].lock().bytes_mut().fill(0);
        Some(PhysAddr::new(PHYS_MEM_BASE + (index << PAGE_SHIFT)))
    }

    /// Free a physical frame.
    ///
    /// # Panics
    /// Panics if the address is unaligned, outside the pool, or not allocated.
    pub fn free_frame(&self, addr: PhysAddr) {
        match self.frame_index(addr) {
            Some(index) => self.allocator.lock().free(index),
            None => panic!("Attempted to free unmanaged address: {:?}", addr),
        }
    }

    /// Run `f` with shared access to the frame at `addr`.
    pub fn with_frame<R>(&self, addr: PhysAddr, f: impl FnOnce(&Frame) -> R) -> Option<R> {
        let index = self.frame_index(addr)?;
        let frame = self.frames[index].lock();
        Some(f(&frame))
    }

    /// Run `f` with exclusive access to the frame at `addr`.
    pub fn with_frame_mut<R>(&self, addr: PhysAddr, f: impl FnOnce(&mut Frame) -> R) -> Option<R> {
        let index = self.frame_index(addr)?;
        let mut frame = self.frames[index].lock();
        Some(f(&mut frame))
    }
}

/// A RAII guard for a physical frame that automatically frees it on drop.
#[derive(Debug)]
pub struct PhysFrame {
    addr: PhysAddr,
    memory: Arc<PhysMemory>,
}

impl PhysFrame {
    /// Allocate a new physical frame, returning an error on failure.
    pub fn alloc(memory: &Arc<PhysMemory>) -> Result<Self, MappingError> {
        let addr = memory.alloc_frame().ok_or(MappingError::OutOfMemory)?;
        Ok(Self {
            addr,
            memory: Arc::clone(memory),
        })
    }

    /// Get the physical address of this frame.
    #[inline]
    pub fn addr(&self) -> PhysAddr {
        self.addr
    }
}

impl Drop for PhysFrame {
    fn drop(&mut self) {
        self.memory.free_frame(self.addr);
    }
}

impl core::fmt::Debug for PhysMemory {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("PhysMemory")
            .field("total_frames", &self.total_frames())
            .field("free_frames", &self.free_frames())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_alloc_until_exhausted() {
        let memory = PhysMemory::new(3);
        let a = memory.alloc_frame().unwrap();
        let b = memory.alloc_frame().unwrap();
        let c = memory.alloc_frame().unwrap();
        assert_eq!(a, PhysAddr::new(PHYS_MEM_BASE));
        assert_ne!(a, b);
        assert_ne!(b, c);
        assert!(memory.alloc_frame().is_none());
        assert_eq!(memory.free_frames(), 0);

        memory.free_frame(b);
        assert_eq!(memory.alloc_frame(), Some(b));
    }

    #[test]
    fn test_reallocated_frame_is_zeroed() {
        let memory = PhysMemory::new(1);
        let addr = memory.alloc_frame().unwrap();
        memory.with_frame_mut(addr, |f| f.bytes_mut()[17] = 0xAA).unwrap();
        memory.free_frame(addr);

        let again = memory.alloc_frame().unwrap();
        assert_eq!(memory.with_frame(again, |f| f.bytes()[17]), Some(0));
    }

    #[test]
    #[should_panic(expected = "Double free")]
    fn test_double_free_panics() {
        let memory = PhysMemory::new(2);
        let addr = memory.alloc_frame().unwrap();
        memory.free_frame(addr);
        memory.free_frame(addr);
    }

    #[test]
    fn test_phys_frame_releases_on_drop() {
        let memory = Arc::new(PhysMemory::new(2));
        {
            let _frame = PhysFrame::alloc(&memory).unwrap();
            assert_eq!(memory.free_frames(), 1);
        }
        assert_eq!(memory.free_frames(), 2);
    }

    #[test]
    fn test_footprint_packs_frames() {
        assert!(PhysMemory::footprint(1) < 2 * PAGE_SIZE);
        assert_eq!(PhysMemory::footprint(16), 16 * PhysMemory::footprint(1));
    }

    #[test]
    fn test_entry_words_are_little_endian() {
        let memory = PhysMemory::new(1);
        let addr = memory.alloc_frame().unwrap();
        let entry = PageTableEntry::table(PhysAddr::new(PHYS_MEM_BASE + 0x3000));
        memory.with_frame_mut(addr, |f| f.set_entry(2, entry)).unwrap();
        let back = memory.with_frame(addr, |f| f.entry(2)).unwrap();
        assert_eq!(back, entry);
        assert_eq!(memory.with_frame(addr, |f| f.bytes()[16]), Some(0x03));
    }
}
