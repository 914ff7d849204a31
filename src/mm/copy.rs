//! Copying Between Kernel and User Address Spaces
//!
//! Every user span is resolved page by page through the target's page
//! tables into a [`UserSpan`] before a single byte moves. A span either
//! validates completely or the copy fails with [`CopyFault`] and the
//! destination is untouched.

use alloc::vec::Vec;
use core::fmt;

use super::address::{PhysAddr, VirtAddr, PAGE_SIZE, USER_VIRT_END};
use super::space::AddressSpace;

/// Why a user span was refused.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FaultReason {
    /// The span reaches outside the user half.
    NotUser,
    /// `addr + len` overflows.
    Overflow,
    /// No valid leaf mapping covers the page.
    Unmapped,
    /// The page is mapped but EL0 may not write it.
    NotWritable,
    /// The page is mapped but EL0 may not read it.
    NotReadable,
}

/// A refused user copy: the first offending address and the reason.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CopyFault {
    pub addr: VirtAddr,
    pub reason: FaultReason,
}

impl CopyFault {
    const fn new(addr: VirtAddr, reason: FaultReason) -> Self {
        Self { addr, reason }
    }
}

impl fmt::Display for CopyFault {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let reason = match self.reason {
            FaultReason::NotUser => "outside user space",
            FaultReason::Overflow => "span overflows",
            FaultReason::Unmapped => "page not mapped",
            FaultReason::NotWritable => "page not writable",
            FaultReason::NotReadable => "page not readable",
        };
        write!(f, "user copy fault at {}: {}", self.addr, reason)
    }
}

/// Direction of a user copy.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Access {
    Read,
    Write,
}

#[derive(Debug, Clone, Copy)]
struct MappedChunk {
    frame: PhysAddr,
    offset: usize,
    len: usize,
}

/// A user span whose every page has been walked and permission-checked.
///
/// Borrowing the address space keeps its mappings fixed for as long as the
/// span is alive.
#[derive(Debug)]
pub struct UserSpan<'a> {
    space: &'a AddressSpace,
    chunks: Vec<MappedChunk>,
    len: usize,
}

impl<'a> UserSpan<'a> {
    /// Resolve `[va, va + len)` in `space` for the given access.
    pub fn resolve(
        space: &'a AddressSpace,
        va: VirtAddr,
        len: usize,
        access: Access,
    ) -> Result<Self, CopyFault> {
        let mut chunks = Vec::new();
        if len == 0 {
            return Ok(Self { space, chunks, len });
        }

        let end = va
            .checked_add(len)
            .ok_or(CopyFault::new(va, FaultReason::Overflow))?;
        if !va.is_user() || end.as_usize() > USER_VIRT_END {
            return Err(CopyFault::new(va, FaultReason::NotUser));
        }

        let mut cursor = va;
        let mut remaining = len;
        while remaining > 0 {
            let (frame, flags) = space
                .translate(cursor.align_down())
                .filter(|(frame, _)| space.memory().with_frame(*frame, |_| ()).is_some())
                .ok_or(CopyFault::new(cursor, FaultReason::Unmapped))?;

            match access {
                Access::Write if !flags.is_user_writable() => {
                    return Err(CopyFault::new(cursor, FaultReason::NotWritable));
                }
                Access::Read if !flags.is_user_readable() => {
                    return Err(CopyFault::new(cursor, FaultReason::NotReadable));
                }
                _ => {}
            }

            let offset = cursor.page_offset();
            let chunk = remaining.min(PAGE_SIZE - offset);
            chunks.push(MappedChunk {
                frame,
                offset,
                len: chunk,
            });
            cursor = VirtAddr::new_unchecked(cursor.as_usize() + chunk);
            remaining -= chunk;
        }

        Ok(Self { space, chunks, len })
    }

    /// Length of the span in bytes.
    #[inline]
    pub fn len(&self) -> usize {
        self.len
    }

    /// Check if the span is empty.
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Number of pages the span touches.
    #[inline]
    pub fn pages(&self) -> usize {
        self.chunks.len()
    }

    /// Commit `src` into the span. `src.len()` must equal the span length.
    fn write(&self, src: &[u8]) {
        debug_assert_eq!(src.len(), self.len);
        let memory = self.space.memory();
        let mut pos = 0;
        for chunk in &self.chunks {
            let bytes = &src[pos..pos + chunk.len];
            let written = memory.with_frame_mut(chunk.frame, |f| {
                f.bytes_mut()[chunk.offset..chunk.offset + chunk.len].copy_from_slice(bytes)
            });
            debug_assert!(written.is_some());
            pos += chunk.len;
        }
    }

    /// Fill `dst` from the span. `dst.len()` must equal the span length.
    fn read(&self, dst: &mut [u8]) {
        debug_assert_eq!(dst.len(), self.len);
        let memory = self.space.memory();
        let mut pos = 0;
        for chunk in &self.chunks {
            let out = &mut dst[pos..pos + chunk.len];
            let read = memory.with_frame(chunk.frame, |f| {
                out.copy_from_slice(&f.bytes()[chunk.offset..chunk.offset + chunk.len])
            });
            debug_assert!(read.is_some());
            pos += chunk.len;
        }
    }
}

/// Copy `src` into `space` at `dst`.
///
/// The whole destination span is validated before any byte is written.
pub fn copy_to_user(space: &AddressSpace, dst: VirtAddr, src: &[u8]) -> Result<(), CopyFault> {
    let span = UserSpan::resolve(space, dst, src.len(), Access::Write)?;
    span.write(src);
    Ok(())
}

/// Copy `dst.len()` bytes out of `space` starting at `src`.
pub fn copy_from_user(space: &AddressSpace, src: VirtAddr, dst: &mut [u8]) -> Result<(), CopyFault> {
    let span = UserSpan::resolve(space, src, dst.len(), Access::Read)?;
    span.read(dst);
    Ok(())
}

#[cfg(test)]
mod tests {
    use alloc::sync::Arc;

    use super::*;
    use crate::mm::{PageFlags, PhysMemory};

    const PAGE_A: usize = 0x0000_0000_0040_0000;
    const PAGE_B: usize = PAGE_A + PAGE_SIZE;

    fn space_with(flags: &[(usize, PageFlags)]) -> AddressSpace {
        let mut space = AddressSpace::new(Arc::new(PhysMemory::new(32))).unwrap();
        for &(va, f) in flags {
            space.map_page(VirtAddr::new(va), f).unwrap();
        }
        space
    }

    fn read_back(space: &AddressSpace, va: usize, len: usize) -> Vec<u8> {
        let mut buf = alloc::vec![0u8; len];
        copy_from_user(space, VirtAddr::new(va), &mut buf).unwrap();
        buf
    }

    #[test]
    fn test_copy_within_one_page() {
        let space = space_with(&[(PAGE_A, PageFlags::USER_DATA)]);
        let value = 0x1122_3344_5566_7788u64.to_le_bytes();

        copy_to_user(&space, VirtAddr::new(PAGE_A + 0x10), &value).unwrap();
        assert_eq!(read_back(&space, PAGE_A + 0x10, 8), value);
    }

    #[test]
    fn test_copy_straddles_page_boundary() {
        let space = space_with(&[(PAGE_A, PageFlags::USER_DATA), (PAGE_B, PageFlags::USER_DATA)]);
        let dst = VirtAddr::new(PAGE_B - 3);
        let span = UserSpan::resolve(&space, dst, 8, Access::Write).unwrap();
        assert_eq!(span.pages(), 2);

        let value = [1, 2, 3, 4, 5, 6, 7, 8];
        copy_to_user(&space, dst, &value).unwrap();
        assert_eq!(read_back(&space, PAGE_B - 3, 8), value);
    }

    #[test]
    fn test_unmapped_tail_writes_nothing() {
        let space = space_with(&[(PAGE_A, PageFlags::USER_DATA)]);
        let fault = copy_to_user(&space, VirtAddr::new(PAGE_B - 4), &[0xFF; 8]).unwrap_err();

        assert_eq!(fault.reason, FaultReason::Unmapped);
        assert_eq!(fault.addr, VirtAddr::new(PAGE_B));
        assert_eq!(read_back(&space, PAGE_B - 4, 4), [0; 4]);
    }

    #[test]
    fn test_read_only_tail_writes_nothing() {
        let space = space_with(&[(PAGE_A, PageFlags::USER_DATA), (PAGE_B, PageFlags::USER_RODATA)]);
        let fault = copy_to_user(&space, VirtAddr::new(PAGE_B - 2), &[0xFF; 8]).unwrap_err();

        assert_eq!(fault.reason, FaultReason::NotWritable);
        assert_eq!(read_back(&space, PAGE_B - 2, 8), [0; 8]);
    }

    #[test]
    fn test_rejects_non_user_and_overflow() {
        let space = space_with(&[(PAGE_A, PageFlags::USER_DATA)]);
        let kernel = copy_to_user(&space, VirtAddr::new(0xFFFF_0000_4008_0000), &[0; 8]);
        assert_eq!(kernel.unwrap_err().reason, FaultReason::NotUser);

        let wrap = copy_to_user(&space, VirtAddr::new_unchecked(usize::MAX - 2), &[0; 8]);
        assert_eq!(wrap.unwrap_err().reason, FaultReason::Overflow);

        let edge = copy_to_user(&space, VirtAddr::new_unchecked(USER_VIRT_END - 4), &[0; 8]);
        assert_eq!(edge.unwrap_err().reason, FaultReason::NotUser);
    }

    #[test]
    fn test_zero_length_copy_is_a_no_op() {
        let space = space_with(&[]);
        assert!(copy_to_user(&space, VirtAddr::new(0xdead_0000), &[]).is_ok());
    }
}
