//! Arena buffer
//!
//! One contiguous, max-align allocation holding a whole flattened
//! document. Placement is bump-only and the capacity is exact, so the
//! buffer never grows and nothing in it is freed individually; release
//! is dropping the arena as a unit.

use std::alloc::{alloc_zeroed, dealloc, Layout};
use std::ptr::NonNull;

use memmap2::MmapMut;

use super::layout::MAX_ALIGN;
use crate::FlatError;

/// An exact-size, max-aligned buffer holding a flattened document image
pub struct Arena {
    ptr: NonNull<u8>,
    len: usize,
}

impl Arena {
    /// Allocate a zeroed buffer of exactly `len` bytes.
    ///
    /// Zeroing keeps struct padding deterministic, so persisting the
    /// arena never writes uninitialized bytes.
    pub(crate) fn new_exact(len: usize) -> Result<Arena, FlatError> {
        let layout = Layout::from_size_align(len.max(1), MAX_ALIGN)
            .map_err(|_| FlatError::AllocationExhausted { bytes: len })?;
        let ptr = unsafe { alloc_zeroed(layout) };
        let ptr = NonNull::new(ptr).ok_or(FlatError::AllocationExhausted { bytes: len })?;
        Ok(Arena { ptr, len })
    }

    /// Copy a loaded blob into a fresh max-aligned arena
    pub fn from_bytes(bytes: &[u8]) -> Result<Arena, FlatError> {
        let arena = Arena::new_exact(bytes.len())?;
        unsafe {
            std::ptr::copy_nonoverlapping(bytes.as_ptr(), arena.ptr.as_ptr(), bytes.len());
        }
        Ok(arena)
    }

    /// Buffer length in bytes
    pub fn len(&self) -> usize {
        self.len
    }

    /// True for a zero-length buffer
    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// The whole image as bytes (what gets persisted)
    pub fn as_slice(&self) -> &[u8] {
        unsafe { std::slice::from_raw_parts(self.ptr.as_ptr(), self.len) }
    }

    /// Base address of the buffer
    pub(crate) fn base(&self) -> usize {
        self.ptr.as_ptr() as usize
    }
}

impl Drop for Arena {
    fn drop(&mut self) {
        // Same layout as in new_exact
        let layout = Layout::from_size_align(self.len.max(1), MAX_ALIGN)
            .expect("arena layout was valid at allocation");
        unsafe { dealloc(self.ptr.as_ptr(), layout) };
    }
}

// The arena owns its allocation exclusively; after hydration it is only
// ever read.
unsafe impl Send for Arena {}
unsafe impl Sync for Arena {}

impl std::fmt::Debug for Arena {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Arena")
            .field("base", &self.base())
            .field("len", &self.len)
            .finish()
    }
}

/// Storage a flattened image can live in: an owned arena, or a private
/// (copy-on-write) memory map of a persisted blob.
pub enum Backing {
    Owned(Arena),
    Mapped(MmapMut),
}

impl Backing {
    /// Base address of the image
    pub(crate) fn base(&self) -> usize {
        match self {
            Backing::Owned(arena) => arena.base(),
            Backing::Mapped(map) => map.as_ptr() as usize,
        }
    }

    /// Base address for the in-place hydration writes
    pub(crate) fn base_mut(&mut self) -> usize {
        match self {
            Backing::Owned(arena) => arena.base(),
            Backing::Mapped(map) => map.as_mut_ptr() as usize,
        }
    }

    /// Image length in bytes
    pub fn len(&self) -> usize {
        match self {
            Backing::Owned(arena) => arena.len(),
            Backing::Mapped(map) => map.len(),
        }
    }

    /// True for a zero-length image
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl From<Arena> for Backing {
    fn from(arena: Arena) -> Self {
        Backing::Owned(arena)
    }
}

impl From<MmapMut> for Backing {
    fn from(map: MmapMut) -> Self {
        Backing::Mapped(map)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_exact_allocation_is_aligned() {
        let arena = Arena::new_exact(96).unwrap();
        assert_eq!(arena.len(), 96);
        assert_eq!(arena.base() % MAX_ALIGN, 0);
    }

    #[test]
    fn test_from_bytes_copies() {
        let bytes = vec![7u8; 48];
        let arena = Arena::from_bytes(&bytes).unwrap();
        assert_eq!(arena.as_slice(), &bytes[..]);
        assert_eq!(arena.base() % MAX_ALIGN, 0);
    }

    #[test]
    fn test_new_allocation_is_zeroed() {
        let arena = Arena::new_exact(64).unwrap();
        assert!(arena.as_slice().iter().all(|&b| b == 0));
    }
}
