//! Capability shared by every allocator of the library: hand out raw blocks of
//! memory and take them back.

use std::alloc::{self, Layout};
use std::ptr::NonNull;

use super::memory_error::MemoryError;

/// Alignment guaranteed for every pointer handed out by the library's allocators.
pub const GLOBAL_ALIGNMENT: usize = 16;

/// Defines a type that is capable of serving requests for allocation and
/// deallocation of raw memory.
///
/// Implementations synchronize internally; every method takes `&self` so a single
/// allocator can be shared by worker threads.
pub trait MemoryAllocator: Send + Sync {
    /// Allocates a block of at least `size` bytes.
    fn allocate(&self, size: usize) -> Result<NonNull<u8>, MemoryError>;

    /// Returns a block previously obtained from [`MemoryAllocator::allocate`].
    ///
    /// # Safety
    /// `pointer` must have been returned by `allocate` on this same allocator with
    /// the same `size`, and must not be used after this call.
    unsafe fn release(&self, pointer: NonNull<u8>, size: usize) -> Result<(), MemoryError>;
}

/// Rounds `value` up to the next multiple of `alignment` (a power of two).
///
/// Returns `None` on overflow.
#[inline(always)]
pub fn align_up(value: usize, alignment: usize) -> Option<usize> {
    debug_assert!(alignment.is_power_of_two());
    Some(value.checked_add(alignment - 1)? & !(alignment - 1))
}

/// Allocator backed directly by the system allocator.
///
/// Stateless; blocks are aligned to [`GLOBAL_ALIGNMENT`].
#[derive(Debug, Default, Clone, Copy)]
pub struct DefaultAllocator;

impl DefaultAllocator {
    /// Creates a system backed allocator.
    pub const fn new() -> Self {
        Self
    }

    #[inline(always)]
    fn layout(size: usize) -> Result<Layout, MemoryError> {
        Layout::from_size_align(size, GLOBAL_ALIGNMENT)
            .map_err(|_| MemoryError::SizeOverflow { requested: size })
    }
}

impl MemoryAllocator for DefaultAllocator {
    fn allocate(&self, size: usize) -> Result<NonNull<u8>, MemoryError> {
        if size == 0 {
            return Err(MemoryError::ZeroSizedAllocation);
        }
        let layout = Self::layout(size)?;
        // SAFETY: the layout has a non-zero size.
        let pointer = unsafe { alloc::alloc(layout) };
        NonNull::new(pointer).ok_or(MemoryError::OutOfMemory { requested: size })
    }

    unsafe fn release(&self, pointer: NonNull<u8>, size: usize) -> Result<(), MemoryError> {
        let layout = Self::layout(size)?;
        // SAFETY: the caller guarantees the block came from `allocate` with this size,
        // so it was allocated with this exact layout.
        unsafe { alloc::dealloc(pointer.as_ptr(), layout) };
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn align_up_rounds_to_multiples() {
        let alignments = vec![(1..17, 16), (17..33, 32), (33..49, 48)];

        for (sizes, expected) in alignments {
            for size in sizes {
                assert_eq!(Some(expected), align_up(size, GLOBAL_ALIGNMENT));
            }
        }
        assert_eq!(Some(0), align_up(0, GLOBAL_ALIGNMENT));
        assert_eq!(None, align_up(usize::MAX, GLOBAL_ALIGNMENT));
    }

    #[test]
    fn default_allocator_returns_aligned_blocks() {
        let allocator = DefaultAllocator::new();
        for size in [1, 7, 64, 1000, 4096] {
            let block = allocator.allocate(size).unwrap();
            assert_eq!(block.as_ptr() as usize % GLOBAL_ALIGNMENT, 0);
            unsafe {
                block.as_ptr().write_bytes(0xAB, size);
                allocator.release(block, size).unwrap();
            }
        }
    }

    #[test]
    fn default_allocator_rejects_zero_size() {
        let allocator = DefaultAllocator::new();
        assert_eq!(
            allocator.allocate(0),
            Err(MemoryError::ZeroSizedAllocation)
        );
    }

    #[test]
    fn default_allocator_rejects_absurd_size() {
        let allocator = DefaultAllocator::new();
        assert!(matches!(
            allocator.allocate(usize::MAX),
            Err(MemoryError::SizeOverflow { .. })
        ));
    }
}
