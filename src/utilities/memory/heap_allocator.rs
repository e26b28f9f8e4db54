//! General purpose heap for allocations too varied in size or lifetime for pools.
//!
//! The heap reserves large blocks from a base allocator and carves them into memory units.
//! Allocation is first-fit over the free list; the excess of a chosen unit is split off into a
//! new free unit. Releasing a unit coalesces it with its free neighbors from the same
//! reservation. All reservations go back to the base allocator when the heap is dropped.

use std::fmt;
use std::ptr::NonNull;

use crossbeam_utils::CachePadded;
use parking_lot::Mutex;

use super::heap_allocation_sizes::HeapAllocationSizes;
use super::memory_allocator::{align_up, MemoryAllocator, GLOBAL_ALIGNMENT};
use super::memory_error::MemoryError;
use super::memory_unit::{
    MemoryUnit, MemoryUnitInfo, MemoryUnits, TagResolution, UnitIndex, UnitTag, HEADER_SIZE, TAG_SIZE,
};

/// Rounds a payload start up to [`GLOBAL_ALIGNMENT`].
#[inline(always)]
pub fn compute_aligned_address(address: NonNull<u8>) -> NonNull<u8> {
    let misalignment = address.as_ptr() as usize & (GLOBAL_ALIGNMENT - 1);
    if misalignment == 0 {
        address
    } else {
        // SAFETY: callers only align payload starts, and every claimed size covers the padding.
        unsafe { address.add(GLOBAL_ALIGNMENT - misalignment) }
    }
}

/// Gets the number of bytes a free unit of `unit_size` payload bytes starting at `payload` must
/// give up to serve a request of `size` bytes, or `None` if the request does not fit.
///
/// The claim covers the alignment padding and is rounded up to [`GLOBAL_ALIGNMENT`] so split
/// points stay aligned, but never beyond the unit itself.
#[inline(always)]
fn claimed_size(payload: NonNull<u8>, unit_size: usize, size: usize) -> Option<usize> {
    let padding = compute_aligned_address(payload).as_ptr() as usize - payload.as_ptr() as usize;
    let needed = padding + size;
    if needed > unit_size {
        return None;
    }
    Some(((needed + GLOBAL_ALIGNMENT - 1) & !(GLOBAL_ALIGNMENT - 1)).min(unit_size))
}

/// Block obtained from the base allocator.
#[derive(Debug, Clone, Copy)]
struct Reservation {
    block: NonNull<u8>,
    size: usize,
}

/// Debug accounting of every byte the heap manages.
#[cfg(debug_assertions)]
#[derive(Debug, Default, Clone, Copy)]
struct HeapStatistics {
    /// Allocations minus releases.
    allocation_balance: isize,
    total_memory_size: usize,
    total_header_size: usize,
    used_memory_size: usize,
    remaining_memory_size: usize,
    block_count: usize,
}

struct HeapState {
    units: MemoryUnits,
    reservations: Vec<Reservation>,
    /// Payload bytes reserved so far, headers excluded.
    reserved_payload_size: usize,
    #[cfg(debug_assertions)]
    statistics: HeapStatistics,
}

// SAFETY: the reserved blocks are owned by the heap and only touched while its lock is held.
unsafe impl Send for HeapState {}

impl HeapState {
    fn new() -> Self {
        Self {
            units: MemoryUnits::new(),
            reservations: Vec::new(),
            reserved_payload_size: 0,
            #[cfg(debug_assertions)]
            statistics: HeapStatistics::default(),
        }
    }

    /// Obtains a block with room for `size_to_allocate` payload bytes and turns it into a single
    /// free unit.
    fn reserve(
        &mut self,
        base_allocator: &dyn MemoryAllocator,
        size_to_allocate: usize,
    ) -> Result<(), MemoryError> {
        debug_assert!(size_to_allocate > 0);
        let block_size = size_to_allocate
            .checked_add(HEADER_SIZE)
            .ok_or(MemoryError::SizeOverflow { requested: size_to_allocate })?;
        let block = base_allocator.allocate(block_size).map_err(|error| {
            log::warn!("Base allocator refused a heap reservation of {block_size} bytes: {error}");
            error
        })?;

        let index = self.units.insert_reserved_unit(block, size_to_allocate);
        self.units.add_to_free_units(index);
        self.reservations.push(Reservation { block, size: block_size });
        self.reserved_payload_size += size_to_allocate;

        #[cfg(debug_assertions)]
        {
            let statistics = &mut self.statistics;
            statistics.total_memory_size += block_size;
            statistics.total_header_size += HEADER_SIZE;
            statistics.remaining_memory_size += size_to_allocate;
            statistics.block_count += 1;
        }

        log::debug!(
            "Reserved heap block {:p} of {} bytes, {} blocks reserved",
            block,
            block_size,
            self.reservations.len()
        );
        Ok(())
    }

    /// First-fit search of the free list.
    fn find_free_unit(&self, size: usize) -> Option<(UnitIndex, usize)> {
        self.units.iter_free_units().find_map(|(index, unit)| {
            claimed_size(unit.payload(), unit.size, size).map(|claimed| (index, claimed))
        })
    }

    /// Hands out the free unit `index`, keeping `claimed` bytes of it.
    fn claim_unit(&mut self, index: UnitIndex, claimed: usize, requested: usize) -> NonNull<u8> {
        if self.units.split_memory_unit(index, claimed).is_some() {
            #[cfg(debug_assertions)]
            {
                self.statistics.total_header_size += HEADER_SIZE;
                self.statistics.remaining_memory_size -= HEADER_SIZE;
            }
        } else {
            self.units.remove_from_free_units(index);
        }

        let tag = self.units.tag_for(index);
        let unit = self.units.get_mut(index);
        unit.is_allocated = true;
        unit.requested_size = requested;
        let pointer = compute_aligned_address(unit.payload());

        #[cfg(debug_assertions)]
        {
            let size = unit.size;
            self.statistics.used_memory_size += size;
            self.statistics.remaining_memory_size -= size;
            self.statistics.allocation_balance += 1;
        }

        // SAFETY: the pointer is at least HEADER_SIZE bytes into the unit, and the header bytes
        // belong to the heap.
        unsafe {
            pointer
                .as_ptr()
                .sub(TAG_SIZE)
                .cast::<UnitTag>()
                .write_unaligned(tag);
        }
        pointer
    }

    /// Traces a released pointer back to its unit and checks the release is legitimate.
    ///
    /// # Safety
    /// The `TAG_SIZE` bytes in front of `pointer` must be readable.
    unsafe fn locate_allocated_unit(
        &self,
        pointer: NonNull<u8>,
        size: usize,
    ) -> Result<UnitIndex, MemoryError> {
        let address = pointer.as_ptr() as usize;
        // SAFETY: guaranteed by the caller.
        let tag = unsafe { pointer.as_ptr().sub(TAG_SIZE).cast::<UnitTag>().read_unaligned() };
        let index = match self.units.resolve_tag(tag) {
            TagResolution::Live(index) => index,
            TagResolution::Stale => return Err(MemoryError::DoubleRelease { address }),
            TagResolution::Unknown => return Err(MemoryError::ForeignPointer { address }),
        };
        let unit = self.units.get(index);
        if compute_aligned_address(unit.payload()) != pointer {
            return Err(MemoryError::ForeignPointer { address });
        }
        if !unit.is_allocated {
            return Err(MemoryError::DoubleRelease { address });
        }
        if unit.requested_size != size {
            return Err(MemoryError::SizeMismatch {
                allocated: unit.requested_size,
                released: size,
            });
        }
        Ok(index)
    }

    /// Returns an allocated unit to the free list and coalesces it with its neighbors.
    fn release_unit(&mut self, index: UnitIndex) {
        let (previous, next, is_next_contiguous) = {
            let unit = self.units.get_mut(index);
            unit.is_allocated = false;
            unit.requested_size = 0;
            #[cfg(debug_assertions)]
            {
                let size = unit.size;
                self.statistics.used_memory_size -= size;
                self.statistics.remaining_memory_size += size;
                self.statistics.allocation_balance -= 1;
            }
            (unit.previous_unit, unit.next_unit, unit.is_next_contiguous_memory)
        };
        self.units.add_to_free_units(index);

        if let Some(next) = next {
            if is_next_contiguous && !self.units.get(next).is_allocated {
                self.units.merge_units(index, next);
                self.record_merge();
            }
        }
        if let Some(previous) = previous {
            let previous_unit = self.units.get(previous);
            if previous_unit.is_next_contiguous_memory && !previous_unit.is_allocated {
                self.units.merge_units(previous, index);
                self.record_merge();
            }
        }
    }

    #[inline(always)]
    fn record_merge(&mut self) {
        #[cfg(debug_assertions)]
        {
            self.statistics.total_header_size -= HEADER_SIZE;
            self.statistics.remaining_memory_size += HEADER_SIZE;
        }
    }

    /// Checks the unit lists and, in debug builds, that the counters agree with them.
    #[track_caller]
    fn validate(&self) {
        self.units.validate();
        #[cfg(debug_assertions)]
        {
            let statistics = &self.statistics;
            let (mut used, mut remaining, mut allocated) = (0usize, 0usize, 0isize);
            for unit in self.units.iter_units() {
                if unit.is_allocated {
                    used += unit.size;
                    allocated += 1;
                } else {
                    remaining += unit.size;
                }
            }
            assert_eq!(statistics.used_memory_size, used, "Used memory counter drifted.");
            assert_eq!(statistics.remaining_memory_size, remaining, "Remaining memory counter drifted.");
            assert_eq!(statistics.allocation_balance, allocated, "Allocation balance drifted.");
            assert_eq!(statistics.total_header_size, self.units.len() * HEADER_SIZE);
            assert_eq!(
                statistics.total_memory_size,
                statistics.total_header_size + used + remaining,
                "Reserved bytes are not fully covered by units."
            );
        }
    }
}

/// Thread safe first-fit heap allocator layered on top of a base allocator.
///
/// Every call locks the whole heap; the base allocator is only called while the lock is held
/// and must never allocate through this same heap.
pub struct HeapAllocator<'a> {
    base_allocator: &'a dyn MemoryAllocator,
    allocation_sizes: HeapAllocationSizes,
    state: CachePadded<Mutex<HeapState>>,
}

impl<'a> HeapAllocator<'a> {
    /// Creates a heap reserving [`INIT_ALLOCATED_SIZE`](super::heap_allocation_sizes::INIT_ALLOCATED_SIZE)
    /// bytes from `base_allocator` right away.
    pub fn new(base_allocator: &'a dyn MemoryAllocator) -> Result<Self, MemoryError> {
        Self::with_allocation_sizes(base_allocator, HeapAllocationSizes::default())
    }

    /// Creates a heap reserving `initial_reserved_size` bytes right away. Zero reserves lazily.
    pub fn with_initial_size(
        base_allocator: &'a dyn MemoryAllocator,
        initial_reserved_size: usize,
    ) -> Result<Self, MemoryError> {
        Self::with_allocation_sizes(
            base_allocator,
            HeapAllocationSizes {
                initial_reserved_size,
                ..HeapAllocationSizes::default()
            },
        )
    }

    /// Creates a heap with explicit reservation sizes.
    pub fn with_allocation_sizes(
        base_allocator: &'a dyn MemoryAllocator,
        allocation_sizes: HeapAllocationSizes,
    ) -> Result<Self, MemoryError> {
        let mut state = HeapState::new();
        if allocation_sizes.initial_reserved_size > 0 {
            state.reserve(base_allocator, allocation_sizes.initial_reserved_size)?;
        }
        Ok(Self {
            base_allocator,
            allocation_sizes,
            state: CachePadded::new(Mutex::new(state)),
        })
    }

    /// Gets the reservation sizes the heap was created with.
    #[inline(always)]
    pub fn allocation_sizes(&self) -> HeapAllocationSizes {
        self.allocation_sizes
    }

    /// Allocates `size` bytes aligned to [`GLOBAL_ALIGNMENT`].
    ///
    /// Grows the heap once if no free unit is large enough.
    pub fn allocate(&self, size: usize) -> Result<NonNull<u8>, MemoryError> {
        if size == 0 {
            log::warn!("Rejected a zero-sized heap allocation");
            return Err(MemoryError::ZeroSizedAllocation);
        }
        // Worst case payload footprint, with a full alignment padding.
        let required = size
            .checked_add(GLOBAL_ALIGNMENT - 1)
            .and_then(|padded| align_up(padded, GLOBAL_ALIGNMENT))
            .filter(|required| required.checked_add(HEADER_SIZE).is_some())
            .ok_or_else(|| {
                log::warn!("Rejected a heap allocation of {size} bytes");
                MemoryError::SizeOverflow { requested: size }
            })?;

        let mut state = self.state.lock();
        let (index, claimed) = match state.find_free_unit(size) {
            Some(found) => found,
            None => {
                let growth = self
                    .allocation_sizes
                    .growth_size(required, state.reserved_payload_size);
                state.reserve(self.base_allocator, growth)?;
                state
                    .find_free_unit(size)
                    .ok_or(MemoryError::OutOfMemory { requested: size })?
            }
        };
        let pointer = state.claim_unit(index, claimed, size);
        #[cfg(debug_assertions)]
        state.validate();

        log::trace!("Allocated {size} bytes at {pointer:p} from unit {index}");
        Ok(pointer)
    }

    /// Returns memory obtained from [`HeapAllocator::allocate`].
    ///
    /// Misuse that can be recognized (a pointer this heap never handed out, a second release,
    /// a size differing from the allocation) is reported without touching the heap.
    ///
    /// # Safety
    /// `pointer` must either come from `allocate` on this heap or point at least
    /// [`HEADER_SIZE`] bytes into readable memory. Released memory must not be used again.
    pub unsafe fn release(&self, pointer: NonNull<u8>, size: usize) -> Result<(), MemoryError> {
        let mut state = self.state.lock();
        // SAFETY: guaranteed by the caller.
        let index = unsafe { state.locate_allocated_unit(pointer, size) }.map_err(|error| {
            log::warn!("Rejected heap release of {pointer:p}: {error}");
            error
        })?;
        state.release_unit(index);
        #[cfg(debug_assertions)]
        state.validate();

        log::trace!("Released {size} bytes at {pointer:p}");
        Ok(())
    }

    /// Takes a snapshot of every unit in address order.
    pub fn memory_units(&self) -> Vec<MemoryUnitInfo> {
        let state = self.state.lock();
        state.units.iter_units().map(MemoryUnit::info).collect()
    }

    /// Takes a snapshot of the free list, in the order allocation searches it.
    pub fn free_units(&self) -> Vec<MemoryUnitInfo> {
        let state = self.state.lock();
        state
            .units
            .iter_free_units()
            .map(|(_, unit)| unit.info())
            .collect()
    }

    /// Gets the number of blocks obtained from the base allocator.
    pub fn reserved_block_count(&self) -> usize {
        self.state.lock().reservations.len()
    }

    /// Gets the number of bytes obtained from the base allocator, headers included.
    pub fn reserved_memory_size(&self) -> usize {
        self.state.lock().reservations.iter().map(|r| r.size).sum()
    }

    /// Runs the full consistency check of the unit lists.
    ///
    /// # Panics
    /// If the heap bookkeeping is corrupt.
    pub fn validate(&self) {
        self.state.lock().validate();
    }
}

#[cfg(debug_assertions)]
impl HeapAllocator<'_> {
    /// Gets the bytes reserved from the base allocator, headers included.
    pub fn total_memory_size(&self) -> usize {
        self.state.lock().statistics.total_memory_size
    }

    /// Gets the bytes spent on unit headers.
    pub fn total_header_size(&self) -> usize {
        self.state.lock().statistics.total_header_size
    }

    /// Gets the payload bytes of allocated units.
    pub fn used_memory_size(&self) -> usize {
        self.state.lock().statistics.used_memory_size
    }

    /// Gets the payload bytes of free units.
    pub fn remaining_memory_size(&self) -> usize {
        self.state.lock().statistics.remaining_memory_size
    }

    /// Gets the number of distinct reservations.
    pub fn block_count(&self) -> usize {
        self.state.lock().statistics.block_count
    }

    /// Gets the number of allocations not yet released.
    pub fn allocation_balance(&self) -> isize {
        self.state.lock().statistics.allocation_balance
    }
}

impl MemoryAllocator for HeapAllocator<'_> {
    #[inline(always)]
    fn allocate(&self, size: usize) -> Result<NonNull<u8>, MemoryError> {
        HeapAllocator::allocate(self, size)
    }

    #[inline(always)]
    unsafe fn release(&self, pointer: NonNull<u8>, size: usize) -> Result<(), MemoryError> {
        // SAFETY: same contract as the trait method.
        unsafe { HeapAllocator::release(self, pointer, size) }
    }
}

impl Drop for HeapAllocator<'_> {
    fn drop(&mut self) {
        let state = self.state.get_mut();
        for reservation in state.reservations.drain(..) {
            // SAFETY: the block came from this base allocator with this size and nothing in the
            // heap refers to it past this point.
            let released = unsafe {
                self.base_allocator
                    .release(reservation.block, reservation.size)
            };
            if let Err(error) = released {
                log::error!("Failed to return heap block {:p}: {error}", reservation.block);
            }
        }

        #[cfg(debug_assertions)]
        {
            let balance = state.statistics.allocation_balance;
            if balance != 0 {
                log::error!("Heap dropped with {balance} allocations outstanding");
                if !std::thread::panicking() {
                    debug_assert_eq!(balance, 0, "Heap dropped with outstanding allocations.");
                }
            }
        }
    }
}

impl fmt::Debug for HeapAllocator<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("HeapAllocator")
            .field("allocation_sizes", &self.allocation_sizes)
            .field("reserved_blocks", &self.reserved_block_count())
            .field("reserved_bytes", &self.reserved_memory_size())
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::utilities::memory::memory_allocator::DefaultAllocator;

    static BASE: DefaultAllocator = DefaultAllocator::new();

    #[test]
    fn aligned_address_rounds_up() {
        let mut storage = [0u8; 64];
        let base = NonNull::new(storage.as_mut_ptr()).unwrap();
        let aligned = compute_aligned_address(base);
        assert_eq!(aligned.as_ptr() as usize % GLOBAL_ALIGNMENT, 0);
        assert!((aligned.as_ptr() as usize) - (base.as_ptr() as usize) < GLOBAL_ALIGNMENT);
        assert_eq!(compute_aligned_address(aligned), aligned);
    }

    #[test]
    fn claims_never_exceed_the_unit() {
        let mut storage = [0u8; 64];
        let payload = compute_aligned_address(NonNull::new(storage.as_mut_ptr()).unwrap());
        assert_eq!(claimed_size(payload, 952, 32), Some(32));
        assert_eq!(claimed_size(payload, 952, 33), Some(48));
        assert_eq!(claimed_size(payload, 952, 950), Some(952));
        assert_eq!(claimed_size(payload, 1000, 1000), Some(1000));
        assert_eq!(claimed_size(payload, 952, 953), None);

        let misaligned = unsafe { payload.add(4) };
        assert_eq!(claimed_size(misaligned, 100, 88), Some(100));
        assert_eq!(claimed_size(misaligned, 100, 89), None);
    }

    #[test]
    fn allocation_splits_the_first_unit() {
        let heap = HeapAllocator::with_initial_size(&BASE, 1000).unwrap();
        let pointer = heap.allocate(32).unwrap();

        let units = heap.memory_units();
        assert_eq!(units.len(), 2);
        assert_eq!(units[0].address, pointer.as_ptr() as usize);
        assert_eq!(units[0].size, 32);
        assert!(units[0].is_allocated);
        assert!(units[0].is_next_contiguous_memory);
        assert_eq!(heap.free_units()[0].size, 1000 - 32 - HEADER_SIZE);

        unsafe { heap.release(pointer, 32).unwrap() };
        assert_eq!(heap.memory_units().len(), 1);
        assert_eq!(heap.free_units()[0].size, 1000);
    }

    #[test]
    fn small_remainders_are_not_split() {
        let heap = HeapAllocator::with_initial_size(&BASE, 64 + HEADER_SIZE).unwrap();
        let pointer = heap.allocate(64 + 1).unwrap();
        let units = heap.memory_units();
        assert_eq!(units.len(), 1);
        assert_eq!(units[0].size, 64 + HEADER_SIZE);
        assert!(heap.free_units().is_empty());
        unsafe { heap.release(pointer, 64 + 1).unwrap() };
    }

    #[test]
    fn lazy_heap_reserves_on_first_allocation() {
        let heap = HeapAllocator::with_initial_size(&BASE, 0).unwrap();
        assert_eq!(heap.reserved_block_count(), 0);
        assert!(heap.memory_units().is_empty());

        let pointer = heap.allocate(100).unwrap();
        assert_eq!(heap.reserved_block_count(), 1);
        unsafe { heap.release(pointer, 100).unwrap() };
    }

    #[test]
    fn misuse_is_reported() {
        let heap = HeapAllocator::with_initial_size(&BASE, 4096).unwrap();
        assert_eq!(heap.allocate(0), Err(MemoryError::ZeroSizedAllocation));
        assert!(matches!(
            heap.allocate(usize::MAX - 8),
            Err(MemoryError::SizeOverflow { .. })
        ));

        let a = heap.allocate(48).unwrap();
        let b = heap.allocate(48).unwrap();
        assert_eq!(
            unsafe { heap.release(a, 47) },
            Err(MemoryError::SizeMismatch { allocated: 48, released: 47 })
        );
        unsafe { heap.release(a, 48).unwrap() };
        assert!(matches!(
            unsafe { heap.release(a, 48) },
            Err(MemoryError::DoubleRelease { .. })
        ));

        let mut foreign = [0xFFu8; 64];
        let inside = unsafe { NonNull::new(foreign.as_mut_ptr()).unwrap().add(32) };
        assert!(matches!(
            unsafe { heap.release(inside, 16) },
            Err(MemoryError::ForeignPointer { .. })
        ));

        unsafe { heap.release(b, 48).unwrap() };
        assert_eq!(heap.memory_units().len(), 1);
    }

    #[test]
    fn released_neighbors_coalesce_in_either_order() {
        for reverse in [false, true] {
            let heap = HeapAllocator::with_initial_size(&BASE, 128 + HEADER_SIZE).unwrap();
            let a = heap.allocate(64).unwrap();
            let b = heap.allocate(64).unwrap();
            assert!(heap.free_units().is_empty());

            unsafe {
                if reverse {
                    heap.release(b, 64).unwrap();
                    heap.release(a, 64).unwrap();
                } else {
                    heap.release(a, 64).unwrap();
                    heap.release(b, 64).unwrap();
                }
            }
            let free = heap.free_units();
            assert_eq!(free.len(), 1);
            assert_eq!(free[0].size, 128 + HEADER_SIZE);
        }
    }

    #[cfg(debug_assertions)]
    #[test]
    fn statistics_cover_every_reserved_byte() {
        let heap = HeapAllocator::with_allocation_sizes(
            &BASE,
            HeapAllocationSizes::new(512, 512, false),
        )
        .unwrap();
        let pointers: Vec<_> = [16usize, 100, 300, 700]
            .iter()
            .map(|&size| (heap.allocate(size).unwrap(), size))
            .collect();
        assert_eq!(heap.allocation_balance(), 4);
        assert!(heap.block_count() >= 2);
        assert_eq!(heap.block_count(), heap.reserved_block_count());
        assert_eq!(heap.total_memory_size(), heap.reserved_memory_size());
        assert_eq!(
            heap.total_memory_size(),
            heap.total_header_size() + heap.used_memory_size() + heap.remaining_memory_size()
        );

        for (pointer, size) in pointers {
            unsafe { heap.release(pointer, size).unwrap() };
        }
        assert_eq!(heap.allocation_balance(), 0);
        assert_eq!(heap.used_memory_size(), 0);
        assert_eq!(
            heap.remaining_memory_size(),
            heap.total_memory_size() - heap.total_header_size()
        );
    }

    #[cfg(debug_assertions)]
    #[test]
    #[should_panic(expected = "outstanding allocations")]
    fn dropping_with_outstanding_allocations_is_fatal() {
        let heap = HeapAllocator::with_initial_size(&BASE, 256).unwrap();
        let _leaked = heap.allocate(32).unwrap();
        drop(heap);
    }
}
