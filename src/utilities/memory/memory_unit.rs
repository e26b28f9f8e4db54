//! Memory units and the arena holding their bookkeeping.
//!
//! Every byte reserved by a [`HeapAllocator`](super::heap_allocator::HeapAllocator) belongs to
//! exactly one memory unit. A unit occupies [`HEADER_SIZE`] bytes of header followed by `size`
//! bytes of payload:
//!
//! ```text
//!            one reservation from the base allocator
//! +--------+-----------------+--------+------------+--------+----------+
//! | header |  payload (A)    | header | payload (B)| header | payload  |
//! +--------+-----------------+--------+------------+--------+----------+
//!   unit A: allocated          unit B: free          unit C: free
//! ```
//!
//! The unit records themselves do not live in the reserved memory. They are kept in an arena
//! and linked by [`UnitIndex`] into two doubly linked lists:
//! - the unit list, every unit in ascending address order;
//! - the free list, the units that are not allocated.
//!
//! The header bytes in front of an allocated payload only hold a [`UnitTag`] naming the unit, so
//! a released pointer can be traced back to its record.

use std::fmt;
use std::mem;
use std::ptr::NonNull;

use super::managed_id_pool::ManagedIdPool;
use super::memory_allocator::GLOBAL_ALIGNMENT;

/// Number of bytes reserved in front of every unit's payload.
pub const HEADER_SIZE: usize =
    (mem::size_of::<UnitTag>() + GLOBAL_ALIGNMENT - 1) & !(GLOBAL_ALIGNMENT - 1);

/// Number of bytes of the tag written right before an allocated pointer.
pub(crate) const TAG_SIZE: usize = mem::size_of::<UnitTag>();

/// Stable index of a memory unit within its arena.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct UnitIndex(u32);

impl UnitIndex {
    /// # Panics
    /// If `index` does not fit in 32 bits. Truncating it would link the wrong unit.
    #[inline(always)]
    fn new(index: usize) -> Self {
        match u32::try_from(index) {
            Ok(index) => Self(index),
            Err(_) => panic!("Memory unit index {index} exceeds the arena's 32 bit index space."),
        }
    }

    /// Gets the slot of the unit in the arena.
    #[inline(always)]
    pub fn index(self) -> usize {
        self.0 as usize
    }
}

impl fmt::Display for UnitIndex {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// In-band record written immediately before every allocated pointer.
#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct UnitTag {
    pub index: u32,
    pub generation: u64,
}

/// Outcome of tracing a tag back to the arena.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum TagResolution {
    /// The tag names a unit that currently exists.
    Live(UnitIndex),
    /// The tag names a unit that has since been merged away or recycled.
    Stale,
    /// The tag does not name any unit this arena ever created.
    Unknown,
}

/// Bookkeeping for a single memory unit.
#[derive(Debug, Clone)]
pub(crate) struct MemoryUnit {
    /// Previous unit in address order.
    pub previous_unit: Option<UnitIndex>,
    /// Next unit in address order.
    pub next_unit: Option<UnitIndex>,
    /// Previous free unit. Only meaningful while the unit is free.
    pub previous_free_unit: Option<UnitIndex>,
    /// Next free unit. Only meaningful while the unit is free.
    pub next_free_unit: Option<UnitIndex>,
    /// Payload size in bytes, header excluded.
    pub size: usize,
    /// True if the next unit was carved from the same reservation and starts right after this one.
    pub is_next_contiguous_memory: bool,
    /// True while the unit is handed out to a caller.
    pub is_allocated: bool,
    /// Start of the unit's header.
    pub address: NonNull<u8>,
    /// Size passed to allocate, kept to check the matching release.
    pub requested_size: usize,
    /// Bumped every time the arena slot is reused.
    pub generation: u64,
    /// False once the unit has been merged into a neighbor.
    pub live: bool,
}

impl MemoryUnit {
    /// Gets the first byte after the header.
    #[inline(always)]
    pub fn payload(&self) -> NonNull<u8> {
        // SAFETY: every unit spans HEADER_SIZE + size bytes of one reservation.
        unsafe { self.address.add(HEADER_SIZE) }
    }

    /// Gets the address one past the last payload byte.
    #[inline(always)]
    pub fn end_address(&self) -> usize {
        self.address.as_ptr() as usize + HEADER_SIZE + self.size
    }

    pub fn info(&self) -> MemoryUnitInfo {
        MemoryUnitInfo {
            address: self.payload().as_ptr() as usize,
            size: self.size,
            is_allocated: self.is_allocated,
            is_next_contiguous_memory: self.is_next_contiguous_memory,
        }
    }
}

/// Read-only view of a memory unit, used for inspection and diagnostics.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MemoryUnitInfo {
    /// Address of the first payload byte.
    pub address: usize,
    /// Payload size in bytes, header excluded.
    pub size: usize,
    /// True if the unit is handed out to a caller.
    pub is_allocated: bool,
    /// True if the next unit in address order belongs to the same reservation.
    pub is_next_contiguous_memory: bool,
}

/// Arena of memory units and the two lists threading through it.
pub(crate) struct MemoryUnits {
    units: Vec<MemoryUnit>,
    slots: ManagedIdPool,
    first_unit: Option<UnitIndex>,
    last_unit: Option<UnitIndex>,
    first_free_unit: Option<UnitIndex>,
    last_free_unit: Option<UnitIndex>,
    live_count: usize,
}

impl MemoryUnits {
    /// Creates an empty arena.
    pub fn new() -> Self {
        Self {
            units: Vec::new(),
            slots: ManagedIdPool::new(16),
            first_unit: None,
            last_unit: None,
            first_free_unit: None,
            last_free_unit: None,
            live_count: 0,
        }
    }

    /// Gets the number of units currently covering the reserved memory.
    #[inline(always)]
    pub fn len(&self) -> usize {
        self.live_count
    }

    #[inline(always)]
    pub fn get(&self, index: UnitIndex) -> &MemoryUnit {
        &self.units[index.index()]
    }

    #[inline(always)]
    pub fn get_mut(&mut self, index: UnitIndex) -> &mut MemoryUnit {
        &mut self.units[index.index()]
    }

    /// Gets the head of the free list, where first-fit searches start.
    #[inline(always)]
    pub fn first_free_unit(&self) -> Option<UnitIndex> {
        self.first_free_unit
    }

    /// Creates a unit record in a recycled or fresh slot. The unit is not linked anywhere.
    fn create_unit(&mut self, address: NonNull<u8>, size: usize) -> UnitIndex {
        debug_assert!(size > 0, "A memory unit must have a payload.");
        let slot = self.slots.take();
        let generation = if slot < self.units.len() {
            debug_assert!(!self.units[slot].live, "Recycled slot still holds a unit.");
            self.units[slot].generation.wrapping_add(1)
        } else {
            0
        };
        let unit = MemoryUnit {
            previous_unit: None,
            next_unit: None,
            previous_free_unit: None,
            next_free_unit: None,
            size,
            is_next_contiguous_memory: false,
            is_allocated: false,
            address,
            requested_size: 0,
            generation,
            live: true,
        };
        if slot < self.units.len() {
            self.units[slot] = unit;
        } else {
            self.units.push(unit);
        }
        self.live_count += 1;
        UnitIndex::new(slot)
    }

    fn retire_unit(&mut self, index: UnitIndex) {
        let unit = self.get_mut(index);
        unit.live = false;
        unit.previous_unit = None;
        unit.next_unit = None;
        unit.previous_free_unit = None;
        unit.next_free_unit = None;
        self.slots.return_id(index.index());
        self.live_count -= 1;
    }

    /// Creates the single unit covering a fresh reservation of `HEADER_SIZE + size` bytes
    /// starting at `address`, and links it into the unit list in address order.
    ///
    /// Units of distinct reservations are never flagged contiguous, even when the base
    /// allocator happens to return adjacent blocks.
    pub fn insert_reserved_unit(&mut self, address: NonNull<u8>, size: usize) -> UnitIndex {
        let index = self.create_unit(address, size);
        let start = address.as_ptr() as usize;

        // New reservations usually land above the previous ones, so walk back from the tail.
        let mut previous = self.last_unit;
        while let Some(candidate) = previous {
            if (self.get(candidate).address.as_ptr() as usize) < start {
                break;
            }
            previous = self.get(candidate).previous_unit;
        }
        let next = match previous {
            Some(previous) => self.get(previous).next_unit,
            None => self.first_unit,
        };
        debug_assert!(
            previous.map_or(true, |p| self.get(p).end_address() <= start),
            "A reservation overlaps a previous one."
        );
        debug_assert!(
            previous.map_or(true, |p| !self.get(p).is_next_contiguous_memory),
            "A reservation cannot land inside another reservation."
        );

        {
            let unit = self.get_mut(index);
            unit.previous_unit = previous;
            unit.next_unit = next;
        }
        match previous {
            Some(previous) => self.get_mut(previous).next_unit = Some(index),
            None => self.first_unit = Some(index),
        }
        match next {
            Some(next) => self.get_mut(next).previous_unit = Some(index),
            None => self.last_unit = Some(index),
        }
        index
    }

    /// Appends a unit to the tail of the free list.
    pub fn add_to_free_units(&mut self, index: UnitIndex) {
        debug_assert!(!self.get(index).is_allocated, "Allocated units cannot be free.");
        debug_assert!(
            self.get(index).previous_free_unit.is_none()
                && self.get(index).next_free_unit.is_none()
                && self.first_free_unit != Some(index),
            "Unit {index} is already in the free list."
        );
        let last = self.last_free_unit;
        {
            let unit = self.get_mut(index);
            unit.previous_free_unit = last;
            unit.next_free_unit = None;
        }
        match last {
            Some(last) => self.get_mut(last).next_free_unit = Some(index),
            None => self.first_free_unit = Some(index),
        }
        self.last_free_unit = Some(index);
    }

    /// Links `index` into the free list right after `anchor`, which must be free.
    fn insert_free_unit_after(&mut self, anchor: UnitIndex, index: UnitIndex) {
        let next = self.get(anchor).next_free_unit;
        {
            let unit = self.get_mut(index);
            unit.previous_free_unit = Some(anchor);
            unit.next_free_unit = next;
        }
        self.get_mut(anchor).next_free_unit = Some(index);
        match next {
            Some(next) => self.get_mut(next).previous_free_unit = Some(index),
            None => self.last_free_unit = Some(index),
        }
    }

    /// Unlinks a unit from the free list and clears its free links.
    pub fn remove_from_free_units(&mut self, index: UnitIndex) {
        let (previous, next) = {
            let unit = self.get(index);
            (unit.previous_free_unit, unit.next_free_unit)
        };
        match previous {
            Some(previous) => self.get_mut(previous).next_free_unit = next,
            None => {
                debug_assert_eq!(self.first_free_unit, Some(index), "Unit is not in the free list.");
                self.first_free_unit = next;
            }
        }
        match next {
            Some(next) => self.get_mut(next).previous_free_unit = previous,
            None => self.last_free_unit = previous,
        }
        let unit = self.get_mut(index);
        unit.previous_free_unit = None;
        unit.next_free_unit = None;
    }

    /// Splits a free unit into a head of `size` bytes and a free tail unit holding the left over
    /// space. The tail takes the head's place in the free list.
    ///
    /// Nothing is split when the left over space could not hold a header and at least one byte.
    pub fn split_memory_unit(&mut self, index: UnitIndex, size: usize) -> Option<UnitIndex> {
        let (unit_size, payload, next, is_next_contiguous) = {
            let unit = self.get(index);
            debug_assert!(!unit.is_allocated, "Only free units can be split.");
            debug_assert!(size <= unit.size);
            (unit.size, unit.payload(), unit.next_unit, unit.is_next_contiguous_memory)
        };
        if unit_size <= size + HEADER_SIZE {
            return None;
        }

        // SAFETY: `size + HEADER_SIZE < unit_size`, so the new header lies inside the payload.
        let tail_address = unsafe { payload.add(size) };
        let tail = self.create_unit(tail_address, unit_size - size - HEADER_SIZE);
        {
            let tail_unit = self.get_mut(tail);
            tail_unit.previous_unit = Some(index);
            tail_unit.next_unit = next;
            tail_unit.is_next_contiguous_memory = is_next_contiguous;
        }
        match next {
            Some(next) => self.get_mut(next).previous_unit = Some(tail),
            None => self.last_unit = Some(tail),
        }
        {
            let unit = self.get_mut(index);
            unit.size = size;
            unit.next_unit = Some(tail);
            unit.is_next_contiguous_memory = true;
        }
        self.insert_free_unit_after(index, tail);
        self.remove_from_free_units(index);
        Some(tail)
    }

    /// Merges `second` into `first`. Both must be free, address-adjacent and carved from the
    /// same reservation. `second` is removed from both lists and its slot recycled.
    pub fn merge_units(&mut self, first: UnitIndex, second: UnitIndex) {
        let (second_size, second_next, second_contiguous) = {
            let a = self.get(first);
            let b = self.get(second);
            debug_assert!(!a.is_allocated && !b.is_allocated, "Only free units can merge.");
            debug_assert_eq!(a.next_unit, Some(second), "Merged units must be neighbors.");
            debug_assert!(a.is_next_contiguous_memory, "Merged units must share a reservation.");
            debug_assert_eq!(a.end_address(), b.address.as_ptr() as usize);
            (b.size, b.next_unit, b.is_next_contiguous_memory)
        };

        self.remove_from_free_units(second);
        {
            let a = self.get_mut(first);
            a.size += HEADER_SIZE + second_size;
            a.next_unit = second_next;
            a.is_next_contiguous_memory = second_contiguous;
        }
        match second_next {
            Some(next) => self.get_mut(next).previous_unit = Some(first),
            None => self.last_unit = Some(first),
        }
        self.retire_unit(second);
    }

    /// Builds the tag identifying a unit.
    #[inline(always)]
    pub fn tag_for(&self, index: UnitIndex) -> UnitTag {
        UnitTag {
            index: index.0,
            generation: self.get(index).generation,
        }
    }

    /// Traces a tag back to the unit it names.
    pub fn resolve_tag(&self, tag: UnitTag) -> TagResolution {
        match self.units.get(tag.index as usize) {
            None => TagResolution::Unknown,
            // Generations are 64 bits wide, so a slot never cycles back to an old tag.
            Some(unit) if unit.generation == tag.generation && unit.live => {
                TagResolution::Live(UnitIndex(tag.index))
            }
            Some(_) => TagResolution::Stale,
        }
    }

    /// Iterates over the unit list in address order.
    pub fn iter_units(&self) -> impl Iterator<Item = &MemoryUnit> + '_ {
        std::iter::successors(self.first_unit, move |&index| self.get(index).next_unit)
            .take(self.live_count)
            .map(move |index| self.get(index))
    }

    /// Iterates over the free list, head first.
    pub fn iter_free_units(&self) -> impl Iterator<Item = (UnitIndex, &MemoryUnit)> + '_ {
        std::iter::successors(self.first_free_unit(), move |&index| {
            self.get(index).next_free_unit
        })
        .take(self.live_count)
        .map(move |index| (index, self.get(index)))
    }

    /// Checks every structural invariant of both lists.
    ///
    /// # Panics
    /// On any inconsistency. The lists are corrupt at that point and cannot be trusted.
    #[track_caller]
    pub fn validate(&self) {
        let mut previous: Option<UnitIndex> = None;
        let mut current = self.first_unit;
        let mut visited = 0;
        let mut free_count = 0;
        while let Some(index) = current {
            visited += 1;
            assert!(visited <= self.live_count, "Unit list contains a cycle.");
            let unit = self.get(index);
            assert!(unit.live, "Unit list links to retired unit {index}.");
            assert!(unit.size > 0, "Unit {index} has an empty payload.");
            assert_eq!(unit.previous_unit, previous, "Broken back link at unit {index}.");
            if !unit.is_allocated {
                free_count += 1;
            } else {
                assert!(
                    unit.previous_free_unit.is_none() && unit.next_free_unit.is_none(),
                    "Allocated unit {index} still has free links."
                );
            }
            if let Some(next) = unit.next_unit {
                let next_unit = self.get(next);
                let next_start = next_unit.address.as_ptr() as usize;
                if unit.is_next_contiguous_memory {
                    assert_eq!(unit.end_address(), next_start, "Gap inside a reservation at unit {index}.");
                    assert!(
                        unit.is_allocated || next_unit.is_allocated,
                        "Adjacent free units {index} and {next} were not merged."
                    );
                } else {
                    assert!(unit.end_address() <= next_start, "Units {index} and {next} overlap.");
                }
            } else {
                assert!(!unit.is_next_contiguous_memory, "Last unit {index} claims a contiguous neighbor.");
            }
            previous = current;
            current = unit.next_unit;
        }
        assert_eq!(visited, self.live_count, "Unit list does not reach every unit.");
        assert_eq!(self.last_unit, previous, "Unit list tail is stale.");

        let mut previous: Option<UnitIndex> = None;
        let mut current = self.first_free_unit;
        let mut visited = 0;
        while let Some(index) = current {
            visited += 1;
            assert!(visited <= free_count, "Free list contains a cycle or an allocated unit.");
            let unit = self.get(index);
            assert!(unit.live && !unit.is_allocated, "Free list links to unusable unit {index}.");
            assert_eq!(unit.previous_free_unit, previous, "Broken free back link at unit {index}.");
            previous = current;
            current = unit.next_free_unit;
        }
        assert_eq!(visited, free_count, "Free list does not hold every free unit.");
        assert_eq!(self.last_free_unit, previous, "Free list tail is stale.");

        assert_eq!(self.slots.claimed_id_bound(), self.units.len(), "Arena and slot pool disagree.");
        assert_eq!(
            self.live_count + self.slots.available_id_count(),
            self.units.len(),
            "Arena slots are leaked or reused twice."
        );
    }
}

impl fmt::Debug for MemoryUnits {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MemoryUnits")
            .field("units", &self.live_count)
            .field("recycled_slots", &self.slots.available_id_count())
            .field("first_unit", &self.first_unit)
            .field("first_free_unit", &self.first_free_unit)
            .finish()
    }
}
