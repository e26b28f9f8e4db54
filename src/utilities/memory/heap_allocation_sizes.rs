/// Payload bytes a heap reserves at construction unless told otherwise.
pub const INIT_ALLOCATED_SIZE: usize = 5 * 1024 * 1024;

/// Default lower bound of every growth reservation.
pub const MINIMUM_GROWTH_SIZE: usize = 1024 * 1024;

/// The set of reservation sizes used by a heap allocator.
#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct HeapAllocationSizes {
    /// Payload bytes reserved from the base allocator when the heap is constructed.
    ///
    /// Zero defers the first reservation until the first allocation.
    pub initial_reserved_size: usize,
    /// Minimum number of payload bytes requested whenever the heap has to grow.
    pub minimum_growth_size: usize,
    /// If true, each growth reservation is at least as large as everything reserved so far,
    /// so the number of base allocator calls stays logarithmic in the arena size.
    pub geometric_growth: bool,
}

impl HeapAllocationSizes {
    /// Constructs a description of heap reservations.
    pub fn new(initial_reserved_size: usize, minimum_growth_size: usize, geometric_growth: bool) -> Self {
        Self {
            initial_reserved_size,
            minimum_growth_size,
            geometric_growth,
        }
    }

    /// Computes the payload size of the next growth reservation for a request that needs
    /// `required` bytes, given the payload bytes already reserved.
    #[inline(always)]
    pub fn growth_size(&self, required: usize, reserved_so_far: usize) -> usize {
        let size = required.max(self.minimum_growth_size);
        if self.geometric_growth {
            size.max(reserved_so_far)
        } else {
            size
        }
    }
}

impl Default for HeapAllocationSizes {
    fn default() -> Self {
        Self {
            initial_reserved_size: INIT_ALLOCATED_SIZE,
            minimum_growth_size: MINIMUM_GROWTH_SIZE,
            geometric_growth: true,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn growth_covers_the_request() {
        let sizes = HeapAllocationSizes::new(0, 256, false);
        assert_eq!(sizes.growth_size(100, 10_000), 256);
        assert_eq!(sizes.growth_size(1000, 10_000), 1000);
    }

    #[test]
    fn geometric_growth_doubles_the_arena() {
        let sizes = HeapAllocationSizes::new(0, 256, true);
        assert_eq!(sizes.growth_size(100, 0), 256);
        assert_eq!(sizes.growth_size(100, 4096), 4096);
        assert_eq!(sizes.growth_size(8192, 4096), 8192);
    }
}
