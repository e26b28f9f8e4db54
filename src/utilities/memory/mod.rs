//! Memory management for the simulation.
//!
//! Everything that needs raw memory goes through the [`MemoryAllocator`] capability. The
//! [`HeapAllocator`] serves requests whose size or lifetime is too irregular for pooled storage,
//! on top of a base allocator such as [`DefaultAllocator`].

pub mod heap_allocation_sizes;
pub mod heap_allocator;
pub mod managed_id_pool;
pub mod memory_allocator;
pub mod memory_error;
pub mod memory_unit;

pub use heap_allocation_sizes::{HeapAllocationSizes, INIT_ALLOCATED_SIZE, MINIMUM_GROWTH_SIZE};
pub use heap_allocator::{compute_aligned_address, HeapAllocator};
pub use managed_id_pool::ManagedIdPool;
pub use memory_allocator::{align_up, DefaultAllocator, MemoryAllocator, GLOBAL_ALIGNMENT};
pub use memory_error::MemoryError;
pub use memory_unit::{MemoryUnitInfo, UnitIndex, HEADER_SIZE};
