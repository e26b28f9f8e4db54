//! Memory and narrow phase plumbing for a real-time physics simulation.
//!
//! [`HeapAllocator`] is the general purpose allocator of the library: a first-fit, coalescing
//! heap layered over a [`MemoryAllocator`] such as [`DefaultAllocator`]. The collision side
//! provides the [`DefaultCollisionDispatch`] table picking a narrow phase algorithm per pair of
//! shape types.
//!
//! ```
//! use rust_physics_heap::{DefaultAllocator, HeapAllocator};
//!
//! let base = DefaultAllocator::new();
//! let heap = HeapAllocator::with_initial_size(&base, 4096)?;
//! let pointer = heap.allocate(256)?;
//! unsafe { heap.release(pointer, 256)? };
//! # Ok::<(), rust_physics_heap::MemoryError>(())
//! ```

pub mod physics;
pub mod utilities;

pub use physics::collidables::CollisionShapeType;
pub use physics::collision_detection::{
    CollisionDispatch, DefaultCollisionDispatch, DispatchError, NarrowPhaseAlgorithm,
};
pub use utilities::memory::{
    DefaultAllocator, HeapAllocationSizes, HeapAllocator, MemoryAllocator, MemoryError,
};
