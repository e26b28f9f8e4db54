/// Errors reported by memory allocators.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum MemoryError {
    /// A zero byte allocation was requested.
    #[error("cannot allocate a zero-sized region")]
    ZeroSizedAllocation,
    /// The aligned footprint of the request does not fit in the address space.
    #[error("allocation of {requested} bytes overflows the address space")]
    SizeOverflow {
        /// Size passed by the caller.
        requested: usize,
    },
    /// The underlying memory source could not provide a block.
    #[error("out of memory: could not obtain a block of {requested} bytes")]
    OutOfMemory {
        /// Size of the block that could not be obtained.
        requested: usize,
    },
    /// The released pointer was never handed out by this allocator.
    #[error("pointer {address:#x} was not allocated by this heap")]
    ForeignPointer {
        /// Address passed to the release call.
        address: usize,
    },
    /// The released pointer refers to memory which is already free.
    #[error("pointer {address:#x} was already released")]
    DoubleRelease {
        /// Address passed to the release call.
        address: usize,
    },
    /// The size passed to release differs from the one passed to allocate.
    #[error("released {released} bytes but {allocated} bytes were allocated")]
    SizeMismatch {
        /// Size recorded when the memory was allocated.
        allocated: usize,
        /// Size passed to the release call.
        released: usize,
    },
}
