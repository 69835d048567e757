//! Heap Module - Segmented Code Cache
//!
//! The code cache is split into partitions ("code heaps"), each with its own
//! capacity and a static policy for where its code may go when it is full.
//!
//! ```text
//! +-------------+----------+-----+-----+--------------+
//! | non-nmethod | profiled | hot | tmp | non-profiled |
//! +-------------+----------+-----+-----+--------------+
//!                    |        |     |          ^
//!                    +--------+-----+----------+  overflow
//! ```
//!
//! - `kind` - partition ids, descriptors and the overflow relation
//! - `registry` - active set and capacities derived from the options
//! - `code_heap` - per-partition allocators and the code cache
//! - `mapping` - anonymous memory backing each heap

pub mod code_heap;
pub mod kind;
pub mod mapping;
pub mod registry;

pub use code_heap::{CodeBlob, CodeCache, CodeHeap, HeapUsage};
pub use kind::{CodeHeapDescriptor, CodeHeapKind, ALL_KINDS};
pub use registry::{ActivePartitionSet, CodeHeapRegistry};

/// Allocation granule inside a code heap
pub const CODE_CACHE_SEGMENT_SIZE: usize = 64;

/// Alignment required for heap sizes carved out of the code cache
pub const CODE_HEAP_ALIGNMENT: usize = 64 * 1024;

/// Round down to a power-of-two alignment
pub fn align_down(value: usize, alignment: usize) -> usize {
    value & !(alignment - 1)
}

/// Round up to a power-of-two alignment
pub fn align_up(value: usize, alignment: usize) -> usize {
    (value + alignment - 1) & !(alignment - 1)
}

/// Bytes a method of `size` occupies in a code heap
pub fn padded_size(size: usize) -> usize {
    align_up(size.max(1), CODE_CACHE_SEGMENT_SIZE)
}
