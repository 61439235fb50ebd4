//! Allocation for runtime values
//!
//! Every dynamic box, object, closure, enum, virtual and open object is
//! allocated through an [`Allocator`]. The tracing collector itself lives
//! outside this crate; [`Heap`] is the default allocator and keeps every
//! block alive until it is dropped.
//!
//! # Memory Layout
//!
//! ```text
//! ┌─────────────────────────────────────────┐
//! │ GcHeader (16 bytes, 16-byte aligned)    │
//! │  - size: usize                          │
//! │  - kind: BlockKind                      │
//! │  - marked: bool                         │
//! ├─────────────────────────────────────────┤  ← returned pointer
//! │ Value data (zeroed, 16-byte aligned)    │
//! └─────────────────────────────────────────┘
//! ```

mod header;
mod heap;

pub use header::{BlockKind, GcHeader};
pub use heap::{Heap, HeapStats};

use std::ptr::NonNull;

/// Allocation entry points consumed by the runtime
///
/// Any call may trigger a collection in a tracing implementation, so raw
/// pointers into managed memory must not be cached across an allocation.
pub trait Allocator {
    /// Allocate `size` zeroed bytes that may contain pointers
    fn alloc(&self, size: usize) -> NonNull<u8>;

    /// Allocate `size` zeroed bytes the collector need not scan
    fn alloc_noptr(&self, size: usize) -> NonNull<u8>;

    /// Current statistics
    fn stats(&self) -> HeapStats;
}
