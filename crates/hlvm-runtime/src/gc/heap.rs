//! Default heap allocator

use super::header::{BlockKind, GcHeader};
use super::Allocator;
use crate::fatal;
use parking_lot::Mutex;
use std::alloc::{alloc_zeroed, dealloc, Layout};
use std::ptr::NonNull;

const BLOCK_ALIGN: usize = 16;

/// Heap statistics
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct HeapStats {
    /// Total bytes allocated, headers included
    pub allocated_bytes: usize,
    /// Number of live blocks
    pub allocation_count: usize,
    /// Number of live blocks that may hold pointers
    pub pointer_blocks: usize,
}

struct HeapState {
    /// All allocations (pointer to GcHeader)
    allocations: Vec<NonNull<GcHeader>>,
    stats: HeapStats,
}

/// Heap allocator for runtime values
///
/// Blocks are zeroed, 16-byte aligned and freed when the heap is dropped.
pub struct Heap {
    state: Mutex<HeapState>,
    /// Maximum heap size (None = unlimited)
    max_heap_bytes: Option<usize>,
}

// SAFETY: the block pointers are owned by the heap and only touched under
// the state mutex.
unsafe impl Send for Heap {}
unsafe impl Sync for Heap {}

impl Heap {
    /// Create an unlimited heap
    pub fn new() -> Self {
        Self::with_limit(None)
    }

    /// Create a heap with a hard size limit
    pub fn with_limit(max_heap_bytes: Option<usize>) -> Self {
        Self {
            state: Mutex::new(HeapState {
                allocations: Vec::new(),
                stats: HeapStats::default(),
            }),
            max_heap_bytes,
        }
    }

    /// Maximum heap size
    pub fn max_heap_bytes(&self) -> Option<usize> {
        self.max_heap_bytes
    }

    fn block_layout(size: usize) -> Layout {
        let payload = size.max(1).div_ceil(BLOCK_ALIGN) * BLOCK_ALIGN;
        match Layout::from_size_align(std::mem::size_of::<GcHeader>() + payload, BLOCK_ALIGN) {
            Ok(layout) => layout,
            Err(_) => fatal!("Invalid allocation size {}", size),
        }
    }

    fn allocate(&self, size: usize, kind: BlockKind) -> NonNull<u8> {
        let layout = Self::block_layout(size);
        let mut state = self.state.lock();

        if let Some(max) = self.max_heap_bytes {
            if state.stats.allocated_bytes + layout.size() > max {
                fatal!("Heap size limit exceeded");
            }
        }

        let ptr = unsafe { alloc_zeroed(layout) };
        let header = match NonNull::new(ptr as *mut GcHeader) {
            Some(header) => header,
            None => fatal!("Out of memory"),
        };
        unsafe {
            header.as_ptr().write(GcHeader::new(size, kind));
        }

        state.allocations.push(header);
        state.stats.allocated_bytes += layout.size();
        state.stats.allocation_count += 1;
        if kind == BlockKind::Pointers {
            state.stats.pointer_blocks += 1;
        }
        log::trace!("[Heap] Allocated {} bytes ({:?})", size, kind);

        // SAFETY: the payload starts right after the header inside the block
        unsafe { NonNull::new_unchecked(ptr.add(std::mem::size_of::<GcHeader>())) }
    }

    /// Header of a block returned by this heap
    ///
    /// # Safety
    ///
    /// `payload` must have been returned by this heap and not yet freed.
    pub unsafe fn header_of(payload: NonNull<u8>) -> NonNull<GcHeader> {
        NonNull::new_unchecked(payload.as_ptr().sub(std::mem::size_of::<GcHeader>()) as *mut GcHeader)
    }
}

impl Allocator for Heap {
    fn alloc(&self, size: usize) -> NonNull<u8> {
        self.allocate(size, BlockKind::Pointers)
    }

    fn alloc_noptr(&self, size: usize) -> NonNull<u8> {
        self.allocate(size, BlockKind::NoPointers)
    }

    fn stats(&self) -> HeapStats {
        self.state.lock().stats
    }
}

impl Default for Heap {
    fn default() -> Self {
        Self::new()
    }
}

impl Drop for Heap {
    fn drop(&mut self) {
        let state = self.state.get_mut();
        log::debug!(
            "[Heap] Releasing {} blocks ({} bytes)",
            state.stats.allocation_count,
            state.stats.allocated_bytes
        );
        for header in state.allocations.drain(..) {
            unsafe {
                let layout = Self::block_layout(header.as_ref().size());
                dealloc(header.as_ptr() as *mut u8, layout);
            }
        }
    }
}
