//! Block header preceding every allocation

/// Whether a block may hold pointers the collector must scan
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum BlockKind {
    /// May contain pointers
    Pointers = 0,
    /// Opaque bytes
    NoPointers = 1,
}

/// Header stored in front of every block
#[derive(Debug)]
#[repr(C, align(16))]
pub struct GcHeader {
    size: usize,
    kind: BlockKind,
    marked: bool,
}

impl GcHeader {
    /// Create a header for a block with `size` payload bytes
    pub fn new(size: usize, kind: BlockKind) -> Self {
        Self {
            size,
            kind,
            marked: false,
        }
    }

    /// Payload size in bytes
    pub fn size(&self) -> usize {
        self.size
    }

    /// Block kind
    pub fn kind(&self) -> BlockKind {
        self.kind
    }

    /// Check if marked
    pub fn is_marked(&self) -> bool {
        self.marked
    }

    /// Set the mark bit
    pub fn mark(&mut self) {
        self.marked = true;
    }

    /// Clear the mark bit
    pub fn unmark(&mut self) {
        self.marked = false;
    }
}
