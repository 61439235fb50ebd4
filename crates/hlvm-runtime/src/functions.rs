//! Module function table
//!
//! Maps the function indices used by class methods to native addresses
//! and their function types.

use hlvm_types::TypeId;

/// Native function address with its type
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FunctionEntry {
    /// Native address
    pub addr: usize,
    /// Function type
    pub ty: TypeId,
}

/// Function table indexed by function index
#[derive(Debug, Clone, Default)]
pub struct FunctionTable {
    entries: Vec<Option<FunctionEntry>>,
}

impl FunctionTable {
    /// Create an empty table
    pub fn new() -> Self {
        Self::default()
    }

    /// Bind function `findex`, replacing any previous binding
    pub fn define(&mut self, findex: usize, addr: usize, ty: TypeId) {
        if findex >= self.entries.len() {
            self.entries.resize(findex + 1, None);
        }
        self.entries[findex] = Some(FunctionEntry { addr, ty });
    }

    /// Get the binding of function `findex`
    pub fn get(&self, findex: usize) -> Option<FunctionEntry> {
        self.entries.get(findex).copied().flatten()
    }

    /// Address of function `findex`
    pub fn addr(&self, findex: usize) -> Option<usize> {
        self.get(findex).map(|e| e.addr)
    }

    /// Number of slots, bound or not
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Check if the table is empty
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_define_and_get() {
        let mut table = FunctionTable::new();
        table.define(3, 0x1000, TypeId::DYN);
        assert_eq!(table.len(), 4);
        assert_eq!(table.get(0), None);
        assert_eq!(table.addr(3), Some(0x1000));
        table.define(3, 0x2000, TypeId::DYN);
        assert_eq!(table.addr(3), Some(0x2000));
        assert_eq!(table.get(10), None);
    }
}
