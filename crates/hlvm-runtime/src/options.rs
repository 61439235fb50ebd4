//! Runtime configuration

use hlvm_types::NameTable;
use std::sync::Arc;

/// Options for creating a [`Runtime`](crate::Runtime)
#[derive(Debug, Clone)]
pub struct RuntimeOptions {
    /// Hard heap limit in bytes; exceeding it is fatal (None = unlimited)
    pub max_heap_bytes: Option<usize>,

    /// Record hash → name pairs when hashing through the runtime
    pub cache_field_names: bool,

    /// Shared reverse name table (a private one is created if None)
    pub names: Option<Arc<NameTable>>,
}

impl Default for RuntimeOptions {
    fn default() -> Self {
        Self {
            max_heap_bytes: None,
            cache_field_names: true,
            names: None,
        }
    }
}

impl RuntimeOptions {
    /// Set the heap limit
    pub fn with_max_heap_bytes(mut self, bytes: usize) -> Self {
        self.max_heap_bytes = Some(bytes);
        self
    }

    /// Enable or disable name caching
    pub fn with_cache_field_names(mut self, cache: bool) -> Self {
        self.cache_field_names = cache;
        self
    }

    /// Share an existing name table
    pub fn with_names(mut self, names: Arc<NameTable>) -> Self {
        self.names = Some(names);
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_options() {
        let options = RuntimeOptions::default();
        assert_eq!(options.max_heap_bytes, None);
        assert!(options.cache_field_names);
        assert!(options.names.is_none());
    }

    #[test]
    fn test_builder_helpers() {
        let names = Arc::new(NameTable::new());
        let options = RuntimeOptions::default()
            .with_max_heap_bytes(1 << 20)
            .with_cache_field_names(false)
            .with_names(names.clone());
        assert_eq!(options.max_heap_bytes, Some(1 << 20));
        assert!(!options.cache_field_names);
        assert!(Arc::ptr_eq(options.names.as_ref().unwrap(), &names));
    }
}
