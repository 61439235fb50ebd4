//! Native primitive registration
//!
//! Primitives are registered under `(lib, name)` with a signature string.
//! A loader resolves them against the function type it declared, so a
//! mismatched native is rejected before it is ever called.

use crate::error::{HlError, HlResult};
use crate::runtime::Runtime;
use hlvm_types::{Signature, TypeId, TypeRegistry};
use parking_lot::Mutex;
use rustc_hash::FxHashMap;

#[derive(Debug, Clone)]
struct NativeEntry {
    signature: Signature,
    addr: usize,
}

/// Registry of native primitives
#[derive(Debug, Default)]
pub struct NativeRegistry {
    entries: Mutex<FxHashMap<(String, String), NativeEntry>>,
}

impl NativeRegistry {
    /// Create an empty registry
    pub fn new() -> Self {
        Self::default()
    }

    /// Register `lib@name` at `addr` with signature string `sig`
    ///
    /// A later registration under the same name replaces the earlier one.
    pub fn register(&self, lib: &str, name: &str, sig: &str, addr: usize) -> HlResult<()> {
        let signature = Signature::parse(sig)?;
        log::debug!("[Natives] Registered {}@{} {}", lib, name, signature);
        self.entries
            .lock()
            .insert((lib.to_string(), name.to_string()), NativeEntry { signature, addr });
        Ok(())
    }

    /// Address of `lib@name`, checked against the function type `fun`
    pub fn resolve(
        &self,
        registry: &TypeRegistry,
        lib: &str,
        name: &str,
        fun: TypeId,
    ) -> HlResult<usize> {
        let expected = Signature::of(registry, fun)?;
        let entries = self.entries.lock();
        let entry = entries
            .get(&(lib.to_string(), name.to_string()))
            .ok_or_else(|| HlError::NativeNotFound {
                lib: lib.to_string(),
                name: name.to_string(),
            })?;
        if entry.signature != expected {
            return Err(HlError::NativeSignature {
                name: format!("{}@{}", lib, name),
                expected: expected.to_string(),
                found: entry.signature.to_string(),
            });
        }
        Ok(entry.addr)
    }

    /// Number of registered primitives
    pub fn len(&self) -> usize {
        self.entries.lock().len()
    }

    /// Check if no primitive is registered
    pub fn is_empty(&self) -> bool {
        self.entries.lock().is_empty()
    }
}

impl Runtime {
    /// Resolve a native primitive against a function type of this
    /// runtime's registry
    pub fn resolve_native(&self, lib: &str, name: &str, fun: TypeId) -> HlResult<usize> {
        self.natives().resolve(self.registry(), lib, name, fun)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use hlvm_types::{HlType, ObjType, SignatureError};

    #[test]
    fn test_register_and_resolve() {
        let mut b = TypeRegistry::builder();
        let fun = b.fun(vec![TypeId::I32, TypeId::DYN], TypeId::F64);
        let registry = b.build().unwrap();

        let natives = NativeRegistry::new();
        natives.register("std", "mix", "PiX_d", 0x4000).unwrap();
        assert_eq!(natives.len(), 1);
        assert_eq!(natives.resolve(&registry, "std", "mix", fun), Ok(0x4000));
    }

    #[test]
    fn test_object_argument_encodes_as_o() {
        let mut b = TypeRegistry::builder();
        let obj = b.add(HlType::Obj(ObjType::new("File")));
        let fun = b.fun(vec![obj], TypeId::BOOL);
        let registry = b.build().unwrap();

        let natives = NativeRegistry::new();
        natives.register("sys", "close", "PO_b", 1).unwrap();
        assert_eq!(natives.resolve(&registry, "sys", "close", fun), Ok(1));
    }

    #[test]
    fn test_signature_mismatch() {
        let mut b = TypeRegistry::builder();
        let fun = b.fun(vec![TypeId::I32], TypeId::VOID);
        let registry = b.build().unwrap();

        let natives = NativeRegistry::new();
        natives.register("std", "f", "Pd_v", 1).unwrap();
        assert_eq!(
            natives.resolve(&registry, "std", "f", fun),
            Err(HlError::NativeSignature {
                name: "std@f".to_string(),
                expected: "Pi_v".to_string(),
                found: "Pd_v".to_string(),
            })
        );
    }

    #[test]
    fn test_not_found_and_malformed() {
        let registry = TypeRegistry::builder().build().unwrap();
        let natives = NativeRegistry::new();
        assert!(matches!(
            natives.resolve(&registry, "std", "nope", TypeId::VOID),
            Err(HlError::Type(_))
        ));
        assert_eq!(
            natives.register("std", "bad", "Pi", 1),
            Err(HlError::Signature(SignatureError::UnexpectedEnd))
        );
        assert!(natives.is_empty());
    }
}
