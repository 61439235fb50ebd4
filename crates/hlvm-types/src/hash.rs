//! Field name hashing and the reverse name table
//!
//! Bytecode refers to fields and methods only by the hash of their name.
//! The hash is computed over UTF-16 code units so that it matches the
//! values already embedded in compiled modules:
//!
//! ```text
//! h = 0
//! for each code unit c: h = 223 * h + c      (wrapping i32)
//! h = h % 0x1FFFFF7B                          (truncated, keeps sign)
//! ```

use parking_lot::RwLock;
use rustc_hash::FxHashMap;
use std::sync::Arc;

const HASH_MULTIPLIER: i32 = 223;
const HASH_MODULUS: i32 = 0x1FFF_FF7B;

/// Hash a sequence of UTF-16 code units
pub fn hash_utf16(units: &[u16]) -> i32 {
    let h = units.iter().fold(0i32, |h, &c| {
        h.wrapping_mul(HASH_MULTIPLIER).wrapping_add(c as i32)
    });
    h % HASH_MODULUS
}

/// Hash a field or method name
pub fn hash_name(name: &str) -> i32 {
    let h = name.encode_utf16().fold(0i32, |h, c| {
        h.wrapping_mul(HASH_MULTIPLIER).wrapping_add(c as i32)
    });
    h % HASH_MODULUS
}

/// Process-wide reverse table from name hash to name
///
/// Append-only. The first name recorded for a hash wins; a later, different
/// name with the same hash is reported and ignored.
#[derive(Debug, Default)]
pub struct NameTable {
    names: RwLock<FxHashMap<i32, Arc<str>>>,
}

impl NameTable {
    /// Create an empty table
    pub fn new() -> Self {
        Self::default()
    }

    /// Hash `name`, recording it in the table when `cache` is set
    pub fn hash(&self, name: &str, cache: bool) -> i32 {
        let h = hash_name(name);
        if cache {
            self.record(h, name);
        }
        h
    }

    /// Record `name` under its hash and return the hash
    pub fn intern(&self, name: &str) -> i32 {
        self.hash(name, true)
    }

    fn record(&self, h: i32, name: &str) {
        if let Some(existing) = self.names.read().get(&h) {
            if &**existing != name {
                log::warn!(
                    "[Names] hash collision on {}: '{}' already recorded, ignoring '{}'",
                    h,
                    existing,
                    name
                );
            }
            return;
        }
        let mut names = self.names.write();
        // Another writer may have won the race between the two locks
        names.entry(h).or_insert_with(|| Arc::from(name));
    }

    /// Recover the name recorded for a hash
    pub fn name_of(&self, h: i32) -> Option<Arc<str>> {
        self.names.read().get(&h).cloned()
    }

    /// Name for diagnostics: the recorded name, or `#<hash>` if unknown
    pub fn display_name(&self, h: i32) -> String {
        match self.name_of(h) {
            Some(name) => name.to_string(),
            None => format!("#{}", h),
        }
    }

    /// Whether a name is recorded for this hash
    pub fn contains(&self, h: i32) -> bool {
        self.names.read().contains_key(&h)
    }

    /// Number of recorded names
    pub fn len(&self) -> usize {
        self.names.read().len()
    }

    /// Check if the table is empty
    pub fn is_empty(&self) -> bool {
        self.names.read().is_empty()
    }
}
