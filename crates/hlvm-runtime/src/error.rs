//! Runtime errors and the comparison result

use crate::value::ValueRef;
use hlvm_types::{LayoutError, SignatureError, TypeError};
use std::cmp::Ordering;
use thiserror::Error;

/// Catchable runtime exception
///
/// Raised by dynamic operations on program-observable failures. Broken
/// runtime invariants use [`fatal!`](crate::fatal) instead.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum HlError {
    /// Hashed name not present on the value
    #[error("Field not found: {name}")]
    FieldNotFound {
        /// Requested hash
        hash: i32,
        /// Name recovered from the name table, or `#<hash>`
        name: String,
    },

    /// No coercion between the two types
    #[error("Can't cast {from} to {to}")]
    InvalidCast {
        /// Source type
        from: String,
        /// Target type
        to: String,
    },

    /// Null value where one was required
    #[error("Null access")]
    NullAccess,

    /// Wrong number of arguments
    #[error("Invalid arity: expected {expected}, got {got}")]
    InvalidArity {
        /// Arguments expected
        expected: usize,
        /// Arguments supplied
        got: usize,
    },

    /// Argument type not accepted
    #[error("Argument {index}: expected {expected}, got {got}")]
    ArgumentMismatch {
        /// Argument position
        index: usize,
        /// Parameter type
        expected: String,
        /// Supplied type
        got: String,
    },

    /// Return type not accepted
    #[error("Return type mismatch: expected {expected}, got {got}")]
    ReturnMismatch {
        /// Type the call site expects
        expected: String,
        /// Type the function returns
        got: String,
    },

    /// Array length does not fit the array header or the address space
    #[error("Invalid array length {0}")]
    ArrayTooLarge(usize),

    /// Value lacks a field required by a virtual type
    #[error("Can't convert to virtual: missing field '{field}'")]
    IncompatibleVirtual {
        /// First missing field
        field: String,
    },

    /// Enum parameter read under another construct
    #[error("Enum construct {active} is active, not {requested}")]
    WrongConstruct {
        /// Construct the value holds
        active: usize,
        /// Construct the caller asked for
        requested: usize,
    },

    /// Construct index outside the enum
    #[error("Invalid enum construct {0}")]
    UnknownConstruct(usize),

    /// Native signature does not match the expected function type
    #[error("Native {name} has signature {found}, expected {expected}")]
    NativeSignature {
        /// `lib@name`
        name: String,
        /// Signature of the expected function type
        expected: String,
        /// Registered signature
        found: String,
    },

    /// Native primitive was never registered
    #[error("Native {lib}@{name} not found")]
    NativeNotFound {
        /// Library name
        lib: String,
        /// Primitive name
        name: String,
    },

    /// Type metadata error
    #[error(transparent)]
    Type(#[from] TypeError),

    /// Layout error
    #[error(transparent)]
    Layout(#[from] LayoutError),

    /// Malformed signature string
    #[error(transparent)]
    Signature(#[from] SignatureError),

    /// Exception thrown by program code, carrying its value
    #[error("Uncaught exception")]
    Thrown(ValueRef),
}

/// Runtime result
pub type HlResult<T> = Result<T, HlError>;

/// Raw value returned across the ABI when two values have no order
pub const INVALID_COMPARISON: i32 = 0xAABB_CCDDu32 as i32;

/// Result of comparing two dynamic values
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DynCompare {
    /// `a < b`
    Less,
    /// `a == b`
    Equal,
    /// `a > b`
    Greater,
    /// No defined order between the two values
    Invalid,
}

impl DynCompare {
    /// Encode as `-1/0/1` or [`INVALID_COMPARISON`]
    pub fn to_abi(self) -> i32 {
        match self {
            DynCompare::Less => -1,
            DynCompare::Equal => 0,
            DynCompare::Greater => 1,
            DynCompare::Invalid => INVALID_COMPARISON,
        }
    }

    /// Decode a raw comparison result (sign only)
    pub fn from_abi(raw: i32) -> Self {
        match raw {
            INVALID_COMPARISON => DynCompare::Invalid,
            r if r < 0 => DynCompare::Less,
            0 => DynCompare::Equal,
            _ => DynCompare::Greater,
        }
    }

    /// Ordering, if one is defined
    pub fn ordering(self) -> Option<Ordering> {
        match self {
            DynCompare::Less => Some(Ordering::Less),
            DynCompare::Equal => Some(Ordering::Equal),
            DynCompare::Greater => Some(Ordering::Greater),
            DynCompare::Invalid => None,
        }
    }
}

impl From<Ordering> for DynCompare {
    fn from(ord: Ordering) -> Self {
        match ord {
            Ordering::Less => DynCompare::Less,
            Ordering::Equal => DynCompare::Equal,
            Ordering::Greater => DynCompare::Greater,
        }
    }
}

impl From<Option<Ordering>> for DynCompare {
    fn from(ord: Option<Ordering>) -> Self {
        ord.map_or(DynCompare::Invalid, DynCompare::from)
    }
}
