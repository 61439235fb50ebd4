//! HLVM runtime values
//!
//! Raw memory side of the object model, built on the descriptors of
//! `hlvm-types`:
//! - A heap allocating zeroed, GC-headered blocks
//! - Value shapes whose first word is the type id
//! - Dynamic field access, casts and comparison by hashed name
//! - Virtual proxies, open dynamic objects, closures and enums
//! - Native primitive registration checked against signatures

#![warn(missing_docs)]
#![warn(rust_2018_idioms)]

mod macros;

pub mod closure;
pub mod dynamic;
pub mod dynobj;
pub mod enums;
pub mod error;
pub mod functions;
pub mod gc;
pub mod natives;
pub mod options;
pub mod runtime;
pub mod value;
pub mod virtuals;

pub use error::{DynCompare, HlError, HlResult, INVALID_COMPARISON};
pub use functions::{FunctionEntry, FunctionTable};
pub use gc::{Allocator, BlockKind, GcHeader, Heap, HeapStats};
pub use natives::NativeRegistry;
pub use options::RuntimeOptions;
pub use runtime::Runtime;
pub use value::{
    DynField, DynPayload, Slot, VArray, VClosure, VDynObj, VDynamic, VEnum, VVirtual, ValueRef,
    INDIRECT,
};

#[doc(hidden)]
pub use log as __log;
