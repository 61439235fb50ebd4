//! HLVM type metadata
//!
//! This crate describes runtime types without touching raw memory:
//! - Type kinds and native sizing/alignment rules
//! - Type descriptors stored in an arena-backed registry
//! - Field name hashing and the reverse name table
//! - Inheritance-flattened object layouts with hashed lookup
//! - Virtual and enum layouts
//! - Native primitive signature strings

#![warn(missing_docs)]
#![warn(rust_2018_idioms)]

pub mod error;
pub mod hash;
pub mod kind;
pub mod layout;
pub mod registry;
pub mod signature;
pub mod ty;

pub use error::{LayoutError, SignatureError, TypeError};
pub use hash::{hash_name, hash_utf16, NameTable};
pub use kind::{pad, pad_size, type_size, TypeKind, PTR_SIZE};
pub use layout::{
    ConstructLayout, EnumLayout, FieldLookup, LookupTable, Member, MethodEntry, RuntimeObject,
    VTable, VirtualLayout, COMPARE_METHOD, ENUM_HEADER_SIZE,
};
pub use registry::{TypeRegistry, TypeRegistryBuilder};
pub use signature::{SigType, Signature};
pub use ty::{
    EnumConstruct, EnumType, FunType, HlType, ObjField, ObjProto, ObjType, TypeId, VirtualType,
};
