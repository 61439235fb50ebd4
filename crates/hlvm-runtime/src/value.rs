//! In-memory value shapes
//!
//! Every reference value starts with its type id stored in a full machine
//! word, so generated code can read the type of any value directly. The
//! structs below are `#[repr(C)]` and their layout is part of the native
//! ABI:
//!
//! ```text
//! VDynamic   t | payload union
//! VVirtual   t | value | next | indexes | fields_data
//! VClosure   t | fun | has_value | value
//! VEnum      t | index | params...
//! VDynObj    t | lookup | fields_data | nfields | data_size | virtuals
//! VArray     t | at | size | data...
//! ```

use hlvm_types::{TypeId, TypeKind};
use std::fmt;
use std::ptr::NonNull;

/// Payload of a dynamic box
#[derive(Clone, Copy)]
#[repr(C)]
pub union DynPayload {
    /// bool
    pub b: bool,
    /// i8
    pub c: i8,
    /// i16
    pub s: i16,
    /// i32
    pub i: i32,
    /// f32
    pub f: f32,
    /// f64
    pub d: f64,
    /// Any pointer
    pub ptr: *mut u8,
}

/// Dynamic box: a type word plus a payload
#[repr(C)]
pub struct VDynamic {
    /// Type id word
    pub t: usize,
    /// Payload, interpreted according to `t`
    pub v: DynPayload,
}

/// Virtual proxy
///
/// `indexes` holds one entry per field of the virtual type:
/// `>= 0` is a byte offset from the storage base, `-(k + 1)` is method
/// slot `k` of the wrapped object, and [`INDIRECT`] means the field is
/// resolved by name on each access.
#[repr(C)]
pub struct VVirtual {
    /// Type id word (a virtual type)
    pub t: usize,
    /// Wrapped value, null for a standalone virtual
    pub value: *mut u8,
    /// Next view on the same value
    pub next: *mut VVirtual,
    /// Slot encoding per field
    pub indexes: *mut isize,
    /// Own field storage of a standalone virtual
    pub fields_data: *mut u8,
}

/// Index value of a virtual field resolved by name on each access
pub const INDIRECT: isize = isize::MIN;

/// Function value, optionally bound to a receiver
#[repr(C)]
pub struct VClosure {
    /// Type id word: the function type, receiver removed when bound
    pub t: usize,
    /// Native function address
    pub fun: usize,
    /// 1 if `value` is bound
    pub has_value: i32,
    /// Bound receiver
    pub value: *mut u8,
}

/// Enum value header; parameters follow at per-construct offsets
#[repr(C)]
pub struct VEnum {
    /// Type id word
    pub t: usize,
    /// Active construct
    pub index: i32,
}

/// Field entry of an open dynamic object
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(C)]
pub struct DynField {
    /// Hash of the field name
    pub hashed_name: i32,
    /// Raw type id of the stored value
    pub t: u32,
    /// Offset inside `fields_data`
    pub offset: u32,
}

impl DynField {
    /// Stored type
    pub fn ty(&self) -> TypeId {
        TypeId::from_raw(self.t)
    }
}

/// Open dynamic object
#[repr(C)]
pub struct VDynObj {
    /// Type id word (always the dynobj type)
    pub t: usize,
    /// Fields sorted by hash
    pub lookup: *mut DynField,
    /// Field storage
    pub fields_data: *mut u8,
    /// Number of fields
    pub nfields: i32,
    /// Bytes used in `fields_data`
    pub data_size: i32,
    /// Virtual views on this object
    pub virtuals: *mut VVirtual,
}

/// Array header; elements follow immediately
#[repr(C)]
pub struct VArray {
    /// Type id word (the array type)
    pub t: usize,
    /// Raw element type id
    pub at: usize,
    /// Number of elements
    pub size: i32,
    _pad: i32,
}

/// Non-null pointer to a runtime value whose first word is its type id
#[derive(Clone, Copy, PartialEq, Eq, Hash)]
#[repr(transparent)]
pub struct ValueRef(NonNull<u8>);

impl ValueRef {
    /// Wrap a raw pointer, `None` if null
    ///
    /// # Safety
    ///
    /// A non-null `ptr` must point to a live value allocated by the runtime
    /// that will use it, starting with a valid type id word.
    pub unsafe fn from_raw(ptr: *mut u8) -> Option<Self> {
        NonNull::new(ptr).map(ValueRef)
    }

    /// # Safety
    ///
    /// Same contract as [`ValueRef::from_raw`].
    pub(crate) unsafe fn from_non_null(ptr: NonNull<u8>) -> Self {
        ValueRef(ptr)
    }

    /// Raw pointer to the value
    #[inline]
    pub fn as_ptr(self) -> *mut u8 {
        self.0.as_ptr()
    }

    /// Type id stored in the first word
    #[inline]
    pub fn type_id(self) -> TypeId {
        // SAFETY: guaranteed by the from_raw contract
        let word = unsafe { (self.as_ptr() as *const usize).read() };
        TypeId::from_raw(word as u32)
    }

    /// Raw pointer of an optional value
    #[inline]
    pub fn raw(v: Option<ValueRef>) -> *mut u8 {
        v.map_or(std::ptr::null_mut(), ValueRef::as_ptr)
    }
}

impl fmt::Debug for ValueRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ValueRef({:p})", self.0)
    }
}

/// A typed value read from or written to a native slot
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Slot {
    /// No value
    Void,
    /// i8
    I8(i8),
    /// i16
    I16(i16),
    /// i32
    I32(i32),
    /// f32
    F32(f32),
    /// f64
    F64(f64),
    /// bool
    Bool(bool),
    /// Any pointer kind
    Ptr(*mut u8),
}

impl Slot {
    /// Read a slot holding a value of `kind`
    ///
    /// # Safety
    ///
    /// `ptr` must be valid for a read of `kind.size()` bytes.
    pub unsafe fn read(ptr: *const u8, kind: TypeKind) -> Self {
        match kind {
            TypeKind::Void => Slot::Void,
            TypeKind::I8 => Slot::I8((ptr as *const i8).read_unaligned()),
            TypeKind::I16 => Slot::I16((ptr as *const i16).read_unaligned()),
            TypeKind::I32 => Slot::I32((ptr as *const i32).read_unaligned()),
            TypeKind::F32 => Slot::F32((ptr as *const f32).read_unaligned()),
            TypeKind::F64 => Slot::F64((ptr as *const f64).read_unaligned()),
            TypeKind::Bool => Slot::Bool(ptr.read() != 0),
            _ => Slot::Ptr((ptr as *const *mut u8).read_unaligned()),
        }
    }

    /// Write this value into a slot
    ///
    /// # Safety
    ///
    /// `ptr` must be valid for a write of the value's size.
    pub unsafe fn write(self, ptr: *mut u8) {
        match self {
            Slot::Void => {}
            Slot::I8(v) => (ptr as *mut i8).write_unaligned(v),
            Slot::I16(v) => (ptr as *mut i16).write_unaligned(v),
            Slot::I32(v) => (ptr as *mut i32).write_unaligned(v),
            Slot::F32(v) => (ptr as *mut f32).write_unaligned(v),
            Slot::F64(v) => (ptr as *mut f64).write_unaligned(v),
            Slot::Bool(v) => ptr.write(v as u8),
            Slot::Ptr(v) => (ptr as *mut *mut u8).write_unaligned(v),
        }
    }

    /// Whether this slot can hold a value of `kind`
    pub fn fits(&self, kind: TypeKind) -> bool {
        matches!(
            (self, kind),
            (Slot::Void, TypeKind::Void)
                | (Slot::I8(_), TypeKind::I8)
                | (Slot::I16(_), TypeKind::I16)
                | (Slot::I32(_), TypeKind::I32)
                | (Slot::F32(_), TypeKind::F32)
                | (Slot::F64(_), TypeKind::F64)
                | (Slot::Bool(_), TypeKind::Bool)
        ) || (matches!(self, Slot::Ptr(_)) && kind.is_ptr())
    }
}

/// Whether values of this kind carry their own type word
///
/// Other pointer kinds (bytes, type, ref, abstract) are boxed in a
/// [`VDynamic`] when stored as dynamic.
pub fn is_self_describing(kind: TypeKind) -> bool {
    matches!(
        kind,
        TypeKind::Dyn
            | TypeKind::Fun
            | TypeKind::Obj
            | TypeKind::Array
            | TypeKind::Virtual
            | TypeKind::DynObj
            | TypeKind::Enum
            | TypeKind::Null
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use hlvm_types::{ENUM_HEADER_SIZE, PTR_SIZE};

    #[test]
    fn test_type_word_first() {
        assert_eq!(std::mem::offset_of!(VDynamic, t), 0);
        assert_eq!(std::mem::offset_of!(VVirtual, t), 0);
        assert_eq!(std::mem::offset_of!(VClosure, t), 0);
        assert_eq!(std::mem::offset_of!(VEnum, t), 0);
        assert_eq!(std::mem::offset_of!(VDynObj, t), 0);
        assert_eq!(std::mem::offset_of!(VArray, t), 0);
    }

    #[test]
    fn test_enum_header_matches_layout() {
        assert_eq!(std::mem::size_of::<VEnum>(), ENUM_HEADER_SIZE);
        assert_eq!(std::mem::offset_of!(VEnum, index), PTR_SIZE);
    }

    #[test]
    fn test_dynamic_payload_after_type_word() {
        assert_eq!(std::mem::size_of::<DynPayload>(), 8);
        assert!(std::mem::offset_of!(VDynamic, v) >= PTR_SIZE);
    }

    #[test]
    fn test_slot_roundtrip_in_memory() {
        let mut buf = [0u8; 16];
        let values = [
            (Slot::I8(-3), TypeKind::I8),
            (Slot::I16(-300), TypeKind::I16),
            (Slot::I32(70_000), TypeKind::I32),
            (Slot::F32(1.5), TypeKind::F32),
            (Slot::F64(-2.25), TypeKind::F64),
            (Slot::Bool(true), TypeKind::Bool),
        ];
        for (slot, kind) in values {
            unsafe {
                slot.write(buf.as_mut_ptr().add(1));
                assert_eq!(Slot::read(buf.as_ptr().add(1), kind), slot);
            }
        }
    }

    #[test]
    fn test_slot_fits() {
        assert!(Slot::I32(1).fits(TypeKind::I32));
        assert!(!Slot::I32(1).fits(TypeKind::F64));
        assert!(Slot::Ptr(std::ptr::null_mut()).fits(TypeKind::Obj));
        assert!(!Slot::Ptr(std::ptr::null_mut()).fits(TypeKind::I32));
    }

    #[test]
    fn test_value_ref_null() {
        assert!(unsafe { ValueRef::from_raw(std::ptr::null_mut()) }.is_none());
        assert!(ValueRef::raw(None).is_null());
    }
}
