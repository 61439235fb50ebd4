//! Type kinds and native sizing rules
//!
//! Every runtime type carries one of a closed set of kinds. The kind alone
//! decides how many bytes a value occupies inside an object, a dynamic box
//! or an enum payload, and how the offset holding it must be aligned.
//!
//! ```text
//! kind      size   align
//! void      0      -
//! i8        1      1
//! i16       2      2
//! i32       4      4
//! f32       4      4
//! f64       8      8        (even where pointers are 4 bytes)
//! bool      1      1
//! others    ptr    ptr
//! ```

use std::fmt;

/// Size of a machine pointer on the host
pub const PTR_SIZE: usize = std::mem::size_of::<usize>();

/// Kind tag of a runtime type
///
/// The discriminants are part of the bytecode format and must not change.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[repr(u8)]
pub enum TypeKind {
    /// No value
    Void = 0,
    /// 8-bit signed integer
    I8 = 1,
    /// 16-bit signed integer
    I16 = 2,
    /// 32-bit signed integer
    I32 = 3,
    /// 32-bit float
    F32 = 4,
    /// 64-bit float
    F64 = 5,
    /// Boolean
    Bool = 6,
    /// Raw byte buffer
    Bytes = 7,
    /// Dynamic value of any type
    Dyn = 8,
    /// Function / closure
    Fun = 9,
    /// Class instance
    Obj = 10,
    /// Array
    Array = 11,
    /// Type-of-type
    Type = 12,
    /// Reference cell
    Ref = 13,
    /// Structural virtual
    Virtual = 14,
    /// Open dynamic object
    DynObj = 15,
    /// Foreign abstract handle
    Abstract = 16,
    /// Enum value
    Enum = 17,
    /// Nullable wrapper
    Null = 18,
}

impl TypeKind {
    /// Number of kinds
    pub const COUNT: usize = 19;

    /// All kinds in discriminant order
    pub const ALL: [TypeKind; Self::COUNT] = [
        TypeKind::Void,
        TypeKind::I8,
        TypeKind::I16,
        TypeKind::I32,
        TypeKind::F32,
        TypeKind::F64,
        TypeKind::Bool,
        TypeKind::Bytes,
        TypeKind::Dyn,
        TypeKind::Fun,
        TypeKind::Obj,
        TypeKind::Array,
        TypeKind::Type,
        TypeKind::Ref,
        TypeKind::Virtual,
        TypeKind::DynObj,
        TypeKind::Abstract,
        TypeKind::Enum,
        TypeKind::Null,
    ];

    /// Decode a kind from its bytecode tag
    pub fn from_u8(tag: u8) -> Option<Self> {
        Self::ALL.get(tag as usize).copied()
    }

    /// Native size in bytes of a value of this kind
    pub const fn size(self) -> usize {
        match self {
            TypeKind::Void => 0,
            TypeKind::I8 | TypeKind::Bool => 1,
            TypeKind::I16 => 2,
            TypeKind::I32 | TypeKind::F32 => 4,
            TypeKind::F64 => 8,
            _ => PTR_SIZE,
        }
    }

    /// Required alignment of an offset holding a value of this kind
    pub const fn align(self) -> usize {
        match self {
            TypeKind::Void => 1,
            TypeKind::F64 => 8,
            k => {
                let sz = k.size();
                if sz < PTR_SIZE {
                    sz
                } else {
                    PTR_SIZE
                }
            }
        }
    }

    /// Whether values of this kind are stored as a pointer
    pub const fn is_ptr(self) -> bool {
        !matches!(
            self,
            TypeKind::Void
                | TypeKind::I8
                | TypeKind::I16
                | TypeKind::I32
                | TypeKind::F32
                | TypeKind::F64
                | TypeKind::Bool
        )
    }

    /// Whether this kind is one of the numeric scalars (bool included)
    pub const fn is_numeric(self) -> bool {
        matches!(
            self,
            TypeKind::I8
                | TypeKind::I16
                | TypeKind::I32
                | TypeKind::F32
                | TypeKind::F64
                | TypeKind::Bool
        )
    }

    /// Whether this kind is an integer scalar (bool included)
    pub const fn is_integer(self) -> bool {
        matches!(
            self,
            TypeKind::I8 | TypeKind::I16 | TypeKind::I32 | TypeKind::Bool
        )
    }

    /// Lowercase name used in diagnostics
    pub const fn name(self) -> &'static str {
        match self {
            TypeKind::Void => "void",
            TypeKind::I8 => "i8",
            TypeKind::I16 => "i16",
            TypeKind::I32 => "i32",
            TypeKind::F32 => "f32",
            TypeKind::F64 => "f64",
            TypeKind::Bool => "bool",
            TypeKind::Bytes => "bytes",
            TypeKind::Dyn => "dynamic",
            TypeKind::Fun => "function",
            TypeKind::Obj => "object",
            TypeKind::Array => "array",
            TypeKind::Type => "type",
            TypeKind::Ref => "ref",
            TypeKind::Virtual => "virtual",
            TypeKind::DynObj => "dynobj",
            TypeKind::Abstract => "abstract",
            TypeKind::Enum => "enum",
            TypeKind::Null => "null",
        }
    }
}

impl fmt::Display for TypeKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Native size of a value of the given kind
#[inline]
pub const fn type_size(kind: TypeKind) -> usize {
    kind.size()
}

/// Padding needed before `offset` so a value of `kind` is correctly aligned
#[inline]
pub const fn pad_size(offset: usize, kind: TypeKind) -> usize {
    let align = kind.align();
    let rem = offset & (align - 1);
    if rem == 0 {
        0
    } else {
        align - rem
    }
}

/// Round `offset` up to the alignment required by `kind`
#[inline]
pub const fn pad(offset: usize, kind: TypeKind) -> usize {
    offset + pad_size(offset, kind)
}
