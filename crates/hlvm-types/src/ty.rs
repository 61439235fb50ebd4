//! Type descriptors
//!
//! A descriptor is a closed sum type: each kind carries exactly the payload
//! it needs, so reading the wrong payload is not expressible. Descriptors
//! refer to each other through [`TypeId`] indices into the owning
//! [`TypeRegistry`](crate::TypeRegistry) rather than through pointers.

use crate::hash::hash_name;
use crate::kind::TypeKind;
use std::fmt;

/// Index of a type descriptor in its registry
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TypeId(pub(crate) u32);

impl TypeId {
    /// `void`
    pub const VOID: TypeId = TypeId(0);
    /// `i8`
    pub const I8: TypeId = TypeId(1);
    /// `i16`
    pub const I16: TypeId = TypeId(2);
    /// `i32`
    pub const I32: TypeId = TypeId(3);
    /// `f32`
    pub const F32: TypeId = TypeId(4);
    /// `f64`
    pub const F64: TypeId = TypeId(5);
    /// `bool`
    pub const BOOL: TypeId = TypeId(6);
    /// Raw bytes
    pub const BYTES: TypeId = TypeId(7);
    /// `dynamic`
    pub const DYN: TypeId = TypeId(8);
    /// Array of `dynamic`
    pub const ARRAY: TypeId = TypeId(9);
    /// Type-of-type
    pub const TYPE: TypeId = TypeId(10);
    /// Open dynamic object
    pub const DYNOBJ: TypeId = TypeId(11);

    /// Number of ids every registry starts with
    pub const BUILTIN_COUNT: u32 = 12;

    /// Rebuild an id from its raw index (as stored in a value header)
    #[inline]
    pub const fn from_raw(raw: u32) -> Self {
        TypeId(raw)
    }

    /// Raw index
    #[inline]
    pub const fn raw(self) -> u32 {
        self.0
    }

    /// Index into the registry arena
    #[inline]
    pub const fn index(self) -> usize {
        self.0 as usize
    }
}

impl fmt::Display for TypeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "TypeId({})", self.0)
    }
}

/// Function signature: argument types and return type
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct FunType {
    /// Argument types
    pub args: Vec<TypeId>,
    /// Return type
    pub ret: TypeId,
}

impl FunType {
    /// Create a function signature
    pub fn new(args: Vec<TypeId>, ret: TypeId) -> Self {
        Self { args, ret }
    }

    /// Number of arguments
    pub fn arity(&self) -> usize {
        self.args.len()
    }
}

/// Named, typed field of an object or virtual
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ObjField {
    /// Field name (may be empty for anonymous padding fields)
    pub name: String,
    /// Field type
    pub ty: TypeId,
    /// Hash of `name`
    pub hashed_name: i32,
}

impl ObjField {
    /// Create a field, hashing its name
    pub fn new(name: impl Into<String>, ty: TypeId) -> Self {
        let name = name.into();
        let hashed_name = hash_name(&name);
        Self {
            name,
            ty,
            hashed_name,
        }
    }
}

/// Method ("proto") declared by a class
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ObjProto {
    /// Method name
    pub name: String,
    /// Index of the implementing function in the module function table
    pub findex: usize,
    /// Full function type, receiver first
    pub ty: TypeId,
    /// Hash of `name`
    pub hashed_name: i32,
}

impl ObjProto {
    /// Create a method, hashing its name
    pub fn new(name: impl Into<String>, findex: usize, ty: TypeId) -> Self {
        let name = name.into();
        let hashed_name = hash_name(&name);
        Self {
            name,
            findex,
            ty,
            hashed_name,
        }
    }
}

/// Class descriptor
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ObjType {
    /// Class name
    pub name: String,
    /// Parent class, if any
    pub super_type: Option<TypeId>,
    /// Fields declared by this class only
    pub fields: Vec<ObjField>,
    /// Methods declared by this class only
    pub protos: Vec<ObjProto>,
}

impl ObjType {
    /// Create a root class with no members
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            super_type: None,
            fields: Vec::new(),
            protos: Vec::new(),
        }
    }

    /// Set the parent class
    pub fn extends(mut self, parent: TypeId) -> Self {
        self.super_type = Some(parent);
        self
    }

    /// Append a field
    pub fn field(mut self, name: impl Into<String>, ty: TypeId) -> Self {
        self.fields.push(ObjField::new(name, ty));
        self
    }

    /// Append a method
    pub fn method(mut self, name: impl Into<String>, findex: usize, ty: TypeId) -> Self {
        self.protos.push(ObjProto::new(name, findex, ty));
        self
    }
}

/// Structural (duck-typed) descriptor
#[derive(Debug, Clone, PartialEq, Eq, Hash, Default)]
pub struct VirtualType {
    /// Required fields
    pub fields: Vec<ObjField>,
}

impl VirtualType {
    /// Create an empty virtual
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a required field
    pub fn field(mut self, name: impl Into<String>, ty: TypeId) -> Self {
        self.fields.push(ObjField::new(name, ty));
        self
    }
}

/// One construct of an enum
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct EnumConstruct {
    /// Construct name
    pub name: String,
    /// Positional parameter types
    pub params: Vec<TypeId>,
}

/// Enum descriptor
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct EnumType {
    /// Enum name
    pub name: String,
    /// Constructs in declaration order
    pub constructs: Vec<EnumConstruct>,
}

impl EnumType {
    /// Create an enum with no constructs
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            constructs: Vec::new(),
        }
    }

    /// Append a construct
    pub fn construct(mut self, name: impl Into<String>, params: Vec<TypeId>) -> Self {
        self.constructs.push(EnumConstruct {
            name: name.into(),
            params,
        });
        self
    }
}

/// A runtime type descriptor
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum HlType {
    /// `void`
    Void,
    /// `i8`
    I8,
    /// `i16`
    I16,
    /// `i32`
    I32,
    /// `f32`
    F32,
    /// `f64`
    F64,
    /// `bool`
    Bool,
    /// Raw byte buffer
    Bytes,
    /// Dynamic value
    Dyn,
    /// Function signature
    Fun(FunType),
    /// Class
    Obj(ObjType),
    /// Array with element type
    Array(TypeId),
    /// Type-of-type
    Type,
    /// Reference cell to a value of the given type
    Ref(TypeId),
    /// Structural virtual
    Virtual(VirtualType),
    /// Open dynamic object
    DynObj,
    /// Foreign handle, identified by name
    Abstract(String),
    /// Enum
    Enum(EnumType),
    /// Nullable wrapper around a value type
    Null(TypeId),
}

impl HlType {
    /// Kind tag of this descriptor
    pub fn kind(&self) -> TypeKind {
        match self {
            HlType::Void => TypeKind::Void,
            HlType::I8 => TypeKind::I8,
            HlType::I16 => TypeKind::I16,
            HlType::I32 => TypeKind::I32,
            HlType::F32 => TypeKind::F32,
            HlType::F64 => TypeKind::F64,
            HlType::Bool => TypeKind::Bool,
            HlType::Bytes => TypeKind::Bytes,
            HlType::Dyn => TypeKind::Dyn,
            HlType::Fun(_) => TypeKind::Fun,
            HlType::Obj(_) => TypeKind::Obj,
            HlType::Array(_) => TypeKind::Array,
            HlType::Type => TypeKind::Type,
            HlType::Ref(_) => TypeKind::Ref,
            HlType::Virtual(_) => TypeKind::Virtual,
            HlType::DynObj => TypeKind::DynObj,
            HlType::Abstract(_) => TypeKind::Abstract,
            HlType::Enum(_) => TypeKind::Enum,
            HlType::Null(_) => TypeKind::Null,
        }
    }

    /// Get the function signature if this is a function
    pub fn as_fun(&self) -> Option<&FunType> {
        match self {
            HlType::Fun(f) => Some(f),
            _ => None,
        }
    }

    /// Get the class descriptor if this is an object
    pub fn as_obj(&self) -> Option<&ObjType> {
        match self {
            HlType::Obj(o) => Some(o),
            _ => None,
        }
    }

    /// Get the virtual descriptor if this is a virtual
    pub fn as_virtual(&self) -> Option<&VirtualType> {
        match self {
            HlType::Virtual(v) => Some(v),
            _ => None,
        }
    }

    /// Get the enum descriptor if this is an enum
    pub fn as_enum(&self) -> Option<&EnumType> {
        match self {
            HlType::Enum(e) => Some(e),
            _ => None,
        }
    }

    /// Element / wrapped type of an array, reference or nullable
    pub fn param(&self) -> Option<TypeId> {
        match self {
            HlType::Array(t) | HlType::Ref(t) | HlType::Null(t) => Some(*t),
            _ => None,
        }
    }

    /// Type ids this descriptor refers to
    pub(crate) fn references(&self) -> Vec<TypeId> {
        match self {
            HlType::Fun(f) => {
                let mut out = f.args.clone();
                out.push(f.ret);
                out
            }
            HlType::Obj(o) => o
                .super_type
                .iter()
                .copied()
                .chain(o.fields.iter().map(|f| f.ty))
                .chain(o.protos.iter().map(|p| p.ty))
                .collect(),
            HlType::Virtual(v) => v.fields.iter().map(|f| f.ty).collect(),
            HlType::Enum(e) => e
                .constructs
                .iter()
                .flat_map(|c| c.params.iter().copied())
                .collect(),
            HlType::Array(t) | HlType::Ref(t) | HlType::Null(t) => vec![*t],
            _ => Vec::new(),
        }
    }
}
