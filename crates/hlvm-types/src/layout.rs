//! Object, virtual and enum layouts
//!
//! A [`RuntimeObject`] is the inheritance-flattened view of a class: every
//! field of every ancestor with its absolute offset, the merged method
//! table, and a lookup index sorted by name hash. It is built on first
//! request and cached on the descriptor for the lifetime of the registry.
//!
//! # Object memory layout
//!
//! ```text
//! offset 0           type id word (pointer sized)
//! offset PTR_SIZE    root class fields, each padded to its alignment
//!                    ...
//! parent.size        own fields of the class
//! ```
//!
//! # Lookup convention
//!
//! A lookup entry's `field_index` is either a stored field, `>= 0`, giving
//! the position in the cumulative field list, or a method, `-(slot + 1)`,
//! so zero always denotes the first field.

use crate::error::{LayoutError, TypeError};
use crate::kind::{pad, TypeKind, PTR_SIZE};
use crate::registry::TypeRegistry;
use crate::ty::{ObjField, TypeId};
use std::sync::Arc;

/// Name of the optional comparison hook method
pub const COMPARE_METHOD: &str = "__compare";

/// Bytes before the first enum parameter (type word + construct index)
pub const ENUM_HEADER_SIZE: usize = 2 * PTR_SIZE;

/// Entry of a hashed lookup index
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FieldLookup {
    /// Hash of the member name
    pub hashed_name: i32,
    /// Member name
    pub name: String,
    /// Field type, or the method's full function type
    pub ty: TypeId,
    /// `>= 0` field position, `< 0` method slot encoded as `-(slot + 1)`
    pub field_index: i32,
}

impl FieldLookup {
    /// Entry for a stored field
    pub fn field(field: &ObjField, index: usize) -> Self {
        Self {
            hashed_name: field.hashed_name,
            name: field.name.clone(),
            ty: field.ty,
            field_index: index as i32,
        }
    }

    /// Entry for a method slot
    pub fn method(method: &MethodEntry, slot: usize) -> Self {
        Self {
            hashed_name: method.hashed_name,
            name: method.name.clone(),
            ty: method.ty,
            field_index: -(slot as i32) - 1,
        }
    }

    /// Whether this entry names a method
    pub fn is_method(&self) -> bool {
        self.field_index < 0
    }

    /// Field position, if this is a field
    pub fn field_pos(&self) -> Option<usize> {
        usize::try_from(self.field_index).ok()
    }

    /// Method slot, if this is a method
    pub fn method_slot(&self) -> Option<usize> {
        if self.field_index < 0 {
            Some((-(self.field_index + 1)) as usize)
        } else {
            None
        }
    }
}

/// Lookup index sorted by `(hashed_name, name)`
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LookupTable {
    entries: Vec<FieldLookup>,
}

impl LookupTable {
    /// Sort entries into a lookup index
    ///
    /// The sort is stable: among entries with identical hash and name the
    /// first one given is the one found.
    pub fn new(mut entries: Vec<FieldLookup>) -> Self {
        entries.sort_by(|a, b| {
            a.hashed_name
                .cmp(&b.hashed_name)
                .then_with(|| a.name.cmp(&b.name))
        });
        Self { entries }
    }

    /// Binary search by hash
    ///
    /// On a hash collision the entry with the smallest name is returned; use
    /// [`find_named`](Self::find_named) when the name is known.
    pub fn find(&self, hashed_name: i32) -> Option<&FieldLookup> {
        let pos = self
            .entries
            .partition_point(|e| e.hashed_name < hashed_name);
        self.entries
            .get(pos)
            .filter(|e| e.hashed_name == hashed_name)
    }

    /// Binary search by hash, confirmed by name
    pub fn find_named(&self, name: &str) -> Option<&FieldLookup> {
        let h = crate::hash::hash_name(name);
        let pos = self.entries.partition_point(|e| e.hashed_name < h);
        self.entries[pos..]
            .iter()
            .take_while(|e| e.hashed_name == h)
            .find(|e| e.name == name)
    }

    /// Linear scan by hash, same result as [`find`](Self::find)
    pub fn find_linear(&self, hashed_name: i32) -> Option<&FieldLookup> {
        self.entries.iter().find(|e| e.hashed_name == hashed_name)
    }

    /// All entries in index order
    pub fn entries(&self) -> &[FieldLookup] {
        &self.entries
    }

    /// Number of entries
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Check if the index is empty
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// Resolved method slot
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MethodEntry {
    /// Method name
    pub name: String,
    /// Hash of the name
    pub hashed_name: i32,
    /// Implementing function index
    pub findex: usize,
    /// Full function type, receiver first
    pub ty: TypeId,
    /// Function type once the receiver is bound
    pub closure_ty: Option<TypeId>,
}

/// Method table indexed by slot
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct VTable {
    /// Methods (indexed by slot)
    pub methods: Vec<MethodEntry>,
}

impl VTable {
    /// Create a new empty vtable
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a method, returning its slot
    pub fn add_method(&mut self, method: MethodEntry) -> usize {
        self.methods.push(method);
        self.methods.len() - 1
    }

    /// Get method by slot
    pub fn get_method(&self, slot: usize) -> Option<&MethodEntry> {
        self.methods.get(slot)
    }

    /// Slot of a method by name
    pub fn slot_of(&self, name: &str) -> Option<usize> {
        self.methods.iter().position(|m| m.name == name)
    }

    /// Replace the method in an existing slot
    pub fn override_method(&mut self, slot: usize, method: MethodEntry) -> bool {
        match self.methods.get_mut(slot) {
            Some(existing) => {
                *existing = method;
                true
            }
            None => false,
        }
    }

    /// Get number of methods
    pub fn method_count(&self) -> usize {
        self.methods.len()
    }
}

/// What a hashed name resolves to on an object
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Member {
    /// Stored field
    Field {
        /// Position in the cumulative field list
        index: usize,
        /// Absolute byte offset from the object start
        offset: usize,
        /// Field type
        ty: TypeId,
    },
    /// Method slot
    Method {
        /// Slot in the method table
        slot: usize,
        /// Implementing function index
        findex: usize,
        /// Full function type
        ty: TypeId,
    },
}

/// Inheritance-flattened class layout
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RuntimeObject {
    /// Class type id
    pub ty: TypeId,
    /// Class name
    pub name: String,
    /// Layout of the parent class
    pub parent: Option<Arc<RuntimeObject>>,
    /// Total instance size in bytes, type word included
    pub size: usize,
    /// All fields, ancestors first
    pub fields: Vec<ObjField>,
    /// Absolute offset of each field
    pub field_offsets: Vec<usize>,
    /// Merged method table
    pub methods: VTable,
    /// Hashed index over fields and methods
    pub lookup: LookupTable,
    /// Function index of the `__compare` hook, if any
    pub compare_method: Option<usize>,
    /// Whether any field holds a pointer
    pub has_ptr: bool,
}

impl RuntimeObject {
    /// Number of fields, ancestors included
    pub fn nfields(&self) -> usize {
        self.fields.len()
    }

    /// Number of method slots
    pub fn nproto(&self) -> usize {
        self.methods.method_count()
    }

    /// Offset of field `index`
    pub fn field_offset(&self, index: usize) -> Option<usize> {
        self.field_offsets.get(index).copied()
    }

    /// Type of field `index`
    pub fn field_type(&self, index: usize) -> Option<TypeId> {
        self.fields.get(index).map(|f| f.ty)
    }

    /// Resolve a hashed name
    pub fn resolve(&self, hashed_name: i32) -> Option<Member> {
        self.member(self.lookup.find(hashed_name)?)
    }

    /// Resolve a name, confirming collisions by name
    pub fn resolve_named(&self, name: &str) -> Option<Member> {
        self.member(self.lookup.find_named(name)?)
    }

    fn member(&self, entry: &FieldLookup) -> Option<Member> {
        match entry.field_pos() {
            Some(index) => Some(Member::Field {
                index,
                offset: self.field_offsets[index],
                ty: self.fields[index].ty,
            }),
            None => {
                let slot = entry.method_slot()?;
                let method = self.methods.get_method(slot)?;
                Some(Member::Method {
                    slot,
                    findex: method.findex,
                    ty: method.ty,
                })
            }
        }
    }
}

/// Field layout of a standalone virtual value
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VirtualLayout {
    /// Virtual type id
    pub ty: TypeId,
    /// Declared fields
    pub fields: Vec<ObjField>,
    /// Offset of each field inside the virtual's own data block
    pub field_offsets: Vec<usize>,
    /// Size of the data block
    pub data_size: usize,
    /// Hashed index, `field_index` is the position in `fields`
    pub lookup: LookupTable,
}

impl VirtualLayout {
    /// Number of fields
    pub fn nfields(&self) -> usize {
        self.fields.len()
    }

    /// Position of a field by hash
    pub fn field_pos(&self, hashed_name: i32) -> Option<usize> {
        self.lookup.find(hashed_name).and_then(FieldLookup::field_pos)
    }
}

/// Parameter layout of one enum construct
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConstructLayout {
    /// Construct name
    pub name: String,
    /// Parameter types
    pub params: Vec<TypeId>,
    /// Absolute offset of each parameter from the value start
    pub offsets: Vec<usize>,
    /// Total value size for this construct
    pub size: usize,
    /// Whether any parameter holds a pointer
    pub has_ptr: bool,
}

/// Per-construct layouts of an enum
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EnumLayout {
    /// Enum type id
    pub ty: TypeId,
    /// Enum name
    pub name: String,
    /// Constructs in declaration order
    pub constructs: Vec<ConstructLayout>,
}

impl EnumLayout {
    /// Layout of construct `index`
    pub fn construct(&self, index: usize) -> Option<&ConstructLayout> {
        self.constructs.get(index)
    }
}

impl TypeRegistry {
    /// Runtime layout of a class, built on first request
    ///
    /// Concurrent first requests block on the same cell; every caller
    /// observes the same `Arc`.
    pub fn runtime_object(&self, id: TypeId) -> Result<Arc<RuntimeObject>, LayoutError> {
        let entry = self.entry(id)?;
        entry
            .object
            .get_or_try_init(|| self.compute_runtime_object(id).map(Arc::new))
            .cloned()
    }

    /// Build a class layout without consulting the cache for `id` itself
    pub fn compute_runtime_object(&self, id: TypeId) -> Result<RuntimeObject, LayoutError> {
        let ty = self.ty(id)?;
        let obj = ty.as_obj().ok_or(TypeError::WrongKind {
            expected: TypeKind::Obj,
            found: ty.kind(),
        })?;
        let parent = match obj.super_type {
            Some(sup) => Some(self.runtime_object(sup)?),
            None => None,
        };

        let (mut fields, mut field_offsets, mut size, mut methods) = match &parent {
            Some(p) => (
                p.fields.clone(),
                p.field_offsets.clone(),
                p.size,
                p.methods.clone(),
            ),
            None => (Vec::new(), Vec::new(), PTR_SIZE, VTable::new()),
        };

        for field in &obj.fields {
            if !field.name.is_empty() && fields.iter().any(|f| f.name == field.name) {
                return Err(LayoutError::DuplicateField {
                    class: obj.name.clone(),
                    field: field.name.clone(),
                });
            }
            if !field.name.is_empty() && methods.slot_of(&field.name).is_some() {
                return Err(LayoutError::MemberConflict {
                    class: obj.name.clone(),
                    member: field.name.clone(),
                });
            }
            let kind = self.kind(field.ty)?;
            let offset = pad(size, kind);
            field_offsets.push(offset);
            fields.push(field.clone());
            size = offset + kind.size();
        }

        for (i, proto) in obj.protos.iter().enumerate() {
            if obj.protos[..i].iter().any(|p| p.name == proto.name) {
                return Err(LayoutError::DuplicateMethod {
                    class: obj.name.clone(),
                    method: proto.name.clone(),
                });
            }
            if fields.iter().any(|f| f.name == proto.name) {
                return Err(LayoutError::MemberConflict {
                    class: obj.name.clone(),
                    member: proto.name.clone(),
                });
            }
            if self.fun(proto.ty).is_err() {
                return Err(LayoutError::NotAFunction {
                    class: obj.name.clone(),
                    method: proto.name.clone(),
                });
            }
            let entry = MethodEntry {
                name: proto.name.clone(),
                hashed_name: proto.hashed_name,
                findex: proto.findex,
                ty: proto.ty,
                closure_ty: self.closure_type(proto.ty),
            };
            match methods.slot_of(&proto.name) {
                Some(slot) => {
                    let inherited = methods.methods[slot].ty;
                    if !self.overrides(inherited, proto.ty) {
                        return Err(LayoutError::IncompatibleOverride {
                            class: obj.name.clone(),
                            method: proto.name.clone(),
                        });
                    }
                    methods.override_method(slot, entry);
                }
                None => {
                    methods.add_method(entry);
                }
            }
        }

        let mut entries = Vec::with_capacity(fields.len() + methods.method_count());
        for (index, field) in fields.iter().enumerate() {
            if !field.name.is_empty() {
                entries.push(FieldLookup::field(field, index));
            }
        }
        for (slot, method) in methods.methods.iter().enumerate() {
            entries.push(FieldLookup::method(method, slot));
        }

        let has_ptr = fields
            .iter()
            .any(|f| self.kind(f.ty).map(TypeKind::is_ptr).unwrap_or(false));
        let compare_method = methods
            .slot_of(COMPARE_METHOD)
            .map(|slot| methods.methods[slot].findex);

        log::debug!(
            "[Layout] Built {} ({} fields, {} methods, {} bytes)",
            obj.name,
            fields.len(),
            methods.method_count(),
            size
        );

        Ok(RuntimeObject {
            ty: id,
            name: obj.name.clone(),
            parent,
            size,
            fields,
            field_offsets,
            methods,
            lookup: LookupTable::new(entries),
            compare_method,
            has_ptr,
        })
    }

    /// Whether a method of type `child` may replace one of type `base`
    ///
    /// Receivers may differ; the remaining arguments must match and the
    /// return type must match or be a subclass.
    fn overrides(&self, base: TypeId, child: TypeId) -> bool {
        let (b, c) = match (self.fun(base), self.fun(child)) {
            (Ok(b), Ok(c)) => (b, c),
            _ => return false,
        };
        if b.args.len() != c.args.len() {
            return false;
        }
        let args_match = b
            .args
            .iter()
            .zip(&c.args)
            .skip(1)
            .all(|(&x, &y)| self.same_type(x, y));
        let ret_match = self.same_type(b.ret, c.ret)
            || (matches!(self.kind(c.ret), Ok(TypeKind::Obj)) && self.is_subclass(c.ret, b.ret));
        args_match && ret_match
    }

    /// Field layout of a virtual type, built on first request
    pub fn virtual_layout(&self, id: TypeId) -> Result<Arc<VirtualLayout>, LayoutError> {
        let entry = self.entry(id)?;
        entry
            .virtual_layout
            .get_or_try_init(|| {
                let virt = entry.ty.as_virtual().ok_or(TypeError::WrongKind {
                    expected: TypeKind::Virtual,
                    found: entry.ty.kind(),
                })?;
                let mut field_offsets = Vec::with_capacity(virt.fields.len());
                let mut entries = Vec::with_capacity(virt.fields.len());
                let mut size = 0;
                for (index, field) in virt.fields.iter().enumerate() {
                    if virt.fields[..index].iter().any(|f| f.name == field.name) {
                        return Err(LayoutError::DuplicateField {
                            class: self.type_name(id),
                            field: field.name.clone(),
                        });
                    }
                    let kind = self.kind(field.ty)?;
                    let offset = pad(size, kind);
                    field_offsets.push(offset);
                    size = offset + kind.size();
                    entries.push(FieldLookup::field(field, index));
                }
                log::debug!(
                    "[Layout] Built virtual {} ({} bytes)",
                    self.type_name(id),
                    size
                );
                Ok(Arc::new(VirtualLayout {
                    ty: id,
                    fields: virt.fields.clone(),
                    field_offsets,
                    data_size: size,
                    lookup: LookupTable::new(entries),
                }))
            })
            .cloned()
    }

    /// Per-construct parameter layouts of an enum, built on first request
    pub fn enum_layout(&self, id: TypeId) -> Result<Arc<EnumLayout>, LayoutError> {
        let entry = self.entry(id)?;
        entry
            .enum_layout
            .get_or_try_init(|| {
                let enm = entry.ty.as_enum().ok_or(TypeError::WrongKind {
                    expected: TypeKind::Enum,
                    found: entry.ty.kind(),
                })?;
                let mut constructs = Vec::with_capacity(enm.constructs.len());
                for c in &enm.constructs {
                    let mut offsets = Vec::with_capacity(c.params.len());
                    let mut size = ENUM_HEADER_SIZE;
                    let mut has_ptr = false;
                    for &param in &c.params {
                        let kind = self.kind(param)?;
                        let offset = pad(size, kind);
                        offsets.push(offset);
                        size = offset + kind.size();
                        has_ptr |= kind.is_ptr();
                    }
                    constructs.push(ConstructLayout {
                        name: c.name.clone(),
                        params: c.params.clone(),
                        offsets,
                        size,
                        has_ptr,
                    });
                }
                Ok(Arc::new(EnumLayout {
                    ty: id,
                    name: enm.name.clone(),
                    constructs,
                }))
            })
            .cloned()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::hash::hash_name;
    use crate::ty::{EnumType, HlType, ObjType, VirtualType};

    fn base_child() -> (TypeRegistry, TypeId, TypeId) {
        let mut b = TypeRegistry::builder();
        let base = b.add(HlType::Obj(ObjType::new("Base").field("x", TypeId::I32)));
        let child = b.add(HlType::Obj(
            ObjType::new("Child").extends(base).field("y", TypeId::F64),
        ));
        (b.build().unwrap(), base, child)
    }

    #[test]
    fn test_base_child_offsets() {
        let (registry, base, child) = base_child();
        let rb = registry.runtime_object(base).unwrap();
        let rc = registry.runtime_object(child).unwrap();

        assert_eq!(rb.field_offset(0), Some(PTR_SIZE));
        assert_eq!(rc.nfields(), 2);
        assert_eq!(rc.field_offsets[0], PTR_SIZE);
        assert_eq!(rc.field_offsets[1], pad(PTR_SIZE + 4, TypeKind::F64));
        assert_eq!(rc.size, rc.field_offsets[1] + 8);
        assert!(rc.size >= rb.size);
        assert_eq!(rc.parent.as_deref(), Some(&*rb));
    }

    #[test]
    fn test_resolve_by_hash() {
        let (registry, _, child) = base_child();
        let rc = registry.runtime_object(child).unwrap();
        assert_eq!(
            rc.resolve(hash_name("y")),
            Some(Member::Field {
                index: 1,
                offset: rc.field_offsets[1],
                ty: TypeId::F64
            })
        );
        assert!(rc.resolve(hash_name("z")).is_none());
    }

    #[test]
    fn test_memoized() {
        let (registry, _, child) = base_child();
        let a = registry.runtime_object(child).unwrap();
        let b = registry.runtime_object(child).unwrap();
        assert!(Arc::ptr_eq(&a, &b));
        assert_eq!(*a, registry.compute_runtime_object(child).unwrap());
    }

    #[test]
    fn test_not_an_object() {
        let registry = TypeRegistry::builder().build().unwrap();
        assert!(matches!(
            registry.runtime_object(TypeId::I32),
            Err(LayoutError::Type(TypeError::WrongKind { .. }))
        ));
    }

    #[test]
    fn test_duplicate_field_across_chain() {
        let mut b = TypeRegistry::builder();
        let base = b.add(HlType::Obj(ObjType::new("Base").field("x", TypeId::I32)));
        let child = b.add(HlType::Obj(
            ObjType::new("Child").extends(base).field("x", TypeId::F64),
        ));
        let registry = b.build().unwrap();
        assert_eq!(
            registry.runtime_object(child).unwrap_err(),
            LayoutError::DuplicateField {
                class: "Child".into(),
                field: "x".into()
            }
        );
    }

    #[test]
    fn test_anonymous_fields_not_indexed() {
        let mut b = TypeRegistry::builder();
        let id = b.add(HlType::Obj(
            ObjType::new("P")
                .field("", TypeId::I32)
                .field("", TypeId::I32)
                .field("a", TypeId::I8),
        ));
        let registry = b.build().unwrap();
        let rt = registry.runtime_object(id).unwrap();
        assert_eq!(rt.nfields(), 3);
        assert_eq!(rt.lookup.len(), 1);
        assert_eq!(rt.field_offsets[2], PTR_SIZE + 8);
    }

    #[test]
    fn test_method_override_keeps_slot() {
        let mut b = TypeRegistry::builder();
        let base = b.reserve();
        let child = b.reserve();
        let base_m = b.fun(vec![base, TypeId::I32], TypeId::I32);
        let child_m = b.fun(vec![child, TypeId::I32], TypeId::I32);
        let other = b.fun(vec![child], TypeId::VOID);
        b.define(
            base,
            HlType::Obj(ObjType::new("Base").method("get", 0, base_m)),
        )
        .unwrap();
        b.define(
            child,
            HlType::Obj(
                ObjType::new("Child")
                    .extends(base)
                    .method("other", 2, other)
                    .method("get", 1, child_m),
            ),
        )
        .unwrap();
        let registry = b.build().unwrap();

        let rc = registry.runtime_object(child).unwrap();
        assert_eq!(rc.nproto(), 2);
        assert_eq!(rc.methods.get_method(0).unwrap().findex, 1);
        assert_eq!(rc.methods.get_method(1).unwrap().findex, 2);
        assert_eq!(
            rc.resolve(hash_name("get")),
            Some(Member::Method {
                slot: 0,
                findex: 1,
                ty: child_m
            })
        );
        let entry = rc.lookup.find(hash_name("get")).unwrap();
        assert_eq!(entry.field_index, -1);
        assert_eq!(entry.method_slot(), Some(0));
    }

    #[test]
    fn test_incompatible_override() {
        let mut b = TypeRegistry::builder();
        let base = b.reserve();
        let child = b.reserve();
        let base_m = b.fun(vec![base, TypeId::I32], TypeId::I32);
        let child_m = b.fun(vec![child, TypeId::F64], TypeId::I32);
        b.define(base, HlType::Obj(ObjType::new("Base").method("get", 0, base_m)))
            .unwrap();
        b.define(
            child,
            HlType::Obj(ObjType::new("Child").extends(base).method("get", 1, child_m)),
        )
        .unwrap();
        let registry = b.build().unwrap();
        assert!(matches!(
            registry.runtime_object(child),
            Err(LayoutError::IncompatibleOverride { .. })
        ));
    }

    #[test]
    fn test_field_cannot_shadow_inherited_method() {
        let mut b = TypeRegistry::builder();
        let base = b.reserve();
        let get = b.fun(vec![base], TypeId::I32);
        b.define(base, HlType::Obj(ObjType::new("Base").method("get", 0, get)))
            .unwrap();
        let child = b.add(HlType::Obj(
            ObjType::new("Child").extends(base).field("get", TypeId::F64),
        ));
        let registry = b.build().unwrap();
        assert_eq!(
            registry.runtime_object(child),
            Err(LayoutError::MemberConflict {
                class: "Child".to_string(),
                member: "get".to_string(),
            })
        );
        assert!(registry.runtime_object(base).is_ok());
    }

    #[test]
    fn test_method_cannot_shadow_inherited_field() {
        let mut b = TypeRegistry::builder();
        let base = b.add(HlType::Obj(ObjType::new("Base").field("size", TypeId::I32)));
        let child = b.reserve();
        let size = b.fun(vec![child], TypeId::I32);
        b.define(
            child,
            HlType::Obj(ObjType::new("Child").extends(base).method("size", 0, size)),
        )
        .unwrap();
        let registry = b.build().unwrap();
        assert!(matches!(
            registry.runtime_object(child),
            Err(LayoutError::MemberConflict { ref member, .. }) if member == "size"
        ));
    }

    #[test]
    fn test_own_field_and_method_conflict() {
        let mut b = TypeRegistry::builder();
        let obj = b.reserve();
        let len = b.fun(vec![obj], TypeId::I32);
        b.define(
            obj,
            HlType::Obj(ObjType::new("C").field("len", TypeId::I32).method("len", 0, len)),
        )
        .unwrap();
        let registry = b.build().unwrap();
        assert!(matches!(
            registry.runtime_object(obj),
            Err(LayoutError::MemberConflict { .. })
        ));
    }

    #[test]
    fn test_duplicate_method_in_one_class() {
        let mut b = TypeRegistry::builder();
        let obj = b.reserve();
        let run = b.fun(vec![obj], TypeId::VOID);
        b.define(
            obj,
            HlType::Obj(ObjType::new("C").method("run", 0, run).method("run", 1, run)),
        )
        .unwrap();
        let registry = b.build().unwrap();
        assert_eq!(
            registry.runtime_object(obj),
            Err(LayoutError::DuplicateMethod {
                class: "C".to_string(),
                method: "run".to_string(),
            })
        );
    }

    #[test]
    fn test_compare_hook_recorded() {
        let mut b = TypeRegistry::builder();
        let obj = b.reserve();
        let cmp = b.fun(vec![obj, TypeId::DYN], TypeId::I32);
        b.define(obj, HlType::Obj(ObjType::new("C").method(COMPARE_METHOD, 7, cmp)))
            .unwrap();
        let registry = b.build().unwrap();
        assert_eq!(registry.runtime_object(obj).unwrap().compare_method, Some(7));
    }

    #[test]
    fn test_lookup_collision_resolved_by_name() {
        let mut b = TypeRegistry::builder();
        let id = b.add(HlType::Obj(
            ObjType::new("C")
                .field("ba", TypeId::I32)
                .field("a\u{140}", TypeId::F64),
        ));
        let registry = b.build().unwrap();
        let rt = registry.runtime_object(id).unwrap();
        assert_eq!(
            rt.resolve_named("a\u{140}"),
            Some(Member::Field {
                index: 1,
                offset: rt.field_offsets[1],
                ty: TypeId::F64
            })
        );
        assert!(matches!(
            rt.resolve_named("ba"),
            Some(Member::Field { index: 0, .. })
        ));
    }

    #[test]
    fn test_virtual_layout() {
        let mut b = TypeRegistry::builder();
        let v = b.add(HlType::Virtual(
            VirtualType::new()
                .field("flag", TypeId::BOOL)
                .field("value", TypeId::F64)
                .field("obj", TypeId::DYN),
        ));
        let registry = b.build().unwrap();
        let layout = registry.virtual_layout(v).unwrap();
        assert_eq!(layout.field_offsets[0], 0);
        assert_eq!(layout.field_offsets[1], 8);
        assert_eq!(layout.field_offsets[2], 16);
        assert_eq!(layout.data_size, 16 + PTR_SIZE);
        assert_eq!(layout.field_pos(hash_name("obj")), Some(2));
    }

    #[test]
    fn test_enum_layout() {
        let mut b = TypeRegistry::builder();
        let e = b.add(HlType::Enum(
            EnumType::new("Shape")
                .construct("Empty", vec![])
                .construct("Circle", vec![TypeId::F64])
                .construct("Tagged", vec![TypeId::I8, TypeId::DYN]),
        ));
        let registry = b.build().unwrap();
        let layout = registry.enum_layout(e).unwrap();

        let empty = layout.construct(0).unwrap();
        assert_eq!(empty.size, ENUM_HEADER_SIZE);
        assert!(!empty.has_ptr);

        let circle = layout.construct(1).unwrap();
        assert_eq!(circle.offsets, vec![pad(ENUM_HEADER_SIZE, TypeKind::F64)]);

        let tagged = layout.construct(2).unwrap();
        assert_eq!(tagged.offsets[0], ENUM_HEADER_SIZE);
        assert_eq!(tagged.offsets[1], ENUM_HEADER_SIZE + PTR_SIZE);
        assert!(tagged.has_ptr);
        assert!(layout.construct(3).is_none());
    }
}
