//! Type registry
//!
//! Descriptors live in an arena owned by the registry and refer to each
//! other by [`TypeId`]. The registry is built once through
//! [`TypeRegistryBuilder`], validated, and then shared read-only; derived
//! layouts are memoized per descriptor on first request.

use crate::error::TypeError;
use crate::kind::{pad, TypeKind};
use crate::layout::{EnumLayout, RuntimeObject, VirtualLayout};
use crate::ty::{FunType, HlType, TypeId};
use once_cell::sync::OnceCell;
use rustc_hash::{FxHashMap, FxHashSet};
use std::fmt::Write;
use std::sync::Arc;

/// Arena slot: a descriptor plus its memoized layouts
#[derive(Debug)]
pub(crate) struct TypeEntry {
    pub(crate) ty: HlType,
    pub(crate) object: OnceCell<Arc<RuntimeObject>>,
    pub(crate) virtual_layout: OnceCell<Arc<VirtualLayout>>,
    pub(crate) enum_layout: OnceCell<Arc<EnumLayout>>,
}

impl TypeEntry {
    fn new(ty: HlType) -> Self {
        Self {
            ty,
            object: OnceCell::new(),
            virtual_layout: OnceCell::new(),
            enum_layout: OnceCell::new(),
        }
    }
}

/// Validated, immutable set of type descriptors
#[derive(Debug)]
pub struct TypeRegistry {
    pub(crate) entries: Vec<TypeEntry>,
    closure_types: FxHashMap<TypeId, TypeId>,
}

impl TypeRegistry {
    /// Create a registry builder pre-populated with the built-in types
    pub fn builder() -> TypeRegistryBuilder {
        TypeRegistryBuilder::new()
    }

    /// Get a descriptor by id
    pub fn get(&self, id: TypeId) -> Option<&HlType> {
        self.entries.get(id.index()).map(|e| &e.ty)
    }

    /// Get a descriptor, failing on unknown ids
    pub fn ty(&self, id: TypeId) -> Result<&HlType, TypeError> {
        self.get(id).ok_or(TypeError::UnknownType(id))
    }

    pub(crate) fn entry(&self, id: TypeId) -> Result<&TypeEntry, TypeError> {
        self.entries.get(id.index()).ok_or(TypeError::UnknownType(id))
    }

    /// Kind of a descriptor
    pub fn kind(&self, id: TypeId) -> Result<TypeKind, TypeError> {
        self.ty(id).map(HlType::kind)
    }

    /// Function payload of a descriptor
    pub fn fun(&self, id: TypeId) -> Result<&FunType, TypeError> {
        let ty = self.ty(id)?;
        ty.as_fun().ok_or(TypeError::WrongKind {
            expected: TypeKind::Fun,
            found: ty.kind(),
        })
    }

    /// Check if a type is registered
    pub fn contains(&self, id: TypeId) -> bool {
        id.index() < self.entries.len()
    }

    /// Get the number of registered types
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Check if the registry is empty
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Iterate over all descriptors with their ids
    pub fn iter(&self) -> impl Iterator<Item = (TypeId, &HlType)> + '_ {
        self.entries
            .iter()
            .enumerate()
            .map(|(i, e)| (TypeId(i as u32), &e.ty))
    }

    /// Signature of a function once its leading (receiver) argument is bound
    ///
    /// Defined for every function type with arguments, including the
    /// derived types themselves, so a closure can be bound repeatedly.
    pub fn closure_type(&self, fun: TypeId) -> Option<TypeId> {
        self.closure_types.get(&fun).copied()
    }

    /// Native size of a value of this type
    pub fn size_of(&self, id: TypeId) -> Result<usize, TypeError> {
        Ok(self.kind(id)?.size())
    }

    /// Align `offset` for a value of this type
    pub fn pad(&self, offset: usize, id: TypeId) -> Result<usize, TypeError> {
        Ok(pad(offset, self.kind(id)?))
    }

    /// Structural type equality
    ///
    /// Recursive graphs are compared coinductively: a pair already under
    /// comparison is assumed equal.
    pub fn same_type(&self, a: TypeId, b: TypeId) -> bool {
        let mut assumed = FxHashSet::default();
        self.same_type_rec(a, b, &mut assumed)
    }

    fn same_type_rec(
        &self,
        a: TypeId,
        b: TypeId,
        assumed: &mut FxHashSet<(TypeId, TypeId)>,
    ) -> bool {
        if a == b {
            return true;
        }
        let (ta, tb) = match (self.get(a), self.get(b)) {
            (Some(ta), Some(tb)) => (ta, tb),
            _ => return false,
        };
        if ta.kind() != tb.kind() {
            return false;
        }
        if !assumed.insert((a, b)) {
            return true;
        }
        match (ta, tb) {
            (HlType::Fun(x), HlType::Fun(y)) => {
                x.args.len() == y.args.len()
                    && x
                        .args
                        .iter()
                        .zip(&y.args)
                        .all(|(&p, &q)| self.same_type_rec(p, q, assumed))
                    && self.same_type_rec(x.ret, y.ret, assumed)
            }
            (HlType::Obj(x), HlType::Obj(y)) => {
                let supers = match (x.super_type, y.super_type) {
                    (None, None) => true,
                    (Some(p), Some(q)) => self.same_type_rec(p, q, assumed),
                    _ => false,
                };
                x.name == y.name
                    && supers
                    && x.fields.len() == y.fields.len()
                    && x.protos.len() == y.protos.len()
                    && x.fields.iter().zip(&y.fields).all(|(f, g)| {
                        f.name == g.name && self.same_type_rec(f.ty, g.ty, assumed)
                    })
                    && x
                        .protos
                        .iter()
                        .zip(&y.protos)
                        .all(|(p, q)| p.name == q.name && p.findex == q.findex)
            }
            (HlType::Virtual(x), HlType::Virtual(y)) => {
                x.fields.len() == y.fields.len()
                    && x.fields.iter().zip(&y.fields).all(|(f, g)| {
                        f.hashed_name == g.hashed_name
                            && self.same_type_rec(f.ty, g.ty, assumed)
                    })
            }
            (HlType::Enum(x), HlType::Enum(y)) => {
                x.name == y.name
                    && x.constructs.len() == y.constructs.len()
                    && x.constructs.iter().zip(&y.constructs).all(|(c, d)| {
                        c.name == d.name
                            && c.params.len() == d.params.len()
                            && c.params
                                .iter()
                                .zip(&d.params)
                                .all(|(&p, &q)| self.same_type_rec(p, q, assumed))
                    })
            }
            (HlType::Abstract(x), HlType::Abstract(y)) => x == y,
            (HlType::Array(p), HlType::Array(q))
            | (HlType::Ref(p), HlType::Ref(q))
            | (HlType::Null(p), HlType::Null(q)) => self.same_type_rec(*p, *q, assumed),
            _ => true,
        }
    }

    /// Whether `sub` is `sup` or inherits from it
    pub fn is_subclass(&self, sub: TypeId, sup: TypeId) -> bool {
        let mut current = Some(sub);
        while let Some(id) = current {
            if self.same_type(id, sup) {
                return true;
            }
            current = self
                .get(id)
                .and_then(HlType::as_obj)
                .and_then(|o| o.super_type);
        }
        false
    }

    /// Human-readable rendering of a type
    pub fn type_name(&self, id: TypeId) -> String {
        let mut out = String::new();
        self.write_type_name(&mut out, id, 0);
        out
    }

    fn write_type_name(&self, out: &mut String, id: TypeId, depth: usize) {
        let ty = match self.get(id) {
            Some(ty) => ty,
            None => {
                let _ = write!(out, "<unknown {}>", id.raw());
                return;
            }
        };
        if depth > 3 {
            out.push_str("...");
            return;
        }
        match ty {
            HlType::Obj(o) => out.push_str(&o.name),
            HlType::Enum(e) => out.push_str(&e.name),
            HlType::Abstract(name) => out.push_str(name),
            HlType::Fun(f) => {
                out.push('(');
                for (i, &arg) in f.args.iter().enumerate() {
                    if i > 0 {
                        out.push_str(", ");
                    }
                    self.write_type_name(out, arg, depth + 1);
                }
                out.push_str(") -> ");
                self.write_type_name(out, f.ret, depth + 1);
            }
            HlType::Virtual(v) => {
                out.push_str("virtual<");
                for (i, f) in v.fields.iter().enumerate() {
                    if i > 0 {
                        out.push_str(", ");
                    }
                    out.push_str(&f.name);
                    out.push(':');
                    self.write_type_name(out, f.ty, depth + 1);
                }
                out.push('>');
            }
            HlType::Array(t) | HlType::Ref(t) | HlType::Null(t) => {
                out.push_str(ty.kind().name());
                out.push('<');
                self.write_type_name(out, *t, depth + 1);
                out.push('>');
            }
            other => out.push_str(other.kind().name()),
        }
    }
}

/// Builder for [`TypeRegistry`]
///
/// `reserve` hands out an id before its descriptor exists so that recursive
/// graphs (a class with a field of its own type) can be expressed; `define`
/// fills the slot later.
#[derive(Debug)]
pub struct TypeRegistryBuilder {
    slots: Vec<Option<HlType>>,
}

impl TypeRegistryBuilder {
    /// Create a builder holding the built-in types
    pub fn new() -> Self {
        let builtins = [
            HlType::Void,
            HlType::I8,
            HlType::I16,
            HlType::I32,
            HlType::F32,
            HlType::F64,
            HlType::Bool,
            HlType::Bytes,
            HlType::Dyn,
            HlType::Array(TypeId::DYN),
            HlType::Type,
            HlType::DynObj,
        ];
        Self {
            slots: builtins.into_iter().map(Some).collect(),
        }
    }

    /// Register a descriptor
    pub fn add(&mut self, ty: HlType) -> TypeId {
        let id = TypeId(self.slots.len() as u32);
        self.slots.push(Some(ty));
        id
    }

    /// Register a function type
    pub fn fun(&mut self, args: Vec<TypeId>, ret: TypeId) -> TypeId {
        self.add(HlType::Fun(FunType::new(args, ret)))
    }

    /// Reserve an id to be defined later
    pub fn reserve(&mut self) -> TypeId {
        let id = TypeId(self.slots.len() as u32);
        self.slots.push(None);
        id
    }

    /// Define a previously reserved id
    pub fn define(&mut self, id: TypeId, ty: HlType) -> Result<(), TypeError> {
        match self.slots.get_mut(id.index()) {
            Some(slot @ None) => {
                *slot = Some(ty);
                Ok(())
            }
            Some(Some(_)) => Err(TypeError::AlreadyDefined(id)),
            None => Err(TypeError::UnknownType(id)),
        }
    }

    /// Validate and build the registry
    ///
    /// Derived closure types (function minus its first argument) are
    /// appended for every function type that takes at least one argument.
    pub fn build(self) -> Result<TypeRegistry, TypeError> {
        let mut types = Vec::with_capacity(self.slots.len());
        for (i, slot) in self.slots.into_iter().enumerate() {
            types.push(slot.ok_or(TypeError::Undefined(TypeId(i as u32)))?);
        }

        let count = types.len();
        for ty in &types {
            if let Some(bad) = ty.references().into_iter().find(|r| r.index() >= count) {
                return Err(TypeError::UnknownType(bad));
            }
        }
        check_inheritance(&types)?;

        let mut known: FxHashMap<FunType, TypeId> = FxHashMap::default();
        for (i, ty) in types.iter().enumerate() {
            if let HlType::Fun(f) = ty {
                known.entry(f.clone()).or_insert(TypeId(i as u32));
            }
        }
        // Derived types are appended and get their own closure type in turn
        let mut closure_types = FxHashMap::default();
        let mut i = 0;
        while i < types.len() {
            let derived = match &types[i] {
                HlType::Fun(f) if !f.args.is_empty() => FunType::new(f.args[1..].to_vec(), f.ret),
                _ => {
                    i += 1;
                    continue;
                }
            };
            let id = match known.get(&derived) {
                Some(&id) => id,
                None => {
                    let id = TypeId(types.len() as u32);
                    known.insert(derived.clone(), id);
                    types.push(HlType::Fun(derived));
                    id
                }
            };
            closure_types.insert(TypeId(i as u32), id);
            i += 1;
        }

        Ok(TypeRegistry {
            entries: types.into_iter().map(TypeEntry::new).collect(),
            closure_types,
        })
    }
}

impl Default for TypeRegistryBuilder {
    fn default() -> Self {
        Self::new()
    }
}

fn check_inheritance(types: &[HlType]) -> Result<(), TypeError> {
    for ty in types {
        let obj = match ty {
            HlType::Obj(o) => o,
            _ => continue,
        };
        let mut current = obj;
        let mut steps = 0;
        while let Some(sup) = current.super_type {
            current = match &types[sup.index()] {
                HlType::Obj(parent) => parent,
                other => {
                    return Err(TypeError::InvalidSuper {
                        name: current.name.clone(),
                        found: other.kind(),
                    })
                }
            };
            steps += 1;
            if steps > types.len() {
                return Err(TypeError::CyclicInheritance {
                    name: obj.name.clone(),
                });
            }
        }
    }
    Ok(())
}
