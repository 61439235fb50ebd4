//! Dynamic field access, casts and comparison
//!
//! Fields are addressed by name hash and resolved through the value's
//! layout. Values move between slot types through one coercion table:
//!
//! - numeric kinds (i8, i16, i32, f32, f64, bool) convert among each
//!   other; float to int truncates toward zero, any nonzero value is true
//! - dynamic and nullable slots unbox to numeric; null reads as zero
//! - numeric values box into dynamic and nullable slots
//! - pointers pass through on structural equality, class upcast or
//!   checked downcast, anything to dynamic, and anything with fields to a
//!   virtual (by wrapping)
//!
//! Every other pair is an [`HlError::InvalidCast`].

use crate::error::{DynCompare, HlError, HlResult};
use crate::runtime::Runtime;
use crate::value::{is_self_describing, Slot, VDynObj, VDynamic, VVirtual, ValueRef};
use hlvm_types::{HlType, Member, TypeId, TypeKind};

/// Where a hashed name resolved to
pub(crate) enum FieldRef {
    /// Storage of the given type
    Slot { addr: *mut u8, ty: TypeId },
    /// Method bound on access
    Method {
        findex: usize,
        ty: TypeId,
        receiver: ValueRef,
    },
    /// Resolve again on another value
    Forward(ValueRef),
}

#[derive(Debug, Clone, Copy)]
enum Num {
    Int(i32),
    F32(f32),
    F64(f64),
}

impl Num {
    fn from_slot(slot: Slot) -> Option<Self> {
        match slot {
            Slot::I8(v) => Some(Num::Int(v as i32)),
            Slot::I16(v) => Some(Num::Int(v as i32)),
            Slot::I32(v) => Some(Num::Int(v)),
            Slot::Bool(v) => Some(Num::Int(v as i32)),
            Slot::F32(v) => Some(Num::F32(v)),
            Slot::F64(v) => Some(Num::F64(v)),
            Slot::Void | Slot::Ptr(_) => None,
        }
    }

    fn as_i32(self) -> i32 {
        match self {
            Num::Int(v) => v,
            Num::F32(v) => v as i32,
            Num::F64(v) => v as i32,
        }
    }

    fn as_f32(self) -> f32 {
        match self {
            Num::Int(v) => v as f32,
            Num::F32(v) => v,
            Num::F64(v) => v as f32,
        }
    }

    fn as_f64(self) -> f64 {
        match self {
            Num::Int(v) => v as f64,
            Num::F32(v) => v as f64,
            Num::F64(v) => v,
        }
    }

    fn is_true(self) -> bool {
        match self {
            Num::Int(v) => v != 0,
            Num::F32(v) => v != 0.0,
            Num::F64(v) => v != 0.0,
        }
    }

    /// Convert to a slot of a numeric kind
    fn to_slot(self, kind: TypeKind) -> Option<Slot> {
        Some(match kind {
            TypeKind::I8 => Slot::I8(self.as_i32() as i8),
            TypeKind::I16 => Slot::I16(self.as_i32() as i16),
            TypeKind::I32 => Slot::I32(self.as_i32()),
            TypeKind::Bool => Slot::Bool(self.is_true()),
            TypeKind::F32 => Slot::F32(self.as_f32()),
            TypeKind::F64 => Slot::F64(self.as_f64()),
            _ => return None,
        })
    }
}

impl Runtime {
    // ===== Casts =====

    unsafe fn read_num(&self, data: *const u8, from: TypeId, to: TypeId) -> HlResult<Num> {
        let kind = self.kind(from)?;
        if kind.is_numeric() {
            if let Some(n) = Num::from_slot(Slot::read(data, kind)) {
                return Ok(n);
            }
        }
        match kind {
            TypeKind::Dyn | TypeKind::Null => {
                let p = (data as *const *mut u8).read_unaligned();
                match ValueRef::from_raw(p) {
                    None => Ok(Num::Int(0)),
                    Some(v) => {
                        let (slot, t) = self.unbox(v)?;
                        Num::from_slot(slot).ok_or_else(|| self.invalid_cast(t, to))
                    }
                }
            }
            _ => Err(self.invalid_cast(from, to)),
        }
    }

    /// Convert the value in `data` of type `from` to an integer kind `to`
    ///
    /// `to` is one of i8, i16, i32 or bool; the result is narrowed to it.
    ///
    /// # Safety
    ///
    /// `data` must point to a readable slot holding a value of type `from`.
    pub unsafe fn cast_i32(&self, data: *const u8, from: TypeId, to: TypeId) -> HlResult<i32> {
        let n = self.read_num(data, from, to)?;
        match n.to_slot(self.kind(to)?) {
            Some(Slot::I8(v)) => Ok(v as i32),
            Some(Slot::I16(v)) => Ok(v as i32),
            Some(Slot::I32(v)) => Ok(v),
            Some(Slot::Bool(v)) => Ok(v as i32),
            _ => Err(self.invalid_cast(from, to)),
        }
    }

    /// Convert the value in `data` of type `from` to `f32`
    ///
    /// # Safety
    ///
    /// `data` must point to a readable slot holding a value of type `from`.
    pub unsafe fn cast_f32(&self, data: *const u8, from: TypeId) -> HlResult<f32> {
        Ok(self.read_num(data, from, TypeId::F32)?.as_f32())
    }

    /// Convert the value in `data` of type `from` to `f64`
    ///
    /// # Safety
    ///
    /// `data` must point to a readable slot holding a value of type `from`.
    pub unsafe fn cast_f64(&self, data: *const u8, from: TypeId) -> HlResult<f64> {
        Ok(self.read_num(data, from, TypeId::F64)?.as_f64())
    }

    /// Convert the value in `data` of type `from` to a pointer of type `to`
    ///
    /// May allocate (boxing, virtual wrapping).
    ///
    /// # Safety
    ///
    /// `data` must point to a readable slot holding a value of type `from`.
    pub unsafe fn cast_ptr(&self, data: *const u8, from: TypeId, to: TypeId) -> HlResult<*mut u8> {
        let from_kind = self.kind(from)?;
        let to_kind = self.kind(to)?;
        if from_kind == TypeKind::Void {
            return Ok(std::ptr::null_mut());
        }
        if from_kind.is_numeric() {
            let slot = Slot::read(data, from_kind);
            return match to_kind {
                TypeKind::Dyn => Ok(ValueRef::raw(self.make_dyn(slot, from)?)),
                TypeKind::Null => self.box_as(slot, from, to),
                _ => Err(self.invalid_cast(from, to)),
            };
        }

        let p = (data as *const *mut u8).read_unaligned();
        if p.is_null() || self.registry().same_type(from, to) {
            return Ok(p);
        }
        if to_kind == TypeKind::Dyn {
            return if is_self_describing(from_kind) {
                Ok(p)
            } else {
                Ok(ValueRef::raw(self.make_dyn(Slot::Ptr(p), from)?))
            };
        }

        // Actual type and storage of the value behind the pointer
        let (raw, actual) = if is_self_describing(from_kind) {
            let v = ValueRef::from_non_null(std::ptr::NonNull::new_unchecked(p));
            let t = v.type_id();
            let k = self.kind(t)?;
            if k.is_ptr() && !is_self_describing(k) {
                (self.unbox_ptr(v), t)
            } else {
                (p, t)
            }
        } else {
            (p, from)
        };
        let actual_kind = self.kind(actual)?;

        let ok = match to_kind {
            TypeKind::Obj => {
                actual_kind == TypeKind::Obj && self.registry().is_subclass(actual, to)
            }
            TypeKind::Virtual => {
                if matches!(
                    actual_kind,
                    TypeKind::Obj | TypeKind::DynObj | TypeKind::Virtual
                ) {
                    let v = ValueRef::from_non_null(std::ptr::NonNull::new_unchecked(raw));
                    return Ok(self.to_virtual(to, v)?.as_ptr());
                }
                false
            }
            TypeKind::Null if actual_kind.is_numeric() => {
                let v = ValueRef::from_non_null(std::ptr::NonNull::new_unchecked(raw));
                let (slot, _) = self.unbox(v)?;
                return self.box_as(slot, actual, to);
            }
            TypeKind::Array => actual_kind == TypeKind::Array,
            _ => self.registry().same_type(actual, to),
        };
        if ok {
            Ok(raw)
        } else {
            Err(self.invalid_cast(actual, to))
        }
    }

    /// Box a numeric slot of type `from` for a nullable type `to`
    fn box_as(&self, slot: Slot, from: TypeId, to: TypeId) -> HlResult<*mut u8> {
        let inner = match self.registry().ty(to)? {
            HlType::Null(inner) => *inner,
            _ => return Err(self.invalid_cast(from, to)),
        };
        let converted = Num::from_slot(slot)
            .and_then(|n| n.to_slot(self.registry().kind(inner).ok()?))
            .ok_or_else(|| self.invalid_cast(from, to))?;
        Ok(ValueRef::raw(self.make_dyn(converted, inner)?))
    }

    unsafe fn unbox_ptr(&self, v: ValueRef) -> *mut u8 {
        (*(v.as_ptr() as *const VDynamic)).v.ptr
    }

    /// Convert a value between two slots
    ///
    /// # Safety
    ///
    /// `src` must hold a value of type `from`; `dst` must be writable for
    /// a value of type `to`.
    pub(crate) unsafe fn convert(
        &self,
        src: *const u8,
        from: TypeId,
        dst: *mut u8,
        to: TypeId,
    ) -> HlResult<()> {
        let kind = self.kind(to)?;
        let out = match kind {
            TypeKind::Void => Slot::Void,
            TypeKind::I8 | TypeKind::I16 | TypeKind::I32 | TypeKind::Bool => {
                let v = self.cast_i32(src, from, to)?;
                Num::Int(v).to_slot(kind).unwrap_or(Slot::Void)
            }
            TypeKind::F32 => Slot::F32(self.cast_f32(src, from)?),
            TypeKind::F64 => Slot::F64(self.cast_f64(src, from)?),
            _ => Slot::Ptr(self.cast_ptr(src, from, to)?),
        };
        out.write(dst);
        Ok(())
    }

    /// Convert a slot value of type `from` into a slot of type `to`
    pub fn cast_slot(&self, slot: Slot, from: TypeId, to: TypeId) -> HlResult<Slot> {
        if !slot.fits(self.kind(from)?) {
            return Err(self.invalid_cast(from, to));
        }
        let mut src: u64 = 0;
        let mut dst: u64 = 0;
        unsafe {
            let src_ptr = &mut src as *mut u64 as *mut u8;
            slot.write(src_ptr);
            self.convert(src_ptr, from, &mut dst as *mut u64 as *mut u8, to)?;
            Ok(Slot::read(&dst as *const u64 as *const u8, self.kind(to)?))
        }
    }

    // ===== Field access =====

    /// Resolve a hashed name on a value
    pub(crate) fn locate(&self, v: ValueRef, hfield: i32) -> HlResult<FieldRef> {
        let t = v.type_id();
        match self.kind(t)? {
            TypeKind::Obj => {
                let rt = self.registry().runtime_object(t)?;
                match rt.resolve(hfield) {
                    Some(Member::Field { offset, ty, .. }) => Ok(FieldRef::Slot {
                        addr: unsafe { v.as_ptr().add(offset) },
                        ty,
                    }),
                    Some(Member::Method { findex, ty, .. }) => Ok(FieldRef::Method {
                        findex,
                        ty,
                        receiver: v,
                    }),
                    None => Err(self.field_not_found(hfield)),
                }
            }
            TypeKind::DynObj => match self.dynobj_find(v, hfield) {
                Some((_, f)) => Ok(FieldRef::Slot {
                    addr: unsafe {
                        (*(v.as_ptr() as *mut VDynObj))
                            .fields_data
                            .add(f.offset as usize)
                    },
                    ty: f.ty(),
                }),
                None => Err(self.field_not_found(hfield)),
            },
            TypeKind::Virtual => self.virtual_locate(v, hfield),
            _ => Err(self.field_not_found(hfield)),
        }
    }

    /// Read a field, converted to type `t`
    pub fn dyn_get(&self, v: ValueRef, hfield: i32, t: TypeId) -> HlResult<Slot> {
        let mut v = v;
        loop {
            match self.locate(v, hfield)? {
                FieldRef::Slot { addr, ty } => {
                    let mut out: u64 = 0;
                    let out_ptr = &mut out as *mut u64 as *mut u8;
                    unsafe {
                        self.convert(addr, ty, out_ptr, t)?;
                        return Ok(Slot::read(out_ptr, self.kind(t)?));
                    }
                }
                FieldRef::Method {
                    findex,
                    ty,
                    receiver,
                } => {
                    if !self.kind(t)?.is_ptr() {
                        return Err(self.invalid_cast(ty, t));
                    }
                    let closure = self.method_closure(findex, ty, receiver)?;
                    let p = closure.as_ptr();
                    let ptr = unsafe {
                        self.cast_ptr(&p as *const *mut u8 as *const u8, closure.type_id(), t)?
                    };
                    return Ok(Slot::Ptr(ptr));
                }
                FieldRef::Forward(w) => v = w,
            }
        }
    }

    /// Write a field from a slot value of type `t`
    ///
    /// On an open dynamic object a missing field is added and a field of
    /// another type is remapped to `t`.
    pub fn dyn_set(&self, v: ValueRef, hfield: i32, t: TypeId, value: Slot) -> HlResult<()> {
        if !value.fits(self.kind(t)?) {
            return Err(self.invalid_cast(t, t));
        }
        let mut v = v;
        loop {
            if self.kind(v.type_id())? == TypeKind::DynObj {
                return self.dynobj_set(v, hfield, t, value);
            }
            match self.locate(v, hfield)? {
                FieldRef::Slot { addr, ty } => {
                    let mut src: u64 = 0;
                    let src_ptr = &mut src as *mut u64 as *mut u8;
                    return unsafe {
                        value.write(src_ptr);
                        self.convert(src_ptr, t, addr, ty)
                    };
                }
                FieldRef::Method { ty, .. } => return Err(self.invalid_cast(t, ty)),
                FieldRef::Forward(w) => v = w,
            }
        }
    }

    /// Read a field as `i32` (`t` is i8, i16, i32 or bool)
    pub fn dyn_get_i32(&self, v: ValueRef, hfield: i32, t: TypeId) -> HlResult<i32> {
        match self.dyn_get(v, hfield, t)? {
            Slot::I8(x) => Ok(x as i32),
            Slot::I16(x) => Ok(x as i32),
            Slot::I32(x) => Ok(x),
            Slot::Bool(x) => Ok(x as i32),
            _ => Err(self.invalid_cast(t, TypeId::I32)),
        }
    }

    /// Read a field as `f32`
    pub fn dyn_get_f32(&self, v: ValueRef, hfield: i32) -> HlResult<f32> {
        match self.dyn_get(v, hfield, TypeId::F32)? {
            Slot::F32(x) => Ok(x),
            _ => Err(self.invalid_cast(TypeId::F32, TypeId::F32)),
        }
    }

    /// Read a field as `f64`
    pub fn dyn_get_f64(&self, v: ValueRef, hfield: i32) -> HlResult<f64> {
        match self.dyn_get(v, hfield, TypeId::F64)? {
            Slot::F64(x) => Ok(x),
            _ => Err(self.invalid_cast(TypeId::F64, TypeId::F64)),
        }
    }

    /// Read a field as a pointer of type `t`
    pub fn dyn_get_ptr(&self, v: ValueRef, hfield: i32, t: TypeId) -> HlResult<*mut u8> {
        if !self.kind(t)?.is_ptr() {
            return Err(self.invalid_cast(t, TypeId::DYN));
        }
        match self.dyn_get(v, hfield, t)? {
            Slot::Ptr(p) => Ok(p),
            _ => Err(self.invalid_cast(t, t)),
        }
    }

    /// Write an integer of type `t` (i8, i16, i32 or bool)
    pub fn dyn_set_i32(&self, v: ValueRef, hfield: i32, t: TypeId, value: i32) -> HlResult<()> {
        let slot = Num::Int(value)
            .to_slot(self.kind(t)?)
            .filter(|s| !matches!(s, Slot::F32(_) | Slot::F64(_)))
            .ok_or_else(|| self.invalid_cast(TypeId::I32, t))?;
        self.dyn_set(v, hfield, t, slot)
    }

    /// Write an `f32`
    pub fn dyn_set_f32(&self, v: ValueRef, hfield: i32, value: f32) -> HlResult<()> {
        self.dyn_set(v, hfield, TypeId::F32, Slot::F32(value))
    }

    /// Write an `f64`
    pub fn dyn_set_f64(&self, v: ValueRef, hfield: i32, value: f64) -> HlResult<()> {
        self.dyn_set(v, hfield, TypeId::F64, Slot::F64(value))
    }

    /// Write a pointer of type `t`
    pub fn dyn_set_ptr(&self, v: ValueRef, hfield: i32, t: TypeId, value: *mut u8) -> HlResult<()> {
        self.dyn_set(v, hfield, t, Slot::Ptr(value))
    }

    // ===== Comparison =====

    /// Compare two dynamic values
    ///
    /// Null sorts first. Numbers compare by value, as integers when both
    /// are integral and as `f64` otherwise; NaN has no order. Two objects
    /// whose class defines `__compare` use it. Other values of the same
    /// kind compare by identity, then address. Everything else is
    /// [`DynCompare::Invalid`].
    pub fn compare(&self, a: Option<ValueRef>, b: Option<ValueRef>) -> DynCompare {
        let (a, b) = match (a, b) {
            (None, None) => return DynCompare::Equal,
            (None, Some(_)) => return DynCompare::Less,
            (Some(_), None) => return DynCompare::Greater,
            (Some(a), Some(b)) => (self.unwrap_virtual(a), self.unwrap_virtual(b)),
        };
        if a == b {
            return DynCompare::Equal;
        }
        let (ka, kb) = match (self.kind(a.type_id()), self.kind(b.type_id())) {
            (Ok(ka), Ok(kb)) => (ka, kb),
            _ => return DynCompare::Invalid,
        };

        if ka.is_numeric() && kb.is_numeric() {
            let num = |v| self.unbox(v).ok().and_then(|(slot, _)| Num::from_slot(slot));
            return match (num(a), num(b)) {
                (Some(Num::Int(x)), Some(Num::Int(y))) => x.cmp(&y).into(),
                (Some(x), Some(y)) => x.as_f64().partial_cmp(&y.as_f64()).into(),
                _ => DynCompare::Invalid,
            };
        }
        if ka.is_numeric() || kb.is_numeric() || ka != kb {
            return DynCompare::Invalid;
        }

        if ka == TypeKind::Obj {
            if let Some(result) = self.call_compare_hook(a, b) {
                return result;
            }
        }
        let (pa, pb) = if is_self_describing(ka) {
            (a.as_ptr(), b.as_ptr())
        } else {
            unsafe { (self.unbox_ptr(a), self.unbox_ptr(b)) }
        };
        (pa as usize).cmp(&(pb as usize)).into()
    }

    fn unwrap_virtual(&self, v: ValueRef) -> ValueRef {
        if self.kind(v.type_id()).ok() != Some(TypeKind::Virtual) {
            return v;
        }
        let inner = unsafe { (*(v.as_ptr() as *const VVirtual)).value };
        unsafe { ValueRef::from_raw(inner) }.unwrap_or(v)
    }

    fn call_compare_hook(&self, a: ValueRef, b: ValueRef) -> Option<DynCompare> {
        let rt = self.registry().runtime_object(a.type_id()).ok()?;
        let addr = self.functions().addr(rt.compare_method?)?;
        // SAFETY: functions bound as `__compare` use the C comparison ABI
        let hook: extern "C" fn(*mut u8, *mut u8) -> i32 = unsafe { std::mem::transmute(addr) };
        Some(DynCompare::from_abi(hook(a.as_ptr(), b.as_ptr())))
    }
}
