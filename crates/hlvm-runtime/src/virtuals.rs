//! Virtual proxies
//!
//! A virtual presents a value through the field set of a structural type.
//! It never copies data: each field maps to the wrapped value's storage, to
//! one of its methods, or is resolved by name on each access when the
//! stored type differs from the declared one.
//!
//! Views on open dynamic objects and on standalone virtuals are chained so
//! that a second request for the same virtual type returns the same view,
//! and so that field additions can refresh every view. Views on class
//! instances are created per request.

use crate::dynamic::FieldRef;
use crate::error::{HlError, HlResult};
use crate::runtime::Runtime;
use crate::value::{VDynObj, VVirtual, ValueRef, INDIRECT};
use hlvm_types::{Member, TypeId, TypeKind, VirtualLayout};
use std::mem::size_of;

impl Runtime {
    /// Allocate a standalone virtual with its own zeroed field storage
    pub fn alloc_virtual(&self, vt: TypeId) -> HlResult<ValueRef> {
        let layout = self.registry().virtual_layout(vt)?;
        let n = layout.nfields();
        let indexes_at = size_of::<VVirtual>();
        let data_at = (indexes_at + n * size_of::<isize>()).div_ceil(8) * 8;
        let ptr = self.heap().alloc(data_at + layout.data_size);
        let v = self.init_value(ptr, vt);
        unsafe {
            let vv = v.as_ptr() as *mut VVirtual;
            (*vv).indexes = ptr.as_ptr().add(indexes_at) as *mut isize;
            (*vv).fields_data = ptr.as_ptr().add(data_at);
            for (i, &offset) in layout.field_offsets.iter().enumerate() {
                (*vv).indexes.add(i).write(offset as isize);
            }
        }
        Ok(v)
    }

    /// View `value` through the virtual type `vt`
    ///
    /// Fails with [`HlError::IncompatibleVirtual`] when `value` lacks one of
    /// the virtual's fields.
    pub fn to_virtual(&self, vt: TypeId, value: ValueRef) -> HlResult<ValueRef> {
        let t = value.type_id();
        match self.kind(t)? {
            TypeKind::Virtual => {
                if self.registry().same_type(t, vt) {
                    return Ok(value);
                }
                let vv = value.as_ptr() as *mut VVirtual;
                match unsafe { ValueRef::from_raw((*vv).value) } {
                    Some(inner) => self.to_virtual(vt, inner),
                    None => unsafe { self.chained_view(vt, value, &mut (*vv).next) },
                }
            }
            TypeKind::DynObj => {
                let obj = value.as_ptr() as *mut VDynObj;
                unsafe { self.chained_view(vt, value, &mut (*obj).virtuals) }
            }
            TypeKind::Obj => self.new_view(vt, value),
            _ => Err(self.invalid_cast(t, vt)),
        }
    }

    unsafe fn chained_view(
        &self,
        vt: TypeId,
        value: ValueRef,
        head: *mut *mut VVirtual,
    ) -> HlResult<ValueRef> {
        let mut cur = *head;
        while let Some(view) = ValueRef::from_raw(cur as *mut u8) {
            if self.registry().same_type(view.type_id(), vt) {
                return Ok(view);
            }
            cur = (*cur).next;
        }
        let view = self.new_view(vt, value)?;
        let vv = view.as_ptr() as *mut VVirtual;
        (*vv).next = *head;
        *head = vv;
        Ok(view)
    }

    fn new_view(&self, vt: TypeId, value: ValueRef) -> HlResult<ValueRef> {
        let layout = self.registry().virtual_layout(vt)?;
        let indexes = self.compute_indexes(&layout, value)?;
        let indexes_at = size_of::<VVirtual>();
        let ptr = self
            .heap()
            .alloc(indexes_at + indexes.len() * size_of::<isize>());
        let v = self.init_value(ptr, vt);
        unsafe {
            let vv = v.as_ptr() as *mut VVirtual;
            (*vv).value = value.as_ptr();
            (*vv).indexes = ptr.as_ptr().add(indexes_at) as *mut isize;
            std::ptr::copy_nonoverlapping(indexes.as_ptr(), (*vv).indexes, indexes.len());
        }
        log::trace!(
            "[Virtual] Wrapped {} as {}",
            self.registry().type_name(value.type_id()),
            self.registry().type_name(vt)
        );
        Ok(v)
    }

    /// Slot encoding of every virtual field against `value`
    fn compute_indexes(&self, layout: &VirtualLayout, value: ValueRef) -> HlResult<Vec<isize>> {
        let registry = self.registry();
        let t = value.type_id();
        let kind = self.kind(t)?;
        let source = match kind {
            TypeKind::Virtual => Some(registry.virtual_layout(t)?),
            _ => None,
        };
        let rt = match kind {
            TypeKind::Obj => Some(registry.runtime_object(t)?),
            _ => None,
        };

        let mut indexes = Vec::with_capacity(layout.nfields());
        for field in &layout.fields {
            let missing = || HlError::IncompatibleVirtual {
                field: field.name.clone(),
            };
            let direct = |offset: usize, ty: TypeId| {
                if registry.same_type(ty, field.ty) {
                    offset as isize
                } else {
                    INDIRECT
                }
            };
            let index = match (kind, &rt, &source) {
                (TypeKind::Obj, Some(rt), _) => match rt.resolve(field.hashed_name) {
                    Some(Member::Field { offset, ty, .. }) => direct(offset, ty),
                    Some(Member::Method { slot, ty, .. }) => {
                        let bound = registry.closure_type(ty);
                        if bound.is_some_and(|c| registry.same_type(c, field.ty)) {
                            -(slot as isize) - 1
                        } else {
                            INDIRECT
                        }
                    }
                    None => return Err(missing()),
                },
                (TypeKind::DynObj, _, _) => match self.dynobj_find(value, field.hashed_name) {
                    Some((_, f)) => direct(f.offset as usize, f.ty()),
                    None => return Err(missing()),
                },
                (TypeKind::Virtual, _, Some(src)) => match src.field_pos(field.hashed_name) {
                    Some(pos) => direct(src.field_offsets[pos], src.fields[pos].ty),
                    None => return Err(missing()),
                },
                _ => return Err(self.invalid_cast(t, layout.ty)),
            };
            indexes.push(index);
        }
        Ok(indexes)
    }

    /// Recompute the slots of every view chained on an open object
    pub(crate) fn refresh_virtuals(&self, obj: ValueRef) -> HlResult<()> {
        let mut cur = unsafe { (*(obj.as_ptr() as *mut VDynObj)).virtuals };
        while let Some(view) = unsafe { ValueRef::from_raw(cur as *mut u8) } {
            let layout = self.registry().virtual_layout(view.type_id())?;
            let indexes = self.compute_indexes(&layout, obj)?;
            unsafe {
                std::ptr::copy_nonoverlapping(indexes.as_ptr(), (*cur).indexes, indexes.len());
                cur = (*cur).next;
            }
            log::trace!(
                "[Virtual] Refreshed {}",
                self.registry().type_name(view.type_id())
            );
        }
        Ok(())
    }

    /// Storage the non-negative slots of a view are relative to
    unsafe fn virtual_base(&self, vv: *mut VVirtual) -> HlResult<*mut u8> {
        let wrapped = match ValueRef::from_raw((*vv).value) {
            None => return Ok((*vv).fields_data),
            Some(w) => w,
        };
        match self.kind(wrapped.type_id())? {
            TypeKind::Obj => Ok(wrapped.as_ptr()),
            TypeKind::DynObj => Ok((*(wrapped.as_ptr() as *mut VDynObj)).fields_data),
            TypeKind::Virtual => Ok((*(wrapped.as_ptr() as *mut VVirtual)).fields_data),
            _ => Err(self.invalid_cast(wrapped.type_id(), TypeId::from_raw((*vv).t as u32))),
        }
    }

    pub(crate) fn virtual_locate(&self, v: ValueRef, hfield: i32) -> HlResult<FieldRef> {
        let layout = self.registry().virtual_layout(v.type_id())?;
        let vv = v.as_ptr() as *mut VVirtual;
        let wrapped = unsafe { ValueRef::from_raw((*vv).value) };
        let pos = match layout.field_pos(hfield) {
            Some(pos) => pos,
            None => {
                return match wrapped {
                    Some(w) => Ok(FieldRef::Forward(w)),
                    None => Err(self.field_not_found(hfield)),
                }
            }
        };
        let index = unsafe { (*vv).indexes.add(pos).read() };
        if index == INDIRECT {
            return wrapped.map(FieldRef::Forward).ok_or(HlError::NullAccess);
        }
        if index >= 0 {
            let base = unsafe { self.virtual_base(vv)? };
            return Ok(FieldRef::Slot {
                addr: unsafe { base.add(index as usize) },
                ty: layout.fields[pos].ty,
            });
        }
        let slot = (-(index + 1)) as usize;
        let receiver = wrapped.ok_or(HlError::NullAccess)?;
        let rt = self.registry().runtime_object(receiver.type_id())?;
        let method = rt
            .methods
            .get_method(slot)
            .ok_or_else(|| self.field_not_found(hfield))?;
        Ok(FieldRef::Method {
            findex: method.findex,
            ty: method.ty,
            receiver,
        })
    }

    /// Native address of the method a virtual field names on the wrapped
    /// class instance, if any
    pub fn fetch_virtual_method(&self, v: ValueRef, hfield: i32) -> HlResult<Option<usize>> {
        if self.kind(v.type_id())? != TypeKind::Virtual {
            return Err(self.invalid_cast(v.type_id(), TypeId::DYN));
        }
        let wrapped = match unsafe { ValueRef::from_raw((*(v.as_ptr() as *mut VVirtual)).value) } {
            Some(w) if self.kind(w.type_id())? == TypeKind::Obj => w,
            _ => return Ok(None),
        };
        let rt = self.registry().runtime_object(wrapped.type_id())?;
        Ok(match rt.resolve(hfield) {
            Some(Member::Method { findex, .. }) => self.functions().addr(findex),
            _ => None,
        })
    }

    /// Value wrapped by a virtual, `None` for a standalone virtual
    pub fn virtual_value(&self, v: ValueRef) -> HlResult<Option<ValueRef>> {
        if self.kind(v.type_id())? != TypeKind::Virtual {
            return Err(self.invalid_cast(v.type_id(), TypeId::DYN));
        }
        Ok(unsafe { ValueRef::from_raw((*(v.as_ptr() as *mut VVirtual)).value) })
    }
}
