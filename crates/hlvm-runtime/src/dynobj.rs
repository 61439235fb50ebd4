//! Open dynamic objects
//!
//! Fields are added on first write and kept sorted by name hash. A write of
//! another type remaps the field: in place when the new type fits the old
//! slot, otherwise to fresh storage at the end. Every add or remap
//! refreshes the virtual views chained on the object.

use crate::error::HlResult;
use crate::runtime::Runtime;
use crate::value::{DynField, Slot, VDynObj, ValueRef};
use hlvm_types::{pad, TypeId, TypeKind};
use std::mem::size_of;

impl Runtime {
    /// Field table of an open object
    ///
    /// # Safety
    ///
    /// `obj` must be an open dynamic object; the slice is invalidated by
    /// the next field addition.
    unsafe fn dynobj_lookup<'a>(&self, obj: ValueRef) -> &'a [DynField] {
        let d = obj.as_ptr() as *const VDynObj;
        if (*d).nfields == 0 {
            return &[];
        }
        std::slice::from_raw_parts((*d).lookup, (*d).nfields as usize)
    }

    /// Position and entry of a field by hash
    pub(crate) fn dynobj_find(&self, obj: ValueRef, hfield: i32) -> Option<(usize, DynField)> {
        let lookup = unsafe { self.dynobj_lookup(obj) };
        let pos = lookup.partition_point(|f| f.hashed_name < hfield);
        lookup
            .get(pos)
            .filter(|f| f.hashed_name == hfield)
            .map(|f| (pos, *f))
    }

    pub(crate) fn dynobj_set(
        &self,
        obj: ValueRef,
        hfield: i32,
        t: TypeId,
        value: Slot,
    ) -> HlResult<()> {
        let (field, changed) = match self.dynobj_find(obj, hfield) {
            Some((_, f)) if self.registry().same_type(f.ty(), t) => (f, false),
            Some((pos, _)) => (self.dynobj_remap(obj, pos, t)?, true),
            None => (self.dynobj_add(obj, hfield, t)?, true),
        };
        unsafe {
            let data = (*(obj.as_ptr() as *mut VDynObj)).fields_data;
            value.write(data.add(field.offset as usize));
        }
        if changed {
            self.refresh_virtuals(obj)?;
        }
        Ok(())
    }

    /// Grow the field storage to `size` bytes, preserving contents
    unsafe fn dynobj_grow(&self, d: *mut VDynObj, size: usize) {
        let old_size = (*d).data_size as usize;
        let data = self.heap().alloc(size).as_ptr();
        if old_size > 0 {
            std::ptr::copy_nonoverlapping((*d).fields_data, data, old_size);
        }
        (*d).fields_data = data;
        (*d).data_size = size as i32;
    }

    fn dynobj_add(&self, obj: ValueRef, hfield: i32, t: TypeId) -> HlResult<DynField> {
        let kind = self.kind(t)?;
        let d = obj.as_ptr() as *mut VDynObj;
        unsafe {
            let offset = pad((*d).data_size as usize, kind);
            let field = DynField {
                hashed_name: hfield,
                t: t.raw(),
                offset: offset as u32,
            };

            let old = self.dynobj_lookup(obj);
            let pos = old.partition_point(|f| f.hashed_name < hfield);
            let n = old.len();
            let lookup = self
                .heap()
                .alloc_noptr((n + 1) * size_of::<DynField>())
                .as_ptr() as *mut DynField;
            std::ptr::copy_nonoverlapping(old.as_ptr(), lookup, pos);
            lookup.add(pos).write(field);
            std::ptr::copy_nonoverlapping(old.as_ptr().add(pos), lookup.add(pos + 1), n - pos);

            self.dynobj_grow(d, offset + kind.size());
            (*d).lookup = lookup;
            (*d).nfields = (n + 1) as i32;
            Ok(field)
        }
    }

    fn dynobj_remap(&self, obj: ValueRef, pos: usize, t: TypeId) -> HlResult<DynField> {
        let kind = self.kind(t)?;
        let d = obj.as_ptr() as *mut VDynObj;
        unsafe {
            let entry = (*d).lookup.add(pos);
            let old = *entry;
            let old_kind = self.kind(old.ty())?;
            let offset = old.offset as usize;
            if kind.size() <= old_kind.size() && pad(offset, kind) == offset {
                std::ptr::write_bytes((*d).fields_data.add(offset), 0, old_kind.size());
            } else {
                let new_offset = pad((*d).data_size as usize, kind);
                self.dynobj_grow(d, new_offset + kind.size());
                (*entry).offset = new_offset as u32;
            }
            (*entry).t = t.raw();
            Ok(*entry)
        }
    }

    /// Fields of an open object, sorted by hash
    pub fn dynobj_fields(&self, obj: ValueRef) -> HlResult<Vec<DynField>> {
        if self.kind(obj.type_id())? != TypeKind::DynObj {
            return Err(self.invalid_cast(obj.type_id(), TypeId::DYNOBJ));
        }
        Ok(unsafe { self.dynobj_lookup(obj) }.to_vec())
    }

    /// Field names of an open object, recovered through the name table
    pub fn dynobj_field_names(&self, obj: ValueRef) -> HlResult<Vec<String>> {
        Ok(self
            .dynobj_fields(obj)?
            .iter()
            .map(|f| self.names().display_name(f.hashed_name))
            .collect())
    }
}
