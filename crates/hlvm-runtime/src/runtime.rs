//! Runtime context
//!
//! A [`Runtime`] ties together the type registry, the reverse name table,
//! the allocator and the function table. All dynamic operations are
//! methods on it.

use crate::error::{HlError, HlResult};
use crate::functions::FunctionTable;
use crate::gc::{Allocator, Heap, HeapStats};
use crate::natives::NativeRegistry;
use crate::options::RuntimeOptions;
use crate::value::{is_self_describing, Slot, VArray, VDynObj, VDynamic, ValueRef};
use hlvm_types::{HlType, NameTable, TypeId, TypeKind, TypeRegistry};
use std::ptr::NonNull;
use std::sync::Arc;

/// Runtime context for one loaded module
pub struct Runtime {
    registry: Arc<TypeRegistry>,
    names: Arc<NameTable>,
    heap: Box<dyn Allocator>,
    functions: FunctionTable,
    natives: NativeRegistry,
    options: RuntimeOptions,
}

impl Runtime {
    /// Create a runtime with default options
    pub fn new(registry: Arc<TypeRegistry>) -> Self {
        Self::with_options(registry, RuntimeOptions::default())
    }

    /// Create a runtime backed by the default heap
    pub fn with_options(registry: Arc<TypeRegistry>, options: RuntimeOptions) -> Self {
        let heap = Box::new(Heap::with_limit(options.max_heap_bytes));
        Self::with_allocator(registry, options, heap)
    }

    /// Create a runtime with a custom allocator
    pub fn with_allocator(
        registry: Arc<TypeRegistry>,
        options: RuntimeOptions,
        heap: Box<dyn Allocator>,
    ) -> Self {
        let names = options.names.clone().unwrap_or_default();
        if options.cache_field_names {
            record_names(&registry, &names);
        }
        Self {
            registry,
            names,
            heap,
            functions: FunctionTable::new(),
            natives: NativeRegistry::new(),
            options,
        }
    }

    /// Type registry
    pub fn registry(&self) -> &TypeRegistry {
        &self.registry
    }

    /// Reverse name table
    pub fn names(&self) -> &Arc<NameTable> {
        &self.names
    }

    /// Allocator
    pub fn heap(&self) -> &dyn Allocator {
        self.heap.as_ref()
    }

    /// Heap statistics
    pub fn heap_stats(&self) -> HeapStats {
        self.heap.stats()
    }

    /// Function table
    pub fn functions(&self) -> &FunctionTable {
        &self.functions
    }

    /// Mutable function table, for the loader
    pub fn functions_mut(&mut self) -> &mut FunctionTable {
        &mut self.functions
    }

    /// Native primitive registry
    pub fn natives(&self) -> &NativeRegistry {
        &self.natives
    }

    /// Options the runtime was created with
    pub fn options(&self) -> &RuntimeOptions {
        &self.options
    }

    /// Hash a field name, recording it if name caching is enabled
    pub fn hash(&self, name: &str) -> i32 {
        self.names.hash(name, self.options.cache_field_names)
    }

    pub(crate) fn kind(&self, t: TypeId) -> HlResult<TypeKind> {
        Ok(self.registry.kind(t)?)
    }

    pub(crate) fn field_not_found(&self, hash: i32) -> HlError {
        HlError::FieldNotFound {
            hash,
            name: self.names.display_name(hash),
        }
    }

    pub(crate) fn invalid_cast(&self, from: TypeId, to: TypeId) -> HlError {
        HlError::InvalidCast {
            from: self.registry.type_name(from),
            to: self.registry.type_name(to),
        }
    }

    // ===== Allocation =====

    /// Allocate a zeroed dynamic box of type `t`
    pub fn alloc_dynamic(&self, t: TypeId) -> HlResult<ValueRef> {
        let kind = self.kind(t)?;
        let size = std::mem::size_of::<VDynamic>();
        let ptr = if kind.is_ptr() {
            self.heap.alloc(size)
        } else {
            self.heap.alloc_noptr(size)
        };
        Ok(self.init_value(ptr, t))
    }

    /// Allocate a zeroed instance of class `t`
    pub fn alloc_obj(&self, t: TypeId) -> HlResult<ValueRef> {
        let rt = self.registry.runtime_object(t)?;
        let ptr = if rt.has_ptr {
            self.heap.alloc(rt.size)
        } else {
            self.heap.alloc_noptr(rt.size)
        };
        Ok(self.init_value(ptr, t))
    }

    /// Allocate an empty open dynamic object
    pub fn alloc_dynobj(&self) -> ValueRef {
        let ptr = self.heap.alloc(std::mem::size_of::<VDynObj>());
        self.init_value(ptr, TypeId::DYNOBJ)
    }

    /// Allocate `size` zeroed raw bytes
    pub fn alloc_bytes(&self, size: usize) -> NonNull<u8> {
        self.heap.alloc_noptr(size)
    }

    /// Copy `src` into a new raw byte buffer
    pub fn copy_bytes(&self, src: &[u8]) -> NonNull<u8> {
        let dst = self.heap.alloc_noptr(src.len());
        unsafe {
            std::ptr::copy_nonoverlapping(src.as_ptr(), dst.as_ptr(), src.len());
        }
        dst
    }

    /// Allocate an array of `len` zeroed elements of type `elem`
    pub fn alloc_array(&self, elem: TypeId, len: usize) -> HlResult<ValueRef> {
        let kind = self.kind(elem)?;
        let stored_len = i32::try_from(len).map_err(|_| HlError::ArrayTooLarge(len))?;
        let size = kind
            .size()
            .checked_mul(len)
            .and_then(|data| data.checked_add(std::mem::size_of::<VArray>()))
            .ok_or(HlError::ArrayTooLarge(len))?;
        let ptr = if kind.is_ptr() {
            self.heap.alloc(size)
        } else {
            self.heap.alloc_noptr(size)
        };
        let arr = self.init_value(ptr, TypeId::ARRAY);
        unsafe {
            let a = arr.as_ptr() as *mut VArray;
            (*a).at = elem.raw() as usize;
            (*a).size = stored_len;
        }
        Ok(arr)
    }

    /// Element type, length and data pointer of an array
    pub fn array_parts(&self, arr: ValueRef) -> HlResult<(TypeId, usize, *mut u8)> {
        if self.kind(arr.type_id())? != TypeKind::Array {
            return Err(self.invalid_cast(arr.type_id(), TypeId::ARRAY));
        }
        unsafe {
            let a = arr.as_ptr() as *mut VArray;
            Ok((
                TypeId::from_raw((*a).at as u32),
                (*a).size as usize,
                arr.as_ptr().add(std::mem::size_of::<VArray>()),
            ))
        }
    }

    pub(crate) fn init_value(&self, ptr: NonNull<u8>, t: TypeId) -> ValueRef {
        unsafe {
            (ptr.as_ptr() as *mut usize).write(t.raw() as usize);
            ValueRef::from_non_null(ptr)
        }
    }

    // ===== Boxing =====

    /// Box a typed slot as a dynamic value
    ///
    /// Numeric values and non self-describing pointers (bytes, type, ref,
    /// abstract) get a fresh [`VDynamic`]; other pointers already are
    /// dynamic values and are returned as is. Null stays null.
    pub fn make_dyn(&self, slot: Slot, t: TypeId) -> HlResult<Option<ValueRef>> {
        let kind = self.kind(t)?;
        if !slot.fits(kind) {
            return Err(self.invalid_cast(t, TypeId::DYN));
        }
        let payload = match slot {
            Slot::Void => return Ok(None),
            Slot::Ptr(p) if p.is_null() => return Ok(None),
            Slot::Ptr(p) if is_self_describing(kind) => {
                return Ok(unsafe { ValueRef::from_raw(p) })
            }
            other => other,
        };
        let v = self.alloc_dynamic(t)?;
        unsafe {
            payload.write(std::ptr::addr_of_mut!((*(v.as_ptr() as *mut VDynamic)).v) as *mut u8);
        }
        Ok(Some(v))
    }

    /// Box an `i32`
    pub fn box_i32(&self, v: i32) -> HlResult<ValueRef> {
        self.boxed(Slot::I32(v), TypeId::I32)
    }

    /// Box an `f64`
    pub fn box_f64(&self, v: f64) -> HlResult<ValueRef> {
        self.boxed(Slot::F64(v), TypeId::F64)
    }

    /// Box an `f32`
    pub fn box_f32(&self, v: f32) -> HlResult<ValueRef> {
        self.boxed(Slot::F32(v), TypeId::F32)
    }

    /// Box a `bool`
    pub fn box_bool(&self, v: bool) -> HlResult<ValueRef> {
        self.boxed(Slot::Bool(v), TypeId::BOOL)
    }

    fn boxed(&self, slot: Slot, t: TypeId) -> HlResult<ValueRef> {
        self.make_dyn(slot, t)?.ok_or(HlError::NullAccess)
    }

    /// Payload of a dynamic box
    ///
    /// Self-describing values have no separate payload and are returned as
    /// a pointer slot to themselves.
    pub fn unbox(&self, v: ValueRef) -> HlResult<(Slot, TypeId)> {
        let t = v.type_id();
        let kind = self.kind(t)?;
        if is_self_describing(kind) {
            return Ok((Slot::Ptr(v.as_ptr()), t));
        }
        let payload = unsafe {
            std::ptr::addr_of!((*(v.as_ptr() as *const VDynamic)).v) as *const u8
        };
        Ok((unsafe { Slot::read(payload, kind) }, t))
    }
}

fn record_names(registry: &TypeRegistry, names: &NameTable) {
    for (_, ty) in registry.iter() {
        match ty {
            HlType::Obj(o) => {
                for f in o.fields.iter().filter(|f| !f.name.is_empty()) {
                    names.intern(&f.name);
                }
                for p in &o.protos {
                    names.intern(&p.name);
                }
            }
            HlType::Virtual(v) => {
                for f in &v.fields {
                    names.intern(&f.name);
                }
            }
            _ => {}
        }
    }
    log::debug!("[Names] Recorded {} field names", names.len());
}
