//! Enum values
//!
//! An enum value is a [`VEnum`] header followed by the parameters of its
//! active construct. Each construct has its own offsets, so a parameter
//! is only readable under the construct that wrote it.

use crate::error::{HlError, HlResult};
use crate::runtime::Runtime;
use crate::value::{Slot, VEnum, ValueRef};
use hlvm_types::{EnumLayout, TypeError, TypeId, TypeKind};
use std::sync::Arc;

impl Runtime {
    /// Allocate a value of construct `index` with zeroed parameters
    pub fn alloc_enum(&self, t: TypeId, index: usize) -> HlResult<ValueRef> {
        let layout = self.registry().enum_layout(t)?;
        let c = layout
            .construct(index)
            .ok_or(HlError::UnknownConstruct(index))?;
        let ptr = if c.has_ptr {
            self.heap().alloc(c.size)
        } else {
            self.heap().alloc_noptr(c.size)
        };
        let v = self.init_value(ptr, t);
        unsafe {
            (*(v.as_ptr() as *mut VEnum)).index = index as i32;
        }
        Ok(v)
    }

    /// Build a value of construct `index` from its parameters
    pub fn make_enum(&self, t: TypeId, index: usize, args: &[Slot]) -> HlResult<ValueRef> {
        let layout = self.registry().enum_layout(t)?;
        let c = layout
            .construct(index)
            .ok_or(HlError::UnknownConstruct(index))?;
        if args.len() != c.params.len() {
            return Err(HlError::InvalidArity {
                expected: c.params.len(),
                got: args.len(),
            });
        }
        for (i, (arg, &param)) in args.iter().zip(&c.params).enumerate() {
            if !arg.fits(self.kind(param)?) {
                return Err(HlError::ArgumentMismatch {
                    index: i,
                    expected: self.registry().type_name(param),
                    got: format!("{:?}", arg),
                });
            }
        }
        let v = self.alloc_enum(t, index)?;
        for (arg, &offset) in args.iter().zip(&c.offsets) {
            unsafe { arg.write(v.as_ptr().add(offset)) };
        }
        Ok(v)
    }

    fn enum_header(&self, v: ValueRef) -> HlResult<*mut VEnum> {
        match self.kind(v.type_id())? {
            TypeKind::Enum => Ok(v.as_ptr() as *mut VEnum),
            found => Err(TypeError::WrongKind {
                expected: TypeKind::Enum,
                found,
            }
            .into()),
        }
    }

    /// Active construct of an enum value
    pub fn enum_index(&self, v: ValueRef) -> HlResult<usize> {
        Ok(unsafe { (*self.enum_header(v)?).index } as usize)
    }

    /// Layout of the active construct
    fn active_construct(&self, v: ValueRef) -> HlResult<(usize, Arc<EnumLayout>)> {
        let index = self.enum_index(v)?;
        Ok((index, self.registry().enum_layout(v.type_id())?))
    }

    /// Read parameter `param` of construct `construct`
    ///
    /// Fails with [`HlError::WrongConstruct`] if another construct is
    /// active.
    pub fn enum_param(&self, v: ValueRef, construct: usize, param: usize) -> HlResult<Slot> {
        let (active, layout) = self.active_construct(v)?;
        if active != construct {
            return Err(HlError::WrongConstruct {
                active,
                requested: construct,
            });
        }
        let c = layout
            .construct(active)
            .ok_or(HlError::UnknownConstruct(active))?;
        let (&ty, &offset) = c
            .params
            .get(param)
            .zip(c.offsets.get(param))
            .ok_or(HlError::InvalidArity {
                expected: c.params.len(),
                got: param + 1,
            })?;
        Ok(unsafe { Slot::read(v.as_ptr().add(offset), self.kind(ty)?) })
    }
}
