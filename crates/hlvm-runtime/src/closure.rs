//! Closures
//!
//! A closure carries the type of the function it calls. Binding a receiver
//! changes that type to the derived closure type, which drops the leading
//! argument, so call sites check against the shape they actually supply.

use crate::error::{HlError, HlResult};
use crate::runtime::Runtime;
use crate::value::{VClosure, ValueRef};
use hlvm_types::{FunType, TypeId, TypeKind};
use std::mem::size_of;

impl Runtime {
    /// Allocate an unbound closure over the function type `fun`
    pub fn alloc_closure(&self, fun: TypeId, addr: usize) -> HlResult<ValueRef> {
        self.registry().fun(fun)?;
        let c = self.init_value(self.heap().alloc(size_of::<VClosure>()), fun);
        unsafe {
            (*(c.as_ptr() as *mut VClosure)).fun = addr;
        }
        Ok(c)
    }

    /// Allocate a closure over `full` with `receiver` bound as its first
    /// argument
    ///
    /// The receiver must be acceptable as that argument. The closure's type
    /// is the closure type derived from `full`.
    pub fn alloc_bound_closure(
        &self,
        full: TypeId,
        addr: usize,
        receiver: ValueRef,
    ) -> HlResult<ValueRef> {
        let registry = self.registry();
        let f = registry.fun(full)?;
        let first = *f.args.first().ok_or(HlError::InvalidArity {
            expected: 1,
            got: 0,
        })?;
        if !self.accepts(first, receiver.type_id())? {
            return Err(HlError::ArgumentMismatch {
                index: 0,
                expected: registry.type_name(first),
                got: registry.type_name(receiver.type_id()),
            });
        }
        let bound = registry
            .closure_type(full)
            .ok_or_else(|| self.invalid_cast(full, full))?;
        let c = self.init_value(self.heap().alloc(size_of::<VClosure>()), bound);
        unsafe {
            let vc = c.as_ptr() as *mut VClosure;
            (*vc).fun = addr;
            (*vc).has_value = 1;
            (*vc).value = receiver.as_ptr();
        }
        Ok(c)
    }

    /// Closure over method `findex` bound to `receiver`
    pub(crate) fn method_closure(
        &self,
        findex: usize,
        ty: TypeId,
        receiver: ValueRef,
    ) -> HlResult<ValueRef> {
        let addr = self.functions().addr(findex).ok_or(HlError::NullAccess)?;
        self.alloc_bound_closure(ty, addr, receiver)
    }

    fn closure_header(&self, c: ValueRef) -> HlResult<*mut VClosure> {
        self.registry().fun(c.type_id())?;
        Ok(c.as_ptr() as *mut VClosure)
    }

    /// Call shape of a closure, receiver excluded when bound
    pub fn closure_signature(&self, c: ValueRef) -> HlResult<&FunType> {
        Ok(self.registry().fun(c.type_id())?)
    }

    /// Native address a closure calls
    pub fn closure_fun(&self, c: ValueRef) -> HlResult<usize> {
        Ok(unsafe { (*self.closure_header(c)?).fun })
    }

    /// Bound receiver, `None` when unbound
    pub fn closure_receiver(&self, c: ValueRef) -> HlResult<Option<ValueRef>> {
        let vc = self.closure_header(c)?;
        unsafe {
            if (*vc).has_value == 0 {
                return Ok(None);
            }
            Ok(ValueRef::from_raw((*vc).value))
        }
    }

    /// Check a call site shape against a closure
    ///
    /// `args` are the types the caller passes and `ret` the type it expects
    /// back. A void or dynamic `ret` accepts any return type.
    pub fn check_call(&self, c: ValueRef, args: &[TypeId], ret: TypeId) -> HlResult<()> {
        let registry = self.registry();
        let f = self.closure_signature(c)?;
        if f.arity() != args.len() {
            return Err(HlError::InvalidArity {
                expected: f.arity(),
                got: args.len(),
            });
        }
        for (index, (&param, &arg)) in f.args.iter().zip(args).enumerate() {
            if !self.accepts(param, arg)? {
                return Err(HlError::ArgumentMismatch {
                    index,
                    expected: registry.type_name(param),
                    got: registry.type_name(arg),
                });
            }
        }
        let ret_ok = matches!(self.kind(ret)?, TypeKind::Void | TypeKind::Dyn)
            || self.accepts(ret, f.ret)?;
        if !ret_ok {
            return Err(HlError::ReturnMismatch {
                expected: registry.type_name(ret),
                got: registry.type_name(f.ret),
            });
        }
        Ok(())
    }

    /// Whether a value of type `actual` may be passed where `param` is
    /// declared
    fn accepts(&self, param: TypeId, actual: TypeId) -> HlResult<bool> {
        let registry = self.registry();
        if registry.same_type(param, actual) {
            return Ok(true);
        }
        Ok(match (self.kind(param)?, self.kind(actual)?) {
            (TypeKind::Dyn, k) => k.is_ptr(),
            (TypeKind::Obj, TypeKind::Obj) => registry.is_subclass(actual, param),
            (TypeKind::Virtual, k) => {
                matches!(k, TypeKind::Obj | TypeKind::DynObj | TypeKind::Virtual)
            }
            _ => false,
        })
    }
}

#[cfg(test)]
mod tests {
    use crate::{HlError, Runtime};
    use hlvm_types::{HlType, ObjType, TypeId, TypeRegistry};
    use std::sync::Arc;

    struct Fixture {
        rt: Runtime,
        point: TypeId,
        method: TypeId,
    }

    fn fixture() -> Fixture {
        let mut b = TypeRegistry::builder();
        let point = b.reserve();
        let method = b.fun(vec![point, TypeId::I32], TypeId::F64);
        b.define(
            point,
            HlType::Obj(
                ObjType::new("Point")
                    .field("x", TypeId::F64)
                    .method("scale", 0, method),
            ),
        )
        .unwrap();
        let mut rt = Runtime::new(Arc::new(b.build().unwrap()));
        rt.functions_mut().define(0, 0xfeed, method);
        Fixture { rt, point, method }
    }

    #[test]
    fn test_unbound_closure() {
        let f = fixture();
        let c = f.rt.alloc_closure(f.method, 0x1234).unwrap();
        assert_eq!(c.type_id(), f.method);
        assert_eq!(f.rt.closure_fun(c).unwrap(), 0x1234);
        assert_eq!(f.rt.closure_receiver(c).unwrap(), None);
        assert_eq!(f.rt.closure_signature(c).unwrap().arity(), 2);
    }

    #[test]
    fn test_bound_closure_drops_receiver() {
        let f = fixture();
        let p = f.rt.alloc_obj(f.point).unwrap();
        let c = f.rt.alloc_bound_closure(f.method, 0x1234, p).unwrap();
        let sig = f.rt.closure_signature(c).unwrap();
        assert_eq!(sig.args, vec![TypeId::I32]);
        assert_eq!(sig.ret, TypeId::F64);
        assert_eq!(f.rt.closure_receiver(c).unwrap(), Some(p));
    }

    #[test]
    fn test_bound_closure_rejects_receiver() {
        let f = fixture();
        let boxed = f.rt.box_i32(1).unwrap();
        let err = f.rt.alloc_bound_closure(f.method, 0, boxed).unwrap_err();
        assert!(matches!(err, HlError::ArgumentMismatch { index: 0, .. }));
    }

    #[test]
    fn test_check_call() {
        let f = fixture();
        let p = f.rt.alloc_obj(f.point).unwrap();
        let c = f.rt.alloc_bound_closure(f.method, 0, p).unwrap();
        assert!(f.rt.check_call(c, &[TypeId::I32], TypeId::F64).is_ok());
        assert!(f.rt.check_call(c, &[TypeId::I32], TypeId::VOID).is_ok());
        assert!(f.rt.check_call(c, &[TypeId::I32], TypeId::DYN).is_ok());
        assert_eq!(
            f.rt.check_call(c, &[], TypeId::F64),
            Err(HlError::InvalidArity {
                expected: 1,
                got: 0
            })
        );
        assert!(matches!(
            f.rt.check_call(c, &[TypeId::F64], TypeId::F64),
            Err(HlError::ArgumentMismatch { index: 0, .. })
        ));
        assert!(matches!(
            f.rt.check_call(c, &[TypeId::I32], TypeId::I32),
            Err(HlError::ReturnMismatch { .. })
        ));
    }

    #[test]
    fn test_method_read_as_closure() {
        let f = fixture();
        let p = f.rt.alloc_obj(f.point).unwrap();
        let h = f.rt.hash("scale");
        let c = f.rt.dyn_get_ptr(p, h, TypeId::DYN).unwrap();
        let c = unsafe { crate::ValueRef::from_raw(c) }.unwrap();
        assert_eq!(f.rt.closure_fun(c).unwrap(), 0xfeed);
        assert_eq!(f.rt.closure_receiver(c).unwrap(), Some(p));
    }
}
