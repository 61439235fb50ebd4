//! Virtual proxy tests
//!
//! Tests validate:
//! - Wrapping class instances, open objects and standalone virtuals
//! - Reads and writes through a view match direct access
//! - Missing fields fail the conversion
//! - Fields of another type and method fields resolve correctly
//! - Method addresses are fetched only through class-instance views
//!
//! # Running Tests
//! ```bash
//! cargo test --test virtual_proxies
//! ```

use hlvm_runtime::{HlError, Runtime, Slot, VVirtual, ValueRef, INDIRECT};
use hlvm_types::{HlType, ObjType, TypeId, TypeRegistry, VirtualType};
use std::sync::Arc;

fn init_logger() {
    let _ = env_logger::builder().is_test(true).try_init();
}

struct Types {
    point: TypeId,
    has_x: TypeId,
    has_xy: TypeId,
    has_z: TypeId,
    int_x: TypeId,
    scalable: TypeId,
}

const SCALE_FINDEX: usize = 0;
const SCALE_ADDR: usize = 0x5ca1e;

fn runtime() -> (Runtime, Types) {
    init_logger();
    let mut b = TypeRegistry::builder();
    let point = b.reserve();
    let scale = b.fun(vec![point, TypeId::I32], TypeId::F64);
    let bound_scale = b.fun(vec![TypeId::I32], TypeId::F64);
    b.define(
        point,
        HlType::Obj(
            ObjType::new("Point")
                .field("x", TypeId::F64)
                .field("y", TypeId::F64)
                .method("scale", SCALE_FINDEX, scale),
        ),
    )
    .unwrap();
    let has_x = b.add(HlType::Virtual(VirtualType::new().field("x", TypeId::F64)));
    let has_xy = b.add(HlType::Virtual(
        VirtualType::new().field("y", TypeId::F64).field("x", TypeId::F64),
    ));
    let has_z = b.add(HlType::Virtual(VirtualType::new().field("z", TypeId::F64)));
    let int_x = b.add(HlType::Virtual(VirtualType::new().field("x", TypeId::I32)));
    let scalable = b.add(HlType::Virtual(
        VirtualType::new().field("scale", bound_scale),
    ));

    let mut rt = Runtime::new(Arc::new(b.build().unwrap()));
    rt.functions_mut().define(SCALE_FINDEX, SCALE_ADDR, scale);
    (
        rt,
        Types {
            point,
            has_x,
            has_xy,
            has_z,
            int_x,
            scalable,
        },
    )
}

fn indexes(v: ValueRef, n: usize) -> Vec<isize> {
    unsafe {
        let vv = v.as_ptr() as *const VVirtual;
        std::slice::from_raw_parts((*vv).indexes, n).to_vec()
    }
}

// ===== Class instances =====

#[test]
fn test_view_reads_match_direct_reads() {
    let (rt, t) = runtime();
    let p = rt.alloc_obj(t.point).unwrap();
    rt.dyn_set_f64(p, rt.hash("x"), 1.25).unwrap();
    rt.dyn_set_f64(p, rt.hash("y"), -4.0).unwrap();

    let view = rt.to_virtual(t.has_xy, p).unwrap();
    assert_eq!(view.type_id(), t.has_xy);
    assert_eq!(rt.virtual_value(view).unwrap(), Some(p));
    for name in ["x", "y"] {
        let h = rt.hash(name);
        assert_eq!(rt.dyn_get_f64(view, h).unwrap(), rt.dyn_get_f64(p, h).unwrap());
    }
}

#[test]
fn test_view_writes_reach_the_object() {
    let (rt, t) = runtime();
    let p = rt.alloc_obj(t.point).unwrap();
    let view = rt.to_virtual(t.has_x, p).unwrap();
    rt.dyn_set_f64(view, rt.hash("x"), 9.5).unwrap();
    assert_eq!(rt.dyn_get_f64(p, rt.hash("x")).unwrap(), 9.5);
}

#[test]
fn test_fields_outside_the_view_forward() {
    let (rt, t) = runtime();
    let p = rt.alloc_obj(t.point).unwrap();
    rt.dyn_set_f64(p, rt.hash("y"), 3.0).unwrap();
    let view = rt.to_virtual(t.has_x, p).unwrap();
    assert_eq!(rt.dyn_get_f64(view, rt.hash("y")).unwrap(), 3.0);
}

#[test]
fn test_missing_field_fails() {
    let (rt, t) = runtime();
    let p = rt.alloc_obj(t.point).unwrap();
    assert_eq!(
        rt.to_virtual(t.has_z, p),
        Err(HlError::IncompatibleVirtual {
            field: "z".to_string()
        })
    );
}

#[test]
fn test_field_of_other_type_is_indirect() {
    let (rt, t) = runtime();
    let p = rt.alloc_obj(t.point).unwrap();
    rt.dyn_set_f64(p, rt.hash("x"), 7.9).unwrap();

    let view = rt.to_virtual(t.int_x, p).unwrap();
    assert_eq!(indexes(view, 1), vec![INDIRECT]);
    assert_eq!(rt.dyn_get_i32(view, rt.hash("x"), TypeId::I32).unwrap(), 7);

    rt.dyn_set_i32(view, rt.hash("x"), TypeId::I32, 2).unwrap();
    assert_eq!(rt.dyn_get_f64(p, rt.hash("x")).unwrap(), 2.0);
}

#[test]
fn test_method_field() {
    let (rt, t) = runtime();
    let p = rt.alloc_obj(t.point).unwrap();
    let view = rt.to_virtual(t.scalable, p).unwrap();
    assert_eq!(indexes(view, 1), vec![-1]);

    let h = rt.hash("scale");
    assert_eq!(rt.fetch_virtual_method(view, h).unwrap(), Some(SCALE_ADDR));
    assert_eq!(rt.fetch_virtual_method(view, rt.hash("x")).unwrap(), None);

    let c = rt.dyn_get_ptr(view, h, TypeId::DYN).unwrap();
    let c = unsafe { ValueRef::from_raw(c) }.unwrap();
    assert_eq!(rt.closure_fun(c).unwrap(), SCALE_ADDR);
    assert_eq!(rt.closure_receiver(c).unwrap(), Some(p));
    assert!(rt.check_call(c, &[TypeId::I32], TypeId::F64).is_ok());
}

#[test]
fn test_fetch_virtual_method() {
    let (rt, t) = runtime();
    let scale = rt.hash("scale");

    // Class instance: only method members have a bound address
    let p = rt.alloc_obj(t.point).unwrap();
    let view = rt.to_virtual(t.scalable, p).unwrap();
    assert_eq!(rt.fetch_virtual_method(view, scale).unwrap(), Some(SCALE_ADDR));
    let xy = rt.to_virtual(t.has_xy, p).unwrap();
    assert_eq!(rt.fetch_virtual_method(xy, rt.hash("x")).unwrap(), None);
    assert_eq!(rt.fetch_virtual_method(xy, rt.hash("missing")).unwrap(), None);

    // Standalone virtual has no class behind it
    let v = rt.alloc_virtual(t.has_xy).unwrap();
    assert_eq!(rt.fetch_virtual_method(v, rt.hash("x")).unwrap(), None);
    assert_eq!(rt.fetch_virtual_method(v, scale).unwrap(), None);

    // Open object view
    let o = rt.alloc_dynobj();
    rt.dyn_set_f64(o, rt.hash("x"), 1.0).unwrap();
    let ov = rt.to_virtual(t.has_x, o).unwrap();
    assert_eq!(rt.fetch_virtual_method(ov, rt.hash("x")).unwrap(), None);

    // Only virtuals are accepted
    assert!(rt.fetch_virtual_method(p, scale).is_err());
}

#[test]
fn test_cast_to_virtual_wraps() {
    let (rt, t) = runtime();
    let p = rt.alloc_obj(t.point).unwrap();
    let Slot::Ptr(raw) = rt.cast_slot(Slot::Ptr(p.as_ptr()), t.point, t.has_x).unwrap() else {
        panic!("expected a pointer");
    };
    let view = unsafe { ValueRef::from_raw(raw) }.unwrap();
    assert_eq!(view.type_id(), t.has_x);
    assert_eq!(rt.virtual_value(view).unwrap(), Some(p));
}

// ===== Virtuals of virtuals =====

#[test]
fn test_same_type_returns_the_view() {
    let (rt, t) = runtime();
    let p = rt.alloc_obj(t.point).unwrap();
    let view = rt.to_virtual(t.has_xy, p).unwrap();
    assert_eq!(rt.to_virtual(t.has_xy, view).unwrap(), view);

    let narrow = rt.to_virtual(t.has_x, view).unwrap();
    assert_eq!(rt.virtual_value(narrow).unwrap(), Some(p));
}

#[test]
fn test_standalone_virtual() {
    let (rt, t) = runtime();
    let v = rt.alloc_virtual(t.has_xy).unwrap();
    assert_eq!(rt.virtual_value(v).unwrap(), None);

    rt.dyn_set_f64(v, rt.hash("x"), 1.0).unwrap();
    rt.dyn_set_f64(v, rt.hash("y"), 2.0).unwrap();
    assert_eq!(rt.dyn_get_f64(v, rt.hash("x")).unwrap(), 1.0);
    assert_eq!(rt.dyn_get_f64(v, rt.hash("y")).unwrap(), 2.0);
    assert!(rt.dyn_get_f64(v, rt.hash("z")).is_err());

    let narrow = rt.to_virtual(t.has_x, v).unwrap();
    assert_eq!(rt.dyn_get_f64(narrow, rt.hash("x")).unwrap(), 1.0);
    assert_eq!(rt.to_virtual(t.has_x, v).unwrap(), narrow);
    rt.dyn_set_f64(narrow, rt.hash("x"), 5.0).unwrap();
    assert_eq!(rt.dyn_get_f64(v, rt.hash("x")).unwrap(), 5.0);
}

// ===== Open objects =====

#[test]
fn test_open_object_views_are_shared_and_refreshed() {
    let (rt, t) = runtime();
    let o = rt.alloc_dynobj();
    assert!(matches!(
        rt.to_virtual(t.has_x, o),
        Err(HlError::IncompatibleVirtual { .. })
    ));

    rt.dyn_set_f64(o, rt.hash("x"), 1.5).unwrap();
    let view = rt.to_virtual(t.has_x, o).unwrap();
    assert_eq!(rt.to_virtual(t.has_x, o).unwrap(), view);
    assert_eq!(rt.dyn_get_f64(view, rt.hash("x")).unwrap(), 1.5);

    // New fields move the storage; the view must follow
    for (i, name) in ["a", "b", "c", "d"].iter().enumerate() {
        rt.dyn_set_i32(o, rt.hash(name), TypeId::I32, i as i32).unwrap();
    }
    assert_eq!(rt.dyn_get_f64(view, rt.hash("x")).unwrap(), 1.5);

    // Remapping x to another type makes the view resolve by name
    rt.dyn_set_i32(o, rt.hash("x"), TypeId::I32, 4).unwrap();
    assert_eq!(indexes(view, 1), vec![INDIRECT]);
    assert_eq!(rt.dyn_get_f64(view, rt.hash("x")).unwrap(), 4.0);

    rt.dyn_set_f64(o, rt.hash("x"), 0.5).unwrap();
    assert_ne!(indexes(view, 1), vec![INDIRECT]);
    assert_eq!(rt.dyn_get_f64(view, rt.hash("x")).unwrap(), 0.5);
}
