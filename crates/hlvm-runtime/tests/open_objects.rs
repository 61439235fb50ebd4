//! Open dynamic object tests
//!
//! Tests validate:
//! - Fields are added on first write and kept sorted by hash
//! - Writes of another type remap the field in place or at the end
//! - Field names are recovered through the name table
//!
//! # Running Tests
//! ```bash
//! cargo test --test open_objects
//! ```

use hlvm_runtime::{HlError, Runtime, RuntimeOptions, Slot, VDynObj, ValueRef};
use hlvm_types::{TypeId, TypeRegistry};
use std::sync::Arc;

fn init_logger() {
    let _ = env_logger::builder().is_test(true).try_init();
}

fn runtime() -> Runtime {
    init_logger();
    Runtime::new(Arc::new(TypeRegistry::builder().build().unwrap()))
}

fn data_size(o: ValueRef) -> i32 {
    unsafe { (*(o.as_ptr() as *const VDynObj)).data_size }
}

#[test]
fn test_fields_added_on_write() {
    let rt = runtime();
    let o = rt.alloc_dynobj();
    assert_eq!(o.type_id(), TypeId::DYNOBJ);
    assert!(rt.dynobj_fields(o).unwrap().is_empty());

    let names = ["zeta", "alpha", "mid", "beta", "omega"];
    for (i, name) in names.iter().enumerate() {
        rt.dyn_set_i32(o, rt.hash(name), TypeId::I32, i as i32).unwrap();
    }
    for (i, name) in names.iter().enumerate() {
        assert_eq!(rt.dyn_get_i32(o, rt.hash(name), TypeId::I32).unwrap(), i as i32);
    }

    let fields = rt.dynobj_fields(o).unwrap();
    assert_eq!(fields.len(), names.len());
    assert!(fields.windows(2).all(|w| w[0].hashed_name < w[1].hashed_name));
    assert_eq!(data_size(o), 4 * names.len() as i32);
}

#[test]
fn test_missing_field_read_fails() {
    let rt = runtime();
    let o = rt.alloc_dynobj();
    rt.dyn_set_f64(o, rt.hash("present"), 1.0).unwrap();
    assert!(matches!(
        rt.dyn_get_f64(o, rt.hash("absent")),
        Err(HlError::FieldNotFound { .. })
    ));
}

#[test]
fn test_remap_in_place() {
    let rt = runtime();
    let o = rt.alloc_dynobj();
    let h = rt.hash("n");
    rt.dyn_set_f64(o, h, 2.0).unwrap();
    let before = rt.dynobj_fields(o).unwrap()[0];

    rt.dyn_set_i32(o, h, TypeId::I32, -1).unwrap();
    let after = rt.dynobj_fields(o).unwrap()[0];
    assert_eq!(after.offset, before.offset);
    assert_eq!(after.ty(), TypeId::I32);
    assert_eq!(data_size(o), 8);
    assert_eq!(rt.dyn_get(o, h, TypeId::I32).unwrap(), Slot::I32(-1));
    assert_eq!(rt.dyn_get_f64(o, h).unwrap(), -1.0);
}

#[test]
fn test_remap_appends_when_larger() {
    let rt = runtime();
    let o = rt.alloc_dynobj();
    let flag = rt.hash("flag");
    let other = rt.hash("other");
    rt.dyn_set(o, flag, TypeId::BOOL, Slot::Bool(true)).unwrap();
    rt.dyn_set(o, other, TypeId::I8, Slot::I8(3)).unwrap();

    rt.dyn_set_f64(o, flag, 6.25).unwrap();
    let field = rt
        .dynobj_fields(o)
        .unwrap()
        .into_iter()
        .find(|f| f.hashed_name == flag)
        .unwrap();
    assert_eq!(field.offset, 8);
    assert_eq!(field.ty(), TypeId::F64);
    assert_eq!(data_size(o), 16);
    assert_eq!(rt.dyn_get_f64(o, flag).unwrap(), 6.25);
    assert_eq!(rt.dyn_get(o, other, TypeId::I8).unwrap(), Slot::I8(3));
}

#[test]
fn test_pointer_fields() {
    let rt = runtime();
    let o = rt.alloc_dynobj();
    let inner = rt.alloc_dynobj();
    rt.dyn_set_i32(inner, rt.hash("depth"), TypeId::I32, 2).unwrap();
    rt.dyn_set_ptr(o, rt.hash("child"), TypeId::DYN, inner.as_ptr())
        .unwrap();

    let p = rt.dyn_get_ptr(o, rt.hash("child"), TypeId::DYN).unwrap();
    let child = unsafe { ValueRef::from_raw(p) }.unwrap();
    assert_eq!(child, inner);
    assert_eq!(rt.dyn_get_i32(child, rt.hash("depth"), TypeId::I32).unwrap(), 2);
}

#[test]
fn test_field_names() {
    let rt = runtime();
    let o = rt.alloc_dynobj();
    rt.dyn_set_i32(o, rt.hash("width"), TypeId::I32, 1).unwrap();
    rt.dyn_set_i32(o, rt.hash("height"), TypeId::I32, 2).unwrap();
    let mut names = rt.dynobj_field_names(o).unwrap();
    names.sort();
    assert_eq!(names, vec!["height", "width"]);
}

#[test]
fn test_field_names_without_cache() {
    init_logger();
    let rt = Runtime::with_options(
        Arc::new(TypeRegistry::builder().build().unwrap()),
        RuntimeOptions::default().with_cache_field_names(false),
    );
    let o = rt.alloc_dynobj();
    let h = rt.hash("hidden");
    rt.dyn_set_i32(o, h, TypeId::I32, 1).unwrap();
    assert_eq!(rt.dynobj_field_names(o).unwrap(), vec![format!("#{}", h)]);
}

#[test]
fn test_fields_of_non_object() {
    let rt = runtime();
    let boxed = rt.box_i32(1).unwrap();
    assert!(matches!(
        rt.dynobj_fields(boxed),
        Err(HlError::InvalidCast { .. })
    ));
}
