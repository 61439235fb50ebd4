use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};
use hlvm_types::{hash_name, HlType, ObjType, TypeId, TypeRegistry};

fn bench_hash(c: &mut Criterion) {
    let mut group = c.benchmark_group("hash");

    for name in ["x", "toString", "hello_world_field_name"] {
        group.bench_with_input(BenchmarkId::new("hash_name", name), &name, |b, name| {
            b.iter(|| hash_name(black_box(name)));
        });
    }

    group.finish();
}

fn bench_lookup(c: &mut Criterion) {
    let mut group = c.benchmark_group("lookup");

    for count in [8usize, 64, 512] {
        let mut builder = TypeRegistry::builder();
        let mut obj = ObjType::new("Bench");
        for i in 0..count {
            obj = obj.field(format!("field{}", i), TypeId::I32);
        }
        let id = builder.add(HlType::Obj(obj));
        let registry = builder.build().unwrap();
        let rt = registry.runtime_object(id).unwrap();
        let target = hash_name(&format!("field{}", count / 2));

        group.bench_with_input(BenchmarkId::new("binary", count), &target, |b, &h| {
            b.iter(|| rt.lookup.find(black_box(h)));
        });
        group.bench_with_input(BenchmarkId::new("linear", count), &target, |b, &h| {
            b.iter(|| rt.lookup.find_linear(black_box(h)));
        });
    }

    group.finish();
}

criterion_group!(benches, bench_hash, bench_lookup);
criterion_main!(benches);
