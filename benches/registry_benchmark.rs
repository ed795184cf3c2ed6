use std::hint::black_box;
use std::rc::Rc;

use criterion::{Criterion, criterion_group, criterion_main};
use openworkers_object_bridge::{Bridge, FinalizeFn, LocalHeap, NativePtr, TypedArrayKind};

fn new_bridge() -> Bridge<LocalHeap> {
    let mut bridge = Bridge::new(LocalHeap::new());
    bridge.setup();
    bridge
}

fn bind_and_collect(c: &mut Criterion) {
    c.bench_function("bind_and_collect_1000", |b| {
        b.iter(|| {
            let mut bridge = new_bridge();
            let finalize: FinalizeFn = Rc::new(|_, native, _| {
                black_box(native);
            });

            let scope = bridge.engine_mut().open_scope();
            for i in 1..=1000 {
                let obj = bridge.create_plain_object().unwrap();
                obj.set_finalize_callback(finalize.clone());
                bridge
                    .set_private_data(&obj, NativePtr::from_addr(i * 8))
                    .unwrap();
            }
            bridge.engine_mut().close_scope(scope);

            black_box(bridge.collect_garbage())
        })
    });
}

fn lookup(c: &mut Criterion) {
    let mut bridge = new_bridge();
    let finalize: FinalizeFn = Rc::new(|_, _, _| {});
    let mut objects = Vec::new();

    for i in 1..=1000 {
        let obj = bridge.create_plain_object().unwrap();
        obj.set_finalize_callback(finalize.clone());
        bridge
            .set_private_data(&obj, NativePtr::from_addr(i * 8))
            .unwrap();
        objects.push(obj);
    }

    c.bench_function("object_with_ptr", |b| {
        let mut i = 0;
        b.iter(|| {
            i = i % 1000 + 1;
            black_box(bridge.object_with_ptr(NativePtr::from_addr(i * 8)))
        })
    });

    bridge.cleanup();
}

fn typed_array(c: &mut Criterion) {
    let mut bridge = new_bridge();
    let data = vec![7u8; 4096];

    c.bench_function("create_typed_array_4k", |b| {
        b.iter(|| {
            let array = bridge
                .create_typed_array(TypedArrayKind::Float32, Some(&data), data.len())
                .unwrap();
            black_box(bridge.get_array_length(&array).unwrap())
        })
    });
}

criterion_group!(benches, bind_and_collect, lookup, typed_array);
criterion_main!(benches);
