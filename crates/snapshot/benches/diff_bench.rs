use criterion::{BatchSize, Criterion, black_box, criterion_group, criterion_main};
use core_types::InstanceId;
use serde_json::json;
use snapshot::{
    BackgroundTree, Definition, DefinitionRegistry, ElementTemplate, SerializedInstance, SlotKind,
    diff_keyed,
};

const SMALL_LIST: usize = 64;
const LARGE_LIST: usize = 10_000;

fn keys(len: usize) -> Vec<String> {
    (0..len).map(|i| format!("t{}", i % 17)).collect()
}

fn shuffled(keys: &[String]) -> Vec<String> {
    // deterministic interleave: odd positions first, then even
    keys.iter()
        .skip(1)
        .step_by(2)
        .chain(keys.iter().step_by(2))
        .cloned()
        .collect()
}

fn bench_diff_identical(c: &mut Criterion) {
    let old = keys(LARGE_LIST);
    c.bench_function("bench_diff_identical_large", |b| {
        b.iter(|| black_box(diff_keyed(black_box(&old), black_box(&old))).actions.len());
    });
}

fn bench_diff_shuffled(c: &mut Criterion) {
    for len in [SMALL_LIST, LARGE_LIST] {
        let old = keys(len);
        let new = shuffled(&old);
        c.bench_function(&format!("bench_diff_shuffled_{len}"), |b| {
            b.iter(|| black_box(diff_keyed(black_box(&old), black_box(&new))).actions.len());
        });
    }
}

fn registry() -> DefinitionRegistry {
    let mut registry = DefinitionRegistry::new();
    registry.register(
        Definition::new("item")
            .with_element(ElementTemplate::element("view"))
            .with_slot(SlotKind::Children, 0),
    );
    registry
}

fn bench_hydrate_matching(c: &mut Criterion) {
    let mut snap = SerializedInstance::new(InstanceId(-1), "root");
    for i in 0..SMALL_LIST {
        snap.children.push(
            SerializedInstance::new(InstanceId(-2 - i as i32), "item").with_values(vec![json!(i)]),
        );
    }
    c.bench_function("bench_hydrate_matching_small", |b| {
        b.iter_batched(
            || {
                let mut bg = BackgroundTree::new(registry());
                let root = bg.create_instance("root").unwrap();
                for i in 0..SMALL_LIST {
                    let item = bg.create_instance("item").unwrap();
                    bg.set_values(item, vec![json!(i)]).unwrap();
                    bg.append_child(root, item).unwrap();
                }
                (bg, root)
            },
            |(mut bg, root)| black_box(bg.hydrate(&snap, root).unwrap().len()),
            BatchSize::SmallInput,
        );
    });
}

criterion_group!(
    benches,
    bench_diff_identical,
    bench_diff_shuffled,
    bench_hydrate_matching
);
criterion_main!(benches);
