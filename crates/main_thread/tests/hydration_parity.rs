use core_types::InstanceId;
use host::{ElementHost, ElementTree};
use main_thread::{MainTree, RuntimeConfig};
use serde_json::{Value, json};
use snapshot::{
    BackgroundTree, Definition, DefinitionRegistry, ElementTemplate, SlotKind, Updater,
};
use std::sync::Arc;

struct Lcg(u64);

impl Lcg {
    fn next(&mut self) -> u64 {
        self.0 = self
            .0
            .wrapping_mul(6364136223846793005)
            .wrapping_add(1442695040888963407);
        self.0 >> 33
    }

    fn below(&mut self, n: usize) -> usize {
        (self.next() % n as u64) as usize
    }
}

const TEMPLATES: [&str; 2] = ["view", "item"];

fn registry() -> DefinitionRegistry {
    let mut registry = DefinitionRegistry::new();
    for template in TEMPLATES {
        registry.register(
            Definition::new(template)
                .with_element(ElementTemplate::element(template))
                .with_updater(Updater::Attribute {
                    element: 0,
                    name: Arc::from("class"),
                })
                .with_updater(Updater::Attribute {
                    element: 0,
                    name: Arc::from("data-n"),
                })
                .with_slot(SlotKind::Children, 0),
        );
    }
    registry
}

/// Shape of a randomly generated subtree, shared by both sides.
struct Shape {
    template: &'static str,
    values: Vec<Value>,
    children: Vec<Shape>,
}

fn random_shape(rng: &mut Lcg, depth: usize) -> Shape {
    let children = if depth == 0 { 0 } else { rng.below(5) };
    Shape {
        template: TEMPLATES[rng.below(TEMPLATES.len())],
        values: vec![json!(format!("c{}", rng.below(3))), json!(rng.below(2))],
        children: (0..children)
            .map(|_| random_shape(rng, depth - 1))
            .collect(),
    }
}

fn build_main(main: &mut MainTree<ElementTree>, parent: InstanceId, shape: &Shape) {
    let id = main.create_instance(shape.template).unwrap();
    main.set_values(id, shape.values.clone()).unwrap();
    main.append_child(parent, id).unwrap();
    for child in &shape.children {
        build_main(main, id, child);
    }
}

fn build_background(bg: &mut BackgroundTree, parent: InstanceId, shape: &Shape) {
    let id = bg.create_instance(shape.template).unwrap();
    bg.set_values(id, shape.values.clone()).unwrap();
    bg.append_child(parent, id).unwrap();
    for child in &shape.children {
        build_background(bg, id, child);
    }
}

fn assert_native_mirror(main: &MainTree<ElementTree>, id: InstanceId) {
    let Some(root) = main.element_root(id) else {
        return;
    };
    let expected: Vec<_> = main
        .child_nodes(id)
        .iter()
        .filter_map(|child| main.element_root(*child))
        .collect();
    assert_eq!(main.host().children(root), &expected[..]);
    for child in main.child_nodes(id) {
        assert_native_mirror(main, child);
    }
}

fn hydrate_pair(main_shapes: &[Shape], bg_shapes: &[Shape]) -> usize {
    let mut main = MainTree::new(ElementTree::new(), registry(), RuntimeConfig::default());
    let main_root = main.create_instance("root").unwrap();
    for shape in main_shapes {
        build_main(&mut main, main_root, shape);
    }
    main.ensure_elements(main_root).unwrap();
    let snapshot = main.serialize(main_root).unwrap();

    let mut bg = BackgroundTree::new(registry());
    let bg_root = bg.create_instance("root").unwrap();
    for shape in bg_shapes {
        build_background(&mut bg, bg_root, shape);
    }
    assert!(!bg.is_buffering());

    let patch = bg.hydrate(&snapshot, bg_root).unwrap();
    let missing = main.apply_patch(&patch).unwrap();
    assert!(missing.is_empty(), "hydration referenced unknown ids: {missing:?}");

    assert_eq!(bg.hydration_map().get(bg_root), Some(main_root));
    assert_eq!(bg.serialize(main_root), main.serialize(main_root));
    assert_native_mirror(&main, main_root);
    patch.len()
}

#[test]
fn hydration_patch_makes_main_match_background() {
    for seed in 1..=32 {
        let mut rng = Lcg(seed);
        let main_shapes: Vec<_> = (0..rng.below(5)).map(|_| random_shape(&mut rng, 2)).collect();
        let bg_shapes: Vec<_> = (0..rng.below(5)).map(|_| random_shape(&mut rng, 2)).collect();
        hydrate_pair(&main_shapes, &bg_shapes);
    }
}

#[test]
fn identical_first_screens_hydrate_to_nothing() {
    for seed in 1..=8 {
        let shapes = |seed| {
            let mut rng = Lcg(seed);
            (0..4).map(|_| random_shape(&mut rng, 2)).collect::<Vec<_>>()
        };
        assert_eq!(hydrate_pair(&shapes(seed), &shapes(seed)), 0);
    }
}
