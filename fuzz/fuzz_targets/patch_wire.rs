#![no_main]

use host::ElementTree;
use libfuzzer_sys::fuzz_target;
use main_thread::{MainTree, RuntimeConfig};
use snapshot::{Definition, DefinitionRegistry, ElementTemplate, SlotKind, decode_patch_list};

fn registry() -> DefinitionRegistry {
    let mut registry = DefinitionRegistry::new();
    registry.register(
        Definition::new("view")
            .with_element(ElementTemplate::element("view"))
            .with_slot(SlotKind::Children, 0),
    );
    registry.register(
        Definition::new("list")
            .with_element(ElementTemplate::list())
            .with_slot(SlotKind::ListChildren, 0),
    );
    registry
}

// Arbitrary payloads may be rejected but must never panic the applier.
fuzz_target!(|data: &[u8]| {
    let Ok(text) = std::str::from_utf8(data) else {
        return;
    };
    let Ok(list) = decode_patch_list(text) else {
        return;
    };
    let mut main = MainTree::new(ElementTree::new(), registry(), RuntimeConfig::default());
    for batch in &list.batches {
        if main.apply_patch(&batch.ops).is_err() {
            return;
        }
        main.flush_pending_lists();
    }
});
