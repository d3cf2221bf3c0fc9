use bus::{Bus, MainCommand, PatchUpdate};
use core_types::InstanceId;
use host::{ElementHost, ElementTree};
use main_thread::{MainError, MainTree, RuntimeConfig};
use mimalloc::MiMalloc;
use runtime::{BackgroundRuntime, RuntimeError, start_main_runtime};
use serde_json::json;
use snapshot::{
    BackgroundTree, Definition, DefinitionRegistry, ElementTemplate, SlotKind, TreeError, Updater,
};
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

#[global_allocator]
static GLOBAL: MiMalloc = MiMalloc;

fn registry() -> DefinitionRegistry {
    let mut registry = DefinitionRegistry::new();
    registry.register(
        Definition::new("card")
            .with_element(ElementTemplate::element("view"))
            .with_element(ElementTemplate::element("text").child_of(0))
            .with_updater(Updater::Attribute {
                element: 1,
                name: Arc::from("text"),
            })
            .with_updater(Updater::Attribute {
                element: 0,
                name: Arc::from("class"),
            })
            .with_slot(SlotKind::Children, 0),
    );
    registry
}

fn cards(titles: &[&str]) -> Vec<Vec<serde_json::Value>> {
    titles
        .iter()
        .map(|title| vec![json!(title), json!("card")])
        .collect()
}

fn main_first_screen(main: &mut MainTree<ElementTree>) -> Result<InstanceId, MainError> {
    let root = main.create_instance("root")?;
    for values in cards(&["loading", "loading"]) {
        let card = main.create_instance("card")?;
        main.set_values(card, values)?;
        main.append_child(root, card)?;
    }
    Ok(root)
}

fn background_first_screen(tree: &mut BackgroundTree) -> Result<InstanceId, TreeError> {
    let root = tree.create_instance("root")?;
    for values in cards(&["inbox", "drafts", "sent"]) {
        let card = tree.create_instance("card")?;
        tree.set_values(card, values)?;
        tree.append_child(root, card)?;
    }
    Ok(root)
}

fn ship(bus: &Bus, update: Option<PatchUpdate>) {
    if let Some(update) = update {
        log::debug!(target: "demo", "shipping {} bytes", update.data.len());
        let _ = bus.cmd_tx.send(MainCommand::UpdateMainThread(update));
    }
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    env_logger::init();

    let config = match std::env::args().nth(1) {
        Some(path) => RuntimeConfig::load(Path::new(&path))?,
        None => RuntimeConfig::default(),
    };
    log::info!(target: "demo", "runtime config: {config:?}");

    let (bus, cmd_rx) = Bus::new();
    let main = MainTree::new(ElementTree::new(), registry(), config);
    let handle = start_main_runtime(cmd_rx, bus.evt_tx.clone(), main, main_first_screen);

    let mut background = BackgroundRuntime::new(registry());
    let root = background.render_first_screen(background_first_screen)?;
    let first = background.tree().child_nodes(root)[0];
    ship(
        &bus,
        background.update(move |tree, map| {
            tree.set_attribute(map.resolve(first), 1usize, json!("card selected"))
        })?,
    );

    let first_screen = bus.evt_rx.recv_timeout(Duration::from_secs(5))?;
    let hydration = match background.on_event(first_screen) {
        Err(err @ RuntimeError::QueuedUpdates { .. }) => {
            log::error!(target: "demo", "{err}");
            err.into_update()
        }
        result => result?,
    };
    ship(&bus, hydration);

    ship(
        &bus,
        background.update(move |tree, map| {
            let root = map.resolve(root);
            let last = tree.child_nodes(root).last().copied();
            match last {
                Some(last) => tree.remove_child(root, last),
                None => Ok(()),
            }
        })?,
    );

    let _ = bus.cmd_tx.send(MainCommand::Shutdown);
    let main = handle.join().map_err(|_| "main thread panicked")?;
    while let Ok(event) = bus.evt_rx.try_recv() {
        ship(&bus, background.on_event(event)?);
    }

    let page = main.host().page();
    print!("{}", main.host().render(page));
    Ok(())
}
