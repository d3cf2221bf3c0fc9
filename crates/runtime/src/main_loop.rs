//! Main-thread runtime loop.
//!
//! Contract:
//! - The first screen is rendered, attached and flushed before any command
//!   is read; its serialized tree is the first event sent.
//! - Commands run one at a time, each to completion.
//! - The loop ends on `Shutdown` or once every command sender is gone and
//!   hands the tree back through the join handle.

use bus::{BackgroundEvent, MainCommand, PatchUpdate};
use core_types::{FlushOptions, InstanceId};
use host::ElementHost;
use main_thread::{CellRequest, CtxNotFound, ListError, MainError, MainTree, UpdateOutcome};
use snapshot::{SerializedInstance, decode_patch_list};
use std::sync::mpsc::{Receiver, Sender};
use std::thread::{self, JoinHandle};

pub fn start_main_runtime<H, F>(
    cmd_rx: Receiver<MainCommand>,
    evt_tx: Sender<BackgroundEvent>,
    mut main: MainTree<H>,
    first_screen: F,
) -> JoinHandle<MainTree<H>>
where
    H: ElementHost + Send + 'static,
    F: FnOnce(&mut MainTree<H>) -> Result<InstanceId, MainError> + Send + 'static,
{
    thread::spawn(move || {
        match render_first_screen(&mut main, first_screen) {
            Ok(snapshot) => {
                let _ = evt_tx.send(BackgroundEvent::FirstScreen { snapshot });
            }
            Err(err) => log::error!(target: "runtime", "first screen failed: {err}"),
        }

        while let Ok(cmd) = cmd_rx.recv() {
            match cmd {
                MainCommand::UpdateMainThread(update) => apply_update(&mut main, &update, &evt_tx),
                MainCommand::Reload { version } => main.reload(version),
                MainCommand::ComponentAtIndex {
                    list,
                    list_id,
                    cell_index,
                    operation_id,
                    enable_reuse_notification,
                    reply,
                } => {
                    let request = CellRequest {
                        cell_index,
                        operation_id,
                        enable_reuse_notification,
                        ..CellRequest::default()
                    };
                    let sign = main
                        .component_at_index(list, list_id, request)
                        .unwrap_or_else(|err| {
                            report_list_error(&evt_tx, err);
                            None
                        });
                    let _ = reply.send(sign);
                }
                MainCommand::ComponentAtIndexes {
                    list,
                    list_id,
                    cell_indexes,
                    operation_ids,
                    enable_reuse_notification,
                    async_flush,
                    reply,
                } => {
                    let signs = main
                        .component_at_indexes(
                            list,
                            list_id,
                            &cell_indexes,
                            &operation_ids,
                            enable_reuse_notification,
                            async_flush,
                        )
                        .unwrap_or_else(|err| {
                            report_list_error(&evt_tx, err);
                            Vec::new()
                        });
                    let _ = reply.send(signs);
                }
                MainCommand::EnqueueComponent {
                    list,
                    list_id,
                    sign,
                } => {
                    if let Err(err) = main.enqueue_component(list, list_id, sign) {
                        report_list_error(&evt_tx, err);
                    }
                }
                MainCommand::Shutdown => break,
            }
        }
        log::debug!(target: "runtime", "main loop stopped");
        main
    })
}

fn render_first_screen<H, F>(
    main: &mut MainTree<H>,
    first_screen: F,
) -> Result<SerializedInstance, MainError>
where
    H: ElementHost,
    F: FnOnce(&mut MainTree<H>) -> Result<InstanceId, MainError>,
{
    let root = first_screen(main)?;
    main.ensure_elements(root)?;
    main.flush_pending_lists();
    let page = main.host().page();
    main.host_mut().flush_element_tree(
        page,
        FlushOptions {
            trigger_layout: true,
            ..FlushOptions::default()
        },
    );
    main.serialize(root).ok_or(MainError::UnknownInstance(root))
}

fn apply_update<H: ElementHost>(
    main: &mut MainTree<H>,
    update: &PatchUpdate,
    evt_tx: &Sender<BackgroundEvent>,
) {
    let list = match decode_patch_list(&update.data) {
        Ok(list) => list,
        Err(err) => {
            reject(evt_tx, err.to_string());
            return;
        }
    };
    match main.update_main_thread(update.reload_version, update.is_hydration, &list) {
        Ok(UpdateOutcome::Applied { ctx_not_found }) => {
            for CtxNotFound { id } in ctx_not_found {
                let _ = evt_tx.send(BackgroundEvent::CtxNotFound { id });
            }
        }
        Ok(UpdateOutcome::Stale) => {}
        Err(err) => reject(evt_tx, err.to_string()),
    }
}

fn reject(evt_tx: &Sender<BackgroundEvent>, message: String) {
    log::error!(target: "runtime", "update rejected: {message}");
    let _ = evt_tx.send(BackgroundEvent::PatchRejected { message });
}

fn report_list_error(evt_tx: &Sender<BackgroundEvent>, err: ListError) {
    log::warn!(target: "list", "{err}");
    let _ = evt_tx.send(BackgroundEvent::ListError {
        message: err.to_string(),
    });
}
