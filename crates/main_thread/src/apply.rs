//! Patch application and the per-update driver.
//!
//! Contract:
//! - Ops apply strictly in order.
//! - An op naming an id this tree does not know is skipped and reported as
//!   ctx-not-found; the rest of the patch still applies. An unknown
//!   `InsertBefore` anchor is not reported; the child is appended.
//! - Creating an unknown template, removing a non-child or inserting a node
//!   under its own descendant aborts the patch.
//! - Updates tagged with a reload version older than the current one are
//!   dropped whole.

use crate::error::MainError;
use crate::main_tree::MainTree;
use core_types::{InstanceId, ReloadVersion};
use host::ElementHost;
use snapshot::{PatchList, PatchOp};

/// An op referenced an instance this tree does not have.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct CtxNotFound {
    pub id: InstanceId,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum UpdateOutcome {
    /// The update belonged to an older reload and was ignored.
    Stale,
    Applied { ctx_not_found: Vec<CtxNotFound> },
}

impl<H: ElementHost> MainTree<H> {
    pub fn apply_patch(&mut self, ops: &[PatchOp]) -> Result<Vec<CtxNotFound>, MainError> {
        let mut missing = Vec::new();
        for op in ops {
            if self.config.trace_patches {
                log::debug!(target: "patch", "apply {op:?}");
            }
            self.apply_op(op, &mut missing)?;
        }
        Ok(missing)
    }

    fn apply_op(&mut self, op: &PatchOp, missing: &mut Vec<CtxNotFound>) -> Result<(), MainError> {
        match op {
            PatchOp::CreateElement {
                template,
                id,
                slot_index,
            } => {
                log::trace!(target: "patch", "create {template} #{id} slot {slot_index:?}");
                self.create_instance_with_id(template, *id)?;
            }
            PatchOp::InsertBefore {
                parent,
                child,
                before,
            } => {
                let unknown = [*parent, *child].into_iter().find(|id| !self.contains(*id));
                match unknown {
                    Some(id) => report(missing, id),
                    None => {
                        let anchor = before.filter(|b| self.contains(*b));
                        if anchor != *before {
                            log::debug!(target: "patch", "anchor {before:?} not found; appending");
                        }
                        self.insert_before(*parent, *child, anchor)?;
                    }
                }
            }
            PatchOp::RemoveChild { parent, child } => {
                let unknown = [*parent, *child].into_iter().find(|id| !self.contains(*id));
                match unknown {
                    Some(id) => report(missing, id),
                    None => self.remove_child(*parent, *child)?,
                }
            }
            PatchOp::SetAttribute { id, key, value } => {
                if self.contains(*id) {
                    self.set_attribute(*id, key.clone(), value.clone())?;
                } else {
                    report(missing, *id);
                }
            }
            PatchOp::SetAttributes { id, values } => {
                if self.contains(*id) {
                    self.set_values(*id, values.clone())?;
                } else {
                    report(missing, *id);
                }
            }
            PatchOp::AddDefinition(definition) => {
                if self.config.dev_hot_swap {
                    self.registry.hot_swap(definition.as_ref().clone());
                } else {
                    log::debug!(
                        target: "patch",
                        "ignoring definition {} outside developer mode",
                        definition.template_id
                    );
                }
            }
            PatchOp::OpaqueDefinition(args) => {
                log::warn!(
                    target: "patch",
                    "ignoring unreadable definition {:?}",
                    args.first()
                );
            }
        }
        Ok(())
    }

    /// Applies one update from the background thread and flushes the page.
    pub fn update_main_thread(
        &mut self,
        reload_version: ReloadVersion,
        is_hydration: bool,
        update: &PatchList,
    ) -> Result<UpdateOutcome, MainError> {
        if reload_version < self.reload_version {
            log::debug!(
                target: "patch",
                "dropping update from reload {reload_version:?}, current {:?}",
                self.reload_version
            );
            return Ok(UpdateOutcome::Stale);
        }
        log::trace!(
            target: "patch",
            "update with {} batches, hydration={is_hydration}",
            update.batches.len()
        );
        let mut ctx_not_found = Vec::new();
        for batch in &update.batches {
            self.clear_attached_lists();
            ctx_not_found.extend(self.apply_patch(&batch.ops)?);
            self.flush_pending_lists();
        }
        let page = self.host.page();
        self.host
            .flush_element_tree(page, update.flush_options.clone());
        Ok(UpdateOutcome::Applied { ctx_not_found })
    }

    /// Moves to a newer reload version; older ones are ignored.
    pub fn reload(&mut self, version: ReloadVersion) {
        if version > self.reload_version {
            self.reload_version = version;
        }
    }

    pub fn reload_version(&self) -> ReloadVersion {
        self.reload_version
    }
}

fn report(missing: &mut Vec<CtxNotFound>, id: InstanceId) {
    log::warn!(target: "patch", "ctx not found: {id}");
    missing.push(CtxNotFound { id });
}
