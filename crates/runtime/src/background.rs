//! Background commit pipeline.
//!
//! Contract:
//! - The first screen is rendered with no patch buffer; the main thread
//!   renders its own copy and hydration reconciles the two.
//! - Updates requested before hydration are queued, not applied. When they
//!   run, ids they captured resolve through the [`HydrationMap`].
//! - The hydration batch is the first batch of the first update. Queued
//!   updates follow it in request order, one batch each.
//! - Every update is stamped with the current reload version.
//! - Ops recorded by an update that fails midway ship with the next one.
//! - A queued update that fails during hydration does not stop the others;
//!   the failures come back as [`RuntimeError::QueuedUpdates`] carrying the
//!   hydration update.

use crate::error::RuntimeError;
use bus::{BackgroundEvent, PatchUpdate};
use core_types::{FlushOptions, InstanceId, ReloadVersion};
use snapshot::{
    BackgroundTree, DefinitionRegistry, HydrationMap, PatchBatch, PatchList, PatchOp,
    SerializedInstance, TreeError, encode_patch_list,
};

pub type DeferredUpdate =
    Box<dyn FnOnce(&mut BackgroundTree, &HydrationMap) -> Result<(), TreeError> + Send>;

pub struct BackgroundRuntime {
    tree: BackgroundTree,
    root: Option<InstanceId>,
    reload_version: ReloadVersion,
    hydrated: bool,
    queued: Vec<DeferredUpdate>,
    carry: Vec<PatchOp>,
    next_batch: u64,
}

impl BackgroundRuntime {
    pub fn new(registry: DefinitionRegistry) -> Self {
        Self {
            tree: BackgroundTree::new(registry),
            root: None,
            reload_version: ReloadVersion::INITIAL,
            hydrated: false,
            queued: Vec::new(),
            carry: Vec::new(),
            next_batch: 1,
        }
    }

    pub fn tree(&self) -> &BackgroundTree {
        &self.tree
    }

    /// Direct access for paths that must not reach the main thread, such as
    /// tear-down. Nothing done here is recorded.
    pub fn tree_mut(&mut self) -> &mut BackgroundTree {
        &mut self.tree
    }

    pub fn root(&self) -> Option<InstanceId> {
        self.root
    }

    pub fn is_hydrated(&self) -> bool {
        self.hydrated
    }

    pub fn queued_updates(&self) -> usize {
        self.queued.len()
    }

    pub fn reload_version(&self) -> ReloadVersion {
        self.reload_version
    }

    pub fn render_first_screen(
        &mut self,
        render: impl FnOnce(&mut BackgroundTree) -> Result<InstanceId, TreeError>,
    ) -> Result<InstanceId, RuntimeError> {
        let root = render(&mut self.tree)?;
        log::debug!(target: "background", "first screen rendered at #{root}");
        self.root = Some(root);
        Ok(root)
    }

    /// Runs `update` inside a patch scope and returns the update to ship,
    /// or queues it while hydration is outstanding.
    pub fn update<F>(&mut self, update: F) -> Result<Option<PatchUpdate>, RuntimeError>
    where
        F: FnOnce(&mut BackgroundTree, &HydrationMap) -> Result<(), TreeError> + Send + 'static,
    {
        if !self.hydrated {
            log::debug!(
                target: "background",
                "update queued behind hydration ({} waiting)",
                self.queued.len() + 1
            );
            self.queued.push(Box::new(update));
            return Ok(None);
        }
        let (batch, result) = self.run(update);
        result?;
        batch
            .map(|batch| self.encode(false, vec![batch]))
            .transpose()
    }

    fn run(
        &mut self,
        update: impl FnOnce(&mut BackgroundTree, &HydrationMap) -> Result<(), TreeError>,
    ) -> (Option<PatchBatch>, Result<(), TreeError>) {
        let map = self.tree.hydration_map().clone();
        self.tree.begin_patch();
        let result = update(&mut self.tree, &map);
        let mut ops = std::mem::take(&mut self.carry);
        ops.extend(self.tree.end_patch());
        if let Err(err) = &result {
            log::error!(target: "background", "update failed after {} ops: {err}", ops.len());
            self.carry = ops;
            return (None, result);
        }
        let batch = (!ops.is_empty()).then(|| self.batch(ops));
        (batch, result)
    }

    fn batch(&mut self, ops: Vec<PatchOp>) -> PatchBatch {
        let id = self.next_batch;
        self.next_batch += 1;
        PatchBatch { id, ops }
    }

    fn encode(
        &self,
        is_hydration: bool,
        batches: Vec<PatchBatch>,
    ) -> Result<PatchUpdate, RuntimeError> {
        let list = PatchList {
            batches,
            flush_options: FlushOptions::default(),
        };
        Ok(PatchUpdate {
            reload_version: self.reload_version,
            is_hydration,
            data: encode_patch_list(&list)?,
        })
    }

    /// Reconciles the main thread's first screen and releases the queue.
    pub fn hydrate(&mut self, snapshot: &SerializedInstance) -> Result<PatchUpdate, RuntimeError> {
        if self.hydrated {
            return Err(RuntimeError::AlreadyHydrated);
        }
        let root = self.root.ok_or(RuntimeError::NoRoot)?;
        let ops = self.tree.hydrate(snapshot, root)?;
        self.root = Some(self.tree.hydration_map().resolve(root));
        self.hydrated = true;

        let mut batches = vec![self.batch(ops)];
        let mut errors = Vec::new();
        for update in std::mem::take(&mut self.queued) {
            let (batch, result) = self.run(update);
            batches.extend(batch);
            if let Err(err) = result {
                errors.push(err);
            }
        }
        log::debug!(target: "background", "hydration update with {} batches", batches.len());
        let update = self.encode(true, batches)?;
        if errors.is_empty() {
            Ok(update)
        } else {
            Err(RuntimeError::QueuedUpdates {
                update: Box::new(update),
                errors,
            })
        }
    }

    /// Starts a new reload generation. The caller forwards it to the main
    /// thread before shipping further updates.
    pub fn reload(&mut self) -> ReloadVersion {
        self.reload_version = self.reload_version.next();
        log::info!(target: "background", "reload {:?}", self.reload_version);
        self.reload_version
    }

    pub fn on_event(&mut self, event: BackgroundEvent) -> Result<Option<PatchUpdate>, RuntimeError> {
        match event {
            BackgroundEvent::FirstScreen { snapshot } => return self.hydrate(&snapshot).map(Some),
            BackgroundEvent::CtxNotFound { id } => {
                log::error!(target: "background", "{}", self.tree.report_ctx_not_found(id));
            }
            BackgroundEvent::ListError { message } => {
                log::error!(target: "list", "{message}");
            }
            BackgroundEvent::PatchRejected { message } => {
                log::error!(target: "background", "main thread rejected update: {message}");
            }
        }
        Ok(None)
    }
}
