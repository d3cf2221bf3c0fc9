use super::{DeferredBatch, DeferredCell, ListState, UPDATE_LIST_INFO, build_update_info};
use crate::error::ListError;
use crate::main_tree::{IS_READY, MainTree};
use core_types::{ElementId, FlushOptions, InstanceId, OperationId, ReuseNotification};
use host::ElementHost;
use snapshot::{NodeKey, is_truthy};

/// One `componentAtIndex` request from the native list.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct CellRequest {
    pub cell_index: usize,
    pub operation_id: OperationId,
    pub enable_reuse_notification: bool,
    /// Part of a `componentAtIndexes` batch; the batch flushes the list.
    pub batched: bool,
    pub async_flush: bool,
}

impl<H: ElementHost> MainTree<H> {
    /// Describes `list`'s recorded changes to its native element.
    ///
    /// Returns `false` when the list is unmaterialized or has nothing
    /// recorded; the recording is kept for a later flush in the first case.
    pub(crate) fn flush_list(&mut self, list: NodeKey) -> bool {
        let Some(element) = self.list_element_of(list) else {
            return false;
        };
        let Some(recording) = self.pending.take(list) else {
            return false;
        };
        let full_update = self.config.list_container_full_update
            && self.lists.get(&element).is_some_and(|s| s.list_container);
        let info = build_update_info(&self.tree, list, &recording, full_update);
        log::trace!(target: "list", "flush list {element}: {info:?}");
        match serde_json::to_value([&info]) {
            Ok(value) => self.host.set_attribute(element, UPDATE_LIST_INFO, &value),
            Err(err) => log::error!(target: "list", "cannot encode list update: {err}"),
        }
        let cells = self.tree.children(list);
        if let Some(state) = self.lists.get_mut(&element) {
            state.cells = cells;
        }
        true
    }

    /// Flushes every materialized list with a recording; the others wait
    /// for their first materialization.
    pub fn flush_pending_lists(&mut self) {
        for list in self.pending.lists() {
            if self.tree.get(list).is_none() {
                self.pending.discard(list);
            } else {
                self.flush_list(list);
            }
        }
    }

    /// Drops the recordings of lists whose element already exists.
    pub fn clear_attached_lists(&mut self) {
        for list in self.pending.lists() {
            if self.list_element_of(list).is_some() || self.tree.get(list).is_none() {
                self.pending.discard(list);
            }
        }
    }

    /// Flushes the recording of one list holder immediately.
    pub fn flush_list_by_id(&mut self, id: InstanceId) -> bool {
        self.tree.lookup(id).is_some_and(|key| self.flush_list(key))
    }

    pub fn component_at_index(
        &mut self,
        list: ElementId,
        list_id: ElementId,
        request: CellRequest,
    ) -> Result<Option<ElementId>, ListError> {
        let state = self.lists.get(&list_id).ok_or(ListError::ListRemoved {
            list_id,
            operation: "componentAtIndex",
        })?;
        let cell = state
            .cells
            .get(request.cell_index)
            .copied()
            .filter(|key| self.tree.get(*key).is_some())
            .ok_or(ListError::CellNotFound {
                list_id,
                index: request.cell_index,
            })?;
        if state.deferred.contains_key(&cell) {
            return Err(ListError::PendingDeferredCell {
                list_id,
                index: request.cell_index,
            });
        }

        let deferred = self.tree.data(cell).is_some_and(|d| {
            d.platform_info.is_deferred() && !d.extra_props.get(IS_READY).is_some_and(is_truthy)
        });
        if deferred {
            if !state.list_container {
                return Err(ListError::DeferredRequiresListContainer { list_id });
            }
            log::debug!(target: "list", "cell {} of list {list_id} deferred", request.cell_index);
            if let Some(state) = self.lists.get_mut(&list_id) {
                state.deferred.insert(
                    cell,
                    DeferredCell {
                        list,
                        request,
                        batch: None,
                    },
                );
            }
            return Ok(None);
        }
        self.materialize_cell(list, list_id, cell, request).map(Some)
    }

    /// Renders a batch of cells and flushes the list once.
    ///
    /// Deferred cells report `None`; when the last of them resolves the
    /// batch flush is repeated with their elements filled in.
    pub fn component_at_indexes(
        &mut self,
        list: ElementId,
        list_id: ElementId,
        cell_indexes: &[usize],
        operation_ids: &[OperationId],
        enable_reuse_notification: bool,
        async_flush: bool,
    ) -> Result<Vec<Option<ElementId>>, ListError> {
        let mut element_ids = Vec::with_capacity(cell_indexes.len());
        for (position, cell_index) in cell_indexes.iter().enumerate() {
            let request = CellRequest {
                cell_index: *cell_index,
                operation_id: operation_ids.get(position).copied().unwrap_or_default(),
                enable_reuse_notification,
                batched: true,
                async_flush,
            };
            element_ids.push(self.component_at_index(list, list_id, request)?);
        }

        let waiting: Vec<(usize, NodeKey)> = element_ids
            .iter()
            .enumerate()
            .filter(|(_, element)| element.is_none())
            .filter_map(|(position, _)| {
                let cell = self.lists.get(&list_id)?.cells.get(cell_indexes[position]).copied()?;
                Some((position, cell))
            })
            .collect();
        if !waiting.is_empty() {
            let batch = self.next_batch;
            self.next_batch += 1;
            if let Some(state) = self.lists.get_mut(&list_id) {
                for (position, cell) in &waiting {
                    if let Some(deferred) = state.deferred.get_mut(cell) {
                        deferred.batch = Some((batch, *position));
                    }
                }
            }
            self.batches.insert(
                batch,
                DeferredBatch {
                    list,
                    list_id,
                    element_ids: element_ids.clone(),
                    operation_ids: operation_ids.to_vec(),
                    waiting: waiting.len(),
                },
            );
        }

        self.host.flush_element_tree(
            list,
            FlushOptions {
                trigger_layout: true,
                list_id: Some(list_id),
                element_ids: Some(element_ids.clone()),
                operation_ids: Some(operation_ids.to_vec()),
                ..FlushOptions::default()
            },
        );
        Ok(element_ids)
    }

    /// Produces the element for `cell`, reusing its own element, a recycled
    /// one, or building a fresh one, in that order.
    fn materialize_cell(
        &mut self,
        list: ElementId,
        list_id: ElementId,
        cell: NodeKey,
        request: CellRequest,
    ) -> Result<ElementId, ListError> {
        let (bucket, item_key, template) = {
            let node = self.tree.get(cell).ok_or(ListError::CellNotFound {
                list_id,
                index: request.cell_index,
            })?;
            (
                node.data.platform_info.bucket_key(&node.template),
                node.data.platform_info.item_key(),
                node.template.to_string(),
            )
        };

        if let Some(sign) = self.root_of(cell) {
            let state = self.state_mut(list_id, "componentAtIndex")?;
            if let Some(entries) = state.recycle.get_mut(&bucket)
                && let Some(position) = entries.iter().position(|(element, _)| *element == sign)
            {
                entries.remove(position);
                state.sign_map.insert(sign, cell);
                log::trace!(target: "list", "cell {} reclaims {sign}", request.cell_index);
                self.flush_cell(list, list_id, sign, request, None);
                return Ok(sign);
            }
            // the element stays on screen under a clone; this cell renders anew
            if let Some(clone) = self.take_elements(cell) {
                self.state_mut(list_id, "componentAtIndex")?
                    .sign_map
                    .insert(sign, clone);
            }
        }

        let recycled = loop {
            let entry = self
                .state_mut(list_id, "componentAtIndex")?
                .recycle
                .get_mut(&bucket)
                .and_then(Vec::pop);
            match entry {
                Some((_, old)) if self.tree.get(old).is_none() => continue,
                entry => break entry,
            }
        };
        if let Some((sign, old)) = recycled {
            log::trace!(target: "list", "cell {} recycles {sign}", request.cell_index);
            self.hydrate_into(old, cell);
            self.un_render_elements(old);
            if !self.tree.is_indexed(old) {
                self.free_detached_subtree(old);
            }
            self.state_mut(list_id, "componentAtIndex")?
                .sign_map
                .insert(sign, cell);
            let notification = request.enable_reuse_notification.then(|| ReuseNotification {
                list_element: list,
                item_key,
            });
            self.flush_cell(list, list_id, sign, request, notification);
            return Ok(sign);
        }

        self.ensure_key(cell);
        let sign = self
            .root_of(cell)
            .ok_or(ListError::EmptyCell { template })?;
        self.host.append_element(list, sign);
        self.state_mut(list_id, "componentAtIndex")?
            .sign_map
            .insert(sign, cell);
        self.flush_cell(list, list_id, sign, request, None);
        Ok(sign)
    }

    fn state_mut(&mut self, list_id: ElementId, operation: &'static str) -> Result<&mut ListState, ListError> {
        self.lists
            .get_mut(&list_id)
            .ok_or(ListError::ListRemoved { list_id, operation })
    }

    fn flush_cell(
        &mut self,
        list: ElementId,
        list_id: ElementId,
        sign: ElementId,
        request: CellRequest,
        list_reuse_notification: Option<ReuseNotification>,
    ) {
        let options = if !request.batched {
            FlushOptions {
                trigger_layout: true,
                operation_id: Some(request.operation_id),
                element_id: Some(sign),
                list_id: Some(list_id),
                list_reuse_notification,
                ..FlushOptions::default()
            }
        } else if request.async_flush {
            FlushOptions {
                async_flush: true,
                list_reuse_notification,
                ..FlushOptions::default()
            }
        } else if list_reuse_notification.is_some() {
            FlushOptions {
                list_reuse_notification,
                ..FlushOptions::default()
            }
        } else {
            return;
        };
        log::trace!(target: "list", "flush cell {sign} of list {list}");
        self.host.flush_element_tree(sign, options);
    }

    /// Returns an on-screen cell element to its recycle bucket.
    pub fn enqueue_component(&mut self, list: ElementId, list_id: ElementId, sign: ElementId) -> Result<(), ListError> {
        let state = self.state_mut(list_id, "enqueueComponent")?;
        let Some(cell) = state.sign_map.remove(&sign) else {
            log::debug!(target: "list", "enqueue of unknown element {sign} on list {list}");
            return Ok(());
        };
        let Some(bucket) = self
            .tree
            .get(cell)
            .map(|n| n.data.platform_info.bucket_key(&n.template))
        else {
            log::debug!(target: "list", "element {sign} belonged to a freed cell");
            return Ok(());
        };
        log::trace!(target: "list", "enqueue {sign} into bucket '{bucket}'");
        if let Some(state) = self.lists.get_mut(&list_id) {
            state.recycle.entry(bucket).or_default().push((sign, cell));
        }
        Ok(())
    }

    /// Renders a deferred cell that is ready now.
    ///
    /// Returns `Ok(None)` when `id` is not a pending deferred cell.
    pub fn resolve_deferred(&mut self, id: InstanceId) -> Result<Option<ElementId>, ListError> {
        match self.tree.lookup(id) {
            Some(key) => self.resolve_deferred_key(key),
            None => Ok(None),
        }
    }

    pub(crate) fn resolve_deferred_key(&mut self, cell: NodeKey) -> Result<Option<ElementId>, ListError> {
        let Some((list_id, deferred)) = self
            .lists
            .iter_mut()
            .find_map(|(list_id, state)| state.deferred.remove(&cell).map(|d| (*list_id, d)))
        else {
            return Ok(None);
        };
        let request = CellRequest {
            batched: false,
            ..deferred.request
        };
        let sign = self.materialize_cell(deferred.list, list_id, cell, request)?;
        if let Some((batch, position)) = deferred.batch {
            self.settle_batch(batch, position, Some(sign));
        }
        Ok(Some(sign))
    }

    fn settle_batch(&mut self, batch: u64, position: usize, element: Option<ElementId>) {
        let Some(pending) = self.batches.get_mut(&batch) else {
            return;
        };
        if let Some(slot) = pending.element_ids.get_mut(position) {
            *slot = element;
        }
        pending.waiting = pending.waiting.saturating_sub(1);
        if pending.waiting > 0 {
            return;
        }
        let Some(done) = self.batches.remove(&batch) else {
            return;
        };
        log::trace!(target: "list", "deferred batch {batch} complete");
        self.host.flush_element_tree(
            done.list,
            FlushOptions {
                trigger_layout: true,
                list_id: Some(done.list_id),
                element_ids: Some(done.element_ids),
                operation_ids: Some(done.operation_ids),
                ..FlushOptions::default()
            },
        );
    }

    /// Detaches a removed list cell from the id index.
    ///
    /// A materialized cell stays alive for its list; anything else is freed.
    pub(crate) fn release_list_cell(&mut self, cell: NodeKey) {
        let deferred: Vec<DeferredCell> = self
            .lists
            .values_mut()
            .filter_map(|state| state.deferred.remove(&cell))
            .collect();
        for pending in deferred {
            if let Some((batch, position)) = pending.batch {
                self.settle_batch(batch, position, None);
            }
        }
        for key in self.tree.subtree(cell) {
            self.tree.unindex(key);
        }
        if self.root_of(cell).is_none() {
            self.free_detached_subtree(cell);
        }
    }

    /// Forgets a list element and frees the detached cells it retained.
    pub(crate) fn destroy_list(&mut self, element: ElementId) {
        let Some(state) = self.lists.remove(&element) else {
            return;
        };
        log::debug!(target: "list", "destroy list {element}");
        self.batches.retain(|_, batch| batch.list_id != element);
        for key in state.retained() {
            if self.tree.get(key).is_some()
                && !self.tree.is_indexed(key)
                && self.tree.parent(key).is_none()
            {
                self.free_detached_subtree(key);
            }
        }
    }
}
