//! Undo/redo history of object model edits.
//!
//! Editors call [`OperationHistory::register_object`] right before changing
//! an object. The history keeps enough state in its pool to reverse the
//! change, and [`undo`](OperationHistory::undo) / [`redo`](OperationHistory::redo)
//! walk the list one operation or one chain at a time.

mod chain;
pub mod operation;
pub mod pool;
mod store;
#[cfg(test)]
mod tests;

pub use operation::{ChainRole, Operation, OperationData, OperationKind, OperationProgress};
pub use pool::{ObjectPool, PoolId};
pub use store::{Describe, ObjectStore};

use std::collections::HashMap;
use std::fmt;
use std::ops::Range;

use log::{debug, trace, warn};

use crate::config::HistoryConfig;
use crate::model::{ModelError, ObjectId, ObjectType};
use chain::ChainBuilder;
use pool::{EntryKind, PoolEntry};

#[derive(Debug, thiserror::Error)]
pub enum HistoryError {
    #[error("Nothing to undo")]
    UndoUnavailable,
    #[error("Nothing to redo")]
    RedoUnavailable,
    #[error("An operation chain is already open")]
    ChainAlreadyOpen,
    #[error("No operation chain is open")]
    ChainNotOpen,
    #[error("Cannot undo or redo while an operation chain is open")]
    ChainOpen,
    #[error("Missing pool entry {0}")]
    MissingPoolEntry(PoolId),
    #[error("Object {0} no longer exists")]
    StaleObject(ObjectId),
    #[error("Object {0} is not live in the model")]
    ObjectNotLive(ObjectId),
    #[error("Object {0} is already in the model")]
    ObjectAlreadyLive(ObjectId),
    #[error("Operation index {0} out of range")]
    IndexOutOfRange(usize),
    #[error("History capacity must be at least 1")]
    InvalidCapacity,
    #[error(transparent)]
    Model(#[from] ModelError),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Direction {
    Undo,
    Redo,
}

impl fmt::Display for Direction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Direction::Undo => f.write_str("undo"),
            Direction::Redo => f.write_str("redo"),
        }
    }
}

/// What applying an operation does to the store.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Effect {
    Detach,
    Attach,
    Exchange,
}

fn effect(kind: OperationKind, direction: Direction) -> Effect {
    match (kind, direction) {
        (OperationKind::Created, Direction::Undo) | (OperationKind::Removed, Direction::Redo) => {
            Effect::Detach
        }
        (OperationKind::Created, Direction::Redo) | (OperationKind::Removed, Direction::Undo) => {
            Effect::Attach
        }
        (OperationKind::Modified | OperationKind::Moved, _) => Effect::Exchange,
    }
}

type ProgressCallback = Box<dyn FnMut(&OperationProgress)>;

pub struct OperationHistory<S: ObjectStore> {
    operations: Vec<Operation>,
    pool: ObjectPool<S::Object>,
    /// Operations below the cursor are done, the rest are undone.
    current: usize,
    config: HistoryConfig,
    chain: ChainBuilder,
    progress: Option<ProgressCallback>,
}

impl<S: ObjectStore> Default for OperationHistory<S> {
    fn default() -> Self {
        Self::new(HistoryConfig::default())
    }
}

impl<S: ObjectStore> fmt::Debug for OperationHistory<S> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("OperationHistory")
            .field("operations", &self.operations)
            .field("current", &self.current)
            .field("pool_len", &self.pool.len())
            .field("config", &self.config)
            .field("chain", &self.chain)
            .finish()
    }
}

impl<S: ObjectStore> OperationHistory<S> {
    pub fn new(config: HistoryConfig) -> Self {
        Self {
            operations: Vec::new(),
            pool: ObjectPool::new(),
            current: 0,
            config,
            chain: ChainBuilder::default(),
            progress: None,
        }
    }

    /// Called once per operation applied by undo and redo.
    pub fn set_progress_callback(&mut self, callback: impl FnMut(&OperationProgress) + 'static) {
        self.progress = Some(Box::new(callback));
    }

    /// Record `object` before it is changed.
    ///
    /// For `Created` the object must already be in the store. Missing
    /// `object_index` and `parent` are read from the store.
    pub fn register_object(
        &mut self,
        store: &mut S,
        object: ObjectId,
        kind: OperationKind,
        object_index: Option<usize>,
        parent: Option<ObjectId>,
    ) -> Result<(), HistoryError> {
        if !store.is_live(object) {
            return Err(HistoryError::ObjectNotLive(object));
        }
        let content = match kind {
            OperationKind::Created => None,
            _ => Some(store.snapshot(object)?),
        };

        self.truncate_redo(store);

        let pool = match kind {
            OperationKind::Created | OperationKind::Removed => {
                let id = match self.pool.find_storage(object) {
                    Some(id) => {
                        self.pool.retain(id);
                        id
                    }
                    None => self.pool.insert(object, EntryKind::Storage, None),
                };
                if let Some(entry) = self.pool.get_mut(id) {
                    entry.content = content;
                }
                id
            }
            OperationKind::Modified | OperationKind::Moved => {
                self.pool.insert(object, EntryKind::Snapshot, content)
            }
        };

        let mut operation = Operation::new(kind, object, pool);
        operation.chain = self.chain.next_role();
        operation.parent = parent.or_else(|| store.parent_of(object));
        operation.object_index = object_index.or_else(|| store.index_of(object));
        operation.definition = store.definition(object);

        debug!(
            "register {} {} ({:?}) at {}",
            kind,
            object,
            operation.chain,
            self.operations.len()
        );
        self.operations.push(operation);
        self.current = self.operations.len();
        self.evict_overflow(store);
        Ok(())
    }

    pub fn start_operation_chain(&mut self) -> Result<(), HistoryError> {
        self.chain.start()?;
        debug!("operation chain started at {}", self.operations.len());
        Ok(())
    }

    pub fn finish_operation_chain(&mut self) -> Result<(), HistoryError> {
        if self.chain.finish()? {
            chain::normalize(&mut self.operations);
        }
        debug!("operation chain finished at {}", self.operations.len());
        Ok(())
    }

    /// Suspend (`true`) or resume (`false`) tagging inside an open chain.
    pub fn ignore_operation_chain(&mut self, ignore: bool) {
        self.chain.ignore(ignore);
    }

    pub fn is_operation_chain_started(&self) -> bool {
        self.chain.is_started()
    }

    /// Reverse the last done operation, or its whole chain.
    pub fn undo(&mut self, store: &mut S) -> Result<(), HistoryError> {
        if self.chain.is_started() {
            return Err(HistoryError::ChainOpen);
        }
        if self.current == 0 {
            return Err(HistoryError::UndoUnavailable);
        }
        let span = chain::undo_span(&self.operations, self.current);
        self.execute(store, span.clone(), Direction::Undo)?;
        self.current = span.start;
        Ok(())
    }

    /// Replay the first undone operation, or its whole chain.
    pub fn redo(&mut self, store: &mut S) -> Result<(), HistoryError> {
        if self.chain.is_started() {
            return Err(HistoryError::ChainOpen);
        }
        if self.current >= self.operations.len() {
            return Err(HistoryError::RedoUnavailable);
        }
        let span = chain::redo_span(&self.operations, self.current);
        self.execute(store, span.clone(), Direction::Redo)?;
        self.current = span.end;
        Ok(())
    }

    /// Drop operations whose pool entry vanished or whose object was destroyed.
    /// A broken chain member takes its whole chain with it. Returns the number purged.
    pub fn validate_operations(&mut self, store: &mut S) -> usize {
        let mut doomed = vec![false; self.operations.len()];
        for (i, op) in self.operations.iter().enumerate() {
            if !self.pool.contains(op.pool) || !store.is_allocated(op.object) {
                for j in chain::chain_bounds(&self.operations, i) {
                    doomed[j] = true;
                }
            }
        }

        let mut purged = 0;
        for i in (0..doomed.len()).rev() {
            if !doomed[i] {
                continue;
            }
            let op = self.operations.remove(i);
            if i < self.current {
                self.current -= 1;
            }
            warn!("purging invalid {} operation on {}", op.kind, op.object);
            self.release_entry(store, op.pool);
            purged += 1;
        }
        purged
    }

    /// Point every operation on `object` at a new position. Returns how many changed.
    pub fn update_object_index(&mut self, object: ObjectId, index: usize) -> usize {
        let mut updated = 0;
        for op in self.operations.iter_mut().filter(|op| op.object == object) {
            op.object_index = Some(index);
            updated += 1;
        }
        updated
    }

    /// Forget the last operation (its whole chain if chained) without
    /// reversing it. Returns the number of operations removed.
    pub fn remove_last_operation(&mut self, store: &mut S) -> usize {
        let Some(last) = self.operations.len().checked_sub(1) else {
            return 0;
        };
        let span = chain::chain_bounds(&self.operations, last);
        let removed: Vec<Operation> = self.operations.drain(span).collect();

        // Nothing tagged by the open chain is left, so the next one starts it again.
        if self.chain.is_started() && chain::open_tail(&self.operations).is_none() {
            self.chain.restart();
        }

        for op in &removed {
            self.release_entry(store, op.pool);
        }
        self.current = self.current.min(self.operations.len());
        debug!("removed last {} operation(s)", removed.len());
        removed.len()
    }

    /// Clear the list and the pool. Held entries stay until teardown.
    pub fn remove_operations(&mut self, store: &mut S) {
        for op in std::mem::take(&mut self.operations) {
            self.release_entry(store, op.pool);
        }
        for entry in self.pool.drain_unheld() {
            free_entry(store, entry);
        }
        self.current = 0;
        self.chain.reset();
        debug!("history cleared, {} held entries kept", self.pool.held_len());
    }

    /// Release everything, held entries included, and free their detached objects.
    pub fn teardown(mut self, store: &mut S) {
        self.remove_operations(store);
        for entry in self.pool.drain() {
            free_entry(store, entry);
        }
    }

    pub fn get_operation_data(&self, store: &S, index: usize) -> Result<OperationData, HistoryError> {
        let op = self
            .operations
            .get(index)
            .ok_or(HistoryError::IndexOutOfRange(index))?;
        let (object_name, object_type) =
            describe(store, &self.pool, op).ok_or(HistoryError::StaleObject(op.object))?;
        Ok(OperationData {
            kind: op.kind,
            object_name,
            object_type,
        })
    }

    pub fn set_maximum_size(&mut self, store: &mut S, max_size: usize) -> Result<(), HistoryError> {
        self.config = HistoryConfig::new(max_size)?;
        self.evict_overflow(store);
        Ok(())
    }

    pub fn maximum_size(&self) -> usize {
        self.config.max_size
    }

    pub fn current_size(&self) -> usize {
        self.operations.len()
    }

    pub fn current_index(&self) -> usize {
        self.current
    }

    pub fn is_undo_available(&self) -> bool {
        self.current > 0
    }

    pub fn is_redo_available(&self) -> bool {
        self.current < self.operations.len()
    }

    pub fn operations(&self) -> &[Operation] {
        &self.operations
    }

    pub fn pool_len(&self) -> usize {
        self.pool.len()
    }

    pub fn held_len(&self) -> usize {
        self.pool.held_len()
    }

    pub fn ref_count(&self, pool: PoolId) -> usize {
        self.pool.ref_count(pool)
    }

    fn truncate_redo(&mut self, store: &mut S) {
        if self.current >= self.operations.len() {
            return;
        }
        let tail: Vec<Operation> = self.operations.drain(self.current..).collect();
        trace!("truncating {} undone operation(s)", tail.len());
        for op in tail {
            self.release_entry(store, op.pool);
        }
    }

    fn evict_overflow(&mut self, store: &mut S) {
        while self.operations.len() > self.config.max_size {
            let op = self.operations.remove(0);
            self.current = self.current.saturating_sub(1);
            trace!("evicting oldest {} operation on {}", op.kind, op.object);
            self.release_entry(store, op.pool);
        }
    }

    fn release_entry(&mut self, store: &mut S, id: PoolId) {
        let Some(entry) = self.pool.release(id) else {
            return;
        };
        let referenced = match (&entry.kind, &entry.content) {
            (EntryKind::Storage, Some(content)) if store.is_allocated(entry.object) => {
                store.is_referenced(entry.object, content)
            }
            _ => false,
        };
        if referenced {
            warn!("holding detached {} until teardown, the model still refers to it", entry.object);
            self.pool.hold(id, entry);
        } else {
            free_entry(store, entry);
        }
    }

    fn execute(&mut self, store: &mut S, span: Range<usize>, direction: Direction) -> Result<(), HistoryError> {
        let order: Vec<usize> = match direction {
            Direction::Undo => span.clone().rev().collect(),
            Direction::Redo => span.clone().collect(),
        };
        self.check_span(store, &order, direction)?;
        debug!("{} {} operation(s) in {:?}", direction, order.len(), span);

        let total = order.len();
        for (step, &i) in order.iter().enumerate() {
            self.apply(store, i, direction)?;
            self.notify(store, i, step + 1, total);
        }

        if self.operations[span].iter().any(|op| op.kind != OperationKind::Moved) {
            store.revalidate_relationships();
        }
        Ok(())
    }

    /// Verify a span can be applied in full before the store is touched.
    fn check_span(&self, store: &S, order: &[usize], direction: Direction) -> Result<(), HistoryError> {
        // Liveness after the operations checked so far have been applied.
        let mut live: HashMap<ObjectId, bool> = HashMap::new();
        let is_live = |live: &HashMap<ObjectId, bool>, id: ObjectId| {
            live.get(&id).copied().unwrap_or_else(|| store.is_live(id))
        };

        for &i in order {
            let op = &self.operations[i];
            let entry = self
                .pool
                .get(op.pool)
                .ok_or(HistoryError::MissingPoolEntry(op.pool))?;
            if !store.is_allocated(op.object) {
                return Err(HistoryError::StaleObject(op.object));
            }
            let touched = live.contains_key(&op.object);

            match effect(op.kind, direction) {
                Effect::Detach => {
                    if !is_live(&live, op.object) {
                        return Err(HistoryError::ObjectNotLive(op.object));
                    }
                    live.insert(op.object, false);
                }
                Effect::Attach => {
                    if is_live(&live, op.object) {
                        return Err(HistoryError::ObjectAlreadyLive(op.object));
                    }
                    if !touched && entry.content.is_none() {
                        return Err(HistoryError::MissingPoolEntry(op.pool));
                    }
                    if let Some(parent) = op.parent {
                        if !is_live(&live, parent) {
                            return Err(HistoryError::ObjectNotLive(parent));
                        }
                    }
                    live.insert(op.object, true);
                }
                Effect::Exchange => {
                    if !is_live(&live, op.object) {
                        return Err(HistoryError::ObjectNotLive(op.object));
                    }
                    if entry.content.is_none() {
                        return Err(HistoryError::MissingPoolEntry(op.pool));
                    }
                }
            }
        }
        Ok(())
    }

    fn apply(&mut self, store: &mut S, i: usize, direction: Direction) -> Result<(), HistoryError> {
        let op = self.operations[i].clone();
        let effect = effect(op.kind, direction);
        trace!("{} {} on {}: {:?}", direction, op.kind, op.object, effect);

        let entry = self
            .pool
            .get_mut(op.pool)
            .ok_or(HistoryError::MissingPoolEntry(op.pool))?;

        match effect {
            Effect::Detach => {
                entry.content = Some(store.detach(op.object)?);
            }
            Effect::Attach => {
                let content = entry
                    .content
                    .take()
                    .ok_or(HistoryError::MissingPoolEntry(op.pool))?;
                store.attach(op.object, content, op.parent, op.object_index)?;
            }
            Effect::Exchange => {
                let content = entry
                    .content
                    .as_mut()
                    .ok_or(HistoryError::MissingPoolEntry(op.pool))?;
                store.exchange(op.object, content)?;

                if let Some(recorded) = op.object_index {
                    if store.index_of(op.object) != Some(recorded) {
                        let previous = store.reposition(op.object, recorded)?;
                        self.operations[i].object_index = Some(previous);
                    }
                }
            }
        }

        if direction == Direction::Undo && effect != Effect::Detach {
            if let Some(definition) = &op.definition {
                store.rebuild(op.object, definition)?;
            }
        }
        Ok(())
    }

    fn notify(&mut self, store: &S, i: usize, step: usize, total: usize) {
        let Some(callback) = self.progress.as_mut() else {
            return;
        };
        if let Some((object_name, object_type)) = describe(store, &self.pool, &self.operations[i]) {
            callback(&OperationProgress {
                step,
                total,
                object_name,
                object_type,
            });
        }
    }
}

/// Name and kind of an operation's object, from the store or its pooled copy.
fn describe<S: ObjectStore>(
    store: &S,
    pool: &ObjectPool<S::Object>,
    op: &Operation,
) -> Option<(String, ObjectType)> {
    let object = store
        .get(op.object)
        .or_else(|| pool.get(op.pool)?.content.as_ref())?;
    Some((object.display_name(), object.object_type()))
}

/// Drop an entry that nothing refers to; detached objects it owned are freed in the store.
fn free_entry<S: ObjectStore>(store: &mut S, entry: PoolEntry<S::Object>) {
    if entry.kind == EntryKind::Storage && entry.content.is_some() {
        store.release(entry.object);
    }
}
