//! Refcounted arena of object states referenced by history operations.
//!
//! Created and Removed operations on one object share a single *storage*
//! entry: the place its content lives while it is out of the model.
//! Modified and Moved operations each get their own *snapshot* entry.

use std::collections::HashMap;
use std::fmt;

use crate::model::ObjectId;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct PoolId(u64);

impl PoolId {
    pub(crate) fn new(raw: u64) -> Self {
        Self(raw)
    }
}

impl fmt::Display for PoolId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "pool#{}", self.0)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EntryKind {
    Storage,
    Snapshot,
}

#[derive(Debug)]
pub(crate) struct PoolEntry<T> {
    pub object: ObjectId,
    pub kind: EntryKind,
    /// `None` while the object's content is live in the model.
    pub content: Option<T>,
    pub refs: usize,
    /// Unreferenced, but kept because the model still points at its object.
    pub held: bool,
}

#[derive(Debug)]
pub struct ObjectPool<T> {
    entries: HashMap<PoolId, PoolEntry<T>>,
    /// Storage entry of each object that still has one in use.
    storage: HashMap<ObjectId, PoolId>,
    next_id: u64,
}

impl<T> Default for ObjectPool<T> {
    fn default() -> Self {
        Self {
            entries: HashMap::new(),
            storage: HashMap::new(),
            next_id: 0,
        }
    }
}

impl<T> ObjectPool<T> {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add an entry with one reference.
    pub(crate) fn insert(&mut self, object: ObjectId, kind: EntryKind, content: Option<T>) -> PoolId {
        let id = PoolId::new(self.next_id);
        self.next_id += 1;
        if kind == EntryKind::Storage {
            self.storage.insert(object, id);
        }
        self.entries.insert(
            id,
            PoolEntry {
                object,
                kind,
                content,
                refs: 1,
                held: false,
            },
        );
        id
    }

    /// Live storage entry of `object`, if some operation still uses one.
    pub(crate) fn find_storage(&self, object: ObjectId) -> Option<PoolId> {
        self.storage.get(&object).copied()
    }

    pub(crate) fn retain(&mut self, id: PoolId) {
        if let Some(entry) = self.entries.get_mut(&id) {
            entry.refs += 1;
        }
    }

    /// Drop one reference. The entry is handed back once nothing refers to it.
    pub(crate) fn release(&mut self, id: PoolId) -> Option<PoolEntry<T>> {
        let entry = self.entries.get_mut(&id)?;
        entry.refs = entry.refs.saturating_sub(1);
        if entry.refs == 0 {
            if self.storage.get(&entry.object) == Some(&id) {
                self.storage.remove(&entry.object);
            }
            self.entries.remove(&id)
        } else {
            None
        }
    }

    /// Put an unreferenced entry back and mark it held until teardown.
    pub(crate) fn hold(&mut self, id: PoolId, mut entry: PoolEntry<T>) {
        entry.refs = 0;
        entry.held = true;
        self.entries.insert(id, entry);
    }

    pub(crate) fn get(&self, id: PoolId) -> Option<&PoolEntry<T>> {
        self.entries.get(&id)
    }

    pub(crate) fn get_mut(&mut self, id: PoolId) -> Option<&mut PoolEntry<T>> {
        self.entries.get_mut(&id)
    }

    pub fn contains(&self, id: PoolId) -> bool {
        self.entries.contains_key(&id)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn held_len(&self) -> usize {
        self.entries.values().filter(|e| e.held).count()
    }

    pub fn ref_count(&self, id: PoolId) -> usize {
        self.entries.get(&id).map_or(0, |e| e.refs)
    }

    /// Remove every entry that is not held.
    pub(crate) fn drain_unheld(&mut self) -> Vec<PoolEntry<T>> {
        let ids: Vec<PoolId> = self
            .entries
            .iter()
            .filter(|(_, e)| !e.held)
            .map(|(&id, _)| id)
            .collect();
        self.storage.clear();
        ids.into_iter().filter_map(|id| self.entries.remove(&id)).collect()
    }

    pub(crate) fn drain(&mut self) -> Vec<PoolEntry<T>> {
        self.storage.clear();
        self.entries.drain().map(|(_, e)| e).collect()
    }
}
