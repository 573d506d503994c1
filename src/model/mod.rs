//! In-memory schema object graph with generation-counted handles.
//!
//! Tables, relationships and views sit in ordered lists at the model root;
//! columns and constraints sit in ordered lists inside their table. Objects
//! can be detached (removed but restorable under the same handle) or
//! destroyed (slot freed, handle invalidated).

mod handle;
mod object;
mod store;

pub use handle::ObjectId;
pub use object::{ObjectType, SchemaObject, Table};

use crate::ast::{Column, Constraint, Entity, Relationship, Schema, View};
use crate::parser::ParseError;

#[derive(Debug, thiserror::Error)]
pub enum ModelError {
    #[error("Unknown or destroyed object {0}")]
    UnknownObject(ObjectId),
    #[error("Object {0} is not live in the model")]
    NotLive(ObjectId),
    #[error("Object {0} is not detached")]
    NotDetached(ObjectId),
    #[error("Invalid parent for {0} object")]
    InvalidParent(ObjectType),
    #[error("Cannot exchange {expected} state with {found} state")]
    KindMismatch {
        expected: ObjectType,
        found: ObjectType,
    },
    #[error("Duplicate {object_type} name: {name}")]
    DuplicateName {
        object_type: ObjectType,
        name: String,
    },
    #[error("{0} objects cannot be rebuilt from a definition")]
    NotRebuildable(ObjectType),
    #[error("Invalid definition: {0}")]
    Definition(#[from] ParseError),
}

#[derive(Debug, Clone, Default)]
struct Children {
    columns: Vec<ObjectId>,
    constraints: Vec<ObjectId>,
}

#[derive(Debug)]
enum SlotState {
    Live {
        object: SchemaObject,
        parent: Option<ObjectId>,
        children: Children,
    },
    Detached {
        object_type: ObjectType,
        /// Name at detach time, so restores can tell detached columns from destroyed ones.
        name: String,
        parent: Option<ObjectId>,
        children: Children,
    },
    Free,
}

#[derive(Debug)]
struct Slot {
    generation: u32,
    state: SlotState,
}

#[derive(Debug, Default)]
pub struct SchemaModel {
    slots: Vec<Slot>,
    free: Vec<u32>,
    tables: Vec<ObjectId>,
    relationships: Vec<ObjectId>,
    views: Vec<ObjectId>,
    dangling: Vec<ObjectId>,
    revalidations: usize,
}

impl SchemaModel {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build a model from a parsed document, preserving declaration order.
    pub fn from_schema(schema: &Schema) -> Result<Self, ModelError> {
        let mut model = Self::new();

        for entity in &schema.entities {
            let table = model.insert(
                Table {
                    name: entity.name.clone(),
                    hints: entity.hints.clone(),
                },
                None,
                None,
            )?;
            for column in &entity.columns {
                model.insert(column.clone(), Some(table), None)?;
            }
            for constraint in &entity.constraints {
                model.insert(constraint.clone(), Some(table), None)?;
            }
        }
        for rel in &schema.relationships {
            model.insert(rel.clone(), None, None)?;
        }
        for view in &schema.views {
            model.insert(view.clone(), None, None)?;
        }

        model.revalidate();
        Ok(model)
    }

    /// Collect the reachable objects back into a parse tree.
    pub fn to_schema(&self) -> Schema {
        let entities = self
            .tables
            .iter()
            .filter_map(|&id| {
                let table = self.get(id)?.as_table()?;
                let children = self.children(id)?;
                Some(Entity {
                    name: table.name.clone(),
                    hints: table.hints.clone(),
                    columns: children
                        .columns
                        .iter()
                        .filter_map(|&c| self.get(c)?.as_column().cloned())
                        .collect(),
                    constraints: children
                        .constraints
                        .iter()
                        .filter_map(|&c| self.get(c)?.as_constraint().cloned())
                        .collect(),
                })
            })
            .collect();

        Schema {
            entities,
            relationships: self
                .relationships
                .iter()
                .filter_map(|&id| self.get(id)?.as_relationship().cloned())
                .collect(),
            views: self
                .views
                .iter()
                .filter_map(|&id| self.get(id)?.as_view().cloned())
                .collect(),
        }
    }

    /// Insert a new object under `parent` (required for columns and constraints)
    /// at `index`, or at the end of the list when `index` is `None`.
    pub fn insert(
        &mut self,
        object: impl Into<SchemaObject>,
        parent: Option<ObjectId>,
        index: Option<usize>,
    ) -> Result<ObjectId, ModelError> {
        let object = object.into();
        let object_type = object.object_type();
        self.check_parent(object_type, parent)?;
        self.check_unique(&object, parent)?;

        let id = self.allocate();
        self.place(id, object_type, parent, index)?;
        self.slots[id.index()].state = SlotState::Live {
            object,
            parent,
            children: Children::default(),
        };
        Ok(id)
    }

    pub fn get(&self, id: ObjectId) -> Option<&SchemaObject> {
        match &self.slot(id)?.state {
            SlotState::Live { object, .. } => Some(object),
            _ => None,
        }
    }

    pub fn get_mut(&mut self, id: ObjectId) -> Option<&mut SchemaObject> {
        match &mut self.slot_mut(id)?.state {
            SlotState::Live { object, .. } => Some(object),
            _ => None,
        }
    }

    /// Take an object out of the model. The handle stays reserved so the
    /// object can be put back by a history undo.
    pub fn remove(&mut self, id: ObjectId) -> Result<SchemaObject, ModelError> {
        self.detach_object(id)
    }

    /// Permanently delete an object and everything it owns, invalidating its handle.
    pub fn destroy(&mut self, id: ObjectId) -> Result<(), ModelError> {
        let slot = self.slot(id).ok_or(ModelError::UnknownObject(id))?;
        if matches!(slot.state, SlotState::Live { .. }) {
            self.detach_object(id)?;
        }
        self.free_slot(id);
        Ok(())
    }

    /// Move an object within its parent's list. Returns the previous position.
    pub fn move_to(&mut self, id: ObjectId, index: usize) -> Result<usize, ModelError> {
        let (object_type, parent) = self.placement(id)?;
        let list = self
            .list_mut(object_type, parent)
            .ok_or(ModelError::InvalidParent(object_type))?;
        let old = list.iter().position(|&o| o == id).ok_or(ModelError::NotLive(id))?;
        list.remove(old);
        let index = index.min(list.len());
        list.insert(index, id);
        Ok(old)
    }

    pub fn tables(&self) -> &[ObjectId] {
        &self.tables
    }

    pub fn relationships(&self) -> &[ObjectId] {
        &self.relationships
    }

    pub fn views(&self) -> &[ObjectId] {
        &self.views
    }

    pub fn columns(&self, table: ObjectId) -> &[ObjectId] {
        self.children(table).map(|c| c.columns.as_slice()).unwrap_or(&[])
    }

    pub fn constraints(&self, table: ObjectId) -> &[ObjectId] {
        self.children(table).map(|c| c.constraints.as_slice()).unwrap_or(&[])
    }

    pub fn find_table(&self, name: &str) -> Option<ObjectId> {
        self.tables
            .iter()
            .copied()
            .find(|&id| self.get(id).and_then(SchemaObject::as_table).is_some_and(|t| t.name == name))
    }

    pub fn find_column(&self, table: ObjectId, name: &str) -> Option<ObjectId> {
        self.columns(table)
            .iter()
            .copied()
            .find(|&id| self.get(id).and_then(SchemaObject::as_column).is_some_and(|c| c.name == name))
    }

    pub fn find_relationship(&self, left: &str, right: &str) -> Option<ObjectId> {
        self.relationships.iter().copied().find(|&id| {
            self.get(id)
                .and_then(SchemaObject::as_relationship)
                .is_some_and(|r| r.left == left && r.right == right)
        })
    }

    pub fn find_view(&self, name: &str) -> Option<ObjectId> {
        self.views
            .iter()
            .copied()
            .find(|&id| self.get(id).and_then(SchemaObject::as_view).is_some_and(|v| v.name == name))
    }

    /// Objects whose references pointed nowhere at the last revalidation.
    pub fn dangling_references(&self) -> &[ObjectId] {
        &self.dangling
    }

    /// Number of relationship revalidation passes run so far.
    pub fn revalidation_count(&self) -> usize {
        self.revalidations
    }

    /// Slots holding a live or detached object.
    pub fn allocated_count(&self) -> usize {
        self.slots
            .iter()
            .filter(|s| !matches!(s.state, SlotState::Free))
            .count()
    }

    fn allocate(&mut self) -> ObjectId {
        match self.free.pop() {
            Some(index) => ObjectId::new(index, self.slots[index as usize].generation),
            None => {
                self.slots.push(Slot {
                    generation: 0,
                    state: SlotState::Free,
                });
                ObjectId::new((self.slots.len() - 1) as u32, 0)
            }
        }
    }

    fn slot(&self, id: ObjectId) -> Option<&Slot> {
        self.slots
            .get(id.index())
            .filter(|s| s.generation == id.generation() && !matches!(s.state, SlotState::Free))
    }

    fn slot_mut(&mut self, id: ObjectId) -> Option<&mut Slot> {
        self.slots
            .get_mut(id.index())
            .filter(|s| s.generation == id.generation() && !matches!(s.state, SlotState::Free))
    }

    fn children(&self, id: ObjectId) -> Option<&Children> {
        match &self.slot(id)?.state {
            SlotState::Live { children, .. } | SlotState::Detached { children, .. } => Some(children),
            SlotState::Free => None,
        }
    }

    fn placement(&self, id: ObjectId) -> Result<(ObjectType, Option<ObjectId>), ModelError> {
        match &self.slot(id).ok_or(ModelError::UnknownObject(id))?.state {
            SlotState::Live { object, parent, .. } => Ok((object.object_type(), *parent)),
            _ => Err(ModelError::NotLive(id)),
        }
    }

    fn list(&self, object_type: ObjectType, parent: Option<ObjectId>) -> Option<&Vec<ObjectId>> {
        match (object_type, parent) {
            (ObjectType::Table, None) => Some(&self.tables),
            (ObjectType::Relationship, None) => Some(&self.relationships),
            (ObjectType::View, None) => Some(&self.views),
            (ObjectType::Column, Some(p)) => self.children(p).map(|c| &c.columns),
            (ObjectType::Constraint, Some(p)) => self.children(p).map(|c| &c.constraints),
            _ => None,
        }
    }

    fn list_mut(&mut self, object_type: ObjectType, parent: Option<ObjectId>) -> Option<&mut Vec<ObjectId>> {
        match (object_type, parent) {
            (ObjectType::Table, None) => Some(&mut self.tables),
            (ObjectType::Relationship, None) => Some(&mut self.relationships),
            (ObjectType::View, None) => Some(&mut self.views),
            (ObjectType::Column, Some(p)) | (ObjectType::Constraint, Some(p)) => {
                let children = match &mut self.slot_mut(p)?.state {
                    SlotState::Live { children, .. } | SlotState::Detached { children, .. } => children,
                    SlotState::Free => return None,
                };
                if object_type == ObjectType::Column {
                    Some(&mut children.columns)
                } else {
                    Some(&mut children.constraints)
                }
            }
            _ => None,
        }
    }

    fn check_parent(&self, object_type: ObjectType, parent: Option<ObjectId>) -> Result<(), ModelError> {
        let valid = match parent {
            None => !object_type.is_child(),
            Some(p) => {
                object_type.is_child()
                    && self.get(p).is_some_and(|o| o.object_type() == ObjectType::Table)
            }
        };
        if valid {
            Ok(())
        } else {
            Err(ModelError::InvalidParent(object_type))
        }
    }

    fn check_unique(&self, object: &SchemaObject, parent: Option<ObjectId>) -> Result<(), ModelError> {
        let clash = match (object, parent) {
            (SchemaObject::Table(t), _) => self.find_table(&t.name).is_some(),
            (SchemaObject::View(v), _) => self.find_view(&v.name).is_some(),
            (SchemaObject::Column(c), Some(table)) => self.find_column(table, &c.name).is_some(),
            _ => false,
        };
        if clash {
            Err(ModelError::DuplicateName {
                object_type: object.object_type(),
                name: object.display_name(),
            })
        } else {
            Ok(())
        }
    }

    fn place(
        &mut self,
        id: ObjectId,
        object_type: ObjectType,
        parent: Option<ObjectId>,
        index: Option<usize>,
    ) -> Result<(), ModelError> {
        let list = self
            .list_mut(object_type, parent)
            .ok_or(ModelError::InvalidParent(object_type))?;
        let index = index.map_or(list.len(), |i| i.min(list.len()));
        list.insert(index, id);
        Ok(())
    }

    fn detach_object(&mut self, id: ObjectId) -> Result<SchemaObject, ModelError> {
        let (object_type, parent) = self.placement(id)?;
        if let Some(list) = self.list_mut(object_type, parent) {
            list.retain(|&o| o != id);
        }

        let slot = &mut self.slots[id.index()];
        match std::mem::replace(&mut slot.state, SlotState::Free) {
            SlotState::Live {
                object,
                parent,
                children,
            } => {
                slot.state = SlotState::Detached {
                    object_type,
                    name: object.display_name(),
                    parent,
                    children,
                };
                Ok(object)
            }
            other => {
                slot.state = other;
                Err(ModelError::NotLive(id))
            }
        }
    }

    fn free_slot(&mut self, id: ObjectId) {
        let Some(slot) = self.slot_mut(id) else {
            return;
        };
        let children = match std::mem::replace(&mut slot.state, SlotState::Free) {
            SlotState::Live { children, .. } | SlotState::Detached { children, .. } => children,
            SlotState::Free => Children::default(),
        };
        slot.generation = slot.generation.wrapping_add(1);
        self.free.push(id.index() as u32);

        for child in children.columns.into_iter().chain(children.constraints) {
            self.free_slot(child);
        }
    }

    /// Reachable means live and, for child objects, inside a live table.
    fn is_reachable(&self, id: ObjectId) -> bool {
        match self.slot(id).map(|s| &s.state) {
            Some(SlotState::Live { parent: None, .. }) => true,
            Some(SlotState::Live { parent: Some(p), .. }) => self.is_reachable(*p),
            _ => false,
        }
    }

    fn table_children(&self, table: ObjectId) -> impl Iterator<Item = (ObjectId, &SchemaObject)> + '_ {
        self.columns(table)
            .iter()
            .chain(self.constraints(table))
            .filter_map(move |&id| Some((id, self.get(id)?)))
    }

    fn table_name(&self, id: ObjectId) -> Option<&str> {
        self.get(id)?.as_table().map(|t| t.name.as_str())
    }

    /// Whether `table` has a column called `name`, either live or detached
    /// and waiting to be restored. Destroyed columns do not count.
    fn owns_column(&self, table: ObjectId, name: &str) -> bool {
        self.find_column(table, name).is_some()
            || self.slots.iter().any(|slot| match &slot.state {
                SlotState::Detached {
                    object_type: ObjectType::Column,
                    name: detached,
                    parent: Some(parent),
                    ..
                } => *parent == table && detached == name,
                _ => false,
            })
    }

    fn has_column(&self, table: &str, column: &str) -> bool {
        self.find_table(table)
            .is_some_and(|t| self.find_column(t, column).is_some())
    }

    fn revalidate(&mut self) {
        let mut dangling = Vec::new();

        for &id in &self.relationships {
            if let Some(rel) = self.get(id).and_then(SchemaObject::as_relationship) {
                if self.find_table(&rel.left).is_none() || self.find_table(&rel.right).is_none() {
                    dangling.push(id);
                }
            }
        }
        for &id in &self.views {
            if let Some(view) = self.get(id).and_then(SchemaObject::as_view) {
                if view.includes.iter().any(|t| self.find_table(t).is_none()) {
                    dangling.push(id);
                }
            }
        }
        for &table in &self.tables {
            for (id, object) in self.table_children(table) {
                let broken = match object {
                    SchemaObject::Column(c) => c
                        .fk_target()
                        .is_some_and(|(t, col)| !self.has_column(t, col)),
                    SchemaObject::Constraint(Constraint::ForeignKey {
                        target,
                        target_columns,
                        ..
                    }) => target_columns.iter().any(|col| !self.has_column(target, col)),
                    _ => false,
                };
                if broken {
                    dangling.push(id);
                }
            }
        }

        self.dangling = dangling;
        self.revalidations += 1;
    }
}

/// Convenience constructors used by editors and tests.
impl SchemaModel {
    pub fn add_table(&mut self, name: &str) -> Result<ObjectId, ModelError> {
        self.insert(Table::new(name), None, None)
    }

    pub fn add_column(&mut self, table: ObjectId, column: Column) -> Result<ObjectId, ModelError> {
        self.insert(column, Some(table), None)
    }

    pub fn add_constraint(&mut self, table: ObjectId, constraint: Constraint) -> Result<ObjectId, ModelError> {
        self.insert(constraint, Some(table), None)
    }

    pub fn add_relationship(&mut self, rel: Relationship) -> Result<ObjectId, ModelError> {
        self.insert(rel, None, None)
    }

    pub fn add_view(&mut self, view: View) -> Result<ObjectId, ModelError> {
        self.insert(view, None, None)
    }
}
