use log::warn;

use super::{Children, ModelError, ObjectId, ObjectType, SchemaModel, SchemaObject, SlotState};
use crate::ast::Constraint;
use crate::history::ObjectStore;
use crate::parser::{parse_column_definition, parse_constraint_definition};
use crate::serializer::{column_definition, constraint_definition};

impl ObjectStore for SchemaModel {
    type Object = SchemaObject;

    fn get(&self, id: ObjectId) -> Option<&SchemaObject> {
        SchemaModel::get(self, id)
    }

    fn is_allocated(&self, id: ObjectId) -> bool {
        self.slot(id).is_some()
    }

    fn parent_of(&self, id: ObjectId) -> Option<ObjectId> {
        match &self.slot(id)?.state {
            SlotState::Live { parent, .. } | SlotState::Detached { parent, .. } => *parent,
            SlotState::Free => None,
        }
    }

    fn index_of(&self, id: ObjectId) -> Option<usize> {
        let (object_type, parent) = self.placement(id).ok()?;
        self.list(object_type, parent)?.iter().position(|&o| o == id)
    }

    fn snapshot(&self, id: ObjectId) -> Result<SchemaObject, ModelError> {
        SchemaModel::get(self, id).cloned().ok_or(ModelError::NotLive(id))
    }

    fn exchange(&mut self, id: ObjectId, state: &mut SchemaObject) -> Result<(), ModelError> {
        let live = self.get_mut(id).ok_or(ModelError::NotLive(id))?;
        if live.object_type() != state.object_type() {
            return Err(ModelError::KindMismatch {
                expected: live.object_type(),
                found: state.object_type(),
            });
        }
        std::mem::swap(live, state);
        Ok(())
    }

    fn detach(&mut self, id: ObjectId) -> Result<SchemaObject, ModelError> {
        self.detach_object(id)
    }

    fn attach(
        &mut self,
        id: ObjectId,
        object: SchemaObject,
        parent: Option<ObjectId>,
        index: Option<usize>,
    ) -> Result<(), ModelError> {
        let expected = match &self.slot(id).ok_or(ModelError::UnknownObject(id))?.state {
            SlotState::Detached { object_type, .. } => *object_type,
            _ => return Err(ModelError::NotDetached(id)),
        };
        if expected != object.object_type() {
            return Err(ModelError::KindMismatch {
                expected,
                found: object.object_type(),
            });
        }
        self.check_parent(expected, parent)?;
        self.place(id, expected, parent, index)?;

        let slot = &mut self.slots[id.index()];
        let children = match std::mem::replace(&mut slot.state, SlotState::Free) {
            SlotState::Detached { children, .. } => children,
            _ => Children::default(),
        };
        slot.state = SlotState::Live {
            object,
            parent,
            children,
        };
        Ok(())
    }

    fn reposition(&mut self, id: ObjectId, index: usize) -> Result<usize, ModelError> {
        self.move_to(id, index)
    }

    fn definition(&self, id: ObjectId) -> Option<String> {
        match SchemaModel::get(self, id)? {
            object if !object.is_relationship_bound() => None,
            SchemaObject::Column(c) => Some(column_definition(c)),
            SchemaObject::Constraint(c) => Some(constraint_definition(c)),
            _ => None,
        }
    }

    fn rebuild(&mut self, id: ObjectId, definition: &str) -> Result<(), ModelError> {
        let object_type = SchemaModel::get(self, id)
            .map(SchemaObject::object_type)
            .ok_or(ModelError::NotLive(id))?;

        let rebuilt = match object_type {
            ObjectType::Column => SchemaObject::Column(parse_column_definition(definition)?),
            ObjectType::Constraint => {
                let mut constraint = parse_constraint_definition(definition)?;
                self.resolve_columns(id, &mut constraint);
                SchemaObject::Constraint(constraint)
            }
            other => return Err(ModelError::NotRebuildable(other)),
        };

        if let Some(live) = self.get_mut(id) {
            *live = rebuilt;
        }
        Ok(())
    }

    fn is_referenced(&self, id: ObjectId, object: &SchemaObject) -> bool {
        match object {
            SchemaObject::Table(table) => self.table_is_referenced(&table.name),
            SchemaObject::Column(column) => {
                let Some(parent) = ObjectStore::parent_of(self, id) else {
                    return false;
                };
                self.column_is_referenced(parent, &column.name)
            }
            _ => false,
        }
    }

    fn release(&mut self, id: ObjectId) {
        if matches!(self.slot(id).map(|s| &s.state), Some(SlotState::Detached { .. })) {
            self.free_slot(id);
        }
    }

    fn revalidate_relationships(&mut self) {
        self.revalidate();
    }
}

impl SchemaModel {
    /// Drop constraint columns that were destroyed in the owning table. Columns
    /// that are only detached are kept, an undo further back may restore them.
    fn resolve_columns(&self, id: ObjectId, constraint: &mut Constraint) {
        let Some(table) = ObjectStore::parent_of(self, id) else {
            return;
        };
        let resolved: Vec<String> = constraint
            .columns()
            .iter()
            .filter(|name| self.owns_column(table, name))
            .cloned()
            .collect();

        if resolved.is_empty() {
            warn!(
                "constraint {} references no existing column, keeping recorded columns",
                constraint.label()
            );
        } else {
            *constraint.columns_mut() = resolved;
        }
    }

    fn table_is_referenced(&self, name: &str) -> bool {
        let by_root = self.relationships.iter().chain(&self.views).any(|&id| {
            match SchemaModel::get(self, id) {
                Some(SchemaObject::Relationship(r)) => r.left == name || r.right == name,
                Some(SchemaObject::View(v)) => v.includes.iter().any(|t| t == name),
                _ => false,
            }
        });

        by_root
            || self.tables.iter().any(|&table| {
                self.table_children(table).any(|(_, object)| match object {
                    SchemaObject::Column(c) => c.fk_target().is_some_and(|(t, _)| t == name),
                    SchemaObject::Constraint(Constraint::ForeignKey { target, .. }) => target == name,
                    _ => false,
                })
            })
    }

    fn column_is_referenced(&self, parent: ObjectId, column: &str) -> bool {
        if !self.is_reachable(parent) {
            return false;
        }
        let Some(table_name) = self.table_name(parent) else {
            return false;
        };

        let local = self
            .table_children(parent)
            .any(|(_, object)| match object {
                SchemaObject::Constraint(c) => c.columns().iter().any(|c| c == column),
                _ => false,
            });

        local
            || self.tables.iter().any(|&table| {
                self.table_children(table).any(|(_, object)| match object {
                    SchemaObject::Column(c) => c.fk_target() == Some((table_name, column)),
                    SchemaObject::Constraint(Constraint::ForeignKey {
                        target,
                        target_columns,
                        ..
                    }) => target == table_name && target_columns.iter().any(|c| c == column),
                    _ => false,
                })
            })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ast::Column;
    use crate::model::Table;
    use crate::parser::Parser;

    fn sample() -> SchemaModel {
        let source = r#"
            entity User {
                id int pk
                email string unique
                nickname string
                index(email, nickname) [name = user_lookup]
            }
            entity Order {
                id int pk
                user_id int fk -> User.id
            }
        "#;
        SchemaModel::from_schema(&Parser::new(source).unwrap().parse().unwrap()).unwrap()
    }

    #[test]
    fn test_detach_and_attach_keep_handle() {
        let mut model = sample();
        let user = model.find_table("User").unwrap();
        let email = model.find_column(user, "email").unwrap();

        let object = ObjectStore::detach(&mut model, email).unwrap();
        assert!(!model.is_live(email));
        assert!(model.is_allocated(email));
        assert_eq!(ObjectStore::parent_of(&model, email), Some(user));

        model.attach(email, object, Some(user), Some(1)).unwrap();
        assert_eq!(model.index_of(email), Some(1));
        assert_eq!(model.find_column(user, "email"), Some(email));
    }

    #[test]
    fn test_attach_requires_detached_slot_of_same_kind() {
        let mut model = sample();
        let user = model.find_table("User").unwrap();
        let email = model.find_column(user, "email").unwrap();

        let err = model
            .attach(email, SchemaObject::Column(Column::new("x", "int")), Some(user), None)
            .unwrap_err();
        assert!(matches!(err, ModelError::NotDetached(_)));

        ObjectStore::detach(&mut model, email).unwrap();
        let err = model
            .attach(email, SchemaObject::Table(Table::new("x")), None, None)
            .unwrap_err();
        assert!(matches!(err, ModelError::KindMismatch { .. }));
    }

    #[test]
    fn test_exchange_swaps_content_in_place() {
        let mut model = sample();
        let user = model.find_table("User").unwrap();
        let email = model.find_column(user, "email").unwrap();

        let mut state = SchemaObject::Column(Column::new("mail", "text"));
        model.exchange(email, &mut state).unwrap();

        assert_eq!(model.find_column(user, "mail"), Some(email));
        assert_eq!(state.display_name(), "email");
    }

    #[test]
    fn test_definition_only_for_relationship_bound_objects() {
        let model = sample();
        let user = model.find_table("User").unwrap();
        let order = model.find_table("Order").unwrap();

        let user_id = model.find_column(order, "user_id").unwrap();
        assert_eq!(model.definition(user_id).as_deref(), Some("user_id int fk -> User.id"));

        let email = model.find_column(user, "email").unwrap();
        assert_eq!(model.definition(email), None);

        let index = model.constraints(user)[0];
        assert_eq!(
            model.definition(index).as_deref(),
            Some("index(email, nickname) [name = user_lookup]")
        );
    }

    #[test]
    fn test_rebuild_drops_missing_columns() {
        let mut model = sample();
        let user = model.find_table("User").unwrap();
        let index = model.constraints(user)[0];
        let nickname = model.find_column(user, "nickname").unwrap();
        let definition = model.definition(index).unwrap();

        model.destroy(nickname).unwrap();
        model.rebuild(index, &definition).unwrap();

        let constraint = SchemaModel::get(&model, index).unwrap().as_constraint().unwrap();
        assert_eq!(constraint.columns(), ["email".to_string()]);
    }

    #[test]
    fn test_rebuild_rejects_tables() {
        let mut model = sample();
        let user = model.find_table("User").unwrap();
        let err = model.rebuild(user, "entity User {}").unwrap_err();
        assert!(matches!(err, ModelError::NotRebuildable(ObjectType::Table)));
    }

    #[test]
    fn test_is_referenced() {
        let mut model = sample();
        let user = model.find_table("User").unwrap();
        let id = model.find_column(user, "id").unwrap();
        let email = model.find_column(user, "email").unwrap();
        let pk = SchemaModel::get(&model, id).cloned().unwrap();

        // Order.user_id points at User.id; the lookup index covers email.
        assert!(model.is_referenced(id, &pk));
        let email_object = ObjectStore::detach(&mut model, email).unwrap();
        assert!(model.is_referenced(email, &email_object));

        let user_object = ObjectStore::detach(&mut model, user).unwrap();
        assert!(model.is_referenced(user, &user_object));

        let order = model.find_table("Order").unwrap();
        let order_object = ObjectStore::detach(&mut model, order).unwrap();
        assert!(!model.is_referenced(order, &order_object));
    }

    #[test]
    fn test_release_frees_only_detached_slots() {
        let mut model = sample();
        let order = model.find_table("Order").unwrap();
        let before = model.allocated_count();

        model.release(order);
        assert_eq!(model.allocated_count(), before);

        ObjectStore::detach(&mut model, order).unwrap();
        model.release(order);
        assert!(!model.is_allocated(order));
        assert_eq!(model.allocated_count(), before - 3);
    }
}
