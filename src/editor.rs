//! Edits on a schema model, each recorded in the history before it is applied.

use log::debug;

use crate::ast::{Column, Constraint, ColumnModifier, Relationship, View};
use crate::config::HistoryConfig;
use crate::history::{HistoryError, ObjectStore, OperationHistory, OperationKind};
use crate::model::{ModelError, ObjectId, ObjectType, SchemaModel, SchemaObject};
use crate::serializer::serialize;

#[derive(Debug)]
pub struct Editor {
    model: SchemaModel,
    history: OperationHistory<SchemaModel>,
}

impl Editor {
    pub fn new(model: SchemaModel, config: HistoryConfig) -> Self {
        Self {
            model,
            history: OperationHistory::new(config),
        }
    }

    pub fn model(&self) -> &SchemaModel {
        &self.model
    }

    pub fn history(&self) -> &OperationHistory<SchemaModel> {
        &self.history
    }

    pub fn history_mut(&mut self) -> &mut OperationHistory<SchemaModel> {
        &mut self.history
    }

    /// Current model in ERD notation.
    pub fn source(&self) -> String {
        serialize(&self.model.to_schema())
    }

    pub fn add_table(&mut self, name: &str) -> Result<ObjectId, HistoryError> {
        let id = self.model.add_table(name)?;
        self.created(id)
    }

    pub fn add_column(&mut self, table: ObjectId, column: Column) -> Result<ObjectId, HistoryError> {
        let id = self.model.add_column(table, column)?;
        self.created(id)
    }

    pub fn add_constraint(&mut self, table: ObjectId, constraint: Constraint) -> Result<ObjectId, HistoryError> {
        let id = self.model.add_constraint(table, constraint)?;
        self.created(id)
    }

    pub fn add_relationship(&mut self, rel: Relationship) -> Result<ObjectId, HistoryError> {
        let id = self.model.add_relationship(rel)?;
        self.created(id)
    }

    pub fn add_view(&mut self, view: View) -> Result<ObjectId, HistoryError> {
        let id = self.model.add_view(view)?;
        self.created(id)
    }

    /// Remove an object. Tables take the relationships naming them along, as one chain.
    pub fn remove(&mut self, id: ObjectId) -> Result<(), HistoryError> {
        let table_name = match self.model.get(id) {
            Some(SchemaObject::Table(t)) => Some(t.name.clone()),
            Some(_) => None,
            None => return Err(HistoryError::ObjectNotLive(id)),
        };
        let Some(name) = table_name else {
            return self.removed(id);
        };

        let related: Vec<ObjectId> = self
            .model
            .relationships()
            .iter()
            .copied()
            .filter(|&rel| {
                self.model
                    .get(rel)
                    .and_then(SchemaObject::as_relationship)
                    .is_some_and(|r| r.left == name || r.right == name)
            })
            .collect();

        debug!("removing table {} with {} relationship(s)", name, related.len());
        self.in_chain(|editor| {
            for rel in related {
                editor.removed(rel)?;
            }
            editor.removed(id)
        })
    }

    /// Rename a table and rewrite every reference to the old name, as one chain.
    pub fn rename_table(&mut self, id: ObjectId, name: &str) -> Result<(), HistoryError> {
        let old = self
            .model
            .get(id)
            .and_then(SchemaObject::as_table)
            .map(|t| t.name.clone())
            .ok_or(HistoryError::ObjectNotLive(id))?;
        if old == name {
            return Ok(());
        }
        if self.model.find_table(name).is_some() {
            return Err(duplicate(ObjectType::Table, name));
        }
        let referencing = self.references_to(&old);

        self.in_chain(|editor| {
            editor.modify(id, OperationKind::Modified, |object| {
                if let SchemaObject::Table(t) = object {
                    t.name = name.to_string();
                }
            })?;
            for target in referencing {
                editor.modify(target, OperationKind::Modified, |object| {
                    rewrite_table_reference(object, &old, name)
                })?;
            }
            Ok(())
        })
    }

    pub fn rename_column(&mut self, id: ObjectId, name: &str) -> Result<(), HistoryError> {
        self.expect_kind(id, ObjectType::Column)?;
        let taken = ObjectStore::parent_of(&self.model, id)
            .and_then(|table| self.model.find_column(table, name))
            .is_some();
        if taken {
            return Err(duplicate(ObjectType::Column, name));
        }
        self.modify(id, OperationKind::Modified, |object| {
            if let SchemaObject::Column(c) = object {
                c.name = name.to_string();
            }
        })
    }

    pub fn retype_column(&mut self, id: ObjectId, typ: &str) -> Result<(), HistoryError> {
        self.expect_kind(id, ObjectType::Column)?;
        self.modify(id, OperationKind::Modified, |object| {
            if let SchemaObject::Column(c) = object {
                c.typ = typ.to_string();
            }
        })
    }

    /// Reorder an object within its list.
    pub fn move_object(&mut self, id: ObjectId, index: usize) -> Result<(), HistoryError> {
        self.history
            .register_object(&mut self.model, id, OperationKind::Moved, None, None)?;
        self.model.move_to(id, index)?;
        Ok(())
    }

    pub fn start_chain(&mut self) -> Result<(), HistoryError> {
        self.history.start_operation_chain()
    }

    pub fn finish_chain(&mut self) -> Result<(), HistoryError> {
        self.history.finish_operation_chain()
    }

    pub fn undo(&mut self) -> Result<(), HistoryError> {
        self.history.undo(&mut self.model)
    }

    pub fn redo(&mut self) -> Result<(), HistoryError> {
        self.history.redo(&mut self.model)
    }

    /// Drop history entries that no longer match the model.
    pub fn validate(&mut self) -> usize {
        self.history.validate_operations(&mut self.model)
    }

    /// Release the history and hand back the model.
    pub fn into_model(self) -> SchemaModel {
        let Self { mut model, history } = self;
        history.teardown(&mut model);
        model
    }

    fn created(&mut self, id: ObjectId) -> Result<ObjectId, HistoryError> {
        self.history
            .register_object(&mut self.model, id, OperationKind::Created, None, None)?;
        Ok(id)
    }

    fn removed(&mut self, id: ObjectId) -> Result<(), HistoryError> {
        self.history
            .register_object(&mut self.model, id, OperationKind::Removed, None, None)?;
        self.model.remove(id)?;
        Ok(())
    }

    fn modify(
        &mut self,
        id: ObjectId,
        kind: OperationKind,
        change: impl FnOnce(&mut SchemaObject),
    ) -> Result<(), HistoryError> {
        self.history
            .register_object(&mut self.model, id, kind, None, None)?;
        let object = self.model.get_mut(id).ok_or(HistoryError::ObjectNotLive(id))?;
        change(object);
        Ok(())
    }

    fn expect_kind(&self, id: ObjectId, expected: ObjectType) -> Result<(), HistoryError> {
        let found = self
            .model
            .get(id)
            .map(SchemaObject::object_type)
            .ok_or(HistoryError::ObjectNotLive(id))?;
        if found != expected {
            return Err(ModelError::KindMismatch { expected, found }.into());
        }
        Ok(())
    }

    /// Run `edit` inside a chain, unless the caller already opened one.
    fn in_chain<T>(
        &mut self,
        edit: impl FnOnce(&mut Self) -> Result<T, HistoryError>,
    ) -> Result<T, HistoryError> {
        let owned = !self.history.is_operation_chain_started();
        if owned {
            self.history.start_operation_chain()?;
        }
        let result = edit(self);
        if owned {
            self.history.finish_operation_chain()?;
        }
        result
    }

    /// Objects outside the table itself that name `table`.
    fn references_to(&self, table: &str) -> Vec<ObjectId> {
        let model = &self.model;
        let children = model
            .tables()
            .iter()
            .flat_map(|&t| model.columns(t).iter().chain(model.constraints(t)));
        children
            .chain(model.relationships())
            .chain(model.views())
            .copied()
            .filter(|&id| {
                model
                    .get(id)
                    .is_some_and(|object| names_table(object, table))
            })
            .collect()
    }
}

fn duplicate(object_type: ObjectType, name: &str) -> HistoryError {
    ModelError::DuplicateName {
        object_type,
        name: name.to_string(),
    }
    .into()
}

fn names_table(object: &SchemaObject, table: &str) -> bool {
    match object {
        SchemaObject::Column(c) => c.fk_target().is_some_and(|(t, _)| t == table),
        SchemaObject::Constraint(Constraint::ForeignKey { target, .. }) => target == table,
        SchemaObject::Relationship(r) => r.left == table || r.right == table,
        SchemaObject::View(v) => v.includes.iter().any(|t| t == table),
        _ => false,
    }
}

fn rewrite_table_reference(object: &mut SchemaObject, old: &str, new: &str) {
    let rename = |name: &mut String| {
        if *name == old {
            *name = new.to_string();
        }
    };
    match object {
        SchemaObject::Column(c) => {
            for modifier in &mut c.modifiers {
                if let ColumnModifier::Fk { target, .. } = modifier {
                    rename(target);
                }
            }
        }
        SchemaObject::Constraint(Constraint::ForeignKey { target, .. }) => rename(target),
        SchemaObject::Relationship(r) => {
            rename(&mut r.left);
            rename(&mut r.right);
        }
        SchemaObject::View(v) => v.includes.iter_mut().for_each(rename),
        _ => {}
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::history::ChainRole;
    use crate::parser::Parser;

    fn editor() -> Editor {
        let source = r#"
            entity User {
                id int pk
                email string
            }
            entity Post {
                id int pk
                author_id int fk -> User.id
                foreign_key(author_id) references User(id)
            }
            rel {
                User 1 -- * Post
            }
            view social {
                include User, Post
            }
        "#;
        let schema = Parser::new(source).unwrap().parse().unwrap();
        Editor::new(SchemaModel::from_schema(&schema).unwrap(), HistoryConfig::default())
    }

    #[test]
    fn test_add_and_undo_table() {
        let mut editor = editor();
        let id = editor.add_table("Tag").unwrap();
        assert_eq!(editor.model().find_table("Tag"), Some(id));

        editor.undo().unwrap();
        assert!(editor.model().find_table("Tag").is_none());
        editor.redo().unwrap();
        assert_eq!(editor.model().find_table("Tag"), Some(id));
    }

    #[test]
    fn test_remove_table_takes_relationships_in_one_chain() {
        let mut editor = editor();
        let before = editor.source();
        let user = editor.model().find_table("User").unwrap();

        editor.remove(user).unwrap();
        assert!(editor.model().relationships().is_empty());
        assert_eq!(editor.history().current_size(), 2);
        assert_eq!(editor.history().operations()[1].chain(), ChainRole::End);

        editor.undo().unwrap();
        assert_eq!(editor.source(), before);
        assert!(!editor.history().is_undo_available());
    }

    #[test]
    fn test_rename_table_rewrites_references() {
        let mut editor = editor();
        let before = editor.source();
        let user = editor.model().find_table("User").unwrap();

        editor.rename_table(user, "Account").unwrap();
        let after = editor.source();
        assert!(after.contains("author_id int fk -> Account.id"));
        assert!(after.contains("references Account(id)"));
        assert!(after.contains("Account 1 -- * Post"));
        assert!(after.contains("include Account, Post"));
        assert!(!after.contains("User"));
        // Table, fk column, foreign key, relationship, view.
        assert_eq!(editor.history().current_size(), 5);

        editor.undo().unwrap();
        assert_eq!(editor.source(), before);
        assert!(editor.model().dangling_references().is_empty());
    }

    #[test]
    fn test_edits_inside_open_chain_join_it() {
        let mut editor = editor();
        let user = editor.model().find_table("User").unwrap();
        let email = editor.model().find_column(user, "email").unwrap();

        editor.start_chain().unwrap();
        editor.rename_column(email, "mail").unwrap();
        editor.rename_table(user, "Account").unwrap();
        editor.finish_chain().unwrap();

        editor.undo().unwrap();
        assert!(!editor.history().is_undo_available());
        assert_eq!(editor.model().find_column(user, "email"), Some(email));
    }

    #[test]
    fn test_move_and_retype_column() {
        let mut editor = editor();
        let user = editor.model().find_table("User").unwrap();
        let email = editor.model().find_column(user, "email").unwrap();

        editor.move_object(email, 0).unwrap();
        editor.retype_column(email, "text").unwrap();
        assert_eq!(editor.model().columns(user)[0], email);

        editor.undo().unwrap();
        editor.undo().unwrap();
        assert_eq!(editor.model().columns(user)[1], email);
        let column = editor.model().get(email).unwrap().as_column().unwrap();
        assert_eq!(column.typ, "string");
    }

    #[test]
    fn test_rename_column_rejects_tables() {
        let mut editor = editor();
        let user = editor.model().find_table("User").unwrap();
        let err = editor.rename_column(user, "x").unwrap_err();
        assert!(matches!(err, HistoryError::Model(_)));
        assert_eq!(editor.history().current_size(), 0);
    }

    #[test]
    fn test_rename_rejects_taken_names() {
        let mut editor = editor();
        let user = editor.model().find_table("User").unwrap();
        let email = editor.model().find_column(user, "email").unwrap();

        let err = editor.rename_table(user, "Post").unwrap_err();
        assert!(matches!(err, HistoryError::Model(ModelError::DuplicateName { .. })));
        assert!(editor.rename_column(email, "id").is_err());
        assert_eq!(editor.history().current_size(), 0);
    }

    #[test]
    fn test_into_model_releases_history() {
        let mut editor = editor();
        let user = editor.model().find_table("User").unwrap();
        editor.remove(user).unwrap();

        let model = editor.into_model();
        assert!(model.find_table("User").is_none());
        // Post with its three children, and the view.
        assert_eq!(model.allocated_count(), 5);
    }
}
