use std::cell::RefCell;
use std::rc::Rc;

use super::*;
use crate::ast::Column;
use crate::model::{SchemaModel, SchemaObject};
use crate::parser::Parser;
use crate::listing;
use crate::serializer::serialize;

type History = OperationHistory<SchemaModel>;

const SOURCE: &str = r#"
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
    rel {
        User 1 -- * Order
    }
"#;

fn sample() -> SchemaModel {
    SchemaModel::from_schema(&Parser::new(SOURCE).unwrap().parse().unwrap()).unwrap()
}

fn user(model: &SchemaModel) -> ObjectId {
    model.find_table("User").unwrap()
}

fn column(model: &SchemaModel, table: &str, name: &str) -> ObjectId {
    let table = model.find_table(table).unwrap();
    model.find_column(table, name).unwrap()
}

fn rename(model: &mut SchemaModel, history: &mut History, id: ObjectId, name: &str) {
    history
        .register_object(model, id, OperationKind::Modified, None, None)
        .unwrap();
    match model.get_mut(id).unwrap() {
        SchemaObject::Table(t) => t.name = name.to_string(),
        SchemaObject::Column(c) => c.name = name.to_string(),
        other => panic!("cannot rename {:?}", other),
    }
}

fn create_table(model: &mut SchemaModel, history: &mut History, name: &str) -> ObjectId {
    let id = model.add_table(name).unwrap();
    history
        .register_object(model, id, OperationKind::Created, None, None)
        .unwrap();
    id
}

fn remove(model: &mut SchemaModel, history: &mut History, id: ObjectId) {
    history
        .register_object(model, id, OperationKind::Removed, None, None)
        .unwrap();
    model.remove(id).unwrap();
}

fn column_names(model: &SchemaModel, table: ObjectId) -> Vec<String> {
    model
        .columns(table)
        .iter()
        .map(|&id| model.get(id).unwrap().display_name())
        .collect()
}

#[test]
fn test_undo_all_restores_original_model() {
    let mut model = sample();
    let mut history = History::default();
    let original = model.to_schema();
    let user = user(&model);

    let email = column(&model, "User", "email");
    rename(&mut model, &mut history, email, "mail");

    let age = model.add_column(user, Column::new("age", "int")).unwrap();
    history
        .register_object(&mut model, age, OperationKind::Created, None, None)
        .unwrap();

    let order = model.find_table("Order").unwrap();
    remove(&mut model, &mut history, order);

    assert_ne!(model.to_schema(), original);
    for _ in 0..3 {
        history.undo(&mut model).unwrap();
    }
    assert_eq!(model.to_schema(), original);
    assert_eq!(model.find_table("Order"), Some(order));
    assert!(!history.is_undo_available());
}

#[test]
fn test_undo_then_redo_is_identity() {
    let mut model = sample();
    let mut history = History::default();

    let email = column(&model, "User", "email");
    rename(&mut model, &mut history, email, "mail");
    create_table(&mut model, &mut history, "Invoice");
    let order = model.find_table("Order").unwrap();
    remove(&mut model, &mut history, order);
    let edited = model.to_schema();

    history.undo(&mut model).unwrap();
    history.redo(&mut model).unwrap();
    assert_eq!(model.to_schema(), edited);

    while history.is_undo_available() {
        history.undo(&mut model).unwrap();
    }
    while history.is_redo_available() {
        history.redo(&mut model).unwrap();
    }
    assert_eq!(model.to_schema(), edited);
    assert_eq!(history.current_index(), 3);
}

#[test]
fn test_register_truncates_redo_tail() {
    let mut model = sample();
    let mut history = History::default();
    let email = column(&model, "User", "email");

    rename(&mut model, &mut history, email, "a");
    rename(&mut model, &mut history, email, "b");
    rename(&mut model, &mut history, email, "c");
    history.undo(&mut model).unwrap();
    history.undo(&mut model).unwrap();

    let nickname = column(&model, "User", "nickname");
    rename(&mut model, &mut history, nickname, "nick");

    assert_eq!(history.current_size(), 2);
    assert_eq!(history.current_index(), 2);
    assert_eq!(history.operations()[1].object(), nickname);
    assert_eq!(history.pool_len(), 2);
    assert!(!history.is_redo_available());
}

#[test]
fn test_chain_undoes_as_one_step() {
    let mut model = sample();
    let mut history = History::default();
    let user = user(&model);
    let email = column(&model, "User", "email");
    rename(&mut model, &mut history, email, "mail");

    history.start_operation_chain().unwrap();
    rename(&mut model, &mut history, user, "Account");
    let id = column(&model, "Account", "id");
    rename(&mut model, &mut history, id, "account_id");
    create_table(&mut model, &mut history, "Profile");
    history.finish_operation_chain().unwrap();

    let roles: Vec<ChainRole> = history.operations().iter().map(Operation::chain).collect();
    assert_eq!(
        roles,
        [ChainRole::NoChain, ChainRole::Start, ChainRole::Middle, ChainRole::End]
    );

    history.undo(&mut model).unwrap();
    assert_eq!(history.current_index(), 1);
    assert!(history.is_undo_available());
    assert!(model.find_table("User").is_some());
    assert!(model.find_table("Profile").is_none());
    assert_eq!(column_names(&model, user)[0], "id");

    history.redo(&mut model).unwrap();
    assert_eq!(history.current_index(), 4);
    assert!(model.find_table("Account").is_some());
    assert!(model.find_table("Profile").is_some());
}

#[test]
fn test_chain_at_start_leaves_nothing_to_undo() {
    let mut model = sample();
    let mut history = History::default();
    let email = column(&model, "User", "email");
    let nickname = column(&model, "User", "nickname");

    history.start_operation_chain().unwrap();
    rename(&mut model, &mut history, email, "mail");
    rename(&mut model, &mut history, nickname, "nick");
    history.finish_operation_chain().unwrap();

    history.undo(&mut model).unwrap();
    assert_eq!(history.current_index(), 0);
    assert!(!history.is_undo_available());
}

#[test]
fn test_capacity_evicts_oldest_and_releases_its_entry() {
    let mut model = sample();
    let mut history = History::new(HistoryConfig::new(3).unwrap());
    let email = column(&model, "User", "email");

    rename(&mut model, &mut history, email, "a");
    let oldest = history.operations()[0].pool();
    rename(&mut model, &mut history, email, "b");
    rename(&mut model, &mut history, email, "c");
    assert_eq!(history.ref_count(oldest), 1);

    rename(&mut model, &mut history, email, "d");
    assert_eq!(history.current_size(), 3);
    assert_eq!(history.current_index(), 3);
    assert_eq!(history.ref_count(oldest), 0);
    assert_eq!(history.pool_len(), 3);
    assert!(history.operations().iter().all(|op| op.pool() != oldest));
}

#[test]
fn test_set_maximum_size_trims_immediately() {
    let mut model = sample();
    let mut history = History::default();
    let email = column(&model, "User", "email");
    for name in ["a", "b", "c"] {
        rename(&mut model, &mut history, email, name);
    }

    history.set_maximum_size(&mut model, 2).unwrap();
    assert_eq!(history.maximum_size(), 2);
    assert_eq!(history.current_size(), 2);
    assert_eq!(history.current_index(), 2);

    let err = history.set_maximum_size(&mut model, 0).unwrap_err();
    assert!(matches!(err, HistoryError::InvalidCapacity));
    assert_eq!(history.maximum_size(), 2);
}

#[test]
fn test_remove_last_operation_pops_whole_chain() {
    let mut model = sample();
    let mut history = History::default();
    let email = column(&model, "User", "email");
    let nickname = column(&model, "User", "nickname");
    rename(&mut model, &mut history, email, "mail");

    history.start_operation_chain().unwrap();
    rename(&mut model, &mut history, email, "address");
    rename(&mut model, &mut history, nickname, "nick");
    history.finish_operation_chain().unwrap();
    let edited = model.to_schema();

    assert_eq!(history.remove_last_operation(&mut model), 2);
    assert_eq!(history.current_size(), 1);
    assert_eq!(history.current_index(), 1);
    assert_eq!(history.pool_len(), 1);
    assert_eq!(model.to_schema(), edited);
}

#[test]
fn test_remove_last_operation_restarts_open_chain() {
    let mut model = sample();
    let mut history = History::default();
    let email = column(&model, "User", "email");

    history.start_operation_chain().unwrap();
    rename(&mut model, &mut history, email, "a");
    rename(&mut model, &mut history, email, "b");
    assert_eq!(history.remove_last_operation(&mut model), 2);
    assert!(history.is_operation_chain_started());

    rename(&mut model, &mut history, email, "c");
    assert_eq!(history.operations()[0].chain(), ChainRole::Start);
    history.finish_operation_chain().unwrap();
    // A chain of one is no chain.
    assert_eq!(history.operations()[0].chain(), ChainRole::NoChain);
}

#[test]
fn test_get_operation_data() {
    let mut model = sample();
    let mut history = History::default();
    create_table(&mut model, &mut history, "Invoice");

    let email = column(&model, "User", "email");
    history
        .register_object(&mut model, email, OperationKind::Modified, None, None)
        .unwrap();
    model.get_mut(email).unwrap().as_column_mut().unwrap().typ = "text".into();

    assert_eq!(
        history.get_operation_data(&model, 0).unwrap(),
        OperationData {
            kind: OperationKind::Created,
            object_name: "Invoice".into(),
            object_type: ObjectType::Table,
        }
    );
    assert_eq!(
        history.get_operation_data(&model, 1).unwrap(),
        OperationData {
            kind: OperationKind::Modified,
            object_name: "email".into(),
            object_type: ObjectType::Column,
        }
    );

    // Undone creations are described from the pooled copy.
    history.undo(&mut model).unwrap();
    history.undo(&mut model).unwrap();
    assert_eq!(history.get_operation_data(&model, 0).unwrap().object_name, "Invoice");
    assert!(matches!(
        history.get_operation_data(&model, 2),
        Err(HistoryError::IndexOutOfRange(2))
    ));
}

#[test]
fn test_chain_contract_errors() {
    let mut model = sample();
    let mut history = History::default();
    let email = column(&model, "User", "email");
    rename(&mut model, &mut history, email, "mail");

    assert!(matches!(
        history.finish_operation_chain(),
        Err(HistoryError::ChainNotOpen)
    ));
    history.start_operation_chain().unwrap();
    assert!(matches!(
        history.start_operation_chain(),
        Err(HistoryError::ChainAlreadyOpen)
    ));
    assert!(matches!(history.undo(&mut model), Err(HistoryError::ChainOpen)));
    assert!(matches!(history.redo(&mut model), Err(HistoryError::ChainOpen)));

    history.finish_operation_chain().unwrap();
    history.undo(&mut model).unwrap();
}

#[test]
fn test_ignore_suspends_chain_tagging() {
    let mut model = sample();
    let mut history = History::default();
    let email = column(&model, "User", "email");

    history.start_operation_chain().unwrap();
    rename(&mut model, &mut history, email, "a");
    rename(&mut model, &mut history, email, "b");
    history.ignore_operation_chain(true);
    rename(&mut model, &mut history, email, "c");
    history.ignore_operation_chain(false);
    rename(&mut model, &mut history, email, "d");
    assert_eq!(history.operations()[3].chain(), ChainRole::Middle);
    rename(&mut model, &mut history, email, "e");
    history.finish_operation_chain().unwrap();

    // The ignored operation splits the chain into two runs.
    let roles: Vec<ChainRole> = history.operations().iter().map(Operation::chain).collect();
    assert_eq!(
        roles,
        [
            ChainRole::Start,
            ChainRole::End,
            ChainRole::NoChain,
            ChainRole::Start,
            ChainRole::End
        ]
    );
    history.undo(&mut model).unwrap();
    assert_eq!(history.current_index(), 3);
}

#[test]
fn test_remove_last_keeps_chain_open_after_ignored_split() {
    let mut model = sample();
    let mut history = History::default();

    history.start_operation_chain().unwrap();
    create_table(&mut model, &mut history, "A");
    history.ignore_operation_chain(true);
    create_table(&mut model, &mut history, "B");
    history.ignore_operation_chain(false);
    create_table(&mut model, &mut history, "C");
    assert_eq!(history.remove_last_operation(&mut model), 1);

    // "A" still opens the chain, so "D" continues it.
    create_table(&mut model, &mut history, "D");
    assert_eq!(history.operations()[2].chain(), ChainRole::Middle);
    history.finish_operation_chain().unwrap();

    let roles: Vec<ChainRole> = history.operations().iter().map(Operation::chain).collect();
    assert_eq!(roles, [ChainRole::NoChain; 3]);
    assert!(!listing::render(&history, &model).contains('┌'));
}

#[test]
fn test_undo_and_redo_unavailable() {
    let mut model = sample();
    let mut history = History::default();
    assert!(matches!(history.undo(&mut model), Err(HistoryError::UndoUnavailable)));
    assert!(matches!(history.redo(&mut model), Err(HistoryError::RedoUnavailable)));
}

#[test]
fn test_register_requires_live_object() {
    let mut model = sample();
    let mut history = History::default();
    let email = column(&model, "User", "email");
    model.remove(email).unwrap();

    let err = history
        .register_object(&mut model, email, OperationKind::Modified, None, None)
        .unwrap_err();
    assert!(matches!(err, HistoryError::ObjectNotLive(_)));
    assert_eq!(history.current_size(), 0);
}

#[test]
fn test_register_fills_placement_from_store() {
    let mut model = sample();
    let mut history = History::default();
    let nickname = column(&model, "User", "nickname");

    history
        .register_object(&mut model, nickname, OperationKind::Modified, None, None)
        .unwrap();
    let op = &history.operations()[0];
    assert_eq!(op.parent(), Some(user(&model)));
    assert_eq!(op.object_index(), Some(2));
    assert!(op.definition().is_none());

    let user_id = column(&model, "Order", "user_id");
    history
        .register_object(&mut model, user_id, OperationKind::Modified, None, None)
        .unwrap();
    assert_eq!(
        history.operations()[1].definition(),
        Some("user_id int fk -> User.id")
    );
}

#[test]
fn test_created_and_removed_share_storage() {
    let mut model = sample();
    let mut history = History::default();
    let invoice = create_table(&mut model, &mut history, "Invoice");
    remove(&mut model, &mut history, invoice);

    let ops = history.operations();
    assert_eq!(ops[0].pool(), ops[1].pool());
    assert_eq!(history.ref_count(ops[0].pool()), 2);
    assert_eq!(history.pool_len(), 1);

    history.undo(&mut model).unwrap();
    assert_eq!(model.find_table("Invoice"), Some(invoice));
    history.undo(&mut model).unwrap();
    assert!(model.find_table("Invoice").is_none());
    assert!(model.is_allocated(invoice));

    history.redo(&mut model).unwrap();
    assert_eq!(model.find_table("Invoice"), Some(invoice));
    history.redo(&mut model).unwrap();
    assert!(model.find_table("Invoice").is_none());
}

#[test]
fn test_truncating_undone_creation_frees_its_slot() {
    let mut model = sample();
    let mut history = History::default();
    let temp = create_table(&mut model, &mut history, "Temp");
    history.undo(&mut model).unwrap();
    assert!(model.is_allocated(temp));

    let email = column(&model, "User", "email");
    rename(&mut model, &mut history, email, "mail");
    assert!(!model.is_allocated(temp));
    assert_eq!(history.pool_len(), 1);
}

#[test]
fn test_removed_undo_restores_position() {
    let mut model = sample();
    let mut history = History::default();
    let user = user(&model);
    let email = column(&model, "User", "email");

    remove(&mut model, &mut history, email);
    assert_eq!(column_names(&model, user), ["id", "nickname"]);

    history.undo(&mut model).unwrap();
    assert_eq!(column_names(&model, user), ["id", "email", "nickname"]);
    assert_eq!(model.columns(user)[1], email);
}

#[test]
fn test_moved_exchanges_index_without_revalidation() {
    let mut model = sample();
    let mut history = History::default();
    let user = user(&model);
    let email = column(&model, "User", "email");

    history
        .register_object(&mut model, email, OperationKind::Moved, None, None)
        .unwrap();
    model.move_to(email, 0).unwrap();
    let passes = model.revalidation_count();

    history.undo(&mut model).unwrap();
    assert_eq!(model.index_of(email), Some(1));
    assert_eq!(model.revalidation_count(), passes);

    history.redo(&mut model).unwrap();
    assert_eq!(model.columns(user)[0], email);
    assert_eq!(model.revalidation_count(), passes);

    rename(&mut model, &mut history, email, "mail");
    history.undo(&mut model).unwrap();
    assert_eq!(model.revalidation_count(), passes + 1);
}

#[test]
fn test_update_object_index() {
    let mut model = sample();
    let mut history = History::default();
    let email = column(&model, "User", "email");
    let nickname = column(&model, "User", "nickname");
    rename(&mut model, &mut history, email, "a");
    rename(&mut model, &mut history, nickname, "b");
    rename(&mut model, &mut history, email, "c");

    assert_eq!(history.update_object_index(email, 0), 2);
    assert_eq!(history.operations()[0].object_index(), Some(0));
    assert_eq!(history.operations()[1].object_index(), Some(2));
}

#[test]
fn test_span_is_checked_before_mutation() {
    let mut model = sample();
    let mut history = History::default();
    let user = user(&model);
    let order = model.find_table("Order").unwrap();

    history.start_operation_chain().unwrap();
    rename(&mut model, &mut history, user, "Account");
    rename(&mut model, &mut history, order, "Purchase");
    history.finish_operation_chain().unwrap();

    model.destroy(order).unwrap();
    let err = history.undo(&mut model).unwrap_err();
    assert!(matches!(err, HistoryError::StaleObject(id) if id == order));
    assert!(model.find_table("Account").is_some());
    assert_eq!(history.current_index(), 2);
}

#[test]
fn test_validation_purges_destroyed_objects_with_their_chain() {
    let mut model = sample();
    let mut history = History::default();
    let email = column(&model, "User", "email");
    let order = model.find_table("Order").unwrap();
    let user_id = column(&model, "Order", "user_id");
    rename(&mut model, &mut history, email, "mail");

    history.start_operation_chain().unwrap();
    rename(&mut model, &mut history, order, "Purchase");
    rename(&mut model, &mut history, user_id, "buyer_id");
    history.finish_operation_chain().unwrap();

    assert_eq!(history.validate_operations(&mut model), 0);
    model.destroy(order).unwrap();

    assert_eq!(history.validate_operations(&mut model), 2);
    assert_eq!(history.current_size(), 1);
    assert_eq!(history.current_index(), 1);
    assert_eq!(history.pool_len(), 1);
    history.undo(&mut model).unwrap();
    assert!(model.find_column(user(&model), "email").is_some());
}

#[test]
fn test_validation_shifts_cursor_only_for_done_operations() {
    let mut model = sample();
    let mut history = History::default();
    let email = column(&model, "User", "email");
    let order = model.find_table("Order").unwrap();
    rename(&mut model, &mut history, order, "Purchase");
    rename(&mut model, &mut history, email, "mail");
    history.undo(&mut model).unwrap();
    history.undo(&mut model).unwrap();
    history.redo(&mut model).unwrap();
    assert_eq!(history.current_index(), 1);

    model.destroy(email).unwrap();
    assert_eq!(history.validate_operations(&mut model), 1);
    assert_eq!(history.current_index(), 1);
    assert!(!history.is_redo_available());
}

#[test]
fn test_restored_index_keeps_columns_restored_by_a_later_undo() {
    let mut model = sample();
    let mut history = History::default();
    let before = serialize(&model.to_schema());
    let index = model.constraints(user(&model))[0];
    let nickname = column(&model, "User", "nickname");

    remove(&mut model, &mut history, nickname);
    remove(&mut model, &mut history, index);

    history.undo(&mut model).unwrap();
    let restored = model.get(index).unwrap().as_constraint().unwrap();
    assert_eq!(restored.columns(), ["email".to_string(), "nickname".to_string()]);

    history.undo(&mut model).unwrap();
    assert_eq!(serialize(&model.to_schema()), before);
}

#[test]
fn test_rebuild_drops_destroyed_columns() {
    let mut model = sample();
    let mut history = History::default();
    let user = user(&model);
    let index = model.constraints(user)[0];
    let nickname = column(&model, "User", "nickname");

    remove(&mut model, &mut history, index);
    model.destroy(nickname).unwrap();

    history.undo(&mut model).unwrap();
    let restored = model.get(index).unwrap().as_constraint().unwrap();
    assert_eq!(restored.columns(), ["email".to_string()]);
    assert_eq!(restored.label(), "user_lookup");
}

#[test]
fn test_orphaned_entries_survive_remove_operations() {
    let mut model = sample();
    let mut history = History::default();
    let user = user(&model);
    let before = model.allocated_count();

    // The relationship and Order.user_id still name User.
    remove(&mut model, &mut history, user);
    history.remove_operations(&mut model);

    assert_eq!(history.current_size(), 0);
    assert_eq!(history.current_index(), 0);
    assert_eq!(history.held_len(), 1);
    assert!(model.is_allocated(user));

    history.teardown(&mut model);
    assert!(!model.is_allocated(user));
    // User and its four children.
    assert_eq!(model.allocated_count(), before - 5);
}

#[test]
fn test_unreferenced_removal_is_freed_on_clear() {
    let mut model = sample();
    let mut history = History::default();
    let order = model.find_table("Order").unwrap();
    let relationship = model.relationships()[0];

    remove(&mut model, &mut history, relationship);
    remove(&mut model, &mut history, order);
    history.remove_operations(&mut model);

    assert_eq!(history.held_len(), 0);
    assert_eq!(history.pool_len(), 0);
    assert!(!model.is_allocated(order));
    assert!(!model.is_allocated(relationship));
}

#[test]
fn test_progress_reports_each_step() {
    let mut model = sample();
    let mut history = History::default();
    let events = Rc::new(RefCell::new(Vec::new()));
    let sink = Rc::clone(&events);
    history.set_progress_callback(move |p| sink.borrow_mut().push(p.clone()));

    let email = column(&model, "User", "email");
    let nickname = column(&model, "User", "nickname");
    history.start_operation_chain().unwrap();
    rename(&mut model, &mut history, email, "mail");
    rename(&mut model, &mut history, nickname, "nick");
    create_table(&mut model, &mut history, "Invoice");
    history.finish_operation_chain().unwrap();

    history.undo(&mut model).unwrap();
    let events = events.borrow();
    let steps: Vec<(usize, usize)> = events.iter().map(|p| (p.step, p.total)).collect();
    assert_eq!(steps, [(1, 3), (2, 3), (3, 3)]);
    assert_eq!(events[0].object_name, "Invoice");
    assert_eq!(events[0].object_type, ObjectType::Table);
    assert_eq!(events[2].object_name, "email");
}
