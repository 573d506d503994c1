//! Serializer for converting the parse tree back to ERD notation.
//!
//! The single-object helpers produce exactly what the definition parsers in
//! [`crate::parser`] accept, so a definition can be recorded and replayed.

use crate::ast::{Cardinality, Column, ColumnModifier, Constraint, Entity, Hint, HintValue, Relationship, Schema, View};

/// Serialize a Schema to ERD notation string.
pub fn serialize(schema: &Schema) -> String {
    let mut output = String::new();

    for (i, entity) in schema.entities.iter().enumerate() {
        if i > 0 {
            output.push('\n');
        }
        serialize_entity(&mut output, entity);
    }

    if !schema.relationships.is_empty() {
        output.push_str("\nrel {\n");
        for rel in &schema.relationships {
            output.push_str("    ");
            output.push_str(&relationship_definition(rel));
            output.push('\n');
        }
        output.push_str("}\n");
    }

    for view in &schema.views {
        output.push('\n');
        serialize_view(&mut output, view);
    }

    output
}

fn serialize_entity(output: &mut String, entity: &Entity) {
    output.push_str(&format!("entity {} {{\n", entity.name));

    for hint in &entity.hints {
        output.push_str(&format!("    {}\n", hint_definition(hint)));
    }
    for column in &entity.columns {
        output.push_str(&format!("    {}\n", column_definition(column)));
    }
    for constraint in &entity.constraints {
        output.push_str(&format!("    {}\n", constraint_definition(constraint)));
    }

    output.push_str("}\n");
}

fn serialize_view(output: &mut String, view: &View) {
    output.push_str(&format!("view {} {{\n", view.name));
    if !view.includes.is_empty() {
        output.push_str(&format!("    include {}\n", view.includes.join(", ")));
    }
    output.push_str("}\n");
}

fn hint_definition(hint: &Hint) -> String {
    match &hint.value {
        HintValue::Int(n) => format!("@{} = {}", hint.key, n),
        HintValue::Str(s) => format!("@{} = \"{}\"", hint.key, s),
        HintValue::Ident(s) => format!("@{} = {}", hint.key, s),
    }
}

/// Serialize one column, modifiers in order: pk, unique, not null, fk, default.
pub fn column_definition(column: &Column) -> String {
    let mut output = format!("{} {}", column.name, column.typ);

    let has = |wanted: &ColumnModifier| column.modifiers.iter().any(|m| m == wanted);
    if has(&ColumnModifier::Pk) {
        output.push_str(" pk");
    }
    if has(&ColumnModifier::Unique) {
        output.push_str(" unique");
    }
    if has(&ColumnModifier::NotNull) {
        output.push_str(" not null");
    }

    if let Some((target, col)) = column.fk_target() {
        output.push_str(&format!(" fk -> {}.{}", target, col));
    }

    for modifier in &column.modifiers {
        if let ColumnModifier::Default(val) = modifier {
            output.push_str(&format!(" default {}", val));
        }
    }

    output
}

pub fn constraint_definition(constraint: &Constraint) -> String {
    match constraint {
        Constraint::PrimaryKey(cols) => format!("primary_key({})", cols.join(", ")),
        Constraint::ForeignKey {
            columns,
            target,
            target_columns,
            on_delete,
            on_update,
        } => {
            let mut output = format!(
                "foreign_key({}) references {}({})",
                columns.join(", "),
                target,
                target_columns.join(", ")
            );
            if let Some(action) = on_delete {
                output.push_str(&format!(" on delete {}", action));
            }
            if let Some(action) = on_update {
                output.push_str(&format!(" on update {}", action));
            }
            output
        }
        Constraint::Index { columns, name } => {
            let mut output = format!("index({})", columns.join(", "));
            if let Some(n) = name {
                output.push_str(&format!(" [name = {}]", n));
            }
            output
        }
    }
}

pub fn relationship_definition(rel: &Relationship) -> String {
    let mut output = format!(
        "{} {} -- {} {}",
        rel.left,
        serialize_cardinality(&rel.left_cardinality),
        serialize_cardinality(&rel.right_cardinality),
        rel.right
    );

    if let Some(label) = &rel.label {
        output.push_str(&format!(" : \"{}\"", label));
    }
    if let Some(role) = &rel.role {
        output.push_str(&format!(" as {}", role));
    }

    output
}

fn serialize_cardinality(card: &Cardinality) -> &'static str {
    match card {
        Cardinality::One => "1",
        Cardinality::ZeroOrOne => "0..1",
        Cardinality::Many => "*",
        Cardinality::OneOrMore => "1..*",
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::parser::{parse_column_definition, parse_constraint_definition, Parser};

    #[test]
    fn test_serialize_simple_entity() {
        let schema = Schema {
            entities: vec![Entity {
                name: "User".to_string(),
                columns: vec![
                    Column {
                        name: "id".to_string(),
                        typ: "int".to_string(),
                        modifiers: vec![ColumnModifier::Pk],
                    },
                    Column {
                        name: "email".to_string(),
                        typ: "string".to_string(),
                        modifiers: vec![ColumnModifier::NotNull, ColumnModifier::Unique],
                    },
                ],
                ..Entity::default()
            }],
            ..Schema::default()
        };

        let result = serialize(&schema);
        assert!(result.contains("entity User {"));
        assert!(result.contains("id int pk"));
        assert!(result.contains("email string unique not null"));
    }

    #[test]
    fn test_column_definition_with_fk() {
        let column = Column {
            name: "user_id".to_string(),
            typ: "int".to_string(),
            modifiers: vec![
                ColumnModifier::NotNull,
                ColumnModifier::Fk {
                    target: "User".to_string(),
                    column: "id".to_string(),
                },
            ],
        };

        let definition = column_definition(&column);
        assert_eq!(definition, "user_id int not null fk -> User.id");
        assert_eq!(parse_column_definition(&definition).unwrap(), column);
    }

    #[test]
    fn test_index_definition_is_parseable() {
        let index = Constraint::Index {
            columns: vec!["email".into(), "name".into()],
            name: Some("user_lookup".into()),
        };

        let definition = constraint_definition(&index);
        assert_eq!(definition, "index(email, name) [name = user_lookup]");
        assert_eq!(parse_constraint_definition(&definition).unwrap(), index);
    }

    #[test]
    fn test_serialize_document_reparses() {
        let source = r#"
            entity User {
                @hint.group = "core"
                id int pk
                email string unique
                index(email)
            }
            entity Order {
                id int pk
                user_id int fk -> User.id
                foreign_key(user_id) references User(id) on delete cascade
            }
            rel {
                User 1 -- * Order : "places"
            }
            view core {
                include User, Order
            }
        "#;
        let schema = Parser::new(source).unwrap().parse().unwrap();
        let reparsed = Parser::new(&serialize(&schema)).unwrap().parse().unwrap();
        assert_eq!(reparsed, schema);
    }
}
