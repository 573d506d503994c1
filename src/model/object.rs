use std::fmt;

use crate::ast::{Column, Constraint, Hint, Relationship, View};
use crate::history::Describe;

/// Kind of a schema object, also used as the icon hint in progress events.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ObjectType {
    Table,
    Column,
    Constraint,
    Relationship,
    View,
}

impl ObjectType {
    pub fn from_str(s: &str) -> Option<Self> {
        match s {
            "table" => Some(Self::Table),
            "column" => Some(Self::Column),
            "constraint" => Some(Self::Constraint),
            "rel" | "relationship" => Some(Self::Relationship),
            "view" => Some(Self::View),
            _ => None,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Table => "table",
            Self::Column => "column",
            Self::Constraint => "constraint",
            Self::Relationship => "relationship",
            Self::View => "view",
        }
    }

    /// Child kinds live in a table's ordered lists; the rest sit at the model root.
    pub fn is_child(self) -> bool {
        matches!(self, Self::Column | Self::Constraint)
    }
}

impl fmt::Display for ObjectType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Table payload. Columns and constraints are separate objects owned by the model.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Table {
    pub name: String,
    pub hints: Vec<Hint>,
}

impl Table {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            hints: Vec::new(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SchemaObject {
    Table(Table),
    Column(Column),
    Constraint(Constraint),
    Relationship(Relationship),
    View(View),
}

impl SchemaObject {
    pub fn object_type(&self) -> ObjectType {
        match self {
            SchemaObject::Table(_) => ObjectType::Table,
            SchemaObject::Column(_) => ObjectType::Column,
            SchemaObject::Constraint(_) => ObjectType::Constraint,
            SchemaObject::Relationship(_) => ObjectType::Relationship,
            SchemaObject::View(_) => ObjectType::View,
        }
    }

    pub fn display_name(&self) -> String {
        match self {
            SchemaObject::Table(t) => t.name.clone(),
            SchemaObject::Column(c) => c.name.clone(),
            SchemaObject::Constraint(c) => c.label(),
            SchemaObject::Relationship(r) => match &r.role {
                Some(role) => format!("{}--{} ({})", r.left, r.right, role),
                None => format!("{}--{}", r.left, r.right),
            },
            SchemaObject::View(v) => v.name.clone(),
        }
    }

    /// Objects whose meaning hangs on other tables' names or columns.
    ///
    /// Their history entries carry a textual definition so they can be
    /// rebuilt and re-resolved when restored.
    pub fn is_relationship_bound(&self) -> bool {
        match self {
            SchemaObject::Column(c) => c.fk_target().is_some(),
            SchemaObject::Constraint(c) => !matches!(c, Constraint::PrimaryKey(_)),
            _ => false,
        }
    }

    pub fn as_table(&self) -> Option<&Table> {
        match self {
            SchemaObject::Table(t) => Some(t),
            _ => None,
        }
    }

    pub fn as_table_mut(&mut self) -> Option<&mut Table> {
        match self {
            SchemaObject::Table(t) => Some(t),
            _ => None,
        }
    }

    pub fn as_column(&self) -> Option<&Column> {
        match self {
            SchemaObject::Column(c) => Some(c),
            _ => None,
        }
    }

    pub fn as_column_mut(&mut self) -> Option<&mut Column> {
        match self {
            SchemaObject::Column(c) => Some(c),
            _ => None,
        }
    }

    pub fn as_constraint(&self) -> Option<&Constraint> {
        match self {
            SchemaObject::Constraint(c) => Some(c),
            _ => None,
        }
    }

    pub fn as_constraint_mut(&mut self) -> Option<&mut Constraint> {
        match self {
            SchemaObject::Constraint(c) => Some(c),
            _ => None,
        }
    }

    pub fn as_relationship(&self) -> Option<&Relationship> {
        match self {
            SchemaObject::Relationship(r) => Some(r),
            _ => None,
        }
    }

    pub fn as_relationship_mut(&mut self) -> Option<&mut Relationship> {
        match self {
            SchemaObject::Relationship(r) => Some(r),
            _ => None,
        }
    }

    pub fn as_view(&self) -> Option<&View> {
        match self {
            SchemaObject::View(v) => Some(v),
            _ => None,
        }
    }

    pub fn as_view_mut(&mut self) -> Option<&mut View> {
        match self {
            SchemaObject::View(v) => Some(v),
            _ => None,
        }
    }
}

impl Describe for SchemaObject {
    fn display_name(&self) -> String {
        SchemaObject::display_name(self)
    }

    fn object_type(&self) -> ObjectType {
        SchemaObject::object_type(self)
    }
}

impl From<Table> for SchemaObject {
    fn from(t: Table) -> Self {
        SchemaObject::Table(t)
    }
}

impl From<Column> for SchemaObject {
    fn from(c: Column) -> Self {
        SchemaObject::Column(c)
    }
}

impl From<Constraint> for SchemaObject {
    fn from(c: Constraint) -> Self {
        SchemaObject::Constraint(c)
    }
}

impl From<Relationship> for SchemaObject {
    fn from(r: Relationship) -> Self {
        SchemaObject::Relationship(r)
    }
}

impl From<View> for SchemaObject {
    fn from(v: View) -> Self {
        SchemaObject::View(v)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ast::{Cardinality, ColumnModifier};

    #[test]
    fn test_object_type_from_str() {
        assert_eq!(ObjectType::from_str("rel"), Some(ObjectType::Relationship));
        assert_eq!(ObjectType::from_str("column"), Some(ObjectType::Column));
        assert_eq!(ObjectType::from_str("trigger"), None);
        assert!(ObjectType::Constraint.is_child());
        assert!(!ObjectType::View.is_child());
    }

    #[test]
    fn test_relationship_display_name() {
        let rel = SchemaObject::Relationship(Relationship {
            left: "User".into(),
            left_cardinality: Cardinality::One,
            right: "Post".into(),
            right_cardinality: Cardinality::Many,
            label: None,
            role: Some("author".into()),
        });
        assert_eq!(rel.display_name(), "User--Post (author)");
    }

    #[test]
    fn test_relationship_bound_objects() {
        let mut column = Column::new("user_id", "int");
        assert!(!SchemaObject::Column(column.clone()).is_relationship_bound());

        column.modifiers.push(ColumnModifier::Fk {
            target: "User".into(),
            column: "id".into(),
        });
        assert!(SchemaObject::Column(column).is_relationship_bound());

        let pk = SchemaObject::Constraint(Constraint::PrimaryKey(vec!["id".into()]));
        assert!(!pk.is_relationship_bound());
        assert!(!SchemaObject::Table(Table::new("User")).is_relationship_bound());
    }
}
