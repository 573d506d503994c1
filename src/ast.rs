//! Parse tree for ERD notation documents and single object definitions.

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Schema {
    pub entities: Vec<Entity>,
    pub relationships: Vec<Relationship>,
    pub views: Vec<View>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Entity {
    pub name: String,
    pub columns: Vec<Column>,
    pub constraints: Vec<Constraint>,
    pub hints: Vec<Hint>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Column {
    pub name: String,
    pub typ: String,
    pub modifiers: Vec<ColumnModifier>,
}

impl Column {
    pub fn new(name: impl Into<String>, typ: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            typ: typ.into(),
            modifiers: Vec::new(),
        }
    }

    pub fn is_pk(&self) -> bool {
        self.modifiers.iter().any(|m| matches!(m, ColumnModifier::Pk))
    }

    /// Target table and column of an `fk ->` modifier, if any.
    pub fn fk_target(&self) -> Option<(&str, &str)> {
        self.modifiers.iter().find_map(|m| match m {
            ColumnModifier::Fk { target, column } => Some((target.as_str(), column.as_str())),
            _ => None,
        })
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ColumnModifier {
    Pk,
    NotNull,
    Unique,
    Default(String),
    Fk { target: String, column: String },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Constraint {
    PrimaryKey(Vec<String>),
    ForeignKey {
        columns: Vec<String>,
        target: String,
        target_columns: Vec<String>,
        on_delete: Option<String>,
        on_update: Option<String>,
    },
    Index {
        columns: Vec<String>,
        name: Option<String>,
    },
}

impl Constraint {
    /// Local columns the constraint covers.
    pub fn columns(&self) -> &[String] {
        match self {
            Constraint::PrimaryKey(columns) => columns,
            Constraint::ForeignKey { columns, .. } => columns,
            Constraint::Index { columns, .. } => columns,
        }
    }

    pub fn columns_mut(&mut self) -> &mut Vec<String> {
        match self {
            Constraint::PrimaryKey(columns) => columns,
            Constraint::ForeignKey { columns, .. } => columns,
            Constraint::Index { columns, .. } => columns,
        }
    }

    /// Short label used in history listings, e.g. `foreign_key(user_id)`.
    pub fn label(&self) -> String {
        match self {
            Constraint::PrimaryKey(cols) => format!("primary_key({})", cols.join(",")),
            Constraint::ForeignKey { columns, .. } => format!("foreign_key({})", columns.join(",")),
            Constraint::Index { name: Some(name), .. } => name.clone(),
            Constraint::Index { columns, name: None } => format!("index({})", columns.join(",")),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Hint {
    pub key: String,
    pub value: HintValue,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum HintValue {
    Int(i64),
    Str(String),
    Ident(String),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Relationship {
    pub left: String,
    pub left_cardinality: Cardinality,
    pub right: String,
    pub right_cardinality: Cardinality,
    pub label: Option<String>,
    pub role: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Cardinality {
    One,        // 1
    ZeroOrOne,  // 0..1
    Many,       // *
    OneOrMore,  // 1..*
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct View {
    pub name: String,
    pub includes: Vec<String>,
}
