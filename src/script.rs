//! Line-oriented edit scripts replayed against an [`Editor`].
//!
//! ```text
//! add table Tag
//! add column Tag.label string not null
//! chain begin
//! rename table User Account
//! remove rel Account Post
//! chain end
//! undo
//! ```

use log::debug;

use crate::ast::{Column, Constraint, Relationship, View};
use crate::config::HistoryConfig;
use crate::editor::Editor;
use crate::history::HistoryError;
use crate::lexer::Token;
use crate::model::{ModelError, ObjectId, ObjectType, SchemaModel};
use crate::parser::{ParseError, Parser};

#[derive(Debug, thiserror::Error)]
pub enum ScriptError {
    #[error("Syntax error: {0}")]
    Parse(#[from] ParseError),
    #[error(transparent)]
    History(#[from] HistoryError),
    #[error(transparent)]
    Model(#[from] ModelError),
    #[error("Unknown command: {0}")]
    UnknownCommand(String),
    #[error("Unknown object kind: {0}")]
    UnknownKind(String),
    #[error("{object_type} not found: {name}")]
    NotFound { object_type: ObjectType, name: String },
    #[error("Invalid position: {0}")]
    InvalidPosition(i64),
    #[error("line {line}: {source}")]
    Line {
        line: usize,
        source: Box<ScriptError>,
    },
}

impl ScriptError {
    fn at(self, line: usize) -> Self {
        ScriptError::Line {
            line,
            source: Box::new(self),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Target {
    Table(String),
    Column { table: String, column: String },
    /// Constraint by its position in the table's constraint list.
    Constraint { table: String, position: usize },
    Relationship { left: String, right: String },
    View(String),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    AddTable(String),
    AddColumn { table: String, column: Column },
    AddConstraint { table: String, constraint: Constraint },
    AddRelationship(Relationship),
    AddView(View),
    Remove(Target),
    RenameTable { from: String, to: String },
    RenameColumn { table: String, from: String, to: String },
    RetypeColumn { table: String, column: String, typ: String },
    MoveColumn { table: String, column: String, index: usize },
    ChainBegin,
    ChainEnd,
    Undo,
    Redo,
}

/// A command and the 1-based line it came from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Step {
    pub line: usize,
    pub command: Command,
}

pub fn parse_script(input: &str) -> Result<Vec<Step>, ScriptError> {
    let mut steps = Vec::new();
    for (i, text) in input.lines().enumerate() {
        let line = i + 1;
        if let Some(command) = parse_command(text).map_err(|e| e.at(line))? {
            steps.push(Step { line, command });
        }
    }
    Ok(steps)
}

/// Parse one line. Blank and comment-only lines yield `None`.
pub fn parse_command(text: &str) -> Result<Option<Command>, ScriptError> {
    let mut parser = Parser::new(text)?;
    if *parser.peek() == Token::Eof {
        return Ok(None);
    }

    let word = parser.expect_ident()?;
    let command = match word.as_str() {
        "add" => parse_add(&mut parser)?,
        "remove" => Command::Remove(parse_target(&mut parser)?),
        "rename" => match expect_kind(&mut parser)? {
            ObjectType::Table => Command::RenameTable {
                from: parser.expect_ident()?,
                to: parser.expect_ident()?,
            },
            ObjectType::Column => {
                let (table, from) = parser.parse_qualified()?;
                Command::RenameColumn {
                    table,
                    from,
                    to: parser.expect_ident()?,
                }
            }
            other => return Err(ScriptError::UnknownKind(other.to_string())),
        },
        "retype" => {
            expect_column_kind(&mut parser)?;
            let (table, column) = parser.parse_qualified()?;
            Command::RetypeColumn {
                table,
                column,
                typ: parser.expect_ident()?,
            }
        }
        "move" => {
            expect_column_kind(&mut parser)?;
            let (table, column) = parser.parse_qualified()?;
            Command::MoveColumn {
                table,
                column,
                index: expect_position(&mut parser)?,
            }
        }
        "chain" => match parser.expect_ident()?.as_str() {
            "begin" => Command::ChainBegin,
            "end" => Command::ChainEnd,
            other => return Err(ScriptError::UnknownCommand(format!("chain {}", other))),
        },
        "undo" => Command::Undo,
        "redo" => Command::Redo,
        other => return Err(ScriptError::UnknownCommand(other.to_string())),
    };

    parser.finish()?;
    Ok(Some(command))
}

fn parse_add(parser: &mut Parser) -> Result<Command, ScriptError> {
    let command = match expect_kind(parser)? {
        ObjectType::Table => Command::AddTable(parser.expect_ident()?),
        ObjectType::Column => {
            let (table, name) = parser.parse_qualified()?;
            Command::AddColumn {
                table,
                column: parser.parse_column_named(name)?,
            }
        }
        ObjectType::Constraint => Command::AddConstraint {
            table: parser.expect_ident()?,
            constraint: parser.parse_constraint()?,
        },
        ObjectType::Relationship => Command::AddRelationship(parser.parse_relationship()?),
        ObjectType::View => Command::AddView(View {
            name: parser.expect_ident()?,
            includes: parser.parse_view_body()?,
        }),
    };
    Ok(command)
}

fn parse_target(parser: &mut Parser) -> Result<Target, ScriptError> {
    let target = match expect_kind(parser)? {
        ObjectType::Table => Target::Table(parser.expect_ident()?),
        ObjectType::Column => {
            let (table, column) = parser.parse_qualified()?;
            Target::Column { table, column }
        }
        ObjectType::Constraint => Target::Constraint {
            table: parser.expect_ident()?,
            position: expect_position(parser)?,
        },
        ObjectType::Relationship => Target::Relationship {
            left: parser.expect_ident()?,
            right: parser.expect_ident()?,
        },
        ObjectType::View => Target::View(parser.expect_ident()?),
    };
    Ok(target)
}

fn expect_kind(parser: &mut Parser) -> Result<ObjectType, ScriptError> {
    let word = parser.expect_ident()?;
    ObjectType::from_str(&word).ok_or(ScriptError::UnknownKind(word))
}

fn expect_column_kind(parser: &mut Parser) -> Result<(), ScriptError> {
    match expect_kind(parser)? {
        ObjectType::Column => Ok(()),
        other => Err(ScriptError::UnknownKind(other.to_string())),
    }
}

fn expect_position(parser: &mut Parser) -> Result<usize, ScriptError> {
    let n = parser.expect_num()?;
    usize::try_from(n).map_err(|_| ScriptError::InvalidPosition(n))
}

/// Apply steps in order, stopping at the first failure.
pub fn run(editor: &mut Editor, steps: &[Step]) -> Result<(), ScriptError> {
    for step in steps {
        debug!("line {}: {:?}", step.line, step.command);
        apply(editor, &step.command).map_err(|e| e.at(step.line))?;
    }
    Ok(())
}

pub fn apply(editor: &mut Editor, command: &Command) -> Result<(), ScriptError> {
    match command {
        Command::AddTable(name) => {
            editor.add_table(name)?;
        }
        Command::AddColumn { table, column } => {
            let table = find_table(editor, table)?;
            editor.add_column(table, column.clone())?;
        }
        Command::AddConstraint { table, constraint } => {
            let table = find_table(editor, table)?;
            editor.add_constraint(table, constraint.clone())?;
        }
        Command::AddRelationship(rel) => {
            editor.add_relationship(rel.clone())?;
        }
        Command::AddView(view) => {
            editor.add_view(view.clone())?;
        }
        Command::Remove(target) => {
            let id = resolve(editor, target)?;
            editor.remove(id)?;
        }
        Command::RenameTable { from, to } => {
            let table = find_table(editor, from)?;
            editor.rename_table(table, to)?;
        }
        Command::RenameColumn { table, from, to } => {
            let column = find_column(editor, table, from)?;
            editor.rename_column(column, to)?;
        }
        Command::RetypeColumn { table, column, typ } => {
            let column = find_column(editor, table, column)?;
            editor.retype_column(column, typ)?;
        }
        Command::MoveColumn {
            table,
            column,
            index,
        } => {
            let column = find_column(editor, table, column)?;
            editor.move_object(column, *index)?;
        }
        Command::ChainBegin => editor.start_chain()?,
        Command::ChainEnd => editor.finish_chain()?,
        Command::Undo => editor.undo()?,
        Command::Redo => editor.redo()?,
    }
    Ok(())
}

/// Load an ERD document, replay a script over it and return the editor.
pub fn replay(source: &str, script: &str, config: HistoryConfig) -> Result<Editor, ScriptError> {
    let schema = Parser::new(source)?.parse()?;
    let model = SchemaModel::from_schema(&schema)?;
    let steps = parse_script(script)?;

    let mut editor = Editor::new(model, config);
    run(&mut editor, &steps)?;
    Ok(editor)
}

fn not_found(object_type: ObjectType, name: impl Into<String>) -> ScriptError {
    ScriptError::NotFound {
        object_type,
        name: name.into(),
    }
}

fn find_table(editor: &Editor, name: &str) -> Result<ObjectId, ScriptError> {
    editor
        .model()
        .find_table(name)
        .ok_or_else(|| not_found(ObjectType::Table, name))
}

fn find_column(editor: &Editor, table: &str, column: &str) -> Result<ObjectId, ScriptError> {
    let table_id = find_table(editor, table)?;
    editor
        .model()
        .find_column(table_id, column)
        .ok_or_else(|| not_found(ObjectType::Column, format!("{}.{}", table, column)))
}

fn resolve(editor: &Editor, target: &Target) -> Result<ObjectId, ScriptError> {
    let model = editor.model();
    match target {
        Target::Table(name) => find_table(editor, name),
        Target::Column { table, column } => find_column(editor, table, column),
        Target::Constraint { table, position } => {
            let table_id = find_table(editor, table)?;
            model
                .constraints(table_id)
                .get(*position)
                .copied()
                .ok_or_else(|| not_found(ObjectType::Constraint, format!("{}[{}]", table, position)))
        }
        Target::Relationship { left, right } => model
            .find_relationship(left, right)
            .ok_or_else(|| not_found(ObjectType::Relationship, format!("{}--{}", left, right))),
        Target::View(name) => model
            .find_view(name)
            .ok_or_else(|| not_found(ObjectType::View, name.as_str())),
    }
}
