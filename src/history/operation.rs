use std::fmt;

use super::pool::PoolId;
use crate::model::{ObjectId, ObjectType};

/// What happened to the object an operation tracks.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OperationKind {
    Modified,
    Created,
    Removed,
    /// Like `Modified`, but restoring it never triggers relationship
    /// revalidation. Used for reordering and other positional edits.
    Moved,
}

impl OperationKind {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Modified => "modified",
            Self::Created => "created",
            Self::Removed => "removed",
            Self::Moved => "moved",
        }
    }
}

impl fmt::Display for OperationKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Position of an operation inside a chain that undoes and redoes as one step.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ChainRole {
    #[default]
    NoChain,
    Start,
    Middle,
    End,
}

/// One recorded, reversible change to a single model object.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Operation {
    pub(crate) kind: OperationKind,
    pub(crate) chain: ChainRole,
    pub(crate) object: ObjectId,
    pub(crate) parent: Option<ObjectId>,
    pub(crate) pool: PoolId,
    pub(crate) definition: Option<String>,
    pub(crate) object_index: Option<usize>,
}

impl Operation {
    pub(crate) fn new(kind: OperationKind, object: ObjectId, pool: PoolId) -> Self {
        Self {
            kind,
            chain: ChainRole::NoChain,
            object,
            parent: None,
            pool,
            definition: None,
            object_index: None,
        }
    }

    pub fn kind(&self) -> OperationKind {
        self.kind
    }

    pub fn chain(&self) -> ChainRole {
        self.chain
    }

    pub fn object(&self) -> ObjectId {
        self.object
    }

    pub fn parent(&self) -> Option<ObjectId> {
        self.parent
    }

    pub fn pool(&self) -> PoolId {
        self.pool
    }

    /// Recorded definition of a relationship-bound object.
    pub fn definition(&self) -> Option<&str> {
        self.definition.as_deref()
    }

    pub fn object_index(&self) -> Option<usize> {
        self.object_index
    }

    pub fn is_chained(&self) -> bool {
        self.chain != ChainRole::NoChain
    }
}

/// Row data for rendering a history list.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OperationData {
    pub kind: OperationKind,
    pub object_name: String,
    pub object_type: ObjectType,
}

/// Emitted once per operation applied during undo or redo.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OperationProgress {
    /// 1-based step within the span being applied.
    pub step: usize,
    pub total: usize,
    pub object_name: String,
    pub object_type: ObjectType,
}

impl OperationProgress {
    /// Completion percentage of the span, as shown by progress indicators.
    pub fn percent(&self) -> u8 {
        if self.total == 0 {
            return 100;
        }
        ((self.step * 100) / self.total) as u8
    }
}
