use std::fmt;

/// Generation-counted handle to an object slot in a [`SchemaModel`](super::SchemaModel).
///
/// A handle stays valid while its object is live or detached (removed but
/// restorable). Destroying the object bumps the slot generation, so stale
/// handles held elsewhere can be detected instead of aliasing a new object.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ObjectId {
    index: u32,
    generation: u32,
}

impl ObjectId {
    pub(crate) fn new(index: u32, generation: u32) -> Self {
        Self { index, generation }
    }

    pub fn index(self) -> usize {
        self.index as usize
    }

    pub fn generation(self) -> u32 {
        self.generation
    }
}

impl fmt::Display for ObjectId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}v{}", self.index, self.generation)
    }
}
