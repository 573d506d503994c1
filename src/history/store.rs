//! The narrow interface the history uses to reach into an object model.

use crate::model::{ModelError, ObjectId, ObjectType};

/// Display information for progress events and history listings.
pub trait Describe {
    fn display_name(&self) -> String;
    fn object_type(&self) -> ObjectType;
}

/// An object model the history can snapshot, detach, reattach and restore.
///
/// Handles must stay stable across detach/attach so that operations keep
/// pointing at the same object however often they are undone and redone.
pub trait ObjectStore {
    type Object: Clone + Describe;

    /// Live content of an object.
    fn get(&self, id: ObjectId) -> Option<&Self::Object>;

    fn is_live(&self, id: ObjectId) -> bool {
        self.get(id).is_some()
    }

    /// True while the handle refers to a live or detached object.
    fn is_allocated(&self, id: ObjectId) -> bool;

    fn parent_of(&self, id: ObjectId) -> Option<ObjectId>;

    /// Position inside the parent's (or root) ordered list.
    fn index_of(&self, id: ObjectId) -> Option<usize>;

    fn snapshot(&self, id: ObjectId) -> Result<Self::Object, ModelError>;

    /// Swap `state` with the live content of `id`, keeping the handle.
    fn exchange(&mut self, id: ObjectId, state: &mut Self::Object) -> Result<(), ModelError>;

    fn detach(&mut self, id: ObjectId) -> Result<Self::Object, ModelError>;

    fn attach(
        &mut self,
        id: ObjectId,
        object: Self::Object,
        parent: Option<ObjectId>,
        index: Option<usize>,
    ) -> Result<(), ModelError>;

    /// Move a live object to `index` in its list. Returns the previous index.
    fn reposition(&mut self, id: ObjectId, index: usize) -> Result<usize, ModelError>;

    /// Textual definition of a relationship-bound object, `None` for everything else.
    fn definition(&self, id: ObjectId) -> Option<String>;

    /// Replace the live content of `id` by re-reading `definition`.
    fn rebuild(&mut self, id: ObjectId, definition: &str) -> Result<(), ModelError>;

    /// Whether live objects still refer to the detached `object` held for `id`.
    fn is_referenced(&self, id: ObjectId, object: &Self::Object) -> bool;

    /// Free the slot of a detached object nobody will restore anymore.
    fn release(&mut self, id: ObjectId);

    fn revalidate_relationships(&mut self);
}
