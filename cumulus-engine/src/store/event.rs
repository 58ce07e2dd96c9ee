//! Events emitted by store changes.

use crate::object::ObjectKey;

/// Events emitted when objects change.
///
/// Dispatched via a broadcast channel; the host scheduler turns them into
/// invocations.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Event {
    /// A new object was created.
    Created(ObjectKey),
    /// Spec, status or metadata of an object changed.
    Updated(ObjectKey),
    /// An object was physically removed.
    Deleted(ObjectKey),
}

impl Event {
    /// Key of the object this event is about.
    pub fn key(&self) -> &ObjectKey {
        match self {
            Event::Created(k) | Event::Updated(k) | Event::Deleted(k) => k,
        }
    }

    /// Short name for logging.
    pub fn event_type(&self) -> &'static str {
        match self {
            Event::Created(_) => "created",
            Event::Updated(_) => "updated",
            Event::Deleted(_) => "deleted",
        }
    }
}
