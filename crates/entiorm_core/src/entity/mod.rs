//! Entity property state machine.
//!
//! Every property of an [`Entity`] is lazily initialized on first access:
//! raw storage values stay untouched until a read or write asks for the
//! field, at which point they are validated or wrapped in a property
//! container. Assignments feed the modified set; lifecycle transitions
//! (load, attach, persist, remove) move the entity between its transient
//! and persisted states.

mod modified;
mod slot;
mod snapshot;
mod state;

pub use modified::ModifiedFields;
pub use slot::PropertySlot;
pub use snapshot::EntitySnapshot;
pub use state::Entity;

use parking_lot::RwLock;
use std::sync::Arc;

/// Shared handle to an entity, used by relationships and providers.
pub type EntityRef = Arc<RwLock<Entity>>;
