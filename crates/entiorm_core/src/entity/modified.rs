use parking_lot::Mutex;
use std::collections::BTreeSet;
use std::sync::Arc;

use crate::container::ModifyCallback;

/// Set of modified field names plus the "everything" marker.
///
/// A fresh, never-persisted entity is modified as a whole; individual
/// names are tracked once it has been loaded or persisted.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ModifiedFields {
    all: bool,
    fields: BTreeSet<String>,
}

impl ModifiedFields {
    /// Marker for an entity that is modified as a whole.
    pub fn everything() -> Self {
        Self {
            all: true,
            fields: BTreeSet::new(),
        }
    }

    /// Rebuilds from parts.
    pub fn from_parts(all: bool, fields: impl IntoIterator<Item = String>) -> Self {
        Self {
            all,
            fields: fields.into_iter().collect(),
        }
    }

    /// Whether the whole entity is marked.
    pub fn is_all(&self) -> bool {
        self.all
    }

    /// Individually marked names.
    pub fn fields(&self) -> impl Iterator<Item = &str> {
        self.fields.iter().map(String::as_str)
    }

    /// Whether anything is marked.
    pub fn any(&self) -> bool {
        self.all || !self.fields.is_empty()
    }

    /// Whether the name is marked, directly or through the whole-entity marker.
    pub fn contains(&self, name: &str) -> bool {
        self.all || self.fields.contains(name)
    }

    pub(crate) fn mark(&mut self, name: &str) {
        if !self.fields.contains(name) {
            self.fields.insert(name.to_string());
        }
    }

    pub(crate) fn mark_all(&mut self) {
        self.all = true;
    }

    pub(crate) fn unmark(&mut self, name: &str) {
        self.fields.remove(name);
    }

    pub(crate) fn clear(&mut self) {
        self.all = false;
        self.fields.clear();
    }

    /// Callback a container uses to mark its field in a shared set.
    pub(crate) fn callback(shared: &Arc<Mutex<Self>>, name: &str) -> ModifyCallback {
        let shared = Arc::clone(shared);
        let name = name.to_string();
        Box::new(move || shared.lock().mark(&name))
    }
}
