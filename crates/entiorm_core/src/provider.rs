//! Entity lookup boundary.
//!
//! Containers resolve relationships through [`EntityProvider`]. Storage and
//! repositories live outside this crate; [`IdentityMap`] is the in-memory
//! provider used when entities are already materialized.

use crate::entity::EntityRef;
use crate::error::{CoreError, CoreResult};
use entiorm_codec::Value;
use parking_lot::RwLock;
use std::collections::HashMap;
use std::fmt;
use tracing::trace;

/// Source of related entities.
pub trait EntityProvider: Send + Sync {
    /// Looks up one entity by its primary value.
    fn get_by_id(&self, entity: &str, id: &Value) -> CoreResult<Option<EntityRef>>;

    /// Looks up several entities; ids without a match are skipped.
    fn get_by_ids(&self, entity: &str, ids: &[Value]) -> CoreResult<Vec<EntityRef>> {
        let mut found = Vec::with_capacity(ids.len());
        for id in ids {
            if let Some(item) = self.get_by_id(entity, id)? {
                found.push(item);
            }
        }
        Ok(found)
    }

    /// Finds entities whose raw `property` value equals `value`.
    fn find_by(&self, entity: &str, property: &str, value: &Value) -> CoreResult<Vec<EntityRef>>;
}

/// In-memory provider keyed by entity name and primary value.
///
/// Entries keep insertion order, so `find_by` results are deterministic.
#[derive(Default)]
pub struct IdentityMap {
    entries: RwLock<HashMap<String, Vec<(Value, EntityRef)>>>,
}

impl IdentityMap {
    /// Creates an empty map.
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a persisted entity, replacing one with the same identity.
    pub fn insert(&self, entity: EntityRef) -> CoreResult<()> {
        let (name, id) = {
            let guard = entity.read();
            let id = guard.persisted_id().cloned().ok_or_else(|| {
                CoreError::invalid_argument(format!(
                    "Entity {} is not persisted and cannot be registered.",
                    guard.metadata().name()
                ))
            })?;
            (guard.metadata().name().to_string(), id)
        };
        trace!(entity = %name, %id, "identity map insert");
        let mut entries = self.entries.write();
        let bucket = entries.entry(name).or_default();
        match bucket.iter_mut().find(|(existing, _)| *existing == id) {
            Some(slot) => slot.1 = entity,
            None => bucket.push((id, entity)),
        }
        Ok(())
    }

    /// Drops an entity; returns it if it was registered.
    pub fn remove(&self, entity: &str, id: &Value) -> Option<EntityRef> {
        let mut entries = self.entries.write();
        let bucket = entries.get_mut(entity)?;
        let index = bucket.iter().position(|(existing, _)| existing == id)?;
        Some(bucket.remove(index).1)
    }

    /// Every registered entity of a type, in insertion order.
    pub fn all(&self, entity: &str) -> Vec<EntityRef> {
        self.entries
            .read()
            .get(entity)
            .map(|bucket| bucket.iter().map(|(_, e)| EntityRef::clone(e)).collect())
            .unwrap_or_default()
    }

    /// Number of registered entities across all types.
    pub fn len(&self) -> usize {
        self.entries.read().values().map(Vec::len).sum()
    }

    /// Whether nothing is registered.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl EntityProvider for IdentityMap {
    fn get_by_id(&self, entity: &str, id: &Value) -> CoreResult<Option<EntityRef>> {
        Ok(self.entries.read().get(entity).and_then(|bucket| {
            bucket
                .iter()
                .find(|(existing, _)| existing == id)
                .map(|(_, e)| EntityRef::clone(e))
        }))
    }

    /// A locked candidate whose own identity is `value` is skipped: it is
    /// the owner of a self-referencing collection, held by the caller.
    fn find_by(&self, entity: &str, property: &str, value: &Value) -> CoreResult<Vec<EntityRef>> {
        let candidates = self.entries.read().get(entity).cloned().unwrap_or_default();
        let mut found = Vec::new();
        for (id, candidate) in candidates {
            let raw = match candidate.try_read() {
                Some(guard) => guard.get_raw_value(property)?,
                None if id == *value => continue,
                None => {
                    return Err(CoreError::invalid_state(format!(
                        "Entity {entity} is locked while searching by ${property}."
                    )))
                }
            };
            if raw == *value {
                found.push(candidate);
            }
        }
        Ok(found)
    }
}

impl fmt::Debug for IdentityMap {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let entries = self.entries.read();
        let mut counts: Vec<_> = entries.iter().map(|(k, v)| (k.as_str(), v.len())).collect();
        counts.sort_unstable();
        f.debug_struct("IdentityMap").field("entries", &counts).finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::entity::Entity;
    use crate::metadata::{
        EntityMetadata, MetadataCatalog, PropertyDescriptor, RelationshipKind, ValueType,
    };
    use std::sync::Arc;

    fn catalog() -> Arc<MetadataCatalog> {
        MetadataCatalog::builder()
            .register(
                EntityMetadata::builder("Author")
                    .property(PropertyDescriptor::new("id").value_type(ValueType::Integer))
                    .property(PropertyDescriptor::new("country").value_type(ValueType::Text)),
            )
            .build()
            .unwrap()
    }

    fn author(catalog: &MetadataCatalog, id: i64, country: &str) -> EntityRef {
        Entity::from_storage(
            None,
            catalog.get("Author").unwrap(),
            [("id", Value::Integer(id)), ("country", Value::from(country))],
        )
        .into_ref()
    }

    #[test]
    fn lookups() {
        let catalog = catalog();
        let map = IdentityMap::new();
        for (id, country) in [(1, "cz"), (2, "uk"), (3, "cz")] {
            map.insert(author(&catalog, id, country)).unwrap();
        }
        assert_eq!(map.len(), 3);

        let found = map.get_by_id("Author", &Value::Integer(2)).unwrap().unwrap();
        assert_eq!(found.read().id(), Some(Value::Integer(2)));
        assert!(map.get_by_id("Author", &Value::Integer(9)).unwrap().is_none());
        assert!(map.get_by_id("Book", &Value::Integer(1)).unwrap().is_none());

        let ids = [Value::Integer(3), Value::Integer(9), Value::Integer(1)];
        let many = map.get_by_ids("Author", &ids).unwrap();
        let many: Vec<_> = many.iter().map(|a| a.read().id()).collect();
        assert_eq!(many, [Some(Value::Integer(3)), Some(Value::Integer(1))]);

        let czech = map.find_by("Author", "country", &Value::from("cz")).unwrap();
        assert_eq!(czech.len(), 2);
        assert!(map.find_by("Author", "missing", &Value::Null).is_err());
    }

    #[test]
    fn insert_replaces_same_identity() {
        let catalog = catalog();
        let map = IdentityMap::new();
        map.insert(author(&catalog, 1, "cz")).unwrap();
        let replacement = author(&catalog, 1, "sk");
        map.insert(Arc::clone(&replacement)).unwrap();

        assert_eq!(map.len(), 1);
        let found = map.get_by_id("Author", &Value::Integer(1)).unwrap().unwrap();
        assert!(Arc::ptr_eq(&found, &replacement));
    }

    #[test]
    fn transient_entities_are_rejected() {
        let catalog = catalog();
        let map = IdentityMap::new();
        let transient = Entity::new(catalog.get("Author").unwrap()).into_ref();
        assert!(map.insert(transient).unwrap_err().is_invalid_argument());
        assert!(map.is_empty());
    }

    #[test]
    fn remove_and_locked_search() {
        let catalog = catalog();
        let map = IdentityMap::new();
        let first = author(&catalog, 1, "cz");
        map.insert(Arc::clone(&first)).unwrap();

        {
            let _guard = first.write();
            let err = map.find_by("Author", "country", &Value::from("cz")).unwrap_err();
            assert!(err.is_invalid_state());
        }

        assert!(map.remove("Author", &Value::Integer(1)).is_some());
        assert!(map.remove("Author", &Value::Integer(1)).is_none());
        assert!(map.all("Author").is_empty());
        assert_eq!(format!("{map:?}"), "IdentityMap { entries: [(\"Author\", 0)] }");
    }

    #[test]
    fn self_referencing_collection_loads_under_owner_lock() {
        let catalog = MetadataCatalog::builder()
            .register(
                EntityMetadata::builder("Category")
                    .property(PropertyDescriptor::new("id").value_type(ValueType::Integer))
                    .property(
                        PropertyDescriptor::new("parent")
                            .relationship(
                                RelationshipKind::ManyHasOne,
                                "Category",
                                Some("children"),
                            )
                            .nullable(true),
                    )
                    .property(PropertyDescriptor::new("children").relationship(
                        RelationshipKind::OneHasMany,
                        "Category",
                        Some("parent"),
                    )),
            )
            .build()
            .unwrap();
        let map = Arc::new(IdentityMap::new());
        let repository: Arc<dyn EntityProvider> = map.clone();
        let category = |data: Vec<(&str, Value)>| {
            let metadata = catalog.get("Category").unwrap();
            let entity = Entity::from_storage(Some(Arc::clone(&repository)), metadata, data).into_ref();
            map.insert(Arc::clone(&entity)).unwrap();
            entity
        };
        let root = category(vec![("id", Value::Integer(1))]);
        let child = category(vec![("id", Value::Integer(2)), ("parent", Value::Integer(1))]);

        let children = root.write().get_collection("children").unwrap();
        assert_eq!(children.len(), 1);
        assert!(Arc::ptr_eq(&children[0], &child));

        let parent = child.write().get_entity("parent").unwrap().expect("parent is set");
        assert!(Arc::ptr_eq(&parent, &root));
    }
}
