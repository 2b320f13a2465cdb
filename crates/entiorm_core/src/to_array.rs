//! Structural export of entities.

use crate::config::Config;
use crate::container::{entity_id, PropertyValue};
use crate::entity::{Entity, EntityRef};
use crate::error::CoreResult;
use entiorm_codec::Value;
use std::collections::BTreeMap;

/// How relationships appear in an export.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum ToArrayMode {
    /// Live entity handles.
    #[default]
    AsIs,
    /// Identity references.
    AsId,
    /// Nested exports, down to the configured recursion limit.
    Full,
}

/// Storage property name to exported value.
pub type EntityArray = BTreeMap<String, PropertyValue>;

/// Converts entities into [`EntityArray`]s.
#[derive(Debug, Clone, Copy)]
pub struct ToArrayConverter {
    max_recursion_level: usize,
}

impl ToArrayConverter {
    /// Creates a converter following relationships at most `max_recursion_level` deep.
    pub const fn new(max_recursion_level: usize) -> Self {
        Self {
            max_recursion_level,
        }
    }

    /// Creates a converter from configuration.
    pub fn from_config(config: &Config) -> Self {
        Self::new(config.max_recursion_level)
    }

    /// Exports the storage properties of an entity.
    ///
    /// Properties without a value export as null, so a transient entity
    /// exports before its primary key is assigned.
    pub fn convert(&self, entity: &mut Entity, mode: ToArrayMode) -> CoreResult<EntityArray> {
        self.convert_level(entity, mode, 0)
    }

    fn convert_level(
        &self,
        entity: &mut Entity,
        mode: ToArrayMode,
        level: usize,
    ) -> CoreResult<EntityArray> {
        let names = entity.metadata().storage_properties().to_vec();
        let mut out = EntityArray::new();
        for name in names {
            if !entity.has_value(&name)? {
                out.insert(name, PropertyValue::Scalar(Value::Null));
                continue;
            }
            let value = match mode {
                ToArrayMode::AsIs => entity.get_value(&name)?,
                ToArrayMode::AsId => PropertyValue::Scalar(as_id(entity, &name)?),
                ToArrayMode::Full => PropertyValue::Scalar(self.full(entity, &name, level)?),
            };
            out.insert(name, value);
        }
        Ok(out)
    }

    fn full(&self, entity: &mut Entity, name: &str, level: usize) -> CoreResult<Value> {
        Ok(match entity.get_value(name)? {
            PropertyValue::Scalar(value) => value,
            PropertyValue::Entity(None) => Value::Null,
            PropertyValue::Entity(Some(related)) => {
                let id = entity.get_raw_value(name)?;
                self.nested(&related, level, id)?
            }
            PropertyValue::Collection(items) => Value::Array(
                items
                    .iter()
                    .map(|item| self.nested(item, level, entity_id(item)))
                    .collect::<CoreResult<_>>()?,
            ),
        })
    }

    // A handle already locked higher up the stack is exported by `id`.
    fn nested(&self, related: &EntityRef, level: usize, id: Value) -> CoreResult<Value> {
        if level >= self.max_recursion_level {
            return Ok(id);
        }
        match related.try_write() {
            Some(mut guard) => Ok(into_value(
                self.convert_level(&mut guard, ToArrayMode::Full, level + 1)?,
            )),
            None => Ok(id),
        }
    }
}

fn as_id(entity: &mut Entity, name: &str) -> CoreResult<Value> {
    let descriptor = std::sync::Arc::clone(entity.metadata().property(name)?);
    if descriptor.container().is_some() {
        entity.initialize_property(&descriptor)?;
        entity.get_raw_value(name)
    } else {
        entity.get(name)
    }
}

/// Flattens an export into a single value; live handles become ids.
pub fn into_value(array: EntityArray) -> Value {
    Value::from_entries(array.into_iter().map(|(k, v)| (k, v.to_id_value())))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::metadata::{
        EntityMetadata, MetadataCatalog, PropertyDescriptor, RelationshipKind, ValueType,
    };
    use crate::provider::{EntityProvider, IdentityMap};
    use std::sync::Arc;

    fn catalog(config: Config) -> Arc<MetadataCatalog> {
        MetadataCatalog::builder()
            .register(
                EntityMetadata::builder("Node")
                    .property(PropertyDescriptor::new("id").value_type(ValueType::Integer))
                    .property(PropertyDescriptor::new("label").value_type(ValueType::Text))
                    .property(
                        PropertyDescriptor::new("next")
                            .relationship(RelationshipKind::OneHasOne, "Node", None)
                            .nullable(true),
                    ),
            )
            .config(config)
            .build()
            .unwrap()
    }

    /// Builds a chain 1 -> 2 -> ... -> n, all registered in one map.
    fn chain(catalog: &MetadataCatalog, n: i64) -> EntityRef {
        let map = Arc::new(IdentityMap::new());
        let repository: Arc<dyn EntityProvider> = map.clone();
        let meta = catalog.get("Node").unwrap();
        let mut first = None;
        for id in 1..=n {
            let next = if id < n { Value::Integer(id + 1) } else { Value::Null };
            let node = Entity::from_storage(
                Some(Arc::clone(&repository)),
                Arc::clone(&meta),
                [
                    ("id", Value::Integer(id)),
                    ("label", Value::from(format!("n{id}"))),
                    ("next", next),
                ],
            )
            .into_ref();
            map.insert(Arc::clone(&node)).unwrap();
            first.get_or_insert(node);
        }
        first.unwrap()
    }

    #[test]
    fn as_id_keeps_references_flat() {
        let catalog = catalog(Config::default());
        let first = chain(&catalog, 2);
        let array = first.write().to_array(ToArrayMode::AsId).unwrap();
        assert_eq!(array["next"], PropertyValue::Scalar(Value::Integer(2)));
        assert_eq!(array["label"], PropertyValue::Scalar(Value::from("n1")));
    }

    #[test]
    fn as_is_returns_handles() {
        let catalog = catalog(Config::default());
        let first = chain(&catalog, 2);
        let array = first.write().to_array_default().unwrap();
        let next = array["next"].as_entity().unwrap();
        assert_eq!(next.read().id(), Some(Value::Integer(2)));
    }

    #[test]
    fn full_stops_at_recursion_limit() {
        let catalog = catalog(Config::new().max_recursion_level(1));
        let first = chain(&catalog, 3);
        let value = into_value(first.write().to_array(ToArrayMode::Full).unwrap());

        let second = value.get("next").unwrap();
        assert_eq!(second.get("label"), Some(&Value::from("n2")));
        assert_eq!(second.get("next"), Some(&Value::Integer(3)));
    }

    #[test]
    fn full_export_serializes_to_json() {
        let catalog = catalog(Config::default());
        let first = chain(&catalog, 2);
        let value = into_value(first.write().to_array(ToArrayMode::Full).unwrap());
        let json = serde_json::to_value(&value).unwrap();
        assert_eq!(
            json,
            serde_json::json!({
                "id": 1,
                "label": "n1",
                "next": {"id": 2, "label": "n2", "next": null}
            })
        );
    }

    #[test]
    fn unset_properties_export_as_null() {
        let catalog = catalog(Config::default());
        let mut node = Entity::new(catalog.get("Node").unwrap());
        node.set_value("label", "draft").unwrap();
        for mode in [ToArrayMode::AsIs, ToArrayMode::AsId, ToArrayMode::Full] {
            let value = into_value(node.to_array(mode).unwrap());
            assert_eq!(value.get("id"), Some(&Value::Null));
            assert_eq!(value.get("label"), Some(&Value::from("draft")));
            assert_eq!(value.get("next"), Some(&Value::Null));
        }
    }

    #[test]
    fn cycles_fall_back_to_ids() {
        let catalog = catalog(Config::default());
        let first = chain(&catalog, 2);
        let second = first.write().get_entity("next").unwrap().unwrap();
        second.write().set_value("next", Arc::clone(&first)).unwrap();

        let value = into_value(first.write().to_array(ToArrayMode::Full).unwrap());
        let nested = value.get("next").unwrap();
        assert_eq!(nested.get("next"), Some(&Value::Integer(1)));
    }
}
