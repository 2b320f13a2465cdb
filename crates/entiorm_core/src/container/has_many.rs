use super::{
    check_target, entity_id, ContainerContext, ModifyCallback, Notifier, PropertyContainer,
    PropertyValue,
};
use crate::entity::EntityRef;
use crate::error::{CoreError, CoreResult};
use crate::metadata::{ContainerKind, PropertyDescriptor, RelationshipKind};
use entiorm_codec::Value;
use std::any::Any;
use std::fmt;
use std::sync::Arc;
use tracing::trace;

/// Relationship collection (one-has-many, many-has-many).
///
/// Many-has-many collections are hydrated from a list of ids. One-has-many
/// collections are owned by the other side and are loaded by querying the
/// reverse property with the owner's identity. Membership is tracked by
/// handle identity.
pub struct HasMany {
    owner: String,
    property: String,
    target: String,
    kind: RelationshipKind,
    reverse: Option<String>,
    raw_ids: Vec<Value>,
    members: Option<Vec<EntityRef>>,
    notifier: Notifier,
}

impl HasMany {
    /// Creates an empty, unloaded collection for a relationship descriptor.
    pub fn new(owner: &str, descriptor: &PropertyDescriptor) -> CoreResult<Self> {
        let relationship = descriptor
            .relationship_target()
            .filter(|r| r.kind.is_collection())
            .ok_or_else(|| {
                CoreError::invalid_argument(format!(
                    "Property {owner}::${} is not a collection relationship.",
                    descriptor.name()
                ))
            })?;
        Ok(Self {
            owner: owner.to_string(),
            property: descriptor.name().to_string(),
            target: relationship.entity.clone(),
            kind: relationship.kind,
            reverse: relationship.property.clone(),
            raw_ids: Vec::new(),
            members: None,
            notifier: Notifier::default(),
        })
    }

    /// Whether members were already materialized.
    pub fn is_loaded(&self) -> bool {
        self.members.is_some()
    }

    /// Adds an entity; returns false if it was already a member.
    pub fn add(&mut self, ctx: &ContainerContext<'_>, entity: EntityRef) -> CoreResult<bool> {
        check_target(&entity, &self.target, &self.property)?;
        let members = self.load(ctx)?;
        if members.iter().any(|m| Arc::ptr_eq(m, &entity)) {
            return Ok(false);
        }
        members.push(entity);
        self.notifier.notify();
        Ok(true)
    }

    /// Removes an entity; returns false if it was not a member.
    pub fn remove(&mut self, ctx: &ContainerContext<'_>, entity: &EntityRef) -> CoreResult<bool> {
        let members = self.load(ctx)?;
        let before = members.len();
        members.retain(|m| !Arc::ptr_eq(m, entity));
        if members.len() == before {
            return Ok(false);
        }
        self.notifier.notify();
        Ok(true)
    }

    /// Whether the entity is a member.
    pub fn contains(&mut self, ctx: &ContainerContext<'_>, entity: &EntityRef) -> CoreResult<bool> {
        Ok(self.load(ctx)?.iter().any(|m| Arc::ptr_eq(m, entity)))
    }

    /// Number of members.
    pub fn count(&mut self, ctx: &ContainerContext<'_>) -> CoreResult<usize> {
        Ok(self.load(ctx)?.len())
    }

    fn load(&mut self, ctx: &ContainerContext<'_>) -> CoreResult<&mut Vec<EntityRef>> {
        if self.members.is_none() {
            let loaded = match self.kind {
                RelationshipKind::OneHasMany => match (ctx.parent_id, &self.reverse) {
                    (Some(parent_id), Some(reverse)) => {
                        let repository = ctx.require_repository(&self.owner)?;
                        trace!(entity = %self.target, %reverse, %parent_id, "loading one-has-many");
                        repository.find_by(&self.target, reverse, parent_id)?
                    }
                    _ => Vec::new(),
                },
                _ if self.raw_ids.is_empty() => Vec::new(),
                _ => {
                    let repository = ctx.require_repository(&self.owner)?;
                    trace!(entity = %self.target, ids = self.raw_ids.len(), "loading many-has-many");
                    repository.get_by_ids(&self.target, &self.raw_ids)?
                }
            };
            self.members = Some(loaded);
        }
        Ok(self.members.get_or_insert_with(Vec::new))
    }
}

impl PropertyContainer for HasMany {
    fn kind(&self) -> ContainerKind {
        ContainerKind::HasMany
    }

    fn set_injected_value(
        &mut self,
        _ctx: &ContainerContext<'_>,
        value: PropertyValue,
    ) -> CoreResult<()> {
        match value {
            PropertyValue::Collection(items) => {
                for item in &items {
                    check_target(item, &self.target, &self.property)?;
                }
                let mut unique: Vec<EntityRef> = Vec::with_capacity(items.len());
                for item in items {
                    if !unique.iter().any(|u| Arc::ptr_eq(u, &item)) {
                        unique.push(item);
                    }
                }
                self.raw_ids.clear();
                self.members = Some(unique);
            }
            PropertyValue::Scalar(Value::Array(ids)) => {
                self.raw_ids = ids;
                self.members = None;
            }
            PropertyValue::Scalar(Value::Null) | PropertyValue::Entity(None) => {
                self.raw_ids.clear();
                self.members = Some(Vec::new());
            }
            _ => {
                return Err(CoreError::invalid_argument(format!(
                    "Property {}::${} holds a collection.",
                    self.owner, self.property
                )))
            }
        }
        self.notifier.notify();
        Ok(())
    }

    fn injected_value(&mut self, ctx: &ContainerContext<'_>) -> CoreResult<PropertyValue> {
        Ok(PropertyValue::Collection(self.load(ctx)?.clone()))
    }

    fn has_injected_value(&self) -> bool {
        true
    }

    fn raw_value(&self) -> Value {
        match &self.members {
            Some(members) => Value::Array(members.iter().map(entity_id).collect()),
            None => Value::Array(self.raw_ids.clone()),
        }
    }

    fn set_raw_value(&mut self, raw: Value) -> CoreResult<()> {
        self.raw_ids = match raw {
            Value::Array(ids) => ids,
            Value::Null => Vec::new(),
            other => {
                return Err(CoreError::invalid_argument(format!(
                    "Collection {}::${} expects a list of ids, got {}.",
                    self.owner,
                    self.property,
                    other.type_name()
                )))
            }
        };
        self.members = None;
        Ok(())
    }

    fn on_modify(&mut self, callback: ModifyCallback) {
        self.notifier.set(callback);
    }

    fn clone_container(&self) -> Box<dyn PropertyContainer> {
        Box::new(Self {
            owner: self.owner.clone(),
            property: self.property.clone(),
            target: self.target.clone(),
            kind: self.kind,
            reverse: self.reverse.clone(),
            raw_ids: self.raw_ids.clone(),
            members: self.members.clone(),
            notifier: Notifier::default(),
        })
    }

    fn as_any_mut(&mut self) -> &mut dyn Any {
        self
    }
}

impl fmt::Debug for HasMany {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("HasMany")
            .field("property", &self.property)
            .field("target", &self.target)
            .field("kind", &self.kind)
            .field("ids", &self.raw_value())
            .field("loaded", &self.is_loaded())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn tags() -> HasMany {
        let descriptor = PropertyDescriptor::new("tags").relationship(
            RelationshipKind::ManyHasMany,
            "Tag",
            None,
        );
        HasMany::new("Book", &descriptor).unwrap()
    }

    #[test]
    fn raw_ids_round_trip_without_loading() {
        let mut container = tags();
        container
            .set_raw_value(Value::Array(vec![Value::Integer(1), Value::Integer(2)]))
            .unwrap();
        assert!(!container.is_loaded());
        assert_eq!(
            container.raw_value(),
            Value::Array(vec![Value::Integer(1), Value::Integer(2)])
        );
    }

    #[test]
    fn empty_ids_load_without_repository() {
        let mut container = tags();
        let ctx = ContainerContext::detached();
        assert_eq!(container.count(&ctx).unwrap(), 0);
        assert!(container.is_loaded());
    }

    #[test]
    fn pending_ids_need_repository() {
        let mut container = tags();
        container
            .set_raw_value(Value::Array(vec![Value::Integer(1)]))
            .unwrap();
        let err = container
            .injected_value(&ContainerContext::detached())
            .unwrap_err();
        assert!(err.is_invalid_state());
    }

    #[test]
    fn one_has_many_of_transient_owner_is_empty() {
        let descriptor = PropertyDescriptor::new("books").relationship(
            RelationshipKind::OneHasMany,
            "Book",
            Some("author"),
        );
        let mut container = HasMany::new("Author", &descriptor).unwrap();
        let value = container
            .injected_value(&ContainerContext::detached())
            .unwrap();
        assert_eq!(value, PropertyValue::Collection(vec![]));
    }

    #[test]
    fn rejects_scalars_and_non_collections() {
        let mut container = tags();
        let err = container
            .set_injected_value(&ContainerContext::detached(), Value::Integer(3).into())
            .unwrap_err();
        assert!(err.is_invalid_argument());

        let single = PropertyDescriptor::new("author").relationship(
            RelationshipKind::ManyHasOne,
            "Author",
            None,
        );
        assert!(HasMany::new("Book", &single).is_err());
    }
}
