use super::{
    check_target, entity_id, ContainerContext, ModifyCallback, Notifier, PropertyContainer,
    PropertyValue,
};
use crate::entity::EntityRef;
use crate::error::{CoreError, CoreResult};
use crate::metadata::{ContainerKind, PropertyDescriptor};
use entiorm_codec::Value;
use std::any::Any;
use std::fmt;
use std::sync::Arc;
use tracing::trace;

/// Single relationship reference (one-has-one, many-has-one).
///
/// Keeps the foreign key and, once resolved or assigned, the related
/// entity handle. The handle wins over the cached key when both are set.
pub struct HasOne {
    owner: String,
    property: String,
    target: String,
    nullable: bool,
    primary_value: Option<Value>,
    entity: Option<EntityRef>,
    notifier: Notifier,
}

impl HasOne {
    /// Creates an empty reference for a relationship descriptor.
    pub fn new(owner: &str, descriptor: &PropertyDescriptor) -> CoreResult<Self> {
        let relationship = descriptor.relationship_target().ok_or_else(|| {
            CoreError::invalid_argument(format!(
                "Property {owner}::${} is not a relationship.",
                descriptor.name()
            ))
        })?;
        Ok(Self {
            owner: owner.to_string(),
            property: descriptor.name().to_string(),
            target: relationship.entity.clone(),
            nullable: descriptor.is_nullable(),
            primary_value: None,
            entity: None,
            notifier: Notifier::default(),
        })
    }

    /// Cached foreign key, without loading anything.
    pub fn primary_value(&self) -> Option<Value> {
        self.entity
            .as_ref()
            .and_then(|entity| entity_id(entity).into_option())
            .or_else(|| self.primary_value.clone())
    }

    /// Whether the related entity handle is already resolved.
    pub fn is_loaded(&self) -> bool {
        self.entity.is_some()
    }

    fn not_nullable(&self) -> CoreError {
        CoreError::invalid_argument(format!(
            "Property {}::${} is not nullable.",
            self.owner, self.property
        ))
    }

    fn clear(&mut self) -> CoreResult<()> {
        if !self.nullable {
            return Err(self.not_nullable());
        }
        if self.entity.is_some() || self.primary_value.is_some() {
            self.entity = None;
            self.primary_value = None;
            self.notifier.notify();
        }
        Ok(())
    }
}

impl PropertyContainer for HasOne {
    fn kind(&self) -> ContainerKind {
        ContainerKind::HasOne
    }

    fn set_injected_value(
        &mut self,
        _ctx: &ContainerContext<'_>,
        value: PropertyValue,
    ) -> CoreResult<()> {
        match value {
            PropertyValue::Entity(Some(entity)) => {
                check_target(&entity, &self.target, &self.property)?;
                if self.entity.as_ref().is_some_and(|e| Arc::ptr_eq(e, &entity)) {
                    return Ok(());
                }
                self.primary_value = entity_id(&entity).into_option();
                self.entity = Some(entity);
                self.notifier.notify();
                Ok(())
            }
            PropertyValue::Entity(None) | PropertyValue::Scalar(Value::Null) => self.clear(),
            PropertyValue::Scalar(id) => {
                if self.entity.is_none() && self.primary_value.as_ref() == Some(&id) {
                    return Ok(());
                }
                self.entity = None;
                self.primary_value = Some(id);
                self.notifier.notify();
                Ok(())
            }
            PropertyValue::Collection(_) => Err(CoreError::invalid_argument(format!(
                "Property {}::${} holds a single entity, got a collection.",
                self.owner, self.property
            ))),
        }
    }

    fn injected_value(&mut self, ctx: &ContainerContext<'_>) -> CoreResult<PropertyValue> {
        if self.entity.is_none() {
            if let Some(id) = &self.primary_value {
                let repository = ctx.require_repository(&self.owner)?;
                trace!(entity = %self.target, %id, "resolving has-one reference");
                let entity = repository.get_by_id(&self.target, id)?.ok_or_else(|| {
                    CoreError::invalid_state(format!(
                        "Entity {} with primary value {id} does not exist.",
                        self.target
                    ))
                })?;
                self.entity = Some(entity);
            }
        }
        if self.entity.is_none() && !self.nullable {
            return Err(CoreError::invalid_state(format!(
                "Property {}::${} is not set.",
                self.owner, self.property
            )));
        }
        Ok(PropertyValue::Entity(self.entity.clone()))
    }

    fn has_injected_value(&self) -> bool {
        self.entity.is_some() || self.primary_value.is_some()
    }

    fn raw_value(&self) -> Value {
        self.primary_value().unwrap_or(Value::Null)
    }

    fn set_raw_value(&mut self, raw: Value) -> CoreResult<()> {
        self.entity = None;
        self.primary_value = raw.into_option();
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
            nullable: self.nullable,
            primary_value: self.primary_value.clone(),
            entity: self.entity.clone(),
            notifier: Notifier::default(),
        })
    }

    fn as_any_mut(&mut self) -> &mut dyn Any {
        self
    }
}

impl fmt::Debug for HasOne {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("HasOne")
            .field("property", &self.property)
            .field("target", &self.target)
            .field("primary_value", &self.primary_value())
            .field("loaded", &self.is_loaded())
            .field("on_modify", &self.notifier.is_registered())
            .finish()
    }
}
