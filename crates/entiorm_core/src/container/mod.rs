//! Property containers for composite fields.
//!
//! A container wraps a relationship or embedded value so the entity can
//! treat every composite field the same way: assign through
//! [`PropertyContainer::set_injected_value`], read through
//! [`PropertyContainer::injected_value`], persist through
//! [`PropertyContainer::raw_value`]. Containers report content changes
//! through the callback registered with [`PropertyContainer::on_modify`].

mod embedded;
mod has_many;
mod has_one;

pub use embedded::Embedded;
pub use has_many::HasMany;
pub use has_one::HasOne;

use crate::entity::EntityRef;
use crate::error::{CoreError, CoreResult};
use crate::metadata::{ContainerKind, PropertyDescriptor};
use crate::provider::EntityProvider;
use entiorm_codec::Value;
use std::any::Any;
use std::fmt;
use std::sync::Arc;

/// Callback a container invokes when its content changes.
pub type ModifyCallback = Box<dyn Fn() + Send + Sync>;

/// Everything a container may need from its owning entity during a call.
///
/// The owner passes its identity as a lookup key; containers never hold a
/// reference to the owner itself.
#[derive(Clone, Copy)]
pub struct ContainerContext<'a> {
    /// Repository the owning entity is attached to.
    pub repository: Option<&'a Arc<dyn EntityProvider>>,
    /// Persisted identity of the owning entity.
    pub parent_id: Option<&'a Value>,
}

impl<'a> ContainerContext<'a> {
    /// Context of a detached, transient owner.
    pub const fn detached() -> Self {
        Self {
            repository: None,
            parent_id: None,
        }
    }

    /// Returns the repository or fails when the owner is not attached.
    pub fn require_repository(&self, owner: &str) -> CoreResult<&'a Arc<dyn EntityProvider>> {
        self.repository.ok_or_else(|| {
            CoreError::invalid_state(format!("Entity {owner} is not attached to repository."))
        })
    }
}

/// Materialized value of a property.
#[derive(Clone)]
pub enum PropertyValue {
    /// Plain value.
    Scalar(Value),
    /// Single related entity.
    Entity(Option<EntityRef>),
    /// Related entities of a collection.
    Collection(Vec<EntityRef>),
}

impl PropertyValue {
    /// Returns the plain value, if this is one.
    pub fn as_scalar(&self) -> Option<&Value> {
        match self {
            Self::Scalar(value) => Some(value),
            _ => None,
        }
    }

    /// Returns the related entity, if this is a single relationship.
    pub fn as_entity(&self) -> Option<&EntityRef> {
        match self {
            Self::Entity(entity) => entity.as_ref(),
            _ => None,
        }
    }

    /// Returns the related entities, if this is a collection.
    pub fn as_collection(&self) -> Option<&[EntityRef]> {
        match self {
            Self::Collection(items) => Some(items),
            _ => None,
        }
    }

    /// Converts into a plain value, failing for relationships.
    pub fn into_scalar(self, property: &str) -> CoreResult<Value> {
        match self {
            Self::Scalar(value) => Ok(value),
            Self::Entity(None) => Ok(Value::Null),
            _ => Err(CoreError::invalid_argument(format!(
                "Property ${property} expects a plain value, got a relationship."
            ))),
        }
    }

    /// Identity-shaped representation: related entities become their ids.
    pub fn to_id_value(&self) -> Value {
        match self {
            Self::Scalar(value) => value.clone(),
            Self::Entity(entity) => entity.as_ref().map_or(Value::Null, entity_id),
            Self::Collection(items) => Value::Array(items.iter().map(entity_id).collect()),
        }
    }
}

/// Identity of a related entity without blocking; `Null` while it is
/// locked elsewhere or not yet persisted.
pub(crate) fn entity_id(entity: &EntityRef) -> Value {
    entity
        .try_read()
        .and_then(|e| e.id())
        .unwrap_or(Value::Null)
}

/// Checks that a related entity is of the expected type.
pub(crate) fn check_target(entity: &EntityRef, target: &str, property: &str) -> CoreResult<()> {
    match entity.try_read() {
        Some(e) if e.metadata().name() != target => Err(CoreError::invalid_argument(format!(
            "Property ${property} expects entity {target}, got {}.",
            e.metadata().name()
        ))),
        _ => Ok(()),
    }
}

impl fmt::Debug for PropertyValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Scalar(value) => f.debug_tuple("Scalar").field(value).finish(),
            Self::Entity(entity) => f
                .debug_tuple("Entity")
                .field(&entity.as_ref().map(entity_id))
                .finish(),
            Self::Collection(items) => f
                .debug_tuple("Collection")
                .field(&items.iter().map(entity_id).collect::<Vec<_>>())
                .finish(),
        }
    }
}

impl PartialEq for PropertyValue {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Self::Scalar(a), Self::Scalar(b)) => a == b,
            (Self::Entity(a), Self::Entity(b)) => match (a, b) {
                (Some(a), Some(b)) => Arc::ptr_eq(a, b),
                (None, None) => true,
                _ => false,
            },
            (Self::Collection(a), Self::Collection(b)) => {
                a.len() == b.len() && a.iter().zip(b).all(|(a, b)| Arc::ptr_eq(a, b))
            }
            _ => false,
        }
    }
}

impl From<Value> for PropertyValue {
    fn from(value: Value) -> Self {
        Self::Scalar(value)
    }
}

impl From<&str> for PropertyValue {
    fn from(value: &str) -> Self {
        Self::Scalar(value.into())
    }
}

impl From<String> for PropertyValue {
    fn from(value: String) -> Self {
        Self::Scalar(value.into())
    }
}

impl From<i64> for PropertyValue {
    fn from(value: i64) -> Self {
        Self::Scalar(value.into())
    }
}

impl From<bool> for PropertyValue {
    fn from(value: bool) -> Self {
        Self::Scalar(value.into())
    }
}

impl From<EntityRef> for PropertyValue {
    fn from(entity: EntityRef) -> Self {
        Self::Entity(Some(entity))
    }
}

impl From<Option<EntityRef>> for PropertyValue {
    fn from(entity: Option<EntityRef>) -> Self {
        Self::Entity(entity)
    }
}

impl From<Vec<EntityRef>> for PropertyValue {
    fn from(items: Vec<EntityRef>) -> Self {
        Self::Collection(items)
    }
}

/// Uniform capability set of composite properties.
pub trait PropertyContainer: Send + Sync + fmt::Debug {
    /// Kind of this container.
    fn kind(&self) -> ContainerKind;

    /// Assigns an application value.
    fn set_injected_value(
        &mut self,
        ctx: &ContainerContext<'_>,
        value: PropertyValue,
    ) -> CoreResult<()>;

    /// Materializes the application value, loading through the repository
    /// when needed.
    fn injected_value(&mut self, ctx: &ContainerContext<'_>) -> CoreResult<PropertyValue>;

    /// Whether a value is present.
    fn has_injected_value(&self) -> bool;

    /// Storage-shaped representation.
    fn raw_value(&self) -> Value;

    /// Hydrates from storage-shaped data without reporting a modification.
    fn set_raw_value(&mut self, raw: Value) -> CoreResult<()>;

    /// Registers the modification callback, replacing any previous one.
    fn on_modify(&mut self, callback: ModifyCallback);

    /// Independent copy with the same content and no callback.
    fn clone_container(&self) -> Box<dyn PropertyContainer>;

    /// Upcast for downcasting to the concrete container.
    fn as_any_mut(&mut self) -> &mut dyn Any;
}

/// Builds the container declared by a descriptor.
pub fn create_container(
    entity: &str,
    descriptor: &PropertyDescriptor,
) -> CoreResult<Box<dyn PropertyContainer>> {
    match descriptor.container() {
        Some(ContainerKind::HasOne) => Ok(Box::new(HasOne::new(entity, descriptor)?)),
        Some(ContainerKind::HasMany) => Ok(Box::new(HasMany::new(entity, descriptor)?)),
        Some(ContainerKind::Embedded) => Ok(Box::new(Embedded::new(entity, descriptor)?)),
        None => Err(CoreError::invalid_argument(format!(
            "Property {entity}::${} is not a container property.",
            descriptor.name()
        ))),
    }
}

/// Shared notification slot used by the concrete containers.
#[derive(Default)]
pub(crate) struct Notifier(Option<ModifyCallback>);

impl Notifier {
    pub(crate) fn set(&mut self, callback: ModifyCallback) {
        self.0 = Some(callback);
    }

    pub(crate) fn notify(&self) {
        if let Some(callback) = &self.0 {
            callback();
        }
    }

    pub(crate) fn is_registered(&self) -> bool {
        self.0.is_some()
    }
}
