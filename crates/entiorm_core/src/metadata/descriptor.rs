//! Property descriptors.

use crate::metadata::EntityMetadata;
use entiorm_codec::Value;
use std::fmt;
use std::sync::Arc;

/// Value type constraint checked on every assignment.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ValueType {
    /// Any non-null value.
    Any,
    /// Boolean.
    Bool,
    /// Integer.
    Integer,
    /// Text.
    Text,
    /// Byte string.
    Bytes,
    /// Array of values.
    Array,
    /// Map of values.
    Map,
}

impl ValueType {
    /// Returns true if a non-null value satisfies this type.
    pub fn accepts(self, value: &Value) -> bool {
        matches!(
            (self, value),
            (ValueType::Any, _)
                | (ValueType::Bool, Value::Bool(_))
                | (ValueType::Integer, Value::Integer(_))
                | (ValueType::Text, Value::Text(_))
                | (ValueType::Bytes, Value::Bytes(_))
                | (ValueType::Array, Value::Array(_))
                | (ValueType::Map, Value::Map(_))
        )
    }
}

/// Kind of relationship a property describes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RelationshipKind {
    /// One-to-one, this side stores the reference.
    OneHasOne,
    /// Many-to-one, this side stores the reference.
    ManyHasOne,
    /// One-to-many, the other side stores the reference.
    OneHasMany,
    /// Many-to-many, references are stored as a list of identities.
    ManyHasMany,
}

impl RelationshipKind {
    /// Returns true for relationships holding many entities.
    pub const fn is_collection(self) -> bool {
        matches!(self, Self::OneHasMany | Self::ManyHasMany)
    }
}

/// Relationship target of a property.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Relationship {
    /// Kind of the relationship.
    pub kind: RelationshipKind,
    /// Target entity name.
    pub entity: String,
    /// Property on the target entity pointing back, if any.
    pub property: Option<String>,
}

/// Kind of container wrapping a composite property.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ContainerKind {
    /// Single relationship reference.
    HasOne,
    /// Relationship collection.
    HasMany,
    /// Embedded value object.
    Embedded,
}

/// Outcome of a setter hook.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SetOutcome {
    /// Store this value (after validation).
    Accept(Value),
    /// Ignore the assignment and keep the current value.
    Skip,
    /// Refuse the assignment with a reason.
    Reject(String),
}

/// Getter hook: receives the stored value, returns the value to expose.
pub type GetterHook = Arc<dyn Fn(&Value) -> Value + Send + Sync>;

/// Setter hook: receives the new value and the current stored value.
pub type SetterHook = Arc<dyn Fn(Value, &Value) -> SetOutcome + Send + Sync>;

/// Immutable description of one entity field.
///
/// Descriptors are created once while the catalog is built and shared by
/// every entity instance of the type.
#[derive(Clone)]
pub struct PropertyDescriptor {
    pub(crate) name: String,
    pub(crate) nullable: bool,
    pub(crate) read_only: bool,
    pub(crate) default: Value,
    pub(crate) value_type: ValueType,
    pub(crate) getter: Option<GetterHook>,
    pub(crate) setter: Option<SetterHook>,
    pub(crate) relationship: Option<Relationship>,
    pub(crate) embeddable: Option<String>,
    pub(crate) embeddable_metadata: Option<Arc<EntityMetadata>>,
    pub(crate) is_virtual: bool,
}

impl PropertyDescriptor {
    /// Creates a non-nullable, writable property accepting any value.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            nullable: false,
            read_only: false,
            default: Value::Null,
            value_type: ValueType::Any,
            getter: None,
            setter: None,
            relationship: None,
            embeddable: None,
            embeddable_metadata: None,
            is_virtual: false,
        }
    }

    /// Sets nullability.
    #[must_use]
    pub fn nullable(mut self, value: bool) -> Self {
        self.nullable = value;
        self
    }

    /// Marks the property read-only for `set_value`.
    #[must_use]
    pub fn read_only(mut self, value: bool) -> Self {
        self.read_only = value;
        self
    }

    /// Sets the default value.
    #[must_use]
    pub fn default_value(mut self, value: impl Into<Value>) -> Self {
        self.default = value.into();
        self
    }

    /// Sets the value type constraint.
    #[must_use]
    pub fn value_type(mut self, value_type: ValueType) -> Self {
        self.value_type = value_type;
        self
    }

    /// Registers a getter hook.
    #[must_use]
    pub fn getter<F>(mut self, hook: F) -> Self
    where
        F: Fn(&Value) -> Value + Send + Sync + 'static,
    {
        self.getter = Some(Arc::new(hook));
        self
    }

    /// Registers a setter hook.
    #[must_use]
    pub fn setter<F>(mut self, hook: F) -> Self
    where
        F: Fn(Value, &Value) -> SetOutcome + Send + Sync + 'static,
    {
        self.setter = Some(Arc::new(hook));
        self
    }

    /// Declares a relationship to another entity.
    #[must_use]
    pub fn relationship(
        mut self,
        kind: RelationshipKind,
        entity: impl Into<String>,
        property: Option<&str>,
    ) -> Self {
        self.relationship = Some(Relationship {
            kind,
            entity: entity.into(),
            property: property.map(str::to_string),
        });
        self
    }

    /// Declares an embedded value object of the named embeddable type.
    #[must_use]
    pub fn embedded(mut self, embeddable: impl Into<String>) -> Self {
        self.embeddable = Some(embeddable.into());
        self
    }

    /// Marks the property as virtual (never persisted).
    #[must_use]
    pub fn virtual_property(mut self, value: bool) -> Self {
        self.is_virtual = value;
        self
    }

    /// Property name.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Whether null is an acceptable value.
    pub fn is_nullable(&self) -> bool {
        self.nullable
    }

    /// Whether `set_value` refuses this property.
    pub fn is_read_only(&self) -> bool {
        self.read_only
    }

    /// Default value seeded on initialization.
    pub fn default(&self) -> &Value {
        &self.default
    }

    /// Value type constraint.
    pub fn value_type_constraint(&self) -> ValueType {
        self.value_type
    }

    /// Whether the property is virtual.
    pub fn is_virtual(&self) -> bool {
        self.is_virtual
    }

    /// Whether a getter hook is registered.
    pub fn has_getter(&self) -> bool {
        self.getter.is_some()
    }

    /// Whether a setter hook is registered.
    pub fn has_setter(&self) -> bool {
        self.setter.is_some()
    }

    /// Relationship, if any.
    pub fn relationship_target(&self) -> Option<&Relationship> {
        self.relationship.as_ref()
    }

    /// Embeddable metadata, resolved when the catalog was built.
    pub fn embeddable_metadata(&self) -> Option<&Arc<EntityMetadata>> {
        self.embeddable_metadata.as_ref()
    }

    /// Container kind for composite properties.
    pub fn container(&self) -> Option<ContainerKind> {
        if let Some(relationship) = &self.relationship {
            Some(if relationship.kind.is_collection() {
                ContainerKind::HasMany
            } else {
                ContainerKind::HasOne
            })
        } else if self.embeddable.is_some() {
            Some(ContainerKind::Embedded)
        } else {
            None
        }
    }

    /// Whether the property is stored by its own entity.
    pub(crate) fn is_storage(&self) -> bool {
        !self.is_virtual
            && !matches!(
                self.relationship.as_ref().map(|r| r.kind),
                Some(RelationshipKind::OneHasMany)
            )
    }

    /// Checks nullability and the type constraint.
    pub fn is_valid(&self, value: &Value) -> bool {
        if value.is_null() {
            self.nullable
        } else {
            self.value_type.accepts(value)
        }
    }

    /// Loosely converts a value towards the declared type.
    pub(crate) fn coerce(&self, value: Value) -> Value {
        match (self.value_type, value) {
            (ValueType::Integer, Value::Text(text)) => match text.trim().parse::<i64>() {
                Ok(n) => Value::Integer(n),
                Err(_) => Value::Text(text),
            },
            (ValueType::Bool, Value::Integer(n)) if n == 0 || n == 1 => Value::Bool(n == 1),
            (_, value) => value,
        }
    }
}

impl fmt::Debug for PropertyDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PropertyDescriptor")
            .field("name", &self.name)
            .field("nullable", &self.nullable)
            .field("read_only", &self.read_only)
            .field("default", &self.default)
            .field("value_type", &self.value_type)
            .field("getter", &self.getter.is_some())
            .field("setter", &self.setter.is_some())
            .field("relationship", &self.relationship)
            .field("embeddable", &self.embeddable)
            .field("is_virtual", &self.is_virtual)
            .finish()
    }
}
