use super::{ContainerContext, ModifyCallback, Notifier, PropertyContainer, PropertyValue};
use crate::error::{CoreError, CoreResult};
use crate::metadata::{ContainerKind, EntityMetadata, PropertyDescriptor};
use entiorm_codec::Value;
use std::any::Any;
use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;

/// Embedded value object stored inline with its owner.
///
/// The value is a map keyed by the embeddable's property names. Every
/// assignment is checked against the embeddable metadata.
pub struct Embedded {
    owner: String,
    property: String,
    nullable: bool,
    metadata: Arc<EntityMetadata>,
    data: Option<BTreeMap<String, Value>>,
    notifier: Notifier,
}

impl Embedded {
    /// Creates an empty embedded container.
    pub fn new(owner: &str, descriptor: &PropertyDescriptor) -> CoreResult<Self> {
        let metadata = descriptor.embeddable_metadata().cloned().ok_or_else(|| {
            CoreError::invalid_argument(format!(
                "Property {owner}::${} has no resolved embeddable.",
                descriptor.name()
            ))
        })?;
        Ok(Self {
            owner: owner.to_string(),
            property: descriptor.name().to_string(),
            nullable: descriptor.is_nullable(),
            metadata,
            data: None,
            notifier: Notifier::default(),
        })
    }

    /// Reads one field of the embedded value.
    pub fn field(&self, name: &str) -> CoreResult<Value> {
        self.metadata.property(name)?;
        Ok(self
            .data
            .as_ref()
            .and_then(|d| d.get(name).cloned())
            .unwrap_or_default())
    }

    fn to_value(&self) -> Value {
        match &self.data {
            Some(data) => Value::from_entries(data.iter().map(|(k, v)| (k.clone(), v.clone()))),
            None => Value::Null,
        }
    }

    fn entries(&self, value: &Value) -> CoreResult<BTreeMap<String, Value>> {
        let pairs = value.as_map().ok_or_else(|| {
            CoreError::invalid_argument(format!(
                "Property {}::${} expects a map, got {}.",
                self.owner,
                self.property,
                value.type_name()
            ))
        })?;
        let mut data = BTreeMap::new();
        for (key, field) in pairs {
            let key = key.as_text().ok_or_else(|| {
                CoreError::invalid_argument(format!(
                    "Embeddable {} keys must be text.",
                    self.metadata.name()
                ))
            })?;
            self.metadata.property(key)?;
            data.insert(key.to_string(), field.clone());
        }
        Ok(data)
    }

    fn validated(&self, value: &Value) -> CoreResult<BTreeMap<String, Value>> {
        let mut data = self.entries(value)?;
        for descriptor in self.metadata.properties() {
            let field = data
                .entry(descriptor.name().to_string())
                .or_insert_with(|| descriptor.default().clone());
            if !descriptor.is_valid(field) {
                return Err(CoreError::invalid_argument(format!(
                    "Value for {}::${} property is invalid.",
                    self.metadata.name(),
                    descriptor.name()
                )));
            }
        }
        Ok(data)
    }
}

impl PropertyContainer for Embedded {
    fn kind(&self) -> ContainerKind {
        ContainerKind::Embedded
    }

    fn set_injected_value(
        &mut self,
        _ctx: &ContainerContext<'_>,
        value: PropertyValue,
    ) -> CoreResult<()> {
        let value = value.into_scalar(&self.property)?;
        let data = if value.is_null() {
            if !self.nullable {
                return Err(CoreError::invalid_argument(format!(
                    "Property {}::${} is not nullable.",
                    self.owner, self.property
                )));
            }
            None
        } else {
            Some(self.validated(&value)?)
        };
        if data != self.data {
            self.data = data;
            self.notifier.notify();
        }
        Ok(())
    }

    fn injected_value(&mut self, _ctx: &ContainerContext<'_>) -> CoreResult<PropertyValue> {
        if self.data.is_none() && !self.nullable {
            return Err(CoreError::invalid_state(format!(
                "Property {}::${} is not set.",
                self.owner, self.property
            )));
        }
        Ok(PropertyValue::Scalar(self.to_value()))
    }

    fn has_injected_value(&self) -> bool {
        self.data.is_some()
    }

    fn raw_value(&self) -> Value {
        self.to_value()
    }

    fn set_raw_value(&mut self, raw: Value) -> CoreResult<()> {
        self.data = if raw.is_null() {
            None
        } else {
            Some(self.entries(&raw)?)
        };
        Ok(())
    }

    fn on_modify(&mut self, callback: ModifyCallback) {
        self.notifier.set(callback);
    }

    fn clone_container(&self) -> Box<dyn PropertyContainer> {
        Box::new(Self {
            owner: self.owner.clone(),
            property: self.property.clone(),
            nullable: self.nullable,
            metadata: Arc::clone(&self.metadata),
            data: self.data.clone(),
            notifier: Notifier::default(),
        })
    }

    fn as_any_mut(&mut self) -> &mut dyn Any {
        self
    }
}

impl fmt::Debug for Embedded {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Embedded")
            .field("property", &self.property)
            .field("embeddable", &self.metadata.name())
            .field("data", &self.data)
            .finish()
    }
}
