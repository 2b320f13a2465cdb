//! Per-entity-type metadata.

use crate::config::Config;
use crate::error::{CoreError, CoreResult};
use crate::metadata::PropertyDescriptor;
use std::collections::HashMap;
use std::sync::Arc;

/// Metadata of one entity (or embeddable) type.
///
/// Only a built [`crate::MetadataCatalog`] hands out `Arc<EntityMetadata>`,
/// so an entity can never exist before its catalog does.
#[derive(Debug, Clone)]
pub struct EntityMetadata {
    name: String,
    primary_key: String,
    table: Option<String>,
    embeddable: bool,
    properties: Vec<Arc<PropertyDescriptor>>,
    index: HashMap<String, usize>,
    storage_properties: Vec<String>,
    config: Arc<Config>,
}

impl EntityMetadata {
    /// Starts describing an entity type.
    pub fn builder(name: impl Into<String>) -> EntityMetadataBuilder {
        EntityMetadataBuilder {
            name: name.into(),
            primary_key: "id".to_string(),
            table: None,
            embeddable: false,
            properties: Vec::new(),
        }
    }

    /// Starts describing an embeddable value type.
    pub fn embeddable(name: impl Into<String>) -> EntityMetadataBuilder {
        let mut builder = Self::builder(name);
        builder.embeddable = true;
        builder
    }

    /// Type name.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Name of the primary key property.
    pub fn primary_key(&self) -> &str {
        &self.primary_key
    }

    /// Explicit table name, if one was declared.
    pub fn table(&self) -> Option<&str> {
        self.table.as_deref()
    }

    /// Whether this describes an embeddable value rather than an entity.
    pub fn is_embeddable(&self) -> bool {
        self.embeddable
    }

    /// Configuration of the catalog this metadata belongs to.
    pub fn config(&self) -> &Config {
        &self.config
    }

    /// Looks up a property descriptor.
    pub fn property(&self, name: &str) -> CoreResult<&Arc<PropertyDescriptor>> {
        self.index
            .get(name)
            .map(|&i| &self.properties[i])
            .ok_or_else(|| {
                CoreError::invalid_argument(format!(
                    "Undefined property {}::${name}.",
                    self.name
                ))
            })
    }

    /// Returns true if the property is declared.
    pub fn has_property(&self, name: &str) -> bool {
        self.index.contains_key(name)
    }

    /// All descriptors in declaration order.
    pub fn properties(&self) -> impl Iterator<Item = &Arc<PropertyDescriptor>> {
        self.properties.iter()
    }

    /// Names of the properties persisted by this entity, in declaration order.
    pub fn storage_properties(&self) -> &[String] {
        &self.storage_properties
    }

    pub(crate) fn with_resolved(
        mut self,
        properties: Vec<PropertyDescriptor>,
        config: Arc<Config>,
    ) -> Self {
        self.properties = properties.into_iter().map(Arc::new).collect();
        self.config = config;
        self
    }

    pub(crate) fn descriptors(&self) -> Vec<PropertyDescriptor> {
        self.properties.iter().map(|p| (**p).clone()).collect()
    }
}

/// Builder for [`EntityMetadata`].
#[derive(Debug)]
pub struct EntityMetadataBuilder {
    name: String,
    primary_key: String,
    table: Option<String>,
    embeddable: bool,
    properties: Vec<PropertyDescriptor>,
}

impl EntityMetadataBuilder {
    /// Sets the primary key property name (defaults to `id`).
    #[must_use]
    pub fn primary_key(mut self, name: impl Into<String>) -> Self {
        self.primary_key = name.into();
        self
    }

    /// Sets an explicit table name.
    #[must_use]
    pub fn table(mut self, name: impl Into<String>) -> Self {
        self.table = Some(name.into());
        self
    }

    /// Adds a property.
    #[must_use]
    pub fn property(mut self, descriptor: PropertyDescriptor) -> Self {
        self.properties.push(descriptor);
        self
    }

    pub(crate) fn name(&self) -> &str {
        &self.name
    }

    pub(crate) fn is_embeddable(&self) -> bool {
        self.embeddable
    }

    /// Freezes the metadata. Duplicate property names are rejected.
    pub(crate) fn finish(self) -> CoreResult<EntityMetadata> {
        let mut index = HashMap::with_capacity(self.properties.len());
        for (i, property) in self.properties.iter().enumerate() {
            if index.insert(property.name.clone(), i).is_some() {
                return Err(CoreError::invalid_state(format!(
                    "Property {}::${} is declared twice.",
                    self.name, property.name
                )));
            }
        }
        let storage_properties = self
            .properties
            .iter()
            .filter(|p| p.is_storage())
            .map(|p| p.name.clone())
            .collect();

        Ok(EntityMetadata {
            name: self.name,
            primary_key: self.primary_key,
            table: self.table,
            embeddable: self.embeddable,
            properties: self.properties.into_iter().map(Arc::new).collect(),
            index,
            storage_properties,
            config: Arc::new(Config::default()),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::metadata::{RelationshipKind, ValueType};

    fn book() -> EntityMetadata {
        EntityMetadata::builder("Book")
            .property(PropertyDescriptor::new("id").value_type(ValueType::Integer).nullable(true))
            .property(PropertyDescriptor::new("title").value_type(ValueType::Text))
            .property(
                PropertyDescriptor::new("translations")
                    .relationship(RelationshipKind::OneHasMany, "Book", Some("original")),
            )
            .property(PropertyDescriptor::new("label").virtual_property(true).nullable(true))
            .finish()
            .unwrap()
    }

    #[test]
    fn lookup() {
        let meta = book();
        assert_eq!(meta.name(), "Book");
        assert_eq!(meta.primary_key(), "id");
        assert!(meta.has_property("title"));
        assert!(!meta.has_property("isbn"));
        assert_eq!(meta.property("title").unwrap().name(), "title");
    }

    #[test]
    fn unknown_property_is_invalid_argument() {
        let err = book().property("isbn").unwrap_err();
        assert!(err.is_invalid_argument());
        assert!(err.to_string().contains("Book::$isbn"));
    }

    #[test]
    fn storage_properties_skip_virtual_and_reverse_sides() {
        assert_eq!(book().storage_properties(), ["id", "title"]);
    }

    #[test]
    fn duplicate_property_rejected() {
        let err = EntityMetadata::builder("Book")
            .property(PropertyDescriptor::new("id"))
            .property(PropertyDescriptor::new("id"))
            .finish()
            .unwrap_err();
        assert!(err.is_invalid_state());
    }
}
