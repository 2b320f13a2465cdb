//! Metadata catalog.

use crate::config::Config;
use crate::error::{CoreError, CoreResult};
use crate::metadata::{EntityMetadata, EntityMetadataBuilder, RelationshipKind};
use std::collections::HashMap;
use std::sync::Arc;
use tracing::debug;

/// Registry of every entity and embeddable type of a model.
///
/// The catalog is built once through [`CatalogBuilder`], validated, and
/// then passed explicitly to whatever creates entities.
#[derive(Debug)]
pub struct MetadataCatalog {
    entities: HashMap<String, Arc<EntityMetadata>>,
    config: Arc<Config>,
}

impl MetadataCatalog {
    /// Starts building a catalog.
    pub fn builder() -> CatalogBuilder {
        CatalogBuilder::default()
    }

    /// Looks up metadata by type name.
    pub fn get(&self, name: &str) -> CoreResult<Arc<EntityMetadata>> {
        self.entities.get(name).cloned().ok_or_else(|| {
            CoreError::invalid_argument(format!("Entity metadata for '{name}' does not exist."))
        })
    }

    /// Returns true if the type is registered.
    pub fn has(&self, name: &str) -> bool {
        self.entities.contains_key(name)
    }

    /// Registered type names, sorted.
    pub fn names(&self) -> Vec<&str> {
        let mut names: Vec<_> = self.entities.keys().map(String::as_str).collect();
        names.sort_unstable();
        names
    }

    /// Shared configuration.
    pub fn config(&self) -> &Config {
        &self.config
    }
}

/// Collects metadata and validates it as a whole.
#[derive(Debug, Default)]
pub struct CatalogBuilder {
    types: Vec<EntityMetadataBuilder>,
    config: Config,
}

impl CatalogBuilder {
    /// Registers an entity or embeddable type.
    #[must_use]
    pub fn register(mut self, metadata: EntityMetadataBuilder) -> Self {
        self.types.push(metadata);
        self
    }

    /// Sets the configuration shared by every registered type.
    #[must_use]
    pub fn config(mut self, config: Config) -> Self {
        self.config = config;
        self
    }

    /// Validates cross-type references and publishes the catalog.
    pub fn build(self) -> CoreResult<Arc<MetadataCatalog>> {
        let config = Arc::new(self.config);
        let mut raw: HashMap<String, EntityMetadata> = HashMap::new();
        for builder in self.types {
            let name = builder.name().to_string();
            let embeddable = builder.is_embeddable();
            let metadata = builder.finish()?;
            if !embeddable && !metadata.has_property(metadata.primary_key()) {
                return Err(CoreError::invalid_state(format!(
                    "Entity {name} does not declare its primary key property '{}'.",
                    metadata.primary_key()
                )));
            }
            if raw.insert(name.clone(), metadata).is_some() {
                return Err(CoreError::invalid_state(format!(
                    "Entity metadata for '{name}' is registered twice."
                )));
            }
        }

        validate(&raw)?;

        // Embeddables first so entity descriptors can point at them.
        let mut entities: HashMap<String, Arc<EntityMetadata>> = HashMap::new();
        for (name, metadata) in raw.iter().filter(|(_, m)| m.is_embeddable()) {
            let descriptors = metadata.descriptors();
            entities.insert(
                name.clone(),
                Arc::new(metadata.clone().with_resolved(descriptors, Arc::clone(&config))),
            );
        }
        for (name, metadata) in raw.into_iter().filter(|(_, m)| !m.is_embeddable()) {
            let mut descriptors = metadata.descriptors();
            for descriptor in &mut descriptors {
                if let Some(embeddable) = &descriptor.embeddable {
                    descriptor.embeddable_metadata = entities.get(embeddable).cloned();
                }
            }
            entities.insert(
                name,
                Arc::new(metadata.with_resolved(descriptors, Arc::clone(&config))),
            );
        }

        debug!(types = entities.len(), "metadata catalog built");
        Ok(Arc::new(MetadataCatalog { entities, config }))
    }
}

fn validate(types: &HashMap<String, EntityMetadata>) -> CoreResult<()> {
    for (name, metadata) in types {
        for property in metadata.properties() {
            if let Some(relationship) = property.relationship_target() {
                if metadata.is_embeddable() {
                    return Err(CoreError::invalid_state(format!(
                        "Embeddable {name}::${} cannot hold a relationship.",
                        property.name()
                    )));
                }
                let target = types
                    .get(&relationship.entity)
                    .filter(|t| !t.is_embeddable())
                    .ok_or_else(|| {
                        CoreError::invalid_state(format!(
                            "{name}::${} points to unknown entity {}.",
                            property.name(),
                            relationship.entity
                        ))
                    })?;
                if let Some(reverse) = &relationship.property {
                    let back = target
                        .property(reverse)
                        .ok()
                        .and_then(|p| p.relationship_target())
                        .ok_or_else(|| {
                            CoreError::invalid_state(format!(
                                "{name}::${} expects {}::${reverse} to be a relationship.",
                                property.name(),
                                relationship.entity
                            ))
                        })?;
                    if back.entity != *name {
                        return Err(CoreError::invalid_state(format!(
                            "{}::${reverse} does not point back to {name}.",
                            relationship.entity
                        )));
                    }
                }
                if relationship.kind == RelationshipKind::OneHasMany && relationship.property.is_none()
                {
                    return Err(CoreError::invalid_state(format!(
                        "{name}::${} is one-has-many and needs a reverse property.",
                        property.name()
                    )));
                }
            }
            if let Some(embeddable) = &property.embeddable {
                if !types.get(embeddable).is_some_and(EntityMetadata::is_embeddable) {
                    return Err(CoreError::invalid_state(format!(
                        "{name}::${} embeds unknown type {embeddable}.",
                        property.name()
                    )));
                }
            }
        }
    }
    Ok(())
}
