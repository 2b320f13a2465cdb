//! Entity metadata: property descriptors, per-type metadata, and the catalog.

mod catalog;
mod descriptor;
mod entity;

pub use catalog::{CatalogBuilder, MetadataCatalog};
pub use descriptor::{
    ContainerKind, GetterHook, PropertyDescriptor, Relationship, RelationshipKind, SetOutcome,
    SetterHook, ValueType,
};
pub use entity::{EntityMetadata, EntityMetadataBuilder};
