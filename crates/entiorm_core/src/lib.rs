//! # EntiORM Core
//!
//! Runtime core of the EntiORM object-relational mapping layer.
//!
//! This crate provides:
//! - Entity metadata: property descriptors and a validated catalog
//! - The entity property state machine (lazy initialization, validation,
//!   modification tracking, persistence identity)
//! - Property containers for relationships and embedded values
//! - Snapshots, cloning and structural export of entities
//! - Query function dispatch for in-memory and query-builder backends
//!
//! Storage drivers and repositories live outside this crate; they reach
//! related entities through [`EntityProvider`].
//!
//! ## Usage
//!
//! ```
//! use entiorm_codec::Value;
//! use entiorm_core::{Entity, EntityMetadata, MetadataCatalog, PropertyDescriptor, ValueType};
//!
//! let catalog = MetadataCatalog::builder()
//!     .register(
//!         EntityMetadata::builder("Book")
//!             .property(PropertyDescriptor::new("id").value_type(ValueType::Integer))
//!             .property(PropertyDescriptor::new("title").value_type(ValueType::Text)),
//!     )
//!     .build()
//!     .unwrap();
//!
//! let mut book = Entity::new(catalog.get("Book").unwrap());
//! book.set_value("title", "Dune").unwrap();
//! assert!(book.is_modified(Some("title")).unwrap());
//!
//! book.on_persist(1i64).unwrap();
//! assert!(book.is_persisted());
//! assert!(!book.is_modified(None).unwrap());
//! assert_eq!(book.get("title").unwrap(), Value::from("Dune"));
//! ```

#![deny(unsafe_code)]
#![warn(missing_docs)]

pub mod config;
pub mod container;
pub mod entity;
pub mod error;
pub mod metadata;
pub mod provider;
pub mod query;
pub mod to_array;

pub use config::Config;
pub use container::{PropertyContainer, PropertyValue};
pub use entity::{Entity, EntityRef, EntitySnapshot, ModifiedFields, PropertySlot};
pub use error::{CoreError, CoreResult};
pub use metadata::{
    EntityMetadata, MetadataCatalog, PropertyDescriptor, Relationship, RelationshipKind,
    SetOutcome, ValueType,
};
pub use provider::{EntityProvider, IdentityMap};
pub use query::{
    ArrayFunctionResolver, BuilderFunctionResolver, FilterArg, FilterCall, QueryFunctionResolver,
};
pub use to_array::{EntityArray, ToArrayConverter, ToArrayMode};
