//! Test fixtures and library catalog helpers.
//!
//! Provides a small book library domain (`Book`, `Author`, `Tag`,
//! `Publisher` and the `Address` embeddable) backed by an in-memory
//! identity map.

use entiorm_codec::Value;
use entiorm_core::{
    Config, Entity, EntityMetadata, EntityProvider, EntityRef, IdentityMap, MetadataCatalog,
    PropertyDescriptor, RelationshipKind, ValueType,
};
use std::sync::{Arc, Once};
use tracing_subscriber::EnvFilter;

static TRACING: Once = Once::new();

/// Installs a `tracing` subscriber honouring `RUST_LOG`, once per process.
pub fn init_tracing() {
    TRACING.call_once(|| {
        let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"));
        let _ = tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_test_writer()
            .try_init();
    });
}

/// Builds the library catalog with the given configuration.
pub fn library_catalog_with(config: Config) -> Arc<MetadataCatalog> {
    MetadataCatalog::builder()
        .register(
            EntityMetadata::builder("Book")
                .property(PropertyDescriptor::new("id").value_type(ValueType::Integer))
                .property(PropertyDescriptor::new("title").value_type(ValueType::Text))
                .property(
                    PropertyDescriptor::new("year")
                        .value_type(ValueType::Integer)
                        .nullable(true),
                )
                .property(PropertyDescriptor::new("author").relationship(
                    RelationshipKind::ManyHasOne,
                    "Author",
                    Some("books"),
                ))
                .property(
                    PropertyDescriptor::new("translator")
                        .relationship(RelationshipKind::ManyHasOne, "Author", None)
                        .nullable(true),
                )
                .property(
                    PropertyDescriptor::new("publisher")
                        .relationship(RelationshipKind::ManyHasOne, "Publisher", None)
                        .nullable(true),
                )
                .property(PropertyDescriptor::new("tags").relationship(
                    RelationshipKind::ManyHasMany,
                    "Tag",
                    None,
                ))
                .property(
                    PropertyDescriptor::new("printedAt")
                        .value_type(ValueType::Text)
                        .nullable(true)
                        .virtual_property(true),
                ),
        )
        .register(
            EntityMetadata::builder("Author")
                .table("authors")
                .property(PropertyDescriptor::new("id").value_type(ValueType::Integer))
                .property(PropertyDescriptor::new("name").value_type(ValueType::Text))
                .property(PropertyDescriptor::new("address").embedded("Address").nullable(true))
                .property(PropertyDescriptor::new("books").relationship(
                    RelationshipKind::OneHasMany,
                    "Book",
                    Some("author"),
                )),
        )
        .register(
            EntityMetadata::builder("Tag")
                .property(PropertyDescriptor::new("id").value_type(ValueType::Integer))
                .property(PropertyDescriptor::new("name").value_type(ValueType::Text)),
        )
        .register(
            EntityMetadata::builder("Publisher")
                .property(PropertyDescriptor::new("id").value_type(ValueType::Integer))
                .property(PropertyDescriptor::new("name").value_type(ValueType::Text)),
        )
        .register(
            EntityMetadata::embeddable("Address")
                .property(PropertyDescriptor::new("street").value_type(ValueType::Text))
                .property(
                    PropertyDescriptor::new("city")
                        .value_type(ValueType::Text)
                        .nullable(true),
                ),
        )
        .config(config)
        .build()
        .expect("library catalog is consistent")
}

/// Builds the library catalog with the default configuration.
pub fn library_catalog() -> Arc<MetadataCatalog> {
    library_catalog_with(Config::default())
}

/// A library catalog plus an identity map standing in for the repository.
pub struct Library {
    /// The metadata catalog.
    pub catalog: Arc<MetadataCatalog>,
    /// Registered entities.
    pub map: Arc<IdentityMap>,
}

impl Library {
    /// Creates an empty library.
    pub fn new() -> Self {
        Self::with_config(Config::default())
    }

    /// Creates an empty library with a custom configuration.
    pub fn with_config(config: Config) -> Self {
        Self {
            catalog: library_catalog_with(config),
            map: Arc::new(IdentityMap::new()),
        }
    }

    /// The identity map as an entity provider.
    pub fn repository(&self) -> Arc<dyn EntityProvider> {
        Arc::clone(&self.map) as Arc<dyn EntityProvider>
    }

    /// Metadata of an entity type.
    pub fn metadata(&self, entity: &str) -> Arc<EntityMetadata> {
        self.catalog.get(entity).expect("entity type is registered")
    }

    /// Creates a transient entity.
    pub fn create(&self, entity: &str) -> Entity {
        Entity::new(self.metadata(entity))
    }

    /// Loads an entity from storage data and registers it.
    pub fn load<'a>(
        &self,
        entity: &str,
        data: impl IntoIterator<Item = (&'a str, Value)>,
    ) -> EntityRef {
        let loaded = Entity::from_storage(Some(self.repository()), self.metadata(entity), data)
            .into_ref();
        self.map
            .insert(Arc::clone(&loaded))
            .expect("loaded entity has an identity");
        loaded
    }

    /// Looks up a registered entity.
    pub fn get(&self, entity: &str, id: i64) -> EntityRef {
        self.map
            .get_by_id(entity, &Value::Integer(id))
            .expect("identity map lookups do not fail")
            .expect("entity is registered")
    }
}

impl Default for Library {
    fn default() -> Self {
        Self::new()
    }
}

/// Test scenario helpers.
pub mod scenarios {
    use super::*;

    /// Library with two authors, one publisher, three tags and four books.
    ///
    /// | book | title            | year | author | tags |
    /// |------|------------------|------|--------|------|
    /// | 1    | Dune             | 1965 | 7      | 1, 2 |
    /// | 2    | Dune Messiah     | 1969 | 7      | 2    |
    /// | 3    | Emma             | 1815 | 8      |      |
    /// | 4    | Children of Dune |      | 7      | 2    |
    pub fn seeded_library() -> Library {
        let library = Library::new();
        library.load(
            "Author",
            [
                ("id", Value::Integer(7)),
                ("name", Value::from("Frank Herbert")),
                (
                    "address",
                    Value::from_entries([
                        ("street", Value::from("Main")),
                        ("city", Value::from("Tacoma")),
                    ]),
                ),
            ],
        );
        library.load(
            "Author",
            [("id", Value::Integer(8)), ("name", Value::from("Jane Austen"))],
        );
        library.load(
            "Publisher",
            [("id", Value::Integer(1)), ("name", Value::from("Chilton"))],
        );
        for (id, name) in [(1, "classic"), (2, "sci-fi"), (3, "romance")] {
            library.load("Tag", [("id", Value::Integer(id)), ("name", Value::from(name))]);
        }
        let books = [
            (1, "Dune", Value::Integer(1965), 7, Value::Integer(1), vec![1, 2]),
            (2, "Dune Messiah", Value::Integer(1969), 7, Value::Null, vec![2]),
            (3, "Emma", Value::Integer(1815), 8, Value::Null, vec![]),
            (4, "Children of Dune", Value::Null, 7, Value::Null, vec![2]),
        ];
        for (id, title, year, author, publisher, tags) in books {
            library.load(
                "Book",
                [
                    ("id", Value::Integer(id)),
                    ("title", Value::from(title)),
                    ("year", year),
                    ("author", Value::Integer(author)),
                    ("publisher", publisher),
                    ("tags", Value::Array(tags.into_iter().map(Value::Integer).collect())),
                ],
            );
        }
        library
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_catalog_builds() {
        let catalog = library_catalog();
        assert_eq!(catalog.names(), ["Address", "Author", "Book", "Publisher", "Tag"]);
        let book = catalog.get("Book").unwrap();
        assert!(!book.storage_properties().contains(&"printedAt".to_string()));
    }

    #[test]
    fn test_seeded_library() {
        let library = scenarios::seeded_library();
        assert_eq!(library.map.len(), 10);
        let book = library.get("Book", 1);
        assert!(book.read().is_persisted());
        assert!(!book.read().is_modified(None).unwrap());
    }

    #[test]
    fn test_init_tracing_is_idempotent() {
        init_tracing();
        init_tracing();
    }
}
