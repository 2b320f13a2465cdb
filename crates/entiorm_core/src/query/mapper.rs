use super::{
    ArrayCollectionHelper, ArrayFunctionResolver, BuilderFunctionResolver, FilterCall,
    QueryBuilder, QueryBuilderHelper, StorageReflection, UnderscoreReflection,
};
use crate::entity::EntityRef;
use crate::error::{CoreError, CoreResult};
use crate::metadata::MetadataCatalog;
use crate::provider::EntityProvider;
use std::fmt;
use std::sync::{Arc, OnceLock};
use tracing::debug;

const ROOT_ALIAS: &str = "e";

/// Storage-side host of one entity type.
///
/// The table name and storage reflection are resolved on first use. A
/// mapper belongs to exactly one repository.
pub struct Mapper {
    name: String,
    table_name: OnceLock<String>,
    reflection: OnceLock<Arc<dyn StorageReflection>>,
    repository: OnceLock<Arc<dyn EntityProvider>>,
}

impl Mapper {
    /// Creates a mapper; `BookTagsMapper` stores into `book_tags`.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            table_name: OnceLock::new(),
            reflection: OnceLock::new(),
            repository: OnceLock::new(),
        }
    }

    /// Overrides the derived table name.
    #[must_use]
    pub fn with_table_name(mut self, table: impl Into<String>) -> Self {
        self.table_name = OnceLock::from(table.into());
        self
    }

    /// Uses `reflection` instead of [`UnderscoreReflection`].
    #[must_use]
    pub fn with_storage_reflection(mut self, reflection: Arc<dyn StorageReflection>) -> Self {
        self.reflection = OnceLock::from(reflection);
        self
    }

    /// Mapper name.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Table name, derived from the mapper name unless overridden.
    pub fn table_name(&self) -> &str {
        self.table_name.get_or_init(|| {
            let base = self.name.strip_suffix("Mapper").unwrap_or(&self.name);
            super::underscore(base)
        })
    }

    /// Storage reflection, created on first use.
    pub fn storage_reflection(&self) -> &Arc<dyn StorageReflection> {
        self.reflection.get_or_init(|| {
            debug!(mapper = %self.name, "creating default storage reflection");
            Arc::new(UnderscoreReflection)
        })
    }

    /// Attaches the mapper to its repository.
    ///
    /// Attaching again to the same repository is a no-op.
    pub fn set_repository(&self, repository: Arc<dyn EntityProvider>) -> CoreResult<()> {
        let current = self.repository.get_or_init(|| Arc::clone(&repository));
        if Arc::ptr_eq(current, &repository) {
            Ok(())
        } else {
            Err(CoreError::invalid_state(format!(
                "Mapper '{}' is already attached to repository.",
                self.name
            )))
        }
    }

    /// The attached repository.
    pub fn repository(&self) -> CoreResult<&Arc<dyn EntityProvider>> {
        self.repository.get().ok_or_else(|| {
            CoreError::invalid_state(format!(
                "Mapper '{}' is not attached to repository.",
                self.name
            ))
        })
    }

    /// A fresh `SELECT` over the mapper's table.
    pub fn builder(&self) -> QueryBuilder {
        QueryBuilder::new(self.table_name(), ROOT_ALIAS)
    }

    /// Renders `call` over `entity` into a query.
    pub fn query(
        &self,
        catalog: &Arc<MetadataCatalog>,
        entity: &str,
        resolver: &BuilderFunctionResolver,
        call: &FilterCall,
    ) -> CoreResult<QueryBuilder> {
        let helper = QueryBuilderHelper::new(
            Arc::clone(catalog),
            entity,
            Arc::clone(self.storage_reflection()),
            self.builder(),
        )?;
        resolver.apply(&helper, call)?;
        Ok(helper.into_builder())
    }

    /// Evaluates `call` over materialized `candidates` of `entity`.
    pub fn filter(
        &self,
        catalog: &Arc<MetadataCatalog>,
        entity: &str,
        resolver: &ArrayFunctionResolver,
        call: &FilterCall,
        candidates: &[EntityRef],
    ) -> CoreResult<Vec<EntityRef>> {
        let helper = ArrayCollectionHelper::new(Arc::clone(catalog), entity)?;
        resolver.filter(&helper, call, candidates)
    }
}

impl fmt::Debug for Mapper {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Mapper")
            .field("name", &self.name)
            .field("table_name", &self.table_name.get())
            .field("attached", &self.repository.get().is_some())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::entity::Entity;
    use crate::metadata::{EntityMetadata, PropertyDescriptor, ValueType};
    use crate::provider::IdentityMap;
    use crate::query::QueryFragment;
    use entiorm_codec::Value;

    fn catalog() -> Arc<MetadataCatalog> {
        MetadataCatalog::builder()
            .register(
                EntityMetadata::builder("Book")
                    .property(PropertyDescriptor::new("id").value_type(ValueType::Integer))
                    .property(PropertyDescriptor::new("title").value_type(ValueType::Text)),
            )
            .build()
            .unwrap()
    }

    #[test]
    fn table_name_is_derived_lazily() {
        assert_eq!(Mapper::new("BooksMapper").table_name(), "books");
        assert_eq!(Mapper::new("BookTagsMapper").table_name(), "book_tags");
        assert_eq!(Mapper::new("Authors").table_name(), "authors");
        assert_eq!(
            Mapper::new("BooksMapper").with_table_name("library_books").table_name(),
            "library_books"
        );
    }

    #[test]
    fn repository_attachment() {
        let mapper = Mapper::new("BooksMapper");
        assert!(mapper.repository().err().unwrap().is_invalid_state());

        let repository: Arc<dyn EntityProvider> = Arc::new(IdentityMap::new());
        mapper.set_repository(Arc::clone(&repository)).unwrap();
        mapper.set_repository(Arc::clone(&repository)).unwrap();
        assert!(Arc::ptr_eq(mapper.repository().unwrap(), &repository));

        let other: Arc<dyn EntityProvider> = Arc::new(IdentityMap::new());
        let err = mapper.set_repository(other).unwrap_err();
        assert!(err.is_invalid_state());
        assert!(err.to_string().contains("BooksMapper"));
    }

    #[test]
    fn query_renders_against_mapper_table() {
        let mapper = Mapper::new("BooksMapper");
        let builder = mapper
            .query(
                &catalog(),
                "Book",
                &BuilderFunctionResolver::new(),
                &FilterCall::like("title", "Du"),
            )
            .unwrap();
        assert_eq!(
            builder.to_sql().0,
            "SELECT e.* FROM books AS e WHERE e.title LIKE ? ESCAPE '\\'"
        );
    }

    #[test]
    fn custom_reflection_is_used() {
        #[derive(Debug)]
        struct Prefixed;

        impl StorageReflection for Prefixed {
            fn table_name(&self, entity: &EntityMetadata) -> String {
                entity.name().to_string()
            }

            fn column_name(
                &self,
                _entity: &EntityMetadata,
                property: &str,
            ) -> CoreResult<String> {
                Ok(format!("c_{property}"))
            }
        }

        let mapper = Mapper::new("BooksMapper").with_storage_reflection(Arc::new(Prefixed));
        let resolver = BuilderFunctionResolver::new().with_function("titled", |helper, _args| {
            Ok(QueryFragment::expression(
                format!("{} <> ''", helper.process_property_expr("title")?),
                vec![],
            ))
        });
        let builder = mapper
            .query(&catalog(), "Book", &resolver, &FilterCall::new("titled", vec![]))
            .unwrap();
        assert_eq!(builder.to_sql().0, "SELECT e.* FROM books AS e WHERE e.c_title <> ''");
    }

    #[test]
    fn filter_runs_array_backend() {
        let catalog = catalog();
        let candidates: Vec<EntityRef> = [(1, "Dune"), (2, "Emma")]
            .into_iter()
            .map(|(id, title)| {
                Entity::from_storage(
                    None,
                    catalog.get("Book").unwrap(),
                    [("id", Value::Integer(id)), ("title", Value::from(title))],
                )
                .into_ref()
            })
            .collect();
        let matched = Mapper::new("BooksMapper")
            .filter(
                &catalog,
                "Book",
                &ArrayFunctionResolver::new(),
                &FilterCall::like("title", "Em"),
                &candidates,
            )
            .unwrap();
        assert_eq!(matched.len(), 1);
        assert!(Arc::ptr_eq(&matched[0], &candidates[1]));
    }
}
