use crate::error::{CoreError, CoreResult};
use crate::metadata::{ContainerKind, EntityMetadata};
use std::fmt;

/// Maps entity types onto tables and properties onto columns.
pub trait StorageReflection: Send + Sync + fmt::Debug {
    /// Table storing the entity type.
    fn table_name(&self, entity: &EntityMetadata) -> String;

    /// Column storing a property.
    fn column_name(&self, entity: &EntityMetadata, property: &str) -> CoreResult<String>;
}

/// Default reflection: `camelCase` names become `snake_case`, single
/// relationships get an `_id` suffix.
#[derive(Debug, Clone, Copy, Default)]
pub struct UnderscoreReflection;

impl StorageReflection for UnderscoreReflection {
    fn table_name(&self, entity: &EntityMetadata) -> String {
        entity
            .table()
            .map_or_else(|| underscore(entity.name()), str::to_string)
    }

    fn column_name(&self, entity: &EntityMetadata, property: &str) -> CoreResult<String> {
        let descriptor = entity.property(property)?;
        match descriptor.container() {
            Some(ContainerKind::HasOne) => Ok(format!("{}_id", underscore(property))),
            Some(ContainerKind::HasMany) => Err(CoreError::invalid_argument(format!(
                "Property {}::${property} is a collection and has no column.",
                entity.name()
            ))),
            _ => Ok(underscore(property)),
        }
    }
}

/// Converts `camelCase` or `PascalCase` into `snake_case`.
pub fn underscore(name: &str) -> String {
    let mut out = String::with_capacity(name.len() + 4);
    let mut previous_lower = false;
    for c in name.chars() {
        if c.is_uppercase() {
            if previous_lower {
                out.push('_');
            }
            out.extend(c.to_lowercase());
            previous_lower = false;
        } else {
            out.push(c);
            previous_lower = c.is_lowercase() || c.is_ascii_digit();
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::metadata::{MetadataCatalog, PropertyDescriptor, RelationshipKind};

    #[test]
    fn underscore_conversion() {
        assert_eq!(underscore("authorName"), "author_name");
        assert_eq!(underscore("BookTags"), "book_tags");
        assert_eq!(underscore("title"), "title");
        assert_eq!(underscore("isbn13Code"), "isbn13_code");
        assert_eq!(underscore("ID"), "id");
    }

    #[test]
    fn columns_and_tables() {
        let catalog = MetadataCatalog::builder()
            .register(
                EntityMetadata::builder("BookEdition")
                    .property(PropertyDescriptor::new("id"))
                    .property(PropertyDescriptor::new("printedAt"))
                    .property(PropertyDescriptor::new("translator").relationship(
                        RelationshipKind::ManyHasOne,
                        "BookEdition",
                        None,
                    ))
                    .property(PropertyDescriptor::new("reprints").relationship(
                        RelationshipKind::ManyHasMany,
                        "BookEdition",
                        None,
                    )),
            )
            .register(
                EntityMetadata::builder("Tag")
                    .table("labels")
                    .property(PropertyDescriptor::new("id")),
            )
            .build()
            .unwrap();
        let edition = catalog.get("BookEdition").unwrap();
        let reflection = UnderscoreReflection;

        assert_eq!(reflection.table_name(&edition), "book_edition");
        assert_eq!(reflection.table_name(&catalog.get("Tag").unwrap()), "labels");
        assert_eq!(reflection.column_name(&edition, "printedAt").unwrap(), "printed_at");
        assert_eq!(reflection.column_name(&edition, "translator").unwrap(), "translator_id");
        assert!(reflection.column_name(&edition, "reprints").is_err());
        assert!(reflection.column_name(&edition, "missing").unwrap_err().is_invalid_argument());
    }
}
