use crate::error::{CoreError, CoreResult};
use crate::metadata::{EntityMetadata, MetadataCatalog, Relationship};
use std::sync::Arc;

const SEPARATOR: &str = "->";

/// One hop of a property path.
#[derive(Debug, Clone)]
pub struct PathStep {
    /// Entity owning the property.
    pub entity: Arc<EntityMetadata>,
    /// Property name.
    pub property: String,
    /// Relationship followed by this hop, if any.
    pub relationship: Option<Relationship>,
}

/// A validated property expression such as `author->name`.
///
/// Every hop but the last must be a relationship. A leading `this` segment
/// is accepted and dropped.
#[derive(Debug, Clone)]
pub struct PropertyPath {
    steps: Vec<PathStep>,
}

impl PropertyPath {
    /// Parses and validates `expr` starting at the `root` entity.
    pub fn parse(catalog: &MetadataCatalog, root: &str, expr: &str) -> CoreResult<Self> {
        let mut segments: Vec<&str> = expr.split(SEPARATOR).map(str::trim).collect();
        if segments.first() == Some(&"this") {
            segments.remove(0);
        }
        if segments.is_empty() || segments.iter().any(|s| s.is_empty()) {
            return Err(CoreError::invalid_argument(format!(
                "Malformed property expression '{expr}'."
            )));
        }

        let mut entity = catalog.get(root)?;
        let mut steps = Vec::with_capacity(segments.len());
        let last = segments.len() - 1;
        for (i, segment) in segments.into_iter().enumerate() {
            let relationship = entity.property(segment)?.relationship_target().cloned();
            let next = match (&relationship, i < last) {
                (Some(relationship), true) => Some(catalog.get(&relationship.entity)?),
                (None, true) => {
                    return Err(CoreError::invalid_argument(format!(
                        "Property {}::${segment} is not a relationship and cannot be traversed.",
                        entity.name()
                    )))
                }
                (_, false) => None,
            };
            steps.push(PathStep {
                entity: Arc::clone(&entity),
                property: segment.to_string(),
                relationship,
            });
            if let Some(next) = next {
                entity = next;
            }
        }
        Ok(Self { steps })
    }

    /// Hops in order.
    pub fn steps(&self) -> &[PathStep] {
        &self.steps
    }

    /// Property names in order.
    pub fn names(&self) -> Vec<String> {
        self.steps.iter().map(|s| s.property.clone()).collect()
    }

    /// The final hop.
    pub fn leaf(&self) -> &PathStep {
        &self.steps[self.steps.len() - 1]
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::metadata::{PropertyDescriptor, RelationshipKind};

    fn catalog() -> Arc<MetadataCatalog> {
        MetadataCatalog::builder()
            .register(
                EntityMetadata::builder("Book")
                    .property(PropertyDescriptor::new("id"))
                    .property(PropertyDescriptor::new("title"))
                    .property(PropertyDescriptor::new("author").relationship(
                        RelationshipKind::ManyHasOne,
                        "Author",
                        None,
                    )),
            )
            .register(
                EntityMetadata::builder("Author")
                    .property(PropertyDescriptor::new("id"))
                    .property(PropertyDescriptor::new("name")),
            )
            .build()
            .unwrap()
    }

    #[test]
    fn parses_relationship_paths() {
        let catalog = catalog();
        let path = PropertyPath::parse(&catalog, "Book", "this->author->name").unwrap();
        assert_eq!(path.names(), ["author", "name"]);
        assert_eq!(path.steps()[0].entity.name(), "Book");
        assert_eq!(path.leaf().entity.name(), "Author");
        assert!(path.leaf().relationship.is_none());
    }

    #[test]
    fn rejects_bad_paths() {
        let catalog = catalog();
        for expr in ["", "author->", "title->name", "author->isbn", "->title"] {
            let err = PropertyPath::parse(&catalog, "Book", expr).unwrap_err();
            assert!(err.is_invalid_argument(), "{expr}: {err}");
        }
    }
}
