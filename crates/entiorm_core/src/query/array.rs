use super::{
    arity, text_arg, value_arg, CompareOperator, FilterArg, FilterCall, FunctionRegistry,
    PropertyPath, QueryFunctionResolver,
};
use crate::container::{entity_id, PropertyValue};
use crate::entity::{Entity, EntityRef};
use crate::error::{CoreError, CoreResult};
use crate::metadata::{EntityMetadata, MetadataCatalog};
use entiorm_codec::Value;
use std::fmt;
use std::sync::Arc;
use tracing::debug;

/// In-memory predicate over one candidate entity.
pub type ArrayPredicate = Box<dyn Fn(&mut Entity) -> CoreResult<bool> + Send + Sync>;

/// Evaluation context of the array backend: the catalog and the entity
/// type being filtered.
#[derive(Debug, Clone)]
pub struct ArrayCollectionHelper {
    catalog: Arc<MetadataCatalog>,
    entity: Arc<EntityMetadata>,
}

impl ArrayCollectionHelper {
    /// Creates a helper for filtering entities of type `entity`.
    pub fn new(catalog: Arc<MetadataCatalog>, entity: &str) -> CoreResult<Self> {
        let entity = catalog.get(entity)?;
        Ok(Self { catalog, entity })
    }

    /// Entity type being filtered.
    pub fn metadata(&self) -> &Arc<EntityMetadata> {
        &self.entity
    }

    /// Validates a property expression and returns its value reader.
    pub fn accessor(&self, expr: &str) -> CoreResult<ValueAccessor> {
        let path = PropertyPath::parse(&self.catalog, self.entity.name(), expr)?;
        Ok(ValueAccessor {
            names: path.names().into(),
        })
    }
}

/// Reads the values a property path reaches from a candidate.
///
/// Relationships reached at the end of the path yield ids. Collections on
/// the way fan out, so a path can reach many values.
#[derive(Debug, Clone)]
pub struct ValueAccessor {
    names: Arc<[String]>,
}

impl ValueAccessor {
    /// Collects every value reached from `entity`.
    pub fn values(&self, entity: &mut Entity) -> CoreResult<Vec<Value>> {
        collect(entity, &self.names)
    }

    /// Whether any reached value satisfies `test`.
    pub fn any(&self, entity: &mut Entity, test: impl Fn(&Value) -> bool) -> CoreResult<bool> {
        Ok(self.values(entity)?.iter().any(test))
    }
}

fn collect(entity: &mut Entity, names: &[String]) -> CoreResult<Vec<Value>> {
    let Some((first, rest)) = names.split_first() else {
        return Ok(Vec::new());
    };
    let value = entity.get_value(first)?;
    if rest.is_empty() {
        return Ok(match value {
            PropertyValue::Collection(items) => items.iter().map(entity_id).collect(),
            other => vec![other.to_id_value()],
        });
    }
    let related = match value {
        PropertyValue::Entity(related) => related.into_iter().collect(),
        PropertyValue::Collection(items) => items,
        PropertyValue::Scalar(_) => {
            return Err(CoreError::invalid_argument(format!(
                "Property {}::${first} cannot be traversed.",
                entity.metadata().name()
            )))
        }
    };
    let mut values = Vec::new();
    for item in related {
        let mut guard = item.try_write().ok_or_else(|| {
            CoreError::invalid_state(format!(
                "Entity reached through ${first} is locked during filtering."
            ))
        })?;
        values.extend(collect(&mut guard, rest)?);
    }
    Ok(values)
}

/// Resolver evaluating filters against in-memory entities.
pub struct ArrayFunctionResolver {
    registry: FunctionRegistry<ArrayCollectionHelper, ArrayPredicate>,
}

impl ArrayFunctionResolver {
    /// Creates a resolver with the default functions `equals`, `compare`
    /// and `like`.
    pub fn new() -> Self {
        Self {
            registry: FunctionRegistry::new()
                .register("equals", equals)
                .register("compare", compare)
                .register("like", like),
        }
    }

    /// Adds or replaces a custom function.
    #[must_use]
    pub fn with_function<F>(mut self, name: &str, function: F) -> Self
    where
        F: Fn(&ArrayCollectionHelper, &[FilterArg]) -> CoreResult<ArrayPredicate>
            + Send
            + Sync
            + 'static,
    {
        self.registry = self.registry.register(name, function);
        self
    }

    /// Returns the candidates matching `call`, in their original order.
    ///
    /// The call is fully resolved before the first candidate is read.
    pub fn filter(
        &self,
        helper: &ArrayCollectionHelper,
        call: &FilterCall,
        candidates: &[EntityRef],
    ) -> CoreResult<Vec<EntityRef>> {
        let predicate = self.resolve_call(helper, call)?;
        let mut matched = Vec::new();
        for candidate in candidates {
            let mut guard = candidate.try_write().ok_or_else(|| {
                CoreError::invalid_state(format!(
                    "Candidate {} is locked during filtering.",
                    helper.metadata().name()
                ))
            })?;
            if predicate(&mut guard)? {
                matched.push(Arc::clone(candidate));
            }
        }
        debug!(
            entity = %helper.metadata().name(),
            candidates = candidates.len(),
            matched = matched.len(),
            "array filter evaluated"
        );
        Ok(matched)
    }
}

impl Default for ArrayFunctionResolver {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for ArrayFunctionResolver {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ArrayFunctionResolver")
            .field("registry", &self.registry)
            .finish()
    }
}

impl QueryFunctionResolver for ArrayFunctionResolver {
    type Helper = ArrayCollectionHelper;
    type Output = ArrayPredicate;

    fn backend(&self) -> &str {
        "array"
    }

    fn registry(&self) -> &FunctionRegistry<ArrayCollectionHelper, ArrayPredicate> {
        &self.registry
    }

    fn combine_and(&self, parts: Vec<ArrayPredicate>) -> ArrayPredicate {
        Box::new(move |entity: &mut Entity| {
            for part in &parts {
                if !part(entity)? {
                    return Ok(false);
                }
            }
            Ok(true)
        })
    }

    fn combine_or(&self, parts: Vec<ArrayPredicate>) -> ArrayPredicate {
        Box::new(move |entity: &mut Entity| {
            for part in &parts {
                if part(entity)? {
                    return Ok(true);
                }
            }
            Ok(false)
        })
    }
}

fn equals(helper: &ArrayCollectionHelper, args: &[FilterArg]) -> CoreResult<ArrayPredicate> {
    arity("equals", args, 2)?;
    let accessor = helper.accessor(text_arg("equals", args, 0)?)?;
    let expected = value_arg("equals", args, 1)?.clone();
    Ok(Box::new(move |entity: &mut Entity| {
        accessor.any(entity, |value| match &expected {
            Value::Array(options) => !value.is_null() && options.contains(value),
            single => single == value,
        })
    }))
}

fn compare(helper: &ArrayCollectionHelper, args: &[FilterArg]) -> CoreResult<ArrayPredicate> {
    arity("compare", args, 3)?;
    let accessor = helper.accessor(text_arg("compare", args, 0)?)?;
    let operator = CompareOperator::parse(text_arg("compare", args, 1)?)?;
    let expected = value_arg("compare", args, 2)?.clone();
    Ok(Box::new(move |entity: &mut Entity| {
        accessor.any(entity, |value| operator.matches(value, &expected))
    }))
}

fn like(helper: &ArrayCollectionHelper, args: &[FilterArg]) -> CoreResult<ArrayPredicate> {
    arity("like", args, 2)?;
    let accessor = helper.accessor(text_arg("like", args, 0)?)?;
    let prefix = text_arg("like", args, 1)?.to_string();
    Ok(Box::new(move |entity: &mut Entity| {
        accessor.any(entity, |value| {
            value.as_text().is_some_and(|text| text.starts_with(&prefix))
        })
    }))
}
