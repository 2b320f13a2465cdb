//! Per-property slot and its initialization transition.

use crate::container::{create_container, ModifyCallback, PropertyContainer};
use crate::error::{CoreError, CoreResult};
use crate::metadata::{PropertyDescriptor, SetOutcome};
use entiorm_codec::Value;

/// State of one property inside an entity.
///
/// A property absent from the entity's slot map is uninitialized with no
/// raw value.
#[derive(Debug)]
pub enum PropertySlot {
    /// Not yet validated; holds the raw value loaded from storage, if any.
    Uninitialized {
        /// Raw storage value.
        raw: Option<Value>,
    },
    /// Validated plain value.
    Value(Value),
    /// Validated composite value.
    Container(Box<dyn PropertyContainer>),
}

impl PropertySlot {
    /// Whether the property went through initialization.
    pub fn is_validated(&self) -> bool {
        !matches!(self, Self::Uninitialized { .. })
    }

    /// Storage-shaped value without running any initialization.
    pub fn raw(&self) -> Value {
        match self {
            Self::Uninitialized { raw } => raw.clone().unwrap_or_default(),
            Self::Value(value) => value.clone(),
            Self::Container(container) => container.raw_value(),
        }
    }
}

/// Result of initializing one property.
pub(crate) struct Initialized {
    pub(crate) slot: PropertySlot,
    /// True when a raw or default value went through the validated set path.
    pub(crate) assigned: bool,
}

/// Turns an uninitialized property into a validated slot.
///
/// Containers are hydrated from the raw value only when `hydrate` is set
/// (the owner is persisted, or is being restored from a snapshot).
/// Scalars route a non-null raw or default value through [`assign`].
/// Nothing is returned on error, so the caller's slot stays as it was.
pub(crate) fn initialize(
    entity: &str,
    descriptor: &PropertyDescriptor,
    raw: Option<Value>,
    hydrate: bool,
    strict: bool,
    on_modify: impl FnOnce() -> ModifyCallback,
) -> CoreResult<Initialized> {
    let raw = raw.unwrap_or_else(|| descriptor.default().clone());

    if descriptor.container().is_some() {
        let mut container = create_container(entity, descriptor)?;
        if hydrate {
            container.set_raw_value(raw)?;
        }
        container.on_modify(on_modify());
        return Ok(Initialized {
            slot: PropertySlot::Container(container),
            assigned: false,
        });
    }

    if raw.is_null() {
        return Ok(Initialized {
            slot: PropertySlot::Value(Value::Null),
            assigned: false,
        });
    }
    let value = assign(entity, descriptor, raw, &Value::Null, strict)?;
    Ok(Initialized {
        slot: PropertySlot::Value(value),
        assigned: true,
    })
}

/// Restores a validated slot from snapshot data without replaying hooks.
pub(crate) fn restore(
    entity: &str,
    descriptor: &PropertyDescriptor,
    raw: Option<Value>,
    on_modify: impl FnOnce() -> ModifyCallback,
) -> CoreResult<PropertySlot> {
    let raw = raw.unwrap_or_default();
    if descriptor.container().is_some() {
        let mut container = create_container(entity, descriptor)?;
        container.set_raw_value(raw)?;
        container.on_modify(on_modify());
        Ok(PropertySlot::Container(container))
    } else {
        Ok(PropertySlot::Value(raw))
    }
}

/// Validated scalar assignment: setter hook, optional coercion, validation.
///
/// Returns the value to store; a skipping setter yields `current`.
pub(crate) fn assign(
    entity: &str,
    descriptor: &PropertyDescriptor,
    value: Value,
    current: &Value,
    strict: bool,
) -> CoreResult<Value> {
    let value = match &descriptor.setter {
        Some(setter) => match setter(value, current) {
            SetOutcome::Accept(value) => value,
            SetOutcome::Skip => return Ok(current.clone()),
            SetOutcome::Reject(reason) => {
                return Err(CoreError::invalid_argument(format!(
                    "Setter for {entity}::${} rejected the value: {reason}",
                    descriptor.name()
                )))
            }
        },
        None => value,
    };
    let value = if strict { value } else { descriptor.coerce(value) };
    if !descriptor.is_valid(&value) {
        return Err(CoreError::invalid_argument(format!(
            "Value for {entity}::${} property is invalid.",
            descriptor.name()
        )));
    }
    Ok(value)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::container::ContainerContext;
    use crate::metadata::{ContainerKind, RelationshipKind, ValueType};
    use std::sync::atomic::{AtomicBool, Ordering};
    use std::sync::Arc;

    fn noop() -> ModifyCallback {
        Box::new(|| {})
    }

    fn title() -> PropertyDescriptor {
        PropertyDescriptor::new("title").value_type(ValueType::Text)
    }

    #[test]
    fn scalar_raw_goes_through_set_path() {
        let descriptor = title().setter(|v, _| match v {
            Value::Text(t) => SetOutcome::Accept(Value::Text(t.to_uppercase())),
            other => SetOutcome::Accept(other),
        });
        let init = initialize("Book", &descriptor, Some("dune".into()), true, true, noop).unwrap();
        assert!(init.assigned);
        assert!(matches!(init.slot, PropertySlot::Value(Value::Text(ref t)) if t == "DUNE"));
    }

    #[test]
    fn default_seeds_missing_raw() {
        let descriptor = title().default_value("untitled");
        let init = initialize("Book", &descriptor, None, false, true, noop).unwrap();
        assert!(init.assigned);
        assert_eq!(init.slot.raw(), Value::from("untitled"));
    }

    #[test]
    fn null_raw_is_not_assigned() {
        let init = initialize("Book", &title(), None, false, true, noop).unwrap();
        assert!(!init.assigned);
        assert_eq!(init.slot.raw(), Value::Null);
    }

    #[test]
    fn invalid_raw_fails() {
        let err = initialize("Book", &title(), Some(Value::Integer(1)), true, true, noop)
            .err()
            .unwrap();
        assert!(err.is_invalid_argument());
    }

    #[test]
    fn loose_typing_coerces() {
        let year = PropertyDescriptor::new("year").value_type(ValueType::Integer);
        let init = initialize("Book", &year, Some("1965".into()), true, false, noop).unwrap();
        assert_eq!(init.slot.raw(), Value::Integer(1965));
        assert!(initialize("Book", &year, Some("1965".into()), true, true, noop).is_err());
    }

    #[test]
    fn container_hydrates_only_when_asked() {
        let author = PropertyDescriptor::new("author")
            .relationship(RelationshipKind::ManyHasOne, "Author", None);

        let registered = Arc::new(AtomicBool::new(false));
        let flag = Arc::clone(&registered);
        let init = initialize("Book", &author, Some(Value::Integer(7)), true, true, move || {
            flag.store(true, Ordering::SeqCst);
            noop()
        })
        .unwrap();
        assert!(registered.load(Ordering::SeqCst));
        assert!(!init.assigned);
        assert_eq!(init.slot.raw(), Value::Integer(7));

        let init = initialize("Book", &author, Some(Value::Integer(7)), false, true, noop).unwrap();
        assert_eq!(init.slot.raw(), Value::Null);
        match init.slot {
            PropertySlot::Container(mut c) => {
                assert_eq!(c.kind(), ContainerKind::HasOne);
                assert!(c.injected_value(&ContainerContext::detached()).is_err());
            }
            other => panic!("unexpected slot {other:?}"),
        }
    }

    #[test]
    fn setter_outcomes() {
        let descriptor = title().setter(|v, _| match v.as_text() {
            Some("") => SetOutcome::Skip,
            Some("forbidden") => SetOutcome::Reject("word not allowed".into()),
            _ => SetOutcome::Accept(v),
        });
        let current = Value::from("old");
        assert_eq!(
            assign("Book", &descriptor, "".into(), &current, true).unwrap(),
            current
        );
        let err = assign("Book", &descriptor, "forbidden".into(), &current, true).unwrap_err();
        assert!(err.to_string().contains("word not allowed"));
        assert_eq!(
            assign("Book", &descriptor, "new".into(), &current, true).unwrap(),
            Value::from("new")
        );
    }

    #[test]
    fn restore_skips_hooks() {
        let descriptor = title().setter(|_, _| SetOutcome::Reject("never".into()));
        let slot = restore("Book", &descriptor, Some("kept".into()), noop).unwrap();
        assert_eq!(slot.raw(), Value::from("kept"));
        assert!(slot.is_validated());
    }
}
