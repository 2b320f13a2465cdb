use super::slot::{self, PropertySlot};
use super::{EntityRef, EntitySnapshot, ModifiedFields};
use crate::container::{
    create_container, ContainerContext, HasMany, PropertyContainer, PropertyValue,
};
use crate::error::{CoreError, CoreResult};
use crate::metadata::{ContainerKind, EntityMetadata, PropertyDescriptor, RelationshipKind};
use crate::provider::EntityProvider;
use crate::to_array::{EntityArray, ToArrayConverter, ToArrayMode};
use entiorm_codec::Value;
use parking_lot::{Mutex, RwLock};
use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::fmt;
use std::sync::Arc;
use tracing::{debug, trace};

/// A domain object with lazily validated properties.
///
/// Entities are created transient with [`Entity::new`] or loaded from
/// storage with [`Entity::from_storage`]. A transient entity starts
/// modified as a whole; a loaded one tracks modifications per field.
pub struct Entity {
    metadata: Arc<EntityMetadata>,
    slots: HashMap<String, PropertySlot>,
    modified: Arc<Mutex<ModifiedFields>>,
    persisted_id: Option<Value>,
    repository: Option<Arc<dyn EntityProvider>>,
}

impl Entity {
    /// Creates a transient entity.
    pub fn new(metadata: Arc<EntityMetadata>) -> Self {
        Self::with_modified(metadata, ModifiedFields::everything())
    }

    /// Creates an entity from storage data.
    pub fn from_storage<I, K>(
        repository: Option<Arc<dyn EntityProvider>>,
        metadata: Arc<EntityMetadata>,
        data: I,
    ) -> Self
    where
        I: IntoIterator<Item = (K, Value)>,
        K: Into<String>,
    {
        let mut entity = Self::with_modified(Arc::clone(&metadata), ModifiedFields::default());
        entity.on_load(repository, metadata, data);
        entity
    }

    fn with_modified(metadata: Arc<EntityMetadata>, modified: ModifiedFields) -> Self {
        Self {
            metadata,
            slots: HashMap::new(),
            modified: Arc::new(Mutex::new(modified)),
            persisted_id: None,
            repository: None,
        }
    }

    /// Wraps the entity in a shared handle.
    pub fn into_ref(self) -> EntityRef {
        Arc::new(RwLock::new(self))
    }

    /// Metadata of the entity type.
    pub fn metadata(&self) -> &Arc<EntityMetadata> {
        &self.metadata
    }

    /// Repository the entity is attached to.
    pub fn repository(&self) -> CoreResult<&Arc<dyn EntityProvider>> {
        self.repository.as_ref().ok_or_else(|| {
            CoreError::invalid_state(format!(
                "Entity {} is not attached to repository.",
                self.metadata.name()
            ))
        })
    }

    /// Whether a repository is attached.
    pub fn is_attached(&self) -> bool {
        self.repository.is_some()
    }

    /// Current primary value, read without initialization.
    pub fn id(&self) -> Option<Value> {
        self.slots
            .get(self.metadata.primary_key())
            .map(PropertySlot::raw)
            .and_then(Value::into_option)
    }

    /// Whether the entity has been loaded from or written to storage.
    pub fn is_persisted(&self) -> bool {
        self.persisted_id.is_some()
    }

    /// Identity the entity was persisted with.
    pub fn persisted_id(&self) -> Option<&Value> {
        self.persisted_id.as_ref()
    }

    /// Whether the property already went through initialization.
    pub fn is_initialized(&self, name: &str) -> bool {
        self.slots.get(name).is_some_and(PropertySlot::is_validated)
    }

    /// With a name, whether that field is modified; without, whether
    /// anything is.
    pub fn is_modified(&self, name: Option<&str>) -> CoreResult<bool> {
        match name {
            None => Ok(self.modified.lock().any()),
            Some(name) => {
                self.metadata.property(name)?;
                Ok(self.modified.lock().contains(name))
            }
        }
    }

    /// Marks one field, or the whole entity, modified.
    pub fn set_as_modified(&mut self, name: Option<&str>) -> CoreResult<()> {
        match name {
            None => self.modified.lock().mark_all(),
            Some(name) => {
                self.metadata.property(name)?;
                self.modified.lock().mark(name);
            }
        }
        Ok(())
    }

    /// Copy of the modified set.
    pub fn modified_fields(&self) -> ModifiedFields {
        self.modified.lock().clone()
    }

    /// Assigns a property value.
    pub fn set_value(
        &mut self,
        name: &str,
        value: impl Into<PropertyValue>,
    ) -> CoreResult<&mut Self> {
        let descriptor = Arc::clone(self.metadata.property(name)?);
        if descriptor.is_read_only() {
            return Err(CoreError::invalid_argument(format!(
                "Property {}::${name} is read-only.",
                self.metadata.name()
            )));
        }
        self.internal_set_value(&descriptor, value.into())?;
        Ok(self)
    }

    /// Assigns a property value, read-only properties included.
    pub fn set_read_only_value(
        &mut self,
        name: &str,
        value: impl Into<PropertyValue>,
    ) -> CoreResult<&mut Self> {
        let descriptor = Arc::clone(self.metadata.property(name)?);
        self.internal_set_value(&descriptor, value.into())?;
        Ok(self)
    }

    /// Reads a property value, resolving relationships as needed.
    pub fn get_value(&mut self, name: &str) -> CoreResult<PropertyValue> {
        let descriptor = Arc::clone(self.metadata.property(name)?);
        self.initialize_property(&descriptor)?;
        let ctx = ContainerContext {
            repository: self.repository.as_ref(),
            parent_id: self.persisted_id.as_ref(),
        };
        match self.slots.get_mut(name) {
            Some(PropertySlot::Container(container)) => container.injected_value(&ctx),
            Some(PropertySlot::Value(stored)) => {
                let value = match &descriptor.getter {
                    Some(getter) => getter(stored),
                    None => stored.clone(),
                };
                if value.is_null() && !descriptor.is_nullable() {
                    return Err(CoreError::invalid_state(format!(
                        "Property {}::${name} is not set.",
                        self.metadata.name()
                    )));
                }
                Ok(PropertyValue::Scalar(value))
            }
            _ => Err(not_initialized(&self.metadata, name)),
        }
    }

    /// Reads a plain property value.
    pub fn get(&mut self, name: &str) -> CoreResult<Value> {
        match self.get_value(name)? {
            PropertyValue::Scalar(value) => Ok(value),
            _ => Err(self.wrong_shape(name, "a plain value")),
        }
    }

    /// Reads a single relationship.
    pub fn get_entity(&mut self, name: &str) -> CoreResult<Option<EntityRef>> {
        match self.get_value(name)? {
            PropertyValue::Entity(entity) => Ok(entity),
            _ => Err(self.wrong_shape(name, "a single relationship")),
        }
    }

    /// Reads the members of a relationship collection.
    pub fn get_collection(&mut self, name: &str) -> CoreResult<Vec<EntityRef>> {
        match self.get_value(name)? {
            PropertyValue::Collection(items) => Ok(items),
            _ => Err(self.wrong_shape(name, "a collection")),
        }
    }

    /// Whether the property holds a value. Unknown names report false.
    pub fn has_value(&mut self, name: &str) -> CoreResult<bool> {
        let Ok(descriptor) = self.metadata.property(name).map(Arc::clone) else {
            return Ok(false);
        };
        self.initialize_property(&descriptor)?;
        Ok(match self.slots.get(name) {
            Some(PropertySlot::Container(container)) => container.has_injected_value(),
            Some(PropertySlot::Value(stored)) => !stored.is_null(),
            _ => false,
        })
    }

    /// Storage-shaped value, without hooks or initialization.
    pub fn get_raw_value(&self, name: &str) -> CoreResult<Value> {
        self.metadata.property(name)?;
        Ok(self.slots.get(name).map(PropertySlot::raw).unwrap_or_default())
    }

    /// Runs `f` with the property's container downcast to `T`.
    pub fn with_container<T, R, F>(&mut self, name: &str, f: F) -> CoreResult<R>
    where
        T: PropertyContainer + 'static,
        F: FnOnce(&mut T, &ContainerContext<'_>) -> CoreResult<R>,
    {
        let descriptor = Arc::clone(self.metadata.property(name)?);
        self.initialize_property(&descriptor)?;
        let ctx = ContainerContext {
            repository: self.repository.as_ref(),
            parent_id: self.persisted_id.as_ref(),
        };
        let container = match self.slots.get_mut(name) {
            Some(PropertySlot::Container(container)) => container.as_any_mut().downcast_mut::<T>(),
            _ => None,
        }
        .ok_or_else(|| {
            CoreError::invalid_argument(format!(
                "Property {}::${name} does not hold the requested container.",
                self.metadata.name()
            ))
        })?;
        f(container, &ctx)
    }

    /// Adds an entity to a relationship collection.
    pub fn add_to(&mut self, name: &str, entity: EntityRef) -> CoreResult<bool> {
        self.with_container::<HasMany, _, _>(name, |c, ctx| c.add(ctx, entity))
    }

    /// Removes an entity from a relationship collection.
    pub fn remove_from(&mut self, name: &str, entity: &EntityRef) -> CoreResult<bool> {
        self.with_container::<HasMany, _, _>(name, |c, ctx| c.remove(ctx, entity))
    }

    /// Structural export of the storage properties.
    pub fn to_array(&mut self, mode: ToArrayMode) -> CoreResult<EntityArray> {
        let converter = ToArrayConverter::from_config(self.metadata.config());
        converter.convert(self, mode)
    }

    /// Structural export in the configured default mode.
    pub fn to_array_default(&mut self) -> CoreResult<EntityArray> {
        let mode = self.metadata.config().default_to_array_mode;
        self.to_array(mode)
    }

    /// Copies raw storage data into the entity and captures its identity.
    ///
    /// Keys that are not storage properties are ignored, as are nulls.
    pub fn on_load<I, K>(
        &mut self,
        repository: Option<Arc<dyn EntityProvider>>,
        metadata: Arc<EntityMetadata>,
        data: I,
    ) where
        I: IntoIterator<Item = (K, Value)>,
        K: Into<String>,
    {
        self.metadata = metadata;
        if repository.is_some() {
            self.repository = repository;
        }
        for (name, raw) in data {
            let name = name.into();
            if raw.is_null() || !self.metadata.storage_properties().contains(&name) {
                continue;
            }
            self.slots
                .insert(name, PropertySlot::Uninitialized { raw: Some(raw) });
        }
        self.persisted_id = self.id();
        trace!(entity = %self.metadata.name(), id = ?self.persisted_id, "entity loaded");
    }

    /// Attaches the entity to a repository. The modified set is kept.
    pub fn on_attach(&mut self, repository: Arc<dyn EntityProvider>, metadata: Arc<EntityMetadata>) {
        self.repository = Some(repository);
        self.metadata = metadata;
        trace!(entity = %self.metadata.name(), "entity attached");
    }

    /// Records the identity assigned by storage and clears modifications.
    pub fn on_persist(&mut self, id: impl Into<Value>) -> CoreResult<()> {
        let primary_key = Arc::clone(self.metadata.property(self.metadata.primary_key())?);
        self.internal_set_value(&primary_key, PropertyValue::Scalar(id.into()))?;
        self.persisted_id = self.id();
        self.modified.lock().clear();
        debug!(entity = %self.metadata.name(), id = ?self.persisted_id, "entity persisted");
        Ok(())
    }

    /// Returns the entity to the transient state after removal.
    pub fn on_after_remove(&mut self) {
        self.persisted_id = None;
        self.modified.lock().clear();
        debug!(entity = %self.metadata.name(), "entity removed");
    }

    /// Produces an independent, transient copy.
    ///
    /// Collections are drained and re-populated into fresh containers;
    /// other containers are copied. The copy has a null primary key and
    /// is modified as a whole. Like a new entity, it reports no value for
    /// a non-nullable primary key until [`Entity::on_persist`] assigns one,
    /// and reading it fails with [`CoreError::InvalidState`].
    pub fn duplicate(&mut self) -> CoreResult<Entity> {
        let storage = self
            .metadata
            .storage_properties()
            .iter()
            .map(|name| self.metadata.property(name).map(Arc::clone))
            .collect::<CoreResult<Vec<_>>>()?;
        for descriptor in &storage {
            self.initialize_property(descriptor)?;
        }

        let mut slots = HashMap::with_capacity(self.slots.len());
        let ctx = ContainerContext {
            repository: self.repository.as_ref(),
            parent_id: self.persisted_id.as_ref(),
        };
        let detached = ContainerContext {
            repository: self.repository.as_ref(),
            parent_id: None,
        };
        for descriptor in &storage {
            let copy = match self.slots.get_mut(descriptor.name()) {
                Some(PropertySlot::Container(container))
                    if container.kind() == ContainerKind::HasMany =>
                {
                    let members = container.injected_value(&ctx)?;
                    let mut fresh = create_container(self.metadata.name(), descriptor)?;
                    fresh.set_injected_value(&detached, members)?;
                    PropertySlot::Container(fresh)
                }
                Some(PropertySlot::Container(container)) => {
                    PropertySlot::Container(container.clone_container())
                }
                Some(PropertySlot::Value(value)) => PropertySlot::Value(value.clone()),
                Some(PropertySlot::Uninitialized { raw }) => {
                    PropertySlot::Uninitialized { raw: raw.clone() }
                }
                None => continue,
            };
            slots.insert(descriptor.name().to_string(), copy);
        }
        for (name, slot) in &self.slots {
            if slots.contains_key(name) {
                continue;
            }
            if let PropertySlot::Value(value) = slot {
                slots.insert(name.clone(), PropertySlot::Value(value.clone()));
            }
        }

        let modified = Arc::new(Mutex::new(ModifiedFields::everything()));
        for (name, slot) in &mut slots {
            if let PropertySlot::Container(container) = slot {
                container.on_modify(ModifiedFields::callback(&modified, name));
            }
        }
        slots.insert(
            self.metadata.primary_key().to_string(),
            PropertySlot::Value(Value::Null),
        );

        debug!(entity = %self.metadata.name(), source = ?self.persisted_id, "entity duplicated");
        Ok(Entity {
            metadata: Arc::clone(&self.metadata),
            slots,
            modified,
            persisted_id: None,
            repository: self.repository.clone(),
        })
    }

    /// Captures the entity state.
    ///
    /// Relationships are stored as ids; one-has-many collections are
    /// owned by the other side and are left out of the data.
    pub fn serialize(&self) -> EntitySnapshot {
        let mut data = BTreeMap::new();
        let mut validated = BTreeSet::new();
        for (name, slot) in &self.slots {
            if slot.is_validated() {
                validated.insert(name.clone());
            }
            let reverse_side = self.metadata.property(name).is_ok_and(|d| {
                d.relationship_target()
                    .is_some_and(|r| r.kind == RelationshipKind::OneHasMany)
            });
            if reverse_side || matches!(slot, PropertySlot::Uninitialized { raw: None }) {
                continue;
            }
            data.insert(name.clone(), slot.raw());
        }
        EntitySnapshot {
            modified: self.modified.lock().clone(),
            validated,
            data,
            persisted_id: self.persisted_id.clone(),
        }
    }

    /// Rebuilds an entity from a snapshot.
    ///
    /// Validated containers are hydrated from the snapshot data whatever
    /// the persisted state. The result is detached; attach it with
    /// [`Entity::on_attach`].
    pub fn deserialize(metadata: Arc<EntityMetadata>, snapshot: EntitySnapshot) -> CoreResult<Entity> {
        let mut entity = Self::with_modified(metadata, ModifiedFields::default());
        entity.persisted_id = snapshot.persisted_id;
        for (name, raw) in snapshot.data {
            entity.metadata.property(&name)?;
            entity
                .slots
                .insert(name, PropertySlot::Uninitialized { raw: Some(raw) });
        }
        for name in &snapshot.validated {
            let descriptor = Arc::clone(entity.metadata.property(name)?);
            let raw = match entity.slots.remove(name) {
                Some(PropertySlot::Uninitialized { raw }) => raw,
                _ => None,
            };
            let restored = slot::restore(entity.metadata.name(), &descriptor, raw, || {
                ModifiedFields::callback(&entity.modified, name)
            })?;
            entity.slots.insert(name.clone(), restored);
        }
        *entity.modified.lock() = snapshot.modified;
        Ok(entity)
    }

    pub(crate) fn initialize_property(&mut self, descriptor: &PropertyDescriptor) -> CoreResult<()> {
        let name = descriptor.name();
        let raw = match self.slots.get(name) {
            Some(PropertySlot::Uninitialized { raw }) => raw.clone(),
            Some(_) => return Ok(()),
            None => None,
        };
        let init = slot::initialize(
            self.metadata.name(),
            descriptor,
            raw,
            self.persisted_id.is_some(),
            self.metadata.config().strict_types,
            || ModifiedFields::callback(&self.modified, name),
        )?;
        if init.assigned {
            self.modified.lock().unmark(name);
        }
        self.slots.insert(name.to_string(), init.slot);
        trace!(entity = %self.metadata.name(), property = name, "property initialized");
        Ok(())
    }

    fn internal_set_value(
        &mut self,
        descriptor: &PropertyDescriptor,
        value: PropertyValue,
    ) -> CoreResult<()> {
        self.initialize_property(descriptor)?;
        let name = descriptor.name();
        let ctx = ContainerContext {
            repository: self.repository.as_ref(),
            parent_id: self.persisted_id.as_ref(),
        };
        match self.slots.get_mut(name) {
            Some(PropertySlot::Container(container)) => container.set_injected_value(&ctx, value),
            Some(PropertySlot::Value(current)) => {
                let value = value.into_scalar(name)?;
                *current = slot::assign(
                    self.metadata.name(),
                    descriptor,
                    value,
                    current,
                    self.metadata.config().strict_types,
                )?;
                self.modified.lock().mark(name);
                Ok(())
            }
            _ => Err(not_initialized(&self.metadata, name)),
        }
    }

    fn wrong_shape(&self, name: &str, expected: &str) -> CoreError {
        CoreError::invalid_argument(format!(
            "Property {}::${name} is not {expected}.",
            self.metadata.name()
        ))
    }
}

fn not_initialized(metadata: &EntityMetadata, name: &str) -> CoreError {
    CoreError::logic(format!(
        "Property {}::${name} was not initialized.",
        metadata.name()
    ))
}

impl fmt::Debug for Entity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let slots: BTreeMap<_, _> = self.slots.iter().collect();
        let modified = self.modified.try_lock().map(|m| m.clone());
        f.debug_struct("Entity")
            .field("type", &self.metadata.name())
            .field("persisted_id", &self.persisted_id)
            .field("attached", &self.is_attached())
            .field("modified", &modified)
            .field("slots", &slots)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::metadata::{MetadataCatalog, SetOutcome, ValueType};
    use crate::provider::IdentityMap;

    fn catalog() -> Arc<MetadataCatalog> {
        MetadataCatalog::builder()
            .register(
                EntityMetadata::builder("Book")
                    .property(
                        PropertyDescriptor::new("id")
                            .value_type(ValueType::Integer)
                            .nullable(true),
                    )
                    .property(
                        PropertyDescriptor::new("title")
                            .value_type(ValueType::Text)
                            .setter(|v, _| match v.as_text() {
                                Some("") => SetOutcome::Reject("empty title".into()),
                                _ => SetOutcome::Accept(v),
                            }),
                    )
                    .property(
                        PropertyDescriptor::new("isbn")
                            .value_type(ValueType::Text)
                            .nullable(true)
                            .read_only(true),
                    )
                    .property(
                        PropertyDescriptor::new("pages")
                            .value_type(ValueType::Integer)
                            .default_value(100),
                    )
                    .property(
                        PropertyDescriptor::new("author")
                            .relationship(RelationshipKind::ManyHasOne, "Author", Some("books")),
                    ),
            )
            .register(
                EntityMetadata::builder("Author")
                    .property(
                        PropertyDescriptor::new("id")
                            .value_type(ValueType::Integer)
                            .nullable(true),
                    )
                    .property(PropertyDescriptor::new("name").value_type(ValueType::Text))
                    .property(PropertyDescriptor::new("books").relationship(
                        RelationshipKind::OneHasMany,
                        "Book",
                        Some("author"),
                    )),
            )
            .build()
            .unwrap()
    }

    fn book() -> Entity {
        Entity::new(catalog().get("Book").unwrap())
    }

    #[test]
    fn fresh_entity_is_modified_as_a_whole() {
        let entity = book();
        assert!(entity.is_modified(None).unwrap());
        assert!(entity.is_modified(Some("title")).unwrap());
        assert!(!entity.is_persisted());
        assert!(entity.is_modified(Some("isbn2")).unwrap_err().is_invalid_argument());
    }

    #[test]
    fn set_and_get() {
        let mut entity = book();
        entity.set_value("title", "Dune").unwrap();
        assert_eq!(entity.get("title").unwrap(), Value::from("Dune"));
        assert_eq!(entity.get("pages").unwrap(), Value::Integer(100));
    }

    #[test]
    fn unknown_and_read_only() {
        let mut entity = book();
        let err = entity.set_value("isbn2", "x").unwrap_err();
        assert!(err.is_invalid_argument());

        let err = entity.set_value("isbn", "123").unwrap_err();
        assert!(err.to_string().contains("read-only"));
        entity.set_read_only_value("isbn", "123").unwrap();
        assert_eq!(entity.get("isbn").unwrap(), Value::from("123"));
    }

    #[test]
    fn invalid_values_are_rejected() {
        let mut entity = book();
        assert!(entity.set_value("title", 3i64).unwrap_err().is_invalid_argument());
        assert!(entity.set_value("title", Value::Null).unwrap_err().is_invalid_argument());
        let err = entity.set_value("title", "").unwrap_err();
        assert!(err.to_string().contains("empty title"));
    }

    #[test]
    fn required_null_read_is_invalid_state() {
        let mut entity = book();
        assert!(entity.get("title").unwrap_err().is_invalid_state());
    }

    #[test]
    fn has_value() {
        let mut entity = book();
        assert!(!entity.has_value("nope").unwrap());
        assert!(!entity.has_value("title").unwrap());
        entity.set_value("title", "Dune").unwrap();
        assert!(entity.has_value("title").unwrap());
    }

    #[test]
    fn has_value_ignores_getter() {
        let catalog = MetadataCatalog::builder()
            .register(
                EntityMetadata::builder("Book")
                    .property(PropertyDescriptor::new("id").nullable(true))
                    .property(
                        PropertyDescriptor::new("subtitle")
                            .nullable(true)
                            .getter(|v| match v {
                                Value::Null => Value::from("(none)"),
                                other => other.clone(),
                            }),
                    ),
            )
            .build()
            .unwrap();
        let mut entity = Entity::new(catalog.get("Book").unwrap());
        assert_eq!(entity.get("subtitle").unwrap(), Value::from("(none)"));
        assert!(!entity.has_value("subtitle").unwrap());
    }

    #[test]
    fn loading_is_lazy_and_clean() {
        let catalog = catalog();
        let mut entity = Entity::from_storage(
            None,
            catalog.get("Book").unwrap(),
            [
                ("id", Value::Integer(1)),
                ("title", Value::from("Dune")),
                ("unknown", Value::from("ignored")),
            ],
        );
        assert_eq!(entity.persisted_id(), Some(&Value::Integer(1)));
        assert!(!entity.is_initialized("title"));
        assert_eq!(entity.get_raw_value("title").unwrap(), Value::from("Dune"));
        assert!(!entity.is_initialized("title"));

        assert_eq!(entity.get("title").unwrap(), Value::from("Dune"));
        assert!(entity.is_initialized("title"));
        assert!(!entity.is_modified(None).unwrap());

        entity.set_value("title", "Dune Messiah").unwrap();
        assert!(entity.is_modified(Some("title")).unwrap());
        assert!(!entity.is_modified(Some("pages")).unwrap());
    }

    #[test]
    fn failed_initialization_keeps_raw() {
        let catalog = catalog();
        let mut entity = Entity::from_storage(
            None,
            catalog.get("Book").unwrap(),
            [("id", Value::Integer(1)), ("title", Value::Integer(9))],
        );
        assert!(entity.get("title").is_err());
        assert!(!entity.is_initialized("title"));
        assert_eq!(entity.get_raw_value("title").unwrap(), Value::Integer(9));
    }

    #[test]
    fn persist_and_remove() {
        let mut entity = book();
        entity.set_value("title", "Dune").unwrap();
        entity.on_persist(5i64).unwrap();
        assert!(entity.is_persisted());
        assert_eq!(entity.id(), Some(Value::Integer(5)));
        assert!(!entity.is_modified(None).unwrap());

        entity.on_after_remove();
        assert!(!entity.is_persisted());
        assert!(!entity.is_modified(None).unwrap());
    }

    #[test]
    fn attach_keeps_modified_set() {
        let catalog = catalog();
        let mut entity = book();
        entity.on_attach(Arc::new(IdentityMap::new()), catalog.get("Book").unwrap());
        assert!(entity.is_attached());
        assert!(entity.modified_fields().is_all());
    }

    #[test]
    fn unattached_repository_lookup() {
        assert!(book().repository().err().unwrap().is_invalid_state());
    }

    #[test]
    fn has_one_resolution_through_repository() {
        let catalog = catalog();
        let map = Arc::new(IdentityMap::new());
        let author = Entity::from_storage(
            None,
            catalog.get("Author").unwrap(),
            [("id", Value::Integer(7)), ("name", Value::from("Frank"))],
        )
        .into_ref();
        map.insert(Arc::clone(&author)).unwrap();

        let repository: Arc<dyn EntityProvider> = map;
        let mut entity = Entity::from_storage(
            Some(repository),
            catalog.get("Book").unwrap(),
            [("id", Value::Integer(1)), ("author", Value::Integer(7))],
        );
        let resolved = entity.get_entity("author").unwrap().unwrap();
        assert!(Arc::ptr_eq(&resolved, &author));
        assert_eq!(entity.get_raw_value("author").unwrap(), Value::Integer(7));
    }

    #[test]
    fn container_changes_mark_modified() {
        let catalog = catalog();
        let mut entity = Entity::from_storage(
            None,
            catalog.get("Book").unwrap(),
            [("id", Value::Integer(1)), ("author", Value::Integer(7))],
        );
        assert!(!entity.is_modified(Some("author")).unwrap());
        entity.set_value("author", Value::Integer(8)).unwrap();
        assert!(entity.is_modified(Some("author")).unwrap());
        assert_eq!(entity.get_raw_value("author").unwrap(), Value::Integer(8));
    }

    #[test]
    fn debug_view_lists_slots() {
        let mut entity = book();
        entity.set_value("title", "Dune").unwrap();
        let debug = format!("{entity:?}");
        assert!(debug.contains("Book"));
        assert!(debug.contains("Dune"));
    }
}
