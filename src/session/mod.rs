// ============================================================================
// Session
// ============================================================================
//
// Owns the identity map, the batch-fetch queue, the cache bridge and the
// load listeners. Row processing borrows it mutably for one result set.
//
// ============================================================================

pub mod batch;
pub mod config;
pub mod context;
pub mod events;
pub mod instance;

use std::sync::Arc;

use log::{debug, trace};
use uuid::Uuid;

pub use batch::BatchFetchQueue;
pub use config::{CacheMode, LockMode, ProcessingOptions, SessionConfig};
pub use context::{CollectionEntry, EntityEntry, EntityStatus, PersistenceContext};
pub use events::{FilterPredicate, LoadEvent, LoadEventKind, LoadEventListener, LoadQueryInfluencers, RoleFilter};
pub use instance::{
    AttributeValue, CollectionElement, CollectionRef, EmbeddedValue, EntityInstance, EntityRef,
    PersistentCollection, QueuedOperation,
};

use crate::cache::{CacheBridge, CacheEntryStructure, CacheKey, CacheRegion, CachedValue, EntityCacheEntry};
use crate::core::{CollectionKey, EntityKey, Identifier, LoadError, Result, Value};
use crate::load::LoadContext;
use crate::metamodel::{AttributeKind, AttributeMapping, CollectionDescriptor, ElementKind, EntityDescriptor, Metamodel};

pub struct Session {
    id: Uuid,
    metamodel: Arc<Metamodel>,
    config: SessionConfig,
    persistence_context: PersistenceContext,
    cache: Option<CacheBridge>,
    influencers: LoadQueryInfluencers,
    listeners: Vec<Arc<dyn LoadEventListener>>,
}

pub struct SessionBuilder {
    metamodel: Arc<Metamodel>,
    config: SessionConfig,
    region: Option<Arc<dyn CacheRegion>>,
    influencers: LoadQueryInfluencers,
    listeners: Vec<Arc<dyn LoadEventListener>>,
}

impl SessionBuilder {
    pub fn config(mut self, config: SessionConfig) -> Self {
        self.config = config;
        self
    }

    pub fn cache_region(mut self, region: Arc<dyn CacheRegion>) -> Self {
        self.region = Some(region);
        self
    }

    pub fn listener(mut self, listener: Arc<dyn LoadEventListener>) -> Self {
        self.listeners.push(listener);
        self
    }

    pub fn filter(mut self, filter: Arc<dyn FilterPredicate>) -> Self {
        self.influencers.enable_filter(filter);
        self
    }

    pub fn build(self) -> Result<Session> {
        self.config.validate()?;
        let structure = if self.config.structured_entries {
            CacheEntryStructure::Structured
        } else {
            CacheEntryStructure::Unstructured
        };
        let cache = self
            .region
            .map(|region| CacheBridge::new(region, self.metamodel.clone()).with_structure(structure));

        let session = Session {
            id: Uuid::new_v4(),
            metamodel: self.metamodel,
            config: self.config,
            persistence_context: PersistenceContext::new(),
            cache,
            influencers: self.influencers,
            listeners: self.listeners,
        };
        debug!("Opened session {}", session.id);
        Ok(session)
    }
}

impl Session {
    pub fn builder(metamodel: Arc<Metamodel>) -> SessionBuilder {
        SessionBuilder {
            metamodel,
            config: SessionConfig::default(),
            region: None,
            influencers: LoadQueryInfluencers::new(),
            listeners: Vec::new(),
        }
    }

    /// Session with default config and no second-level cache.
    pub fn new(metamodel: Arc<Metamodel>) -> Self {
        Self {
            id: Uuid::new_v4(),
            metamodel,
            config: SessionConfig::default(),
            persistence_context: PersistenceContext::new(),
            cache: None,
            influencers: LoadQueryInfluencers::new(),
            listeners: Vec::new(),
        }
    }

    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn metamodel(&self) -> &Arc<Metamodel> {
        &self.metamodel
    }

    pub fn config(&self) -> &SessionConfig {
        &self.config
    }

    pub fn set_cache_mode(&mut self, mode: CacheMode) {
        self.config.cache_mode = mode;
    }

    pub fn persistence_context(&self) -> &PersistenceContext {
        &self.persistence_context
    }

    pub fn persistence_context_mut(&mut self) -> &mut PersistenceContext {
        &mut self.persistence_context
    }

    pub fn cache(&self) -> Option<&CacheBridge> {
        self.cache.as_ref()
    }

    pub fn tenant(&self) -> Option<&str> {
        self.config.tenant.as_deref()
    }

    pub fn influencers(&self) -> &LoadQueryInfluencers {
        &self.influencers
    }

    pub fn influencers_mut(&mut self) -> &mut LoadQueryInfluencers {
        &mut self.influencers
    }

    pub fn add_listener(&mut self, listener: Arc<dyn LoadEventListener>) {
        self.listeners.push(listener);
    }

    /// Whether entity state can be read from the second-level cache.
    pub(crate) fn cache_get_enabled(&self, descriptor: &EntityDescriptor) -> bool {
        self.cache.is_some() && descriptor.is_cacheable() && self.config.cache_mode.is_get_enabled()
    }

    pub(crate) fn cache_put_enabled(&self, cacheable: bool) -> bool {
        self.cache.is_some() && cacheable && self.config.cache_mode.is_put_enabled()
    }

    // ------------------------------------------------------------------
    // Lookups
    // ------------------------------------------------------------------

    /// Identity map, then second-level cache. Never touches a row source.
    pub fn get(&mut self, entity_name: &str, id: impl Into<Identifier>) -> Result<Option<EntityRef>> {
        let descriptor = self.metamodel.entity(entity_name)?.clone();
        let key = EntityKey::new(id.into(), descriptor.root_name());

        if let Some(existing) = self.persistence_context.find_entity(&key) {
            let existing_name = existing.entity_name()?;
            if !descriptor.is_type_or_super_type_of(&existing_name) {
                return Ok(None);
            }
            return Ok(Some(existing));
        }
        let read_only = self.config.default_read_only;
        self.load_from_cache(&descriptor, &key, read_only)
    }

    /// Identifier for a natural id: session resolutions first, then the
    /// cache.
    pub fn resolve_natural_id(&self, entity_name: &str, natural_id: &[Value]) -> Result<Option<Identifier>> {
        let descriptor = self.metamodel.entity(entity_name)?;
        if let Some(id) = self
            .persistence_context
            .find_natural_id_resolution(descriptor.root_name(), natural_id)
        {
            return Ok(Some(id.clone()));
        }
        if !self.cache_get_enabled(descriptor) {
            return Ok(None);
        }
        Ok(self
            .cache
            .as_ref()
            .and_then(|bridge| bridge.get_natural_id(descriptor.root_name(), natural_id, self.tenant())))
    }

    /// Reference for a to-one that is not fetched in the current row: the
    /// managed instance when present, otherwise a (possibly new) proxy.
    pub fn internal_load_lazy(&mut self, target: &Arc<EntityDescriptor>, id: Identifier) -> Result<EntityRef> {
        let key = EntityKey::new(id.clone(), target.root_name());
        if let Some(existing) = self.persistence_context.find_entity(&key) {
            return Ok(existing);
        }
        if let Some(proxy) = self.persistence_context.find_proxy(&key) {
            return Ok(proxy);
        }

        trace!("Creating proxy for {}", key);
        let proxy = EntityRef::new(EntityInstance::new(target.clone(), id));
        if self.config.batch_fetch_enabled && target.is_batch_loadable() {
            self.persistence_context
                .batch_fetch_queue_mut()
                .add_batch_loadable_entity_key(key.clone());
        }
        self.persistence_context.add_proxy(key, proxy.clone());
        Ok(proxy)
    }

    /// The registered collection for `(role, owner)`, or a new uninitialized
    /// one registered on the spot.
    pub fn collection_reference(&mut self, descriptor: &Arc<CollectionDescriptor>, owner: &Identifier) -> Result<CollectionRef> {
        let key = CollectionKey::new(descriptor.role(), owner.clone());
        if let Some(existing) = self.persistence_context.find_collection(&key) {
            return Ok(existing);
        }

        let collection = CollectionRef::new(PersistentCollection::new(descriptor.clone(), owner.clone()));
        if self.config.batch_fetch_enabled && descriptor.is_batch_loadable() {
            self.persistence_context
                .batch_fetch_queue_mut()
                .add_batch_loadable_collection(key.clone());
        }
        self.persistence_context
            .register_collection(key, collection.clone(), false);
        Ok(collection)
    }

    // ------------------------------------------------------------------
    // Second-level cache reads
    // ------------------------------------------------------------------

    /// Builds and registers an instance from a cached entry. `declared` is
    /// the type requested at the call site; a cached subclass outside its
    /// hierarchy is a `WrongClass`.
    pub fn load_from_cache(&mut self, declared: &Arc<EntityDescriptor>, key: &EntityKey, read_only: bool) -> Result<Option<EntityRef>> {
        self.load_from_cache_within(declared, key, read_only, None)
    }

    /// Cache read inside a result set: references to entities still loading
    /// in `loading` resolve to those instances.
    pub(crate) fn load_from_cache_within(
        &mut self,
        declared: &Arc<EntityDescriptor>,
        key: &EntityKey,
        read_only: bool,
        loading: Option<&LoadContext>,
    ) -> Result<Option<EntityRef>> {
        if !self.cache_get_enabled(declared) {
            return Ok(None);
        }
        let cache_key = CacheBridge::entity_cache_key(key, self.tenant());
        let entry = match self.cache.as_ref().and_then(|bridge| bridge.get_entity(&cache_key)) {
            Some(entry) => entry,
            None => {
                trace!("Second-level cache miss: {}", cache_key);
                return Ok(None);
            }
        };

        let concrete = self.metamodel.entity(&entry.subclass)?.clone();
        if !declared.is_type_or_super_type_of(concrete.name()) {
            return Err(LoadError::WrongClass {
                discriminator: entry.subclass.clone(),
                entity: declared.name().to_string(),
                id: key.identifier().to_string(),
            });
        }

        let instance = match self.persistence_context.find_proxy(key) {
            Some(proxy) => proxy,
            None => EntityRef::new(EntityInstance::new(concrete.clone(), key.identifier().clone())),
        };
        let state = self.assemble_cached_state(&concrete, key.identifier(), entry.state, loading)?;

        self.fire_event(LoadEventKind::PreLoad, &concrete, key.identifier(), &instance, true)?;
        instance
            .write()?
            .inject(concrete.clone(), key.identifier().clone(), state.clone());

        let mut entry_record = EntityEntry::loading(concrete.name(), key.identifier().clone());
        entry_record.version = entry.version;
        self.persistence_context
            .register_entity(key.clone(), instance.clone(), entry_record);
        self.persistence_context
            .batch_fetch_queue_mut()
            .remove_batch_loadable_entity_key(key);
        self.cache_natural_id(&concrete, key.identifier(), &state, false);
        self.finish_entity_entry(key, &concrete, state, read_only);

        debug!("Resolved {} from second-level cache", key);
        self.fire_event(LoadEventKind::PostLoad, &concrete, key.identifier(), &instance, true)?;
        Ok(Some(instance))
    }

    /// Initializes an uninitialized collection from its cached entry.
    /// Returns `false` on a miss, leaving the collection untouched.
    pub fn initialize_collection_from_cache(&mut self, collection: &CollectionRef) -> Result<bool> {
        let (descriptor, owner) = {
            let guard = collection.read()?;
            if guard.is_initialized() {
                return Ok(true);
            }
            (guard.descriptor().clone(), guard.owner_identifier().clone())
        };
        if self.cache.is_none() || !descriptor.is_cacheable() || !self.config.cache_mode.is_get_enabled() {
            return Ok(false);
        }

        let key = CollectionKey::new(descriptor.role(), owner.clone());
        let cache_key = CacheBridge::collection_cache_key(&key, self.tenant());
        let entry = match self.cache.as_ref().and_then(|bridge| bridge.get_collection(&cache_key)) {
            Some(entry) => entry,
            None => return Ok(false),
        };

        let mut elements = Vec::with_capacity(entry.elements.len());
        for (index, cached) in entry.elements {
            let value = self.assemble_element(&descriptor, &owner, cached)?;
            elements.push(CollectionElement::new(index, value));
        }
        collection.write()?.initialize_from(elements);
        self.persistence_context.mark_collection_initialized(&key);
        self.persistence_context
            .batch_fetch_queue_mut()
            .remove_batch_loadable_collection(&key);
        debug!("Initialized collection {} from second-level cache", key);
        Ok(true)
    }

    fn assemble_cached_state(
        &mut self,
        descriptor: &EntityDescriptor,
        id: &Identifier,
        cached: Vec<CachedValue>,
        loading: Option<&LoadContext>,
    ) -> Result<Vec<AttributeValue>> {
        if cached.len() != descriptor.attributes().len() {
            return Err(LoadError::Serialization(format!(
                "Cached state of {} has {} values, expected {}",
                descriptor.name(),
                cached.len(),
                descriptor.attributes().len()
            )));
        }
        descriptor
            .attributes()
            .iter()
            .zip(cached)
            .map(|(attribute, value)| self.assemble_attribute(attribute, id, value, loading))
            .collect()
    }

    fn assemble_attribute(
        &mut self,
        attribute: &AttributeMapping,
        owner: &Identifier,
        cached: CachedValue,
        loading: Option<&LoadContext>,
    ) -> Result<AttributeValue> {
        match (attribute.kind(), cached) {
            (AttributeKind::Basic(_), CachedValue::Basic(value)) => Ok(AttributeValue::Basic(value)),
            (AttributeKind::Embedded(_), CachedValue::Embedded(None)) => Ok(AttributeValue::Embedded(None)),
            (AttributeKind::Embedded(embeddable), CachedValue::Embedded(Some(values))) => {
                let embeddable = embeddable.clone();
                let assembled = embeddable
                    .attributes()
                    .iter()
                    .zip(values)
                    .map(|(nested, value)| self.assemble_attribute(nested, owner, value, loading))
                    .collect::<Result<Vec<_>>>()?;
                Ok(AttributeValue::Embedded(Some(EmbeddedValue::new(embeddable, assembled))))
            }
            (AttributeKind::ToOne { .. }, CachedValue::EntityId(None)) => Ok(AttributeValue::Entity(None)),
            (AttributeKind::ToOne { target }, CachedValue::EntityId(Some(id))) => {
                let target = self.metamodel.entity(target)?.clone();
                Ok(AttributeValue::Entity(Some(self.cached_reference(&target, id, loading)?)))
            }
            (AttributeKind::Collection { role }, CachedValue::CollectionPlaceholder) => {
                let descriptor = self.metamodel.collection(role)?.clone();
                Ok(AttributeValue::Collection(self.collection_reference(&descriptor, owner)?))
            }
            (_, other) => Err(LoadError::Serialization(format!(
                "Cached value {:?} does not fit attribute '{}'",
                other,
                attribute.name()
            ))),
        }
    }

    /// To-one target of a cached entry: an instance still loading in the
    /// current result set, else the identity map or a proxy.
    fn cached_reference(&mut self, target: &Arc<EntityDescriptor>, id: Identifier, loading: Option<&LoadContext>) -> Result<EntityRef> {
        let key = EntityKey::new(id.clone(), target.root_name());
        if let Some(entry) = loading.and_then(|context| context.find_loading_entity(&key)) {
            return Ok(entry.instance.clone());
        }
        self.internal_load_lazy(target, id)
    }

    fn assemble_element(&mut self, descriptor: &CollectionDescriptor, owner: &Identifier, cached: CachedValue) -> Result<AttributeValue> {
        match (descriptor.element(), cached) {
            (ElementKind::Basic(_), CachedValue::Basic(value)) => Ok(AttributeValue::Basic(value)),
            (ElementKind::Embedded(embeddable), CachedValue::Embedded(values)) => {
                let embeddable = embeddable.clone();
                let Some(values) = values else {
                    return Ok(AttributeValue::Embedded(None));
                };
                let assembled = embeddable
                    .attributes()
                    .iter()
                    .zip(values)
                    .map(|(nested, value)| self.assemble_attribute(nested, owner, value, None))
                    .collect::<Result<Vec<_>>>()?;
                Ok(AttributeValue::Embedded(Some(EmbeddedValue::new(embeddable, assembled))))
            }
            (ElementKind::Entity(target), CachedValue::EntityId(Some(id))) => {
                let target = self.metamodel.entity(target)?.clone();
                Ok(AttributeValue::Entity(Some(self.internal_load_lazy(&target, id)?)))
            }
            (ElementKind::Entity(_), CachedValue::EntityId(None)) => Ok(AttributeValue::Entity(None)),
            (_, other) => Err(LoadError::Serialization(format!(
                "Cached element {:?} does not fit collection '{}'",
                other,
                descriptor.role()
            ))),
        }
    }

    // ------------------------------------------------------------------
    // Registration helpers shared with row processing
    // ------------------------------------------------------------------

    /// Moves a LOADING entry to READ_ONLY or MANAGED.
    pub(crate) fn finish_entity_entry(&mut self, key: &EntityKey, concrete: &EntityDescriptor, state: Vec<AttributeValue>, read_only: bool) {
        let read_only = read_only || !concrete.is_mutable();
        if let Some(entry) = self.persistence_context.entry_mut(key) {
            if read_only {
                entry.status = EntityStatus::ReadOnly;
                entry.loaded_state = None;
            } else {
                entry.status = EntityStatus::Managed;
                entry.loaded_state = Some(state);
            }
        }
    }

    /// Records the natural-id cross reference, and writes it through to the
    /// cache when `write_through` is set.
    pub(crate) fn cache_natural_id(&mut self, concrete: &EntityDescriptor, id: &Identifier, state: &[AttributeValue], write_through: bool) {
        if !concrete.has_natural_id() {
            return;
        }
        let natural_id: Vec<Value> = concrete
            .natural_id_indexes()
            .iter()
            .map(|idx| {
                state
                    .get(*idx)
                    .and_then(AttributeValue::as_value)
                    .cloned()
                    .unwrap_or(Value::Null)
            })
            .collect();
        if natural_id.iter().any(Value::is_null) {
            return;
        }

        if write_through && self.cache_put_enabled(concrete.is_cacheable()) {
            if let Some(bridge) = &self.cache {
                bridge.put_natural_id(concrete.root_name(), &natural_id, id, self.config.tenant.as_deref());
            }
        }
        self.persistence_context
            .cache_natural_id_resolution(concrete.root_name(), natural_id, id.clone());
    }

    /// Writes freshly loaded state through to the cache. Returns whether the
    /// region accepted it.
    pub(crate) fn cache_entity(&self, key: &EntityKey, concrete: &EntityDescriptor, state: &[AttributeValue], version: Option<Value>) -> Result<bool> {
        let Some(bridge) = self.cache.as_ref().filter(|_| self.cache_put_enabled(concrete.is_cacheable())) else {
            return Ok(false);
        };
        let entry = EntityCacheEntry::disassemble(concrete, state, version.clone())?;
        let cache_key: CacheKey = CacheBridge::entity_cache_key(key, self.tenant());

        let stored = if self.persistence_context.was_inserted_during_transaction(key) {
            bridge.update(cache_key, &entry, version)
        } else {
            bridge.put_from_load(cache_key, &entry, version, self.config.effective_minimal_puts())
        };
        Ok(stored)
    }

    pub(crate) fn fire_event(&self, kind: LoadEventKind, concrete: &EntityDescriptor, id: &Identifier, instance: &EntityRef, from_cache: bool) -> Result<()> {
        if self.listeners.is_empty() {
            return Ok(());
        }
        let event = LoadEvent {
            kind,
            entity_name: concrete.name().to_string(),
            id: id.clone(),
            instance: instance.clone(),
            from_cache,
        };
        for listener in &self.listeners {
            match kind {
                LoadEventKind::PreLoad => listener.on_pre_load(&event)?,
                LoadEventKind::PostLoad => listener.on_post_load(&event)?,
            }
        }
        Ok(())
    }
}

impl std::fmt::Debug for Session {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Session")
            .field("id", &self.id)
            .field("entities", &self.persistence_context.entity_count())
            .field("collections", &self.persistence_context.collection_count())
            .field("cache", &self.cache)
            .finish()
    }
}
