use std::sync::Arc;

use log::{debug, trace, warn};

use super::assembler::{AttributeAssembler, BasicAssembler, read_identifier, resolve_hydrated};
use super::context::LoadingCollectionEntry;
use super::initializer::{Initializer, ensure_key_resolved};
use super::state::{CollectionRowData, InitializerPayload, InitializerState, RowProcessingState};
use crate::cache::{CacheBridge, CollectionCacheEntry};
use crate::core::{CollectionKey, EntityKey, Identifier, LoadError, NavigablePath, Result};
use crate::metamodel::CollectionDescriptor;
use crate::session::{AttributeValue, CollectionElement, CollectionRef, Session};

/// Where a collection initializer takes its owner's identifier from.
#[derive(Debug, Clone)]
pub enum CollectionOwner {
    /// The entity initializer the collection is joined from
    Parent(usize),
    /// Key columns of a collection selected on its own
    KeyColumns(Vec<BasicAssembler>),
}

/// Stages one element per row into the loading entry of the current
/// collection key. Elements become visible only at commit.
#[derive(Debug)]
pub struct CollectionInitializer {
    path: NavigablePath,
    descriptor: Arc<CollectionDescriptor>,
    owner: CollectionOwner,
    index: Option<BasicAssembler>,
    element: AttributeAssembler,
}

impl CollectionInitializer {
    pub fn new(
        path: NavigablePath,
        descriptor: Arc<CollectionDescriptor>,
        owner: CollectionOwner,
        index: Option<BasicAssembler>,
        element: AttributeAssembler,
    ) -> Self {
        Self {
            path,
            descriptor,
            owner,
            index,
            element,
        }
    }

    pub fn path(&self) -> &NavigablePath {
        &self.path
    }

    pub fn descriptor(&self) -> &Arc<CollectionDescriptor> {
        &self.descriptor
    }

    pub fn owner(&self) -> &CollectionOwner {
        &self.owner
    }

    fn owner_identifier(&self, initializers: &[Initializer], state: &mut RowProcessingState<'_>) -> Result<Option<Identifier>> {
        match &self.owner {
            CollectionOwner::Parent(parent) => {
                ensure_key_resolved(initializers, *parent, state)?;
                Ok(state.data[*parent]
                    .entity()
                    .map(|data| data.key.identifier().clone()))
            }
            CollectionOwner::KeyColumns(columns) => {
                let id = read_identifier(columns, state.row)?;
                Ok((!id.is_null()).then_some(id))
            }
        }
    }

    pub(crate) fn resolve_key(&self, idx: usize, initializers: &[Initializer], state: &mut RowProcessingState<'_>) -> Result<()> {
        if state.state_of(idx) != InitializerState::Uninitialized {
            return Ok(());
        }
        let Some(owner) = self.owner_identifier(initializers, state)? else {
            return state.data[idx].advance_to(InitializerState::Missing);
        };
        let key = CollectionKey::new(self.descriptor.role(), owner);

        // rows are grouped by owner: a new key means the previous one is done
        if let Some(previous) = state.load_context.swap_last_collection_key(idx, &key) {
            if state.options.commit_collections_on_key_change {
                if let Some(entry) = state.load_context.take_loading_collection(&previous) {
                    trace!("Owner changed at {}, committing {}", self.path, previous);
                    commit_loading_collection(entry, &mut *state.session)?;
                }
            }
        }

        let data = &mut state.data[idx];
        data.payload = InitializerPayload::Collection(CollectionRowData {
            key,
            instance: None,
            owns_loading_entry: false,
        });
        data.advance_to(InitializerState::KeyResolved)
    }

    pub(crate) fn resolve_instance(&self, idx: usize, state: &mut RowProcessingState<'_>) -> Result<()> {
        if state.state_of(idx) != InitializerState::KeyResolved {
            return Ok(());
        }
        let Some(key) = state.data[idx].collection().map(|data| data.key.clone()) else {
            return Err(LoadError::IllegalState(format!("No collection key at {}", self.path)));
        };

        if let Some(loading) = state.load_context.find_loading_collection(&key) {
            let owns = loading.initializer == idx;
            let instance = loading.instance.clone();
            let next = if owns {
                InitializerState::Resolved
            } else {
                InitializerState::Initialized
            };
            return self.resolved_to(idx, state, instance, owns, next);
        }

        let instance = state
            .session
            .collection_reference(&self.descriptor, key.owner_identifier())?;
        if instance.is_initialized()? {
            trace!("Collection {} already initialized, ignoring rows", key);
            return self.resolved_to(idx, state, instance, false, InitializerState::Initialized);
        }

        instance.write()?.begin_read();
        state.load_context.register_loading_collection(LoadingCollectionEntry::new(
            key.clone(),
            self.descriptor.clone(),
            idx,
            instance.clone(),
        ));
        trace!("Reading collection {} at {}", key, self.path);
        self.resolved_to(idx, state, instance, true, InitializerState::Resolved)
    }

    fn resolved_to(
        &self,
        idx: usize,
        state: &mut RowProcessingState<'_>,
        instance: CollectionRef,
        owns: bool,
        next: InitializerState,
    ) -> Result<()> {
        let data = &mut state.data[idx];
        if let InitializerPayload::Collection(collection) = &mut data.payload {
            collection.instance = Some(instance);
            collection.owns_loading_entry = owns;
        }
        data.advance_to(next)
    }

    pub(crate) fn initialize_instance(&self, idx: usize, initializers: &[Initializer], state: &mut RowProcessingState<'_>) -> Result<()> {
        if state.state_of(idx) != InitializerState::Resolved || state.data[idx].initializing {
            return Ok(());
        }
        let Some(key) = state.data[idx]
            .collection()
            .filter(|data| data.owns_loading_entry)
            .map(|data| data.key.clone())
        else {
            return state.data[idx].advance_to(InitializerState::Initialized);
        };

        state.data[idx].initializing = true;
        let element = self.read_element(&key, initializers, state);
        state.data[idx].initializing = false;

        if let Some(element) = element? {
            if let Some(entry) = state.load_context.loading_collection_mut(&key) {
                entry.staged.push(element);
            }
        }
        state.data[idx].advance_to(InitializerState::Initialized)
    }

    /// The element on the current row, if the row carries one.
    fn read_element(&self, key: &CollectionKey, initializers: &[Initializer], state: &mut RowProcessingState<'_>) -> Result<Option<CollectionElement>> {
        let index = match &self.index {
            Some(assembler) => {
                let index = assembler.assemble(state.row)?;
                if index.is_null() {
                    return Ok(None);
                }
                Some(index)
            }
            None => None,
        };

        let hydrated = self.element.hydrate(state.row)?;
        let value = resolve_hydrated(hydrated, Some(key.owner_identifier()), initializers, state)?;
        if value.is_null() {
            return Ok(None);
        }
        Ok(Some(CollectionElement::new(index, value)))
    }
}

/// Publishes a finished collection: injects the staged elements, marks it
/// initialized and offers it to the second-level cache.
pub(crate) fn commit_loading_collection(entry: LoadingCollectionEntry, session: &mut Session) -> Result<()> {
    let LoadingCollectionEntry {
        key,
        descriptor,
        instance,
        staged,
        ..
    } = entry;

    let no_queued_adds = {
        let mut collection = instance.write()?;
        collection.inject(staged);
        collection.end_read()
    };
    session.persistence_context_mut().mark_collection_initialized(&key);
    session
        .persistence_context_mut()
        .batch_fetch_queue_mut()
        .remove_batch_loadable_collection(&key);
    debug!("Collection fully initialized: {}", key);

    if descriptor.kind().has_holder() {
        sync_array_holder(&key, &descriptor, &instance, session)?;
    }
    add_collection_to_cache(&key, &descriptor, &instance, no_queued_adds, session)
}

/// Arrays have no live wrapper on the owner: copy the values into the
/// owner's state and its snapshot.
fn sync_array_holder(key: &CollectionKey, descriptor: &CollectionDescriptor, instance: &CollectionRef, session: &mut Session) -> Result<()> {
    let owner_descriptor = session.metamodel().entity(descriptor.owner_entity_name())?.clone();
    let owner_key = EntityKey::new(key.owner_identifier().clone(), owner_descriptor.root_name());
    let Some(owner) = session.persistence_context().find_entity(&owner_key) else {
        return Ok(());
    };

    let values = AttributeValue::Array(instance.values()?);
    let index = {
        let mut owner = owner.write()?;
        let Some(index) = owner.descriptor().collection_attribute_index(key.role()) else {
            return Ok(());
        };
        owner.set_at(index, values.clone());
        index
    };
    if let Some(entry) = session.persistence_context_mut().entry_mut(&owner_key) {
        if let Some(loaded_state) = entry.loaded_state.as_mut() {
            if let Some(slot) = loaded_state.get_mut(index) {
                *slot = values;
            }
        }
    }
    Ok(())
}

fn add_collection_to_cache(
    key: &CollectionKey,
    descriptor: &CollectionDescriptor,
    instance: &CollectionRef,
    no_queued_adds: bool,
    session: &Session,
) -> Result<()> {
    let Some(bridge) = session.cache().filter(|_| session.cache_put_enabled(descriptor.is_cacheable())) else {
        return Ok(());
    };
    if session.influencers().is_affected_by_enabled_filters(key.role()) {
        debug!("Refusing to add to cache due to enabled filters: {}", key);
        return Ok(());
    }
    if !no_queued_adds {
        debug!("Collection {} had queued additions, not caching", key);
        return Ok(());
    }

    let owner_descriptor = session.metamodel().entity(descriptor.owner_entity_name())?;
    let owner_key = EntityKey::new(key.owner_identifier().clone(), owner_descriptor.root_name());
    let Some(owner_entry) = session.persistence_context().entry(&owner_key) else {
        warn!(
            "Unable to resolve owner of loading collection [{}] for second-level caching. Refusing to add to cache",
            key
        );
        return Ok(());
    };
    let version = owner_entry.version.clone();
    if descriptor.is_optimistic_locked() && owner_descriptor.is_versioned() && version.is_none() {
        debug!("Owner version of {} unknown, not caching", key);
        return Ok(());
    }

    let entry = {
        let collection = instance.read()?;
        CollectionCacheEntry::disassemble(collection.elements())?
    };
    let cache_key = CacheBridge::collection_cache_key(key, session.tenant());
    if bridge.put_collection_from_load(cache_key, &entry, version, session.config().effective_minimal_puts()) {
        debug!("Cached collection: {}", key);
    }
    Ok(())
}
