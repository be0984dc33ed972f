use std::collections::HashMap;
use std::sync::Arc;

use log::{debug, trace};

use super::assembler::{AttributeAssembler, BasicAssembler, HydratedValue, read_identifier, resolve_hydrated};
use super::context::LoadingEntityEntry;
use super::initializer::Initializer;
use super::state::{EntityRowData, InitializerPayload, InitializerState, RowProcessingState};
use crate::core::{EntityKey, Identifier, LoadError, NavigablePath, Result, Value};
use crate::metamodel::EntityDescriptor;
use crate::row::RowSource;
use crate::session::{AttributeValue, EntityEntry, EntityInstance, EntityRef, LoadEventKind, LockMode, ProcessingOptions};

/// Per-entity state machine: resolve key, resolve instance, initialize.
#[derive(Debug)]
pub struct EntityInitializer {
    path: NavigablePath,
    descriptor: Arc<EntityDescriptor>,
    identifier: Vec<BasicAssembler>,
    discriminator: Option<BasicAssembler>,
    row_id: Option<BasicAssembler>,
    /// The declared type and its subtypes, by name
    concrete_types: HashMap<String, Arc<EntityDescriptor>>,
    /// State-array assemblers per concrete type
    assemblers: HashMap<String, Vec<AttributeAssembler>>,
    lock_mode: LockMode,
}

impl EntityInitializer {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        path: NavigablePath,
        descriptor: Arc<EntityDescriptor>,
        identifier: Vec<BasicAssembler>,
        discriminator: Option<BasicAssembler>,
        row_id: Option<BasicAssembler>,
        concrete_types: HashMap<String, Arc<EntityDescriptor>>,
        assemblers: HashMap<String, Vec<AttributeAssembler>>,
        lock_mode: LockMode,
    ) -> Self {
        Self {
            path,
            descriptor,
            identifier,
            discriminator,
            row_id,
            concrete_types,
            assemblers,
            lock_mode,
        }
    }

    pub fn path(&self) -> &NavigablePath {
        &self.path
    }

    pub fn descriptor(&self) -> &Arc<EntityDescriptor> {
        &self.descriptor
    }

    pub fn identifier_positions(&self) -> Vec<usize> {
        self.identifier.iter().map(BasicAssembler::position).collect()
    }

    fn effective_lock_mode(&self, options: &ProcessingOptions) -> LockMode {
        self.lock_mode.max(options.lock_mode)
    }

    // ------------------------------------------------------------------
    // Phase 1: key
    // ------------------------------------------------------------------

    pub(crate) fn resolve_key(&self, idx: usize, state: &mut RowProcessingState<'_>) -> Result<()> {
        if state.state_of(idx) != InitializerState::Uninitialized {
            return Ok(());
        }
        let row = state.row;

        let id = read_identifier(&self.identifier, row)?;
        if id.is_null() {
            trace!("No entity at {} for this row", self.path);
            return state.data[idx].advance_to(InitializerState::Missing);
        }

        let row_id = match &self.row_id {
            Some(assembler) => {
                let value = assembler.assemble(row)?;
                if value.is_null() {
                    return state.data[idx].advance_to(InitializerState::Missing);
                }
                Some(value)
            }
            None => None,
        };

        let concrete = self.concrete_descriptor(row, &id)?;
        let key = EntityKey::new(id, self.descriptor.root_name());

        let session = &mut *state.session;
        if session.config().batch_fetch_enabled
            && concrete.is_batch_loadable()
            && !session.persistence_context().contains_entity(&key)
        {
            session
                .persistence_context_mut()
                .batch_fetch_queue_mut()
                .add_batch_loadable_entity_key(key.clone());
        }

        trace!("Hydrated EntityKey ({}): {}", self.path, key);
        let data = &mut state.data[idx];
        data.payload = InitializerPayload::Entity(EntityRowData {
            key,
            concrete,
            instance: None,
            row_id,
        });
        data.advance_to(InitializerState::KeyResolved)
    }

    fn concrete_descriptor(&self, row: &dyn RowSource, id: &Identifier) -> Result<Arc<EntityDescriptor>> {
        let Some(discriminator) = &self.discriminator else {
            return Ok(self.descriptor.clone());
        };
        let value = discriminator.assemble(row)?;
        let wrong_class = || LoadError::WrongClass {
            discriminator: value.to_literal(),
            entity: self.descriptor.name().to_string(),
            id: id.to_string(),
        };
        let name = self
            .descriptor
            .subclass_for_discriminator(&value)
            .ok_or_else(wrong_class)?;
        self.concrete_types.get(name).cloned().ok_or_else(wrong_class)
    }

    // ------------------------------------------------------------------
    // Phase 2: instance
    // ------------------------------------------------------------------

    pub(crate) fn resolve_instance(&self, idx: usize, state: &mut RowProcessingState<'_>) -> Result<()> {
        if state.state_of(idx) != InitializerState::KeyResolved {
            return Ok(());
        }
        let Some(EntityRowData {
            key,
            concrete,
            row_id,
            ..
        }) = state.data[idx].entity().cloned()
        else {
            return Err(LoadError::IllegalState(format!("No key resolved at {}", self.path)));
        };

        // already loading in this result set, finished by its owner
        if let Some(loading) = state.load_context.find_loading_entity(&key) {
            if loading.initializer != idx {
                let instance = loading.instance.clone();
                return self.resolved_to(idx, state, instance, InitializerState::Initialized);
            }
        }

        if let Some(existing) = state.session.persistence_context().find_entity(&key) {
            self.check_existing(&existing, &key, &concrete, state)?;
            state
                .session
                .persistence_context_mut()
                .batch_fetch_queue_mut()
                .remove_batch_loadable_entity_key(&key);
            trace!("Reusing managed instance for {}", key);
            return self.resolved_to(idx, state, existing, InitializerState::Initialized);
        }

        if let Some(proxy) = state.session.persistence_context().find_proxy(&key) {
            if !proxy.is_initialized()? {
                trace!("Populating proxy for {}", key);
                self.register_loading(idx, state, &key, &concrete, &proxy, row_id);
                return self.resolved_to(idx, state, proxy, InitializerState::Resolved);
            }
        }

        if state.session.cache_get_enabled(&concrete) {
            let read_only = state.is_read_only();
            let cached = state
                .session
                .load_from_cache_within(&self.descriptor, &key, read_only, Some(&*state.load_context))?;
            if let Some(cached) = cached {
                return self.resolved_to(idx, state, cached, InitializerState::Initialized);
            }
        }

        let instance = EntityRef::new(EntityInstance::new(concrete.clone(), key.identifier().clone()));
        debug!("Created new entity instance [{}]", key);
        self.register_loading(idx, state, &key, &concrete, &instance, row_id);
        self.resolved_to(idx, state, instance, InitializerState::Resolved)
    }

    fn resolved_to(&self, idx: usize, state: &mut RowProcessingState<'_>, instance: EntityRef, next: InitializerState) -> Result<()> {
        let data = &mut state.data[idx];
        if let Some(entity) = data.entity_mut() {
            entity.instance = Some(instance);
        }
        data.advance_to(next)
    }

    fn register_loading(
        &self,
        idx: usize,
        state: &mut RowProcessingState<'_>,
        key: &EntityKey,
        concrete: &Arc<EntityDescriptor>,
        instance: &EntityRef,
        row_id: Option<Value>,
    ) {
        state.load_context.register_loading_entity(LoadingEntityEntry {
            key: key.clone(),
            concrete: concrete.clone(),
            initializer: idx,
            instance: instance.clone(),
            row_id,
        });
    }

    /// Type and optimistic-lock checks against an instance already in the
    /// identity map.
    fn check_existing(&self, existing: &EntityRef, key: &EntityKey, concrete: &EntityDescriptor, state: &mut RowProcessingState<'_>) -> Result<()> {
        let existing_name = existing.entity_name()?;
        if !concrete.is_type_or_super_type_of(&existing_name) {
            return Err(LoadError::WrongClass {
                discriminator: existing_name,
                entity: concrete.name().to_string(),
                id: key.identifier().to_string(),
            });
        }

        let lock_mode = self.effective_lock_mode(state.options);
        if !lock_mode.at_least(LockMode::Read) {
            return Ok(());
        }
        let row_version = self.read_version(state.row, concrete)?;
        let Some(entry) = state.session.persistence_context_mut().entry_mut(key) else {
            return Ok(());
        };
        if let (Some(row_version), Some(known)) = (&row_version, &entry.version) {
            if row_version != known {
                return Err(LoadError::StaleState {
                    entity: concrete.name().to_string(),
                    id: key.identifier().to_string(),
                });
            }
        }
        if entry.lock_mode < lock_mode {
            entry.lock_mode = lock_mode;
        }
        Ok(())
    }

    fn read_version(&self, row: &dyn RowSource, concrete: &EntityDescriptor) -> Result<Option<Value>> {
        let Some(version_index) = concrete.version_index() else {
            return Ok(None);
        };
        match self
            .assemblers
            .get(concrete.name())
            .and_then(|assemblers| assemblers.get(version_index))
        {
            Some(AttributeAssembler::Basic(basic)) => {
                let value = basic.assemble(row)?;
                Ok((!value.is_null()).then_some(value))
            }
            _ => Ok(None),
        }
    }

    // ------------------------------------------------------------------
    // Phase 3: initialize
    // ------------------------------------------------------------------

    pub(crate) fn initialize_instance(&self, idx: usize, initializers: &[Initializer], state: &mut RowProcessingState<'_>) -> Result<()> {
        if state.state_of(idx) != InitializerState::Resolved || state.data[idx].initializing {
            return Ok(());
        }
        let Some(data) = state.data[idx].entity().cloned() else {
            return Err(LoadError::IllegalState(format!("No instance resolved at {}", self.path)));
        };

        state.data[idx].initializing = true;
        let result = self.materialize(&data, initializers, state);
        state.data[idx].initializing = false;
        result?;

        state.data[idx].advance_to(InitializerState::Initialized)
    }

    fn materialize(&self, data: &EntityRowData, initializers: &[Initializer], state: &mut RowProcessingState<'_>) -> Result<()> {
        let EntityRowData {
            key,
            concrete,
            instance,
            row_id,
        } = data;
        let instance = instance
            .clone()
            .ok_or_else(|| LoadError::IllegalState(format!("No instance resolved for {}", key)))?;
        let id = key.identifier();

        let state_array = self.hydrate_state(key, concrete, initializers, state)?;
        let version = concrete
            .version_index()
            .and_then(|idx| state_array.get(idx))
            .and_then(AttributeValue::as_value)
            .filter(|v| !v.is_null())
            .cloned();

        state
            .session
            .fire_event(LoadEventKind::PreLoad, concrete, id, &instance, false)?;
        instance
            .write()?
            .inject(concrete.clone(), id.clone(), state_array.clone());

        let mut entry = EntityEntry::loading(concrete.name(), id.clone());
        entry.version = version.clone();
        entry.row_id = row_id.clone();
        entry.lock_mode = self.effective_lock_mode(state.options);

        let read_only = state.is_read_only();
        let session = &mut *state.session;
        session
            .persistence_context_mut()
            .register_entity(key.clone(), instance.clone(), entry);
        session
            .persistence_context_mut()
            .batch_fetch_queue_mut()
            .remove_batch_loadable_entity_key(key);

        if session.cache_entity(key, concrete, &state_array, version)? {
            debug!("Adding entity to second-level cache: {}", key);
        }
        session.cache_natural_id(concrete, id, &state_array, true);
        session.finish_entity_entry(key, concrete, state_array, read_only);
        state.load_context.remove_loading_entity(key);

        debug!("Done materializing entity {}", key);
        state
            .session
            .fire_event(LoadEventKind::PostLoad, concrete, id, &instance, false)
    }

    /// Hydrates then resolves the state array of the concrete type.
    fn hydrate_state(
        &self,
        key: &EntityKey,
        concrete: &EntityDescriptor,
        initializers: &[Initializer],
        state: &mut RowProcessingState<'_>,
    ) -> Result<Vec<AttributeValue>> {
        let assemblers = self.assemblers.get(concrete.name()).ok_or_else(|| {
            LoadError::IllegalState(format!("No assemblers for {} at {}", concrete.name(), self.path))
        })?;
        let row = state.row;

        let mut hydrated = Vec::with_capacity(assemblers.len());
        for (attribute, assembler) in concrete.attributes().iter().zip(assemblers) {
            let value = assembler.hydrate(row)?;
            if matches!(&value, HydratedValue::Basic(v) if v.is_null()) && !attribute.is_nullable() {
                return Err(LoadError::MalformedColumn {
                    entity: concrete.name().to_string(),
                    attribute: attribute.name().to_string(),
                    key: key.to_string(),
                });
            }
            hydrated.push(value);
        }

        hydrated
            .into_iter()
            .map(|value| resolve_hydrated(value, Some(key.identifier()), initializers, state))
            .collect()
    }
}
