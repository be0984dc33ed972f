use super::collection::CollectionInitializer;
use super::embedded::EmbeddableInitializer;
use super::entity::EntityInitializer;
use super::state::{InitializerState, RowProcessingState};
use crate::core::{NavigablePath, Result};

/// Kinds in sorted-for-resolve order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum InitializerKind {
    Entity,
    Embeddable,
    Collection,
}

#[derive(Debug)]
pub enum Initializer {
    Entity(EntityInitializer),
    Embeddable(EmbeddableInitializer),
    Collection(CollectionInitializer),
}

impl Initializer {
    pub fn kind(&self) -> InitializerKind {
        match self {
            Self::Entity(_) => InitializerKind::Entity,
            Self::Embeddable(_) => InitializerKind::Embeddable,
            Self::Collection(_) => InitializerKind::Collection,
        }
    }

    pub fn path(&self) -> &NavigablePath {
        match self {
            Self::Entity(i) => i.path(),
            Self::Embeddable(i) => i.path(),
            Self::Collection(i) => i.path(),
        }
    }

    pub fn null_check_columns(&self) -> Vec<usize> {
        match self {
            Self::Entity(i) => i.identifier_positions(),
            Self::Embeddable(i) => i.null_columns().to_vec(),
            Self::Collection(_) => Vec::new(),
        }
    }

    pub(crate) fn resolve_key(&self, idx: usize, initializers: &[Initializer], state: &mut RowProcessingState<'_>) -> Result<()> {
        match self {
            Self::Entity(i) => i.resolve_key(idx, state),
            Self::Embeddable(i) => i.resolve_key(idx, state),
            Self::Collection(i) => i.resolve_key(idx, initializers, state),
        }
    }

    pub(crate) fn resolve_instance(&self, idx: usize, state: &mut RowProcessingState<'_>) -> Result<()> {
        match self {
            Self::Entity(i) => i.resolve_instance(idx, state),
            Self::Embeddable(i) => i.resolve_instance(idx, state),
            Self::Collection(i) => i.resolve_instance(idx, state),
        }
    }

    pub(crate) fn initialize_instance(&self, idx: usize, initializers: &[Initializer], state: &mut RowProcessingState<'_>) -> Result<()> {
        match self {
            Self::Entity(i) => i.initialize_instance(idx, initializers, state),
            Self::Embeddable(i) => i.initialize_instance(idx, initializers, state),
            Self::Collection(i) => i.initialize_instance(idx, initializers, state),
        }
    }
}

pub(crate) fn ensure_key_resolved(initializers: &[Initializer], idx: usize, state: &mut RowProcessingState<'_>) -> Result<()> {
    if state.state_of(idx) == InitializerState::Uninitialized {
        initializers[idx].resolve_key(idx, initializers, state)?;
    }
    Ok(())
}

pub(crate) fn ensure_instance_resolved(initializers: &[Initializer], idx: usize, state: &mut RowProcessingState<'_>) -> Result<()> {
    ensure_key_resolved(initializers, idx, state)?;
    if state.state_of(idx) == InitializerState::KeyResolved {
        initializers[idx].resolve_instance(idx, state)?;
    }
    Ok(())
}

/// Drives an initializer through every remaining phase. A no-op while the
/// initializer is already initializing further up the stack.
pub(crate) fn ensure_initialized(initializers: &[Initializer], idx: usize, state: &mut RowProcessingState<'_>) -> Result<()> {
    ensure_instance_resolved(initializers, idx, state)?;
    if state.state_of(idx) == InitializerState::Resolved && !state.data[idx].initializing {
        initializers[idx].initialize_instance(idx, initializers, state)?;
    }
    Ok(())
}
