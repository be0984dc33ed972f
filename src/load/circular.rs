use std::sync::Arc;

use log::trace;

use super::assembler::{BasicAssembler, HydratedValue, lazy_reference, read_identifier};
use super::initializer::{Initializer, ensure_initialized, ensure_key_resolved};
use super::state::RowProcessingState;
use crate::core::{EntityKey, Identifier, NavigablePath, Result};
use crate::metamodel::EntityDescriptor;
use crate::row::RowSource;
use crate::session::EntityRef;

/// Stands in for a fetch that would re-enter an ancestor's entity type.
/// Bound to the ancestor's initializer instead of owning one.
#[derive(Debug, Clone)]
pub struct CircularFetchAssembler {
    ancestor: usize,
    ancestor_path: NavigablePath,
    target: Arc<EntityDescriptor>,
    key: Vec<BasicAssembler>,
}

impl CircularFetchAssembler {
    pub fn new(ancestor: usize, ancestor_path: NavigablePath, target: Arc<EntityDescriptor>, key: Vec<BasicAssembler>) -> Self {
        Self {
            ancestor,
            ancestor_path,
            target,
            key,
        }
    }

    pub fn ancestor(&self) -> usize {
        self.ancestor
    }

    pub fn ancestor_path(&self) -> &NavigablePath {
        &self.ancestor_path
    }

    pub fn key_positions(&self) -> Vec<usize> {
        self.key.iter().map(BasicAssembler::position).collect()
    }

    pub fn hydrate(&self, row: &dyn RowSource) -> Result<HydratedValue> {
        let id = if self.key.is_empty() {
            None
        } else {
            Some(read_identifier(&self.key, row)?)
        };
        Ok(HydratedValue::Circular {
            ancestor: self.ancestor,
            target: self.target.clone(),
            id,
            keyed: !self.key.is_empty(),
        })
    }
}

/// Keyed fetches pointing somewhere other than the ancestor's key become lazy
/// references; everything else yields the ancestor's instance, forcing it
/// through whatever phases remain.
pub(crate) fn resolve_circular(
    ancestor: usize,
    target: &Arc<EntityDescriptor>,
    id: Option<Identifier>,
    keyed: bool,
    initializers: &[Initializer],
    state: &mut RowProcessingState<'_>,
) -> Result<Option<EntityRef>> {
    if keyed {
        let Some(id) = id.filter(|id| !id.is_null()) else {
            return Ok(None);
        };
        ensure_key_resolved(initializers, ancestor, state)?;
        let key = EntityKey::new(id.clone(), target.root_name());
        let is_ancestor = state.data[ancestor]
            .entity()
            .is_some_and(|data| data.key == key);
        if !is_ancestor {
            trace!("Circular fetch resolves {} lazily", key);
            return lazy_reference(state, target, id).map(Some);
        }
    }

    if state.data[ancestor].initializing {
        return Ok(state.data[ancestor].entity_instance());
    }
    ensure_initialized(initializers, ancestor, state)?;
    Ok(state.data[ancestor].entity_instance())
}
