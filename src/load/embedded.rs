use std::sync::Arc;

use super::assembler::{AttributeAssembler, HydratedValue, resolve_hydrated};
use super::initializer::Initializer;
use super::state::{InitializerPayload, InitializerState, RowProcessingState};
use crate::core::{LoadError, NavigablePath, Result};
use crate::metamodel::EmbeddableDescriptor;
use crate::session::{AttributeValue, EmbeddedValue};

/// Assembles a composite value from a group of assemblers. A row whose
/// columns for the composite are all NULL yields a null composite.
#[derive(Debug)]
pub struct EmbeddableInitializer {
    path: NavigablePath,
    descriptor: Arc<EmbeddableDescriptor>,
    assemblers: Vec<AttributeAssembler>,
    null_columns: Vec<usize>,
}

impl EmbeddableInitializer {
    pub fn new(
        path: NavigablePath,
        descriptor: Arc<EmbeddableDescriptor>,
        assemblers: Vec<AttributeAssembler>,
        null_columns: Vec<usize>,
    ) -> Self {
        Self {
            path,
            descriptor,
            assemblers,
            null_columns,
        }
    }

    pub fn path(&self) -> &NavigablePath {
        &self.path
    }

    pub fn null_columns(&self) -> &[usize] {
        &self.null_columns
    }

    pub(crate) fn resolve_key(&self, idx: usize, state: &mut RowProcessingState<'_>) -> Result<()> {
        if state.state_of(idx) != InitializerState::Uninitialized {
            return Ok(());
        }
        let row = state.row;
        let mut all_null = true;
        for position in &self.null_columns {
            if !row.value_at(*position)?.is_null() {
                all_null = false;
                break;
            }
        }
        let data = &mut state.data[idx];
        if all_null {
            data.payload = InitializerPayload::Embeddable(None);
            data.advance_to(InitializerState::Missing)
        } else {
            data.advance_to(InitializerState::KeyResolved)
        }
    }

    pub(crate) fn resolve_instance(&self, idx: usize, state: &mut RowProcessingState<'_>) -> Result<()> {
        if state.state_of(idx) != InitializerState::KeyResolved {
            return Ok(());
        }
        state.data[idx].advance_to(InitializerState::Resolved)
    }

    pub(crate) fn initialize_instance(&self, idx: usize, initializers: &[Initializer], state: &mut RowProcessingState<'_>) -> Result<()> {
        if state.state_of(idx) != InitializerState::Resolved || state.data[idx].initializing {
            return Ok(());
        }
        state.data[idx].initializing = true;
        let values = self.assemble_values(initializers, state);
        state.data[idx].initializing = false;

        let value = EmbeddedValue::new(self.descriptor.clone(), values?);
        let data = &mut state.data[idx];
        data.payload = InitializerPayload::Embeddable(Some(value));
        data.advance_to(InitializerState::Initialized)
    }

    fn assemble_values(&self, initializers: &[Initializer], state: &mut RowProcessingState<'_>) -> Result<Vec<AttributeValue>> {
        let row = state.row;
        let mut hydrated = Vec::with_capacity(self.assemblers.len());
        for (attribute, assembler) in self.descriptor.attributes().iter().zip(&self.assemblers) {
            let value = assembler.hydrate(row)?;
            if matches!(&value, HydratedValue::Basic(v) if v.is_null()) && !attribute.is_nullable() {
                return Err(LoadError::MalformedColumn {
                    entity: self.descriptor.name().to_string(),
                    attribute: attribute.name().to_string(),
                    key: self.path.to_string(),
                });
            }
            hydrated.push(value);
        }
        hydrated
            .into_iter()
            .map(|value| resolve_hydrated(value, None, initializers, state))
            .collect()
    }
}
