use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use log::trace;

use super::assembler::ResultAssembler;
use super::context::LoadContext;
use super::initializer::{Initializer, InitializerKind};
use super::state::{InitializerData, InitializerState, RowProcessingState};
use super::transformer::RowTransformer;
use crate::core::{NavigablePath, Result};
use crate::result::ResultValue;
use crate::row::RowSource;
use crate::session::{ProcessingOptions, Session};

/// Compiled form of a result shape: the initializer arena plus the
/// top-level assemblers. Reused for every row of a result set.
pub struct RowReader {
    initializers: Vec<Initializer>,
    /// Entities, then embeddables, then collections
    resolve_order: Vec<usize>,
    path_index: HashMap<NavigablePath, usize>,
    result_assemblers: Vec<ResultAssembler>,
    aliases: Vec<String>,
    transformer: Arc<dyn RowTransformer>,
    data: Vec<InitializerData>,
}

impl RowReader {
    pub fn new(
        initializers: Vec<Initializer>,
        path_index: HashMap<NavigablePath, usize>,
        result_assemblers: Vec<ResultAssembler>,
        aliases: Vec<String>,
        transformer: Arc<dyn RowTransformer>,
    ) -> Self {
        let mut resolve_order: Vec<usize> = (0..initializers.len()).collect();
        resolve_order.sort_by_key(|idx| initializers[*idx].kind());
        let data = vec![InitializerData::default(); initializers.len()];
        Self {
            initializers,
            resolve_order,
            path_index,
            result_assemblers,
            aliases,
            transformer,
            data,
        }
    }

    pub fn initializer_count(&self) -> usize {
        self.initializers.len()
    }

    pub fn initializers(&self) -> &[Initializer] {
        &self.initializers
    }

    pub fn resolve_order(&self) -> &[usize] {
        &self.resolve_order
    }

    pub fn initializer_index(&self, path: &NavigablePath) -> Option<usize> {
        self.path_index.get(path).copied()
    }

    pub fn initializer_for(&self, path: &NavigablePath) -> Option<&Initializer> {
        self.initializer_index(path).map(|idx| &self.initializers[idx])
    }

    /// Number of initializers of a kind, in resolve order.
    pub fn count_of(&self, kind: InitializerKind) -> usize {
        self.initializers.iter().filter(|i| i.kind() == kind).count()
    }

    pub fn aliases(&self) -> &[String] {
        &self.aliases
    }

    pub fn transformer(&self) -> &Arc<dyn RowTransformer> {
        &self.transformer
    }

    /// Per-initializer states; all `Uninitialized` between rows.
    pub fn states(&self) -> Vec<InitializerState> {
        self.data.iter().map(InitializerData::state).collect()
    }

    /// Processes the current row of `row`. Initializer data is reset
    /// whether or not the row succeeds.
    pub fn read_row(
        &mut self,
        row: &dyn RowSource,
        session: &mut Session,
        load_context: &mut LoadContext,
        options: &ProcessingOptions,
    ) -> Result<ResultValue> {
        let values = {
            let mut state = RowProcessingState::new(row, session, load_context, options, &mut self.data);
            Self::process(&self.initializers, &self.resolve_order, &self.result_assemblers, &mut state)
        };
        for data in &mut self.data {
            data.reset();
        }
        self.transformer.transform(values?, &self.aliases)
    }

    fn process(
        initializers: &[Initializer],
        resolve_order: &[usize],
        result_assemblers: &[ResultAssembler],
        state: &mut RowProcessingState<'_>,
    ) -> Result<Vec<ResultValue>> {
        for &idx in resolve_order {
            initializers[idx].resolve_key(idx, initializers, state)?;
        }
        for &idx in resolve_order {
            if state.state_of(idx) == InitializerState::KeyResolved {
                initializers[idx].resolve_instance(idx, state)?;
            }
        }
        for &idx in resolve_order {
            if state.state_of(idx) == InitializerState::Resolved {
                initializers[idx].initialize_instance(idx, initializers, state)?;
            }
        }
        trace!(
            "Row states: {:?}",
            resolve_order.iter().map(|idx| state.state_of(*idx)).collect::<Vec<_>>()
        );

        result_assemblers
            .iter()
            .map(|assembler| assembler.assemble(initializers, state))
            .collect()
    }
}

impl fmt::Debug for RowReader {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RowReader")
            .field("initializers", &self.initializers.len())
            .field("aliases", &self.aliases)
            .field("transformer", &self.transformer.name())
            .finish()
    }
}
