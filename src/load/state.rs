use std::sync::Arc;

use super::LoadContext;
use crate::core::{CollectionKey, EntityKey, LoadError, Result, Value};
use crate::metamodel::EntityDescriptor;
use crate::row::RowSource;
use crate::session::{CollectionRef, EmbeddedValue, EntityRef, ProcessingOptions, Session};

/// Per-row progress of one initializer. Moves forward only; reset at every
/// row boundary.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InitializerState {
    Uninitialized,
    KeyResolved,
    /// Nothing at this path for the current row.
    Missing,
    Resolved,
    Initialized,
}

impl InitializerState {
    pub fn can_advance_to(&self, next: InitializerState) -> bool {
        use InitializerState::*;
        matches!(
            (*self, next),
            (Uninitialized, KeyResolved)
                | (Uninitialized, Missing)
                | (KeyResolved, Missing)
                | (KeyResolved, Resolved)
                | (KeyResolved, Initialized)
                | (Resolved, Initialized)
        )
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Missing | Self::Initialized)
    }
}

#[derive(Debug, Clone)]
pub struct EntityRowData {
    pub key: EntityKey,
    pub concrete: Arc<EntityDescriptor>,
    pub instance: Option<EntityRef>,
    pub row_id: Option<Value>,
}

#[derive(Debug, Clone)]
pub struct CollectionRowData {
    pub key: CollectionKey,
    pub instance: Option<CollectionRef>,
    /// This initializer stages elements for the key in the current row.
    pub owns_loading_entry: bool,
}

#[derive(Debug, Clone, Default)]
pub enum InitializerPayload {
    #[default]
    Empty,
    Entity(EntityRowData),
    Embeddable(Option<EmbeddedValue>),
    Collection(CollectionRowData),
}

#[derive(Debug, Clone)]
pub struct InitializerData {
    state: InitializerState,
    /// Set while `initialize_instance` runs, for re-entrant circular access.
    pub(crate) initializing: bool,
    pub(crate) payload: InitializerPayload,
}

impl Default for InitializerData {
    fn default() -> Self {
        Self {
            state: InitializerState::Uninitialized,
            initializing: false,
            payload: InitializerPayload::Empty,
        }
    }
}

impl InitializerData {
    pub fn state(&self) -> InitializerState {
        self.state
    }

    pub fn advance_to(&mut self, next: InitializerState) -> Result<()> {
        if !self.state.can_advance_to(next) {
            return Err(LoadError::IllegalState(format!(
                "Cannot move initializer from {:?} to {:?}",
                self.state, next
            )));
        }
        self.state = next;
        Ok(())
    }

    pub fn reset(&mut self) {
        *self = Self::default();
    }

    pub fn entity(&self) -> Option<&EntityRowData> {
        match &self.payload {
            InitializerPayload::Entity(data) => Some(data),
            _ => None,
        }
    }

    pub fn entity_mut(&mut self) -> Option<&mut EntityRowData> {
        match &mut self.payload {
            InitializerPayload::Entity(data) => Some(data),
            _ => None,
        }
    }

    /// Entity instance once resolved; `None` while missing.
    pub fn entity_instance(&self) -> Option<EntityRef> {
        self.entity().and_then(|data| data.instance.clone())
    }

    pub fn collection(&self) -> Option<&CollectionRowData> {
        match &self.payload {
            InitializerPayload::Collection(data) => Some(data),
            _ => None,
        }
    }

    pub fn embedded_value(&self) -> Option<EmbeddedValue> {
        match &self.payload {
            InitializerPayload::Embeddable(value) => value.clone(),
            _ => None,
        }
    }
}

/// Everything an initializer may touch while processing the current row.
pub struct RowProcessingState<'a> {
    pub(crate) row: &'a dyn RowSource,
    pub(crate) session: &'a mut Session,
    pub(crate) load_context: &'a mut LoadContext,
    pub(crate) options: &'a ProcessingOptions,
    pub(crate) data: &'a mut [InitializerData],
}

impl<'a> RowProcessingState<'a> {
    pub fn new(
        row: &'a dyn RowSource,
        session: &'a mut Session,
        load_context: &'a mut LoadContext,
        options: &'a ProcessingOptions,
        data: &'a mut [InitializerData],
    ) -> Self {
        Self {
            row,
            session,
            load_context,
            options,
            data,
        }
    }

    pub fn state_of(&self, initializer: usize) -> InitializerState {
        self.data[initializer].state()
    }

    /// Read-only decision for entities finished in this row.
    pub fn is_read_only(&self) -> bool {
        self.options
            .read_only
            .unwrap_or(self.session.config().default_read_only)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use InitializerState::*;

    #[test]
    fn test_states_only_move_forward() {
        let all = [Uninitialized, KeyResolved, Missing, Resolved, Initialized];
        for state in all {
            assert!(!state.can_advance_to(Uninitialized));
            assert!(!state.can_advance_to(state));
        }
        assert!(Uninitialized.can_advance_to(KeyResolved));
        assert!(KeyResolved.can_advance_to(Initialized));
        assert!(!Resolved.can_advance_to(KeyResolved));
        assert!(!Missing.can_advance_to(Resolved));
        assert!(!Initialized.can_advance_to(Missing));
    }

    #[test]
    fn test_illegal_transition_is_an_error() {
        let mut data = InitializerData::default();
        data.advance_to(KeyResolved).unwrap();
        data.advance_to(Resolved).unwrap();
        assert!(matches!(data.advance_to(Missing), Err(LoadError::IllegalState(_))));

        data.reset();
        assert_eq!(data.state(), Uninitialized);
        assert!(data.entity().is_none());
    }
}
