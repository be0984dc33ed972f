use std::sync::Arc;

use super::circular::{CircularFetchAssembler, resolve_circular};
use super::initializer::{Initializer, ensure_initialized};
use super::state::RowProcessingState;
use crate::core::{DataType, EntityKey, Identifier, Result, Value};
use crate::metamodel::{CollectionDescriptor, EntityDescriptor};
use crate::result::ResultValue;
use crate::row::RowSource;
use crate::session::{AttributeValue, EntityRef};

/// Reads one column of the current row and converts it to the target type.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BasicAssembler {
    position: usize,
    data_type: DataType,
}

impl BasicAssembler {
    pub fn new(position: usize, data_type: DataType) -> Self {
        Self { position, data_type }
    }

    pub fn position(&self) -> usize {
        self.position
    }

    pub fn data_type(&self) -> DataType {
        self.data_type
    }

    pub fn assemble(&self, row: &dyn RowSource) -> Result<Value> {
        self.data_type.coerce(row.value_at(self.position)?)
    }
}

pub(crate) fn read_identifier(assemblers: &[BasicAssembler], row: &dyn RowSource) -> Result<Identifier> {
    let values = assemblers
        .iter()
        .map(|a| a.assemble(row))
        .collect::<Result<Vec<_>>>()?;
    Ok(Identifier::new(values))
}

/// How one attribute (or collection element) is produced from a row.
#[derive(Debug, Clone)]
pub enum AttributeAssembler {
    Basic(BasicAssembler),
    Embedded { initializer: usize },
    /// To-one fetched in the same row by its own initializer.
    JoinedEntity { initializer: usize },
    /// To-one known only by key; resolved lazily.
    SelectEntity {
        key: Vec<BasicAssembler>,
        target: Arc<EntityDescriptor>,
    },
    Circular(CircularFetchAssembler),
    Collection {
        descriptor: Arc<CollectionDescriptor>,
        /// Set when the collection is join-fetched by this shape.
        initializer: Option<usize>,
    },
}

/// First-phase value: what the row says, before references become
/// instances.
#[derive(Debug, Clone)]
pub enum HydratedValue {
    Basic(Value),
    Embedded(usize),
    Joined(usize),
    Reference {
        target: Arc<EntityDescriptor>,
        id: Option<Identifier>,
    },
    Circular {
        ancestor: usize,
        target: Arc<EntityDescriptor>,
        id: Option<Identifier>,
        keyed: bool,
    },
    CollectionPlaceholder(Arc<CollectionDescriptor>),
}

impl AttributeAssembler {
    pub fn hydrate(&self, row: &dyn RowSource) -> Result<HydratedValue> {
        Ok(match self {
            Self::Basic(basic) => HydratedValue::Basic(basic.assemble(row)?),
            Self::Embedded { initializer } => HydratedValue::Embedded(*initializer),
            Self::JoinedEntity { initializer } => HydratedValue::Joined(*initializer),
            Self::SelectEntity { key, target } => {
                let id = read_identifier(key, row)?;
                HydratedValue::Reference {
                    target: target.clone(),
                    id: (!id.is_null()).then_some(id),
                }
            }
            Self::Circular(circular) => circular.hydrate(row)?,
            Self::Collection { descriptor, .. } => HydratedValue::CollectionPlaceholder(descriptor.clone()),
        })
    }

    /// Row columns whose nullness decides whether an enclosing embeddable
    /// is null.
    pub fn null_check_columns(&self, initializers: &[Option<Initializer>]) -> Vec<usize> {
        match self {
            Self::Basic(basic) => vec![basic.position()],
            Self::SelectEntity { key, .. } => key.iter().map(BasicAssembler::position).collect(),
            Self::Circular(circular) => circular.key_positions(),
            Self::JoinedEntity { initializer } | Self::Embedded { initializer } => initializers
                .get(*initializer)
                .and_then(Option::as_ref)
                .map(Initializer::null_check_columns)
                .unwrap_or_default(),
            Self::Collection { .. } => Vec::new(),
        }
    }
}

/// Second phase: turns a hydrated value into the attribute value injected
/// into the instance.
pub(crate) fn resolve_hydrated(
    value: HydratedValue,
    owner: Option<&Identifier>,
    initializers: &[Initializer],
    state: &mut RowProcessingState<'_>,
) -> Result<AttributeValue> {
    match value {
        HydratedValue::Basic(value) => Ok(AttributeValue::Basic(value)),
        HydratedValue::Embedded(idx) => {
            ensure_initialized(initializers, idx, state)?;
            Ok(AttributeValue::Embedded(state.data[idx].embedded_value()))
        }
        HydratedValue::Joined(idx) => {
            ensure_initialized(initializers, idx, state)?;
            Ok(AttributeValue::Entity(state.data[idx].entity_instance()))
        }
        HydratedValue::Reference { target, id } => match id {
            Some(id) => Ok(AttributeValue::Entity(Some(lazy_reference(state, &target, id)?))),
            None => Ok(AttributeValue::Entity(None)),
        },
        HydratedValue::Circular {
            ancestor,
            target,
            id,
            keyed,
        } => Ok(AttributeValue::Entity(resolve_circular(
            ancestor,
            &target,
            id,
            keyed,
            initializers,
            state,
        )?)),
        HydratedValue::CollectionPlaceholder(descriptor) => {
            let owner = owner.ok_or_else(|| {
                crate::core::LoadError::IllegalState(format!(
                    "Collection '{}' resolved without an owner",
                    descriptor.role()
                ))
            })?;
            Ok(AttributeValue::Collection(
                state.session.collection_reference(&descriptor, owner)?,
            ))
        }
    }
}

/// Reference to an entity not fetched at this position: an instance still
/// loading in this result set, the managed instance, or a proxy.
pub(crate) fn lazy_reference(state: &mut RowProcessingState<'_>, target: &Arc<EntityDescriptor>, id: Identifier) -> Result<EntityRef> {
    let key = EntityKey::new(id.clone(), target.root_name());
    if let Some(loading) = state.load_context.find_loading_entity(&key) {
        return Ok(loading.instance.clone());
    }
    state.session.internal_load_lazy(target, id)
}

/// Produces one top-level value of a result row.
#[derive(Debug, Clone)]
pub enum ResultAssembler {
    Scalar(BasicAssembler),
    Entity { initializer: usize },
    Collection { initializer: usize },
}

impl ResultAssembler {
    pub(crate) fn assemble(&self, initializers: &[Initializer], state: &mut RowProcessingState<'_>) -> Result<ResultValue> {
        match self {
            Self::Scalar(basic) => Ok(ResultValue::Scalar(basic.assemble(state.row)?)),
            Self::Entity { initializer } => {
                ensure_initialized(initializers, *initializer, state)?;
                Ok(ResultValue::Entity(state.data[*initializer].entity_instance()))
            }
            Self::Collection { initializer } => {
                ensure_initialized(initializers, *initializer, state)?;
                Ok(ResultValue::Collection(
                    state.data[*initializer]
                        .collection()
                        .and_then(|c| c.instance.clone()),
                ))
            }
        }
    }
}
