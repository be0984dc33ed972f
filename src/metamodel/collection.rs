use std::sync::Arc;

use serde::{Deserialize, Serialize};

use super::EmbeddableDescriptor;
use crate::core::DataType;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum CollectionKind {
    Bag,
    Set,
    List,
    Map,
    Array,
}

impl CollectionKind {
    pub fn is_indexed(&self) -> bool {
        matches!(self, Self::List | Self::Map | Self::Array)
    }

    /// Arrays are held by value on the owner rather than referenced by
    /// identity, so their owner snapshot must be refreshed after loading.
    pub fn has_holder(&self) -> bool {
        matches!(self, Self::Array)
    }
}

#[derive(Debug, Clone)]
pub enum ElementKind {
    Basic(DataType),
    Embedded(Arc<EmbeddableDescriptor>),
    Entity(String),
}

#[derive(Debug, Clone)]
pub struct CollectionDescriptor {
    role: String,
    owner: String,
    kind: CollectionKind,
    element: ElementKind,
    index_type: Option<DataType>,
    cacheable: bool,
    batch_size: usize,
    optimistic_lock: bool,
}

impl CollectionDescriptor {
    pub fn new(
        role: impl Into<String>,
        owner: impl Into<String>,
        kind: CollectionKind,
        element: ElementKind,
    ) -> Self {
        Self {
            role: role.into(),
            owner: owner.into(),
            kind,
            element,
            index_type: match kind {
                CollectionKind::List | CollectionKind::Array => Some(DataType::Integer),
                _ => None,
            },
            cacheable: false,
            batch_size: 1,
            optimistic_lock: true,
        }
    }

    /// Key type of a map collection.
    pub fn index_type(mut self, data_type: DataType) -> Self {
        self.index_type = Some(data_type);
        self
    }

    pub fn cacheable(mut self, cacheable: bool) -> Self {
        self.cacheable = cacheable;
        self
    }

    pub fn batch_size(mut self, batch_size: usize) -> Self {
        self.batch_size = batch_size.max(1);
        self
    }

    /// Whether changes to this collection bump the owner's version.
    pub fn optimistic_lock(mut self, optimistic_lock: bool) -> Self {
        self.optimistic_lock = optimistic_lock;
        self
    }

    pub fn role(&self) -> &str {
        &self.role
    }

    pub fn owner_entity_name(&self) -> &str {
        &self.owner
    }

    pub fn kind(&self) -> CollectionKind {
        self.kind
    }

    pub fn element(&self) -> &ElementKind {
        &self.element
    }

    pub fn index_data_type(&self) -> Option<DataType> {
        self.index_type
    }

    pub fn is_cacheable(&self) -> bool {
        self.cacheable
    }

    pub fn is_batch_loadable(&self) -> bool {
        self.batch_size > 1
    }

    pub fn is_optimistic_locked(&self) -> bool {
        self.optimistic_lock
    }
}
