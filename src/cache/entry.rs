use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::core::{Identifier, LoadError, Result, Value};
use crate::metamodel::{EntityDescriptor, Metamodel};
use crate::session::{AttributeValue, CollectionElement};

/// Structure-independent form of one attribute value. References become
/// identifiers and collections become placeholders.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum CachedValue {
    Basic(Value),
    Embedded(Option<Vec<CachedValue>>),
    EntityId(Option<Identifier>),
    CollectionPlaceholder,
}

impl CachedValue {
    pub fn disassemble(value: &AttributeValue) -> Result<Self> {
        Ok(match value {
            AttributeValue::Basic(value) => Self::Basic(value.clone()),
            AttributeValue::Embedded(None) => Self::Embedded(None),
            AttributeValue::Embedded(Some(embedded)) => Self::Embedded(Some(
                embedded
                    .values()
                    .iter()
                    .map(Self::disassemble)
                    .collect::<Result<Vec<_>>>()?,
            )),
            AttributeValue::Entity(None) => Self::EntityId(None),
            AttributeValue::Entity(Some(entity)) => Self::EntityId(Some(entity.id()?)),
            AttributeValue::Collection(_) | AttributeValue::Array(_) => Self::CollectionPlaceholder,
        })
    }
}

/// Cached entity state in state-array order.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EntityCacheEntry {
    /// Concrete entity name
    pub subclass: String,
    pub version: Option<Value>,
    pub state: Vec<CachedValue>,
}

impl EntityCacheEntry {
    pub fn disassemble(descriptor: &EntityDescriptor, state: &[AttributeValue], version: Option<Value>) -> Result<Self> {
        Ok(Self {
            subclass: descriptor.name().to_string(),
            version,
            state: state
                .iter()
                .map(CachedValue::disassemble)
                .collect::<Result<Vec<_>>>()?,
        })
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CollectionCacheEntry {
    pub elements: Vec<(Option<Value>, CachedValue)>,
}

impl CollectionCacheEntry {
    pub fn disassemble(elements: &[CollectionElement]) -> Result<Self> {
        Ok(Self {
            elements: elements
                .iter()
                .map(|e| Ok((e.index.clone(), CachedValue::disassemble(&e.value)?)))
                .collect::<Result<Vec<_>>>()?,
        })
    }
}

#[derive(Serialize, Deserialize)]
struct StructuredEntityEntry {
    subclass: String,
    version: Option<Value>,
    state: BTreeMap<String, CachedValue>,
}

/// On-the-wire layout of entity entries inside a region.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum CacheEntryStructure {
    /// Positional MessagePack
    #[default]
    Unstructured,
    /// JSON keyed by attribute name; survives attribute reordering
    Structured,
}

impl CacheEntryStructure {
    pub fn encode_entity(&self, entry: &EntityCacheEntry, metamodel: &Metamodel) -> Result<Vec<u8>> {
        match self {
            Self::Unstructured => Ok(rmp_serde::to_vec(entry)?),
            Self::Structured => {
                let descriptor = metamodel.entity(&entry.subclass)?;
                let state = descriptor
                    .attributes()
                    .iter()
                    .zip(&entry.state)
                    .map(|(attribute, value)| (attribute.name().to_string(), value.clone()))
                    .collect();
                let structured = StructuredEntityEntry {
                    subclass: entry.subclass.clone(),
                    version: entry.version.clone(),
                    state,
                };
                Ok(serde_json::to_vec(&structured)?)
            }
        }
    }

    pub fn decode_entity(&self, payload: &[u8], metamodel: &Metamodel) -> Result<EntityCacheEntry> {
        match self {
            Self::Unstructured => Ok(rmp_serde::from_slice(payload)?),
            Self::Structured => {
                let mut structured: StructuredEntityEntry = serde_json::from_slice(payload)?;
                let descriptor = metamodel.entity(&structured.subclass)?;
                let state = descriptor
                    .attributes()
                    .iter()
                    .map(|attribute| {
                        structured.state.remove(attribute.name()).ok_or_else(|| {
                            LoadError::Serialization(format!(
                                "Cached entry for '{}' lacks attribute '{}'",
                                structured.subclass,
                                attribute.name()
                            ))
                        })
                    })
                    .collect::<Result<Vec<_>>>()?;
                Ok(EntityCacheEntry {
                    subclass: structured.subclass,
                    version: structured.version,
                    state,
                })
            }
        }
    }

    pub fn encode_collection(&self, entry: &CollectionCacheEntry) -> Result<Vec<u8>> {
        match self {
            Self::Unstructured => Ok(rmp_serde::to_vec(entry)?),
            Self::Structured => Ok(serde_json::to_vec(entry)?),
        }
    }

    pub fn decode_collection(&self, payload: &[u8]) -> Result<CollectionCacheEntry> {
        match self {
            Self::Unstructured => Ok(rmp_serde::from_slice(payload)?),
            Self::Structured => Ok(serde_json::from_slice(payload)?),
        }
    }
}
