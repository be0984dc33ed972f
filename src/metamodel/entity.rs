use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use super::{AttributeKind, AttributeMapping, EmbeddableDescriptor};
use crate::core::{DataType, Value};

#[derive(Debug, Clone)]
pub struct IdentifierMapping {
    name: String,
    types: Vec<DataType>,
}

impl IdentifierMapping {
    pub fn new(name: impl Into<String>, types: Vec<DataType>) -> Self {
        Self {
            name: name.into(),
            types,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn types(&self) -> &[DataType] {
        &self.types
    }

    pub fn column_span(&self) -> usize {
        self.types.len()
    }
}

/// Declarative description of one entity type, consumed by
/// [`MetamodelBuilder`](super::MetamodelBuilder).
#[derive(Debug, Clone)]
pub struct EntityDefinition {
    pub(crate) name: String,
    pub(crate) super_name: Option<String>,
    pub(crate) identifier: Option<IdentifierMapping>,
    pub(crate) attributes: Vec<AttributeMapping>,
    pub(crate) discriminator_value: Option<Value>,
    pub(crate) version: Option<String>,
    pub(crate) natural_id: Vec<String>,
    pub(crate) cacheable: bool,
    pub(crate) batch_size: usize,
    pub(crate) mutable: bool,
}

impl EntityDefinition {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            super_name: None,
            identifier: None,
            attributes: Vec::new(),
            discriminator_value: None,
            version: None,
            natural_id: Vec::new(),
            cacheable: false,
            batch_size: 1,
            mutable: true,
        }
    }

    pub fn extends(mut self, super_name: impl Into<String>) -> Self {
        self.super_name = Some(super_name.into());
        self
    }

    pub fn identifier(mut self, name: impl Into<String>, data_type: DataType) -> Self {
        self.identifier = Some(IdentifierMapping::new(name, vec![data_type]));
        self
    }

    pub fn composite_identifier(mut self, name: impl Into<String>, types: Vec<DataType>) -> Self {
        self.identifier = Some(IdentifierMapping::new(name, types));
        self
    }

    pub fn attribute(mut self, attribute: AttributeMapping) -> Self {
        self.attributes.push(attribute);
        self
    }

    pub fn basic(self, name: impl Into<String>, data_type: DataType) -> Self {
        self.attribute(AttributeMapping::basic(name, data_type))
    }

    pub fn embedded(self, name: impl Into<String>, embeddable: Arc<EmbeddableDescriptor>) -> Self {
        self.attribute(AttributeMapping::embedded(name, embeddable))
    }

    pub fn to_one(self, name: impl Into<String>, target: impl Into<String>) -> Self {
        self.attribute(AttributeMapping::to_one(name, target))
    }

    pub fn collection(self, name: impl Into<String>, role: impl Into<String>) -> Self {
        self.attribute(AttributeMapping::collection(name, role))
    }

    pub fn discriminator_value(mut self, value: impl Into<Value>) -> Self {
        self.discriminator_value = Some(value.into());
        self
    }

    /// Names the basic attribute holding the optimistic-lock version.
    pub fn version(mut self, attribute: impl Into<String>) -> Self {
        self.version = Some(attribute.into());
        self
    }

    pub fn natural_id(mut self, attributes: &[&str]) -> Self {
        self.natural_id = attributes.iter().map(|a| a.to_string()).collect();
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

    pub fn immutable(mut self) -> Self {
        self.mutable = false;
        self
    }
}

/// Compiled, hierarchy-aware entity metadata. Built only by the metamodel.
#[derive(Debug)]
pub struct EntityDescriptor {
    pub(crate) name: String,
    pub(crate) root_name: String,
    pub(crate) super_name: Option<String>,
    pub(crate) identifier: IdentifierMapping,
    /// State-array order: inherited attributes first.
    pub(crate) attributes: Vec<AttributeMapping>,
    pub(crate) discriminator_value: Option<Value>,
    pub(crate) discriminator_map: Arc<HashMap<Value, String>>,
    pub(crate) version_index: Option<usize>,
    pub(crate) natural_id_indexes: Vec<usize>,
    pub(crate) subtypes: HashSet<String>,
    pub(crate) cacheable: bool,
    pub(crate) batch_size: usize,
    pub(crate) mutable: bool,
}

impl EntityDescriptor {
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn root_name(&self) -> &str {
        &self.root_name
    }

    pub fn super_name(&self) -> Option<&str> {
        self.super_name.as_deref()
    }

    pub fn is_root(&self) -> bool {
        self.super_name.is_none()
    }

    pub fn identifier(&self) -> &IdentifierMapping {
        &self.identifier
    }

    pub fn attributes(&self) -> &[AttributeMapping] {
        &self.attributes
    }

    pub fn attribute_index(&self, name: &str) -> Option<usize> {
        self.attributes.iter().position(|attr| attr.name() == name)
    }

    pub fn attribute(&self, name: &str) -> Option<&AttributeMapping> {
        self.attribute_index(name).map(|idx| &self.attributes[idx])
    }

    /// Index of the attribute holding the given collection role.
    pub fn collection_attribute_index(&self, role: &str) -> Option<usize> {
        self.attributes.iter().position(|attr| {
            matches!(attr.kind(), AttributeKind::Collection { role: r } if r == role)
        })
    }

    pub fn discriminator_value(&self) -> Option<&Value> {
        self.discriminator_value.as_ref()
    }

    pub fn has_discriminator(&self) -> bool {
        !self.discriminator_map.is_empty()
    }

    /// Concrete entity name for a discriminator value anywhere in this
    /// entity's hierarchy.
    pub fn subclass_for_discriminator(&self, value: &Value) -> Option<&str> {
        self.discriminator_map.get(value).map(String::as_str)
    }

    /// True when `other` is this type or one of its subtypes.
    pub fn is_type_or_super_type_of(&self, other: &str) -> bool {
        self.subtypes.contains(other)
    }

    pub fn subtypes(&self) -> impl Iterator<Item = &str> {
        self.subtypes.iter().map(String::as_str)
    }

    pub fn version_index(&self) -> Option<usize> {
        self.version_index
    }

    pub fn is_versioned(&self) -> bool {
        self.version_index.is_some()
    }

    pub fn natural_id_indexes(&self) -> &[usize] {
        &self.natural_id_indexes
    }

    pub fn has_natural_id(&self) -> bool {
        !self.natural_id_indexes.is_empty()
    }

    pub fn is_cacheable(&self) -> bool {
        self.cacheable
    }

    pub fn batch_size(&self) -> usize {
        self.batch_size
    }

    pub fn is_batch_loadable(&self) -> bool {
        self.batch_size > 1
    }

    pub fn is_mutable(&self) -> bool {
        self.mutable
    }
}
