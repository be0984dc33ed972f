use std::sync::Arc;

use crate::core::DataType;

/// What an attribute holds; decides how it is hydrated and resolved.
#[derive(Debug, Clone)]
pub enum AttributeKind {
    Basic(DataType),
    Embedded(Arc<EmbeddableDescriptor>),
    /// Many-to-one / one-to-one reference to another entity.
    ToOne { target: String },
    /// Owned collection; never hydrated inline.
    Collection { role: String },
}

#[derive(Debug, Clone)]
pub struct AttributeMapping {
    name: String,
    kind: AttributeKind,
    nullable: bool,
    updatable: bool,
}

impl AttributeMapping {
    pub fn new(name: impl Into<String>, kind: AttributeKind) -> Self {
        Self {
            name: name.into(),
            kind,
            nullable: true,
            updatable: true,
        }
    }

    pub fn basic(name: impl Into<String>, data_type: DataType) -> Self {
        Self::new(name, AttributeKind::Basic(data_type))
    }

    pub fn embedded(name: impl Into<String>, embeddable: Arc<EmbeddableDescriptor>) -> Self {
        Self::new(name, AttributeKind::Embedded(embeddable))
    }

    pub fn to_one(name: impl Into<String>, target: impl Into<String>) -> Self {
        Self::new(name, AttributeKind::ToOne { target: target.into() })
    }

    pub fn collection(name: impl Into<String>, role: impl Into<String>) -> Self {
        Self::new(name, AttributeKind::Collection { role: role.into() })
    }

    pub fn not_null(mut self) -> Self {
        self.nullable = false;
        self
    }

    pub fn not_updatable(mut self) -> Self {
        self.updatable = false;
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn kind(&self) -> &AttributeKind {
        &self.kind
    }

    pub fn is_nullable(&self) -> bool {
        self.nullable
    }

    pub fn is_updatable(&self) -> bool {
        self.updatable
    }

    pub fn is_collection(&self) -> bool {
        matches!(self.kind, AttributeKind::Collection { .. })
    }
}

/// A composite value type without identity of its own.
#[derive(Debug, Clone)]
pub struct EmbeddableDescriptor {
    name: String,
    attributes: Vec<AttributeMapping>,
}

impl EmbeddableDescriptor {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            attributes: Vec::new(),
        }
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

    pub fn build(self) -> Arc<Self> {
        Arc::new(self)
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn attributes(&self) -> &[AttributeMapping] {
        &self.attributes
    }

    pub fn attribute_index(&self, name: &str) -> Option<usize> {
        self.attributes.iter().position(|attr| attr.name() == name)
    }
}
