use std::fmt;
use std::sync::{Arc, RwLock, RwLockReadGuard, RwLockWriteGuard};

use crate::core::{CollectionKey, Identifier, Result, Value};
use crate::metamodel::{CollectionDescriptor, CollectionKind, EmbeddableDescriptor, EntityDescriptor};

/// Resolved value of one attribute of a loaded instance.
#[derive(Debug, Clone)]
pub enum AttributeValue {
    Basic(Value),
    Embedded(Option<EmbeddedValue>),
    Entity(Option<EntityRef>),
    Collection(CollectionRef),
    /// Array-valued attribute after its holder collection finished loading.
    Array(Vec<AttributeValue>),
}

impl AttributeValue {
    pub fn null() -> Self {
        Self::Basic(Value::Null)
    }

    pub fn is_null(&self) -> bool {
        match self {
            Self::Basic(value) => value.is_null(),
            Self::Embedded(value) => value.is_none(),
            Self::Entity(value) => value.is_none(),
            Self::Collection(_) | Self::Array(_) => false,
        }
    }

    pub fn as_value(&self) -> Option<&Value> {
        match self {
            Self::Basic(value) => Some(value),
            _ => None,
        }
    }

    pub fn as_embedded(&self) -> Option<&EmbeddedValue> {
        match self {
            Self::Embedded(value) => value.as_ref(),
            _ => None,
        }
    }

    pub fn as_entity(&self) -> Option<&EntityRef> {
        match self {
            Self::Entity(value) => value.as_ref(),
            _ => None,
        }
    }

    pub fn as_collection(&self) -> Option<&CollectionRef> {
        match self {
            Self::Collection(value) => Some(value),
            _ => None,
        }
    }

    pub fn as_array(&self) -> Option<&[AttributeValue]> {
        match self {
            Self::Array(values) => Some(values),
            _ => None,
        }
    }
}

/// Entities and collections compare by identity, everything else by value.
impl PartialEq for AttributeValue {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Self::Basic(a), Self::Basic(b)) => a == b,
            (Self::Embedded(a), Self::Embedded(b)) => a == b,
            (Self::Entity(Some(a)), Self::Entity(Some(b))) => a.ptr_eq(b),
            (Self::Entity(None), Self::Entity(None)) => true,
            (Self::Collection(a), Self::Collection(b)) => a.ptr_eq(b),
            (Self::Array(a), Self::Array(b)) => a == b,
            _ => false,
        }
    }
}

impl From<Value> for AttributeValue {
    fn from(value: Value) -> Self {
        Self::Basic(value)
    }
}

impl From<EntityRef> for AttributeValue {
    fn from(entity: EntityRef) -> Self {
        Self::Entity(Some(entity))
    }
}

/// Composite value without identity.
#[derive(Clone)]
pub struct EmbeddedValue {
    descriptor: Arc<EmbeddableDescriptor>,
    values: Vec<AttributeValue>,
}

impl EmbeddedValue {
    pub fn new(descriptor: Arc<EmbeddableDescriptor>, values: Vec<AttributeValue>) -> Self {
        Self { descriptor, values }
    }

    pub fn descriptor(&self) -> &Arc<EmbeddableDescriptor> {
        &self.descriptor
    }

    pub fn values(&self) -> &[AttributeValue] {
        &self.values
    }

    pub fn get(&self, name: &str) -> Option<&AttributeValue> {
        self.descriptor
            .attribute_index(name)
            .and_then(|idx| self.values.get(idx))
    }
}

impl PartialEq for EmbeddedValue {
    fn eq(&self, other: &Self) -> bool {
        self.descriptor.name() == other.descriptor.name() && self.values == other.values
    }
}

impl fmt::Debug for EmbeddedValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut map = f.debug_map();
        for (attribute, value) in self.descriptor.attributes().iter().zip(&self.values) {
            map.entry(&attribute.name(), value);
        }
        map.finish()
    }
}

// ============================================================================
// Entities
// ============================================================================

/// Dynamic entity object: a property bag ordered like the concrete
/// descriptor's state array.
pub struct EntityInstance {
    descriptor: Arc<EntityDescriptor>,
    id: Identifier,
    state: Vec<AttributeValue>,
    initialized: bool,
}

impl EntityInstance {
    /// Fresh, uninitialized instance; also used as a lazy proxy.
    pub fn new(descriptor: Arc<EntityDescriptor>, id: Identifier) -> Self {
        Self {
            descriptor,
            id,
            state: Vec::new(),
            initialized: false,
        }
    }

    /// Injects identifier and property values, switching the instance to
    /// its concrete type.
    pub fn inject(&mut self, descriptor: Arc<EntityDescriptor>, id: Identifier, state: Vec<AttributeValue>) {
        self.descriptor = descriptor;
        self.id = id;
        self.state = state;
        self.initialized = true;
    }

    pub fn descriptor(&self) -> &Arc<EntityDescriptor> {
        &self.descriptor
    }

    pub fn entity_name(&self) -> &str {
        self.descriptor.name()
    }

    pub fn id(&self) -> &Identifier {
        &self.id
    }

    pub fn is_initialized(&self) -> bool {
        self.initialized
    }

    pub fn state(&self) -> &[AttributeValue] {
        &self.state
    }

    pub fn get(&self, name: &str) -> Option<&AttributeValue> {
        self.descriptor
            .attribute_index(name)
            .and_then(|idx| self.state.get(idx))
    }

    pub fn set_at(&mut self, index: usize, value: AttributeValue) {
        if let Some(slot) = self.state.get_mut(index) {
            *slot = value;
        }
    }
}

impl fmt::Debug for EntityInstance {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut s = f.debug_struct(self.descriptor.name());
        s.field("id", &self.id);
        if !self.initialized {
            return s.field("initialized", &false).finish();
        }
        for (attribute, value) in self.descriptor.attributes().iter().zip(&self.state) {
            s.field(attribute.name(), value);
        }
        s.finish()
    }
}

/// Shared handle to an entity instance. Identity is pointer identity.
#[derive(Clone)]
pub struct EntityRef(Arc<RwLock<EntityInstance>>);

impl EntityRef {
    pub fn new(instance: EntityInstance) -> Self {
        Self(Arc::new(RwLock::new(instance)))
    }

    pub fn ptr_eq(&self, other: &EntityRef) -> bool {
        Arc::ptr_eq(&self.0, &other.0)
    }

    /// Stable address, usable as an identity key.
    pub fn addr(&self) -> usize {
        Arc::as_ptr(&self.0) as usize
    }

    pub fn read(&self) -> Result<RwLockReadGuard<'_, EntityInstance>> {
        Ok(self.0.read()?)
    }

    pub fn write(&self) -> Result<RwLockWriteGuard<'_, EntityInstance>> {
        Ok(self.0.write()?)
    }

    pub fn entity_name(&self) -> Result<String> {
        Ok(self.read()?.entity_name().to_string())
    }

    pub fn id(&self) -> Result<Identifier> {
        Ok(self.read()?.id().clone())
    }

    pub fn is_initialized(&self) -> Result<bool> {
        Ok(self.read()?.is_initialized())
    }

    pub fn get(&self, name: &str) -> Result<Option<AttributeValue>> {
        Ok(self.read()?.get(name).cloned())
    }
}

// Graphs are cyclic; print the key only.
impl fmt::Debug for EntityRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.0.try_read() {
            Ok(instance) => write!(f, "EntityRef({}#{})", instance.entity_name(), instance.id()),
            Err(_) => write!(f, "EntityRef(<locked>)"),
        }
    }
}

// ============================================================================
// Collections
// ============================================================================

#[derive(Debug, Clone, PartialEq)]
pub struct CollectionElement {
    /// List position or map key; `None` for bags and sets.
    pub index: Option<Value>,
    pub value: AttributeValue,
}

impl CollectionElement {
    pub fn new(index: Option<Value>, value: AttributeValue) -> Self {
        Self { index, value }
    }
}

/// Operation recorded against a collection before it finished loading.
#[derive(Debug, Clone)]
pub enum QueuedOperation {
    Add(AttributeValue),
    Remove(AttributeValue),
}

#[derive(Debug)]
pub struct PersistentCollection {
    descriptor: Arc<CollectionDescriptor>,
    owner: Identifier,
    elements: Vec<CollectionElement>,
    initialized: bool,
    reading: bool,
    queued: Vec<QueuedOperation>,
}

impl PersistentCollection {
    pub fn new(descriptor: Arc<CollectionDescriptor>, owner: Identifier) -> Self {
        Self {
            descriptor,
            owner,
            elements: Vec::new(),
            initialized: false,
            reading: false,
            queued: Vec::new(),
        }
    }

    pub fn key(&self) -> CollectionKey {
        CollectionKey::new(self.descriptor.role(), self.owner.clone())
    }

    pub fn descriptor(&self) -> &Arc<CollectionDescriptor> {
        &self.descriptor
    }

    pub fn role(&self) -> &str {
        self.descriptor.role()
    }

    pub fn kind(&self) -> CollectionKind {
        self.descriptor.kind()
    }

    pub fn owner_identifier(&self) -> &Identifier {
        &self.owner
    }

    pub fn is_initialized(&self) -> bool {
        self.initialized
    }

    pub fn is_reading(&self) -> bool {
        self.reading
    }

    pub fn elements(&self) -> &[CollectionElement] {
        &self.elements
    }

    pub fn values(&self) -> Vec<AttributeValue> {
        self.elements.iter().map(|e| e.value.clone()).collect()
    }

    pub fn len(&self) -> usize {
        self.elements.len()
    }

    pub fn is_empty(&self) -> bool {
        self.elements.is_empty()
    }

    pub fn contains(&self, value: &AttributeValue) -> bool {
        self.elements.iter().any(|e| &e.value == value)
    }

    /// Value stored under a map key.
    pub fn get_by_index(&self, index: &Value) -> Option<&AttributeValue> {
        self.elements
            .iter()
            .find(|e| e.index.as_ref() == Some(index))
            .map(|e| &e.value)
    }

    pub fn begin_read(&mut self) {
        self.reading = true;
    }

    /// Replaces the contents with rows read from a result set, honouring the
    /// collection semantics of the role.
    pub fn inject(&mut self, staged: Vec<CollectionElement>) {
        self.elements.clear();
        match self.kind() {
            CollectionKind::Bag => self.elements = staged,
            CollectionKind::Set => {
                for element in staged {
                    if !self.contains(&element.value) {
                        self.elements.push(element);
                    }
                }
            }
            CollectionKind::Map => {
                for element in staged {
                    match self.elements.iter_mut().find(|e| e.index == element.index) {
                        Some(existing) => existing.value = element.value,
                        None => self.elements.push(element),
                    }
                }
            }
            CollectionKind::List | CollectionKind::Array => {
                let (mut positioned, unpositioned): (Vec<_>, Vec<_>) = staged
                    .into_iter()
                    .partition(|e| e.index.as_ref().and_then(Value::as_i64).is_some());
                positioned.sort_by_key(|e| e.index.as_ref().and_then(Value::as_i64));
                // a repeated position keeps the last row
                positioned.dedup_by(|later, earlier| {
                    if later.index == earlier.index {
                        std::mem::swap(later, earlier);
                        true
                    } else {
                        false
                    }
                });
                self.elements = positioned;
                self.elements.extend(unpositioned);
            }
        }
    }

    /// Finishes a read: applies queued operations and marks the collection
    /// initialized. Returns `true` when no additions were queued.
    pub fn end_read(&mut self) -> bool {
        let had_queued_adds = self
            .queued
            .iter()
            .any(|op| matches!(op, QueuedOperation::Add(_)));
        for op in std::mem::take(&mut self.queued) {
            self.apply(op);
        }
        self.reading = false;
        self.initialized = true;
        !had_queued_adds
    }

    /// Abandons an in-flight read; the collection stays uninitialized.
    pub fn abort_read(&mut self) {
        self.reading = false;
        self.elements.clear();
    }

    /// Initializes directly from already-assembled elements (cache hit).
    pub fn initialize_from(&mut self, elements: Vec<CollectionElement>) {
        self.inject(elements);
        self.end_read();
    }

    pub fn add(&mut self, value: AttributeValue) {
        self.queue_or_apply(QueuedOperation::Add(value));
    }

    pub fn remove(&mut self, value: AttributeValue) {
        self.queue_or_apply(QueuedOperation::Remove(value));
    }

    pub fn has_queued_operations(&self) -> bool {
        !self.queued.is_empty()
    }

    fn queue_or_apply(&mut self, op: QueuedOperation) {
        if self.initialized {
            self.apply(op);
        } else {
            self.queued.push(op);
        }
    }

    fn apply(&mut self, op: QueuedOperation) {
        match op {
            QueuedOperation::Add(value) => {
                if self.kind() == CollectionKind::Set && self.contains(&value) {
                    return;
                }
                let index = match self.kind() {
                    CollectionKind::List | CollectionKind::Array => {
                        Some(Value::Integer(self.elements.len() as i64))
                    }
                    _ => None,
                };
                self.elements.push(CollectionElement::new(index, value));
            }
            QueuedOperation::Remove(value) => {
                if let Some(pos) = self.elements.iter().position(|e| e.value == value) {
                    self.elements.remove(pos);
                }
            }
        }
    }
}

/// Shared handle to a persistent collection.
#[derive(Clone)]
pub struct CollectionRef(Arc<RwLock<PersistentCollection>>);

impl CollectionRef {
    pub fn new(collection: PersistentCollection) -> Self {
        Self(Arc::new(RwLock::new(collection)))
    }

    pub fn ptr_eq(&self, other: &CollectionRef) -> bool {
        Arc::ptr_eq(&self.0, &other.0)
    }

    pub fn read(&self) -> Result<RwLockReadGuard<'_, PersistentCollection>> {
        Ok(self.0.read()?)
    }

    pub fn write(&self) -> Result<RwLockWriteGuard<'_, PersistentCollection>> {
        Ok(self.0.write()?)
    }

    pub fn is_initialized(&self) -> Result<bool> {
        Ok(self.read()?.is_initialized())
    }

    pub fn len(&self) -> Result<usize> {
        Ok(self.read()?.len())
    }

    pub fn values(&self) -> Result<Vec<AttributeValue>> {
        Ok(self.read()?.values())
    }
}

impl fmt::Debug for CollectionRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.0.try_read() {
            Ok(c) if c.is_initialized() => {
                write!(f, "CollectionRef({}, {} elements)", c.key(), c.len())
            }
            Ok(c) => write!(f, "CollectionRef({}, uninitialized)", c.key()),
            Err(_) => write!(f, "CollectionRef(<locked>)"),
        }
    }
}
