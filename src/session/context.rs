use std::collections::{HashMap, HashSet};

use log::trace;

use super::{AttributeValue, BatchFetchQueue, CollectionRef, EntityRef, LockMode};
use crate::core::{CollectionKey, EntityKey, Identifier, Value};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EntityStatus {
    Loading,
    Managed,
    ReadOnly,
    Deleted,
    Gone,
}

/// Bookkeeping kept next to every instance in the identity map.
#[derive(Debug, Clone)]
pub struct EntityEntry {
    pub status: EntityStatus,
    /// Snapshot for dirty checking; absent for read-only entities.
    pub loaded_state: Option<Vec<AttributeValue>>,
    pub id: Identifier,
    pub version: Option<Value>,
    pub row_id: Option<Value>,
    pub lock_mode: LockMode,
    /// Concrete entity name.
    pub entity_name: String,
}

impl EntityEntry {
    pub fn loading(entity_name: impl Into<String>, id: Identifier) -> Self {
        Self {
            status: EntityStatus::Loading,
            loaded_state: None,
            id,
            version: None,
            row_id: None,
            lock_mode: LockMode::None,
            entity_name: entity_name.into(),
        }
    }

    pub fn is_read_only(&self) -> bool {
        self.status == EntityStatus::ReadOnly
    }
}

#[derive(Debug, Clone)]
pub struct CollectionEntry {
    pub key: CollectionKey,
    pub initialized: bool,
}

/// Session-scoped identity map. One instance per entity key; single
/// writer, mutated through `&mut`.
#[derive(Debug, Default)]
pub struct PersistenceContext {
    entities: HashMap<EntityKey, EntityRef>,
    entries: HashMap<EntityKey, EntityEntry>,
    proxies: HashMap<EntityKey, EntityRef>,
    collections: HashMap<CollectionKey, CollectionRef>,
    collection_entries: HashMap<CollectionKey, CollectionEntry>,
    natural_ids: HashMap<(String, Vec<Value>), Identifier>,
    inserted: HashSet<EntityKey>,
    batch_fetch_queue: BatchFetchQueue,
}

impl PersistenceContext {
    pub fn new() -> Self {
        Self::default()
    }

    // ------------------------------------------------------------------
    // Entities
    // ------------------------------------------------------------------

    pub fn find_entity(&self, key: &EntityKey) -> Option<EntityRef> {
        self.entities.get(key).cloned()
    }

    pub fn contains_entity(&self, key: &EntityKey) -> bool {
        self.entities.contains_key(key)
    }

    pub fn add_entity(&mut self, key: EntityKey, instance: EntityRef) {
        self.entities.insert(key, instance);
    }

    pub fn add_entry(&mut self, key: EntityKey, entry: EntityEntry) {
        self.entries.insert(key, entry);
    }

    /// Adds instance and entry together; a proxy registered for the key is
    /// superseded.
    pub fn register_entity(&mut self, key: EntityKey, instance: EntityRef, entry: EntityEntry) {
        trace!("Registering entity {} with status {:?}", key, entry.status);
        self.proxies.remove(&key);
        self.add_entity(key.clone(), instance);
        self.add_entry(key, entry);
    }

    pub fn entry(&self, key: &EntityKey) -> Option<&EntityEntry> {
        self.entries.get(key)
    }

    pub fn entry_mut(&mut self, key: &EntityKey) -> Option<&mut EntityEntry> {
        self.entries.get_mut(key)
    }

    pub fn remove_entity(&mut self, key: &EntityKey) -> Option<EntityRef> {
        self.entries.remove(key);
        self.entities.remove(key)
    }

    pub fn entity_count(&self) -> usize {
        self.entities.len()
    }

    // ------------------------------------------------------------------
    // Proxies
    // ------------------------------------------------------------------

    pub fn find_proxy(&self, key: &EntityKey) -> Option<EntityRef> {
        self.proxies.get(key).cloned()
    }

    pub fn add_proxy(&mut self, key: EntityKey, proxy: EntityRef) {
        self.proxies.insert(key, proxy);
    }

    pub fn proxy_count(&self) -> usize {
        self.proxies.len()
    }

    // ------------------------------------------------------------------
    // Collections
    // ------------------------------------------------------------------

    pub fn find_collection(&self, key: &CollectionKey) -> Option<CollectionRef> {
        self.collections.get(key).cloned()
    }

    pub fn register_collection(&mut self, key: CollectionKey, collection: CollectionRef, initialized: bool) {
        trace!("Registering collection {} (initialized: {})", key, initialized);
        self.collection_entries.insert(
            key.clone(),
            CollectionEntry {
                key: key.clone(),
                initialized,
            },
        );
        self.collections.insert(key, collection);
    }

    pub fn collection_entry(&self, key: &CollectionKey) -> Option<&CollectionEntry> {
        self.collection_entries.get(key)
    }

    pub fn mark_collection_initialized(&mut self, key: &CollectionKey) {
        if let Some(entry) = self.collection_entries.get_mut(key) {
            entry.initialized = true;
        }
    }

    pub fn collection_count(&self) -> usize {
        self.collections.len()
    }

    // ------------------------------------------------------------------
    // Natural ids
    // ------------------------------------------------------------------

    pub fn cache_natural_id_resolution(&mut self, root_entity: &str, natural_id: Vec<Value>, id: Identifier) {
        self.natural_ids.insert((root_entity.to_string(), natural_id), id);
    }

    pub fn find_natural_id_resolution(&self, root_entity: &str, natural_id: &[Value]) -> Option<&Identifier> {
        self.natural_ids.get(&(root_entity.to_string(), natural_id.to_vec()))
    }

    // ------------------------------------------------------------------
    // Transaction markers
    // ------------------------------------------------------------------

    /// Records that the entity was inserted earlier in the current
    /// transaction, so a later load updates the cache instead of putting.
    pub fn mark_inserted(&mut self, key: EntityKey) {
        self.inserted.insert(key);
    }

    pub fn was_inserted_during_transaction(&self, key: &EntityKey) -> bool {
        self.inserted.contains(key)
    }

    pub fn batch_fetch_queue(&self) -> &BatchFetchQueue {
        &self.batch_fetch_queue
    }

    pub fn batch_fetch_queue_mut(&mut self) -> &mut BatchFetchQueue {
        &mut self.batch_fetch_queue
    }

    pub fn clear(&mut self) {
        self.entities.clear();
        self.entries.clear();
        self.proxies.clear();
        self.collections.clear();
        self.collection_entries.clear();
        self.natural_ids.clear();
        self.inserted.clear();
        self.batch_fetch_queue.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::DataType;
    use crate::metamodel::{EntityDefinition, Metamodel};
    use crate::session::EntityInstance;

    fn customer_ref(id: i64) -> EntityRef {
        let metamodel = Metamodel::builder()
            .entity(EntityDefinition::new("Customer").identifier("id", DataType::Integer))
            .build()
            .unwrap();
        let descriptor = metamodel.entity("Customer").unwrap().clone();
        EntityRef::new(EntityInstance::new(descriptor, Identifier::from(id)))
    }

    #[test]
    fn test_register_supersedes_proxy() {
        let mut context = PersistenceContext::new();
        let key = EntityKey::new(Identifier::from(1), "Customer");
        let proxy = customer_ref(1);
        context.add_proxy(key.clone(), proxy.clone());

        context.register_entity(key.clone(), proxy.clone(), EntityEntry::loading("Customer", Identifier::from(1)));

        assert!(context.find_proxy(&key).is_none());
        assert!(context.find_entity(&key).unwrap().ptr_eq(&proxy));
        assert_eq!(context.entry(&key).unwrap().status, EntityStatus::Loading);
    }

    #[test]
    fn test_natural_id_resolution() {
        let mut context = PersistenceContext::new();
        context.cache_natural_id_resolution("Customer", vec![Value::from("ann@x")], Identifier::from(4));

        assert_eq!(
            context.find_natural_id_resolution("Customer", &[Value::from("ann@x")]),
            Some(&Identifier::from(4))
        );
        assert!(context.find_natural_id_resolution("Order", &[Value::from("ann@x")]).is_none());
    }
}
