use std::collections::HashMap;

use log::trace;

use crate::core::{CollectionKey, EntityKey, Identifier};

/// Keys of entities and collections referenced but not yet loaded, grouped
/// so a batch loader can fetch several at once.
#[derive(Debug, Default)]
pub struct BatchFetchQueue {
    entity_keys: HashMap<String, Vec<EntityKey>>,
    collection_keys: HashMap<String, Vec<CollectionKey>>,
}

impl BatchFetchQueue {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_batch_loadable_entity_key(&mut self, key: EntityKey) {
        let keys = self.entity_keys.entry(key.entity_name().to_string()).or_default();
        if !keys.contains(&key) {
            trace!("Queued entity for batch fetch: {}", key);
            keys.push(key);
        }
    }

    pub fn remove_batch_loadable_entity_key(&mut self, key: &EntityKey) {
        if let Some(keys) = self.entity_keys.get_mut(key.entity_name()) {
            keys.retain(|k| k != key);
        }
    }

    pub fn contains_entity_key(&self, key: &EntityKey) -> bool {
        self.entity_keys
            .get(key.entity_name())
            .is_some_and(|keys| keys.contains(key))
    }

    /// Up to `max` queued identifiers of the given root entity, oldest first.
    pub fn entity_batch(&self, root_entity: &str, max: usize) -> Vec<Identifier> {
        self.entity_keys
            .get(root_entity)
            .map(|keys| keys.iter().take(max).map(|k| k.identifier().clone()).collect())
            .unwrap_or_default()
    }

    pub fn add_batch_loadable_collection(&mut self, key: CollectionKey) {
        let keys = self.collection_keys.entry(key.role().to_string()).or_default();
        if !keys.contains(&key) {
            trace!("Queued collection for batch fetch: {}", key);
            keys.push(key);
        }
    }

    pub fn remove_batch_loadable_collection(&mut self, key: &CollectionKey) {
        if let Some(keys) = self.collection_keys.get_mut(key.role()) {
            keys.retain(|k| k != key);
        }
    }

    pub fn contains_collection(&self, key: &CollectionKey) -> bool {
        self.collection_keys
            .get(key.role())
            .is_some_and(|keys| keys.contains(key))
    }

    pub fn collection_batch(&self, role: &str, max: usize) -> Vec<Identifier> {
        self.collection_keys
            .get(role)
            .map(|keys| {
                keys.iter()
                    .take(max)
                    .map(|k| k.owner_identifier().clone())
                    .collect()
            })
            .unwrap_or_default()
    }

    pub fn clear(&mut self) {
        self.entity_keys.clear();
        self.collection_keys.clear();
    }
}
