use std::collections::HashMap;
use std::sync::Arc;

use log::{debug, warn};

use super::collection::commit_loading_collection;
use crate::core::{CollectionKey, EntityKey, Result, Value};
use crate::metamodel::{CollectionDescriptor, EntityDescriptor};
use crate::session::{CollectionElement, CollectionRef, EntityRef, Session};

/// An entity instantiated for a key but not yet registered in the identity
/// map.
#[derive(Debug, Clone)]
pub struct LoadingEntityEntry {
    pub key: EntityKey,
    pub concrete: Arc<EntityDescriptor>,
    /// Index of the initializer that will finish the instance
    pub initializer: usize,
    pub instance: EntityRef,
    pub row_id: Option<Value>,
}

/// A collection whose rows are still being read.
#[derive(Debug)]
pub struct LoadingCollectionEntry {
    pub key: CollectionKey,
    pub descriptor: Arc<CollectionDescriptor>,
    pub initializer: usize,
    pub instance: CollectionRef,
    /// Elements in row order, injected on commit
    pub staged: Vec<CollectionElement>,
}

impl LoadingCollectionEntry {
    pub fn new(key: CollectionKey, descriptor: Arc<CollectionDescriptor>, initializer: usize, instance: CollectionRef) -> Self {
        Self {
            key,
            descriptor,
            initializer,
            instance,
            staged: Vec::new(),
        }
    }
}

/// Result-set scoped loading state. Dropping it without `finish_up`
/// abandons every in-flight collection.
#[derive(Debug, Default)]
pub struct LoadContext {
    entities: HashMap<EntityKey, LoadingEntityEntry>,
    collections: HashMap<CollectionKey, LoadingCollectionEntry>,
    collection_order: Vec<CollectionKey>,
    last_collection_keys: HashMap<usize, CollectionKey>,
}

impl LoadContext {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn find_loading_entity(&self, key: &EntityKey) -> Option<&LoadingEntityEntry> {
        self.entities.get(key)
    }

    pub fn register_loading_entity(&mut self, entry: LoadingEntityEntry) {
        self.entities.insert(entry.key.clone(), entry);
    }

    pub fn remove_loading_entity(&mut self, key: &EntityKey) -> Option<LoadingEntityEntry> {
        self.entities.remove(key)
    }

    pub fn find_loading_collection(&self, key: &CollectionKey) -> Option<&LoadingCollectionEntry> {
        self.collections.get(key)
    }

    pub fn loading_collection_mut(&mut self, key: &CollectionKey) -> Option<&mut LoadingCollectionEntry> {
        self.collections.get_mut(key)
    }

    pub fn register_loading_collection(&mut self, entry: LoadingCollectionEntry) {
        self.collection_order.push(entry.key.clone());
        self.collections.insert(entry.key.clone(), entry);
    }

    pub fn take_loading_collection(&mut self, key: &CollectionKey) -> Option<LoadingCollectionEntry> {
        self.collection_order.retain(|k| k != key);
        self.collections.remove(key)
    }

    /// Records `key` as the current key of a collection initializer and
    /// returns the previous one when it differs.
    pub fn swap_last_collection_key(&mut self, initializer: usize, key: &CollectionKey) -> Option<CollectionKey> {
        match self.last_collection_keys.insert(initializer, key.clone()) {
            Some(previous) if &previous != key => Some(previous),
            _ => None,
        }
    }

    pub fn loading_entity_count(&self) -> usize {
        self.entities.len()
    }

    pub fn loading_collection_count(&self) -> usize {
        self.collections.len()
    }

    /// Commits every loading collection in the order it was first seen.
    pub fn finish_up(&mut self, session: &mut Session) -> Result<usize> {
        let mut committed = 0;
        for key in std::mem::take(&mut self.collection_order) {
            if let Some(entry) = self.collections.remove(&key) {
                commit_loading_collection(entry, session)?;
                committed += 1;
            }
        }
        self.last_collection_keys.clear();
        if !self.entities.is_empty() {
            warn!("{} entities were still loading at end of results", self.entities.len());
            self.entities.clear();
        }
        Ok(committed)
    }

    /// Abandons all in-flight loading state. Collections go back to "not
    /// being read"; nothing is published.
    pub fn discard(&mut self) {
        if self.collections.is_empty() && self.entities.is_empty() {
            return;
        }
        debug!(
            "Discarding {} loading entities and {} loading collections",
            self.entities.len(),
            self.collections.len()
        );
        for (key, entry) in self.collections.drain() {
            match entry.instance.write() {
                Ok(mut collection) => collection.abort_read(),
                Err(err) => warn!("Unable to reset loading collection {}: {}", key, err),
            }
        }
        self.collection_order.clear();
        self.last_collection_keys.clear();
        self.entities.clear();
    }
}

impl Drop for LoadContext {
    fn drop(&mut self) {
        self.discard();
    }
}
