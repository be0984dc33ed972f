use std::cmp::Ordering;
use std::fmt;
use std::sync::Arc;

use log::{debug, trace, warn};

use super::{CacheEntryStructure, CacheItem, CacheKey, CacheRegion, CollectionCacheEntry, EntityCacheEntry};
use crate::core::{CollectionKey, EntityKey, Identifier, Result, Value};
use crate::metamodel::Metamodel;

/// Read-through / write-through access to the second-level cache.
///
/// Every region failure is logged and degraded: reads become misses and
/// puts become declined puts. Nothing here fails a row.
#[derive(Clone)]
pub struct CacheBridge {
    region: Arc<dyn CacheRegion>,
    metamodel: Arc<Metamodel>,
    structure: CacheEntryStructure,
}

impl CacheBridge {
    pub fn new(region: Arc<dyn CacheRegion>, metamodel: Arc<Metamodel>) -> Self {
        Self {
            region,
            metamodel,
            structure: CacheEntryStructure::default(),
        }
    }

    pub fn with_structure(mut self, structure: CacheEntryStructure) -> Self {
        self.structure = structure;
        self
    }

    pub fn region(&self) -> &Arc<dyn CacheRegion> {
        &self.region
    }

    pub fn structure(&self) -> CacheEntryStructure {
        self.structure
    }

    pub fn generate_cache_key(id: &Identifier, entity_or_role: &str, tenant: Option<&str>) -> CacheKey {
        CacheKey::entity(id, entity_or_role, tenant)
    }

    pub fn entity_cache_key(key: &EntityKey, tenant: Option<&str>) -> CacheKey {
        CacheKey::entity(key.identifier(), key.entity_name(), tenant)
    }

    pub fn collection_cache_key(key: &CollectionKey, tenant: Option<&str>) -> CacheKey {
        CacheKey::collection(key.owner_identifier(), key.role(), tenant)
    }

    // ------------------------------------------------------------------
    // Entities
    // ------------------------------------------------------------------

    pub fn get_entity(&self, key: &CacheKey) -> Option<EntityCacheEntry> {
        let item = self.region_get(key)?;
        match self.structure.decode_entity(&item.payload, &self.metamodel) {
            Ok(entry) => {
                trace!("Second-level cache hit: {}", key);
                Some(entry)
            }
            Err(err) => {
                warn!("Unreadable entry in region '{}' for {}: {}", self.region.name(), key, err);
                None
            }
        }
    }

    /// Caches state just read from the database. Returns whether the entry
    /// was stored.
    pub fn put_from_load(&self, key: CacheKey, entry: &EntityCacheEntry, version: Option<Value>, minimal_puts: bool) -> bool {
        let payload = match self.structure.encode_entity(entry, &self.metamodel) {
            Ok(payload) => payload,
            Err(err) => {
                warn!("Unable to disassemble {} for caching: {}", key, err);
                return false;
            }
        };
        self.put_item(key, CacheItem::new(payload, version), minimal_puts, true)
    }

    /// Caches state of an entity inserted earlier in the same transaction.
    pub fn update(&self, key: CacheKey, entry: &EntityCacheEntry, version: Option<Value>) -> bool {
        let payload = match self.structure.encode_entity(entry, &self.metamodel) {
            Ok(payload) => payload,
            Err(err) => {
                warn!("Unable to disassemble {} for caching: {}", key, err);
                return false;
            }
        };
        self.put_item(key, CacheItem::new(payload, version), false, false)
    }

    pub fn evict(&self, key: &CacheKey) {
        if let Err(err) = self.region.evict(key) {
            warn!("Unable to evict {} from region '{}': {}", key, self.region.name(), err);
        }
    }

    // ------------------------------------------------------------------
    // Collections
    // ------------------------------------------------------------------

    pub fn get_collection(&self, key: &CacheKey) -> Option<CollectionCacheEntry> {
        let item = self.region_get(key)?;
        match self.structure.decode_collection(&item.payload) {
            Ok(entry) => Some(entry),
            Err(err) => {
                warn!("Unreadable collection entry for {}: {}", key, err);
                None
            }
        }
    }

    pub fn put_collection_from_load(&self, key: CacheKey, entry: &CollectionCacheEntry, version: Option<Value>, minimal_puts: bool) -> bool {
        let payload = match self.structure.encode_collection(entry) {
            Ok(payload) => payload,
            Err(err) => {
                warn!("Unable to disassemble collection {} for caching: {}", key, err);
                return false;
            }
        };
        self.put_item(key, CacheItem::new(payload, version), minimal_puts, true)
    }

    // ------------------------------------------------------------------
    // Natural ids
    // ------------------------------------------------------------------

    pub fn put_natural_id(&self, root_entity: &str, natural_id: &[Value], id: &Identifier, tenant: Option<&str>) -> bool {
        let key = CacheKey::natural_id(natural_id, root_entity, tenant);
        let payload = match rmp_serde::to_vec(id) {
            Ok(payload) => payload,
            Err(err) => {
                warn!("Unable to encode natural id resolution {}: {}", key, err);
                return false;
            }
        };
        self.put_item(key, CacheItem::new(payload, None), false, false)
    }

    pub fn get_natural_id(&self, root_entity: &str, natural_id: &[Value], tenant: Option<&str>) -> Option<Identifier> {
        let key = CacheKey::natural_id(natural_id, root_entity, tenant);
        let item = self.region_get(&key)?;
        match rmp_serde::from_slice(&item.payload) {
            Ok(id) => Some(id),
            Err(err) => {
                warn!("Unreadable natural id resolution {}: {}", key, err);
                None
            }
        }
    }

    // ------------------------------------------------------------------
    // Region access
    // ------------------------------------------------------------------

    fn region_get(&self, key: &CacheKey) -> Option<CacheItem> {
        match self.region.get(key) {
            Ok(item) => item,
            Err(err) => {
                debug!("Cache region '{}' get failed for {}; treating as miss: {}", self.region.name(), key, err);
                None
            }
        }
    }

    fn put_item(&self, key: CacheKey, item: CacheItem, minimal_puts: bool, check_version: bool) -> bool {
        match self.try_put(&key, item, minimal_puts, check_version) {
            Ok(stored) => {
                if stored {
                    debug!("Cached {} in region '{}'", key, self.region.name());
                } else {
                    debug!("Cache put declined for {}", key);
                }
                stored
            }
            Err(err) => {
                warn!("Cache region '{}' put failed for {}; not cached: {}", self.region.name(), key, err);
                false
            }
        }
    }

    fn try_put(&self, key: &CacheKey, item: CacheItem, minimal_puts: bool, check_version: bool) -> Result<bool> {
        if self.region.is_locked(key)? {
            trace!("Key {} is locked for invalidation", key);
            return Ok(false);
        }
        if minimal_puts && self.region.contains(key)? {
            trace!("Key {} already cached (minimal puts)", key);
            return Ok(false);
        }
        if check_version {
            let cached = self.region.get(key)?;
            if is_newer(cached.and_then(|c| c.version).as_ref(), item.version.as_ref()) {
                trace!("Cached version of {} is newer", key);
                return Ok(false);
            }
        }
        self.region.put(key.clone(), item)?;
        Ok(true)
    }
}

fn is_newer(cached: Option<&Value>, incoming: Option<&Value>) -> bool {
    match (cached, incoming) {
        (Some(cached), Some(incoming)) => {
            matches!(cached.compare(incoming), Ok(Ordering::Greater))
        }
        _ => false,
    }
}

impl fmt::Debug for CacheBridge {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CacheBridge")
            .field("region", &self.region.name())
            .field("structure", &self.structure)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::{CacheRegionConfig, CachedValue, LruCacheRegion};
    use crate::core::{DataType, LoadError};
    use crate::metamodel::EntityDefinition;

    fn bridge() -> (CacheBridge, Arc<LruCacheRegion>) {
        let metamodel = Metamodel::builder()
            .entity(
                EntityDefinition::new("Customer")
                    .identifier("id", DataType::Integer)
                    .basic("name", DataType::Text),
            )
            .build()
            .unwrap();
        let region = Arc::new(LruCacheRegion::new(CacheRegionConfig::new("entities")).unwrap());
        (CacheBridge::new(region.clone(), metamodel), region)
    }

    fn entry(name: &str) -> EntityCacheEntry {
        EntityCacheEntry {
            subclass: "Customer".into(),
            version: None,
            state: vec![CachedValue::Basic(Value::from(name))],
        }
    }

    fn key() -> CacheKey {
        CacheBridge::generate_cache_key(&Identifier::from(1), "Customer", None)
    }

    #[test]
    fn test_put_from_load_then_get() {
        let (bridge, _) = bridge();
        assert!(bridge.put_from_load(key(), &entry("Ann"), None, false));
        assert_eq!(bridge.get_entity(&key()), Some(entry("Ann")));
    }

    #[test]
    fn test_minimal_puts_keep_existing_entry() {
        let (bridge, _) = bridge();
        assert!(bridge.put_from_load(key(), &entry("Ann"), None, true));
        assert!(!bridge.put_from_load(key(), &entry("Bob"), None, true));
        assert_eq!(bridge.get_entity(&key()), Some(entry("Ann")));
    }

    #[test]
    fn test_newer_cached_version_wins() {
        let (bridge, _) = bridge();
        assert!(bridge.put_from_load(key(), &entry("v5"), Some(Value::Integer(5)), false));
        assert!(!bridge.put_from_load(key(), &entry("v4"), Some(Value::Integer(4)), false));
        assert!(bridge.put_from_load(key(), &entry("v6"), Some(Value::Integer(6)), false));
    }

    #[test]
    fn test_locked_key_declines_put_and_update() {
        let (bridge, region) = bridge();
        let token = region.lock(&key()).unwrap();
        assert!(!bridge.put_from_load(key(), &entry("Ann"), None, false));
        assert!(!bridge.update(key(), &entry("Ann"), None));
        region.unlock(token).unwrap();
        assert!(bridge.update(key(), &entry("Ann"), None));
    }

    struct BrokenRegion;

    impl CacheRegion for BrokenRegion {
        fn name(&self) -> &str {
            "broken"
        }
        fn get(&self, _: &CacheKey) -> Result<Option<CacheItem>> {
            Err(LoadError::Cache("unavailable".into()))
        }
        fn put(&self, _: CacheKey, _: CacheItem) -> Result<()> {
            Err(LoadError::Cache("unavailable".into()))
        }
        fn contains(&self, _: &CacheKey) -> Result<bool> {
            Err(LoadError::Cache("unavailable".into()))
        }
        fn evict(&self, _: &CacheKey) -> Result<()> {
            Err(LoadError::Cache("unavailable".into()))
        }
        fn lock(&self, _: &CacheKey) -> Result<crate::cache::LockToken> {
            Err(LoadError::Cache("unavailable".into()))
        }
        fn unlock(&self, _: crate::cache::LockToken) -> Result<()> {
            Ok(())
        }
        fn is_locked(&self, _: &CacheKey) -> Result<bool> {
            Ok(false)
        }
        fn clear(&self) -> Result<()> {
            Ok(())
        }
    }

    #[test]
    fn test_region_failures_degrade() {
        let (healthy, _) = bridge();
        let bridge = CacheBridge::new(Arc::new(BrokenRegion), healthy.metamodel.clone());
        assert!(bridge.get_entity(&key()).is_none());
        assert!(!bridge.put_from_load(key(), &entry("Ann"), None, false));
        assert!(bridge.get_natural_id("Customer", &[Value::from("x")], None).is_none());
        bridge.evict(&key());
    }

    #[test]
    fn test_natural_id_round_trip() {
        let (bridge, _) = bridge();
        assert!(bridge.put_natural_id("Customer", &[Value::from("ann@x")], &Identifier::from(7), Some("t")));
        assert_eq!(
            bridge.get_natural_id("Customer", &[Value::from("ann@x")], Some("t")),
            Some(Identifier::from(7))
        );
        assert!(bridge.get_natural_id("Customer", &[Value::from("ann@x")], None).is_none());
    }
}
