use std::collections::HashMap;
use std::fmt;
use std::num::NonZeroUsize;
use std::sync::Mutex;

use chrono::{DateTime, Duration, Utc};
use lru::LruCache;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::core::{Identifier, LoadError, Result, Value};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum CacheKeyKind {
    Entity,
    Collection,
    NaturalId,
}

/// Region key: kind, entity or role name, identifying values and tenant.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct CacheKey {
    kind: CacheKeyKind,
    type_name: String,
    id: Vec<Value>,
    tenant: Option<String>,
}

impl CacheKey {
    pub fn new(kind: CacheKeyKind, type_name: impl Into<String>, id: Vec<Value>, tenant: Option<&str>) -> Self {
        Self {
            kind,
            type_name: type_name.into(),
            id,
            tenant: tenant.map(str::to_string),
        }
    }

    pub fn entity(id: &Identifier, root_entity: &str, tenant: Option<&str>) -> Self {
        Self::new(CacheKeyKind::Entity, root_entity, id.values().to_vec(), tenant)
    }

    pub fn collection(owner: &Identifier, role: &str, tenant: Option<&str>) -> Self {
        Self::new(CacheKeyKind::Collection, role, owner.values().to_vec(), tenant)
    }

    pub fn natural_id(values: &[Value], root_entity: &str, tenant: Option<&str>) -> Self {
        Self::new(CacheKeyKind::NaturalId, root_entity, values.to_vec(), tenant)
    }

    pub fn kind(&self) -> CacheKeyKind {
        self.kind
    }

    pub fn type_name(&self) -> &str {
        &self.type_name
    }

    pub fn id(&self) -> &[Value] {
        &self.id
    }

    pub fn tenant(&self) -> Option<&str> {
        self.tenant.as_deref()
    }
}

impl fmt::Display for CacheKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let id: Vec<String> = self.id.iter().map(Value::to_literal).collect();
        write!(f, "{:?}:{}#{}", self.kind, self.type_name, id.join(","))?;
        if let Some(tenant) = &self.tenant {
            write!(f, "@{}", tenant)?;
        }
        Ok(())
    }
}

/// Serialized entry plus the metadata the bridge needs for put decisions.
#[derive(Debug, Clone, PartialEq)]
pub struct CacheItem {
    pub payload: Vec<u8>,
    pub version: Option<Value>,
    pub timestamp: DateTime<Utc>,
}

impl CacheItem {
    pub fn new(payload: Vec<u8>, version: Option<Value>) -> Self {
        Self {
            payload,
            version,
            timestamp: Utc::now(),
        }
    }
}

/// Proof of an invalidation lock; hand it back to unlock.
#[derive(Debug, Clone, PartialEq)]
pub struct LockToken {
    pub key: CacheKey,
    pub id: Uuid,
    pub acquired: DateTime<Utc>,
}

/// Second-level cache backend. Shared across sessions and internally
/// synchronized.
pub trait CacheRegion: Send + Sync {
    fn name(&self) -> &str;

    fn get(&self, key: &CacheKey) -> Result<Option<CacheItem>>;

    fn put(&self, key: CacheKey, item: CacheItem) -> Result<()>;

    fn contains(&self, key: &CacheKey) -> Result<bool>;

    fn evict(&self, key: &CacheKey) -> Result<()>;

    /// Takes an invalidation lock: the entry is dropped and puts for the
    /// key are refused until unlocked or the lock times out.
    fn lock(&self, key: &CacheKey) -> Result<LockToken>;

    fn unlock(&self, token: LockToken) -> Result<()>;

    fn is_locked(&self, key: &CacheKey) -> Result<bool>;

    fn clear(&self) -> Result<()>;
}

#[derive(Debug, Clone)]
pub struct CacheRegionConfig {
    /// Region name, used in logs
    pub name: String,

    /// Maximum number of items held
    pub capacity: usize,

    /// Invalidation locks older than this are ignored
    pub lock_timeout: Duration,
}

impl CacheRegionConfig {
    pub fn new(name: &str) -> Self {
        Self {
            name: name.to_string(),
            capacity: 1024,
            lock_timeout: Duration::seconds(60),
        }
    }

    pub fn capacity(mut self, capacity: usize) -> Self {
        self.capacity = capacity;
        self
    }

    pub fn lock_timeout(mut self, timeout: Duration) -> Self {
        self.lock_timeout = timeout;
        self
    }

    pub fn validate(&self) -> Result<()> {
        if self.name.trim().is_empty() {
            return Err(LoadError::Config("Region name cannot be empty".to_string()));
        }
        if self.capacity == 0 {
            return Err(LoadError::Config("Region capacity must be > 0".to_string()));
        }
        Ok(())
    }
}

/// In-memory region: an LRU map plus a table of invalidation locks.
pub struct LruCacheRegion {
    config: CacheRegionConfig,
    state: Mutex<RegionState>,
}

/// Items and locks share one guard so a put never lands under a lock taken
/// between its check and its insert.
struct RegionState {
    items: LruCache<CacheKey, CacheItem>,
    locks: HashMap<CacheKey, LockToken>,
}

impl RegionState {
    fn is_locked(&mut self, key: &CacheKey, timeout: Duration) -> bool {
        match self.locks.get(key) {
            Some(token) if Utc::now() - token.acquired > timeout => {
                self.locks.remove(key);
                false
            }
            Some(_) => true,
            None => false,
        }
    }
}

impl LruCacheRegion {
    pub fn new(config: CacheRegionConfig) -> Result<Self> {
        config.validate()?;
        let capacity = NonZeroUsize::new(config.capacity)
            .ok_or_else(|| LoadError::Config("Region capacity must be > 0".to_string()))?;
        Ok(Self {
            config,
            state: Mutex::new(RegionState {
                items: LruCache::new(capacity),
                locks: HashMap::new(),
            }),
        })
    }

    pub fn config(&self) -> &CacheRegionConfig {
        &self.config
    }

    pub fn len(&self) -> Result<usize> {
        Ok(self.state.lock()?.items.len())
    }

    pub fn is_empty(&self) -> Result<bool> {
        Ok(self.len()? == 0)
    }
}

impl CacheRegion for LruCacheRegion {
    fn name(&self) -> &str {
        &self.config.name
    }

    fn get(&self, key: &CacheKey) -> Result<Option<CacheItem>> {
        Ok(self.state.lock()?.items.get(key).cloned())
    }

    fn put(&self, key: CacheKey, item: CacheItem) -> Result<()> {
        let mut state = self.state.lock()?;
        if state.is_locked(&key, self.config.lock_timeout) {
            return Err(LoadError::Cache(format!("Key {} is locked", key)));
        }
        state.items.put(key, item);
        Ok(())
    }

    fn contains(&self, key: &CacheKey) -> Result<bool> {
        Ok(self.state.lock()?.items.contains(key))
    }

    fn evict(&self, key: &CacheKey) -> Result<()> {
        self.state.lock()?.items.pop(key);
        Ok(())
    }

    fn lock(&self, key: &CacheKey) -> Result<LockToken> {
        let token = LockToken {
            key: key.clone(),
            id: Uuid::new_v4(),
            acquired: Utc::now(),
        };
        let mut state = self.state.lock()?;
        state.items.pop(key);
        state.locks.insert(key.clone(), token.clone());
        Ok(token)
    }

    fn unlock(&self, token: LockToken) -> Result<()> {
        let mut state = self.state.lock()?;
        match state.locks.get(&token.key) {
            Some(held) if held.id == token.id => {
                state.locks.remove(&token.key);
                Ok(())
            }
            Some(_) => Err(LoadError::Cache(format!(
                "Lock on {} is held by another token",
                token.key
            ))),
            None => Ok(()),
        }
    }

    fn is_locked(&self, key: &CacheKey) -> Result<bool> {
        Ok(self.state.lock()?.is_locked(key, self.config.lock_timeout))
    }

    fn clear(&self) -> Result<()> {
        let mut state = self.state.lock()?;
        state.items.clear();
        state.locks.clear();
        Ok(())
    }
}

impl fmt::Debug for LruCacheRegion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LruCacheRegion")
            .field("name", &self.config.name)
            .field("capacity", &self.config.capacity)
            .finish()
    }
}
