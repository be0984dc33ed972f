// ============================================================================
// Second-level cache
// ============================================================================
//
// `CacheRegion` is the injected backend; `LruCacheRegion` is the in-memory
// implementation. `CacheBridge` layers load-time put rules on top and turns
// region failures into misses.
//
// ============================================================================

pub mod bridge;
pub mod entry;
pub mod region;

pub use bridge::CacheBridge;
pub use entry::{CacheEntryStructure, CachedValue, CollectionCacheEntry, EntityCacheEntry};
pub use region::{CacheItem, CacheKey, CacheKeyKind, CacheRegion, CacheRegionConfig, LockToken, LruCacheRegion};
