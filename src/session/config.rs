use serde::{Deserialize, Serialize};

use crate::core::{LoadError, Result};

/// How a session interacts with the second-level cache.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CacheMode {
    /// Read from and write to the cache.
    #[default]
    Normal,
    /// Read only; never put.
    Get,
    /// Write only; never read.
    Put,
    /// Write only, ignoring minimal puts.
    Refresh,
    Ignore,
}

impl CacheMode {
    pub fn is_get_enabled(&self) -> bool {
        matches!(self, Self::Normal | Self::Get)
    }

    pub fn is_put_enabled(&self) -> bool {
        matches!(self, Self::Normal | Self::Put | Self::Refresh)
    }
}

/// Lock level requested for, or held on, a loaded entity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LockMode {
    #[default]
    None,
    Read,
    Optimistic,
    PessimisticWrite,
}

impl LockMode {
    pub fn at_least(&self, other: LockMode) -> bool {
        *self >= other
    }
}

/// Session-wide settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SessionConfig {
    /// Tenant identifier folded into every cache key
    pub tenant: Option<String>,

    pub cache_mode: CacheMode,

    /// Load entities read-only unless a query says otherwise
    pub default_read_only: bool,

    /// Skip cache puts for keys the region already holds
    pub minimal_puts: bool,

    /// Cache entity state keyed by attribute name (JSON) instead of positionally
    pub structured_entries: bool,

    pub batch_fetch_enabled: bool,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            tenant: None,
            cache_mode: CacheMode::Normal,
            default_read_only: false,
            minimal_puts: false,
            structured_entries: false,
            batch_fetch_enabled: true,
        }
    }
}

impl SessionConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn tenant(mut self, tenant: &str) -> Self {
        self.tenant = Some(tenant.to_string());
        self
    }

    pub fn cache_mode(mut self, mode: CacheMode) -> Self {
        self.cache_mode = mode;
        self
    }

    pub fn default_read_only(mut self, read_only: bool) -> Self {
        self.default_read_only = read_only;
        self
    }

    pub fn minimal_puts(mut self, minimal_puts: bool) -> Self {
        self.minimal_puts = minimal_puts;
        self
    }

    pub fn structured_entries(mut self, structured: bool) -> Self {
        self.structured_entries = structured;
        self
    }

    pub fn batch_fetch_enabled(mut self, enabled: bool) -> Self {
        self.batch_fetch_enabled = enabled;
        self
    }

    /// Minimal puts are ignored while refreshing.
    pub fn effective_minimal_puts(&self) -> bool {
        self.minimal_puts && self.cache_mode != CacheMode::Refresh
    }

    /// Parse from JSON; missing fields keep their defaults.
    ///
    /// ```ignore
    /// let config = SessionConfig::from_json(r#"{"cache_mode": "get", "tenant": "acme"}"#)?;
    /// ```
    pub fn from_json(json: &str) -> Result<Self> {
        let config: Self = serde_json::from_str(json)
            .map_err(|e| LoadError::Config(format!("Invalid session config: {}", e)))?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        if matches!(&self.tenant, Some(t) if t.trim().is_empty()) {
            return Err(LoadError::Config("Tenant cannot be blank".to_string()));
        }
        Ok(())
    }
}

/// Per-query processing options
#[derive(Debug, Clone, Default)]
pub struct ProcessingOptions {
    /// Overrides the session default when set
    pub read_only: Option<bool>,

    pub lock_mode: LockMode,

    /// Commit a loading collection as soon as its key stops appearing,
    /// instead of at the end of the result set (rows ordered by owner)
    pub commit_collections_on_key_change: bool,

    /// Drop repeated entity results (same instance on several rows)
    pub unique_results: bool,
}

impl ProcessingOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn read_only(mut self, read_only: bool) -> Self {
        self.read_only = Some(read_only);
        self
    }

    pub fn lock_mode(mut self, lock_mode: LockMode) -> Self {
        self.lock_mode = lock_mode;
        self
    }

    pub fn commit_collections_on_key_change(mut self, enabled: bool) -> Self {
        self.commit_collections_on_key_change = enabled;
        self
    }

    pub fn unique_results(mut self, unique: bool) -> Self {
        self.unique_results = unique;
        self
    }
}
