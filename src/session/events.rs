use std::collections::{HashMap, HashSet};
use std::fmt;
use std::sync::Arc;

use super::EntityRef;
use crate::core::{Identifier, Result};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoadEventKind {
    PreLoad,
    PostLoad,
}

/// Payload handed to load listeners.
#[derive(Debug, Clone)]
pub struct LoadEvent {
    pub kind: LoadEventKind,
    /// Concrete entity name
    pub entity_name: String,
    pub id: Identifier,
    pub instance: EntityRef,
    /// The state came from the second-level cache rather than a row
    pub from_cache: bool,
}

/// Pre-load / post-load hooks. Both default to no-ops; an error aborts the
/// current row.
pub trait LoadEventListener: Send + Sync {
    fn on_pre_load(&self, _event: &LoadEvent) -> Result<()> {
        Ok(())
    }

    fn on_post_load(&self, _event: &LoadEvent) -> Result<()> {
        Ok(())
    }
}

/// An enabled query filter. Opaque apart from the roles it restricts.
pub trait FilterPredicate: Send + Sync {
    fn name(&self) -> &str;

    /// Whether the filter changes which elements of `role` are loaded.
    fn affects_role(&self, role: &str) -> bool;
}

/// Filter restricting a fixed set of collection roles.
#[derive(Debug, Clone)]
pub struct RoleFilter {
    name: String,
    roles: HashSet<String>,
}

impl RoleFilter {
    pub fn new(name: impl Into<String>, roles: &[&str]) -> Self {
        Self {
            name: name.into(),
            roles: roles.iter().map(|r| r.to_string()).collect(),
        }
    }
}

impl FilterPredicate for RoleFilter {
    fn name(&self) -> &str {
        &self.name
    }

    fn affects_role(&self, role: &str) -> bool {
        self.roles.contains(role)
    }
}

/// Query-time influences on loading: currently the enabled filters.
#[derive(Default, Clone)]
pub struct LoadQueryInfluencers {
    filters: HashMap<String, Arc<dyn FilterPredicate>>,
}

impl LoadQueryInfluencers {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn enable_filter(&mut self, filter: Arc<dyn FilterPredicate>) {
        self.filters.insert(filter.name().to_string(), filter);
    }

    pub fn disable_filter(&mut self, name: &str) {
        self.filters.remove(name);
    }

    pub fn has_enabled_filters(&self) -> bool {
        !self.filters.is_empty()
    }

    pub fn is_affected_by_enabled_filters(&self, role: &str) -> bool {
        self.filters.values().any(|f| f.affects_role(role))
    }
}

impl fmt::Debug for LoadQueryInfluencers {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut names: Vec<&String> = self.filters.keys().collect();
        names.sort();
        f.debug_struct("LoadQueryInfluencers").field("filters", &names).finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_filters_affect_named_roles_only() {
        let mut influencers = LoadQueryInfluencers::new();
        assert!(!influencers.has_enabled_filters());

        influencers.enable_filter(Arc::new(RoleFilter::new("active", &["Customer.orders"])));
        assert!(influencers.is_affected_by_enabled_filters("Customer.orders"));
        assert!(!influencers.is_affected_by_enabled_filters("Customer.tags"));

        influencers.disable_filter("active");
        assert!(!influencers.is_affected_by_enabled_filters("Customer.orders"));
    }
}
