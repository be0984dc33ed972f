use std::fmt;

use serde::{Deserialize, Serialize};

use super::Identifier;

/// Identity-map key of an entity. The type component is the hierarchy root so
/// every subtype shares one identity space.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct EntityKey {
    identifier: Identifier,
    entity_name: String,
}

impl EntityKey {
    pub fn new(identifier: Identifier, root_entity_name: impl Into<String>) -> Self {
        Self {
            identifier,
            entity_name: root_entity_name.into(),
        }
    }

    pub fn identifier(&self) -> &Identifier {
        &self.identifier
    }

    pub fn entity_name(&self) -> &str {
        &self.entity_name
    }
}

impl fmt::Display for EntityKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}#{}", self.entity_name, self.identifier)
    }
}

/// Identity-map key of an owned collection: owner identifier plus role.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct CollectionKey {
    role: String,
    owner: Identifier,
}

impl CollectionKey {
    pub fn new(role: impl Into<String>, owner: Identifier) -> Self {
        Self {
            role: role.into(),
            owner,
        }
    }

    pub fn role(&self) -> &str {
        &self.role
    }

    pub fn owner_identifier(&self) -> &Identifier {
        &self.owner
    }
}

impl fmt::Display for CollectionKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}#{}", self.role, self.owner)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    #[test]
    fn test_entity_key_identity() {
        let a = EntityKey::new(Identifier::from(1), "Vehicle");
        let b = EntityKey::new(Identifier::from(1), "Vehicle");
        let c = EntityKey::new(Identifier::from(1), "Customer");

        let set: HashSet<_> = [a.clone(), b, c].into_iter().collect();
        assert_eq!(set.len(), 2);
        assert_eq!(a.to_string(), "Vehicle#1");
    }

    #[test]
    fn test_collection_key_display() {
        let key = CollectionKey::new("Customer.orders", Identifier::from(3));
        assert_eq!(key.to_string(), "Customer.orders#3");
        assert_eq!(key.role(), "Customer.orders");
    }
}
