use std::fmt;
use std::hash::{Hash, Hasher};
use std::sync::Arc;

/// Path segment used for the element side of a collection.
pub const ELEMENT_TOKEN: &str = "{element}";

/// Dotted path identifying a position in a fetch graph, e.g.
/// `root.orders.{element}`. Cheap to clone; equality and hashing use the full
/// path only.
#[derive(Clone)]
pub struct NavigablePath {
    inner: Arc<PathNode>,
}

struct PathNode {
    parent: Option<NavigablePath>,
    local_name: String,
    full_path: String,
}

impl NavigablePath {
    pub fn root(name: impl Into<String>) -> Self {
        let name = name.into();
        Self {
            inner: Arc::new(PathNode {
                parent: None,
                full_path: name.clone(),
                local_name: name,
            }),
        }
    }

    pub fn append(&self, name: impl Into<String>) -> Self {
        let local_name = name.into();
        Self {
            inner: Arc::new(PathNode {
                parent: Some(self.clone()),
                full_path: format!("{}.{}", self.inner.full_path, local_name),
                local_name,
            }),
        }
    }

    pub fn element(&self) -> Self {
        self.append(ELEMENT_TOKEN)
    }

    pub fn parent(&self) -> Option<&NavigablePath> {
        self.inner.parent.as_ref()
    }

    pub fn local_name(&self) -> &str {
        &self.inner.local_name
    }

    pub fn full_path(&self) -> &str {
        &self.inner.full_path
    }

    pub fn depth(&self) -> usize {
        let mut depth = 0;
        let mut current = self.parent();
        while let Some(path) = current {
            depth += 1;
            current = path.parent();
        }
        depth
    }

    /// True when `self` is a strict ancestor of `other`.
    pub fn is_parent_of(&self, other: &NavigablePath) -> bool {
        let mut current = other.parent();
        while let Some(path) = current {
            if path == self {
                return true;
            }
            current = path.parent();
        }
        false
    }
}

impl PartialEq for NavigablePath {
    fn eq(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.inner, &other.inner) || self.inner.full_path == other.inner.full_path
    }
}

impl Eq for NavigablePath {}

impl Hash for NavigablePath {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.inner.full_path.hash(state);
    }
}

impl fmt::Debug for NavigablePath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "NavigablePath({})", self.inner.full_path)
    }
}

impl fmt::Display for NavigablePath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.inner.full_path)
    }
}
