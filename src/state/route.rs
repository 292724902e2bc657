//! Navigation route state.

use std::sync::{Arc, PoisonError, RwLock};

/// Current navigation path, shared between the shell that changes it and
/// the services that read it.
#[derive(Debug, Clone)]
pub struct CurrentRoute {
    path: Arc<RwLock<String>>,
}

impl CurrentRoute {
    pub fn new(path: impl Into<String>) -> Self {
        Self {
            path: Arc::new(RwLock::new(path.into())),
        }
    }

    /// Records a navigation.
    pub fn set(&self, path: impl Into<String>) {
        *self.path.write().unwrap_or_else(PoisonError::into_inner) = path.into();
    }

    /// Returns the current path.
    pub fn get(&self) -> String {
        self.path
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Returns `true` if the current path is `prefix` or one of its
    /// sub-paths. `/chat` matches `/chat`, `/chat/12` and `/chat#top`, not
    /// `/chatter`.
    pub fn is_within(&self, prefix: &str) -> bool {
        let path = self.path.read().unwrap_or_else(PoisonError::into_inner);
        let prefix = prefix.trim_end_matches('/');
        if prefix.is_empty() {
            return true;
        }
        match path.strip_prefix(prefix) {
            Some(rest) => rest.is_empty() || rest.starts_with(&['/', '?', '#'][..]),
            None => false,
        }
    }
}

impl Default for CurrentRoute {
    fn default() -> Self {
        Self::new("/")
    }
}
