//! Access token storage.

use std::sync::{PoisonError, RwLock};

/// Source of the bearer token used to authorize the realtime connection
/// and the HTTP polls.
pub trait TokenStore: Send + Sync {
    /// Returns the current token, if any.
    fn token(&self) -> Option<String>;
}

/// In-memory token store. Rotating the token here does not affect
/// connections that already read it.
#[derive(Debug, Default)]
pub struct MemoryTokenStore {
    token: RwLock<Option<String>>,
}

impl MemoryTokenStore {
    pub fn new(token: Option<String>) -> Self {
        Self {
            token: RwLock::new(token.filter(|token| !token.is_empty())),
        }
    }

    /// Stores a new token.
    pub fn set(&self, token: impl Into<String>) {
        *self.token.write().unwrap_or_else(PoisonError::into_inner) = Some(token.into());
    }

    /// Forgets the token.
    pub fn clear(&self) {
        *self.token.write().unwrap_or_else(PoisonError::into_inner) = None;
    }
}

impl TokenStore for MemoryTokenStore {
    fn token(&self) -> Option<String> {
        self.token
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }
}
