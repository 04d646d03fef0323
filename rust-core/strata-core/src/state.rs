//! # Shared State
//!
//! Type-keyed, thread-safe storage for application-wide resources that
//! handlers reach through their context (clients, caches, settings).

use std::any::{Any, TypeId};
use std::collections::HashMap;
use std::sync::{Arc, PoisonError, RwLock};

/// Type-based state storage
///
/// Uses `TypeId` for O(1) lookups without string allocation.
/// Clones share the same storage.
#[derive(Clone, Default)]
pub struct TypeState {
    data: Arc<RwLock<HashMap<TypeId, Box<dyn Any + Send + Sync>>>>,
}

impl TypeState {
    /// Create a new empty type state
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Builder-style `set`
    #[must_use]
    pub fn with<T: Send + Sync + 'static>(self, value: T) -> Self {
        self.set(value);
        self
    }

    /// Store a value by its type, replacing any previous one
    pub fn set<T: Send + Sync + 'static>(&self, value: T) {
        let mut data = self.data.write().unwrap_or_else(PoisonError::into_inner);
        data.insert(TypeId::of::<T>(), Box::new(value));
    }

    /// Get a cloned value by type
    #[must_use]
    pub fn get<T: Clone + Send + Sync + 'static>(&self) -> Option<T> {
        let data = self.data.read().unwrap_or_else(PoisonError::into_inner);
        data.get(&TypeId::of::<T>())
            .and_then(|boxed| boxed.downcast_ref::<T>())
            .cloned()
    }

    /// Check if a type exists
    #[must_use]
    pub fn contains<T: 'static>(&self) -> bool {
        let data = self.data.read().unwrap_or_else(PoisonError::into_inner);
        data.contains_key(&TypeId::of::<T>())
    }

    /// Remove a value by type
    pub fn remove<T: 'static>(&self) -> bool {
        let mut data = self.data.write().unwrap_or_else(PoisonError::into_inner);
        data.remove(&TypeId::of::<T>()).is_some()
    }

    /// Number of stored values
    #[must_use]
    pub fn len(&self) -> usize {
        self.data.read().unwrap_or_else(PoisonError::into_inner).len()
    }

    /// Whether nothing is stored
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl std::fmt::Debug for TypeState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TypeState")
            .field("entries", &self.len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Debug, Clone, PartialEq)]
    struct ApiKey(String);

    #[test]
    fn test_type_state_set_get() {
        let state = TypeState::new();
        state.set(42i32);
        state.set("hello".to_string());

        assert_eq!(state.get::<i32>(), Some(42));
        assert_eq!(state.get::<String>(), Some("hello".to_string()));
        assert_eq!(state.len(), 2);
    }

    #[test]
    fn test_type_state_overwrite() {
        let state = TypeState::new();
        state.set(1i32);
        state.set(2i32);

        assert_eq!(state.get::<i32>(), Some(2));
    }

    #[test]
    fn test_type_state_remove() {
        let state = TypeState::new().with(ApiKey("k".to_string()));
        assert!(state.contains::<ApiKey>());
        assert!(state.remove::<ApiKey>());
        assert!(!state.contains::<ApiKey>());
        assert!(state.is_empty());
    }

    #[test]
    fn test_type_state_shared_between_clones() {
        use std::thread;

        let state = TypeState::new();
        let state_clone = state.clone();

        let handle = thread::spawn(move || {
            state_clone.set(ApiKey("secret".to_string()));
        });

        handle.join().unwrap();
        assert_eq!(state.get::<ApiKey>(), Some(ApiKey("secret".to_string())));
    }
}
