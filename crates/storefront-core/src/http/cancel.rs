use std::collections::HashMap;
use std::sync::Mutex;

use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use crate::utils::lock;

/// Live cancellation handles keyed by caller-supplied request id.
///
/// Registering an id that is still live replaces the previous handle (last write wins); the
/// replaced request can then no longer be cancelled by id.
#[derive(Debug, Default)]
pub(crate) struct CancellationRegistry {
    inner: Mutex<RegistryState>,
}

#[derive(Debug, Default)]
struct RegistryState {
    next_generation: u64,
    handles: HashMap<String, (u64, CancellationToken)>,
}

/// Removes its handle from the registry once the request settles or is dropped.
pub(crate) struct Registration<'a> {
    registry: &'a CancellationRegistry,
    id: String,
    generation: u64,
    token: CancellationToken,
}

impl Registration<'_> {
    pub fn token(&self) -> &CancellationToken {
        &self.token
    }
}

impl Drop for Registration<'_> {
    fn drop(&mut self) {
        self.registry.remove(&self.id, self.generation);
    }
}

impl CancellationRegistry {
    pub fn register(&self, id: &str) -> Registration<'_> {
        let token = CancellationToken::new();
        let mut state = lock(&self.inner);
        state.next_generation += 1;
        let generation = state.next_generation;
        if state
            .handles
            .insert(id.to_owned(), (generation, token.clone()))
            .is_some()
        {
            warn!(request_id = id, "request id already in flight; replacing its handle");
        }
        Registration {
            registry: self,
            id: id.to_owned(),
            generation,
            token,
        }
    }

    /// Signal and forget the handle for `id`. Returns whether one was registered.
    pub fn cancel(&self, id: &str) -> bool {
        let removed = lock(&self.inner).handles.remove(id);
        match removed {
            Some((_, token)) => {
                debug!(request_id = id, "cancelling request");
                token.cancel();
                true
            }
            None => false,
        }
    }

    /// Signal every registered handle and clear the registry.
    pub fn cancel_all(&self) -> usize {
        let handles: Vec<_> = lock(&self.inner).handles.drain().collect();
        for (id, (_, token)) in &handles {
            debug!(request_id = %id, "cancelling request");
            token.cancel();
        }
        handles.len()
    }

    pub fn len(&self) -> usize {
        lock(&self.inner).handles.len()
    }

    fn remove(&self, id: &str, generation: u64) {
        let mut state = lock(&self.inner);
        if matches!(state.handles.get(id), Some((current, _)) if *current == generation) {
            state.handles.remove(id);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cancel_signals_and_removes() {
        let registry = CancellationRegistry::default();
        let registration = registry.register("a");
        assert_eq!(registry.len(), 1);
        assert!(registry.cancel("a"));
        assert!(registration.token().is_cancelled());
        assert_eq!(registry.len(), 0);
        assert!(!registry.cancel("a"));
    }

    #[test]
    fn settled_request_deregisters() {
        let registry = CancellationRegistry::default();
        {
            let _registration = registry.register("a");
            assert_eq!(registry.len(), 1);
        }
        assert_eq!(registry.len(), 0);
    }

    #[test]
    fn last_registration_wins() {
        let registry = CancellationRegistry::default();
        let first = registry.register("dup");
        let second = registry.register("dup");
        drop(first);
        assert_eq!(registry.len(), 1);
        registry.cancel("dup");
        assert!(second.token().is_cancelled());
    }

    #[test]
    fn cancel_all_clears_everything() {
        let registry = CancellationRegistry::default();
        let a = registry.register("a");
        let b = registry.register("b");
        assert_eq!(registry.cancel_all(), 2);
        assert!(a.token().is_cancelled());
        assert!(b.token().is_cancelled());
        assert_eq!(registry.len(), 0);
    }
}
