//! Service state management.

use std::sync::Arc;

use crate::canonical::{CanonicalizeOptions, Canonicalizer};
use crate::edit::{EditMirror, MessagingClient};
use crate::store::MessageStore;

/// Shared service state.
///
/// Holds the message store, the optional outbound client and the
/// canonicalizer every endpoint shares.
pub struct ServiceState<S: MessageStore + 'static, C: MessagingClient + 'static> {
    /// The message store for edit lookups.
    pub store: Arc<S>,
    /// Outbound client; `None` disables mirroring.
    pub client: Option<Arc<C>>,
    canonicalizer: Canonicalizer,
    mirror: EditMirror<S>,
}

impl<S: MessageStore + 'static, C: MessagingClient + 'static> ServiceState<S, C> {
    /// Create service state.
    pub fn new(store: S, client: Option<C>, options: CanonicalizeOptions) -> Self {
        let store = Arc::new(store);
        let canonicalizer = Canonicalizer::new(options);
        Self {
            mirror: EditMirror::with_canonicalizer(Arc::clone(&store), canonicalizer),
            store,
            client: client.map(Arc::new),
            canonicalizer,
        }
    }

    /// Create service state with options read from the environment.
    ///
    /// See [`CanonicalizeOptions::from_env`].
    pub fn from_env(store: S, client: Option<C>) -> Self {
        let options = CanonicalizeOptions::from_env();
        tracing::info!(
            bigint_mode = %options.bigint_mode,
            max_depth = ?options.max_depth,
            max_nodes = ?options.max_nodes,
            "Canonicalization options loaded"
        );
        Self::new(store, client, options)
    }

    /// The shared canonicalizer.
    pub fn canonicalizer(&self) -> &Canonicalizer {
        &self.canonicalizer
    }

    /// The edit mirror bound to this state's store.
    pub fn mirror(&self) -> &EditMirror<S> {
        &self.mirror
    }
}

impl<S: MessageStore + 'static, C: MessagingClient + 'static> Clone for ServiceState<S, C> {
    fn clone(&self) -> Self {
        Self {
            store: Arc::clone(&self.store),
            client: self.client.clone(),
            canonicalizer: self.canonicalizer,
            mirror: self.mirror.clone(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::canonical::BigIntMode;
    use crate::edit::LoggingMessagingClient;
    use crate::store::InMemoryMessageStore;

    #[test]
    fn test_state_shares_store_with_mirror() {
        let state: ServiceState<InMemoryMessageStore, LoggingMessagingClient> =
            ServiceState::new(InMemoryMessageStore::new(), None, CanonicalizeOptions::default());

        assert!(Arc::ptr_eq(&state.store, state.mirror().store()));
        assert!(state.client.is_none());
    }

    #[test]
    fn test_state_clone_shares_handles() {
        let options = CanonicalizeOptions::default().with_bigint_mode(BigIntMode::Auto);
        let state = ServiceState::new(InMemoryMessageStore::new(), Some(LoggingMessagingClient), options);
        let cloned = state.clone();

        assert!(Arc::ptr_eq(&state.store, &cloned.store));
        assert_eq!(cloned.canonicalizer().options().bigint_mode, BigIntMode::Auto);
    }
}
