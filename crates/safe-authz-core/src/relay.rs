//! Per-key publish/subscribe registry for inbound signatures.
//!
//! Each key is either absent or active with at least one listener. The first
//! listener on a key registers the upstream topic and the last one to leave
//! unregisters it. Publishes are fanned out only to listeners registered at
//! the time of the call; nothing is replayed to late subscribers.

use std::collections::HashMap;
use std::pin::Pin;
use std::sync::{Arc, Mutex};
use std::task::{Context, Poll};

use tokio::sync::mpsc;
use tokio_stream::Stream;
use tracing::{debug, warn};

use crate::domain::{RelayKey, RelayMessage};
use crate::ports::{PortError, TopicPort};

#[derive(Clone)]
pub struct SignatureRelay {
    inner: Arc<RelayInner>,
}

struct RelayInner {
    registry: Mutex<Registry>,
    topics: Arc<dyn TopicPort>,
}

#[derive(Default)]
struct Registry {
    next_listener: u64,
    channels: HashMap<RelayKey, HashMap<u64, mpsc::UnboundedSender<RelayMessage>>>,
}

impl SignatureRelay {
    pub fn new(topics: Arc<dyn TopicPort>) -> Self {
        Self {
            inner: Arc::new(RelayInner {
                registry: Mutex::new(Registry::default()),
                topics,
            }),
        }
    }

    pub fn observe(&self, key: RelayKey) -> Result<RelaySubscription, PortError> {
        let mut registry = self
            .inner
            .registry
            .lock()
            .map_err(|e| PortError::Transport(format!("relay lock poisoned: {e}")))?;
        let (sender, receiver) = mpsc::unbounded_channel();
        let listener = registry.next_listener;
        registry.next_listener = registry.next_listener.wrapping_add(1);

        let listeners = registry.channels.entry(key).or_default();
        let first = listeners.is_empty();
        listeners.insert(listener, sender);
        if first {
            debug!(%key, "relay key active, subscribing upstream");
            if let Err(e) = self.inner.topics.subscribe_topic(&key.topic()) {
                warn!(%key, error = %e, "upstream topic subscribe failed");
            }
        }

        Ok(RelaySubscription {
            key,
            listener,
            receiver,
            relay: Arc::clone(&self.inner),
        })
    }

    /// Delivers `message` to current listeners of `key` and returns how many
    /// received it. Zero listeners is not an error.
    pub fn publish(&self, key: &RelayKey, message: RelayMessage) -> Result<usize, PortError> {
        // Senders are cloned out so delivery happens outside the registry lock.
        let senders: Vec<_> = {
            let registry = self
                .inner
                .registry
                .lock()
                .map_err(|e| PortError::Transport(format!("relay lock poisoned: {e}")))?;
            let Some(listeners) = registry.channels.get(key) else {
                debug!(%key, "publish without listeners dropped");
                return Ok(0);
            };
            listeners.values().cloned().collect()
        };
        Ok(senders
            .iter()
            .filter(|sender| sender.send(message).is_ok())
            .count())
    }

    pub fn listener_count(&self, key: &RelayKey) -> Result<usize, PortError> {
        let registry = self
            .inner
            .registry
            .lock()
            .map_err(|e| PortError::Transport(format!("relay lock poisoned: {e}")))?;
        Ok(registry.channels.get(key).map_or(0, HashMap::len))
    }

    pub fn active_keys(&self) -> Result<Vec<RelayKey>, PortError> {
        let registry = self
            .inner
            .registry
            .lock()
            .map_err(|e| PortError::Transport(format!("relay lock poisoned: {e}")))?;
        let mut keys: Vec<RelayKey> = registry.channels.keys().copied().collect();
        keys.sort();
        Ok(keys)
    }
}

impl RelayInner {
    fn release(&self, key: RelayKey, listener: u64) {
        let Ok(mut registry) = self.registry.lock() else {
            return;
        };
        let Some(listeners) = registry.channels.get_mut(&key) else {
            return;
        };
        listeners.remove(&listener);
        if listeners.is_empty() {
            registry.channels.remove(&key);
            debug!(%key, "last relay listener left, unsubscribing upstream");
            if let Err(e) = self.topics.unsubscribe_topic(&key.topic()) {
                warn!(%key, error = %e, "upstream topic unsubscribe failed");
            }
        }
    }
}

/// A live observation of one relay key. Dropping it cancels delivery.
pub struct RelaySubscription {
    key: RelayKey,
    listener: u64,
    receiver: mpsc::UnboundedReceiver<RelayMessage>,
    relay: Arc<RelayInner>,
}

impl RelaySubscription {
    pub fn key(&self) -> RelayKey {
        self.key
    }

    pub async fn recv(&mut self) -> Option<RelayMessage> {
        self.receiver.recv().await
    }

    pub fn try_recv(&mut self) -> Option<RelayMessage> {
        self.receiver.try_recv().ok()
    }

    pub fn cancel(self) {}
}

impl Stream for RelaySubscription {
    type Item = RelayMessage;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        self.receiver.poll_recv(cx)
    }
}

impl Drop for RelaySubscription {
    fn drop(&mut self) {
        self.relay.release(self.key, self.listener);
    }
}
