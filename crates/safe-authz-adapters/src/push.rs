//! Push-service client, inbound push routing and upstream topic bookkeeping.

use std::collections::BTreeSet;
use std::sync::{Arc, Mutex};

use alloy::primitives::{hex, keccak256, Address, B256};
use async_trait::async_trait;
use serde::Serialize;
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

use safe_authz_core::{
    ConfirmationRequest, PortError, PushMessage, PushServicePort, PushSyncRecord, RelayKey,
    SignatureRelay, Signature, SignerPort, StorePort, TopicPort,
};

use crate::config::AuthzConfig;

pub const SIGNATURE_PREFIX: &str = "GNO";

const TOPIC_PREFIX: &str = "respond_signature.";

/// `keccak256("GNO" ‖ payload)`, the hash every push-service payload is signed over.
pub fn prefixed_hash(payload: &str) -> B256 {
    keccak256(format!("{SIGNATURE_PREFIX}{payload}"))
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ServiceSignature {
    pub r: String,
    pub s: String,
    pub v: u8,
}

impl From<Signature> for ServiceSignature {
    fn from(signature: Signature) -> Self {
        Self {
            r: signature.r.to_string(),
            s: signature.s.to_string(),
            v: signature.v,
        }
    }
}

#[derive(Debug, Serialize)]
struct NotificationBody<'a> {
    devices: Vec<String>,
    message: &'a str,
    signature: ServiceSignature,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct AuthBody<'a> {
    push_token: &'a str,
    version_name: &'a str,
    client: &'a str,
    signatures: Vec<ServiceSignature>,
}

pub struct HttpPushService {
    base_url: String,
    client: reqwest::Client,
    client_name: String,
    signer: Arc<dyn SignerPort>,
    store: Arc<dyn StorePort>,
}

impl HttpPushService {
    pub fn new(
        config: &AuthzConfig,
        signer: Arc<dyn SignerPort>,
        store: Arc<dyn StorePort>,
    ) -> Result<Self, PortError> {
        Ok(Self {
            base_url: config.push_service_url.trim_end_matches('/').to_owned(),
            client: config.http_client()?,
            client_name: config.client_name.clone(),
            signer,
            store,
        })
    }

    /// Registers `push_token` for the local account. Returns `false` when the
    /// service already knows this pair and nothing was sent.
    pub async fn sync_auth(&self, push_token: &str, forced: bool) -> Result<bool, PortError> {
        let record = PushSyncRecord {
            push_token: push_token.to_owned(),
            account: self.signer.address(),
        };
        if !forced && self.store.last_synced_push()?.as_ref() == Some(&record) {
            debug!(account = %record.account, "push auth already synced");
            return Ok(false);
        }

        let version = env!("CARGO_PKG_VERSION");
        let hash = prefixed_hash(&format!("{push_token}{version}{}", self.client_name));
        let signature = self.signer.sign(&hash)?;
        let body = AuthBody {
            push_token,
            version_name: version,
            client: &self.client_name,
            signatures: vec![signature.into()],
        };
        self.post("auth/", &body).await?;
        self.store.save_last_synced_push(&record)?;
        info!(account = %record.account, "push auth synced");
        Ok(true)
    }

    async fn post<T: Serialize + ?Sized>(&self, path: &str, body: &T) -> Result<(), PortError> {
        let url = format!("{}/{path}", self.base_url);
        let response = self
            .client
            .post(&url)
            .json(body)
            .send()
            .await
            .map_err(|e| PortError::Transport(format!("push service request failed: {e}")))?;
        let status = response.status();
        if status.is_success() {
            return Ok(());
        }
        let text = response.text().await.unwrap_or_default();
        if status.is_server_error() {
            Err(PortError::Transport(format!("push service status {status}: {text}")))
        } else {
            Err(PortError::Validation(format!("push service status {status}: {text}")))
        }
    }
}

#[async_trait]
impl PushServicePort for HttpPushService {
    async fn send(
        &self,
        safe: Address,
        targets: &[Address],
        message: &PushMessage,
    ) -> Result<(), PortError> {
        if targets.is_empty() {
            return Ok(());
        }
        let raw = message
            .to_json()
            .map_err(|e| PortError::Validation(e.to_string()))?;
        let signature = self.signer.sign(&prefixed_hash(&raw))?;
        let body = NotificationBody {
            devices: targets.iter().map(|t| t.to_checksum(None)).collect(),
            message: &raw,
            signature: signature.into(),
        };
        self.post("notifications/", &body).await?;
        debug!(%safe, targets = targets.len(), "push notification sent");
        Ok(())
    }
}

/// What happened to one inbound push payload.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Routed {
    /// Published to the relay; carries the number of listeners reached.
    Relayed(usize),
    ConfirmationRequest,
    Ignored,
    Dropped,
}

/// Entry point for raw push payloads handed over by the platform.
#[derive(Clone)]
pub struct PushMessageRouter {
    relay: SignatureRelay,
    confirmations: mpsc::UnboundedSender<ConfirmationRequest>,
}

impl PushMessageRouter {
    pub fn new(relay: SignatureRelay) -> (Self, mpsc::UnboundedReceiver<ConfirmationRequest>) {
        let (confirmations, receiver) = mpsc::unbounded_channel();
        (
            Self {
                relay,
                confirmations,
            },
            receiver,
        )
    }

    pub fn handle(&self, raw: &str) -> Routed {
        let message = match PushMessage::from_json(raw) {
            Ok(message) => message,
            Err(e) => {
                warn!(error = %e, "undecodable push payload dropped");
                return Routed::Dropped;
            }
        };

        match message.relay_delivery() {
            Ok(Some((key, delivery))) => {
                return match self.relay.publish(&key, delivery) {
                    Ok(count) => Routed::Relayed(count),
                    Err(e) => {
                        warn!(%key, error = %e, "relay publish failed");
                        Routed::Dropped
                    }
                };
            }
            Ok(None) => {}
            Err(e) => {
                warn!(error = %e, "malformed signature push dropped");
                return Routed::Dropped;
            }
        }

        match message.confirmation_request() {
            Ok(Some(request)) => {
                if self.confirmations.send(request).is_err() {
                    warn!("confirmation request dropped, no consumer");
                    return Routed::Dropped;
                }
                Routed::ConfirmationRequest
            }
            Ok(None) => {
                debug!("push message without local handler ignored");
                Routed::Ignored
            }
            Err(e) => {
                warn!(error = %e, "malformed confirmation request dropped");
                Routed::Dropped
            }
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TopicChange {
    Subscribe(String),
    Unsubscribe(String),
}

/// Forwards relay topic interest to an upstream consumer and remembers which
/// safes are subscribed across restarts.
#[derive(Clone)]
pub struct PushTopicAdapter {
    store: Arc<dyn StorePort>,
    active: Arc<Mutex<BTreeSet<String>>>,
    upstream: mpsc::UnboundedSender<TopicChange>,
}

impl PushTopicAdapter {
    pub fn new(store: Arc<dyn StorePort>) -> (Self, mpsc::UnboundedReceiver<TopicChange>) {
        let (upstream, receiver) = mpsc::unbounded_channel();
        (
            Self {
                store,
                active: Arc::new(Mutex::new(BTreeSet::new())),
                upstream,
            },
            receiver,
        )
    }

    pub fn active_topics(&self) -> Result<Vec<String>, PortError> {
        let g = self
            .active
            .lock()
            .map_err(|e| PortError::Transport(format!("topic lock poisoned: {e}")))?;
        Ok(g.iter().cloned().collect())
    }

    /// Re-issues a subscription for every persisted safe.
    pub fn resubscribe_all(&self) -> Result<usize, PortError> {
        let safes = self.store.subscribed_safes()?;
        let mut g = self
            .active
            .lock()
            .map_err(|e| PortError::Transport(format!("topic lock poisoned: {e}")))?;
        for safe in &safes {
            let topic = RelayKey::Safe(*safe).topic();
            g.insert(topic.clone());
            self.forward(TopicChange::Subscribe(topic))?;
        }
        info!(count = safes.len(), "push topics resubscribed");
        Ok(safes.len())
    }

    fn forward(&self, change: TopicChange) -> Result<(), PortError> {
        self.upstream
            .send(change)
            .map_err(|_| PortError::Transport("topic consumer is gone".to_owned()))
    }

    fn update_safes(&self, topic: &str, subscribed: bool) -> Result<(), PortError> {
        let Some(safe) = safe_from_topic(topic) else {
            return Ok(());
        };
        let mut safes = self.store.subscribed_safes()?;
        let changed = if subscribed {
            safes.insert(safe)
        } else {
            safes.remove(&safe)
        };
        if changed {
            self.store.save_subscribed_safes(&safes)?;
        }
        Ok(())
    }
}

impl TopicPort for PushTopicAdapter {
    fn subscribe_topic(&self, topic: &str) -> Result<(), PortError> {
        let mut g = self
            .active
            .lock()
            .map_err(|e| PortError::Transport(format!("topic lock poisoned: {e}")))?;
        if g.insert(topic.to_owned()) {
            self.forward(TopicChange::Subscribe(topic.to_owned()))?;
        }
        drop(g);
        self.update_safes(topic, true)
    }

    fn unsubscribe_topic(&self, topic: &str) -> Result<(), PortError> {
        let mut g = self
            .active
            .lock()
            .map_err(|e| PortError::Transport(format!("topic lock poisoned: {e}")))?;
        if g.remove(topic) {
            self.forward(TopicChange::Unsubscribe(topic.to_owned()))?;
        }
        drop(g);
        self.update_safes(topic, false)
    }
}

fn safe_from_topic(topic: &str) -> Option<Address> {
    let raw = topic.strip_prefix(TOPIC_PREFIX)?;
    let bytes = hex::decode(raw).ok()?;
    (bytes.len() == 20).then(|| Address::from_slice(&bytes))
}
