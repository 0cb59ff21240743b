use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use futures_util::{SinkExt, StreamExt};
use tokio::sync::mpsc;
use tokio_tungstenite::{connect_async, tungstenite::Message};
use tracing::{debug, warn};

use super::payload::{FrameKind, SocketFrame};
use super::BridgeError;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LinkEvent {
    Frame(SocketFrame),
    /// The link broke; no further events follow.
    Failed(String),
}

/// An open connection to a bridge server. Dropping `outbound` closes it;
/// `inbound` ending without `Failed` is an orderly close.
pub struct TransportLink {
    pub outbound: mpsc::UnboundedSender<SocketFrame>,
    pub inbound: mpsc::UnboundedReceiver<LinkEvent>,
}

#[async_trait]
pub trait BridgeTransport: Send + Sync {
    async fn connect(&self, url: &str) -> Result<TransportLink, BridgeError>;
}

#[derive(Debug, Clone, Copy, Default)]
pub struct WebSocketTransport;

#[async_trait]
impl BridgeTransport for WebSocketTransport {
    async fn connect(&self, url: &str) -> Result<TransportLink, BridgeError> {
        let (ws_stream, _) = connect_async(url)
            .await
            .map_err(|e| BridgeError::Transport(format!("bridge connect failed: {e}")))?;
        let (outbound, mut frames) = mpsc::unbounded_channel::<SocketFrame>();
        let (events, inbound) = mpsc::unbounded_channel();
        let url = url.to_owned();

        tokio::spawn(async move {
            let (mut write, mut read) = ws_stream.split();
            loop {
                tokio::select! {
                    frame = frames.recv() => {
                        let Some(frame) = frame else {
                            let _ = write.send(Message::Close(None)).await;
                            break;
                        };
                        let text = match serde_json::to_string(&frame) {
                            Ok(text) => text,
                            Err(e) => {
                                warn!(error = %e, "bridge frame not serializable");
                                continue;
                            }
                        };
                        if let Err(e) = write.send(Message::Text(text.into())).await {
                            let _ = events.send(LinkEvent::Failed(e.to_string()));
                            break;
                        }
                    }
                    msg = read.next() => match msg {
                        Some(Ok(Message::Text(text))) => match serde_json::from_str::<SocketFrame>(&text) {
                            Ok(frame) => {
                                if events.send(LinkEvent::Frame(frame)).is_err() {
                                    break;
                                }
                            }
                            Err(e) => warn!(error = %e, "undecodable bridge frame dropped"),
                        },
                        Some(Ok(Message::Ping(data))) => {
                            let _ = write.send(Message::Pong(data)).await;
                        }
                        Some(Ok(Message::Close(_))) | None => {
                            debug!(%url, "bridge socket closed");
                            break;
                        }
                        Some(Err(e)) => {
                            let _ = events.send(LinkEvent::Failed(e.to_string()));
                            break;
                        }
                        Some(Ok(_)) => {}
                    },
                }
            }
        });

        Ok(TransportLink { outbound, inbound })
    }
}

/// In-process bridge server: routes published frames to subscribers of the
/// topic and holds them until someone subscribes.
#[derive(Clone, Default)]
pub struct LoopbackTransport {
    hub: Arc<Mutex<Hub>>,
}

#[derive(Default)]
struct Hub {
    next_client: u64,
    clients: HashMap<u64, mpsc::UnboundedSender<LinkEvent>>,
    subscribers: HashMap<String, Vec<u64>>,
    queued: HashMap<String, Vec<SocketFrame>>,
}

impl Hub {
    fn route(&mut self, client: u64, frame: SocketFrame) {
        match frame.kind {
            FrameKind::Sub => {
                let subscribers = self.subscribers.entry(frame.topic.clone()).or_default();
                if !subscribers.contains(&client) {
                    subscribers.push(client);
                }
                if let (Some(queued), Some(sender)) =
                    (self.queued.remove(&frame.topic), self.clients.get(&client))
                {
                    for pending in queued {
                        let _ = sender.send(LinkEvent::Frame(pending));
                    }
                }
            }
            FrameKind::Pub => {
                let targets: Vec<&mpsc::UnboundedSender<LinkEvent>> = self
                    .subscribers
                    .get(&frame.topic)
                    .into_iter()
                    .flatten()
                    .filter(|id| **id != client)
                    .filter_map(|id| self.clients.get(id))
                    .collect();
                if targets.is_empty() {
                    self.queued.entry(frame.topic.clone()).or_default().push(frame);
                    return;
                }
                for sender in targets {
                    let _ = sender.send(LinkEvent::Frame(frame.clone()));
                }
            }
        }
    }

    fn remove(&mut self, client: u64) {
        self.clients.remove(&client);
        for subscribers in self.subscribers.values_mut() {
            subscribers.retain(|id| *id != client);
        }
    }
}

impl LoopbackTransport {
    pub fn new() -> Self {
        Self::default()
    }

    /// Breaks every open link with `reason`.
    pub fn fail_all(&self, reason: &str) -> Result<(), BridgeError> {
        let mut hub = self
            .hub
            .lock()
            .map_err(|e| BridgeError::Transport(format!("loopback lock poisoned: {e}")))?;
        for (_, sender) in hub.clients.drain() {
            let _ = sender.send(LinkEvent::Failed(reason.to_owned()));
        }
        hub.subscribers.clear();
        Ok(())
    }

    pub fn client_count(&self) -> Result<usize, BridgeError> {
        let hub = self
            .hub
            .lock()
            .map_err(|e| BridgeError::Transport(format!("loopback lock poisoned: {e}")))?;
        Ok(hub.clients.len())
    }
}

#[async_trait]
impl BridgeTransport for LoopbackTransport {
    async fn connect(&self, _url: &str) -> Result<TransportLink, BridgeError> {
        let (outbound, mut frames) = mpsc::unbounded_channel::<SocketFrame>();
        let (events, inbound) = mpsc::unbounded_channel();
        let client = {
            let mut hub = self
                .hub
                .lock()
                .map_err(|e| BridgeError::Transport(format!("loopback lock poisoned: {e}")))?;
            let client = hub.next_client;
            hub.next_client += 1;
            hub.clients.insert(client, events);
            client
        };

        let hub = Arc::clone(&self.hub);
        tokio::spawn(async move {
            while let Some(frame) = frames.recv().await {
                let Ok(mut guard) = hub.lock() else {
                    break;
                };
                if !guard.clients.contains_key(&client) {
                    break;
                }
                guard.route(client, frame);
            }
            if let Ok(mut guard) = hub.lock() {
                guard.remove(client);
            }
        });

        Ok(TransportLink { outbound, inbound })
    }
}
