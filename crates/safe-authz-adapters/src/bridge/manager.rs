use std::collections::HashMap;
use std::str::FromStr;
use std::sync::{Arc, Mutex, MutexGuard};

use alloy::primitives::{hex, Address, Bytes, B256, U256};
use async_trait::async_trait;
use serde::Deserialize;
use serde_json::{json, Value};
use tokio::sync::{mpsc, oneshot};
use tokio_stream::wrappers::UnboundedReceiverStream;
use tracing::{debug, info, warn};
use uuid::Uuid;

use safe_authz_core::{Operation, SafeTransaction, TransactionEventsCallback};

use super::payload::{
    EncryptedPayload, FrameKind, PeerMeta, RpcMessage, RpcRequest, RpcResponse, SessionParams,
    SessionRequestParams, SocketFrame,
};
use super::transport::{BridgeTransport, LinkEvent};
use super::uri::BridgeUri;
use super::{BridgeError, APPLICATION_ERROR, METHOD_NOT_SUPPORTED, USER_REJECTED};
use crate::config::AuthzConfig;

const MULTI_SEND_METHOD: &str = "gs_multi_send";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    Connecting,
    Connected,
    Disconnected,
    Failed,
}

impl SessionState {
    pub fn is_closed(self) -> bool {
        matches!(self, SessionState::Disconnected | SessionState::Failed)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PairingState {
    Unpaired,
    Pending,
    Paired,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionInfo {
    pub id: String,
    pub handshake_topic: String,
    pub bridge: String,
    pub state: SessionState,
    pub pairing: PairingState,
    pub peer_meta: Option<PeerMeta>,
    pub accounts: Vec<Address>,
    pub chain_id: Option<u64>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BridgeRequest {
    SendTransaction {
        safe: Address,
        transaction: SafeTransaction,
    },
    MultiSend {
        safe: Address,
        transactions: Vec<SafeTransaction>,
    },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionEvent {
    SessionRequest {
        peer_id: String,
        peer_meta: Option<PeerMeta>,
        chain_id: Option<u64>,
    },
    TransactionRequest {
        reference_id: u64,
        request: BridgeRequest,
    },
    Closed {
        reason: String,
    },
}

type Reply = oneshot::Sender<Result<(), BridgeError>>;

enum SessionCommand {
    Approve {
        accounts: Vec<Address>,
        chain_id: u64,
        reply: Reply,
    },
    Reject {
        reply: Reply,
    },
    Respond {
        response: RpcResponse,
        reply: Reply,
    },
    Close {
        reply: Reply,
    },
}

struct PendingRequest {
    session_id: String,
    rpc_id: u64,
}

struct EventSink {
    sender: mpsc::UnboundedSender<SessionEvent>,
    receiver: Option<mpsc::UnboundedReceiver<SessionEvent>>,
}

impl EventSink {
    fn new() -> Self {
        let (sender, receiver) = mpsc::unbounded_channel();
        Self {
            sender,
            receiver: Some(receiver),
        }
    }

    /// Hands out the buffered receiver once, fresh channels afterwards.
    fn take(&mut self) -> mpsc::UnboundedReceiver<SessionEvent> {
        if let Some(receiver) = self.receiver.take() {
            return receiver;
        }
        let (sender, receiver) = mpsc::unbounded_channel();
        self.sender = sender;
        receiver
    }
}

struct SessionEntry {
    generation: u64,
    info: SessionInfo,
    commands: mpsc::UnboundedSender<SessionCommand>,
    events: EventSink,
}

#[derive(Default)]
struct Registry {
    next_generation: u64,
    next_reference: u64,
    sessions: HashMap<String, SessionEntry>,
    /// Handshake topic to the newest session opened for it.
    topics: HashMap<String, String>,
    requests: HashMap<u64, PendingRequest>,
}

type SharedRegistry = Arc<Mutex<Registry>>;

fn lock(registry: &SharedRegistry) -> Result<MutexGuard<'_, Registry>, BridgeError> {
    registry
        .lock()
        .map_err(|e| BridgeError::Transport(format!("bridge registry lock poisoned: {e}")))
}

/// Owns every bridge session and the reference ids of requests awaiting a
/// local decision.
#[derive(Clone)]
pub struct BridgeSessionManager {
    registry: SharedRegistry,
    transport: Arc<dyn BridgeTransport>,
    client_meta: PeerMeta,
}

impl BridgeSessionManager {
    pub fn new(transport: Arc<dyn BridgeTransport>, client_meta: PeerMeta) -> Self {
        Self {
            registry: Arc::new(Mutex::new(Registry::default())),
            transport,
            client_meta,
        }
    }

    pub fn from_config(config: &AuthzConfig, transport: Arc<dyn BridgeTransport>) -> Self {
        Self::new(
            transport,
            PeerMeta {
                name: config.client_name.clone(),
                ..PeerMeta::default()
            },
        )
    }

    /// Opens a session for `uri` and returns a locally generated id. A live
    /// session for the same handshake topic is reused.
    pub fn connect(&self, uri: &str) -> Result<String, BridgeError> {
        self.connect_uri(BridgeUri::parse(uri)?)
    }

    pub fn connect_uri(&self, uri: BridgeUri) -> Result<String, BridgeError> {
        let mut registry = lock(&self.registry)?;
        if let Some(existing) = registry.topics.get(&uri.handshake_topic) {
            let live = registry
                .sessions
                .get(existing)
                .is_some_and(|entry| !entry.info.state.is_closed());
            if live {
                debug!(session_id = %existing, "bridge session already open");
                return Ok(existing.clone());
            }
        }

        let session_id = Uuid::new_v4().to_string();
        registry
            .topics
            .insert(uri.handshake_topic.clone(), session_id.clone());

        let generation = registry.next_generation;
        registry.next_generation += 1;
        let (commands, receiver) = mpsc::unbounded_channel();
        registry.sessions.insert(
            session_id.clone(),
            SessionEntry {
                generation,
                info: SessionInfo {
                    id: session_id.clone(),
                    handshake_topic: uri.handshake_topic.clone(),
                    bridge: uri.bridge.to_string(),
                    state: SessionState::Connecting,
                    pairing: PairingState::Unpaired,
                    peer_meta: None,
                    accounts: Vec::new(),
                    chain_id: None,
                },
                commands,
                events: EventSink::new(),
            },
        );
        drop(registry);

        let actor = SessionActor {
            session_id: session_id.clone(),
            generation,
            client_id: Uuid::new_v4().to_string(),
            client_meta: self.client_meta.clone(),
            uri,
            registry: Arc::clone(&self.registry),
            outbound: None,
            peer_id: None,
            handshake_id: None,
            pairing: PairingState::Unpaired,
            accounts: Vec::new(),
            next_rpc_id: 1,
        };
        tokio::spawn(actor.run(Arc::clone(&self.transport), receiver));
        info!(%session_id, "bridge session created");
        Ok(session_id)
    }

    /// Events for `session_id`, starting with anything not yet observed.
    /// A second observer replaces the first.
    pub fn observe_session(
        &self,
        session_id: &str,
    ) -> Result<UnboundedReceiverStream<SessionEvent>, BridgeError> {
        let mut registry = lock(&self.registry)?;
        let entry = registry
            .sessions
            .get_mut(session_id)
            .ok_or_else(|| BridgeError::UnknownSession(session_id.to_owned()))?;
        Ok(UnboundedReceiverStream::new(entry.events.take()))
    }

    pub fn session(&self, session_id: &str) -> Result<SessionInfo, BridgeError> {
        let registry = lock(&self.registry)?;
        registry
            .sessions
            .get(session_id)
            .map(|entry| entry.info.clone())
            .ok_or_else(|| BridgeError::UnknownSession(session_id.to_owned()))
    }

    pub fn sessions(&self) -> Result<Vec<SessionInfo>, BridgeError> {
        let registry = lock(&self.registry)?;
        let mut out: Vec<SessionInfo> = registry
            .sessions
            .values()
            .map(|entry| entry.info.clone())
            .collect();
        out.sort_by(|a, b| a.id.cmp(&b.id));
        Ok(out)
    }

    pub fn pending_requests(&self) -> Result<Vec<u64>, BridgeError> {
        let registry = lock(&self.registry)?;
        let mut ids: Vec<u64> = registry.requests.keys().copied().collect();
        ids.sort_unstable();
        Ok(ids)
    }

    pub async fn approve_session(
        &self,
        session_id: &str,
        accounts: Vec<Address>,
        chain_id: u64,
    ) -> Result<(), BridgeError> {
        self.command(session_id, |reply| SessionCommand::Approve {
            accounts,
            chain_id,
            reply,
        })
        .await
    }

    pub async fn reject_session(&self, session_id: &str) -> Result<(), BridgeError> {
        self.command(session_id, |reply| SessionCommand::Reject { reply })
            .await
    }

    pub async fn close_session(&self, session_id: &str) -> Result<(), BridgeError> {
        self.command(session_id, |reply| SessionCommand::Close { reply })
            .await
    }

    pub async fn approve_request(&self, reference_id: u64, result: Value) -> Result<(), BridgeError> {
        let pending = self.take_request(reference_id)?;
        let response = RpcResponse::success(pending.rpc_id, result);
        self.command(&pending.session_id, |reply| SessionCommand::Respond { response, reply })
            .await
    }

    pub async fn reject_request(
        &self,
        reference_id: u64,
        code: i64,
        message: &str,
    ) -> Result<(), BridgeError> {
        let pending = self.take_request(reference_id)?;
        let response = RpcResponse::failure(pending.rpc_id, code, message);
        self.command(&pending.session_id, |reply| SessionCommand::Respond { response, reply })
            .await
    }

    fn take_request(&self, reference_id: u64) -> Result<PendingRequest, BridgeError> {
        lock(&self.registry)?
            .requests
            .remove(&reference_id)
            .ok_or(BridgeError::UnknownRequest(reference_id))
    }

    async fn command(
        &self,
        session_id: &str,
        build: impl FnOnce(Reply) -> SessionCommand,
    ) -> Result<(), BridgeError> {
        let (reply, response) = oneshot::channel();
        {
            let registry = lock(&self.registry)?;
            let entry = registry
                .sessions
                .get(session_id)
                .ok_or_else(|| BridgeError::UnknownSession(session_id.to_owned()))?;
            if entry.info.state.is_closed() {
                return Err(BridgeError::SessionClosed);
            }
            entry
                .commands
                .send(build(reply))
                .map_err(|_| BridgeError::SessionClosed)?;
        }
        response.await.map_err(|_| BridgeError::SessionClosed)?
    }
}

#[async_trait]
impl TransactionEventsCallback for BridgeSessionManager {
    async fn on_transaction_submitted(
        &self,
        _safe: Address,
        _transaction: &SafeTransaction,
        chain_hash: B256,
        reference_id: Option<u64>,
    ) {
        let Some(reference_id) = reference_id else {
            return;
        };
        match self
            .approve_request(reference_id, json!(hex::encode_prefixed(chain_hash)))
            .await
        {
            Ok(()) => info!(reference_id, %chain_hash, "bridge request answered"),
            Err(BridgeError::UnknownRequest(_)) => {
                debug!(reference_id, "submission not tied to a bridge request")
            }
            Err(e) => warn!(reference_id, error = %e, "bridge request answer failed"),
        }
    }

    async fn on_transaction_rejected(&self, reference_id: u64) {
        match self
            .reject_request(reference_id, USER_REJECTED, "Transaction rejected")
            .await
        {
            Ok(()) => info!(reference_id, "bridge request rejected"),
            Err(BridgeError::UnknownRequest(_)) => {
                debug!(reference_id, "rejection not tied to a bridge request")
            }
            Err(e) => warn!(reference_id, error = %e, "bridge request rejection failed"),
        }
    }
}

#[derive(Debug, Deserialize)]
struct SendTransactionParams {
    from: Address,
    to: Address,
    #[serde(default)]
    value: Option<String>,
    #[serde(default)]
    data: Option<Bytes>,
}

#[derive(Debug, Deserialize)]
struct MultiSendEntry {
    to: Address,
    #[serde(default)]
    value: Option<String>,
    #[serde(default)]
    data: Option<Bytes>,
    #[serde(default)]
    operation: Option<Value>,
}

enum Flow {
    Continue,
    Stop,
}

struct SessionActor {
    session_id: String,
    generation: u64,
    client_id: String,
    client_meta: PeerMeta,
    uri: BridgeUri,
    registry: SharedRegistry,
    outbound: Option<mpsc::UnboundedSender<SocketFrame>>,
    peer_id: Option<String>,
    handshake_id: Option<u64>,
    pairing: PairingState,
    accounts: Vec<Address>,
    next_rpc_id: u64,
}

impl SessionActor {
    async fn run(
        mut self,
        transport: Arc<dyn BridgeTransport>,
        mut commands: mpsc::UnboundedReceiver<SessionCommand>,
    ) {
        let link = match transport.connect(&self.uri.socket_url()).await {
            Ok(link) => link,
            Err(e) => {
                self.teardown(SessionState::Failed, &e.to_string());
                return;
            }
        };
        let mut inbound = link.inbound;
        let topics = [self.client_id.clone(), self.uri.handshake_topic.clone()];
        for topic in &topics {
            if link.outbound.send(SocketFrame::subscribe(topic)).is_err() {
                self.teardown(SessionState::Failed, "bridge link closed during subscribe");
                return;
            }
        }
        self.outbound = Some(link.outbound);
        self.update(|info| info.state = SessionState::Connected);
        info!(session_id = %self.session_id, "bridge session connected");

        loop {
            let flow = tokio::select! {
                event = inbound.recv() => match event {
                    Some(LinkEvent::Frame(frame)) => self.on_frame(frame),
                    Some(LinkEvent::Failed(reason)) => {
                        self.teardown(SessionState::Failed, &reason);
                        Flow::Stop
                    }
                    None => {
                        self.teardown(SessionState::Disconnected, "bridge connection closed");
                        Flow::Stop
                    }
                },
                command = commands.recv() => match command {
                    Some(command) => self.on_command(command),
                    None => Flow::Stop,
                },
            };
            if matches!(flow, Flow::Stop) {
                break;
            }
        }
    }

    fn on_frame(&mut self, frame: SocketFrame) -> Flow {
        if frame.kind != FrameKind::Pub {
            return Flow::Continue;
        }
        if frame.topic != self.client_id && frame.topic != self.uri.handshake_topic {
            debug!(topic = %frame.topic, "frame for foreign topic ignored");
            return Flow::Continue;
        }
        let message = match self.decode(&frame.payload) {
            Ok(message) => message,
            Err(e) => {
                warn!(session_id = %self.session_id, error = %e, "bridge payload dropped");
                return Flow::Continue;
            }
        };
        match message {
            RpcMessage::Request(request) => self.on_request(request),
            RpcMessage::Response(response) => {
                debug!(id = response.id, "peer response received");
                Flow::Continue
            }
        }
    }

    fn decode(&self, raw: &str) -> Result<RpcMessage, BridgeError> {
        let payload: EncryptedPayload =
            serde_json::from_str(raw).map_err(|e| BridgeError::Payload(e.to_string()))?;
        let plaintext = payload.open(&self.uri.key)?;
        serde_json::from_slice(&plaintext).map_err(|e| BridgeError::Payload(e.to_string()))
    }

    fn on_request(&mut self, request: RpcRequest) -> Flow {
        debug!(session_id = %self.session_id, method = %request.method, "bridge request");
        match request.method.as_str() {
            "wc_sessionRequest" => {
                self.on_session_request(request);
                Flow::Continue
            }
            "wc_sessionUpdate" => self.on_session_update(request),
            _ if self.pairing != PairingState::Paired => {
                self.respond_error(request.id, APPLICATION_ERROR, "session not approved");
                Flow::Continue
            }
            "eth_sendTransaction" => {
                match self.parse_send_transaction(&request.params) {
                    Ok(parsed) => self.surface(request.id, parsed),
                    Err(message) => self.respond_error(request.id, APPLICATION_ERROR, &message),
                }
                Flow::Continue
            }
            MULTI_SEND_METHOD => {
                match self.parse_multi_send(&request.params) {
                    Ok(parsed) => self.surface(request.id, parsed),
                    Err(message) => self.respond_error(request.id, APPLICATION_ERROR, &message),
                }
                Flow::Continue
            }
            other => {
                self.respond_error(
                    request.id,
                    METHOD_NOT_SUPPORTED,
                    &format!("{other} is not supported"),
                );
                Flow::Continue
            }
        }
    }

    fn on_session_request(&mut self, request: RpcRequest) {
        if self.pairing == PairingState::Paired {
            warn!(session_id = %self.session_id, "session request on paired session ignored");
            return;
        }
        let params: SessionRequestParams = match first_param(&request.params) {
            Ok(params) => params,
            Err(e) => {
                warn!(session_id = %self.session_id, error = %e, "malformed session request dropped");
                return;
            }
        };
        self.peer_id = Some(params.peer_id.clone());
        self.handshake_id = Some(request.id);
        self.pairing = PairingState::Pending;
        let peer_meta = params.peer_meta.clone();
        let chain_id = params.chain_id;
        self.update(|info| {
            info.pairing = PairingState::Pending;
            info.peer_meta = peer_meta;
            info.chain_id = chain_id;
        });
        self.emit(SessionEvent::SessionRequest {
            peer_id: params.peer_id,
            peer_meta: params.peer_meta,
            chain_id: params.chain_id,
        });
    }

    fn on_session_update(&mut self, request: RpcRequest) -> Flow {
        let params: SessionParams = match first_param(&request.params) {
            Ok(params) => params,
            Err(e) => {
                warn!(session_id = %self.session_id, error = %e, "malformed session update dropped");
                return Flow::Continue;
            }
        };
        if !params.approved {
            self.teardown(SessionState::Disconnected, "session closed by peer");
            return Flow::Stop;
        }
        if let Some(accounts) = params.accounts {
            self.accounts = accounts.clone();
            self.update(|info| info.accounts = accounts);
        }
        if let Some(chain_id) = params.chain_id {
            self.update(|info| info.chain_id = Some(chain_id));
        }
        Flow::Continue
    }

    fn parse_send_transaction(&self, params: &Value) -> Result<BridgeRequest, String> {
        let tx: SendTransactionParams = first_param(params).map_err(|e| e.to_string())?;
        if !self.accounts.contains(&tx.from) {
            return Err("wrong from".to_owned());
        }
        Ok(BridgeRequest::SendTransaction {
            safe: tx.from,
            transaction: SafeTransaction::call(
                tx.to,
                parse_value(tx.value.as_deref())?,
                non_empty(tx.data),
            ),
        })
    }

    fn parse_multi_send(&self, params: &Value) -> Result<BridgeRequest, String> {
        let safe = *self.accounts.first().ok_or("no approved safe")?;
        let entries: Vec<MultiSendEntry> =
            serde_json::from_value(params.clone()).map_err(|e| e.to_string())?;
        let mut transactions = Vec::with_capacity(entries.len());
        for entry in entries {
            transactions.push(SafeTransaction {
                to: entry.to,
                value: parse_value(entry.value.as_deref())?,
                data: non_empty(entry.data),
                operation: parse_operation(entry.operation.as_ref())?,
                nonce: None,
            });
        }
        Ok(BridgeRequest::MultiSend { safe, transactions })
    }

    fn surface(&mut self, rpc_id: u64, request: BridgeRequest) {
        let reference_id = match lock(&self.registry) {
            Ok(mut registry) => {
                registry.next_reference += 1;
                let reference_id = registry.next_reference;
                registry.requests.insert(
                    reference_id,
                    PendingRequest {
                        session_id: self.session_id.clone(),
                        rpc_id,
                    },
                );
                reference_id
            }
            Err(e) => {
                warn!(error = %e, "bridge request not registered");
                self.respond_error(rpc_id, APPLICATION_ERROR, "request could not be registered");
                return;
            }
        };
        info!(session_id = %self.session_id, reference_id, "bridge transaction request");
        self.emit(SessionEvent::TransactionRequest {
            reference_id,
            request,
        });
    }

    fn on_command(&mut self, command: SessionCommand) -> Flow {
        match command {
            SessionCommand::Approve {
                accounts,
                chain_id,
                reply,
            } => {
                let _ = reply.send(self.approve(accounts, chain_id));
                Flow::Continue
            }
            SessionCommand::Reject { reply } => {
                let Some(handshake_id) = self.handshake_pending() else {
                    let _ = reply.send(Err(BridgeError::NotPending));
                    return Flow::Continue;
                };
                let result = self.send(&RpcResponse::success(handshake_id, json!(SessionParams::rejected())));
                self.teardown(SessionState::Disconnected, "session rejected");
                let _ = reply.send(result);
                Flow::Stop
            }
            SessionCommand::Respond { response, reply } => {
                let _ = reply.send(self.send(&response));
                Flow::Continue
            }
            SessionCommand::Close { reply } => {
                let result = if self.peer_id.is_some() {
                    let id = self.next_id();
                    self.send(&RpcRequest::new(
                        id,
                        "wc_sessionUpdate",
                        json!([SessionParams::rejected()]),
                    ))
                } else {
                    Ok(())
                };
                self.teardown(SessionState::Disconnected, "session closed locally");
                let _ = reply.send(result);
                Flow::Stop
            }
        }
    }

    fn approve(&mut self, accounts: Vec<Address>, chain_id: u64) -> Result<(), BridgeError> {
        let handshake_id = self.handshake_pending().ok_or(BridgeError::NotPending)?;
        let params = SessionParams {
            approved: true,
            chain_id: Some(chain_id),
            accounts: Some(accounts.clone()),
            peer_id: Some(self.client_id.clone()),
            peer_meta: Some(self.client_meta.clone()),
        };
        self.send(&RpcResponse::success(handshake_id, json!(params)))?;
        self.pairing = PairingState::Paired;
        self.accounts = accounts.clone();
        self.update(|info| {
            info.pairing = PairingState::Paired;
            info.accounts = accounts;
            info.chain_id = Some(chain_id);
        });
        info!(session_id = %self.session_id, "bridge session approved");
        Ok(())
    }

    fn handshake_pending(&self) -> Option<u64> {
        (self.pairing == PairingState::Pending)
            .then_some(self.handshake_id)
            .flatten()
    }

    fn next_id(&mut self) -> u64 {
        let id = self.next_rpc_id;
        self.next_rpc_id += 1;
        id
    }

    fn respond_error(&self, rpc_id: u64, code: i64, message: &str) {
        if let Err(e) = self.send(&RpcResponse::failure(rpc_id, code, message)) {
            warn!(session_id = %self.session_id, error = %e, "bridge error response not sent");
        }
    }

    fn send<T: serde::Serialize>(&self, message: &T) -> Result<(), BridgeError> {
        let outbound = self.outbound.as_ref().ok_or(BridgeError::SessionClosed)?;
        let peer = self
            .peer_id
            .as_deref()
            .ok_or_else(|| BridgeError::Transport("peer has not identified itself".to_owned()))?;
        let plaintext = serde_json::to_vec(message).map_err(|e| BridgeError::Payload(e.to_string()))?;
        let payload = EncryptedPayload::seal(&self.uri.key, &plaintext)?;
        let payload = serde_json::to_string(&payload).map_err(|e| BridgeError::Payload(e.to_string()))?;
        outbound
            .send(SocketFrame::publish(peer, payload))
            .map_err(|_| BridgeError::SessionClosed)
    }

    fn update(&self, apply: impl FnOnce(&mut SessionInfo)) {
        match lock(&self.registry) {
            Ok(mut registry) => {
                if let Some(entry) = registry.sessions.get_mut(&self.session_id) {
                    if entry.generation == self.generation {
                        apply(&mut entry.info);
                    }
                }
            }
            Err(e) => warn!(error = %e, "bridge session info not updated"),
        }
    }

    fn emit(&self, event: SessionEvent) {
        let Ok(registry) = lock(&self.registry) else {
            return;
        };
        if let Some(entry) = registry.sessions.get(&self.session_id) {
            if entry.generation == self.generation && entry.events.sender.send(event).is_err() {
                debug!(session_id = %self.session_id, "session event without observer");
            }
        }
    }

    /// Marks the session closed, drops its pending requests and tells the observer.
    fn teardown(&mut self, state: SessionState, reason: &str) {
        self.outbound = None;
        self.pairing = PairingState::Unpaired;
        match lock(&self.registry) {
            Ok(mut registry) => {
                let session_id = self.session_id.clone();
                registry
                    .requests
                    .retain(|_, pending| pending.session_id != session_id);
                if let Some(entry) = registry.sessions.get_mut(&session_id) {
                    if entry.generation == self.generation {
                        entry.info.state = state;
                        let _ = entry.events.sender.send(SessionEvent::Closed {
                            reason: reason.to_owned(),
                        });
                    }
                }
            }
            Err(e) => warn!(error = %e, "bridge session teardown incomplete"),
        }
        if state == SessionState::Failed {
            warn!(session_id = %self.session_id, %reason, "bridge session failed");
        } else {
            info!(session_id = %self.session_id, %reason, "bridge session closed");
        }
    }
}

fn first_param<T: for<'de> Deserialize<'de>>(params: &Value) -> Result<T, BridgeError> {
    let first = params
        .as_array()
        .and_then(|items| items.first())
        .ok_or_else(|| BridgeError::Payload("missing params".to_owned()))?;
    serde_json::from_value(first.clone()).map_err(|e| BridgeError::Payload(e.to_string()))
}

fn parse_value(raw: Option<&str>) -> Result<U256, String> {
    match raw {
        None | Some("") => Ok(U256::ZERO),
        Some(raw) => U256::from_str(raw).map_err(|e| format!("invalid value {raw}: {e}")),
    }
}

fn parse_operation(raw: Option<&Value>) -> Result<Operation, String> {
    let code = match raw {
        None => return Ok(Operation::Call),
        Some(Value::Number(n)) => n.as_u64(),
        Some(Value::String(s)) => s.parse::<u64>().ok(),
        Some(_) => None,
    };
    code.and_then(|c| u8::try_from(c).ok())
        .ok_or_else(|| format!("invalid operation {raw:?}"))
        .and_then(|c| Operation::from_code(c).map_err(|e| e.to_string()))
}

fn non_empty(data: Option<Bytes>) -> Option<Bytes> {
    data.filter(|d| !d.is_empty())
}
