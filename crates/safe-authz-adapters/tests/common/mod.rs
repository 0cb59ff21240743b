#![allow(dead_code)]

use std::io::Read;
use std::sync::{Arc, Mutex};
use std::thread;
use std::time::Duration;

use alloy::primitives::{Address, B256};
use alloy::signers::local::PrivateKeySigner;
use reqwest::Url;
use serde_json::{json, Value};
use tiny_http::{Method, Response, Server, StatusCode};
use tokio_stream::wrappers::UnboundedReceiverStream;
use tokio_stream::StreamExt;

use safe_authz_adapters::bridge::{
    EncryptedPayload, LinkEvent, PeerMeta, RpcMessage, RpcRequest, RpcResponse, SocketFrame,
    TransportLink,
};
use safe_authz_adapters::{
    AuthzConfig, BridgeSessionManager, BridgeTransport, BridgeUri, LoopbackTransport,
    SessionEvent,
};

pub const HANDSHAKE_TOPIC: &str = "4b6b5f53-3c52-4a35-9b0e-0c1d2e3f4a5b";
pub const BRIDGE_KEY: [u8; 32] = [0x5a; 32];

pub fn safe_address() -> Address {
    "0x000000000000000000000000000000000000BEEF"
        .parse()
        .expect("valid safe address")
}

pub fn recipient() -> Address {
    "0x000000000000000000000000000000000000dEaD"
        .parse()
        .expect("valid recipient")
}

pub fn key(seed: u8) -> PrivateKeySigner {
    PrivateKeySigner::from_bytes(&B256::repeat_byte(seed)).expect("valid private key")
}

pub fn bridge_uri() -> BridgeUri {
    BridgeUri {
        handshake_topic: HANDSHAKE_TOPIC.to_owned(),
        version: 1,
        bridge: Url::parse("https://bridge.example.org").expect("bridge url"),
        key: BRIDGE_KEY,
    }
}

pub fn config_for(base_url: &str) -> AuthzConfig {
    AuthzConfig {
        push_service_url: base_url.to_owned(),
        relay_service_url: base_url.to_owned(),
        rpc_url: base_url.to_owned(),
        http_timeout_ms: 5_000,
        ..AuthzConfig::default()
    }
}

pub async fn next_event(events: &mut UnboundedReceiverStream<SessionEvent>) -> SessionEvent {
    tokio::time::timeout(Duration::from_secs(5), events.next())
        .await
        .expect("event within timeout")
        .expect("event stream open")
}

/// The dApp side of a bridge session, speaking through the loopback hub.
pub struct DappPeer {
    pub peer_id: String,
    pub wallet_topic: Option<String>,
    link: TransportLink,
    next_id: u64,
}

impl DappPeer {
    pub async fn connect(transport: &LoopbackTransport) -> Self {
        let link = transport.connect("loopback").await.expect("peer link");
        let peer_id = "dapp-peer-1".to_owned();
        link.outbound
            .send(SocketFrame::subscribe(&peer_id))
            .expect("peer subscribe");
        Self {
            peer_id,
            wallet_topic: None,
            link,
            next_id: 1_000,
        }
    }

    pub fn publish_raw(&self, topic: &str, payload: String) {
        self.link
            .outbound
            .send(SocketFrame::publish(topic, payload))
            .expect("peer publish");
    }

    fn publish(&self, topic: &str, message: &Value) {
        let plaintext = serde_json::to_vec(message).expect("serialize");
        let sealed = EncryptedPayload::seal(&BRIDGE_KEY, &plaintext).expect("seal");
        self.publish_raw(topic, serde_json::to_string(&sealed).expect("payload json"));
    }

    pub fn request_session(&mut self) -> u64 {
        let id = self.next_id();
        let request = RpcRequest::new(
            id,
            "wc_sessionRequest",
            json!([{
                "peerId": self.peer_id,
                "peerMeta": { "name": "Test dApp", "url": "https://dapp.example.org", "icons": [] },
                "chainId": 1
            }]),
        );
        self.publish(HANDSHAKE_TOPIC, &json!(request));
        id
    }

    pub fn call(&mut self, method: &str, params: Value) -> u64 {
        let id = self.next_id();
        let topic = self.wallet_topic.clone().expect("wallet topic known after approval");
        self.publish(&topic, &json!(RpcRequest::new(id, method, params)));
        id
    }

    pub async fn next_message(&mut self) -> RpcMessage {
        let event = tokio::time::timeout(Duration::from_secs(5), self.link.inbound.recv())
            .await
            .expect("peer message within timeout")
            .expect("peer link open");
        let LinkEvent::Frame(frame) = event else {
            panic!("peer link failed");
        };
        let sealed: EncryptedPayload =
            serde_json::from_str(&frame.payload).expect("sealed payload");
        let plaintext = sealed.open(&BRIDGE_KEY).expect("open payload");
        serde_json::from_slice(&plaintext).expect("rpc message")
    }

    pub async fn next_response(&mut self) -> RpcResponse {
        match self.next_message().await {
            RpcMessage::Response(response) => response,
            RpcMessage::Request(request) => panic!("expected response, got {}", request.method),
        }
    }

    fn next_id(&mut self) -> u64 {
        let id = self.next_id;
        self.next_id += 1;
        id
    }
}

pub struct BridgeFixture {
    pub transport: LoopbackTransport,
    pub manager: BridgeSessionManager,
    pub session_id: String,
    pub events: UnboundedReceiverStream<SessionEvent>,
    pub peer: DappPeer,
}

impl BridgeFixture {
    pub async fn connected() -> Self {
        let transport = LoopbackTransport::new();
        let manager = BridgeSessionManager::new(
            Arc::new(transport.clone()),
            PeerMeta {
                name: "safe-authz tests".to_owned(),
                ..PeerMeta::default()
            },
        );
        let session_id = manager.connect_uri(bridge_uri()).expect("connect");
        let events = manager.observe_session(&session_id).expect("observe");
        let peer = DappPeer::connect(&transport).await;
        Self {
            transport,
            manager,
            session_id,
            events,
            peer,
        }
    }

    /// Runs the handshake through approval.
    pub async fn paired() -> Self {
        let mut fixture = Self::connected().await;
        fixture.peer.request_session();
        let event = next_event(&mut fixture.events).await;
        assert!(matches!(event, SessionEvent::SessionRequest { .. }));
        fixture
            .manager
            .approve_session(&fixture.session_id, vec![safe_address()], 1)
            .await
            .expect("approve session");
        let approval = fixture.peer.next_response().await;
        let result = approval.result.expect("approval result");
        fixture.peer.wallet_topic = Some(
            result["peerId"]
                .as_str()
                .expect("wallet peer id")
                .to_owned(),
        );
        fixture
    }
}

#[derive(Debug, Clone)]
pub struct RecordedRequest {
    pub method: String,
    pub path: String,
    pub body: Value,
}

pub type Route = Box<dyn Fn(&Method, &str, &Value) -> (u16, Value) + Send>;

/// Serves `route` on an ephemeral port and records every request.
pub fn spawn_mock_server(route: Route) -> (String, Arc<Mutex<Vec<RecordedRequest>>>) {
    let server = Server::http("127.0.0.1:0").expect("start server");
    let addr = format!("http://{}", server.server_addr());
    let calls = Arc::new(Mutex::new(Vec::new()));
    let recorded = Arc::clone(&calls);

    thread::spawn(move || {
        for _ in 0..32 {
            let mut req = match server.recv() {
                Ok(r) => r,
                Err(_) => break,
            };
            let method = req.method().clone();
            let path = req.url().to_owned();
            let mut raw = String::new();
            let _ = req.as_reader().read_to_string(&mut raw);
            let body: Value = serde_json::from_str(&raw).unwrap_or(Value::Null);
            if let Ok(mut g) = recorded.lock() {
                g.push(RecordedRequest {
                    method: method.to_string(),
                    path: path.clone(),
                    body: body.clone(),
                });
            }

            let (code, payload) = route(&method, &path, &body);
            let response =
                Response::from_string(payload.to_string()).with_status_code(StatusCode(code));
            let _ = req.respond(response);
        }
    });

    (addr, calls)
}
