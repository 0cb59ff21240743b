pub mod bridge;
pub mod chain;
pub mod clock;
pub mod config;
pub mod crypto;
pub mod push;
pub mod relay_service;
pub mod signer;
pub mod store;

pub use bridge::{
    BridgeError, BridgeRequest, BridgeSessionManager, BridgeTransport, BridgeUri,
    LoopbackTransport, PairingState, SessionEvent, SessionInfo, SessionState, WebSocketTransport,
};
pub use chain::RpcChainReader;
pub use clock::SystemClockAdapter;
pub use config::AuthzConfig;
pub use push::{HttpPushService, PushMessageRouter, PushTopicAdapter, Routed, TopicChange};
pub use relay_service::HttpRelayService;
pub use signer::LocalSignerAdapter;
pub use store::MemoryStoreAdapter;
