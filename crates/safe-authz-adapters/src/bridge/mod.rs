//! Bridge sessions for externally initiated signing requests.

mod manager;
mod payload;
mod transport;
mod uri;

use thiserror::Error;

pub use manager::{
    BridgeRequest, BridgeSessionManager, PairingState, SessionEvent, SessionInfo, SessionState,
};
pub use payload::{
    EncryptedPayload, FrameKind, PeerMeta, RpcErrorObject, RpcMessage, RpcRequest, RpcResponse,
    SessionParams, SessionRequestParams, SocketFrame,
};
pub use transport::{BridgeTransport, LinkEvent, LoopbackTransport, TransportLink, WebSocketTransport};
pub use uri::BridgeUri;

pub const USER_REJECTED: i64 = 4001;
pub const METHOD_NOT_SUPPORTED: i64 = -32601;
pub const APPLICATION_ERROR: i64 = -32000;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum BridgeError {
    #[error("invalid bridge uri: {0}")]
    InvalidUri(String),
    #[error("unknown session: {0}")]
    UnknownSession(String),
    #[error("unknown request: {0}")]
    UnknownRequest(u64),
    #[error("session is closed")]
    SessionClosed,
    #[error("session is not awaiting approval")]
    NotPending,
    #[error("payload error: {0}")]
    Payload(String),
    #[error("transport error: {0}")]
    Transport(String),
}
