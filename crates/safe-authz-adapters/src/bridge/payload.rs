//! Bridge wire types: socket frames, sealed payloads and the JSON-RPC
//! messages they carry.

use alloy::primitives::{hex, Address};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use super::BridgeError;
use crate::crypto::{self, SealedBox, IV_LEN, KEY_LEN, MAC_LEN};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FrameKind {
    Pub,
    Sub,
}

/// One frame exchanged with the bridge server.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SocketFrame {
    pub topic: String,
    #[serde(rename = "type")]
    pub kind: FrameKind,
    pub payload: String,
    #[serde(default)]
    pub silent: bool,
}

impl SocketFrame {
    pub fn subscribe(topic: &str) -> Self {
        Self {
            topic: topic.to_owned(),
            kind: FrameKind::Sub,
            payload: String::new(),
            silent: true,
        }
    }

    pub fn publish(topic: &str, payload: String) -> Self {
        Self {
            topic: topic.to_owned(),
            kind: FrameKind::Pub,
            payload,
            silent: false,
        }
    }
}

/// `{data, hmac, iv}` as unprefixed hex, the shape WalletConnect v1 peers exchange.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EncryptedPayload {
    pub data: String,
    pub hmac: String,
    pub iv: String,
}

impl EncryptedPayload {
    pub fn seal(key: &[u8; KEY_LEN], plaintext: &[u8]) -> Result<Self, BridgeError> {
        let sealed = crypto::seal(key, plaintext).map_err(|e| BridgeError::Payload(e.to_string()))?;
        Ok(Self {
            data: hex::encode(&sealed.data),
            hmac: hex::encode(sealed.mac),
            iv: hex::encode(sealed.iv),
        })
    }

    pub fn open(&self, key: &[u8; KEY_LEN]) -> Result<Vec<u8>, BridgeError> {
        let sealed = SealedBox {
            data: decode_hex("data", &self.data)?,
            iv: decode_fixed::<IV_LEN>("iv", &self.iv)?,
            mac: decode_fixed::<MAC_LEN>("hmac", &self.hmac)?,
        };
        crypto::open(key, &sealed).map_err(|e| BridgeError::Payload(e.to_string()))
    }
}

fn decode_hex(field: &str, raw: &str) -> Result<Vec<u8>, BridgeError> {
    hex::decode(raw).map_err(|e| BridgeError::Payload(format!("{field}: {e}")))
}

fn decode_fixed<const N: usize>(field: &str, raw: &str) -> Result<[u8; N], BridgeError> {
    decode_hex(field, raw)?
        .as_slice()
        .try_into()
        .map_err(|_| BridgeError::Payload(format!("{field}: expected {N} bytes")))
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RpcRequest {
    pub id: u64,
    pub jsonrpc: String,
    pub method: String,
    #[serde(default)]
    pub params: Value,
}

impl RpcRequest {
    pub fn new(id: u64, method: &str, params: Value) -> Self {
        Self {
            id,
            jsonrpc: "2.0".to_owned(),
            method: method.to_owned(),
            params,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RpcErrorObject {
    pub code: i64,
    pub message: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RpcResponse {
    pub id: u64,
    pub jsonrpc: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub result: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<RpcErrorObject>,
}

impl RpcResponse {
    pub fn success(id: u64, result: Value) -> Self {
        Self {
            id,
            jsonrpc: "2.0".to_owned(),
            result: Some(result),
            error: None,
        }
    }

    pub fn failure(id: u64, code: i64, message: &str) -> Self {
        Self {
            id,
            jsonrpc: "2.0".to_owned(),
            result: None,
            error: Some(RpcErrorObject {
                code,
                message: message.to_owned(),
            }),
        }
    }
}

/// Anything a peer may publish to us.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum RpcMessage {
    Request(RpcRequest),
    Response(RpcResponse),
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PeerMeta {
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub url: Option<String>,
    #[serde(default)]
    pub icons: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionRequestParams {
    pub peer_id: String,
    #[serde(default)]
    pub peer_meta: Option<PeerMeta>,
    #[serde(default)]
    pub chain_id: Option<u64>,
}

/// Body of a session approval and of `wc_sessionUpdate`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionParams {
    pub approved: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub chain_id: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub accounts: Option<Vec<Address>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub peer_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub peer_meta: Option<PeerMeta>,
}

impl SessionParams {
    pub fn rejected() -> Self {
        Self {
            approved: false,
            chain_id: None,
            accounts: None,
            peer_id: None,
            peer_meta: None,
        }
    }
}
