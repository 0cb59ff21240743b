use std::fmt;
use std::str::FromStr;

use alloy::primitives::hex;
use reqwest::Url;

use super::BridgeError;
use crate::crypto::KEY_LEN;

/// `wc:{handshakeTopic}@{version}?bridge={url}&key={hex}`
#[derive(Clone, PartialEq, Eq)]
pub struct BridgeUri {
    pub handshake_topic: String,
    pub version: u32,
    pub bridge: Url,
    pub key: [u8; KEY_LEN],
}

impl BridgeUri {
    pub fn parse(raw: &str) -> Result<Self, BridgeError> {
        let invalid = |reason: &str| BridgeError::InvalidUri(format!("{reason}: {raw}"));

        let body = raw.trim().strip_prefix("wc:").ok_or_else(|| invalid("missing wc: scheme"))?;
        let (topic, rest) = body.split_once('@').ok_or_else(|| invalid("missing version"))?;
        if topic.is_empty() {
            return Err(invalid("empty handshake topic"));
        }
        let (version, query) = rest.split_once('?').ok_or_else(|| invalid("missing parameters"))?;
        let version: u32 = version.parse().map_err(|_| invalid("bad version"))?;

        // Borrow the url crate's query decoding.
        let carrier = Url::parse(&format!("https://localhost/?{query}"))
            .map_err(|e| invalid(&format!("bad parameters ({e})")))?;
        let mut bridge = None;
        let mut key = None;
        for (name, value) in carrier.query_pairs() {
            match name.as_ref() {
                "bridge" => bridge = Some(value.into_owned()),
                "key" => key = Some(value.into_owned()),
                _ => {}
            }
        }

        let bridge = bridge.ok_or_else(|| invalid("missing bridge"))?;
        let bridge = Url::parse(&bridge).map_err(|e| invalid(&format!("bad bridge url ({e})")))?;
        if !matches!(bridge.scheme(), "https" | "http" | "wss" | "ws") {
            return Err(invalid("unsupported bridge scheme"));
        }

        let key = key.ok_or_else(|| invalid("missing key"))?;
        let key_bytes = hex::decode(&key).map_err(|_| invalid("key is not hex"))?;
        let key: [u8; KEY_LEN] = key_bytes
            .as_slice()
            .try_into()
            .map_err(|_| invalid("key must be 32 bytes"))?;

        Ok(Self {
            handshake_topic: topic.to_owned(),
            version,
            bridge,
            key,
        })
    }

    /// WebSocket endpoint for the bridge server.
    pub fn socket_url(&self) -> String {
        let raw = self.bridge.as_str();
        if let Some(rest) = raw.strip_prefix("https://") {
            format!("wss://{rest}")
        } else if let Some(rest) = raw.strip_prefix("http://") {
            format!("ws://{rest}")
        } else {
            raw.to_owned()
        }
    }
}

impl FromStr for BridgeUri {
    type Err = BridgeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl fmt::Display for BridgeUri {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut carrier = Url::parse("https://localhost/").map_err(|_| fmt::Error)?;
        carrier
            .query_pairs_mut()
            .append_pair("bridge", self.bridge.as_str())
            .append_pair("key", &hex::encode(self.key));
        write!(
            f,
            "wc:{}@{}?{}",
            self.handshake_topic,
            self.version,
            carrier.query().unwrap_or_default()
        )
    }
}

// Keeps the key out of logs.
impl fmt::Debug for BridgeUri {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BridgeUri")
            .field("handshake_topic", &self.handshake_topic)
            .field("version", &self.version)
            .field("bridge", &self.bridge.as_str())
            .finish_non_exhaustive()
    }
}
