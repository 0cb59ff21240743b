use alloy::primitives::{Address, Bytes, B256};
use safe_authz_core::{DigestScheme, PublishStatus, SubmitMode};
use serde::Serialize;

/// Prints `value` as pretty JSON, or hands it to `human` otherwise.
fn emit<T: Serialize>(value: &T, json: bool, human: impl FnOnce(&T)) -> eyre::Result<()> {
    if json {
        println!("{}", serde_json::to_string_pretty(value)?);
    } else {
        human(value);
    }
    Ok(())
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DigestOutput {
    pub safe: Address,
    pub scheme: DigestScheme,
    pub digest: B256,
    pub rejection_digest: B256,
}

impl DigestOutput {
    pub fn print(&self, json: bool) -> eyre::Result<()> {
        emit(self, json, |o| {
            println!("Safe: {}", o.safe);
            println!("Scheme: {:?}", o.scheme);
            println!("Digest: {}", o.digest);
            println!("Rejection digest: {}", o.rejection_digest);
        })
    }
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RejectionOutput {
    pub digest: B256,
    pub rejection_digest: B256,
}

impl RejectionOutput {
    pub fn print(&self, json: bool) -> eyre::Result<()> {
        emit(self, json, |o| println!("{}", o.rejection_digest))
    }
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PolicyOutput {
    pub signer: Address,
    pub confirmations: usize,
    pub required: usize,
    pub mode: Option<SubmitMode>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub refusal: Option<String>,
}

impl PolicyOutput {
    pub fn print(&self, json: bool) -> eyre::Result<()> {
        emit(self, json, |o| {
            println!("Signer: {}", o.signer);
            println!("Confirmations: {}/{}", o.confirmations, o.required);
            match (&o.mode, &o.refusal) {
                (Some(mode), _) => println!("Allowed: {mode:?}"),
                (None, Some(reason)) => println!("Refused: {reason}"),
                (None, None) => {}
            }
        })
    }
}

#[derive(Serialize)]
pub struct SignerEntry {
    pub owner: Address,
    pub signature: String,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AggregateOutput {
    pub threshold: usize,
    pub signers: Vec<SignerEntry>,
    pub signatures: Bytes,
}

impl AggregateOutput {
    pub fn print(&self, json: bool) -> eyre::Result<()> {
        emit(self, json, |o| {
            println!("Threshold: {}", o.threshold);
            println!("Signers (contract order):");
            for (i, entry) in o.signers.iter().enumerate() {
                println!("  {}: {}", i + 1, entry.owner);
            }
            println!("Signatures: {}", o.signatures);
        })
    }
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
pub struct UriOutput {
    pub handshake_topic: String,
    pub version: u32,
    pub bridge: String,
    pub socket_url: String,
}

impl UriOutput {
    pub fn print(&self, json: bool) -> eyre::Result<()> {
        emit(self, json, |o| {
            println!("Handshake topic: {}", o.handshake_topic);
            println!("Version: {}", o.version);
            println!("Bridge: {}", o.bridge);
            println!("Socket: {}", o.socket_url);
        })
    }
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
pub struct WatchOutput {
    pub tx_hash: B256,
    pub status: PublishStatus,
    pub polls: u32,
}

impl WatchOutput {
    pub fn print(&self, json: bool) -> eyre::Result<()> {
        emit(self, json, |o| {
            println!("Transaction: {}", o.tx_hash);
            println!("Status: {:?} after {} reads", o.status, o.polls);
        })
    }
}
