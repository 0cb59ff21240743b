use std::collections::BTreeSet;

use alloy::primitives::{Address, B256};
use async_trait::async_trait;
use thiserror::Error;
use uuid::Uuid;

use crate::domain::{
    ExecutionEstimate, PublishStatus, PushSyncRecord, SafeState, SafeTransaction, Signature,
    SubmitRequest, TransactionDescription, TransactionReceipt,
};
use crate::message::PushMessage;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum PortError {
    #[error("port not implemented: {0}")]
    NotImplemented(&'static str),
    #[error("transport error: {0}")]
    Transport(String),
    #[error("validation error: {0}")]
    Validation(String),
    #[error("not found: {0}")]
    NotFound(String),
    #[error("policy error: {0}")]
    Policy(String),
    #[error("conflict: {0}")]
    Conflict(String),
}

impl PortError {
    pub fn is_transient(&self) -> bool {
        matches!(self, PortError::Transport(_))
    }
}

/// Read-only view of the chain.
#[async_trait]
pub trait ChainReaderPort: Send + Sync {
    async fn safe_state(&self, safe: Address) -> Result<SafeState, PortError>;

    /// `Ok(None)` while the transaction is not mined yet.
    async fn transaction_receipt(
        &self,
        tx_hash: B256,
    ) -> Result<Option<TransactionReceipt>, PortError>;
}

/// Fee estimation and submission of fully signed transactions.
#[async_trait]
pub trait RelayServicePort: Send + Sync {
    async fn estimate(
        &self,
        safe: Address,
        tx: &SafeTransaction,
    ) -> Result<ExecutionEstimate, PortError>;

    async fn submit(&self, request: &SubmitRequest) -> Result<B256, PortError>;
}

#[async_trait]
pub trait PushServicePort: Send + Sync {
    async fn send(
        &self,
        safe: Address,
        targets: &[Address],
        message: &PushMessage,
    ) -> Result<(), PortError>;
}

/// Upstream interest registration for relay topics. Called with the relay
/// registry locked, so implementations must not call back into the relay.
pub trait TopicPort: Send + Sync {
    fn subscribe_topic(&self, topic: &str) -> Result<(), PortError>;
    fn unsubscribe_topic(&self, topic: &str) -> Result<(), PortError>;
}

pub trait SignerPort: Send + Sync {
    fn address(&self) -> Address;
    fn sign(&self, digest: &B256) -> Result<Signature, PortError>;
}

pub trait StorePort: Send + Sync {
    fn last_synced_push(&self) -> Result<Option<PushSyncRecord>, PortError>;
    fn save_last_synced_push(&self, record: &PushSyncRecord) -> Result<(), PortError>;
    fn subscribed_safes(&self) -> Result<BTreeSet<Address>, PortError>;
    fn save_subscribed_safes(&self, safes: &BTreeSet<Address>) -> Result<(), PortError>;
    fn save_description(&self, description: &TransactionDescription) -> Result<(), PortError>;
    fn load_description(&self, id: Uuid) -> Result<Option<TransactionDescription>, PortError>;
    fn update_publish_status(&self, id: Uuid, status: PublishStatus) -> Result<(), PortError>;
}

pub trait ClockPort: Send + Sync {
    fn now_ms(&self) -> Result<u64, PortError>;
}

/// Notified when a transaction tied to an external request is submitted or
/// declined locally.
#[async_trait]
pub trait TransactionEventsCallback: Send + Sync {
    async fn on_transaction_submitted(
        &self,
        safe: Address,
        transaction: &SafeTransaction,
        chain_hash: B256,
        reference_id: Option<u64>,
    );

    async fn on_transaction_rejected(&self, reference_id: u64);
}
