use alloy::primitives::Address;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::ports::PortError;

/// Malformed input handed to one of the pure builders.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum EncodingError {
    #[error("malformed hex: {0}")]
    Hex(String),
    #[error("invalid {what} length: expected {expected} bytes, got {got}")]
    Length {
        what: &'static str,
        expected: usize,
        got: usize,
    },
    #[error("nonce must be resolved before hashing")]
    MissingNonce,
    #[error("unknown operation code: {0}")]
    Operation(u8),
    #[error("invalid integer: {0}")]
    Integer(String),
    #[error("invalid typed data: {0}")]
    TypedData(String),
    #[error("invalid json: {0}")]
    Json(String),
    #[error("threshold {threshold} is outside 1..={owners}")]
    Threshold { threshold: usize, owners: usize },
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CryptoError {
    #[error("unsupported recovery id: {0}")]
    RecoveryId(u8),
    #[error("signature recovery failed: {0}")]
    Recovery(String),
    #[error("signing failed: {0}")]
    Signing(String),
}

/// The requested submission is not legal for the current confirmation state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Error)]
pub enum PolicyError {
    #[error("transaction already executed")]
    AlreadyExecuted,
    #[error("local signer is not an owner")]
    NotAnOwner,
    #[error("local signer already confirmed")]
    AlreadyConfirmed,
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum AggregateError {
    #[error("threshold not reached: have {have} of {need} signatures")]
    ThresholdNotReached { have: usize, need: usize },
}

#[derive(Debug, Clone, Error)]
pub enum CoordinatorError {
    #[error(transparent)]
    Encoding(#[from] EncodingError),
    #[error(transparent)]
    Crypto(#[from] CryptoError),
    #[error(transparent)]
    Policy(#[from] PolicyError),
    #[error(transparent)]
    Aggregate(#[from] AggregateError),
    #[error(transparent)]
    Port(#[from] PortError),
    #[error("signer {0} is not an owner of the safe")]
    UnknownSigner(Address),
    #[error("confirmation requests are cooling down for another {remaining_ms} ms")]
    CooldownActive { remaining_ms: u64 },
    #[error("attempt is closed")]
    AttemptClosed,
    #[error("{0}")]
    IllegalTransition(String),
}
