use std::collections::hash_map;
use std::collections::{BTreeSet, HashMap};
use std::fmt;

use alloy::primitives::{hex, Address, Bytes, PrimitiveSignature, B256, U256};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::{CryptoError, EncodingError, PolicyError};

pub const SIGNATURE_LEN: usize = 65;

const RECOVERY_ID_OFFSET: u8 = 27;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct TimestampMs(pub u64);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Operation {
    Call,
    DelegateCall,
    Create,
}

impl Operation {
    pub fn code(self) -> u8 {
        match self {
            Operation::Call => 0,
            Operation::DelegateCall => 1,
            Operation::Create => 2,
        }
    }

    pub fn from_code(code: u8) -> Result<Self, EncodingError> {
        match code {
            0 => Ok(Operation::Call),
            1 => Ok(Operation::DelegateCall),
            2 => Ok(Operation::Create),
            other => Err(EncodingError::Operation(other)),
        }
    }
}

/// A transaction to be executed by the Safe. Immutable once hashed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SafeTransaction {
    pub to: Address,
    pub value: U256,
    #[serde(default)]
    pub data: Option<Bytes>,
    pub operation: Operation,
    #[serde(default)]
    pub nonce: Option<U256>,
}

impl SafeTransaction {
    pub fn call(to: Address, value: U256, data: Option<Bytes>) -> Self {
        Self {
            to,
            value,
            data,
            operation: Operation::Call,
            nonce: None,
        }
    }

    pub fn with_nonce(mut self, nonce: U256) -> Self {
        self.nonce = Some(nonce);
        self
    }

    pub fn data_bytes(&self) -> &[u8] {
        match &self.data {
            Some(data) => data.as_ref(),
            None => &[],
        }
    }

    pub fn resolved_nonce(&self) -> Result<U256, EncodingError> {
        self.nonce.ok_or(EncodingError::MissingNonce)
    }
}

/// Fee parameters covered by the transaction digest. Zero is a valid default.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExecutionParams {
    pub tx_gas: U256,
    pub data_gas: U256,
    pub gas_price: U256,
    pub gas_token: Address,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExecutionEstimate {
    pub params: ExecutionParams,
    pub operational_gas: U256,
    pub last_used_nonce: Option<U256>,
}

/// ECDSA signature with `v` carrying the 27 offset.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Signature {
    pub r: U256,
    pub s: U256,
    pub v: u8,
}

impl Signature {
    /// A bare parity `v` of 0 or 1 is shifted to 27 or 28.
    pub fn new(r: U256, s: U256, v: u8) -> Self {
        Self { r, s, v }.normalized()
    }

    pub fn from_primitive(signature: &PrimitiveSignature) -> Self {
        Self {
            r: signature.r(),
            s: signature.s(),
            v: RECOVERY_ID_OFFSET + u8::from(signature.v()),
        }
    }

    pub fn from_bytes(bytes: &[u8]) -> Result<Self, EncodingError> {
        if bytes.len() != SIGNATURE_LEN {
            return Err(EncodingError::Length {
                what: "signature",
                expected: SIGNATURE_LEN,
                got: bytes.len(),
            });
        }
        Ok(Self::new(
            U256::from_be_slice(&bytes[..32]),
            U256::from_be_slice(&bytes[32..64]),
            bytes[64],
        ))
    }

    /// Same signature with `v` in the 27/28 form the contract verifies as ECDSA.
    pub fn normalized(self) -> Self {
        match self.v {
            0 | 1 => Self {
                v: self.v + RECOVERY_ID_OFFSET,
                ..self
            },
            _ => self,
        }
    }

    /// Parses the `0x`-prefixed `r‖s‖v` form used by QR codes and bridges.
    pub fn from_hex(encoded: &str) -> Result<Self, EncodingError> {
        let bytes = hex::decode(encoded.trim()).map_err(|e| EncodingError::Hex(e.to_string()))?;
        Self::from_bytes(&bytes)
    }

    pub fn to_bytes(&self) -> [u8; SIGNATURE_LEN] {
        let mut out = [0u8; SIGNATURE_LEN];
        out[..32].copy_from_slice(&self.r.to_be_bytes::<32>());
        out[32..64].copy_from_slice(&self.s.to_be_bytes::<32>());
        out[64] = self.v;
        out
    }

    pub fn to_hex(&self) -> String {
        hex::encode_prefixed(self.to_bytes())
    }

    pub fn recover(&self, digest: &B256) -> Result<Address, CryptoError> {
        let parity = match self.v {
            0 | 27 => false,
            1 | 28 => true,
            other => return Err(CryptoError::RecoveryId(other)),
        };
        PrimitiveSignature::new(self.r, self.s, parity)
            .recover_address_from_prehash(digest)
            .map_err(|e| CryptoError::Recovery(e.to_string()))
    }
}

/// One signature per owner; re-signing replaces the previous entry.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SignatureMap(HashMap<Address, Signature>);

impl SignatureMap {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, signer: Address, signature: Signature) -> Option<Signature> {
        self.0.insert(signer, signature.normalized())
    }

    pub fn get(&self, signer: &Address) -> Option<&Signature> {
        self.0.get(signer)
    }

    pub fn contains(&self, signer: &Address) -> bool {
        self.0.contains_key(signer)
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn signers(&self) -> impl Iterator<Item = &Address> {
        self.0.keys()
    }

    pub fn iter(&self) -> hash_map::Iter<'_, Address, Signature> {
        self.0.iter()
    }
}

impl FromIterator<(Address, Signature)> for SignatureMap {
    fn from_iter<I: IntoIterator<Item = (Address, Signature)>>(iter: I) -> Self {
        Self(
            iter.into_iter()
                .map(|(signer, signature)| (signer, signature.normalized()))
                .collect(),
        )
    }
}

/// Owners in insertion order plus the confirmation threshold.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SignerSet {
    owners: Vec<Address>,
    threshold: usize,
}

impl SignerSet {
    pub fn new(owners: Vec<Address>, threshold: usize) -> Result<Self, EncodingError> {
        let mut deduped = Vec::with_capacity(owners.len());
        for owner in owners {
            if !deduped.contains(&owner) {
                deduped.push(owner);
            }
        }
        if threshold == 0 || threshold > deduped.len() {
            return Err(EncodingError::Threshold {
                threshold,
                owners: deduped.len(),
            });
        }
        Ok(Self {
            owners: deduped,
            threshold,
        })
    }

    pub fn owners(&self) -> &[Address] {
        &self.owners
    }

    pub fn threshold(&self) -> usize {
        self.threshold
    }

    pub fn contains(&self, address: &Address) -> bool {
        self.owners.contains(address)
    }

    pub fn len(&self) -> usize {
        self.owners.len()
    }

    pub fn is_empty(&self) -> bool {
        self.owners.is_empty()
    }
}

/// Per-attempt snapshot; never cached across chain-state changes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConfirmationState {
    pub is_owner: bool,
    pub has_confirmed: bool,
    pub confirmations: usize,
    pub required_confirmations: usize,
    pub is_executed: bool,
}

impl ConfirmationState {
    pub fn derive(
        signers: &SignerSet,
        signatures: &SignatureMap,
        local: Address,
        is_executed: bool,
    ) -> Self {
        Self {
            is_owner: signers.contains(&local),
            has_confirmed: signatures.contains(&local),
            confirmations: signatures.signers().filter(|s| signers.contains(s)).count(),
            required_confirmations: signers.threshold(),
            is_executed,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum SubmitMode {
    Confirm,
    ConfirmAndExecute,
    Execute,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum RelayKey {
    Transaction(B256),
    Safe(Address),
}

impl RelayKey {
    /// Upstream push topic for this key.
    pub fn topic(&self) -> String {
        let raw = match self {
            RelayKey::Transaction(hash) => hex::encode(hash),
            RelayKey::Safe(address) => hex::encode(address),
        };
        format!("respond_signature.{raw}")
    }
}

impl fmt::Display for RelayKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RelayKey::Transaction(hash) => write!(f, "tx:{}", hex::encode_prefixed(hash)),
            RelayKey::Safe(address) => write!(f, "safe:{}", hex::encode_prefixed(address)),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RelayMessage {
    Confirmed(Signature),
    Rejected(Signature),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SafeState {
    pub owners: Vec<Address>,
    pub threshold: usize,
    pub nonce: U256,
    pub balance: U256,
    pub version: Option<semver::Version>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum PublishStatus {
    Pending,
    Success,
    Failed,
    Unknown,
}

impl PublishStatus {
    pub fn is_terminal(self) -> bool {
        matches!(self, PublishStatus::Success | PublishStatus::Failed)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReceiptLog {
    pub address: Address,
    pub topics: Vec<B256>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransactionReceipt {
    pub transaction_hash: B256,
    pub success: bool,
    pub logs: Vec<ReceiptLog>,
}

/// Everything the relay service needs to execute a fully signed transaction.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SubmitRequest {
    pub safe: Address,
    pub transaction: SafeTransaction,
    pub params: ExecutionParams,
    pub operational_gas: U256,
    pub digest: B256,
    pub signatures: Bytes,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SubmissionReceipt {
    pub id: Uuid,
    pub digest: B256,
    pub chain_hash: B256,
}

/// Draft row persisted for every submission.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TransactionDescription {
    pub id: Uuid,
    pub safe: Address,
    pub to: Address,
    pub value: U256,
    pub data: Bytes,
    pub operation: Operation,
    pub nonce: U256,
    pub params: ExecutionParams,
    pub operational_gas: U256,
    pub digest: B256,
    pub chain_hash: B256,
    pub submitted_at: TimestampMs,
    pub status: PublishStatus,
}

/// Push-token and account pair last reported to the push service.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PushSyncRecord {
    pub push_token: String,
    pub account: Address,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExecutionSnapshot {
    pub state: crate::state_machine::AttemptState,
    pub safe: Address,
    pub digest: B256,
    pub transaction: SafeTransaction,
    pub params: ExecutionParams,
    pub operational_gas: U256,
    pub confirmation: ConfirmationState,
    pub decision: Result<SubmitMode, PolicyError>,
    pub signatures: SignatureMap,
    pub rejections: BTreeSet<Address>,
    pub submission: Option<SubmissionReceipt>,
    pub publish_status: Option<PublishStatus>,
}
