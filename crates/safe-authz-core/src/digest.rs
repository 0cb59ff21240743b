//! Byte-exact digests that Safe owners sign.
//!
//! The canonical transaction digest is the EIP-712 `SafeTx` hash under a domain
//! keyed only by the Safe address. The older ERC-191 concatenation layout is kept
//! as a versioned variant for Safes that still verify it.

use alloy::dyn_abi::TypedData;
use alloy::primitives::{b256, hex, keccak256, Address, B256, U256};
use semver::Version;
use serde::{Deserialize, Serialize};

use crate::domain::{ExecutionParams, SafeTransaction};
use crate::error::EncodingError;

/// `keccak256("EIP712Domain(address verifyingContract)")`
pub const DOMAIN_SEPARATOR_TYPEHASH: B256 =
    b256!("035aff83d86937d35b32e04f0ddc6ff469290eef2f1b692d8a815c89404d4749");

/// `SafeTx(...)` with `baseGas`, used from contract version 1.0.0.
pub const SAFE_TX_TYPEHASH: B256 =
    b256!("bb8310d486368db6bd6f849402fdd73ad53d316b5a4b2644ad6efe0f941286d8");

/// `SafeTx(...)` with `dataGas`, used before 1.0.0.
pub const SAFE_TX_TYPEHASH_V0: B256 =
    b256!("14d461bc7412367e924637b363c7bf29b8f47e2f84869f4426e5633d8af47b20");

/// `keccak256("SafeMessage(bytes message)")`
pub const SAFE_MESSAGE_TYPEHASH: B256 =
    b256!("60b3cbf8b4a223d68d641b3b6ddf9a298e7f33710cf3d3a9d1146b5a6150fbca");

const ERC191_BYTE: u8 = 0x19;
const ERC191_VERSION: u8 = 0x00;
const EIP712_VERSION: u8 = 0x01;

const REJECTION_PREFIX: &str = "GNO";
const REJECTION_SUFFIX: &str = "rejectTransaction";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum SafeTxVersion {
    V0,
    V1,
}

/// How `data` enters the ERC-191 layout.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum DataEncoding {
    Raw,
    Hashed,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum DigestScheme {
    Eip712(SafeTxVersion),
    Erc191(DataEncoding),
}

impl Default for DigestScheme {
    fn default() -> Self {
        DigestScheme::Eip712(SafeTxVersion::V1)
    }
}

impl DigestScheme {
    pub fn for_version(version: &Version) -> Self {
        if *version >= Version::new(1, 0, 0) {
            DigestScheme::Eip712(SafeTxVersion::V1)
        } else {
            DigestScheme::Eip712(SafeTxVersion::V0)
        }
    }
}

pub fn domain_separator(safe: Address) -> B256 {
    let mut buf = Vec::with_capacity(64);
    buf.extend_from_slice(DOMAIN_SEPARATOR_TYPEHASH.as_slice());
    buf.extend_from_slice(safe.into_word().as_slice());
    keccak256(buf)
}

/// Digest of a Safe transaction. The nonce must already be resolved.
pub fn transaction_digest(
    scheme: DigestScheme,
    safe: Address,
    tx: &SafeTransaction,
    fees: &ExecutionParams,
) -> Result<B256, EncodingError> {
    let nonce = tx.resolved_nonce()?;
    Ok(match scheme {
        DigestScheme::Eip712(version) => {
            let typehash = match version {
                SafeTxVersion::V0 => SAFE_TX_TYPEHASH_V0,
                SafeTxVersion::V1 => SAFE_TX_TYPEHASH,
            };
            let struct_hash = safe_tx_struct_hash(typehash, tx, fees, nonce);
            eip712_digest(domain_separator(safe), struct_hash)
        }
        DigestScheme::Erc191(encoding) => erc191_digest(encoding, safe, tx, fees, nonce),
    })
}

fn safe_tx_struct_hash(
    typehash: B256,
    tx: &SafeTransaction,
    fees: &ExecutionParams,
    nonce: U256,
) -> B256 {
    let mut buf = Vec::with_capacity(11 * 32);
    buf.extend_from_slice(typehash.as_slice());
    buf.extend_from_slice(tx.to.into_word().as_slice());
    buf.extend_from_slice(&tx.value.to_be_bytes::<32>());
    buf.extend_from_slice(keccak256(tx.data_bytes()).as_slice());
    buf.extend_from_slice(&U256::from(tx.operation.code()).to_be_bytes::<32>());
    buf.extend_from_slice(&fees.tx_gas.to_be_bytes::<32>());
    buf.extend_from_slice(&fees.data_gas.to_be_bytes::<32>());
    buf.extend_from_slice(&fees.gas_price.to_be_bytes::<32>());
    buf.extend_from_slice(fees.gas_token.into_word().as_slice());
    // refundReceiver is always the zero address
    buf.extend_from_slice(Address::ZERO.into_word().as_slice());
    buf.extend_from_slice(&nonce.to_be_bytes::<32>());
    keccak256(buf)
}

fn erc191_digest(
    encoding: DataEncoding,
    safe: Address,
    tx: &SafeTransaction,
    fees: &ExecutionParams,
    nonce: U256,
) -> B256 {
    let data = tx.data_bytes();
    let mut buf = Vec::with_capacity(2 + 20 + 20 + 32 + data.len() + 1 + 3 * 32 + 20 + 32);
    buf.push(ERC191_BYTE);
    buf.push(ERC191_VERSION);
    buf.extend_from_slice(safe.as_slice());
    buf.extend_from_slice(tx.to.as_slice());
    buf.extend_from_slice(&tx.value.to_be_bytes::<32>());
    match encoding {
        DataEncoding::Raw => buf.extend_from_slice(data),
        DataEncoding::Hashed => buf.extend_from_slice(keccak256(data).as_slice()),
    }
    buf.push(tx.operation.code());
    buf.extend_from_slice(&fees.tx_gas.to_be_bytes::<32>());
    buf.extend_from_slice(&fees.data_gas.to_be_bytes::<32>());
    buf.extend_from_slice(&fees.gas_price.to_be_bytes::<32>());
    buf.extend_from_slice(fees.gas_token.as_slice());
    buf.extend_from_slice(&nonce.to_be_bytes::<32>());
    keccak256(buf)
}

fn eip712_digest(domain_separator: B256, struct_hash: B256) -> B256 {
    let mut buf = [0u8; 66];
    buf[0] = ERC191_BYTE;
    buf[1] = EIP712_VERSION;
    buf[2..34].copy_from_slice(domain_separator.as_slice());
    buf[34..].copy_from_slice(struct_hash.as_slice());
    keccak256(buf)
}

/// Wraps `message` in a `SafeMessage` under the Safe's own domain.
pub fn safe_message_digest(safe: Address, message: &[u8]) -> B256 {
    let mut buf = Vec::with_capacity(64);
    buf.extend_from_slice(SAFE_MESSAGE_TYPEHASH.as_slice());
    buf.extend_from_slice(keccak256(message).as_slice());
    eip712_digest(domain_separator(safe), keccak256(buf))
}

/// EIP-712 signing hash of arbitrary typed data, under its own domain.
pub fn typed_data_digest(typed: &TypedData) -> Result<B256, EncodingError> {
    typed
        .eip712_signing_hash()
        .map_err(|e| EncodingError::TypedData(e.to_string()))
}

/// Digest a Safe owner signs to approve `typed` on behalf of the Safe.
pub fn typed_data_safe_digest(safe: Address, typed: &TypedData) -> Result<B256, EncodingError> {
    let inner = typed_data_digest(typed)?;
    Ok(safe_message_digest(safe, inner.as_slice()))
}

pub fn parse_typed_data(json: &str) -> Result<TypedData, EncodingError> {
    serde_json::from_str(json).map_err(|e| EncodingError::TypedData(e.to_string()))
}

/// Hash an owner signs to reject the transaction with digest `tx_digest`.
pub fn rejection_digest(tx_digest: B256) -> B256 {
    let preimage = format!(
        "{REJECTION_PREFIX}{}{REJECTION_SUFFIX}",
        hex::encode_prefixed(tx_digest)
    );
    keccak256(preimage.as_bytes())
}
