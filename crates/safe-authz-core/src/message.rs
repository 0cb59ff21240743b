//! Push-service wire messages. Integers travel as decimal strings, byte
//! fields as `0x`-prefixed lowercase hex, addresses as checksummed hex.

use std::str::FromStr;

use alloy::primitives::{hex, Address, Bytes, B256, U256};
use serde::{Deserialize, Serialize};

use crate::domain::{
    ExecutionParams, Operation, RelayKey, RelayMessage, SafeTransaction, Signature,
};
use crate::error::EncodingError;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum PushMessage {
    #[serde(rename_all = "camelCase")]
    RequestConfirmation {
        hash: String,
        safe: String,
        to: String,
        value: String,
        data: String,
        operation: String,
        tx_gas: String,
        data_gas: String,
        operational_gas: String,
        gas_price: String,
        gas_token: String,
        refund_receiver: String,
        nonce: String,
    },
    ConfirmTransaction {
        hash: String,
        r: String,
        s: String,
        v: String,
    },
    RejectTransaction {
        hash: String,
        r: String,
        s: String,
        v: String,
    },
    #[serde(rename_all = "camelCase")]
    SendTransactionHash { hash: String, chain_hash: String },
}

/// A decoded `requestConfirmation` push.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConfirmationRequest {
    pub digest: B256,
    pub safe: Address,
    pub transaction: SafeTransaction,
    pub params: ExecutionParams,
    pub operational_gas: U256,
}

impl PushMessage {
    pub fn request_confirmation(
        digest: B256,
        safe: Address,
        tx: &SafeTransaction,
        params: &ExecutionParams,
        operational_gas: U256,
    ) -> Self {
        PushMessage::RequestConfirmation {
            hash: hex::encode_prefixed(digest),
            safe: safe.to_checksum(None),
            to: tx.to.to_checksum(None),
            value: tx.value.to_string(),
            data: tx
                .data
                .as_ref()
                .map(hex::encode_prefixed)
                .unwrap_or_default(),
            operation: tx.operation.code().to_string(),
            tx_gas: params.tx_gas.to_string(),
            data_gas: params.data_gas.to_string(),
            operational_gas: operational_gas.to_string(),
            gas_price: params.gas_price.to_string(),
            gas_token: params.gas_token.to_checksum(None),
            refund_receiver: "0".to_owned(),
            nonce: tx.nonce.unwrap_or_default().to_string(),
        }
    }

    pub fn confirmation(digest: B256, signature: &Signature) -> Self {
        PushMessage::ConfirmTransaction {
            hash: hex::encode_prefixed(digest),
            r: signature.r.to_string(),
            s: signature.s.to_string(),
            v: signature.v.to_string(),
        }
    }

    pub fn rejection(digest: B256, signature: &Signature) -> Self {
        PushMessage::RejectTransaction {
            hash: hex::encode_prefixed(digest),
            r: signature.r.to_string(),
            s: signature.s.to_string(),
            v: signature.v.to_string(),
        }
    }

    pub fn transaction_hash(digest: B256, chain_hash: B256) -> Self {
        PushMessage::SendTransactionHash {
            hash: hex::encode_prefixed(digest),
            chain_hash: hex::encode_prefixed(chain_hash),
        }
    }

    pub fn from_json(raw: &str) -> Result<Self, EncodingError> {
        serde_json::from_str(raw).map_err(|e| EncodingError::Json(e.to_string()))
    }

    pub fn to_json(&self) -> Result<String, EncodingError> {
        serde_json::to_string(self).map_err(|e| EncodingError::Json(e.to_string()))
    }

    /// Relay key and payload for confirm/reject pushes, `None` for the rest.
    pub fn relay_delivery(&self) -> Result<Option<(RelayKey, RelayMessage)>, EncodingError> {
        match self {
            PushMessage::ConfirmTransaction { hash, r, s, v } => {
                let signature = decimal_signature(r, s, v)?;
                Ok(Some((
                    RelayKey::Transaction(parse_b256(hash)?),
                    RelayMessage::Confirmed(signature),
                )))
            }
            PushMessage::RejectTransaction { hash, r, s, v } => {
                let signature = decimal_signature(r, s, v)?;
                Ok(Some((
                    RelayKey::Transaction(parse_b256(hash)?),
                    RelayMessage::Rejected(signature),
                )))
            }
            _ => Ok(None),
        }
    }

    pub fn confirmation_request(&self) -> Result<Option<ConfirmationRequest>, EncodingError> {
        let PushMessage::RequestConfirmation {
            hash,
            safe,
            to,
            value,
            data,
            operation,
            tx_gas,
            data_gas,
            operational_gas,
            gas_price,
            gas_token,
            nonce,
            ..
        } = self
        else {
            return Ok(None);
        };
        let data = if data.is_empty() {
            None
        } else {
            Some(Bytes::from(
                hex::decode(data).map_err(|e| EncodingError::Hex(e.to_string()))?,
            ))
        };
        let operation_code: u8 = operation
            .parse()
            .map_err(|_| EncodingError::Integer(operation.clone()))?;
        Ok(Some(ConfirmationRequest {
            digest: parse_b256(hash)?,
            safe: parse_address(safe)?,
            transaction: SafeTransaction {
                to: parse_address(to)?,
                value: parse_decimal(value)?,
                data,
                operation: Operation::from_code(operation_code)?,
                nonce: Some(parse_decimal(nonce)?),
            },
            params: ExecutionParams {
                tx_gas: parse_decimal(tx_gas)?,
                data_gas: parse_decimal(data_gas)?,
                gas_price: parse_decimal(gas_price)?,
                gas_token: parse_address(gas_token)?,
            },
            operational_gas: parse_decimal(operational_gas)?,
        }))
    }
}

fn decimal_signature(r: &str, s: &str, v: &str) -> Result<Signature, EncodingError> {
    let v: u8 = v.parse().map_err(|_| EncodingError::Integer(v.to_owned()))?;
    Ok(Signature::new(parse_decimal(r)?, parse_decimal(s)?, v))
}

pub(crate) fn parse_decimal(raw: &str) -> Result<U256, EncodingError> {
    U256::from_str_radix(raw, 10).map_err(|e| EncodingError::Integer(format!("{raw}: {e}")))
}

pub(crate) fn parse_b256(raw: &str) -> Result<B256, EncodingError> {
    B256::from_str(raw).map_err(|e| EncodingError::Hex(format!("{raw}: {e}")))
}

pub(crate) fn parse_address(raw: &str) -> Result<Address, EncodingError> {
    Address::from_str(raw).map_err(|e| EncodingError::Hex(format!("{raw}: {e}")))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn confirm_push_uses_type_tag_and_decimal_fields() {
        let signature = Signature::new(U256::from(7u8), U256::from(9u8), 28);
        let msg = PushMessage::confirmation(B256::repeat_byte(0xab), &signature);
        let json: serde_json::Value =
            serde_json::from_str(&msg.to_json().expect("json")).expect("value");
        assert_eq!(json["type"], "confirmTransaction");
        assert_eq!(json["r"], "7");
        assert_eq!(json["v"], "28");
        assert!(json["hash"].as_str().expect("hash").starts_with("0xabab"));
    }

    #[test]
    fn unknown_type_is_rejected() {
        let err = PushMessage::from_json(r#"{"type":"safeCreation","safe":"0x0"}"#)
            .expect_err("unknown type");
        assert!(matches!(err, EncodingError::Json(_)));
    }
}
