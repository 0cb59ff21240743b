use alloy::primitives::{hex, Address, Bytes, B256, U256};
use alloy::sol_types::SolCall;
use async_trait::async_trait;
use serde::Deserialize;
use serde_json::{json, Value};
use tracing::debug;

use safe_authz_core::contract::ISafe;
use safe_authz_core::{
    ChainReaderPort, PortError, ReceiptLog, SafeState, TransactionReceipt,
};

use crate::config::AuthzConfig;

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RpcReceipt {
    transaction_hash: B256,
    #[serde(default)]
    status: Option<String>,
    #[serde(default)]
    logs: Vec<RpcLog>,
}

#[derive(Debug, Deserialize)]
struct RpcLog {
    address: Address,
    #[serde(default)]
    topics: Vec<B256>,
}

/// Reads safe state and receipts over plain JSON-RPC.
#[derive(Debug, Clone)]
pub struct RpcChainReader {
    url: String,
    client: reqwest::Client,
}

impl RpcChainReader {
    pub fn new(config: &AuthzConfig) -> Result<Self, PortError> {
        Ok(Self {
            url: config.rpc_url.clone(),
            client: config.http_client()?,
        })
    }

    async fn rpc_call(&self, method: &str, params: Value) -> Result<Value, PortError> {
        let payload = json!({
            "jsonrpc": "2.0",
            "id": 1,
            "method": method,
            "params": params,
        });
        let response = self
            .client
            .post(&self.url)
            .json(&payload)
            .send()
            .await
            .map_err(|e| PortError::Transport(format!("rpc request failed: {e}")))?;
        let status = response.status();
        let body: Value = response
            .json()
            .await
            .map_err(|e| PortError::Transport(format!("rpc json decode failed: {e}")))?;
        if !status.is_success() {
            return Err(PortError::Transport(format!("rpc status {status}: {body}")));
        }
        if let Some(err) = body.get("error") {
            return Err(PortError::Transport(format!("rpc returned error: {err}")));
        }
        body.get("result")
            .cloned()
            .ok_or_else(|| PortError::Transport("rpc missing result".to_owned()))
    }

    async fn eth_call<C: SolCall>(&self, to: Address, call: C) -> Result<C::Return, PortError> {
        let data = hex::encode_prefixed(call.abi_encode());
        let result = self
            .rpc_call(
                "eth_call",
                json!([{ "to": to.to_checksum(None), "data": data }, "latest"]),
            )
            .await?;
        let raw: Bytes = serde_json::from_value(result)
            .map_err(|e| PortError::Validation(format!("eth_call result is not hex: {e}")))?;
        C::abi_decode_returns(&raw, true)
            .map_err(|e| PortError::Validation(format!("{} decode failed: {e}", C::SIGNATURE)))
    }
}

#[async_trait]
impl ChainReaderPort for RpcChainReader {
    async fn safe_state(&self, safe: Address) -> Result<SafeState, PortError> {
        let owners = self.eth_call(safe, ISafe::getOwnersCall {}).await?._0;
        let threshold = self.eth_call(safe, ISafe::getThresholdCall {}).await?._0;
        let nonce = self.eth_call(safe, ISafe::nonceCall {}).await?._0;
        let version = match self.eth_call(safe, ISafe::VERSIONCall {}).await {
            Ok(ret) => semver::Version::parse(&ret._0).ok(),
            Err(e) => {
                debug!(%safe, error = %e, "safe reports no version");
                None
            }
        };
        let balance_hex = self
            .rpc_call("eth_getBalance", json!([safe.to_checksum(None), "latest"]))
            .await?;
        let balance: U256 = serde_json::from_value(balance_hex)
            .map_err(|e| PortError::Validation(format!("balance is not a quantity: {e}")))?;

        Ok(SafeState {
            owners,
            threshold: usize::try_from(threshold)
                .map_err(|e| PortError::Validation(format!("threshold out of range: {e}")))?,
            nonce,
            balance,
            version,
        })
    }

    async fn transaction_receipt(
        &self,
        tx_hash: B256,
    ) -> Result<Option<TransactionReceipt>, PortError> {
        let result = self
            .rpc_call("eth_getTransactionReceipt", json!([tx_hash]))
            .await?;
        if result.is_null() {
            return Ok(None);
        }
        let receipt: RpcReceipt = serde_json::from_value(result)
            .map_err(|e| PortError::Validation(format!("malformed receipt: {e}")))?;
        let success = match receipt.status.as_deref() {
            Some(status) => parse_quantity(status)? == 1,
            None => true,
        };
        Ok(Some(TransactionReceipt {
            transaction_hash: receipt.transaction_hash,
            success,
            logs: receipt
                .logs
                .into_iter()
                .map(|log| ReceiptLog {
                    address: log.address,
                    topics: log.topics,
                })
                .collect(),
        }))
    }
}

fn parse_quantity(raw: &str) -> Result<u64, PortError> {
    let digits = raw.strip_prefix("0x").unwrap_or(raw);
    u64::from_str_radix(digits, 16)
        .map_err(|e| PortError::Validation(format!("invalid quantity {raw}: {e}")))
}
