use alloy::primitives::{hex, Address, B256, U256};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::debug;

use safe_authz_core::{
    split_signatures, ExecutionEstimate, ExecutionParams, PortError, RelayServicePort,
    SafeTransaction, SubmitRequest,
};

use crate::config::AuthzConfig;
use crate::push::ServiceSignature;

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct EstimateBody {
    to: String,
    value: String,
    data: String,
    operation: u8,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct EstimateResponse {
    safe_tx_gas: String,
    data_gas: String,
    operational_gas: String,
    gas_price: String,
    gas_token: Address,
    #[serde(default)]
    last_used_nonce: Option<String>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct ExecuteBody {
    to: String,
    value: String,
    data: String,
    operation: u8,
    signatures: Vec<ServiceSignature>,
    safe_tx_gas: String,
    data_gas: String,
    gas_price: String,
    gas_token: String,
    nonce: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ExecuteResponse {
    transaction_hash: B256,
}

/// Client for the relay service that estimates fees and executes fully
/// signed transactions on behalf of the safe.
#[derive(Debug, Clone)]
pub struct HttpRelayService {
    base_url: String,
    client: reqwest::Client,
}

impl HttpRelayService {
    pub fn new(config: &AuthzConfig) -> Result<Self, PortError> {
        Ok(Self {
            base_url: config.relay_service_url.trim_end_matches('/').to_owned(),
            client: config.http_client()?,
        })
    }

    async fn post<B: Serialize, R: for<'de> Deserialize<'de>>(
        &self,
        url: String,
        body: &B,
    ) -> Result<R, PortError> {
        let response = self
            .client
            .post(&url)
            .json(body)
            .send()
            .await
            .map_err(|e| PortError::Transport(format!("relay service request failed: {e}")))?;
        let status = response.status();
        let body: Value = response
            .json()
            .await
            .map_err(|e| PortError::Transport(format!("relay service json decode failed: {e}")))?;
        if status.is_server_error() {
            return Err(PortError::Transport(format!(
                "relay service status {status}: {body}"
            )));
        }
        if !status.is_success() {
            return Err(PortError::Validation(format!(
                "relay service status {status}: {body}"
            )));
        }
        serde_json::from_value(body)
            .map_err(|e| PortError::Validation(format!("unexpected relay service response: {e}")))
    }
}

#[async_trait]
impl RelayServicePort for HttpRelayService {
    async fn estimate(
        &self,
        safe: Address,
        tx: &SafeTransaction,
    ) -> Result<ExecutionEstimate, PortError> {
        let url = format!(
            "{}/safes/{}/transactions/estimate/",
            self.base_url,
            safe.to_checksum(None)
        );
        let body = EstimateBody {
            to: tx.to.to_checksum(None),
            value: tx.value.to_string(),
            data: hex::encode_prefixed(tx.data_bytes()),
            operation: tx.operation.code(),
        };
        let estimate: EstimateResponse = self.post(url, &body).await?;
        let last_used_nonce = estimate
            .last_used_nonce
            .as_deref()
            .map(decimal)
            .transpose()?;
        Ok(ExecutionEstimate {
            params: ExecutionParams {
                tx_gas: decimal(&estimate.safe_tx_gas)?,
                data_gas: decimal(&estimate.data_gas)?,
                gas_price: decimal(&estimate.gas_price)?,
                gas_token: estimate.gas_token,
            },
            operational_gas: decimal(&estimate.operational_gas)?,
            last_used_nonce,
        })
    }

    async fn submit(&self, request: &SubmitRequest) -> Result<B256, PortError> {
        let signatures = split_signatures(&request.signatures)
            .map_err(|e| PortError::Validation(e.to_string()))?;
        let nonce = request
            .transaction
            .resolved_nonce()
            .map_err(|e| PortError::Validation(e.to_string()))?;
        let url = format!(
            "{}/safes/{}/transactions/",
            self.base_url,
            request.safe.to_checksum(None)
        );
        let tx = &request.transaction;
        let body = ExecuteBody {
            to: tx.to.to_checksum(None),
            value: tx.value.to_string(),
            data: hex::encode_prefixed(tx.data_bytes()),
            operation: tx.operation.code(),
            signatures: signatures.into_iter().map(ServiceSignature::from).collect(),
            safe_tx_gas: request.params.tx_gas.to_string(),
            data_gas: request.params.data_gas.to_string(),
            gas_price: request.params.gas_price.to_string(),
            gas_token: request.params.gas_token.to_checksum(None),
            nonce: nonce.to_string(),
        };
        let executed: ExecuteResponse = self.post(url, &body).await?;
        debug!(safe = %request.safe, chain_hash = %executed.transaction_hash, "relay accepted transaction");
        Ok(executed.transaction_hash)
    }
}

fn decimal(raw: &str) -> Result<U256, PortError> {
    U256::from_str_radix(raw, 10)
        .map_err(|e| PortError::Validation(format!("invalid decimal {raw}: {e}")))
}
