mod common;

use std::sync::Arc;

use alloy::primitives::{hex, Address, Bytes, B256, U256};
use alloy::sol_types::{SolCall, SolValue};
use serde_json::{json, Value};

use safe_authz_adapters::push::{prefixed_hash, ServiceSignature};
use safe_authz_adapters::{
    HttpPushService, HttpRelayService, LocalSignerAdapter, MemoryStoreAdapter, RpcChainReader,
};
use safe_authz_core::contract::ISafe;
use safe_authz_core::{
    aggregate, ChainReaderPort, ExecutionParams, PortError, PushMessage, PushServicePort,
    RelayServicePort, SafeTransaction, SignatureMap, SignerPort, StorePort, SubmitRequest,
};

use common::{config_for, key, recipient, safe_address, spawn_mock_server};

fn push_service(base: &str) -> (HttpPushService, Arc<LocalSignerAdapter>, Arc<MemoryStoreAdapter>) {
    let signer = Arc::new(LocalSignerAdapter::new(key(7)));
    let store = Arc::new(MemoryStoreAdapter::default());
    let service = HttpPushService::new(&config_for(base), signer.clone(), store.clone())
        .expect("push service");
    (service, signer, store)
}

#[tokio::test]
async fn notifications_carry_checksummed_devices_and_signature() {
    let (base, calls) = spawn_mock_server(Box::new(|_, _, _| (201, json!({}))));
    let (service, signer, _) = push_service(&base);
    let message = PushMessage::transaction_hash(B256::repeat_byte(1), B256::repeat_byte(2));
    let targets = [key(1).address(), key(2).address()];

    service
        .send(safe_address(), &targets, &message)
        .await
        .expect("send");

    let calls = calls.lock().expect("calls").clone();
    assert_eq!(calls.len(), 1);
    assert_eq!(calls[0].method, "POST");
    assert_eq!(calls[0].path, "/notifications/");
    let body = &calls[0].body;
    assert_eq!(body["devices"][0], targets[0].to_checksum(None));
    assert_eq!(body["devices"][1], targets[1].to_checksum(None));

    let raw = body["message"].as_str().expect("message string");
    assert_eq!(PushMessage::from_json(raw).expect("message json"), message);
    let expected = ServiceSignature::from(signer.sign(&prefixed_hash(raw)).expect("sign"));
    assert_eq!(body["signature"]["r"], expected.r);
    assert_eq!(body["signature"]["s"], expected.s);
    assert_eq!(body["signature"]["v"], expected.v);
}

#[tokio::test]
async fn notifications_without_targets_send_nothing() {
    let (base, calls) = spawn_mock_server(Box::new(|_, _, _| (201, json!({}))));
    let (service, _, _) = push_service(&base);
    let message = PushMessage::transaction_hash(B256::ZERO, B256::ZERO);
    service
        .send(safe_address(), &[], &message)
        .await
        .expect("no-op send");
    assert!(calls.lock().expect("calls").is_empty());
}

#[tokio::test]
async fn push_service_statuses_map_to_error_kinds() {
    let (base, _) = spawn_mock_server(Box::new(|_, path, _| {
        if path.starts_with("/notifications/") {
            (503, json!({ "detail": "maintenance" }))
        } else {
            (400, json!({ "pushToken": ["invalid"] }))
        }
    }));
    let (service, _, _) = push_service(&base);
    let message = PushMessage::transaction_hash(B256::ZERO, B256::ZERO);

    let err = service
        .send(safe_address(), &[recipient()], &message)
        .await
        .expect_err("server error");
    assert!(matches!(err, PortError::Transport(_)), "{err:?}");

    let err = service.sync_auth("token", false).await.expect_err("bad request");
    assert!(matches!(err, PortError::Validation(_)), "{err:?}");
}

#[tokio::test]
async fn auth_sync_runs_once_per_token_and_account() {
    let (base, calls) = spawn_mock_server(Box::new(|_, _, _| (200, json!({}))));
    let (service, signer, store) = push_service(&base);

    assert!(service.sync_auth("device-token", false).await.expect("first sync"));
    assert!(!service.sync_auth("device-token", false).await.expect("repeat sync"));
    assert!(service.sync_auth("device-token", true).await.expect("forced sync"));
    assert!(service.sync_auth("rotated-token", false).await.expect("new token"));

    let calls = calls.lock().expect("calls").clone();
    assert_eq!(calls.len(), 3);
    assert!(calls.iter().all(|c| c.path == "/auth/"));
    let body = &calls[0].body;
    assert_eq!(body["pushToken"], "device-token");
    assert_eq!(body["versionName"], env!("CARGO_PKG_VERSION"));
    assert_eq!(body["client"], "safe-authz");

    let signed = format!("device-token{}safe-authz", env!("CARGO_PKG_VERSION"));
    let expected = ServiceSignature::from(signer.sign(&prefixed_hash(&signed)).expect("sign"));
    assert_eq!(body["signatures"][0]["r"], expected.r);

    let record = store.last_synced_push().expect("store").expect("record");
    assert_eq!(record.push_token, "rotated-token");
    assert_eq!(record.account, signer.address());
}

#[tokio::test]
async fn relay_estimate_parses_decimal_fields() {
    let (base, calls) = spawn_mock_server(Box::new(|_, _, _| {
        (
            200,
            json!({
                "safeTxGas": "100000",
                "dataGas": "21000",
                "operationalGas": "5000",
                "gasPrice": "1000000000",
                "gasToken": Address::ZERO,
                "lastUsedNonce": "4"
            }),
        )
    }));
    let relay = HttpRelayService::new(&config_for(&base)).expect("relay");
    let tx = SafeTransaction::call(recipient(), U256::from(10u8), Some(Bytes::from(vec![1, 2])));

    let estimate = relay.estimate(safe_address(), &tx).await.expect("estimate");
    assert_eq!(estimate.params.tx_gas, U256::from(100_000u64));
    assert_eq!(estimate.params.gas_price, U256::from(1_000_000_000u64));
    assert_eq!(estimate.operational_gas, U256::from(5_000u64));
    assert_eq!(estimate.last_used_nonce, Some(U256::from(4u8)));

    let calls = calls.lock().expect("calls").clone();
    assert_eq!(
        calls[0].path,
        format!(
            "/safes/{}/transactions/estimate/",
            safe_address().to_checksum(None)
        )
    );
    assert_eq!(calls[0].body["value"], "10");
    assert_eq!(calls[0].body["data"], "0x0102");
    assert_eq!(calls[0].body["operation"], 0);
}

#[tokio::test]
async fn relay_estimate_rejects_malformed_numbers() {
    let (base, _) = spawn_mock_server(Box::new(|_, _, _| {
        (
            200,
            json!({
                "safeTxGas": "lots",
                "dataGas": "0",
                "operationalGas": "0",
                "gasPrice": "0",
                "gasToken": Address::ZERO
            }),
        )
    }));
    let relay = HttpRelayService::new(&config_for(&base)).expect("relay");
    let tx = SafeTransaction::call(recipient(), U256::ZERO, None);
    let err = relay.estimate(safe_address(), &tx).await.expect_err("bad decimal");
    assert!(matches!(err, PortError::Validation(_)));
}

fn submit_request() -> SubmitRequest {
    let digest = B256::repeat_byte(0x0d);
    let mut signatures = SignatureMap::new();
    for seed in [3u8, 4] {
        let signer = LocalSignerAdapter::new(key(seed));
        signatures.insert(signer.address(), signer.sign(&digest).expect("sign"));
    }
    SubmitRequest {
        safe: safe_address(),
        transaction: SafeTransaction {
            nonce: Some(U256::from(5u8)),
            ..SafeTransaction::call(recipient(), U256::from(1u8), None)
        },
        params: ExecutionParams {
            tx_gas: U256::from(60_000u64),
            data_gas: U256::from(20_000u64),
            gas_price: U256::from(2u8),
            gas_token: Address::ZERO,
        },
        operational_gas: U256::from(1_000u64),
        digest,
        signatures: aggregate(&signatures, 2).expect("aggregate"),
    }
}

#[tokio::test]
async fn relay_submit_splits_signatures_and_returns_chain_hash() {
    let chain_hash = B256::repeat_byte(0xee);
    let (base, calls) = spawn_mock_server(Box::new(move |_, _, _| {
        (201, json!({ "transactionHash": chain_hash }))
    }));
    let relay = HttpRelayService::new(&config_for(&base)).expect("relay");
    let request = submit_request();

    assert_eq!(relay.submit(&request).await.expect("submit"), chain_hash);

    let calls = calls.lock().expect("calls").clone();
    assert_eq!(
        calls[0].path,
        format!("/safes/{}/transactions/", safe_address().to_checksum(None))
    );
    let body = &calls[0].body;
    assert_eq!(body["nonce"], "5");
    assert_eq!(body["safeTxGas"], "60000");
    assert_eq!(body["data"], "0x");
    let sent = body["signatures"].as_array().expect("signatures");
    assert_eq!(sent.len(), 2);
    let first = safe_authz_core::Signature::from_bytes(&request.signatures[..65]).expect("first");
    assert_eq!(sent[0]["r"], first.r.to_string());
    assert_eq!(sent[0]["v"], first.v);
}

#[tokio::test]
async fn relay_submit_requires_a_nonce_and_whole_signatures() {
    let (base, calls) = spawn_mock_server(Box::new(|_, _, _| (201, json!({}))));
    let relay = HttpRelayService::new(&config_for(&base)).expect("relay");

    let mut request = submit_request();
    request.transaction.nonce = None;
    let err = relay.submit(&request).await.expect_err("missing nonce");
    assert!(matches!(err, PortError::Validation(_)));

    let mut request = submit_request();
    request.signatures = Bytes::from(vec![0u8; 64]);
    let err = relay.submit(&request).await.expect_err("truncated signatures");
    assert!(matches!(err, PortError::Validation(_)));

    assert!(calls.lock().expect("calls").is_empty());
}

fn rpc_result(result: Value) -> (u16, Value) {
    (200, json!({ "jsonrpc": "2.0", "id": 1, "result": result }))
}

fn eth_call_selector(body: &Value) -> String {
    body["params"][0]["data"]
        .as_str()
        .unwrap_or_default()
        .chars()
        .take(10)
        .collect()
}

fn safe_node(with_version: bool) -> common::Route {
    let owners = vec![key(1).address(), key(2).address(), key(3).address()];
    Box::new(move |_, _, body| match body["method"].as_str().unwrap_or_default() {
        "eth_call" => {
            let selector = eth_call_selector(body);
            let encoded = if selector == hex::encode_prefixed(ISafe::getOwnersCall::SELECTOR) {
                owners.clone().abi_encode()
            } else if selector == hex::encode_prefixed(ISafe::getThresholdCall::SELECTOR) {
                U256::from(2u8).abi_encode()
            } else if selector == hex::encode_prefixed(ISafe::nonceCall::SELECTOR) {
                U256::from(7u8).abi_encode()
            } else if with_version {
                "1.1.1".to_owned().abi_encode()
            } else {
                return (
                    200,
                    json!({ "jsonrpc": "2.0", "id": 1, "error": { "code": -32000, "message": "execution reverted" } }),
                );
            };
            rpc_result(json!(hex::encode_prefixed(encoded)))
        }
        "eth_getBalance" => rpc_result(json!("0x64")),
        _ => (404, json!({})),
    })
}

#[tokio::test]
async fn safe_state_reads_owners_threshold_nonce_and_version() {
    let (base, calls) = spawn_mock_server(safe_node(true));
    let reader = RpcChainReader::new(&config_for(&base)).expect("reader");

    let state = reader.safe_state(safe_address()).await.expect("state");
    assert_eq!(
        state.owners,
        vec![key(1).address(), key(2).address(), key(3).address()]
    );
    assert_eq!(state.threshold, 2);
    assert_eq!(state.nonce, U256::from(7u8));
    assert_eq!(state.balance, U256::from(100u8));
    assert_eq!(state.version, Some(semver::Version::new(1, 1, 1)));

    let calls = calls.lock().expect("calls").clone();
    assert_eq!(calls.len(), 5);
    assert!(calls.iter().all(|c| c.body["jsonrpc"] == "2.0"));
}

#[tokio::test]
async fn safe_state_tolerates_missing_version() {
    let (base, _) = spawn_mock_server(safe_node(false));
    let reader = RpcChainReader::new(&config_for(&base)).expect("reader");
    let state = reader.safe_state(safe_address()).await.expect("state");
    assert_eq!(state.version, None);
    assert_eq!(state.threshold, 2);
}

#[tokio::test]
async fn receipts_report_pending_success_and_failure() {
    let event_topic = B256::repeat_byte(0xaa);
    let (base, _) = spawn_mock_server(Box::new(move |_, _, body| {
        let hash = body["params"][0].as_str().unwrap_or_default().to_owned();
        if hash.ends_with("01") {
            return rpc_result(Value::Null);
        }
        let status = if hash.ends_with("02") { "0x1" } else { "0x0" };
        rpc_result(json!({
            "transactionHash": hash,
            "status": status,
            "logs": [{ "address": safe_address(), "topics": [event_topic], "data": "0x" }]
        }))
    }));
    let reader = RpcChainReader::new(&config_for(&base)).expect("reader");

    let pending = B256::left_padding_from(&[0x01]);
    assert_eq!(reader.transaction_receipt(pending).await.expect("pending"), None);

    let mined = B256::left_padding_from(&[0x02]);
    let receipt = reader
        .transaction_receipt(mined)
        .await
        .expect("receipt")
        .expect("mined");
    assert!(receipt.success);
    assert_eq!(receipt.transaction_hash, mined);
    assert_eq!(receipt.logs[0].address, safe_address());
    assert_eq!(receipt.logs[0].topics, vec![event_topic]);

    let reverted = B256::left_padding_from(&[0x03]);
    let receipt = reader
        .transaction_receipt(reverted)
        .await
        .expect("receipt")
        .expect("mined");
    assert!(!receipt.success);
}

#[tokio::test]
async fn rpc_errors_surface_as_transport_errors() {
    let (base, _) = spawn_mock_server(Box::new(|_, _, _| {
        (200, json!({ "jsonrpc": "2.0", "id": 1, "error": { "code": -32005, "message": "rate limited" } }))
    }));
    let reader = RpcChainReader::new(&config_for(&base)).expect("reader");
    let err = reader
        .transaction_receipt(B256::ZERO)
        .await
        .expect_err("rpc error");
    assert!(matches!(err, PortError::Transport(_)));
}
