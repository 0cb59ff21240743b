use std::sync::Arc;

use alloy::primitives::{Address, B256, U256};

use safe_authz_adapters::{MemoryStoreAdapter, PushMessageRouter, PushTopicAdapter, Routed, TopicChange};
use safe_authz_core::{
    ExecutionParams, PushMessage, RelayKey, RelayMessage, SafeTransaction, Signature,
    SignatureRelay, StorePort, TopicPort,
};

fn signature() -> Signature {
    Signature::new(U256::from(11u8), U256::from(22u8), 27)
}

struct Harness {
    store: Arc<MemoryStoreAdapter>,
    topics: PushTopicAdapter,
    changes: tokio::sync::mpsc::UnboundedReceiver<TopicChange>,
    relay: SignatureRelay,
    router: PushMessageRouter,
    confirmations: tokio::sync::mpsc::UnboundedReceiver<safe_authz_core::ConfirmationRequest>,
}

fn harness() -> Harness {
    let store = Arc::new(MemoryStoreAdapter::default());
    let (topics, changes) = PushTopicAdapter::new(store.clone());
    let relay = SignatureRelay::new(Arc::new(topics.clone()));
    let (router, confirmations) = PushMessageRouter::new(relay.clone());
    Harness {
        store,
        topics,
        changes,
        relay,
        router,
        confirmations,
    }
}

#[test]
fn confirmations_reach_relay_listeners() {
    let h = harness();
    let digest = B256::repeat_byte(0x42);
    let mut subscription = h
        .relay
        .observe(RelayKey::Transaction(digest))
        .expect("observe");

    let raw = PushMessage::confirmation(digest, &signature())
        .to_json()
        .expect("json");
    assert_eq!(h.router.handle(&raw), Routed::Relayed(1));
    assert_eq!(
        subscription.try_recv(),
        Some(RelayMessage::Confirmed(signature()))
    );

    let raw = PushMessage::rejection(digest, &signature())
        .to_json()
        .expect("json");
    assert_eq!(h.router.handle(&raw), Routed::Relayed(1));
    assert_eq!(
        subscription.try_recv(),
        Some(RelayMessage::Rejected(signature()))
    );
}

#[test]
fn confirmations_without_listeners_are_not_errors() {
    let h = harness();
    let raw = PushMessage::confirmation(B256::repeat_byte(1), &signature())
        .to_json()
        .expect("json");
    assert_eq!(h.router.handle(&raw), Routed::Relayed(0));
}

#[test]
fn confirmation_requests_are_queued_for_the_app() {
    let mut h = harness();
    let safe = Address::repeat_byte(0x51);
    let tx = SafeTransaction {
        nonce: Some(U256::from(3u8)),
        ..SafeTransaction::call(Address::repeat_byte(0x77), U256::from(5u8), None)
    };
    let params = ExecutionParams {
        tx_gas: U256::from(50_000u64),
        data_gas: U256::from(10_000u64),
        gas_price: U256::from(7u8),
        gas_token: Address::ZERO,
    };
    let digest = B256::repeat_byte(0x99);
    let raw = PushMessage::request_confirmation(digest, safe, &tx, &params, U256::from(9u8))
        .to_json()
        .expect("json");

    assert_eq!(h.router.handle(&raw), Routed::ConfirmationRequest);
    let request = h.confirmations.try_recv().expect("queued request");
    assert_eq!(request.digest, digest);
    assert_eq!(request.safe, safe);
    assert_eq!(request.transaction, tx);
    assert_eq!(request.params, params);
    assert_eq!(request.operational_gas, U256::from(9u8));
}

#[test]
fn other_payloads_are_ignored_or_dropped() {
    let h = harness();
    let raw = PushMessage::transaction_hash(B256::repeat_byte(1), B256::repeat_byte(2))
        .to_json()
        .expect("json");
    assert_eq!(h.router.handle(&raw), Routed::Ignored);

    assert_eq!(h.router.handle("{not json"), Routed::Dropped);
    assert_eq!(
        h.router.handle(r#"{"type":"safeCreation","safe":"0x0"}"#),
        Routed::Dropped
    );
    let bad_signature = format!(
        r#"{{"type":"confirmTransaction","hash":"0x{}","r":"xyz","s":"1","v":"27"}}"#,
        "ab".repeat(32)
    );
    assert_eq!(h.router.handle(&bad_signature), Routed::Dropped);
}

#[test]
fn safe_topics_are_forwarded_and_persisted() {
    let mut h = harness();
    let safe = Address::repeat_byte(0x33);
    let topic = RelayKey::Safe(safe).topic();

    let first = h.relay.observe(RelayKey::Safe(safe)).expect("observe");
    let second = h.relay.observe(RelayKey::Safe(safe)).expect("observe again");
    assert_eq!(
        h.changes.try_recv().expect("subscribe forwarded"),
        TopicChange::Subscribe(topic.clone())
    );
    assert!(h.changes.try_recv().is_err());
    assert!(h.store.subscribed_safes().expect("safes").contains(&safe));
    assert_eq!(h.topics.active_topics().expect("topics"), vec![topic.clone()]);

    drop(first);
    assert!(h.changes.try_recv().is_err());
    drop(second);
    assert_eq!(
        h.changes.try_recv().expect("unsubscribe forwarded"),
        TopicChange::Unsubscribe(topic)
    );
    assert!(h.store.subscribed_safes().expect("safes").is_empty());
    assert!(h.topics.active_topics().expect("topics").is_empty());
}

#[test]
fn transaction_topics_are_not_persisted() {
    let mut h = harness();
    let topic = RelayKey::Transaction(B256::repeat_byte(5)).topic();
    h.topics.subscribe_topic(&topic).expect("subscribe");
    h.topics.subscribe_topic(&topic).expect("subscribe twice");
    assert_eq!(
        h.changes.try_recv().expect("forwarded once"),
        TopicChange::Subscribe(topic)
    );
    assert!(h.changes.try_recv().is_err());
    assert!(h.store.subscribed_safes().expect("safes").is_empty());
}

#[test]
fn persisted_safes_are_resubscribed_on_startup() {
    let store = Arc::new(MemoryStoreAdapter::default());
    let safes = [Address::repeat_byte(0x01), Address::repeat_byte(0x02)];
    store
        .save_subscribed_safes(&safes.into_iter().collect())
        .expect("seed safes");

    let (topics, mut changes) = PushTopicAdapter::new(store);
    assert_eq!(topics.resubscribe_all().expect("resubscribe"), 2);
    for safe in safes {
        assert_eq!(
            changes.try_recv().expect("subscribe"),
            TopicChange::Subscribe(RelayKey::Safe(safe).topic())
        );
    }
    assert_eq!(topics.active_topics().expect("topics").len(), 2);
}
