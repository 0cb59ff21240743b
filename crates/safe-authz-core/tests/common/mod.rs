#![allow(dead_code)]

use std::collections::{BTreeSet, HashMap, VecDeque};
use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use alloy::primitives::{Address, B256, U256};
use alloy::signers::local::PrivateKeySigner;
use alloy::signers::SignerSync;
use async_trait::async_trait;
use uuid::Uuid;

use safe_authz_core::{
    ChainReaderPort, ClockPort, CoordinatorConfig, CoordinatorPorts, ExecutionEstimate,
    ExecutionParams, PortError, PublishStatus, PushMessage, PushServicePort, PushSyncRecord,
    RelayServicePort, SafeState, SafeTransaction, Signature, SignatureRelay, SignerPort,
    StorePort, SubmitRequest, TopicPort, TransactionDescription, TransactionExecutionCoordinator,
    TransactionReceipt,
};

pub const SAFE_NONCE: u64 = 5;

pub fn safe_address() -> Address {
    "0x000000000000000000000000000000000000BEEF"
        .parse()
        .expect("valid safe address")
}

pub fn recipient() -> Address {
    "0x000000000000000000000000000000000000dEaD"
        .parse()
        .expect("valid recipient")
}

pub fn key(seed: u8) -> PrivateKeySigner {
    PrivateKeySigner::from_bytes(&B256::repeat_byte(seed)).expect("valid private key")
}

pub fn owner(seed: u8) -> Address {
    key(seed).address()
}

pub fn sign(seed: u8, digest: B256) -> Signature {
    let signature = key(seed).sign_hash_sync(&digest).expect("sign digest");
    Signature::from_primitive(&signature)
}

pub fn transfer() -> SafeTransaction {
    SafeTransaction::call(recipient(), U256::from(10u64).pow(U256::from(18u8)), None)
}

pub fn estimated_params() -> ExecutionParams {
    ExecutionParams {
        tx_gas: U256::from(100_000u64),
        data_gas: U256::from(21_000u64),
        gas_price: U256::from(1_000_000_000u64),
        gas_token: Address::ZERO,
    }
}

pub struct TestSigner(pub PrivateKeySigner);

impl SignerPort for TestSigner {
    fn address(&self) -> Address {
        self.0.address()
    }

    fn sign(&self, digest: &B256) -> Result<Signature, PortError> {
        self.0
            .sign_hash_sync(digest)
            .map(|signature| Signature::from_primitive(&signature))
            .map_err(|e| PortError::Validation(e.to_string()))
    }
}

#[derive(Debug, Default)]
pub struct TestClock {
    now: AtomicU64,
}

impl ClockPort for TestClock {
    fn now_ms(&self) -> Result<u64, PortError> {
        Ok(self.now.fetch_add(1, Ordering::SeqCst) + 1_739_750_400_000)
    }
}

pub struct FakeChain {
    pub state: Mutex<SafeState>,
    receipts: Mutex<VecDeque<Result<Option<TransactionReceipt>, PortError>>>,
    pub receipt_calls: AtomicUsize,
}

impl FakeChain {
    pub fn new(state: SafeState) -> Self {
        Self {
            state: Mutex::new(state),
            receipts: Mutex::new(VecDeque::new()),
            receipt_calls: AtomicUsize::new(0),
        }
    }

    /// Answers for successive receipt lookups; `Ok(None)` once exhausted.
    pub fn script_receipts(&self, answers: Vec<Result<Option<TransactionReceipt>, PortError>>) {
        self.receipts.lock().expect("receipts lock").extend(answers);
    }
}

#[async_trait]
impl ChainReaderPort for FakeChain {
    async fn safe_state(&self, _safe: Address) -> Result<SafeState, PortError> {
        Ok(self.state.lock().expect("state lock").clone())
    }

    async fn transaction_receipt(
        &self,
        _tx_hash: B256,
    ) -> Result<Option<TransactionReceipt>, PortError> {
        self.receipt_calls.fetch_add(1, Ordering::SeqCst);
        self.receipts
            .lock()
            .expect("receipts lock")
            .pop_front()
            .unwrap_or(Ok(None))
    }
}

pub struct FakeRelayService {
    pub estimate: Mutex<ExecutionEstimate>,
    pub submitted: Mutex<Vec<SubmitRequest>>,
    pub fail_submit: AtomicBool,
}

impl FakeRelayService {
    pub fn new() -> Self {
        Self {
            estimate: Mutex::new(ExecutionEstimate {
                params: estimated_params(),
                operational_gas: U256::from(10_000u64),
                last_used_nonce: None,
            }),
            submitted: Mutex::new(Vec::new()),
            fail_submit: AtomicBool::new(false),
        }
    }

    pub fn submissions(&self) -> Vec<SubmitRequest> {
        self.submitted.lock().expect("submitted lock").clone()
    }
}

pub fn chain_hash() -> B256 {
    B256::repeat_byte(0xcc)
}

#[async_trait]
impl RelayServicePort for FakeRelayService {
    async fn estimate(
        &self,
        _safe: Address,
        _tx: &SafeTransaction,
    ) -> Result<ExecutionEstimate, PortError> {
        Ok(self.estimate.lock().expect("estimate lock").clone())
    }

    async fn submit(&self, request: &SubmitRequest) -> Result<B256, PortError> {
        if self.fail_submit.load(Ordering::SeqCst) {
            return Err(PortError::Transport("relay service unavailable".to_owned()));
        }
        self.submitted
            .lock()
            .expect("submitted lock")
            .push(request.clone());
        Ok(chain_hash())
    }
}

#[derive(Default)]
pub struct FakePush {
    pub sent: Mutex<Vec<(Address, Vec<Address>, PushMessage)>>,
}

impl FakePush {
    pub fn sent(&self) -> Vec<(Address, Vec<Address>, PushMessage)> {
        self.sent.lock().expect("sent lock").clone()
    }

    pub fn count(&self, matches: impl Fn(&PushMessage) -> bool) -> usize {
        self.sent()
            .iter()
            .filter(|(_, _, message)| matches(message))
            .count()
    }
}

#[async_trait]
impl PushServicePort for FakePush {
    async fn send(
        &self,
        safe: Address,
        targets: &[Address],
        message: &PushMessage,
    ) -> Result<(), PortError> {
        self.sent
            .lock()
            .expect("sent lock")
            .push((safe, targets.to_vec(), message.clone()));
        Ok(())
    }
}

#[derive(Default)]
pub struct MemoryStore {
    descriptions: Mutex<HashMap<Uuid, TransactionDescription>>,
    push: Mutex<Option<PushSyncRecord>>,
    safes: Mutex<BTreeSet<Address>>,
}

impl MemoryStore {
    pub fn description(&self, id: Uuid) -> Option<TransactionDescription> {
        self.descriptions.lock().expect("descriptions lock").get(&id).cloned()
    }
}

impl StorePort for MemoryStore {
    fn last_synced_push(&self) -> Result<Option<PushSyncRecord>, PortError> {
        Ok(self.push.lock().expect("push lock").clone())
    }

    fn save_last_synced_push(&self, record: &PushSyncRecord) -> Result<(), PortError> {
        *self.push.lock().expect("push lock") = Some(record.clone());
        Ok(())
    }

    fn subscribed_safes(&self) -> Result<BTreeSet<Address>, PortError> {
        Ok(self.safes.lock().expect("safes lock").clone())
    }

    fn save_subscribed_safes(&self, safes: &BTreeSet<Address>) -> Result<(), PortError> {
        *self.safes.lock().expect("safes lock") = safes.clone();
        Ok(())
    }

    fn save_description(&self, description: &TransactionDescription) -> Result<(), PortError> {
        self.descriptions
            .lock()
            .expect("descriptions lock")
            .insert(description.id, description.clone());
        Ok(())
    }

    fn load_description(&self, id: Uuid) -> Result<Option<TransactionDescription>, PortError> {
        Ok(self.description(id))
    }

    fn update_publish_status(&self, id: Uuid, status: PublishStatus) -> Result<(), PortError> {
        let mut descriptions = self.descriptions.lock().expect("descriptions lock");
        let description = descriptions
            .get_mut(&id)
            .ok_or_else(|| PortError::NotFound(id.to_string()))?;
        description.status = status;
        Ok(())
    }
}

#[derive(Default)]
pub struct RecordingTopics {
    pub subscribed: Mutex<Vec<String>>,
    pub unsubscribed: Mutex<Vec<String>>,
}

impl RecordingTopics {
    pub fn subscribed(&self) -> Vec<String> {
        self.subscribed.lock().expect("topics lock").clone()
    }

    pub fn unsubscribed(&self) -> Vec<String> {
        self.unsubscribed.lock().expect("topics lock").clone()
    }
}

impl TopicPort for RecordingTopics {
    fn subscribe_topic(&self, topic: &str) -> Result<(), PortError> {
        self.subscribed
            .lock()
            .expect("topics lock")
            .push(topic.to_owned());
        Ok(())
    }

    fn unsubscribe_topic(&self, topic: &str) -> Result<(), PortError> {
        self.unsubscribed
            .lock()
            .expect("topics lock")
            .push(topic.to_owned());
        Ok(())
    }
}

pub struct Harness {
    pub chain: Arc<FakeChain>,
    pub relay_service: Arc<FakeRelayService>,
    pub push: Arc<FakePush>,
    pub store: Arc<MemoryStore>,
    pub topics: Arc<RecordingTopics>,
    pub relay: SignatureRelay,
    pub coordinator: TransactionExecutionCoordinator,
}

pub fn safe_state(owner_seeds: &[u8], threshold: usize) -> SafeState {
    SafeState {
        owners: owner_seeds.iter().copied().map(owner).collect(),
        threshold,
        nonce: U256::from(SAFE_NONCE),
        balance: U256::from(10u64).pow(U256::from(19u8)),
        version: Some(semver::Version::new(1, 3, 0)),
    }
}

/// Coordinator for a Safe owned by `owner_seeds`, signing locally as `local_seed`.
pub fn harness(owner_seeds: &[u8], threshold: usize, local_seed: u8) -> Harness {
    harness_with_config(owner_seeds, threshold, local_seed, CoordinatorConfig::default())
}

pub fn harness_with_config(
    owner_seeds: &[u8],
    threshold: usize,
    local_seed: u8,
    config: CoordinatorConfig,
) -> Harness {
    let chain = Arc::new(FakeChain::new(safe_state(owner_seeds, threshold)));
    let relay_service = Arc::new(FakeRelayService::new());
    let push = Arc::new(FakePush::default());
    let store = Arc::new(MemoryStore::default());
    let topics = Arc::new(RecordingTopics::default());
    let relay = SignatureRelay::new(topics.clone());
    let ports = CoordinatorPorts {
        chain: chain.clone(),
        relay_service: relay_service.clone(),
        push: push.clone(),
        store: store.clone(),
        signer: Arc::new(TestSigner(key(local_seed))),
        clock: Arc::new(TestClock::default()),
    };
    let coordinator = TransactionExecutionCoordinator::new(ports, relay.clone(), config);
    Harness {
        chain,
        relay_service,
        push,
        store,
        topics,
        relay,
        coordinator,
    }
}
