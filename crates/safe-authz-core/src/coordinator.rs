//! Drives one confirm/execute attempt from chain-state load to publish status.
//!
//! Each attempt runs as its own task that owns the signature map, so inbound
//! relay deliveries and handle commands are applied one at a time. Submission
//! happens at most once per attempt and is not cancellable once started.

use std::collections::{BTreeSet, HashMap};
use std::sync::{Arc, Mutex, RwLock};
use std::time::Duration;

use alloy::primitives::{Address, B256, U256};
use tokio::sync::{mpsc, oneshot, watch};
use tokio::time::Instant;
use tokio_stream::wrappers::{ReceiverStream, WatchStream};
use tokio_stream::StreamExt;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::aggregate::aggregate;
use crate::contract::classify_receipt;
use crate::digest::{rejection_digest, transaction_digest, DigestScheme};
use crate::domain::{
    ConfirmationState, ExecutionParams, ExecutionSnapshot, PublishStatus, RelayKey,
    RelayMessage, SafeTransaction, Signature, SignatureMap, SignerSet, SubmissionReceipt,
    SubmitMode, SubmitRequest, TimestampMs, TransactionDescription,
};
use crate::error::{AggregateError, CoordinatorError};
use crate::message::PushMessage;
use crate::policy::decide;
use crate::ports::{
    ChainReaderPort, ClockPort, PortError, PushServicePort, RelayServicePort, SignerPort,
    StorePort, TransactionEventsCallback,
};
use crate::relay::{RelaySubscription, SignatureRelay};
use crate::state_machine::{attempt_transition, AttemptEvent, AttemptState, StateTransition};

#[derive(Debug, Clone)]
pub struct CoordinatorConfig {
    /// Minimum spacing between two confirmation-request pushes of one attempt.
    pub confirmation_cooldown: Duration,
    /// Delay between receipt polls while a submission is pending.
    pub status_retry_delay: Duration,
    /// Forces a digest scheme instead of deriving it from the contract version.
    pub scheme: Option<DigestScheme>,
}

impl Default for CoordinatorConfig {
    fn default() -> Self {
        Self {
            confirmation_cooldown: Duration::from_secs(30),
            status_retry_delay: Duration::from_secs(20),
            scheme: None,
        }
    }
}

#[derive(Clone)]
pub struct CoordinatorPorts {
    pub chain: Arc<dyn ChainReaderPort>,
    pub relay_service: Arc<dyn RelayServicePort>,
    pub push: Arc<dyn PushServicePort>,
    pub store: Arc<dyn StorePort>,
    pub signer: Arc<dyn SignerPort>,
    pub clock: Arc<dyn ClockPort>,
}

#[derive(Debug, Clone)]
pub struct AttemptOptions {
    /// Submit as soon as the threshold is reached.
    pub auto_submit: bool,
    pub fee_override: Option<ExecutionParams>,
    /// External request this attempt answers, passed to event callbacks.
    pub reference_id: Option<u64>,
    /// Signatures already known, e.g. from a confirmation request.
    pub signatures: SignatureMap,
}

impl Default for AttemptOptions {
    fn default() -> Self {
        Self {
            auto_submit: true,
            fee_override: None,
            reference_id: None,
            signatures: SignatureMap::new(),
        }
    }
}

/// A transaction with its nonce resolved, fees fixed and digest computed.
#[derive(Debug, Clone)]
pub struct PreparedTransaction {
    pub safe: Address,
    pub transaction: SafeTransaction,
    pub params: ExecutionParams,
    pub operational_gas: U256,
    pub scheme: DigestScheme,
    pub digest: B256,
    pub signers: SignerSet,
    pub on_chain_nonce: U256,
    pub balance: U256,
}

impl PreparedTransaction {
    pub fn is_executed(&self) -> bool {
        self.transaction
            .nonce
            .is_some_and(|nonce| nonce < self.on_chain_nonce)
    }

    pub fn rejection_digest(&self) -> B256 {
        rejection_digest(self.digest)
    }

    pub fn confirmation_state(&self, signatures: &SignatureMap, local: Address) -> ConfirmationState {
        ConfirmationState::derive(&self.signers, signatures, local, self.is_executed())
    }

    pub fn owner_signature_count(&self, signatures: &SignatureMap) -> usize {
        signatures
            .signers()
            .filter(|signer| self.signers.contains(signer))
            .count()
    }

    pub fn threshold_reached(&self, signatures: &SignatureMap) -> bool {
        self.owner_signature_count(signatures) >= self.signers.threshold()
    }
}

#[derive(Clone)]
pub struct TransactionExecutionCoordinator {
    inner: Arc<CoordinatorInner>,
}

struct CoordinatorInner {
    ports: CoordinatorPorts,
    relay: SignatureRelay,
    config: CoordinatorConfig,
    nonce_cache: Mutex<HashMap<Address, U256>>,
    callbacks: RwLock<Vec<Arc<dyn TransactionEventsCallback>>>,
}

impl TransactionExecutionCoordinator {
    pub fn new(ports: CoordinatorPorts, relay: SignatureRelay, config: CoordinatorConfig) -> Self {
        Self {
            inner: Arc::new(CoordinatorInner {
                ports,
                relay,
                config,
                nonce_cache: Mutex::new(HashMap::new()),
                callbacks: RwLock::new(Vec::new()),
            }),
        }
    }

    pub fn relay(&self) -> &SignatureRelay {
        &self.inner.relay
    }

    pub fn local_address(&self) -> Address {
        self.inner.ports.signer.address()
    }

    pub fn add_events_callback(
        &self,
        callback: Arc<dyn TransactionEventsCallback>,
    ) -> Result<(), PortError> {
        let mut callbacks = self
            .inner
            .callbacks
            .write()
            .map_err(|e| PortError::Transport(format!("callback lock poisoned: {e}")))?;
        callbacks.push(callback);
        Ok(())
    }

    pub async fn prepare(
        &self,
        safe: Address,
        transaction: SafeTransaction,
        fee_override: Option<ExecutionParams>,
    ) -> Result<PreparedTransaction, CoordinatorError> {
        self.inner.prepare(safe, transaction, fee_override).await
    }

    /// Loads state, applies the policy, signs locally when allowed and starts
    /// collecting confirmations from the other owners.
    pub async fn start_attempt(
        &self,
        safe: Address,
        transaction: SafeTransaction,
        options: AttemptOptions,
    ) -> Result<ExecutionAttempt, CoordinatorError> {
        let inner = Arc::clone(&self.inner);
        let mut transitions = Vec::new();
        let (state, transition) = attempt_transition(AttemptState::Idle, AttemptEvent::Start)?;
        transitions.push(transition);

        let prepared = inner.prepare(safe, transaction, options.fee_override).await?;
        let local = inner.ports.signer.address();
        let mut signatures = inner.verified_signatures(&prepared, &options.signatures);

        let confirmation = prepared.confirmation_state(&signatures, local);
        let mode = match decide(&confirmation) {
            Ok(mode) => mode,
            Err(rejected) => {
                attempt_transition(state, AttemptEvent::PolicyRejected)?;
                info!(%safe, digest = %prepared.digest, reason = %rejected, "attempt rejected by policy");
                return Err(rejected.into());
            }
        };
        let (state, transition) = attempt_transition(state, AttemptEvent::StateLoaded)?;
        transitions.push(transition);

        if confirmation.is_owner && !confirmation.has_confirmed {
            let own = inner.ports.signer.sign(&prepared.digest)?;
            signatures.insert(local, own);
        }

        // Subscribe before any push goes out so fast replies are not missed.
        let subscription = inner.relay.observe(RelayKey::Transaction(prepared.digest))?;
        info!(%safe, digest = %prepared.digest, ?mode, "attempt started");

        let digest = prepared.digest;
        let rejection = prepared.rejection_digest();
        let (commands_tx, commands_rx) = mpsc::unbounded_channel();
        let (outcome_tx, outcome_rx) = oneshot::channel();
        let mut actor = AttemptActor {
            snapshots: watch::channel(placeholder_snapshot(&prepared, state)).0,
            inner,
            prepared,
            local,
            signatures,
            rejections: BTreeSet::new(),
            state,
            transitions,
            submitted: false,
            auto_submit: options.auto_submit,
            reference_id: options.reference_id,
            last_request: None,
            submission: None,
            publish_status: None,
            subscription: Some(subscription),
            outcome: Some(outcome_tx),
        };

        if mode == SubmitMode::Confirm {
            actor.broadcast_confirmation().await;
        }
        if !actor.prepared.threshold_reached(&actor.signatures) {
            if let Err(e) = actor.request_confirmations().await {
                warn!(%safe, %digest, error = %e, "initial confirmation request failed");
            }
        }
        actor.publish_snapshot();
        let snapshots = actor.snapshots.subscribe();

        tokio::spawn(actor.run(commands_rx));

        Ok(ExecutionAttempt {
            safe,
            digest,
            rejection_digest: rejection,
            commands: commands_tx,
            snapshots,
            outcome: Some(outcome_rx),
        })
    }

    /// Starts an attempt that only collects signatures until told to submit.
    pub async fn load_execute_info(
        &self,
        safe: Address,
        transaction: SafeTransaction,
    ) -> Result<ExecutionAttempt, CoordinatorError> {
        self.start_attempt(
            safe,
            transaction,
            AttemptOptions {
                auto_submit: false,
                ..AttemptOptions::default()
            },
        )
        .await
    }

    /// Submits with an already collected signature set, adding the local
    /// signature when that completes the threshold.
    pub async fn submit_transaction(
        &self,
        safe: Address,
        transaction: SafeTransaction,
        signatures: &SignatureMap,
        fee_override: Option<ExecutionParams>,
        reference_id: Option<u64>,
    ) -> Result<SubmissionReceipt, CoordinatorError> {
        let inner = &self.inner;
        let prepared = inner.prepare(safe, transaction, fee_override).await?;
        let local = inner.ports.signer.address();
        let mut verified = inner.verified_signatures(&prepared, signatures);

        let confirmation = prepared.confirmation_state(&verified, local);
        match decide(&confirmation)? {
            SubmitMode::Execute => {}
            SubmitMode::ConfirmAndExecute => {
                let own = inner.ports.signer.sign(&prepared.digest)?;
                verified.insert(local, own);
            }
            SubmitMode::Confirm => {
                return Err(AggregateError::ThresholdNotReached {
                    have: confirmation.confirmations,
                    need: confirmation.required_confirmations,
                }
                .into())
            }
        }
        inner.dispatch(&prepared, &verified, reference_id).await
    }

    /// Emits `Pending`, then the resolved status of a stored submission.
    pub fn observe_publish_status(&self, id: Uuid) -> ReceiverStream<PublishStatus> {
        spawn_status_tracker(Arc::clone(&self.inner), id)
    }

    /// Tells the event callbacks that an external request was declined.
    pub async fn reject_request(&self, reference_id: u64) {
        self.inner.notify_rejected(reference_id).await;
    }
}

impl CoordinatorInner {
    async fn prepare(
        &self,
        safe: Address,
        transaction: SafeTransaction,
        fee_override: Option<ExecutionParams>,
    ) -> Result<PreparedTransaction, CoordinatorError> {
        let state = self.ports.chain.safe_state(safe).await?;
        let signers = SignerSet::new(state.owners.clone(), state.threshold)?;
        let estimate = self.ports.relay_service.estimate(safe, &transaction).await?;

        let nonce = match transaction.nonce {
            Some(nonce) => nonce,
            None => self.next_nonce(safe, state.nonce, estimate.last_used_nonce)?,
        };
        let transaction = transaction.with_nonce(nonce);
        let params = fee_override.unwrap_or(estimate.params);
        let scheme = self
            .config
            .scheme
            .or_else(|| state.version.as_ref().map(DigestScheme::for_version))
            .unwrap_or_default();
        let digest = transaction_digest(scheme, safe, &transaction, &params)?;
        debug!(%safe, %digest, %nonce, ?scheme, "transaction prepared");

        Ok(PreparedTransaction {
            safe,
            transaction,
            params,
            operational_gas: estimate.operational_gas,
            scheme,
            digest,
            signers,
            on_chain_nonce: state.nonce,
            balance: state.balance,
        })
    }

    fn next_nonce(
        &self,
        safe: Address,
        on_chain: U256,
        last_used: Option<U256>,
    ) -> Result<U256, PortError> {
        let cache = self
            .nonce_cache
            .lock()
            .map_err(|e| PortError::Transport(format!("nonce cache lock poisoned: {e}")))?;
        let mut nonce = match cache.get(&safe) {
            Some(cached) if *cached >= on_chain => *cached + U256::from(1u8),
            _ => on_chain,
        };
        if let Some(last) = last_used {
            nonce = nonce.max(last + U256::from(1u8));
        }
        Ok(nonce)
    }

    fn remember_nonce(&self, safe: Address, nonce: U256) -> Result<(), PortError> {
        let mut cache = self
            .nonce_cache
            .lock()
            .map_err(|e| PortError::Transport(format!("nonce cache lock poisoned: {e}")))?;
        let entry = cache.entry(safe).or_insert(nonce);
        *entry = (*entry).max(nonce);
        Ok(())
    }

    fn verify(
        &self,
        prepared: &PreparedTransaction,
        digest: &B256,
        signature: &Signature,
    ) -> Result<Address, CoordinatorError> {
        let signer = signature.recover(digest)?;
        if !prepared.signers.contains(&signer) {
            return Err(CoordinatorError::UnknownSigner(signer));
        }
        Ok(signer)
    }

    fn verified_signatures(
        &self,
        prepared: &PreparedTransaction,
        signatures: &SignatureMap,
    ) -> SignatureMap {
        let mut verified = SignatureMap::new();
        for (claimed, signature) in signatures.iter() {
            match self.verify(prepared, &prepared.digest, signature) {
                Ok(signer) if signer == *claimed => {
                    verified.insert(signer, *signature);
                }
                Ok(signer) => {
                    warn!(%claimed, recovered = %signer, "signature recovers to a different owner, dropped")
                }
                Err(e) => warn!(%claimed, error = %e, "signature dropped"),
            }
        }
        verified
    }

    async fn dispatch(
        &self,
        prepared: &PreparedTransaction,
        signatures: &SignatureMap,
        reference_id: Option<u64>,
    ) -> Result<SubmissionReceipt, CoordinatorError> {
        let owner_signatures: SignatureMap = signatures
            .iter()
            .filter(|(signer, _)| prepared.signers.contains(signer))
            .map(|(signer, signature)| (*signer, *signature))
            .collect();
        let blob = aggregate(&owner_signatures, prepared.signers.threshold())?;
        let nonce = prepared.transaction.resolved_nonce()?;

        let request = SubmitRequest {
            safe: prepared.safe,
            transaction: prepared.transaction.clone(),
            params: prepared.params,
            operational_gas: prepared.operational_gas,
            digest: prepared.digest,
            signatures: blob,
        };
        let chain_hash = self.ports.relay_service.submit(&request).await?;
        info!(safe = %prepared.safe, digest = %prepared.digest, %chain_hash, "transaction submitted");

        // The transaction is on its way; nothing below may fail the submission.
        if let Err(e) = self.remember_nonce(prepared.safe, nonce) {
            warn!(error = %e, "nonce cache not updated");
        }

        let id = Uuid::new_v4();
        let submitted_at = self.ports.clock.now_ms().unwrap_or_else(|e| {
            warn!(error = %e, "clock unavailable, description stamped with 0");
            0
        });
        let description = TransactionDescription {
            id,
            safe: prepared.safe,
            to: prepared.transaction.to,
            value: prepared.transaction.value,
            data: prepared.transaction.data.clone().unwrap_or_default(),
            operation: prepared.transaction.operation,
            nonce,
            params: prepared.params,
            operational_gas: prepared.operational_gas,
            digest: prepared.digest,
            chain_hash,
            submitted_at: TimestampMs(submitted_at),
            status: PublishStatus::Pending,
        };
        if let Err(e) = self.ports.store.save_description(&description) {
            warn!(%id, error = %e, "transaction description not stored");
        }

        for callback in self.callbacks_snapshot() {
            callback
                .on_transaction_submitted(prepared.safe, &prepared.transaction, chain_hash, reference_id)
                .await;
        }

        let local = self.ports.signer.address();
        let targets: Vec<Address> = prepared
            .signers
            .owners()
            .iter()
            .filter(|owner| **owner != local)
            .copied()
            .collect();
        if !targets.is_empty() {
            let message = PushMessage::transaction_hash(prepared.digest, chain_hash);
            if let Err(e) = self.ports.push.send(prepared.safe, &targets, &message).await {
                warn!(digest = %prepared.digest, error = %e, "chain hash push failed");
            }
        }

        Ok(SubmissionReceipt {
            id,
            digest: prepared.digest,
            chain_hash,
        })
    }

    async fn notify_rejected(&self, reference_id: u64) {
        for callback in self.callbacks_snapshot() {
            callback.on_transaction_rejected(reference_id).await;
        }
    }

    fn callbacks_snapshot(&self) -> Vec<Arc<dyn TransactionEventsCallback>> {
        match self.callbacks.read() {
            Ok(callbacks) => callbacks.clone(),
            Err(e) => {
                warn!(error = %e, "callback lock poisoned");
                Vec::new()
            }
        }
    }

    async fn track_publish_status(&self, id: Uuid, sender: mpsc::Sender<PublishStatus>) {
        if sender.send(PublishStatus::Pending).await.is_err() {
            return;
        }
        let description = match self.ports.store.load_description(id) {
            Ok(Some(description)) => description,
            Ok(None) => {
                warn!(%id, "no stored description for submission");
                let _ = sender.send(PublishStatus::Unknown).await;
                return;
            }
            Err(e) => {
                warn!(%id, error = %e, "description lookup failed");
                let _ = sender.send(PublishStatus::Unknown).await;
                return;
            }
        };
        if description.status.is_terminal() {
            let _ = sender.send(description.status).await;
            return;
        }

        loop {
            match self
                .ports
                .chain
                .transaction_receipt(description.chain_hash)
                .await
            {
                Ok(Some(receipt)) => {
                    let status = classify_receipt(description.safe, &receipt);
                    if let Err(e) = self.ports.store.update_publish_status(id, status) {
                        warn!(%id, error = %e, "publish status not stored");
                    }
                    info!(%id, chain_hash = %description.chain_hash, ?status, "publish status resolved");
                    let _ = sender.send(status).await;
                    return;
                }
                Ok(None) => debug!(%id, "receipt not available yet"),
                Err(e) if e.is_transient() => {
                    warn!(%id, error = %e, "receipt lookup failed, retrying")
                }
                Err(e) => {
                    warn!(%id, error = %e, "receipt lookup failed");
                    let _ = sender.send(PublishStatus::Unknown).await;
                    return;
                }
            }
            tokio::select! {
                _ = tokio::time::sleep(self.config.status_retry_delay) => {}
                _ = sender.closed() => return,
            }
        }
    }
}

fn spawn_status_tracker(inner: Arc<CoordinatorInner>, id: Uuid) -> ReceiverStream<PublishStatus> {
    let (sender, receiver) = mpsc::channel(4);
    tokio::spawn(async move { inner.track_publish_status(id, sender).await });
    ReceiverStream::new(receiver)
}

fn placeholder_snapshot(prepared: &PreparedTransaction, state: AttemptState) -> ExecutionSnapshot {
    let confirmation = prepared.confirmation_state(&SignatureMap::new(), Address::ZERO);
    ExecutionSnapshot {
        state,
        safe: prepared.safe,
        digest: prepared.digest,
        transaction: prepared.transaction.clone(),
        params: prepared.params,
        operational_gas: prepared.operational_gas,
        confirmation,
        decision: decide(&confirmation),
        signatures: SignatureMap::new(),
        rejections: BTreeSet::new(),
        submission: None,
        publish_status: None,
    }
}

type Reply<T> = oneshot::Sender<Result<T, CoordinatorError>>;

enum AttemptCommand {
    AddSignature {
        signature: Signature,
        reply: Reply<Address>,
    },
    RequestConfirmations {
        reply: Reply<usize>,
    },
    Submit {
        reply: Reply<SubmissionReceipt>,
    },
    Reject {
        reply: Reply<()>,
    },
    Cancel,
}

struct AttemptActor {
    inner: Arc<CoordinatorInner>,
    prepared: PreparedTransaction,
    local: Address,
    signatures: SignatureMap,
    rejections: BTreeSet<Address>,
    state: AttemptState,
    transitions: Vec<StateTransition>,
    submitted: bool,
    auto_submit: bool,
    reference_id: Option<u64>,
    last_request: Option<Instant>,
    submission: Option<SubmissionReceipt>,
    publish_status: Option<PublishStatus>,
    subscription: Option<RelaySubscription>,
    snapshots: watch::Sender<ExecutionSnapshot>,
    outcome: Option<Reply<SubmissionReceipt>>,
}

impl AttemptActor {
    async fn run(mut self, mut commands: mpsc::UnboundedReceiver<AttemptCommand>) {
        let mut status: Option<ReceiverStream<PublishStatus>> = None;
        loop {
            match self.state {
                AttemptState::AwaitingSignatures => {
                    if self.auto_submit && self.prepared.threshold_reached(&self.signatures) {
                        let _ = self.submit().await;
                        continue;
                    }
                    tokio::select! {
                        message = next_delivery(&mut self.subscription) => match message {
                            Some(message) => self.on_relay_message(message),
                            None => self.cancel("relay closed"),
                        },
                        command = commands.recv() => match command {
                            Some(command) => self.on_command(command).await,
                            None => self.cancel("attempt handle dropped"),
                        },
                    }
                }
                AttemptState::Tracking => {
                    if status.is_none() {
                        if let Some(receipt) = self.submission {
                            status = Some(spawn_status_tracker(Arc::clone(&self.inner), receipt.id));
                        }
                    }
                    let Some(stream) = status.as_mut() else {
                        self.transition(AttemptEvent::StatusResolved);
                        continue;
                    };
                    tokio::select! {
                        next = stream.next() => match next {
                            Some(resolved) => {
                                self.publish_status = Some(resolved);
                                if resolved != PublishStatus::Pending {
                                    self.transition(AttemptEvent::StatusResolved);
                                }
                                self.publish_snapshot();
                            }
                            None => self.transition(AttemptEvent::StatusResolved),
                        },
                        command = commands.recv() => match command {
                            Some(command) => self.on_command(command).await,
                            None => self.cancel("attempt handle dropped"),
                        },
                    }
                }
                _ => break,
            }
        }

        self.subscription = None;
        self.publish_snapshot();
        if let Some(outcome) = self.outcome.take() {
            let _ = outcome.send(Err(CoordinatorError::AttemptClosed));
        }
        debug!(digest = %self.prepared.digest, transitions = self.transitions.len(), "attempt finished");
    }

    fn on_relay_message(&mut self, message: RelayMessage) {
        match message {
            RelayMessage::Confirmed(signature) => {
                match self.inner.verify(&self.prepared, &self.prepared.digest, &signature) {
                    Ok(signer) => {
                        debug!(digest = %self.prepared.digest, %signer, "confirmation received");
                        self.signatures.insert(signer, signature);
                        self.publish_snapshot();
                    }
                    Err(e) => warn!(digest = %self.prepared.digest, error = %e, "confirmation discarded"),
                }
            }
            RelayMessage::Rejected(signature) => {
                let digest = self.prepared.rejection_digest();
                match self.inner.verify(&self.prepared, &digest, &signature) {
                    Ok(signer) => {
                        info!(digest = %self.prepared.digest, %signer, "owner rejected transaction");
                        self.rejections.insert(signer);
                        self.publish_snapshot();
                    }
                    Err(e) => warn!(digest = %self.prepared.digest, error = %e, "rejection discarded"),
                }
            }
        }
    }

    async fn on_command(&mut self, command: AttemptCommand) {
        match command {
            AttemptCommand::AddSignature { signature, reply } => {
                let _ = reply.send(self.add_signature(signature));
            }
            AttemptCommand::RequestConfirmations { reply } => {
                let result = if self.state == AttemptState::AwaitingSignatures {
                    self.request_confirmations().await
                } else {
                    Err(CoordinatorError::AttemptClosed)
                };
                let _ = reply.send(result);
            }
            AttemptCommand::Submit { reply } => {
                let result = match (self.state, self.submission) {
                    (_, Some(receipt)) => Ok(receipt),
                    (AttemptState::AwaitingSignatures, None) => {
                        if self.prepared.threshold_reached(&self.signatures) {
                            self.submit().await
                        } else {
                            Err(AggregateError::ThresholdNotReached {
                                have: self.prepared.owner_signature_count(&self.signatures),
                                need: self.prepared.signers.threshold(),
                            }
                            .into())
                        }
                    }
                    _ => Err(CoordinatorError::AttemptClosed),
                };
                let _ = reply.send(result);
            }
            AttemptCommand::Reject { reply } => {
                let _ = reply.send(self.reject().await);
            }
            AttemptCommand::Cancel => self.cancel("cancelled by caller"),
        }
    }

    fn add_signature(&mut self, signature: Signature) -> Result<Address, CoordinatorError> {
        if self.state != AttemptState::AwaitingSignatures {
            return Err(CoordinatorError::AttemptClosed);
        }
        let signer = self
            .inner
            .verify(&self.prepared, &self.prepared.digest, &signature)?;
        self.signatures.insert(signer, signature);
        self.publish_snapshot();
        Ok(signer)
    }

    async fn submit(&mut self) -> Result<SubmissionReceipt, CoordinatorError> {
        if self.submitted {
            return self.submission.ok_or(CoordinatorError::AttemptClosed);
        }
        self.submitted = true;
        self.transition(AttemptEvent::ThresholdReached);
        // Late confirmations are not needed any more.
        self.subscription = None;
        self.publish_snapshot();

        let result = self
            .inner
            .dispatch(&self.prepared, &self.signatures, self.reference_id)
            .await;
        match &result {
            Ok(receipt) => {
                self.submission = Some(*receipt);
                self.publish_status = Some(PublishStatus::Pending);
                self.transition(AttemptEvent::Submitted);
            }
            Err(e) => {
                warn!(digest = %self.prepared.digest, error = %e, "submission failed");
                self.transition(AttemptEvent::SubmitFailed);
            }
        }
        if let Some(outcome) = self.outcome.take() {
            let _ = outcome.send(result.clone());
        }
        self.publish_snapshot();
        result
    }

    async fn reject(&mut self) -> Result<(), CoordinatorError> {
        if self.state != AttemptState::AwaitingSignatures {
            return Err(CoordinatorError::AttemptClosed);
        }
        let signature = self
            .inner
            .ports
            .signer
            .sign(&self.prepared.rejection_digest())?;
        let targets = self.other_owners();
        if !targets.is_empty() {
            let message = PushMessage::rejection(self.prepared.digest, &signature);
            self.inner
                .ports
                .push
                .send(self.prepared.safe, &targets, &message)
                .await?;
        }
        if let Some(reference_id) = self.reference_id {
            self.inner.notify_rejected(reference_id).await;
        }
        self.rejections.insert(self.local);
        self.cancel("rejected locally");
        Ok(())
    }

    async fn broadcast_confirmation(&self) {
        let Some(own) = self.signatures.get(&self.local) else {
            return;
        };
        let targets = self.other_owners();
        if targets.is_empty() {
            return;
        }
        let message = PushMessage::confirmation(self.prepared.digest, own);
        if let Err(e) = self
            .inner
            .ports
            .push
            .send(self.prepared.safe, &targets, &message)
            .await
        {
            warn!(digest = %self.prepared.digest, error = %e, "confirmation push failed");
        }
    }

    async fn request_confirmations(&mut self) -> Result<usize, CoordinatorError> {
        let now = Instant::now();
        let cooldown = self.inner.config.confirmation_cooldown;
        if let Some(last) = self.last_request {
            let elapsed = now.duration_since(last);
            if elapsed < cooldown {
                return Err(CoordinatorError::CooldownActive {
                    remaining_ms: (cooldown - elapsed).as_millis() as u64,
                });
            }
        }

        let targets: Vec<Address> = self
            .other_owners()
            .into_iter()
            .filter(|owner| !self.signatures.contains(owner))
            .collect();
        if targets.is_empty() {
            return Ok(0);
        }
        let message = PushMessage::request_confirmation(
            self.prepared.digest,
            self.prepared.safe,
            &self.prepared.transaction,
            &self.prepared.params,
            self.prepared.operational_gas,
        );
        self.inner
            .ports
            .push
            .send(self.prepared.safe, &targets, &message)
            .await?;
        self.last_request = Some(now);
        debug!(digest = %self.prepared.digest, targets = targets.len(), "confirmation requested");
        Ok(targets.len())
    }

    fn cancel(&mut self, reason: &str) {
        if matches!(
            self.state,
            AttemptState::AwaitingState | AttemptState::AwaitingSignatures | AttemptState::Tracking
        ) {
            info!(digest = %self.prepared.digest, reason, "attempt cancelled");
            self.transition(AttemptEvent::Cancelled);
            self.subscription = None;
            self.publish_snapshot();
        }
    }

    fn other_owners(&self) -> Vec<Address> {
        self.prepared
            .signers
            .owners()
            .iter()
            .filter(|owner| **owner != self.local)
            .copied()
            .collect()
    }

    fn transition(&mut self, event: AttemptEvent) {
        match attempt_transition(self.state, event) {
            Ok((next, transition)) => {
                debug!(from = ?transition.from, to = ?transition.to, reason = transition.reason, "attempt transition");
                self.state = next;
                self.transitions.push(transition);
            }
            Err(e) => warn!(error = %e, "attempt transition ignored"),
        }
    }

    fn snapshot(&self) -> ExecutionSnapshot {
        let confirmation = self.prepared.confirmation_state(&self.signatures, self.local);
        ExecutionSnapshot {
            state: self.state,
            safe: self.prepared.safe,
            digest: self.prepared.digest,
            transaction: self.prepared.transaction.clone(),
            params: self.prepared.params,
            operational_gas: self.prepared.operational_gas,
            confirmation,
            decision: decide(&confirmation),
            signatures: self.signatures.clone(),
            rejections: self.rejections.clone(),
            submission: self.submission,
            publish_status: self.publish_status,
        }
    }

    fn publish_snapshot(&self) {
        self.snapshots.send_replace(self.snapshot());
    }
}

async fn next_delivery(subscription: &mut Option<RelaySubscription>) -> Option<RelayMessage> {
    match subscription {
        Some(subscription) => subscription.recv().await,
        None => std::future::pending().await,
    }
}

/// Caller-side handle of a running attempt.
pub struct ExecutionAttempt {
    safe: Address,
    digest: B256,
    rejection_digest: B256,
    commands: mpsc::UnboundedSender<AttemptCommand>,
    snapshots: watch::Receiver<ExecutionSnapshot>,
    outcome: Option<oneshot::Receiver<Result<SubmissionReceipt, CoordinatorError>>>,
}

impl ExecutionAttempt {
    pub fn safe(&self) -> Address {
        self.safe
    }

    pub fn digest(&self) -> B256 {
        self.digest
    }

    pub fn rejection_digest(&self) -> B256 {
        self.rejection_digest
    }

    pub fn snapshot(&self) -> ExecutionSnapshot {
        self.snapshots.borrow().clone()
    }

    pub fn snapshots(&self) -> WatchStream<ExecutionSnapshot> {
        WatchStream::new(self.snapshots.clone())
    }

    pub async fn wait_for_state(
        &self,
        state: AttemptState,
    ) -> Result<ExecutionSnapshot, CoordinatorError> {
        let mut snapshots = self.snapshots.clone();
        let snapshot = snapshots
            .wait_for(|snapshot| snapshot.state == state)
            .await
            .map_err(|_| CoordinatorError::AttemptClosed)?
            .clone();
        Ok(snapshot)
    }

    /// Adds a signature pasted in by hand. Returns the recovered owner.
    pub async fn add_external_signature(&self, encoded: &str) -> Result<Address, CoordinatorError> {
        let signature = Signature::from_hex(encoded)?;
        self.request(|reply| AttemptCommand::AddSignature { signature, reply })
            .await
    }

    /// Re-sends the confirmation request to owners that have not signed.
    pub async fn request_confirmations(&self) -> Result<usize, CoordinatorError> {
        self.request(|reply| AttemptCommand::RequestConfirmations { reply })
            .await
    }

    pub async fn submit(&self) -> Result<SubmissionReceipt, CoordinatorError> {
        self.request(|reply| AttemptCommand::Submit { reply }).await
    }

    /// Signs the rejection digest, notifies the other owners and ends the attempt.
    pub async fn reject(&self) -> Result<(), CoordinatorError> {
        self.request(|reply| AttemptCommand::Reject { reply }).await
    }

    /// Resolves once with the submission result, or `AttemptClosed` if the
    /// attempt ended without submitting.
    pub async fn outcome(&mut self) -> Result<SubmissionReceipt, CoordinatorError> {
        let receiver = self.outcome.take().ok_or(CoordinatorError::AttemptClosed)?;
        receiver.await.map_err(|_| CoordinatorError::AttemptClosed)?
    }

    /// No effect once submission has started.
    pub fn cancel(&self) {
        let _ = self.commands.send(AttemptCommand::Cancel);
    }

    async fn request<T>(
        &self,
        command: impl FnOnce(Reply<T>) -> AttemptCommand,
    ) -> Result<T, CoordinatorError> {
        let (reply, receiver) = oneshot::channel();
        self.commands
            .send(command(reply))
            .map_err(|_| CoordinatorError::AttemptClosed)?;
        receiver.await.map_err(|_| CoordinatorError::AttemptClosed)?
    }
}
