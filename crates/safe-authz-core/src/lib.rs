pub mod aggregate;
pub mod contract;
pub mod coordinator;
pub mod digest;
pub mod domain;
pub mod error;
pub mod message;
pub mod policy;
pub mod ports;
pub mod relay;
pub mod state_machine;

pub use aggregate::{aggregate, ordered_signatures, split_signatures};
pub use contract::classify_receipt;
pub use coordinator::{
    AttemptOptions, CoordinatorConfig, CoordinatorPorts, ExecutionAttempt, PreparedTransaction,
    TransactionExecutionCoordinator,
};
pub use digest::{
    domain_separator, rejection_digest, safe_message_digest, transaction_digest, DataEncoding,
    DigestScheme, SafeTxVersion,
};
pub use domain::{
    ConfirmationState, ExecutionEstimate, ExecutionParams, ExecutionSnapshot, Operation,
    PublishStatus, PushSyncRecord, ReceiptLog, RelayKey, RelayMessage, SafeState,
    SafeTransaction, Signature, SignatureMap, SignerSet, SubmissionReceipt, SubmitMode,
    SubmitRequest, TimestampMs, TransactionDescription, TransactionReceipt,
};
pub use error::{AggregateError, CoordinatorError, CryptoError, EncodingError, PolicyError};
pub use message::{ConfirmationRequest, PushMessage};
pub use policy::decide;
pub use ports::{
    ChainReaderPort, ClockPort, PortError, PushServicePort, RelayServicePort, SignerPort,
    StorePort, TopicPort, TransactionEventsCallback,
};
pub use relay::{RelaySubscription, SignatureRelay};
pub use state_machine::{attempt_transition, AttemptEvent, AttemptState, StateTransition};
