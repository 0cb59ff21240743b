use alloy::primitives::{Address, B256};
use alloy::sol;
use alloy::sol_types::SolEvent;

use crate::domain::{PublishStatus, TransactionReceipt};

sol! {
    interface ISafe {
        function nonce() external view returns (uint256);
        function getThreshold() external view returns (uint256);
        function getOwners() external view returns (address[]);
        function VERSION() external view returns (string);

        event ExecutionSuccess(bytes32 txHash, uint256 payment);
        event ExecutionFailure(bytes32 txHash, uint256 payment);
        event ExecutionFailed(bytes32 txHash);
    }
}

/// `Failed` when the receipt reverted or the Safe logged an execution failure.
pub fn classify_receipt(safe: Address, receipt: &TransactionReceipt) -> PublishStatus {
    if !receipt.success {
        return PublishStatus::Failed;
    }
    let failed = receipt.logs.iter().any(|log| {
        log.address == safe
            && log.topics.first().is_some_and(|topic| is_failure_topic(*topic))
    });
    if failed {
        PublishStatus::Failed
    } else {
        PublishStatus::Success
    }
}

fn is_failure_topic(topic: B256) -> bool {
    topic == ISafe::ExecutionFailure::SIGNATURE_HASH || topic == ISafe::ExecutionFailed::SIGNATURE_HASH
}
