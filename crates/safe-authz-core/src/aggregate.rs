use alloy::primitives::{Address, Bytes, U256};

use crate::domain::{Signature, SignatureMap, SIGNATURE_LEN};
use crate::error::{AggregateError, EncodingError};

/// Signatures ordered by ascending numeric signer address, the order the Safe
/// contract verifies them in.
pub fn ordered_signatures(signatures: &SignatureMap) -> Vec<(Address, Signature)> {
    let mut ordered: Vec<(Address, Signature)> =
        signatures.iter().map(|(addr, sig)| (*addr, *sig)).collect();
    ordered.sort_by_key(|(addr, _)| U256::from_be_slice(addr.as_slice()));
    ordered
}

pub fn aggregate(signatures: &SignatureMap, threshold: usize) -> Result<Bytes, AggregateError> {
    if signatures.len() < threshold {
        return Err(AggregateError::ThresholdNotReached {
            have: signatures.len(),
            need: threshold,
        });
    }
    let ordered = ordered_signatures(signatures);
    let mut blob = Vec::with_capacity(ordered.len() * SIGNATURE_LEN);
    for (_, signature) in &ordered {
        blob.extend_from_slice(&signature.to_bytes());
    }
    Ok(Bytes::from(blob))
}

/// Splits an aggregated blob back into its 65-byte entries.
pub fn split_signatures(blob: &[u8]) -> Result<Vec<Signature>, EncodingError> {
    if blob.len() % SIGNATURE_LEN != 0 {
        return Err(EncodingError::Length {
            what: "aggregated signatures",
            expected: (blob.len() / SIGNATURE_LEN + 1) * SIGNATURE_LEN,
            got: blob.len(),
        });
    }
    blob.chunks(SIGNATURE_LEN).map(Signature::from_bytes).collect()
}
