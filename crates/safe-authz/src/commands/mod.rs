pub mod aggregate;
pub mod bridge;
pub mod digest;
pub mod policy;
pub mod watch;

use std::str::FromStr;

use alloy::primitives::{Address, B256, U256};
use eyre::{Result, WrapErr};
use safe_authz_core::{Signature, SignatureMap};

use crate::cli::SignatureArgs;

pub(crate) fn parse_address(label: &str, raw: &str) -> Result<Address> {
    Address::from_str(raw.trim()).wrap_err_with(|| format!("invalid {label} address: {raw}"))
}

/// Accepts decimal or 0x-prefixed hex.
pub(crate) fn parse_u256(label: &str, raw: &str) -> Result<U256> {
    U256::from_str(raw.trim()).wrap_err_with(|| format!("invalid {label}: {raw}"))
}

pub(crate) fn parse_b256(label: &str, raw: &str) -> Result<B256> {
    B256::from_str(raw.trim()).wrap_err_with(|| format!("invalid {label}: {raw}"))
}

/// Recovers the signer of every signature; a later signature from the same
/// owner replaces the earlier one.
pub(crate) fn collect_signatures(args: &SignatureArgs) -> Result<(B256, SignatureMap)> {
    let digest = parse_b256("digest", &args.digest)?;
    let mut signatures = SignatureMap::new();
    for raw in &args.signatures {
        let signature =
            Signature::from_hex(raw).wrap_err_with(|| format!("malformed signature {raw}"))?;
        let signer = signature
            .recover(&digest)
            .wrap_err_with(|| format!("signature {raw} does not recover"))?;
        tracing::debug!(%signer, "signature recovered");
        signatures.insert(signer, signature);
    }
    Ok((digest, signatures))
}
