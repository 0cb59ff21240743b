use eyre::Result;
use safe_authz_core::{aggregate, ordered_signatures, SignatureMap};
use tracing::warn;

use super::{collect_signatures, parse_address};
use crate::cli::AggregateArgs;
use crate::output::{AggregateOutput, SignerEntry};

pub fn run(args: AggregateArgs, json: bool) -> Result<()> {
    let owners = args
        .owners
        .iter()
        .map(|raw| parse_address("owner", raw))
        .collect::<Result<Vec<_>>>()?;
    let (_, recovered) = collect_signatures(&args.signatures)?;

    let mut signatures = SignatureMap::new();
    for (signer, signature) in recovered.iter() {
        if !owners.is_empty() && !owners.contains(signer) {
            warn!(%signer, "signature from non-owner discarded");
            continue;
        }
        signatures.insert(*signer, *signature);
    }

    let blob = aggregate(&signatures, args.threshold)?;
    AggregateOutput {
        threshold: args.threshold,
        signers: ordered_signatures(&signatures)
            .into_iter()
            .map(|(owner, signature)| SignerEntry {
                owner,
                signature: signature.to_hex(),
            })
            .collect(),
        signatures: blob,
    }
    .print(json)
}
