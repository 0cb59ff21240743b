use eyre::Result;
use safe_authz_core::{decide, ConfirmationState, SignerSet};

use super::{collect_signatures, parse_address};
use crate::cli::PolicyArgs;
use crate::output::PolicyOutput;

pub fn run(args: PolicyArgs, json: bool) -> Result<()> {
    let owners = args
        .owners
        .iter()
        .map(|raw| parse_address("owner", raw))
        .collect::<Result<Vec<_>>>()?;
    let signers = SignerSet::new(owners, args.threshold)?;
    let local = parse_address("signer", &args.signer)?;
    let (_, signatures) = collect_signatures(&args.signatures)?;

    let state = ConfirmationState::derive(&signers, &signatures, local, args.executed);
    let (mode, refusal) = match decide(&state) {
        Ok(mode) => (Some(mode), None),
        Err(e) => (None, Some(e.to_string())),
    };
    PolicyOutput {
        signer: local,
        confirmations: state.confirmations,
        required: state.required_confirmations,
        mode,
        refusal,
    }
    .print(json)
}
