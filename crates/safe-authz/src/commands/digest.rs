use alloy::primitives::{hex, Address, Bytes};
use eyre::{Result, WrapErr};
use safe_authz_core::{
    rejection_digest, transaction_digest, DataEncoding, DigestScheme, ExecutionParams, Operation,
    SafeTransaction, SafeTxVersion,
};

use super::{parse_address, parse_b256, parse_u256};
use crate::cli::{DigestArgs, RejectionHashArgs, SchemeArg};
use crate::output::{DigestOutput, RejectionOutput};

pub fn run(args: DigestArgs, json: bool) -> Result<()> {
    let safe = parse_address("safe", &args.safe)?;
    let scheme = scheme(&args)?;
    let data = match args.data.as_deref() {
        None | Some("") | Some("0x") => None,
        Some(raw) => Some(Bytes::from(
            hex::decode(raw).wrap_err_with(|| format!("invalid call data: {raw}"))?,
        )),
    };
    let tx = SafeTransaction {
        to: parse_address("to", &args.to)?,
        value: parse_u256("value", &args.value)?,
        data,
        operation: Operation::from_code(args.operation)?,
        nonce: Some(parse_u256("nonce", &args.nonce)?),
    };
    let fees = ExecutionParams {
        tx_gas: parse_u256("safe tx gas", &args.safe_tx_gas)?,
        data_gas: parse_u256("data gas", &args.data_gas)?,
        gas_price: parse_u256("gas price", &args.gas_price)?,
        gas_token: match args.gas_token.as_deref() {
            Some(raw) => parse_address("gas token", raw)?,
            None => Address::ZERO,
        },
    };

    let digest = transaction_digest(scheme, safe, &tx, &fees)?;
    DigestOutput {
        safe,
        scheme,
        digest,
        rejection_digest: rejection_digest(digest),
    }
    .print(json)
}

pub fn run_rejection(args: RejectionHashArgs, json: bool) -> Result<()> {
    let digest = parse_b256("digest", &args.digest)?;
    RejectionOutput {
        digest,
        rejection_digest: rejection_digest(digest),
    }
    .print(json)
}

fn scheme(args: &DigestArgs) -> Result<DigestScheme> {
    if let Some(raw) = &args.contract_version {
        let version = semver::Version::parse(raw.trim())
            .wrap_err_with(|| format!("invalid contract version: {raw}"))?;
        return Ok(DigestScheme::for_version(&version));
    }
    Ok(match args.scheme {
        SchemeArg::Eip712 => DigestScheme::Eip712(SafeTxVersion::V1),
        SchemeArg::Eip712Legacy => DigestScheme::Eip712(SafeTxVersion::V0),
        SchemeArg::Erc191Raw => DigestScheme::Erc191(DataEncoding::Raw),
        SchemeArg::Erc191Hashed => DigestScheme::Erc191(DataEncoding::Hashed),
    })
}
