use std::time::Duration;

use eyre::Result;
use safe_authz_adapters::{AuthzConfig, RpcChainReader};
use safe_authz_core::{classify_receipt, ChainReaderPort, PublishStatus};
use tracing::{info, warn};

use super::{parse_address, parse_b256};
use crate::cli::WatchArgs;
use crate::output::WatchOutput;

pub async fn run(args: WatchArgs, json: bool) -> Result<()> {
    let mut config = AuthzConfig::from_env()?;
    if let Some(rpc_url) = args.rpc_url {
        config.rpc_url = rpc_url;
    }
    let interval = Duration::from_millis(args.interval_ms.unwrap_or(config.status_retry_delay_ms));
    let safe = parse_address("safe", &args.safe)?;
    let tx_hash = parse_b256("transaction hash", &args.tx_hash)?;
    let reader = RpcChainReader::new(&config)?;

    let mut polls = 0u32;
    let status = loop {
        polls += 1;
        let last = match reader.transaction_receipt(tx_hash).await {
            Ok(Some(receipt)) => break classify_receipt(safe, &receipt),
            Ok(None) => {
                info!(%tx_hash, polls, "transaction pending");
                PublishStatus::Pending
            }
            Err(e) => {
                warn!(%tx_hash, error = %e, "receipt read failed, retrying");
                PublishStatus::Unknown
            }
        };
        if args.max_polls.is_some_and(|max| polls >= max) {
            break last;
        }
        tokio::time::sleep(interval).await;
    };

    WatchOutput {
        tx_hash,
        status,
        polls,
    }
    .print(json)
}
