use eyre::Result;
use safe_authz_adapters::BridgeUri;

use crate::cli::ParseUriArgs;
use crate::output::UriOutput;

pub fn run(args: ParseUriArgs, json: bool) -> Result<()> {
    let uri = BridgeUri::parse(&args.uri)?;
    UriOutput {
        handshake_topic: uri.handshake_topic.clone(),
        version: uri.version,
        bridge: uri.bridge.to_string(),
        socket_url: uri.socket_url(),
    }
    .print(json)
}
