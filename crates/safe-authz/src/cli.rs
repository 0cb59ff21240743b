use clap::{Args, Parser, Subcommand, ValueEnum};

#[derive(Parser)]
#[command(name = "safe-authz", version)]
#[command(about = "Operator tools for Safe transaction authorization", long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    /// Output as JSON
    #[arg(long, global = true)]
    pub json: bool,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Compute the digest owners sign for a Safe transaction
    Digest(DigestArgs),

    /// Compute the hash an owner signs to reject a transaction
    RejectionHash(RejectionHashArgs),

    /// Decide which submission the local signer may perform
    Policy(PolicyArgs),

    /// Order and concatenate owner signatures for execution
    Aggregate(AggregateArgs),

    /// Inspect a bridge pairing URI
    ParseUri(ParseUriArgs),

    /// Follow the publish status of a submitted transaction
    Watch(WatchArgs),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum SchemeArg {
    /// EIP-712 with the `baseGas` field (contracts >= 1.0.0)
    Eip712,
    /// EIP-712 with the legacy `dataGas` field
    Eip712Legacy,
    /// ERC-191 concatenation with raw call data
    Erc191Raw,
    /// ERC-191 concatenation with hashed call data
    Erc191Hashed,
}

#[derive(Args, Clone)]
pub struct DigestArgs {
    /// Safe contract address
    #[arg(long, env = "SAFE_ADDRESS")]
    pub safe: String,

    /// Call target
    #[arg(long)]
    pub to: String,

    /// Value in wei
    #[arg(long, default_value = "0")]
    pub value: String,

    /// Call data as 0x-prefixed hex
    #[arg(long)]
    pub data: Option<String>,

    /// 0 = call, 1 = delegatecall
    #[arg(long, default_value_t = 0)]
    pub operation: u8,

    /// Safe nonce
    #[arg(long)]
    pub nonce: String,

    #[arg(long, default_value = "0")]
    pub safe_tx_gas: String,

    #[arg(long, default_value = "0")]
    pub data_gas: String,

    #[arg(long, default_value = "0")]
    pub gas_price: String,

    /// Fee token; the zero address pays in ether
    #[arg(long)]
    pub gas_token: Option<String>,

    #[arg(long, value_enum, default_value_t = SchemeArg::Eip712)]
    pub scheme: SchemeArg,

    /// Pick the scheme from the contract's VERSION() instead
    #[arg(long, conflicts_with = "scheme")]
    pub contract_version: Option<String>,
}

#[derive(Args, Clone)]
pub struct RejectionHashArgs {
    /// Transaction digest being rejected
    #[arg(value_name = "DIGEST")]
    pub digest: String,
}

#[derive(Args, Clone)]
pub struct SignatureArgs {
    /// Digest the signatures were made over
    #[arg(long)]
    pub digest: String,

    /// Owner signature as 0x-prefixed r||s||v hex (repeatable)
    #[arg(long = "signature", value_name = "SIG")]
    pub signatures: Vec<String>,
}

#[derive(Args, Clone)]
pub struct PolicyArgs {
    /// Current owners (comma separated)
    #[arg(long, value_delimiter = ',', required = true)]
    pub owners: Vec<String>,

    #[arg(long)]
    pub threshold: usize,

    /// Address of the local signer
    #[arg(long)]
    pub signer: String,

    /// The transaction is already executed on chain
    #[arg(long)]
    pub executed: bool,

    #[command(flatten)]
    pub signatures: SignatureArgs,
}

#[derive(Args, Clone)]
pub struct AggregateArgs {
    #[arg(long)]
    pub threshold: usize,

    /// Only accept signatures from these owners (comma separated)
    #[arg(long, value_delimiter = ',')]
    pub owners: Vec<String>,

    #[command(flatten)]
    pub signatures: SignatureArgs,
}

#[derive(Args, Clone)]
pub struct ParseUriArgs {
    /// `wc:` pairing URI
    #[arg(value_name = "URI")]
    pub uri: String,
}

#[derive(Args, Clone)]
pub struct WatchArgs {
    /// Chain transaction hash returned at submission
    #[arg(value_name = "TX_HASH")]
    pub tx_hash: String,

    /// Safe that executed the transaction
    #[arg(long, env = "SAFE_ADDRESS")]
    pub safe: String,

    /// RPC endpoint URL
    #[arg(long, env = "SAFE_AUTHZ_RPC_URL")]
    pub rpc_url: Option<String>,

    /// Delay between receipt reads; defaults to the configured status retry delay
    #[arg(long)]
    pub interval_ms: Option<u64>,

    /// Give up after this many reads
    #[arg(long)]
    pub max_polls: Option<u32>,
}
