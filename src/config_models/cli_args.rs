use std::net::SocketAddr;
use std::path::PathBuf;

use bytesize::ByteSize;
use clap::Parser;
use clap::Subcommand;

use super::network::Network;
use crate::models::address::Address;
use crate::models::chain::ChainEpoch;

/// Decalarative specification of command-line arguments
#[derive(Parser, Debug, Clone)]
#[clap(author, version, about)]
pub struct Args {
    /// The repository directory that holds keys and temporary files.
    ///
    /// Defaults to an OS-specific data directory with the network appended.
    #[clap(long, value_name = "DIR")]
    pub data_dir: Option<PathBuf>,

    /// Specify network, `mainnet` or `calibnet`
    #[clap(long, short, default_value = "mainnet")]
    pub network: Network,

    /// Log at debug level unless RUST_LOG says otherwise.
    #[clap(long)]
    pub debug: bool,

    /// Socket address of the chain node's RPC server.
    #[clap(long, default_value = "127.0.0.1:1234")]
    pub node_rpc: SocketAddr,

    /// Socket address of the deal-market backend's RPC server.
    #[clap(long, default_value = "127.0.0.1:1288")]
    pub market_rpc: SocketAddr,

    /// File with hex-encoded ed25519 secret keys, one per line. The first key
    /// is the default wallet. Defaults to `keys.hex` in the data directory.
    #[clap(long, value_name = "FILE")]
    pub key_file: Option<PathBuf>,

    #[clap(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug, Clone)]
pub enum Command {
    /// Package random data and pledge it to a storage provider as offline deals.
    Run(RunArgs),

    /// Add funds for a wallet to the storage market actor.
    ///
    /// Uses base fee + 20% as fee cap floor and a maximum fee of 1 nFIL.
    MarketAdd {
        /// Move balance from this wallet address to its market escrow.
        #[clap(long)]
        wallet: Option<Address>,

        /// Amount in whole coins, e.g. `0.5`.
        amount: String,
    },
}

#[derive(Parser, Debug, Clone)]
pub struct RunArgs {
    /// Storage provider on-chain address.
    #[clap(long)]
    pub provider: Address,

    /// Minimum size of the generated archive source.
    ///
    /// Units: B (bytes), KiB, MiB, GiB
    #[clap(long, default_value = "1GiB")]
    pub min_size: ByteSize,

    /// Maximum size of the generated archive source.
    #[clap(long, default_value = "31GiB")]
    pub max_size: ByteSize,

    /// Keep pledging until this many bytes have been pledged in total.
    /// Without it, a single deal is made.
    #[clap(long)]
    pub max_pledge: Option<ByteSize>,

    /// Whether the deal funds should come from verified client data-cap.
    #[clap(long)]
    pub verified: bool,

    /// An unsealed copy of the sector is not required for fast retrieval.
    #[clap(long)]
    pub remove_unsealed_copy: bool,

    /// Do not announce the deal index to the network indexer.
    #[clap(long)]
    pub skip_ipni_announce: bool,

    /// Wallet address used to initiate the deal. Defaults to the first key.
    #[clap(long)]
    pub wallet: Option<Address>,

    /// Storage price in atto per epoch per GiB.
    #[clap(long, default_value = "1")]
    pub storage_price: u64,

    /// Duration of the deal in epochs. Default is 180 days.
    #[clap(long, default_value = "518400")]
    pub duration: ChainEpoch,

    /// Start epoch relative to the current chain head.
    #[clap(long, conflicts_with = "start_epoch")]
    pub start_epoch_head_offset: Option<ChainEpoch>,

    /// Absolute start epoch by which the provider must prove the deal.
    #[clap(long)]
    pub start_epoch: Option<ChainEpoch>,

    /// Give up on a provider that has not answered within this time.
    #[clap(long, default_value = "10m")]
    pub negotiation_timeout: humantime::Duration,

    /// Leaf chunk size of the content DAG.
    #[clap(long, default_value = "1MiB")]
    pub chunk_size: ByteSize,

    /// Maximum number of links per internal DAG node.
    #[clap(long, default_value = "1024")]
    pub max_links: usize,
}
