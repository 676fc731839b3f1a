pub mod commp;
pub mod config_models;
pub mod deal;
pub mod driver;
pub mod models;
pub mod p2p;
pub mod packer;
pub mod rpc;
pub mod tx_initiation;
pub mod wallet;


use std::sync::Arc;

use anyhow::Context;
use anyhow::Result;
use tokio_util::sync::CancellationToken;
use tracing::info;
use tracing::warn;

use crate::config_models::cli_args;
use crate::config_models::cli_args::Command;
use crate::config_models::data_directory::DataDirectory;
use crate::driver::market_add;
use crate::driver::PledgeConfig;
use crate::driver::Pledger;
use crate::models::token_amount::TokenAmount;
use crate::p2p::tcp_host::TcpHost;
use crate::wallet::LocalWallet;

/// Set up the data directory and wallet, connect to the backends and run the
/// requested command to completion.
pub async fn initialize(cli_args: cli_args::Args) -> Result<()> {
    let data_dir = DataDirectory::get(cli_args.data_dir.clone(), cli_args.network)?;
    DataDirectory::create_dir_if_not_exists(&data_dir.root_dir_path())?;
    info!("Data directory is {}", data_dir);

    let key_file = cli_args
        .key_file
        .clone()
        .unwrap_or_else(|| data_dir.key_file_path());
    let wallet = Arc::new(LocalWallet::load_or_create(&key_file, cli_args.network)?);

    let chain = Arc::new(rpc::connect_node(cli_args.node_rpc).await?);
    info!("Connected to node RPC at {}", cli_args.node_rpc);

    match cli_args.command {
        Command::Run(run_args) => {
            let temp_dir = data_dir.temp_dir_path();
            DataDirectory::create_dir_if_not_exists(&temp_dir)?;
            let config = PledgeConfig::from_run_args(&run_args, temp_dir)?;

            let market = Arc::new(rpc::connect_market(cli_args.market_rpc).await?);
            info!("Connected to market RPC at {}", cli_args.market_rpc);

            let cancel = CancellationToken::new();
            let on_signal = cancel.clone();
            tokio::spawn(async move {
                if tokio::signal::ctrl_c().await.is_ok() {
                    warn!("Received ctrl-c, cancelling");
                    on_signal.cancel();
                }
            });

            let pledger = Pledger::new(chain, market, wallet, TcpHost::with_random_id());
            pledger.run(&config, &cancel).await?;
        }
        Command::MarketAdd {
            wallet: from,
            amount,
        } => {
            let amount = TokenAmount::parse_fil(&amount)
                .map_err(anyhow::Error::msg)
                .with_context(|| format!("invalid amount {amount:?}"))?;
            let from = match from {
                Some(address) => address,
                None => wallet
                    .default_address()
                    .context("wallet has no keys")?,
            };
            market_add(chain, wallet, from, amount).await?;
        }
    }

    Ok(())
}
