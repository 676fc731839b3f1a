//! The pledge loop: synthesize content, package it, commit to it, propose an
//! offline deal and hand the archive to the market backend. Also the
//! `market-add` escrow top-up.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use std::time::Instant;

use anyhow::bail;
use anyhow::ensure;
use anyhow::Context;
use anyhow::Result;
use bytesize::ByteSize;
use rand::Rng;
use tokio_util::sync::CancellationToken;
use tracing::field;
use tracing::info;
use tracing::info_span;
use tracing::Instrument;
use tracing::Span;
use uuid::Uuid;

use crate::commp::commp;
use crate::config_models::cli_args::RunArgs;
use crate::deal::import::import_offline_data;
use crate::deal::import::DealRef;
use crate::deal::negotiation::negotiate_deal;
use crate::deal::offline_deal_params;
use crate::deal::proposal::create_deal_proposal;
use crate::deal::proposal::provider_collateral;
use crate::deal::proposal::resolve_start_epoch;
use crate::deal::proposal::ProposalParams;
use crate::deal::DealPreferences;
use crate::models::address::Address;
use crate::models::chain::ChainEpoch;
use crate::models::chain::Message;
use crate::models::chain::MARKET_METHOD_ADD_BALANCE;
use crate::models::cid::Cid;
use crate::models::token_amount::TokenAmount;
use crate::p2p::Host;
use crate::packer::create_dense_car;
use crate::packer::create_random_file;
use crate::packer::DagParams;
use crate::rpc::chain_api::ChainApi;
use crate::rpc::market_api::MarketApi;
use crate::tx_initiation::submitter::Submitted;
use crate::tx_initiation::submitter::TransactionSubmitter;
use crate::wallet::LocalWallet;

/// Escrow a wallet must hold in the market actor before we start pledging.
pub const MIN_MARKET_ESCROW_FIL: u64 = 1;

/// Settings for a pledge run.
#[derive(Debug, Clone)]
pub struct PledgeConfig {
    pub provider: Address,
    pub wallet: Option<Address>,
    pub min_size: u64,
    pub max_size: u64,
    /// Cumulative source bytes to pledge. `None` makes a single deal.
    pub max_pledge: Option<u64>,
    pub verified: bool,
    pub preferences: DealPreferences,
    pub price_per_gib_epoch: TokenAmount,
    pub duration: ChainEpoch,
    pub start_epoch: Option<ChainEpoch>,
    pub start_epoch_head_offset: Option<ChainEpoch>,
    pub negotiation_timeout: Duration,
    pub dag: DagParams,
    /// Scratch directory for source files and archives.
    pub temp_dir: PathBuf,
}

impl PledgeConfig {
    pub fn from_run_args(args: &RunArgs, temp_dir: PathBuf) -> Result<Self> {
        let config = Self {
            provider: args.provider,
            wallet: args.wallet,
            min_size: args.min_size.as_u64(),
            max_size: args.max_size.as_u64(),
            max_pledge: args.max_pledge.map(|size| size.as_u64()),
            verified: args.verified,
            preferences: DealPreferences {
                remove_unsealed_copy: args.remove_unsealed_copy,
                skip_ipni_announce: args.skip_ipni_announce,
            },
            price_per_gib_epoch: TokenAmount::from(args.storage_price),
            duration: args.duration,
            start_epoch: args.start_epoch,
            start_epoch_head_offset: args.start_epoch_head_offset,
            negotiation_timeout: *args.negotiation_timeout,
            dag: DagParams {
                chunk_size: usize::try_from(args.chunk_size.as_u64())
                    .context("chunk size does not fit in memory")?,
                max_links: args.max_links,
                ..DagParams::default()
            },
            temp_dir,
        };
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        ensure!(self.min_size > 0, "minimum size must be positive");
        ensure!(
            self.min_size <= self.max_size,
            "minimum size {} is larger than maximum size {}",
            ByteSize(self.min_size),
            ByteSize(self.max_size)
        );
        ensure!(self.duration > 0, "deal duration must be positive");
        self.dag.validate().map_err(anyhow::Error::msg)?;
        Ok(())
    }

    fn random_size(&self) -> u64 {
        rand::rng().random_range(self.min_size..=self.max_size)
    }
}

/// What one successful cycle produced.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Pledged {
    pub deal_uuid: Uuid,
    pub root: Cid,
    pub piece_cid: Cid,
    /// Bytes of synthetic source data behind the deal.
    pub source_size: u64,
    /// The archive, left for the market backend to import.
    pub archive: PathBuf,
}

/// Drives pledge cycles against one chain node, one market backend and the
/// peer network reachable through `host`.
pub struct Pledger<H: Host> {
    chain: Arc<dyn ChainApi>,
    market: Arc<dyn MarketApi>,
    wallet: Arc<LocalWallet>,
    host: H,
}

impl<H: Host> std::fmt::Debug for Pledger<H> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Pledger")
            .field("wallet", &self.wallet)
            .finish_non_exhaustive()
    }
}

impl<H: Host> Pledger<H> {
    pub fn new(
        chain: Arc<dyn ChainApi>,
        market: Arc<dyn MarketApi>,
        wallet: Arc<LocalWallet>,
        host: H,
    ) -> Self {
        Self {
            chain,
            market,
            wallet,
            host,
        }
    }

    /// Make deals until `max_pledge` source bytes are pledged, or one deal if
    /// there is no target. Returns the total pledged.
    pub async fn run(&self, config: &PledgeConfig, cancel: &CancellationToken) -> Result<u64> {
        config.validate()?;
        let client = self.client_address(config.wallet)?;

        let balance = self
            .chain
            .state_market_balance(&client)
            .await
            .context("Failed to get market balance")?;
        if balance.escrow < TokenAmount::from_whole(MIN_MARKET_ESCROW_FIL) {
            bail!(
                "market balance of {client} is {}, less than {MIN_MARKET_ESCROW_FIL} FIL",
                balance.escrow.to_fil_string()
            );
        }

        let mut total = 0u64;
        let mut attempt = 0u32;
        loop {
            if cancel.is_cancelled() {
                bail!("pledging cancelled after {}", ByteSize(total));
            }
            attempt += 1;
            let size = config.random_size();
            let span = info_span!(
                "pledge",
                attempt,
                provider = %config.provider,
                root = field::Empty,
                deal_uuid = field::Empty,
            );
            let pledged = self
                .run_pledge(config, client, size, cancel)
                .instrument(span)
                .await
                .with_context(|| format!("pledge attempt {attempt} failed"))?;
            total += pledged.source_size;

            match config.max_pledge {
                Some(target) if total < target => {
                    info!(
                        pledged = %ByteSize(total),
                        target = %ByteSize(target),
                        "continuing"
                    );
                }
                _ => break,
            }
        }

        info!(total = %ByteSize(total), attempts = attempt, "total pledge");
        Ok(total)
    }

    /// One full cycle with a source of `size` bytes.
    ///
    /// The source file is always removed. The archive is removed unless the
    /// market backend accepted it for import.
    pub async fn run_pledge(
        &self,
        config: &PledgeConfig,
        client: Address,
        size: u64,
        cancel: &CancellationToken,
    ) -> Result<Pledged> {
        let started = Instant::now();

        let dir = config.temp_dir.clone();
        let source = tokio::task::spawn_blocking(move || create_random_file(&dir, size))
            .await?
            .context("Failed to create random source file")?;

        let dir = config.temp_dir.clone();
        let source_path = source.to_path_buf();
        let dag = config.dag;
        let archive =
            tokio::task::spawn_blocking(move || create_dense_car(&dir, &source_path, &dag))
                .await?
                .context("Failed to package source")?;
        drop(source);
        Span::current().record("root", field::display(&archive.root));
        info!(source = %ByteSize(size), elapsed = ?started.elapsed(), "packed");

        let archive_path = archive.path.to_path_buf();
        let commitment = tokio::task::spawn_blocking(move || commp(&archive_path))
            .await?
            .context("Failed to compute piece commitment")?;
        info!(
            piece_cid = %commitment.piece_cid,
            piece_size = %ByteSize(commitment.piece_size.bytes()),
            payload = %ByteSize(commitment.payload_size),
            "computed commP"
        );

        let peer = self
            .chain
            .state_miner_peer_info(&config.provider)
            .await
            .with_context(|| format!("Failed to get peer info of {}", config.provider))?;

        let bounds = self
            .chain
            .state_deal_provider_collateral_bounds(commitment.piece_size, config.verified)
            .await
            .context("Failed to get provider collateral bounds")?;

        let head = self
            .chain
            .chain_head()
            .await
            .context("Failed to get chain head")?;
        let start_epoch = resolve_start_epoch(
            head.height,
            config.start_epoch,
            config.start_epoch_head_offset,
        );

        let proposal = create_deal_proposal(
            self.wallet.as_ref(),
            ProposalParams {
                client,
                provider: config.provider,
                root: archive.root,
                piece_cid: commitment.piece_cid,
                piece_size: commitment.piece_size,
                start_epoch,
                duration: config.duration,
                verified: config.verified,
                provider_collateral: provider_collateral(&bounds),
                price_per_gib_epoch: config.price_per_gib_epoch.clone(),
            },
        )
        .await
        .context("Failed to create deal proposal")?;

        let params = offline_deal_params(proposal, archive.root, config.preferences);
        let deal_uuid = params.deal_uuid;
        Span::current().record("deal_uuid", field::display(deal_uuid));

        negotiate_deal(&self.host, &peer, &params, cancel, config.negotiation_timeout)
            .await
            .context("Deal negotiation failed")?;

        import_offline_data(
            self.market.as_ref(),
            &DealRef::Uuid(deal_uuid),
            &archive.path,
            true,
        )
        .await
        .context("Failed to import deal data")?;

        let root = archive.root;
        let archive = archive
            .path
            .keep()
            .map_err(|e| e.error)
            .context("Failed to retain archive")?;

        info!(elapsed = ?started.elapsed(), "pledged");
        Ok(Pledged {
            deal_uuid,
            root,
            piece_cid: commitment.piece_cid,
            source_size: size,
            archive,
        })
    }

    fn client_address(&self, requested: Option<Address>) -> Result<Address> {
        match requested {
            Some(address) if self.wallet.has(&address) => Ok(address),
            Some(address) => bail!("wallet has no key for {address}"),
            None => self
                .wallet
                .default_address()
                .context("wallet has no keys"),
        }
    }
}

/// Move `amount` from `from` into its storage market escrow.
pub async fn market_add(
    chain: Arc<dyn ChainApi>,
    wallet: Arc<LocalWallet>,
    from: Address,
    amount: TokenAmount,
) -> Result<Submitted> {
    ensure!(!amount.is_zero(), "amount must be positive");

    let params = serde_cbor::to_vec(&from).context("Failed to encode AddBalance params")?;
    let message = Message::new(
        Address::storage_market_actor(from.network()),
        from,
        amount.clone(),
        MARKET_METHOD_ADD_BALANCE,
        params,
    );

    let submitted = TransactionSubmitter::new(chain, wallet)
        .submit(message, None)
        .await
        .context("Failed to submit AddBalance message")?;
    info!(cid = %submitted.cid, %from, amount = %amount.to_fil_string(), "market add message sent");
    Ok(submitted)
}
