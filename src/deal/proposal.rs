//! Building and signing storage deal proposals.

use tracing::debug;

use crate::models::address::Address;
use crate::models::chain::ChainEpoch;
use crate::models::chain::CollateralBounds;
use crate::models::chain::EPOCHS_IN_DAY;
use crate::models::cid::Cid;
use crate::models::deal::DealLabel;
use crate::models::deal::DealProposal;
use crate::models::deal::LabelError;
use crate::models::deal::SignedDealProposal;
use crate::models::piece::PaddedPieceSize;
use crate::models::signature::MsgMeta;
use crate::models::token_amount::TokenAmount;
use crate::wallet::SignError;
use crate::wallet::Signer;

const GIB: u64 = 1 << 30;

/// 180 days.
pub const DEFAULT_DURATION: ChainEpoch = 180 * EPOCHS_IN_DAY;

/// Distance from the chain head to the start epoch when none is given.
pub const DEFAULT_START_EPOCH_OFFSET: ChainEpoch = 2 * EPOCHS_IN_DAY;

/// attoFIL per epoch per GiB.
pub const DEFAULT_PRICE_PER_GIB_EPOCH: u64 = 1;

#[derive(Debug, thiserror::Error)]
pub enum ProposalError {
    /// Terminal for the negotiation attempt.
    #[error("signing fault: {0}")]
    Signing(#[from] SignError),

    #[error("invalid label: {0}")]
    Label(#[from] LabelError),

    #[error("failed to serialize proposal: {0}")]
    Encode(#[from] serde_cbor::Error),
}

/// Everything a proposal is built from.
#[derive(Debug, Clone)]
pub struct ProposalParams {
    pub client: Address,
    pub provider: Address,
    /// Root of the archived DAG, used as the label.
    pub root: Cid,
    pub piece_cid: Cid,
    pub piece_size: PaddedPieceSize,
    pub start_epoch: ChainEpoch,
    pub duration: ChainEpoch,
    pub verified: bool,
    pub provider_collateral: TokenAmount,
    pub price_per_gib_epoch: TokenAmount,
}

/// `piece_size * rate / 2^30`, multiplied before dividing and rounded down.
pub fn price_per_epoch(piece_size: PaddedPieceSize, price_per_gib_epoch: &TokenAmount) -> TokenAmount {
    &(price_per_gib_epoch * piece_size.bytes()) / GIB
}

/// The provider collateral we offer: the minimum bound plus 20%.
pub fn provider_collateral(bounds: &CollateralBounds) -> TokenAmount {
    &(&bounds.min * 6) / 5
}

/// An explicit start epoch wins, then an offset from the head, then the
/// default offset.
pub fn resolve_start_epoch(
    head: ChainEpoch,
    explicit: Option<ChainEpoch>,
    head_offset: Option<ChainEpoch>,
) -> ChainEpoch {
    explicit.unwrap_or_else(|| head + head_offset.unwrap_or(DEFAULT_START_EPOCH_OFFSET))
}

/// Build the proposal and have `signer` sign its canonical bytes on behalf
/// of the client.
pub async fn create_deal_proposal(
    signer: &dyn Signer,
    params: ProposalParams,
) -> Result<SignedDealProposal, ProposalError> {
    let proposal = DealProposal {
        piece_cid: params.piece_cid,
        piece_size: params.piece_size,
        verified_deal: params.verified,
        client: params.client,
        provider: params.provider,
        label: DealLabel::new(params.root.to_string())?,
        start_epoch: params.start_epoch,
        end_epoch: params.start_epoch + params.duration,
        storage_price_per_epoch: price_per_epoch(params.piece_size, &params.price_per_gib_epoch),
        provider_collateral: params.provider_collateral,
    };

    let bytes = proposal.signing_bytes()?;
    let client_signature = signer
        .wallet_sign(&proposal.client, &bytes, MsgMeta::deal_proposal())
        .await?;

    debug!(
        client = %proposal.client,
        provider = %proposal.provider,
        start = proposal.start_epoch,
        end = proposal.end_epoch,
        price = %proposal.storage_price_per_epoch,
        "signed deal proposal"
    );

    Ok(SignedDealProposal {
        proposal,
        client_signature,
    })
}
