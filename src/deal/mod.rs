//! Deal-making: proposals, negotiation with providers and the offline data
//! hand-off that follows an accepted deal.

pub mod import;
pub mod negotiation;
pub mod proposal;

use uuid::Uuid;

use crate::models::cid::Cid;
use crate::models::deal::DealParams;
use crate::models::deal::SignedDealProposal;
use crate::models::deal::Transfer;

/// Negotiation preferences sent along with a proposal.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DealPreferences {
    pub remove_unsealed_copy: bool,
    pub skip_ipni_announce: bool,
}

/// Params for a fresh negotiation attempt of an offline deal. Every call gets
/// a new deal uuid.
pub fn offline_deal_params(
    proposal: SignedDealProposal,
    root: Cid,
    preferences: DealPreferences,
) -> DealParams {
    DealParams {
        deal_uuid: Uuid::new_v4(),
        is_offline: true,
        client_deal_proposal: proposal,
        deal_data_root: root,
        transfer: Transfer::default(),
        remove_unsealed_copy: preferences.remove_unsealed_copy,
        skip_ipni_announce: preferences.skip_ipni_announce,
    }
}
