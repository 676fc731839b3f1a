//! Deal proposal and negotiation records.

use serde::Deserialize;
use serde::Serialize;
use uuid::Uuid;

use super::address::Address;
use super::chain::ChainEpoch;
use super::cid::Cid;
use super::cid::CidError;
use super::piece::PaddedPieceSize;
use super::signature::Signature;
use super::token_amount::TokenAmount;

/// Maximum length of a proposal label, in bytes.
pub const MAX_LABEL_LEN: usize = 256;

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum LabelError {
    #[error("label is {0} bytes, at most {MAX_LABEL_LEN} are allowed")]
    TooLong(usize),
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct DealLabel(String);

impl DealLabel {
    pub fn new(label: impl Into<String>) -> Result<Self, LabelError> {
        let label = label.into();
        if label.len() > MAX_LABEL_LEN {
            return Err(LabelError::TooLong(label.len()));
        }
        Ok(Self(label))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct DealProposal {
    pub piece_cid: Cid,
    pub piece_size: PaddedPieceSize,
    pub verified_deal: bool,
    pub client: Address,
    pub provider: Address,
    pub label: DealLabel,
    pub start_epoch: ChainEpoch,
    pub end_epoch: ChainEpoch,
    pub storage_price_per_epoch: TokenAmount,
    pub provider_collateral: TokenAmount,
}

impl DealProposal {
    /// Canonical bytes over which the client signs.
    pub fn signing_bytes(&self) -> Result<Vec<u8>, serde_cbor::Error> {
        serde_cbor::to_vec(self)
    }

    pub fn duration(&self) -> ChainEpoch {
        self.end_epoch - self.start_epoch
    }
}

/// A proposal together with the client's signature over its canonical bytes.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct SignedDealProposal {
    pub proposal: DealProposal,
    pub client_signature: Signature,
}

impl SignedDealProposal {
    pub fn cid(&self) -> Result<Cid, CidError> {
        super::cid::of_cbor(self)
    }
}

/// How the provider obtains the data. Empty for offline deals.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Transfer {
    pub kind: String,
    pub client_id: String,
    pub params: Vec<u8>,
    pub size: u64,
}

/// The request written to the provider for one negotiation attempt.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct DealParams {
    pub deal_uuid: Uuid,
    pub is_offline: bool,
    pub client_deal_proposal: SignedDealProposal,
    pub deal_data_root: Cid,
    pub transfer: Transfer,
    pub remove_unsealed_copy: bool,
    pub skip_ipni_announce: bool,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct DealResponse {
    pub accepted: bool,
    /// Reason for rejection, if any.
    pub message: String,
}

/// A deal as recorded by the deal-market backend.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct MarketDeal {
    pub deal_uuid: Uuid,
    pub signed_proposal_cid: Cid,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProviderDealRejection {
    pub reason: String,
}
