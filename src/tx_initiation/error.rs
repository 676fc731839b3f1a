//! provides error types related to submitting chain messages.

use crate::rpc::ApiError;
use crate::wallet::SignError;

/// The step of a submission that failed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, strum::Display)]
pub enum SubmitStage {
    #[strum(serialize = "chain head lookup")]
    ChainHead,
    #[strum(serialize = "nonce lookup")]
    NonceLookup,
    #[strum(serialize = "gas estimation")]
    GasEstimation,
    #[strum(serialize = "mempool push")]
    MpoolPush,
}

/// enumerates possible message submission errors
#[derive(Debug, Clone, thiserror::Error)]
#[non_exhaustive]
pub enum SubmitError {
    #[error("chain api failed during {stage}: {source}")]
    ChainApi { stage: SubmitStage, source: ApiError },

    #[error("signing failed: {0}")]
    Signing(#[from] SignError),

    #[error("failed to serialize message: {0}")]
    Encode(String),
}

impl SubmitError {
    pub(crate) fn at(stage: SubmitStage) -> impl FnOnce(ApiError) -> Self {
        move |source| Self::ChainApi { stage, source }
    }
}
