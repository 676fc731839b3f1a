use std::sync::Arc;

use async_trait::async_trait;

use crate::models::address::Address;
use crate::rpc::chain_api::ChainApi;
use crate::rpc::ApiError;

/// Where the submitter gets the nonce for an account's next message.
#[async_trait]
pub trait NonceSource: Send + Sync {
    async fn next_nonce(&self, address: &Address) -> Result<u64, ApiError>;
}

/// Reads the account's sequence from chain state on every call and adds one.
///
/// Nothing is reserved locally, so two submissions from the same account in
/// flight at once can be assigned the same nonce. Callers must submit one
/// message per account at a time, or install a [`NonceSource`] that reserves.
#[derive(Clone)]
pub struct ChainNonces(pub Arc<dyn ChainApi>);

impl std::fmt::Debug for ChainNonces {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_tuple("ChainNonces").finish_non_exhaustive()
    }
}

#[async_trait]
impl NonceSource for ChainNonces {
    async fn next_nonce(&self, address: &Address) -> Result<u64, ApiError> {
        Ok(self.0.state_get_actor(address).await?.nonce + 1)
    }
}
