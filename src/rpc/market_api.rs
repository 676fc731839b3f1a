use std::path::Path;
use std::path::PathBuf;

use async_trait::async_trait;
use tarpc::context;
use uuid::Uuid;

use super::ApiError;
use crate::models::cid::Cid;
use crate::models::deal::MarketDeal;
use crate::models::deal::ProviderDealRejection;

/// The deal-market backend, used to hand off data for offline deals.
#[async_trait]
pub trait MarketApi: Send + Sync {
    async fn deal_by_signed_proposal_cid(&self, proposal_cid: &Cid) -> Result<MarketDeal, ApiError>;

    /// Tell the backend the data for `deal_uuid` is at `path`. `Ok(Some(_))`
    /// means the backend declined the import.
    async fn offline_deal_with_data(
        &self,
        deal_uuid: Uuid,
        path: &Path,
        delete_after_import: bool,
    ) -> Result<Option<ProviderDealRejection>, ApiError>;
}

#[tarpc::service]
pub trait MarketRpc {
    async fn deal_by_signed_proposal_cid(proposal_cid: Cid) -> Result<MarketDeal, String>;

    async fn offline_deal_with_data(
        deal_uuid: Uuid,
        path: PathBuf,
        delete_after_import: bool,
    ) -> Result<Option<ProviderDealRejection>, String>;
}

#[async_trait]
impl MarketApi for MarketRpcClient {
    async fn deal_by_signed_proposal_cid(&self, proposal_cid: &Cid) -> Result<MarketDeal, ApiError> {
        MarketRpcClient::deal_by_signed_proposal_cid(self, context::current(), *proposal_cid)
            .await?
            .map_err(ApiError::Backend)
    }

    async fn offline_deal_with_data(
        &self,
        deal_uuid: Uuid,
        path: &Path,
        delete_after_import: bool,
    ) -> Result<Option<ProviderDealRejection>, ApiError> {
        MarketRpcClient::offline_deal_with_data(
            self,
            context::current(),
            deal_uuid,
            path.to_path_buf(),
            delete_after_import,
        )
        .await?
        .map_err(ApiError::Backend)
    }
}
