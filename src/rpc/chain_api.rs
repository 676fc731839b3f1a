use async_trait::async_trait;
use tarpc::context;

use super::ApiError;
use crate::models::address::Address;
use crate::models::chain::Actor;
use crate::models::chain::CollateralBounds;
use crate::models::chain::MarketBalance;
use crate::models::chain::Message;
use crate::models::chain::MessageSendSpec;
use crate::models::chain::PeerAddrInfo;
use crate::models::chain::SignedMessage;
use crate::models::chain::TipsetHead;
use crate::models::cid::Cid;
use crate::models::piece::PaddedPieceSize;

/// The chain node, as far as deal-making and message submission need it.
///
/// Implementations are remote and may be slow or fail; callers attach their
/// own stage context and nothing here is cached or retried.
#[async_trait]
pub trait ChainApi: Send + Sync {
    async fn chain_head(&self) -> Result<TipsetHead, ApiError>;

    async fn state_get_actor(&self, address: &Address) -> Result<Actor, ApiError>;

    async fn state_market_balance(&self, address: &Address) -> Result<MarketBalance, ApiError>;

    async fn state_deal_provider_collateral_bounds(
        &self,
        piece_size: PaddedPieceSize,
        verified: bool,
    ) -> Result<CollateralBounds, ApiError>;

    async fn state_miner_peer_info(&self, miner: &Address) -> Result<PeerAddrInfo, ApiError>;

    /// Fill in gas limit, fee cap and premium, bounded by `spec.max_fee`.
    async fn gas_estimate_message_gas(
        &self,
        message: &Message,
        spec: &MessageSendSpec,
    ) -> Result<Message, ApiError>;

    async fn mpool_push(&self, message: &SignedMessage) -> Result<Cid, ApiError>;
}

#[tarpc::service]
pub trait NodeRpc {
    /// Current head epoch and its parent base fee.
    async fn chain_head() -> Result<TipsetHead, String>;

    async fn state_get_actor(address: Address) -> Result<Actor, String>;

    async fn state_market_balance(address: Address) -> Result<MarketBalance, String>;

    async fn state_deal_provider_collateral_bounds(
        piece_size: PaddedPieceSize,
        verified: bool,
    ) -> Result<CollateralBounds, String>;

    async fn state_miner_peer_info(miner: Address) -> Result<PeerAddrInfo, String>;

    async fn gas_estimate_message_gas(
        message: Message,
        spec: MessageSendSpec,
    ) -> Result<Message, String>;

    async fn mpool_push(message: SignedMessage) -> Result<Cid, String>;
}

#[async_trait]
impl ChainApi for NodeRpcClient {
    async fn chain_head(&self) -> Result<TipsetHead, ApiError> {
        NodeRpcClient::chain_head(self, context::current())
            .await?
            .map_err(ApiError::Backend)
    }

    async fn state_get_actor(&self, address: &Address) -> Result<Actor, ApiError> {
        NodeRpcClient::state_get_actor(self, context::current(), *address)
            .await?
            .map_err(ApiError::Backend)
    }

    async fn state_market_balance(&self, address: &Address) -> Result<MarketBalance, ApiError> {
        NodeRpcClient::state_market_balance(self, context::current(), *address)
            .await?
            .map_err(ApiError::Backend)
    }

    async fn state_deal_provider_collateral_bounds(
        &self,
        piece_size: PaddedPieceSize,
        verified: bool,
    ) -> Result<CollateralBounds, ApiError> {
        NodeRpcClient::state_deal_provider_collateral_bounds(
            self,
            context::current(),
            piece_size,
            verified,
        )
        .await?
        .map_err(ApiError::Backend)
    }

    async fn state_miner_peer_info(&self, miner: &Address) -> Result<PeerAddrInfo, ApiError> {
        NodeRpcClient::state_miner_peer_info(self, context::current(), *miner)
            .await?
            .map_err(ApiError::Backend)
    }

    async fn gas_estimate_message_gas(
        &self,
        message: &Message,
        spec: &MessageSendSpec,
    ) -> Result<Message, ApiError> {
        NodeRpcClient::gas_estimate_message_gas(
            self,
            context::current(),
            message.clone(),
            spec.clone(),
        )
        .await?
        .map_err(ApiError::Backend)
    }

    async fn mpool_push(&self, message: &SignedMessage) -> Result<Cid, ApiError> {
        NodeRpcClient::mpool_push(self, context::current(), message.clone())
            .await?
            .map_err(ApiError::Backend)
    }
}
