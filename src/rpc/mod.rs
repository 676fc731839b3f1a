//! Clients for the external chain node and deal-market backend.
//!
//! The core talks to both through the [`chain_api::ChainApi`] and
//! [`market_api::MarketApi`] traits. The tarpc services declared next to them
//! are how a running binary reaches the real backends.

pub mod chain_api;
pub mod market_api;

use std::net::SocketAddr;

use anyhow::Context;
use anyhow::Result;
use tarpc::client;
use tarpc::tokio_serde::formats::Json;

use self::chain_api::NodeRpcClient;
use self::market_api::MarketRpcClient;

/// Failure reported by, or while reaching, an external API.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ApiError {
    #[error("rpc transport failed: {0}")]
    Transport(String),

    #[error("backend returned an error: {0}")]
    Backend(String),
}

impl From<tarpc::client::RpcError> for ApiError {
    fn from(error: tarpc::client::RpcError) -> Self {
        Self::Transport(error.to_string())
    }
}

pub async fn connect_node(server_addr: SocketAddr) -> Result<NodeRpcClient> {
    let transport = tarpc::serde_transport::tcp::connect(server_addr, Json::default)
        .await
        .with_context(|| format!("Failed to connect to node RPC at {}", server_addr))?;
    Ok(NodeRpcClient::new(client::Config::default(), transport).spawn())
}

pub async fn connect_market(server_addr: SocketAddr) -> Result<MarketRpcClient> {
    let transport = tarpc::serde_transport::tcp::connect(server_addr, Json::default)
        .await
        .with_context(|| format!("Failed to connect to market RPC at {}", server_addr))?;
    Ok(MarketRpcClient::new(client::Config::default(), transport).spawn())
}
