//! Client side of the storage deal protocol.
//!
//! One stream per attempt: the client writes `DealParams` and then reads a
//! single `DealResponse`, both as length-delimited cbor frames. The exchange
//! runs in its own task and is raced against the caller's cancellation token
//! and a deadline. Whichever finishes first wins, and the exchange task (and
//! with it the stream) is torn down on every other path. The deadline is set
//! once per negotiation and also bounds connecting and opening the stream.

use std::time::Duration;

use futures::SinkExt;
use futures::TryStreamExt;
use tokio::io::AsyncRead;
use tokio::io::AsyncWrite;
use tokio::sync::oneshot;
use tokio::time::Instant;
use tokio_serde::formats::Cbor;
use tokio_util::codec::Framed;
use tokio_util::sync::CancellationToken;
use tokio_util::task::AbortOnDropHandle;
use tracing::debug;
use tracing::info;
use tracing::instrument;
use tracing::warn;

use crate::models::chain::PeerAddrInfo;
use crate::models::chain::PeerId;
use crate::models::deal::DealParams;
use crate::models::deal::DealResponse;
use crate::p2p::get_codec_rules;
use crate::p2p::Host;

/// Version 1.2.0 of the storage deal protocol.
pub const DEAL_PROTOCOL_V120: &str = "/fil/storage/mk/1.2.0";

#[derive(Debug, thiserror::Error)]
pub enum NegotiationError {
    /// Terminal for this peer.
    #[error("provider {peer} does not support {protocol}")]
    ProtocolUnsupported { peer: PeerId, protocol: String },

    #[error("deal rejected by provider: {0}")]
    DealRejected(String),

    #[error("negotiation cancelled")]
    Cancelled,

    #[error("no response from provider within {}", humantime::format_duration(*.0))]
    DeadlineExceeded(Duration),

    #[error("failed to reach provider: {0:#}")]
    Connect(anyhow::Error),

    #[error("deal stream failed: {0}")]
    Transport(String),
}

/// Propose a deal to `peer` and wait for its decision.
///
/// Returns the response only if the provider accepted.
#[instrument(skip_all, fields(peer = %peer.id, deal_uuid = %params.deal_uuid))]
pub async fn negotiate_deal<H: Host>(
    host: &H,
    peer: &PeerAddrInfo,
    params: &DealParams,
    cancel: &CancellationToken,
    timeout: Duration,
) -> Result<DealResponse, NegotiationError> {
    let deadline = Instant::now() + timeout;

    tokio::select! {
        connected = host.connect(peer) => connected.map_err(NegotiationError::Connect)?,
        _ = cancel.cancelled() => return Err(NegotiationError::Cancelled),
        _ = tokio::time::sleep_until(deadline) => return Err(NegotiationError::DeadlineExceeded(timeout)),
    }

    if host
        .first_supported_protocol(&peer.id, &[DEAL_PROTOCOL_V120])
        .is_none()
    {
        return Err(NegotiationError::ProtocolUnsupported {
            peer: peer.id.clone(),
            protocol: DEAL_PROTOCOL_V120.to_string(),
        });
    }

    let stream = tokio::select! {
        stream = host.new_stream(&peer.id, DEAL_PROTOCOL_V120) => {
            stream.map_err(NegotiationError::Connect)?
        }
        _ = cancel.cancelled() => return Err(NegotiationError::Cancelled),
        _ = tokio::time::sleep_until(deadline) => return Err(NegotiationError::DeadlineExceeded(timeout)),
    };

    debug!(peer = %peer.id, deal_uuid = %params.deal_uuid, "sending deal proposal");
    let response = rpc_until(stream, params.clone(), cancel, deadline, timeout).await?;

    if !response.accepted {
        warn!(peer = %peer.id, reason = %response.message, "deal rejected");
        return Err(NegotiationError::DealRejected(response.message));
    }

    info!(peer = %peer.id, deal_uuid = %params.deal_uuid, "deal accepted");
    Ok(response)
}

/// Write `params` to `stream` and read the response, unless `cancel` fires
/// or `timeout` elapses first.
pub async fn do_rpc<S>(
    stream: S,
    params: DealParams,
    cancel: &CancellationToken,
    timeout: Duration,
) -> Result<DealResponse, NegotiationError>
where
    S: AsyncRead + AsyncWrite + Unpin + Send + 'static,
{
    rpc_until(stream, params, cancel, Instant::now() + timeout, timeout).await
}

/// `do_rpc` against an absolute `deadline`. `timeout` is the budget the
/// deadline was derived from and is only reported.
async fn rpc_until<S>(
    stream: S,
    params: DealParams,
    cancel: &CancellationToken,
    deadline: Instant,
    timeout: Duration,
) -> Result<DealResponse, NegotiationError>
where
    S: AsyncRead + AsyncWrite + Unpin + Send + 'static,
{
    let (result_tx, result_rx) = oneshot::channel();
    // aborted, and the stream dropped, when this goes out of scope
    let _exchange = AbortOnDropHandle::new(tokio::spawn(async move {
        let _ = result_tx.send(exchange(stream, params).await);
    }));

    tokio::select! {
        result = result_rx => result.unwrap_or_else(|_| {
            Err(NegotiationError::Transport("exchange task ended without a result".to_string()))
        }),
        _ = cancel.cancelled() => Err(NegotiationError::Cancelled),
        _ = tokio::time::sleep_until(deadline) => Err(NegotiationError::DeadlineExceeded(timeout)),
    }
}

async fn exchange<S>(stream: S, params: DealParams) -> Result<DealResponse, NegotiationError>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    let mut deal_stream = tokio_serde::Framed::new(
        Framed::new(stream, get_codec_rules()),
        Cbor::<DealResponse, DealParams>::default(),
    );

    deal_stream
        .send(params)
        .await
        .map_err(|e| NegotiationError::Transport(format!("writing deal params: {e}")))?;

    match deal_stream.try_next().await {
        Ok(Some(response)) => Ok(response),
        Ok(None) => Err(NegotiationError::Transport(
            "stream closed before a response was read".to_string(),
        )),
        Err(e) => Err(NegotiationError::Transport(format!(
            "reading deal response: {e}"
        ))),
    }
}
