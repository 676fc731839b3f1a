use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::Mutex;

use anyhow::anyhow;
use anyhow::bail;
use anyhow::ensure;
use anyhow::Result;
use async_trait::async_trait;
use futures::SinkExt;
use futures::TryStreamExt;
use tokio::net::TcpStream;
use tokio_serde::formats::Bincode;
use tokio_serde::formats::SymmetricalBincode;
use tokio_serde::SymmetricallyFramed;
use tokio_util::codec::Framed;
use tokio_util::codec::LengthDelimitedCodec;
use tracing::debug;
use tracing::warn;

use super::get_codec_rules;
use super::peer_message::versions_are_compatible;
use super::peer_message::HandshakeData;
use super::peer_message::PeerMessage;
use super::Host;
use super::IDENTIFY_PROTOCOL_VERSION;
use super::MAGIC_STRING_REQUEST;
use super::MAGIC_STRING_RESPONSE;
use crate::models::chain::PeerAddrInfo;
use crate::models::chain::PeerId;

type ControlChannel = tokio_serde::Framed<
    Framed<TcpStream, LengthDelimitedCodec>,
    PeerMessage,
    PeerMessage,
    Bincode<PeerMessage, PeerMessage>,
>;

#[derive(Debug, Clone)]
struct KnownPeer {
    addr: SocketAddr,
    handshake: HandshakeData,
}

/// A [`Host`] over plain TCP.
#[derive(Debug)]
pub struct TcpHost {
    own_handshake: HandshakeData,
    peerstore: Mutex<HashMap<PeerId, KnownPeer>>,
}

impl TcpHost {
    pub fn new(peer_id: PeerId) -> Self {
        Self {
            own_handshake: HandshakeData {
                peer_id,
                version: IDENTIFY_PROTOCOL_VERSION.to_string(),
                protocols: vec![],
            },
            peerstore: Mutex::new(HashMap::new()),
        }
    }

    pub fn with_random_id() -> Self {
        Self::new(PeerId(format!("pledge-{}", uuid::Uuid::new_v4())))
    }

    fn known_peer(&self, peer: &PeerId) -> Option<KnownPeer> {
        self.peerstore
            .lock()
            .ok()
            .and_then(|store| store.get(peer).cloned())
    }

    async fn open_control_channel(addr: SocketAddr) -> Result<ControlChannel> {
        let stream = TcpStream::connect(addr).await?;
        let length_delimited = Framed::new(stream, get_codec_rules());
        Ok(SymmetricallyFramed::new(
            length_delimited,
            SymmetricalBincode::default(),
        ))
    }

    async fn identify(&self, addr: SocketAddr) -> Result<HandshakeData> {
        let mut peer = Self::open_control_channel(addr).await?;

        peer.send(PeerMessage::Handshake {
            magic_value: *MAGIC_STRING_REQUEST,
            data: Box::new(self.own_handshake.clone()),
        })
        .await?;

        let Some(PeerMessage::Handshake {
            magic_value,
            data: other_handshake,
        }) = peer.try_next().await?
        else {
            bail!("Didn't get handshake response from {addr}");
        };
        ensure!(
            magic_value == *MAGIC_STRING_RESPONSE,
            "Didn't get expected magic value for handshake from {addr}",
        );

        let own = &self.own_handshake.version;
        let other = &other_handshake.version;
        ensure!(
            versions_are_compatible(own, other),
            "Cannot connect with {addr}: Peer speaks identify {other}, this client speaks {own}."
        );

        // identification only; streams use their own connections
        peer.send(PeerMessage::Bye).await?;
        Ok(*other_handshake)
    }
}

#[async_trait]
impl Host for TcpHost {
    type Stream = TcpStream;

    async fn connect(&self, peer: &PeerAddrInfo) -> Result<()> {
        let mut last_error = anyhow!("peer {} has no known addresses", peer.id);

        for addr in &peer.addrs {
            match self.identify(*addr).await {
                Ok(handshake) if handshake.peer_id != peer.id => {
                    last_error = anyhow!(
                        "{addr} identified as {} instead of {}",
                        handshake.peer_id,
                        peer.id
                    );
                    warn!("{last_error}");
                }
                Ok(handshake) => {
                    debug!(peer = %peer.id, %addr, protocols = ?handshake.protocols, "identified peer");
                    let mut store = self
                        .peerstore
                        .lock()
                        .map_err(|_| anyhow!("peerstore lock poisoned"))?;
                    store.insert(
                        peer.id.clone(),
                        KnownPeer {
                            addr: *addr,
                            handshake,
                        },
                    );
                    return Ok(());
                }
                Err(error) => {
                    warn!(peer = %peer.id, %addr, "identify failed: {error:#}");
                    last_error = error;
                }
            }
        }

        Err(last_error)
    }

    fn first_supported_protocol(&self, peer: &PeerId, protocols: &[&str]) -> Option<String> {
        let known = self.known_peer(peer)?;
        protocols
            .iter()
            .copied()
            .find(|wanted| known.handshake.protocols.iter().any(|p| p.as_str() == *wanted))
            .map(str::to_string)
    }

    async fn new_stream(&self, peer: &PeerId, protocol: &str) -> Result<TcpStream> {
        let Some(known) = self.known_peer(peer) else {
            bail!("peer {peer} has not been identified");
        };
        let addr = known.addr;

        let mut channel = Self::open_control_channel(addr).await?;
        channel
            .send(PeerMessage::OpenStream {
                protocol: protocol.to_string(),
            })
            .await?;

        match channel.try_next().await? {
            Some(PeerMessage::StreamAccepted) => {
                debug!(%peer, %addr, protocol, "stream opened");
            }
            Some(PeerMessage::StreamRefused(reason)) => {
                bail!("{peer} refused to open {protocol}. Reason: {reason}");
            }
            other => {
                bail!("Got invalid stream status response from {peer}: {other:?}");
            }
        }

        let parts = channel.into_inner().into_parts();
        ensure!(
            parts.read_buf.is_empty(),
            "{peer} sent protocol data before the stream was handed over"
        );
        Ok(parts.io)
    }
}

#[cfg(test)]
mod tests {
    use tracing_test::traced_test;

    use super::*;
    use crate::tests::shared::ProviderBehavior;
    use crate::tests::shared::ScriptedProvider;

    const PROTOCOL: &str = "/test/1.0.0";

    #[traced_test]
    #[tokio::test]
    async fn connect_records_advertised_protocols() {
        let provider = ScriptedProvider::start(vec![PROTOCOL.to_string()], ProviderBehavior::Hang).await;
        let host = TcpHost::with_random_id();

        host.connect(&provider.addr_info()).await.unwrap();
        assert_eq!(
            Some(PROTOCOL.to_string()),
            host.first_supported_protocol(&provider.peer_id(), &["/other/1.0.0", PROTOCOL])
        );
        assert_eq!(
            None,
            host.first_supported_protocol(&provider.peer_id(), &["/other/1.0.0"])
        );
    }

    #[tokio::test]
    async fn peer_answering_as_someone_else_is_not_recorded() {
        let provider = ScriptedProvider::start(vec![PROTOCOL.to_string()], ProviderBehavior::Hang).await;
        let host = TcpHost::with_random_id();
        let mut info = provider.addr_info();
        info.id = PeerId("somebody-else".to_string());

        assert!(host.connect(&info).await.is_err());
        assert_eq!(None, host.first_supported_protocol(&info.id, &[PROTOCOL]));
    }

    #[tokio::test]
    async fn provider_software_version_does_not_matter() {
        let provider = ScriptedProvider::start(vec![PROTOCOL.to_string()], ProviderBehavior::Hang).await;
        let host = TcpHost::new(PeerId("client".to_string()));
        assert_eq!(IDENTIFY_PROTOCOL_VERSION, host.own_handshake.version);
        assert_ne!(env!("CARGO_PKG_VERSION"), provider.handshake_version());

        host.connect(&provider.addr_info()).await.unwrap();
        assert!(host.first_supported_protocol(&provider.peer_id(), &[PROTOCOL]).is_some());
    }

    #[tokio::test]
    async fn incompatible_identify_version_is_refused() {
        let provider = ScriptedProvider::start_with_identify_version(
            vec![PROTOCOL.to_string()],
            ProviderBehavior::Hang,
            "2.0.0",
        )
        .await;
        let host = TcpHost::with_random_id();

        let error = host.connect(&provider.addr_info()).await.unwrap_err();
        assert!(error.to_string().contains("2.0.0"));
        assert_eq!(None, host.first_supported_protocol(&provider.peer_id(), &[PROTOCOL]));
    }

    #[tokio::test]
    async fn unknown_peer_has_no_streams() {
        let host = TcpHost::with_random_id();
        let unknown = PeerId("unknown".to_string());
        assert!(host.new_stream(&unknown, PROTOCOL).await.is_err());
        assert_eq!(None, host.first_supported_protocol(&unknown, &[PROTOCOL]));
    }

    #[tokio::test]
    async fn refused_protocol_is_an_error() {
        let provider = ScriptedProvider::start(vec![PROTOCOL.to_string()], ProviderBehavior::Hang).await;
        let host = TcpHost::with_random_id();
        host.connect(&provider.addr_info()).await.unwrap();

        let result = host.new_stream(&provider.peer_id(), "/not/offered").await;
        assert!(result.is_err());
        assert_eq!(0, provider.streams_opened());
    }
}
