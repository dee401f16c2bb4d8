//! RTP network source receiving packets from UDP.

use crate::buffer::BufferStream;
use crate::element::{Element, PadRef, Source};
use crate::error::Result;
use crate::h265::RtpPacket;
use crate::schema::EdgeId;
use futures::stream;
use std::net::SocketAddr;
use std::sync::{Arc, Mutex};
use tokio::net::{ToSocketAddrs, UdpSocket};
use tokio_util::sync::CancellationToken;
use webrtc_util::marshal::Unmarshal;

/// Maximum UDP datagram size accepted.
const MAX_DATAGRAM_SIZE: usize = 1500;

/// Statistics for [`RtpUdpSrc`].
#[derive(Debug, Clone, Copy, Default)]
pub struct RtpSrcStats {
    /// Datagrams received.
    pub packets_received: u64,
    /// Datagrams dropped because they failed to parse as RTP.
    pub packets_dropped: u64,
    /// Packets filtered out by payload type or SSRC.
    pub packets_filtered: u64,
    /// Payload octets received.
    pub octets_received: u64,
}

/// A source receiving RTP packets from a bound UDP socket.
///
/// Each datagram is unmarshalled into an [`RtpPacket`]; parse failures are
/// dropped and counted. Optional payload-type and SSRC filters discard
/// unrelated traffic. Cancellation (from `stop()` or element removal)
/// terminates the stream.
///
/// # Example
///
/// ```rust,ignore
/// use sluice::net::RtpUdpSrc;
///
/// let src = RtpUdpSrc::bind("rtp-in", "0.0.0.0:5004")
///     .await?
///     .with_payload_type(98);
/// ```
pub struct RtpUdpSrc {
    id: String,
    socket: Arc<UdpSocket>,
    payload_type: Option<u8>,
    ssrc_filter: Option<u32>,
    stats: Arc<Mutex<RtpSrcStats>>,
    cancel: CancellationToken,
}

impl RtpUdpSrc {
    /// Bind a UDP socket and create the source.
    pub async fn bind(id: impl Into<String>, addr: impl ToSocketAddrs) -> Result<Self> {
        let socket = UdpSocket::bind(addr).await?;
        Ok(Self {
            id: id.into(),
            socket: Arc::new(socket),
            payload_type: None,
            ssrc_filter: None,
            stats: Arc::new(Mutex::new(RtpSrcStats::default())),
            cancel: CancellationToken::new(),
        })
    }

    /// Accept only the given payload type.
    pub fn with_payload_type(mut self, payload_type: u8) -> Self {
        self.payload_type = Some(payload_type);
        self
    }

    /// Accept only the given SSRC.
    pub fn with_ssrc(mut self, ssrc: u32) -> Self {
        self.ssrc_filter = Some(ssrc);
        self
    }

    /// The local address the socket is bound to.
    pub fn local_addr(&self) -> Result<SocketAddr> {
        Ok(self.socket.local_addr()?)
    }

    /// Current statistics.
    pub fn stats(&self) -> RtpSrcStats {
        *self.stats.lock().unwrap()
    }
}

impl Element for RtpUdpSrc {
    fn id(&self) -> &str {
        &self.id
    }
}

impl Source for RtpUdpSrc {
    type Output = RtpPacket;

    fn stream(&self, pad: &PadRef) -> Option<BufferStream<RtpPacket>> {
        if *pad != PadRef::OutputDefault {
            return None;
        }
        let socket = self.socket.clone();
        let cancel = self.cancel.clone();
        let stats = self.stats.clone();
        let payload_type = self.payload_type;
        let ssrc_filter = self.ssrc_filter;

        Some(Box::pin(stream::unfold((), move |()| {
            let socket = socket.clone();
            let cancel = cancel.clone();
            let stats = stats.clone();
            async move {
                let mut buf = vec![0u8; MAX_DATAGRAM_SIZE];
                loop {
                    let n = tokio::select! {
                        _ = cancel.cancelled() => return None,
                        received = socket.recv_from(&mut buf) => match received {
                            Ok((n, _sender)) => n,
                            Err(e) => {
                                tracing::warn!(error = %e, "UDP receive failed");
                                return None;
                            }
                        },
                    };
                    stats.lock().unwrap().packets_received += 1;

                    let mut data = &buf[..n];
                    let parsed = match rtp::packet::Packet::unmarshal(&mut data) {
                        Ok(p) => p,
                        Err(e) => {
                            stats.lock().unwrap().packets_dropped += 1;
                            tracing::warn!(error = %e, "dropping malformed RTP packet");
                            continue;
                        }
                    };

                    if payload_type.is_some_and(|pt| parsed.header.payload_type != pt)
                        || ssrc_filter.is_some_and(|ssrc| parsed.header.ssrc != ssrc)
                    {
                        stats.lock().unwrap().packets_filtered += 1;
                        continue;
                    }

                    stats.lock().unwrap().octets_received += parsed.payload.len() as u64;
                    let packet = RtpPacket {
                        header: parsed.header,
                        payload: parsed.payload,
                        format: None,
                    };
                    return Some((packet, ()));
                }
            }
        })))
    }

    fn on_cancel(&self, edge: &EdgeId) {
        tracing::debug!(edge = %edge, "closing RTP source");
        self.cancel.cancel();
    }
}
