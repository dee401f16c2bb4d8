//! RTP network sink with periodic RTCP sender reports.

use crate::element::{BufferHandler, Element, PadRef, Sink};
use crate::error::{Error, Result};
use crate::h265::{RtpPacket, RTP_CLOCK_RATE};
use crate::pipeline::Pipeline;
use bytes::Bytes;
use futures::FutureExt;
use rtcp::sender_report::SenderReport;
use std::sync::{Arc, Mutex};
use std::time::{Duration, SystemTime, UNIX_EPOCH};
use tokio::net::UdpSocket;
use tokio_util::sync::CancellationToken;
use webrtc_util::marshal::{Marshal, MarshalSize};

/// Default RTCP report interval (5 seconds per RFC 3550).
const DEFAULT_RTCP_INTERVAL: Duration = Duration::from_secs(5);

/// Seconds between the NTP epoch (1900) and the Unix epoch (1970).
const NTP_UNIX_OFFSET: u64 = 2_208_988_800;

/// Statistics for [`RtpUdpSink`].
#[derive(Debug, Clone, Copy, Default)]
pub struct RtpSinkStats {
    /// RTP packets sent (wrapping, as reported in SRs).
    pub packets_sent: u32,
    /// RTP payload octets sent, headers excluded (wrapping).
    pub octets_sent: u32,
    /// Datagrams that failed to marshal or send.
    pub send_failures: u64,
    /// SSRC observed on the most recent packet.
    pub last_ssrc: u32,
}

/// Socket lifecycle of the sink.
enum SocketState {
    Initial,
    Opening,
    Ready {
        rtp: Arc<UdpSocket>,
        rtcp: Arc<UdpSocket>,
    },
    Failed,
    Closed,
}

impl SocketState {
    fn name(&self) -> &'static str {
        match self {
            Self::Initial => "initial",
            Self::Opening => "opening",
            Self::Ready { .. } => "ready",
            Self::Failed => "failed",
            Self::Closed => "closed",
        }
    }
}

struct Shared {
    remote_host: String,
    rtp_port: u16,
    state: tokio::sync::Mutex<SocketState>,
    stats: Mutex<RtpSinkStats>,
    cancel: CancellationToken,
}

/// A sink sending RTP packets over UDP, with periodic RTCP sender reports.
///
/// Opens one socket to `(remote_host, rtp_port)` and one to
/// `(remote_host, rtp_port + 1)` for RTCP. Each packet is serialized
/// (12-byte header plus payload) and sent as a single datagram. While
/// packets have been sent, one sender report per interval goes out on the
/// RTCP socket; send failures are logged and counted, never fatal.
///
/// Sockets open on the first delivered packet; packets arriving while the
/// sink is failed or closed are dropped with a warning.
///
/// # Example
///
/// ```rust,ignore
/// use sluice::net::RtpUdpSink;
///
/// let sink = RtpUdpSink::new("net", "203.0.113.9", 5004);
/// // ... wire as the last child of a group; call close() on teardown
/// sink.close().await;
/// ```
pub struct RtpUdpSink {
    id: String,
    shared: Arc<Shared>,
    rtcp_interval: Duration,
}

impl RtpUdpSink {
    /// Create a sink targeting `(remote_host, rtp_port)`.
    pub fn new(id: impl Into<String>, remote_host: impl Into<String>, rtp_port: u16) -> Self {
        Self {
            id: id.into(),
            shared: Arc::new(Shared {
                remote_host: remote_host.into(),
                rtp_port,
                state: tokio::sync::Mutex::new(SocketState::Initial),
                stats: Mutex::new(RtpSinkStats::default()),
                cancel: CancellationToken::new(),
            }),
            rtcp_interval: DEFAULT_RTCP_INTERVAL,
        }
    }

    /// Set the RTCP sender-report interval.
    pub fn with_rtcp_interval(mut self, interval: Duration) -> Self {
        self.rtcp_interval = interval;
        self
    }

    /// Current statistics.
    pub fn stats(&self) -> RtpSinkStats {
        *self.shared.stats.lock().unwrap()
    }

    /// Close both sockets and stop the RTCP reporter.
    ///
    /// Packets delivered afterwards are dropped with a warning.
    pub async fn close(&self) {
        self.shared.cancel.cancel();
        let mut state = self.shared.state.lock().await;
        *state = SocketState::Closed;
    }
}

impl Element for RtpUdpSink {
    fn id(&self) -> &str {
        &self.id
    }
}

impl Sink for RtpUdpSink {
    type Input = RtpPacket;

    fn handler(&self, pad: &PadRef) -> Option<BufferHandler<RtpPacket>> {
        if *pad != PadRef::InputDefault {
            return None;
        }
        let shared = self.shared.clone();
        let rtcp_interval = self.rtcp_interval;
        Some(Box::new(move |_pipeline: Pipeline, packet: RtpPacket| {
            let shared = shared.clone();
            async move {
                deliver(shared, packet, rtcp_interval).await;
                Ok(())
            }
            .boxed()
        }))
    }
}

/// Send one packet, opening the sockets on first use. Transport problems
/// are logged and counted; they never fail the edge.
async fn deliver(shared: Arc<Shared>, packet: RtpPacket, rtcp_interval: Duration) {
    let mut state = shared.state.lock().await;

    if shared.cancel.is_cancelled() {
        *state = SocketState::Closed;
    }

    if matches!(*state, SocketState::Initial) {
        *state = SocketState::Opening;
        match open_sockets(&shared.remote_host, shared.rtp_port).await {
            Ok((rtp, rtcp)) => {
                let rtp = Arc::new(rtp);
                let rtcp = Arc::new(rtcp);
                tokio::spawn(rtcp_loop(shared.clone(), rtcp.clone(), rtcp_interval));
                *state = SocketState::Ready { rtp, rtcp };
            }
            Err(e) => {
                tracing::error!(
                    host = %shared.remote_host,
                    port = shared.rtp_port,
                    error = %e,
                    "failed to open RTP sockets"
                );
                *state = SocketState::Failed;
            }
        }
    }

    let SocketState::Ready { rtp, .. } = &*state else {
        tracing::warn!(state = state.name(), "dropping RTP packet, socket not ready");
        return;
    };

    let wire = rtp::packet::Packet {
        header: packet.header.clone(),
        payload: packet.payload.clone(),
    };
    let mut buf = vec![0u8; wire.marshal_size()];
    let written = match wire.marshal_to(&mut buf) {
        Ok(n) => n,
        Err(e) => {
            tracing::warn!(error = %e, "RTP marshal error");
            shared.stats.lock().unwrap().send_failures += 1;
            return;
        }
    };

    match rtp.send(&buf[..written]).await {
        Ok(_) => {
            let mut stats = shared.stats.lock().unwrap();
            stats.packets_sent = stats.packets_sent.wrapping_add(1);
            stats.octets_sent = stats.octets_sent.wrapping_add(packet.payload.len() as u32);
            stats.last_ssrc = packet.header.ssrc;
        }
        Err(e) => {
            tracing::warn!(error = %e, "RTP send failed");
            shared.stats.lock().unwrap().send_failures += 1;
        }
    }
}

async fn open_sockets(host: &str, rtp_port: u16) -> Result<(UdpSocket, UdpSocket)> {
    let rtp = UdpSocket::bind("0.0.0.0:0").await?;
    rtp.connect((host, rtp_port)).await?;
    let rtcp = UdpSocket::bind("0.0.0.0:0").await?;
    rtcp.connect((host, rtp_port + 1)).await?;
    Ok((rtp, rtcp))
}

/// Emit one sender report per interval while RTP traffic has flowed.
async fn rtcp_loop(shared: Arc<Shared>, socket: Arc<UdpSocket>, interval: Duration) {
    let mut ticker = tokio::time::interval(interval);
    ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
    // The first tick fires immediately; reports start one interval in.
    ticker.tick().await;
    loop {
        tokio::select! {
            _ = shared.cancel.cancelled() => break,
            _ = ticker.tick() => {}
        }
        let (packets, octets, ssrc) = {
            let stats = shared.stats.lock().unwrap();
            (stats.packets_sent, stats.octets_sent, stats.last_ssrc)
        };
        if packets == 0 {
            // No RTP has been sent yet; an SR now would carry a zero SSRC.
            continue;
        }
        match sender_report(ssrc, packets, octets) {
            Ok(data) => {
                if let Err(e) = socket.send(&data).await {
                    tracing::warn!(error = %e, "RTCP send failed");
                }
            }
            Err(e) => tracing::warn!(error = %e, "RTCP marshal failed"),
        }
    }
    tracing::debug!("RTCP reporter stopped");
}

fn sender_report(ssrc: u32, packet_count: u32, octet_count: u32) -> Result<Bytes> {
    let now = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default();
    build_sender_report(ssrc, packet_count, octet_count, now)
}

/// Build the 28-byte RFC 3550 §6.4.1 sender report: no reception report
/// blocks, NTP seconds in the upper word with a zero fraction.
fn build_sender_report(
    ssrc: u32,
    packet_count: u32,
    octet_count: u32,
    now_unix: Duration,
) -> Result<Bytes> {
    let ntp_time = (now_unix.as_secs() + NTP_UNIX_OFFSET) << 32;
    let rtp_time = ((now_unix.as_secs_f64() * RTP_CLOCK_RATE as f64) as u64 & 0xFFFF_FFFF) as u32;
    let report = SenderReport {
        ssrc,
        ntp_time,
        rtp_time,
        packet_count,
        octet_count,
        reports: vec![],
        profile_extensions: Bytes::new(),
    };
    report
        .marshal()
        .map_err(|e| Error::Transport(format!("RTCP marshal error: {e}")))
}
