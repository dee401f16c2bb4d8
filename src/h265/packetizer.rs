//! H.265 RTP packetizer (RFC 7798).

use crate::h265::frame::EncodedFrame;
use crate::h265::nal::{nal_unit_type, NAL_FU};
use crate::h265::{RtpPacket, DEFAULT_MAX_PAYLOAD, RTP_CLOCK_RATE, RTP_PAYLOAD_TYPE};
use bytes::{BufMut, Bytes, BytesMut};

/// Sender-side statistics, as reported to the RTCP layer.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PacketizerStats {
    /// RTP packets produced (wrapping).
    pub packet_count: u32,
    /// RTP payload octets produced, headers excluded (wrapping).
    pub octet_count: u32,
}

/// Converts encoded H.265 frames into RTP packets.
///
/// NAL units that fit the payload budget are sent verbatim (single-NAL
/// packets); larger ones are split into fragmentation units. All packets of
/// one frame share its RTP timestamp; the marker bit is set only on the last
/// packet of the frame; sequence numbers increment modulo 2^16 from a
/// persistent counter.
///
/// # Example
///
/// ```rust,ignore
/// use sluice::h265::Packetizer;
///
/// let mut pay = Packetizer::new(0x1234_5678).with_max_payload(1200);
/// let packets = pay.packetize(&frame);
/// ```
pub struct Packetizer {
    ssrc: u32,
    payload_type: u8,
    max_payload: usize,
    next_seq: u16,
    stats: PacketizerStats,
}

impl Packetizer {
    /// Create a packetizer sending with the given SSRC.
    pub fn new(ssrc: u32) -> Self {
        Self {
            ssrc,
            payload_type: RTP_PAYLOAD_TYPE,
            max_payload: DEFAULT_MAX_PAYLOAD,
            next_seq: 0,
            stats: PacketizerStats::default(),
        }
    }

    /// Set the maximum RTP payload size (MTU budget).
    ///
    /// Values below 4 are clamped: a fragment needs the 2-byte PayloadHdr,
    /// the FU header, and at least one body byte.
    pub fn with_max_payload(mut self, max_payload: usize) -> Self {
        self.max_payload = max_payload.max(4);
        self
    }

    /// Set the RTP payload type.
    pub fn with_payload_type(mut self, payload_type: u8) -> Self {
        self.payload_type = payload_type;
        self
    }

    /// Set the initial sequence number.
    pub fn with_initial_seq(mut self, seq: u16) -> Self {
        self.next_seq = seq;
        self
    }

    /// Current sender statistics.
    pub fn stats(&self) -> PacketizerStats {
        self.stats
    }

    /// The next sequence number that will be used.
    pub fn next_seq(&self) -> u16 {
        self.next_seq
    }

    /// Packetize one frame into RTP packets.
    ///
    /// NALs shorter than a 2-byte header are skipped (logged). The frame's
    /// parameter sets, when present, ride on the first produced packet.
    pub fn packetize(&mut self, frame: &EncodedFrame) -> Vec<RtpPacket> {
        let nals: Vec<&[u8]> = frame
            .nal_units()
            .filter(|nal| {
                if nal.len() < 2 {
                    let err = crate::Error::InvalidNal(format!(
                        "{}-byte NAL is shorter than its header",
                        nal.len()
                    ));
                    tracing::warn!(error = %err, "skipping NAL unit");
                    return false;
                }
                true
            })
            .collect();

        let timestamp = frame.pts.to_rtp_timestamp(RTP_CLOCK_RATE);
        let total = self.total_packets(&nals);
        let mut packets = Vec::with_capacity(total);
        let mut format = frame.format.clone();

        for nal in nals {
            if nal.len() <= self.max_payload {
                let marker = packets.len() + 1 == total;
                packets.push(self.packet(
                    timestamp,
                    Bytes::copy_from_slice(nal),
                    marker,
                    format.take(),
                ));
            } else {
                self.fragment(nal, timestamp, total, &mut format, &mut packets);
            }
        }
        packets
    }

    /// Number of packets the frame will produce: one per small NAL, plus
    /// `ceil((len - 2) / (max_payload - 3))` per fragmented NAL (the 2-byte
    /// NAL header is consumed once; each fragment spends 3 bytes on
    /// PayloadHdr + FU header).
    fn total_packets(&self, nals: &[&[u8]]) -> usize {
        nals.iter()
            .map(|nal| {
                if nal.len() <= self.max_payload {
                    1
                } else {
                    (nal.len() - 2).div_ceil(self.max_payload - 3)
                }
            })
            .sum()
    }

    /// Emit fragmentation units for one oversized NAL (RFC 7798 §4.4.3).
    fn fragment(
        &mut self,
        nal: &[u8],
        timestamp: u32,
        total: usize,
        format: &mut Option<crate::h265::ParameterSets>,
        packets: &mut Vec<RtpPacket>,
    ) {
        let nal_type = nal_unit_type(nal[0]);
        // PayloadHdr: the original header with the type field replaced by
        // 49, layer and TID preserved.
        let payload_hdr_hi = (NAL_FU << 1) | (nal[0] & 0x01);
        let payload_hdr_lo = nal[1];

        let body = &nal[2..];
        let chunk = self.max_payload - 3;
        let fragments = body.len().div_ceil(chunk);

        for (i, part) in body.chunks(chunk).enumerate() {
            let mut fu_header = nal_type;
            if i == 0 {
                fu_header |= 0x80; // S
            }
            if i + 1 == fragments {
                fu_header |= 0x40; // E
            }

            let mut payload = BytesMut::with_capacity(3 + part.len());
            payload.put_u8(payload_hdr_hi);
            payload.put_u8(payload_hdr_lo);
            payload.put_u8(fu_header);
            payload.put_slice(part);

            let marker = packets.len() + 1 == total;
            packets.push(self.packet(timestamp, payload.freeze(), marker, format.take()));
        }
    }

    /// Build one packet, advancing the sequence counter and stats.
    fn packet(
        &mut self,
        timestamp: u32,
        payload: Bytes,
        marker: bool,
        format: Option<crate::h265::ParameterSets>,
    ) -> RtpPacket {
        let sequence_number = self.next_seq;
        self.next_seq = self.next_seq.wrapping_add(1);
        self.stats.packet_count = self.stats.packet_count.wrapping_add(1);
        self.stats.octet_count = self.stats.octet_count.wrapping_add(payload.len() as u32);

        RtpPacket {
            header: rtp::header::Header {
                version: 2,
                padding: false,
                extension: false,
                marker,
                payload_type: self.payload_type,
                sequence_number,
                timestamp,
                ssrc: self.ssrc,
                csrc: vec![],
                extension_profile: 0,
                extensions: vec![],
                extensions_padding: 0,
            },
            payload,
            format,
        }
    }
}
