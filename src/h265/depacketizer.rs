//! H.265 RTP depacketizer: reassembly by timestamp.

use crate::h265::frame::EncodedFrame;
use crate::h265::nal::{is_keyframe_nal, nal_unit_type, NAL_FU, MAX_SINGLE_NAL_TYPE};
use crate::h265::params::ParameterSets;
use crate::h265::{RtpPacket, RTP_CLOCK_RATE};
use crate::time::MediaTime;
use bytes::{BufMut, Bytes, BytesMut};
use std::collections::BTreeMap;

/// Number of timestamps kept open before the oldest is evicted.
const DEFAULT_MAX_PENDING: usize = 10;

/// Receiver-side statistics.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DepacketizerStats {
    /// RTP packets accepted.
    pub packets_in: u64,
    /// Frames assembled and emitted.
    pub frames_out: u64,
    /// Incomplete frames evicted or empty assemblies discarded.
    pub frames_dropped: u64,
    /// Malformed payloads or fragmentation units skipped.
    pub nal_errors: u64,
}

struct PacketEntry {
    seq: u16,
    payload: Bytes,
}

/// Reassembles RTP packets into encoded H.265 frames.
///
/// Packets are grouped by RTP timestamp; the marker bit triggers assembly
/// of its timestamp's frame. Frames complete in timestamp arrival order. A
/// bounded number of timestamps stays open (default 10); beyond that the
/// oldest incomplete frame is dropped, which bounds memory when a frame's
/// final packet is lost.
///
/// # Example
///
/// ```rust,ignore
/// use sluice::h265::Depacketizer;
///
/// let mut depay = Depacketizer::new();
/// for packet in packets {
///     for frame in depay.push(&packet) {
///         decoder.submit(frame)?;
///     }
/// }
/// let tail = depay.finish();
/// ```
pub struct Depacketizer {
    pending: BTreeMap<u32, Vec<PacketEntry>>,
    max_pending: usize,
    last_seq: Option<u16>,
    format: Option<ParameterSets>,
    frame_duration: MediaTime,
    stats: DepacketizerStats,
}

impl Depacketizer {
    /// Create a depacketizer with default settings.
    pub fn new() -> Self {
        Self {
            pending: BTreeMap::new(),
            max_pending: DEFAULT_MAX_PENDING,
            last_seq: None,
            format: None,
            frame_duration: MediaTime::new(1, 30),
            stats: DepacketizerStats::default(),
        }
    }

    /// Set the open-timestamp backlog bound.
    pub fn with_max_pending(mut self, max_pending: usize) -> Self {
        self.max_pending = max_pending.max(1);
        self
    }

    /// Set the duration stamped onto assembled frames (default 1/30 s).
    pub fn with_frame_duration(mut self, duration: MediaTime) -> Self {
        self.frame_duration = duration;
        self
    }

    /// Current receiver statistics.
    pub fn stats(&self) -> DepacketizerStats {
        self.stats
    }

    /// The format description latched from the stream, if seen yet.
    pub fn format(&self) -> Option<&ParameterSets> {
        self.format.as_ref()
    }

    /// Accept one packet; returns any frames completed by it.
    pub fn push(&mut self, packet: &RtpPacket) -> Vec<EncodedFrame> {
        self.stats.packets_in += 1;
        if self.format.is_none() {
            self.format = packet.format.clone();
        }

        let timestamp = packet.header.timestamp;
        let seq = packet.header.sequence_number;
        if let Some(last) = self.last_seq {
            if seq != last.wrapping_add(1) && self.pending.contains_key(&timestamp) {
                tracing::warn!(
                    timestamp,
                    expected = last.wrapping_add(1),
                    got = seq,
                    "sequence gap within frame"
                );
            }
        }
        self.last_seq = Some(seq);

        self.pending.entry(timestamp).or_default().push(PacketEntry {
            seq,
            payload: packet.payload.clone(),
        });

        let mut completed = Vec::new();
        if packet.header.marker {
            if let Some(frame) = self.assemble(timestamp) {
                completed.push(frame);
            }
        }

        while self.pending.len() > self.max_pending {
            if let Some((&oldest, _)) = self.pending.iter().next() {
                self.pending.remove(&oldest);
                self.stats.frames_dropped += 1;
                tracing::warn!(timestamp = oldest, "evicting stale incomplete frame");
            }
        }
        completed
    }

    /// Assemble and emit every remaining timestamp in ascending order.
    pub fn finish(&mut self) -> Vec<EncodedFrame> {
        let timestamps: Vec<u32> = self.pending.keys().copied().collect();
        timestamps
            .into_iter()
            .filter_map(|ts| self.assemble(ts))
            .collect()
    }

    /// Rebuild the AVCC frame for one timestamp from its packets.
    fn assemble(&mut self, timestamp: u32) -> Option<EncodedFrame> {
        let mut entries = self.pending.remove(&timestamp)?;
        entries.sort_by_key(|e| e.seq);
        // A frame spanning the 16-bit wrap sorts high seqs after low ones;
        // shifting the wrap point to mid-range restores the true order, as
        // long as the frame spans fewer than 2^15 packets.
        if let (Some(first), Some(last)) = (entries.first(), entries.last()) {
            if last.seq - first.seq > 0x8000 {
                entries.sort_by_key(|e| e.seq.wrapping_add(0x8000));
            }
        }

        let mut nals: Vec<Bytes> = Vec::new();
        let mut accumulator: Option<BytesMut> = None;

        for entry in &entries {
            let payload = &entry.payload;
            if payload.len() < 2 {
                self.stats.nal_errors += 1;
                tracing::warn!(len = payload.len(), "RTP payload shorter than a NAL header");
                continue;
            }
            let payload_type = nal_unit_type(payload[0]);
            match payload_type {
                NAL_FU => {
                    if payload.len() < 3 {
                        self.stats.nal_errors += 1;
                        tracing::warn!("fragmentation unit without FU header");
                        continue;
                    }
                    let fu_header = payload[2];
                    let start = fu_header & 0x80 != 0;
                    let end = fu_header & 0x40 != 0;
                    let fu_type = fu_header & 0x3F;

                    if start {
                        if accumulator.take().is_some() {
                            self.stats.nal_errors += 1;
                            tracing::warn!("discarding unterminated fragmentation unit");
                        }
                        let mut nal = BytesMut::with_capacity(2 + payload.len() - 3);
                        nal.put_u8((fu_type << 1) | (payload[0] & 0x01));
                        nal.put_u8(payload[1]);
                        nal.put_slice(&payload[3..]);
                        accumulator = Some(nal);
                    } else {
                        match accumulator.as_mut() {
                            Some(nal) => nal.put_slice(&payload[3..]),
                            None => {
                                self.stats.nal_errors += 1;
                                let err = crate::Error::MalformedFu(
                                    "fragment without a start fragment".into(),
                                );
                                tracing::warn!(error = %err, "skipping fragment");
                                continue;
                            }
                        }
                    }
                    if end {
                        if let Some(nal) = accumulator.take() {
                            nals.push(nal.freeze());
                        }
                    }
                }
                t if t <= MAX_SINGLE_NAL_TYPE => {
                    if accumulator.take().is_some() {
                        self.stats.nal_errors += 1;
                        tracing::warn!("discarding unterminated fragmentation unit");
                    }
                    nals.push(payload.clone());
                }
                other => {
                    tracing::debug!(payload_type = other, "ignoring unsupported payload type");
                }
            }
        }

        if accumulator.is_some() {
            self.stats.nal_errors += 1;
            tracing::warn!(timestamp, "fragmentation unit missing its end fragment");
        }

        if nals.is_empty() {
            self.stats.frames_dropped += 1;
            return None;
        }

        let total: usize = nals.iter().map(|n| 4 + n.len()).sum();
        let mut payload = BytesMut::with_capacity(total);
        for nal in &nals {
            payload.put_u32(nal.len() as u32);
            payload.put_slice(nal);
        }

        let keyframe = nals
            .iter()
            .any(|nal| is_keyframe_nal(nal_unit_type(nal[0])));

        self.stats.frames_out += 1;
        Some(EncodedFrame {
            payload: payload.freeze(),
            pts: MediaTime::from_rtp_timestamp(timestamp, RTP_CLOCK_RATE),
            duration: self.frame_duration,
            keyframe,
            format: self.format.clone(),
        })
    }
}

impl Default for Depacketizer {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::h265::packetizer::Packetizer;
    use crate::h265::RTP_PAYLOAD_TYPE;

    fn packet(seq: u16, timestamp: u32, marker: bool, payload: &[u8]) -> RtpPacket {
        RtpPacket {
            header: rtp::header::Header {
                version: 2,
                padding: false,
                extension: false,
                marker,
                payload_type: RTP_PAYLOAD_TYPE,
                sequence_number: seq,
                timestamp,
                ssrc: 1,
                csrc: vec![],
                extension_profile: 0,
                extensions: vec![],
                extensions_padding: 0,
            },
            payload: Bytes::copy_from_slice(payload),
            format: None,
        }
    }

    #[test]
    fn test_single_nal_frame() {
        let mut depay = Depacketizer::new();
        let frames = depay.push(&packet(0, 90_000, true, &[0x40, 0x01, 0xAA]));

        assert_eq!(frames.len(), 1);
        let frame = &frames[0];
        assert_eq!(frame.payload.as_ref(), &[0, 0, 0, 3, 0x40, 0x01, 0xAA]);
        assert_eq!(frame.pts.as_secs_f64(), 1.0);
        assert_eq!(frame.duration, MediaTime::new(1, 30));
    }

    #[test]
    fn test_fragmented_round_trip() {
        // Packetize a large NAL, feed the packets back, compare payloads.
        let mut nal = vec![0x26, 0x01];
        nal.extend((0..2998).map(|i| i as u8));
        let mut avcc = (nal.len() as u32).to_be_bytes().to_vec();
        avcc.extend_from_slice(&nal);

        let mut pay = Packetizer::new(7).with_max_payload(1400);
        let frame_in = EncodedFrame {
            payload: Bytes::from(avcc.clone()),
            pts: MediaTime::new(1, 2),
            duration: MediaTime::new(1, 30),
            keyframe: false,
            format: None,
        };
        let packets = pay.packetize(&frame_in);
        assert_eq!(packets.len(), 3);

        let mut depay = Depacketizer::new();
        let mut frames = Vec::new();
        for p in &packets {
            frames.extend(depay.push(p));
        }
        assert_eq!(frames.len(), 1);
        assert_eq!(frames[0].payload.as_ref(), &avcc[..]);
    }

    #[test]
    fn test_keyframe_detection() {
        // NAL type 19 (IDR_W_RADL): header hi byte = 19 << 1 = 0x26.
        let mut depay = Depacketizer::new();
        let frames = depay.push(&packet(0, 0, true, &[0x26, 0x01, 0x00]));
        assert!(frames[0].keyframe);

        let frames = depay.push(&packet(1, 3000, true, &[0x02, 0x01, 0x00]));
        assert!(!frames[0].keyframe);
    }

    #[test]
    fn test_format_latched_from_first_carrier() {
        let sets = ParameterSets::new(
            Bytes::from_static(&[0x40]),
            Bytes::from_static(&[0x42]),
            Bytes::from_static(&[0x44]),
        );
        let mut with_format = packet(0, 0, true, &[0x40, 0x01]);
        with_format.format = Some(sets.clone());

        let mut depay = Depacketizer::new();
        let frames = depay.push(&with_format);
        assert_eq!(frames[0].format.as_ref(), Some(&sets));

        // Later frames inherit the latched format.
        let frames = depay.push(&packet(1, 3000, true, &[0x02, 0x01]));
        assert_eq!(frames[0].format.as_ref(), Some(&sets));
    }

    #[test]
    fn test_fragment_without_start_skipped() {
        let mut depay = Depacketizer::new();
        // FU payload (type 49) with S=0, E=1.
        let frames = depay.push(&packet(0, 0, true, &[0x62, 0x01, 0x41, 0xAA]));
        assert!(frames.is_empty());
        assert_eq!(depay.stats().nal_errors, 1);
        assert_eq!(depay.stats().frames_dropped, 1);
    }

    #[test]
    fn test_backlog_eviction() {
        let mut depay = Depacketizer::new().with_max_pending(3);
        // Open 4 timestamps without markers; the oldest gets evicted.
        for i in 0..4u32 {
            depay.push(&packet(i as u16, i * 3000, false, &[0x02, 0x01]));
        }
        assert_eq!(depay.stats().frames_dropped, 1);

        // The evicted timestamp is gone; the rest still assemble.
        let frames = depay.finish();
        assert_eq!(frames.len(), 3);
        assert_eq!(frames[0].pts, MediaTime::from_rtp_timestamp(3000, 90_000));
    }

    #[test]
    fn test_finish_emits_in_ascending_order() {
        let mut depay = Depacketizer::new();
        depay.push(&packet(2, 6000, false, &[0x02, 0x01]));
        depay.push(&packet(1, 3000, false, &[0x02, 0x01]));
        let frames = depay.finish();
        assert_eq!(frames.len(), 2);
        assert!(frames[0].pts.value() < frames[1].pts.value());
    }

    #[test]
    fn test_fragments_spanning_sequence_wrap() {
        let mut nal = vec![0x26, 0x01];
        nal.extend((0..900).map(|i| i as u8));
        let mut avcc = (nal.len() as u32).to_be_bytes().to_vec();
        avcc.extend_from_slice(&nal);

        // Sequence numbers 65534, 65535, 0, ...
        let mut pay = Packetizer::new(7)
            .with_max_payload(256)
            .with_initial_seq(u16::MAX - 1);
        let frame_in = EncodedFrame {
            payload: Bytes::from(avcc.clone()),
            pts: MediaTime::ZERO,
            duration: MediaTime::new(1, 30),
            keyframe: false,
            format: None,
        };
        let packets = pay.packetize(&frame_in);
        assert!(packets.len() >= 3);
        assert_eq!(packets[0].header.sequence_number, u16::MAX - 1);

        let mut depay = Depacketizer::new();
        let mut frames = Vec::new();
        for p in &packets {
            frames.extend(depay.push(p));
        }
        assert_eq!(frames.len(), 1);
        assert_eq!(frames[0].payload.as_ref(), &avcc[..]);
    }

    #[test]
    fn test_out_of_order_fragments_sorted_by_seq() {
        let mut nal = vec![0x26, 0x01];
        nal.extend((0..600).map(|i| i as u8));
        let mut avcc = (nal.len() as u32).to_be_bytes().to_vec();
        avcc.extend_from_slice(&nal);

        let mut pay = Packetizer::new(7).with_max_payload(256);
        let frame_in = EncodedFrame {
            payload: Bytes::from(avcc.clone()),
            pts: MediaTime::ZERO,
            duration: MediaTime::new(1, 30),
            keyframe: false,
            format: None,
        };
        let packets = pay.packetize(&frame_in);
        assert!(packets.len() >= 3);

        // Swap the two middle packets; the marker packet stays last.
        let mut shuffled = packets.clone();
        shuffled.swap(0, 1);

        let mut depay = Depacketizer::new();
        let mut frames = Vec::new();
        for p in &shuffled {
            frames.extend(depay.push(p));
        }
        assert_eq!(frames.len(), 1);
        assert_eq!(frames[0].payload.as_ref(), &avcc[..]);
    }
}
