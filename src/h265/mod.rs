//! H.265/HEVC over RTP: frames, parameter sets, packetization.
//!
//! This module implements the RFC 7798 payload mapping on top of the
//! third-party RTP header codec:
//!
//! - [`EncodedFrame`]: an AVCC-framed access unit with rational timing
//! - [`ParameterSets`]: VPS/SPS/PPS extracted from an `hvcC` record
//! - [`Packetizer`]: frame -> RTP packets (single NAL and FU fragmentation)
//! - [`Depacketizer`]: RTP packets -> frames (reassembly by timestamp)
//!
//! The pipeline-facing filter elements wrapping these engines live in
//! [`crate::elements`] (`RtpH265Pay`, `RtpH265Depay`).

pub mod depacketizer;
pub mod frame;
pub mod nal;
pub mod packetizer;
pub mod params;

pub use depacketizer::{Depacketizer, DepacketizerStats};
pub use frame::EncodedFrame;
pub use packetizer::{Packetizer, PacketizerStats};
pub use params::ParameterSets;

use bytes::Bytes;

/// Dynamic RTP payload type used for H.265.
pub const RTP_PAYLOAD_TYPE: u8 = 98;

/// RTP clock rate for H.265 (90 kHz, per RFC 7798).
pub const RTP_CLOCK_RATE: u32 = 90_000;

/// Default maximum RTP payload size in bytes.
pub const DEFAULT_MAX_PAYLOAD: usize = 1400;

/// One RTP packet moving through the pipeline.
///
/// Carries the parsed header rather than wire bytes so filters can inspect
/// sequence numbers and markers without re-parsing; the network sink
/// serializes it in one pass. `format` rides along on the first packet of a
/// frame that knows its parameter sets, which is what makes the stream
/// decodable from a join point.
#[derive(Debug, Clone)]
pub struct RtpPacket {
    /// RTP fixed header (version 2).
    pub header: rtp::header::Header,
    /// Payload bytes after the header.
    pub payload: Bytes,
    /// Parameter sets, present on the first packet of a frame that has them.
    pub format: Option<ParameterSets>,
}
