//! RTP network transport elements.
//!
//! - [`RtpUdpSink`]: sends RTP packets over UDP and emits periodic RTCP
//!   sender reports on the adjacent port
//! - [`RtpUdpSrc`]: receives UDP datagrams and parses them into RTP packets

mod rtp_sink;
mod rtp_src;

pub use rtp_sink::{RtpSinkStats, RtpUdpSink};
pub use rtp_src::{RtpSrcStats, RtpUdpSrc};
