//! Built-in pipeline elements.
//!
//! Reference implementations exercising the runtime, plus the filter
//! elements that wrap the H.265 RTP engines:
//!
//! - [`TestSrc`]: timed test-pattern source
//! - [`MapFilter`]: per-buffer transform
//! - [`Queue`]: rate-decoupling buffer
//! - [`Tee`]: fan-out to several consumers
//! - [`CollectSink`]: accumulate buffers for inspection
//! - [`RtpH265Pay`] / [`RtpH265Depay`]: H.265 packetize/depacketize filters

mod collect;
mod queue;
mod rtp_h265;
mod tee;
mod testsrc;
mod transform;

pub use collect::CollectSink;
pub use queue::Queue;
pub use rtp_h265::{RtpH265Depay, RtpH265Pay};
pub use tee::Tee;
pub use testsrc::TestSrc;
pub use transform::MapFilter;
