//! Rational media timestamps.
//!
//! Media timing in this crate is expressed as a rational `value / timescale`
//! pair rather than a fixed nanosecond tick, so encoder timebases (e.g.
//! 1/30, 1001/30000) survive round-trips without drift. Conversion to and
//! from the 90 kHz RTP clock is modular 32-bit, as on the wire.

use std::fmt;

/// A rational media timestamp or duration.
///
/// # Examples
///
/// ```rust
/// use sluice::time::MediaTime;
///
/// let pts = MediaTime::new(3003, 90_000);
/// assert!((pts.as_secs_f64() - 0.033_366).abs() < 1e-6);
///
/// let one = MediaTime::from_secs(1);
/// assert_eq!(one.to_rtp_timestamp(90_000), 90_000);
/// ```
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct MediaTime {
    value: i64,
    timescale: u32,
}

impl MediaTime {
    /// Zero time.
    pub const ZERO: Self = Self {
        value: 0,
        timescale: 1,
    };

    /// Create from a value and timescale. A zero timescale is clamped to 1.
    pub const fn new(value: i64, timescale: u32) -> Self {
        let timescale = if timescale == 0 { 1 } else { timescale };
        Self { value, timescale }
    }

    /// Create from whole seconds.
    pub const fn from_secs(secs: i64) -> Self {
        Self {
            value: secs,
            timescale: 1,
        }
    }

    /// The rational numerator.
    pub const fn value(self) -> i64 {
        self.value
    }

    /// The rational denominator (ticks per second).
    pub const fn timescale(self) -> u32 {
        self.timescale
    }

    /// Value in seconds as a float.
    pub fn as_secs_f64(self) -> f64 {
        self.value as f64 / self.timescale as f64
    }

    /// Convert to an RTP timestamp at the given clock rate, modulo 2^32.
    pub fn to_rtp_timestamp(self, clock_rate: u32) -> u32 {
        let ticks = (self.as_secs_f64() * clock_rate as f64).round() as i64;
        ticks as u32
    }

    /// Build a media time from an RTP timestamp at the given clock rate.
    ///
    /// The clock rate becomes the timescale, so no precision is lost.
    pub fn from_rtp_timestamp(timestamp: u32, clock_rate: u32) -> Self {
        Self::new(timestamp as i64, clock_rate)
    }
}

impl Default for MediaTime {
    fn default() -> Self {
        Self::ZERO
    }
}

impl fmt::Display for MediaTime {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:.6}s", self.as_secs_f64())
    }
}
