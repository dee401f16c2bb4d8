//! Parameter-set extraction from hvcC decoder configuration records.

use crate::error::{Error, Result};
use crate::h265::nal::{NAL_PPS, NAL_SPS, NAL_VPS};
use bytes::Bytes;
use serde::{Deserialize, Serialize};

fn default_nal_length_size() -> usize {
    4
}

/// The three H.265 parameter sets a decoder needs, as raw NAL unit payloads
/// without start codes or length prefixes.
///
/// Parsed from the `hvcC` configuration record (ISO/IEC 14496-15 §8.3.3.1)
/// the encoder attaches to its format description. `nal_length_size` is the
/// AVCC length prefix width the record declares; it is not part of the wire
/// form and defaults to 4 on deserialization.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ParameterSets {
    /// Video Parameter Set (NAL type 32).
    pub vps: Bytes,
    /// Sequence Parameter Set (NAL type 33).
    pub sps: Bytes,
    /// Picture Parameter Set (NAL type 34).
    pub pps: Bytes,
    /// AVCC NAL length prefix size, `lengthSizeMinusOne + 1`.
    #[serde(skip_serializing, default = "default_nal_length_size")]
    pub nal_length_size: usize,
}

impl ParameterSets {
    /// Build parameter sets directly, with the default 4-byte length size.
    pub fn new(vps: Bytes, sps: Bytes, pps: Bytes) -> Self {
        Self {
            vps,
            sps,
            pps,
            nal_length_size: 4,
        }
    }

    /// Parse an `hvcC` decoder configuration record.
    ///
    /// Validates the 23-byte fixed header (configuration version 1), reads
    /// `lengthSizeMinusOne` from byte 21 and `numOfArrays` from byte 22,
    /// then walks the parameter-set arrays. The last VPS, SPS and PPS seen
    /// win; all three must be present.
    pub fn parse_hvcc(data: &[u8]) -> Result<Self> {
        if data.len() < 23 {
            return Err(Error::InvalidConfigRecord(format!(
                "hvcC too short: {} bytes",
                data.len()
            )));
        }
        if data[0] != 1 {
            return Err(Error::InvalidConfigRecord(format!(
                "unsupported configuration version {}",
                data[0]
            )));
        }

        let nal_length_size = ((data[21] & 0x03) + 1) as usize;
        let num_arrays = data[22] as usize;

        let mut vps = None;
        let mut sps = None;
        let mut pps = None;

        let mut pos = 23;
        for _ in 0..num_arrays {
            if pos + 3 > data.len() {
                return Err(Error::InvalidConfigRecord(
                    "truncated parameter-set array header".into(),
                ));
            }
            let nal_type = data[pos] & 0x3F;
            let num_nalus = u16::from_be_bytes([data[pos + 1], data[pos + 2]]) as usize;
            pos += 3;

            for _ in 0..num_nalus {
                if pos + 2 > data.len() {
                    return Err(Error::InvalidConfigRecord(
                        "truncated NAL unit length".into(),
                    ));
                }
                let len = u16::from_be_bytes([data[pos], data[pos + 1]]) as usize;
                pos += 2;
                if pos + len > data.len() {
                    return Err(Error::InvalidConfigRecord(format!(
                        "NAL unit length {len} overruns record"
                    )));
                }
                let payload = Bytes::copy_from_slice(&data[pos..pos + len]);
                pos += len;

                match nal_type {
                    NAL_VPS => vps = Some(payload),
                    NAL_SPS => sps = Some(payload),
                    NAL_PPS => pps = Some(payload),
                    other => {
                        tracing::debug!(nal_type = other, "ignoring non-parameter-set array")
                    }
                }
            }
        }

        match (vps, sps, pps) {
            (Some(vps), Some(sps), Some(pps)) => Ok(Self {
                vps,
                sps,
                pps,
                nal_length_size,
            }),
            (vps, sps, pps) => {
                let mut missing = Vec::new();
                if vps.is_none() {
                    missing.push("VPS");
                }
                if sps.is_none() {
                    missing.push("SPS");
                }
                if pps.is_none() {
                    missing.push("PPS");
                }
                Err(Error::InvalidConfigRecord(format!(
                    "missing parameter sets: {}",
                    missing.join(", ")
                )))
            }
        }
    }
}
