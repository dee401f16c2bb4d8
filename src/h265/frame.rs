//! Encoded H.265 frames and their inter-process wire form.

use crate::h265::nal::AvccNalIter;
use crate::h265::params::ParameterSets;
use crate::time::MediaTime;
use bytes::Bytes;
use serde::{Deserialize, Serialize};

/// One encoded H.265 access unit.
///
/// The payload is AVCC-framed: each NAL unit is preceded by a big-endian
/// length prefix whose width comes from the parameter sets (4 bytes when no
/// format is attached). Frames without `format` rely on a prior keyframe in
/// the same stream having supplied it.
#[derive(Debug, Clone)]
pub struct EncodedFrame {
    /// AVCC-framed access unit bytes.
    pub payload: Bytes,
    /// Presentation timestamp.
    pub pts: MediaTime,
    /// Display duration.
    pub duration: MediaTime,
    /// Whether this frame is independently decodable.
    pub keyframe: bool,
    /// Parameter sets, carried by keyframes.
    pub format: Option<ParameterSets>,
}

impl EncodedFrame {
    /// Iterate the NAL units of the payload, honoring the AVCC length
    /// prefix size declared by the parameter sets (default 4).
    pub fn nal_units(&self) -> AvccNalIter<'_> {
        let length_size = self
            .format
            .as_ref()
            .map(|f| f.nal_length_size)
            .unwrap_or(4);
        AvccNalIter::new(&self.payload, length_size)
    }
}

/// Keyed wire form for inter-process transfer (JSON by operator policy).
#[derive(Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct FrameWire {
    data: Bytes,
    timestamp_seconds: i64,
    timestamp_timescale: u32,
    duration_seconds: i64,
    duration_timescale: u32,
    is_key_frame: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    parameter_sets: Option<ParameterSets>,
}

impl Serialize for EncodedFrame {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        FrameWire {
            data: self.payload.clone(),
            timestamp_seconds: self.pts.value(),
            timestamp_timescale: self.pts.timescale(),
            duration_seconds: self.duration.value(),
            duration_timescale: self.duration.timescale(),
            is_key_frame: self.keyframe,
            parameter_sets: self.format.clone(),
        }
        .serialize(serializer)
    }
}

impl<'de> Deserialize<'de> for EncodedFrame {
    fn deserialize<D: serde::Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let wire = FrameWire::deserialize(deserializer)?;
        Ok(Self {
            payload: wire.data,
            pts: MediaTime::new(wire.timestamp_seconds, wire.timestamp_timescale),
            duration: MediaTime::new(wire.duration_seconds, wire.duration_timescale),
            keyframe: wire.is_key_frame,
            format: wire.parameter_sets,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_frame() -> EncodedFrame {
        EncodedFrame {
            payload: Bytes::from_static(&[0, 0, 0, 2, 0x40, 0x01]),
            pts: MediaTime::new(3000, 90_000),
            duration: MediaTime::new(1, 30),
            keyframe: true,
            format: Some(ParameterSets::new(
                Bytes::from_static(&[0x40, 0x01]),
                Bytes::from_static(&[0x42, 0x01]),
                Bytes::from_static(&[0x44, 0x01]),
            )),
        }
    }

    #[test]
    fn test_wire_round_trip() {
        let frame = sample_frame();
        let json = serde_json::to_string(&frame).unwrap();
        let back: EncodedFrame = serde_json::from_str(&json).unwrap();

        assert_eq!(back.payload, frame.payload);
        assert_eq!(back.pts, frame.pts);
        assert_eq!(back.duration, frame.duration);
        assert_eq!(back.keyframe, frame.keyframe);
        assert_eq!(back.format, frame.format);
    }

    #[test]
    fn test_wire_field_names() {
        let json = serde_json::to_value(sample_frame()).unwrap();
        let obj = json.as_object().unwrap();
        for key in [
            "data",
            "timestampSeconds",
            "timestampTimescale",
            "durationSeconds",
            "durationTimescale",
            "isKeyFrame",
            "parameterSets",
        ] {
            assert!(obj.contains_key(key), "missing field {key}");
        }
        let sets = obj["parameterSets"].as_object().unwrap();
        assert!(sets.contains_key("vps"));
        assert!(sets.contains_key("sps"));
        assert!(sets.contains_key("pps"));
    }

    #[test]
    fn test_frame_without_format_decodes_with_none() {
        let mut frame = sample_frame();
        frame.format = None;
        let json = serde_json::to_string(&frame).unwrap();
        assert!(!json.contains("parameterSets"));
        let back: EncodedFrame = serde_json::from_str(&json).unwrap();
        assert!(back.format.is_none());
    }

    #[test]
    fn test_nal_units_honors_length_size() {
        let mut sets = ParameterSets::new(
            Bytes::from_static(&[0x40]),
            Bytes::from_static(&[0x42]),
            Bytes::from_static(&[0x44]),
        );
        sets.nal_length_size = 2;
        let frame = EncodedFrame {
            payload: Bytes::from_static(&[0, 2, 0x26, 0x01]),
            pts: MediaTime::ZERO,
            duration: MediaTime::new(1, 30),
            keyframe: false,
            format: Some(sets),
        };
        let nals: Vec<&[u8]> = frame.nal_units().collect();
        assert_eq!(nals, vec![&[0x26, 0x01][..]]);
    }
}
