//! Flare application messages.
//!
//! Every message carries a 5-byte envelope followed by a variant payload:
//!
//! ```text
//! +--------------+--------+-----------------+
//! | total length | opcode | payload         |
//! | u32 BE       | u8     | length - 5      |
//! +--------------+--------+-----------------+
//! ```
//!
//! `OPEN_VIDEO` payloads:
//!
//! ```text
//! unavailable: | 0x00 |
//! available:   | 0x01 | width i32 | height i32 | fps f64 | duration f64 | frame_count i32 |
//!              | 1    | 4         | 4          | 8       | 8            | 4               |
//! ```
//!
//! All integers and doubles are big-endian.

use crate::error::ProtocolError;
use bytes::{Buf, BufMut, BytesMut};

/// Size of the envelope: 4 length bytes and 1 opcode byte.
pub const FLARE_HEADER_SIZE: usize = 5;

/// Payload size of an unavailable `OPEN_VIDEO`.
pub const OPEN_VIDEO_UNAVAILABLE_SIZE: usize = 1;

/// Payload size of an available `OPEN_VIDEO`: flag, width, height, fps,
/// duration, frame count.
pub const OPEN_VIDEO_AVAILABLE_SIZE: usize = 1 + 4 + 4 + 8 + 8 + 4;

/// Application opcodes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum FlareOpcode {
    OpenVideo = 0x01,
}

impl FlareOpcode {
    /// `OPEN_VIDEO` opcode value.
    pub const OPEN_VIDEO: u8 = FlareOpcode::OpenVideo as u8;

    pub fn from_u8(value: u8) -> Option<Self> {
        match value {
            Self::OPEN_VIDEO => Some(FlareOpcode::OpenVideo),
            _ => None,
        }
    }

    pub fn as_u8(self) -> u8 {
        self as u8
    }

    /// Returns the protocol name of the opcode.
    pub fn name(self) -> &'static str {
        match self {
            FlareOpcode::OpenVideo => "OPEN_VIDEO",
        }
    }
}

/// Metadata of an opened video.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct VideoInfo {
    pub width: i32,
    pub height: i32,
    pub fps: f64,
    /// Duration in seconds.
    pub duration: f64,
    pub frame_count: i32,
}

/// Result of opening a video.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum OpenVideo {
    Unavailable,
    Available(VideoInfo),
}

impl OpenVideo {
    pub fn is_available(&self) -> bool {
        matches!(self, OpenVideo::Available(_))
    }

    fn payload_len(&self) -> usize {
        match self {
            OpenVideo::Unavailable => OPEN_VIDEO_UNAVAILABLE_SIZE,
            OpenVideo::Available(_) => OPEN_VIDEO_AVAILABLE_SIZE,
        }
    }

    fn put(&self, buf: &mut BytesMut) {
        match self {
            OpenVideo::Unavailable => buf.put_u8(0),
            OpenVideo::Available(info) => {
                buf.put_u8(1);
                buf.put_i32(info.width);
                buf.put_i32(info.height);
                buf.put_f64(info.fps);
                buf.put_f64(info.duration);
                buf.put_i32(info.frame_count);
            }
        }
    }

    fn read(mut payload: &[u8]) -> Result<Self, ProtocolError> {
        let available = match payload.first() {
            Some(0) => false,
            Some(1) => true,
            Some(other) => {
                return Err(ProtocolError::InvalidField {
                    field: "available",
                    reason: format!("expected 0 or 1, got {other}"),
                })
            }
            None => {
                return Err(ProtocolError::Truncated {
                    needed: OPEN_VIDEO_UNAVAILABLE_SIZE,
                })
            }
        };

        let expected = if available {
            OPEN_VIDEO_AVAILABLE_SIZE
        } else {
            OPEN_VIDEO_UNAVAILABLE_SIZE
        };
        if payload.len() < expected {
            return Err(ProtocolError::Truncated {
                needed: expected - payload.len(),
            });
        }
        if payload.len() > expected {
            return Err(ProtocolError::InvalidField {
                field: "payload",
                reason: format!(
                    "OPEN_VIDEO payload is {} bytes, expected {expected}",
                    payload.len()
                ),
            });
        }

        payload.advance(1);
        if !available {
            return Ok(OpenVideo::Unavailable);
        }

        Ok(OpenVideo::Available(VideoInfo {
            width: payload.get_i32(),
            height: payload.get_i32(),
            fps: payload.get_f64(),
            duration: payload.get_f64(),
            frame_count: payload.get_i32(),
        }))
    }
}

/// Decoded envelope of a Flare message.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FlareHeader {
    /// Total message length, envelope included.
    pub length: u32,
    pub opcode: u8,
}

impl FlareHeader {
    /// Reads and validates the envelope of `bytes`.
    ///
    /// The declared length must equal `bytes.len()`.
    pub fn read(bytes: &[u8]) -> Result<Self, ProtocolError> {
        if bytes.len() < FLARE_HEADER_SIZE {
            return Err(ProtocolError::Truncated {
                needed: FLARE_HEADER_SIZE - bytes.len(),
            });
        }

        let length = u32::from_be_bytes([bytes[0], bytes[1], bytes[2], bytes[3]]);
        if length as usize != bytes.len() {
            return Err(ProtocolError::LengthMismatch {
                declared: length,
                actual: bytes.len(),
            });
        }

        Ok(Self {
            length,
            opcode: bytes[4],
        })
    }
}

/// A Flare application message.
#[derive(Debug, Clone, PartialEq)]
pub enum FlareMessage {
    OpenVideo(OpenVideo),
}

impl FlareMessage {
    pub fn opcode(&self) -> FlareOpcode {
        match self {
            FlareMessage::OpenVideo(_) => FlareOpcode::OpenVideo,
        }
    }

    /// Returns the encoded size, envelope included.
    pub fn encoded_len(&self) -> usize {
        let payload_len = match self {
            FlareMessage::OpenVideo(open) => open.payload_len(),
        };
        FLARE_HEADER_SIZE + payload_len
    }

    /// Encodes the message.
    pub fn encode(&self) -> BytesMut {
        let total = self.encoded_len();
        let mut buf = BytesMut::with_capacity(total);

        buf.put_u32(total as u32);
        buf.put_u8(self.opcode().as_u8());
        match self {
            FlareMessage::OpenVideo(open) => open.put(&mut buf),
        }

        debug_assert_eq!(buf.len(), total);
        buf
    }

    /// Decodes one complete message.
    pub fn decode(bytes: &[u8]) -> Result<Self, ProtocolError> {
        let header = FlareHeader::read(bytes)?;
        let payload = &bytes[FLARE_HEADER_SIZE..];

        match FlareOpcode::from_u8(header.opcode) {
            Some(FlareOpcode::OpenVideo) => OpenVideo::read(payload).map(FlareMessage::OpenVideo),
            None => Err(ProtocolError::UnsupportedMessage {
                opcode: header.opcode,
            }),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_info() -> VideoInfo {
        VideoInfo {
            width: 640,
            height: 480,
            fps: 29.97,
            duration: 12345.0,
            frame_count: 300,
        }
    }

    #[test]
    fn test_open_video_unavailable_bytes() {
        let encoded = FlareMessage::OpenVideo(OpenVideo::Unavailable).encode();
        assert_eq!(&encoded[..], &[0, 0, 0, 6, FlareOpcode::OPEN_VIDEO, 0x00]);
    }

    #[test]
    fn test_open_video_available_layout() {
        let encoded = FlareMessage::OpenVideo(OpenVideo::Available(sample_info())).encode();

        assert_eq!(encoded.len(), 35);
        assert_eq!(&encoded[0..4], &35u32.to_be_bytes());
        assert_eq!(encoded[4], FlareOpcode::OPEN_VIDEO);
        assert_eq!(encoded[5], 1);
        assert_eq!(&encoded[6..10], &640i32.to_be_bytes());
        assert_eq!(&encoded[10..14], &480i32.to_be_bytes());
        assert_eq!(&encoded[14..22], &29.97f64.to_be_bytes());
        assert_eq!(&encoded[22..30], &12345.0f64.to_be_bytes());
        assert_eq!(&encoded[30..34], &300i32.to_be_bytes());
    }

    #[test]
    fn test_open_video_available_roundtrip() {
        let message = FlareMessage::OpenVideo(OpenVideo::Available(sample_info()));
        let decoded = FlareMessage::decode(&message.encode()).unwrap();

        match decoded {
            FlareMessage::OpenVideo(OpenVideo::Available(info)) => {
                assert_eq!(info.width, 640);
                assert_eq!(info.height, 480);
                assert_eq!(info.fps, 29.97);
                assert_eq!(info.duration, 12345.0);
                assert_eq!(info.frame_count, 300);
            }
            other => panic!("unexpected message: {other:?}"),
        }
    }

    #[test]
    fn test_open_video_unavailable_roundtrip() {
        let message = FlareMessage::OpenVideo(OpenVideo::Unavailable);
        assert_eq!(FlareMessage::decode(&message.encode()).unwrap(), message);
    }

    #[test]
    fn test_negative_fields_roundtrip() {
        let info = VideoInfo {
            width: -1,
            height: i32::MIN,
            fps: -0.5,
            duration: f64::MAX,
            frame_count: i32::MAX,
        };
        let message = FlareMessage::OpenVideo(OpenVideo::Available(info));
        assert_eq!(FlareMessage::decode(&message.encode()).unwrap(), message);
    }

    #[test]
    fn test_decode_truncated_header() {
        let result = FlareMessage::decode(&[0, 0, 0]);
        assert!(matches!(result, Err(ProtocolError::Truncated { needed: 2 })));
    }

    #[test]
    fn test_decode_length_mismatch() {
        let mut encoded = FlareMessage::OpenVideo(OpenVideo::Unavailable).encode();
        encoded.put_u8(0xAA);

        let result = FlareMessage::decode(&encoded);
        assert!(matches!(
            result,
            Err(ProtocolError::LengthMismatch {
                declared: 6,
                actual: 7
            })
        ));
    }

    #[test]
    fn test_decode_unknown_opcode() {
        let result = FlareMessage::decode(&[0, 0, 0, 6, 0x7F, 0]);
        assert!(matches!(
            result,
            Err(ProtocolError::UnsupportedMessage { opcode: 0x7F })
        ));
    }

    #[test]
    fn test_decode_bad_availability_flag() {
        let result = FlareMessage::decode(&[0, 0, 0, 6, FlareOpcode::OPEN_VIDEO, 2]);
        assert!(matches!(
            result,
            Err(ProtocolError::InvalidField {
                field: "available",
                ..
            })
        ));
    }

    #[test]
    fn test_decode_short_available_payload() {
        let encoded = FlareMessage::OpenVideo(OpenVideo::Available(sample_info())).encode();
        let mut cut = BytesMut::from(&encoded[..30]);
        cut[0..4].copy_from_slice(&30u32.to_be_bytes());

        let result = FlareMessage::decode(&cut);
        assert!(matches!(result, Err(ProtocolError::Truncated { needed: 4 })));
    }

    #[test]
    fn test_decode_empty_payload() {
        let result = FlareMessage::decode(&[0, 0, 0, 5, FlareOpcode::OPEN_VIDEO]);
        assert!(matches!(result, Err(ProtocolError::Truncated { needed: 1 })));
    }

    #[test]
    fn test_header_read() {
        let encoded = FlareMessage::OpenVideo(OpenVideo::Unavailable).encode();
        let header = FlareHeader::read(&encoded).unwrap();
        assert_eq!(header.length, 6);
        assert_eq!(header.opcode, FlareOpcode::OPEN_VIDEO);
    }

    #[test]
    fn test_opcode_names() {
        assert_eq!(FlareOpcode::OpenVideo.name(), "OPEN_VIDEO");
        assert_eq!(FlareOpcode::from_u8(0x01), Some(FlareOpcode::OpenVideo));
        assert_eq!(FlareOpcode::from_u8(0x00), None);
    }
}
