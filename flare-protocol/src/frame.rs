//! WebSocket frame format (RFC 6455 subset).
//!
//! Frame layout:
//!
//! ```text
//! +-----+---------+------+---------+----------------------+------------+---------+
//! | FIN | RSV 1-3 |opcode| MASK    | payload len (7 bits) | ext length | mask    |
//! | 1 b | 3 bits  |4 bits| 1 bit   | 0-125 / 126 / 127    | 0, 2 or 8  | 0 or 4  |
//! +-----+---------+------+---------+----------------------+------------+---------+
//! | payload                                                                      |
//! +------------------------------------------------------------------------------+
//! ```
//!
//! Server frames are always final and never masked. Fragmentation is not
//! supported: the FIN bit is recorded on decode but not acted upon.

use crate::error::ProtocolError;
use bytes::{Buf, BufMut, BytesMut};

/// FIN bit in the first header byte.
pub const FIN_BIT: u8 = 0x80;

/// MASK bit in the second header byte.
pub const MASK_BIT: u8 = 0x80;

/// Length code announcing a 16-bit extended length.
pub const LENGTH_16: u8 = 0x7E;

/// Length code announcing a 64-bit extended length.
pub const LENGTH_64: u8 = 0x7F;

/// Largest payload that fits the single-byte length form.
pub const MAX_SHORT_LENGTH: usize = 125;

/// Size of a mask key in bytes.
pub const MASK_KEY_SIZE: usize = 4;

/// Transport opcodes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum Opcode {
    Continuation = 0x0,
    Text = 0x1,
    Binary = 0x2,
    Close = 0x8,
    Ping = 0x9,
    Pong = 0xA,
}

impl Opcode {
    /// Parses the low four bits of a header byte.
    pub fn from_u8(value: u8) -> Option<Self> {
        match value {
            0x0 => Some(Opcode::Continuation),
            0x1 => Some(Opcode::Text),
            0x2 => Some(Opcode::Binary),
            0x8 => Some(Opcode::Close),
            0x9 => Some(Opcode::Ping),
            0xA => Some(Opcode::Pong),
            _ => None,
        }
    }

    pub fn as_u8(self) -> u8 {
        self as u8
    }

    /// Returns whether this is a control opcode (close, ping, pong).
    pub fn is_control(self) -> bool {
        self.as_u8() & 0x8 != 0
    }
}

/// Where the payload length of a frame was carried.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PayloadLength {
    /// Length fits the 7-bit field.
    Short(u8),
    /// `126` followed by a 16-bit big-endian length.
    Extended16(u16),
    /// `127` followed by a 64-bit big-endian length.
    Extended64(u64),
}

impl PayloadLength {
    /// Picks the smallest encoding for `len`.
    pub fn for_len(len: usize) -> Self {
        if len <= MAX_SHORT_LENGTH {
            PayloadLength::Short(len as u8)
        } else if len <= u16::MAX as usize {
            PayloadLength::Extended16(len as u16)
        } else {
            PayloadLength::Extended64(len as u64)
        }
    }

    /// Returns the payload length.
    pub fn len(&self) -> u64 {
        match *self {
            PayloadLength::Short(n) => n as u64,
            PayloadLength::Extended16(n) => n as u64,
            PayloadLength::Extended64(n) => n,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Returns the value of the 7-bit length field.
    pub fn code(&self) -> u8 {
        match *self {
            PayloadLength::Short(n) => n,
            PayloadLength::Extended16(_) => LENGTH_16,
            PayloadLength::Extended64(_) => LENGTH_64,
        }
    }

    /// Returns the number of extended length bytes following the length field.
    pub fn extended_size(&self) -> usize {
        match self {
            PayloadLength::Short(_) => 0,
            PayloadLength::Extended16(_) => 2,
            PayloadLength::Extended64(_) => 8,
        }
    }

    fn put(&self, buf: &mut BytesMut, mask_bit: u8) {
        buf.put_u8(mask_bit | self.code());
        match *self {
            PayloadLength::Short(_) => {}
            PayloadLength::Extended16(n) => buf.put_u16(n),
            PayloadLength::Extended64(n) => buf.put_u64(n),
        }
    }
}

/// Whether the decoder expects a mask key after the length fields.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum MaskPolicy {
    /// Always read four mask bytes, whatever the MASK bit says.
    #[default]
    Always,
    /// Read the mask key only when the MASK bit is set.
    FromHeader,
}

impl MaskPolicy {
    fn expects_mask(self, mask_bit: bool) -> bool {
        match self {
            MaskPolicy::Always => true,
            MaskPolicy::FromHeader => mask_bit,
        }
    }
}

/// Parsed frame header.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FrameHeader {
    /// FIN bit.
    pub fin: bool,
    /// Raw 4-bit opcode. Kept raw so unknown opcodes can be reported.
    pub opcode: u8,
    /// MASK bit as transmitted.
    pub masked: bool,
    /// Payload length and the form it was carried in.
    pub length: PayloadLength,
    /// Mask key, if one was read.
    pub mask: Option<[u8; 4]>,
}

impl FrameHeader {
    /// Returns the known opcode, if any.
    pub fn opcode(&self) -> Option<Opcode> {
        Opcode::from_u8(self.opcode)
    }

    /// Returns the encoded size of this header.
    pub fn size(&self) -> usize {
        2 + self.length.extended_size() + self.mask.map_or(0, |_| MASK_KEY_SIZE)
    }
}

/// XORs `payload` with `mask`, byte `i` with `mask[i % 4]`.
///
/// Applying the same mask twice restores the original bytes.
pub fn apply_mask(payload: &mut [u8], mask: [u8; 4]) {
    for (i, byte) in payload.iter_mut().enumerate() {
        *byte ^= mask[i % MASK_KEY_SIZE];
    }
}

/// A decoded frame with its payload already unmasked.
#[derive(Debug, Clone)]
pub struct Frame {
    pub header: FrameHeader,
    pub payload: BytesMut,
}

impl Frame {
    /// Encodes a single final, unmasked server frame.
    pub fn encode(opcode: Opcode, payload: &[u8]) -> Result<BytesMut, ProtocolError> {
        let length = Self::checked_length(payload)?;
        let mut buf = BytesMut::with_capacity(2 + length.extended_size() + payload.len());

        buf.put_u8(FIN_BIT | opcode.as_u8());
        length.put(&mut buf, 0);
        buf.put_slice(payload);

        Ok(buf)
    }

    /// Encodes a single final frame masked with `mask`, as a client sends it.
    pub fn encode_masked(
        opcode: Opcode,
        payload: &[u8],
        mask: [u8; 4],
    ) -> Result<BytesMut, ProtocolError> {
        let length = Self::checked_length(payload)?;
        let mut buf =
            BytesMut::with_capacity(2 + length.extended_size() + MASK_KEY_SIZE + payload.len());

        buf.put_u8(FIN_BIT | opcode.as_u8());
        length.put(&mut buf, MASK_BIT);
        buf.put_slice(&mask);

        let start = buf.len();
        buf.put_slice(payload);
        apply_mask(&mut buf[start..], mask);

        Ok(buf)
    }

    fn checked_length(payload: &[u8]) -> Result<PayloadLength, ProtocolError> {
        if payload.len() as u64 > u32::MAX as u64 {
            return Err(ProtocolError::FrameTooLarge {
                size: payload.len() as u64,
                max: u32::MAX,
            });
        }
        Ok(PayloadLength::for_len(payload.len()))
    }

    /// Parses a frame header from the front of `buf` without consuming it.
    ///
    /// Returns `Ok(None)` if the header is not complete yet.
    pub fn peek_header(
        buf: &[u8],
        policy: MaskPolicy,
        max_payload: u32,
    ) -> Result<Option<FrameHeader>, ProtocolError> {
        if buf.len() < 2 {
            return Ok(None);
        }

        let fin = buf[0] & FIN_BIT != 0;
        let opcode = buf[0] & 0x0F;
        let masked = buf[1] & MASK_BIT != 0;
        let code = buf[1] & 0x7F;

        let length = match code {
            LENGTH_16 => {
                if buf.len() < 4 {
                    return Ok(None);
                }
                PayloadLength::Extended16(u16::from_be_bytes([buf[2], buf[3]]))
            }
            LENGTH_64 => {
                if buf.len() < 10 {
                    return Ok(None);
                }
                let mut raw = [0u8; 8];
                raw.copy_from_slice(&buf[2..10]);
                PayloadLength::Extended64(u64::from_be_bytes(raw))
            }
            n => PayloadLength::Short(n),
        };

        if length.len() > max_payload as u64 {
            return Err(ProtocolError::FrameTooLarge {
                size: length.len(),
                max: max_payload,
            });
        }

        let mask = if policy.expects_mask(masked) {
            let at = 2 + length.extended_size();
            if buf.len() < at + MASK_KEY_SIZE {
                return Ok(None);
            }
            Some([buf[at], buf[at + 1], buf[at + 2], buf[at + 3]])
        } else {
            None
        };

        Ok(Some(FrameHeader {
            fin,
            opcode,
            masked,
            length,
            mask,
        }))
    }

    /// Decodes one frame from `buf`.
    ///
    /// Returns `Ok(Some(frame))` and consumes its bytes when a complete
    /// frame is buffered, `Ok(None)` without consuming anything if more
    /// data is needed, or `Err` on protocol errors.
    pub fn decode(
        buf: &mut BytesMut,
        policy: MaskPolicy,
        max_payload: u32,
    ) -> Result<Option<Self>, ProtocolError> {
        let header = match Self::peek_header(buf, policy, max_payload)? {
            Some(header) => header,
            None => return Ok(None),
        };

        let payload_len = header.length.len() as usize;
        if buf.len() < header.size() + payload_len {
            return Ok(None);
        }

        buf.advance(header.size());
        let mut payload = buf.split_to(payload_len);
        if let Some(mask) = header.mask {
            apply_mask(&mut payload, mask);
        }

        Ok(Some(Self { header, payload }))
    }
}
