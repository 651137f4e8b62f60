//! Transport messages and the frame dispatch table.
//!
//! Decoding goes bytes → [`Frame`] → frame handler (looked up by opcode in a
//! [`FrameTable`]) → [`Message`]. Encoding goes the other way through
//! [`Message::encode`].

use crate::dispatch::DispatchTable;
use crate::error::ProtocolError;
use crate::frame::{Frame, MaskPolicy, Opcode};
use crate::MAX_PAYLOAD_SIZE;
use bytes::{BufMut, Bytes, BytesMut};
use std::sync::Arc;

/// Close status for a normal closure.
pub const CLOSE_NORMAL: u16 = 1000;

/// Close status for a protocol error.
pub const CLOSE_PROTOCOL_ERROR: u16 = 1002;

/// Close status for a message too big to process.
pub const CLOSE_TOO_BIG: u16 = 1009;

/// Control frame payloads are limited to 125 bytes, 2 of which hold the code.
const MAX_CLOSE_REASON: usize = 123;

/// A transport-level message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Message {
    Text { text: String },
    Binary { data: Bytes },
    Close { code: Option<u16>, reason: String },
    Ping { payload: Bytes },
    Pong { payload: Bytes },
}

impl Message {
    pub fn text(text: impl Into<String>) -> Self {
        Message::Text { text: text.into() }
    }

    pub fn binary(data: impl Into<Bytes>) -> Self {
        Message::Binary { data: data.into() }
    }

    pub fn close(code: u16, reason: impl Into<String>) -> Self {
        Message::Close {
            code: Some(code),
            reason: reason.into(),
        }
    }

    /// Returns the opcode this message travels under.
    pub fn opcode(&self) -> Opcode {
        match self {
            Message::Text { .. } => Opcode::Text,
            Message::Binary { .. } => Opcode::Binary,
            Message::Close { .. } => Opcode::Close,
            Message::Ping { .. } => Opcode::Ping,
            Message::Pong { .. } => Opcode::Pong,
        }
    }

    /// Returns the frame payload for this message.
    pub fn payload(&self) -> Bytes {
        match self {
            Message::Text { text } => Bytes::copy_from_slice(text.as_bytes()),
            Message::Binary { data } => data.clone(),
            Message::Close { code, reason } => match code {
                Some(code) => {
                    let reason = truncate_utf8(reason, MAX_CLOSE_REASON);
                    let mut buf = BytesMut::with_capacity(2 + reason.len());
                    buf.put_u16(*code);
                    buf.put_slice(reason.as_bytes());
                    buf.freeze()
                }
                None => Bytes::new(),
            },
            Message::Ping { payload } | Message::Pong { payload } => payload.clone(),
        }
    }

    /// Encodes the message as a single unmasked server frame.
    pub fn encode(&self) -> Result<BytesMut, ProtocolError> {
        Frame::encode(self.opcode(), &self.payload())
    }

    /// Encodes the message as a masked client frame.
    pub fn encode_masked(&self, mask: [u8; 4]) -> Result<BytesMut, ProtocolError> {
        Frame::encode_masked(self.opcode(), &self.payload(), mask)
    }
}

fn truncate_utf8(s: &str, max: usize) -> &str {
    if s.len() <= max {
        return s;
    }
    let mut end = max;
    while !s.is_char_boundary(end) {
        end -= 1;
    }
    &s[..end]
}

/// Turns a decoded frame into a transport message.
pub trait FrameHandler: Send + Sync {
    fn process(&self, frame: Frame) -> Result<Message, ProtocolError>;
}

/// Opcode → frame handler table.
pub type FrameTable = DispatchTable<dyn FrameHandler>;

struct TextFrame;
struct BinaryFrame;
struct CloseFrame;
struct PingFrame;
struct PongFrame;

impl FrameHandler for TextFrame {
    fn process(&self, frame: Frame) -> Result<Message, ProtocolError> {
        let text = String::from_utf8(frame.payload.to_vec()).map_err(|_| ProtocolError::InvalidUtf8)?;
        Ok(Message::Text { text })
    }
}

impl FrameHandler for BinaryFrame {
    fn process(&self, frame: Frame) -> Result<Message, ProtocolError> {
        Ok(Message::Binary {
            data: frame.payload.freeze(),
        })
    }
}

impl FrameHandler for CloseFrame {
    fn process(&self, frame: Frame) -> Result<Message, ProtocolError> {
        let payload = frame.payload;
        match payload.len() {
            0 => Ok(Message::Close {
                code: None,
                reason: String::new(),
            }),
            1 => Err(ProtocolError::InvalidField {
                field: "close_code",
                reason: "close payload of 1 byte".to_string(),
            }),
            _ => {
                let code = u16::from_be_bytes([payload[0], payload[1]]);
                let reason = std::str::from_utf8(&payload[2..])
                    .map_err(|_| ProtocolError::InvalidUtf8)?
                    .to_string();
                Ok(Message::Close {
                    code: Some(code),
                    reason,
                })
            }
        }
    }
}

impl FrameHandler for PingFrame {
    fn process(&self, frame: Frame) -> Result<Message, ProtocolError> {
        Ok(Message::Ping {
            payload: frame.payload.freeze(),
        })
    }
}

impl FrameHandler for PongFrame {
    fn process(&self, frame: Frame) -> Result<Message, ProtocolError> {
        Ok(Message::Pong {
            payload: frame.payload.freeze(),
        })
    }
}

/// Builds the table of supported transport opcodes.
///
/// CONTINUATION is left unregistered: fragmented messages are reported as
/// unsupported frames.
pub fn standard_frame_table() -> Result<FrameTable, ProtocolError> {
    Ok(FrameTable::builder()
        .register(Opcode::Text.as_u8(), || Box::new(TextFrame))?
        .register(Opcode::Binary.as_u8(), || Box::new(BinaryFrame))?
        .register(Opcode::Close.as_u8(), || Box::new(CloseFrame))?
        .register(Opcode::Ping.as_u8(), || Box::new(PingFrame))?
        .register(Opcode::Pong.as_u8(), || Box::new(PongFrame))?
        .build())
}

/// Buffers inbound bytes and decodes them into transport messages.
pub struct FrameDecoder {
    buffer: BytesMut,
    table: Arc<FrameTable>,
    mask_policy: MaskPolicy,
    max_payload: u32,
}

impl FrameDecoder {
    pub fn new(table: Arc<FrameTable>) -> Self {
        Self {
            buffer: BytesMut::with_capacity(8192),
            table,
            mask_policy: MaskPolicy::default(),
            max_payload: MAX_PAYLOAD_SIZE,
        }
    }

    /// Sets the mask policy.
    pub fn with_mask_policy(mut self, policy: MaskPolicy) -> Self {
        self.mask_policy = policy;
        self
    }

    /// Sets the maximum accepted payload length.
    pub fn with_max_payload(mut self, max_payload: u32) -> Self {
        self.max_payload = max_payload;
        self
    }

    /// Appends data to the internal buffer.
    pub fn extend(&mut self, data: &[u8]) {
        self.buffer.extend_from_slice(data);
    }

    /// Attempts to decode the next raw frame from the buffer.
    pub fn decode_frame(&mut self) -> Result<Option<Frame>, ProtocolError> {
        Frame::decode(&mut self.buffer, self.mask_policy, self.max_payload)
    }

    /// Attempts to decode the next message from the buffer.
    ///
    /// A frame with an unregistered opcode is consumed and reported as
    /// [`ProtocolError::UnsupportedFrame`]; the buffer stays positioned on the
    /// next frame.
    pub fn decode_message(&mut self) -> Result<Option<Message>, ProtocolError> {
        let frame = match self.decode_frame()? {
            Some(frame) => frame,
            None => return Ok(None),
        };

        let opcode = frame.header.opcode;
        let handler = self
            .table
            .resolve(opcode)
            .ok_or(ProtocolError::UnsupportedFrame { opcode })?;
        handler.process(frame).map(Some)
    }

    /// Returns the number of bytes currently buffered.
    pub fn buffered(&self) -> usize {
        self.buffer.len()
    }

    /// Clears the internal buffer.
    pub fn clear(&mut self) {
        self.buffer.clear();
    }
}
