//! # flare-protocol
//!
//! Wire protocol implementation for flare.
//!
//! This crate provides:
//! - The WebSocket opening handshake (accept key derivation, 101 response)
//! - WebSocket frame encoding and decoding with masking
//! - Opcode-indexed dispatch tables for frames and application messages
//! - The Flare binary message codec
//! - Error types and error classes

pub mod codec;
pub mod dispatch;
pub mod error;
pub mod frame;
pub mod handshake;
pub mod message;

pub use codec::{standard_frame_table, FrameDecoder, FrameHandler, FrameTable, Message};
pub use dispatch::{DispatchTable, DispatchTableBuilder, HandlerFactory};
pub use error::{ErrorClass, ProtocolError};
pub use frame::{apply_mask, Frame, FrameHeader, MaskPolicy, Opcode, PayloadLength};
pub use handshake::{compute_accept_key, HandshakeRequest, HandshakeResponse};
pub use message::{FlareHeader, FlareMessage, FlareOpcode, OpenVideo, VideoInfo, FLARE_HEADER_SIZE};

/// Default port for the flare server.
pub const DEFAULT_PORT: u16 = 8080;

/// Maximum frame payload size (16 MiB).
pub const MAX_PAYLOAD_SIZE: u32 = 16 * 1024 * 1024;
