//! WebSocket opening handshake.
//!
//! The client's upgrade request is read up to the first blank line; only the
//! `Sec-WebSocket-Key` header is used. The server answers with a fixed
//! `101 Switching Protocols` response carrying the derived accept key.

use crate::error::ProtocolError;
use base64::{engine::general_purpose::STANDARD as BASE64, Engine as _};
use bytes::{Buf, BufMut, BytesMut};
use sha1::{Digest, Sha1};

/// GUID appended to the client key before hashing.
pub const WS_GUID: &str = "258EAFA5-E914-47DA-95CA-C5AB0DC85B11";

/// Header carrying the client key.
pub const KEY_HEADER: &str = "Sec-WebSocket-Key";

/// Largest request header block accepted (8 KiB).
pub const MAX_HANDSHAKE_SIZE: usize = 8 * 1024;

/// Key used to derive the accept value when the client sent none.
pub const MISSING_KEY_FALLBACK: &str = "";

/// Computes `base64(sha1(key + WS_GUID))`.
pub fn compute_accept_key(key: &str) -> String {
    let mut hasher = Sha1::new();
    hasher.update(key.as_bytes());
    hasher.update(WS_GUID.as_bytes());
    BASE64.encode(hasher.finalize())
}

/// The parts of the client's upgrade request the server uses.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct HandshakeRequest {
    /// First line of the request, e.g. `GET /stream HTTP/1.1`.
    pub request_line: Option<String>,
    /// Value of `Sec-WebSocket-Key`, if the client sent one.
    pub key: Option<String>,
}

impl HandshakeRequest {
    /// Decodes the request header block from `buf`.
    ///
    /// Returns `Ok(None)` until a blank line is buffered. On success the
    /// header block is consumed and any bytes after it stay in `buf`.
    pub fn decode(buf: &mut BytesMut) -> Result<Option<Self>, ProtocolError> {
        match find_header_end(buf) {
            Some((body_end, block_end)) => {
                let request = Self::parse(&buf[..body_end]);
                buf.advance(block_end);
                Ok(Some(request))
            }
            None if buf.len() > MAX_HANDSHAKE_SIZE => Err(ProtocolError::HandshakeTooLarge {
                max: MAX_HANDSHAKE_SIZE,
            }),
            None => Ok(None),
        }
    }

    /// Parses whatever was received when the stream ended before a blank line.
    pub fn from_partial(buf: &mut BytesMut) -> Self {
        let request = Self::parse(buf);
        buf.clear();
        request
    }

    fn parse(block: &[u8]) -> Self {
        let text = String::from_utf8_lossy(block);
        let mut lines = text.lines().map(str::trim).filter(|line| !line.is_empty());

        let request_line = lines.next().map(str::to_string);
        let mut key = None;
        for line in lines {
            if let Some((name, value)) = line.split_once(':') {
                if name.trim().eq_ignore_ascii_case(KEY_HEADER) {
                    key = Some(value.trim().to_string());
                }
            }
        }

        Self { request_line, key }
    }

    /// Computes the accept key for this request.
    ///
    /// Fails with [`ProtocolError::MissingKey`] when the client sent no key;
    /// [`accept_or_fallback`](Self::accept_or_fallback) is the degraded path.
    pub fn accept_key(&self) -> Result<String, ProtocolError> {
        self.key
            .as_deref()
            .map(compute_accept_key)
            .ok_or(ProtocolError::MissingKey)
    }

    /// Computes the accept key, deriving it from [`MISSING_KEY_FALLBACK`]
    /// when the client sent no key.
    pub fn accept_or_fallback(&self) -> String {
        compute_accept_key(self.key.as_deref().unwrap_or(MISSING_KEY_FALLBACK))
    }
}

/// Returns `(end of last header line, end of blank line)`.
fn find_header_end(buf: &[u8]) -> Option<(usize, usize)> {
    let mut line_start = 0;
    for (i, &byte) in buf.iter().enumerate() {
        if byte != b'\n' {
            continue;
        }
        let line = &buf[line_start..i];
        let line = line.strip_suffix(b"\r").unwrap_or(line);
        if line.is_empty() {
            return Some((line_start, i + 1));
        }
        line_start = i + 1;
    }
    None
}

/// The server's `101 Switching Protocols` reply.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HandshakeResponse {
    pub accept_key: String,
}

impl HandshakeResponse {
    pub fn new(accept_key: impl Into<String>) -> Self {
        Self {
            accept_key: accept_key.into(),
        }
    }

    /// Encodes the response bytes.
    pub fn encode(&self) -> BytesMut {
        let mut buf = BytesMut::with_capacity(128);
        buf.put_slice(b"HTTP/1.1 101 Switching Protocols\r\n");
        buf.put_slice(b"Upgrade: websocket\r\n");
        buf.put_slice(b"Connection: Upgrade\r\n");
        buf.put_slice(b"Sec-WebSocket-Accept: ");
        buf.put_slice(self.accept_key.as_bytes());
        buf.put_slice(b"\r\n\r\n");
        buf
    }
}
