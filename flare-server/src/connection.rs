//! Per-connection protocol loop.
//!
//! A connection is served in two phases: the opening handshake, then a loop
//! that reads bytes, decodes frames, dispatches them and writes replies.

use crate::error::ServerError;
use crate::handler::{Reply, TaskTable};
use crate::session::{Session, SessionState};
use crate::video::VideoSource;
use bytes::BytesMut;
use flare_protocol::codec::{CLOSE_NORMAL, CLOSE_PROTOCOL_ERROR, CLOSE_TOO_BIG};
use flare_protocol::{
    FrameDecoder, FrameTable, HandshakeRequest, HandshakeResponse, MaskPolicy, Message,
    ProtocolError,
};
use std::future::Future;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tokio::sync::broadcast;
use tokio::time::Instant;

const READ_BUFFER_SIZE: usize = 8192;

/// Limits and deadlines applied to every connection.
#[derive(Debug, Clone, Copy)]
pub struct ConnectionSettings {
    pub handshake_timeout: Duration,
    pub read_timeout: Duration,
    pub write_timeout: Duration,
    pub mask_policy: MaskPolicy,
    pub max_payload: u32,
}

impl Default for ConnectionSettings {
    fn default() -> Self {
        Self {
            handshake_timeout: Duration::from_secs(10),
            read_timeout: Duration::from_secs(300),
            write_timeout: Duration::from_secs(30),
            mask_policy: MaskPolicy::default(),
            max_payload: flare_protocol::MAX_PAYLOAD_SIZE,
        }
    }
}

/// Whether the loop keeps reading after a message.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Flow {
    Continue,
    Close,
}

/// Shared state needed to serve a connection.
#[derive(Clone)]
pub struct Connection {
    frames: Arc<FrameTable>,
    tasks: Arc<TaskTable>,
    video: Arc<dyn VideoSource>,
    settings: ConnectionSettings,
}

impl Connection {
    pub fn new(
        frames: Arc<FrameTable>,
        tasks: Arc<TaskTable>,
        video: Arc<dyn VideoSource>,
        settings: ConnectionSettings,
    ) -> Self {
        Self {
            frames,
            tasks,
            video,
            settings,
        }
    }

    /// Replaces the video source.
    pub fn with_video_source(mut self, video: Arc<dyn VideoSource>) -> Self {
        self.video = video;
        self
    }

    /// Serves one client until it closes, fails or the server shuts down.
    pub async fn serve<S>(
        &self,
        mut stream: S,
        addr: SocketAddr,
        shutdown: &mut broadcast::Receiver<()>,
    ) -> Result<(), ServerError>
    where
        S: AsyncRead + AsyncWrite + Unpin,
    {
        let mut session = Session::new(addr, self.video.clone());
        tracing::debug!("[{}] Session {} started", addr, session.id);

        let leftover = tokio::select! {
            result = self.handshake(&mut stream, &session) => result?,
            _ = shutdown.recv() => return Err(ServerError::ShuttingDown),
        };
        let Some(leftover) = leftover else {
            tracing::debug!("[{}] Connection closed before handshake", addr);
            return Ok(());
        };
        session.set_state(SessionState::Open);

        let mut decoder = FrameDecoder::new(self.frames.clone())
            .with_mask_policy(self.settings.mask_policy)
            .with_max_payload(self.settings.max_payload);
        decoder.extend(&leftover);

        let mut buf = [0u8; READ_BUFFER_SIZE];

        loop {
            // Process every complete frame already buffered
            loop {
                match decoder.decode_message() {
                    Ok(Some(message)) => {
                        session.record_frame();
                        if self.on_message(&mut stream, &mut session, message).await? == Flow::Close
                        {
                            return Ok(());
                        }
                    }
                    Ok(None) => break,
                    Err(e) if e.is_fatal() => {
                        tracing::warn!("[{}] Fatal protocol error: {} ({})", addr, e, e.class());
                        self.fail(&mut stream, &mut session, &e).await;
                        return Err(e.into());
                    }
                    Err(e) => {
                        session.record_rejected_frame();
                        tracing::warn!("[{}] Rejected frame: {} ({})", addr, e, e.class());
                    }
                }
            }

            tokio::select! {
                result = tokio::time::timeout(self.settings.read_timeout, stream.read(&mut buf)) => {
                    match result {
                        Ok(Ok(0)) => {
                            tracing::debug!("[{}] Connection closed by client", addr);
                            return Ok(());
                        }
                        Ok(Ok(n)) => {
                            tracing::debug!("[{}] Received {} bytes", addr, n);
                            decoder.extend(&buf[..n]);
                        }
                        Ok(Err(e)) => {
                            tracing::debug!("[{}] Read error: {}", addr, e);
                            return Err(ServerError::Io(e));
                        }
                        Err(_) => {
                            tracing::debug!("[{}] Read timeout", addr);
                            return Err(ServerError::Timeout("read"));
                        }
                    }
                }
                _ = shutdown.recv() => {
                    tracing::debug!("[{}] Shutdown signal received", addr);
                    session.set_state(SessionState::Closing);
                    let _ = self
                        .send(&mut stream, &Message::close(CLOSE_NORMAL, "server shutting down"))
                        .await;
                    return Err(ServerError::ShuttingDown);
                }
            }
        }
    }

    /// Reads the upgrade request and writes the 101 response.
    ///
    /// The whole request must arrive within `handshake_timeout`. Returns the bytes received after the request, or `None` if the
    /// client disconnected without sending anything.
    async fn handshake<S>(
        &self,
        stream: &mut S,
        session: &Session,
    ) -> Result<Option<BytesMut>, ServerError>
    where
        S: AsyncRead + AsyncWrite + Unpin,
    {
        let addr = session.remote_addr;
        let mut pending = BytesMut::with_capacity(1024);
        let mut buf = [0u8; READ_BUFFER_SIZE];
        let deadline = Instant::now() + self.settings.handshake_timeout;

        let request = loop {
            if let Some(request) = HandshakeRequest::decode(&mut pending)? {
                break request;
            }

            let n = match tokio::time::timeout_at(deadline, stream.read(&mut buf)).await {
                Ok(result) => result?,
                Err(_) => return Err(ServerError::Timeout("handshake")),
            };
            if n == 0 {
                if pending.is_empty() {
                    return Ok(None);
                }
                tracing::warn!("[{}] Stream ended before the request was complete", addr);
                break HandshakeRequest::from_partial(&mut pending);
            }
            pending.extend_from_slice(&buf[..n]);
        };

        let accept_key = match request.accept_key() {
            Ok(key) => key,
            Err(e) => {
                tracing::warn!("[{}] {} ({}), using fallback key", addr, e, e.class());
                request.accept_or_fallback()
            }
        };

        let response = HandshakeResponse::new(accept_key).encode();
        with_deadline(self.settings.write_timeout, "write", stream.write_all(&response)).await?;

        tracing::info!(
            "[{}] Handshake complete: {}",
            addr,
            request.request_line.as_deref().unwrap_or("<no request line>")
        );
        Ok(Some(pending))
    }

    async fn on_message<S>(
        &self,
        stream: &mut S,
        session: &mut Session,
        message: Message,
    ) -> Result<Flow, ServerError>
    where
        S: AsyncWrite + Unpin,
    {
        let addr = session.remote_addr;
        match message {
            Message::Text { text } => {
                tracing::debug!("[{}] Ignoring text frame ({} bytes)", addr, text.len());
                Ok(Flow::Continue)
            }
            Message::Binary { data } => {
                tracing::debug!("[{}] Binary frame ({} bytes)", addr, data.len());
                match self.tasks.dispatch_bytes(session, &data) {
                    Ok(replies) => self.send_replies(stream, session, replies).await,
                    Err(e) if e.is_fatal() => Err(e),
                    Err(e) => {
                        tracing::warn!("[{}] Message rejected: {} ({})", addr, e, e.class());
                        Ok(Flow::Continue)
                    }
                }
            }
            Message::Ping { payload } => {
                tracing::debug!("[{}] Ping ({} bytes)", addr, payload.len());
                self.send(stream, &Message::Pong { payload }).await?;
                Ok(Flow::Continue)
            }
            Message::Pong { .. } => Ok(Flow::Continue),
            Message::Close { code, reason } => {
                tracing::info!(
                    "[{}] Close received (code={:?}, reason={:?})",
                    addr,
                    code,
                    reason
                );
                session.set_state(SessionState::Closing);
                let echo = Message::close(code.unwrap_or(CLOSE_NORMAL), "");
                self.send(stream, &echo).await?;
                let _ = stream.shutdown().await;
                Ok(Flow::Close)
            }
        }
    }

    async fn send_replies<S>(
        &self,
        stream: &mut S,
        session: &mut Session,
        replies: Vec<Reply>,
    ) -> Result<Flow, ServerError>
    where
        S: AsyncWrite + Unpin,
    {
        for reply in replies {
            let message = match reply {
                Reply::Flare(message) => Message::binary(message.encode().freeze()),
                Reply::Transport(message) => message,
            };
            self.send(stream, &message).await?;

            if let Message::Close { .. } = message {
                session.set_state(SessionState::Closing);
                let _ = stream.shutdown().await;
                return Ok(Flow::Close);
            }
        }
        Ok(Flow::Continue)
    }

    async fn send<S>(&self, stream: &mut S, message: &Message) -> Result<(), ServerError>
    where
        S: AsyncWrite + Unpin,
    {
        let bytes = message.encode()?;
        tracing::debug!("Writing {:?} frame ({} bytes)", message.opcode(), bytes.len());
        with_deadline(self.settings.write_timeout, "write", stream.write_all(&bytes)).await
    }

    /// Sends a best-effort Close for a fatal protocol error.
    async fn fail<S>(&self, stream: &mut S, session: &mut Session, error: &ProtocolError)
    where
        S: AsyncWrite + Unpin,
    {
        let code = match error {
            ProtocolError::Io(_) => return,
            ProtocolError::FrameTooLarge { .. } => CLOSE_TOO_BIG,
            _ => CLOSE_PROTOCOL_ERROR,
        };
        session.set_state(SessionState::Closing);
        let _ = self.send(stream, &Message::close(code, error.to_string())).await;
        let _ = stream.shutdown().await;
    }
}

async fn with_deadline<T>(
    deadline: Duration,
    what: &'static str,
    io: impl Future<Output = std::io::Result<T>>,
) -> Result<T, ServerError> {
    match tokio::time::timeout(deadline, io).await {
        Ok(result) => Ok(result?),
        Err(_) => Err(ServerError::Timeout(what)),
    }
}

impl std::fmt::Debug for Connection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Connection")
            .field("frames", &self.frames)
            .field("tasks", &self.tasks)
            .field("settings", &self.settings)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::handler::TaskHandler;
    use crate::video::StaticVideoSource;
    use bytes::Bytes;
    use flare_protocol::{
        compute_accept_key, standard_frame_table, DispatchTable, FlareMessage, FlareOpcode, Frame,
        Opcode, OpenVideo, VideoInfo,
    };
    use tokio::io::DuplexStream;

    const MASK: [u8; 4] = [0x37, 0xfa, 0x21, 0x3d];
    const KEY: &str = "dGhlIHNhbXBsZSBub25jZQ==";

    fn sample_info() -> VideoInfo {
        VideoInfo {
            width: 640,
            height: 480,
            fps: 29.97,
            duration: 12345.0,
            frame_count: 300,
        }
    }

    fn connection(video: Option<VideoInfo>, settings: ConnectionSettings) -> Connection {
        Connection::new(
            Arc::new(standard_frame_table().unwrap()),
            Arc::new(TaskTable::standard().unwrap()),
            Arc::new(StaticVideoSource::new(video)),
            settings,
        )
    }

    fn addr() -> SocketAddr {
        "127.0.0.1:40000".parse().unwrap()
    }

    fn upgrade_request(key: Option<&str>) -> String {
        let mut request = String::from("GET /flare HTTP/1.1\r\nHost: localhost\r\n");
        if let Some(key) = key {
            request.push_str(&format!("Sec-WebSocket-Key: {}\r\n", key));
        }
        request.push_str("\r\n");
        request
    }

    async fn read_handshake(client: &mut DuplexStream, buf: &mut BytesMut) -> String {
        loop {
            if let Some(end) = buf.windows(4).position(|w| w == b"\r\n\r\n") {
                let response = buf.split_to(end + 4);
                return String::from_utf8(response.to_vec()).unwrap();
            }
            let n = client.read_buf(buf).await.unwrap();
            assert!(n > 0, "connection closed during handshake");
        }
    }

    async fn read_frame(client: &mut DuplexStream, buf: &mut BytesMut) -> Frame {
        loop {
            if let Some(frame) =
                Frame::decode(buf, MaskPolicy::FromHeader, flare_protocol::MAX_PAYLOAD_SIZE)
                    .unwrap()
            {
                return frame;
            }
            let n = client.read_buf(buf).await.unwrap();
            assert!(n > 0, "connection closed while waiting for a frame");
        }
    }

    async fn send(client: &mut DuplexStream, message: &Message) {
        client
            .write_all(&message.encode_masked(MASK).unwrap())
            .await
            .unwrap();
    }

    type Opened = (
        DuplexStream,
        BytesMut,
        tokio::task::JoinHandle<Result<(), ServerError>>,
        broadcast::Sender<()>,
    );

    /// Starts a connection over an in-memory pipe and completes the handshake.
    async fn open(conn: Connection) -> Opened {
        open_with_capacity(conn, 64 * 1024).await
    }

    async fn open_with_capacity(conn: Connection, capacity: usize) -> Opened {
        let (mut client, server) = tokio::io::duplex(capacity);
        let (shutdown_tx, mut shutdown_rx) = broadcast::channel(1);
        let task = tokio::spawn(async move { conn.serve(server, addr(), &mut shutdown_rx).await });

        client
            .write_all(upgrade_request(Some(KEY)).as_bytes())
            .await
            .unwrap();
        let mut buf = BytesMut::new();
        let response = read_handshake(&mut client, &mut buf).await;
        assert!(response.contains("Sec-WebSocket-Accept: s3pPLMBiTxaQ9kYGzzhZRbK+xOo="));

        (client, buf, task, shutdown_tx)
    }

    #[tokio::test]
    async fn test_handshake_response_bytes() {
        let conn = connection(None, ConnectionSettings::default());
        let (mut client, server) = tokio::io::duplex(4096);
        let (_tx, mut rx) = broadcast::channel(1);
        let task = tokio::spawn(async move { conn.serve(server, addr(), &mut rx).await });

        client
            .write_all(upgrade_request(Some(KEY)).as_bytes())
            .await
            .unwrap();
        let mut buf = BytesMut::new();
        let response = read_handshake(&mut client, &mut buf).await;

        assert_eq!(
            response,
            "HTTP/1.1 101 Switching Protocols\r\n\
             Upgrade: websocket\r\n\
             Connection: Upgrade\r\n\
             Sec-WebSocket-Accept: s3pPLMBiTxaQ9kYGzzhZRbK+xOo=\r\n\
             \r\n"
        );

        drop(client);
        assert!(task.await.unwrap().is_ok());
    }

    #[tokio::test]
    async fn test_scripted_ping_session() {
        let pong = Message::Pong {
            payload: Bytes::from_static(b"hi"),
        };
        let ping = Message::Ping {
            payload: Bytes::from_static(b"hi"),
        };
        let response = HandshakeResponse::new(compute_accept_key(KEY)).encode();

        let mock = tokio_test::io::Builder::new()
            .read(upgrade_request(Some(KEY)).as_bytes())
            .write(&response)
            .read(&ping.encode_masked(MASK).unwrap())
            .write(&pong.encode().unwrap())
            .build();

        let conn = connection(None, ConnectionSettings::default());
        let (_tx, mut rx) = broadcast::channel(1);
        assert!(conn.serve(mock, addr(), &mut rx).await.is_ok());
    }

    #[tokio::test]
    async fn test_handshake_missing_key_uses_fallback() {
        let conn = connection(None, ConnectionSettings::default());
        let (mut client, server) = tokio::io::duplex(4096);
        let (_tx, mut rx) = broadcast::channel(1);
        let task = tokio::spawn(async move { conn.serve(server, addr(), &mut rx).await });

        client
            .write_all(upgrade_request(None).as_bytes())
            .await
            .unwrap();
        let mut buf = BytesMut::new();
        let response = read_handshake(&mut client, &mut buf).await;

        let expected = format!("Sec-WebSocket-Accept: {}\r\n", compute_accept_key(""));
        assert!(response.contains(&expected));

        drop(client);
        assert!(task.await.unwrap().is_ok());
    }

    #[tokio::test]
    async fn test_open_video_round_trip() {
        let conn = connection(Some(sample_info()), ConnectionSettings::default());
        let (mut client, mut buf, task, _tx) = open(conn).await;

        let request = FlareMessage::OpenVideo(OpenVideo::Unavailable).encode();
        send(&mut client, &Message::binary(request.freeze())).await;

        let frame = read_frame(&mut client, &mut buf).await;
        assert_eq!(frame.header.opcode(), Some(Opcode::Binary));
        assert!(!frame.header.masked);
        assert_eq!(frame.payload.len(), 35);

        let reply = FlareMessage::decode(&frame.payload).unwrap();
        assert_eq!(
            reply,
            FlareMessage::OpenVideo(OpenVideo::Available(sample_info()))
        );

        drop(client);
        assert!(task.await.unwrap().is_ok());
    }

    #[tokio::test]
    async fn test_ping_gets_pong_with_same_payload() {
        let conn = connection(None, ConnectionSettings::default());
        let (mut client, mut buf, task, _tx) = open(conn).await;

        send(
            &mut client,
            &Message::Ping {
                payload: Bytes::from_static(b"are you there"),
            },
        )
        .await;

        let frame = read_frame(&mut client, &mut buf).await;
        assert_eq!(frame.header.opcode(), Some(Opcode::Pong));
        assert_eq!(&frame.payload[..], b"are you there");

        drop(client);
        assert!(task.await.unwrap().is_ok());
    }

    #[tokio::test]
    async fn test_close_is_echoed() {
        let conn = connection(None, ConnectionSettings::default());
        let (mut client, mut buf, task, _tx) = open(conn).await;

        send(&mut client, &Message::close(1000, "bye")).await;

        let frame = read_frame(&mut client, &mut buf).await;
        assert_eq!(frame.header.opcode(), Some(Opcode::Close));
        assert_eq!(&frame.payload[..], &1000u16.to_be_bytes());

        assert!(task.await.unwrap().is_ok());
    }

    #[tokio::test]
    async fn test_unsupported_frame_does_not_end_connection() {
        let conn = connection(None, ConnectionSettings::default());
        let (mut client, mut buf, task, _tx) = open(conn).await;

        // Opcode 3 is reserved.
        client
            .write_all(&[0x83, 0x80 | 2, MASK[0], MASK[1], MASK[2], MASK[3], 0xAA, 0xBB])
            .await
            .unwrap();
        // Unknown Flare opcode inside a binary frame.
        send(&mut client, &Message::binary(vec![0, 0, 0, 6, 0x7f, 0])).await;
        send(
            &mut client,
            &Message::Ping {
                payload: Bytes::from_static(b"still here"),
            },
        )
        .await;

        let frame = read_frame(&mut client, &mut buf).await;
        assert_eq!(frame.header.opcode(), Some(Opcode::Pong));
        assert_eq!(&frame.payload[..], b"still here");

        drop(client);
        assert!(task.await.unwrap().is_ok());
    }

    #[tokio::test]
    async fn test_frame_too_large_closes_with_1009() {
        let settings = ConnectionSettings {
            max_payload: 16,
            ..ConnectionSettings::default()
        };
        let conn = connection(None, settings);
        let (mut client, mut buf, task, _tx) = open(conn).await;

        send(&mut client, &Message::binary(vec![0u8; 64])).await;

        let frame = read_frame(&mut client, &mut buf).await;
        assert_eq!(frame.header.opcode(), Some(Opcode::Close));
        assert_eq!(&frame.payload[..2], &CLOSE_TOO_BIG.to_be_bytes());

        let result = task.await.unwrap();
        assert!(matches!(
            result,
            Err(ServerError::Protocol(ProtocolError::FrameTooLarge { .. }))
        ));
    }

    #[tokio::test]
    async fn test_shutdown_signal_ends_connection() {
        let conn = connection(None, ConnectionSettings::default());
        let (mut client, mut buf, task, tx) = open(conn).await;

        tx.send(()).unwrap();

        let frame = read_frame(&mut client, &mut buf).await;
        assert_eq!(frame.header.opcode(), Some(Opcode::Close));
        assert!(matches!(
            task.await.unwrap(),
            Err(ServerError::ShuttingDown)
        ));
    }

    #[tokio::test]
    async fn test_read_timeout() {
        let settings = ConnectionSettings {
            read_timeout: Duration::from_millis(50),
            ..ConnectionSettings::default()
        };
        let conn = connection(None, settings);
        let (_client, _buf, task, _tx) = open(conn).await;

        assert!(matches!(
            task.await.unwrap(),
            Err(ServerError::Timeout("read"))
        ));
    }

    #[tokio::test]
    async fn test_handshake_timeout() {
        let settings = ConnectionSettings {
            handshake_timeout: Duration::from_millis(50),
            ..ConnectionSettings::default()
        };
        let conn = connection(None, settings);
        let (_client, server) = tokio::io::duplex(4096);
        let (_tx, mut rx) = broadcast::channel(1);

        let result = conn.serve(server, addr(), &mut rx).await;
        assert!(matches!(result, Err(ServerError::Timeout("handshake"))));
    }

    #[tokio::test]
    async fn test_handshake_deadline_covers_whole_request() {
        let settings = ConnectionSettings {
            handshake_timeout: Duration::from_millis(100),
            ..ConnectionSettings::default()
        };
        let conn = connection(None, settings);
        let (mut client, server) = tokio::io::duplex(4096);
        let (_tx, mut rx) = broadcast::channel(1);
        let task = tokio::spawn(async move { conn.serve(server, addr(), &mut rx).await });

        // Each byte arrives well inside the deadline, the request as a whole does not.
        let writer = tokio::spawn(async move {
            for byte in upgrade_request(Some(KEY)).into_bytes() {
                tokio::time::sleep(Duration::from_millis(40)).await;
                if client.write_all(&[byte]).await.is_err() {
                    break;
                }
            }
        });

        let result = task.await.unwrap();
        assert!(matches!(result, Err(ServerError::Timeout("handshake"))));
        writer.abort();
    }

    struct HangUpTask;

    impl TaskHandler for HangUpTask {
        fn handle(
            &self,
            _message: FlareMessage,
            _session: &mut Session,
        ) -> Result<Vec<Reply>, ServerError> {
            Ok(vec![Reply::Transport(Message::close(CLOSE_NORMAL, ""))])
        }
    }

    fn hang_up_task() -> Box<dyn TaskHandler> {
        Box::new(HangUpTask)
    }

    #[tokio::test]
    async fn test_transport_close_reply_ends_session() {
        let tasks = DispatchTable::<dyn TaskHandler>::builder()
            .register(FlareOpcode::OPEN_VIDEO, hang_up_task)
            .unwrap()
            .build();
        let conn = Connection::new(
            Arc::new(standard_frame_table().unwrap()),
            Arc::new(TaskTable::from_table(tasks)),
            Arc::new(StaticVideoSource::empty()),
            ConnectionSettings::default(),
        );
        let (mut client, mut buf, task, _tx) = open(conn).await;

        let request = FlareMessage::OpenVideo(OpenVideo::Unavailable).encode();
        send(&mut client, &Message::binary(request.freeze())).await;

        let frame = read_frame(&mut client, &mut buf).await;
        assert_eq!(frame.header.opcode(), Some(Opcode::Close));
        assert_eq!(&frame.payload[..], &CLOSE_NORMAL.to_be_bytes());

        assert!(task.await.unwrap().is_ok());
        assert!(buf.is_empty());
        assert_eq!(client.read_buf(&mut buf).await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_write_timeout() {
        let settings = ConnectionSettings {
            write_timeout: Duration::from_millis(50),
            ..ConnectionSettings::default()
        };
        let conn = connection(None, settings);
        let (mut client, _buf, task, _tx) = open_with_capacity(conn, 256).await;

        // The pongs overflow the pipe because the client never reads them.
        let writer = tokio::spawn(async move {
            for _ in 0..6 {
                let ping = Message::Ping {
                    payload: Bytes::from(vec![0x5a; 100]),
                };
                if client.write_all(&ping.encode_masked(MASK).unwrap()).await.is_err() {
                    break;
                }
            }
            client
        });

        let result = task.await.unwrap();
        assert!(matches!(result, Err(ServerError::Timeout("write"))));
        writer.abort();
    }
}
