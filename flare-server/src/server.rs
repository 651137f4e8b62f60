//! TCP server implementation.

use crate::config::Config;
use crate::connection::{Connection, ConnectionSettings};
use crate::error::ServerError;
use crate::handler::TaskTable;
use crate::video::{StaticVideoSource, VideoSource};
use flare_protocol::{standard_frame_table, MaskPolicy, VideoInfo};
use std::net::SocketAddr;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use tokio::net::TcpListener;
use tokio::sync::broadcast;

/// Server configuration.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// Address to bind to.
    pub bind_addr: SocketAddr,
    /// Maximum concurrent connections.
    pub max_connections: usize,
    /// Per-connection limits and deadlines.
    pub connection: ConnectionSettings,
    /// Video reported to OPEN_VIDEO requests.
    pub video: Option<VideoInfo>,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind_addr: SocketAddr::from(([127, 0, 0, 1], flare_protocol::DEFAULT_PORT)),
            max_connections: 1000,
            connection: ConnectionSettings::default(),
            video: None,
        }
    }
}

impl ServerConfig {
    pub fn new(bind_addr: SocketAddr) -> Self {
        Self {
            bind_addr,
            ..Default::default()
        }
    }

    /// Sets the connection cap.
    pub fn with_max_connections(mut self, max: usize) -> Self {
        self.max_connections = max;
        self
    }

    /// Sets the mask policy for inbound frames.
    pub fn with_mask_policy(mut self, policy: MaskPolicy) -> Self {
        self.connection.mask_policy = policy;
        self
    }

    /// Sets the video reported to clients.
    pub fn with_video(mut self, video: VideoInfo) -> Self {
        self.video = Some(video);
        self
    }
}

impl From<&Config> for ServerConfig {
    fn from(config: &Config) -> Self {
        Self {
            bind_addr: config.network.bind_addr,
            max_connections: config.network.max_connections,
            connection: ConnectionSettings {
                handshake_timeout: config.network.handshake_timeout(),
                read_timeout: config.network.read_timeout(),
                write_timeout: config.network.write_timeout(),
                mask_policy: config.protocol.mask_policy.into(),
                max_payload: config.protocol.max_payload(),
            },
            video: config.video.map(VideoInfo::from),
        }
    }
}

/// Server statistics.
#[derive(Debug, Default)]
pub struct ServerStats {
    pub connections_total: AtomicU64,
    pub connections_active: AtomicU64,
    pub connections_rejected: AtomicU64,
    pub errors_total: AtomicU64,
}

/// TCP server for flare.
pub struct Server {
    config: ServerConfig,
    connection: Connection,
    stats: Arc<ServerStats>,
    shutdown: broadcast::Sender<()>,
    running: AtomicBool,
}

impl Server {
    /// Creates a new server, building its dispatch tables.
    pub fn new(config: ServerConfig) -> Result<Self, ServerError> {
        let (shutdown_tx, _) = broadcast::channel(1);

        let frames = Arc::new(standard_frame_table()?);
        let tasks = Arc::new(TaskTable::standard()?);
        let video: Arc<dyn VideoSource> = Arc::new(StaticVideoSource::new(config.video));
        let connection = Connection::new(frames, tasks, video, config.connection);

        Ok(Self {
            config,
            connection,
            stats: Arc::new(ServerStats::default()),
            shutdown: shutdown_tx,
            running: AtomicBool::new(false),
        })
    }

    /// Replaces the video source used by new connections.
    pub fn with_video_source(mut self, video: Arc<dyn VideoSource>) -> Self {
        self.connection = self.connection.with_video_source(video);
        self
    }

    /// Binds the configured address and runs the server.
    pub async fn run(&self) -> Result<(), ServerError> {
        let listener = TcpListener::bind(self.config.bind_addr).await?;
        self.serve(listener).await
    }

    /// Runs the accept loop on an already bound listener.
    pub async fn serve(&self, listener: TcpListener) -> Result<(), ServerError> {
        let mut shutdown_rx = self.shutdown.subscribe();
        self.running.store(true, Ordering::SeqCst);
        tracing::info!("Server listening on {}", listener.local_addr()?);

        loop {
            tokio::select! {
                result = listener.accept() => {
                    match result {
                        Ok((tcp_stream, addr)) => {
                            if self.stats.connections_active.load(Ordering::Relaxed)
                                >= self.config.max_connections as u64
                            {
                                tracing::warn!("Connection limit reached, rejecting {}", addr);
                                self.stats.connections_rejected.fetch_add(1, Ordering::Relaxed);
                                continue;
                            }

                            self.stats.connections_total.fetch_add(1, Ordering::Relaxed);
                            self.stats.connections_active.fetch_add(1, Ordering::Relaxed);

                            if let Err(e) = tcp_stream.set_nodelay(true) {
                                tracing::debug!("[{}] Failed to set TCP_NODELAY: {}", addr, e);
                            }

                            let connection = self.connection.clone();
                            let stats = self.stats.clone();
                            let mut conn_shutdown = self.shutdown.subscribe();

                            tokio::spawn(async move {
                                tracing::info!("Client connected: {}", addr);

                                let result = connection.serve(tcp_stream, addr, &mut conn_shutdown).await;

                                if let Err(e) = result {
                                    tracing::debug!("Connection {} error: {}", addr, e);
                                    stats.errors_total.fetch_add(1, Ordering::Relaxed);
                                }

                                stats.connections_active.fetch_sub(1, Ordering::Relaxed);
                                tracing::info!("Client disconnected: {}", addr);
                            });
                        }
                        Err(e) => {
                            tracing::error!("Accept error: {}", e);
                        }
                    }
                }
                _ = shutdown_rx.recv() => {
                    tracing::info!("Server shutting down");
                    break;
                }
            }
        }

        self.running.store(false, Ordering::SeqCst);
        Ok(())
    }

    /// Initiates server shutdown.
    pub fn shutdown(&self) {
        let _ = self.shutdown.send(());
    }

    /// Returns whether the server is running.
    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }

    /// Returns server statistics.
    pub fn stats(&self) -> &ServerStats {
        &self.stats
    }

    pub fn config(&self) -> &ServerConfig {
        &self.config
    }
}
