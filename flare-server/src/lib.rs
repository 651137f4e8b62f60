//! # flare-server
//!
//! WebSocket server for the Flare protocol.
//!
//! This crate provides:
//! - TCP connection handling with async I/O
//! - The per-connection handshake and frame loop
//! - Session management
//! - Task handlers and the Flare task dispatch table
//! - YAML and environment configuration

pub mod config;
pub mod connection;
pub mod error;
pub mod handler;
pub mod server;
pub mod session;
pub mod video;

pub use config::{Config, ConfigError, MaskPolicyConfig, NetworkConfig, ProtocolConfig, VideoConfig};
pub use connection::{Connection, ConnectionSettings};
pub use error::ServerError;
pub use handler::{OpenVideoTask, Reply, TaskHandler, TaskTable};
pub use server::{Server, ServerConfig, ServerStats};
pub use session::{Session, SessionState};
pub use video::{StaticVideoSource, VideoSource};
