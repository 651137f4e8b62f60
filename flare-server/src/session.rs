//! Session management.

use crate::video::VideoSource;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::{Duration, Instant};
use uuid::Uuid;

/// Session state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    /// Waiting for the upgrade request.
    Handshaking,
    /// Upgrade done, exchanging frames.
    Open,
    /// A Close frame was sent or received.
    Closing,
}

/// Per-connection context handed to task handlers.
pub struct Session {
    /// Unique session ID.
    pub id: String,

    /// Remote address.
    pub remote_addr: SocketAddr,

    state: SessionState,

    video: Arc<dyn VideoSource>,

    /// Frames decoded from the peer.
    frames_in: u64,

    /// Frames consumed but not turned into a message.
    frames_rejected: u64,

    /// Flare messages routed to a task handler.
    messages_dispatched: u64,

    created_at: Instant,

    last_activity: Instant,
}

impl Session {
    /// Creates a new session.
    pub fn new(remote_addr: SocketAddr, video: Arc<dyn VideoSource>) -> Self {
        let now = Instant::now();
        Self {
            id: Uuid::new_v4().to_string(),
            remote_addr,
            state: SessionState::Handshaking,
            video,
            frames_in: 0,
            frames_rejected: 0,
            messages_dispatched: 0,
            created_at: now,
            last_activity: now,
        }
    }

    /// Returns the session state.
    pub fn state(&self) -> SessionState {
        self.state
    }

    /// Sets the session state.
    pub fn set_state(&mut self, state: SessionState) {
        self.state = state;
    }

    /// Returns whether the session is exchanging frames.
    pub fn is_open(&self) -> bool {
        self.state == SessionState::Open
    }

    /// Returns the video source.
    pub fn video(&self) -> &dyn VideoSource {
        self.video.as_ref()
    }

    /// Records a frame that decoded into a message.
    pub fn record_frame(&mut self) {
        self.frames_in += 1;
        self.last_activity = Instant::now();
    }

    /// Records a frame that was consumed and then rejected.
    pub fn record_rejected_frame(&mut self) {
        self.frames_rejected += 1;
        self.last_activity = Instant::now();
    }

    /// Records a dispatched message.
    pub fn record_dispatch(&mut self) {
        self.messages_dispatched += 1;
    }

    pub fn frames_in(&self) -> u64 {
        self.frames_in
    }

    pub fn frames_rejected(&self) -> u64 {
        self.frames_rejected
    }

    pub fn messages_dispatched(&self) -> u64 {
        self.messages_dispatched
    }

    /// Returns the time since last activity.
    pub fn idle_duration(&self) -> Duration {
        self.last_activity.elapsed()
    }

    /// Returns the session age.
    pub fn age(&self) -> Duration {
        self.created_at.elapsed()
    }
}

impl std::fmt::Debug for Session {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Session")
            .field("id", &self.id)
            .field("remote_addr", &self.remote_addr)
            .field("state", &self.state)
            .field("frames_in", &self.frames_in)
            .field("frames_rejected", &self.frames_rejected)
            .field("messages_dispatched", &self.messages_dispatched)
            .finish()
    }
}
