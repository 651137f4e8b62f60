//! Video metadata sources.

use flare_protocol::VideoInfo;

/// Supplies the video a session may open.
pub trait VideoSource: Send + Sync {
    /// Returns the current video, or `None` when nothing can be opened.
    fn current(&self) -> Option<VideoInfo>;
}

/// A source that always reports the same video (or none).
#[derive(Debug, Clone, Copy, Default)]
pub struct StaticVideoSource {
    info: Option<VideoInfo>,
}

impl StaticVideoSource {
    pub fn new(info: Option<VideoInfo>) -> Self {
        Self { info }
    }

    /// A source with no video.
    pub fn empty() -> Self {
        Self { info: None }
    }
}

impl VideoSource for StaticVideoSource {
    fn current(&self) -> Option<VideoInfo> {
        self.info
    }
}
