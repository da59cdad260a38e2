use crate::geometry::Size;
use crate::inference::Frame;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PlaybackState {
    Playing,
    Paused,
    Ended,
}

/// A live video feed owned by someone else.
///
/// Display size is the on-screen layout box the overlay must cover; native
/// size is the resolution frames are captured at. The two differ in general.
pub trait VideoSource: Send + Sync {
    fn display_size(&self) -> Size;
    fn native_size(&self) -> Size;
    fn playback_state(&self) -> PlaybackState;
    /// Most recent frame at native resolution.
    fn current_frame(&self) -> Option<Frame>;
}
