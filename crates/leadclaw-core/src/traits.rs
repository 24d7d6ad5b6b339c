//! The outbound messaging transport seam.
//!
//! The transport's connection/session management lives behind this trait;
//! the dispatch engine only ever sees the five send operations. Tests swap
//! in recording fakes.

use async_trait::async_trait;

use crate::error::Result;

/// Channel-agnostic outbound messaging transport.
///
/// `phone` is always canonical digits (see [`crate::phone`]). The transport
/// is a shared process-wide resource and must tolerate concurrent sends.
#[async_trait]
pub trait Transport: Send + Sync {
    fn name(&self) -> &str;

    /// Send a plain text message.
    async fn send_text(&self, phone: &str, text: &str) -> Result<()>;

    /// Send an image by URL with an optional caption.
    async fn send_image(&self, phone: &str, url: &str, caption: Option<&str>) -> Result<()>;

    /// Send audio by URL; `ptt` selects voice-note (push-to-talk) semantics.
    async fn send_voice_note(&self, phone: &str, url: &str, ptt: bool) -> Result<()>;

    /// Send a video by URL with an optional caption.
    async fn send_video(&self, phone: &str, url: &str, caption: Option<&str>) -> Result<()>;

    /// Send a short circular video clip; `seconds` is a trim/metadata hint.
    async fn send_video_note(&self, phone: &str, url: &str, seconds: Option<u32>) -> Result<()>;

    /// Connection status, used by surrounding code only.
    fn is_connected(&self) -> bool {
        true
    }
}
