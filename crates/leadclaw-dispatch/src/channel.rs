//! Channel Dispatcher — one step, one recipient, one outbound message.

use std::sync::Arc;

use leadclaw_core::error::{LeadClawError, Result};
use leadclaw_core::traits::Transport;
use leadclaw_core::types::{Step, StepKind};

/// Routes a step to the matching transport operation.
///
/// Exactly one outbound message per invocation; no retries here — retry
/// policy (there is none, by contract) belongs to the runner layer.
pub struct ChannelDispatcher {
    transport: Arc<dyn Transport>,
}

impl ChannelDispatcher {
    pub fn new(transport: Arc<dyn Transport>) -> Self {
        Self { transport }
    }

    /// Perform the channel-specific send for one step.
    pub async fn dispatch(&self, phone: &str, step: &Step) -> Result<()> {
        match step.kind {
            StepKind::Text | StepKind::FormText => {
                self.transport.send_text(phone, &step.content).await
            }
            StepKind::Image => {
                self.transport
                    .send_image(phone, &step.content, step.caption.as_deref())
                    .await
            }
            StepKind::Audio => {
                self.transport
                    .send_voice_note(phone, &step.content, step.ptt)
                    .await
            }
            StepKind::Video => {
                self.transport
                    .send_video(phone, &step.content, step.caption.as_deref())
                    .await
            }
            StepKind::VideoNote => {
                self.transport
                    .send_video_note(phone, &step.content, step.seconds)
                    .await
            }
            StepKind::Unknown => Err(LeadClawError::Dispatch(
                "unsupported step type".into(),
            )),
        }
    }
}
