//! Step, lead, and result data model.
//!
//! The wire format for steps matches the campaign frontend: `type` carries
//! the Spanish channel tags (`texto`, `imagen`, ...) with English aliases
//! accepted on input. An unrecognized tag deserializes to `StepKind::Unknown`
//! so it can be reported as a dispatch failure instead of being dropped.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Channel type of a single outreach step.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum StepKind {
    /// Plain text message.
    #[serde(rename = "texto", alias = "text")]
    Text,
    /// Image with optional caption.
    #[serde(rename = "imagen", alias = "image")]
    Image,
    /// Audio clip, sent as a voice note when `ptt` is set.
    #[serde(rename = "audio")]
    Audio,
    /// Video with optional caption.
    #[serde(rename = "video")]
    Video,
    /// Short circular video clip (PTV).
    #[serde(rename = "videonota", alias = "video-note")]
    VideoNote,
    /// Form link sent as literal text.
    #[serde(rename = "formulario", alias = "form-text")]
    FormText,
    /// Anything the engine does not recognize. Fails at dispatch time.
    #[serde(other, rename = "unknown")]
    Unknown,
}

impl std::fmt::Display for StepKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            StepKind::Text => "texto",
            StepKind::Image => "imagen",
            StepKind::Audio => "audio",
            StepKind::Video => "video",
            StepKind::VideoNote => "videonota",
            StepKind::FormText => "formulario",
            StepKind::Unknown => "unknown",
        };
        write!(f, "{s}")
    }
}

/// One message unit in a sequence: channel type + content + relative delay.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Step {
    #[serde(rename = "type")]
    pub kind: StepKind,
    /// Literal text, or a media URL for image/audio/video kinds.
    #[serde(rename = "contenido", alias = "content")]
    pub content: String,
    /// Optional caption for image/video.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub caption: Option<String>,
    /// Duration hint in seconds for video notes.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub seconds: Option<u32>,
    /// Push-to-talk flag for audio steps (voice note vs. plain attachment).
    #[serde(default = "bool_true")]
    pub ptt: bool,
    /// Delay in minutes, accumulated from the start of the run.
    /// Applied AFTER this step: it pushes back the steps that follow.
    #[serde(default)]
    pub delay: i64,
}

fn bool_true() -> bool {
    true
}

impl Step {
    /// Text step shorthand, used by the lifecycle follow-up messages.
    pub fn text(content: impl Into<String>) -> Self {
        Self {
            kind: StepKind::Text,
            content: content.into(),
            caption: None,
            seconds: None,
            ptt: true,
            delay: 0,
        }
    }
}

/// One planned firing: absolute fire time for one step of one run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PlanEntry {
    pub step_index: usize,
    pub fire_at: DateTime<Utc>,
    pub step: Step,
}

/// Lifecycle stage of a lead — forward-only state machine.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LeadStage {
    New,
    FormSubmitted,
    WebLinkSent,
    LinkOpened,
}

impl LeadStage {
    /// Position in the lifecycle; transitions only move forward.
    pub fn rank(&self) -> u8 {
        match self {
            LeadStage::New => 0,
            LeadStage::FormSubmitted => 1,
            LeadStage::WebLinkSent => 2,
            LeadStage::LinkOpened => 3,
        }
    }
}

impl Default for LeadStage {
    fn default() -> Self {
        LeadStage::New
    }
}

/// A lead (recipient) record. Identity is the canonical phone digits.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Lead {
    /// Canonical phone digits (no `+`), also the document id.
    pub id: String,
    /// E.164 phone including `+`.
    pub phone: String,
    #[serde(default)]
    pub name: String,
    /// Public site slug, used by link tracking to resolve the lead.
    #[serde(default)]
    pub slug: String,
    #[serde(default)]
    pub stage: LeadStage,
    /// Free-form lifecycle tags; upserts merge with set-union semantics.
    #[serde(default)]
    pub tags: Vec<String>,
    pub created_at: DateTime<Utc>,
    #[serde(default)]
    pub last_message_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub web_link_sent_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub link_opened_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub unread_count: u32,
}

impl Lead {
    pub fn has_tag(&self, tag: &str) -> bool {
        self.tags.iter().any(|t| t == tag)
    }
}

/// Scheduling outcome for one recipient in a batch.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RecipientResult {
    pub phone: String,
    pub success: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

/// Aggregate result of fanning a sequence out over a recipient list.
///
/// Reports *scheduling* success: the batch call returns before most steps
/// fire, so delivery outcomes are only visible in the schedule table and logs.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BatchResult {
    pub total: usize,
    pub success: usize,
    pub failed: usize,
    pub results: Vec<RecipientResult>,
}

impl BatchResult {
    pub fn from_results(results: Vec<RecipientResult>) -> Self {
        let success = results.iter().filter(|r| r.success).count();
        Self {
            total: results.len(),
            success,
            failed: results.len() - success,
            results,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_step_wire_format() {
        let json = r#"{"type":"imagen","contenido":"https://cdn.example/a.png","caption":"hola","delay":5}"#;
        let step: Step = serde_json::from_str(json).unwrap();
        assert_eq!(step.kind, StepKind::Image);
        assert_eq!(step.content, "https://cdn.example/a.png");
        assert_eq!(step.caption.as_deref(), Some("hola"));
        assert_eq!(step.delay, 5);
        assert!(step.ptt);
    }

    #[test]
    fn test_step_english_aliases() {
        let step: Step =
            serde_json::from_str(r#"{"type":"text","content":"hi"}"#).unwrap();
        assert_eq!(step.kind, StepKind::Text);
        assert_eq!(step.content, "hi");
        assert_eq!(step.delay, 0);
    }

    #[test]
    fn test_unknown_kind_is_preserved() {
        // Unrecognized channel tags must survive parsing so the dispatcher
        // can report them as failures instead of dropping the step.
        let step: Step =
            serde_json::from_str(r#"{"type":"hologram","contenido":"x"}"#).unwrap();
        assert_eq!(step.kind, StepKind::Unknown);
    }

    #[test]
    fn test_batch_result_counts() {
        let results = vec![
            RecipientResult { phone: "5215511111111".into(), success: true, error: None },
            RecipientResult {
                phone: "bad".into(),
                success: false,
                error: Some("invalid phone".into()),
            },
        ];
        let batch = BatchResult::from_results(results);
        assert_eq!(batch.total, 2);
        assert_eq!(batch.success, 1);
        assert_eq!(batch.failed, 1);
    }

    #[test]
    fn test_stage_rank_ordering() {
        assert!(LeadStage::LinkOpened.rank() > LeadStage::WebLinkSent.rank());
        assert!(LeadStage::WebLinkSent.rank() > LeadStage::FormSubmitted.rank());
        assert!(LeadStage::FormSubmitted.rank() > LeadStage::New.rank());
    }
}
