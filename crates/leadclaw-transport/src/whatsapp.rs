//! WhatsApp Business Cloud API transport.
//!
//! Uses the official WhatsApp Business Platform (Cloud API) for all outbound
//! channels. Requires: Access Token + Phone Number ID from Meta Business
//! Suite. Media steps send by link; the Cloud API fetches the URL itself.

use async_trait::async_trait;
use serde_json::json;

use leadclaw_core::config::WhatsAppConfig;
use leadclaw_core::error::{LeadClawError, Result};
use leadclaw_core::traits::Transport;

const GRAPH_BASE: &str = "https://graph.facebook.com/v21.0";

/// WhatsApp Cloud API transport implementation.
pub struct WhatsAppTransport {
    config: WhatsAppConfig,
    client: reqwest::Client,
    connected: std::sync::atomic::AtomicBool,
}

impl WhatsAppTransport {
    pub fn new(config: WhatsAppConfig) -> Self {
        Self {
            config,
            client: reqwest::Client::new(),
            connected: std::sync::atomic::AtomicBool::new(false),
        }
    }

    /// Verify credentials against the Graph API. Failure is not fatal for
    /// the engine — dispatches will just fail per step until fixed.
    pub async fn connect(&self) -> Result<()> {
        if self.config.access_token.is_empty() {
            return Err(LeadClawError::Config(
                "WhatsApp access_token not configured".into(),
            ));
        }
        if self.config.phone_number_id.is_empty() {
            return Err(LeadClawError::Config(
                "WhatsApp phone_number_id not configured".into(),
            ));
        }

        let url = format!("{GRAPH_BASE}/{}", self.config.phone_number_id);
        let response = self
            .client
            .get(&url)
            .header(
                "Authorization",
                format!("Bearer {}", self.config.access_token),
            )
            .send()
            .await
            .map_err(|e| LeadClawError::Transport(format!("WhatsApp verification failed: {e}")))?;

        if response.status().is_success() {
            self.connected
                .store(true, std::sync::atomic::Ordering::Relaxed);
            tracing::info!(
                "WhatsApp Cloud API: connected (phone_id={})",
                self.config.phone_number_id
            );
            Ok(())
        } else {
            let text = response.text().await.unwrap_or_default();
            Err(LeadClawError::Transport(format!(
                "WhatsApp token verification failed: {text}"
            )))
        }
    }

    /// POST one message payload to the Cloud API.
    async fn post_message(&self, to: &str, payload: serde_json::Value) -> Result<()> {
        let url = format!("{GRAPH_BASE}/{}/messages", self.config.phone_number_id);

        let mut body = payload;
        body["messaging_product"] = json!("whatsapp");
        body["recipient_type"] = json!("individual");
        body["to"] = json!(to);

        let response = self
            .client
            .post(&url)
            .header(
                "Authorization",
                format!("Bearer {}", self.config.access_token),
            )
            .header("Content-Type", "application/json")
            .json(&body)
            .send()
            .await
            .map_err(|e| LeadClawError::Dispatch(format!("WhatsApp API request failed: {e}")))?;

        if !response.status().is_success() {
            let status = response.status();
            let error_text = response.text().await.unwrap_or_default();
            return Err(LeadClawError::Dispatch(format!(
                "WhatsApp API error {status}: {error_text}"
            )));
        }

        let result: serde_json::Value = response
            .json()
            .await
            .map_err(|e| LeadClawError::Dispatch(format!("Invalid WhatsApp response: {e}")))?;
        let msg_id = result["messages"][0]["id"].as_str().unwrap_or("unknown");
        tracing::debug!("WhatsApp message sent: {} → {}", msg_id, to);
        Ok(())
    }
}

#[async_trait]
impl Transport for WhatsAppTransport {
    fn name(&self) -> &str {
        "whatsapp"
    }

    async fn send_text(&self, phone: &str, text: &str) -> Result<()> {
        self.post_message(
            phone,
            json!({
                "type": "text",
                "text": { "preview_url": false, "body": text }
            }),
        )
        .await
    }

    async fn send_image(&self, phone: &str, url: &str, caption: Option<&str>) -> Result<()> {
        self.post_message(
            phone,
            json!({
                "type": "image",
                "image": { "link": url, "caption": caption.unwrap_or("") }
            }),
        )
        .await
    }

    async fn send_voice_note(&self, phone: &str, url: &str, ptt: bool) -> Result<()> {
        // The Cloud API renders OGG/Opus audio as a voice note; other codecs
        // show as a plain attachment. The ptt flag only picks the log label.
        let label = if ptt { "voice note" } else { "audio" };
        tracing::debug!("WhatsApp {} → {}", label, phone);
        self.post_message(
            phone,
            json!({
                "type": "audio",
                "audio": { "link": url }
            }),
        )
        .await
    }

    async fn send_video(&self, phone: &str, url: &str, caption: Option<&str>) -> Result<()> {
        self.post_message(
            phone,
            json!({
                "type": "video",
                "video": { "link": url, "caption": caption.unwrap_or("") }
            }),
        )
        .await
    }

    async fn send_video_note(&self, phone: &str, url: &str, seconds: Option<u32>) -> Result<()> {
        // No dedicated PTV message type in the Cloud API — sent as a plain
        // video. The duration hint is trimming metadata for the uploader.
        if let Some(s) = seconds {
            tracing::debug!("WhatsApp video note ({s}s) → {phone}");
        }
        self.post_message(
            phone,
            json!({
                "type": "video",
                "video": { "link": url }
            }),
        )
        .await
    }

    fn is_connected(&self) -> bool {
        self.connected.load(std::sync::atomic::Ordering::Relaxed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_connect_requires_credentials() {
        let t = WhatsAppTransport::new(WhatsAppConfig::default());
        let err = t.connect().await.unwrap_err();
        assert!(matches!(err, LeadClawError::Config(_)));
        assert!(!t.is_connected());
    }
}
