//! LeadClaw configuration system.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use crate::error::Result;

/// Root configuration.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct LeadClawConfig {
    #[serde(default)]
    pub whatsapp: WhatsAppConfig,
    #[serde(default)]
    pub gateway: GatewayConfig,
    #[serde(default)]
    pub store: StoreConfig,
    #[serde(default)]
    pub lifecycle: LifecycleConfig,
    #[serde(default)]
    pub dispatch: DispatchConfig,
}

impl LeadClawConfig {
    /// Load config from the default path (~/.leadclaw/config.toml),
    /// or `LEADCLAW_CONFIG` if set.
    pub fn load() -> Result<Self> {
        let path = Self::config_path();
        if path.exists() {
            Self::load_from(&path)
        } else {
            Ok(Self::default())
        }
    }

    /// Load config from a specific path.
    pub fn load_from(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path).map_err(|e| {
            crate::error::LeadClawError::Config(format!("Failed to read config: {e}"))
        })?;
        let config: Self = toml::from_str(&content).map_err(|e| {
            crate::error::LeadClawError::Config(format!("Failed to parse config: {e}"))
        })?;
        Ok(config)
    }

    /// Save config to the default path.
    pub fn save(&self) -> Result<()> {
        let path = Self::config_path();
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let content = toml::to_string_pretty(self).map_err(|e| {
            crate::error::LeadClawError::Config(format!("Failed to serialize config: {e}"))
        })?;
        std::fs::write(&path, content)?;
        Ok(())
    }

    /// Resolve the config path: `LEADCLAW_CONFIG` env var or the default.
    pub fn config_path() -> PathBuf {
        std::env::var("LEADCLAW_CONFIG")
            .map(PathBuf::from)
            .unwrap_or_else(|_| Self::home_dir().join("config.toml"))
    }

    /// Get the LeadClaw home directory (~/.leadclaw).
    pub fn home_dir() -> PathBuf {
        dirs::home_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join(".leadclaw")
    }
}

/// WhatsApp Business Cloud API credentials.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct WhatsAppConfig {
    /// Facebook Graph API access token.
    #[serde(default)]
    pub access_token: String,
    /// WhatsApp Phone Number ID.
    #[serde(default)]
    pub phone_number_id: String,
}

/// HTTP gateway binding.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GatewayConfig {
    #[serde(default = "default_host")]
    pub host: String,
    #[serde(default = "default_port")]
    pub port: u16,
}

fn default_host() -> String {
    "127.0.0.1".into()
}
fn default_port() -> u16 {
    8787
}

impl Default for GatewayConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
        }
    }
}

/// Document store location.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StoreConfig {
    /// SQLite database path. Empty = ~/.leadclaw/leadclaw.db
    #[serde(default)]
    pub db_path: String,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            db_path: String::new(),
        }
    }
}

impl StoreConfig {
    pub fn resolved_path(&self) -> PathBuf {
        if self.db_path.is_empty() {
            LeadClawConfig::home_dir().join("leadclaw.db")
        } else {
            PathBuf::from(&self.db_path)
        }
    }
}

/// Named-sequence registry: which sequence each lifecycle event starts,
/// and the scheduling offset for the web-link-sent event.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LifecycleConfig {
    /// Sequence started after the sample site link is sent.
    #[serde(default = "default_web_sent_sequence")]
    pub web_sent_sequence: String,
    /// Sequence started the moment the tracking link is opened.
    #[serde(default = "default_link_opened_sequence")]
    pub link_opened_sequence: String,
    /// Minutes between the link-sent event and the start of its sequence.
    /// Gives the lead time to open the link before the nudges begin.
    #[serde(default = "default_web_sent_delay")]
    pub web_sent_delay_mins: i64,
}

fn default_web_sent_sequence() -> String {
    "WebEnviada".into()
}
fn default_link_opened_sequence() -> String {
    "LinkAbierto".into()
}
fn default_web_sent_delay() -> i64 {
    15
}

impl Default for LifecycleConfig {
    fn default() -> Self {
        Self {
            web_sent_sequence: default_web_sent_sequence(),
            link_opened_sequence: default_link_opened_sequence(),
            web_sent_delay_mins: default_web_sent_delay(),
        }
    }
}

/// Dispatch queue sizing.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DispatchConfig {
    /// Worker tasks draining the dispatch queue.
    #[serde(default = "default_workers")]
    pub workers: usize,
    /// Bounded queue capacity — backpressure for due steps.
    #[serde(default = "default_queue_capacity")]
    pub queue_capacity: usize,
}

fn default_workers() -> usize {
    4
}
fn default_queue_capacity() -> usize {
    256
}

impl Default for DispatchConfig {
    fn default() -> Self {
        Self {
            workers: default_workers(),
            queue_capacity: default_queue_capacity(),
        }
    }
}
