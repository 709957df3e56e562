//! Configuration management for Chatlink

use crate::error::{Error, Result};
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub server: ServerConfig,
    pub identity: IdentityConfig,
    pub call: CallConfig,
    pub notifications: NotificationConfig,
    pub ui: UiConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
    pub use_tls: bool,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct IdentityConfig {
    pub user_id: String,
    pub display_name: String,
    /// Bearer token issued by the external auth service.
    pub token: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CallConfig {
    /// Seconds an outgoing call may ring unanswered; 0 disables the timeout.
    pub ring_timeout_secs: u64,
    pub ice_servers: Vec<String>,
    pub allow_audio: bool,
    pub allow_video: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct NotificationConfig {
    pub enabled: bool,
    pub sound: bool,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct UiConfig {
    /// Small viewport: opening a conversation hides the conversation list.
    pub compact: bool,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "localhost".to_string(),
            port: 5000,
            use_tls: false,
        }
    }
}

impl Default for CallConfig {
    fn default() -> Self {
        Self {
            ring_timeout_secs: 45,
            ice_servers: vec!["stun:stun.l.google.com:19302".to_string()],
            allow_audio: true,
            allow_video: true,
        }
    }
}

impl CallConfig {
    pub fn ring_timeout(&self) -> Option<Duration> {
        match self.ring_timeout_secs {
            0 => None,
            secs => Some(Duration::from_secs(secs)),
        }
    }
}

impl Default for NotificationConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            sound: true,
        }
    }
}

impl AppConfig {
    pub fn load(data_dir: &Path) -> Result<Self> {
        let config_path = data_dir.join("config.json");

        if config_path.exists() {
            let content = std::fs::read_to_string(&config_path)?;
            let config: Self = serde_json::from_str(&content)?;
            Ok(config)
        } else {
            Ok(Self::default())
        }
    }

    pub fn save(&self, data_dir: &Path) -> Result<()> {
        let config_path = data_dir.join("config.json");
        let content = serde_json::to_string_pretty(self)?;
        std::fs::write(&config_path, content)?;
        Ok(())
    }

    pub fn validate(&self) -> Result<()> {
        if self.identity.user_id.is_empty() {
            return Err(Error::Config("identity.user_id is required".to_string()));
        }
        if self.identity.user_id.contains('_') {
            return Err(Error::Config(
                "identity.user_id must not contain '_'".to_string(),
            ));
        }
        if self.server.host.is_empty() {
            return Err(Error::Config("server.host is required".to_string()));
        }
        Ok(())
    }

    pub fn http_url(&self) -> String {
        let scheme = if self.server.use_tls { "https" } else { "http" };
        format!("{}://{}:{}", scheme, self.server.host, self.server.port)
    }

    pub fn ws_url(&self) -> String {
        let scheme = if self.server.use_tls { "wss" } else { "ws" };
        format!("{}://{}:{}/ws", scheme, self.server.host, self.server.port)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_partial_config_uses_defaults() {
        let config: AppConfig =
            serde_json::from_str(r#"{"identity": {"user_id": "u1"}, "call": {"ring_timeout_secs": 0}}"#)
                .unwrap();
        assert_eq!(config.identity.user_id, "u1");
        assert_eq!(config.server.port, 5000);
        assert!(config.call.allow_video);
        assert_eq!(config.call.ring_timeout(), None);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_urls() {
        let mut config = AppConfig::default();
        config.server.host = "chat.example.org".into();
        config.server.port = 443;
        config.server.use_tls = true;
        assert_eq!(config.http_url(), "https://chat.example.org:443");
        assert_eq!(config.ws_url(), "wss://chat.example.org:443/ws");
    }

    #[test]
    fn test_validate_rejects_missing_user() {
        let config = AppConfig::default();
        assert!(matches!(config.validate(), Err(Error::Config(_))));
    }

    #[test]
    fn test_save_and_load() {
        let dir = std::env::temp_dir().join(format!("chatlink-config-{}", uuid::Uuid::new_v4()));
        std::fs::create_dir_all(&dir).unwrap();

        let mut config = AppConfig::default();
        config.identity.user_id = "u7".into();
        config.call.ring_timeout_secs = 30;
        config.save(&dir).unwrap();

        let loaded = AppConfig::load(&dir).unwrap();
        assert_eq!(loaded.identity.user_id, "u7");
        assert_eq!(loaded.call.ring_timeout(), Some(Duration::from_secs(30)));

        std::fs::remove_dir_all(&dir).ok();
    }
}
