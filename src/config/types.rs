// Copyright 2026 The Parapet Project
// SPDX-License-Identifier: Apache-2.0

use std::fmt;
use std::time::Duration;

use crate::stream::StreamSettings;

/// Parsed and validated gateway config.
#[derive(Debug, Clone)]
pub struct Config {
    /// Schema version. Always "v1".
    pub version: String,
    /// Environment label (e.g. "staging", "production").
    pub environment: String,
    pub upstream: UpstreamConfig,
    /// Login for the shared-default credential. `None` disables that path.
    pub credentials: Option<Credentials>,
    /// Bearer value that selects the shared-default credential.
    pub shared_sentinel: String,
    /// Model identifiers advertised on `/v1/models` and accepted on requests.
    pub models: Vec<String>,
    pub variants: VariantConfig,
    pub sessions: SessionConfig,
    pub commands: CommandConfig,
    pub stream: StreamSettings,
    /// SHA256 of the raw YAML: "sha256:{hex}".
    pub config_hash: String,
}

impl Config {
    pub fn supports_model(&self, model: &str) -> bool {
        self.models.iter().any(|m| m == model)
    }
}

/// Upstream endpoints and client-side timeouts.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UpstreamConfig {
    /// Base URL without a trailing slash.
    pub base_url: String,
    pub login_path: String,
    pub conversation_path: String,
    pub generate_path: String,
    pub login_timeout: Duration,
    pub conversation_timeout: Duration,
}

impl UpstreamConfig {
    pub fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }
}

/// Shared-default login. The password never appears in `Debug` output.
#[derive(Clone, PartialEq, Eq)]
pub struct Credentials {
    pub username: String,
    pub password: String,
}

impl fmt::Debug for Credentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credentials")
            .field("username", &self.username)
            .field("password", &"<redacted>")
            .finish()
    }
}

/// Maps model-name suffixes to upstream assistant variants.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VariantConfig {
    pub default: u32,
    /// Sorted longest suffix first.
    pub suffixes: Vec<(String, u32)>,
}

impl VariantConfig {
    pub fn new(default: u32, suffixes: impl IntoIterator<Item = (String, u32)>) -> Self {
        let mut suffixes: Vec<(String, u32)> = suffixes.into_iter().collect();
        suffixes.sort_by(|a, b| b.0.len().cmp(&a.0.len()).then_with(|| a.0.cmp(&b.0)));
        Self { default, suffixes }
    }

    /// The variant for `model`: its longest configured suffix, else the default.
    pub fn select(&self, model: &str) -> u32 {
        self.suffixes
            .iter()
            .find(|(suffix, _)| model.ends_with(suffix.as_str()))
            .map(|(_, variant)| *variant)
            .unwrap_or(self.default)
    }
}

impl Default for VariantConfig {
    fn default() -> Self {
        Self::new(1, Vec::new())
    }
}

/// Session and token store lifetimes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionConfig {
    /// Sliding inactivity window for conversation bindings.
    pub session_ttl: Duration,
    /// Absolute lifetime of the shared token.
    pub token_ttl: Duration,
    pub sweep_interval: Duration,
    /// Conversation title used when the user message gives none.
    pub default_title: String,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            session_ttl: Duration::from_secs(2 * 60 * 60),
            token_ttl: Duration::from_secs(24 * 60 * 60),
            sweep_interval: Duration::from_secs(60),
            default_title: "New chat".to_string(),
        }
    }
}

/// In-band command vocabularies, matched against the latest user message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommandConfig {
    /// Exact match.
    pub reset: Vec<String>,
    /// Case-insensitive match.
    pub relogin: Vec<String>,
}

impl CommandConfig {
    pub fn is_reset(&self, text: &str) -> bool {
        let text = text.trim();
        self.reset.iter().any(|c| c == text)
    }

    pub fn is_relogin(&self, text: &str) -> bool {
        let text = text.trim().to_lowercase();
        self.relogin.iter().any(|c| c.to_lowercase() == text)
    }
}

impl Default for CommandConfig {
    fn default() -> Self {
        Self {
            reset: vec!["重置".to_string(), "reset".to_string(), "/reset".to_string()],
            relogin: vec![
                "relogin".to_string(),
                "/relogin".to_string(),
                "重新登录".to_string(),
            ],
        }
    }
}
