// Copyright 2026 The Parapet Project
// SPDX-License-Identifier: Apache-2.0

use std::time::Duration;

use sha2::{Digest, Sha256};

use crate::stream::{StreamSettings, UpstreamErrorPolicy, DEFAULT_ARGUMENT_CHUNK_CHARS};

use super::error::ConfigError;
use super::interpolation::resolve_variables;
use super::raw;
use super::source::ConfigSource;
use super::types::*;

const DEFAULT_LOGIN_PATH: &str = "/api/user/login";
const DEFAULT_CONVERSATION_PATH: &str = "/api/conversation";
const DEFAULT_GENERATE_PATH: &str = "/api/chat/completions";
const DEFAULT_LOGIN_TIMEOUT_MS: u64 = 10_000;
const DEFAULT_CONVERSATION_TIMEOUT_MS: u64 = 15_000;
const DEFAULT_SHARED_SENTINEL: &str = "default";

/// Load and validate a gateway config from the given source.
///
/// Steps:
/// 1. Read raw YAML from source
/// 2. Compute SHA256 config hash
/// 3. Parse YAML into raw deserialization types
/// 4. Validate version and values
/// 5. Resolve `${VAR}` interpolation in URL, credential and sentinel fields
/// 6. Fill defaults and build the typed Config
pub fn load_config(source: &dyn ConfigSource) -> Result<Config, ConfigError> {
    let raw_yaml = source.load()?;
    let config_hash = compute_hash(&raw_yaml);

    let raw: raw::RawConfig = serde_yaml::from_str(&raw_yaml)?;

    if raw.chatrelay != "v1" {
        return Err(ConfigError::Validation(format!(
            "unsupported config version \"{}\", expected \"v1\"",
            raw.chatrelay
        )));
    }

    let upstream = build_upstream(raw.upstream)?;

    let credentials = match raw.credentials {
        Some(c) => Some(Credentials {
            username: resolve_variables(&c.username)?,
            password: resolve_variables(&c.password)?,
        }),
        None => None,
    };

    let shared_sentinel = match raw.shared_sentinel {
        Some(s) => resolve_variables(&s)?,
        None => DEFAULT_SHARED_SENTINEL.to_string(),
    };
    if shared_sentinel.trim().is_empty() {
        return Err(ConfigError::Validation(
            "shared_sentinel must not be empty".to_string(),
        ));
    }

    let models: Vec<String> = raw
        .models
        .into_iter()
        .map(|m| m.trim().to_string())
        .filter(|m| !m.is_empty())
        .collect();
    if models.is_empty() {
        return Err(ConfigError::Validation(
            "models must list at least one model identifier".to_string(),
        ));
    }

    let variants = match raw.variants {
        Some(v) => {
            if v.suffixes.keys().any(|s| s.is_empty()) {
                return Err(ConfigError::Validation(
                    "variants.suffixes keys must not be empty".to_string(),
                ));
            }
            VariantConfig::new(v.default.unwrap_or(1), v.suffixes)
        }
        None => VariantConfig::default(),
    };

    let sessions = build_sessions(raw.sessions)?;
    let commands = build_commands(raw.commands);
    let stream = build_stream(raw.stream)?;

    Ok(Config {
        version: raw.chatrelay,
        environment: raw.environment.unwrap_or_default(),
        upstream,
        credentials,
        shared_sentinel,
        models,
        variants,
        sessions,
        commands,
        stream,
        config_hash,
    })
}

pub fn compute_hash(raw_yaml: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(raw_yaml.as_bytes());
    let hash = hasher.finalize();
    format!("sha256:{:x}", hash)
}

fn build_upstream(raw: raw::RawUpstream) -> Result<UpstreamConfig, ConfigError> {
    let base_url = resolve_variables(raw.base_url.trim())?;
    if !(base_url.starts_with("http://") || base_url.starts_with("https://")) {
        return Err(ConfigError::Validation(format!(
            "upstream.base_url \"{base_url}\" must start with http:// or https://"
        )));
    }

    Ok(UpstreamConfig {
        base_url: base_url.trim_end_matches('/').to_string(),
        login_path: normalize_path(raw.login_path, DEFAULT_LOGIN_PATH),
        conversation_path: normalize_path(raw.conversation_path, DEFAULT_CONVERSATION_PATH),
        generate_path: normalize_path(raw.generate_path, DEFAULT_GENERATE_PATH),
        login_timeout: positive_millis(
            "upstream.login_timeout_ms",
            raw.login_timeout_ms.unwrap_or(DEFAULT_LOGIN_TIMEOUT_MS),
        )?,
        conversation_timeout: positive_millis(
            "upstream.conversation_timeout_ms",
            raw.conversation_timeout_ms
                .unwrap_or(DEFAULT_CONVERSATION_TIMEOUT_MS),
        )?,
    })
}

/// Paths always start with a single '/'.
fn normalize_path(path: Option<String>, default: &str) -> String {
    let path = path.unwrap_or_else(|| default.to_string());
    format!("/{}", path.trim().trim_start_matches('/'))
}

fn build_sessions(raw: Option<raw::RawSessions>) -> Result<SessionConfig, ConfigError> {
    let defaults = SessionConfig::default();
    let Some(raw) = raw else {
        return Ok(defaults);
    };

    Ok(SessionConfig {
        session_ttl: positive_secs("sessions.session_ttl_secs", raw.session_ttl_secs)?
            .unwrap_or(defaults.session_ttl),
        token_ttl: positive_secs("sessions.token_ttl_secs", raw.token_ttl_secs)?
            .unwrap_or(defaults.token_ttl),
        sweep_interval: positive_secs("sessions.sweep_interval_secs", raw.sweep_interval_secs)?
            .unwrap_or(defaults.sweep_interval),
        default_title: raw
            .default_title
            .filter(|t| !t.trim().is_empty())
            .unwrap_or(defaults.default_title),
    })
}

fn build_commands(raw: Option<raw::RawCommands>) -> CommandConfig {
    let defaults = CommandConfig::default();
    let Some(raw) = raw else {
        return defaults;
    };
    let clean = |words: Vec<String>| -> Vec<String> {
        words
            .into_iter()
            .map(|w| w.trim().to_string())
            .filter(|w| !w.is_empty())
            .collect()
    };
    CommandConfig {
        reset: raw.reset.map(clean).unwrap_or(defaults.reset),
        relogin: raw.relogin.map(clean).unwrap_or(defaults.relogin),
    }
}

fn build_stream(raw: Option<raw::RawStream>) -> Result<StreamSettings, ConfigError> {
    let Some(raw) = raw else {
        return Ok(StreamSettings::default());
    };

    let argument_chunk_chars = raw
        .argument_chunk_chars
        .unwrap_or(DEFAULT_ARGUMENT_CHUNK_CHARS);
    if argument_chunk_chars == 0 {
        return Err(ConfigError::Validation(
            "stream.argument_chunk_chars must be greater than 0".to_string(),
        ));
    }

    let upstream_error = match raw.upstream_error.as_deref() {
        None | Some("inline") => UpstreamErrorPolicy::Inline,
        Some("terminate") => UpstreamErrorPolicy::Terminate,
        Some(other) => {
            return Err(ConfigError::Validation(format!(
                "unknown stream.upstream_error \"{other}\", expected \"inline\" or \"terminate\""
            )))
        }
    };

    Ok(StreamSettings {
        argument_chunk_chars,
        upstream_error,
    })
}

fn positive_millis(field: &str, value: u64) -> Result<Duration, ConfigError> {
    if value == 0 {
        return Err(ConfigError::Validation(format!(
            "{field} must be greater than 0"
        )));
    }
    Ok(Duration::from_millis(value))
}

fn positive_secs(field: &str, value: Option<u64>) -> Result<Option<Duration>, ConfigError> {
    match value {
        Some(0) => Err(ConfigError::Validation(format!(
            "{field} must be greater than 0"
        ))),
        Some(secs) => Ok(Some(Duration::from_secs(secs))),
        None => Ok(None),
    }
}
