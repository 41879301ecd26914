// Copyright 2026 The Parapet Project
// SPDX-License-Identifier: Apache-2.0

// Raw YAML deserialization types (internal)
// Kept apart from the public Config structs: interpolation, defaulting
// and unit conversion happen between the two.

use serde::Deserialize;
use std::collections::BTreeMap;

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct RawConfig {
    pub chatrelay: String,
    pub environment: Option<String>,
    pub upstream: RawUpstream,
    pub credentials: Option<RawCredentials>,
    pub shared_sentinel: Option<String>,
    #[serde(default)]
    pub models: Vec<String>,
    pub variants: Option<RawVariants>,
    pub sessions: Option<RawSessions>,
    pub commands: Option<RawCommands>,
    pub stream: Option<RawStream>,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct RawUpstream {
    pub base_url: String,
    pub login_path: Option<String>,
    pub conversation_path: Option<String>,
    pub generate_path: Option<String>,
    pub login_timeout_ms: Option<u64>,
    pub conversation_timeout_ms: Option<u64>,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct RawCredentials {
    pub username: String,
    pub password: String,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct RawVariants {
    pub default: Option<u32>,
    #[serde(default)]
    pub suffixes: BTreeMap<String, u32>,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct RawSessions {
    pub session_ttl_secs: Option<u64>,
    pub token_ttl_secs: Option<u64>,
    pub sweep_interval_secs: Option<u64>,
    pub default_title: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct RawCommands {
    pub reset: Option<Vec<String>>,
    pub relogin: Option<Vec<String>>,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct RawStream {
    pub argument_chunk_chars: Option<usize>,
    pub upstream_error: Option<String>,
}
