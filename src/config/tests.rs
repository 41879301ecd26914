// Copyright 2026 The Parapet Project
// SPDX-License-Identifier: Apache-2.0

use super::*;
use crate::stream::UpstreamErrorPolicy;
use std::sync::Mutex;
use std::time::Duration;

static ENV_MUTEX: Mutex<()> = Mutex::new(());

fn with_env<F: FnOnce()>(vars: &[(&str, &str)], f: F) {
    let _guard = ENV_MUTEX.lock().unwrap_or_else(|e| e.into_inner());
    let previous: Vec<_> = vars
        .iter()
        .map(|(k, _)| (k.to_string(), std::env::var(k).ok()))
        .collect();
    for (k, v) in vars {
        std::env::set_var(k, v);
    }
    f();
    for (k, v) in previous {
        match v {
            Some(v) => std::env::set_var(&k, v),
            None => std::env::remove_var(&k),
        }
    }
}

const FULL_YAML: &str = r#"chatrelay: v1
environment: staging

upstream:
  base_url: https://upstream.example.com/
  login_path: api/v2/login
  conversation_path: /api/v2/conversation
  generate_path: /api/v2/generate
  login_timeout_ms: 5000
  conversation_timeout_ms: 8000

credentials:
  username: ${CHATRELAY_TEST_USER}
  password: ${CHATRELAY_TEST_PASS}

shared_sentinel: shared-key

models: [assistant, assistant-search, assistant-search-pro]

variants:
  default: 1
  suffixes:
    "-search": 2
    "-search-pro": 3

sessions:
  session_ttl_secs: 600
  token_ttl_secs: 3600
  sweep_interval_secs: 15
  default_title: Untitled

commands:
  reset: ["重置", "/new"]
  relogin: ["ReLogin"]

stream:
  argument_chunk_chars: 32
  upstream_error: terminate
"#;

const MINIMAL_YAML: &str = r#"chatrelay: v1
upstream:
  base_url: http://127.0.0.1:8080
models: [assistant]
"#;

fn make_source(yaml: &str) -> StringSource {
    StringSource {
        content: yaml.to_string(),
    }
}

// ---------------------------------------------------------------
// Parsing
// ---------------------------------------------------------------

#[test]
fn full_config_parses_all_fields() {
    with_env(
        &[("CHATRELAY_TEST_USER", "relay"), ("CHATRELAY_TEST_PASS", "s3cret")],
        || {
            let config = load_config(&make_source(FULL_YAML)).unwrap();

            assert_eq!(config.version, "v1");
            assert_eq!(config.environment, "staging");

            assert_eq!(config.upstream.base_url, "https://upstream.example.com");
            assert_eq!(config.upstream.login_path, "/api/v2/login");
            assert_eq!(
                config.upstream.url(&config.upstream.generate_path),
                "https://upstream.example.com/api/v2/generate"
            );
            assert_eq!(config.upstream.login_timeout, Duration::from_millis(5000));
            assert_eq!(config.upstream.conversation_timeout, Duration::from_millis(8000));

            let creds = config.credentials.as_ref().unwrap();
            assert_eq!(creds.username, "relay");
            assert_eq!(creds.password, "s3cret");

            assert_eq!(config.shared_sentinel, "shared-key");
            assert_eq!(config.models.len(), 3);
            assert!(config.supports_model("assistant-search"));
            assert!(!config.supports_model("other"));

            assert_eq!(config.sessions.session_ttl, Duration::from_secs(600));
            assert_eq!(config.sessions.token_ttl, Duration::from_secs(3600));
            assert_eq!(config.sessions.sweep_interval, Duration::from_secs(15));
            assert_eq!(config.sessions.default_title, "Untitled");

            assert_eq!(config.commands.reset, vec!["重置", "/new"]);
            assert_eq!(config.stream.argument_chunk_chars, 32);
            assert_eq!(config.stream.upstream_error, UpstreamErrorPolicy::Terminate);
        },
    );
}

#[test]
fn minimal_config_uses_defaults() {
    let config = load_config(&make_source(MINIMAL_YAML)).unwrap();

    assert_eq!(config.environment, "");
    assert_eq!(config.upstream.login_path, "/api/user/login");
    assert_eq!(config.upstream.conversation_path, "/api/conversation");
    assert_eq!(config.upstream.generate_path, "/api/chat/completions");
    assert_eq!(config.upstream.login_timeout, Duration::from_secs(10));
    assert_eq!(config.upstream.conversation_timeout, Duration::from_secs(15));
    assert!(config.credentials.is_none());
    assert_eq!(config.shared_sentinel, "default");
    assert_eq!(config.variants, VariantConfig::default());
    assert_eq!(config.sessions, SessionConfig::default());
    assert_eq!(config.commands, CommandConfig::default());
    assert_eq!(config.stream, crate::stream::StreamSettings::default());
}

#[test]
fn credentials_debug_redacts_password() {
    let creds = Credentials {
        username: "relay".to_string(),
        password: "hunter2".to_string(),
    };
    let rendered = format!("{creds:?}");
    assert!(rendered.contains("relay"));
    assert!(!rendered.contains("hunter2"));
}

// ---------------------------------------------------------------
// Variants and commands
// ---------------------------------------------------------------

#[test]
fn longest_suffix_selects_variant() {
    let variants = VariantConfig::new(
        1,
        [("-search".to_string(), 2), ("-search-pro".to_string(), 3)],
    );
    assert_eq!(variants.select("assistant"), 1);
    assert_eq!(variants.select("assistant-search"), 2);
    assert_eq!(variants.select("assistant-search-pro"), 3);
}

#[test]
fn reset_is_exact_relogin_is_case_insensitive() {
    let commands = CommandConfig::default();
    assert!(commands.is_reset("重置"));
    assert!(commands.is_reset("  reset \n"));
    assert!(!commands.is_reset("RESET"));
    assert!(!commands.is_reset("reset please"));

    assert!(commands.is_relogin("ReLogin"));
    assert!(commands.is_relogin("/RELOGIN"));
    assert!(commands.is_relogin("重新登录"));
    assert!(!commands.is_relogin("relogin now"));
}

// ---------------------------------------------------------------
// Validation
// ---------------------------------------------------------------

#[test]
fn unsupported_version_rejected() {
    let yaml = MINIMAL_YAML.replace("chatrelay: v1", "chatrelay: v2");
    let err = load_config(&make_source(&yaml)).unwrap_err();
    assert!(err.to_string().contains("unsupported config version"));
}

#[test]
fn missing_upstream_is_yaml_error() {
    let err = load_config(&make_source("chatrelay: v1\nmodels: [a]\n")).unwrap_err();
    assert!(matches!(err, ConfigError::YamlError(_)));
}

#[test]
fn unknown_field_rejected() {
    let yaml = format!("{MINIMAL_YAML}colour: blue\n");
    let err = load_config(&make_source(&yaml)).unwrap_err();
    assert!(matches!(err, ConfigError::YamlError(_)));
}

#[test]
fn base_url_without_scheme_rejected() {
    let yaml = MINIMAL_YAML.replace("http://127.0.0.1:8080", "upstream.local");
    let err = load_config(&make_source(&yaml)).unwrap_err();
    assert!(err.to_string().contains("must start with http:// or https://"));
}

#[test]
fn empty_models_rejected() {
    let yaml = MINIMAL_YAML.replace("models: [assistant]", "models: []");
    let err = load_config(&make_source(&yaml)).unwrap_err();
    assert!(err.to_string().contains("models"));
}

#[test]
fn zero_ttl_rejected() {
    let yaml = format!("{MINIMAL_YAML}sessions:\n  token_ttl_secs: 0\n");
    let err = load_config(&make_source(&yaml)).unwrap_err();
    assert!(err.to_string().contains("sessions.token_ttl_secs"));
}

#[test]
fn zero_chunk_size_rejected() {
    let yaml = format!("{MINIMAL_YAML}stream:\n  argument_chunk_chars: 0\n");
    let err = load_config(&make_source(&yaml)).unwrap_err();
    assert!(err.to_string().contains("argument_chunk_chars"));
}

#[test]
fn unknown_error_policy_rejected() {
    let yaml = format!("{MINIMAL_YAML}stream:\n  upstream_error: ignore\n");
    let err = load_config(&make_source(&yaml)).unwrap_err();
    assert!(err.to_string().contains("upstream_error"));
}

#[test]
fn undefined_variable_fails_with_clear_error() {
    let yaml = format!(
        "{MINIMAL_YAML}credentials:\n  username: ${{CHATRELAY_TEST_NEVER_SET}}\n  password: x\n"
    );
    let err = load_config(&make_source(&yaml)).unwrap_err();
    assert!(matches!(err, ConfigError::UndefinedVariable { .. }));
    assert!(err.to_string().contains("CHATRELAY_TEST_NEVER_SET"));
}

// ---------------------------------------------------------------
// Hash
// ---------------------------------------------------------------

#[test]
fn config_hash_is_deterministic() {
    let a = load_config(&make_source(MINIMAL_YAML)).unwrap();
    let b = load_config(&make_source(MINIMAL_YAML)).unwrap();
    assert_eq!(a.config_hash, b.config_hash);
    assert!(a.config_hash.starts_with("sha256:"));
    assert_eq!(a.config_hash, compute_hash(MINIMAL_YAML));
}

#[test]
fn different_yaml_produces_different_hash() {
    let other = MINIMAL_YAML.replace("assistant", "assistant-2");
    assert_ne!(compute_hash(MINIMAL_YAML), compute_hash(&other));
}
