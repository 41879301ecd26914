// Copyright 2026 The Parapet Project
// SPDX-License-Identifier: Apache-2.0

// Session orchestration
//
// Turns a presented bearer credential and a chat request into an upstream
// token plus a conversation id, or into an informational reply when the
// latest user message is an in-band command.
//
// Two TTL stores back this module:
// - conversation bindings, keyed by a digest of the presented credential
//   (sliding expiry)
// - the shared-default upstream token (absolute expiry)
//
// Shared-token acquisition is single-flight: concurrent callers that miss
// the cache all await the same login future. The login itself runs on a
// spawned task, so it completes and fills the cache even when every caller
// has gone away.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use futures_util::future::{BoxFuture, FutureExt, Shared};
use sha2::{Digest, Sha256};

use crate::config::{CommandConfig, Config, VariantConfig};
use crate::message::ChatRequest;
use crate::store::{Clock, Refresh, TtlStore};
use crate::upstream::{UpstreamApi, UpstreamError};

const SHARED_TOKEN_KEY: &str = "shared";
const MAX_TITLE_CHARS: usize = 32;

type LoginFuture = Shared<BoxFuture<'static, Result<String, UpstreamError>>>;

/// A login in progress. `id` tells a finished login apart from a newer one
/// registered under the same key.
struct InFlight {
    id: u64,
    login: LoginFuture,
}

// ---------------------------------------------------------------------------
// Types
// ---------------------------------------------------------------------------

#[derive(Debug, thiserror::Error)]
pub enum SessionError {
    #[error("shared credential is not configured")]
    SharedUnavailable,

    #[error(transparent)]
    Upstream(#[from] UpstreamError),
}

/// What the gateway should do with a request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Resolution {
    /// Answer with this text without calling the generation endpoint.
    Reply(String),
    /// Generate against `conversation_id` with `token`.
    Proceed {
        token: String,
        conversation_id: String,
        variant: u32,
        /// The conversation was created for this request.
        fresh: bool,
    },
}

/// The parts of `Config` the orchestrator reads.
#[derive(Debug, Clone)]
pub struct SessionSettings {
    pub shared_sentinel: String,
    /// Whether shared-default login credentials exist.
    pub shared_enabled: bool,
    pub variants: VariantConfig,
    pub commands: CommandConfig,
    pub default_title: String,
    pub session_ttl: std::time::Duration,
    pub token_ttl: std::time::Duration,
}

impl SessionSettings {
    pub fn from_config(config: &Config) -> Self {
        Self {
            shared_sentinel: config.shared_sentinel.clone(),
            shared_enabled: config.credentials.is_some(),
            variants: config.variants.clone(),
            commands: config.commands.clone(),
            default_title: config.sessions.default_title.clone(),
            session_ttl: config.sessions.session_ttl,
            token_ttl: config.sessions.token_ttl,
        }
    }
}

// ---------------------------------------------------------------------------
// Orchestrator
// ---------------------------------------------------------------------------

pub struct Orchestrator {
    upstream: Arc<dyn UpstreamApi>,
    sessions: Arc<TtlStore<String>>,
    tokens: Arc<TtlStore<String>>,
    logins: Arc<DashMap<String, InFlight>>,
    next_login: AtomicU64,
    settings: SessionSettings,
}

impl Orchestrator {
    pub fn new(upstream: Arc<dyn UpstreamApi>, settings: SessionSettings, clock: Arc<dyn Clock>) -> Self {
        let sessions = TtlStore::new(settings.session_ttl, Refresh::OnAccess, clock.clone());
        let tokens = TtlStore::new(settings.token_ttl, Refresh::OnWrite, clock);
        Self {
            upstream,
            sessions: Arc::new(sessions),
            tokens: Arc::new(tokens),
            logins: Arc::new(DashMap::new()),
            next_login: AtomicU64::new(0),
            settings,
        }
    }

    /// Conversation bindings, for the background sweeper.
    pub fn sessions(&self) -> Arc<TtlStore<String>> {
        self.sessions.clone()
    }

    /// Cached shared token, for the background sweeper.
    pub fn tokens(&self) -> Arc<TtlStore<String>> {
        self.tokens.clone()
    }

    pub fn is_shared(&self, presented: &str) -> bool {
        presented == self.settings.shared_sentinel
    }

    /// Resolve `presented` and `request` into a reply or a generation target.
    pub async fn resolve(&self, presented: &str, request: &ChatRequest) -> Result<Resolution, SessionError> {
        let shared = self.is_shared(presented);
        let latest = request
            .latest_user_message()
            .map(|m| m.content.trim())
            .unwrap_or("");
        let variant = self.settings.variants.select(&request.model);

        if self.settings.commands.is_relogin(latest) {
            return self.relogin(shared).await;
        }

        let token = if shared {
            self.shared_token(false).await?
        } else {
            presented.to_string()
        };
        let key = session_key(presented);

        if self.settings.commands.is_reset(latest) {
            let conversation_id = self
                .upstream
                .create_conversation(&token, &self.settings.default_title, variant)
                .await?;
            self.sessions.set(key.clone(), conversation_id.clone());
            tracing::info!(
                session = short(&key),
                conversation_id = %conversation_id,
                "conversation reset"
            );
            return Ok(Resolution::Reply(format!(
                "Started a new conversation ({conversation_id})."
            )));
        }

        if let Some(conversation_id) = self.sessions.get(&key) {
            return Ok(Resolution::Proceed {
                token,
                conversation_id,
                variant,
                fresh: false,
            });
        }

        let title = self.title_for(latest);
        let conversation_id = self
            .upstream
            .create_conversation(&token, &title, variant)
            .await?;
        self.sessions.set(key.clone(), conversation_id.clone());
        tracing::info!(
            session = short(&key),
            conversation_id = %conversation_id,
            variant,
            "conversation created"
        );

        Ok(Resolution::Proceed {
            token,
            conversation_id,
            variant,
            fresh: true,
        })
    }

    async fn relogin(&self, shared: bool) -> Result<Resolution, SessionError> {
        if !shared {
            return Ok(Resolution::Reply(
                "Relogin only applies to the shared credential. Your own credential is passed through unchanged."
                    .to_string(),
            ));
        }
        self.shared_token(true).await?;
        tracing::info!("shared credential refreshed on request");
        Ok(Resolution::Reply("Shared credential refreshed.".to_string()))
    }

    /// The cached shared token, logging in if absent or if `force` is set.
    ///
    /// At most one login runs at a time; concurrent callers share its result.
    pub(crate) async fn shared_token(&self, force: bool) -> Result<String, SessionError> {
        if !self.settings.shared_enabled {
            return Err(SessionError::SharedUnavailable);
        }

        if force {
            self.tokens.delete(SHARED_TOKEN_KEY);
        } else if let Some(token) = self.tokens.get(SHARED_TOKEN_KEY) {
            return Ok(token);
        }

        let login = match self.logins.entry(SHARED_TOKEN_KEY.to_string()) {
            Entry::Occupied(entry) => entry.get().login.clone(),
            Entry::Vacant(entry) => {
                // A login may have finished between the cache check and here.
                if let Some(token) = self.tokens.get(SHARED_TOKEN_KEY) {
                    return Ok(token);
                }
                let id = self.next_login.fetch_add(1, Ordering::Relaxed);
                let login = self.login_future(id);
                entry.insert(InFlight {
                    id,
                    login: login.clone(),
                });
                // Driven to completion here regardless of who is still waiting.
                tokio::spawn(login.clone());
                login
            }
        };

        Ok(login.await?)
    }

    /// One upstream login that caches its token and then unregisters itself.
    fn login_future(&self, id: u64) -> LoginFuture {
        let upstream = self.upstream.clone();
        let tokens = self.tokens.clone();
        let logins = self.logins.clone();
        async move {
            let result = upstream.login().await;
            match &result {
                Ok(token) => {
                    tokens.set(SHARED_TOKEN_KEY, token.clone());
                    tracing::info!("shared credential acquired");
                }
                Err(e) => tracing::warn!(error = %e, "shared login failed"),
            }
            logins.remove_if(SHARED_TOKEN_KEY, |_, current| current.id == id);
            result
        }
        .boxed()
        .shared()
    }

    fn title_for(&self, latest: &str) -> String {
        let commands = &self.settings.commands;
        if latest.is_empty() || commands.is_reset(latest) || commands.is_relogin(latest) {
            return self.settings.default_title.clone();
        }
        latest.chars().take(MAX_TITLE_CHARS).collect()
    }
}

/// Conversation binding key: hex SHA256 of the presented credential.
pub fn session_key(presented: &str) -> String {
    format!("{:x}", Sha256::digest(presented.as_bytes()))
}

fn short(key: &str) -> &str {
    &key[..key.len().min(12)]
}
