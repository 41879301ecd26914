// Copyright 2026 The Parapet Project
// SPDX-License-Identifier: Apache-2.0

use chatrelay::config::{self, ConfigSource};
use chatrelay::engine;
use chatrelay::proxy;
use chatrelay::store::{self, SystemClock};
use chatrelay::upstream::{HttpUpstream, UpstreamApi};
use clap::Parser;

use std::net::{IpAddr, SocketAddr};
use std::sync::Arc;

#[derive(Parser)]
#[command(name = "chatrelay", about = "OpenAI-compatible gateway for an NDJSON chat backend")]
struct Cli {
    /// Path to the chatrelay.yaml config file
    #[arg(long, default_value = "chatrelay.yaml", env = "CHATRELAY_CONFIG")]
    config: String,

    /// Port to listen on
    #[arg(long, default_value_t = 9810, env = "CHATRELAY_PORT")]
    port: u16,

    /// Address to bind
    #[arg(long, default_value = "127.0.0.1", env = "CHATRELAY_HOST")]
    host: IpAddr,
}

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt()
        .json()
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();

    let addr = SocketAddr::new(cli.host, cli.port);
    tracing::info!(%addr, "chatrelay starting");

    let source = config::FileSource::new(cli.config);
    let config = match config::load_config(&source) {
        Ok(c) => Arc::new(c),
        Err(e) => {
            tracing::error!(source = %source.describe(), "failed to load config: {e}");
            std::process::exit(1);
        }
    };

    tracing::info!(
        source = %source.describe(),
        version = %config.version,
        environment = %config.environment,
        upstream = %config.upstream.base_url,
        models = config.models.len(),
        shared_enabled = config.credentials.is_some(),
        config_hash = %config.config_hash,
        "config loaded"
    );

    let upstream: Arc<dyn UpstreamApi> = Arc::new(HttpUpstream::new(
        reqwest::Client::new(),
        config.upstream.clone(),
        config.credentials.clone(),
    ));

    let engine = engine::build_engine(config.clone(), upstream, Arc::new(SystemClock));

    let sweep = config.sessions.sweep_interval;
    let _session_sweeper = store::spawn_sweeper("sessions", engine.orchestrator().sessions(), sweep);
    let _token_sweeper = store::spawn_sweeper("tokens", engine.orchestrator().tokens(), sweep);

    let app = proxy::build_router(Arc::new(engine));

    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .expect("failed to bind to address");

    tracing::info!(%addr, "chatrelay listening");

    axum::serve(listener, app)
        .await
        .expect("server error");
}
