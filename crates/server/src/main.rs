//! Linear Assistant Server
//!
//! Receives inbound emails and HumanLayer callbacks and drives threads.

use std::sync::Arc;

use anyhow::{Context, Result};
use tokio::net::TcpListener;
use tower_http::trace::TraceLayer;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use linear_assistant_claude::ClaudeOracle;
use linear_assistant_core::StepDispatcher;
use linear_assistant_server::{
    router, AppState, CachedTracker, Config, HumanLayerClient, LinearClient,
};

fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let json = std::env::var("LOG_FORMAT").is_ok_and(|f| f.eq_ignore_ascii_case("json"));

    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false);
    if json {
        builder.json().init();
    } else {
        builder.init();
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    init_tracing();

    info!("Linear Assistant Server starting");

    let config = Config::from_env()?;

    let linear = LinearClient::new(&config.linear_api_url, &config.linear_api_key)
        .context("Failed to build Linear client")?;
    let tracker = match &config.redis_url {
        Some(url) => match CachedTracker::connect(linear.clone(), url, config.cache_ttl).await {
            Ok(tracker) => {
                info!(ttl_secs = config.cache_ttl.as_secs(), "Lookup cache connected to Redis");
                tracker
            }
            Err(e) => {
                warn!(error = %e, "Failed to connect to Redis, running without lookup cache");
                CachedTracker::new(linear, None, config.cache_ttl)
            }
        },
        None => CachedTracker::new(linear, None, config.cache_ttl),
    };

    let humanlayer = HumanLayerClient::new(&config.humanlayer_api_base, &config.humanlayer_api_key)
        .context("Failed to build HumanLayer client")?;
    info!(api_base = %config.humanlayer_api_base, "HumanLayer client ready");

    let mut oracle = ClaudeOracle::new(&config.claude_bin);
    if let Some(model) = &config.claude_model {
        oracle = oracle.with_model(model);
    }

    let dispatcher = StepDispatcher::new(oracle, tracker, humanlayer)
        .with_budget(config.budget)
        .with_call_timeout(config.call_timeout);
    info!(
        max_iterations = config.budget.max_iterations,
        max_run_secs = ?config.budget.max_duration.map(|d| d.as_secs()),
        call_timeout_secs = config.call_timeout.as_secs(),
        "Dispatcher configured"
    );

    let state = AppState {
        runner: Arc::new(dispatcher),
        allowed_source_emails: config.allowed_source_emails.clone(),
        allowed_target_emails: config.allowed_target_emails.clone(),
        test_sender: config.test_sender.clone(),
    };

    let app = router(state).layer(TraceLayer::new_for_http());

    let listener = TcpListener::bind(config.listen_addr)
        .await
        .with_context(|| format!("Failed to bind {}", config.listen_addr))?;
    info!(addr = %config.listen_addr, "Listening for webhooks");

    axum::serve(listener, app).await.context("Server error")?;

    Ok(())
}
