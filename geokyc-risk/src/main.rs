//! geokyc-risk - onboarding risk assessment service
//!
//! Fuses satellite, thermal, object-detection, narrative and geocode
//! evidence into one explainable verdict per business.

use anyhow::{Context, Result};
use clap::Parser;
use std::path::PathBuf;
use std::sync::Arc;
use tokio::sync::mpsc;
use tower_http::trace::TraceLayer;
use tracing::{info, warn};

use geokyc_common::config::{init_tracing, resolve_config_path};
use geokyc_risk::analyzers::{demo_clients, AnalyzerClient, HttpAnalyzerClient};
use geokyc_risk::audit::{spawn_json_lines_writer, AuditSink, ChannelAuditSink, TracingAuditSink};
use geokyc_risk::config::EngineConfig;
use geokyc_risk::types::Source;
use geokyc_risk::{build_router, build_scheduler, AppState};

const CONFIG_ENV_VAR: &str = "GEOKYC_CONFIG";
const CONFIG_FILE_NAME: &str = "geokyc-risk.toml";
const AUDIT_CHANNEL_CAPACITY: usize = 256;

#[derive(Debug, Parser)]
#[command(name = "geokyc-risk", version, about = "Onboarding risk assessment service")]
struct Args {
    /// Path to the TOML configuration file
    #[arg(long, env = "GEOKYC_CONFIG")]
    config: Option<PathBuf>,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    let config_path = resolve_config_path(args.config.as_deref(), CONFIG_ENV_VAR, CONFIG_FILE_NAME)?;
    let config = EngineConfig::load(&config_path)
        .with_context(|| format!("Invalid configuration in {}", config_path.display()))?;

    init_tracing(&config.logging)?;

    info!("Starting geokyc-risk");
    info!("Version: {}", env!("CARGO_PKG_VERSION"));
    info!(path = %config_path.display(), "Configuration loaded");

    let clients: Vec<Arc<dyn AnalyzerClient>> = if config.demo_mode {
        warn!("Demo mode: analyzer outputs are synthetic");
        demo_clients()
    } else {
        Source::ALL
            .into_iter()
            .map(|source| {
                let policy = config.policy(source)?;
                let client = HttpAnalyzerClient::from_policy(source, policy)?;
                Ok(Arc::new(client) as Arc<dyn AnalyzerClient>)
            })
            .collect::<geokyc_risk::RiskResult<Vec<_>>>()?
    };

    let (audit, audit_writer) = match &config.audit.path {
        Some(path) => {
            let (tx, rx) = mpsc::channel(AUDIT_CHANNEL_CAPACITY);
            let writer = spawn_json_lines_writer(path.clone(), rx);
            info!(path = %path.display(), "Audit log enabled");
            (Arc::new(ChannelAuditSink::new(tx)) as Arc<dyn AuditSink>, Some(writer))
        }
        None => (Arc::new(TracingAuditSink) as Arc<dyn AuditSink>, None),
    };

    let scheduler = build_scheduler(&config, clients, audit)?;
    let state = AppState::new(Arc::new(scheduler), config.demo_mode);
    let app = build_router(state).layer(TraceLayer::new_for_http());

    let listener = tokio::net::TcpListener::bind(&config.server.bind)
        .await
        .with_context(|| format!("Failed to bind {}", config.server.bind))?;
    info!("Listening on http://{}", config.server.bind);
    info!("Health check: http://{}/health", config.server.bind);

    axum::serve(listener, app)
        .with_graceful_shutdown(async {
            let _ = tokio::signal::ctrl_c().await;
            info!("Shutdown signal received");
        })
        .await?;

    // Router (and with it the audit sender) is gone; let the writer drain
    if let Some(writer) = audit_writer {
        writer.await??;
    }

    Ok(())
}
