//! Metrics gateway: public read/publish statistics over HTTP and adaptive
//! publish limits over gRPC.
//!
//! Main entry point that wires the upstream clients and starts the servers.

use clap::Parser;
use gateway_api::{ApiServer, AppState};
use gateway_clients::{directory, lazy_channel, GrpcLimitsStore, InterestsClient};
use gateway_core::config::AppConfig;
use gateway_limiter::{AdaptiveLimitSetter, LimitPolicy};
use gateway_query::PrometheusClient;
use std::sync::Arc;
use std::time::Instant;
use tracing::{error, info};

#[derive(Parser, Debug)]
#[command(name = "metrics-gateway")]
#[command(about = "Read-rate metrics gateway with adaptive publish quotas")]
#[command(version)]
struct Cli {
    /// Optional configuration file, overlaid by environment variables
    #[arg(long, env = "METRICS_GATEWAY_CONFIG")]
    config: Option<String>,

    /// gRPC port (overrides config)
    #[arg(long, env = "METRICS_GATEWAY__API__GRPC_PORT")]
    grpc_port: Option<u16>,

    /// HTTP port (overrides config)
    #[arg(long, env = "METRICS_GATEWAY__API__HTTP_PORT")]
    http_port: Option<u16>,

    /// Prometheus exporter port (overrides config)
    #[arg(long, env = "METRICS_GATEWAY__METRICS__PORT")]
    metrics_port: Option<u16>,

    /// Prometheus server queried for read rates (overrides config)
    #[arg(long, env = "METRICS_GATEWAY__PROMETHEUS__URI")]
    prometheus_uri: Option<String>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| {
                "metrics_gateway=info,gateway_limiter=info,tower_http=info".into()
            }),
        )
        .json()
        .init();

    let cli = Cli::parse();

    info!("Metrics gateway starting up");

    let mut config = AppConfig::load(cli.config.as_deref())?;

    if let Some(port) = cli.grpc_port {
        config.api.grpc_port = port;
    }
    if let Some(port) = cli.http_port {
        config.api.http_port = port;
    }
    if let Some(port) = cli.metrics_port {
        config.metrics.port = port;
    }
    if let Some(uri) = cli.prometheus_uri {
        config.prometheus.uri = uri;
    }

    config.validate()?;

    info!(
        grpc_port = config.api.grpc_port,
        http_port = config.api.http_port,
        metrics_port = config.metrics.port,
        prometheus = %config.prometheus.uri,
        windows = ?config.limits.windows,
        "Configuration loaded"
    );

    let metrics = Arc::new(PrometheusClient::new(&config.prometheus)?);
    let limits = Arc::new(GrpcLimitsStore::new(lazy_channel(&config.usage)?));
    let interests = Arc::new(InterestsClient::new(lazy_channel(&config.interests)?));
    let sources = directory(&config.sources)?;

    let policy = LimitPolicy::from_config(&config.limits)?;
    let default_group = policy.default_group.clone();
    let setter = Arc::new(AdaptiveLimitSetter::new(
        metrics.clone(),
        limits,
        sources,
        &config.sources.resolution,
        policy,
    ));

    let state = AppState {
        metrics,
        interests,
        default_group,
        fanout_limit: config.api.fanout_limit,
        start_time: Instant::now(),
    };
    let api_server = ApiServer::new(config.clone(), state, setter);

    if let Err(e) = api_server.start_metrics() {
        error!(error = %e, "Failed to start metrics exporter");
    }

    info!("Metrics gateway is ready to serve traffic");

    tokio::try_join!(api_server.start_http(), api_server.start_grpc())?;

    Ok(())
}
