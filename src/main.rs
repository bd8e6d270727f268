//! Block Storage Controller
//!
//! Control plane daemon for virtual block-storage volumes: runs the
//! leader-gated reconciliation sweep against each partition's storage
//! backend and exposes health and metrics endpoints.

use clap::Parser;
use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn, Level};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use block_storage_controller::{
    Error, HttpBackendConfig, HttpStorageBackend, PartitionMap, ReconciliationScheduler,
    Result, StaticAttachments, StaticLeader, SweepMetrics, VolumeReconciler,
};

// =============================================================================
// CLI Arguments
// =============================================================================

/// Block Storage Controller - Volume Control Plane
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Partition map file (partition name -> backend endpoint, YAML)
    #[arg(long, env = "PARTITION_MAP", default_value = "partitions.yaml")]
    partition_map: PathBuf,

    /// Reconciliation tick interval in seconds
    #[arg(long, env = "TICK_INTERVAL", default_value = "10")]
    tick_interval_secs: u64,

    /// Backend RPC timeout in seconds
    #[arg(long, env = "RPC_TIMEOUT", default_value = "30")]
    rpc_timeout_secs: u64,

    /// Start as fleet coordinator (single-node deployments)
    #[arg(long, env = "LEADER", default_value = "true")]
    leader: bool,

    /// Health server bind address
    #[arg(long, env = "HEALTH_ADDR", default_value = "0.0.0.0:8081")]
    health_addr: String,

    /// Metrics server bind address
    #[arg(long, env = "METRICS_ADDR", default_value = "0.0.0.0:8080")]
    metrics_addr: String,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long, env = "LOG_LEVEL", default_value = "info")]
    log_level: String,

    /// Output logs as JSON
    #[arg(long, env = "LOG_JSON")]
    log_json: bool,
}

// =============================================================================
// Main
// =============================================================================

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    init_logging(&args);

    info!("Starting Block Storage Controller");
    info!("  Version: {}", block_storage_controller::VERSION);
    info!("  Partition map: {}", args.partition_map.display());
    info!("  Tick interval: {}s", args.tick_interval_secs);
    info!("  Leader: {}", args.leader);

    let partitions = PartitionMap::load(&args.partition_map)?;
    info!("Loaded {} partition(s)", partitions.len());

    // Wire the control plane. The in-memory repository keeps volume state in
    // process; a durable record store plugs in through the same port.
    let repository = Arc::new(block_storage_controller::InMemoryVolumeRepository::new());
    let backend = Arc::new(HttpStorageBackend::new(HttpBackendConfig {
        request_timeout: Duration::from_secs(args.rpc_timeout_secs),
    })?);
    let attachments = Arc::new(StaticAttachments::new());
    let leader = Arc::new(StaticLeader::new(args.leader));

    let metrics = match SweepMetrics::register() {
        Ok(metrics) => Some(metrics),
        Err(err) => {
            warn!("sweep metrics disabled: {}", err);
            None
        }
    };

    let reconciler =
        VolumeReconciler::with_metrics(repository, backend, attachments, partitions, metrics);

    let scheduler = Arc::new(ReconciliationScheduler::new(reconciler, leader));

    // Start health server
    let health_addr = args.health_addr.clone();
    tokio::spawn(async move {
        if let Err(e) = run_health_server(&health_addr).await {
            error!("Health server error: {}", e);
        }
    });

    // Start metrics server
    let metrics_addr = args.metrics_addr.clone();
    tokio::spawn(async move {
        if let Err(e) = run_metrics_server(&metrics_addr).await {
            error!("Metrics server error: {}", e);
        }
    });

    // Run the reconciliation loop until interrupted
    let shutdown = CancellationToken::new();
    {
        let shutdown = shutdown.clone();
        tokio::spawn(async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                info!("shutdown signal received");
                shutdown.cancel();
            }
        });
    }

    scheduler
        .run(Duration::from_secs(args.tick_interval_secs), shutdown)
        .await;

    info!("Controller shutdown complete");
    Ok(())
}

// =============================================================================
// Logging Setup
// =============================================================================

fn init_logging(args: &Args) {
    let level = match args.log_level.to_lowercase().as_str() {
        "trace" => Level::TRACE,
        "debug" => Level::DEBUG,
        "info" => Level::INFO,
        "warn" => Level::WARN,
        "error" => Level::ERROR,
        _ => Level::INFO,
    };

    let filter = EnvFilter::from_default_env()
        .add_directive(level.into())
        .add_directive("hyper=warn".parse().unwrap())
        .add_directive("reqwest=info".parse().unwrap());

    if args.log_json {
        tracing_subscriber::registry()
            .with(filter)
            .with(fmt::layer().json())
            .init();
    } else {
        tracing_subscriber::registry()
            .with(filter)
            .with(fmt::layer().with_target(true))
            .init();
    }
}

// =============================================================================
// Health Server
// =============================================================================

async fn run_health_server(addr: &str) -> Result<()> {
    use hyper::service::{make_service_fn, service_fn};
    use hyper::{Body, Request, Response, Server, StatusCode};

    let make_svc = make_service_fn(|_conn| async {
        Ok::<_, std::convert::Infallible>(service_fn(|req: Request<Body>| async move {
            let response = match req.uri().path() {
                "/healthz" | "/livez" => Response::builder()
                    .status(StatusCode::OK)
                    .body(Body::from("ok"))
                    .unwrap(),
                "/readyz" => Response::builder()
                    .status(StatusCode::OK)
                    .body(Body::from("ok"))
                    .unwrap(),
                _ => Response::builder()
                    .status(StatusCode::NOT_FOUND)
                    .body(Body::from("not found"))
                    .unwrap(),
            };
            Ok::<_, std::convert::Infallible>(response)
        }))
    });

    let addr: SocketAddr = addr
        .parse()
        .map_err(|e| Error::Internal(format!("Invalid health server address: {}", e)))?;

    info!("Health server listening on {}", addr);
    Server::bind(&addr)
        .serve(make_svc)
        .await
        .map_err(|e| Error::Internal(format!("Health server error: {}", e)))?;

    Ok(())
}

// =============================================================================
// Metrics Server
// =============================================================================

async fn run_metrics_server(addr: &str) -> Result<()> {
    use hyper::service::{make_service_fn, service_fn};
    use hyper::{Body, Request, Response, Server, StatusCode};
    use prometheus::{Encoder, TextEncoder};

    let make_svc = make_service_fn(|_conn| async {
        Ok::<_, std::convert::Infallible>(service_fn(|req: Request<Body>| async move {
            let response = match req.uri().path() {
                "/metrics" => {
                    let encoder = TextEncoder::new();
                    let metric_families = prometheus::gather();
                    let mut buffer = Vec::new();
                    encoder.encode(&metric_families, &mut buffer).unwrap();

                    Response::builder()
                        .status(StatusCode::OK)
                        .header("Content-Type", encoder.format_type())
                        .body(Body::from(buffer))
                        .unwrap()
                }
                _ => Response::builder()
                    .status(StatusCode::NOT_FOUND)
                    .body(Body::from("not found"))
                    .unwrap(),
            };
            Ok::<_, std::convert::Infallible>(response)
        }))
    });

    let addr: SocketAddr = addr
        .parse()
        .map_err(|e| Error::Internal(format!("Invalid metrics server address: {}", e)))?;

    info!("Metrics server listening on {}", addr);
    Server::bind(&addr)
        .serve(make_svc)
        .await
        .map_err(|e| Error::Internal(format!("Metrics server error: {}", e)))?;

    Ok(())
}
