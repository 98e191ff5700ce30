#![forbid(unsafe_code)]

#[cfg(test)]
#[macro_use]
mod testutil;

mod fingerprint;
mod models;
mod service;

use anyhow::{bail, Context, Result};
use autometrics::prometheus_exporter;
use axum::Server;
use clap::Parser;
use opentelemetry::sdk::{trace, Resource};
use opentelemetry::KeyValue;
use opentelemetry_otlp::WithExportConfig;
use service::alertmanager::{AlertmanagerServiceConfig, UpstreamRegistry};
use service::enrichment::EnrichmentConfig;
use service::scheduler::run_scheduler;
use service::{Metrics, SchedulerConfig, Service};
use std::io;
use std::net::IpAddr;
use std::process::ExitCode;
use tokio::select;
use tokio_util::sync::CancellationToken;
use tracing::{error, info};
use tracing_opentelemetry::OpenTelemetryLayer;
use tracing_subscriber::layer::{Layer, SubscriberExt};
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{EnvFilter, Registry};
use url::Url;

/// Dashboard aggregating alerts from multiple Alertmanager instances
#[derive(Parser)]
#[clap(name = "amview", version = clap::crate_version!())]
struct CliArguments {
    /// Log using JSON.
    #[clap(long, env = "LOG_JSON")]
    json: bool,

    /// Log at debug level unless `RUST_LOG` says otherwise.
    #[clap(long, env = "DEBUG")]
    debug: bool,

    /// Enable tracing support.
    ///
    /// Use `--otlp-endpoint` to specify where the traces should be sent.
    #[clap(long, env)]
    tracing: bool,

    /// Endpoint of the OTLP collector.
    #[clap(long, env, default_value = "http://localhost:4317")]
    otlp_endpoint: Url,

    #[clap(flatten)]
    serve_args: ServeArguments,
}

#[derive(Parser)]
struct ServeArguments {
    #[clap(flatten)]
    alertmanager_config: AlertmanagerServiceConfig,

    #[clap(flatten)]
    enrichment_config: EnrichmentConfig,

    #[clap(flatten)]
    scheduler_config: SchedulerConfig,

    /// Server port number
    #[clap(long, short, env, default_value = "8080")]
    port: u16,

    /// Hostname to listen on
    #[clap(long, short = 'H', env, default_value = "127.0.0.1")]
    listen_host: IpAddr,
}

#[tokio::main(flavor = "multi_thread")]
async fn main() -> ExitCode {
    let args = CliArguments::parse();

    let result = initialize_logger(&args);
    if let Err(err) = result {
        error!(%err, "Unable to initialize logger");
        return ExitCode::FAILURE;
    }

    if let Err(err) = prometheus_exporter::try_init() {
        error!(?err, "Failed to initialize Prometheus exporter");
        return ExitCode::FAILURE;
    };

    let result = handle_serve(args.serve_args).await;

    if let Err(err) = result {
        error!(%err, "Command executed unsuccessfully");
        return ExitCode::FAILURE;
    }

    ExitCode::SUCCESS
}

fn initialize_logger(args: &CliArguments) -> Result<()> {
    // `RUST_LOG` takes precedence over the `debug` flag.
    let default_level = if args.debug { "debug" } else { "info" };
    let filter_layer =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));

    let log_layer = tracing_subscriber::fmt::layer().with_writer(io::stderr);
    let log_layer = if args.json {
        log_layer.json().boxed()
    } else {
        log_layer.boxed()
    };

    let trace_layer = if args.tracing {
        let tracer =
            opentelemetry_otlp::new_pipeline()
                .tracing()
                .with_exporter(
                    opentelemetry_otlp::new_exporter()
                        .tonic()
                        .with_endpoint(args.otlp_endpoint.to_string()),
                )
                .with_trace_config(trace::config().with_resource(Resource::new(vec![
                    KeyValue::new("service.name", "amview"),
                ])))
                .install_batch(opentelemetry::runtime::Tokio)
                .context("unable to install tracer")?;

        Some(OpenTelemetryLayer::new(tracer))
    } else {
        None
    };

    Registry::default()
        .with(filter_layer)
        .with(log_layer)
        .with(trace_layer)
        .try_init()
        .context("unable to initialize logger")?;

    Ok(())
}

async fn handle_serve(args: ServeArguments) -> Result<()> {
    let upstreams = UpstreamRegistry::from_config(&args.alertmanager_config)
        .context("invalid Alertmanager configuration")?;

    let metrics = Metrics::new(prometheus::default_registry())
        .context("unable to register metrics")?;

    let commit = option_env!("GITHUB_SHA").unwrap_or("unknown");

    info!(
        port = ?args.port,
        listen_host = ?args.listen_host,
        ?commit,
        upstreams = upstreams.len(),
        "Starting server"
    );

    let service = Service::new(upstreams, &args.enrichment_config, metrics);

    let app = service::router::create_router(service.clone());

    let cancel = CancellationToken::new();
    let scheduler_task = tokio::spawn(run_scheduler(
        service,
        args.scheduler_config,
        cancel.clone(),
    ));

    let shutdown_signal = cancel.clone();
    let addr = (args.listen_host, args.port).into();
    let server = Server::try_bind(&addr).with_context(|| format!("unable to bind to {addr}"))?;
    let server_task = tokio::spawn(async move {
        server
            .serve(app.into_make_service())
            .with_graceful_shutdown(async move {
                shutdown_signal.cancelled().await;
                info!("graceful shutdown request received");
            })
            .await
    });

    // Graceful shutdown detection
    if let Err(err) = tokio::signal::ctrl_c().await {
        error!(%err, "Unable to listen for shutdown signal");
    }

    cancel.cancel();

    let tasks = futures::future::join(scheduler_task, server_task);

    select! {
        _ = tokio::signal::ctrl_c() => {
            bail!("forced shutdown from additional signal")
        }
        (scheduler_result, server_result) = tasks => {
            match (scheduler_result, server_result) {
                (Ok(()), Ok(Ok(()))) => info!("shutdown complete"),
                (Err(scheduler_error), _) => {
                    error!(?scheduler_error, "scheduler error during shutdown");
                    bail!("scheduler error during shutdown: {scheduler_error}");
                }
                (Ok(()), Ok(Err(server_error))) => {
                    error!(?server_error, "server error during shutdown");
                    bail!("server error during shutdown: {server_error}")
                }
                (Ok(()), Err(server_error)) => {
                    error!(?server_error, "server task failed during shutdown");
                    bail!("server task failed during shutdown: {server_error}")
                }
            };
            Ok(())
        }
    }
}
