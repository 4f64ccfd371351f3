//! regscan entry point.
//!
//! This binary is the composition root. Responsibilities:
//!
//! 1. **Parse configuration**: flags with `REGSCAN_*` environment fallbacks,
//!    validated once into read-only [`config::Settings`].
//! 2. **Wire observability**: `tracing-subscriber` with an optional JSON
//!    layer and an optional OpenTelemetry OTLP exporter.
//! 3. **Construct infrastructure**: [`cluster::KubeJobStore`] and
//!    [`registry::RegistryClient`] are injected into the
//!    [`dispatch::Dispatcher`].
//! 4. **Run**: the webhook listener feeds the bounded event queue, the worker
//!    pool drains it, and SIGINT/SIGTERM stop both.

mod config;
mod telemetry;

use std::sync::Arc;

use anyhow::Context;
use clap::Parser;
use cluster::KubeJobStore;
use dispatch::{event_queue, Dispatcher, WorkerPool};
use pipeline::JobSpecBuilder;
use registry::RegistryClient;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

use crate::config::Config;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let config = Config::parse();
    let telemetry = telemetry::init(config.log_json, config.otlp_endpoint.as_deref())?;

    let result = run(config).await;
    if let Err(e) = &result {
        error!(error = %format!("{e:#}"), "regscan stopped with an error");
    }
    telemetry.shutdown();
    result
}

async fn run(config: Config) -> anyhow::Result<()> {
    let settings = config.validate().context("invalid configuration")?;
    info!(
        port = settings.port,
        namespace = %settings.namespace,
        insecure_registry = settings.insecure_registry,
        workers = settings.workers.workers,
        "starting regscan"
    );

    let jobs = KubeJobStore::try_default()
        .await
        .context("failed to connect to the Kubernetes API")?;
    let lookup = RegistryClient::new();
    let builder = JobSpecBuilder::new(settings.namespace.clone(), settings.insecure_registry);
    let dispatcher = Arc::new(
        Dispatcher::new(builder, Arc::new(jobs), Arc::new(lookup))
            .with_call_timeout(settings.call_timeout),
    );

    let tcp = listener::bind(settings.port).await?;

    let cancel = CancellationToken::new();
    let (sender, receiver) = event_queue(settings.queue_capacity);
    let workers = WorkerPool::spawn(
        dispatcher,
        receiver,
        sender.clone(),
        settings.workers.clone(),
        cancel.clone(),
    );
    tokio::spawn(cancel_on_signal(cancel.clone()));

    let served = listener::serve(tcp, listener::router(sender), cancel.clone()).await;

    cancel.cancel();
    workers.join().await;
    info!("regscan stopped");
    served.context("webhook listener failed")
}

async fn cancel_on_signal(cancel: CancellationToken) {
    let interrupt = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            warn!(error = %e, "cannot listen for SIGINT");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        use tokio::signal::unix::{signal, SignalKind};
        match signal(SignalKind::terminate()) {
            Ok(mut stream) => {
                stream.recv().await;
            }
            Err(e) => {
                warn!(error = %e, "cannot listen for SIGTERM");
                std::future::pending::<()>().await;
            }
        }
    };
    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = interrupt => info!("received SIGINT; shutting down"),
        () = terminate => info!("received SIGTERM; shutting down"),
        () = cancel.cancelled() => return,
    }
    cancel.cancel();
}
