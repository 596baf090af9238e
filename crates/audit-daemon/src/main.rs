mod cli;
mod context;
mod event_sink;
mod host_bridge;
mod progress_transport;

use std::path::PathBuf;
use std::sync::Arc;

use arc_swap::ArcSwap;
use audit_core::config_sync::ConfigSync;
use audit_core::progress::ProgressReporter;
use audit_core::scheduler::MonitorScheduler;
use audit_core::types::ServerId;
use clap::Parser;
use tracing::{info, warn};
use tracing_subscriber::prelude::*;
use tracing_subscriber::{fmt, EnvFilter};

use crate::cli::Args;
use crate::context::AppContext;
use crate::event_sink::HttpEventSink;
use crate::host_bridge::WorldRootHostBridge;
use crate::progress_transport::HttpProgressTransport;

fn init_tracing() {
    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into()))
        .with(fmt::layer())
        .init();
}

/// Where `ConfigSync` persists a remote-applied config, matching the path
/// `audit_config::ConfigLoader` would pick back up on the next startup.
fn config_store_path(args: &Args) -> PathBuf {
    args.config_path
        .clone()
        .unwrap_or_else(|| PathBuf::from("audit.conf"))
}

#[tokio::main(flavor = "multi_thread")]
async fn main() -> anyhow::Result<()> {
    init_tracing();
    let args = Args::parse();

    let config = match &args.config_path {
        Some(path) => audit_config::ConfigLoader::load_from_file(path)?,
        None => audit_config::ConfigLoader::load_from_env()?.0,
    };
    info!(
        server_id = %args.server_id,
        world_root = %args.world_root.display(),
        backend_url = %args.backend_url,
        "starting audit daemon"
    );

    let server_id = ServerId(args.server_id.clone());
    let live_config = Arc::new(ArcSwap::from_pointee(config));
    let runtime = tokio::runtime::Handle::current();

    let ctx = AppContext {
        server_id: server_id.clone(),
        host: Arc::new(WorldRootHostBridge::new(args.world_root.clone())),
        sink: Arc::new(HttpEventSink::new(
            &args.backend_url,
            args.auth_token.clone(),
            runtime.clone(),
        )),
        progress_transport: Arc::new(HttpProgressTransport::new(
            &args.backend_url,
            args.auth_token.clone(),
            runtime.clone(),
        )),
        live_config: live_config.clone(),
    };

    let mut scheduler = MonitorScheduler::new(
        ctx.server_id.clone(),
        ctx.host.clone(),
        ctx.sink.clone(),
        ctx.live_config.clone(),
        runtime.clone(),
    );
    let mut progress_reporter = ProgressReporter::new(ctx.progress_transport.clone());

    let config_store = Arc::new(audit_config::FileConfigStore::new(config_store_path(&args)));
    let config_sync = ConfigSync::new(
        server_id,
        args.backend_url.clone(),
        args.auth_token.clone(),
        live_config,
        config_store,
    );

    let (shutdown_tx, shutdown_rx) = tokio::sync::watch::channel(false);
    let config_sync_handle = tokio::spawn(config_sync.run(shutdown_rx));

    let mut tick_interval = tokio::time::interval(std::time::Duration::from_millis(args.tick_interval_ms));

    loop {
        tokio::select! {
            _ = tick_interval.tick() => {
                let now_ms = chrono::Utc::now().timestamp_millis();
                scheduler.tick(now_ms);
                progress_reporter.report(now_ms, &scheduler.progress());
            }
            _ = tokio::signal::ctrl_c() => {
                info!("shutdown signal received");
                break;
            }
        }
    }

    scheduler.shutdown();
    let _ = shutdown_tx.send(true);
    if let Err(err) = config_sync_handle.await {
        warn!(error = %err, "config sync task did not shut down cleanly");
    }

    info!("audit daemon stopped");
    Ok(())
}
