// Nearby Linux: discovery, transport and periodic feed sync daemon.

mod config;
mod discovery;
mod transport;

use std::sync::Arc;

use anyhow::Context;
use nearby_core::{ContentStore, NetworkManager, PeerId, SyncEvent};
use tokio::sync::broadcast::error::RecvError;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

const VERSION: &str = env!("CARGO_PKG_VERSION");

fn main() -> anyhow::Result<()> {
    for arg in std::env::args().skip(1) {
        if arg == "--version" || arg == "-V" {
            println!("nearby-linux {}", VERSION);
            return Ok(());
        }
    }

    init_tracing();
    let cfg = config::load();
    let local = PeerId::new(cfg.peer_name.clone().unwrap_or_else(generated_name));
    tracing::info!(peer = %local, version = VERSION, "starting");

    let rt = tokio::runtime::Runtime::new().context("failed to start runtime")?;
    rt.block_on(async {
        let (transport, inbound) = transport::TcpTransport::new(local.clone());
        let sync_config = cfg.sync_config();
        let store = Arc::new(ContentStore::from_config(&sync_config));
        let manager = NetworkManager::new(
            local.clone(),
            Arc::new(transport.clone()),
            store,
            sync_config,
        );
        let events = tokio::spawn(log_events(manager.subscribe()));
        let handle = manager.start(inbound);

        let (connect_tx, connect_rx) = tokio::sync::mpsc::unbounded_channel();
        let disc_port = cfg.discovery_port;
        let transport_port = cfg.transport_port;
        let disc_local = local.clone();
        tokio::spawn(async move {
            if let Err(e) =
                discovery::run_discovery(disc_local, disc_port, transport_port, connect_tx).await
            {
                tracing::error!(error = %e, "discovery stopped");
            }
        });
        tokio::spawn(async move {
            if let Err(e) = transport.run(transport_port, connect_rx).await {
                tracing::error!(error = %e, "transport stopped");
            }
        });

        shutdown_signal().await?;
        tracing::info!("shutting down");
        handle.shutdown();
        events.abort();
        anyhow::Ok(())
    })?;
    Ok(())
}

fn init_tracing() {
    let filter = std::env::var("NEARBY_LOG")
        .ok()
        .and_then(|s| EnvFilter::try_new(s).ok())
        .or_else(|| EnvFilter::try_from_default_env().ok())
        .unwrap_or_else(|| EnvFilter::new("info"));
    tracing_subscriber::registry()
        .with(fmt::layer())
        .with(filter)
        .init();
}

fn generated_name() -> String {
    let id = uuid::Uuid::new_v4().simple().to_string();
    format!("nearby-{}", &id[..8])
}

async fn log_events(mut events: tokio::sync::broadcast::Receiver<SyncEvent>) {
    loop {
        match events.recv().await {
            Ok(SyncEvent::FeedUpdated { peer, count }) if count > 0 => {
                tracing::info!(peer = %peer, count, "new feed items");
            }
            Ok(SyncEvent::ContentReceived { peer, content_id }) => {
                tracing::info!(peer = %peer, content = %content_id, "content shared with us");
            }
            Ok(event) => tracing::debug!(?event, "sync event"),
            Err(RecvError::Lagged(n)) => tracing::warn!(skipped = n, "event log lagging"),
            Err(RecvError::Closed) => break,
        }
    }
}

/// Wait for Ctrl+C or SIGTERM (Unix).
async fn shutdown_signal() -> anyhow::Result<()> {
    #[cfg(unix)]
    {
        use tokio::signal::unix::{signal, SignalKind};
        let mut sigterm = signal(SignalKind::terminate()).context("failed to install SIGTERM handler")?;
        tokio::select! {
            _ = tokio::signal::ctrl_c() => {}
            _ = sigterm.recv() => {}
        }
    }
    #[cfg(not(unix))]
    {
        tokio::signal::ctrl_c().await?;
    }
    Ok(())
}
