//! `memri serve`: capture loops plus the HTTP API in one process.

use std::sync::Arc;

use anyhow::Result;
use tokio::sync::watch;
use tracing::{error, info, warn};

use memri::capture::{self, CaptureConfig, CaptureHandle};
use memri::config::MemriConfig;
use memri::events::{EventBus, NotifyingSink};
use memri::storage::{CaptureSink, Store};
use memri::{ocr, seed, server};

pub async fn serve(config: MemriConfig, no_capture: bool) -> Result<()> {
    let store = Store::open(&config)?;
    info!(db = %config.resolved_db_path().display(), "database ready");

    let seed_dir = memri::config::expand_tilde(&config.capture.seed_dir);
    if let Err(err) = seed::seed_captures_from_dir(&store, &seed_dir).await {
        error!(dir = %seed_dir.display(), "failed to seed captures: {err:#}");
    }

    let events = EventBus::new();
    let handles = if no_capture || !config.capture.enabled {
        info!("screen capture disabled; serving stored data only");
        Vec::new()
    } else {
        start_capture_loops(&config, &store, &events).await?
    };

    let state = server::AppState::from_config(&config, store, events)?;

    let (stop_tx, mut stop_rx) = watch::channel(false);
    let shutdown = async move {
        let _ = stop_rx.wait_for(|stop| *stop).await;
    };
    let mut server_task = tokio::spawn({
        let addr = config.server.addr.clone();
        let api_key = config.server.api_key.clone();
        async move { server::serve(state, &addr, api_key, shutdown).await }
    });

    let finished_early = tokio::select! {
        result = tokio::signal::ctrl_c() => {
            if let Err(err) = result {
                warn!("failed to listen for ctrl-c: {err}");
            }
            info!("shutdown requested");
            None
        }
        // bind failures surface here
        joined = &mut server_task => Some(joined),
    };

    for handle in handles {
        handle.shutdown().await;
    }
    match finished_early {
        Some(joined) => joined?,
        None => {
            let _ = stop_tx.send(true);
            server_task.await?
        }
    }
}

async fn start_capture_loops(
    config: &MemriConfig,
    store: &Store,
    events: &EventBus,
) -> Result<Vec<CaptureHandle>> {
    let source = capture::default_source();
    let available: Vec<u32> = capture::list_monitors(source.as_ref())
        .await?
        .iter()
        .map(|m| m.id)
        .collect();
    if available.is_empty() {
        warn!(source = source.name(), "no monitors detected; capture will not start");
        return Ok(Vec::new());
    }

    let monitors = capture::resolve_monitors(&config.requested_monitors(), &available)?;
    info!(?available, using = ?monitors, "monitors resolved");

    let engine = ocr::create_engine(config)?;
    let sink: Arc<dyn CaptureSink> = Arc::new(NotifyingSink::new(Arc::new(store.clone()), events.clone()));

    monitors
        .into_iter()
        .map(|id| {
            capture::start_capture(
                CaptureConfig::from_config(config, id),
                source.clone(),
                engine.clone(),
                sink.clone(),
            )
        })
        .collect()
}
