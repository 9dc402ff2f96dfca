//! Axum API server binary.

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{anyhow, Context};
use tokio::sync::oneshot;
use tracing::{error, info};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use deeptraffic_api::{create_router, metrics, ApiConfig, AppState, LoadedModels};
use deeptraffic_vision::TrackerRegistry;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load environment variables
    dotenvy::dotenv().ok();

    // Colored output for dev, JSON for production
    let use_json = std::env::var("LOG_FORMAT")
        .map(|v| v.to_lowercase() == "json")
        .unwrap_or(false);

    let env_filter = EnvFilter::from_default_env().add_directive("deeptraffic=info".parse()?);

    if use_json {
        tracing_subscriber::registry()
            .with(fmt::layer().json())
            .with(env_filter)
            .init();
    } else {
        tracing_subscriber::registry()
            .with(
                fmt::layer()
                    .with_ansi(true)
                    .with_target(true)
                    .with_thread_ids(false)
                    .with_file(false)
                    .with_line_number(false),
            )
            .with(env_filter)
            .init();
    }

    info!("Starting deeptraffic-api");

    let mut config = ApiConfig::from_env();
    if let Err(e) = config.resolve_model_paths() {
        error!(error = %e, "Model weights missing, refusing to start");
        return Err(anyhow!(e));
    }
    info!(
        host = %config.host,
        port = config.port,
        environment = %config.environment,
        detector = %config.detector.model_path.display(),
        explain = %config.saliency.model_path.display(),
        "API config loaded"
    );

    let metrics_handle = if config.metrics_enabled {
        info!("Prometheus metrics enabled at /metrics");
        Some(metrics::init_metrics().context("Failed to install Prometheus recorder")?)
    } else {
        None
    };

    let state = AppState::new(config.clone());
    metrics::set_model_state(0.0);

    tokio::spawn(evict_idle_streams(
        Arc::clone(&state.trackers),
        config.streams.idle_ttl,
    ));

    // Bind before loading so probes can see the loading state
    let addr: SocketAddr = format!("{}:{}", config.host, config.port)
        .parse()
        .context("Invalid bind address")?;
    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .with_context(|| format!("Failed to bind {}", addr))?;
    info!("Listening on {}", addr);

    let (load_failed_tx, load_failed_rx) = oneshot::channel::<String>();
    let lifecycle = Arc::clone(&state.lifecycle);
    let detector_config = config.detector.clone();
    let saliency_config = config.saliency.clone();
    let loader = tokio::spawn(async move {
        let result = lifecycle
            .load(move || LoadedModels::from_config(&detector_config, &saliency_config))
            .await;
        if let Err(e) = &result {
            let _ = load_failed_tx.send(e.to_string());
        }
        result
    });

    let app = create_router(state.clone(), metrics_handle);
    axum::serve(listener, app.into_make_service_with_connect_info::<SocketAddr>())
        .with_graceful_shutdown(shutdown_signal(load_failed_rx))
        .await
        .context("Server error")?;

    state.lifecycle.unload().await;

    if loader.is_finished() {
        if let Ok(Err(e)) = loader.await {
            return Err(anyhow!("Model loading failed: {}", e));
        }
    } else {
        loader.abort();
    }

    info!("Server shutdown complete");
    Ok(())
}

/// Periodically drop tracker sessions that have gone idle.
async fn evict_idle_streams(trackers: Arc<TrackerRegistry>, idle_ttl: Duration) {
    let period = (idle_ttl / 2).max(Duration::from_secs(1));
    let mut ticker = tokio::time::interval(period);
    loop {
        ticker.tick().await;
        let evicted = trackers.evict_idle();
        if evicted > 0 {
            info!(evicted, remaining = trackers.len(), "Evicted idle tracker sessions");
        }
        metrics::set_active_streams(trackers.len());
    }
}

/// Resolves on Ctrl-C, SIGTERM, or a failed model load.
async fn shutdown_signal(load_failed: oneshot::Receiver<String>) {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            error!(error = %e, "Failed to install Ctrl-C handler");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                error!(error = %e, "Failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    let load_failed = async {
        match load_failed.await {
            Ok(reason) => error!(reason = %reason, "Shutting down after model load failure"),
            // Sender dropped: models loaded, keep serving
            Err(_) => std::future::pending::<()>().await,
        }
    };

    tokio::select! {
        _ = ctrl_c => info!("Received Ctrl-C"),
        _ = terminate => info!("Received SIGTERM"),
        _ = load_failed => {}
    }
}
