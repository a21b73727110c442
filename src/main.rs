use std::sync::Arc;

use tracing::info;
use tracing_subscriber::EnvFilter;

use roomwatch::clock::SystemClock;
use roomwatch::config::Config;
use roomwatch::engine::Engine;
use roomwatch::scheduler::Scheduler;
use roomwatch::store::InMemoryStore;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let config = Config::from_env();
    roomwatch::observability::init(config.metrics_port)?;

    let store = if config.data_file.exists() {
        Arc::new(InMemoryStore::load_json(&config.data_file)?)
    } else {
        tracing::warn!("{} not found, starting with an empty hotel", config.data_file.display());
        Arc::new(InMemoryStore::with_records(Vec::new(), Vec::new()))
    };

    let engine = Arc::new(Engine::new(
        store.clone(),
        store.clone(),
        Arc::new(SystemClock),
        config.engine,
    ));
    let mut scheduler = Scheduler::new(engine, config.scheduler);

    info!("roomwatch starting");
    info!("  data_file: {}", config.data_file.display());
    info!("  reserved lookahead: {} min", config.engine.reserved_lookahead_ms / 60_000);
    info!(
        "  metrics: {}",
        config
            .metrics_port
            .map_or("disabled".to_string(), |p| format!("http://0.0.0.0:{p}/metrics"))
    );
    scheduler.start();

    // SIGHUP forces a check; ctrl-c/SIGTERM shut down.
    #[cfg(unix)]
    {
        use tokio::signal::unix::{signal, SignalKind};
        let mut sigterm = signal(SignalKind::terminate())?;
        let mut sighup = signal(SignalKind::hangup())?;
        loop {
            tokio::select! {
                _ = tokio::signal::ctrl_c() => break,
                _ = sigterm.recv() => break,
                _ = sighup.recv() => scheduler.force_check(),
            }
        }
    }
    #[cfg(not(unix))]
    {
        tokio::signal::ctrl_c().await?;
    }

    info!("shutdown signal received");
    scheduler.stop().await;

    store.save_json(&config.data_file)?;
    info!("saved {}", config.data_file.display());
    info!("roomwatch stopped");
    Ok(())
}
