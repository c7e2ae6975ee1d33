use anyhow::{Context, Result};
use log::info;
use std::sync::Arc;
use tokio::net::TcpListener;

use super::handlers::{AppState, AppStateInner};
use super::routes::create_router;
use crate::assignment::AssignmentPolicy;
use crate::cache::LiveData;
use crate::store::Store;
use crate::sweep::ExpirySweeper;
use crate::utils::Config;

/// Wires the shared caches and the sweeper around `store`. The sweeper is
/// created but not started.
pub fn build_state(store: Arc<dyn Store>, backend: &'static str, config: Config) -> Result<AppState> {
    let policy = AssignmentPolicy::from_config(&config).context("Invalid assignment settings")?;
    let live = LiveData::new(Arc::clone(&store));
    let views = live.acquire_all();
    let sweeper = ExpirySweeper::new(Arc::clone(&store), live.duties, config.sweep_interval());

    Ok(Arc::new(AppStateInner {
        store,
        backend,
        views,
        config,
        policy,
        sweeper,
    }))
}

pub struct ApiServer {
    store: Arc<dyn Store>,
    backend: &'static str,
    config: Config,
    host: String,
    port: u16,
}

impl ApiServer {
    pub fn new(store: Arc<dyn Store>, backend: &'static str, config: Config, host: String, port: u16) -> Self {
        Self {
            store,
            backend,
            config,
            host,
            port,
        }
    }

    pub async fn run(self) -> Result<()> {
        info!("{}", self.config);

        let app_state = build_state(self.store, self.backend, self.config)?;
        app_state
            .sweeper
            .start()
            .await
            .context("Failed to start expiry sweeper")?;

        let app = create_router(Arc::clone(&app_state));

        let addr = format!("{}:{}", self.host, self.port);
        info!("Starting API server on {}", addr);

        let listener = TcpListener::bind(&addr)
            .await
            .with_context(|| format!("Failed to bind to {}", addr))?;

        info!("API server listening on http://{}", addr);
        info!("Health check: http://{}/health", addr);
        info!("API endpoints: http://{}/api/v1/duties, /api/v1/officers, /api/v1/activities, /api/v1/map", addr);

        let served = axum::serve(listener, app)
            .with_graceful_shutdown(shutdown_signal())
            .await
            .context("Server error");

        app_state.sweeper.stop().await?;
        served
    }
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        log::error!("Failed to listen for shutdown signal: {}", e);
        std::future::pending::<()>().await;
    }
    info!("Shutdown signal received");
}
