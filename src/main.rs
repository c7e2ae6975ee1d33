use anyhow::{Context, Result};
use chrono::Utc;
use clap::Parser;
use std::sync::Arc;
use tracing::info;

use naka::api::ApiServer;
use naka::cli::{Cli, Commands};
use naka::geo::{build_circle_polygon, LatLng};
use naka::store::{MemoryStore, PgStore, Store};
use naka::sweep::sweep_once;
use naka::telemetry;
use naka::utils::Config;

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();

    if let Err(e) = telemetry::init_telemetry() {
        eprintln!("Failed to initialize telemetry: {}", e);
    }

    let cli = Cli::parse();
    let config = Config::load(cli.config.as_deref()).context("Failed to load configuration")?;

    let result = match &cli.command {
        Commands::Circle { lat, lng, radius, sides } => {
            circle_command(LatLng::new(*lat, *lng), *radius, sides.unwrap_or(config.polygon_sides))
        }
        Commands::Sweep => {
            let backend = open_store(&cli, &config).await?;
            let result = sweep_command(Arc::clone(&backend.store)).await;
            backend.close();
            result
        }
        Commands::Serve { host, port } => {
            let backend = open_store(&cli, &config).await?;
            let result = serve_command(Arc::clone(&backend.store), backend.name, config, host.clone(), *port).await;
            backend.close();
            result
        }
    };

    telemetry::shutdown_telemetry();
    result
}

struct Backend {
    store: Arc<dyn Store>,
    name: &'static str,
    postgres: Option<PgStore>,
}

impl Backend {
    /// Stops the PostgreSQL change listener, if there is one.
    fn close(&self) {
        if let Some(postgres) = &self.postgres {
            postgres.shutdown();
        }
    }
}

/// In-process store with `--memory`, PostgreSQL otherwise.
async fn open_store(cli: &Cli, config: &Config) -> Result<Backend> {
    if cli.memory {
        info!("Using in-memory store");
        return Ok(Backend {
            store: Arc::new(MemoryStore::new()),
            name: "memory",
            postgres: None,
        });
    }

    let database_url = cli
        .database_url
        .clone()
        .or_else(|| config.database_url.clone())
        .context("DATABASE_URL must be set (or pass --memory)")?;

    let store = PgStore::connect(&database_url)
        .await
        .context("Failed to connect to database")?;

    Ok(Backend {
        store: Arc::new(store.clone()),
        name: "postgres",
        postgres: Some(store),
    })
}

fn circle_command(center: LatLng, radius_m: f64, sides: usize) -> Result<()> {
    let polygon = build_circle_polygon(center, radius_m, sides)?;
    println!("{}", serde_json::to_string_pretty(&polygon)?);
    Ok(())
}

async fn sweep_command(store: Arc<dyn Store>) -> Result<()> {
    let duties = store.subscribe().borrow().clone();
    let report = sweep_once(store.as_ref(), &duties, Utc::now()).await;

    println!("{}", serde_json::to_string(&report)?);
    Ok(())
}

async fn serve_command(
    store: Arc<dyn Store>,
    backend: &'static str,
    config: Config,
    host: String,
    port: u16,
) -> Result<()> {
    info!("Starting naka API server");

    let server = ApiServer::new(store, backend, config, host, port);
    server.run().await?;

    Ok(())
}
