use anyhow::{bail, Context, Result};
use opentelemetry::global;
use std::fs::OpenOptions;
use std::str::FromStr;
use std::sync::Arc;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

const DEFAULT_FILTER: &str = "naka=info,tower_http=info";

/// Where spans and log records go, chosen by `OTEL_EXPORTER`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LogSink {
    Stdout,
    /// JSON lines appended to `LOG_FILE`.
    File(String),
    Otlp,
}

impl FromStr for LogSink {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "" | "stdout" => Ok(LogSink::Stdout),
            "file" => Ok(LogSink::File(
                std::env::var("LOG_FILE").unwrap_or_else(|_| "naka.log".to_string()),
            )),
            "otlp" => Ok(LogSink::Otlp),
            other => bail!("Unknown OTEL_EXPORTER: {}", other),
        }
    }
}

impl LogSink {
    pub fn from_env() -> Self {
        let requested = std::env::var("OTEL_EXPORTER").unwrap_or_default();
        requested.parse().unwrap_or_else(|e| {
            eprintln!("{}, falling back to stdout", e);
            LogSink::Stdout
        })
    }
}

/// `RUST_LOG` when set, otherwise info for this crate and the HTTP layer.
fn env_filter() -> EnvFilter {
    EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(DEFAULT_FILTER))
}

pub fn init_telemetry() -> Result<()> {
    match LogSink::from_env() {
        LogSink::Stdout => init_stdout(),
        LogSink::File(path) => init_file(&path),
        LogSink::Otlp => init_otlp(),
    }
}

fn init_otlp() -> Result<()> {
    let service_name = std::env::var("OTEL_SERVICE_NAME").unwrap_or_else(|_| "naka".to_string());

    let tracer = opentelemetry_otlp::new_pipeline()
        .tracing()
        .with_exporter(opentelemetry_otlp::new_exporter().tonic())
        .with_trace_config(opentelemetry_sdk::trace::config().with_resource(
            opentelemetry_sdk::Resource::new(vec![opentelemetry::KeyValue::new(
                "service.name",
                service_name,
            )]),
        ))
        .install_batch(opentelemetry_sdk::runtime::Tokio)
        .context("Failed to install OTLP pipeline")?;

    tracing_subscriber::registry()
        .with(tracing_opentelemetry::layer().with_tracer(tracer))
        .with(tracing_subscriber::fmt::layer())
        .with(env_filter())
        .try_init()?;

    Ok(())
}

fn init_stdout() -> Result<()> {
    tracing_subscriber::registry()
        .with(tracing_subscriber::fmt::layer())
        .with(env_filter())
        .try_init()?;

    Ok(())
}

fn init_file(path: &str) -> Result<()> {
    let log_file = OpenOptions::new()
        .create(true)
        .append(true)
        .open(path)
        .with_context(|| format!("Failed to open log file {}", path))?;

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::fmt::layer()
                .json()
                .with_writer(Arc::new(log_file))
                .with_ansi(false),
        )
        .with(env_filter())
        .try_init()?;

    eprintln!("Logging to file: {}", path);

    Ok(())
}

pub fn shutdown_telemetry() {
    global::shutdown_tracer_provider();
}
