use anyhow::Context;
use lingohow_backend::container::AppContainer;
use lingohow_backend::domain::audio::{AudioSyncApi, BatchRecord};
use lingohow_backend::infrastructure::config::{Config, LogFormat};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load configuration
    let config = Config::from_env().map_err(|e| anyhow::anyhow!("invalid configuration: {}", e))?;

    // Initialize logging
    init_logging(&config);

    tracing::info!(
        environment = ?config.environment,
        r2_usable = config.r2.is_usable(),
        cos_usable = config.cos.is_usable(),
        "Starting lingohow backend"
    );

    let batch_input = config.batch_input_file.clone();
    let container = AppContainer::build(config).await;

    let Some(path) = batch_input else {
        tracing::warn!("BATCH_INPUT_FILE not set, nothing to do");
        return Ok(());
    };

    let raw = tokio::fs::read(&path)
        .await
        .with_context(|| format!("failed to read {}", path.display()))?;
    let records: Vec<BatchRecord> = serde_json::from_slice(&raw)
        .with_context(|| format!("{} is not a JSON array of batch records", path.display()))?;

    tracing::info!(records = records.len(), input = %path.display(), "Running audio sync batch");

    let report = container
        .audio_sync
        .sync_batch(records)
        .await
        .map_err(|e| anyhow::anyhow!("audio sync failed: {}", e))?;

    let output = if container.config.is_development() {
        serde_json::to_string_pretty(&report)?
    } else {
        serde_json::to_string(&report)?
    };
    println!("{}", output);

    Ok(())
}

fn init_logging(config: &Config) {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| "lingohow_backend=debug".into());

    // Logs go to stderr so stdout carries only the report
    if config.log_format == LogFormat::Json {
        tracing_subscriber::registry()
            .with(filter)
            .with(tracing_subscriber::fmt::layer().json().with_writer(std::io::stderr))
            .init();
    } else {
        tracing_subscriber::registry()
            .with(filter)
            .with(tracing_subscriber::fmt::layer().pretty().with_writer(std::io::stderr))
            .init();
    }
}
