//! Hark daemon entry point.
//!
//! Loads `~/.config/hark/config.toml` when present (defaults otherwise) and
//! runs the supervisor until interrupted. All diagnostics go to stderr.

use hark::{Assistant, AssistantConfig};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    let config_path = AssistantConfig::default_config_path();
    let config = if config_path.exists() {
        tracing::info!(path = %config_path.display(), "loading config");
        AssistantConfig::from_file(&config_path)?
    } else {
        tracing::info!(path = %config_path.display(), "no config file; using defaults");
        AssistantConfig::default()
    };

    tracing::info!("hark starting up");
    Assistant::new(config)?.run().await?;
    tracing::info!("hark shut down cleanly");
    Ok(())
}
