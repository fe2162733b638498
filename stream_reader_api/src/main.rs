#![deny(clippy::style)]

use anyhow::Context;
use stream_reader_api::app_config::AppConfig;
use stream_reader_api::startup::run_until_stopped;
use tracing::info;
use tracing::level_filters::LevelFilter;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{EnvFilter, Layer};

#[tokio::main]
async fn main() -> Result<(), anyhow::Error> {
    let filter = EnvFilter::builder()
        .with_default_directive(LevelFilter::INFO.into())
        .from_env_lossy();
    let directives = filter.to_string();

    tracing_subscriber::registry()
        .with(
            console_subscriber::ConsoleLayer::builder()
                .with_default_env()
                .spawn(),
        )
        .with(tracing_subscriber::fmt::layer().with_filter(filter))
        .init();

    info!("Log filter: {}", directives);

    let config = AppConfig::build().context("While building app config")?;

    run_until_stopped(config).await
}
