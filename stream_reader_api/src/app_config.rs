use anyhow::{bail, Context};
use config::Config;
use serde::Deserialize;
use stream_reader::connection_settings::BrokerEndpoint;
use tracing::info;

fn default_connect_timeout_secs() -> u64 {
    10
}

#[derive(Deserialize, Debug)]
pub struct AppConfig {
    pub host: String,
    pub port: u16,
    #[serde(default = "default_connect_timeout_secs")]
    pub connect_timeout_secs: u64,
    #[serde(default)]
    pub connections: Vec<BrokerEndpoint>,
}

impl AppConfig {
    pub fn build() -> Result<Self, anyhow::Error> {
        let config = Config::builder()
            .add_source(config::File::with_name("appsettings"))
            .add_source(config::Environment::with_prefix("App").separator("__"))
            .build()
            .context("While building config")?;

        let deserialized_config: AppConfig = config
            .try_deserialize()
            .context("While deserializing config")?;

        if deserialized_config.connections.is_empty() {
            bail!("At least one connection must be configured");
        }

        info!("App config: {deserialized_config:?}");

        Ok(deserialized_config)
    }
}
