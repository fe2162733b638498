use crate::connection_settings::BrokerEndpoint;
use crate::error::ReaderError;
use crate::metadata::api_models::{ApiQueue, ApiQueueInfo, ApiVHost, STREAM_QUEUE_TYPE};
use crate::metadata::{QueueInfo, Stream, VirtualHost};
use anyhow::{anyhow, Context};
use reqwest::Url;
use serde::de::DeserializeOwned;
use std::time::Duration;
use tracing::{trace, warn};

pub const METADATA_TIMEOUT: Duration = Duration::from_secs(10);

/// Talks to one broker's management HTTP API.
#[derive(Debug, Clone)]
pub struct MetadataClient {
    client: reqwest::Client,
    base_url: Url,
    connection_id: String,
    username: String,
    password: String,
}

impl MetadataClient {
    pub fn new(endpoint: &BrokerEndpoint) -> Result<Self, ReaderError> {
        let management_url = endpoint.management_url();
        let base_url = Url::parse(&management_url)
            .with_context(|| format!("While parsing management url '{management_url}'"))?;

        let client = reqwest::Client::builder()
            .timeout(METADATA_TIMEOUT)
            .build()
            .context("While building management API client")?;

        Ok(Self {
            client,
            base_url,
            connection_id: endpoint.id.clone(),
            username: endpoint.username.clone(),
            password: endpoint.password.clone(),
        })
    }

    /// Lists every vhost with its streams. A vhost whose streams can't be listed is left out.
    pub async fn list_vhosts(&self) -> Result<Vec<VirtualHost>, ReaderError> {
        let url = self.api_url(&["vhosts"])?;
        let api_vhosts: Vec<ApiVHost> = self.get_json(url).await?;

        let mut vhosts = Vec::with_capacity(api_vhosts.len());
        for api_vhost in api_vhosts {
            match self.list_streams_in_vhost(&api_vhost.name).await {
                Ok(streams) => vhosts.push(VirtualHost {
                    name: api_vhost.name,
                    connection_id: self.connection_id.clone(),
                    streams,
                }),
                Err(e) => warn!(
                    "Skipping vhost '{}' of connection {}: {}",
                    api_vhost.name, self.connection_id, e
                ),
            }
        }

        Ok(vhosts)
    }

    pub async fn list_streams_in_vhost(&self, vhost: &str) -> Result<Vec<Stream>, ReaderError> {
        let url = self.api_url(&["queues", vhost])?;
        let queues: Vec<ApiQueue> = self.get_json(url).await?;

        let streams = queues
            .into_iter()
            .filter(|queue| queue.kind == STREAM_QUEUE_TYPE)
            .map(|queue| Stream {
                name: queue.name,
                connection_id: self.connection_id.clone(),
                vhost: if queue.vhost.is_empty() {
                    vhost.to_owned()
                } else {
                    queue.vhost
                },
            })
            .collect();

        Ok(streams)
    }

    pub async fn get_queue_info(&self, vhost: &str, name: &str) -> Result<QueueInfo, ReaderError> {
        let url = self.api_url(&["queues", vhost, name])?;
        let info: ApiQueueInfo = self.get_json(url).await?;

        Ok(QueueInfo {
            messages: info.messages.unwrap_or_default(),
            size: info
                .backing_queue_status
                .and_then(|status| status.size)
                .unwrap_or_default(),
        })
    }

    fn api_url(&self, segments: &[&str]) -> Result<Url, ReaderError> {
        let mut url = self.base_url.clone();
        {
            let mut path = url
                .path_segments_mut()
                .map_err(|_| anyhow!("Management url {} can't be a base", self.base_url))?;
            // each segment is percent-encoded on its own, so vhost "/" becomes "%2F"
            path.clear().push("api").extend(segments);
        }

        Ok(url)
    }

    async fn get_json<T: DeserializeOwned>(&self, url: Url) -> Result<T, ReaderError> {
        trace!("GET {}", url);

        let response = self
            .client
            .get(url.clone())
            .basic_auth(&self.username, Some(&self.password))
            .send()
            .await
            .with_context(|| format!("While querying management API {url}"))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(ReaderError::UpstreamApi {
                status: status.as_u16(),
                body,
            });
        }

        let value = response
            .json::<T>()
            .await
            .with_context(|| format!("While decoding management API response from {url}"))?;

        Ok(value)
    }
}
