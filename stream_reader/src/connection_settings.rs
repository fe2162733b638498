use crate::error::ReaderError;
use serde::Deserialize;
use std::collections::HashSet;
use std::fmt;

pub const DEFAULT_VHOST: &str = "/";
pub const DEFAULT_STREAM_PORT: u16 = 5552;

/// Static description of one broker. Immutable once the manager is built.
#[derive(Clone, Deserialize)]
pub struct BrokerEndpoint {
    pub id: String,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub host: String,
    #[serde(default)]
    pub port: u16,
    #[serde(default)]
    pub stream_port: u16,
    #[serde(default)]
    pub http_port: u16,
    #[serde(default)]
    pub vhost: String,
    #[serde(default)]
    pub username: String,
    #[serde(default)]
    pub password: String,
}

impl BrokerEndpoint {
    pub fn default_vhost(&self) -> &str {
        if self.vhost.is_empty() {
            DEFAULT_VHOST
        } else {
            &self.vhost
        }
    }

    pub fn management_url(&self) -> String {
        format!("http://{}:{}", self.host, self.http_port)
    }
}

impl fmt::Debug for BrokerEndpoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BrokerEndpoint")
            .field("id", &self.id)
            .field("name", &self.name)
            .field("host", &self.host)
            .field("port", &self.port)
            .field("stream_port", &self.stream_port)
            .field("http_port", &self.http_port)
            .field("vhost", &self.vhost)
            .field("username", &self.username)
            .field("password", &"***")
            .finish()
    }
}

pub fn validate_endpoints(endpoints: &mut [BrokerEndpoint]) -> Result<(), ReaderError> {
    let mut seen = HashSet::with_capacity(endpoints.len());

    for (index, endpoint) in endpoints.iter_mut().enumerate() {
        if endpoint.id.is_empty() {
            return Err(config_error(format!("connection {index}: id is required")));
        }
        if !seen.insert(endpoint.id.clone()) {
            return Err(config_error(format!(
                "connection {index}: duplicate id '{}'",
                endpoint.id
            )));
        }

        let id = &endpoint.id;
        if endpoint.host.is_empty() {
            return Err(config_error(format!("connection '{id}': host is required")));
        }
        if endpoint.port == 0 {
            return Err(config_error(format!("connection '{id}': port must be positive")));
        }
        if endpoint.http_port == 0 {
            return Err(config_error(format!(
                "connection '{id}': http_port must be positive"
            )));
        }
        if endpoint.username.is_empty() {
            return Err(config_error(format!("connection '{id}': username is required")));
        }

        if endpoint.stream_port == 0 {
            endpoint.stream_port = DEFAULT_STREAM_PORT;
        }
    }

    Ok(())
}

fn config_error(message: String) -> ReaderError {
    ReaderError::Configuration(message)
}
