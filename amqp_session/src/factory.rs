use crate::AmqpStreamSession;
use anyhow::Context;
use async_trait::async_trait;
use lapin::uri::{AMQPAuthority, AMQPQueryString, AMQPUri, AMQPUserInfo};
use lapin::ConnectionProperties;
use std::time::Duration;
use stream_reader::connection_settings::BrokerEndpoint;
use stream_reader::session::{SessionFactory, StreamSession};
use tracing::debug;

pub const DEFAULT_CONNECT_TIMEOUT: Duration = Duration::from_secs(10);

/// Opens sessions over AMQP 0-9-1, consuming streams as queues with `x-stream-offset`.
#[derive(Debug, Clone)]
pub struct AmqpSessionFactory {
    connect_timeout: Duration,
}

impl AmqpSessionFactory {
    pub fn new(connect_timeout: Duration) -> Self {
        Self { connect_timeout }
    }

    fn uri(&self, endpoint: &BrokerEndpoint, vhost: &str) -> AMQPUri {
        AMQPUri {
            authority: AMQPAuthority {
                userinfo: AMQPUserInfo {
                    username: endpoint.username.clone(),
                    password: endpoint.password.clone(),
                },
                host: endpoint.host.clone(),
                port: endpoint.port,
            },
            vhost: vhost.to_owned(),
            query: AMQPQueryString {
                connection_timeout: Some(self.connect_timeout.as_millis() as u64),
                ..Default::default()
            },
            ..Default::default()
        }
    }
}

impl Default for AmqpSessionFactory {
    fn default() -> Self {
        Self::new(DEFAULT_CONNECT_TIMEOUT)
    }
}

#[async_trait]
impl SessionFactory for AmqpSessionFactory {
    async fn open(
        &self,
        endpoint: &BrokerEndpoint,
        vhost: &str,
    ) -> Result<Box<dyn StreamSession>, anyhow::Error> {
        debug!(
            "Connecting to {}:{} vhost '{}' as {}",
            endpoint.host, endpoint.port, vhost, endpoint.username
        );

        let properties = ConnectionProperties::default()
            .with_connection_name(format!("stream-reader-{}", endpoint.id).into());

        let connection = tokio::time::timeout(
            self.connect_timeout,
            lapin::Connection::connect_uri(self.uri(endpoint, vhost), properties),
        )
        .await
        .with_context(|| {
            format!(
                "While connecting to {}:{}, timed out after {:?}",
                endpoint.host, endpoint.port, self.connect_timeout
            )
        })?
        .with_context(|| format!("While connecting to {}:{}", endpoint.host, endpoint.port))?;

        Ok(Box::new(AmqpStreamSession::new(
            connection,
            endpoint.id.clone(),
            vhost.to_owned(),
        )))
    }
}
