use crate::connection::Connection;
use crate::connection_settings::{validate_endpoints, BrokerEndpoint};
use crate::error::{CloseError, ReaderError};
use crate::metadata::{Stream, VirtualHost};
use crate::session::SessionFactory;
use anyhow::Context;
use getset::Getters;
use std::collections::HashMap;
use std::future::Future;
use std::sync::Arc;
use tokio::select;
use tokio::sync::RwLock;
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn, Instrument, Span};

/// Owns one [`Connection`] per configured broker and answers aggregate queries across them.
pub struct ConnectionManager {
    endpoints: Vec<BrokerEndpoint>,
    connections: RwLock<HashMap<String, Arc<Connection>>>,
    session_factory: Arc<dyn SessionFactory>,
}

#[derive(Debug)]
pub struct FailedConnection {
    pub id: String,
    pub error: ReaderError,
}

#[derive(Debug, Default, Getters)]
#[getset(get = "pub")]
pub struct ConnectReport {
    connected: Vec<String>,
    failed: Vec<FailedConnection>,
}

impl ConnectionManager {
    /// Validates `endpoints` before anything is opened.
    pub fn new(
        mut endpoints: Vec<BrokerEndpoint>,
        session_factory: Arc<dyn SessionFactory>,
    ) -> Result<Self, ReaderError> {
        validate_endpoints(&mut endpoints)?;

        Ok(Self {
            endpoints,
            connections: RwLock::new(HashMap::new()),
            session_factory,
        })
    }

    /// Opens every endpoint that isn't open yet.
    ///
    /// An endpoint that fails to open is reported and left out of the map; the others are kept.
    pub async fn connect(&self, cancellation_token: &CancellationToken) -> ConnectReport {
        let mut connections = self.connections.write().await;
        let mut report = ConnectReport::default();

        for endpoint in &self.endpoints {
            if connections.contains_key(&endpoint.id) {
                continue;
            }

            let id = endpoint.id.clone();
            let opened = select! {
                opened = Connection::open(endpoint.clone(), self.session_factory.clone()) => opened,
                _ = cancellation_token.cancelled() => Err(ReaderError::Cancelled),
            };

            match opened {
                Ok(connection) => {
                    connections.insert(id.clone(), Arc::new(connection));
                    report.connected.push(id);
                }
                Err(error) => {
                    warn!("Couldn't open connection {}: {}", id, error);
                    report.failed.push(FailedConnection { id, error });
                }
            }
        }

        info!(
            "Connected to {} of {} broker(s)",
            connections.len(),
            self.endpoints.len()
        );

        report
    }

    /// Closes every open connection, collecting all failures instead of stopping at the first.
    pub async fn close(&self) -> Result<(), ReaderError> {
        let mut connections = self.connections.write().await;

        let mut errors = vec![];
        for (id, connection) in connections.drain() {
            if let Err(error) = connection.close().await {
                error!("Error while closing connection {}: {:?}", id, error);
                errors.push(CloseError {
                    connection_id: id,
                    error,
                });
            }
        }

        if errors.is_empty() {
            Ok(())
        } else {
            Err(ReaderError::Close(errors))
        }
    }

    pub async fn get_connection(&self, id: &str) -> Result<Arc<Connection>, ReaderError> {
        self.connections
            .read()
            .await
            .get(id)
            .cloned()
            .ok_or_else(|| ReaderError::NotFound(id.to_owned()))
    }

    pub fn list_connections(&self) -> &[BrokerEndpoint] {
        &self.endpoints
    }

    pub async fn list_vhosts(
        &self,
        cancellation_token: &CancellationToken,
    ) -> Result<Vec<VirtualHost>, ReaderError> {
        self.fan_out(cancellation_token, |connection, token| async move {
            connection.list_vhosts(&token).await
        })
        .await
    }

    pub async fn list_streams(
        &self,
        cancellation_token: &CancellationToken,
    ) -> Result<Vec<Stream>, ReaderError> {
        self.fan_out(cancellation_token, |connection, token| async move {
            connection.list_streams(&token).await
        })
        .await
    }

    /// Runs `query` against every open connection concurrently and concatenates the results.
    /// The first failure aborts the remaining tasks.
    async fn fan_out<T, F, Fut>(
        &self,
        cancellation_token: &CancellationToken,
        query: F,
    ) -> Result<Vec<T>, ReaderError>
    where
        T: Send + 'static,
        F: Fn(Arc<Connection>, CancellationToken) -> Fut,
        Fut: Future<Output = Result<Vec<T>, ReaderError>> + Send + 'static,
    {
        let connections = self.connections.read().await;

        let mut tasks = JoinSet::new();
        for connection in connections.values() {
            let id = connection.id().to_owned();
            let future = query(connection.clone(), cancellation_token.clone());
            tasks.spawn(async move { (id, future.await) }.instrument(Span::current()));
        }

        let mut results = vec![];
        while let Some(joined) = tasks.join_next().await {
            let (id, result) = joined.context("While joining discovery task")?;
            match result {
                Ok(items) => results.extend(items),
                Err(ReaderError::Cancelled) => return Err(ReaderError::Cancelled),
                Err(e) => {
                    error!("Discovery failed for connection {}: {}", id, e);
                    return Err(anyhow::Error::new(e)
                        .context(format!("While listing connection {id}"))
                        .into());
                }
            }
        }

        Ok(results)
    }
}
