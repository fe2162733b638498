use crate::connection_settings::BrokerEndpoint;
use crate::error::ReaderError;
use crate::metadata::{MetadataClient, Stream, VirtualHost};
use crate::queries::get_stream_stats::{get_stream_stats, StreamStats};
use crate::queries::read_messages::{read_messages, MessageBatch, ReadLimit, ReadMessagesQuery};
use crate::session::{SessionFactory, StreamSession};
use crate::utils::run_cancellable;
use anyhow::{anyhow, Context};
use std::future::Future;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, info_span, warn, Instrument};

/// Runtime handle for one configured broker.
pub struct Connection {
    endpoint: BrokerEndpoint,
    metadata: MetadataClient,
    session: Arc<dyn StreamSession>,
    session_factory: Arc<dyn SessionFactory>,
}

/// Session used by one read or stats call. Ephemeral sessions are closed on release.
struct SessionLease {
    session: Arc<dyn StreamSession>,
    ephemeral: bool,
}

impl SessionLease {
    async fn acquire(
        endpoint: &BrokerEndpoint,
        vhost: &str,
        shared: Arc<dyn StreamSession>,
        session_factory: &dyn SessionFactory,
    ) -> Result<Self, ReaderError> {
        if vhost == endpoint.default_vhost() {
            return Ok(Self {
                session: shared,
                ephemeral: false,
            });
        }

        debug!(
            "Opening ephemeral session to vhost '{}' of connection {}",
            vhost, endpoint.id
        );
        let session = session_factory
            .open(endpoint, vhost)
            .await
            .with_context(|| format!("While opening session for vhost '{vhost}'"))?;

        Ok(Self {
            session: Arc::from(session),
            ephemeral: true,
        })
    }

    async fn release(self) {
        if !self.ephemeral {
            return;
        }
        if let Err(e) = self.session.close().await {
            warn!("Error while closing ephemeral session: {:?}", e);
        }
    }
}

impl Connection {
    #[tracing::instrument(skip_all, fields(connection_id = %endpoint.id))]
    pub async fn open(
        endpoint: BrokerEndpoint,
        session_factory: Arc<dyn SessionFactory>,
    ) -> Result<Self, ReaderError> {
        let metadata = MetadataClient::new(&endpoint)?;

        let session = session_factory
            .open(&endpoint, endpoint.default_vhost())
            .await
            .map_err(|error| ReaderError::Connection {
                id: endpoint.id.clone(),
                error,
            })?;

        info!(
            "Opened connection {} to {} (vhost '{}')",
            endpoint.id,
            endpoint.host,
            endpoint.default_vhost()
        );

        Ok(Self {
            endpoint,
            metadata,
            session: Arc::from(session),
            session_factory,
        })
    }

    pub fn id(&self) -> &str {
        &self.endpoint.id
    }

    pub async fn list_vhosts(
        &self,
        cancellation_token: &CancellationToken,
    ) -> Result<Vec<VirtualHost>, ReaderError> {
        run_cancellable(cancellation_token, self.metadata.list_vhosts()).await
    }

    /// Streams of the connection's default vhost.
    pub async fn list_streams(
        &self,
        cancellation_token: &CancellationToken,
    ) -> Result<Vec<Stream>, ReaderError> {
        self.list_streams_in_vhost(self.endpoint.default_vhost(), cancellation_token)
            .await
    }

    pub async fn list_streams_in_vhost(
        &self,
        vhost: &str,
        cancellation_token: &CancellationToken,
    ) -> Result<Vec<Stream>, ReaderError> {
        run_cancellable(
            cancellation_token,
            self.metadata.list_streams_in_vhost(vhost),
        )
        .await
    }

    pub async fn get_stream_stats(
        &self,
        stream: &str,
        cancellation_token: &CancellationToken,
    ) -> Result<StreamStats, ReaderError> {
        self.get_stream_stats_for_vhost(self.endpoint.default_vhost(), stream, cancellation_token)
            .await
    }

    #[tracing::instrument(skip(self, cancellation_token), fields(connection_id = %self.endpoint.id))]
    pub async fn get_stream_stats_for_vhost(
        &self,
        vhost: &str,
        stream: &str,
        cancellation_token: &CancellationToken,
    ) -> Result<StreamStats, ReaderError> {
        let queue_info = run_cancellable(
            cancellation_token,
            self.metadata.get_queue_info(vhost, stream),
        )
        .await?;

        let stream = stream.to_owned();
        self.with_session(vhost, cancellation_token, move |session, cancellation_token| async move {
            get_stream_stats(session.as_ref(), &stream, queue_info, &cancellation_token).await
        })
        .await
    }

    pub async fn read_messages(
        &self,
        stream: &str,
        offset: u64,
        limit: i64,
        cancellation_token: &CancellationToken,
    ) -> Result<MessageBatch, ReaderError> {
        self.read_messages_from_vhost(
            self.endpoint.default_vhost(),
            stream,
            offset,
            limit,
            cancellation_token,
        )
        .await
    }

    #[tracing::instrument(skip(self, cancellation_token), fields(connection_id = %self.endpoint.id))]
    pub async fn read_messages_from_vhost(
        &self,
        vhost: &str,
        stream: &str,
        offset: u64,
        limit: i64,
        cancellation_token: &CancellationToken,
    ) -> Result<MessageBatch, ReaderError> {
        let query = ReadMessagesQuery {
            stream: stream.to_owned(),
            offset,
            limit: ReadLimit::from_requested(limit),
        };

        self.with_session(vhost, cancellation_token, move |session, cancellation_token| async move {
            read_messages(session.as_ref(), query, &cancellation_token).await
        })
        .await
    }

    /// Closes the long-lived session. Called once, by the manager.
    pub async fn close(&self) -> Result<(), anyhow::Error> {
        self.session
            .close()
            .await
            .with_context(|| format!("While closing connection {}", self.endpoint.id))
    }

    /// Runs `work` on a session for `vhost` inside its own task.
    ///
    /// The task owns the lease, so an ephemeral session is released even when the caller's
    /// future is dropped halfway. Callers cancel through the token.
    async fn with_session<T, W, F>(
        &self,
        vhost: &str,
        cancellation_token: &CancellationToken,
        work: W,
    ) -> Result<T, ReaderError>
    where
        T: Send + 'static,
        W: FnOnce(Arc<dyn StreamSession>, CancellationToken) -> F + Send + 'static,
        F: Future<Output = Result<T, ReaderError>> + Send + 'static,
    {
        let endpoint = self.endpoint.clone();
        let shared = self.session.clone();
        let session_factory = self.session_factory.clone();
        let vhost = vhost.to_owned();
        let cancellation_token = cancellation_token.clone();

        let future = async move {
            let lease =
                SessionLease::acquire(&endpoint, &vhost, shared, session_factory.as_ref()).await?;

            let result = if cancellation_token.is_cancelled() {
                Err(ReaderError::Cancelled)
            } else {
                work(lease.session.clone(), cancellation_token).await
            };
            lease.release().await;

            result
        }
        .instrument(info_span!("Using session").or_current());

        tokio::task::spawn(future)
            .await
            .map_err(|e| anyhow!("Session task of connection {} failed: {e}", self.endpoint.id))?
    }
}
