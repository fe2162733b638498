use crate::error::ReaderError;
use crate::queries::read_messages::{MessageAccumulator, MessageBatch, ReadMessagesQuery};
use crate::session::{DeliveryHandler, StreamSession};
use anyhow::Context;
use std::sync::Arc;
use std::time::Duration;
use tokio::select;
use tokio::time::{sleep_until, Instant};
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

/// Ceiling for one read, subscribing included.
pub const READ_TIMEOUT: Duration = Duration::from_secs(5);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ReadOutcome {
    LimitReached,
    TimedOut,
    Cancelled,
}

/// Reads up to `query.limit` messages starting exactly at `query.offset`.
///
/// Returns once the limit is reached or [`READ_TIMEOUT`] elapses, with whatever arrived by
/// then. Cancellation fails the read with [`ReaderError::Cancelled`]. The subscription is
/// closed before returning on every path.
#[tracing::instrument(skip_all, fields(stream = %query.stream, offset = query.offset, limit = query.limit.get()))]
pub async fn read_messages(
    session: &dyn StreamSession,
    query: ReadMessagesQuery,
    cancellation_token: &CancellationToken,
) -> Result<MessageBatch, ReaderError> {
    let deadline = Instant::now() + READ_TIMEOUT;
    let (accumulator, mut completed) = MessageAccumulator::new(query.limit);
    let accumulator = Arc::new(accumulator);

    let handler_accumulator = accumulator.clone();
    let handler: DeliveryHandler = Arc::new(move |delivery| handler_accumulator.push(delivery));

    let subscribed = select! {
        biased;
        _ = cancellation_token.cancelled() => return Err(ReaderError::Cancelled),
        subscribed = session.subscribe(&query.stream, query.offset, handler) => subscribed,
        _ = sleep_until(deadline) => {
            warn!("Subscribing to stream {} timed out", query.stream);
            return Ok(MessageBatch::from_collected(Vec::new(), query.offset, query.limit));
        }
    };
    let mut subscription =
        subscribed.with_context(|| format!("While subscribing to stream '{}'", query.stream))?;

    let outcome = select! {
        _ = completed.recv() => ReadOutcome::LimitReached,
        _ = sleep_until(deadline) => ReadOutcome::TimedOut,
        _ = cancellation_token.cancelled() => ReadOutcome::Cancelled,
    };

    if let Err(e) = subscription.close().await {
        warn!(
            "Error while closing subscription on stream {}: {:?}",
            query.stream, e
        );
    }

    debug!("Read on stream {} finished: {:?}", query.stream, outcome);

    if outcome == ReadOutcome::Cancelled {
        return Err(ReaderError::Cancelled);
    }

    let messages = accumulator.take();
    Ok(MessageBatch::from_collected(
        messages,
        query.offset,
        query.limit,
    ))
}
