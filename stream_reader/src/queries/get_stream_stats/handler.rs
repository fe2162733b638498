use crate::error::ReaderError;
use crate::metadata::QueueInfo;
use crate::queries::get_stream_stats::StreamStats;
use crate::queries::read_messages::READ_TIMEOUT;
use crate::session::{OffsetBoundary, StreamSession};
use anyhow::Context;
use tokio::select;
use tokio::time::timeout;
use tokio_util::sync::CancellationToken;
use tracing::warn;

/// Combines management API numbers with first/last offsets from the session.
///
/// Offsets are best effort: if either query fails or they take longer than [`READ_TIMEOUT`]
/// both are reported as zero. Cancellation still fails the call.
pub async fn get_stream_stats(
    session: &dyn StreamSession,
    stream: &str,
    queue_info: QueueInfo,
    cancellation_token: &CancellationToken,
) -> Result<StreamStats, ReaderError> {
    let offsets = select! {
        biased;
        _ = cancellation_token.cancelled() => return Err(ReaderError::Cancelled),
        offsets = timeout(READ_TIMEOUT, query_offsets(session, stream)) => offsets,
    };

    let (first_offset, last_offset) = match offsets {
        Ok(Ok(offsets)) => offsets,
        Ok(Err(e)) => {
            warn!("Couldn't query offsets of stream {}: {:?}", stream, e);
            (0, 0)
        }
        Err(_) => {
            warn!(
                "Offsets of stream {} didn't arrive within {:?}",
                stream, READ_TIMEOUT
            );
            (0, 0)
        }
    };

    Ok(StreamStats {
        name: stream.to_owned(),
        message_count: queue_info.messages,
        size: queue_info.size,
        first_offset,
        last_offset,
    })
}

pub async fn query_offsets(
    session: &dyn StreamSession,
    stream: &str,
) -> Result<(u64, u64), ReaderError> {
    let first = session
        .query_offset(stream, OffsetBoundary::First)
        .await
        .context("While querying first offset")?;
    let last = session
        .query_offset(stream, OffsetBoundary::Last)
        .await
        .context("While querying last offset")?;

    Ok((first, last))
}
