use crate::error::ReaderError;
use std::future::Future;
use tokio::select;
use tokio_util::sync::CancellationToken;

pub(crate) async fn run_cancellable<T, F>(
    cancellation_token: &CancellationToken,
    future: F,
) -> Result<T, ReaderError>
where
    F: Future<Output = Result<T, ReaderError>>,
{
    select! {
        result = future => result,
        _ = cancellation_token.cancelled() => Err(ReaderError::Cancelled),
    }
}
