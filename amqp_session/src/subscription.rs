use anyhow::{anyhow, Context};
use async_trait::async_trait;
use lapin::Channel;
use stream_reader::session::Subscription;
use tokio::runtime::Handle;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{trace, warn};

pub(crate) const REPLY_SUCCESS: u16 = 200;

/// A running consumer on one channel, fed into a delivery handler by a background task.
pub struct AmqpSubscription {
    channel: ChannelGuard,
    task: Option<JoinHandle<()>>,
    cancellation_token: CancellationToken,
}

impl AmqpSubscription {
    pub(crate) fn new(
        channel: ChannelGuard,
        task: JoinHandle<()>,
        cancellation_token: CancellationToken,
    ) -> Self {
        Self {
            channel,
            task: Some(task),
            cancellation_token,
        }
    }
}

#[async_trait]
impl Subscription for AmqpSubscription {
    async fn close(&mut self) -> Result<(), anyhow::Error> {
        self.cancellation_token.cancel();

        let task_result = match self.task.take() {
            Some(task) => task.await.context("While waiting for delivery task"),
            None => Ok(()),
        };
        let channel_result = self.channel.close().await;

        join_results(task_result, channel_result)
    }
}

/// The channel is closed whether or not the delivery task ended cleanly, so both errors count.
fn join_results(
    task_result: Result<(), anyhow::Error>,
    channel_result: Result<(), anyhow::Error>,
) -> Result<(), anyhow::Error> {
    match (task_result, channel_result) {
        (Ok(()), Ok(())) => Ok(()),
        (Err(e), Ok(())) | (Ok(()), Err(e)) => Err(e),
        (Err(task_error), Err(channel_error)) => {
            Err(anyhow!("{task_error:#}; {channel_error:#}"))
        }
    }
}

impl Drop for AmqpSubscription {
    fn drop(&mut self) {
        self.cancellation_token.cancel();
    }
}

/// Owns a channel until it is closed. Dropping it unclosed closes the channel in the background.
pub(crate) struct ChannelGuard(Option<Channel>);

impl ChannelGuard {
    pub(crate) fn new(channel: Channel) -> Self {
        Self(Some(channel))
    }

    pub(crate) async fn close(&mut self) -> Result<(), anyhow::Error> {
        match self.0.take() {
            Some(channel) => close_channel(&channel).await,
            None => Ok(()),
        }
    }
}

impl Drop for ChannelGuard {
    fn drop(&mut self) {
        let Some(channel) = self.0.take() else {
            return;
        };
        let Ok(runtime) = Handle::try_current() else {
            return;
        };
        runtime.spawn(async move {
            if let Err(e) = close_channel(&channel).await {
                warn!("{:?}", e);
            }
        });
    }
}

pub(crate) async fn close_channel(channel: &Channel) -> Result<(), anyhow::Error> {
    if !channel.status().connected() {
        trace!("Channel {} is already closed", channel.id());
        return Ok(());
    }

    channel
        .close(REPLY_SUCCESS, "OK")
        .await
        .with_context(|| format!("While closing channel {}", channel.id()))
}
