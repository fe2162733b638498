use crate::subscription::{ChannelGuard, REPLY_SUCCESS};
use crate::{convert_delivery, stream_offset, AmqpSubscription, STREAM_OFFSET_HEADER};
use anyhow::{anyhow, Context};
use async_trait::async_trait;
use lapin::options::{BasicAckOptions, BasicConsumeOptions, BasicQosOptions};
use lapin::types::{AMQPValue, FieldTable, LongString};
use lapin::Consumer;
use std::sync::Arc;
use std::time::Duration;
use stream_reader::session::{DeliveryHandler, OffsetBoundary, StreamSession, Subscription};
use tokio::runtime::Handle;
use tokio::select;
use tokio::time::{timeout_at, Instant};
use tokio_stream::StreamExt;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info_span, trace, warn, Instrument};
use uuid::Uuid;

/// Stream queues refuse consumers without a prefetch limit.
pub const PREFETCH_COUNT: u16 = 100;
pub const PROBE_TIMEOUT: Duration = Duration::from_secs(5);
/// How long an offset probe waits for another message once the stream started answering.
pub const PROBE_IDLE: Duration = Duration::from_millis(300);

pub struct AmqpStreamSession {
    connection: Arc<lapin::Connection>,
    connection_id: String,
    vhost: String,
}

impl AmqpStreamSession {
    pub(crate) fn new(connection: lapin::Connection, connection_id: String, vhost: String) -> Self {
        Self {
            connection: Arc::new(connection),
            connection_id,
            vhost,
        }
    }

    async fn consume(
        &self,
        stream: &str,
        offset: AMQPValue,
    ) -> Result<(ChannelGuard, Consumer), anyhow::Error> {
        let channel = self
            .connection
            .create_channel()
            .await
            .context("While creating channel")?;
        let mut guard = ChannelGuard::new(channel.clone());

        let mut arguments = FieldTable::default();
        arguments.insert(STREAM_OFFSET_HEADER.into(), offset);
        let consumer_tag = format!("stream-reader-{}", Uuid::now_v7());

        let consumer = async {
            channel
                .basic_qos(PREFETCH_COUNT, BasicQosOptions::default())
                .await
                .context("While setting prefetch")?;
            channel
                .basic_consume(
                    stream,
                    &consumer_tag,
                    BasicConsumeOptions::default(),
                    arguments,
                )
                .await
                .with_context(|| format!("While consuming stream '{stream}'"))
        }
        .await;

        match consumer {
            Ok(consumer) => {
                trace!("Consumer {} started on stream {}", consumer_tag, stream);
                Ok((guard, consumer))
            }
            Err(e) => {
                if let Err(close_error) = guard.close().await {
                    warn!("{:?}", close_error);
                }
                Err(e)
            }
        }
    }

    async fn probe_offset(
        &self,
        stream: &str,
        boundary: OffsetBoundary,
    ) -> Result<u64, anyhow::Error> {
        let position = match boundary {
            OffsetBoundary::First => "first",
            OffsetBoundary::Last => "last",
        };
        let (mut channel, mut consumer) = self
            .consume(stream, AMQPValue::LongString(LongString::from(position)))
            .await?;

        let result = read_probe(&mut consumer, boundary).await;

        if let Err(e) = channel.close().await {
            warn!("{:?}", e);
        }

        result.with_context(|| format!("While probing {position} offset of stream '{stream}'"))
    }
}

/// `first` is answered by the first delivery. `last` attaches to the last chunk, so every
/// delivery until the stream goes quiet is inspected.
async fn read_probe(consumer: &mut Consumer, boundary: OffsetBoundary) -> Result<u64, anyhow::Error> {
    let deadline = Instant::now() + PROBE_TIMEOUT;
    let mut highest: Option<u64> = None;

    loop {
        let wait_until = match highest {
            None => deadline,
            Some(_) => deadline.min(Instant::now() + PROBE_IDLE),
        };

        let Ok(next) = timeout_at(wait_until, consumer.next()).await else {
            break;
        };
        let Some(delivery) = next else {
            break;
        };
        let delivery = delivery.context("While receiving delivery")?;

        delivery
            .acker
            .ack(BasicAckOptions::default())
            .await
            .context("While acking delivery")?;

        let Some(offset) = stream_offset(&delivery.properties) else {
            continue;
        };
        if boundary == OffsetBoundary::First {
            return Ok(offset);
        }
        highest = Some(highest.map_or(offset, |h| h.max(offset)));
    }

    highest.ok_or_else(|| anyhow!("No message arrived within {:?}", PROBE_TIMEOUT))
}

async fn deliver(
    mut consumer: Consumer,
    handler: DeliveryHandler,
    stream: String,
    cancellation_token: CancellationToken,
) {
    loop {
        let next = select! {
            biased;
            _ = cancellation_token.cancelled() => break,
            next = consumer.next() => next,
        };

        let delivery = match next {
            Some(Ok(delivery)) => delivery,
            Some(Err(e)) => {
                warn!("Consumer on stream {} failed: {:?}", stream, e);
                break;
            }
            None => {
                debug!("Consumer on stream {} ended", stream);
                break;
            }
        };

        let acked = select! {
            biased;
            _ = cancellation_token.cancelled() => break,
            acked = delivery.acker.ack(BasicAckOptions::default()) => acked,
        };
        if let Err(e) = acked {
            warn!("Couldn't ack delivery on stream {}: {:?}", stream, e);
        }

        let converted = convert_delivery(
            delivery.data,
            delivery.exchange.as_str(),
            delivery.routing_key.as_str(),
            &delivery.properties,
        );
        match converted {
            Some(converted) if !cancellation_token.is_cancelled() => handler(converted),
            Some(_) => break,
            None => warn!("Delivery on stream {} carries no offset, skipping", stream),
        }
    }
}

#[async_trait]
impl StreamSession for AmqpStreamSession {
    async fn query_offset(
        &self,
        stream: &str,
        boundary: OffsetBoundary,
    ) -> Result<u64, anyhow::Error> {
        self.probe_offset(stream, boundary).await
    }

    async fn subscribe(
        &self,
        stream: &str,
        offset: u64,
        handler: DeliveryHandler,
    ) -> Result<Box<dyn Subscription>, anyhow::Error> {
        let offset = i64::try_from(offset).context("While converting offset")?;
        let (channel, consumer) = self
            .consume(stream, AMQPValue::LongLongInt(offset))
            .await?;

        let cancellation_token = CancellationToken::new();
        let task = tokio::spawn(
            deliver(
                consumer,
                handler,
                stream.to_owned(),
                cancellation_token.clone(),
            )
            .instrument(info_span!("Delivering stream", stream).or_current()),
        );

        Ok(Box::new(AmqpSubscription::new(
            channel,
            task,
            cancellation_token,
        )))
    }

    async fn close(&self) -> Result<(), anyhow::Error> {
        if !self.connection.status().connected() {
            return Ok(());
        }

        debug!(
            "Closing session of connection {} (vhost '{}')",
            self.connection_id, self.vhost
        );
        self.connection
            .close(REPLY_SUCCESS, "OK")
            .await
            .with_context(|| format!("While closing session of connection {}", self.connection_id))
    }
}

impl Drop for AmqpStreamSession {
    fn drop(&mut self) {
        if !self.connection.status().connected() {
            return;
        }
        let Ok(runtime) = Handle::try_current() else {
            return;
        };

        let connection = self.connection.clone();
        let connection_id = self.connection_id.clone();
        runtime.spawn(async move {
            if let Err(e) = connection.close(REPLY_SUCCESS, "OK").await {
                warn!(
                    "Error while closing dropped session of connection {}: {:?}",
                    connection_id, e
                );
            }
        });
    }
}
