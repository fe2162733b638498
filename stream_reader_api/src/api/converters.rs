use crate::api::{
    ConnectionDto, MessageBatchDto, MessageDto, StreamDto, StreamStatsDto, VirtualHostDto,
};
use anyhow::Context;
use base64::prelude::BASE64_STANDARD;
use base64::Engine;
use chrono::SecondsFormat;
use std::str::FromStr;
use stream_reader::connection_settings::BrokerEndpoint;
use stream_reader::metadata::{Stream, VirtualHost};
use stream_reader::queries::get_stream_stats::StreamStats;
use stream_reader::queries::read_messages::{MessageBatch, StreamMessage};

pub fn endpoint_to_dto(endpoint: &BrokerEndpoint) -> ConnectionDto {
    ConnectionDto {
        id: endpoint.id.clone(),
        name: endpoint.name.clone(),
        host: endpoint.host.clone(),
        port: endpoint.port,
        vhost: endpoint.default_vhost().to_owned(),
        username: endpoint.username.clone(),
        http_port: endpoint.http_port,
        stream_port: endpoint.stream_port,
    }
}

pub fn vhost_to_dto(vhost: VirtualHost) -> VirtualHostDto {
    VirtualHostDto {
        name: vhost.name,
        connection_id: vhost.connection_id,
        streams: vhost.streams.into_iter().map(stream_to_dto).collect(),
    }
}

pub fn stream_to_dto(stream: Stream) -> StreamDto {
    StreamDto {
        name: stream.name,
        connection_id: stream.connection_id,
        vhost: stream.vhost,
    }
}

pub fn stats_to_dto(stats: StreamStats) -> StreamStatsDto {
    StreamStatsDto {
        name: stats.name,
        message_count: stats.message_count,
        size: stats.size,
        first_offset: stats.first_offset,
        last_offset: stats.last_offset,
    }
}

pub fn batch_to_dto(batch: MessageBatch) -> MessageBatchDto {
    MessageBatchDto {
        messages: batch.messages.into_iter().map(message_to_dto).collect(),
        start_offset: batch.start_offset,
        end_offset: batch.end_offset,
        has_more: batch.has_more,
    }
}

fn message_to_dto(message: StreamMessage) -> MessageDto {
    MessageDto {
        offset: message.offset,
        timestamp: message.timestamp.to_rfc3339_opts(SecondsFormat::AutoSi, true),
        data: BASE64_STANDARD.encode(&message.data),
        properties: message.properties,
    }
}

/// A missing or empty parameter falls back to `default`.
pub fn parse_param<T>(value: Option<&str>, default: T) -> Result<T, anyhow::Error>
where
    T: FromStr,
    T::Err: std::error::Error + Send + Sync + 'static,
{
    match value.filter(|v| !v.is_empty()) {
        None => Ok(default),
        Some(value) => value
            .parse()
            .with_context(|| format!("While parsing '{value}'")),
    }
}
