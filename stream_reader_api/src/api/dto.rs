use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;

#[derive(Debug, Serialize)]
pub struct HealthDto {
    pub status: &'static str,
}

#[derive(Debug, Serialize)]
pub struct ErrorDto {
    pub error: String,
    pub details: String,
}

/// A configured broker, without its credentials' secret.
#[derive(Debug, Serialize)]
pub struct ConnectionDto {
    pub id: String,
    pub name: String,
    pub host: String,
    pub port: u16,
    pub vhost: String,
    pub username: String,
    pub http_port: u16,
    pub stream_port: u16,
}

#[derive(Debug, Serialize)]
pub struct VirtualHostDto {
    pub name: String,
    pub connection_id: String,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub streams: Vec<StreamDto>,
}

#[derive(Debug, Serialize)]
pub struct StreamDto {
    pub name: String,
    pub connection_id: String,
    pub vhost: String,
}

#[derive(Debug, Serialize)]
pub struct StreamStatsDto {
    pub name: String,
    pub message_count: i64,
    pub size: i64,
    pub first_offset: u64,
    pub last_offset: u64,
}

#[derive(Debug, Serialize)]
pub struct MessageDto {
    pub offset: u64,
    pub timestamp: String,
    /// Base64 of the raw payload.
    pub data: String,
    pub properties: BTreeMap<String, Value>,
}

#[derive(Debug, Serialize)]
pub struct MessageBatchDto {
    pub messages: Vec<MessageDto>,
    pub start_offset: u64,
    pub end_offset: u64,
    pub has_more: bool,
}

#[derive(Debug, Deserialize)]
pub struct StreamPath {
    pub connection_id: String,
    pub vhost: String,
    pub stream_name: String,
}

/// Kept as text so malformed numbers can be answered with the API's own error body.
#[derive(Debug, Default, Deserialize)]
pub struct ReadMessagesParams {
    pub offset: Option<String>,
    pub limit: Option<String>,
}
