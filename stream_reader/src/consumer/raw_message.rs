use bytes::Bytes;
use chrono::{DateTime, Utc};
use serde_json::Value;
use std::collections::BTreeMap;

/// A delivered message with its metadata containers kept apart, as the broker hands them over.
#[derive(Debug, Clone, Default)]
pub struct RawMessage {
    pub data: Bytes,
    pub properties: Option<MessageProperties>,
    pub header: Option<MessageHeader>,
    pub message_annotations: BTreeMap<String, Value>,
    pub delivery_annotations: BTreeMap<String, Value>,
    pub application_properties: BTreeMap<String, Value>,
    pub footer: BTreeMap<String, Value>,
}

#[derive(Debug, Clone, Default)]
pub struct MessageProperties {
    pub message_id: Option<String>,
    pub correlation_id: Option<String>,
    pub content_type: Option<String>,
    pub content_encoding: Option<String>,
    pub reply_to: Option<String>,
    pub subject: Option<String>,
    pub to: Option<String>,
    pub user_id: Option<Vec<u8>>,
    pub group_id: Option<String>,
    pub reply_to_group_id: Option<String>,
    pub group_sequence: Option<u32>,
    pub creation_time: Option<DateTime<Utc>>,
    pub absolute_expiry_time: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, Default)]
pub struct MessageHeader {
    pub durable: bool,
    pub priority: u8,
    /// Milliseconds.
    pub ttl: u32,
    pub first_acquirer: bool,
    pub delivery_count: u32,
}
