use crate::queries::read_messages::ReadLimit;
use bytes::Bytes;
use chrono::{DateTime, Utc};
use serde_json::Value;
use std::collections::BTreeMap;

#[derive(Debug, Clone)]
pub struct StreamMessage {
    pub offset: u64,
    /// When the reader received the message.
    pub timestamp: DateTime<Utc>,
    pub data: Bytes,
    pub properties: BTreeMap<String, Value>,
}

#[derive(Debug, Clone)]
pub struct MessageBatch {
    pub messages: Vec<StreamMessage>,
    pub start_offset: u64,
    pub end_offset: u64,
    /// `true` when the page came back full. More messages may exist either way.
    pub has_more: bool,
}

impl MessageBatch {
    pub fn empty(requested_offset: u64) -> Self {
        Self {
            messages: vec![],
            start_offset: requested_offset,
            end_offset: requested_offset,
            has_more: false,
        }
    }

    pub(crate) fn from_collected(
        messages: Vec<StreamMessage>,
        requested_offset: u64,
        limit: ReadLimit,
    ) -> Self {
        let (Some(first), Some(last)) = (messages.first(), messages.last()) else {
            return Self::empty(requested_offset);
        };

        Self {
            start_offset: first.offset,
            end_offset: last.offset,
            has_more: messages.len() == limit.get(),
            messages,
        }
    }
}
