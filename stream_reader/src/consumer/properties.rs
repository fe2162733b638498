use crate::consumer::{MessageHeader, MessageProperties, RawMessage};
use chrono::{DateTime, Utc};
use serde_json::{Map, Value};
use std::collections::BTreeMap;

pub const ROUTING_KEY: &str = "routing_key";
pub const MESSAGE_ANNOTATIONS: &str = "message_annotations";
pub const DELIVERY_ANNOTATIONS: &str = "delivery_annotations";
pub const FOOTER: &str = "footer";

const ROUTING_KEY_ANNOTATIONS: [&str; 2] = ["x-routing-key", "routing-key"];

/// Flattens every metadata container of `message` into one map.
///
/// Only fields that carry information are emitted, so an unset property never shows up as a
/// null or a zero. Application properties land on top-level keys and lose to envelope, header
/// and annotation keys of the same name. Message annotations are scanned before delivery
/// annotations, so a routing key in the latter wins.
pub fn normalize_properties(message: &RawMessage) -> BTreeMap<String, Value> {
    let mut props = message.application_properties.clone();

    if let Some(properties) = &message.properties {
        insert_envelope(&mut props, properties);
    }
    if let Some(header) = &message.header {
        insert_header(&mut props, header);
    }

    insert_annotations(&mut props, MESSAGE_ANNOTATIONS, &message.message_annotations);
    insert_annotations(&mut props, DELIVERY_ANNOTATIONS, &message.delivery_annotations);

    if !message.footer.is_empty() {
        props.insert(FOOTER.to_owned(), to_object(&message.footer));
    }

    props
}

fn insert_envelope(props: &mut BTreeMap<String, Value>, properties: &MessageProperties) {
    insert_text(props, "message_id", &properties.message_id);
    insert_text(props, "correlation_id", &properties.correlation_id);
    insert_text(props, "content_type", &properties.content_type);
    insert_text(props, "content_encoding", &properties.content_encoding);
    insert_text(props, "reply_to", &properties.reply_to);
    insert_text(props, "subject", &properties.subject);
    insert_text(props, "to", &properties.to);

    if let Some(user_id) = properties.user_id.as_deref().filter(|id| !id.is_empty()) {
        props.insert(
            "user_id".to_owned(),
            Value::from(String::from_utf8_lossy(user_id).into_owned()),
        );
    }

    insert_text(props, "group_id", &properties.group_id);
    insert_text(props, "reply_to_group_id", &properties.reply_to_group_id);

    if let Some(sequence) = properties.group_sequence.filter(|s| *s != 0) {
        props.insert("group_sequence".to_owned(), Value::from(sequence));
    }

    insert_time(props, "creation_time", properties.creation_time);
    insert_time(props, "absolute_expiry_time", properties.absolute_expiry_time);
}

fn insert_header(props: &mut BTreeMap<String, Value>, header: &MessageHeader) {
    if header.durable {
        props.insert("durable".to_owned(), Value::from(true));
    }
    if header.priority != 0 {
        props.insert("priority".to_owned(), Value::from(header.priority));
    }
    if header.ttl != 0 {
        props.insert("ttl".to_owned(), Value::from(header.ttl));
    }
    if header.first_acquirer {
        props.insert("first_acquirer".to_owned(), Value::from(true));
    }
    if header.delivery_count != 0 {
        props.insert("delivery_count".to_owned(), Value::from(header.delivery_count));
    }
}

fn insert_annotations(
    props: &mut BTreeMap<String, Value>,
    key: &str,
    annotations: &BTreeMap<String, Value>,
) {
    if annotations.is_empty() {
        return;
    }

    // BTreeMap order puts "routing-key" before "x-routing-key", the latter wins within a container
    for (name, value) in annotations {
        if ROUTING_KEY_ANNOTATIONS.contains(&name.as_str()) {
            props.insert(ROUTING_KEY.to_owned(), value.clone());
        }
    }

    props.insert(key.to_owned(), to_object(annotations));
}

fn insert_text(props: &mut BTreeMap<String, Value>, key: &str, value: &Option<String>) {
    if let Some(value) = value.as_deref().filter(|v| !v.is_empty()) {
        props.insert(key.to_owned(), Value::from(value));
    }
}

fn insert_time(props: &mut BTreeMap<String, Value>, key: &str, value: Option<DateTime<Utc>>) {
    if let Some(time) = value {
        props.insert(key.to_owned(), Value::from(time.to_rfc3339()));
    }
}

fn to_object(map: &BTreeMap<String, Value>) -> Value {
    Value::Object(
        map.iter()
            .map(|(k, v)| (k.clone(), v.clone()))
            .collect::<Map<_, _>>(),
    )
}
