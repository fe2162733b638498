use bytes::Bytes;
use chrono::DateTime;
use lapin::types::{AMQPValue, FieldTable};
use lapin::BasicProperties;
use serde_json::{Map, Value};
use std::collections::BTreeMap;
use stream_reader::consumer::{MessageHeader, MessageProperties, RawMessage};
use stream_reader::session::Delivery;

pub const STREAM_OFFSET_HEADER: &str = "x-stream-offset";
pub const ROUTING_KEY_ANNOTATION: &str = "x-routing-key";
pub const EXCHANGE_ANNOTATION: &str = "x-exchange";

const PERSISTENT_DELIVERY_MODE: u8 = 2;

/// Turns a stream-queue delivery into a [`Delivery`].
///
/// Returns `None` when the broker didn't stamp the delivery with its stream offset.
pub fn convert_delivery(
    data: Vec<u8>,
    exchange: &str,
    routing_key: &str,
    properties: &BasicProperties,
) -> Option<Delivery> {
    let offset = stream_offset(properties)?;

    let mut message_annotations = BTreeMap::new();
    let mut application_properties = BTreeMap::new();

    if let Some(headers) = properties.headers() {
        for (name, value) in headers.inner() {
            let name = name.as_str();
            if name == STREAM_OFFSET_HEADER {
                continue;
            }

            let value = amqp_value_to_json(value);
            if name.starts_with("x-") {
                message_annotations.insert(name.to_owned(), value);
            } else {
                application_properties.insert(name.to_owned(), value);
            }
        }
    }

    if !exchange.is_empty() {
        message_annotations.insert(EXCHANGE_ANNOTATION.to_owned(), Value::from(exchange));
    }
    if !routing_key.is_empty() {
        message_annotations.insert(ROUTING_KEY_ANNOTATION.to_owned(), Value::from(routing_key));
    }

    Some(Delivery {
        offset,
        message: RawMessage {
            data: Bytes::from(data),
            properties: Some(message_properties(properties)),
            header: message_header(properties),
            message_annotations,
            application_properties,
            ..Default::default()
        },
    })
}

pub fn stream_offset(properties: &BasicProperties) -> Option<u64> {
    properties
        .headers()
        .as_ref()
        .and_then(|headers| headers.inner().get(STREAM_OFFSET_HEADER))
        .and_then(amqp_integer)
        .and_then(|offset| u64::try_from(offset).ok())
}

fn message_properties(properties: &BasicProperties) -> MessageProperties {
    let text = |value: &Option<lapin::types::ShortString>| value.as_ref().map(|v| v.to_string());

    MessageProperties {
        message_id: text(properties.message_id()),
        correlation_id: text(properties.correlation_id()),
        content_type: text(properties.content_type()),
        content_encoding: text(properties.content_encoding()),
        reply_to: text(properties.reply_to()),
        user_id: properties
            .user_id()
            .as_ref()
            .map(|id| id.as_str().as_bytes().to_vec()),
        creation_time: properties
            .timestamp()
            .and_then(|seconds| i64::try_from(seconds).ok())
            .and_then(|seconds| DateTime::from_timestamp(seconds, 0)),
        ..Default::default()
    }
}

fn message_header(properties: &BasicProperties) -> Option<MessageHeader> {
    let durable = *properties.delivery_mode() == Some(PERSISTENT_DELIVERY_MODE);
    let priority = properties.priority().unwrap_or_default();
    // expiration is a per-message TTL in milliseconds, sent as text
    let ttl = properties
        .expiration()
        .as_ref()
        .and_then(|expiration| expiration.as_str().parse::<u32>().ok())
        .unwrap_or_default();

    if !durable && priority == 0 && ttl == 0 {
        return None;
    }

    Some(MessageHeader {
        durable,
        priority,
        ttl,
        ..Default::default()
    })
}

fn amqp_integer(value: &AMQPValue) -> Option<i64> {
    match value {
        AMQPValue::ShortShortInt(v) => Some(i64::from(*v)),
        AMQPValue::ShortShortUInt(v) => Some(i64::from(*v)),
        AMQPValue::ShortInt(v) => Some(i64::from(*v)),
        AMQPValue::ShortUInt(v) => Some(i64::from(*v)),
        AMQPValue::LongInt(v) => Some(i64::from(*v)),
        AMQPValue::LongUInt(v) => Some(i64::from(*v)),
        AMQPValue::LongLongInt(v) => Some(*v),
        AMQPValue::Timestamp(v) => i64::try_from(*v).ok(),
        _ => None,
    }
}

pub fn amqp_value_to_json(value: &AMQPValue) -> Value {
    match value {
        AMQPValue::Boolean(v) => Value::from(*v),
        AMQPValue::ShortShortInt(v) => Value::from(*v),
        AMQPValue::ShortShortUInt(v) => Value::from(*v),
        AMQPValue::ShortInt(v) => Value::from(*v),
        AMQPValue::ShortUInt(v) => Value::from(*v),
        AMQPValue::LongInt(v) => Value::from(*v),
        AMQPValue::LongUInt(v) => Value::from(*v),
        AMQPValue::LongLongInt(v) => Value::from(*v),
        AMQPValue::Float(v) => Value::from(*v),
        AMQPValue::Double(v) => Value::from(*v),
        AMQPValue::DecimalValue(decimal) => {
            Value::from(f64::from(decimal.value) / 10f64.powi(i32::from(decimal.scale)))
        }
        AMQPValue::ShortString(v) => Value::from(v.as_str()),
        AMQPValue::LongString(v) => Value::from(v.to_string()),
        AMQPValue::FieldArray(values) => {
            Value::Array(values.as_slice().iter().map(amqp_value_to_json).collect())
        }
        AMQPValue::Timestamp(seconds) => i64::try_from(*seconds)
            .ok()
            .and_then(|seconds| DateTime::from_timestamp(seconds, 0))
            .map_or_else(|| Value::from(*seconds), |time| Value::from(time.to_rfc3339())),
        AMQPValue::FieldTable(table) => table_to_json(table),
        AMQPValue::ByteArray(bytes) => {
            Value::from(String::from_utf8_lossy(bytes.as_slice()).into_owned())
        }
        AMQPValue::Void => Value::Null,
    }
}

fn table_to_json(table: &FieldTable) -> Value {
    Value::Object(
        table
            .inner()
            .iter()
            .map(|(name, value)| (name.to_string(), amqp_value_to_json(value)))
            .collect::<Map<_, _>>(),
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use lapin::types::{DecimalValue, FieldArray, ShortString};
    use serde_json::json;

    fn headers(entries: Vec<(&str, AMQPValue)>) -> FieldTable {
        let mut table = FieldTable::default();
        for (name, value) in entries {
            table.insert(ShortString::from(name), value);
        }
        table
    }

    #[test]
    fn splits_headers_into_annotations_and_application_properties() {
        let properties = BasicProperties::default()
            .with_message_id("m-1".into())
            .with_delivery_mode(2)
            .with_expiration("60000".into())
            .with_timestamp(1_704_164_645)
            .with_headers(headers(vec![
                (STREAM_OFFSET_HEADER, AMQPValue::LongLongInt(17)),
                ("x-opt-source", AMQPValue::LongString("sensor".into())),
                ("counter", AMQPValue::LongInt(42)),
            ]));

        let delivery =
            convert_delivery(b"payload".to_vec(), "amq.topic", "orders.eu", &properties).unwrap();

        assert_eq!(delivery.offset, 17);
        assert_eq!(delivery.message.data.as_ref(), b"payload");
        assert_eq!(
            delivery.message.application_properties,
            BTreeMap::from([("counter".to_owned(), json!(42))])
        );
        assert_eq!(
            delivery.message.message_annotations,
            BTreeMap::from([
                ("x-exchange".to_owned(), json!("amq.topic")),
                ("x-opt-source".to_owned(), json!("sensor")),
                ("x-routing-key".to_owned(), json!("orders.eu")),
            ])
        );

        let envelope = delivery.message.properties.unwrap();
        assert_eq!(envelope.message_id.as_deref(), Some("m-1"));
        assert_eq!(
            envelope.creation_time.map(|t| t.to_rfc3339()).as_deref(),
            Some("2024-01-02T03:04:05+00:00")
        );

        let header = delivery.message.header.unwrap();
        assert!(header.durable);
        assert_eq!(header.ttl, 60_000);
    }

    #[test]
    fn delivery_without_offset_is_rejected() {
        let properties = BasicProperties::default().with_headers(headers(vec![(
            "counter",
            AMQPValue::LongInt(1),
        )]));

        assert!(convert_delivery(vec![], "", "", &properties).is_none());
        assert!(convert_delivery(vec![], "", "", &BasicProperties::default()).is_none());
    }

    #[test]
    fn transient_message_has_no_header() {
        let properties = BasicProperties::default().with_headers(headers(vec![(
            STREAM_OFFSET_HEADER,
            AMQPValue::LongLongInt(0),
        )]));

        let delivery = convert_delivery(vec![], "", "", &properties).unwrap();

        assert!(delivery.message.header.is_none());
        assert!(delivery.message.message_annotations.is_empty());
    }

    #[test]
    fn nested_values_become_json() {
        let value = AMQPValue::FieldTable(headers(vec![
            ("flag", AMQPValue::Boolean(true)),
            (
                "list",
                AMQPValue::FieldArray(FieldArray::from(vec![
                    AMQPValue::ShortString("a".into()),
                    AMQPValue::Void,
                ])),
            ),
            (
                "price",
                AMQPValue::DecimalValue(DecimalValue {
                    scale: 2,
                    value: 1250,
                }),
            ),
        ]));

        assert_eq!(
            amqp_value_to_json(&value),
            json!({ "flag": true, "list": ["a", null], "price": 12.5 })
        );
    }
}
