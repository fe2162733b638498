use serde::Deserialize;

pub(crate) const STREAM_QUEUE_TYPE: &str = "stream";

#[derive(Debug, Deserialize)]
pub(crate) struct ApiVHost {
    pub name: String,
}

#[derive(Debug, Deserialize)]
pub(crate) struct ApiQueue {
    pub name: String,
    #[serde(default)]
    pub vhost: String,
    #[serde(rename = "type", default)]
    pub kind: String,
}

#[derive(Debug, Deserialize)]
pub(crate) struct ApiQueueInfo {
    #[serde(default)]
    pub messages: Option<i64>,
    #[serde(default)]
    pub backing_queue_status: Option<ApiBackingQueueStatus>,
}

#[derive(Debug, Deserialize)]
pub(crate) struct ApiBackingQueueStatus {
    #[serde(default)]
    pub size: Option<i64>,
}
