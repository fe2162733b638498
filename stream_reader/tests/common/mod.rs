#![allow(dead_code)]

use anyhow::{anyhow, bail};
use async_trait::async_trait;
use axum::extract::{Path, State};
use axum::http::{header, HeaderMap, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::routing::get;
use axum::{Json, Router};
use bytes::Bytes;
use parking_lot::Mutex;
use serde_json::{json, Value};
use std::collections::{BTreeMap, HashMap, HashSet};
use std::future::pending;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use stream_reader::connection_settings::BrokerEndpoint;
use stream_reader::consumer::RawMessage;
use stream_reader::session::{
    Delivery, DeliveryHandler, OffsetBoundary, SessionFactory, StreamSession, Subscription,
};
use tokio::net::TcpListener;
use tokio::time::sleep;

// "guest:guest"
const GUEST_AUTHORIZATION: &str = "Basic Z3Vlc3Q6Z3Vlc3Q=";

pub fn endpoint(id: &str, http_port: u16, vhost: &str) -> BrokerEndpoint {
    BrokerEndpoint {
        id: id.to_owned(),
        name: format!("Broker {id}"),
        host: "127.0.0.1".to_owned(),
        port: 5672,
        stream_port: 0,
        http_port,
        vhost: vhost.to_owned(),
        username: "guest".to_owned(),
        password: "guest".to_owned(),
    }
}

pub fn message(offset: u64) -> Delivery {
    Delivery {
        offset,
        message: RawMessage {
            data: Bytes::from(format!("message {offset}")),
            application_properties: BTreeMap::from([("counter".to_owned(), json!(offset))]),
            ..Default::default()
        },
    }
}

pub fn messages(offsets: std::ops::Range<u64>) -> Vec<Delivery> {
    offsets.map(message).collect()
}

#[derive(Debug, Default)]
pub struct Counters {
    pub opens: AtomicUsize,
    pub session_closes: AtomicUsize,
    pub subscription_closes: AtomicUsize,
}

impl Counters {
    pub fn opens(&self) -> usize {
        self.opens.load(Ordering::SeqCst)
    }

    pub fn session_closes(&self) -> usize {
        self.session_closes.load(Ordering::SeqCst)
    }

    pub fn subscription_closes(&self) -> usize {
        self.subscription_closes.load(Ordering::SeqCst)
    }
}

/// What every fake session sees, regardless of the broker it was opened for.
#[derive(Debug, Clone, Default)]
pub struct FakeBroker {
    pub streams: HashMap<String, Vec<Delivery>>,
    /// Deliver from a background task, one message per interval, instead of inline.
    pub delivery_interval: Option<Duration>,
    pub fail_offsets: bool,
    /// Subscribe and offset queries never answer.
    pub unresponsive: bool,
}

impl FakeBroker {
    pub fn with_stream(mut self, name: &str, deliveries: Vec<Delivery>) -> Self {
        self.streams.insert(name.to_owned(), deliveries);
        self
    }
}

#[derive(Default)]
pub struct FakeSessionFactory {
    pub broker: FakeBroker,
    pub failing_opens: HashSet<String>,
    pub failing_closes: HashSet<String>,
    pub counters: Arc<Counters>,
    pub opened: Mutex<Vec<(String, String)>>,
}

impl FakeSessionFactory {
    pub fn new(broker: FakeBroker) -> Self {
        Self {
            broker,
            ..Default::default()
        }
    }

    pub fn opened(&self) -> Vec<(String, String)> {
        self.opened.lock().clone()
    }
}

#[async_trait]
impl SessionFactory for FakeSessionFactory {
    async fn open(
        &self,
        endpoint: &BrokerEndpoint,
        vhost: &str,
    ) -> Result<Box<dyn StreamSession>, anyhow::Error> {
        self.counters.opens.fetch_add(1, Ordering::SeqCst);

        if self.failing_opens.contains(&endpoint.id) {
            bail!("connection refused by {}", endpoint.host);
        }

        self.opened
            .lock()
            .push((endpoint.id.clone(), vhost.to_owned()));

        Ok(Box::new(FakeSession {
            id: endpoint.id.clone(),
            broker: self.broker.clone(),
            fail_close: self.failing_closes.contains(&endpoint.id),
            counters: self.counters.clone(),
        }))
    }
}

pub struct FakeSession {
    id: String,
    broker: FakeBroker,
    fail_close: bool,
    counters: Arc<Counters>,
}

impl FakeSession {
    fn deliveries(&self, stream: &str) -> Result<&Vec<Delivery>, anyhow::Error> {
        self.broker
            .streams
            .get(stream)
            .ok_or_else(|| anyhow!("stream '{stream}' does not exist"))
    }
}

#[async_trait]
impl StreamSession for FakeSession {
    async fn query_offset(
        &self,
        stream: &str,
        boundary: OffsetBoundary,
    ) -> Result<u64, anyhow::Error> {
        if self.broker.unresponsive {
            pending::<()>().await;
        }
        if self.broker.fail_offsets {
            bail!("offset query refused");
        }

        let offsets = self.deliveries(stream)?.iter().map(|d| d.offset);
        let offset = match boundary {
            OffsetBoundary::First => offsets.min(),
            OffsetBoundary::Last => offsets.max(),
        };

        offset.ok_or_else(|| anyhow!("stream '{stream}' is empty"))
    }

    async fn subscribe(
        &self,
        stream: &str,
        offset: u64,
        handler: DeliveryHandler,
    ) -> Result<Box<dyn Subscription>, anyhow::Error> {
        if self.broker.unresponsive {
            pending::<()>().await;
        }
        let deliveries = self
            .deliveries(stream)?
            .iter()
            .filter(|d| d.offset >= offset)
            .cloned()
            .collect::<Vec<_>>();

        let closed = Arc::new(AtomicBool::new(false));
        match self.broker.delivery_interval {
            None => deliveries.into_iter().for_each(|d| handler(d)),
            Some(interval) => {
                let closed = closed.clone();
                tokio::spawn(async move {
                    for delivery in deliveries {
                        sleep(interval).await;
                        if closed.load(Ordering::SeqCst) {
                            return;
                        }
                        handler(delivery);
                    }
                });
            }
        }

        Ok(Box::new(FakeSubscription {
            closed,
            counters: self.counters.clone(),
        }))
    }

    async fn close(&self) -> Result<(), anyhow::Error> {
        self.counters.session_closes.fetch_add(1, Ordering::SeqCst);

        if self.fail_close {
            bail!("close refused by {}", self.id);
        }
        Ok(())
    }
}

struct FakeSubscription {
    closed: Arc<AtomicBool>,
    counters: Arc<Counters>,
}

#[async_trait]
impl Subscription for FakeSubscription {
    async fn close(&mut self) -> Result<(), anyhow::Error> {
        self.closed.store(true, Ordering::SeqCst);
        self.counters
            .subscription_closes
            .fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}

/// Queues per vhost, as `(name, type)`.
#[derive(Debug, Clone, Default)]
pub struct ManagementStub {
    pub vhosts: BTreeMap<String, Vec<(String, String)>>,
    pub failing_vhosts: HashSet<String>,
}

impl ManagementStub {
    pub fn with_vhost(mut self, vhost: &str, queues: &[(&str, &str)]) -> Self {
        let queues = queues
            .iter()
            .map(|(name, kind)| (name.to_string(), kind.to_string()))
            .collect();
        self.vhosts.insert(vhost.to_owned(), queues);
        self
    }

    pub fn failing(mut self, vhost: &str) -> Self {
        self.failing_vhosts.insert(vhost.to_owned());
        self
    }
}

/// Serves `stub` on an ephemeral local port and returns the port.
pub async fn spawn_management_api(stub: ManagementStub) -> u16 {
    let app = Router::new()
        .route("/api/vhosts", get(list_vhosts))
        .route("/api/queues/{vhost}", get(list_queues))
        .route("/api/queues/{vhost}/{name}", get(get_queue))
        .with_state(Arc::new(stub));

    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let port = listener.local_addr().unwrap().port();
    tokio::spawn(async move { axum::serve(listener, app).await.unwrap() });

    port
}

fn authorized(headers: &HeaderMap) -> bool {
    headers
        .get(header::AUTHORIZATION)
        .is_some_and(|value| value == GUEST_AUTHORIZATION)
}

async fn list_vhosts(State(stub): State<Arc<ManagementStub>>, headers: HeaderMap) -> Response {
    if !authorized(&headers) {
        return StatusCode::UNAUTHORIZED.into_response();
    }

    let vhosts = stub
        .vhosts
        .keys()
        .map(|name| json!({ "name": name }))
        .collect::<Vec<_>>();
    Json(vhosts).into_response()
}

async fn list_queues(
    State(stub): State<Arc<ManagementStub>>,
    Path(vhost): Path<String>,
    headers: HeaderMap,
) -> Response {
    if !authorized(&headers) {
        return StatusCode::UNAUTHORIZED.into_response();
    }
    if stub.failing_vhosts.contains(&vhost) {
        return (StatusCode::INTERNAL_SERVER_ERROR, "vhost is down").into_response();
    }
    let Some(queues) = stub.vhosts.get(&vhost) else {
        return (StatusCode::NOT_FOUND, "no such vhost").into_response();
    };

    let queues = queues
        .iter()
        .map(|(name, kind)| json!({ "name": name, "vhost": vhost, "type": kind }))
        .collect::<Vec<Value>>();
    Json(queues).into_response()
}

async fn get_queue(
    State(stub): State<Arc<ManagementStub>>,
    Path((vhost, name)): Path<(String, String)>,
    headers: HeaderMap,
) -> Response {
    if !authorized(&headers) {
        return StatusCode::UNAUTHORIZED.into_response();
    }

    let exists = stub
        .vhosts
        .get(&vhost)
        .is_some_and(|queues| queues.iter().any(|(queue, _)| *queue == name));
    if !exists {
        return (StatusCode::NOT_FOUND, "no such queue").into_response();
    }

    Json(json!({
        "name": name,
        "vhost": vhost,
        "messages": 42,
        "backing_queue_status": { "size": 4096 },
    }))
    .into_response()
}
