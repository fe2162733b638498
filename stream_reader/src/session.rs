use crate::connection_settings::BrokerEndpoint;
use crate::consumer::RawMessage;
use async_trait::async_trait;
use std::sync::Arc;

/// Invoked by a subscription for every delivered message, in delivery order.
pub type DeliveryHandler = Arc<dyn Fn(Delivery) + Send + Sync>;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OffsetBoundary {
    First,
    Last,
}

#[derive(Debug, Clone)]
pub struct Delivery {
    pub offset: u64,
    pub message: RawMessage,
}

#[async_trait]
pub trait SessionFactory: Send + Sync {
    async fn open(
        &self,
        endpoint: &BrokerEndpoint,
        vhost: &str,
    ) -> Result<Box<dyn StreamSession>, anyhow::Error>;
}

/// A protocol session scoped to one (broker, vhost) pair.
#[async_trait]
pub trait StreamSession: Send + Sync {
    async fn query_offset(
        &self,
        stream: &str,
        boundary: OffsetBoundary,
    ) -> Result<u64, anyhow::Error>;

    /// Starts pushing deliveries into `handler` beginning exactly at `offset`.
    async fn subscribe(
        &self,
        stream: &str,
        offset: u64,
        handler: DeliveryHandler,
    ) -> Result<Box<dyn Subscription>, anyhow::Error>;

    async fn close(&self) -> Result<(), anyhow::Error>;
}

#[async_trait]
pub trait Subscription: Send {
    /// Stops delivery. Once this returns the handler is never invoked again.
    async fn close(&mut self) -> Result<(), anyhow::Error>;
}
