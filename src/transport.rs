//! The seam between the pool and the broker client library.
//!
//! The pool never talks to `lapin` directly: it only needs to dial connections, open channels
//! on them, ask a channel whether it is still usable and close things.
//! [`ConnectionFactory`](crate::amqp::ConnectionFactory) implements these traits on top of
//! `lapin`; anything else (e.g. an in-memory broker in tests) can plug in the same way.
use crate::amqp::configuration::BrokerEndpoint;

/// Whether a channel can still be used to talk to the broker.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HealthStatus {
    Healthy,
    Unhealthy,
}

/// `Transport` knows how to establish a physical connection to a broker.
#[async_trait::async_trait]
pub trait Transport: Send + Sync + 'static {
    type Connection: BrokerConnection;

    /// Dial a new connection to the broker described by `endpoint`.
    async fn connect(&self, endpoint: &BrokerEndpoint) -> Result<Self::Connection, anyhow::Error>;
}

/// A physical connection to the broker, capable of multiplexing channels.
#[async_trait::async_trait]
pub trait BrokerConnection: Send + Sync + 'static {
    type Channel: BrokerChannel;

    /// Open a new channel on top of this connection.
    ///
    /// Fails if the connection has been closed, by us or by the broker.
    async fn open_channel(&self) -> Result<Self::Channel, anyhow::Error>;

    async fn close(&self) -> Result<(), anyhow::Error>;
}

/// A lightweight session multiplexed over a single [`BrokerConnection`].
#[async_trait::async_trait]
pub trait BrokerChannel: Send + Sync + 'static {
    /// Liveness check used by the pool before handing out or caching a channel.
    ///
    /// It must be cheap and must not perform any I/O: the broker closing a channel is
    /// only ever detected lazily, through this method.
    fn health(&self) -> HealthStatus;

    async fn close(&self) -> Result<(), anyhow::Error>;

    fn is_healthy(&self) -> bool {
        self.health() == HealthStatus::Healthy
    }
}
