//! A fixed set of physical connections to the broker.
use std::sync::atomic::{AtomicBool, Ordering};

use tracing::{error, warn};

use super::PoolError;
use crate::amqp::configuration::BrokerEndpoint;
use crate::transport::{BrokerConnection, Transport};

/// `ConnectionManager` owns the physical connections channels are multiplexed over.
///
/// The set of connections is established once, in [`ConnectionManager::connect`], and never
/// changes afterwards: a connection that breaks is not replaced.
pub struct ConnectionManager<C> {
    connections: Vec<C>,
    closed: AtomicBool,
}

impl<C: BrokerConnection> ConnectionManager<C> {
    /// Dial `count` connections (at least one), one after the other.
    ///
    /// The first failure aborts the whole operation: the connections established so far
    /// are closed and the error is returned.
    #[tracing::instrument(
        name = "rabbitmq_connection_manager",
        skip(transport, endpoint),
        fields(broker = %endpoint.display_url())
    )]
    pub async fn connect<T>(
        transport: &T,
        endpoint: &BrokerEndpoint,
        count: usize,
    ) -> Result<Self, PoolError>
    where
        T: Transport<Connection = C>,
    {
        let count = count.max(1);
        let mut connections = Vec::with_capacity(count);
        for index in 0..count {
            match transport.connect(endpoint).await {
                Ok(connection) => connections.push(connection),
                Err(source) => {
                    error!(index, error = ?source, "Failed to connect to the RabbitMq broker");
                    close_all(&connections).await;
                    return Err(PoolError::Connect { index, source });
                }
            }
        }
        Ok(Self {
            connections,
            closed: AtomicBool::new(false),
        })
    }

    pub fn len(&self) -> usize {
        self.connections.len()
    }

    pub fn is_empty(&self) -> bool {
        self.connections.is_empty()
    }

    /// The connection a round-robin `cursor` points at, along with its index.
    pub fn select(&self, cursor: usize) -> (usize, &C) {
        let index = cursor % self.connections.len();
        (index, &self.connections[index])
    }

    pub fn get(&self, index: usize) -> Option<&C> {
        self.connections.get(index)
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }

    /// Stop handing out channels, leaving the connections open.
    ///
    /// Returns `false` if the manager was already marked as closed.
    pub fn mark_closed(&self) -> bool {
        !self.closed.swap(true, Ordering::SeqCst)
    }

    /// Close every connection. Failures are logged and otherwise ignored.
    ///
    /// Only the first call does anything.
    pub async fn close(&self) {
        if self.mark_closed() {
            self.close_connections().await;
        }
    }

    pub(crate) async fn close_connections(&self) {
        close_all(&self.connections).await;
    }
}

async fn close_all<C: BrokerConnection>(connections: &[C]) {
    for (index, connection) in connections.iter().enumerate() {
        if let Err(e) = connection.close().await {
            warn!(index, error = ?e, "Failed to close connection to the RabbitMq broker");
        }
    }
}
