//! A bounded cache of channels, spread over the connections of a [`ConnectionManager`].
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use crossbeam::queue::ArrayQueue;
use tracing::{debug, warn};

use super::{ChannelLease, ConnectionManager, PoolError};
use crate::transport::{BrokerChannel, BrokerConnection};

/// Point-in-time view of a [`ChannelPool`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PoolStatus {
    /// Number of physical connections backing the pool.
    pub connections: usize,
    /// Channels currently at rest in the cache.
    pub idle_channels: usize,
    /// Maximum number of channels the cache can hold.
    pub capacity: usize,
}

/// `ChannelPool` hands out channels, reusing the ones returned to it.
///
/// At most `capacity` channels are kept at rest; there is no limit on how many channels can
/// be leased at the same time. New channels are opened on the connections of the underlying
/// [`ConnectionManager`] in round-robin order.
///
/// The cache is a lock-free bounded queue and the round-robin cursor an atomic counter:
/// opening a channel never blocks callers that are only reusing cached ones, nor callers
/// opening channels concurrently.
pub struct ChannelPool<C: BrokerConnection> {
    connections: Arc<ConnectionManager<C>>,
    idle: ArrayQueue<C::Channel>,
    cursor: AtomicUsize,
}

impl<C: BrokerConnection> ChannelPool<C> {
    /// Build a pool caching up to `capacity` channels (at least one).
    pub fn new(connections: Arc<ConnectionManager<C>>, capacity: usize) -> Self {
        Self {
            connections,
            idle: ArrayQueue::new(capacity.max(1)),
            cursor: AtomicUsize::new(0),
        }
    }

    pub fn connections(&self) -> &ConnectionManager<C> {
        &self.connections
    }

    pub fn capacity(&self) -> usize {
        self.idle.capacity()
    }

    pub fn status(&self) -> PoolStatus {
        PoolStatus {
            connections: self.connections.len(),
            idle_channels: self.idle.len(),
            capacity: self.idle.capacity(),
        }
    }

    /// Get a channel: a cached one if available and still healthy, a new one otherwise.
    pub async fn acquire(&self) -> Result<C::Channel, PoolError> {
        if self.connections.is_closed() {
            return Err(PoolError::Closed);
        }
        match self.idle.pop() {
            Some(channel) if channel.is_healthy() => return Ok(channel),
            Some(_) => debug!("Cached channel has been closed by the broker, opening a new one"),
            None => debug!("No cached channel available, opening a new one"),
        }
        self.open_channel().await
    }

    /// Same as [`ChannelPool::acquire`], wrapping the channel in a [`ChannelLease`].
    pub async fn lease(&self) -> Result<ChannelLease<'_, C>, PoolError> {
        let channel = self.acquire().await?;
        Ok(ChannelLease::new(self, channel))
    }

    /// Return a channel to the pool.
    ///
    /// Channels closed by the broker are dropped. Healthy channels go back into the cache,
    /// unless it is full: then they are closed.
    pub async fn release(&self, channel: C::Channel) -> Result<(), PoolError> {
        if !channel.is_healthy() {
            debug!("Released channel has been closed by the broker, dropping it");
            return Ok(());
        }
        if self.connections.is_closed() {
            return close_channel(channel).await;
        }
        match self.idle.push(channel) {
            Ok(()) => {
                // A teardown may have drained the cache between the check above and the push.
                if self.connections.is_closed() {
                    self.drain().await;
                }
                Ok(())
            }
            Err(channel) => {
                debug!("Channel cache is full, closing channel");
                close_channel(channel).await
            }
        }
    }

    /// Close a channel instead of returning it to the pool.
    pub async fn discard(&self, channel: C::Channel) -> Result<(), PoolError> {
        if !channel.is_healthy() {
            return Ok(());
        }
        close_channel(channel).await
    }

    /// [`ChannelPool::discard`] for callers that cannot wait, e.g. destructors.
    ///
    /// The channel is closed on a background task if a `tokio` runtime is available.
    pub(crate) fn discard_detached(&self, channel: C::Channel) {
        if !channel.is_healthy() {
            return;
        }
        match tokio::runtime::Handle::try_current() {
            Ok(runtime) => {
                runtime.spawn(async move {
                    if let Err(e) = channel.close().await {
                        warn!(error = ?e, "Failed to close an abandoned channel");
                    }
                });
            }
            Err(_) => warn!("No tokio runtime available to close an abandoned channel"),
        }
    }

    /// Close every channel at rest in the cache.
    pub async fn drain(&self) {
        while let Some(channel) = self.idle.pop() {
            if let Err(e) = self.discard(channel).await {
                warn!(error = ?e, "Failed to close cached channel");
            }
        }
    }

    /// Stop handing out channels, close the cached ones, then close every connection.
    ///
    /// Channels released afterwards are closed instead of cached. Only the first call closes
    /// the connections.
    pub async fn close(&self) {
        let first = self.connections.mark_closed();
        self.drain().await;
        if first {
            self.connections.close_connections().await;
        }
    }

    /// Open a channel on the connection the cursor points at, then move the cursor along.
    async fn open_channel(&self) -> Result<C::Channel, PoolError> {
        let connection_count = self.connections.len();
        let cursor = self
            .cursor
            .fetch_update(Ordering::AcqRel, Ordering::Acquire, |cursor| {
                Some((cursor + 1) % connection_count)
            })
            .unwrap_or_else(|cursor| cursor);
        let (index, connection) = self.connections.select(cursor);
        debug!(connection = index, "Opening a new channel");
        connection
            .open_channel()
            .await
            .map_err(|source| PoolError::ChannelCreate {
                connection: index,
                source,
            })
    }
}

async fn close_channel<C: BrokerChannel>(channel: C) -> Result<(), PoolError> {
    channel.close().await.map_err(PoolError::ChannelClose)
}
