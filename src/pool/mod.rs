//! Pooling of AMQP channels over a fixed set of connections.
//!
//! This module provides three key guarantees:
//! - Connections are established once and shared by every channel.
//! - Channels closed by the broker are disposed of and replaced on-demand.
//! - No more than a fixed number of idle channels are kept open.
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use warren::amqp::configuration::{BrokerEndpoint, PoolSettings};
//! use warren::amqp::ConnectionFactory;
//! use warren::pool::{ChannelPool, ConnectionManager};
//!
//! async fn example() -> anyhow::Result<()> {
//!     let endpoint = BrokerEndpoint::default();
//!     let settings = PoolSettings {
//!         channels_per_connection: 2,
//!         channel_cache_size: 8,
//!     };
//!
//!     let connections = ConnectionManager::connect(
//!         &ConnectionFactory::new(),
//!         &endpoint,
//!         settings.connection_count(),
//!     )
//!     .await?;
//!     let pool = ChannelPool::new(Arc::new(connections), settings.channel_cache_size);
//!
//!     // Lease a channel, use it, give it back.
//!     let channel = pool.lease().await?;
//!     let outcome = channel
//!         .queue_purge("my-queue", Default::default())
//!         .await;
//!     channel.settle(&outcome).await?;
//!     Ok(())
//! }
//! ```

mod channel;
mod connection;
mod error;
mod lease;

pub use channel::{ChannelPool, PoolStatus};
pub use connection::ConnectionManager;
pub use error::PoolError;
pub use lease::ChannelLease;
