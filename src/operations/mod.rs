//! Broker operations, each performed on a channel leased for the duration of the call.
//!
//! Every operation follows the same pattern: lease a channel from the [`Client`], issue exactly
//! one AMQP method, then settle the lease. A channel used by a failed operation is closed
//! rather than returned to the pool.
mod basic;
mod delivery;
mod exchange;
mod queue;
mod response;

pub use basic::{ConsumeOptions, GetOptions, Message, PublishOptions};
pub use delivery::Delivery;
pub use exchange::{
    exchange_kind, ExchangeBindOptions, ExchangeDeclareOptions, ExchangeDeleteOptions,
    ExchangeUnbindOptions,
};
pub use queue::{
    QueueBindOptions, QueueDeclareOptions, QueueDeleteOptions, QueueInfo, QueuePurgeOptions,
    QueueUnbindOptions,
};
pub use response::{ConsumeResponse, GetResponse, OperationResponse};

use tracing::{info, warn};

use crate::amqp::{AmqpConnection, ConnectionFactory};
use crate::client::{Client, ClientError};
use crate::pool::ChannelLease;

/// A [`Client`] talking to RabbitMq through `lapin`.
pub type AmqpClient = Client<ConnectionFactory>;

/// Give back a lease once `operation` has completed with `outcome`.
///
/// Failing to return the channel is logged: the caller is interested in the outcome of the
/// operation, not in the bookkeeping of the pool.
async fn settle<T>(
    lease: ChannelLease<'_, AmqpConnection>,
    operation: &'static str,
    outcome: &Result<T, ClientError>,
) {
    if let Err(e) = outcome {
        info!(operation, error = %e, "Discarding channel after a failed operation");
    }
    if let Err(e) = lease.settle(outcome).await {
        warn!(operation, error = ?e, "Failed to give the channel back to the pool");
    }
}
