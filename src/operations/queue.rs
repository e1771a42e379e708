use amq_protocol_types::FieldTable;
use lapin::options;
use tracing::info;

use super::{settle, AmqpClient};
use crate::client::{broker_error, ClientError};

#[derive(Debug, Clone, Default)]
pub struct QueueDeclareOptions {
    pub name: String,
    pub durable: bool,
    pub auto_delete: bool,
    pub exclusive: bool,
    pub no_wait: bool,
    /// Only check whether the queue exists, without creating it.
    pub passive: bool,
    pub args: FieldTable,
}

#[derive(Debug, Clone, Default)]
pub struct QueueBindOptions {
    pub name: String,
    pub key: String,
    pub exchange: String,
    pub no_wait: bool,
    pub args: FieldTable,
}

#[derive(Debug, Clone, Default)]
pub struct QueueUnbindOptions {
    pub name: String,
    pub key: String,
    pub exchange: String,
    pub args: FieldTable,
}

#[derive(Debug, Clone, Default)]
pub struct QueueDeleteOptions {
    pub name: String,
    pub if_unused: bool,
    pub if_empty: bool,
    pub no_wait: bool,
}

#[derive(Debug, Clone, Default)]
pub struct QueuePurgeOptions {
    pub name: String,
    pub no_wait: bool,
}

/// A queue as reported by the broker when declaring it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QueueInfo {
    /// The queue name, generated by the broker if the declaration left it empty.
    pub name: String,
    pub message_count: u32,
    pub consumer_count: u32,
}

impl AmqpClient {
    /// Declare a queue, or check that it exists if `passive` is set.
    pub async fn queue_declare(
        &self,
        options: QueueDeclareOptions,
    ) -> Result<QueueInfo, ClientError> {
        let lease = self.lease().await?;
        let outcome = lease
            .queue_declare(
                &options.name,
                options::QueueDeclareOptions {
                    passive: options.passive,
                    durable: options.durable,
                    exclusive: options.exclusive,
                    auto_delete: options.auto_delete,
                    nowait: options.no_wait,
                },
                options.args,
            )
            .await
            .map(|queue| QueueInfo {
                name: queue.name().as_str().to_owned(),
                message_count: queue.message_count(),
                consumer_count: queue.consumer_count(),
            })
            .map_err(broker_error("queue.declare"));
        settle(lease, "queue.declare", &outcome).await;

        if let Ok(queue) = &outcome {
            info!(name = %queue.name, messages = queue.message_count, "Queue declared");
        }
        outcome
    }

    pub async fn queue_bind(&self, options: QueueBindOptions) -> Result<(), ClientError> {
        let lease = self.lease().await?;
        let outcome = lease
            .queue_bind(
                &options.name,
                &options.exchange,
                &options.key,
                options::QueueBindOptions {
                    nowait: options.no_wait,
                },
                options.args,
            )
            .await
            .map_err(broker_error("queue.bind"));
        settle(lease, "queue.bind", &outcome).await;

        if outcome.is_ok() {
            info!(name = %options.name, key = %options.key, exchange = %options.exchange, "Queue bound");
        }
        outcome
    }

    pub async fn queue_unbind(&self, options: QueueUnbindOptions) -> Result<(), ClientError> {
        let lease = self.lease().await?;
        let outcome = lease
            .queue_unbind(&options.name, &options.exchange, &options.key, options.args)
            .await
            .map_err(broker_error("queue.unbind"));
        settle(lease, "queue.unbind", &outcome).await;

        if outcome.is_ok() {
            info!(name = %options.name, key = %options.key, exchange = %options.exchange, "Queue unbound");
        }
        outcome
    }

    /// Delete a queue, returning the number of messages it still held.
    pub async fn queue_delete(&self, options: QueueDeleteOptions) -> Result<u32, ClientError> {
        let lease = self.lease().await?;
        let outcome = lease
            .queue_delete(
                &options.name,
                options::QueueDeleteOptions {
                    if_unused: options.if_unused,
                    if_empty: options.if_empty,
                    nowait: options.no_wait,
                },
            )
            .await
            .map_err(broker_error("queue.delete"));
        settle(lease, "queue.delete", &outcome).await;

        if outcome.is_ok() {
            info!(name = %options.name, "Queue deleted");
        }
        outcome
    }

    /// Remove every message from a queue, returning how many were purged.
    pub async fn queue_purge(&self, options: QueuePurgeOptions) -> Result<u32, ClientError> {
        let lease = self.lease().await?;
        let outcome = lease
            .queue_purge(
                &options.name,
                options::QueuePurgeOptions {
                    nowait: options.no_wait,
                },
            )
            .await
            .map_err(broker_error("queue.purge"));
        settle(lease, "queue.purge", &outcome).await;

        if let Ok(messages) = &outcome {
            info!(name = %options.name, messages, "Queue purged");
        }
        outcome
    }
}
