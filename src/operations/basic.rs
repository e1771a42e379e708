use std::time::Duration;

use amq_protocol_types::FieldTable;
use futures_util::{FutureExt, StreamExt};
use lapin::{options, publisher_confirm::Confirmation, BasicProperties, Channel};
use tokio::time::timeout;
use tracing::{debug, info, warn};
use uuid::Uuid;

use super::{settle, AmqpClient, Delivery};
use crate::client::{broker_error, ClientError};

/// Reply Code 312 - NO_ROUTE
/// See https://www.rabbitmq.com/amqp-0-9-1-reference.html
const NO_ROUTE: u16 = 312;

#[derive(Debug, Clone, Default)]
pub struct PublishOptions {
    /// The exchange to publish to. Empty for the default exchange.
    pub exchange: String,
    pub routing_key: String,
    /// Ask the broker to return the message if it cannot be routed to any queue.
    ///
    /// Returned messages are only reported as errors when the client was built with
    /// publisher confirms enabled, see
    /// [`ConnectionFactory::with_publisher_confirms`](crate::amqp::ConnectionFactory::with_publisher_confirms).
    pub mandatory: bool,
}

/// A message to publish: a payload plus its AMQP properties and headers.
#[derive(Debug, Clone, Default)]
pub struct Message {
    pub body: Vec<u8>,
    pub properties: BasicProperties,
}

impl Message {
    pub fn new(body: Vec<u8>) -> Self {
        Self {
            body,
            properties: BasicProperties::default(),
        }
    }

    #[must_use]
    pub fn with_properties(mut self, properties: BasicProperties) -> Self {
        self.properties = properties;
        self
    }
}

#[derive(Debug, Clone, Default)]
pub struct GetOptions {
    pub queue: String,
    /// Let the broker consider the message acknowledged as soon as it is delivered.
    pub auto_ack: bool,
}

#[derive(Debug, Clone)]
pub struct ConsumeOptions {
    pub queue: String,
    /// Identifier of the consumer. A random one is generated if left unspecified.
    pub consumer_tag: Option<String>,
    pub auto_ack: bool,
    pub exclusive: bool,
    pub no_local: bool,
    pub no_wait: bool,
    pub args: FieldTable,
    /// Maximum number of messages to collect.
    pub size: usize,
    /// How long to wait for each message before giving up on collecting more.
    pub wait: Duration,
}

impl Default for ConsumeOptions {
    fn default() -> Self {
        Self {
            queue: String::new(),
            consumer_tag: None,
            auto_ack: false,
            exclusive: false,
            no_local: false,
            no_wait: false,
            args: FieldTable::default(),
            size: 1,
            wait: Duration::from_secs(1),
        }
    }
}

impl AmqpClient {
    /// Publish a message.
    ///
    /// If publisher confirms are enabled, this waits for the broker to confirm the message:
    /// nacked and (with `mandatory`) unroutable messages are reported as errors.
    pub async fn publish(
        &self,
        options: PublishOptions,
        message: Message,
    ) -> Result<(), ClientError> {
        let lease = self.lease().await?;
        let outcome = publish(&lease, &options, message).await;
        settle(lease, "basic.publish", &outcome).await;

        if outcome.is_ok() {
            info!(exchange = %options.exchange, routing_key = %options.routing_key, "Message published");
        }
        outcome
    }

    /// Fetch a single message from a queue, if there is one.
    pub async fn get(&self, options: GetOptions) -> Result<Option<Delivery>, ClientError> {
        let lease = self.lease().await?;
        let outcome = lease
            .basic_get(
                &options.queue,
                options::BasicGetOptions {
                    no_ack: options.auto_ack,
                },
            )
            .await
            .map(|message| message.map(|message| Delivery::from(message.delivery)))
            .map_err(broker_error("basic.get"));
        settle(lease, "basic.get", &outcome).await;

        if let Ok(delivery) = &outcome {
            info!(queue = %options.queue, empty = delivery.is_none(), "Message fetched");
        }
        outcome
    }

    /// Register a short-lived consumer on a queue and collect up to `size` messages.
    ///
    /// Collection stops early when no message arrives within `wait`. The consumer is
    /// cancelled before returning.
    ///
    /// Without `auto_ack` the broker sends at most `size` unacknowledged messages, and any
    /// message received past the requested ones is requeued. With `auto_ack` the broker does
    /// not wait for acknowledgements: messages it pushed past `size` before the consumer was
    /// cancelled are lost.
    pub async fn consume(&self, options: ConsumeOptions) -> Result<Vec<Delivery>, ClientError> {
        let lease = self.lease().await?;
        let consumer_tag = options
            .consumer_tag
            .clone()
            .unwrap_or_else(|| Uuid::new_v4().to_string());
        let queue = options.queue.clone();
        let outcome = consume(&lease, &consumer_tag, options).await;
        settle(lease, "basic.consume", &outcome).await;

        if let Ok(deliveries) = &outcome {
            info!(%queue, received = deliveries.len(), "Messages consumed");
        }
        outcome
    }
}

#[tracing::instrument(level = "debug", skip(channel, message))]
async fn publish(
    channel: &Channel,
    options: &PublishOptions,
    message: Message,
) -> Result<(), ClientError> {
    let confirm = channel
        .basic_publish(
            &options.exchange,
            &options.routing_key,
            options::BasicPublishOptions {
                mandatory: options.mandatory,
                // The immediate flag was dropped in RabbitMQ 3.0, setting it causes a
                // not-supported error.
                immediate: false,
            },
            &message.body,
            message.properties,
        )
        .await
        .map_err(broker_error("basic.publish"))?
        .await
        .map_err(broker_error("basic.publish"))?;

    match confirm {
        Confirmation::Ack(Some(returned)) if returned.reply_code == NO_ROUTE => {
            Err(ClientError::Unroutable(returned))
        }
        Confirmation::Ack(_) | Confirmation::NotRequested => Ok(()),
        Confirmation::Nack(returned) => Err(ClientError::NegativeAck(returned)),
    }
}

async fn consume(
    channel: &Channel,
    consumer_tag: &str,
    options: ConsumeOptions,
) -> Result<Vec<Delivery>, ClientError> {
    if !options.auto_ack {
        let prefetch_count = u16::try_from(options.size.max(1)).unwrap_or(u16::MAX);
        channel
            .basic_qos(prefetch_count, options::BasicQosOptions { global: false })
            .await
            .map_err(broker_error("basic.qos"))?;
    }
    let mut consumer = channel
        .basic_consume(
            &options.queue,
            consumer_tag,
            options::BasicConsumeOptions {
                no_local: options.no_local,
                no_ack: options.auto_ack,
                exclusive: options.exclusive,
                nowait: options.no_wait,
            },
            options.args,
        )
        .await
        .map_err(broker_error("basic.consume"))?;

    let mut deliveries = Vec::with_capacity(options.size);
    let mut failure = None;
    while deliveries.len() < options.size {
        match timeout(options.wait, consumer.next()).await {
            Ok(Some(Ok(delivery))) => deliveries.push(Delivery::from(delivery)),
            Ok(Some(Err(e))) => {
                failure = Some(broker_error("basic.consume")(e));
                break;
            }
            Ok(None) | Err(_) => break,
        }
    }
    debug!(consumer_tag, received = deliveries.len(), "Cancelling consumer");

    let cancelled = channel
        .basic_cancel(
            consumer_tag,
            options::BasicCancelOptions {
                nowait: options.no_wait,
            },
        )
        .await
        .map_err(broker_error("basic.cancel"));

    // Deliveries already buffered for the cancelled consumer would stay unacked on the
    // channel once it is back in the pool.
    while let Some(Some(Ok(leftover))) = consumer.next().now_or_never() {
        if options.auto_ack {
            continue;
        }
        if let Err(e) = leftover
            .acker
            .reject(options::BasicRejectOptions { requeue: true })
            .await
        {
            warn!(consumer_tag, error = ?e, "Failed to requeue a message past the requested ones");
            failure.get_or_insert(broker_error("basic.reject")(e));
        }
    }
    if let Some(e) = failure {
        return Err(e);
    }
    cancelled?;
    Ok(deliveries)
}
