use amq_protocol_types::{DeliveryTag, ShortString};
use lapin::{acker::Acker, options, BasicProperties};

use crate::client::{broker_error, ClientError};

/// A message retrieved from a queue.
///
/// Acknowledgements travel on the channel the message was received on, which has already gone
/// back to the pool when the operation returned. If the pool closes that channel in the
/// meantime (its cache is full, or the next operation performed with it fails), [`Delivery::ack`]
/// and [`Delivery::reject`] fail and the broker redelivers the message.
#[derive(Debug, PartialEq)]
pub struct Delivery {
    pub delivery_tag: DeliveryTag,

    /// The exchange of the message. May be an empty string
    /// if the default exchange is used.
    pub exchange: ShortString,

    /// The routing key of the message. May be an empty string
    /// if no routing key is specified.
    pub routing_key: ShortString,

    pub redelivered: bool,

    /// Contains the properties and the headers of the message.
    pub properties: BasicProperties,

    pub data: Vec<u8>,

    // A message must not be acked or rejected more than once, see
    // https://www.rabbitmq.com/amqp-0-9-1-reference.html#basic.ack.delivery-tag
    acker: Acker,
}

impl Delivery {
    /// Acknowledge the message. Only needed when it was retrieved without `auto_ack`.
    pub async fn ack(&self) -> Result<(), ClientError> {
        self.acker
            .ack(options::BasicAckOptions::default())
            .await
            .map(|_| ())
            .map_err(broker_error("basic.ack"))
    }

    /// Reject the message, optionally asking the broker to requeue it.
    pub async fn reject(&self, requeue: bool) -> Result<(), ClientError> {
        self.acker
            .reject(options::BasicRejectOptions { requeue })
            .await
            .map(|_| ())
            .map_err(broker_error("basic.reject"))
    }
}

impl From<lapin::message::Delivery> for Delivery {
    fn from(value: lapin::message::Delivery) -> Self {
        Self {
            delivery_tag: value.delivery_tag,
            exchange: value.exchange,
            routing_key: value.routing_key,
            redelivered: value.redelivered,
            properties: value.properties,
            data: value.data,
            acker: value.acker,
        }
    }
}
