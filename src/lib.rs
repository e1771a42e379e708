//! `warren` lets many concurrent tasks talk to a RabbitMq broker, built on top of [`lapin`],
//! without each of them paying for a connection of its own.
//!
//! A [`Client`] opens a fixed set of connections once and multiplexes a bounded cache of
//! reusable channels over them. Every broker operation (see [`operations`]) leases a channel
//! for the duration of a single call and gives it back afterwards: healthy channels are reused,
//! broken ones are replaced.
//!
//! [`Client`] and [`ChannelPool`](crate::pool::ChannelPool) are the best starting points to
//! learn more about what `warren` provides.

pub mod amqp;
pub mod client;
pub mod operations;
pub mod pool;
pub mod transport;

pub use client::{Client, ClientError};
pub use operations::AmqpClient;
