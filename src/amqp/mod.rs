//! Helpers for connecting to a RabbitMq broker through `lapin`.

pub mod configuration;
mod factory;
pub use factory::{AmqpConnection, ConnectionFactory};
pub use lapin::{Channel, Connection};

pub use lapin::{options, types, BasicProperties, ExchangeKind};
