use amq_protocol_types::FieldTable;
use lapin::{options, ExchangeKind};
use tracing::info;

use super::{settle, AmqpClient};
use crate::client::{broker_error, ClientError};

#[derive(Debug, Clone, Default)]
pub struct ExchangeDeclareOptions {
    pub name: String,
    /// `direct`, `fanout`, `topic`, `headers` or the name of a plugin-provided type.
    /// Parsed with [`exchange_kind`].
    pub kind: String,
    pub durable: bool,
    pub auto_delete: bool,
    pub internal: bool,
    pub no_wait: bool,
    pub passive: bool,
    pub args: FieldTable,
}

#[derive(Debug, Clone, Default)]
pub struct ExchangeBindOptions {
    pub destination: String,
    pub source: String,
    pub key: String,
    pub no_wait: bool,
    pub args: FieldTable,
}

#[derive(Debug, Clone, Default)]
pub struct ExchangeUnbindOptions {
    pub destination: String,
    pub source: String,
    pub key: String,
    pub no_wait: bool,
    pub args: FieldTable,
}

#[derive(Debug, Clone, Default)]
pub struct ExchangeDeleteOptions {
    pub name: String,
    pub if_unused: bool,
    pub no_wait: bool,
}

/// Map an exchange type name onto [`ExchangeKind`]. An empty name means `direct`.
pub fn exchange_kind(kind: &str) -> ExchangeKind {
    match kind.to_ascii_lowercase().as_str() {
        "" | "direct" => ExchangeKind::Direct,
        "fanout" => ExchangeKind::Fanout,
        "topic" => ExchangeKind::Topic,
        "headers" => ExchangeKind::Headers,
        _ => ExchangeKind::Custom(kind.to_owned()),
    }
}

impl AmqpClient {
    pub async fn exchange_declare(
        &self,
        options: ExchangeDeclareOptions,
    ) -> Result<(), ClientError> {
        let lease = self.lease().await?;
        let outcome = lease
            .exchange_declare(
                &options.name,
                exchange_kind(&options.kind),
                options::ExchangeDeclareOptions {
                    passive: options.passive,
                    durable: options.durable,
                    auto_delete: options.auto_delete,
                    internal: options.internal,
                    nowait: options.no_wait,
                },
                options.args,
            )
            .await
            .map_err(broker_error("exchange.declare"));
        settle(lease, "exchange.declare", &outcome).await;

        if outcome.is_ok() {
            info!(name = %options.name, kind = %options.kind, "Exchange declared");
        }
        outcome
    }

    /// Bind `destination` to `source`: messages published on `source` with a matching
    /// routing key are routed to `destination`.
    pub async fn exchange_bind(&self, options: ExchangeBindOptions) -> Result<(), ClientError> {
        let lease = self.lease().await?;
        let outcome = lease
            .exchange_bind(
                &options.destination,
                &options.source,
                &options.key,
                options::ExchangeBindOptions {
                    nowait: options.no_wait,
                },
                options.args,
            )
            .await
            .map_err(broker_error("exchange.bind"));
        settle(lease, "exchange.bind", &outcome).await;

        if outcome.is_ok() {
            info!(destination = %options.destination, key = %options.key, source = %options.source, "Exchange bound");
        }
        outcome
    }

    pub async fn exchange_unbind(
        &self,
        options: ExchangeUnbindOptions,
    ) -> Result<(), ClientError> {
        let lease = self.lease().await?;
        let outcome = lease
            .exchange_unbind(
                &options.destination,
                &options.source,
                &options.key,
                options::ExchangeUnbindOptions {
                    nowait: options.no_wait,
                },
                options.args,
            )
            .await
            .map_err(broker_error("exchange.unbind"));
        settle(lease, "exchange.unbind", &outcome).await;

        if outcome.is_ok() {
            info!(destination = %options.destination, key = %options.key, source = %options.source, "Exchange unbound");
        }
        outcome
    }

    pub async fn exchange_delete(
        &self,
        options: ExchangeDeleteOptions,
    ) -> Result<(), ClientError> {
        let lease = self.lease().await?;
        let outcome = lease
            .exchange_delete(
                &options.name,
                options::ExchangeDeleteOptions {
                    if_unused: options.if_unused,
                    nowait: options.no_wait,
                },
            )
            .await
            .map_err(broker_error("exchange.delete"));
        settle(lease, "exchange.delete", &outcome).await;

        if outcome.is_ok() {
            info!(name = %options.name, "Exchange deleted");
        }
        outcome
    }
}
