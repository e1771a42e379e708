use crate::amqp::configuration::{BrokerEndpoint, TlsSettings};
use crate::transport::{BrokerChannel, BrokerConnection, HealthStatus, Transport};
use lapin::{
    options::ConfirmSelectOptions,
    tcp::{AMQPUriTcpExt, NativeTlsConnector},
    uri::AMQPScheme,
    ConnectionProperties,
};
use std::sync::Arc;
use tokio::time::timeout;
use tracing::warn;

/// AMQP reply code for a clean shutdown.
const REPLY_SUCCESS: u16 = 200;

/// Dials `lapin` connections to a RabbitMq broker.
///
/// The broker address, credentials and TLS settings come from the [`BrokerEndpoint`] handed
/// to [`Transport::connect`]; the factory only carries the options that are not part of the
/// endpoint itself.
#[derive(Clone, Default)]
pub struct ConnectionFactory {
    /// Overrides the TLS configuration derived from the endpoint, if set.
    tls: Option<Arc<Tls>>,
    publisher_confirms: bool,
}

struct Tls {
    connector: NativeTlsConnector,
    /// The domain we expect on the server certificate. Defaults to the broker host.
    domain_name: Option<String>,
}

impl ConnectionFactory {
    pub fn new() -> Self {
        Self::default()
    }

    /// Enable publisher confirmations on every channel opened through this factory.
    ///
    /// Publishing then waits for the broker to ack the message and reports unroutable or
    /// nacked messages as errors.
    #[must_use]
    pub fn with_publisher_confirms(mut self) -> Self {
        self.publisher_confirms = true;
        self
    }

    /// Use a custom TLS connector, validating the certificate against the broker host.
    #[must_use]
    pub fn with_tls_connector(self, connector: NativeTlsConnector) -> Self {
        self.with_tls(connector, None)
    }

    /// Use a custom TLS connector, along with the expected domain name for the certificate.
    #[must_use]
    pub fn with_tls_connector_and_domain(
        self,
        connector: NativeTlsConnector,
        domain_name: String,
    ) -> Self {
        self.with_tls(connector, Some(domain_name))
    }

    fn with_tls(mut self, connector: NativeTlsConnector, domain_name: Option<String>) -> Self {
        self.tls = Some(Arc::new(Tls {
            connector,
            domain_name,
        }));
        self
    }

    fn tls_for(&self, endpoint: &BrokerEndpoint) -> Result<Option<Arc<Tls>>, anyhow::Error> {
        if let Some(tls) = &self.tls {
            return Ok(Some(Arc::clone(tls)));
        }
        endpoint
            .tls
            .as_ref()
            .map(|settings: &TlsSettings| {
                let mut builder = NativeTlsConnector::builder();
                if let Some(certificate) = settings.ca_certificate_chain()? {
                    builder.add_root_certificate(certificate);
                }
                Ok::<_, anyhow::Error>(Arc::new(Tls {
                    connector: builder.build()?,
                    domain_name: settings.domain.clone(),
                }))
            })
            .transpose()
    }

    /// Establish a new connection to a RabbitMq broker, encrypted if TLS is configured.
    #[tracing::instrument(
        name = "rabbitmq_connect",
        skip(self, endpoint),
        fields(broker = %endpoint.display_url())
    )]
    pub async fn new_connection(
        &self,
        endpoint: &BrokerEndpoint,
    ) -> Result<lapin::Connection, anyhow::Error> {
        let properties =
            ConnectionProperties::default().with_executor(tokio_executor_trait::Tokio::current());
        let tls = self.tls_for(endpoint)?;
        let uri = endpoint.amqp_uri();
        let connection = timeout(endpoint.connection_timeout(), async move {
            match tls {
                None => lapin::Connection::connect_uri(uri, properties).await,
                Some(tls) => connect_with_tls(uri, properties, tls).await,
            }
        })
        .await??;
        connection.on_error(|e| {
            warn!("RabbitMQ broken connection: {:?}", e);
        });
        Ok(connection)
    }
}

/// Perform a plain TCP connection using the AMQP protocol, then a TLS handshake with the
/// configured connector and expected domain.
async fn connect_with_tls(
    uri: lapin::uri::AMQPUri,
    properties: ConnectionProperties,
    tls: Arc<Tls>,
) -> Result<lapin::Connection, lapin::Error> {
    let domain_name = tls
        .domain_name
        .clone()
        .unwrap_or_else(|| uri.authority.host.clone());
    lapin::Connection::connector(
        uri,
        Box::new(move |uri| {
            let mut amqp_uri = uri.clone();
            amqp_uri.scheme = AMQPScheme::AMQP;
            amqp_uri
                .connect()
                .and_then(|tcp| tcp.into_native_tls(&tls.connector, &domain_name))
        }),
        properties,
    )
    .await
}

#[async_trait::async_trait]
impl Transport for ConnectionFactory {
    type Connection = AmqpConnection;

    async fn connect(&self, endpoint: &BrokerEndpoint) -> Result<AmqpConnection, anyhow::Error> {
        Ok(AmqpConnection {
            inner: self.new_connection(endpoint).await?,
            publisher_confirms: self.publisher_confirms,
        })
    }
}

/// A `lapin` connection, as dialled by [`ConnectionFactory`].
pub struct AmqpConnection {
    inner: lapin::Connection,
    publisher_confirms: bool,
}

#[async_trait::async_trait]
impl BrokerConnection for AmqpConnection {
    type Channel = lapin::Channel;

    async fn open_channel(&self) -> Result<lapin::Channel, anyhow::Error> {
        let channel = self.inner.create_channel().await?;
        if self.publisher_confirms {
            channel
                .confirm_select(ConfirmSelectOptions { nowait: false })
                .await?;
        }
        Ok(channel)
    }

    async fn close(&self) -> Result<(), anyhow::Error> {
        Ok(self.inner.close(REPLY_SUCCESS, "Closing connection").await?)
    }
}

#[async_trait::async_trait]
impl BrokerChannel for lapin::Channel {
    fn health(&self) -> HealthStatus {
        if self.status().connected() {
            HealthStatus::Healthy
        } else {
            HealthStatus::Unhealthy
        }
    }

    async fn close(&self) -> Result<(), anyhow::Error> {
        Ok(lapin::Channel::close(self, REPLY_SUCCESS, "Closing channel").await?)
    }
}
