//! The entrypoint of the crate: [`Client`] ties together the connections and the channel pool.
mod error;

pub use error::ClientError;
pub(crate) use error::broker_error;

use std::sync::Arc;

use tokio::sync::OnceCell;
use tracing::{info, warn};

use crate::amqp::configuration::{BrokerEndpoint, PoolSettings};
use crate::pool::{ChannelLease, ChannelPool, ConnectionManager, PoolStatus};
use crate::transport::{BrokerConnection, Transport};

type Channel<T> = <<T as Transport>::Connection as BrokerConnection>::Channel;

/// A handle to a pool of channels multiplexed over a fixed set of broker connections.
///
/// A `Client` starts uninitialised. The first call to [`Client::init`] opens the connections;
/// every other call, concurrent or not, waits for the first one and gets the same outcome.
/// Cloning a `Client` is cheap and all clones share the same connections and channels.
///
/// # Example
///
/// ```rust,no_run
/// use warren::amqp::configuration::{BrokerEndpoint, PoolSettings};
/// use warren::amqp::ConnectionFactory;
/// use warren::operations::{PublishOptions, Message};
/// use warren::Client;
///
/// async fn example() -> anyhow::Result<()> {
///     let client = Client::new(ConnectionFactory::new());
///     client
///         .init(BrokerEndpoint::from_env()?, PoolSettings::from_env()?)
///         .await?;
///
///     client
///         .publish(
///             PublishOptions {
///                 routing_key: "my-queue".into(),
///                 ..Default::default()
///             },
///             Message::new(b"hello".to_vec()),
///         )
///         .await?;
///
///     client.teardown().await;
///     Ok(())
/// }
/// ```
pub struct Client<T: Transport> {
    shared: Arc<Shared<T>>,
}

struct Shared<T: Transport> {
    transport: T,
    state: OnceCell<InitState<T::Connection>>,
}

/// The outcome of the first call to `init`, along with the settings it was made with.
struct InitState<C: BrokerConnection> {
    endpoint: BrokerEndpoint,
    pool_settings: PoolSettings,
    pool: Result<ChannelPool<C>, Arc<crate::pool::PoolError>>,
}

impl<T: Transport> Clone for Client<T> {
    fn clone(&self) -> Self {
        Self {
            shared: Arc::clone(&self.shared),
        }
    }
}

impl<T: Transport> Client<T> {
    pub fn new(transport: T) -> Self {
        Self {
            shared: Arc::new(Shared {
                transport,
                state: OnceCell::new(),
            }),
        }
    }

    /// Open the connections and set up the channel pool.
    ///
    /// Unset fields in `endpoint` and `pool_settings` are replaced with their defaults.
    ///
    /// Only the first call does any work; a failure is final. Later calls with the same
    /// settings return the outcome of the first one, calls with different settings fail
    /// with [`ClientError::Reconfigured`].
    #[tracing::instrument(name = "amqp_client_init", skip_all)]
    pub async fn init(
        &self,
        endpoint: BrokerEndpoint,
        pool_settings: PoolSettings,
    ) -> Result<(), ClientError> {
        let endpoint = endpoint.with_defaults();
        let pool_settings = pool_settings.with_defaults();
        let state = self
            .shared
            .state
            .get_or_init(|| self.initialize(endpoint.clone(), pool_settings))
            .await;

        if state.endpoint != endpoint || state.pool_settings != pool_settings {
            warn!("Ignoring attempt to re-initialise the AMQP client with different settings");
            return Err(ClientError::Reconfigured);
        }
        match &state.pool {
            Ok(_) => Ok(()),
            Err(e) => Err(ClientError::Connect(Arc::clone(e))),
        }
    }

    async fn initialize(
        &self,
        endpoint: BrokerEndpoint,
        pool_settings: PoolSettings,
    ) -> InitState<T::Connection> {
        info!(
            broker = %endpoint.display_url(),
            connections = pool_settings.connection_count(),
            channel_cache_size = pool_settings.channel_cache_size,
            "Initialising AMQP client"
        );
        let pool = ConnectionManager::connect(
            &self.shared.transport,
            &endpoint,
            pool_settings.connection_count(),
        )
        .await
        .map(|connections| {
            ChannelPool::new(Arc::new(connections), pool_settings.channel_cache_size)
        })
        .map_err(Arc::new);
        InitState {
            endpoint,
            pool_settings,
            pool,
        }
    }

    fn pool(&self) -> Result<&ChannelPool<T::Connection>, ClientError> {
        match self.shared.state.get() {
            Some(InitState { pool: Ok(pool), .. }) => Ok(pool),
            _ => Err(ClientError::NotInitialized),
        }
    }

    pub fn is_initialized(&self) -> bool {
        self.pool().is_ok()
    }

    /// The effective settings of an initialised client.
    pub fn settings(&self) -> Option<(&BrokerEndpoint, PoolSettings)> {
        match self.shared.state.get() {
            Some(InitState {
                endpoint,
                pool_settings,
                pool: Ok(_),
            }) => Some((endpoint, *pool_settings)),
            _ => None,
        }
    }

    pub fn status(&self) -> Option<PoolStatus> {
        self.pool().ok().map(ChannelPool::status)
    }

    /// Take a channel out of the pool. It must be handed back with [`Client::release`].
    ///
    /// Prefer [`Client::lease`], which cannot leak the channel.
    pub async fn acquire(&self) -> Result<Channel<T>, ClientError> {
        Ok(self.pool()?.acquire().await?)
    }

    /// Hand back a channel obtained with [`Client::acquire`].
    ///
    /// If the operation performed with the channel failed, pass its error: the channel is then
    /// closed instead of being reused.
    pub async fn release(
        &self,
        channel: Channel<T>,
        operation_error: Option<&(dyn std::error::Error + Send + Sync)>,
    ) -> Result<(), ClientError> {
        let pool = self.pool()?;
        match operation_error {
            None => pool.release(channel).await?,
            Some(e) => {
                info!(error = %e, "Discarding channel after a failed operation");
                pool.discard(channel).await?
            }
        }
        Ok(())
    }

    /// Take a channel out of the pool, wrapped in a guard that gives it back.
    pub async fn lease(&self) -> Result<ChannelLease<'_, T::Connection>, ClientError> {
        Ok(self.pool()?.lease().await?)
    }

    /// Close the cached channels and every connection.
    ///
    /// Failures are logged and otherwise ignored. Acquiring a channel after teardown fails
    /// with [`PoolError::Closed`](crate::pool::PoolError::Closed); channels still out on lease
    /// are closed when released.
    pub async fn teardown(&self) {
        if let Ok(pool) = self.pool() {
            info!("Tearing down AMQP client");
            pool.close().await;
        }
    }
}
