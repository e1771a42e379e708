/// Pool error.
#[derive(thiserror::Error, Debug)]
pub enum PoolError {
    #[error("Failed to establish connection #{index} to the RabbitMq broker")]
    Connect {
        index: usize,
        #[source]
        source: anyhow::Error,
    },
    #[error("Failed to open a new channel on connection #{connection}")]
    ChannelCreate {
        connection: usize,
        #[source]
        source: anyhow::Error,
    },
    #[error("Failed to close a channel")]
    ChannelClose(#[source] anyhow::Error),
    #[error("The connections backing the channel pool have been closed")]
    Closed,
}
