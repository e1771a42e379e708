use lapin::message::BasicReturnMessage;
use std::sync::Arc;

use crate::pool::PoolError;

/// Error returned by [`Client`](super::Client) and the broker operations built on top of it.
#[derive(thiserror::Error, Debug)]
pub enum ClientError {
    #[error("The AMQP client has not been initialised")]
    NotInitialized,
    #[error("The AMQP client has already been initialised with different settings")]
    Reconfigured,
    /// Initialisation failed. The same error is handed to every caller of `init`.
    #[error("Failed to initialise the AMQP client")]
    Connect(#[source] Arc<PoolError>),
    #[error(transparent)]
    Pool(#[from] PoolError),
    #[error("The RabbitMq broker failed the `{operation}` operation")]
    Operation {
        operation: &'static str,
        #[source]
        source: lapin::Error,
    },
    #[error("The message could not be routed: {0:?}")]
    Unroutable(Box<BasicReturnMessage>),
    #[error("The RabbitMq broker nacked the publishing of the message: {0:?}")]
    NegativeAck(Option<Box<BasicReturnMessage>>),
}

impl ClientError {
    /// The error message, followed by the messages of all its causes.
    pub fn chain_message(&self) -> String {
        let mut message = self.to_string();
        let mut source = std::error::Error::source(self);
        while let Some(cause) = source {
            message.push_str(": ");
            message.push_str(&cause.to_string());
            source = cause.source();
        }
        message
    }
}

pub(crate) fn broker_error(operation: &'static str) -> impl FnOnce(lapin::Error) -> ClientError {
    move |source| ClientError::Operation { operation, source }
}
