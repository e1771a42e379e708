//! Inspectable result values, for hosts that prefer checking a flag over handling errors.
use super::Delivery;
use crate::client::ClientError;

/// Outcome of an operation that produces no value, e.g. a publish.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct OperationResponse {
    pub error: bool,
    pub error_message: Option<String>,
}

impl<T> From<&Result<T, ClientError>> for OperationResponse {
    fn from(outcome: &Result<T, ClientError>) -> Self {
        match outcome {
            Ok(_) => Self::default(),
            Err(e) => Self {
                error: true,
                error_message: Some(e.chain_message()),
            },
        }
    }
}

/// Outcome of [`AmqpClient::get`](super::AmqpClient::get).
#[derive(Debug, Default)]
pub struct GetResponse {
    pub delivery: Option<Delivery>,
    /// Whether a message was retrieved.
    pub ok: bool,
    pub error: bool,
    pub error_message: Option<String>,
}

impl From<Result<Option<Delivery>, ClientError>> for GetResponse {
    fn from(outcome: Result<Option<Delivery>, ClientError>) -> Self {
        match outcome {
            Ok(delivery) => Self {
                ok: delivery.is_some(),
                delivery,
                ..Self::default()
            },
            Err(e) => Self {
                error: true,
                error_message: Some(e.chain_message()),
                ..Self::default()
            },
        }
    }
}

/// Outcome of [`AmqpClient::consume`](super::AmqpClient::consume).
#[derive(Debug, Default)]
pub struct ConsumeResponse {
    pub deliveries: Vec<Delivery>,
    /// Whether at least one message was retrieved.
    pub ok: bool,
    pub error: bool,
    pub error_message: Option<String>,
}

impl From<Result<Vec<Delivery>, ClientError>> for ConsumeResponse {
    fn from(outcome: Result<Vec<Delivery>, ClientError>) -> Self {
        match outcome {
            Ok(deliveries) => Self {
                ok: !deliveries.is_empty(),
                deliveries,
                ..Self::default()
            },
            Err(e) => Self {
                error: true,
                error_message: Some(e.chain_message()),
                ..Self::default()
            },
        }
    }
}
