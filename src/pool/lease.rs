use std::ops::Deref;

use super::{ChannelPool, PoolError};
use crate::transport::BrokerConnection;

/// Exclusive use of a pooled channel for the duration of one operation.
///
/// A lease must be given back with [`ChannelLease::settle`] (or [`ChannelLease::release`] /
/// [`ChannelLease::discard`]). A lease that is dropped without being settled, e.g. because
/// the operation returned early, panicked or its future was cancelled, is assumed to hold a
/// broken channel: the channel is closed in the background and never reused.
pub struct ChannelLease<'a, C: BrokerConnection> {
    pool: &'a ChannelPool<C>,
    channel: Option<C::Channel>,
}

impl<'a, C: BrokerConnection> ChannelLease<'a, C> {
    pub(crate) fn new(pool: &'a ChannelPool<C>, channel: C::Channel) -> Self {
        Self {
            pool,
            channel: Some(channel),
        }
    }

    /// Give the channel back according to the outcome of the operation it was used for:
    /// returned to the pool on success, closed on failure.
    ///
    /// Any error is treated as a sign the channel might be unusable, even those that leave
    /// the channel open (e.g. a publish on a missing exchange).
    pub async fn settle<T, E>(self, outcome: &Result<T, E>) -> Result<(), PoolError> {
        match outcome {
            Ok(_) => self.release().await,
            Err(_) => self.discard().await,
        }
    }

    /// Return the channel to the pool. See [`ChannelPool::release`].
    pub async fn release(mut self) -> Result<(), PoolError> {
        match self.channel.take() {
            Some(channel) => self.pool.release(channel).await,
            None => Ok(()),
        }
    }

    /// Close the channel. See [`ChannelPool::discard`].
    pub async fn discard(mut self) -> Result<(), PoolError> {
        match self.channel.take() {
            Some(channel) => self.pool.discard(channel).await,
            None => Ok(()),
        }
    }
}

impl<C: BrokerConnection> Deref for ChannelLease<'_, C> {
    type Target = C::Channel;

    fn deref(&self) -> &Self::Target {
        // Only `None` once the lease has been consumed by `release`/`discard`.
        self.channel.as_ref().expect("Channel already returned to the pool")
    }
}

impl<C: BrokerConnection> Drop for ChannelLease<'_, C> {
    fn drop(&mut self) {
        if let Some(channel) = self.channel.take() {
            tracing::debug!("Channel lease dropped without being settled, closing the channel");
            self.pool.discard_detached(channel);
        }
    }
}
