use std::collections::HashSet;
use std::sync::{Arc, Mutex};

use warren::amqp::configuration::{BrokerEndpoint, PoolSettings};
use warren::pool::{ChannelPool, ConnectionManager, PoolError};
use warren::transport::{BrokerChannel, BrokerConnection};

use crate::helpers::{settle_background_tasks, MockConnection, MockTransport};

async fn pool_with(
    transport: &MockTransport,
    connections: usize,
    capacity: usize,
) -> ChannelPool<MockConnection> {
    let connections = ConnectionManager::connect(transport, &BrokerEndpoint::default(), connections)
        .await
        .expect("Failed to connect");
    ChannelPool::new(Arc::new(connections), capacity)
}

#[tokio::test]
async fn the_number_of_connections_follows_the_pool_settings() {
    // Arrange
    let transport = MockTransport::new();
    let settings = PoolSettings {
        channels_per_connection: 2,
        channel_cache_size: 5,
    };

    // Act
    let connections =
        ConnectionManager::connect(&transport, &BrokerEndpoint::default(), settings.connection_count())
            .await
            .unwrap();

    // Assert
    assert_eq!(connections.len(), 2);
    assert_eq!(transport.dials(), 2);
}

#[tokio::test]
async fn a_failed_dial_aborts_and_closes_the_connections_already_established() {
    // Arrange
    let transport = MockTransport::failing_on_dial(1);

    // Act
    let result = ConnectionManager::connect(&transport, &BrokerEndpoint::default(), 3).await;

    // Assert
    assert!(matches!(result, Err(PoolError::Connect { index: 1, .. })));
    assert_eq!(transport.dials(), 2);
    assert_eq!(transport.closed_connections(), 1);
}

#[tokio::test]
async fn a_fresh_pool_hands_out_healthy_channels() {
    let transport = MockTransport::new();
    let pool = pool_with(&transport, 1, 1).await;

    let channel = pool.acquire().await.unwrap();

    assert!(channel.is_healthy());
    assert_eq!(transport.openings(), vec![0]);
}

#[tokio::test]
async fn released_channels_are_reused() {
    // Arrange
    let transport = MockTransport::new();
    let pool = pool_with(&transport, 1, 1).await;
    let channel = pool.acquire().await.unwrap();
    let id = channel.id;

    // Act
    pool.release(channel).await.unwrap();
    let channel = pool.acquire().await.unwrap();

    // Assert
    assert_eq!(channel.id, id);
    assert_eq!(transport.openings().len(), 1);
}

#[tokio::test]
async fn dead_channels_never_go_back_into_the_cache() {
    // Arrange
    let transport = MockTransport::new();
    let pool = pool_with(&transport, 1, 1).await;
    let channel = pool.acquire().await.unwrap();
    let id = channel.id;
    channel.kill();

    // Act
    pool.release(channel).await.unwrap();

    // Assert
    assert_eq!(pool.status().idle_channels, 0);
    let channel = pool.acquire().await.unwrap();
    assert_ne!(channel.id, id);
    assert_eq!(transport.openings().len(), 2);
}

#[tokio::test]
async fn channels_closed_while_cached_are_replaced() {
    // Arrange
    let transport = MockTransport::new();
    let pool = pool_with(&transport, 1, 1).await;
    let channel = pool.acquire().await.unwrap();
    let observer = channel.clone();
    pool.release(channel).await.unwrap();
    assert_eq!(pool.status().idle_channels, 1);

    // Act
    observer.kill();
    let channel = pool.acquire().await.unwrap();

    // Assert
    assert_ne!(channel.id, observer.id);
    assert!(channel.is_healthy());
    assert_eq!(pool.status().idle_channels, 0);
}

#[tokio::test]
async fn the_cache_never_exceeds_its_capacity() {
    // Arrange
    let transport = MockTransport::new();
    let pool = pool_with(&transport, 1, 2).await;
    let mut channels = Vec::new();
    for _ in 0..5 {
        channels.push(pool.acquire().await.unwrap());
    }
    let observers: Vec<_> = channels.iter().cloned().collect();

    // Act
    for channel in channels {
        pool.release(channel).await.unwrap();
        assert!(pool.status().idle_channels <= 2);
    }

    // Assert
    assert_eq!(pool.status().idle_channels, 2);
    assert_eq!(pool.capacity(), 2);
    let closed = observers.iter().filter(|c| c.close_count() == 1).count();
    let open = observers.iter().filter(|c| c.is_healthy()).count();
    assert_eq!(closed, 3);
    assert_eq!(open, 2);
}

#[tokio::test]
async fn new_channels_are_spread_over_connections_in_round_robin() {
    // Arrange
    let transport = MockTransport::new();
    let pool = pool_with(&transport, 3, 6).await;

    // Act
    let mut leased = Vec::new();
    for _ in 0..4 {
        leased.push(pool.acquire().await.unwrap());
    }
    // Reusing cached channels does not move the cursor.
    for channel in leased.drain(..2) {
        pool.release(channel).await.unwrap();
    }
    for _ in 0..2 {
        leased.push(pool.acquire().await.unwrap());
    }
    leased.push(pool.acquire().await.unwrap());

    // Assert
    assert_eq!(transport.openings(), vec![0, 1, 2, 0, 1]);
    let connections: Vec<_> = leased.iter().map(|c| c.connection).collect();
    assert_eq!(connections, vec![2, 0, 0, 1, 1]);
}

#[tokio::test]
async fn a_broken_connection_fails_the_acquisitions_that_land_on_it() {
    // Arrange
    let transport = MockTransport::new();
    let pool = pool_with(&transport, 2, 2).await;
    pool.connections().get(1).unwrap().close().await.unwrap();

    // Act
    let first = pool.acquire().await;
    let second = pool.acquire().await;
    let third = pool.acquire().await;

    // Assert
    assert_eq!(first.unwrap().connection, 0);
    assert!(matches!(
        second,
        Err(PoolError::ChannelCreate { connection: 1, .. })
    ));
    assert_eq!(third.unwrap().connection, 0);
}

#[tokio::test]
async fn settled_leases_follow_the_outcome_of_the_operation() {
    // Arrange
    let transport = MockTransport::new();
    let pool = pool_with(&transport, 1, 2).await;
    let succeeded = pool.lease().await.unwrap();
    let failed = pool.lease().await.unwrap();
    let (succeeded_observer, failed_observer) = ((*succeeded).clone(), (*failed).clone());

    // Act
    succeeded.settle(&Ok::<_, ()>(())).await.unwrap();
    failed.settle(&Err::<(), _>("queue not found")).await.unwrap();

    // Assert
    assert_eq!(pool.status().idle_channels, 1);
    assert_eq!(succeeded_observer.close_count(), 0);
    assert_eq!(failed_observer.close_count(), 1);
}

#[tokio::test]
async fn unsettled_leases_close_their_channel() {
    // Arrange
    let transport = MockTransport::new();
    let pool = pool_with(&transport, 1, 1).await;
    let lease = pool.lease().await.unwrap();
    let observer = (*lease).clone();

    // Act
    drop(lease);
    settle_background_tasks().await;

    // Assert
    assert_eq!(observer.close_count(), 1);
    assert_eq!(pool.status().idle_channels, 0);
}

#[tokio::test]
async fn a_drained_and_closed_pool_refuses_to_hand_out_channels() {
    // Arrange
    let transport = MockTransport::new();
    let pool = pool_with(&transport, 2, 2).await;
    let channel = pool.acquire().await.unwrap();
    let observer = channel.clone();
    pool.release(channel).await.unwrap();

    // Act
    pool.drain().await;
    pool.connections().close().await;
    pool.connections().close().await;

    // Assert
    assert_eq!(observer.close_count(), 1);
    assert_eq!(transport.closed_connections(), 2);
    assert!(pool.connections().is_closed());
    assert!(matches!(pool.acquire().await, Err(PoolError::Closed)));
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn concurrent_callers_never_share_a_channel() {
    const CAPACITY: usize = 4;
    const TASKS: usize = 16;
    const CYCLES: usize = 50;

    // Arrange
    let transport = MockTransport::new();
    let pool = Arc::new(pool_with(&transport, 2, CAPACITY).await);
    let in_use = Arc::new(Mutex::new(HashSet::new()));

    // Act
    let handles: Vec<_> = (0..TASKS)
        .map(|_| {
            let pool = Arc::clone(&pool);
            let in_use = Arc::clone(&in_use);
            tokio::spawn(async move {
                for _ in 0..CYCLES {
                    let channel = pool.acquire().await.unwrap();
                    assert!(
                        in_use.lock().unwrap().insert(channel.id),
                        "channel {} handed out twice",
                        channel.id
                    );
                    tokio::task::yield_now().await;
                    in_use.lock().unwrap().remove(&channel.id);
                    pool.release(channel).await.unwrap();

                    let idle = pool.status().idle_channels;
                    assert!(idle <= CAPACITY, "{idle} idle channels");
                }
            })
        })
        .collect();
    for handle in handles {
        handle.await.unwrap();
    }

    // Assert
    let status = pool.status();
    assert!(status.idle_channels <= CAPACITY);
    assert!(status.idle_channels >= 1);
    assert!(transport.openings().len() >= status.idle_channels);
}

#[tokio::test]
async fn a_dead_cached_channel_is_replaced_with_a_new_one() {
    // Arrange
    let transport = MockTransport::new();
    let pool = pool_with(&transport, 1, 2).await;
    let first = pool.acquire().await.unwrap();
    let second = pool.acquire().await.unwrap();
    let (first_observer, second_id) = (first.clone(), second.id);
    pool.release(first).await.unwrap();
    pool.release(second).await.unwrap();
    first_observer.kill();

    // Act
    let channel = pool.acquire().await.unwrap();

    // Assert
    assert_ne!(channel.id, first_observer.id);
    assert_ne!(channel.id, second_id);
    assert_eq!(transport.openings(), vec![0, 0, 0]);
    // The healthy channel queued behind the dead one stays cached.
    assert_eq!(pool.status().idle_channels, 1);
    assert_eq!(pool.acquire().await.unwrap().id, second_id);
}

#[tokio::test]
async fn channels_released_once_the_pool_is_closing_are_closed() {
    // Arrange
    let transport = MockTransport::new();
    let pool = pool_with(&transport, 1, 2).await;
    let channel = pool.acquire().await.unwrap();
    let observer = channel.clone();

    // Act
    assert!(pool.connections().mark_closed());
    pool.release(channel).await.unwrap();

    // Assert
    assert_eq!(observer.close_count(), 1);
    assert_eq!(pool.status().idle_channels, 0);
    assert_eq!(transport.closed_connections(), 0);
    assert!(!pool.connections().mark_closed());
    assert!(matches!(pool.acquire().await, Err(PoolError::Closed)));
}

#[tokio::test]
async fn closing_the_pool_closes_cached_channels_then_connections_once() {
    // Arrange
    let transport = MockTransport::new();
    let pool = pool_with(&transport, 2, 2).await;
    let channel = pool.acquire().await.unwrap();
    let observer = channel.clone();
    pool.release(channel).await.unwrap();

    // Act
    pool.close().await;
    pool.close().await;

    // Assert
    assert_eq!(observer.close_count(), 1);
    assert_eq!(transport.closed_connections(), 2);
    assert_eq!(pool.status().idle_channels, 0);
    assert!(matches!(pool.acquire().await, Err(PoolError::Closed)));
}
