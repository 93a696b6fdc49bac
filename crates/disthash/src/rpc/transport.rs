//! Transport that reaches other ranks over tarpc.
//!
//! Requests for this process's own rank go straight into the local
//! mailbox. Requests for any other rank are carried by a spawned task that
//! takes a client from the pool, performs the call and completes the
//! request's reply with the outcome.

use crate::config::TableConfig;
use crate::kmer::KmerPair;
use crate::rank::{RankMailbox, ShardRequest};
use crate::router::PartitionRouter;
use crate::rpc::client::{call_context, ClientConfig, RankClientPool};
use crate::rpc::protocol::RpcResult;
use crate::table::DistTable;
use crate::transport::Transport;
use crate::types::{RankId, TableError, TableResult};
use std::sync::Arc;
use tokio::runtime::Handle;
use tracing::{debug, warn};

/// Transport for one rank of a multi-process table.
pub struct RemoteTransport {
    rank: RankId,
    rank_count: u32,
    local: RankMailbox<KmerPair>,
    pool: RankClientPool,
    runtime: Handle,
}

impl RemoteTransport {
    /// Build the transport for `local.rank()`, registering every other
    /// rank's address from `config.peers`. Connections open lazily.
    ///
    /// # Errors
    ///
    /// Returns `Config` errors for a missing or unparsable peer address.
    pub async fn new(config: &TableConfig, local: RankMailbox<KmerPair>) -> TableResult<Self> {
        config.validate()?;
        let router = PartitionRouter::new(config.rank_count)?;
        let pool = RankClientPool::with_config(ClientConfig::from(&config.rpc));

        for rank in router.ranks().filter(|r| *r != local.rank()) {
            pool.register_rank(rank, config.peer_addr(rank)?).await;
        }

        Ok(Self {
            rank: local.rank(),
            rank_count: config.rank_count,
            local,
            pool,
            runtime: Handle::current(),
        })
    }

    pub fn pool(&self) -> &RankClientPool {
        &self.pool
    }
}

impl Transport<KmerPair> for RemoteTransport {
    fn rank_count(&self) -> u32 {
        self.rank_count
    }

    fn submit(&self, rank: RankId, request: ShardRequest<KmerPair>) {
        if rank == self.rank {
            self.local.submit(request);
        } else if rank.as_u32() >= self.rank_count {
            request.fail(TableError::RankOutOfRange {
                rank,
                rank_count: self.rank_count,
            });
        } else {
            self.runtime.spawn(forward(self.pool.clone(), rank, request));
        }
    }
}

async fn forward(pool: RankClientPool, rank: RankId, request: ShardRequest<KmerPair>) {
    let client = match pool.get_client(rank).await {
        Ok(client) => client,
        Err(e) => {
            warn!(%rank, "No connection to rank: {}", e);
            request.fail(TableError::RankUnavailable(rank));
            return;
        }
    };

    let ctx = call_context();
    let lost = match request {
        ShardRequest::Insert { entry, reply } => {
            debug!(%rank, kmer = %entry.kmer, "Forwarding insert");
            let result = client.insert(ctx, entry).await;
            let lost = result.as_ref().is_err_and(connection_lost);
            let _ = reply.send(flatten(rank, result));
            lost
        }
        ShardRequest::Find { key, reply } => {
            debug!(%rank, kmer = %key, "Forwarding find");
            let result = client.find(ctx, key).await;
            let lost = result.as_ref().is_err_and(connection_lost);
            let _ = reply.send(flatten(rank, result));
            lost
        }
        ShardRequest::Stats { reply } => {
            let result = client.stats(ctx).await;
            let lost = result.as_ref().is_err_and(connection_lost);
            let _ = reply.send(flatten(rank, result));
            lost
        }
        // Remote ranks are stopped by their own process.
        ShardRequest::Shutdown => false,
    };

    if lost {
        pool.invalidate_client(rank).await;
    }
}

/// Whether a failed call left the connection itself unusable.
fn connection_lost(err: &tarpc::client::RpcError) -> bool {
    use tarpc::client::RpcError;
    matches!(
        err,
        RpcError::Shutdown | RpcError::Send(_) | RpcError::Receive(_)
    )
}

fn flatten<T>(
    rank: RankId,
    result: Result<RpcResult<T>, tarpc::client::RpcError>,
) -> TableResult<T> {
    match result {
        Ok(reply) => reply.map_err(TableError::from),
        Err(e) => Err(TableError::Rpc(format!("call to {} failed: {}", rank, e))),
    }
}

impl DistTable<KmerPair> {
    /// The table handle of `local.rank()` in a multi-process table.
    ///
    /// `local` is the mailbox of this process's rank actor; every other rank
    /// is reached at its `config.peers` address.
    ///
    /// # Errors
    ///
    /// Returns `InvalidConfig` if the local shard's capacity differs from
    /// `config.local_capacity`, and `Config` errors for bad peer addresses.
    ///
    /// # Example
    ///
    /// ```rust,ignore
    /// let config = TableConfig::load("disthash.toml")?;
    /// let rank = RankId::new(1);
    /// let handle = spawn_rank(Shard::new(rank, config.local_capacity)?);
    /// let table = DistTable::connect(&config, handle.mailbox().clone()).await?;
    /// ```
    pub async fn connect(config: &TableConfig, local: RankMailbox<KmerPair>) -> TableResult<Self> {
        let rank = local.rank();
        let router = PartitionRouter::new(config.rank_count)?;
        let capacity = local.stats().await?.capacity;
        if capacity != config.local_capacity {
            return Err(TableError::InvalidConfig(format!(
                "{} has {} slots but the table is configured for {}",
                rank, capacity, config.local_capacity
            )));
        }
        let transport = RemoteTransport::new(config, local).await?;
        DistTable::new(rank, router, config.local_capacity, Arc::new(transport))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::rank::{spawn_rank, Pending};
    use crate::shard::Shard;

    fn two_rank_config() -> TableConfig {
        TableConfig {
            rank_count: 2,
            local_capacity: 8,
            peers: vec!["127.0.0.1:1".to_string(), "127.0.0.1:1".to_string()],
            ..Default::default()
        }
    }

    #[tokio::test]
    async fn test_local_rank_bypasses_rpc() {
        let handle = spawn_rank(Shard::new(RankId::new(0), 8).unwrap());
        let transport = RemoteTransport::new(&two_rank_config(), handle.mailbox().clone())
            .await
            .unwrap();
        assert!(transport.pool().has_rank(RankId::new(1)).await);
        assert!(!transport.pool().has_rank(RankId::new(0)).await);

        let entry: KmerPair = "ACGT FA".parse().unwrap();
        let (reply, pending) = Pending::channel(RankId::new(0));
        transport.submit(RankId::new(0), ShardRequest::Insert { entry, reply });
        assert_eq!(pending.await, Ok(true));
    }

    #[tokio::test]
    async fn test_out_of_range_rank() {
        let handle = spawn_rank(Shard::new(RankId::new(0), 8).unwrap());
        let transport = RemoteTransport::new(&two_rank_config(), handle.mailbox().clone())
            .await
            .unwrap();
        let (reply, pending) = Pending::channel(RankId::new(5));
        transport.submit(RankId::new(5), ShardRequest::Stats { reply });
        assert!(matches!(
            pending.await,
            Err(TableError::RankOutOfRange { .. })
        ));
    }

    #[tokio::test]
    async fn test_connect_checks_local_capacity() {
        let handle = spawn_rank(Shard::new(RankId::new(0), 16).unwrap());
        assert!(matches!(
            DistTable::connect(&two_rank_config(), handle.mailbox().clone()).await,
            Err(TableError::InvalidConfig(_))
        ));

        let handle = spawn_rank(Shard::new(RankId::new(1), 8).unwrap());
        let table = DistTable::connect(&two_rank_config(), handle.mailbox().clone())
            .await
            .unwrap();
        assert_eq!(table.logical_capacity(), 16);
    }

    #[tokio::test]
    async fn test_missing_peers_rejected() {
        let handle = spawn_rank(Shard::new(RankId::new(0), 8).unwrap());
        let config = TableConfig {
            rank_count: 2,
            ..Default::default()
        };
        assert!(matches!(
            RemoteTransport::new(&config, handle.mailbox().clone()).await,
            Err(TableError::Config(_))
        ));
    }

    #[tokio::test]
    async fn test_unreachable_peer_is_unavailable() {
        let handle = spawn_rank(Shard::new(RankId::new(0), 8).unwrap());
        let mut config = two_rank_config();
        config.rpc.retry_attempts = 1;
        config.rpc.connect_timeout_ms = 200;
        let transport = RemoteTransport::new(&config, handle.mailbox().clone())
            .await
            .unwrap();

        let (reply, pending) = Pending::channel(RankId::new(1));
        transport.submit(
            RankId::new(1),
            ShardRequest::Find {
                key: "ACGT".parse().unwrap(),
                reply,
            },
        );
        assert_eq!(pending.await, Err(TableError::RankUnavailable(RankId::new(1))));
    }

    #[test]
    fn test_only_broken_connections_reconnect() {
        use tarpc::client::RpcError;
        assert!(connection_lost(&RpcError::Shutdown));
        assert!(connection_lost(&RpcError::Receive(std::sync::Arc::new(
            std::io::Error::from(std::io::ErrorKind::ConnectionReset)
        ))));
        assert!(!connection_lost(&RpcError::DeadlineExceeded));
    }

    #[test]
    fn test_flatten() {
        let rank = RankId::new(1);
        assert_eq!(flatten(rank, Ok(Ok(3))), Ok(3));
        assert_eq!(
            flatten::<u8>(rank, Ok(Err(crate::rpc::RpcError::RankUnavailable(1)))),
            Err(TableError::RankUnavailable(rank))
        );
    }
}
