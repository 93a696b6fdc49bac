//! tarpc server implementation.
//!
//! A `ShardServer` exposes one rank over TCP. It holds no table state of
//! its own: every call is posted to the rank's mailbox and answered when
//! the actor replies, so remote requests queue behind local ones and the
//! shard still sees a single request at a time.

use crate::kmer::{Kmer, KmerPair};
use crate::rank::RankMailbox;
use crate::rpc::protocol::{RpcResult, ShardService};
use crate::types::{RankId, ShardStats};
use futures::future::BoxFuture;
use futures::{Future, FutureExt, StreamExt};
use std::net::SocketAddr;
use tarpc::context::Context;
use tarpc::server::{self, Channel};
use tokio_serde::formats::Bincode;
use tracing::{debug, info, instrument};

/// Maximum number of client connections served concurrently.
const MAX_CONCURRENT_CONNECTIONS: usize = 64;

/// Server implementation for one rank.
///
/// # Example
///
/// ```rust,ignore
/// use disthash::rank::spawn_rank;
/// use disthash::rpc::server::ShardServer;
/// use disthash::shard::Shard;
///
/// let handle = spawn_rank(Shard::<KmerPair>::new(RankId::new(0), 1 << 20)?);
/// let server = ShardServer::new(handle.mailbox().clone());
/// server.start("0.0.0.0:7400".parse().unwrap()).await?;
/// ```
#[derive(Clone)]
pub struct ShardServer {
    mailbox: RankMailbox<KmerPair>,
}

async fn spawn(fut: impl Future<Output = ()> + Send + 'static) {
    tokio::spawn(fut);
}

impl ShardServer {
    /// Create a server forwarding to `mailbox`.
    pub fn new(mailbox: RankMailbox<KmerPair>) -> Self {
        Self { mailbox }
    }

    pub fn rank(&self) -> RankId {
        self.mailbox.rank()
    }

    /// Bind to `addr` and return the bound address with the accept loop.
    ///
    /// Binding to port 0 picks a free port; the returned address has the
    /// real one. The accept loop runs until the listener fails.
    ///
    /// # Errors
    ///
    /// Returns an error if the server fails to bind to the address.
    pub async fn bind(self, addr: SocketAddr) -> std::io::Result<(SocketAddr, BoxFuture<'static, ()>)> {
        let listener = tarpc::serde_transport::tcp::listen(&addr, Bincode::default).await?;
        let local_addr = listener.local_addr();
        info!(rank = %self.rank(), "Shard server listening on {}", local_addr);

        let serve = listener
            .filter_map(|r| futures::future::ready(r.ok()))
            .map(server::BaseChannel::with_defaults)
            .for_each_concurrent(MAX_CONCURRENT_CONNECTIONS, move |channel| {
                let server = self.clone();
                async move {
                    channel.execute(server.serve()).for_each(spawn).await;
                }
            })
            .boxed();

        Ok((local_addr, serve))
    }

    /// Start serving on the given address.
    ///
    /// # Errors
    ///
    /// Returns an error if the server fails to bind to the address.
    pub async fn start(self, addr: SocketAddr) -> std::io::Result<()> {
        let (_, serve) = self.bind(addr).await?;
        serve.await;
        Ok(())
    }
}

impl ShardService for ShardServer {
    #[instrument(skip(self, _ctx, entry), fields(kmer = %entry.kmer))]
    async fn insert(self, _ctx: Context, entry: KmerPair) -> RpcResult<bool> {
        let stored = self.mailbox.insert(entry).await?;
        debug!("Insert stored: {}", stored);
        Ok(stored)
    }

    #[instrument(skip(self, _ctx, kmer), fields(kmer = %kmer))]
    async fn find(self, _ctx: Context, kmer: Kmer) -> RpcResult<Option<KmerPair>> {
        let found = self.mailbox.find(kmer).await?;
        debug!("Find hit: {}", found.is_some());
        Ok(found)
    }

    #[instrument(skip(self, _ctx))]
    async fn stats(self, _ctx: Context) -> RpcResult<ShardStats> {
        Ok(self.mailbox.stats().await?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::rank::{spawn_rank, RankHandle};
    use crate::rpc::protocol::RpcError;
    use crate::shard::Shard;

    fn create_test_rank(capacity: usize) -> RankHandle<KmerPair> {
        spawn_rank(Shard::new(RankId::new(0), capacity).unwrap())
    }

    fn pair(s: &str) -> KmerPair {
        s.parse().unwrap()
    }

    #[tokio::test]
    async fn test_server_insert_and_find() {
        let handle = create_test_rank(16);
        let server = ShardServer::new(handle.mailbox().clone());

        let entry = pair("ACGTACG FT");
        let ctx = tarpc::context::current();
        assert_eq!(server.clone().insert(ctx, entry).await, Ok(true));

        let ctx = tarpc::context::current();
        let found = server.clone().find(ctx, entry.kmer).await.unwrap();
        assert_eq!(found, Some(entry));

        let ctx = tarpc::context::current();
        let missing = server.find(ctx, "TTTTTTT".parse().unwrap()).await.unwrap();
        assert_eq!(missing, None);
    }

    #[tokio::test]
    async fn test_server_full_shard() {
        let handle = create_test_rank(1);
        let server = ShardServer::new(handle.mailbox().clone());

        let ctx = tarpc::context::current();
        assert_eq!(server.clone().insert(ctx, pair("AAAA FC")).await, Ok(true));
        let ctx = tarpc::context::current();
        assert_eq!(server.clone().insert(ctx, pair("CCCC AF")).await, Ok(false));

        let ctx = tarpc::context::current();
        let stats = server.stats(ctx).await.unwrap();
        assert_eq!(stats.occupied, 1);
        assert_eq!(stats.rejected, 1);
    }

    #[tokio::test]
    async fn test_server_after_rank_stopped() {
        let handle = create_test_rank(4);
        let server = ShardServer::new(handle.mailbox().clone());
        handle.shutdown().await.unwrap();

        let ctx = tarpc::context::current();
        assert_eq!(
            server.insert(ctx, pair("ACGT GG")).await,
            Err(RpcError::RankUnavailable(0))
        );
    }

    #[tokio::test]
    async fn test_bind_ephemeral_port() {
        let handle = create_test_rank(4);
        let server = ShardServer::new(handle.mailbox().clone());
        let (addr, serve) = server.bind("127.0.0.1:0".parse().unwrap()).await.unwrap();
        assert_ne!(addr.port(), 0);
        drop(serve);
    }
}
