//! Remote invocation between ranks using tarpc.
//!
//! Every rank process runs a [`ShardServer`] in front of its rank actor.
//! Other ranks reach it through a [`RemoteTransport`], which plugs into
//! [`DistTable`](crate::DistTable) the same way the in-process transport
//! does, so callers see the same `insert`/`find` handles either way.
//!
//! # Architecture
//!
//! - **Protocol**: the `ShardService` trait and its serializable error
//! - **Server**: forwards each call to the rank's mailbox
//! - **Client**: connection helpers and a lazy per-rank connection pool
//! - **Transport**: local rank through the mailbox, peers through the pool
//!
//! # Example: Running one rank
//!
//! ```rust,ignore
//! use disthash::rpc::ShardServer;
//!
//! let config = TableConfig::load("disthash.toml")?;
//! let rank = RankId::new(0);
//! let handle = spawn_rank(Shard::<KmerPair>::new(rank, config.local_capacity)?);
//!
//! let server = ShardServer::new(handle.mailbox().clone());
//! tokio::spawn(server.start(config.peer_addr(rank)?));
//!
//! let table = DistTable::connect(&config, handle.mailbox().clone()).await?;
//! let stored = table.insert("ACGTACGTACGTACGTACG FA".parse()?).await?;
//! ```

pub mod client;
pub mod protocol;
pub mod server;
pub mod transport;

pub use client::{
    call_context, connect_to_rank_with_config, connect_to_rank_with_retry, ClientConfig,
    RankClientPool, CALL_DEADLINE,
};
pub use protocol::{RpcError, RpcResult, ShardService, ShardServiceClient};
pub use server::ShardServer;
pub use transport::RemoteTransport;
