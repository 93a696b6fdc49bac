//! Rank actors: the execution context that owns a shard.
//!
//! Each rank runs as a tokio task that owns its [`Shard`] by value and
//! drains an unbounded mailbox one request at a time. Requests on the same
//! rank therefore never interleave, and the shard needs no lock. Other
//! ranks (and the RPC server for remote callers) only ever reach the shard
//! by posting a [`ShardRequest`] to its [`RankMailbox`].
//!
//! Every request carries a one-shot reply channel, so each request is
//! executed exactly once and answered exactly once.

mod pending;

pub use pending::{Pending, Reply};

use crate::key::TableEntry;
use crate::shard::Shard;
use crate::types::{RankId, ShardStats, TableError, TableResult};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

/// A request executed against one rank's shard.
#[derive(Debug)]
pub enum ShardRequest<E: TableEntry> {
    Insert { entry: E, reply: Reply<bool> },
    Find { key: E::Key, reply: Reply<Option<E>> },
    Stats { reply: Reply<ShardStats> },
    /// Stop the actor once every request queued before this one has run.
    Shutdown,
}

impl<E: TableEntry> ShardRequest<E> {
    /// Complete the request with `err` without executing it.
    pub fn fail(self, err: TableError) {
        match self {
            ShardRequest::Insert { reply, .. } => {
                let _ = reply.send(Err(err));
            }
            ShardRequest::Find { reply, .. } => {
                let _ = reply.send(Err(err));
            }
            ShardRequest::Stats { reply } => {
                let _ = reply.send(Err(err));
            }
            ShardRequest::Shutdown => {}
        }
    }

    fn kind(&self) -> &'static str {
        match self {
            ShardRequest::Insert { .. } => "insert",
            ShardRequest::Find { .. } => "find",
            ShardRequest::Stats { .. } => "stats",
            ShardRequest::Shutdown => "shutdown",
        }
    }
}

/// Sending side of a rank's mailbox.
///
/// Cheap to clone. All methods return immediately; results arrive through
/// the returned [`Pending`] handles.
#[derive(Debug)]
pub struct RankMailbox<E: TableEntry> {
    rank: RankId,
    tx: mpsc::UnboundedSender<ShardRequest<E>>,
}

impl<E: TableEntry> Clone for RankMailbox<E> {
    fn clone(&self) -> Self {
        Self {
            rank: self.rank,
            tx: self.tx.clone(),
        }
    }
}

impl<E: TableEntry> RankMailbox<E> {
    pub fn rank(&self) -> RankId {
        self.rank
    }

    /// Queue a request. If the actor has stopped, the request's reply is
    /// dropped and its handle resolves to `RankUnavailable`.
    pub fn submit(&self, request: ShardRequest<E>) {
        if let Err(mpsc::error::SendError(request)) = self.tx.send(request) {
            warn!(rank = %self.rank, kind = request.kind(), "Rank is gone, dropping request");
        }
    }

    pub fn insert(&self, entry: E) -> Pending<bool> {
        let (reply, pending) = Pending::channel(self.rank);
        self.submit(ShardRequest::Insert { entry, reply });
        pending
    }

    pub fn find(&self, key: E::Key) -> Pending<Option<E>> {
        let (reply, pending) = Pending::channel(self.rank);
        self.submit(ShardRequest::Find { key, reply });
        pending
    }

    pub fn stats(&self) -> Pending<ShardStats> {
        let (reply, pending) = Pending::channel(self.rank);
        self.submit(ShardRequest::Stats { reply });
        pending
    }

    /// Ask the actor to stop after draining what is already queued.
    pub fn shutdown(&self) {
        self.submit(ShardRequest::Shutdown);
    }

    /// Whether the actor has stopped receiving.
    pub fn is_closed(&self) -> bool {
        self.tx.is_closed()
    }
}

/// A running rank actor.
pub struct RankHandle<E: TableEntry> {
    mailbox: RankMailbox<E>,
    task: JoinHandle<Shard<E>>,
}

impl<E: TableEntry> RankHandle<E> {
    pub fn mailbox(&self) -> &RankMailbox<E> {
        &self.mailbox
    }

    pub fn rank(&self) -> RankId {
        self.mailbox.rank
    }

    /// Stop the actor and take back its shard.
    ///
    /// Requests queued before the call still execute; later ones resolve
    /// to `RankUnavailable`.
    pub async fn shutdown(self) -> TableResult<Shard<E>> {
        let rank = self.rank();
        self.mailbox.shutdown();
        self.task
            .await
            .map_err(|_| TableError::RankUnavailable(rank))
    }
}

/// Spawn the actor that owns `shard` on the current tokio runtime.
pub fn spawn_rank<E: TableEntry>(shard: Shard<E>) -> RankHandle<E> {
    let rank = shard.rank();
    let (tx, mut rx) = mpsc::unbounded_channel::<ShardRequest<E>>();

    let task = tokio::spawn(async move {
        let mut shard = shard;
        info!(rank = %rank, capacity = shard.capacity(), "Rank started");

        while let Some(request) = rx.recv().await {
            if let ShardRequest::Shutdown = request {
                break;
            }
            execute(&mut shard, request);
        }

        info!(rank = %rank, occupied = shard.len(), "Rank stopped");
        shard
    });

    RankHandle {
        mailbox: RankMailbox { rank, tx },
        task,
    }
}

fn execute<E: TableEntry>(shard: &mut Shard<E>, request: ShardRequest<E>) {
    match request {
        ShardRequest::Insert { entry, reply } => {
            let stored = shard.insert(entry);
            if !stored {
                warn!(rank = %shard.rank(), capacity = shard.capacity(), "Shard full, insert rejected");
            }
            let _ = reply.send(Ok(stored));
        }
        ShardRequest::Find { key, reply } => {
            let found = shard.find(&key).cloned();
            debug!(rank = %shard.rank(), ?key, found = found.is_some(), "Find");
            let _ = reply.send(Ok(found));
        }
        ShardRequest::Stats { reply } => {
            let _ = reply.send(Ok(shard.stats()));
        }
        ShardRequest::Shutdown => {}
    }
}
