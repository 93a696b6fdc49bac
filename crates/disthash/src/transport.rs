//! Delivery of shard requests to their target rank.
//!
//! A [`Transport`] only has to get a request to the actor of the target
//! rank; execution, ordering and replies are handled by the actor. The
//! in-process [`LocalTransport`] posts straight into the rank mailboxes;
//! `rpc::RemoteTransport` carries requests to other processes over tarpc.

use crate::key::TableEntry;
use crate::rank::{RankMailbox, ShardRequest};
use crate::types::{RankId, TableError};

/// Delivers requests to ranks.
///
/// `submit` must not block: it either queues the request or hands it to a
/// background task. A request that cannot be delivered must be completed
/// through [`ShardRequest::fail`] (or by dropping its reply) so that the
/// caller's handle resolves.
pub trait Transport<E: TableEntry>: Send + Sync {
    /// Number of ranks reachable through this transport.
    fn rank_count(&self) -> u32;

    /// Deliver `request` to `rank`.
    fn submit(&self, rank: RankId, request: ShardRequest<E>);
}

/// Transport over the mailboxes of rank actors living in this process.
pub struct LocalTransport<E: TableEntry> {
    mailboxes: Vec<RankMailbox<E>>,
}

impl<E: TableEntry> LocalTransport<E> {
    /// `mailboxes[i]` must belong to rank `i`.
    pub fn new(mailboxes: Vec<RankMailbox<E>>) -> Self {
        debug_assert!(mailboxes
            .iter()
            .enumerate()
            .all(|(i, m)| m.rank().index() == i));
        Self { mailboxes }
    }

    pub fn mailbox(&self, rank: RankId) -> Option<&RankMailbox<E>> {
        self.mailboxes.get(rank.index())
    }
}

impl<E: TableEntry> Transport<E> for LocalTransport<E> {
    fn rank_count(&self) -> u32 {
        self.mailboxes.len() as u32
    }

    fn submit(&self, rank: RankId, request: ShardRequest<E>) {
        match self.mailboxes.get(rank.index()) {
            Some(mailbox) => mailbox.submit(request),
            None => request.fail(TableError::RankOutOfRange {
                rank,
                rank_count: self.rank_count(),
            }),
        }
    }
}
