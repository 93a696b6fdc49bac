//! Completion handles for issued requests.

use crate::types::{RankId, TableError, TableResult};
use std::future::Future;
use std::pin::Pin;
use std::task::{Context, Poll};
use tokio::sync::oneshot;

/// Sending half of a request's completion channel.
pub type Reply<T> = oneshot::Sender<TableResult<T>>;

/// Handle to the result of a request executing on some rank.
///
/// Issuing a request never waits; awaiting the handle does. Dropping the
/// handle does not cancel the request, it still executes exactly once on
/// the target rank and its result is discarded.
///
/// If the target rank goes away before replying the handle resolves to
/// `TableError::RankUnavailable`.
#[must_use = "a pending request does nothing useful unless awaited"]
#[derive(Debug)]
pub struct Pending<T> {
    rank: RankId,
    rx: oneshot::Receiver<TableResult<T>>,
}

impl<T> Pending<T> {
    /// Create a handle for a request to `rank` and the reply half that completes it.
    pub fn channel(rank: RankId) -> (Reply<T>, Self) {
        let (tx, rx) = oneshot::channel();
        (tx, Self { rank, rx })
    }

    /// A handle that is already complete.
    pub fn ready(rank: RankId, result: TableResult<T>) -> Self {
        let (tx, pending) = Self::channel(rank);
        let _ = tx.send(result);
        pending
    }

    /// Rank the request was sent to.
    pub fn rank(&self) -> RankId {
        self.rank
    }
}

impl<T> Future for Pending<T> {
    type Output = TableResult<T>;

    fn poll(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        let this = self.get_mut();
        match Pin::new(&mut this.rx).poll(cx) {
            Poll::Ready(Ok(result)) => Poll::Ready(result),
            Poll::Ready(Err(_)) => Poll::Ready(Err(TableError::RankUnavailable(this.rank))),
            Poll::Pending => Poll::Pending,
        }
    }
}
