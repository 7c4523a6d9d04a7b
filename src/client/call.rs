use super::pending::PendingCalls;
use crate::sync::lock_ignore_poison;
use crate::{log_debug, CallId, Result, RpcError};
use serde_json::Value;
use std::future::Future;
use std::pin::Pin;
use std::sync::{Mutex, Weak};
use std::task::{Context, Poll};
use tokio::sync::oneshot;

/// A call that has been sent and is awaiting its reply.
///
/// Resolves exactly once: with the reply body when a message carrying this
/// call's id arrives, or with [`RpcError::ConnectionClosed`] when the
/// connection closes first.
///
/// Dropping an unresolved `PendingCall` cancels it locally: its record is
/// removed and a late reply is discarded. The peer is not told.
#[must_use = "a call is cancelled when its PendingCall is dropped"]
pub struct PendingCall {
    // ---
    id: CallId,
    rx: oneshot::Receiver<Result<Value>>,
    pending: Weak<Mutex<PendingCalls>>,
    finished: bool,
}

impl PendingCall {
    // ---
    pub(super) fn new(
        id: CallId,
        rx: oneshot::Receiver<Result<Value>>,
        pending: Weak<Mutex<PendingCalls>>,
    ) -> Self {
        Self {
            id,
            rx,
            pending,
            finished: false,
        }
    }

    /// The id this call was sent with.
    pub fn id(&self) -> CallId {
        self.id
    }
}

impl Future for PendingCall {
    type Output = Result<Value>;

    fn poll(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        // ---
        let outcome = match Pin::new(&mut self.rx).poll(cx) {
            Poll::Pending => return Poll::Pending,
            Poll::Ready(Ok(outcome)) => outcome,
            // Resolver dropped without an answer: the client is gone.
            Poll::Ready(Err(_)) => Err(RpcError::ConnectionClosed),
        };
        self.finished = true;
        Poll::Ready(outcome)
    }
}

impl Drop for PendingCall {
    fn drop(&mut self) {
        // ---
        if self.finished {
            return;
        }
        if let Some(pending) = self.pending.upgrade() {
            if lock_ignore_poison(&pending).remove(self.id) {
                log_debug!("call {} cancelled before its reply", self.id);
            }
        }
    }
}
