use crate::protocol::Reply;
use crate::{log_debug, CallId, Result, RpcError};
use serde_json::Value;
use std::collections::HashMap;
use std::time::Instant;
use tokio::sync::oneshot;

/// Sender half delivering the outcome of one call.
pub(super) type Resolver = oneshot::Sender<Result<Value>>;

struct PendingRecord {
    // ---
    function: String,
    created_at: Instant,
    resolver: Resolver,
}

/// Correlator state for one connection.
///
/// Holds the id counter and the calls awaiting a reply. Both live behind a
/// single mutex in [`RpcClient`](super::RpcClient) so that allocating an id
/// and registering its record happen as one step.
pub(super) struct PendingCalls {
    // ---
    next_id: CallId,
    calls: HashMap<CallId, PendingRecord>,
    closed: bool,
}

impl PendingCalls {
    // ---

    /// Create an empty tracker for a fresh connection.
    pub fn new() -> Self {
        // ---
        Self {
            next_id: CallId::FIRST,
            calls: HashMap::new(),
            closed: false,
        }
    }

    /// Allocate the next call id.
    ///
    /// Fails once the connection has been seen closing; nothing could ever
    /// resolve a call registered after that.
    pub fn allocate(&mut self) -> Result<CallId> {
        // ---
        if self.closed {
            return Err(RpcError::Transport("connection closed".into()));
        }
        Ok(self.next_id.take_next())
    }

    /// Register a pending call under an id obtained from [`allocate`](Self::allocate).
    ///
    /// Returns a receiver that will be notified when the call resolves or is
    /// rejected.
    pub fn register(&mut self, id: CallId, function: &str) -> oneshot::Receiver<Result<Value>> {
        // ---
        let (tx, rx) = oneshot::channel();
        self.calls.insert(
            id,
            PendingRecord {
                function: function.to_string(),
                created_at: Instant::now(),
                resolver: tx,
            },
        );
        rx
    }

    /// Resolve the call matching `reply.id` with the reply body.
    ///
    /// Returns false if no call with that id is pending (unsolicited,
    /// duplicate, cancelled or already resolved).
    pub fn complete(&mut self, reply: Reply) -> bool {
        // ---
        let Some(record) = self.calls.remove(&reply.id) else {
            return false;
        };

        log_debug!(
            "call {} ({}) resolved after {:?}",
            reply.id,
            record.function,
            record.created_at.elapsed()
        );

        // Receiver may already be gone if the caller gave up.
        let _ = record.resolver.send(Ok(reply.body));
        true
    }

    /// Remove a pending call without resolving it.
    ///
    /// Used when the caller cancels or the send fails.
    pub fn remove(&mut self, id: CallId) -> bool {
        self.calls.remove(&id).is_some()
    }

    /// Mark the connection closed and reject every pending call with
    /// [`RpcError::ConnectionClosed`]. Returns how many were rejected.
    pub fn close(&mut self) -> usize {
        // ---
        self.closed = true;

        let count = self.calls.len();
        for (_, record) in self.calls.drain() {
            let _ = record.resolver.send(Err(RpcError::ConnectionClosed));
        }
        count
    }

    pub fn is_closed(&self) -> bool {
        self.closed
    }

    /// Get the number of pending calls
    pub fn len(&self) -> usize {
        self.calls.len()
    }
}

#[cfg(test)]
mod tests {
    // ---
    use super::*;
    use serde_json::json;

    fn reply(id: u64, result: i64) -> Reply {
        Reply {
            id: CallId::from(id),
            body: json!({"id": id, "result": result}),
        }
    }

    #[test]
    fn test_allocate_is_sequential() {
        // ---
        let mut pending = PendingCalls::new();
        let ids: Vec<u64> = (0..4).map(|_| pending.allocate().unwrap().get()).collect();
        assert_eq!(ids, vec![0, 1, 2, 3]);
    }

    #[test]
    fn test_register_and_complete() {
        // ---
        let mut pending = PendingCalls::new();
        let id = pending.allocate().unwrap();

        let rx = pending.register(id, "add");
        assert_eq!(pending.len(), 1);

        assert!(pending.complete(reply(0, 5)));

        // Should be removed after completion
        assert_eq!(pending.len(), 0);

        let received = rx.blocking_recv().unwrap().unwrap();
        assert_eq!(received, json!({"id": 0, "result": 5}));
    }

    #[test]
    fn test_duplicate_reply_is_ignored() {
        // ---
        let mut pending = PendingCalls::new();
        let id = pending.allocate().unwrap();
        let _rx = pending.register(id, "add");

        assert!(pending.complete(reply(0, 5)));
        assert!(!pending.complete(reply(0, 6)));
    }

    #[test]
    fn test_complete_unknown_id() {
        // ---
        let mut pending = PendingCalls::new();
        assert!(!pending.complete(reply(41, 0)));
    }

    #[test]
    fn test_remove() {
        // ---
        let mut pending = PendingCalls::new();
        let id = pending.allocate().unwrap();

        let _rx = pending.register(id, "f");
        assert!(pending.remove(id));
        assert_eq!(pending.len(), 0);

        // Second remove should return false
        assert!(!pending.remove(id));
    }

    #[test]
    fn test_close_rejects_all_and_blocks_allocation() {
        // ---
        let mut pending = PendingCalls::new();
        let a = pending.allocate().unwrap();
        let b = pending.allocate().unwrap();
        let rx_a = pending.register(a, "f");
        let rx_b = pending.register(b, "g");

        assert_eq!(pending.close(), 2);
        assert_eq!(pending.len(), 0);
        assert!(pending.is_closed());

        assert!(matches!(
            rx_a.blocking_recv().unwrap(),
            Err(RpcError::ConnectionClosed)
        ));
        assert!(matches!(
            rx_b.blocking_recv().unwrap(),
            Err(RpcError::ConnectionClosed)
        ));

        assert!(matches!(pending.allocate(), Err(RpcError::Transport(_))));
    }
}
