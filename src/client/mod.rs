/// RPC client: issues named calls and correlates replies by id
mod call;
mod pending;

pub use call::PendingCall;

use crate::protocol::{positional_args, CallEnvelope, Reply};
use crate::sync::lock_ignore_poison;
use crate::{
    // ---
    log_debug,
    log_error,
    log_warn,
    Result,
    RpcError,
    SubscriptionHandle,
    TransportEvent,
    TransportPtr,
};
use pending::PendingCalls;
use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::Value;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::task::JoinHandle;

/// Correlator state shared by the call path and the inbound task.
type SharedPending = Arc<Mutex<PendingCalls>>;

/// RPC client for one duplex connection.
///
/// Every call gets the next id from a per-connection counter, is registered
/// as pending, and is sent as a call envelope. A single background task,
/// started when the client is built, reads every inbound message, extracts
/// its `id`, and resolves the one pending call with that id. Messages that
/// do not parse or match nothing are dropped.
///
/// Multiple calls can be in flight concurrently and replies may arrive in
/// any order. `RpcClient` is cheap to clone; clones share the connection and
/// the pending set.
///
/// # Example
///
/// ```no_run
/// use duplex_rpc::{RpcClientBuilder, TransportBuilder};
///
/// # async fn example() -> duplex_rpc::Result<()> {
/// let transport = TransportBuilder::new()
///     .uri("ws://localhost:8080/ws")
///     .node_id("calc-client")
///     .build()
///     .await?;
///
/// let client = RpcClientBuilder::new(transport).build().await?;
///
/// // {"type":"rpc-call","function":"add","args":[2,3],"id":0}
/// let reply = client.call("add", (2, 3)).await?;
/// println!("{reply}");
/// # Ok(())
/// # }
/// ```
#[derive(Clone)]
pub struct RpcClient {
    inner: Arc<Inner>,
}

struct Inner {
    transport: TransportPtr,
    node_id: String,
    pending: SharedPending,
    rx_task: JoinHandle<()>,
}

impl Drop for Inner {
    fn drop(&mut self) {
        // Dropping the task's resolvers rejects whatever is still pending.
        self.rx_task.abort();
    }
}

impl RpcClient {
    /// Create a client on `transport` (internal use by RpcClientBuilder).
    ///
    /// Takes the transport's inbound stream and spawns the inbound task.
    pub(crate) async fn start(transport: TransportPtr, node_id: String) -> Result<Self> {
        // ---
        let handle = transport.subscribe().await?;
        let pending: SharedPending = Arc::new(Mutex::new(PendingCalls::new()));

        let rx_task = tokio::spawn(run_inbound(node_id.clone(), handle, pending.clone()));

        Ok(Self {
            inner: Arc::new(Inner {
                transport,
                node_id,
                pending,
                rx_task,
            }),
        })
    }

    /// Send a call and return the future for its reply.
    ///
    /// The call is registered before it is sent, so a reply that arrives
    /// immediately still finds it. Awaiting the returned [`PendingCall`]
    /// yields the whole reply message.
    ///
    /// `args` are positional: a tuple, `Vec` or slice becomes the `args`
    /// array as-is, `()` means no arguments, and any other value is sent as
    /// the single argument.
    ///
    /// # Errors
    ///
    /// Fails immediately, with no call left pending, if:
    /// - `function` is empty ([`RpcError::InvalidArgument`])
    /// - the arguments cannot be serialized ([`RpcError::Encoding`])
    /// - the connection is closed or the send fails ([`RpcError::Transport`])
    pub async fn start_call<A>(&self, function: &str, args: A) -> Result<PendingCall>
    where
        A: Serialize,
    {
        // ---
        if function.is_empty() {
            return Err(RpcError::InvalidArgument(
                "function name must not be empty".into(),
            ));
        }

        let args = positional_args(&args)?;

        let (id, text, rx) = {
            let mut pending = lock_ignore_poison(&self.inner.pending);
            let id = pending.allocate()?;
            let text = CallEnvelope::new(id, function, args).to_text()?;
            let rx = pending.register(id, function);
            (id, text, rx)
        };

        // Dropping `call` on a failed send removes the record again.
        let call = PendingCall::new(id, rx, Arc::downgrade(&self.inner.pending));

        if let Err(err) = self.inner.transport.send(text).await {
            log_error!("{}: failed to send call {id} ({function}): {err}", self.inner.node_id);
            return Err(err);
        }

        log_debug!("{}: sent call {id} ({function})", self.inner.node_id);
        Ok(call)
    }

    /// Call `function` and wait for its reply.
    ///
    /// Waits as long as it takes; there is no built-in deadline. See
    /// [`call_with_timeout`](Self::call_with_timeout).
    ///
    /// # Errors
    ///
    /// Everything [`start_call`](Self::start_call) returns, plus
    /// [`RpcError::ConnectionClosed`] if the connection closes first.
    pub async fn call<A>(&self, function: &str, args: A) -> Result<Value>
    where
        A: Serialize,
    {
        self.start_call(function, args).await?.await
    }

    /// Call `function` and decode the whole reply message into `T`.
    ///
    /// # Errors
    ///
    /// As [`call`](Self::call), plus [`RpcError::Encoding`] if the reply
    /// does not match `T`.
    pub async fn call_as<A, T>(&self, function: &str, args: A) -> Result<T>
    where
        A: Serialize,
        T: DeserializeOwned,
    {
        // ---
        let reply = self.call(function, args).await?;
        Ok(serde_json::from_value(reply)?)
    }

    /// Call `function`, giving up after `timeout`.
    ///
    /// On expiry the call is cancelled locally and a late reply is dropped.
    ///
    /// # Errors
    ///
    /// As [`call`](Self::call), plus [`RpcError::Timeout`].
    pub async fn call_with_timeout<A>(
        &self,
        function: &str,
        args: A,
        timeout: Duration,
    ) -> Result<Value>
    where
        A: Serialize,
    {
        // ---
        let call = self.start_call(function, args).await?;
        let id = call.id();

        match tokio::time::timeout(timeout, call).await {
            Ok(outcome) => outcome,
            Err(_) => {
                log_warn!("{}: call {id} ({function}) timed out", self.inner.node_id);
                Err(RpcError::Timeout)
            }
        }
    }

    /// Number of calls currently awaiting a reply.
    pub fn pending_count(&self) -> usize {
        lock_ignore_poison(&self.inner.pending).len()
    }

    /// Whether the client has seen the connection close.
    pub fn is_closed(&self) -> bool {
        lock_ignore_poison(&self.inner.pending).is_closed()
    }

    /// The node ID used in log output.
    pub fn node_id(&self) -> &str {
        &self.inner.node_id
    }

    /// The underlying transport.
    pub fn transport(&self) -> TransportPtr {
        self.inner.transport.clone()
    }

    /// Close the connection.
    ///
    /// Every pending call is rejected with [`RpcError::ConnectionClosed`]
    /// before this returns, and later calls fail with
    /// [`RpcError::Transport`]. A reply already received but not yet
    /// dispatched is rejected too rather than delivered.
    pub async fn close(&self) -> Result<()> {
        // ---
        let res = self.inner.transport.close().await;
        reject_pending(&self.inner.node_id, &self.inner.pending);
        res
    }
}

/// Inbound task: the single persistent handler for the connection.
async fn run_inbound(node_id: String, mut handle: SubscriptionHandle, pending: SharedPending) {
    // ---
    log_debug!("{node_id}: inbound task started");

    while let Some(event) = handle.inbox.recv().await {
        match event {
            TransportEvent::Opened => log_debug!("{node_id}: connection opened"),
            TransportEvent::Message(text) => {
                dispatch_inbound(&node_id, &pending, &text);
            }
            TransportEvent::Closed => break,
        }
    }

    reject_pending(&node_id, &pending);
    log_debug!("{node_id}: inbound task stopped");
}

/// Resolve the pending call a message answers. Returns whether one was
/// resolved; anything else is dropped without touching other calls.
fn dispatch_inbound(node_id: &str, pending: &Mutex<PendingCalls>, text: &str) -> bool {
    // ---
    let reply = match Reply::parse(text) {
        Ok(reply) => reply,
        Err(reason) => {
            log_debug!("{node_id}: dropping {reason}");
            return false;
        }
    };

    let id = reply.id;
    let delivered = lock_ignore_poison(pending).complete(reply);
    if !delivered {
        log_debug!("{node_id}: no pending call for id {id}");
    }
    delivered
}

fn reject_pending(node_id: &str, pending: &Mutex<PendingCalls>) {
    // ---
    let rejected = lock_ignore_poison(pending).close();
    if rejected > 0 {
        log_warn!("{node_id}: connection closed with {rejected} call(s) pending");
    }
}

#[cfg(test)]
mod tests {
    // ---
    use super::*;
    use crate::{create_memory_transport_with_hub, MemoryHub, MemoryPeer, TransportConfig};
    use serde_json::json;
    use tokio::time::{timeout, Duration};

    async fn connect() -> (RpcClient, MemoryPeer) {
        // ---
        let hub = MemoryHub::new();
        let mut listener = hub.listen("svc").unwrap();
        let config = TransportConfig {
            uri: "memory://svc".into(),
            node_id: "unit-client".into(),
            transport_type: None,
        };
        let transport = create_memory_transport_with_hub(config, hub.clone())
            .await
            .unwrap();
        let peer = listener.accept().await.unwrap();
        let client = RpcClient::start(transport, "unit-client".into()).await.unwrap();
        (client, peer)
    }

    #[test]
    fn test_dispatch_ignores_garbage() {
        // ---
        let pending = Mutex::new(PendingCalls::new());
        let id = lock_ignore_poison(&pending).allocate().unwrap();
        let _rx = lock_ignore_poison(&pending).register(id, "f");

        assert!(!dispatch_inbound("n", &pending, "}{"));
        assert!(!dispatch_inbound("n", &pending, r#"{"result":1}"#));
        assert!(!dispatch_inbound("n", &pending, r#"{"id":99}"#));
        assert_eq!(lock_ignore_poison(&pending).len(), 1);

        assert!(dispatch_inbound("n", &pending, r#"{"id":0}"#));
        assert_eq!(lock_ignore_poison(&pending).len(), 0);
    }

    #[tokio::test]
    async fn test_empty_function_name_rejected() {
        // ---
        let (client, _peer) = connect().await;
        let res = client.start_call("", ()).await;
        assert!(matches!(res, Err(RpcError::InvalidArgument(_))));
        assert_eq!(client.pending_count(), 0);
    }

    #[tokio::test]
    async fn test_unserializable_args_rejected() {
        // ---
        use std::collections::HashMap;

        let (client, _peer) = connect().await;

        // JSON object keys must be strings.
        let mut bad = HashMap::new();
        bad.insert((1, 2), "x");

        let res = client.start_call("f", bad).await;
        assert!(matches!(res, Err(RpcError::Encoding(_))));
        assert_eq!(client.pending_count(), 0);
    }

    #[tokio::test]
    async fn test_cancel_on_drop_then_late_reply_dropped() {
        // ---
        let (client, mut peer) = connect().await;

        let call = client.start_call("slow", ()).await.unwrap();
        assert_eq!(client.pending_count(), 1);
        drop(call);
        assert_eq!(client.pending_count(), 0);

        let _ = peer.recv().await.unwrap();
        peer.send(r#"{"id":0,"result":"late"}"#).await.unwrap();

        // Next call still works and gets id 1.
        let next = client.start_call("fast", ()).await.unwrap();
        assert_eq!(next.id().get(), 1);
        let _ = peer.recv().await.unwrap();
        peer.send(r#"{"id":1,"result":"ok"}"#).await.unwrap();

        let reply = timeout(Duration::from_millis(200), next)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(reply, json!({"id": 1, "result": "ok"}));
    }

    #[tokio::test]
    async fn test_call_with_timeout_cancels() {
        // ---
        let (client, _peer) = connect().await;

        let res = client
            .call_with_timeout("never", (), Duration::from_millis(20))
            .await;

        assert!(matches!(res, Err(RpcError::Timeout)));
        assert_eq!(client.pending_count(), 0);
    }

    #[tokio::test]
    async fn test_close_rejects_and_fails_fast_afterwards() {
        // ---
        let (client, _peer) = connect().await;

        let call = client.start_call("f", ()).await.unwrap();
        client.close().await.unwrap();

        assert!(matches!(call.await, Err(RpcError::ConnectionClosed)));
        assert!(client.is_closed());
        assert!(matches!(
            client.start_call("g", ()).await,
            Err(RpcError::Transport(_))
        ));
        assert_eq!(client.pending_count(), 0);
    }

    #[tokio::test]
    async fn test_dropping_client_rejects_pending_call() {
        // ---
        let (client, _peer) = connect().await;
        let other = client.clone();

        let call = client.start_call("f", ()).await.unwrap();
        drop(client);
        drop(other);

        let res = timeout(Duration::from_millis(200), call)
            .await
            .expect("call left pending after the client was dropped");
        assert!(matches!(res, Err(RpcError::ConnectionClosed)));
    }
}
