//! In-memory transport implementation.
//!
//! This module provides a pure in-process implementation of the domain-level
//! `Transport` trait. It is intended primarily for testing, local execution,
//! and as a reference for transport semantics.
//!
//! ## Reference Semantics
//!
//! The in-memory transport defines the **reference behavior** for the transport
//! layer. Other transport implementations are expected to approximate this
//! behavior as closely as their underlying systems allow.
//!
//! - `Opened` is the first event of every connection.
//! - Frames are delivered in send order, in both directions.
//! - Either side closing (or the peer being dropped) ends the connection;
//!   the client side then sees exactly one `Closed`.
//! - `send()` after closure fails with a transport error.
//!
//! ## Non-Goals
//!
//! This transport does not attempt to emulate the failure modes or timing of
//! a real network. It exists to provide a deterministic baseline against
//! which the correlator can be validated.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, OnceLock, Weak};

use tokio::sync::mpsc;

use crate::sync::lock_ignore_poison;
#[allow(unused_imports)]
use crate::{
    // ---
    log_debug,
    log_error,
    log_info,
    log_warn,
    Result,
    RpcError,
    SubscriptionHandle,
    Transport,
    TransportBase,
    TransportConfig,
    TransportEvent,
    TransportPtr,
};

/// Per-direction channel capacity.
const CHANNEL_CAPACITY: usize = 64;

/// URI scheme recognised by the memory transport.
pub(crate) const MEMORY_SCHEME: &str = "memory://";

/// Shared registry of named in-memory listeners.
///
/// Plays the role of the network: a [`MemoryListener`] binds a name, and a
/// memory transport whose URI is `memory://<name>` connects to it. Each
/// accepted connection hands the listener a [`MemoryPeer`], the remote end of
/// that connection.
///
/// # Usage in Integration Tests
///
/// For isolation between parallel test cases, construct a hub explicitly and
/// pass it to [`create_memory_transport_with_hub`]:
///
/// ```
/// # use duplex_rpc::{MemoryHub, TransportConfig};
/// # async fn example() -> duplex_rpc::Result<()> {
/// let hub = MemoryHub::new();
/// let mut listener = hub.listen("math")?;
///
/// let config = TransportConfig {
///     uri: "memory://math".into(),
///     node_id: "client".into(),
///     transport_type: None,
/// };
/// let transport = duplex_rpc::create_memory_transport_with_hub(config, hub.clone()).await?;
/// let _peer = listener.accept().await.expect("listener is bound");
/// # Ok(())
/// # }
/// ```
pub struct MemoryHub {
    // ---
    listeners: Mutex<HashMap<String, mpsc::Sender<MemoryPeer>>>,
}

impl MemoryHub {
    /// Create a new, empty hub.
    pub fn new() -> Arc<Self> {
        // ---
        Arc::new(Self {
            listeners: Mutex::new(HashMap::new()),
        })
    }

    /// Process-global hub used by [`create_memory_transport`] and by
    /// `memory://` URIs passed to [`TransportBuilder`](crate::TransportBuilder).
    pub fn global() -> Arc<Self> {
        GLOBAL_HUB.get_or_init(MemoryHub::new).clone()
    }

    /// Bind a listener under `name`.
    ///
    /// # Errors
    ///
    /// Returns [`RpcError::Transport`] if the name is already bound.
    pub fn listen(self: &Arc<Self>, name: impl Into<String>) -> Result<MemoryListener> {
        // ---
        let name = name.into();
        let (tx, rx) = mpsc::channel(CHANNEL_CAPACITY);

        let mut listeners = lock_ignore_poison(&self.listeners);
        if listeners.contains_key(&name) {
            return Err(RpcError::Transport(format!(
                "memory address already in use: {name}"
            )));
        }
        listeners.insert(name.clone(), tx.clone());

        log_debug!("memory hub: listening on {name}");

        Ok(MemoryListener {
            name,
            hub: Arc::downgrade(self),
            registration: tx,
            incoming: rx,
        })
    }

    async fn connect(&self, config: &TransportConfig) -> Result<MemoryTransport> {
        // ---
        let name = config
            .uri
            .strip_prefix(MEMORY_SCHEME)
            .unwrap_or(&config.uri)
            .to_string();

        let listener = lock_ignore_poison(&self.listeners).get(&name).cloned();
        let listener = listener.ok_or_else(|| {
            RpcError::Transport(format!("connection refused: nothing listening on {name}"))
        })?;

        let (event_tx, event_rx) = mpsc::channel(CHANNEL_CAPACITY);
        let (peer_tx, peer_rx) = mpsc::channel(CHANNEL_CAPACITY);

        // Fresh channel, cannot be full.
        let _ = event_tx.try_send(TransportEvent::Opened);

        let link = Arc::new(Link {
            open: AtomicBool::new(true),
            to_client: Mutex::new(Some(event_tx)),
            to_peer: Mutex::new(Some(peer_tx)),
        });

        let peer = MemoryPeer {
            client_id: config.node_id.clone(),
            link: link.clone(),
            from_client: peer_rx,
        };

        if listener.send(peer).await.is_err() {
            lock_ignore_poison(&self.listeners).remove(&name);
            return Err(RpcError::Transport(format!(
                "connection refused: listener {name} is gone"
            )));
        }

        log_debug!("{}: connected to memory://{name}", config.node_id);

        Ok(MemoryTransport {
            base: TransportBase::from(config),
            link,
            inbox: Mutex::new(Some(event_rx)),
        })
    }

    fn unbind(&self, name: &str, registration: &mpsc::Sender<MemoryPeer>) {
        // ---
        let mut listeners = lock_ignore_poison(&self.listeners);
        if listeners
            .get(name)
            .is_some_and(|current| current.same_channel(registration))
        {
            listeners.remove(name);
        }
    }
}

static GLOBAL_HUB: OnceLock<Arc<MemoryHub>> = OnceLock::new();

/// A bound name on a [`MemoryHub`], yielding one [`MemoryPeer`] per
/// incoming connection. Dropping the listener unbinds the name.
pub struct MemoryListener {
    // ---
    name: String,
    hub: Weak<MemoryHub>,
    registration: mpsc::Sender<MemoryPeer>,
    incoming: mpsc::Receiver<MemoryPeer>,
}

impl MemoryListener {
    /// The name this listener is bound to.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Wait for the next incoming connection.
    ///
    /// The listener keeps its name bound until it is dropped, so this waits
    /// for the next client rather than returning `None`.
    pub async fn accept(&mut self) -> Option<MemoryPeer> {
        self.incoming.recv().await
    }
}

impl Drop for MemoryListener {
    fn drop(&mut self) {
        if let Some(hub) = self.hub.upgrade() {
            hub.unbind(&self.name, &self.registration);
        }
    }
}

/// Connection state shared by both ends.
///
/// Closing takes both senders out, so the peer's `recv()` ends and the
/// client inbox ends once the final `Closed` has been queued.
struct Link {
    // ---
    open: AtomicBool,
    to_client: Mutex<Option<mpsc::Sender<TransportEvent>>>,
    to_peer: Mutex<Option<mpsc::Sender<String>>>,
}

impl Link {
    // ---
    fn is_open(&self) -> bool {
        self.open.load(Ordering::SeqCst)
    }

    fn client_sender(&self) -> Option<mpsc::Sender<TransportEvent>> {
        lock_ignore_poison(&self.to_client).clone()
    }

    fn peer_sender(&self) -> Option<mpsc::Sender<String>> {
        lock_ignore_poison(&self.to_peer).clone()
    }

    /// Mark the link closed. Returns the client event sender to the caller
    /// that performed the transition, `None` if it was already closed.
    fn shut(&self) -> Option<mpsc::Sender<TransportEvent>> {
        // ---
        if !self.open.swap(false, Ordering::SeqCst) {
            return None;
        }
        lock_ignore_poison(&self.to_peer).take();
        lock_ignore_poison(&self.to_client).take()
    }

    async fn shut_and_notify(&self) {
        if let Some(tx) = self.shut() {
            let _ = tx.send(TransportEvent::Closed).await;
        }
    }
}

/// The remote end of an in-memory connection.
///
/// Receives the frames the client sends and can push frames (replies)
/// back to it. Dropping the peer closes the connection.
pub struct MemoryPeer {
    // ---
    client_id: String,
    link: Arc<Link>,
    from_client: mpsc::Receiver<String>,
}

impl MemoryPeer {
    // ---

    /// Node ID of the transport on the other end.
    pub fn client_id(&self) -> &str {
        &self.client_id
    }

    /// Whether the connection is still open.
    pub fn is_open(&self) -> bool {
        self.link.is_open()
    }

    /// Receive the next frame sent by the client.
    ///
    /// Frames already in flight are still delivered after closure; `None`
    /// once the connection is closed and drained.
    pub async fn recv(&mut self) -> Option<String> {
        self.from_client.recv().await
    }

    /// Send a text frame to the client.
    ///
    /// # Errors
    ///
    /// Returns [`RpcError::Transport`] if the connection is closed.
    pub async fn send(&self, text: impl Into<String>) -> Result<()> {
        // ---
        let tx = self
            .link
            .client_sender()
            .ok_or_else(|| RpcError::Transport("connection not open".into()))?;

        tx.send(TransportEvent::Message(text.into()))
            .await
            .map_err(|_| RpcError::Transport("client inbox dropped".into()))
    }

    /// Close the connection from the peer side.
    pub async fn close(&self) {
        log_debug!("memory peer for {}: closing", self.client_id);
        self.link.shut_and_notify().await;
    }
}

impl Drop for MemoryPeer {
    fn drop(&mut self) {
        if let Some(tx) = self.link.shut() {
            // If the inbox is full the sender drop below still ends the
            // stream, which the client treats as closure.
            let _ = tx.try_send(TransportEvent::Closed);
        }
    }
}

/// In-memory transport: the client end of a connection accepted by a
/// [`MemoryListener`].
struct MemoryTransport {
    // ---
    base: TransportBase,
    link: Arc<Link>,
    inbox: Mutex<Option<mpsc::Receiver<TransportEvent>>>,
}

#[async_trait::async_trait]
impl Transport for MemoryTransport {
    // ---
    fn base(&self) -> &TransportBase {
        &self.base
    }

    fn is_open(&self) -> bool {
        self.link.is_open()
    }

    async fn send(&self, text: String) -> Result<()> {
        // ---
        let tx = self
            .link
            .peer_sender()
            .ok_or_else(|| RpcError::Transport("connection not open".into()))?;

        tx.send(text)
            .await
            .map_err(|_| RpcError::Transport("peer stopped receiving".into()))
    }

    async fn subscribe(&self) -> Result<SubscriptionHandle> {
        // ---
        let inbox = lock_ignore_poison(&self.inbox).take().ok_or_else(|| {
            RpcError::Transport("inbound stream already subscribed".into())
        })?;

        Ok(SubscriptionHandle { inbox })
    }

    async fn close(&self) -> Result<()> {
        // ---
        log_debug!("{}: closing {}", self.transport_id(), self.base.uri);
        self.link.shut_and_notify().await;
        Ok(())
    }
}

impl Drop for MemoryTransport {
    fn drop(&mut self) {
        self.link.shut();
    }
}

/// Connect a new in-memory transport through the process-global hub.
///
/// For isolated parallel testing, use [`create_memory_transport_with_hub`].
///
/// # Errors
///
/// Returns [`RpcError::Transport`] if nothing is listening on the URI's name.
pub async fn create_memory_transport(config: TransportConfig) -> Result<TransportPtr> {
    // ---
    create_memory_transport_with_hub(config, MemoryHub::global()).await
}

/// Connect a new in-memory transport through the provided hub.
///
/// The listener name is the URI with any `memory://` prefix removed.
///
/// # Errors
///
/// Returns [`RpcError::Transport`] if nothing is listening on that name.
pub async fn create_memory_transport_with_hub(
    config: TransportConfig,
    hub: Arc<MemoryHub>,
) -> Result<TransportPtr> {
    // ---
    let transport = hub.connect(&config).await?;
    Ok(Arc::new(transport))
}
