// src/domain/transport.rs

//! Transport domain abstractions.
//!
//! This module defines the connection interface consumed by the call
//! correlator. It intentionally avoids any reference to concrete protocols
//! or client libraries.
//!
//! A transport is a single full-duplex, message-oriented connection: text
//! frames go out through [`Transport::send`], and everything the peer sends
//! comes back through one ordered event stream together with the `Opened` /
//! `Closed` lifecycle notifications. Pairing replies with calls, timeouts and
//! retries are handled elsewhere.
//!
//! Concrete implementations of this interface live under `src/transport/`.
use crate::Result;
use std::sync::Arc;

use tokio::sync::mpsc;

/// Shared base state for all transport implementations.
///
/// Each concrete transport embeds this as a field named `base`:
///
/// ```ignore
/// struct WebSocketTransport {
///     base: TransportBase,
///     // ... socket specific fields
/// }
///
/// impl Transport for WebSocketTransport {
///     fn base(&self) -> &TransportBase { &self.base }
/// }
/// ```
#[derive(Debug, Clone)]
pub struct TransportBase {
    /// Identifier for this transport instance (the node_id), used for logging.
    pub transport_id: String,
    /// The URI the connection was opened against.
    pub uri: String,
}

impl TransportBase {
    /// Create a new TransportBase.
    pub fn new(transport_id: impl Into<String>, uri: impl Into<String>) -> Self {
        Self {
            transport_id: transport_id.into(),
            uri: uri.into(),
        }
    }
}

impl From<&TransportConfig> for TransportBase {
    fn from(config: &TransportConfig) -> Self {
        // ---
        Self {
            transport_id: config.node_id.clone(),
            uri: config.uri.clone(),
        }
    }
}

/// Configuration for creating a transport instance.
///
/// Passed to transport factory functions (`create_*_transport()`).
#[derive(Clone, Debug)]
pub struct TransportConfig {
    /// Connection URI (e.g. `"ws://localhost:8080/ws"`, `"memory://math"`).
    pub uri: String,
    /// Node ID for this transport instance.
    pub node_id: String,
    /// Optional transport type override (`"memory"`, `"websocket"`).
    /// If `None`, the type is inferred from the URI scheme.
    pub transport_type: Option<String>,
}

/// Something that happened on the connection, in the order it happened.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum TransportEvent {
    /// The connection is established and usable for sending.
    Opened,

    /// A text message sent by the peer.
    Message(String),

    /// The connection is gone. No further events follow.
    Closed,
}

/// Handle returned from a successful subscription.
///
/// The inbox yields every inbound event exactly once, in receive order.
/// The channel ending is equivalent to [`TransportEvent::Closed`].
pub struct SubscriptionHandle {
    // ---
    /// Receiver channel for connection events.
    pub inbox: mpsc::Receiver<TransportEvent>,
}

/// Transport abstraction.
///
/// Implementations must ensure that:
/// - frames passed to `send()` reach the peer in the order they were sent;
/// - inbound messages are delivered to the inbox in the order the peer sent
///   them;
/// - `send()` fails with [`RpcError::Transport`](crate::RpcError::Transport)
///   once the connection is not open;
/// - `Closed` is delivered at most once, after which nothing else arrives;
/// - the inbound stream can be subscribed exactly once; a second call to
///   `subscribe()` fails, so that one persistent handler sees every message.
///
/// The in-memory transport serves as the reference implementation of these
/// semantics.
///
/// # Notes
///
/// This trait uses `async_trait`; the expanded documentation may show explicit
/// lifetimes and a boxed `Future`. Consumers should treat methods as normal
/// `async fn`s.
#[async_trait::async_trait]
pub trait Transport: Send + Sync {
    // ---
    /// Returns a reference to the shared base state.
    fn base(&self) -> &TransportBase;

    /// Returns the transport_id of the transport.
    fn transport_id(&self) -> &str {
        &self.base().transport_id
    }

    /// Returns whether the connection is currently usable for sending.
    fn is_open(&self) -> bool;

    /// Send one text frame to the peer.
    async fn send(&self, text: String) -> Result<()>;

    /// Take the inbound event stream.
    async fn subscribe(&self) -> Result<SubscriptionHandle>;

    /// Close the connection and release any associated resources.
    async fn close(&self) -> Result<()>;
}

/// Shared transport pointer.
///
/// `.clone()` is cheap and all clones share the same underlying connection.
pub type TransportPtr = Arc<dyn Transport>;
