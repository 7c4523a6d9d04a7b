//! Named remote calls over a single duplex message connection, with
//! automatic call/reply correlation
//!
//! The connection (a WebSocket, or the in-memory transport used for tests)
//! delivers every reply through one shared inbound stream. This library
//! tags each outgoing call with a per-connection id, keeps one pending
//! future per in-flight id, and resolves exactly the future whose id the
//! reply carries. Unparseable or unmatched messages are dropped, and a
//! closing connection rejects every call still pending.
//!
//! ```
//! use duplex_rpc::{MemoryHub, RpcClientBuilder, TransportBuilder};
//!
//! # async fn example() -> duplex_rpc::Result<()> {
//! let mut listener = MemoryHub::global().listen("doc-math")?;
//!
//! let transport = TransportBuilder::new()
//!     .uri("memory://doc-math")
//!     .node_id("doc-client")
//!     .build()
//!     .await?;
//! let client = RpcClientBuilder::new(transport).build().await?;
//! let mut peer = listener.accept().await.expect("listener is bound");
//!
//! let call = client.start_call("add", (2, 3)).await?;
//! assert_eq!(
//!     peer.recv().await.as_deref(),
//!     Some(r#"{"type":"rpc-call","function":"add","args":[2,3],"id":0}"#)
//! );
//!
//! peer.send(r#"{"id":0,"result":5}"#).await?;
//! assert_eq!(call.await?["result"], 5);
//! # Ok(())
//! # }
//! ```

// Import all sub modules once...
mod client;
mod client_builder;
mod domain;
mod protocol;
mod transport;
mod transport_builder;

mod correlation;
mod error;
mod macros;
mod sync;

pub(crate) use macros::{log_debug, log_error, log_info, log_warn};

// Re-export main types
pub use client::{PendingCall, RpcClient};
pub use client_builder::RpcClientBuilder;
pub use transport_builder::TransportBuilder;

pub use correlation::CallId;
pub use error::{Result, RpcError};
pub use protocol::{CallEnvelope, CALL_TYPE};

pub use transport::{
    // ---
    create_memory_transport,
    create_memory_transport_with_hub,
    create_websocket_transport,
    MemoryHub,
    MemoryListener,
    MemoryPeer,
};

// --- public re-exports
pub use domain::{
    //
    SubscriptionHandle,
    Transport,
    TransportBase,
    TransportConfig,
    TransportEvent,
    TransportPtr,
};
