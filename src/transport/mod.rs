//! Transport implementations.
//!
//! This module provides concrete implementations of the domain-level
//! `Transport` trait. They are exposed only through constructor functions;
//! domain code must not depend on transport-specific types.
//!
//! Transports that are compiled out keep their constructor as a stub that
//! returns an error, so callers never need their own feature gates.

mod memory;

#[cfg(feature = "transport_websocket")]
mod websocket;

pub(crate) use memory::MEMORY_SCHEME;
pub use memory::{
    // ---
    create_memory_transport,
    create_memory_transport_with_hub,
    MemoryHub,
    MemoryListener,
    MemoryPeer,
};

#[cfg(feature = "transport_websocket")]
pub use websocket::create_websocket_transport;

/// Stub used when the `transport_websocket` feature is disabled.
///
/// # Errors
///
/// Always returns [`RpcError::Transport`](crate::RpcError::Transport).
#[cfg(not(feature = "transport_websocket"))]
pub async fn create_websocket_transport(
    config: crate::TransportConfig,
) -> crate::Result<crate::TransportPtr> {
    // ---
    Err(crate::RpcError::Transport(format!(
        "cannot connect to {}: built without the transport_websocket feature",
        config.uri
    )))
}
