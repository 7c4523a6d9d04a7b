//! RPC client builder.
//!
//! Provides a fluent builder API for attaching an [`RpcClient`] to an
//! already opened transport.

use crate::{Result, RpcClient, TransportPtr};

/// Builder for creating RPC client instances.
///
/// # Examples
///
/// ```no_run
/// use duplex_rpc::{RpcClientBuilder, TransportBuilder};
///
/// # async fn example() -> duplex_rpc::Result<()> {
/// let transport = TransportBuilder::new()
///     .uri("ws://localhost:8080/ws")
///     .node_id("client")
///     .build()
///     .await?;
///
/// let client = RpcClientBuilder::new(transport)
///     .node_id("calc-client")
///     .build()
///     .await?;
/// # Ok(())
/// # }
/// ```
pub struct RpcClientBuilder {
    // ---
    transport: TransportPtr,
    node_id: Option<String>,
}

impl RpcClientBuilder {
    /// Create a new client builder.
    ///
    /// The client's `node_id` defaults to `transport.transport_id()`.
    pub fn new(transport: TransportPtr) -> Self {
        // ---
        Self {
            transport,
            node_id: None,
        }
    }

    /// Override the client's node ID used in log output.
    pub fn node_id(mut self, id: impl Into<String>) -> Self {
        self.node_id = Some(id.into());
        self
    }

    /// Build the RPC client (consumes self).
    ///
    /// Subscribes to the transport's inbound stream and starts the task that
    /// correlates replies.
    ///
    /// # Errors
    ///
    /// Returns [`RpcError::Transport`](crate::RpcError::Transport) if the
    /// transport's inbound stream is already taken (e.g. by another client).
    pub async fn build(self) -> Result<RpcClient> {
        // ---
        let node_id = self
            .node_id
            .unwrap_or_else(|| self.transport.transport_id().to_string());

        RpcClient::start(self.transport, node_id).await
    }
}
