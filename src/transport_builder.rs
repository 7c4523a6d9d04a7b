//! Transport builder for creating transport instances.
//!
//! Provides a fluent builder API for opening a connection, with the
//! transport type either set explicitly or inferred from the URI scheme.

use crate::transport::MEMORY_SCHEME;
use crate::{Result, RpcError, TransportConfig, TransportPtr};

/// Builder for creating transport instances.
///
/// # Examples
///
/// ## WebSocket
/// ```no_run
/// use duplex_rpc::TransportBuilder;
///
/// # async fn example() -> duplex_rpc::Result<()> {
/// let transport = TransportBuilder::new()
///     .uri("ws://localhost:8080/ws")
///     .node_id("browser-1")
///     .build()
///     .await?;
/// # Ok(())
/// # }
/// ```
///
/// ## In-memory, against a listener on the global hub
/// ```
/// use duplex_rpc::{MemoryHub, TransportBuilder};
///
/// # async fn example() -> duplex_rpc::Result<()> {
/// let _listener = MemoryHub::global().listen("math")?;
///
/// let transport = TransportBuilder::new()
///     .uri("memory://math")
///     .node_id("client")
///     .build()
///     .await?;
/// # Ok(())
/// # }
/// ```
pub struct TransportBuilder {
    uri: Option<String>,
    node_id: Option<String>,
    transport_type: Option<String>,
}

impl TransportBuilder {
    /// Create a new transport builder.
    pub fn new() -> Self {
        Self {
            uri: None,
            node_id: None,
            transport_type: None,
        }
    }

    /// Set the connection URI (required).
    ///
    /// Examples:
    /// - `"ws://localhost:8080/ws"`
    /// - `"memory://math"`
    pub fn uri(mut self, uri: impl Into<String>) -> Self {
        self.uri = Some(uri.into());
        self
    }

    /// Set the node ID (required). Used in log output.
    pub fn node_id(mut self, id: impl Into<String>) -> Self {
        self.node_id = Some(id.into());
        self
    }

    /// Set explicit transport type.
    ///
    /// Valid values: `"memory"`, `"websocket"`
    ///
    /// If not specified, the type is inferred from the URI scheme.
    pub fn transport_type(mut self, flag: impl Into<String>) -> Self {
        self.transport_type = Some(flag.into());
        self
    }

    /// Build the transport (consumes self).
    ///
    /// # Errors
    ///
    /// Returns error if:
    /// - Required fields missing (`uri`, `node_id`)
    /// - The explicit transport type contradicts the URI scheme
    /// - The transport type is unknown or cannot be inferred
    /// - Connecting fails
    pub async fn build(self) -> Result<TransportPtr> {
        // Validate required fields
        let uri = self
            .uri
            .ok_or_else(|| RpcError::MissingConfig("uri".into()))?;
        let node_id = self
            .node_id
            .ok_or_else(|| RpcError::MissingConfig("node_id".into()))?;

        let inferred = infer_transport_type(&uri);

        let transport_type = match (self.transport_type.as_deref(), inferred) {
            (Some(explicit), Some(scheme)) if explicit != scheme => {
                return Err(RpcError::ConfigConflict(format!(
                    "transport_type {explicit} does not match uri {uri}"
                )));
            }
            (Some(explicit), _) => explicit.to_string(),
            (None, Some(scheme)) => scheme.to_string(),
            (None, None) => {
                return Err(RpcError::Transport(format!(
                    "cannot infer transport type from uri: {uri}"
                )));
            }
        };

        let config = TransportConfig {
            uri,
            node_id,
            transport_type: Some(transport_type.clone()),
        };

        match transport_type.as_str() {
            "memory" => crate::create_memory_transport(config).await,
            "websocket" => crate::create_websocket_transport(config).await,
            other => Err(RpcError::Transport(format!(
                "unrecognized transport_type: {other}, valid values: memory, websocket"
            ))),
        }
    }
}

impl Default for TransportBuilder {
    fn default() -> Self {
        Self::new()
    }
}

fn infer_transport_type(uri: &str) -> Option<&'static str> {
    // ---
    if uri.starts_with(MEMORY_SCHEME) {
        Some("memory")
    } else if uri.starts_with("ws://") || uri.starts_with("wss://") {
        Some("websocket")
    } else {
        None
    }
}
