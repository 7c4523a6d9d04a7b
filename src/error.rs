use thiserror::Error;

/// Errors that can occur while issuing or awaiting a remote call
#[derive(Error, Debug)]
pub enum RpcError {
    /// Call arguments or the call envelope could not be serialized, or a
    /// reply could not be decoded into the requested type
    #[error("encoding error: {0}")]
    Encoding(#[from] serde_json::Error),

    /// The connection is not usable for sending
    #[error("transport error: {0}")]
    Transport(String),

    /// The connection closed while the call was still pending
    #[error("connection closed")]
    ConnectionClosed,

    /// Caller-imposed deadline elapsed before the reply arrived
    #[error("call timed out")]
    Timeout,

    /// The call itself was malformed (e.g. empty function name)
    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    /// A required builder setting was not provided
    #[error("missing configuration: {0}")]
    MissingConfig(String),

    /// Builder settings contradict each other
    #[error("configuration conflict: {0}")]
    ConfigConflict(String),
}

/// Result type alias for RPC operations
pub type Result<T> = std::result::Result<T, RpcError>;
