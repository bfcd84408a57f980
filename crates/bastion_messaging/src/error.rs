//! Messaging error taxonomy.

use thiserror::Error;

/// Errors surfaced by the messaging bus.
///
/// `Timeout` and `Disconnected` are recoverable operating conditions, not
/// process faults: the caller decides whether to retry, fall back to
/// local-only behavior, or surface the failure.
#[derive(Debug, Error)]
pub enum MessagingError {
    /// An RPC request got no correlated response within its deadline.
    #[error("no response within the timeout window")]
    Timeout,

    /// The broker link is down. Observable via `is_connected()`; publishing
    /// degrades to the local queue rather than failing the caller.
    #[error("broker link is disconnected")]
    Disconnected,

    /// The bounded local queue for messages published while disconnected is
    /// full; the message was dropped.
    #[error("local publish queue is full")]
    QueueFull,

    /// A frame could not be encoded for the wire.
    #[error("failed to encode message: {0}")]
    Encode(#[from] serde_json::Error),

    /// A subscriber or RPC responder rejected a message.
    #[error("handler failed: {0}")]
    Handler(String),
}
