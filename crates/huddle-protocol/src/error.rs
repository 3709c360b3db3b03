//! Error types for the protocol layer.
//!
//! Each crate in huddle defines its own error enum. A `ProtocolError`
//! means the problem is in the shape of the data (encoding, decoding, or
//! a command whose arguments don't make sense), not in the room state.

/// Errors that can occur in the protocol layer.
#[derive(Debug, thiserror::Error)]
pub enum ProtocolError {
    /// Serialization failed (turning a Rust type into bytes).
    #[cfg(feature = "json")]
    #[error("encode failed: {0}")]
    Encode(serde_json::Error),

    /// Deserialization failed: malformed JSON, missing required fields,
    /// unknown command tag, wrong data types.
    #[cfg(feature = "json")]
    #[error("decode failed: {0}")]
    Decode(serde_json::Error),

    /// The message decoded fine but its contents are invalid, e.g. an
    /// order list that names the same player twice.
    #[error("invalid message: {0}")]
    InvalidMessage(String),
}
