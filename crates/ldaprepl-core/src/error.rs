//! Error types for the replication protocol core

use thiserror::Error;

/// Result type alias using the replication [`Error`]
pub type Result<T> = std::result::Result<T, Error>;

/// Errors raised by the codec, the message families and the session plumbing
#[derive(Error, Debug)]
pub enum Error {
    /// I/O errors from the session transport
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Leading tag byte does not name any message kind
    #[error("Unknown message type: {0}")]
    UnknownMessageType(u8),

    /// Body truncated, trailing garbage or a field that does not parse
    #[error("Malformed message: {0}")]
    Malformed(String),

    /// Bytes do not match what the negotiated protocol version requires
    #[error("Protocol version mismatch: {0}")]
    VersionMismatch(String),

    /// Message or feature does not exist at the requested protocol version
    #[error("Unsupported protocol version: {0}")]
    UnsupportedVersion(u8),

    /// A field value cannot be represented on the wire
    #[error("Encode error: {0}")]
    Encode(String),

    /// CSN string or byte form is not valid
    #[error("Invalid CSN: {0}")]
    InvalidCsn(String),

    /// Conversion between operations and update messages failed
    #[error("Operation error: {0}")]
    Operation(String),

    /// Session framing or channel errors
    #[error("Session error: {0}")]
    Session(String),

    /// Configuration errors
    #[error("Configuration error: {0}")]
    Config(String),
}

impl Error {
    /// Create a malformed-input error
    pub fn malformed(msg: impl Into<String>) -> Self {
        Self::Malformed(msg.into())
    }

    /// Create a version-mismatch error
    pub fn version_mismatch(msg: impl Into<String>) -> Self {
        Self::VersionMismatch(msg.into())
    }

    /// Create an encode error
    pub fn encode(msg: impl Into<String>) -> Self {
        Self::Encode(msg.into())
    }

    /// Create an invalid CSN error
    pub fn invalid_csn(msg: impl Into<String>) -> Self {
        Self::InvalidCsn(msg.into())
    }

    /// Create an operation error
    pub fn operation(msg: impl Into<String>) -> Self {
        Self::Operation(msg.into())
    }

    /// Create a session error
    pub fn session(msg: impl Into<String>) -> Self {
        Self::Session(msg.into())
    }

    /// Create a configuration error
    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config(msg.into())
    }

    /// True for every failure that means "these bytes are not a valid message"
    pub fn is_decode_failure(&self) -> bool {
        matches!(
            self,
            Self::UnknownMessageType(_)
                | Self::Malformed(_)
                | Self::VersionMismatch(_)
                | Self::InvalidCsn(_)
        )
    }
}
