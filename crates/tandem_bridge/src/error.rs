//! # Bridge Error Types
//!
//! Only setup and local API calls return errors. Protocol problems inside
//! the drivers are logged and dropped; they never cross the thread boundary.

use thiserror::Error;

/// Errors from the command channel.
#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChannelError {
    /// The other side has shut down.
    #[error("peer disconnected")]
    Disconnected,
}

/// Result type for channel operations.
pub type ChannelResult<T> = Result<T, ChannelError>;

/// Errors from the byte wire codec.
#[derive(Error, Debug)]
pub enum WireError {
    /// A message could not be encoded.
    #[error("failed to encode message: {0}")]
    Encode(#[source] serde_json::Error),

    /// Bytes did not form a tagged message.
    #[error("malformed message: {0}")]
    Decode(#[source] serde_json::Error),
}

/// Errors loading or validating a session configuration.
#[derive(Error, Debug)]
pub enum ConfigError {
    /// The file could not be read.
    #[error("cannot read config {path}: {source}")]
    Io {
        /// File that was requested.
        path: String,
        /// Underlying failure.
        #[source]
        source: std::io::Error,
    },

    /// The TOML did not match the schema.
    #[error("invalid config syntax: {0}")]
    Parse(#[from] toml::de::Error),

    /// A value is out of range.
    #[error("invalid configuration: {0}")]
    Invalid(String),
}

/// Errors reported by a physics engine when creating native objects.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum EngineError {
    /// The geometry or configuration was refused.
    #[error("engine refused: {0}")]
    Refused(String),

    /// The engine does not implement this object type.
    #[error("unsupported by engine: {0}")]
    Unsupported(&'static str),
}
