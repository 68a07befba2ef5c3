//! Error types for pppoxy

use thiserror::Error;

/// Result type alias for pppoxy operations
pub type Result<T> = std::result::Result<T, Error>;

/// Main error type for pppoxy
#[derive(Error, Debug)]
pub enum Error {
    /// Network I/O error
    #[error("Network I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Interface not found
    #[error("Interface '{0}' not found")]
    InterfaceNotFound(String),

    /// Raw socket creation failure
    #[error("Socket error: {0}")]
    Socket(String),

    /// Raw socket bind failure
    #[error("Bind error: {0}")]
    Bind(String),

    /// Tunnel framing error (oversized varint, payload over budget)
    #[error("Frame error: {0}")]
    Frame(String),

    /// Connection-level error
    #[error("Connection error: {0}")]
    Connection(String),

    /// Invalid parameter error
    #[error("Invalid parameter '{name}': {reason}")]
    InvalidParameter { name: String, reason: String },
}

impl Error {
    /// Create a socket error with a custom message
    pub fn socket<S: Into<String>>(msg: S) -> Self {
        Error::Socket(msg.into())
    }

    /// Create a bind error with a custom message
    pub fn bind<S: Into<String>>(msg: S) -> Self {
        Error::Bind(msg.into())
    }

    /// Create a framing error with a custom message
    pub fn frame<S: Into<String>>(msg: S) -> Self {
        Error::Frame(msg.into())
    }

    /// Create an invalid parameter error
    pub fn invalid_parameter<S: Into<String>>(name: S, reason: S) -> Self {
        Error::InvalidParameter {
            name: name.into(),
            reason: reason.into(),
        }
    }
}
