//! Error handling.

use std::io;

/// Result type of all library calls.
pub type Result<T, E = Error> = std::result::Result<T, E>;

/// Possible WebSocket errors.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// Input-output error. Apart from `WouldBlock`, these are generally errors with the
    /// underlying connection and the connection should be dropped.
    #[error("IO error: {0}")]
    Io(#[from] io::Error),
    /// Memory limits exceeded.
    #[error("Space limit exceeded: {0}")]
    Capacity(#[from] CapacityError),
    /// Protocol violation, either in the handshake or in the frame stream.
    #[error("WebSocket protocol error: {0}")]
    Protocol(#[from] ProtocolError),
    /// HTTP format error.
    #[cfg(feature = "handshake")]
    #[error("HTTP format error: {0}")]
    HttpFormat(#[from] http::Error),
}

impl Error {
    /// Returns `true` if the error was produced while validating the upgrade request.
    ///
    /// Such errors are fatal to the connection only: the peer is simply not upgraded.
    pub fn is_bad_handshake(&self) -> bool {
        matches!(self, Error::Protocol(e) if e.is_handshake())
    }
}

#[cfg(feature = "handshake")]
impl From<httparse::Error> for Error {
    fn from(err: httparse::Error) -> Self {
        match err {
            httparse::Error::TooManyHeaders => Error::Capacity(CapacityError::TooManyHeaders),
            e => Error::Protocol(ProtocolError::HttparseError(e)),
        }
    }
}

/// Indicates the specific type/cause of a capacity error.
#[derive(Debug, PartialEq, Eq, Clone, Copy, thiserror::Error)]
pub enum CapacityError {
    /// Too many headers provided (see [`httparse::Error::TooManyHeaders`]).
    #[error("Too many headers")]
    TooManyHeaders,
    /// The upgrade request grew past the configured limit before it was complete.
    #[error("Handshake request too large: {size} > {max_size}")]
    RequestTooLarge {
        /// The number of bytes buffered so far.
        size: usize,
        /// The configured maximum.
        max_size: usize,
    },
    /// A frame declared a payload larger than the configured limit.
    #[error("Frame too long: {size} > {max_size}")]
    FrameTooLong {
        /// The declared payload length.
        size: u64,
        /// The configured maximum.
        max_size: usize,
    },
}

/// Indicates the specific type/cause of a protocol error.
#[derive(Debug, PartialEq, Eq, Clone, thiserror::Error)]
pub enum ProtocolError {
    /// Use of the wrong HTTP method (the WebSocket protocol requires the GET method be used).
    #[error("Unsupported HTTP method used - only GET is allowed")]
    WrongHttpMethod,
    /// Missing `Connection: upgrade` HTTP header.
    #[error("No \"Connection: upgrade\" header")]
    MissingConnectionUpgradeHeader,
    /// Missing `Upgrade: websocket` HTTP header.
    #[error("No \"Upgrade: websocket\" header")]
    MissingUpgradeWebSocketHeader,
    /// Missing `Sec-WebSocket-Version: 13` HTTP header.
    #[error("No \"Sec-WebSocket-Version: 13\" header")]
    MissingSecWebSocketVersionHeader,
    /// Missing `Sec-WebSocket-Key` HTTP header.
    #[error("No \"Sec-WebSocket-Key\" header")]
    MissingSecWebSocketKey,
    /// The HTTP request could not be tokenized.
    #[cfg(feature = "handshake")]
    #[error("httparse error: {0}")]
    HttparseError(#[from] httparse::Error),
    /// The reserved most significant bit of a 64-bit payload length was set.
    #[error("Invalid payload length: reserved bit set")]
    InvalidPayloadLength,
}

impl ProtocolError {
    /// Returns `true` for failures of the upgrade request validation.
    pub fn is_handshake(&self) -> bool {
        matches!(
            self,
            ProtocolError::WrongHttpMethod
                | ProtocolError::MissingConnectionUpgradeHeader
                | ProtocolError::MissingUpgradeWebSocketHeader
                | ProtocolError::MissingSecWebSocketVersionHeader
                | ProtocolError::MissingSecWebSocketKey
        )
    }
}
