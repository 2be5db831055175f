//! Incremental WebSocket upgrade handling and frame decoding for the
//! [`monoio`](https://github.com/bytedance/monoio) runtime.
//!
//! A [`Session`] accepts bytes exactly as the transport delivers them: it answers the HTTP
//! upgrade request once it is complete and valid, then decodes WebSocket frames from whatever
//! follows, regardless of how the stream is chunked. [`server::serve`] drives sessions over
//! monoio TCP connections.

#![deny(
    missing_docs,
    unused_must_use,
    unused_mut,
    unused_imports,
    unused_import_braces
)]

pub mod error;
pub use error::{Error, Result};

pub mod protocol;
pub mod registry;

#[cfg(feature = "handshake")]
pub mod handshake;
#[cfg(feature = "handshake")]
pub mod server;
#[cfg(feature = "handshake")]
pub mod session;

// re-export bytes since used in the `Frame` API.
pub use bytes::Bytes;
#[cfg(feature = "handshake")]
pub use http;
// re-export the decode result shared by every decoder.
pub use monoio_codec::Decoded;

pub use crate::{
    protocol::{Frame, FrameDecoder, FrameEncoder, FrameReader, OpCode},
    registry::{ConnectionId, Registry},
};
#[cfg(feature = "handshake")]
pub use crate::{
    handshake::{derive_accept_key, header_contains_token, server::upgrade},
    server::{FrameHandler, ServerConfig, serve},
    session::{Output, Session, SessionConfig, Status},
};
