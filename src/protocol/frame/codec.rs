//! WebSocket frame codec implementation.

use bytes::BytesMut;
use monoio_codec::{Decoded, Decoder};

use crate::{error::Result, protocol::frame::Frame};

mod decode;
pub use decode::{DecodeState, FrameDecoder};

mod encode;
pub use encode::FrameEncoder;

/// Chunk oriented frame reader.
///
/// Owns the bytes delivered so far together with a [`FrameDecoder`], so the transport can hand
/// over whatever it received without caring about frame boundaries.
#[derive(Debug)]
pub struct FrameReader {
    buf: BytesMut,
    decoder: FrameDecoder,
}

impl Default for FrameReader {
    fn default() -> Self {
        Self::new(FrameDecoder::default(), 0)
    }
}

impl FrameReader {
    /// Creates a new `FrameReader` with a pre-allocated buffer of `capacity` bytes.
    pub fn new(decoder: FrameDecoder, capacity: usize) -> Self {
        Self {
            buf: BytesMut::with_capacity(capacity),
            decoder,
        }
    }

    /// Creates a `FrameReader` from bytes that were already read from the transport, e.g. the
    /// tail of the read that completed the handshake.
    pub fn from_partially_read(part: BytesMut, decoder: FrameDecoder) -> Self {
        Self { buf: part, decoder }
    }

    /// Returns a reference to the bytes not consumed yet.
    pub fn read_buffer(&self) -> &BytesMut {
        &self.buf
    }

    /// Appends `chunk` and decodes every frame that is complete.
    ///
    /// Returns [`Decoded::Insufficient`] when no frame could be completed; all bytes stay
    /// buffered for the next call. An error leaves the reader in an unspecified state and the
    /// connection should be dropped.
    pub fn decode(&mut self, chunk: &[u8]) -> Result<Decoded<Vec<Frame>>> {
        self.buf.extend_from_slice(chunk);

        let mut frames = Vec::new();
        while let Decoded::Some(frame) = self.decoder.decode(&mut self.buf)? {
            frames.push(frame);
        }

        if frames.is_empty() {
            Ok(Decoded::Insufficient)
        } else {
            Ok(Decoded::Some(frames))
        }
    }
}
