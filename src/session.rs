//! Per-connection state: the upgrade handshake followed by frame decoding.

use bytes::{Buf, BytesMut};
use log::{debug, trace};
use monoio_codec::{Decoded, Decoder};

use crate::{
    error::{CapacityError, Error, Result},
    handshake::server::{RequestDecoder, upgrade},
    protocol::frame::{Frame, FrameDecoder, FrameReader},
    registry::ConnectionId,
};

/// The configuration for a connection session.
#[derive(Debug, Clone, Copy)]
#[non_exhaustive]
pub struct SessionConfig {
    /// The initial capacity of the frame read buffer allocated on upgrade.
    ///
    /// The default value is 4 KiB.
    pub initial_read_capacity: usize,
    /// The maximum size of the upgrade request, headers included.
    ///
    /// The default value is 8 KiB. A peer that sends more without completing the request is
    /// disconnected.
    pub max_request_size: usize,
    /// The maximum size of a single incoming frame payload. `None` means no size limit.
    ///
    /// The default value is 16 MiB, which should be reasonably big for all normal use-cases but
    /// small enough to prevent memory eating by a malicious user.
    pub max_frame_size: Option<usize>,
    /// When set to `true`, a 64-bit payload length with its reserved most significant bit set
    /// is a protocol error.
    ///
    /// By default the bit is cleared and decoding continues.
    pub reject_reserved_length_bit: bool,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            initial_read_capacity: 4 * 1024,
            max_request_size: 8 * 1024,
            max_frame_size: Some(16 << 20),
            reject_reserved_length_bit: false,
        }
    }
}

impl SessionConfig {
    /// Sets [`Self::initial_read_capacity`].
    pub fn initial_read_capacity(mut self, initial_read_capacity: usize) -> Self {
        self.initial_read_capacity = initial_read_capacity;
        self
    }

    /// Sets [`Self::max_request_size`].
    pub fn max_request_size(mut self, max_request_size: usize) -> Self {
        self.max_request_size = max_request_size;
        self
    }

    /// Sets [`Self::max_frame_size`].
    pub fn max_frame_size(mut self, max_frame_size: Option<usize>) -> Self {
        self.max_frame_size = max_frame_size;
        self
    }

    /// Sets [`Self::reject_reserved_length_bit`].
    pub fn reject_reserved_length_bit(mut self, reject_reserved_length_bit: bool) -> Self {
        self.reject_reserved_length_bit = reject_reserved_length_bit;
        self
    }

    fn frame_decoder(&self) -> FrameDecoder {
        let mut decoder = FrameDecoder::new(self.max_frame_size);
        decoder.set_reject_reserved_length_bit(self.reject_reserved_length_bit);
        decoder
    }
}

/// Lifecycle phase of a session.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Status {
    /// Waiting for a complete and valid upgrade request.
    Handshaking,
    /// Upgraded; incoming bytes are WebSocket frames.
    Active,
}

#[derive(Debug)]
enum Phase {
    Handshaking(BytesMut),
    Active(FrameReader),
}

/// What a single delivery of bytes produced.
#[derive(Debug, Default)]
pub struct Output {
    /// Bytes of the handshake response, to be written before anything else.
    pub response: Option<Vec<u8>>,
    /// Frames completed by this delivery, in wire order.
    pub frames: Vec<Frame>,
}

/// One WebSocket connection, from the first byte of the upgrade request onwards.
///
/// Sessions are not tied to a transport: feed every received chunk to [`Session::on_data`]
/// in arrival order and act on the returned [`Output`]. Any error means the connection must be
/// closed; the session must not be used afterwards.
#[derive(Debug)]
pub struct Session {
    id: ConnectionId,
    config: SessionConfig,
    phase: Phase,
}

impl Session {
    /// Creates a session in the handshaking phase.
    pub fn new(id: ConnectionId, config: Option<SessionConfig>) -> Self {
        Self {
            id,
            config: config.unwrap_or_default(),
            phase: Phase::Handshaking(BytesMut::new()),
        }
    }

    /// Returns the connection id.
    pub fn id(&self) -> ConnectionId {
        self.id
    }

    /// Returns the current lifecycle phase.
    pub fn status(&self) -> Status {
        match self.phase {
            Phase::Handshaking(_) => Status::Handshaking,
            Phase::Active(_) => Status::Active,
        }
    }

    /// Processes a chunk of bytes received from the peer.
    pub fn on_data(&mut self, chunk: &[u8]) -> Result<Output> {
        let mut output = Output::default();

        let rest = match &mut self.phase {
            Phase::Active(reader) => {
                if let Decoded::Some(frames) = reader.decode(chunk)? {
                    output.frames = frames;
                }
                return Ok(output);
            }

            Phase::Handshaking(buf) => {
                buf.extend_from_slice(chunk);
                match RequestDecoder.decode(buf)? {
                    Decoded::Some((size, request)) => {
                        output.response = Some(upgrade(&request)?);
                        buf.advance(size);
                        buf.split()
                    }
                    _ => {
                        if buf.len() > self.config.max_request_size {
                            return Err(Error::Capacity(CapacityError::RequestTooLarge {
                                size: buf.len(),
                                max_size: self.config.max_request_size,
                            }));
                        }
                        trace!("{}: upgrade request incomplete ({} bytes)", self.id, buf.len());
                        return Ok(output);
                    }
                }
            }
        };

        debug!("{}: upgraded, {} bytes pending", self.id, rest.len());

        let mut rest = rest;
        rest.reserve(self.config.initial_read_capacity.saturating_sub(rest.len()));
        let mut reader = FrameReader::from_partially_read(rest, self.config.frame_decoder());
        if let Decoded::Some(frames) = reader.decode(&[])? {
            output.frames = frames;
        }
        self.phase = Phase::Active(reader);

        Ok(output)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        error::ProtocolError,
        protocol::frame::coding::{Data, OpCode},
    };

    const REQUEST: &[u8] = b"\
        GET /chat HTTP/1.1\r\n\
        Host: server.example.com\r\n\
        Upgrade: websocket\r\n\
        Connection: Upgrade\r\n\
        Sec-WebSocket-Key: dGhlIHNhbXBsZSBub25jZQ==\r\n\
        Sec-WebSocket-Version: 13\r\n\
        \r\n";

    const RESPONSE: &[u8] = b"\
        HTTP/1.1 101 Switching Protocols\r\n\
        Upgrade: websocket\r\n\
        Connection: Upgrade\r\n\
        Sec-WebSocket-Accept: s3pPLMBiTxaQ9kYGzzhZRbK+xOo=\r\n\
        \r\n";

    // "Hello" masked with 37 fa 21 3d.
    const HELLO: &[u8] = &[0x81, 0x85, 0x37, 0xfa, 0x21, 0x3d, 0x7f, 0x9f, 0x4d, 0x51, 0x58];

    fn session() -> Session {
        Session::new(ConnectionId::from(1), None)
    }

    #[test]
    fn upgrade_in_one_chunk() {
        let mut session = session();
        let output = session.on_data(REQUEST).unwrap();
        assert_eq!(output.response.as_deref(), Some(RESPONSE));
        assert!(output.frames.is_empty());
        assert_eq!(session.status(), Status::Active);
    }

    #[test]
    fn upgrade_byte_by_byte() {
        let mut session = session();
        let (last, head) = REQUEST.split_last().unwrap();
        for byte in head {
            let output = session.on_data(&[*byte]).unwrap();
            assert!(output.response.is_none());
            assert_eq!(session.status(), Status::Handshaking);
        }

        let output = session.on_data(&[*last]).unwrap();
        assert_eq!(output.response.as_deref(), Some(RESPONSE));
    }

    #[test]
    fn frames_following_request_are_not_dropped() {
        let mut session = session();
        let mut chunk = REQUEST.to_vec();
        chunk.extend_from_slice(HELLO);
        chunk.extend_from_slice(&HELLO[..3]);

        let output = session.on_data(&chunk).unwrap();
        assert_eq!(output.response.as_deref(), Some(RESPONSE));
        assert_eq!(output.frames.len(), 1);
        assert_eq!(output.frames[0].opcode(), OpCode::Data(Data::Text));
        assert_eq!(&output.frames[0].payload()[..], b"Hello");

        let output = session.on_data(&HELLO[3..]).unwrap();
        assert!(output.response.is_none());
        assert_eq!(&output.frames[0].payload()[..], b"Hello");
    }

    #[test]
    fn active_need_more_data_is_silent() {
        let mut session = session();
        session.on_data(REQUEST).unwrap();

        let output = session.on_data(&HELLO[..4]).unwrap();
        assert!(output.response.is_none());
        assert!(output.frames.is_empty());
    }

    #[test]
    fn bad_handshake() {
        let mut session = session();
        let err = session
            .on_data(b"GET / HTTP/1.1\r\nHost: example.com\r\n\r\n")
            .unwrap_err();
        assert!(err.is_bad_handshake());
        assert!(matches!(
            err,
            Error::Protocol(ProtocolError::MissingConnectionUpgradeHeader)
        ));
    }

    #[test]
    fn malformed_request() {
        let mut session = session();
        let err = session.on_data(b"GET / HTTP/1.1\r\nHo st\r\n\r\n").unwrap_err();
        assert!(matches!(err, Error::Protocol(ProtocolError::HttparseError(_))));
    }

    #[test]
    fn oversized_request() {
        let mut session = Session::new(
            ConnectionId::from(7),
            Some(SessionConfig::default().max_request_size(32)),
        );
        let err = session.on_data(&REQUEST[..40]).unwrap_err();
        assert!(matches!(
            err,
            Error::Capacity(CapacityError::RequestTooLarge {
                size: 40,
                max_size: 32
            })
        ));
    }

    #[test]
    fn frame_limit_applies_after_upgrade() {
        let mut session = Session::new(
            ConnectionId::from(2),
            Some(SessionConfig::default().max_frame_size(Some(4))),
        );
        session.on_data(REQUEST).unwrap();
        assert!(matches!(
            session.on_data(HELLO),
            Err(Error::Capacity(CapacityError::FrameTooLong {
                size: 5,
                max_size: 4
            }))
        ));
    }
}
