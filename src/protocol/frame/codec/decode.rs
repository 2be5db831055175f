use bytes::{Buf, BytesMut};
use log::trace;
use monoio_codec::{Decoded, Decoder};

use crate::{
    error::{CapacityError, Error, ProtocolError},
    protocol::frame::{Frame, FrameHeader, frame::LengthFormat, mask::apply_mask},
};

/// Position of the decoder inside the frame currently being read.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DecodeState {
    /// Waiting for the two leading header bytes.
    AwaitingHeader,
    /// Waiting for a 2 or 8 byte extended payload length.
    AwaitingExtendedLength {
        /// Number of length bytes still expected.
        width: usize,
    },
    /// Waiting for the masking key, if the frame is masked.
    AwaitingMaskKey,
    /// Waiting for the full payload.
    AwaitingPayload,
}

/// Resumable decoder for WebSocket frames.
///
/// Every call consumes only fully available header fields or a complete payload from the
/// source buffer, so a frame may be split across any number of reads. One call yields at
/// most one frame; see [`FrameReader`](super::FrameReader) for a chunk oriented wrapper.
#[derive(Debug)]
pub struct FrameDecoder {
    state: DecodeState,
    header: FrameHeader,
    masked: bool,
    length: u64,
    max_frame_size: Option<usize>,
    reject_reserved_length_bit: bool,
}

impl Default for FrameDecoder {
    fn default() -> Self {
        Self::new(Some(16 << 20))
    }
}

impl FrameDecoder {
    /// Creates a decoder with the given payload size limit. `None` means no limit.
    pub fn new(max_frame_size: Option<usize>) -> Self {
        Self {
            state: DecodeState::AwaitingHeader,
            header: FrameHeader::default(),
            masked: false,
            length: 0,
            max_frame_size,
            reject_reserved_length_bit: false,
        }
    }

    /// Sets the payload size limit.
    pub fn set_max_frame_size(&mut self, max_frame_size: Option<usize>) {
        self.max_frame_size = max_frame_size;
    }

    /// Rejects 64-bit lengths with the reserved most significant bit set instead of clearing it.
    pub fn set_reject_reserved_length_bit(&mut self, reject: bool) {
        self.reject_reserved_length_bit = reject;
    }

    /// Returns the current decoding state.
    pub fn state(&self) -> DecodeState {
        self.state
    }

    fn set_length(&mut self, length: u64) -> Result<(), Error> {
        let fits = usize::try_from(length).is_ok();
        match self.max_frame_size {
            Some(max_size) if !fits || length > max_size as u64 => {
                return Err(Error::Capacity(CapacityError::FrameTooLong {
                    size: length,
                    max_size,
                }));
            }
            None if !fits => {
                return Err(Error::Capacity(CapacityError::FrameTooLong {
                    size: length,
                    max_size: usize::MAX,
                }));
            }
            _ => {}
        }

        self.length = length;
        self.state = DecodeState::AwaitingMaskKey;
        Ok(())
    }
}

impl Decoder for FrameDecoder {
    type Item = Frame;
    type Error = Error;

    fn decode(&mut self, src: &mut BytesMut) -> Result<Decoded<Self::Item>, Self::Error> {
        loop {
            match self.state {
                DecodeState::AwaitingHeader => {
                    if src.len() < 2 {
                        return Ok(Decoded::Insufficient);
                    }

                    let first = src.get_u8();
                    let second = src.get_u8();
                    let (header, masked) = FrameHeader::from_leading_bytes(first, second);
                    self.header = header;
                    self.masked = masked;

                    match LengthFormat::for_byte(second) {
                        LengthFormat::U8(length) => self.set_length(length as u64)?,
                        LengthFormat::U16 => {
                            self.state = DecodeState::AwaitingExtendedLength { width: 2 }
                        }
                        LengthFormat::U64 => {
                            self.state = DecodeState::AwaitingExtendedLength { width: 8 }
                        }
                    }
                }

                DecodeState::AwaitingExtendedLength { width } => {
                    if src.len() < width {
                        return Ok(Decoded::Insufficient);
                    }

                    let length = if width == 2 {
                        src.get_u16() as u64
                    } else {
                        let raw = src.get_u64();
                        // The most significant bit must be zero.
                        if raw >> 63 != 0 {
                            if self.reject_reserved_length_bit {
                                return Err(Error::Protocol(ProtocolError::InvalidPayloadLength));
                            }
                            trace!("Clearing reserved bit of 64-bit payload length");
                        }
                        raw & (u64::MAX >> 1)
                    };
                    self.set_length(length)?;
                }

                DecodeState::AwaitingMaskKey => {
                    if self.masked {
                        if src.len() < 4 {
                            return Ok(Decoded::Insufficient);
                        }
                        let mut mask = [0u8; 4];
                        src.copy_to_slice(&mut mask);
                        self.header.mask = Some(mask);
                    }
                    self.state = DecodeState::AwaitingPayload;
                }

                DecodeState::AwaitingPayload => {
                    // `set_length` guarantees the length fits in `usize`.
                    let length = self.length as usize;
                    // Memory grows only with the bytes that actually arrive.
                    if src.len() < length {
                        return Ok(Decoded::Insufficient);
                    }

                    let mut payload = src.split_to(length);
                    if let Some(mask) = self.header.mask {
                        apply_mask(&mut payload, mask);
                    }

                    let header = std::mem::take(&mut self.header);
                    self.masked = false;
                    self.length = 0;
                    self.state = DecodeState::AwaitingHeader;

                    let frame = Frame::from_payload(header, payload.freeze());
                    trace!("received frame {frame}");
                    return Ok(Decoded::Some(frame));
                }
            }
        }
    }
}
