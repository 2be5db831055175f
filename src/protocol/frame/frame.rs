use std::fmt;

use bytes::Bytes;

use super::coding::{Control, Data, OpCode};

/// A struct representing a WebSocket frame header.
#[allow(missing_copy_implementations)]
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FrameHeader {
    /// Indicates that the frame is the last one of a possibly fragmented message.
    pub is_final: bool,
    /// Reserved for protocol extensions.
    pub rsv1: bool,
    /// Reserved for protocol extensions.
    pub rsv2: bool,
    /// Reserved for protocol extensions.
    pub rsv3: bool,
    /// WebSocket protocol opcode.
    pub opcode: OpCode,
    /// A frame mask, if any.
    pub mask: Option<[u8; 4]>,
}

impl Default for FrameHeader {
    fn default() -> Self {
        FrameHeader {
            is_final: true,
            rsv1: false,
            rsv2: false,
            rsv3: false,
            opcode: OpCode::Control(Control::Close),
            mask: None,
        }
    }
}

impl FrameHeader {
    /// Builds a header from the first two bytes of a frame.
    ///
    /// The mask flag is returned alongside since the key itself follows the length.
    pub(crate) fn from_leading_bytes(first: u8, second: u8) -> (Self, bool) {
        let header = FrameHeader {
            is_final: first & 0x80 != 0,
            rsv1: first & 0x40 != 0,
            rsv2: first & 0x20 != 0,
            rsv3: first & 0x10 != 0,
            opcode: OpCode::from(first & 0x0f),
            mask: None,
        };
        (header, second & 0x80 != 0)
    }

    /// Packs the flags, opcode and length byte into the first two bytes of a frame.
    pub(crate) fn to_leading_bytes(&self, length: LengthFormat) -> [u8; 2] {
        let flags = [
            (self.is_final, 0x80),
            (self.rsv1, 0x40),
            (self.rsv2, 0x20),
            (self.rsv3, 0x10),
        ];
        let first = flags
            .iter()
            .filter(|(set, _)| *set)
            .fold(u8::from(self.opcode), |acc, (_, bit)| acc | bit);
        let masked = if self.mask.is_some() { 0x80 } else { 0 };
        [first, length.length_byte() | masked]
    }

    /// Returns the size of the header for a payload of `length` bytes.
    pub fn len(&self, length: u64) -> usize {
        2 + LengthFormat::for_length(length).extra_bytes() + if self.mask.is_some() { 4 } else { 0 }
    }
}

/// A struct representing a WebSocket frame.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Frame {
    pub(crate) header: FrameHeader,
    pub(crate) payload: Bytes,
}

impl Frame {
    /// Get the length of the frame.
    /// This is the length of the header + the length of the payload.
    #[inline]
    pub fn len(&self) -> usize {
        let length = self.payload.len();
        self.header.len(length as u64) + length
    }

    /// Check if the frame is empty.
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Get a reference to the frame's header.
    #[inline]
    pub fn header(&self) -> &FrameHeader {
        &self.header
    }

    /// Whether this is the final frame of a message.
    #[inline]
    pub fn fin(&self) -> bool {
        self.header.is_final
    }

    /// The frame opcode.
    #[inline]
    pub fn opcode(&self) -> OpCode {
        self.header.opcode
    }

    /// Get a reference to the frame's (unmasked) payload.
    #[inline]
    pub fn payload(&self) -> &Bytes {
        &self.payload
    }

    /// Consume the frame into its payload.
    #[inline]
    pub fn into_payload(self) -> Bytes {
        self.payload
    }

    /// Create a new data frame.
    #[inline]
    pub fn message(data: impl Into<Bytes>, opcode: OpCode, is_final: bool) -> Frame {
        debug_assert!(
            matches!(opcode, OpCode::Data(_)),
            "Invalid opcode for data frame."
        );
        Frame {
            header: FrameHeader {
                is_final,
                opcode,
                ..FrameHeader::default()
            },
            payload: data.into(),
        }
    }

    /// Create a new text frame.
    #[inline]
    pub fn text(data: impl Into<Bytes>) -> Frame {
        Frame::message(data, OpCode::Data(Data::Text), true)
    }

    /// Create a new binary frame.
    #[inline]
    pub fn binary(data: impl Into<Bytes>) -> Frame {
        Frame::message(data, OpCode::Data(Data::Binary), true)
    }

    /// Create a new Ping control frame.
    #[inline]
    pub fn ping(data: impl Into<Bytes>) -> Frame {
        Frame {
            header: FrameHeader {
                opcode: OpCode::Control(Control::Ping),
                ..FrameHeader::default()
            },
            payload: data.into(),
        }
    }

    /// Create a new Pong control frame.
    #[inline]
    pub fn pong(data: impl Into<Bytes>) -> Frame {
        Frame {
            header: FrameHeader {
                opcode: OpCode::Control(Control::Pong),
                ..FrameHeader::default()
            },
            payload: data.into(),
        }
    }

    /// Create a frame from given header and (already unmasked) payload.
    #[inline]
    pub fn from_payload(header: FrameHeader, payload: Bytes) -> Self {
        Frame { header, payload }
    }

    /// Sets the mask applied when the frame is encoded.
    #[inline]
    pub fn with_mask(mut self, mask: [u8; 4]) -> Self {
        self.header.mask = Some(mask);
        self
    }
}

impl fmt::Display for Frame {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(
            f,
            "<FRAME>
final: {}
reserved: {} {} {}
opcode: {}
length: {}
payload length: {}",
            self.header.is_final,
            self.header.rsv1,
            self.header.rsv2,
            self.header.rsv3,
            self.header.opcode,
            self.len(),
            self.payload.len(),
        )
    }
}

/// Handling of the length format.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum LengthFormat {
    U8(u8),
    U16,
    U64,
}

impl LengthFormat {
    /// Get the length format for a given data size.
    #[inline]
    pub(crate) fn for_length(length: u64) -> Self {
        if length < 126 {
            LengthFormat::U8(length as u8)
        } else if length < 65536 {
            LengthFormat::U16
        } else {
            LengthFormat::U64
        }
    }

    /// Get the size of the length encoding.
    #[inline]
    pub(crate) fn extra_bytes(&self) -> usize {
        match *self {
            LengthFormat::U8(_) => 0,
            LengthFormat::U16 => 2,
            LengthFormat::U64 => 8,
        }
    }

    /// Encode the given length.
    #[inline]
    pub(crate) fn length_byte(&self) -> u8 {
        match *self {
            LengthFormat::U8(b) => b,
            LengthFormat::U16 => 126,
            LengthFormat::U64 => 127,
        }
    }

    /// Get the length format for a given length byte.
    #[inline]
    pub(crate) fn for_byte(byte: u8) -> Self {
        match byte & 0x7F {
            126 => LengthFormat::U16,
            127 => LengthFormat::U64,
            b => LengthFormat::U8(b),
        }
    }
}
