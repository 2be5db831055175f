//! WebSocket protocol implementation.

pub mod frame;

pub use frame::{Frame, FrameDecoder, FrameEncoder, FrameHeader, FrameReader, coding::OpCode};
