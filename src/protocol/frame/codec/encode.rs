use bytes::{BufMut, BytesMut};
use log::trace;
use monoio_codec::Encoder;

use crate::{
    error::Error,
    protocol::frame::{Frame, frame::LengthFormat, mask::apply_mask},
};

/// Writes frames in wire format, masking the payload when the header carries a key.
#[derive(Debug, Clone, Copy, Default)]
pub struct FrameEncoder;

impl Encoder<Frame> for FrameEncoder {
    type Error = Error;

    fn encode(&mut self, frame: Frame, dst: &mut BytesMut) -> Result<(), Self::Error> {
        trace!("sending frame {frame}");
        dst.reserve(frame.len());

        let length = frame.payload.len() as u64;
        let format = LengthFormat::for_length(length);
        dst.put_slice(&frame.header.to_leading_bytes(format));
        match format {
            LengthFormat::U8(_) => {}
            LengthFormat::U16 => dst.put_u16(length as u16),
            LengthFormat::U64 => dst.put_u64(length),
        }

        let Some(mask) = frame.header.mask else {
            dst.put_slice(&frame.payload);
            return Ok(());
        };
        dst.put_slice(&mask);
        let start = dst.len();
        dst.put_slice(&frame.payload);
        apply_mask(&mut dst[start..], mask);

        Ok(())
    }
}
