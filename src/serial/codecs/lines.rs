use bytes::{Buf, Bytes, BytesMut};
use tokio_util::codec::Decoder;

use crate::serial::error::TransportError;

/// This codec has a configurable delimiter character for reading.
#[derive(Debug, Clone)]
pub struct LinesCodec {
    /// How far we have looked for a delimiter into the buffer
    cursor: usize,

    /// How to delimit incoming byte streams.
    /// This delimiter is not included in the yielded frames.
    read_delimiter: u8,
}

impl LinesCodec {
    /// Create a new codec.
    pub fn new(read_delimiter: u8) -> Self {
        Self {
            cursor: 0,
            read_delimiter,
        }
    }
}

impl Default for LinesCodec {
    fn default() -> Self {
        Self::new(b'\n')
    }
}

impl Decoder for LinesCodec {
    type Item = Bytes;
    type Error = TransportError;

    fn decode(&mut self, src: &mut BytesMut) -> Result<Option<Self::Item>, Self::Error> {
        let read_to = src.len();

        let look_at = &src[self.cursor..read_to];

        if let Some(position) = look_at.iter().position(|&byte| byte == self.read_delimiter) {
            // Since we might "start late" in the buffer (from the cursor),
            // the "global" position within the buffer has to be calculated.
            let actual_position = self.cursor + position;

            // Next time we need to start over.
            self.cursor = 0;

            let line = src.split_to(actual_position);

            // Discard the delimiter.
            src.advance(1);

            Ok(Some(line.freeze()))
        } else {
            // The next call gets the same buffer, possibly with more data.
            // No need to re-read what we have already looked at.
            self.cursor = read_to;

            Ok(None)
        }
    }

    fn decode_eof(&mut self, src: &mut BytesMut) -> Result<Option<Self::Item>, Self::Error> {
        if let Some(line) = self.decode(src)? {
            return Ok(Some(line));
        }

        self.cursor = 0;

        if src.is_empty() {
            Ok(None)
        } else {
            // An unterminated tail is still data the device sent.
            Ok(Some(src.split().freeze()))
        }
    }
}
