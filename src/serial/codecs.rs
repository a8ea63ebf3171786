use bytes::{Bytes, BytesMut};
use serde::{Deserialize, Serialize};
use tokio_util::codec::{BytesCodec, Decoder};

use crate::serial::error::TransportError;

/// Delimiter based framing.
pub(crate) mod lines;

/// How the bytes coming from the device are cut into history records.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Framing {
    /// Whatever a single read produced becomes one record.
    Chunks,

    /// Each delimited line becomes one record.
    /// The delimiter is not part of the record.
    Lines {
        /// The delimiter, must be ascii.
        delimiter: char,
    },
}

impl Default for Framing {
    fn default() -> Self {
        Self::Chunks
    }
}

/// The codec the reader decodes records with.
#[derive(Debug)]
pub(crate) enum RecordCodec {
    Chunks(BytesCodec),
    Lines(lines::LinesCodec),
}

impl From<Framing> for RecordCodec {
    fn from(framing: Framing) -> Self {
        match framing {
            Framing::Chunks => Self::Chunks(BytesCodec::new()),
            // Validated as ascii when the config is checked.
            Framing::Lines { delimiter } => Self::Lines(lines::LinesCodec::new(delimiter as u8)),
        }
    }
}

impl Decoder for RecordCodec {
    type Item = Bytes;
    type Error = TransportError;

    fn decode(&mut self, src: &mut BytesMut) -> Result<Option<Self::Item>, Self::Error> {
        match self {
            RecordCodec::Chunks(codec) => Ok(codec.decode(src)?.map(BytesMut::freeze)),
            RecordCodec::Lines(codec) => codec.decode(src),
        }
    }

    fn decode_eof(&mut self, src: &mut BytesMut) -> Result<Option<Self::Item>, Self::Error> {
        match self {
            RecordCodec::Chunks(codec) => Ok(codec.decode_eof(src)?.map(BytesMut::freeze)),
            RecordCodec::Lines(codec) => codec.decode_eof(src),
        }
    }
}
