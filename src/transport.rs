use std::fmt::Debug;

use tokio::io::{AsyncRead, AsyncWrite};

use crate::serial::error::TransportError;

pub(crate) mod mock;
pub(crate) mod serial;

/// The half of an open device which produces bytes.
pub type BoxedReader = Box<dyn AsyncRead + Send + Unpin>;

/// The half of an open device which accepts bytes.
pub type BoxedWriter = Box<dyn AsyncWrite + Send + Unpin>;

/// An opened device.
/// Dropping both halves closes it.
pub struct Duplex {
    /// Bytes from the device.
    pub reader: BoxedReader,

    /// Bytes to the device.
    pub writer: BoxedWriter,
}

impl Duplex {
    /// Split something readable and writable into a duplex.
    pub fn new<T>(io: T) -> Self
    where
        T: AsyncRead + AsyncWrite + Send + 'static,
    {
        let (reader, writer) = tokio::io::split(io);

        Self {
            reader: Box::new(reader),
            writer: Box::new(writer),
        }
    }
}

/// Something which can be opened to get a byte level connection to a device.
/// For example a serial port, or a mocked device.
pub trait Transport: Send + Sync + Debug {
    /// Open the device.
    fn open(&self) -> Result<Duplex, TransportError>;

    /// Some human readable identifier of the device.
    fn describe(&self) -> String;
}
