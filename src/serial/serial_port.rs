use tokio_serial::{SerialPortBuilderExt, SerialStream};
use tracing::info;

use crate::serial::error::TransportError;

/// The default baud rate.
pub const DEFAULT_BAUD: u32 = 115_200;

/// Builder for a [`SerialPort`].
#[derive(Debug)]
pub struct SerialPortBuilder {
    baud: Option<u32>,
    flow_control: Option<serialport::FlowControl>,
    path: String,
}

impl SerialPortBuilder {
    /// Start a new builder.
    /// The tty should likely be along the lines of `/dev/ttyACMx` on unix, and `COMx` on Windows.
    pub fn new(tty: &str) -> Self {
        Self {
            path: tty.to_string(),
            baud: None,
            flow_control: None,
        }
    }

    /// Set the serial port builder's baud.
    /// Will use 115_200 if not set.
    pub fn set_baud(mut self, baud: u32) -> Self {
        self.baud = Some(baud);
        self
    }

    /// Set the flow control.
    /// None by default.
    pub fn set_flow_control(mut self, flow_control: serialport::FlowControl) -> Self {
        self.flow_control = Some(flow_control);
        self
    }

    /// Done building.
    /// The port is not opened until a connection is made.
    pub fn build(self) -> SerialPort {
        SerialPort {
            path: self.path,
            baud: self.baud.unwrap_or(DEFAULT_BAUD),
            flow_control: self.flow_control.unwrap_or(serialport::FlowControl::None),
        }
    }
}

/// A serial port which can be opened.
#[derive(Debug, Clone)]
pub struct SerialPort {
    pub(crate) path: String,
    pub(crate) baud: u32,
    pub(crate) flow_control: serialport::FlowControl,
}

impl SerialPort {
    /// Open the port for async use.
    ///
    /// Fails if the port is missing, or opened by someone else
    /// (ports are opened exclusively).
    pub(crate) fn open_stream(&self) -> Result<SerialStream, TransportError> {
        info!(%self.path, %self.baud, ?self.flow_control, "Opening serial port");

        tokio_serial::new(&self.path, self.baud)
            .data_bits(tokio_serial::DataBits::Eight)
            .parity(tokio_serial::Parity::None)
            .stop_bits(tokio_serial::StopBits::One)
            .flow_control(self.flow_control)
            .open_native_async()
            .map_err(|e| TransportError::Open {
                path: self.path.clone(),
                problem: e.to_string(),
            })
    }
}
