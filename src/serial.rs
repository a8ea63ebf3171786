use tracing::debug;

use crate::error::Error;

/// Serial port related errors.
pub mod error;

/// The serial port structure.
pub(crate) mod serial_port;

/// Codecs for decoding messages from the wire.
pub mod codecs;

pub use serial_port::{SerialPort, SerialPortBuilder};

/// List the serial ports available on this machine.
pub fn list_ports() -> Result<Vec<String>, Error> {
    let ports = serialport::available_ports()
        .map_err(|e| Error::Transport(format!("Could not enumerate serial ports: {e}")))?;

    debug!("Found {} port(s)", ports.len());

    Ok(ports.into_iter().map(|info| info.port_name).collect())
}
