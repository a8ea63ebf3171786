//! A serial port transport.

use super::{Duplex, Transport};
use crate::serial::{error::TransportError, SerialPort};

impl Transport for SerialPort {
    fn open(&self) -> Result<Duplex, TransportError> {
        Ok(Duplex::new(self.open_stream()?))
    }

    fn describe(&self) -> String {
        // Reduce log verbosity
        let tty = if let Some(tty) = self.path.strip_prefix("/dev/serial/by-id/") {
            tty
        } else {
            &self.path
        };

        format!("tty: {tty}")
    }
}
