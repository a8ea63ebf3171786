//! A mock transport.
//! Opening it connects to an in-memory device via loopback,
//! so it behaves like a serial port but is faster and more reliable.

use super::{Duplex, Transport};
use crate::{mock::MockDevice, serial::error::TransportError};

impl Transport for MockDevice {
    fn open(&self) -> Result<Duplex, TransportError> {
        Ok(Duplex::new(self.attach()))
    }

    fn describe(&self) -> String {
        format!("mock: {}", self.name())
    }
}
