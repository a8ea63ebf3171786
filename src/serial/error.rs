use std::io;

use thiserror::Error;

/// Problems talking to the device itself.
#[derive(Debug, Error)]
pub enum TransportError {
    /// IO related errors.
    #[error("Underlying IO problem: {0}")]
    IO(#[from] io::Error),

    /// The device could not be opened.
    #[error("Could not open `{path}`, problem: {problem}")]
    Open {
        /// Which device.
        path: String,

        /// What went wrong.
        problem: String,
    },

    /// The device disappeared.
    #[error("Device disconnected")]
    Disconnected,
}
