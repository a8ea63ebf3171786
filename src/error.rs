use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::{actions::Reply, serial::error::TransportError};

/// Errors thay may occur in this library.
#[derive(Debug, Error, Serialize, Deserialize, PartialEq, Eq, Clone)]
pub enum Error {
    /// The device could not be reached, or went away.
    /// Fatal to the active connection until it reconnects.
    #[error("Transport problem: {0}")]
    Transport(String),

    /// Data could not be put on the wire.
    /// Either the transport failed or the send interval has not elapsed yet.
    #[error("Failed to send")]
    SendFailed(String),

    /// A bounded wait ran out of time.
    #[error("Timed out waiting for the device")]
    Timeout,

    /// The connection to the device is not open.
    #[error("Not connected to the device")]
    NotConnected,

    /// The gate is free, so nobody may operate the device.
    #[error("Not registered; only one connection at a time")]
    NotRegistered,

    /// The gate is already occupied.
    #[error("Already registered; only one connection at a time")]
    AlreadyRegistered,

    /// The request did not conform to valid usage.
    #[error("Malformed request: {0}")]
    MalformedRequest(String),

    /// The configuration was not valid.
    #[error("Bad configuration: {0}")]
    BadConfig(String),

    /// A custom route was given a path which the gateway keeps for itself.
    #[error("The route `{0}` is reserved")]
    RouteReserved(String),

    /// A custom route was given a path which is already routed.
    #[error("The route `{0}` already exists")]
    RouteExists(String),

    /// The HTTP server could not be started, or stopped unexpectedly.
    #[error("Server problem: {0}")]
    Serve(String),
}

impl Error {
    /// Get the bad config message if that was the error.
    pub fn try_into_bad_config(self) -> Result<String, Self> {
        if let Self::BadConfig(v) = self {
            Ok(v)
        } else {
            Err(self)
        }
    }

    /// The HTTP status this error is reported with.
    pub fn status_code(&self) -> StatusCode {
        match self {
            Error::NotRegistered
            | Error::AlreadyRegistered
            | Error::MalformedRequest(_)
            | Error::BadConfig(_) => StatusCode::BAD_REQUEST,
            Error::Transport(_) | Error::SendFailed(_) | Error::Timeout | Error::NotConnected => {
                StatusCode::BAD_GATEWAY
            }
            Error::RouteReserved(_) | Error::RouteExists(_) | Error::Serve(_) => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
        }
    }
}

impl From<TransportError> for Error {
    fn from(e: TransportError) -> Self {
        Self::Transport(e.to_string())
    }
}

impl IntoResponse for Error {
    fn into_response(self) -> Response {
        (self.status_code(), Json(Reply::new(self.to_string()))).into_response()
    }
}
