#![deny(missing_docs)]

//! This crate shares a single serial device between many concurrent callers.
//!
//! A reader task drains everything the device says into a [`history::History`]
//! of indexed, timestamped records.
//! Callers never read the device directly, they look at or wait on the history.
//! This way any number of callers can block on replies without stealing
//! bytes from one another.
//!
//! The primitives (send, receive, get, and friends) live on [`connection::Connection`].
//! An HTTP gateway exposes them, guarded by a [`gate::Gate`] which only lets
//! one registered user operate the device at a time.
//!
//! A mock device is available for trying things out without hardware.

/// The requests a user can make over HTTP,
/// as well as the replies.
pub mod actions;

/// Code relating to setting up the HTTP server.
pub mod server;

/// Request handlers of the HTTP server.
pub(crate) mod handlers;

/// The command line interface.
pub mod cli;

/// Relates to config files.
pub mod config;

/// A connection to the device and the primitives operating on it.
pub mod connection;

/// Possible errors in this library.
pub mod error;

/// Single-slot arbitration of the device.
pub mod gate;

/// The records received from the device.
pub mod history;

/// Logging/tracing setup.
pub mod logging;

/// An in-memory device.
pub mod mock;

/// Drains the device into the history.
pub(crate) mod reader;

/// Serial port driver.
pub mod serial;

/// Opening devices.
pub mod transport;

/// A user of the gateway.
pub mod user;
