use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::{
    connection::{stringify_fields, Expected, SendOptions},
    error::Error,
    history::Record,
};

/// The message of every successful reply.
pub const OK: &str = "OK";

fn yes() -> bool {
    true
}

/// Turn seconds given by a user into a duration.
pub(crate) fn seconds(value: Option<f64>, default: Duration) -> Result<Duration, Error> {
    match value {
        None => Ok(default),
        Some(seconds) => Duration::try_from_secs_f64(seconds).map_err(|_| {
            Error::MalformedRequest(format!("`{seconds}` is not a valid number of seconds"))
        }),
    }
}

/// Put data on the wire.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(deny_unknown_fields)]
pub struct SendRequest {
    /// The fields to send.
    /// Strings, numbers or booleans.
    pub data: Vec<serde_json::Value>,

    /// Appended after the last field.
    /// Uses the server's default if omitted.
    #[serde(default)]
    pub ending: Option<String>,

    /// Put between fields.
    /// Uses the server's default if omitted.
    #[serde(default)]
    pub concatenate: Option<String>,
}

impl SendRequest {
    /// The fields as they will be sent, and how to join them.
    pub(crate) fn parts(&self, defaults: &SendOptions) -> Result<(Vec<String>, SendOptions), Error> {
        let fields = send_fields(&self.data)?;
        let options = send_options(&self.ending, &self.concatenate, defaults);

        Ok((fields, options))
    }

    /// An example of sending some numbers.
    pub fn example() -> Self {
        Self {
            data: vec![1.into(), 2.into(), 3.into(), 4.into(), 169012.5.into()],
            ending: Some("\n".into()),
            concatenate: Some(";".into()),
        }
    }
}

fn send_fields(data: &[serde_json::Value]) -> Result<Vec<String>, Error> {
    if data.is_empty() {
        return Err(Error::MalformedRequest("There is no data to send".into()));
    }

    stringify_fields(data)
}

fn send_options(
    ending: &Option<String>,
    concatenate: &Option<String>,
    defaults: &SendOptions,
) -> SendOptions {
    SendOptions {
        ending: ending.clone().unwrap_or_else(|| defaults.ending.clone()),
        concatenate: concatenate
            .clone()
            .unwrap_or_else(|| defaults.concatenate.clone()),
    }
}

/// Look up a record without waiting.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(deny_unknown_fields)]
pub struct ReceiveRequest {
    /// How many records before the newest one.
    #[serde(default)]
    pub num_before: usize,

    /// Cut the text at this terminator.
    #[serde(default)]
    pub read_until: Option<String>,

    /// Trim whitespace off the text.
    #[serde(default = "yes")]
    pub strip: bool,
}

impl Default for ReceiveRequest {
    fn default() -> Self {
        Self {
            num_before: 0,
            read_until: None,
            strip: true,
        }
    }
}

/// How to present records as text.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(deny_unknown_fields)]
pub struct TextRequest {
    /// Cut the text at this terminator.
    #[serde(default)]
    pub read_until: Option<String>,

    /// Trim whitespace off the text.
    #[serde(default = "yes")]
    pub strip: bool,
}

/// Wait for the next record.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(deny_unknown_fields)]
pub struct GetRequest {
    /// Seconds to wait.
    /// Uses the server's default if omitted.
    #[serde(default)]
    pub timeout: Option<f64>,

    /// Cut the text at this terminator.
    #[serde(default)]
    pub read_until: Option<String>,

    /// Trim whitespace off the text.
    #[serde(default = "yes")]
    pub strip: bool,
}

/// Send, then wait for the first record after the send.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(deny_unknown_fields)]
pub struct GetFirstRequest {
    /// The fields to send.
    pub data: Vec<serde_json::Value>,

    /// Appended after the last field.
    #[serde(default)]
    pub ending: Option<String>,

    /// Put between fields.
    #[serde(default)]
    pub concatenate: Option<String>,

    /// Seconds to wait.
    #[serde(default)]
    pub timeout: Option<f64>,

    /// Cut the text at this terminator.
    #[serde(default)]
    pub read_until: Option<String>,

    /// Trim whitespace off the text.
    #[serde(default = "yes")]
    pub strip: bool,
}

impl GetFirstRequest {
    pub(crate) fn parts(&self, defaults: &SendOptions) -> Result<(Vec<String>, SendOptions), Error> {
        let fields = send_fields(&self.data)?;
        let options = send_options(&self.ending, &self.concatenate, defaults);

        Ok((fields, options))
    }
}

/// Wait until the device says something in particular.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(deny_unknown_fields)]
pub struct WaitRequest {
    /// What to wait for.
    pub response: String,

    /// Seconds to wait.
    #[serde(default)]
    pub timeout: Option<f64>,

    /// Trim whitespace off received data before comparing.
    #[serde(default = "yes")]
    pub strip: bool,
}

impl WaitRequest {
    /// What is expected.
    pub fn expected(&self) -> Expected {
        Expected::Text(self.response.clone())
    }
}

/// Keep sending until the device says something in particular.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(deny_unknown_fields)]
pub struct SendForResponseRequest {
    /// What to wait for.
    pub response: String,

    /// The fields to send.
    pub data: Vec<serde_json::Value>,

    /// Appended after the last field.
    #[serde(default)]
    pub ending: Option<String>,

    /// Put between fields.
    #[serde(default)]
    pub concatenate: Option<String>,

    /// Seconds between sends.
    #[serde(default)]
    pub send_interval: Option<f64>,

    /// Seconds until giving up.
    #[serde(default)]
    pub timeout: Option<f64>,

    /// Trim whitespace off received data before comparing.
    #[serde(default = "yes")]
    pub strip: bool,
}

impl SendForResponseRequest {
    pub(crate) fn parts(&self, defaults: &SendOptions) -> Result<(Vec<String>, SendOptions), Error> {
        let fields = send_fields(&self.data)?;
        let options = send_options(&self.ending, &self.concatenate, defaults);

        Ok((fields, options))
    }

    /// What is expected.
    pub fn expected(&self) -> Expected {
        Expected::Text(self.response.clone())
    }

    /// An example of polling a device until it is ready.
    pub fn example() -> Self {
        Self {
            response: "READY".into(),
            data: vec!["status?".into()],
            ending: None,
            concatenate: None,
            send_interval: Some(0.3),
            timeout: Some(5.0),
            strip: true,
        }
    }
}

/// A reply with only a message.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Reply {
    /// "OK", or what went wrong.
    pub message: String,
}

impl Reply {
    /// A reply with the given message.
    pub fn new<S: Into<String>>(message: S) -> Self {
        Self {
            message: message.into(),
        }
    }

    /// The successful reply.
    pub fn ok() -> Self {
        Self::new(OK)
    }
}

/// A reply carrying one record.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct RecordReply {
    /// Always "OK".
    pub message: String,

    /// When the record was received.
    pub timestamp: DateTime<Utc>,

    /// The record as text.
    pub data: String,
}

impl RecordReply {
    /// Present the record as text.
    pub fn new(record: &Record, read_until: Option<&str>, strip: bool) -> Self {
        Self {
            message: OK.into(),
            timestamp: record.timestamp,
            data: present(record, read_until, strip),
        }
    }
}

/// A reply carrying every record of the session.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct AllRecordsReply {
    /// Always "OK".
    pub message: String,

    /// The records as text, oldest first.
    pub data: Vec<String>,
}

impl AllRecordsReply {
    /// Present the records as text.
    pub fn new(records: &[Record], read_until: Option<&str>, strip: bool) -> Self {
        Self {
            message: OK.into(),
            data: records
                .iter()
                .map(|record| present(record, read_until, strip))
                .collect(),
        }
    }
}

fn present(record: &Record, read_until: Option<&str>, strip: bool) -> String {
    let text = record.decode(read_until);

    if strip {
        text.trim().to_owned()
    } else {
        text
    }
}
