//! A connection to the device, and the primitives callers use to talk to it.
//!
//! Any number of tasks may use the primitives concurrently.
//! Blocking primitives wait on the [`History`], never on the device itself.

use std::{fmt::Display, sync::Arc, time::Duration};

use itertools::Itertools;
use serde::{Deserialize, Serialize};
use tokio::{
    io::AsyncWriteExt,
    sync::{Mutex, RwLock},
    time::Instant,
};
use tracing::{debug, info, instrument, trace, warn};

use crate::{
    error::Error,
    history::{History, Record, Waiter},
    reader::ReaderHandle,
    serial::codecs::Framing,
    transport::{BoxedWriter, Transport},
};

/// How the connection behaves by default.
#[derive(Debug, Clone, PartialEq)]
pub struct Settings {
    /// How long blocking primitives wait if not told otherwise.
    pub timeout: Duration,

    /// The least amount of time between two sends.
    /// Also the default retry interval of [`Connection::send_for_response`].
    pub send_interval: Duration,

    /// How the incoming bytes are cut into records.
    pub framing: Framing,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            timeout: Duration::from_secs(1),
            send_interval: Duration::from_millis(100),
            framing: Framing::default(),
        }
    }
}

/// How fields are put together when sending.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SendOptions {
    /// Appended after the last field.
    pub ending: String,

    /// Put between fields.
    pub concatenate: String,
}

impl Default for SendOptions {
    fn default() -> Self {
        Self {
            ending: "\n".into(),
            concatenate: ";".into(),
        }
    }
}

impl SendOptions {
    /// The bytes to put on the wire for these fields.
    pub fn encode<S: AsRef<str>>(&self, fields: &[S]) -> Vec<u8> {
        let mut line = fields
            .iter()
            .map(AsRef::as_ref)
            .join(&self.concatenate);
        line.push_str(&self.ending);

        line.into_bytes()
    }
}

/// Something a caller waits for the device to say.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum Expected {
    /// Compared to the payload decoded as UTF-8.
    Text(String),

    /// Compared to the raw payload.
    Bytes(Vec<u8>),
}

impl From<&str> for Expected {
    fn from(text: &str) -> Self {
        Self::Text(text.into())
    }
}

impl From<String> for Expected {
    fn from(text: String) -> Self {
        Self::Text(text)
    }
}

impl From<Vec<u8>> for Expected {
    fn from(bytes: Vec<u8>) -> Self {
        Self::Bytes(bytes)
    }
}

impl Display for Expected {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Expected::Text(text) => write!(f, "{text:?}"),
            Expected::Bytes(bytes) => write!(f, "{:?}", &bytes[..bytes.len().min(16)]),
        }
    }
}

impl Expected {
    /// Does the record match?
    /// If `strip` is set, leading and trailing whitespace of the record is ignored.
    pub fn matches(&self, record: &Record, strip: bool) -> bool {
        match self {
            Expected::Text(text) => {
                let decoded = record.decode(None);
                if strip {
                    decoded.trim() == text.as_str()
                } else {
                    decoded == *text
                }
            }
            Expected::Bytes(bytes) => {
                let payload: &[u8] = &record.payload;
                if strip {
                    trim_ascii_whitespace(payload) == bytes.as_slice()
                } else {
                    payload == bytes.as_slice()
                }
            }
        }
    }
}

fn trim_ascii_whitespace(bytes: &[u8]) -> &[u8] {
    let start = bytes
        .iter()
        .position(|b| !b.is_ascii_whitespace())
        .unwrap_or(bytes.len());
    let end = bytes
        .iter()
        .rposition(|b| !b.is_ascii_whitespace())
        .map_or(start, |last| last + 1);

    &bytes[start..end]
}

/// The write side of a session.
/// Locked for the duration of a write, so writes never interleave.
struct Outbox {
    writer: BoxedWriter,
    last_send: Option<Instant>,
}

struct Session {
    outbox: Arc<Mutex<Outbox>>,
    reader: ReaderHandle,
}

/// A connection to a single device.
///
/// Starts closed, see [`Connection::connect`].
pub struct Connection {
    transport: Arc<dyn Transport>,
    settings: Settings,
    history: Arc<History>,
    session: RwLock<Option<Session>>,
}

impl std::fmt::Debug for Connection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Connection")
            .field("transport", &self.transport)
            .field("settings", &self.settings)
            .finish_non_exhaustive()
    }
}

impl Connection {
    /// A new, closed, connection.
    pub fn new<T: Transport + 'static>(transport: T, settings: Settings) -> Self {
        Self::from_arc(Arc::new(transport), settings)
    }

    /// A new, closed, connection over a shared transport.
    pub fn from_arc(transport: Arc<dyn Transport>, settings: Settings) -> Self {
        Self {
            transport,
            settings,
            history: Arc::new(History::new()),
            session: RwLock::default(),
        }
    }

    /// The settings in use.
    pub fn settings(&self) -> &Settings {
        &self.settings
    }

    /// The received records.
    pub fn history(&self) -> &History {
        &self.history
    }

    /// Is the device connected, with a live reader?
    pub fn is_open(&self) -> bool {
        self.history.is_open()
    }

    /// Open the device and start reading from it.
    ///
    /// The history is cleared.
    /// Does nothing if already open.
    pub async fn connect(&self) -> Result<(), Error> {
        let mut session = self.session.write().await;
        let device = self.transport.describe();

        if let Some(existing) = session.as_ref() {
            if self.history.is_open() && !existing.reader.is_finished() {
                debug!(%device, "Already connected");
                return Ok(());
            }
        }

        if let Some(broken) = session.take() {
            info!(%device, "Replacing broken session");
            broken.reader.stop().await;
        }

        let duplex = self.transport.open()?;

        self.history.reset().await;
        let reader = ReaderHandle::spawn(
            &device,
            duplex.reader,
            self.settings.framing,
            self.history.clone(),
        );

        *session = Some(Session {
            outbox: Arc::new(Mutex::new(Outbox {
                writer: duplex.writer,
                last_send: None,
            })),
            reader,
        });

        info!(%device, "Connected");
        Ok(())
    }

    /// Stop reading and close the device.
    ///
    /// Anyone blocked on a primitive is woken with [`Error::NotConnected`].
    /// The history is kept until the next [`Connection::connect`].
    pub async fn disconnect(&self) {
        // Held until the history is closed, so a concurrent connect cannot slip in between.
        let mut current = self.session.write().await;
        let Some(session) = current.take() else {
            debug!("Not connected, nothing to disconnect");
            return;
        };

        session.reader.stop().await;
        self.history.close();
        drop(current);

        let mut outbox = session.outbox.lock().await;
        if let Err(e) = outbox.writer.shutdown().await {
            debug!(?e, "Shutdown of writer failed, device likely already gone");
        }

        info!(device = %self.transport.describe(), "Disconnected");
    }

    fn ensure_open(&self) -> Result<(), Error> {
        if self.history.is_open() {
            Ok(())
        } else {
            Err(Error::NotConnected)
        }
    }

    async fn outbox(&self) -> Result<Arc<Mutex<Outbox>>, Error> {
        self.ensure_open()?;

        self.session
            .read()
            .await
            .as_ref()
            .map(|session| session.outbox.clone())
            .ok_or(Error::NotConnected)
    }

    /// Join the fields, append the ending, and put it on the wire.
    ///
    /// Fails with [`Error::SendFailed`] if the previous send was less than
    /// the send interval ago, or if the device could not be written to.
    #[instrument(skip_all)]
    pub async fn send<S: AsRef<str>>(
        &self,
        fields: &[S],
        options: &SendOptions,
    ) -> Result<(), Error> {
        let outbox = self.outbox().await?;
        let mut outbox = outbox.lock().await;

        if let Some(last_send) = outbox.last_send {
            let since = last_send.elapsed();
            if since < self.settings.send_interval {
                debug!(?since, "Send interval has not elapsed");
                return Err(Error::SendFailed(format!(
                    "Only {since:?} since the last send, the send interval is {:?}",
                    self.settings.send_interval
                )));
            }
        }

        let bytes = options.encode(fields);
        trace!("Sending `{:?}`", &bytes[..bytes.len().min(32)]);

        let write = async {
            outbox.writer.write_all(&bytes).await?;
            outbox.writer.flush().await
        };

        if let Err(e) = write.await {
            warn!(?e, "Could not write to device");
            return Err(Error::SendFailed(e.to_string()));
        }

        outbox.last_send = Some(Instant::now());
        Ok(())
    }

    /// Look up a record without waiting for anything.
    /// Zero is the newest record, one the record before that, and so on.
    pub async fn receive(&self, back_offset: usize) -> Result<Option<Record>, Error> {
        self.ensure_open()?;

        Ok(self.history.at(back_offset).await)
    }

    /// All records of this session, oldest first.
    pub async fn receive_all(&self) -> Result<Vec<Record>, Error> {
        self.ensure_open()?;

        Ok(self.history.since(0).await)
    }

    /// The first record arriving after this call.
    ///
    /// Returns `None` on timeout.
    #[instrument(skip(self))]
    pub async fn get(&self, timeout: Duration) -> Result<Option<Record>, Error> {
        let deadline = Instant::now() + timeout;

        let waiter = self.history.register_waiter();
        self.ensure_open()?;
        let anchor = self.history.len().await;

        self.first_after(anchor, waiter, deadline).await
    }

    /// Send, then get the first record arriving after the send.
    ///
    /// Records which arrived before the send are never returned.
    /// Returns `None` on timeout.
    #[instrument(skip_all)]
    pub async fn get_first_response<S: AsRef<str>>(
        &self,
        fields: &[S],
        options: &SendOptions,
        timeout: Duration,
    ) -> Result<Option<Record>, Error> {
        let deadline = Instant::now() + timeout;

        let waiter = self.history.register_waiter();
        self.ensure_open()?;
        let anchor = self.history.len().await;

        self.send(fields, options).await?;

        self.first_after(anchor, waiter, deadline).await
    }

    /// Wait until a record matching the expected response arrives.
    ///
    /// Only records arriving after this call are considered.
    /// Returns false on timeout.
    #[instrument(skip_all, fields(%expected))]
    pub async fn wait_for_response(
        &self,
        expected: &Expected,
        timeout: Duration,
        strip: bool,
    ) -> Result<bool, Error> {
        let deadline = Instant::now() + timeout;

        let mut waiter = self.history.register_waiter();
        self.ensure_open()?;
        let mut last_checked = self.history.len().await;

        self.match_until(expected, strip, &mut last_checked, &mut waiter, deadline)
            .await
    }

    /// Keep sending until a record matching the expected response arrives.
    ///
    /// After each send, waits up to `send_interval` for a match.
    /// Any matching record arriving after this call counts,
    /// it need not be a reply to a particular send.
    /// Returns false once `timeout` has elapsed without a match.
    #[instrument(skip_all, fields(%expected))]
    pub async fn send_for_response<S: AsRef<str>>(
        &self,
        expected: &Expected,
        fields: &[S],
        options: &SendOptions,
        send_interval: Duration,
        timeout: Duration,
        strip: bool,
    ) -> Result<bool, Error> {
        let deadline = Instant::now() + timeout;

        let mut waiter = self.history.register_waiter();
        self.ensure_open()?;
        let mut last_checked = self.history.len().await;

        let mut attempt = 0;
        loop {
            attempt += 1;

            match self.send(fields, options).await {
                Ok(()) => trace!(%attempt, "Sent"),
                Err(Error::SendFailed(reason)) => debug!(%attempt, %reason, "Send failed, still waiting"),
                Err(e) => return Err(e),
            }

            let round_deadline = (Instant::now() + send_interval).min(deadline);
            if self
                .match_until(expected, strip, &mut last_checked, &mut waiter, round_deadline)
                .await?
            {
                debug!(%attempt, "Got expected response");
                return Ok(true);
            }

            if Instant::now() >= deadline {
                debug!(%attempt, "Gave up");
                return Ok(false);
            }
        }
    }

    async fn first_after(
        &self,
        anchor: u64,
        mut waiter: Waiter,
        deadline: Instant,
    ) -> Result<Option<Record>, Error> {
        loop {
            if let Some(record) = self.history.first_since(anchor).await {
                return Ok(Some(record));
            }

            if !waiter.await_append(deadline).await? {
                return Ok(None);
            }
        }
    }

    /// Check every record after `last_checked`, and wait for more until the deadline.
    async fn match_until(
        &self,
        expected: &Expected,
        strip: bool,
        last_checked: &mut u64,
        waiter: &mut Waiter,
        deadline: Instant,
    ) -> Result<bool, Error> {
        loop {
            for record in self.history.since(*last_checked).await {
                *last_checked = record.index;

                if expected.matches(&record, strip) {
                    return Ok(true);
                }
            }

            if !waiter.await_append(deadline).await? {
                return Ok(false);
            }
        }
    }
}

/// Turn loosely typed fields into the strings that are sent.
pub fn stringify_fields(fields: &[serde_json::Value]) -> Result<Vec<String>, Error> {
    fields
        .iter()
        .map(|field| match field {
            serde_json::Value::String(s) => Ok(s.clone()),
            serde_json::Value::Number(n) => Ok(n.to_string()),
            serde_json::Value::Bool(b) => Ok(b.to_string()),
            other => Err(Error::MalformedRequest(format!(
                "Fields must be strings, numbers or booleans, got `{other}`"
            ))),
        })
        .collect()
}
